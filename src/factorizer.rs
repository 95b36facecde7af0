/**
 * LowRank
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::borrow::Cow;

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::error::{ConstructionError, Result, ShapeError};
use crate::index::RatingIndex;
use crate::matrix::RatingMatrix;
use crate::training::{self, GradientDescent, LossReport, Reporter, TrainingConfig};
use crate::types::{self, LatentMatrix, TestEntry};

/// Collects the rating source of a factorizer. Exactly one of a rating index (training with
/// held-out evaluation) or a prebuilt rating matrix must be supplied.
pub struct FactorizerBuilder<'a> {
    latent_dim: usize,
    index: Option<&'a RatingIndex>,
    matrix: Option<&'a RatingMatrix>,
}

impl<'a> FactorizerBuilder<'a> {

    pub fn new(latent_dim: usize) -> Self {
        FactorizerBuilder { latent_dim, index: None, matrix: None }
    }

    pub fn rating_index(mut self, index: &'a RatingIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn rating_matrix(mut self, matrix: &'a RatingMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Randomly initializes both latent matrices from `rng`, users first.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> std::result::Result<Factorizer<'a>, ConstructionError> {

        if self.latent_dim == 0 {
            return Err(ConstructionError::InvalidLatentDimension(self.latent_dim));
        }

        let (ratings, test_entries) = match (self.index, self.matrix) {
            (Some(index), None) => (index.rating_matrix(), Some(index.test_entries())),
            (None, Some(matrix)) => (matrix, None),
            (None, None) => return Err(ConstructionError::MissingRatings),
            (Some(_), Some(_)) => return Err(ConstructionError::ConflictingRatings),
        };

        let (num_users, num_items) = ratings.dim();
        if num_users == 0 || num_items == 0 {
            return Err(ConstructionError::EmptyRatings { num_users, num_items });
        }

        let user_latent = types::random_matrix(num_users, self.latent_dim, rng);
        let item_latent = types::random_matrix(num_items, self.latent_dim, rng);

        Factorizer::from_parts(user_latent, Cow::Owned(item_latent), Cow::Borrowed(ratings), test_entries)
    }
}

/// Learns user and item latent matrices whose product approximates the observed ratings.
///
/// Item latent and ratings are held as `Cow`s, so that the same computations can run against a
/// borrowed, frozen item matrix and a single owned rating row (see `UserApproximator`).
pub struct Factorizer<'a> {
    user_latent: LatentMatrix,
    item_latent: Cow<'a, LatentMatrix>,
    ratings: Cow<'a, RatingMatrix>,
    test_entries: Option<Vec<TestEntry>>,
    steps_taken: usize,
}

impl<'a> Factorizer<'a> {

    pub(crate) fn from_parts(
        user_latent: LatentMatrix,
        item_latent: Cow<'a, LatentMatrix>,
        ratings: Cow<'a, RatingMatrix>,
        test_entries: Option<Vec<TestEntry>>,
    ) -> std::result::Result<Self, ConstructionError> {

        if user_latent.ncols() != item_latent.ncols() {
            return Err(ConstructionError::InnerDimensionMismatch {
                user: user_latent.ncols(),
                item: item_latent.ncols(),
            });
        }

        Ok(Factorizer { user_latent, item_latent, ratings, test_entries, steps_taken: 0 })
    }

    pub fn latent_dim(&self) -> usize {
        self.user_latent.ncols()
    }

    pub fn user_latent(&self) -> ArrayView2<f64> {
        self.user_latent.view()
    }

    pub fn item_latent(&self) -> ArrayView2<f64> {
        self.item_latent.view()
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Gives up the learned (user latent, item latent) matrices.
    pub fn into_latents(self) -> (LatentMatrix, LatentMatrix) {
        (self.user_latent, self.item_latent.into_owned())
    }

    /// `user_latent * item_latent^T`, one predicted rating per user and item.
    pub fn predict(&self) -> std::result::Result<Array2<f64>, ShapeError> {
        types::check_inner_dims("predict", &self.user_latent, &self.item_latent)?;
        Ok(self.user_latent.dot(&self.item_latent.t()))
    }

    /// Half the squared error over observed cells plus `regularization / 2` times the squared
    /// norms of both latent matrices, together with the RMSE on the held-out ratings.
    pub fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        let prediction = self.predict()?;
        let residuals = self.ratings.masked_residuals(&prediction)?;

        let squared_error: f64 = residuals.iter().map(|residual| residual * residual).sum();

        let total = 0.5 * squared_error
            + regularization * types::squared_norm(&self.user_latent) / 2.0
            + regularization * types::squared_norm(&self.item_latent) / 2.0;

        let per_cell = total / prediction.len() as f64;

        Ok(LossReport { total, per_cell, test_rmse: self.test_rmse(&prediction) })
    }

    fn test_rmse(&self, prediction: &Array2<f64>) -> Option<f64> {
        let test_entries = self.test_entries.as_ref()?;

        if test_entries.is_empty() {
            return None;
        }

        let squared_error: f64 = test_entries.iter()
            .map(|&(user_index, item_index, rating)| {
                let error = prediction[[user_index, item_index]] - rating;
                error * error
            })
            .sum();

        Some((squared_error / test_entries.len() as f64).sqrt())
    }

    /// Residuals of the prediction on observed cells, zero everywhere else.
    fn masked_residuals(&self) -> std::result::Result<Array2<f64>, ShapeError> {
        let prediction = self.predict()?;
        self.ratings.masked_residuals(&prediction)
    }

    /// Gradients of the loss with respect to the user and the item latent matrix. Unobserved
    /// cells never contribute.
    pub fn gradients(&self, regularization: f64)
        -> std::result::Result<(Array2<f64>, Array2<f64>), ShapeError> {

        let residuals = self.masked_residuals()?;

        let mut user_gradient = residuals.dot(&*self.item_latent);
        user_gradient.scaled_add(regularization, &self.user_latent);

        let mut item_gradient = residuals.t().dot(&self.user_latent);
        item_gradient.scaled_add(regularization, &*self.item_latent);

        Ok((user_gradient, item_gradient))
    }

    /// Gradient of the loss with respect to the user latent matrix only.
    pub(crate) fn user_gradient(&self, regularization: f64) -> std::result::Result<Array2<f64>, ShapeError> {
        let residuals = self.masked_residuals()?;

        let mut user_gradient = residuals.dot(&*self.item_latent);
        user_gradient.scaled_add(regularization, &self.user_latent);

        Ok(user_gradient)
    }

    /// Moves only the user latent matrix along its gradient, the item latent stays untouched.
    pub(crate) fn descend_users(&mut self, regularization: f64, learning_rate: f64)
        -> std::result::Result<(), ShapeError> {

        let user_gradient = self.user_gradient(regularization)?;
        self.user_latent.scaled_add(-learning_rate, &user_gradient);
        self.steps_taken += 1;

        Ok(())
    }

    pub(crate) fn into_user_latent(self) -> LatentMatrix {
        self.user_latent
    }

    /// Runs full-batch gradient descent for `config.steps` steps, reporting every
    /// `config.epoch_size` steps. Returns the loss after the final step.
    pub fn train<R: Reporter + ?Sized>(&mut self, config: &TrainingConfig, reporter: &mut R)
        -> Result<LossReport> {
        training::train(self, config, reporter)
    }
}

impl<'a> GradientDescent for Factorizer<'a> {

    fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        Factorizer::loss(self, regularization)
    }

    fn descend(&mut self, regularization: f64, learning_rate: f64)
        -> std::result::Result<(), ShapeError> {

        // Both gradients come from the state before this step
        let (user_gradient, item_gradient) = self.gradients(regularization)?;

        self.user_latent.scaled_add(-learning_rate, &user_gradient);
        self.item_latent.to_mut().scaled_add(-learning_rate, &item_gradient);
        self.steps_taken += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use ndarray::arr2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::index::IndexConfig;
    use crate::training::EpochReport;
    use crate::types::RatingObservation;

    fn small_ratings() -> RatingMatrix {
        RatingMatrix::from_dense(arr2(&[
            [5.0, 3.0, 0.0],
            [0.0, 4.0, 0.0],
            [0.0, 0.0, 2.0],
        ]))
    }

    fn observed_squared_error(factorizer: &Factorizer, ratings: &RatingMatrix) -> f64 {
        let prediction = factorizer.predict().unwrap();
        ratings.masked_residuals(&prediction).unwrap().iter().map(|r| r * r).sum()
    }

    #[test]
    fn exactly_one_rating_source() {
        let ratings = small_ratings();
        let index = RatingIndex::from_observations(
            vec![RatingObservation::new(1, 1, 4.0)],
            &IndexConfig::default(),
        ).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let neither = FactorizerBuilder::new(2).build(&mut rng);
        assert_eq!(neither.err(), Some(ConstructionError::MissingRatings));

        let both = FactorizerBuilder::new(2)
            .rating_index(&index)
            .rating_matrix(&ratings)
            .build(&mut rng);
        assert_eq!(both.err(), Some(ConstructionError::ConflictingRatings));

        assert!(FactorizerBuilder::new(2).rating_matrix(&ratings).build(&mut rng).is_ok());
        assert!(FactorizerBuilder::new(2).rating_index(&index).build(&mut rng).is_ok());
    }

    #[test]
    fn latent_dimension_must_be_positive() {
        let ratings = small_ratings();
        let result = FactorizerBuilder::new(0)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(1));

        assert_eq!(result.err(), Some(ConstructionError::InvalidLatentDimension(0)));
    }

    #[test]
    fn empty_ratings_are_a_construction_error() {
        let index = RatingIndex::from_observations(Vec::new(), &IndexConfig::default()).unwrap();
        let result = FactorizerBuilder::new(3)
            .rating_index(&index)
            .build(&mut StdRng::seed_from_u64(1));

        assert_eq!(result.err(), Some(ConstructionError::EmptyRatings { num_users: 0, num_items: 0 }));
    }

    #[test]
    fn mismatching_latent_dimensions_are_rejected() {
        let ratings = small_ratings();
        let result = Factorizer::from_parts(
            Array2::ones((3, 2)),
            Cow::Owned(Array2::ones((3, 4))),
            Cow::Borrowed(&ratings),
            None,
        );

        assert_eq!(result.err(), Some(ConstructionError::InnerDimensionMismatch { user: 2, item: 4 }));
    }

    #[test]
    fn predictions_have_the_shape_of_the_ratings() {
        let ratings = RatingMatrix::from_dense(Array2::from_elem((7, 4), 3.0));
        let factorizer = FactorizerBuilder::new(3)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(5))
            .unwrap();

        let prediction = factorizer.predict().unwrap();

        assert_eq!(prediction.dim(), (7, 4));
        assert!(prediction.iter().all(|value| value.is_finite()));
        assert_eq!(factorizer.latent_dim(), 3);
        assert_eq!(factorizer.user_latent().dim(), (7, 3));
        assert_eq!(factorizer.item_latent().dim(), (4, 3));
    }

    #[test]
    fn loss_and_gradients_on_known_latents() {
        let ratings = RatingMatrix::from_dense(arr2(&[[2.0, 0.0], [1.0, 3.0]]));
        let factorizer = Factorizer::from_parts(
            arr2(&[[1.0], [2.0]]),
            Cow::Owned(arr2(&[[1.0], [1.0]])),
            Cow::Borrowed(&ratings),
            None,
        ).unwrap();

        // prediction [[1, 1], [2, 2]], masked residuals [[-1, 0], [1, -1]]
        let loss = factorizer.loss(0.5).unwrap();
        let expected_total = 0.5 * 3.0 + 0.25 * 5.0 + 0.25 * 2.0;
        assert!((loss.total - expected_total).abs() < 1e-12);
        assert!((loss.per_cell - expected_total / 4.0).abs() < 1e-12);
        assert_eq!(loss.test_rmse, None);

        let (user_gradient, item_gradient) = factorizer.gradients(0.5).unwrap();
        assert_eq!(user_gradient, arr2(&[[-0.5], [1.0]]));
        assert_eq!(item_gradient, arr2(&[[1.5], [-1.5]]));
    }

    #[test]
    fn missing_cells_have_no_effect() {
        let values = arr2(&[[5.0, 0.0, 1.0], [0.0, 4.0, 0.0]]);
        let observed = values.mapv(|value| value != 0.0);

        let mut altered_values = values.clone();
        altered_values[[0, 1]] = 42.0;
        altered_values[[1, 2]] = -7.5;

        let ratings = RatingMatrix::with_mask(values, observed.clone()).unwrap();
        let altered_ratings = RatingMatrix::with_mask(altered_values, observed).unwrap();

        let factorizer = FactorizerBuilder::new(2)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(17))
            .unwrap();
        let altered_factorizer = FactorizerBuilder::new(2)
            .rating_matrix(&altered_ratings)
            .build(&mut StdRng::seed_from_u64(17))
            .unwrap();

        assert_eq!(factorizer.loss(0.1).unwrap(), altered_factorizer.loss(0.1).unwrap());
        assert_eq!(factorizer.gradients(0.1).unwrap(), altered_factorizer.gradients(0.1).unwrap());
    }

    #[test]
    fn observed_error_shrinks_on_small_example() {
        let ratings = small_ratings();
        let mut factorizer = FactorizerBuilder::new(2)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(2018))
            .unwrap();

        let initial_error = observed_squared_error(&factorizer, &ratings);

        let config = TrainingConfig { steps: 500, epoch_size: 50, regularization: 0.0, learning_rate: 0.01 };
        factorizer.train(&config, &mut |_: &EpochReport| {}).unwrap();

        let final_error = observed_squared_error(&factorizer, &ratings);

        assert_eq!(factorizer.steps_taken(), 500);
        assert!(final_error < 0.1 * initial_error);
    }

    #[test]
    fn reported_loss_does_not_increase() {
        let ratings = small_ratings();
        let mut factorizer = FactorizerBuilder::new(2)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(3))
            .unwrap();

        let config = TrainingConfig { steps: 200, epoch_size: 20, regularization: 0.01, learning_rate: 0.005 };
        let mut losses = Vec::new();
        factorizer.train(&config, &mut |report: &EpochReport| losses.push(report.loss.total))
            .unwrap();

        assert_eq!(losses.len(), 10);
        for pair in losses.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn stronger_regularization_gives_smaller_latents() {
        let ratings = small_ratings();

        let norm_after_training = |regularization: f64| {
            let mut factorizer = FactorizerBuilder::new(2)
                .rating_matrix(&ratings)
                .build(&mut StdRng::seed_from_u64(99))
                .unwrap();

            let config = TrainingConfig { steps: 300, epoch_size: 100, regularization, learning_rate: 0.01 };
            factorizer.train(&config, &mut |_: &EpochReport| {}).unwrap();

            types::squared_norm(&factorizer.user_latent().to_owned())
                + types::squared_norm(&factorizer.item_latent().to_owned())
        };

        assert!(norm_after_training(0.5) < norm_after_training(0.0));
    }

    #[test]
    fn held_out_ratings_give_an_rmse() {
        let observations: Vec<RatingObservation> = (0..10)
            .flat_map(|user| (0..8).map(move |item| {
                RatingObservation::new(user, item, 1.0 + ((user + item) % 5) as f64)
            }))
            .collect();

        let config = IndexConfig { test_ratio: 0.2, seed: 4 };
        let index = RatingIndex::from_observations(observations, &config).unwrap();

        let factorizer = FactorizerBuilder::new(3)
            .rating_index(&index)
            .build(&mut StdRng::seed_from_u64(8))
            .unwrap();

        let rmse = factorizer.loss(0.0).unwrap().test_rmse;
        assert!(rmse.is_some());
        assert!(rmse.unwrap() > 0.0);

        let ratings = index.rating_matrix().clone();
        let without_index = FactorizerBuilder::new(3)
            .rating_matrix(&ratings)
            .build(&mut StdRng::seed_from_u64(8))
            .unwrap();

        assert_eq!(without_index.loss(0.0).unwrap().test_rmse, None);
    }
}
