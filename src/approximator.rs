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

use fnv::FnvHashMap;
use ndarray::{Array1, Axis};
use rand::Rng;

use crate::error::{ConstructionError, Result, ShapeError};
use crate::factorizer::Factorizer;
use crate::matrix::RatingMatrix;
use crate::stats::IndexMap;
use crate::training::{self, GradientDescent, LossReport, Reporter, TrainingConfig};
use crate::types::{self, LatentMatrix};

/// Estimates the latent vector of a user who was not part of training, against an already
/// trained item latent matrix. Only the user's row is ever updated, the item latent matrix is
/// borrowed immutably for the whole approximation.
pub struct UserApproximator<'a> {
    factorizer: Factorizer<'a>,
}

impl<'a> UserApproximator<'a> {

    /// `ratings` holds one entry per row of `item_latent`, zero meaning unrated.
    pub fn new<R: Rng + ?Sized>(
        item_latent: &'a LatentMatrix,
        ratings: Array1<f64>,
        rng: &mut R,
    ) -> std::result::Result<Self, ConstructionError> {

        let (num_items, latent_dim) = item_latent.dim();

        if latent_dim == 0 {
            return Err(ConstructionError::InvalidLatentDimension(latent_dim));
        }

        if ratings.len() != num_items {
            return Err(ConstructionError::ItemCountMismatch { ratings: ratings.len(), items: num_items });
        }

        let user_latent = types::random_matrix(1, latent_dim, rng);
        let ratings = RatingMatrix::from_row(ratings);

        let factorizer = Factorizer::from_parts(
            user_latent,
            Cow::Borrowed(item_latent),
            Cow::Owned(ratings),
            None,
        )?;

        Ok(UserApproximator { factorizer })
    }

    /// Builds the rating row from ratings keyed by external item ID. Items unknown to `items` are
    /// ignored.
    pub fn from_rated_items<R: Rng + ?Sized>(
        item_latent: &'a LatentMatrix,
        items: &IndexMap,
        ratings_by_item: &FnvHashMap<u32, f64>,
        rng: &mut R,
    ) -> std::result::Result<Self, ConstructionError> {

        let mut ratings = Array1::zeros(items.len());

        for (item, rating) in ratings_by_item.iter() {
            if let Some(item_index) = items.index(*item) {
                ratings[item_index] = *rating;
            }
        }

        UserApproximator::new(item_latent, ratings, rng)
    }

    pub fn user_latent(&self) -> Array1<f64> {
        self.factorizer.user_latent().index_axis(Axis(0), 0).to_owned()
    }

    /// Predicted rating for every item.
    pub fn predict(&self) -> std::result::Result<Array1<f64>, ShapeError> {
        Ok(self.factorizer.predict()?.index_axis_move(Axis(0), 0))
    }

    pub fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        self.factorizer.loss(regularization)
    }

    /// Gradient of the loss with respect to the user's latent vector.
    pub fn gradient(&self, regularization: f64) -> std::result::Result<Array1<f64>, ShapeError> {
        Ok(self.factorizer.user_gradient(regularization)?.index_axis_move(Axis(0), 0))
    }

    pub fn steps_taken(&self) -> usize {
        self.factorizer.steps_taken()
    }

    /// Runs `config.steps` descent steps on the user's latent vector and returns it.
    pub fn approximate<R: Reporter + ?Sized>(mut self, config: &TrainingConfig, reporter: &mut R)
        -> Result<Array1<f64>> {

        training::train(&mut self, config, reporter)?;

        Ok(self.factorizer.into_user_latent().index_axis_move(Axis(0), 0))
    }
}

impl<'a> GradientDescent for UserApproximator<'a> {

    fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        UserApproximator::loss(self, regularization)
    }

    fn descend(&mut self, regularization: f64, learning_rate: f64)
        -> std::result::Result<(), ShapeError> {
        self.factorizer.descend_users(regularization, learning_rate)
    }
}

#[cfg(test)]
mod tests {

    use ndarray::{arr1, arr2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::training::EpochReport;

    fn item_latent() -> LatentMatrix {
        arr2(&[
            [1.0, 0.2],
            [0.9, 0.1],
            [0.1, 1.2],
            [0.0, 0.8],
        ])
    }

    #[test]
    fn item_latent_stays_frozen() {
        let items = item_latent();
        let before = items.clone();

        let approximator = UserApproximator::new(
            &items,
            arr1(&[5.0, 4.0, 0.0, 1.0]),
            &mut StdRng::seed_from_u64(21),
        ).unwrap();

        let config = TrainingConfig { steps: 200, epoch_size: 50, regularization: 0.01, learning_rate: 0.05 };
        let user = approximator.approximate(&config, &mut |_: &EpochReport| {}).unwrap();

        assert_eq!(items, before);
        assert_eq!(user.len(), 2);
    }

    #[test]
    fn approximation_reduces_the_loss() {
        let items = item_latent();
        let mut approximator = UserApproximator::new(
            &items,
            arr1(&[5.0, 4.0, 0.0, 1.0]),
            &mut StdRng::seed_from_u64(5),
        ).unwrap();

        let initial_loss = approximator.loss(0.0).unwrap().total;

        let config = TrainingConfig { steps: 300, epoch_size: 100, regularization: 0.0, learning_rate: 0.05 };
        let mut losses = Vec::new();
        let final_loss = training::train(&mut approximator, &config, &mut |report: &EpochReport| {
            losses.push(report.loss.total)
        }).unwrap();

        assert_eq!(losses.len(), 3);
        assert_eq!(approximator.steps_taken(), 300);
        assert!(final_loss.total < 0.1 * initial_loss);
        assert_eq!(final_loss.test_rmse, None);

        // The user likes the first two items, so they should be predicted above the last one
        let prediction = approximator.predict().unwrap();
        assert!(prediction[0] > prediction[3]);
        assert!(prediction[1] > prediction[3]);
    }

    #[test]
    fn approximation_reports_every_epoch_size_steps() {
        let items = item_latent();
        let approximator = UserApproximator::new(
            &items,
            arr1(&[5.0, 4.0, 0.0, 1.0]),
            &mut StdRng::seed_from_u64(3),
        ).unwrap();

        let config = TrainingConfig { steps: 7, epoch_size: 3, regularization: 0.01, learning_rate: 0.05 };
        let mut steps = Vec::new();
        approximator.approximate(&config, &mut |report: &EpochReport| steps.push(report.step)).unwrap();

        assert_eq!(steps, vec![0, 3, 6]);
    }

    #[test]
    fn unrated_items_do_not_move_the_user() {
        let items = item_latent();
        let approximator = UserApproximator::new(
            &items,
            arr1(&[0.0, 0.0, 0.0, 0.0]),
            &mut StdRng::seed_from_u64(5),
        ).unwrap();

        let gradient = approximator.gradient(0.0).unwrap();
        assert!(gradient.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn rating_row_must_cover_all_items() {
        let items = item_latent();
        let result = UserApproximator::new(&items, arr1(&[5.0, 4.0]), &mut StdRng::seed_from_u64(1));

        assert_eq!(
            result.err().map(|error| error.to_string()),
            Some(ConstructionError::ItemCountMismatch { ratings: 2, items: 4 }.to_string())
        );
    }

    #[test]
    fn ratings_by_external_item_id() {
        let items = item_latent();

        let mut item_ids = IndexMap::new();
        for id in &[101, 205, 307, 410] {
            item_ids.index_or_insert(*id);
        }

        let mut ratings_by_item = FnvHashMap::default();
        ratings_by_item.insert(205, 4.0);
        ratings_by_item.insert(999, 3.0);

        let approximator = UserApproximator::from_rated_items(
            &items,
            &item_ids,
            &ratings_by_item,
            &mut StdRng::seed_from_u64(1),
        ).unwrap();

        assert_eq!(approximator.user_latent().len(), 2);
        assert_eq!(approximator.predict().unwrap().len(), 4);
    }
}
