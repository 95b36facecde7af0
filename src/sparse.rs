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

use fnv::FnvHashMap;
use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::error::{ConstructionError, Result, ShapeError};
use crate::index::RatingIndex;
use crate::matrix::RatingMatrix;
use crate::training::{self, GradientDescent, LossReport, Reporter, TrainingConfig};
use crate::types::{self, LatentMatrix, TestEntry};

pub type SparseRow = FnvHashMap<usize, f64>;

/// Observed ratings only, as user index -> item index -> rating. Memory grows with the number of
/// observations instead of users x items.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRatings {
    num_items: usize,
    rows: Vec<SparseRow>,
}

impl SparseRatings {

    pub fn new(num_users: usize, num_items: usize) -> Self {
        SparseRatings {
            num_items,
            rows: vec![FnvHashMap::with_capacity_and_hasher(0, Default::default()); num_users],
        }
    }

    /// Later ratings for the same cell overwrite earlier ones.
    pub fn insert(&mut self, user_index: usize, item_index: usize, rating: f64)
        -> std::result::Result<(), ShapeError> {

        if user_index >= self.rows.len() || item_index >= self.num_items {
            return Err(ShapeError::new(
                "sparse rating",
                (user_index + 1, item_index + 1),
                (self.rows.len(), self.num_items),
            ));
        }

        self.rows[user_index].insert(item_index, rating);
        Ok(())
    }

    pub fn from_matrix(matrix: &RatingMatrix) -> Self {
        let (num_users, num_items) = matrix.dim();
        let mut ratings = SparseRatings::new(num_users, num_items);

        for (user_index, item_index, rating) in matrix.observed_entries() {
            ratings.rows[user_index].insert(item_index, rating);
        }

        ratings
    }

    pub fn num_users(&self) -> usize {
        self.rows.len()
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn num_observed(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    pub fn get(&self, user_index: usize, item_index: usize) -> Option<f64> {
        self.rows.get(user_index).and_then(|row| row.get(&item_index).cloned())
    }

    pub fn row(&self, user_index: usize) -> Option<&SparseRow> {
        self.rows.get(user_index)
    }
}

/// Same objective as the dense `Factorizer`, but predictions are only ever computed for observed
/// cells and gradients are accumulated per observation.
pub struct SparseFactorizer<'a> {
    user_latent: LatentMatrix,
    item_latent: LatentMatrix,
    ratings: &'a SparseRatings,
    test_entries: Option<Vec<TestEntry>>,
    steps_taken: usize,
}

impl<'a> SparseFactorizer<'a> {

    /// Randomly initializes both latent matrices from `rng`, users first, exactly like the dense
    /// factorizer does.
    pub fn new<R: Rng + ?Sized>(latent_dim: usize, ratings: &'a SparseRatings, rng: &mut R)
        -> std::result::Result<Self, ConstructionError> {

        if latent_dim == 0 {
            return Err(ConstructionError::InvalidLatentDimension(latent_dim));
        }

        let (num_users, num_items) = (ratings.num_users(), ratings.num_items());
        if num_users == 0 || num_items == 0 {
            return Err(ConstructionError::EmptyRatings { num_users, num_items });
        }

        let user_latent = types::random_matrix(num_users, latent_dim, rng);
        let item_latent = types::random_matrix(num_items, latent_dim, rng);

        Ok(SparseFactorizer { user_latent, item_latent, ratings, test_entries: None, steps_taken: 0 })
    }

    /// Evaluates against the held-out ratings of `index`.
    pub fn with_test_entries(mut self, index: &RatingIndex) -> Self {
        self.test_entries = Some(index.test_entries());
        self
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

    pub fn into_latents(self) -> (LatentMatrix, LatentMatrix) {
        (self.user_latent, self.item_latent)
    }

    /// Predicted rating for a single cell.
    pub fn predict(&self, user_index: usize, item_index: usize) -> std::result::Result<f64, ShapeError> {
        types::check_inner_dims("predict", &self.user_latent, &self.item_latent)?;

        if user_index >= self.user_latent.nrows() || item_index >= self.item_latent.nrows() {
            return Err(ShapeError::new(
                "predict",
                (user_index + 1, item_index + 1),
                (self.user_latent.nrows(), self.item_latent.nrows()),
            ));
        }

        Ok(self.user_latent.row(user_index).dot(&self.item_latent.row(item_index)))
    }

    pub fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        types::check_inner_dims("loss", &self.user_latent, &self.item_latent)?;

        let mut squared_error = 0.0;

        for (user_index, row) in self.ratings.rows.iter().enumerate() {
            let user_vector = self.user_latent.row(user_index);
            for (item_index, rating) in row.iter() {
                let error = user_vector.dot(&self.item_latent.row(*item_index)) - rating;
                squared_error += error * error;
            }
        }

        let total = 0.5 * squared_error
            + regularization * types::squared_norm(&self.user_latent) / 2.0
            + regularization * types::squared_norm(&self.item_latent) / 2.0;

        let num_cells = self.ratings.num_users() * self.ratings.num_items();
        let per_cell = total / num_cells as f64;

        Ok(LossReport { total, per_cell, test_rmse: self.test_rmse() })
    }

    fn test_rmse(&self) -> Option<f64> {
        let test_entries = self.test_entries.as_ref()?;

        if test_entries.is_empty() {
            return None;
        }

        let squared_error: f64 = test_entries.iter()
            .map(|&(user_index, item_index, rating)| {
                let prediction = self.user_latent.row(user_index).dot(&self.item_latent.row(item_index));
                (prediction - rating) * (prediction - rating)
            })
            .sum();

        Some((squared_error / test_entries.len() as f64).sqrt())
    }

    pub fn gradients(&self, regularization: f64)
        -> std::result::Result<(Array2<f64>, Array2<f64>), ShapeError> {

        types::check_inner_dims("gradients", &self.user_latent, &self.item_latent)?;

        let mut user_gradient = &self.user_latent * regularization;
        let mut item_gradient = &self.item_latent * regularization;

        for (user_index, row) in self.ratings.rows.iter().enumerate() {
            let user_vector = self.user_latent.row(user_index);

            for (item_index, rating) in row.iter() {
                let item_vector = self.item_latent.row(*item_index);
                let error = user_vector.dot(&item_vector) - rating;

                user_gradient.row_mut(user_index).scaled_add(error, &item_vector);
                item_gradient.row_mut(*item_index).scaled_add(error, &user_vector);
            }
        }

        Ok((user_gradient, item_gradient))
    }

    pub fn train<R: Reporter + ?Sized>(&mut self, config: &TrainingConfig, reporter: &mut R)
        -> Result<LossReport> {
        training::train(self, config, reporter)
    }
}

impl<'a> GradientDescent for SparseFactorizer<'a> {

    fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
        SparseFactorizer::loss(self, regularization)
    }

    fn descend(&mut self, regularization: f64, learning_rate: f64)
        -> std::result::Result<(), ShapeError> {

        let (user_gradient, item_gradient) = self.gradients(regularization)?;

        self.user_latent.scaled_add(-learning_rate, &user_gradient);
        self.item_latent.scaled_add(-learning_rate, &item_gradient);
        self.steps_taken += 1;

        Ok(())
    }
}
