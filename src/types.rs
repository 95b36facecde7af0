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
use ndarray::Array2;
use rand::Rng;

use crate::error::ShapeError;

pub type DenseMatrix = Array2<f64>;

/// One row per user or item, one column per latent dimension.
pub type LatentMatrix = Array2<f64>;

/// Held-out ratings, user ID -> item ID -> rating.
pub type TestRatingMap = FnvHashMap<u32, FnvHashMap<u32, f64>>;

/// A held-out rating in matrix coordinates.
pub type TestEntry = (usize, usize, f64);

/// A raw (user ID, item ID, rating) triple as it comes from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingObservation {
    pub user: u32,
    pub item: u32,
    pub rating: f64,
}

impl RatingObservation {
    pub fn new(user: u32, item: u32, rating: f64) -> Self {
        RatingObservation { user, item, rating }
    }
}

pub fn new_test_rating_map() -> TestRatingMap {
    FnvHashMap::with_capacity_and_hasher(0, Default::default())
}

/// Latent matrix with entries drawn independently and uniformly from [0, 1).
pub fn random_matrix<R: Rng + ?Sized>(num_rows: usize, num_cols: usize, rng: &mut R) -> LatentMatrix {
    Array2::from_shape_fn((num_rows, num_cols), |_| rng.gen::<f64>())
}

pub fn check_inner_dims(
    operation: &'static str,
    left: &Array2<f64>,
    right: &Array2<f64>,
) -> Result<(), ShapeError> {
    if left.ncols() != right.ncols() {
        return Err(ShapeError::new(operation, left.dim(), right.dim()));
    }
    Ok(())
}

pub fn squared_norm(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|value| value * value).sum()
}
