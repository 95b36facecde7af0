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

use ndarray::{Array1, Array2, Axis, Zip};

use crate::error::ShapeError;

/// Dense rating matrix with an explicit mask of observed cells. Missing cells never contribute
/// to the loss or its gradients, regardless of the value stored in them.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingMatrix {
    values: Array2<f64>,
    observed: Array2<bool>,
}

impl RatingMatrix {

    /// Treats zero as the missing sentinel, the rating scales we deal with are strictly positive.
    pub fn from_dense(values: Array2<f64>) -> Self {
        let observed = values.mapv(|value| value != 0.0);
        RatingMatrix { values, observed }
    }

    /// A single user's rating row, zero meaning unrated.
    pub fn from_row(values: Array1<f64>) -> Self {
        RatingMatrix::from_dense(values.insert_axis(Axis(0)))
    }

    /// Builds from explicitly observed cells, a rating of zero is a valid observation here. Later
    /// entries for the same cell overwrite earlier ones.
    pub fn from_entries<I>(num_rows: usize, num_cols: usize, entries: I) -> Result<Self, ShapeError>
        where I: IntoIterator<Item = (usize, usize, f64)> {

        let mut values = Array2::zeros((num_rows, num_cols));
        let mut observed = Array2::from_elem((num_rows, num_cols), false);

        for (row, col, rating) in entries {
            if row >= num_rows || col >= num_cols {
                return Err(ShapeError::new("rating entry", (row + 1, col + 1), (num_rows, num_cols)));
            }
            values[[row, col]] = rating;
            observed[[row, col]] = true;
        }

        Ok(RatingMatrix { values, observed })
    }

    pub fn with_mask(values: Array2<f64>, observed: Array2<bool>) -> Result<Self, ShapeError> {
        if values.dim() != observed.dim() {
            return Err(ShapeError::new("observed mask", values.dim(), observed.dim()));
        }
        Ok(RatingMatrix { values, observed })
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn observed(&self) -> &Array2<bool> {
        &self.observed
    }

    pub fn is_observed(&self, row: usize, col: usize) -> bool {
        self.observed.get((row, col)).cloned().unwrap_or(false)
    }

    pub fn num_observed(&self) -> usize {
        self.observed.iter().filter(|observed| **observed).count()
    }

    /// Iterates over observed cells as (row, column, rating).
    pub fn observed_entries<'a>(&'a self) -> impl Iterator<Item = (usize, usize, f64)> + 'a {
        self.values.indexed_iter()
            .filter(move |(position, _)| self.observed[*position])
            .map(|((row, col), rating)| (row, col, *rating))
    }

    /// `prediction - values`, with every unobserved cell zeroed out.
    pub fn masked_residuals(&self, prediction: &Array2<f64>) -> Result<Array2<f64>, ShapeError> {
        if prediction.dim() != self.values.dim() {
            return Err(ShapeError::new("subtract", prediction.dim(), self.values.dim()));
        }

        let mut residuals = prediction - &self.values;

        Zip::from(&mut residuals)
            .and(&self.observed)
            .for_each(|residual, &observed| {
                if !observed {
                    *residual = 0.0;
                }
            });

        Ok(residuals)
    }
}
