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

use std::io;

use thiserror::Error;

/// Problems detected while setting up a factorization, before any training happens.
#[derive(Debug, Error, PartialEq)]
pub enum ConstructionError {
    #[error("no rating source supplied, expected either a rating index or a rating matrix")]
    MissingRatings,

    #[error("both a rating index and a rating matrix were supplied, expected exactly one")]
    ConflictingRatings,

    #[error("the rating matrix is empty ({num_users} users x {num_items} items)")]
    EmptyRatings { num_users: usize, num_items: usize },

    #[error("latent dimension must be at least 1, got {0}")]
    InvalidLatentDimension(usize),

    #[error("latent dimensions disagree: user latent has {user}, item latent has {item}")]
    InnerDimensionMismatch { user: usize, item: usize },

    #[error("rating vector covers {ratings} items, but the item latent matrix has {items} rows")]
    ItemCountMismatch { ratings: usize, items: usize },
}

/// A matrix operation was invoked on operands with incompatible dimensions.
#[derive(Debug, Error, PartialEq)]
#[error("{operation}: incompatible shapes {left:?} and {right:?}")]
pub struct ShapeError {
    pub operation: &'static str,
    pub left: (usize, usize),
    pub right: (usize, usize),
}

impl ShapeError {
    pub fn new(operation: &'static str, left: (usize, usize), right: (usize, usize)) -> Self {
        ShapeError { operation, left, right }
    }
}

/// A single malformed input row. These are skipped and counted, never fatal.
#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("row {line}: expected at least {expected} fields, found {found}")]
    MissingFields { line: u64, expected: usize, found: usize },

    #[error("row {line}: cannot parse {field} from '{value}'")]
    InvalidField { line: u64, field: &'static str, value: String },

    #[error("row {line}: unreadable record")]
    Unreadable { line: u64 },

    #[error("rating {rating} for user {user} and item {item} is not a finite number")]
    NonFiniteRating { user: u32, item: u32, rating: f64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("epoch size must be at least 1")]
    ZeroEpochSize,

    #[error("regularization must be finite and non-negative, got {0}")]
    InvalidRegularization(f64),

    #[error("learning rate must be finite and positive, got {0}")]
    InvalidLearningRate(f64),

    #[error("test ratio must lie in [0, 1], got {0}")]
    InvalidTestRatio(f64),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read input: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot write output: {0}")]
    Io(#[from] io::Error),

    #[error("cannot serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
