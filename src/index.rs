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

use std::fmt::Display;
use std::iter;

use fnv::FnvHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_derive::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, DataError, Result};
use crate::matrix::RatingMatrix;
use crate::stats::{IndexMap, ItemPopularity, LoadSummary};
use crate::types::{self, RatingObservation, TestEntry, TestRatingMap};

/// Controls how observations are split between the training matrix and the held-out test map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexConfig {
    /// Probability with which a single observation is held out for evaluation.
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig { test_ratio: 0.1, seed: 0 }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.test_ratio >= 0.0 && self.test_ratio <= 1.0) {
            return Err(ConfigError::InvalidTestRatio(self.test_ratio));
        }
        Ok(())
    }
}

/// Dense coordinates for raw ratings: ID mappings for users and items, the training matrix, the
/// held-out ratings and per-item popularity. Read-only once built, so several factorizers can
/// share one index across threads.
#[derive(Debug, Clone)]
pub struct RatingIndex {
    users: IndexMap,
    items: IndexMap,
    ratings: RatingMatrix,
    test_ratings: TestRatingMap,
    popularity: ItemPopularity,
    item_metadata: FnvHashMap<u32, String>,
    summary: LoadSummary,
}

impl RatingIndex {

    /// Builds the index from rating rows and item metadata rows. Malformed rows of either kind are
    /// skipped and counted in the `LoadSummary`, they never abort the build. Only users and items
    /// that occur in well-formed rating rows receive an index.
    pub fn build<R, M, E>(rating_rows: R, item_rows: M, config: &IndexConfig) -> Result<Self>
        where R: IntoIterator<Item = std::result::Result<RatingObservation, E>>,
              M: IntoIterator<Item = std::result::Result<(u32, String), E>>,
              E: Display {

        config.validate()?;

        let mut summary = LoadSummary::default();

        let mut users = IndexMap::new();
        let mut items = IndexMap::new();
        let mut popularity = ItemPopularity::new();

        // Deduplicated (user, item, rating) cells in first-encounter order, the last rating wins
        let mut cells: Vec<(usize, usize, f64)> = Vec::new();
        let mut cell_positions: FnvHashMap<(usize, usize), usize> =
            FnvHashMap::with_capacity_and_hasher(100, Default::default());

        for row in rating_rows {
            summary.num_rows += 1;

            let observation = match row {
                Ok(observation) => observation,
                Err(problem) => {
                    debug!("Skipping rating row: {}", problem);
                    summary.num_malformed += 1;
                    continue;
                }
            };

            if !observation.rating.is_finite() {
                debug!("Skipping rating row: {}", DataError::NonFiniteRating {
                    user: observation.user,
                    item: observation.item,
                    rating: observation.rating,
                });
                summary.num_malformed += 1;
                continue;
            }

            let user_index = users.index_or_insert(observation.user);
            let item_index = items.index_or_insert(observation.item);

            popularity.record(item_index, observation.rating);

            let next_position = cells.len();
            let position = *cell_positions.entry((user_index, item_index)).or_insert(next_position);

            if position == next_position {
                cells.push((user_index, item_index, observation.rating));
            } else {
                cells[position].2 = observation.rating;
                summary.num_duplicates += 1;
            }
        }

        let mut cells_per_user: Vec<Vec<usize>> = vec![Vec::new(); users.len()];
        for (position, &(user_index, _, _)) in cells.iter().enumerate() {
            cells_per_user[user_index].push(position);
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut training: Vec<(usize, usize, f64)> = Vec::with_capacity(cells.len());
        let mut test_ratings = types::new_test_rating_map();

        for positions in cells_per_user.iter() {
            let mut held_out: Vec<bool> = positions.iter()
                .map(|_| rng.gen::<f64>() < config.test_ratio)
                .collect();

            // Every user keeps at least one rating for training
            if held_out.iter().all(|is_held_out| *is_held_out) {
                if let Some(first) = held_out.first_mut() {
                    *first = false;
                }
            }

            for (&position, is_held_out) in positions.iter().zip(held_out) {
                let (user_index, item_index, rating) = cells[position];

                if is_held_out {
                    if let (Some(user), Some(item)) = (users.id(user_index), items.id(item_index)) {
                        test_ratings
                            .entry(user)
                            .or_insert_with(|| FnvHashMap::with_capacity_and_hasher(10, Default::default()))
                            .insert(item, rating);
                        summary.num_test += 1;
                    }
                } else {
                    training.push((user_index, item_index, rating));
                    summary.num_training += 1;
                }
            }
        }

        let ratings = RatingMatrix::from_entries(users.len(), items.len(), training)?;

        let mut item_metadata: FnvHashMap<u32, String> =
            FnvHashMap::with_capacity_and_hasher(items.len(), Default::default());

        for row in item_rows {
            match row {
                Ok((item, title)) => {
                    item_metadata.insert(item, title);
                }
                Err(problem) => {
                    debug!("Skipping item row: {}", problem);
                    summary.num_malformed += 1;
                }
            }
        }

        summary.num_users = users.len();
        summary.num_items = items.len();
        summary.num_items_with_metadata = items.iter()
            .filter(|(_, item)| item_metadata.contains_key(item))
            .count();

        info!(
            "Found {} ratings ({} for training, {} held out) between {} users and {} items.",
            summary.num_training + summary.num_test,
            summary.num_training,
            summary.num_test,
            summary.num_users,
            summary.num_items,
        );

        if summary.num_malformed > 0 {
            warn!("Skipped {} malformed rows.", summary.num_malformed);
        }

        Ok(RatingIndex { users, items, ratings, test_ratings, popularity, item_metadata, summary })
    }

    /// Builds the index from in-memory observations without item metadata.
    pub fn from_observations<I>(observations: I, config: &IndexConfig) -> Result<Self>
        where I: IntoIterator<Item = RatingObservation> {

        let rating_rows = observations.into_iter().map(Ok);
        let item_rows = iter::empty::<std::result::Result<(u32, String), DataError>>();

        RatingIndex::build::<_, _, DataError>(rating_rows, item_rows, config)
    }

    pub fn users(&self) -> &IndexMap {
        &self.users
    }

    pub fn items(&self) -> &IndexMap {
        &self.items
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    pub fn rating_matrix(&self) -> &RatingMatrix {
        &self.ratings
    }

    pub fn test_ratings(&self) -> &TestRatingMap {
        &self.test_ratings
    }

    /// Held-out ratings translated into matrix coordinates.
    pub fn test_entries(&self) -> Vec<TestEntry> {
        let mut entries = Vec::with_capacity(self.summary.num_test as usize);

        for (user, ratings_of_user) in self.test_ratings.iter() {
            if let Some(user_index) = self.users.index(*user) {
                for (item, rating) in ratings_of_user.iter() {
                    if let Some(item_index) = self.items.index(*item) {
                        entries.push((user_index, item_index, *rating));
                    }
                }
            }
        }

        entries
    }

    pub fn popularity(&self) -> &ItemPopularity {
        &self.popularity
    }

    pub fn item_metadata(&self, item: u32) -> Option<&str> {
        self.item_metadata.get(&item).map(|title| title.as_str())
    }

    pub fn summary(&self) -> &LoadSummary {
        &self.summary
    }
}
