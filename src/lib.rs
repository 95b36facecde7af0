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

extern crate csv;
extern crate fnv;
extern crate ndarray;
extern crate rand;
extern crate scoped_pool;
extern crate serde;
extern crate serde_derive;
extern crate serde_json;
extern crate thiserror;
extern crate tracing;

use std::sync::Mutex;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use scoped_pool::Pool;
use tracing::info;

pub mod approximator;
pub mod error;
pub mod factorizer;
pub mod index;
pub mod io;
pub mod matrix;
pub mod recommend;
pub mod sparse;
pub mod stats;
pub mod training;
pub mod types;
pub mod utils;
mod usage_tests;

pub use approximator::UserApproximator;
pub use error::{ConfigError, ConstructionError, DataError, Error, Result, ShapeError};
pub use factorizer::{Factorizer, FactorizerBuilder};
pub use index::{IndexConfig, RatingIndex};
pub use matrix::RatingMatrix;
pub use sparse::{SparseFactorizer, SparseRatings};
pub use training::{EpochReport, LogReporter, LossReport, Reporter, TrainingConfig};
pub use types::{LatentMatrix, RatingObservation};

/// Which factorizer implementation to train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Representation {
    /// Full users x items matrices, fast for small data
    Dense,
    /// Observed ratings only
    Sparse,
}

/// Outcome of training one latent dimension.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub latent_dim: usize,
    pub user_latent: LatentMatrix,
    pub item_latent: LatentMatrix,
    pub final_loss: LossReport,
    pub duration_millis: u64,
}

/// Trains one factorizer per entry of `latent_dims` on a thread pool of `pool_size` threads. All
/// of them read the same rating index, while each owns its latent matrices and its random number
/// generator, seeded with `seed`. Results are returned in the order of `latent_dims`.
pub fn train_latent_dims(
    index: &RatingIndex,
    latent_dims: &[usize],
    config: &TrainingConfig,
    representation: Representation,
    seed: u64,
    pool_size: usize,
) -> Vec<Result<TrainedModel>> {

    let pool = Pool::new(pool_size);

    let sparse_ratings = match representation {
        Representation::Sparse => Some(SparseRatings::from_matrix(index.rating_matrix())),
        Representation::Dense => None,
    };

    let results: Vec<Mutex<Option<Result<TrainedModel>>>> =
        latent_dims.iter().map(|_| Mutex::new(None)).collect();

    pool.scoped(|scope| {
        for (latent_dim, result) in latent_dims.iter().zip(results.iter()) {

            let sparse_ratings = sparse_ratings.as_ref();

            scope.execute(move || {
                let trained = train_latent_dim(index, sparse_ratings, *latent_dim, config, seed);

                if let Ok(mut slot) = result.lock() {
                    *slot = Some(trained);
                }
            });
        }
    });

    pool.shutdown();

    results.into_iter()
        .filter_map(|slot| slot.into_inner().ok().and_then(|trained| trained))
        .collect()
}

fn train_latent_dim(
    index: &RatingIndex,
    sparse_ratings: Option<&SparseRatings>,
    latent_dim: usize,
    config: &TrainingConfig,
    seed: u64,
) -> Result<TrainedModel> {

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut reporter = LogReporter::new(&format!("k={}", latent_dim));

    let (final_loss, (user_latent, item_latent)) = match sparse_ratings {
        Some(ratings) => {
            let mut factorizer = SparseFactorizer::new(latent_dim, ratings, &mut rng)?
                .with_test_entries(index);
            let final_loss = factorizer.train(config, &mut reporter)?;
            (final_loss, factorizer.into_latents())
        },
        None => {
            let mut factorizer = FactorizerBuilder::new(latent_dim)
                .rating_index(index)
                .build(&mut rng)?;
            let final_loss = factorizer.train(config, &mut reporter)?;
            (final_loss, factorizer.into_latents())
        },
    };

    let duration_millis = utils::to_millis(start.elapsed());
    info!("k={}: {}ms training time, final loss {:.4}", latent_dim, duration_millis, final_loss.total);

    Ok(TrainedModel { latent_dim, user_latent, item_latent, final_loss, duration_millis })
}

/// Picks the model with the lowest held-out RMSE, or the lowest loss per cell if none of them
/// could be evaluated.
pub fn best_model(models: &[TrainedModel]) -> Option<&TrainedModel> {
    let all_evaluated = models.iter().all(|model| model.final_loss.test_rmse.is_some());

    let score = |model: &TrainedModel| {
        if all_evaluated {
            model.final_loss.test_rmse.unwrap_or(std::f64::INFINITY)
        } else {
            model.final_loss.per_cell
        }
    };

    models.iter().fold(None, |best: Option<&TrainedModel>, model| {
        match best {
            Some(current) if score(current) <= score(model) => Some(current),
            _ => Some(model),
        }
    })
}
