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

extern crate fnv;
extern crate getopts;
extern crate lowrank;
extern crate rand;

use std::env;
use std::error::Error;

use fnv::{FnvHashMap, FnvHashSet};
use getopts::{Matches, Options};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use lowrank::io;
use lowrank::recommend;
use lowrank::stats::IndexMap;
use lowrank::{LatentMatrix, LogReporter, TrainingConfig, UserApproximator};

fn main() {

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("f", "features", "Item features file name (required), as written by \
        lowrank-train.", "PATH");
    opts.optopt("r", "ratings", "Ratings file name (required). The input consists of a user ID, \
        an item ID and a rating per line, only the ratings of the chosen user are used.", "PATH");
    opts.optopt("u", "user", "ID of the user to recommend for (required).", "NUMBER");
    opts.optopt("m", "items", "Item metadata file name (optional), used to print titles.", "PATH");
    opts.optopt("n", "num-items", "Number of items to recommend (optional, defaults to 10).",
        "NUMBER");
    opts.optopt("", "steps", "Number of gradient descent steps (optional, defaults to 100).",
        "NUMBER");
    opts.optopt("", "epoch-size", "Report the loss every that many steps (optional, defaults \
        to 10).", "NUMBER");
    opts.optopt("", "regularization", "Regularization strength (optional, defaults to 0.03).",
        "NUMBER");
    opts.optopt("", "learning-rate", "Learning rate (optional, defaults to 0.00001).", "NUMBER");
    opts.optopt("", "seed", "Seed for the initialization (optional, defaults to 0).", "NUMBER");
    opts.optopt("d", "delimiter", "Field delimiter of the ratings and item files (optional, \
        defaults to ',', use 'tab' for tab-separated files).", "CHAR");
    opts.optflag("", "headers", "The ratings and item files start with a header row");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let missing = [
        ("f", "Please specify an item features file via --features."),
        ("r", "Please specify a ratings file via --ratings."),
        ("u", "Please specify a user via --user."),
    ].iter().find(|&&(name, _)| !matches.opt_present(name)).map(|&(_, hint)| hint);

    if let Some(hint) = missing {
        return print_usage_and_exit(&program, opts, Some(hint));
    }

    let settings = match Settings::from(&matches) {
        Ok(settings) => settings,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    if let Err(failure) = recommend_for_user(&matches, &settings) {
        eprintln!("\n{}\n", failure);
        std::process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) -> ! {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    std::process::exit(if hint.is_some() { 1 } else { 0 });
}

struct Settings {
    user: u32,
    num_items: usize,
    training: TrainingConfig,
    seed: u64,
    delimiter: u8,
    has_headers: bool,
}

impl Settings {

    fn from(matches: &Matches) -> Result<Self, String> {

        let defaults = TrainingConfig::default();

        let training = TrainingConfig {
            steps: option(matches, "steps", defaults.steps)?,
            epoch_size: option(matches, "epoch-size", defaults.epoch_size)?,
            regularization: option(matches, "regularization", defaults.regularization)?,
            learning_rate: option(matches, "learning-rate", defaults.learning_rate)?,
        };

        training.validate().map_err(|failure| failure.to_string())?;

        let delimiter = match matches.opt_str("d").as_ref().map(|value| value.as_str()) {
            None => b',',
            Some("tab") | Some("\\t") => b'\t',
            Some(value) if value.len() == 1 => value.as_bytes()[0],
            Some(value) => return Err(format!("Cannot use '{}' as delimiter.", value)),
        };

        Ok(Settings {
            user: option(matches, "u", 0)?,
            num_items: option(matches, "n", 10)?,
            training,
            seed: option(matches, "seed", 0)?,
            delimiter,
            has_headers: matches.opt_present("headers"),
        })
    }
}

fn option<T>(matches: &Matches, name: &str, default: T) -> Result<T, String>
    where T: std::str::FromStr, T::Err: std::fmt::Display {

    matches.opt_get_default(name, default)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure))
}

/// Stacks the feature rows into a latent matrix. Items are indexed in ascending ID order.
fn item_latent_from(features: FnvHashMap<u32, Vec<f64>>) -> Result<(IndexMap, LatentMatrix), Box<dyn Error>> {

    let mut item_ids: Vec<u32> = features.keys().cloned().collect();
    item_ids.sort();

    let latent_dim = features.values().next().map(|values| values.len()).unwrap_or(0);

    let mut items = IndexMap::new();
    let mut values = Vec::with_capacity(item_ids.len() * latent_dim);

    for item in item_ids {
        items.index_or_insert(item);
        values.extend_from_slice(&features[&item]);
    }

    let item_latent = LatentMatrix::from_shape_vec((items.len(), latent_dim), values)?;

    Ok((items, item_latent))
}

fn recommend_for_user(matches: &Matches, settings: &Settings) -> Result<(), Box<dyn Error>> {

    let features_path = matches.opt_str("f").ok_or("Missing features file.")?;
    let ratings_path = matches.opt_str("r").ok_or("Missing ratings file.")?;

    info!("Reading item features from {}", features_path);

    let mut features_reader = io::csv_reader(&features_path, b',', false)?;
    let (features, num_skipped) = io::read_features(&mut features_reader);

    if num_skipped > 0 {
        warn!("Skipped {} malformed feature rows", num_skipped);
    }

    let (items, item_latent) = item_latent_from(features)?;

    info!("Found {} items with {} latent dimensions", items.len(), item_latent.ncols());

    let mut ratings_reader = io::csv_reader(&ratings_path, settings.delimiter, settings.has_headers)?;

    let mut ratings_by_item: FnvHashMap<u32, f64> = FnvHashMap::default();
    for observation in io::ratings_from_csv(&mut ratings_reader).filter_map(|row| row.ok()) {
        if observation.user == settings.user && observation.rating.is_finite() {
            ratings_by_item.insert(observation.item, observation.rating);
        }
    }

    let rated: FnvHashSet<usize> = ratings_by_item.keys()
        .filter_map(|item| items.index(*item))
        .collect();

    info!(
        "User {} rated {} items, {} of them have features",
        settings.user,
        ratings_by_item.len(),
        rated.len(),
    );

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let approximator = UserApproximator::from_rated_items(&item_latent, &items, &ratings_by_item, &mut rng)?;

    let mut reporter = LogReporter::new(&format!("user {}", settings.user));
    let user_latent = approximator.approximate(&settings.training, &mut reporter)?;

    let recommended = recommend::recommend(user_latent.view(), &item_latent, &rated, settings.num_items)?;

    let mut titles: FnvHashMap<u32, String> = FnvHashMap::default();
    if let Some(items_path) = matches.opt_str("m") {
        let mut items_reader = io::csv_reader(&items_path, settings.delimiter, settings.has_headers)?;
        titles.extend(io::items_from_csv(&mut items_reader).filter_map(|row| row.ok()));
    }

    for scored_item in recommended {
        if let Some(item) = items.id(scored_item.item) {
            let title = titles.get(&item).map(|title| title.as_str()).unwrap_or("");
            println!("{}\t{:.4}\t{}", item, scored_item.score, title);
        }
    }

    Ok(())
}
