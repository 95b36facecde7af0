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

extern crate getopts;
extern crate lowrank;
extern crate num_cpus;

use std::env;
use std::error::Error;

use getopts::{Matches, Options};
use tracing::{info, warn};

use lowrank::io;
use lowrank::io::TrainingSummary;
use lowrank::{DataError, IndexConfig, RatingIndex, Representation, TrainingConfig};

fn main() {

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("r", "ratings", "Ratings file name (required). The input consists of a user ID, \
        an item ID and a rating per line, further columns are ignored.", "PATH");
    opts.optopt("m", "items", "Item metadata file name (optional), with an item ID and a title \
        per line.", "PATH");
    opts.optopt("f", "features", "Output file for the learned item latent vectors (optional, \
        output will be written to stdout by default).", "PATH");
    opts.optopt("p", "popularity", "Output file for per-item rating counts and averages \
        (optional).", "PATH");
    opts.optopt("j", "summary", "Output file for a JSON summary per trained model \
        (optional).", "PATH");
    opts.optopt("k", "latent-dims", "Comma-separated latent dimensions to train, in parallel \
        (optional, defaults to 10). The features of the model with the lowest held-out RMSE \
        are written.", "LIST");
    opts.optopt("", "steps", "Number of gradient descent steps (optional, defaults to 100).",
        "NUMBER");
    opts.optopt("", "epoch-size", "Report the loss every that many steps (optional, defaults \
        to 10).", "NUMBER");
    opts.optopt("", "regularization", "Regularization strength (optional, defaults to 0.03).",
        "NUMBER");
    opts.optopt("", "learning-rate", "Learning rate (optional, defaults to 0.00001).", "NUMBER");
    opts.optopt("", "test-ratio", "Fraction of ratings held out for evaluation (optional, \
        defaults to 0.1).", "NUMBER");
    opts.optopt("", "seed", "Seed for the train/test split and the initialization (optional, \
        defaults to 0).", "NUMBER");
    opts.optopt("d", "delimiter", "Field delimiter of the input files (optional, defaults to \
        ',', use 'tab' for tab-separated files).", "CHAR");
    opts.optflag("", "headers", "The input files start with a header row");
    opts.optflag("", "sparse", "Train on the observed ratings only instead of dense matrices");
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

    let ratings_path = match matches.opt_str("r") {
        Some(path) => path,
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify a ratings file via --ratings."),
        ),
    };

    let settings = match Settings::from(&matches) {
        Ok(settings) => settings,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    if let Err(failure) = train(&ratings_path, &matches, &settings) {
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
    latent_dims: Vec<usize>,
    training: TrainingConfig,
    index: IndexConfig,
    delimiter: u8,
    has_headers: bool,
    representation: Representation,
}

impl Settings {

    fn from(matches: &Matches) -> Result<Self, String> {

        let defaults = TrainingConfig::default();

        let latent_dims = match matches.opt_str("k") {
            Some(list) => lowrank::utils::parse_list::<usize>(&list)
                .map_err(|failure| format!("Problem with option 'k': {}", failure))?,
            None => vec![10],
        };

        if latent_dims.is_empty() {
            return Err("Please specify at least one latent dimension via --latent-dims.".to_string());
        }

        let training = TrainingConfig {
            steps: option(matches, "steps", defaults.steps)?,
            epoch_size: option(matches, "epoch-size", defaults.epoch_size)?,
            regularization: option(matches, "regularization", defaults.regularization)?,
            learning_rate: option(matches, "learning-rate", defaults.learning_rate)?,
        };

        let index = IndexConfig {
            test_ratio: option(matches, "test-ratio", IndexConfig::default().test_ratio)?,
            seed: option(matches, "seed", 0)?,
        };

        training.validate().map_err(|failure| failure.to_string())?;
        index.validate().map_err(|failure| failure.to_string())?;

        let delimiter = match matches.opt_str("d").as_ref().map(|value| value.as_str()) {
            None => b',',
            Some("tab") | Some("\\t") => b'\t',
            Some(value) if value.len() == 1 => value.as_bytes()[0],
            Some(value) => return Err(format!("Cannot use '{}' as delimiter.", value)),
        };

        let representation = if matches.opt_present("sparse") {
            Representation::Sparse
        } else {
            Representation::Dense
        };

        Ok(Settings {
            latent_dims,
            training,
            index,
            delimiter,
            has_headers: matches.opt_present("headers"),
            representation,
        })
    }
}

fn option<T>(matches: &Matches, name: &str, default: T) -> Result<T, String>
    where T: std::str::FromStr, T::Err: std::fmt::Display {

    matches.opt_get_default(name, default)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure))
}

fn train(
    ratings_path: &str,
    matches: &Matches,
    settings: &Settings,
) -> Result<(), Box<dyn Error>> {

    info!("Reading {} to build the rating index", ratings_path);

    let mut ratings_reader = io::csv_reader(ratings_path, settings.delimiter, settings.has_headers)?;
    let rating_rows = io::ratings_from_csv(&mut ratings_reader);

    let index = match matches.opt_str("m") {
        Some(items_path) => {
            info!("Reading item metadata from {}", items_path);
            let mut items_reader = io::csv_reader(&items_path, settings.delimiter, settings.has_headers)?;
            RatingIndex::build(rating_rows, io::items_from_csv(&mut items_reader), &settings.index)?
        },
        None => {
            let no_items = std::iter::empty::<Result<(u32, String), DataError>>();
            RatingIndex::build(rating_rows, no_items, &settings.index)?
        },
    };

    info!(
        "Training latent dimensions {:?} for {} steps on {} threads",
        settings.latent_dims,
        settings.training.steps,
        num_cpus::get(),
    );

    let results = lowrank::train_latent_dims(
        &index,
        &settings.latent_dims,
        &settings.training,
        settings.representation,
        settings.index.seed,
        num_cpus::get(),
    );

    let mut models = Vec::with_capacity(results.len());
    for (latent_dim, result) in settings.latent_dims.iter().zip(results) {
        match result {
            Ok(model) => models.push(model),
            Err(failure) => warn!("Training with k={} failed: {}", latent_dim, failure),
        }
    }

    let best = lowrank::best_model(&models).ok_or("No model could be trained.")?;

    info!("Writing item features of the model with k={}", best.latent_dim);
    io::write_features(best.item_latent.view(), index.items(), matches.opt_str("f").as_ref().map(|path| path.as_str()))?;

    if let Some(popularity_path) = matches.opt_str("p") {
        info!("Writing item popularity to {}", popularity_path);
        io::write_popularity(index.popularity(), index.items(), Some(&popularity_path))?;
    }

    if let Some(summary_path) = matches.opt_str("j") {
        let summaries: Vec<TrainingSummary> = models.iter()
            .map(|model| TrainingSummary {
                latent_dim: model.latent_dim,
                sparse: settings.representation == Representation::Sparse,
                index: settings.index,
                training: settings.training,
                data: *index.summary(),
                final_loss: model.final_loss,
                duration_millis: model.duration_millis,
            })
            .collect();

        info!("Writing training summaries to {}", summary_path);
        io::write_summaries(&summaries, Some(&summary_path))?;
    }

    Ok(())
}
