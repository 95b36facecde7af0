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

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::io::stdout;
use std::path::Path;

use fnv::FnvHashMap;
use ndarray::ArrayView2;
use serde_derive::Serialize;

use crate::error::{DataError, Result};
use crate::stats::{IndexMap, ItemPopularity, LoadSummary};
use crate::index::IndexConfig;
use crate::training::{LossReport, TrainingConfig};
use crate::types::RatingObservation;

/// Reads a CSV input file with the given delimiter. Records may have varying lengths, extra
/// columns such as timestamps are ignored by the parsers below.
pub fn csv_reader(file: &str, delimiter: u8, has_headers: bool) -> Result<csv::Reader<File>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(file)?;

    Ok(reader)
}

fn field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    position: usize,
    name: &'static str,
    line: u64,
) -> std::result::Result<T, DataError> {

    let value = record.get(position)
        .ok_or(DataError::MissingFields { line, expected: position + 1, found: record.len() })?;

    value.trim().parse::<T>()
        .map_err(|_| DataError::InvalidField { line, field: name, value: value.to_string() })
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map(|position| position.line()).unwrap_or(0)
}

/// Parses (user ID, item ID, rating) rows. Rows that cannot be parsed are handed out as errors so
/// that the caller can skip and count them.
pub fn ratings_from_csv<'a, R>(
    reader: &'a mut csv::Reader<R>
) -> impl Iterator<Item = std::result::Result<RatingObservation, DataError>> + 'a
    where R: std::io::Read {

    reader.records()
        .enumerate()
        .map(|(row, result)| -> std::result::Result<RatingObservation, DataError> {
            let record = result.map_err(|_| DataError::Unreadable { line: row as u64 + 1 })?;
            let line = line_of(&record);

            let user = field(&record, 0, "user", line)?;
            let item = field(&record, 1, "item", line)?;
            let rating = field(&record, 2, "rating", line)?;

            Ok(RatingObservation::new(user, item, rating))
        })
}

/// Parses (item ID, title) rows of the item metadata file.
pub fn items_from_csv<'a, R>(
    reader: &'a mut csv::Reader<R>
) -> impl Iterator<Item = std::result::Result<(u32, String), DataError>> + 'a
    where R: std::io::Read {

    reader.records()
        .enumerate()
        .map(|(row, result)| -> std::result::Result<(u32, String), DataError> {
            let record = result.map_err(|_| DataError::Unreadable { line: row as u64 + 1 })?;
            let line = line_of(&record);

            let item: u32 = field(&record, 0, "item", line)?;
            let title = record.get(1).unwrap_or("").trim().to_string();

            Ok((item, title))
        })
}

fn output(path: Option<&str>) -> io::Result<Box<dyn Write>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(File::create(&Path::new(path))?),
        _ => Box::new(stdout())
    };
    Ok(out)
}

/// Writes one row per item: the item ID followed by its latent vector. If a `features_path` is
/// supplied, we write to a file at the specified path, otherwise, we output to stdout.
pub fn write_features(
    item_latent: ArrayView2<f64>,
    items: &IndexMap,
    features_path: Option<&str>,
) -> Result<()> {

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output(features_path)?);

    for (item_index, item) in items.iter() {
        let mut record = Vec::with_capacity(item_latent.ncols() + 1);
        record.push(item.to_string());
        record.extend(item_latent.row(item_index).iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Reads item latent vectors as written by `write_features`. Rows with an unparsable ID, an
/// unparsable value or a different number of values than the first well-formed row are skipped.
pub fn read_features<R: std::io::Read>(
    reader: &mut csv::Reader<R>
) -> (FnvHashMap<u32, Vec<f64>>, u64) {

    let mut features: FnvHashMap<u32, Vec<f64>> =
        FnvHashMap::with_capacity_and_hasher(1000, Default::default());
    let mut num_skipped = 0;
    let mut latent_dim: Option<usize> = None;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(_) => {
                num_skipped += 1;
                continue;
            }
        };

        let item = match field::<u32>(&record, 0, "item", line_of(&record)) {
            Ok(item) => item,
            Err(_) => {
                num_skipped += 1;
                continue;
            }
        };

        let values: Option<Vec<f64>> = record.iter()
            .skip(1)
            .map(|value| value.trim().parse::<f64>().ok())
            .collect();

        let values = match values {
            Some(values) => values,
            None => {
                num_skipped += 1;
                continue;
            }
        };

        if values.is_empty() || *latent_dim.get_or_insert(values.len()) != values.len() {
            num_skipped += 1;
            continue;
        }

        features.insert(item, values);
    }

    (features, num_skipped)
}

#[derive(Serialize)]
struct PopularityRow {
    item: u32,
    count: u64,
    average: f64,
}

/// Writes the item ID, the number of ratings and the average rating per item.
pub fn write_popularity(
    popularity: &ItemPopularity,
    items: &IndexMap,
    popularity_path: Option<&str>,
) -> Result<()> {

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output(popularity_path)?);

    for (item_index, stats) in popularity.iter() {
        if let Some(item) = items.id(item_index) {
            writer.serialize(PopularityRow { item, count: stats.count, average: stats.average })?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Struct used for JSON serialization of a training run. Field names will be used in JSON.
#[derive(Serialize, Debug, Clone)]
pub struct TrainingSummary {
    pub latent_dim: usize,
    pub sparse: bool,
    pub index: IndexConfig,
    pub training: TrainingConfig,
    pub data: LoadSummary,
    pub final_loss: LossReport,
    pub duration_millis: u64,
}

/// Outputs one JSON line per summary.
pub fn write_summaries(summaries: &[TrainingSummary], summary_path: Option<&str>) -> Result<()> {
    let mut out = output(summary_path)?;

    for summary in summaries {
        let summary_as_json = serde_json::to_string(summary)?;
        writeln!(out, "{}", summary_as_json)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {

    use ndarray::arr2;

    use super::*;

    fn reader_for(data: &'static str) -> csv::Reader<&'static [u8]> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data.as_bytes())
    }

    #[test]
    fn rating_rows_with_malformed_entries() {
        let mut reader = reader_for("1,31,2.5,1260759144\n1,abc,3.0\n2,10\n7,31,4\n");
        let rows: Vec<_> = ratings_from_csv(&mut reader).collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], Ok(RatingObservation::new(1, 31, 2.5)));
        assert!(match rows[1] { Err(DataError::InvalidField { field: "item", .. }) => true, _ => false });
        assert!(match rows[2] { Err(DataError::MissingFields { .. }) => true, _ => false });
        assert_eq!(rows[3], Ok(RatingObservation::new(7, 31, 4.0)));
    }

    #[test]
    fn item_rows() {
        let mut reader = reader_for("31,Dangerous Minds (1995)\nx,Broken\n10,\"GoldenEye (1995)\"\n");
        let rows: Vec<_> = items_from_csv(&mut reader).collect();

        assert_eq!(rows[0], Ok((31, "Dangerous Minds (1995)".to_string())));
        assert!(rows[1].is_err());
        assert_eq!(rows[2], Ok((10, "GoldenEye (1995)".to_string())));
    }

    #[test]
    fn features_skip_inconsistent_rows() {
        let mut reader = reader_for("1,0.5,0.25\n2,0.1\n3,oops,1.0\nfoo,1.0,2.0\n4,1.5,-2.0\n");
        let (features, num_skipped) = read_features(&mut reader);

        assert_eq!(num_skipped, 3);
        assert_eq!(features.len(), 2);
        assert_eq!(features[&1], vec![0.5, 0.25]);
        assert_eq!(features[&4], vec![1.5, -2.0]);
    }

    #[test]
    fn features_take_their_width_from_the_first_well_formed_row() {
        let mut reader = reader_for("1,0.5\n2,0.1,0.2,0.3\n3,0.4,0.5,0.6\n4,0.7,0.8,0.9\n");
        let (features, num_skipped) = read_features(&mut reader);

        assert_eq!(num_skipped, 1);
        assert_eq!(features.len(), 3);
        assert!(!features.contains_key(&1));
        assert_eq!(features[&3], vec![0.4, 0.5, 0.6]);
    }

    #[test]
    fn features_skip_unparsable_first_row() {
        let mut reader = reader_for("1,0.5,oops\n2,0.1,0.2\n");
        let (features, num_skipped) = read_features(&mut reader);

        assert_eq!(num_skipped, 1);
        assert_eq!(features[&2], vec![0.1, 0.2]);
    }

    #[test]
    fn features_survive_a_write_and_read() {
        let item_latent = arr2(&[[0.5, -1.25], [3.0, 0.125]]);
        let mut items = IndexMap::new();
        items.index_or_insert(20);
        items.index_or_insert(10);

        let path = std::env::temp_dir().join(format!("lowrank-features-{}.csv", std::process::id()));
        let path = path.to_str().unwrap().to_string();

        write_features(item_latent.view(), &items, Some(&path)).unwrap();

        let mut reader = csv_reader(&path, b',', false).unwrap();
        let (features, num_skipped) = read_features(&mut reader);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(num_skipped, 0);
        assert_eq!(features[&20], vec![0.5, -1.25]);
        assert_eq!(features[&10], vec![3.0, 0.125]);
    }
}
