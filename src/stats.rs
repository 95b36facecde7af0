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
use serde_derive::Serialize;

/// Bijection between external IDs and consecutive matrix indices. Indices are handed out in the
/// order in which IDs are first encountered.
#[derive(Debug, Clone, Default)]
pub struct IndexMap {
    index_by_id: FnvHashMap<u32, usize>,
    id_by_index: Vec<u32>,
}

impl IndexMap {

    pub fn new() -> Self {
        IndexMap {
            index_by_id: FnvHashMap::with_capacity_and_hasher(100, Default::default()),
            id_by_index: Vec::with_capacity(100),
        }
    }

    /// Returns the index of `id`, assigning the next free one if we have not seen it yet.
    pub fn index_or_insert(&mut self, id: u32) -> usize {
        let next_index = self.id_by_index.len();
        let index = *self.index_by_id.entry(id).or_insert(next_index);

        if index == next_index {
            self.id_by_index.push(id);
        }

        index
    }

    pub fn index(&self, id: u32) -> Option<usize> {
        self.index_by_id.get(&id).cloned()
    }

    pub fn id(&self, index: usize) -> Option<u32> {
        self.id_by_index.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.id_by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_by_index.is_empty()
    }

    /// (index, id) pairs in index order
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (usize, u32)> + 'a {
        self.id_by_index.iter().cloned().enumerate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Popularity {
    pub count: u64,
    pub average: f64,
}

/// Running rating count and running average per item index. Reporting only, the factorization
/// never looks at it.
#[derive(Debug, Clone, Default)]
pub struct ItemPopularity {
    per_item: Vec<Popularity>,
}

impl ItemPopularity {

    pub fn new() -> Self {
        ItemPopularity { per_item: Vec::new() }
    }

    pub fn record(&mut self, item_index: usize, rating: f64) {
        if item_index >= self.per_item.len() {
            self.per_item.resize(item_index + 1, Popularity::default());
        }

        let stats = &mut self.per_item[item_index];
        stats.count += 1;
        stats.average += (rating - stats.average) / stats.count as f64;
    }

    pub fn get(&self, item_index: usize) -> Option<&Popularity> {
        self.per_item.get(item_index)
    }

    pub fn len(&self) -> usize {
        self.per_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_item.is_empty()
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (usize, &'a Popularity)> + 'a {
        self.per_item.iter().enumerate()
    }
}

/// Post-load counters of the rating index build.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LoadSummary {
    pub num_rows: u64,
    pub num_malformed: u64,
    pub num_duplicates: u64,
    pub num_training: u64,
    pub num_test: u64,
    pub num_users: usize,
    pub num_items: usize,
    pub num_items_with_metadata: usize,
}
