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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashSet;
use ndarray::ArrayView1;

use crate::error::ShapeError;
use crate::types::LatentMatrix;

/// Result type used to find the top-n items via a binary heap
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoredItem {
    pub item: usize,
    pub score: f64,
}

/// Ordering for our heap, the item with the lowest score ends up on top so that it can be
/// replaced cheaply. There is no total order on floating point numbers, incomparable scores count
/// as equal.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        Some(Ordering::Equal) => Ordering::Equal,
        None => Ordering::Equal
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Scores every item for the given user latent vector and returns the `num_items_to_recommend`
/// best ones that are not in `exclude`, best first.
pub fn recommend(
    user_latent: ArrayView1<f64>,
    item_latent: &LatentMatrix,
    exclude: &FnvHashSet<usize>,
    num_items_to_recommend: usize,
) -> Result<Vec<ScoredItem>, ShapeError> {

    if user_latent.len() != item_latent.ncols() {
        return Err(ShapeError::new("recommend", (1, user_latent.len()), item_latent.dim()));
    }

    if num_items_to_recommend == 0 {
        return Ok(Vec::new());
    }

    let scores = item_latent.dot(&user_latent);

    let mut heap = BinaryHeap::with_capacity(num_items_to_recommend);

    for (item, score) in scores.iter().enumerate() {
        if exclude.contains(&item) {
            continue;
        }

        let scored_item = ScoredItem { item, score: *score };

        if heap.len() < num_items_to_recommend {
            heap.push(scored_item);
        } else if let Some(mut top) = heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    Ok(heap.into_sorted_vec())
}
