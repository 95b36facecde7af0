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

#[cfg(test)]
mod tests {

    use fnv::{FnvHashMap, FnvHashSet};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::approximator::UserApproximator;
    use crate::error::DataError;
    use crate::factorizer::FactorizerBuilder;
    use crate::index::{IndexConfig, RatingIndex};
    use crate::recommend;
    use crate::training::{EpochReport, TrainingConfig};
    use crate::types::RatingObservation;

    #[test]
    fn programmatic_usage() {

        /* Our input data comprises of ratings which users gave to movies. Identifiers are
           arbitrary integers, ratings are strictly positive. */
        let ratings = vec![
            (1, 31, 2.5), (1, 1029, 3.0), (1, 1061, 3.0), (1, 1129, 2.0),
            (2, 10, 4.0), (2, 17, 5.0), (2, 39, 5.0), (2, 47, 4.0), (2, 31, 3.0),
            (3, 60, 3.0), (3, 110, 4.0), (3, 247, 3.5), (3, 10, 4.5), (3, 17, 4.0),
            (4, 10, 4.0), (4, 34, 5.0), (4, 112, 5.0), (4, 141, 5.0), (4, 39, 4.5),
            (5, 1029, 4.0), (5, 1061, 4.5), (5, 1129, 3.5), (5, 31, 3.0), (5, 47, 4.0),
        ];

        let items = vec![
            (10, "GoldenEye (1995)".to_string()),
            (17, "Sense and Sensibility (1995)".to_string()),
            (31, "Dangerous Minds (1995)".to_string()),
        ];

        /* The rating index hands out consecutive matrix indices for users and items, holds out
           a fraction of the ratings for evaluation and builds the dense training matrix. */
        let index_config = IndexConfig { test_ratio: 0.1, seed: 2018 };
        let index = RatingIndex::build::<_, _, DataError>(
            ratings.iter().map(|&(user, item, rating)| Ok(RatingObservation::new(user, item, rating))),
            items.into_iter().map(Ok),
            &index_config,
        ).unwrap();

        println!(
            "Found {} ratings between {} users and {} items.",
            index.summary().num_training + index.summary().num_test,
            index.num_users(),
            index.num_items(),
        );

        /* Now we learn latent vectors with gradient descent. The random number generator is
           handed in explicitly, so runs are reproducible. */
        let mut rng = StdRng::seed_from_u64(42);
        let mut factorizer = FactorizerBuilder::new(3)
            .rating_index(&index)
            .build(&mut rng)
            .unwrap();

        let config = TrainingConfig { steps: 300, epoch_size: 50, regularization: 0.03, learning_rate: 0.01 };

        let final_loss = factorizer.train(&config, &mut |report: &EpochReport| {
            println!("iteration {:3}: net loss {:5.2}", report.step, report.loss.total);
        }).unwrap();

        println!("Final loss {:.4}, held-out RMSE {:?}", final_loss.total, final_loss.test_rmse);

        let (_, item_latent) = factorizer.into_latents();

        /* A new user rates two movies. We estimate their latent vector against the frozen item
           latent matrix and recommend the items with the highest predicted ratings. */
        let mut new_ratings = FnvHashMap::default();
        new_ratings.insert(10, 5.0);
        new_ratings.insert(17, 4.5);

        let approximator = UserApproximator::from_rated_items(
            &item_latent,
            index.items(),
            &new_ratings,
            &mut rng,
        ).unwrap();

        let user_latent = approximator.approximate(&config, &mut |_: &EpochReport| {}).unwrap();

        let rated: FnvHashSet<usize> = new_ratings.keys()
            .filter_map(|item| index.items().index(*item))
            .collect();

        let recommended = recommend::recommend(user_latent.view(), &item_latent, &rated, 3).unwrap();

        assert_eq!(recommended.len(), 3);

        for scored_item in recommended.iter() {
            let item = index.items().id(scored_item.item).unwrap();
            assert!(!new_ratings.contains_key(&item));

            let title = index.item_metadata(item).unwrap_or("unknown title");
            println!("\t{} ({:.2})", title, scored_item.score);
        }
    }
}
