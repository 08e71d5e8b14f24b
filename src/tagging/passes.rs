//! Record-breaking and personal-best passes
//!
//! Both passes are pure: they take the run corpus and return the complete tag
//! set for their type. Partitions are ranked in parallel with rayon and the
//! result is sorted by run identity, so output does not depend on input order.

use std::collections::HashMap;

use chrono::NaiveDate;
use rayon::prelude::*;

use super::scoring::{compare_runs, rank_key};
use crate::domain::{Lifestyle, Run, Tag, TagType};

fn sorted(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort_by_key(|t| (t.player_id, t.run_number));
    tags
}

/// Runs that improved on every earlier-dated run of their path and lifestyle.
///
/// Only rankable runs dated on or after `cutoff` take part. Of several runs
/// on the same date, at most the best one qualifies; on an exact tie the lowest
/// `(player_id, run_number)` is that one.
#[must_use]
pub fn record_breaking(runs: &[Run], cutoff: NaiveDate) -> Vec<Tag> {
    let mut partitions: HashMap<(&str, Lifestyle), Vec<&Run>> = HashMap::new();
    for run in runs.iter().filter(|r| r.is_rankable() && r.date >= cutoff) {
        partitions
            .entry((run.path_name.as_str(), run.lifestyle))
            .or_default()
            .push(run);
    }

    let tags = partitions
        .into_par_iter()
        .flat_map_iter(|(_, mut partition)| {
            partition.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| compare_runs(a, b)));

            let mut records = Vec::new();
            let mut best_so_far = None;
            let mut previous_date = None;
            for run in partition {
                // first entry of each date is that date's best
                if previous_date == Some(run.date) {
                    continue;
                }
                previous_date = Some(run.date);

                let key = rank_key(run);
                if best_so_far.is_none_or(|best| key < best) {
                    records.push(Tag::derived(TagType::RecordBreaking, run.player_id, run.run_number));
                    best_so_far = Some(key);
                }
            }
            records
        })
        .collect();

    sorted(tags)
}

/// Each player's best rankable run per path and lifestyle; no date cutoff
#[must_use]
pub fn personal_best(runs: &[Run]) -> Vec<Tag> {
    let mut partitions: HashMap<(i64, &str, Lifestyle), Vec<&Run>> = HashMap::new();
    for run in runs.iter().filter(|r| r.is_rankable()) {
        partitions
            .entry((run.player_id, run.path_name.as_str(), run.lifestyle))
            .or_default()
            .push(run);
    }

    let tags = partitions
        .into_par_iter()
        .filter_map(|(_, partition)| {
            partition
                .into_iter()
                .min_by(|a, b| compare_runs(a, b))
                .map(|best| Tag::derived(TagType::PersonalBest, best.player_id, best.run_number))
        })
        .collect();

    sorted(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtraScore;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, day).unwrap()
    }

    fn run(player_id: i64, run_number: i32, day: u32, days: i32, turns: i32) -> Run {
        Run {
            player_id,
            run_number,
            date: date(day),
            level: 13,
            class_name: "Turtle Tamer".to_string(),
            sign: "Wombat".to_string(),
            turns,
            days,
            familiar_name: "None".to_string(),
            familiar_percentage: 0.0,
            familiar_image: None,
            lifestyle: Lifestyle::Softcore,
            path_name: "Standard".to_string(),
            dropped: false,
            abandoned: false,
            extra: ExtraScore::None,
        }
    }

    fn ids(tags: &[Tag]) -> Vec<(i64, i32)> {
        tags.iter().map(|t| (t.player_id, t.run_number)).collect()
    }

    #[test]
    fn records_strictly_improve_over_time() {
        let runs = vec![
            run(1, 1, 1, 3, 600),
            run(2, 1, 2, 3, 650), // worse
            run(2, 2, 3, 3, 550), // better
            run(3, 1, 4, 3, 550), // equal is not a record
            run(3, 2, 5, 2, 900), // fewer days
        ];
        let tags = record_breaking(&runs, date(1));
        assert_eq!(ids(&tags), vec![(1, 1), (2, 2), (3, 2)]);
        assert!(tags.iter().all(|t| t.tag_type == TagType::RecordBreaking));
    }

    #[test]
    fn one_record_per_date_with_identity_tiebreak() {
        let runs = vec![run(9, 4, 1, 2, 500), run(5, 7, 1, 2, 500), run(6, 1, 1, 2, 700)];
        assert_eq!(ids(&record_breaking(&runs, date(1))), vec![(5, 7)]);
    }

    #[test]
    fn cutoff_dropped_and_abandoned_are_excluded() {
        let mut dropped = run(1, 2, 3, 1, 100);
        dropped.dropped = true;
        let mut abandoned = run(1, 3, 4, 1, 50);
        abandoned.abandoned = true;
        let runs = vec![run(1, 1, 1, 1, 10), dropped, abandoned, run(1, 4, 5, 5, 5_000)];

        assert_eq!(ids(&record_breaking(&runs, date(2))), vec![(1, 4)]);
    }

    #[test]
    fn partitions_are_independent() {
        let mut hardcore = run(2, 1, 2, 9, 9_000);
        hardcore.lifestyle = Lifestyle::Hardcore;
        let runs = vec![run(1, 1, 1, 1, 100), hardcore];
        assert_eq!(ids(&record_breaking(&runs, date(1))), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn special_paths_break_records_by_score() {
        let goose = |player_id, day, goo| {
            let mut r = run(player_id, 1, day, 5, 1_000);
            r.path_name = "Grey Goose".to_string();
            r.extra = ExtraScore::GooScore(goo);
            r
        };
        let runs = vec![goose(1, 1, 100), goose(2, 2, 90), goose(3, 3, 120)];
        assert_eq!(ids(&record_breaking(&runs, date(1))), vec![(1, 1), (3, 1)]);
    }

    #[test]
    fn recompute_is_deterministic() {
        let runs: Vec<Run> = (1..=40)
            .map(|n| run(i64::from(n % 7), n, (n % 28 + 1) as u32, n % 4 + 1, 1_000 - n))
            .collect();
        let mut reversed = runs.clone();
        reversed.reverse();

        assert_eq!(record_breaking(&runs, date(1)), record_breaking(&runs, date(1)));
        assert_eq!(record_breaking(&runs, date(1)), record_breaking(&reversed, date(1)));
        assert_eq!(personal_best(&runs), personal_best(&reversed));
    }

    #[test]
    fn exactly_one_personal_best_per_partition() {
        let runs = vec![
            run(1, 1, 1, 3, 600),
            run(1, 2, 2, 2, 900),
            run(1, 3, 3, 2, 800),
            run(2, 1, 1, 5, 5_000),
        ];
        let tags = personal_best(&runs);
        assert_eq!(ids(&tags), vec![(1, 3), (2, 1)]);
        assert!(tags.iter().all(|t| t.tag_type == TagType::PersonalBest));
    }

    #[test]
    fn personal_best_on_special_path_is_highest_score() {
        let goose = |run_number, days, extra| {
            let mut r = run(1, run_number, 1, days, 1_000);
            r.path_name = "Grey Goose".to_string();
            r.extra = extra;
            r
        };
        let runs = vec![
            goose(1, 1, ExtraScore::GooScore(300)),
            goose(2, 9, ExtraScore::GooScore(800)),
            goose(3, 1, ExtraScore::GooScore(500)),
            // fastest run but without a score
            goose(4, 1, ExtraScore::None),
        ];
        assert_eq!(ids(&personal_best(&runs)), vec![(1, 2)]);

        let unscored_only = vec![goose(5, 3, ExtraScore::None), goose(6, 1, ExtraScore::None)];
        assert_eq!(ids(&personal_best(&unscored_only)), vec![(1, 5)]);
    }

    #[test]
    fn personal_best_ties_go_to_earliest_run() {
        let runs = vec![run(1, 5, 1, 2, 500), run(1, 2, 9, 2, 500)];
        assert_eq!(ids(&personal_best(&runs)), vec![(1, 2)]);
    }

    #[test]
    fn personal_best_ignores_cutoff_and_unrankable_runs() {
        let mut dropped = run(1, 2, 2, 1, 1);
        dropped.dropped = true;
        let runs = vec![run(1, 1, 1, 4, 4_000), dropped];
        assert_eq!(ids(&personal_best(&runs)), vec![(1, 1)]);
    }
}
