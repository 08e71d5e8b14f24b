//! # Ascension Records
//!
//! A run ("ascension") is identified by `(player_id, run_number)` and is
//! produced exactly once by parsing a player's history page.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder used by the remote source (and by us) for "nothing selected".
pub const NONE_VALUE: &str = "None";

/// Difficulty tier of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifestyle {
    Casual,
    Softcore,
    Hardcore,
}

impl Lifestyle {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Casual => "CASUAL",
            Self::Softcore => "SOFTCORE",
            Self::Hardcore => "HARDCORE",
        }
    }
}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifestyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASUAL" => Ok(Self::Casual),
            "SOFTCORE" => Ok(Self::Softcore),
            "HARDCORE" => Ok(Self::Hardcore),
            other => Err(format!("Invalid lifestyle: {other}")),
        }
    }
}

/// Which supplementary score a special-scoring path records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtraKind {
    Goo,
    Fun,
}

impl ExtraKind {
    /// Label the remote source uses inside the path tooltip
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Goo => "Goo Score",
            Self::Fun => "Fun",
        }
    }

    #[must_use]
    pub const fn score(self, value: i64) -> ExtraScore {
        match self {
            Self::Goo => ExtraScore::GooScore(value),
            Self::Fun => ExtraScore::FunScore(value),
        }
    }
}

/// Paths ranked by their supplementary score (descending) instead of days/turns.
pub const SPECIAL_SCORING: &[(&str, ExtraKind)] = &[
    ("Grey Goose", ExtraKind::Goo),
    ("Fall of the Dinosaurs", ExtraKind::Fun),
];

/// Looks up the supplementary score a path is ranked by, if any
#[must_use]
pub fn special_scoring_for(path_name: &str) -> Option<ExtraKind> {
    SPECIAL_SCORING
        .iter()
        .find(|(name, _)| *name == path_name)
        .map(|(_, kind)| *kind)
}

/// Supplementary score carried by runs on special-scoring paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExtraScore {
    #[default]
    None,
    GooScore(i64),
    FunScore(i64),
}

impl ExtraScore {
    /// Builds the score for `path_name` out of the sparse key/value pairs found
    /// in the path tooltip. Ordinary paths always yield `None`.
    #[must_use]
    pub fn from_pairs(path_name: &str, pairs: &[(String, i64)]) -> Self {
        let Some(kind) = special_scoring_for(path_name) else {
            return Self::None;
        };
        pairs
            .iter()
            .find(|(key, _)| key == kind.key())
            .map_or(Self::None, |(_, value)| kind.score(*value))
    }

    #[must_use]
    pub const fn kind(self) -> Option<ExtraKind> {
        match self {
            Self::None => None,
            Self::GooScore(_) => Some(ExtraKind::Goo),
            Self::FunScore(_) => Some(ExtraKind::Fun),
        }
    }

    #[must_use]
    pub const fn value(self) -> Option<i64> {
        match self {
            Self::None => None,
            Self::GooScore(v) | Self::FunScore(v) => Some(v),
        }
    }

    /// Sparse mapping form, e.g. `{"Goo Score": 1234}`; empty for `None`
    #[must_use]
    pub fn as_map(self) -> BTreeMap<&'static str, i64> {
        let mut map = BTreeMap::new();
        if let (Some(kind), Some(value)) = (self.kind(), self.value()) {
            map.insert(kind.key(), value);
        }
        map
    }

    /// Inverse of [`ExtraScore::as_map`]; unknown keys are ignored
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, i64>) -> Self {
        [ExtraKind::Goo, ExtraKind::Fun]
            .into_iter()
            .find_map(|kind| map.get(kind.key()).map(|value| kind.score(*value)))
            .unwrap_or_default()
    }
}

/// One completed (or abandoned) playthrough
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub player_id: i64,
    pub run_number: i32,
    pub date: NaiveDate,
    pub level: i32,
    pub class_name: String,
    pub sign: String,
    pub turns: i32,
    pub days: i32,
    pub familiar_name: String,
    /// 0-100, one decimal place
    pub familiar_percentage: f64,
    /// Icon file seen on the row; only used for familiar discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub familiar_image: Option<String>,
    pub lifestyle: Lifestyle,
    pub path_name: String,
    pub dropped: bool,
    pub abandoned: bool,
    pub extra: ExtraScore,
}

impl Run {
    /// Record for a run that ended before any statistics were kept
    #[must_use]
    pub fn abandoned(player_id: i64, run_number: i32, date: NaiveDate, dropped: bool) -> Self {
        Self {
            player_id,
            run_number,
            date,
            level: 0,
            class_name: NONE_VALUE.to_string(),
            sign: NONE_VALUE.to_string(),
            turns: 0,
            days: 0,
            familiar_name: NONE_VALUE.to_string(),
            familiar_percentage: 0.0,
            familiar_image: None,
            lifestyle: Lifestyle::Softcore,
            path_name: NONE_VALUE.to_string(),
            dropped,
            abandoned: true,
            extra: ExtraScore::None,
        }
    }

    /// Identity key `(player_id, run_number)`
    #[must_use]
    pub const fn key(&self) -> (i64, i32) {
        (self.player_id, self.run_number)
    }

    /// Whether the run takes part in record/personal-best ranking
    #[must_use]
    pub const fn is_rankable(&self) -> bool {
        !self.dropped && !self.abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifestyle_round_trips_through_text() {
        for lifestyle in [Lifestyle::Casual, Lifestyle::Softcore, Lifestyle::Hardcore] {
            assert_eq!(lifestyle.as_str().parse::<Lifestyle>(), Ok(lifestyle));
        }
        assert!("NORMAL".parse::<Lifestyle>().is_err());
    }

    #[test]
    fn extra_score_only_for_special_paths() {
        let pairs = vec![("Goo Score".to_string(), 1_234)];
        assert_eq!(ExtraScore::from_pairs("Grey Goose", &pairs), ExtraScore::GooScore(1_234));
        assert_eq!(ExtraScore::from_pairs("Community Service", &pairs), ExtraScore::None);

        let fun = vec![("Fun".to_string(), 88)];
        assert_eq!(ExtraScore::from_pairs("Fall of the Dinosaurs", &fun), ExtraScore::FunScore(88));
        // special path, but the tooltip carried a different key
        assert_eq!(ExtraScore::from_pairs("Grey Goose", &fun), ExtraScore::None);
    }

    #[test]
    fn extra_score_map_form() {
        let map = ExtraScore::GooScore(7).as_map();
        assert_eq!(map.get("Goo Score"), Some(&7));
        assert!(ExtraScore::None.as_map().is_empty());

        let stored: BTreeMap<String, i64> = [("Fun".to_string(), 3)].into_iter().collect();
        assert_eq!(ExtraScore::from_map(&stored), ExtraScore::FunScore(3));
        assert_eq!(ExtraScore::from_map(&BTreeMap::new()), ExtraScore::None);
    }

    #[test]
    fn abandoned_run_is_zeroed() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
        let run = Run::abandoned(5, 49, date, false);
        assert!(run.abandoned);
        assert_eq!((run.level, run.turns, run.days), (0, 0, 0));
        assert_eq!(run.path_name, NONE_VALUE);
        assert_eq!(run.lifestyle, Lifestyle::Softcore);
        assert!(!run.is_rankable());
    }
}
