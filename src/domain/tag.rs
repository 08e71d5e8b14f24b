use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of ranking annotation attached to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagType {
    RecordBreaking,
    PersonalBest,
    Leaderboard,
    Pyrite,
    PyriteSpecial,
}

impl TagType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecordBreaking => "RECORD_BREAKING",
            Self::PersonalBest => "PERSONAL_BEST",
            Self::Leaderboard => "LEADERBOARD",
            Self::Pyrite => "PYRITE",
            Self::PyriteSpecial => "PYRITE_SPECIAL",
        }
    }

    /// Derived tags are regenerated wholesale by the tagging engine
    #[must_use]
    pub const fn is_derived(self) -> bool {
        matches!(self, Self::RecordBreaking | Self::PersonalBest)
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECORD_BREAKING" => Ok(Self::RecordBreaking),
            "PERSONAL_BEST" => Ok(Self::PersonalBest),
            "LEADERBOARD" => Ok(Self::Leaderboard),
            "PYRITE" => Ok(Self::Pyrite),
            "PYRITE_SPECIAL" => Ok(Self::PyriteSpecial),
            other => Err(format!("Invalid tag type: {other}")),
        }
    }
}

/// Annotation on a single run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub tag_type: TagType,
    /// Rank position; only meaningful for leaderboard/pyrite tags
    pub value: Option<i32>,
    pub player_id: i64,
    pub run_number: i32,
    pub year: Option<i32>,
}

impl Tag {
    #[must_use]
    pub const fn derived(tag_type: TagType, player_id: i64, run_number: i32) -> Self {
        Self {
            tag_type,
            value: None,
            player_id,
            run_number,
            year: None,
        }
    }
}
