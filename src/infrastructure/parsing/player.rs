//! Player identity parser
//!
//! A history page names its owner through a `showplayer.php?who=<id>` anchor.
//! Nonexistent ids (`who=0`), redacted profiles and purged accounts all come
//! back as `None`; callers cannot and need not tell them apart.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::cell_text;
use crate::domain::Player;

static PLAYER_ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="showplayer.php?who="]"#).expect("static selector"));
static WHO: Lazy<Regex> = Lazy::new(|| Regex::new(r"who=(\d+)").expect("static regex"));

/// Placeholder shown in place of the name of a redacted profile
const REDACTED_PLACEHOLDER: &str = "(redacted)";

/// Extracts `(id, name)` from a player page
#[must_use]
pub fn parse_player(html: &str) -> Option<Player> {
    player_from_document(&Html::parse_document(html))
}

pub(crate) fn player_from_document(document: &Html) -> Option<Player> {
    let anchor = document.select(&PLAYER_ANCHOR).next()?;
    let href = anchor.value().attr("href")?;
    let id: i64 = WHO.captures(href)?[1].parse().ok()?;
    if id == 0 {
        return None;
    }

    let name = cell_text(&anchor);
    if name.is_empty() || name.eq_ignore_ascii_case(REDACTED_PLACEHOLDER) {
        return None;
    }

    Some(Player::new(id, name))
}
