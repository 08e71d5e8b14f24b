//! Recent ascenders listing parser

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::cell_text;
use crate::domain::Player;

static PLAYER_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="showplayer.php?who="]"#).expect("static selector"));
static WHO: Lazy<Regex> = Lazy::new(|| Regex::new(r"who=(\d+)").expect("static regex"));

/// Players on a leaderboard-style listing, one entry per id.
///
/// The same player can be listed more than once (clan and individual boards);
/// entries keep the position of the first sighting and the name of the last.
#[must_use]
pub fn parse_recent_ascenders(html: &str) -> Vec<Player> {
    let document = Html::parse_document(html);
    let mut players: Vec<Player> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for link in document.select(&PLAYER_LINK) {
        let Some(id) = link
            .value()
            .attr("href")
            .and_then(|href| WHO.captures(href))
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .filter(|id| *id != 0)
        else {
            continue;
        };
        let name = cell_text(&link);
        if name.is_empty() {
            continue;
        }

        match positions.get(&id) {
            Some(&position) => players[position].name = name,
            None => {
                positions.insert(id, players.len());
                players.push(Player::new(id, name));
            }
        }
    }

    players
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse_in_first_seen_order() {
        let html = r#"<table>
            <tr><td><a href="showplayer.php?who=3">Carol</a></td></tr>
            <tr><td><a href="showplayer.php?who=1">Alice</a></td></tr>
            <tr><td><a href="showplayer.php?who=3">Carol2</a></td></tr>
            <tr><td><a href="showplayer.php?who=2">Bob</a></td></tr>
            <tr><td><a href="showclan.php?whichclan=5">Some Clan</a></td></tr>
        </table>"#;

        let players = parse_recent_ascenders(html);
        assert_eq!(
            players,
            vec![Player::new(3, "Carol2"), Player::new(1, "Alice"), Player::new(2, "Bob")]
        );
    }

    #[test]
    fn empty_listing() {
        assert!(parse_recent_ascenders("<html></html>").is_empty());
    }
}
