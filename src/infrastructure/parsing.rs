//! HTML parsing for ascension history, player identity and recent-ascender pages
//!
//! Every parser here is pure and total: rows or pages that do not have the
//! expected shape are left out of the result, nothing is ever raised.

pub mod ascension_history;
pub mod player;
pub mod recent_ascenders;

pub use ascension_history::{AscensionHistoryPage, RowShape, parse_ascension_history};
pub use player::parse_player;
pub use recent_ascenders::parse_recent_ascenders;

use scraper::ElementRef;

/// Visible text of an element with `&nbsp;` padding and surrounding whitespace removed
pub(crate) fn cell_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}

/// Integer with thousands separators stripped, e.g. `"1,234"` -> `1234`
pub(crate) fn parse_number(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    cleaned.trim().parse().ok()
}

/// Last path segment of an image URL, used as the stored icon reference
pub(crate) fn image_name(src: &str) -> Option<String> {
    src.rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Tooltip text of an element: `title`, falling back to `alt`
pub(crate) fn tooltip<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    let value = element.value();
    value
        .attr("title")
        .or_else(|| value.attr("alt"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_lose_thousands_separators() {
        assert_eq!(parse_number("1,234"), Some(1_234));
        assert_eq!(parse_number(" 12,345,678 "), Some(12_345_678));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn image_names_are_last_segment() {
        assert_eq!(
            image_name("https://d2uyhvukfffg5a.cloudfront.net/itemimages/familiar6.gif"),
            Some("familiar6.gif".to_string())
        );
        assert_eq!(image_name("goose.gif"), Some("goose.gif".to_string()));
        assert_eq!(image_name("https://host/itemimages/"), None);
    }
}
