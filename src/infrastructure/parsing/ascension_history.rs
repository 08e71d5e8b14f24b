//! Ascension history parser
//!
//! Handles both the legacy (pre-NS13) and modern history tables. Each `<tr>`
//! is classified into a [`RowShape`] first and only then converted into a
//! [`Run`], so the abandoned/normal split is an explicit step rather than a
//! side effect of pattern fallthrough.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{cell_text, image_name, parse_number, tooltip};
use crate::domain::{ExtraScore, Lifestyle, NONE_VALUE, Player, Run};

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("static selector"));
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("static selector"));

static FAMILIAR_TOOLTIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?) \((\d+(?:\.\d+)?)%\)$").expect("static regex"));
static PATH_WITH_PARENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?) \((.*)\)$").expect("static regex"));
static PATH_WITH_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^(.+?)\n\s*(.*)$").expect("static regex"));

/// Cells in a full history row: index, date, level, class, sign, turns, days,
/// familiar, restrictions.
const NORMAL_ROW_CELLS: usize = 9;
/// Populated cells on a row for a run abandoned before any stats were kept
const ABANDONED_ROW_CELLS: usize = 3;

const NO_SIGN: &str = "(none)";

/// Shape of a history table row, decided before any field is extracted
#[derive(Debug, Clone)]
pub enum RowShape<'a> {
    Abandoned {
        index: ElementRef<'a>,
        date: ElementRef<'a>,
    },
    Normal {
        cells: Vec<ElementRef<'a>>,
    },
}

impl<'a> RowShape<'a> {
    /// Classifies a `<tr>`; header rows and anything else unrecognised yield `None`.
    #[must_use]
    pub fn classify(row: ElementRef<'a>) -> Option<Self> {
        let cells: Vec<ElementRef<'a>> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "td")
            .collect();

        // data rows always open with a numeric index
        parse_index(&cell_text(cells.first()?))?;

        let populated = cells.iter().filter(|cell| is_populated(cell)).count();
        if populated == ABANDONED_ROW_CELLS {
            return Some(Self::Abandoned {
                index: cells[0],
                date: cells[1],
            });
        }

        (cells.len() >= NORMAL_ROW_CELLS).then_some(Self::Normal { cells })
    }

    /// Converts the row into a run record for `player_id`
    #[must_use]
    pub fn into_run(self, player_id: i64) -> Option<Run> {
        match self {
            Self::Abandoned { index, date } => {
                let (run_number, dropped) = parse_index(&cell_text(&index))?;
                let date = parse_date(&cell_text(&date))?;
                Some(Run::abandoned(player_id, run_number, date, dropped))
            }
            Self::Normal { cells } => normal_run(player_id, &cells),
        }
    }
}

fn is_populated(cell: &ElementRef<'_>) -> bool {
    !cell_text(cell).is_empty() || cell.children().any(|child| child.value().is_element())
}

fn normal_run(player_id: i64, cells: &[ElementRef<'_>]) -> Option<Run> {
    let (run_number, dropped) = parse_index(&cell_text(&cells[0]))?;
    let date = parse_date(&cell_text(&cells[1]))?;
    let level = parse_number(&cell_text(&cells[2]))?;
    let class_name = parse_class(&cells[3]);
    let sign = normalize_sign(&cell_text(&cells[4]));
    let turns = parse_number(&cell_text(&cells[5]))?;
    let days = parse_number(&cell_text(&cells[6]))?;
    let (familiar_name, familiar_percentage, familiar_image) = parse_familiar(&cells[7]);
    let (lifestyle, path_name, extra) = parse_restrictions(&cells[8]);

    Some(Run {
        player_id,
        run_number,
        date,
        level: i32::try_from(level).ok()?,
        class_name,
        sign,
        turns: i32::try_from(turns).ok()?,
        days: i32::try_from(days).ok()?,
        familiar_name,
        familiar_percentage,
        familiar_image,
        lifestyle,
        path_name,
        dropped,
        abandoned: false,
        extra,
    })
}

/// Run index plus the dropped-path flag; any trailing marker means dropped.
pub(crate) fn parse_index(text: &str) -> Option<(i32, bool)> {
    let digits_end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(text.len(), |(i, _)| i);
    if digits_end == 0 {
        return None;
    }
    let number = text[..digits_end].parse().ok()?;
    let dropped = !text[digits_end..].trim().is_empty();
    Some((number, dropped))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%m/%d/%y")
        .or_else(|_| NaiveDate::parse_from_str(text, "%m/%d/%Y"))
        .ok()
}

fn parse_class(cell: &ElementRef<'_>) -> String {
    cell.select(&IMG)
        .find_map(|img| tooltip(&img))
        .or_else(|| tooltip(cell))
        .unwrap_or(NONE_VALUE)
        .to_string()
}

fn normalize_sign(text: &str) -> String {
    if text.is_empty() || text == NO_SIGN {
        NONE_VALUE.to_string()
    } else {
        text.to_string()
    }
}

/// `"Melodramedary (17.5%)"` -> `("Melodramedary", 17.5)`
pub(crate) fn split_familiar_tooltip(text: &str) -> (String, f64) {
    match FAMILIAR_TOOLTIP.captures(text) {
        Some(caps) => {
            let percentage = caps[2].parse::<f64>().unwrap_or(0.0);
            (caps[1].to_string(), (percentage * 10.0).round() / 10.0)
        }
        None => (text.to_string(), 0.0),
    }
}

fn parse_familiar(cell: &ElementRef<'_>) -> (String, f64, Option<String>) {
    let Some(img) = cell.select(&IMG).next() else {
        return (NONE_VALUE.to_string(), 0.0, None);
    };
    let Some(text) = tooltip(&img) else {
        return (NONE_VALUE.to_string(), 0.0, None);
    };
    let (name, percentage) = split_familiar_tooltip(text);
    let image = img.value().attr("src").and_then(image_name);
    (name, percentage, image)
}

/// The restrictions cell is read as fragments split by icon: the first icon
/// marks the lifestyle, the second carries the path tooltip.
fn parse_restrictions(cell: &ElementRef<'_>) -> (Lifestyle, String, ExtraScore) {
    let icons: Vec<ElementRef<'_>> = cell.select(&IMG).collect();

    let lifestyle = icons.first().map_or(Lifestyle::Softcore, lifestyle_of);

    let Some(path_tooltip) = icons.get(1).and_then(tooltip) else {
        return (lifestyle, NONE_VALUE.to_string(), ExtraScore::None);
    };
    let (path_name, detail) = split_path_tooltip(path_tooltip);
    let extra = ExtraScore::from_pairs(&path_name, &parse_path_detail(&detail));
    (lifestyle, path_name, extra)
}

fn lifestyle_of(icon: &ElementRef<'_>) -> Lifestyle {
    let value = icon.value();
    let marker = [value.attr("src"), value.attr("title"), value.attr("alt")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if marker.contains("casual") || marker.contains("beanbag") {
        Lifestyle::Casual
    } else if marker.contains("hardcore") {
        Lifestyle::Hardcore
    } else {
        Lifestyle::Softcore
    }
}

/// Splits a path tooltip into name and detail. Tried in order:
/// `Name (detail)`, `Name\n detail`, bare name.
pub(crate) fn split_path_tooltip(text: &str) -> (String, String) {
    if let Some(caps) = PATH_WITH_PARENS.captures(text) {
        return (caps[1].trim().to_string(), caps[2].trim().to_string());
    }
    if let Some(caps) = PATH_WITH_NEWLINE.captures(text) {
        return (caps[1].trim().to_string(), caps[2].trim().to_string());
    }
    (text.trim().to_string(), String::new())
}

/// Sparse key/value pairs out of a path detail string.
///
/// Pairs are separated by `", "`. A pair holding `": "` reads `key: value`;
/// otherwise it reads `value key`. Pairs whose value is not numeric are dropped.
pub(crate) fn parse_path_detail(detail: &str) -> Vec<(String, i64)> {
    if detail.is_empty() {
        return Vec::new();
    }

    detail
        .split(", ")
        .filter_map(|pair| {
            let (key, value) = match pair.split_once(": ") {
                Some((key, value)) => (key, value),
                None => {
                    let (value, key) = pair.split_once(' ')?;
                    (key, value)
                }
            };
            let value = parse_number(value)?;
            Some((key.trim().to_string(), value))
        })
        .collect()
}

/// A parsed history page. Rows are produced lazily and can be iterated any
/// number of times.
pub struct AscensionHistoryPage {
    document: Html,
}

impl AscensionHistoryPage {
    #[must_use]
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    /// Classified data rows in source order
    pub fn rows(&self) -> impl Iterator<Item = RowShape<'_>> + '_ {
        self.document.select(&ROW).filter_map(RowShape::classify)
    }

    /// Run records in source order
    pub fn runs(&self, player_id: i64) -> impl Iterator<Item = Run> + '_ {
        self.rows().filter_map(move |row| row.into_run(player_id))
    }

    /// Identity of the player the page belongs to, if the page has one
    #[must_use]
    pub fn player(&self) -> Option<Player> {
        super::player::player_from_document(&self.document)
    }
}

/// Parses every run on a history page into an owned list
#[must_use]
pub fn parse_ascension_history(html: &str, player_id: i64) -> Vec<Run> {
    let page = AscensionHistoryPage::parse(html);
    let runs: Vec<Run> = page.runs(player_id).collect();
    debug!("Parsed {} runs for player {}", runs.len(), player_id);
    runs
}
