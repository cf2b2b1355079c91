//! Pulling the few values we need out of typeracer pages.

use crate::error::ScrapeError;
use crate::html::{find_block_with_class, inner_after_open_tag, links, tag_blocks, text_of};
use chrono::{NaiveDate, NaiveDateTime};
use log::warn;

const TYPING_LOG_VAR: &str = "var typingLog = ";

const DATETIME_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%b %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%a, %d %b %Y",
    "%d %b %Y",
    "%b %d, %Y",
    "%b. %d, %Y",
    "%B %d, %Y",
    "%m/%d/%Y",
];

/// Everything a race result page contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct RacePage {
    pub typing_log: String,
    pub text: String,
    pub text_id: i64,
    pub race_date: NaiveDateTime,
}

/// One row of the race history table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub race_id: i64,
    pub wpm: i64,
    pub accuracy: f64,
    pub race_date: NaiveDateTime,
}

fn parse_error(what: &str) -> ScrapeError {
    ScrapeError::Parse(what.to_string())
}

pub fn parse_race_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// The raw `typingLog` payload, without its quotes and trailing `,";`.
///
/// `Ok(None)` means the page has no typing log script at all.
pub fn extract_typing_log(html: &str) -> Result<Option<String>, ScrapeError> {
    let Some(script) = tag_blocks(html, "script")
        .into_iter()
        .map(inner_after_open_tag)
        .find(|body| body.contains(TYPING_LOG_VAR))
    else {
        return Ok(None);
    };

    let at = script.find(TYPING_LOG_VAR).unwrap_or(0);
    let line = script[at..].lines().next().unwrap_or("");
    let start = line.find('"').ok_or_else(|| parse_error("typing log"))? + 1;
    let end = line.rfind(",\";").ok_or_else(|| parse_error("typing log"))?;
    if end < start {
        return Err(parse_error("typing log"));
    }
    Ok(Some(line[start..end].to_string()))
}

pub fn extract_text(html: &str) -> Option<String> {
    find_block_with_class(html, "div", "fullTextStr").map(|b| text_of(inner_after_open_tag(b)))
}

pub fn extract_text_id(html: &str) -> Option<i64> {
    links(html)
        .into_iter()
        .filter(|(href, _)| href.contains("text_info"))
        .last()
        .and_then(|(href, _)| href.rsplit('=').next()?.trim().parse().ok())
}

pub fn extract_race_date(html: &str) -> Option<NaiveDateTime> {
    let table = find_block_with_class(html, "table", "raceDetails")?;
    tag_blocks(table, "tr").into_iter().find_map(|row| {
        let cells: Vec<String> = tag_blocks(row, "td")
            .into_iter()
            .map(|c| text_of(inner_after_open_tag(c)))
            .collect();
        match cells.as_slice() {
            [label, value, ..] if label.contains("Date") => parse_race_date(value),
            _ => None,
        }
    })
}

/// Read a race result page. `Ok(None)` when it carries no typing log.
pub fn extract_race_page(html: &str) -> Result<Option<RacePage>, ScrapeError> {
    let Some(typing_log) = extract_typing_log(html)? else {
        return Ok(None);
    };
    Ok(Some(RacePage {
        typing_log,
        text: extract_text(html).ok_or_else(|| parse_error("race text"))?,
        text_id: extract_text_id(html).ok_or_else(|| parse_error("text id"))?,
        race_date: extract_race_date(html).ok_or_else(|| parse_error("race date"))?,
    }))
}

/// Highest race number on a profile page: the first link in its scores table.
pub fn extract_max_race_id(html: &str) -> Result<i64, ScrapeError> {
    let table = find_block_with_class(html, "table", "scoresTable")
        .ok_or_else(|| parse_error("scores table"))?;
    links(table)
        .into_iter()
        .next()
        .and_then(|(_, text)| text.parse().ok())
        .ok_or_else(|| parse_error("max race id"))
}

fn header_index(headers: &[String], name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn history_row(cells: &[String], cols: (usize, usize, usize, usize)) -> Option<HistoryRow> {
    let (race, speed, acc, date) = cols;
    Some(HistoryRow {
        race_id: cells.get(race)?.parse().ok()?,
        wpm: cells.get(speed)?.split(' ').next()?.parse().ok()?,
        accuracy: cells.get(acc)?.trim_end_matches('%').trim().parse::<f64>().ok()? / 100.0,
        race_date: parse_race_date(cells.get(date)?)?,
    })
}

/// Rows of a race history page. `None` when the page has no scores table.
pub fn extract_race_history(html: &str) -> Option<Vec<HistoryRow>> {
    let table = find_block_with_class(html, "table", "scoresTable")?;
    let mut rows = tag_blocks(table, "tr").into_iter();

    let header_row = rows.next()?;
    let mut headers: Vec<String> = tag_blocks(header_row, "th")
        .into_iter()
        .map(|c| text_of(inner_after_open_tag(c)))
        .collect();
    if headers.is_empty() {
        headers = tag_blocks(header_row, "td")
            .into_iter()
            .map(|c| text_of(inner_after_open_tag(c)))
            .collect();
    }
    let cols = (
        header_index(&headers, "Race #")?,
        header_index(&headers, "Speed")?,
        header_index(&headers, "Accuracy")?,
        header_index(&headers, "Date")?,
    );

    let mut out = Vec::new();
    for row in rows {
        let cells: Vec<String> = tag_blocks(row, "td")
            .into_iter()
            .map(|c| text_of(inner_after_open_tag(c)))
            .collect();
        if cells.is_empty() {
            continue;
        }
        match history_row(&cells, cols) {
            Some(r) => out.push(r),
            None => warn!("skipping unreadable history row {:?}", cells),
        }
    }
    Some(out)
}
