//! Turns the free-text dates found on ticketing pages into calendar dates.

use chrono::{Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("empty date text")]
    Empty,
    #[error("unrecognized date format: {0:?}")]
    UnrecognizedFormat(String),
    #[error("unknown month name: {0:?}")]
    UnknownMonth(String),
    #[error("invalid calendar date: {year}-{month}-{day}")]
    InvalidDate { year: i32, month: u32, day: u32 },
}

/// What to do with a month name missing from the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthFallback {
    #[default]
    Strict,
    /// Treat unknown months as January.
    January,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

static DOTTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("valid regex"));
static SLASHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").expect("valid regex"));
static ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid regex"));
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})\.?\s+(\p{L}+)\.?,?\s+(\d{4}|\d{2})(?:$|[^\d:])").expect("valid regex")
});
static MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\p{L}+)\s*-\s*(\d{1,2})$").expect("valid regex"));

/// Lowercased month names: Turkish full, Turkish abbreviations,
/// ASCII-folded Turkish, English full and English abbreviations.
const MONTHS: &[(&str, u32)] = &[
    ("ocak", 1), ("oca", 1), ("january", 1), ("jan", 1),
    ("şubat", 2), ("şub", 2), ("subat", 2), ("sub", 2), ("february", 2), ("feb", 2),
    ("mart", 3), ("mar", 3), ("march", 3),
    ("nisan", 4), ("nis", 4), ("april", 4), ("apr", 4),
    ("mayıs", 5), ("mayis", 5), ("may", 5),
    ("haziran", 6), ("haz", 6), ("june", 6), ("jun", 6),
    ("temmuz", 7), ("tem", 7), ("july", 7), ("jul", 7),
    ("ağustos", 8), ("ağu", 8), ("agustos", 8), ("agu", 8), ("august", 8), ("aug", 8),
    ("eylül", 9), ("eyl", 9), ("eylul", 9), ("september", 9), ("sept", 9), ("sep", 9),
    ("ekim", 10), ("eki", 10), ("october", 10), ("oct", 10),
    ("kasım", 11), ("kas", 11), ("kasim", 11), ("november", 11), ("nov", 11),
    ("aralık", 12), ("ara", 12), ("aralik", 12), ("december", 12), ("dec", 12),
];

pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.trim().trim_end_matches('.').to_lowercase();
    MONTHS.iter().find(|(m, _)| *m == lower).map(|(_, n)| *n)
}

#[derive(Debug, Clone)]
pub struct DateNormalizer {
    fallback: MonthFallback,
    reference_year: Option<i32>,
    extra_formats: Vec<String>,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new(MonthFallback::Strict)
    }
}

impl DateNormalizer {
    pub fn new(fallback: MonthFallback) -> Self {
        Self { fallback, reference_year: None, extra_formats: Vec::new() }
    }

    /// Year used for dates printed without one. Defaults to the current year.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// chrono format strings tried before the built-in patterns.
    pub fn with_formats(mut self, formats: &[String]) -> Self {
        self.extra_formats = formats.to_vec();
        self
    }

    fn year_for_missing(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Local::now().year())
    }

    /// Parses a single date.
    pub fn parse(&self, text: &str) -> Result<NaiveDate, DateParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DateParseError::Empty);
        }

        for format in &self.extra_formats {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Ok(date);
            }
        }

        // "Cum, 25/12/24 20:00" keeps only the first token after the comma.
        if let Some((prefix, rest)) = text.split_once(", ") {
            if !prefix.chars().any(|c| c.is_ascii_digit()) {
                let token = rest.split_whitespace().next().unwrap_or_default();
                if !token.is_empty() {
                    if let Ok(date) = self.parse_numeric(token) {
                        return Ok(date);
                    }
                }
                return self.parse(rest);
            }
        }

        if let Ok(date) = self.parse_numeric(text) {
            return Ok(date);
        }

        if let Some(caps) = DAY_MONTH_YEAR.captures(text) {
            let day = parse_number(&caps[1], text)?;
            let month = self.resolve_month(&caps[2])?;
            let mut year: i32 = caps[3].parse().map_err(|_| unrecognized(text))?;
            if caps[3].len() == 2 {
                year += 2000;
            }
            return build_date(year, month, day);
        }

        if let Some(caps) = MONTH_DAY.captures(text) {
            let month = self.resolve_month(&caps[1])?;
            let day = parse_number(&caps[2], text)?;
            return build_date(self.year_for_missing(), month, day);
        }

        Err(unrecognized(text))
    }

    fn parse_numeric(&self, text: &str) -> Result<NaiveDate, DateParseError> {
        if let Some(caps) = DOTTED.captures(text) {
            let year: i32 = caps[3].parse().map_err(|_| unrecognized(text))?;
            return build_date(year, parse_number(&caps[2], text)?, parse_number(&caps[1], text)?);
        }
        if let Some(caps) = SLASHED.captures(text) {
            let mut year: i32 = caps[3].parse().map_err(|_| unrecognized(text))?;
            if caps[3].len() == 2 {
                year += 2000;
            }
            return build_date(year, parse_number(&caps[2], text)?, parse_number(&caps[1], text)?);
        }
        if let Some(caps) = ISO.captures(text) {
            let year: i32 = caps[1].parse().map_err(|_| unrecognized(text))?;
            return build_date(year, parse_number(&caps[2], text)?, parse_number(&caps[3], text)?);
        }
        Err(unrecognized(text))
    }

    fn resolve_month(&self, name: &str) -> Result<u32, DateParseError> {
        match month_number(name) {
            Some(month) => Ok(month),
            None => match self.fallback {
                MonthFallback::Strict => Err(DateParseError::UnknownMonth(name.to_string())),
                MonthFallback::January => {
                    warn!("Unknown month name {:?}, defaulting to January", name);
                    Ok(1)
                }
            },
        }
    }

    /// Parses `"<start> - <end>"` or a single date.
    ///
    /// When the part before `" - "` is not a date on its own, the whole text
    /// is parsed as one date, which covers month-day forms like `"Aralık - 25"`.
    /// A failing end side is dropped.
    pub fn parse_range(&self, text: &str) -> Result<DateRange, DateParseError> {
        let text = text.trim();
        if let Some((start_text, end_text)) = text.split_once(" - ") {
            if let Ok(start) = self.parse(start_text) {
                let end = match self.parse(end_text) {
                    Ok(end) => Some(end),
                    Err(e) => {
                        debug!("Dropping unparseable range end {:?}: {}", end_text, e);
                        None
                    }
                };
                return Ok(DateRange { start, end });
            }
        }
        self.parse(text).map(|start| DateRange { start, end: None })
    }
}

fn unrecognized(text: &str) -> DateParseError {
    DateParseError::UnrecognizedFormat(text.to_string())
}

fn parse_number(digits: &str, text: &str) -> Result<u32, DateParseError> {
    digits.parse().map_err(|_| unrecognized(text))
}

fn build_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, DateParseError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or(DateParseError::InvalidDate { year, month, day })
}
