// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temporal index (day bucket -> memory ids) and natural-language temporal
//! reference parsing.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Format of temporal index bucket keys.
const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// Calendar-day bucket key for a timestamp.
pub fn day_key(ts: DateTime<Utc>) -> String {
    ts.format(DAY_KEY_FORMAT).to_string()
}

/// Map from calendar day to the ids of memories recorded on that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemporalIndex {
    days: BTreeMap<String, BTreeSet<String>>,
}

impl TemporalIndex {
    pub fn insert(&mut self, ts: DateTime<Utc>, id: &str) {
        self.days.entry(day_key(ts)).or_default().insert(id.to_string());
    }

    pub fn remove(&mut self, ts: DateTime<Utc>, id: &str) {
        let key = day_key(ts);
        if let Some(ids) = self.days.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.days.remove(&key);
            }
        }
    }

    /// Ids in buckets from `start` to `end` inclusive.
    pub fn ids_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<&str> {
        if start > end {
            return Vec::new();
        }
        let lo = start.format(DAY_KEY_FORMAT).to_string();
        let hi = end.format(DAY_KEY_FORMAT).to_string();
        self.days
            .range(lo..=hi)
            .flat_map(|(_, ids)| ids.iter().map(String::as_str))
            .collect()
    }

    /// Number of indexed ids.
    pub fn len(&self) -> usize {
        self.days.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Rebuild from authoritative records, returning whether anything changed.
    pub fn reconcile<'a, I>(&mut self, records: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, DateTime<Utc>)>,
    {
        let mut rebuilt = TemporalIndex::default();
        for (id, ts) in records {
            rebuilt.insert(ts, id);
        }
        let changed = rebuilt != *self;
        *self = rebuilt;
        changed
    }
}

/// Whether a reference was relative to now or a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Relative,
    Absolute,
}

/// A temporal reference recognized in free text.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalReference {
    pub kind: TemporalKind,
    /// Calendar day the phrase points at.
    pub target_date: NaiveDate,
    /// Exact instant for relative references (`now - offset`).
    pub anchor: DateTime<Utc>,
    /// The matched phrase, lowercased.
    pub phrase: String,
}

impl TemporalReference {
    /// Build a filter with the given tolerance in days.
    pub fn to_filter(&self, tolerance_days: i64) -> TemporalFilter {
        TemporalFilter {
            kind: self.kind,
            target: self.anchor,
            tolerance_days,
        }
    }
}

/// Relative phrases and their day offset, longest phrases first so that
/// "day before yesterday" wins over "yesterday".
const RELATIVE_PHRASES: &[(&str, i64)] = &[
    ("day before yesterday", 2),
    ("couple of days ago", 2),
    ("couple days ago", 2),
    ("the other day", 2),
    ("few days ago", 3),
    ("two weeks ago", 14),
    ("earlier today", 0),
    ("this morning", 0),
    ("a month ago", 30),
    ("last month", 30),
    ("last night", 1),
    ("a week ago", 7),
    ("last week", 7),
    ("last year", 365),
    ("yesterday", 1),
    ("recently", 1),
    ("tonight", 0),
    ("lately", 1),
    ("today", 0),
];

static COUNTED_AGO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten)\s+(day|week|month|year)s?\s+ago\b")
        .unwrap()
});

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap()
});

static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap()
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?\b"
    ))
    .unwrap()
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\.?(?:,?\s+(\d{{4}}))?\b"
    ))
    .unwrap()
});

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

fn month_number(name: &str) -> Option<u32> {
    let n = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

fn small_number(word: &str) -> Option<i64> {
    if let Ok(n) = word.parse::<i64>() {
        return Some(n);
    }
    let n = match word {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(n)
}

/// Recognize a temporal reference in `text`, relative to `now`.
///
/// Absolute dates take precedence over relative phrases. Returns `None` when
/// nothing is recognized.
pub fn parse_temporal_reference(text: &str, now: DateTime<Utc>) -> Option<TemporalReference> {
    let lowered = text.to_lowercase();
    parse_absolute(&lowered, now).or_else(|| parse_relative(&lowered, now))
}

fn parse_relative(lowered: &str, now: DateTime<Utc>) -> Option<TemporalReference> {
    let relative = |days: i64, phrase: &str| {
        let anchor = now - Duration::days(days);
        TemporalReference {
            kind: TemporalKind::Relative,
            target_date: anchor.date_naive(),
            anchor,
            phrase: phrase.to_string(),
        }
    };

    if let Some(caps) = COUNTED_AGO.captures(lowered) {
        let count = small_number(&caps[1])?;
        let unit_days = match &caps[2] {
            "day" => 1,
            "week" => 7,
            "month" => 30,
            _ => 365,
        };
        return Some(relative(count * unit_days, &caps[0]));
    }

    let padded = format!(
        " {} ",
        lowered
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    );
    RELATIVE_PHRASES
        .iter()
        .find(|(phrase, _)| padded.contains(&format!(" {phrase} ")))
        .map(|(phrase, days)| relative(*days, phrase))
}

fn parse_absolute(lowered: &str, now: DateTime<Utc>) -> Option<TemporalReference> {
    let today = now.date_naive();
    let absolute = |date: NaiveDate, phrase: &str| TemporalReference {
        kind: TemporalKind::Absolute,
        target_date: date,
        anchor: date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc(),
        phrase: phrase.to_string(),
    };

    if let Some(caps) = ISO_DATE.captures(lowered) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return Some(absolute(date, &caps[0]));
    }
    if let Some(caps) = SLASH_DATE.captures(lowered) {
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().ok()?,
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
        )?;
        return Some(absolute(date, &caps[0]));
    }
    if let Some(caps) = MONTH_DAY.captures(lowered) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let date = resolve_year(month, day, caps.get(3).map(|m| m.as_str()), today)?;
        return Some(absolute(date, &caps[0]));
    }
    if let Some(caps) = DAY_MONTH.captures(lowered) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let date = resolve_year(month, day, caps.get(3).map(|m| m.as_str()), today)?;
        return Some(absolute(date, &caps[0]));
    }
    None
}

/// Explicit year, or the most recent occurrence of month/day not after today.
fn resolve_year(month: u32, day: u32, year: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(year) = year {
        return NaiveDate::from_ymd_opt(year.parse().ok()?, month, day);
    }
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if this_year > today {
        NaiveDate::from_ymd_opt(today.year() - 1, month, day)
    } else {
        Some(this_year)
    }
}

/// Temporal gate applied to search candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFilter {
    pub kind: TemporalKind,
    /// Relative: the exact instant; absolute: noon of the target day.
    pub target: DateTime<Utc>,
    /// Allowed deviation in days.
    pub tolerance_days: i64,
}

impl TemporalFilter {
    /// Inclusive range of day buckets that can contain matches.
    pub fn day_range(&self) -> (NaiveDate, NaiveDate) {
        let tolerance = Duration::days(self.tolerance_days.max(0));
        match self.kind {
            TemporalKind::Relative => (
                (self.target - tolerance).date_naive(),
                (self.target + tolerance).date_naive(),
            ),
            TemporalKind::Absolute => {
                let day = self.target.date_naive();
                (day - tolerance, day + tolerance)
            }
        }
    }

    /// Whether `ts` lies within tolerance of the target.
    pub fn matches(&self, ts: DateTime<Utc>) -> bool {
        let tolerance = self.tolerance_days.max(0);
        match self.kind {
            TemporalKind::Relative => (ts - self.target).abs() <= Duration::days(tolerance),
            TemporalKind::Absolute => {
                (ts.date_naive() - self.target.date_naive()).num_days().abs() <= tolerance
            }
        }
    }

    /// Ids from `index` whose bucket falls in range. Callers still apply
    /// [`matches`](Self::matches) to the exact timestamp.
    pub fn candidate_ids<'a>(&self, index: &'a TemporalIndex) -> HashSet<&'a str> {
        let (start, end) = self.day_range();
        index.ids_between(start, end).into_iter().collect()
    }
}
