use crate::models::{Candidate, DateOrder, ExtractionRules, FieldKind};
use crate::processing::normalizer::{label_anchors, LabelAnchor, NormalizedLine};
use chrono::{Datelike, Local, NaiveDate};
use lazy_static::lazy_static;
use log::debug;
use regex::{Captures, Regex};
use std::cmp::Ordering;

/// Output format for every accepted date.
pub const CANONICAL_DATE_FORMAT: &str = "%d/%m/%Y";

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum DateShape {
    YearFirst,
    YearLast,
    DayMonthName,
    MonthNameDay,
}

lazy_static! {
    static ref DATE_PATTERNS: Vec<(DateShape, Regex)> = vec![
        // 1990.03.15
        (DateShape::YearFirst, Regex::new(r"\b(\d{4})[/.\- ](\d{1,2})[/.\- ](\d{1,2})\b").unwrap()),
        // 15-03-1990 or 03/15/1990
        (DateShape::YearLast, Regex::new(r"\b(\d{1,2})[/.\- ](\d{1,2})[/.\- ](\d{4})\b").unwrap()),
        // 15 Mar 1990, 15-March-1990, 15th March 1990
        (DateShape::DayMonthName, Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[ .\-/]*([a-z]{3,9})\.?[ .,\-/]*(\d{4})\b").unwrap()),
        // March 15, 1990
        (DateShape::MonthNameDay, Regex::new(r"(?i)\b([a-z]{3,9})\.?[ .\-/]*(\d{1,2})(?:st|nd|rd|th)?,?[ .\-/]*(\d{4})\b").unwrap()),
    ];
}

/// Month number for a full or abbreviated English month name ("Mar",
/// "Sept", "December").
pub fn month_from_name(word: &str) -> Option<u32> {
    let word = word.trim_end_matches('.').to_lowercase();
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(&word))
        .map(|i| i as u32 + 1)
}

fn number(caps: &Captures, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

/// Finds the date of birth among normalized lines.
pub struct DobMatcher {
    labels: Vec<String>,
    min_year: i32,
    ambiguous_order: DateOrder,
    today: NaiveDate,
}

impl DobMatcher {
    pub fn new(rules: &ExtractionRules) -> Self {
        DobMatcher {
            labels: rules.dob_labels.clone(),
            min_year: rules.min_birth_year,
            ambiguous_order: rules.ambiguous_date_order,
            today: Local::now().naive_local().date(),
        }
    }

    /// Pin "today" so the plausibility window does not move under tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn resolve(&self, shape: DateShape, caps: &Captures) -> Option<NaiveDate> {
        let (year, month, day) = match shape {
            DateShape::YearFirst => (number(caps, 1)?, number(caps, 2)?, number(caps, 3)?),
            DateShape::YearLast => {
                let first = number(caps, 1)?;
                let second = number(caps, 2)?;
                let year = number(caps, 3)?;
                // A field above 12 can only be the day
                let day_first = if first > 12 {
                    true
                } else if second > 12 {
                    false
                } else {
                    self.ambiguous_order == DateOrder::DayFirst
                };
                if day_first {
                    (year, second, first)
                } else {
                    (year, first, second)
                }
            }
            DateShape::DayMonthName => (
                number(caps, 3)?,
                month_from_name(caps.get(2)?.as_str())?,
                number(caps, 1)?,
            ),
            DateShape::MonthNameDay => (
                number(caps, 3)?,
                month_from_name(caps.get(1)?.as_str())?,
                number(caps, 2)?,
            ),
        };

        let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
        if date.year() < self.min_year || date > self.today {
            return None;
        }
        Some(date)
    }

    /// Every calendar-valid date in one line as `(span, date)`, in text order.
    pub fn dates_in(&self, text: &str) -> Vec<(std::ops::Range<usize>, NaiveDate)> {
        let mut found: Vec<(std::ops::Range<usize>, NaiveDate)> = Vec::new();
        for (shape, pattern) in DATE_PATTERNS.iter() {
            for caps in pattern.captures_iter(text) {
                let whole = match caps.get(0) {
                    Some(m) => m,
                    None => continue,
                };
                if let Some(date) = self.resolve(*shape, &caps) {
                    let span = whole.range();
                    if !found.iter().any(|(s, _)| s.start < span.end && span.start < s.end) {
                        found.push((span, date));
                    }
                }
            }
        }
        found.sort_by_key(|(span, _)| span.start);
        found
    }

    /// Canonical `DD/MM/YYYY` form of the first valid date in `text`.
    pub fn canonicalize(&self, text: &str) -> Option<String> {
        self.dates_in(text)
            .first()
            .map(|(_, date)| date.format(CANONICAL_DATE_FORMAT).to_string())
    }

    /// Inline label, or a label-only line right next to this one.
    fn is_labeled(&self, line: &NormalizedLine, anchors: &[LabelAnchor]) -> bool {
        line.contains_any_phrase(&self.labels) || anchors.iter().any(|anchor| anchor.credits(line))
    }

    pub fn candidates(&self, lines: &[NormalizedLine]) -> Vec<Candidate> {
        let anchors = label_anchors(lines, &self.labels, |l| !self.dates_in(&l.text).is_empty());
        let mut candidates = Vec::new();
        for line in lines.iter().filter(|l| !l.is_blank()) {
            let dates = self.dates_in(&line.text);
            if dates.is_empty() {
                continue;
            }
            let labeled = self.is_labeled(line, &anchors);
            for (span, date) in dates {
                candidates.push(Candidate {
                    field: FieldKind::DateOfBirth,
                    value: date.format(CANONICAL_DATE_FORMAT).to_string(),
                    source_index: line.index,
                    span,
                    score: line.confidence,
                    confidence: line.confidence,
                    labeled,
                });
            }
        }
        candidates
    }

    /// Labeled beats unlabeled, then higher confidence, then reading order.
    fn rank(a: &Candidate, b: &Candidate) -> Ordering {
        b.labeled
            .cmp(&a.labeled)
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.source_index.cmp(&b.source_index))
            .then(a.span.start.cmp(&b.span.start))
    }

    pub fn find(&self, lines: &[NormalizedLine]) -> Option<Candidate> {
        let candidates = self.candidates(lines);
        debug!("{} date candidates", candidates.len());
        candidates.into_iter().min_by(Self::rank)
    }
}
