use crate::models::{Candidate, ExtractionRules, FieldKind, IdShape};
use crate::processing::normalizer::{label_anchors, LabelAnchor, NormalizedLine};
use crate::utils::NidError;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::cmp::Ordering;
use std::ops::Range;

lazy_static! {
    // Digit runs chained by single spaces or hyphens, e.g. "600 458 9963"
    static ref DIGIT_CHAIN: Regex = Regex::new(r"\d+(?:[ \-]\d+)*").unwrap();
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();
}

// A printed group of a spaced-out number: 3 to 6 groups of 2 to 6 digits
const GROUP_DIGITS: std::ops::RangeInclusive<usize> = 2..=6;
const MIN_GROUPS: usize = 3;
const MAX_GROUPS: usize = 6;

/// Four digits that read as a calendar year, e.g. the tail of a date or an
/// "Issued 2015" stamp printed next to the number.
fn is_year_like(run: &str) -> bool {
    run.len() == 4 && run.parse::<u32>().map_or(false, |y| (1900..=2099).contains(&y))
}

/// Spans, relative to `chain`, of the runs that may be joined into one
/// grouped number. Year-like runs at either end are dropped while enough
/// groups remain.
fn groupable_runs(chain: &str) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = DIGIT_RUN.find_iter(chain).map(|m| m.range()).collect();
    while runs.len() > MIN_GROUPS && is_year_like(&chain[runs[0].clone()]) {
        runs.remove(0);
    }
    while runs.len() > MIN_GROUPS && runs.last().map_or(false, |r| is_year_like(&chain[r.clone()])) {
        runs.pop();
    }
    runs
}

enum CompiledShape {
    Digits { lengths: Vec<usize>, allow_grouping: bool },
    Pattern(Regex),
}

/// Finds the identity number among normalized lines.
pub struct IdMatcher {
    labels: Vec<String>,
    shapes: Vec<CompiledShape>,
}

/// Text standing on its own, not glued to letters or digits on either side.
fn is_isolated(text: &str, span: &Range<usize>) -> bool {
    let before = text[..span.start].chars().next_back();
    let after = text[span.end..].chars().next();
    !before.map_or(false, |c| c.is_alphanumeric()) && !after.map_or(false, |c| c.is_alphanumeric())
}

fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

impl IdMatcher {
    pub fn new(rules: &ExtractionRules) -> Result<Self, NidError> {
        let shapes = rules
            .id_shapes
            .iter()
            .map(|shape| match shape {
                IdShape::Digits { lengths, allow_grouping } => Ok(CompiledShape::Digits {
                    lengths: lengths.clone(),
                    allow_grouping: *allow_grouping,
                }),
                IdShape::Pattern { regex } => Regex::new(regex)
                    .map(CompiledShape::Pattern)
                    .map_err(|e| NidError::InvalidRule(format!("bad id pattern {:?}: {}", regex, e))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IdMatcher {
            labels: rules.id_labels.clone(),
            shapes,
        })
    }

    /// Every shape match in one line as `(span, value)`.
    pub fn matches_in(&self, text: &str) -> Vec<(Range<usize>, String)> {
        let mut found: Vec<(Range<usize>, String)> = Vec::new();
        let mut push = |span: Range<usize>, value: String| {
            if !found.iter().any(|(s, _)| *s == span) {
                found.push((span, value));
            }
        };

        for shape in &self.shapes {
            match shape {
                CompiledShape::Digits { lengths, allow_grouping } => {
                    for chain in DIGIT_CHAIN.find_iter(text) {
                        for run in DIGIT_RUN.find_iter(chain.as_str()) {
                            let span = chain.start() + run.start()..chain.start() + run.end();
                            if lengths.contains(&run.as_str().len()) && is_isolated(text, &span) {
                                push(span, run.as_str().to_string());
                            }
                        }
                        if !*allow_grouping {
                            continue;
                        }
                        // Shorter windows survive when the widest join is later
                        // dropped for overlapping the date
                        let runs = groupable_runs(chain.as_str());
                        for width in MIN_GROUPS..=MAX_GROUPS.min(runs.len()) {
                            for window in runs.windows(width) {
                                if !window.iter().all(|r| GROUP_DIGITS.contains(&r.len())) {
                                    continue;
                                }
                                let span = chain.start() + window[0].start..chain.start() + window[width - 1].end;
                                let value = compact(&text[span.clone()]);
                                if lengths.contains(&value.len()) && is_isolated(text, &span) {
                                    push(span, value);
                                }
                            }
                        }
                    }
                }
                CompiledShape::Pattern(pattern) => {
                    for m in pattern.find_iter(text) {
                        let value = compact(m.as_str());
                        if !value.is_empty() {
                            push(m.range(), value);
                        }
                    }
                }
            }
        }

        found.sort_by_key(|(span, _)| span.start);
        found
    }

    /// A label earlier on the same line, or a label-only line right next to it.
    fn is_labeled(&self, line: &NormalizedLine, span: &Range<usize>, anchors: &[LabelAnchor]) -> bool {
        let inline = self
            .labels
            .iter()
            .filter_map(|label| line.find_phrase(label))
            .any(|label_span| label_span.end <= span.start);
        inline || anchors.iter().any(|anchor| anchor.credits(line))
    }

    /// Candidates that survive the non-reuse rule against `consumed` (the
    /// accepted date) and the longer-match rule.
    pub fn candidates(&self, lines: &[NormalizedLine], consumed: Option<&Candidate>) -> Vec<Candidate> {
        let anchors = label_anchors(lines, &self.labels, |l| !self.matches_in(&l.text).is_empty());
        let mut candidates = Vec::new();
        for line in lines.iter().filter(|l| !l.is_blank()) {
            for (span, value) in self.matches_in(&line.text) {
                let candidate = Candidate {
                    field: FieldKind::IdNumber,
                    labeled: self.is_labeled(line, &span, &anchors),
                    value,
                    source_index: line.index,
                    span,
                    score: line.confidence,
                    confidence: line.confidence,
                };
                if consumed.map_or(false, |date| date.overlaps(&candidate)) {
                    debug!("Skipping id candidate {} already used as date", candidate.value);
                    continue;
                }
                candidates.push(candidate);
            }
        }

        let values: Vec<String> = candidates.iter().map(|c| c.value.clone()).collect();
        candidates.retain(|c| {
            !values
                .iter()
                .any(|other| other.len() > c.value.len() && other.contains(c.value.as_str()))
        });
        candidates
    }

    /// Labeled beats unlabeled, then longer, then higher confidence, then
    /// reading order.
    fn rank(a: &Candidate, b: &Candidate) -> Ordering {
        b.labeled
            .cmp(&a.labeled)
            .then(b.value.len().cmp(&a.value.len()))
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.source_index.cmp(&b.source_index))
            .then(a.span.start.cmp(&b.span.start))
    }

    pub fn find(&self, lines: &[NormalizedLine], consumed: Option<&Candidate>) -> Option<Candidate> {
        let candidates = self.candidates(lines, consumed);
        debug!("{} id candidates", candidates.len());
        candidates.into_iter().min_by(Self::rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecognizedFragment;
    use crate::processing::normalizer::normalize_all;

    fn lines_with(items: &[(&str, f32)]) -> Vec<NormalizedLine> {
        let fragments: Vec<RecognizedFragment> = items
            .iter()
            .map(|(t, c)| RecognizedFragment::text_only(*t, *c))
            .collect();
        normalize_all(&fragments)
    }

    fn lines(texts: &[&str]) -> Vec<NormalizedLine> {
        let items: Vec<(&str, f32)> = texts.iter().map(|t| (*t, 0.9)).collect();
        lines_with(&items)
    }

    fn matcher() -> IdMatcher {
        IdMatcher::new(&ExtractionRules::default()).unwrap()
    }

    fn date_candidate(source_index: usize, span: Range<usize>) -> Candidate {
        Candidate {
            field: FieldKind::DateOfBirth,
            value: "15/03/1990".to_string(),
            source_index,
            span,
            score: 0.9,
            confidence: 0.9,
            labeled: true,
        }
    }

    #[test]
    fn test_labeled_number_found() {
        let best = matcher().find(&lines(&["NID 123456789012345"]), None).unwrap();
        assert_eq!(best.value, "123456789012345");
        assert!(best.labeled);
    }

    #[test]
    fn test_space_grouped_digits_are_joined() {
        let best = matcher().find(&lines(&["ID NO: 600 458 9963"]), None).unwrap();
        assert_eq!(best.value, "6004589963");
    }

    #[test]
    fn test_wrong_lengths_ignored() {
        assert!(matcher().find(&lines(&["123456789", "123456789012345678"]), None).is_none());
    }

    #[test]
    fn test_digits_glued_to_letters_ignored() {
        let rules = ExtractionRules {
            id_shapes: vec![IdShape::Digits { lengths: vec![10], allow_grouping: true }],
            ..ExtractionRules::default()
        };
        let m = IdMatcher::new(&rules).unwrap();
        assert!(m.find(&lines(&["REF1234567890"]), None).is_none());
    }

    #[test]
    fn test_alphanumeric_shape() {
        let best = matcher().find(&lines(&["Passport AB1234567"]), None).unwrap();
        assert_eq!(best.value, "AB1234567");
    }

    #[test]
    fn test_substring_of_longer_match_rejected() {
        let candidates = matcher().candidates(&lines(&["1234 5678 9012 3456"]), None);
        let values: Vec<&str> = candidates.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["1234567890123456"]);
    }

    #[test]
    fn test_year_beside_grouped_number_not_joined() {
        let best = matcher().find(&lines(&["Issued 2015 600 458 9963"]), None).unwrap();
        assert_eq!(best.value, "6004589963");
        let best = matcher().find(&lines(&["600 458 9963 2015"]), None).unwrap();
        assert_eq!(best.value, "6004589963");
    }

    #[test]
    fn test_grouped_number_after_consumed_date() {
        let input = lines(&["15/03/1990 600 458 9963"]);
        let best = matcher().find(&input, Some(&date_candidate(0, 0..10))).unwrap();
        assert_eq!(best.value, "6004589963");

        let input = lines(&["15 03 1990 600 458 9963"]);
        let best = matcher().find(&input, Some(&date_candidate(0, 0..10))).unwrap();
        assert_eq!(best.value, "6004589963");
    }

    #[test]
    fn test_inline_label_does_not_spill_to_next_line() {
        let input = lines(&["NID 1234567890", "Phone 98765432101234"]);
        let best = matcher().find(&input, None).unwrap();
        assert_eq!(best.value, "1234567890");
        assert!(best.labeled);
    }

    #[test]
    fn test_label_after_number_counts() {
        let input = lines_with(&[("98765432101234", 0.9), ("1234567890", 0.9), ("NID", 0.9)]);
        assert_eq!(matcher().find(&input, None).unwrap().value, "1234567890");
    }

    #[test]
    fn test_date_fragment_not_reused() {
        let rules = ExtractionRules {
            id_shapes: vec![IdShape::Digits { lengths: vec![8], allow_grouping: true }],
            ..ExtractionRules::default()
        };
        let m = IdMatcher::new(&rules).unwrap();
        let input = lines(&["1990-03-15"]);
        assert_eq!(m.find(&input, None).unwrap().value, "19900315");
        assert!(m.find(&input, Some(&date_candidate(0, 0..10))).is_none());
    }

    #[test]
    fn test_number_beside_consumed_date_still_found() {
        let input = lines(&["15 03 1990 1234567890"]);
        let best = matcher().find(&input, Some(&date_candidate(0, 0..10))).unwrap();
        assert_eq!(best.value, "1234567890");
    }

    #[test]
    fn test_label_beats_length() {
        let input = lines(&["12345678901234567", "NID", "9876543210"]);
        assert_eq!(matcher().find(&input, None).unwrap().value, "9876543210");
    }

    #[test]
    fn test_length_then_confidence_break_ties() {
        let input = lines_with(&[("1234567890", 0.99), ("9876543210123", 0.5)]);
        assert_eq!(matcher().find(&input, None).unwrap().value, "9876543210123");

        let input = lines_with(&[("1111111111", 0.5), ("2222222222", 0.7)]);
        assert_eq!(matcher().find(&input, None).unwrap().value, "2222222222");
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let rules = ExtractionRules {
            id_shapes: vec![IdShape::Pattern { regex: "(".to_string() }],
            ..ExtractionRules::default()
        };
        assert!(matches!(IdMatcher::new(&rules), Err(NidError::InvalidRule(_))));
    }
}
