use crate::models::{Candidate, ExtractionRules, FieldKind};
use crate::processing::normalizer::NormalizedLine;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::cmp::Ordering;

lazy_static! {
    static ref HONORIFIC: Regex = Regex::new(r"(?i)^md[.,:\-]?$").unwrap();
}

/// Finds the holder's name among normalized lines.
pub struct NameMatcher {
    labels: Vec<String>,
    stopwords: Vec<String>,
    min_letters: usize,
    max_tokens: usize,
}

/// Part of a line that may hold a name, after any leading name label.
struct NameSlot<'a> {
    text: &'a str,
    offset: usize,
    after_label: bool,
}

impl NameMatcher {
    pub fn new(rules: &ExtractionRules) -> Self {
        NameMatcher {
            labels: rules.name_labels.clone(),
            stopwords: rules.name_stopwords.clone(),
            min_letters: rules.min_name_letters,
            max_tokens: rules.max_name_tokens,
        }
    }

    fn slot<'a>(&self, line: &'a NormalizedLine) -> NameSlot<'a> {
        match line.find_any_phrase(&self.labels) {
            Some(label) if label.start == 0 => {
                let rest = &line.text[label.end..];
                let value = rest.trim_start_matches(|c: char| {
                    c.is_whitespace() || matches!(c, ':' | '-' | '.' | ',' | ';')
                });
                NameSlot {
                    offset: line.text.len() - value.len(),
                    text: value.trim_end(),
                    after_label: true,
                }
            }
            _ => NameSlot {
                text: &line.text,
                offset: 0,
                after_label: false,
            },
        }
    }

    /// A line made only of a name label, used as a positional anchor.
    fn is_label_only(&self, line: &NormalizedLine) -> bool {
        let slot = self.slot(line);
        slot.after_label && slot.text.is_empty()
    }

    fn is_stopword(&self, word: &str) -> bool {
        let bare = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        self.stopwords.iter().any(|stop| *stop == bare)
    }

    /// Cleaned name if `text` reads like a personal name, otherwise `None`.
    pub fn qualify(&self, text: &str) -> Option<String> {
        let mut words: Vec<&str> = text
            .split_whitespace()
            .map(|w| w.trim_end_matches(|c: char| c == ',' || c == ';'))
            .filter(|w| !w.is_empty())
            .collect();

        let honorific = match words.first() {
            Some(first) if HONORIFIC.is_match(first) => {
                words.remove(0);
                true
            }
            _ => false,
        };

        // OCR tends to leave a stray single letter after the surname
        if words.len() > 1 && words.last().map_or(false, |w| w.chars().count() == 1) {
            words.pop();
        }

        if words.is_empty() || words.len() > self.max_tokens {
            return None;
        }

        for word in &words {
            let starts_upper = word.chars().next().map_or(false, |c| c.is_uppercase());
            let name_chars = word
                .chars()
                .all(|c| c.is_alphabetic() || matches!(c, '\'' | '-' | '.'));
            if !starts_upper || !name_chars || self.is_stopword(word) {
                return None;
            }
        }

        let letters: usize = words
            .iter()
            .map(|w| w.chars().filter(|c| c.is_alphabetic()).count())
            .sum();
        if letters < self.min_letters {
            return None;
        }

        let joined = words.join(" ");
        Some(if honorific {
            format!("MD. {}", joined)
        } else {
            joined
        })
    }

    pub fn candidates(&self, lines: &[NormalizedLine]) -> Vec<Candidate> {
        let anchors: Vec<&NormalizedLine> = lines.iter().filter(|l| self.is_label_only(l)).collect();

        lines
            .iter()
            .filter(|l| !l.is_blank())
            .filter_map(|line| {
                let slot = self.slot(line);
                let value = self.qualify(slot.text)?;
                let labeled = slot.after_label
                    || anchors
                        .iter()
                        .any(|anchor| anchor.index != line.index && anchor.is_followed_by(line));
                Some(Candidate {
                    field: FieldKind::Name,
                    value,
                    source_index: line.index,
                    span: slot.offset..slot.offset + slot.text.len(),
                    score: line.confidence,
                    confidence: line.confidence,
                    labeled,
                })
            })
            .collect()
    }

    /// Label adjacency wins outright, then the longest value, then higher
    /// confidence, then reading order.
    fn rank(a: &Candidate, b: &Candidate) -> Ordering {
        b.labeled
            .cmp(&a.labeled)
            .then(b.value.chars().count().cmp(&a.value.chars().count()))
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.source_index.cmp(&b.source_index))
    }

    pub fn find(&self, lines: &[NormalizedLine]) -> Option<Candidate> {
        let candidates = self.candidates(lines);
        debug!("{} name candidates", candidates.len());
        candidates.into_iter().min_by(Self::rank)
    }
}
