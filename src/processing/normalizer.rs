use crate::models::{BoundingBox, RecognizedFragment};
use std::ops::Range;

/// Lowercase word with surrounding punctuation removed. `span` indexes the
/// normalized line text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub span: Range<usize>,
}

/// A fragment prepared for pattern matching. `original` keeps the OCR text
/// untouched; `text` is the whitespace-collapsed form all spans refer to.
#[derive(Debug, Clone)]
pub struct NormalizedLine {
    pub index: usize,
    pub original: String,
    pub text: String,
    pub lower: String,
    pub tokens: Vec<Token>,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

/// Trim and collapse whitespace runs to single spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_word(word: &str) -> (usize, &str) {
    let trimmed_start = word.trim_start_matches(|c: char| !c.is_alphanumeric());
    let offset = word.len() - trimmed_start.len();
    (offset, trimmed_start.trim_end_matches(|c: char| !c.is_alphanumeric()))
}

/// Split on whitespace and colons; OCR often glues a label to its value
/// ("NID:1234567890").
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = None;

    let push = |from: usize, to: usize, tokens: &mut Vec<Token>| {
        let (offset, word) = trim_word(&text[from..to]);
        if !word.is_empty() {
            let begin = from + offset;
            tokens.push(Token {
                text: word.to_lowercase(),
                span: begin..begin + word.len(),
            });
        }
    };

    for (i, c) in text.char_indices() {
        if c.is_whitespace() || c == ':' {
            if let Some(from) = start.take() {
                push(from, i, &mut tokens);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(from) = start {
        push(from, text.len(), &mut tokens);
    }

    tokens
}

pub fn normalize_fragment(index: usize, fragment: &RecognizedFragment) -> NormalizedLine {
    let text = normalize_text(&fragment.text);
    NormalizedLine {
        index,
        original: fragment.text.clone(),
        lower: text.to_lowercase(),
        tokens: tokenize(&text),
        text,
        bounding_box: fragment.bounding_box,
        confidence: fragment.confidence,
    }
}

pub fn normalize_all(fragments: &[RecognizedFragment]) -> Vec<NormalizedLine> {
    fragments
        .iter()
        .enumerate()
        .map(|(index, fragment)| normalize_fragment(index, fragment))
        .collect()
}

impl NormalizedLine {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte span of the first token-wise occurrence of `phrase`.
    pub fn find_phrase(&self, phrase: &str) -> Option<Range<usize>> {
        let wanted: Vec<String> = tokenize(phrase).into_iter().map(|t| t.text).collect();
        if wanted.is_empty() || wanted.len() > self.tokens.len() {
            return None;
        }

        self.tokens.windows(wanted.len()).find_map(|window| {
            let matches = window
                .iter()
                .zip(wanted.iter())
                .all(|(token, word)| &token.text == word);
            if matches {
                Some(window[0].span.start..window[window.len() - 1].span.end)
            } else {
                None
            }
        })
    }

    /// Earliest occurrence of any phrase; the longer one wins at equal start.
    pub fn find_any_phrase(&self, phrases: &[String]) -> Option<Range<usize>> {
        phrases
            .iter()
            .filter_map(|phrase| self.find_phrase(phrase))
            .min_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)))
    }

    pub fn contains_any_phrase(&self, phrases: &[String]) -> bool {
        self.find_any_phrase(phrases).is_some()
    }

    /// Whether `next` reads directly after this line: to its right on the same
    /// line or right below it. Without geometry on either side, falls back to
    /// consecutive reading order.
    pub fn is_followed_by(&self, next: &NormalizedLine) -> bool {
        if self.bounding_box.is_empty() || next.bounding_box.is_empty() {
            return next.index == self.index + 1;
        }
        self.bounding_box.is_followed_by(&next.bounding_box)
    }
}

/// A line holding a field label but no value of that field.
#[derive(Debug, Clone)]
pub struct LabelAnchor<'a> {
    pub line: &'a NormalizedLine,
    /// Some valued line already reads right after this label.
    pub leads_value: bool,
}

impl LabelAnchor<'_> {
    /// The label names the value on `line`: `line` reads right after it, or
    /// right before it when the label has nothing after it.
    pub fn credits(&self, line: &NormalizedLine) -> bool {
        if self.line.index == line.index {
            return false;
        }
        self.line.is_followed_by(line) || (!self.leads_value && line.is_followed_by(self.line))
    }
}

/// Label-only lines for one field. `has_value` tells whether a line carries a
/// value of that field; a label line that does is not an anchor.
pub fn label_anchors<'a, F>(lines: &'a [NormalizedLine], labels: &[String], has_value: F) -> Vec<LabelAnchor<'a>>
where
    F: Fn(&NormalizedLine) -> bool,
{
    let valued: Vec<&NormalizedLine> = lines.iter().filter(|l| has_value(*l)).collect();
    lines
        .iter()
        .filter(|line| line.contains_any_phrase(labels))
        .filter(|line| !valued.iter().any(|v| v.index == line.index))
        .map(|line| LabelAnchor {
            line,
            leads_value: valued
                .iter()
                .any(|v| v.index != line.index && line.is_followed_by(v)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> NormalizedLine {
        normalize_fragment(0, &RecognizedFragment::text_only(text, 0.9))
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(normalize_text("  JOHN \t  DOE\n"), "JOHN DOE");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_original_text_is_preserved() {
        let normalized = line("  Name:   JOHN  DOE ");
        assert_eq!(normalized.original, "  Name:   JOHN  DOE ");
        assert_eq!(normalized.text, "Name: JOHN DOE");
        assert_eq!(normalized.lower, "name: john doe");
    }

    #[test]
    fn test_tokens_strip_punctuation() {
        let normalized = line("D.O.B: 15/03/1990, No.");
        let words: Vec<&str> = normalized.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["d.o.b", "15/03/1990", "no"]);
        assert_eq!(&normalized.text[normalized.tokens[1].span.clone()], "15/03/1990");
    }

    #[test]
    fn test_colon_splits_glued_label() {
        let normalized = line("NID:1234567890");
        let words: Vec<&str> = normalized.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["nid", "1234567890"]);
    }

    #[test]
    fn test_find_phrase_is_token_wise() {
        let normalized = line("Date of Birth 15 Mar 1990");
        assert_eq!(normalized.find_phrase("date of birth"), Some(0..13));
        assert_eq!(normalized.find_phrase("birth"), Some(8..13));
        // "id" must not match inside "valid"
        assert_eq!(line("valid until").find_phrase("id"), None);
    }

    #[test]
    fn test_find_any_phrase_prefers_earliest_then_longest() {
        let normalized = line("Full Name: JOHN DOE");
        let phrases = vec!["name".to_string(), "full name".to_string()];
        assert_eq!(normalized.find_any_phrase(&phrases), Some(0..9));
    }

    #[test]
    fn test_reading_order_fallback_without_geometry() {
        let fragments = vec![
            RecognizedFragment::text_only("Name", 0.9),
            RecognizedFragment::text_only("JOHN DOE", 0.9),
            RecognizedFragment::text_only("DOB", 0.9),
        ];
        let lines = normalize_all(&fragments);
        assert!(lines[0].is_followed_by(&lines[1]));
        assert!(!lines[0].is_followed_by(&lines[2]));
        assert!(!lines[1].is_followed_by(&lines[0]));
    }

    #[test]
    fn test_label_with_inline_value_is_not_an_anchor() {
        let fragments = vec![
            RecognizedFragment::text_only("DOB 15/03/1990", 0.9),
            RecognizedFragment::text_only("DOB", 0.9),
            RecognizedFragment::text_only("01/01/2015", 0.9),
        ];
        let lines = normalize_all(&fragments);
        let labels = vec!["dob".to_string()];
        let anchors = label_anchors(&lines, &labels, |l| l.text.contains('/'));
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].line.index, 1);
        assert!(anchors[0].leads_value);
        assert!(anchors[0].credits(&lines[2]));
        assert!(!anchors[0].credits(&lines[0]));
    }

    #[test]
    fn test_trailing_label_credits_preceding_value() {
        let fragments = vec![
            RecognizedFragment::text_only("01/01/2015", 0.9),
            RecognizedFragment::text_only("15/03/1990", 0.9),
            RecognizedFragment::text_only("DOB", 0.9),
        ];
        let lines = normalize_all(&fragments);
        let labels = vec!["dob".to_string()];
        let anchors = label_anchors(&lines, &labels, |l| l.text.contains('/'));
        assert_eq!(anchors.len(), 1);
        assert!(!anchors[0].leads_value);
        assert!(anchors[0].credits(&lines[1]));
        assert!(!anchors[0].credits(&lines[0]));
    }
}
