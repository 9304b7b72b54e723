use crate::utils::NidError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Accepted shape of an identity number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdShape {
    /// All-digit number of one of the given lengths. With `allow_grouping`,
    /// digit groups separated by single spaces or hyphens are joined first.
    Digits {
        lengths: Vec<usize>,
        #[serde(default = "default_true")]
        allow_grouping: bool,
    },
    /// Free-form shape, usually mixing letters and digits, matched against
    /// the normalized fragment text.
    Pattern { regex: String },
}

fn default_true() -> bool {
    true
}

/// Which reading wins when both leading date fields are 12 or below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

/// Keyword vocabularies and shapes driving field extraction. Every list is
/// lowercase; multi-word labels are matched token by token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    pub name_labels: Vec<String>,
    pub dob_labels: Vec<String>,
    pub id_labels: Vec<String>,
    /// Words that disqualify a fragment from being a name.
    pub name_stopwords: Vec<String>,
    pub id_shapes: Vec<IdShape>,
    pub min_birth_year: i32,
    pub min_name_letters: usize,
    pub max_name_tokens: usize,
    pub ambiguous_date_order: DateOrder,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for ExtractionRules {
    fn default() -> Self {
        ExtractionRules {
            name_labels: words(&["full name", "name"]),
            dob_labels: words(&["date of birth", "d.o.b", "dob", "birth", "born"]),
            id_labels: words(&["nid", "id", "no", "number"]),
            name_stopwords: words(&[
                "name", "government", "republic", "people's", "peoples", "national",
                "identity", "id", "card", "nid", "no", "number", "date", "birth", "dob",
                "born", "signature", "sex", "gender", "address", "issue", "expiry",
                "blood", "group", "nationality", "citizen",
            ]),
            id_shapes: vec![
                IdShape::Digits {
                    lengths: (10..=17).collect(),
                    allow_grouping: true,
                },
                IdShape::Pattern {
                    regex: r"\b[A-Z]{1,2}[0-9]{7,9}\b".to_string(),
                },
            ],
            min_birth_year: 1900,
            min_name_letters: 3,
            max_name_tokens: 6,
            ambiguous_date_order: DateOrder::DayFirst,
        }
    }
}

impl ExtractionRules {
    pub fn from_json(json: &str) -> Result<Self, NidError> {
        let rules: ExtractionRules = serde_json::from_str(json)
            .map_err(|e| NidError::ConfigError(format!("Failed to parse rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NidError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            NidError::IoError(format!(
                "Failed to read rules file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), NidError> {
        if self.id_shapes.is_empty() {
            return Err(NidError::InvalidRule("at least one id shape is required".to_string()));
        }
        for shape in &self.id_shapes {
            match shape {
                IdShape::Digits { lengths, .. } => {
                    if lengths.is_empty() || lengths.contains(&0) {
                        return Err(NidError::InvalidRule(
                            "digit shape needs non-zero lengths".to_string(),
                        ));
                    }
                }
                IdShape::Pattern { regex } => {
                    Regex::new(regex).map_err(|e| {
                        NidError::InvalidRule(format!("bad id pattern {:?}: {}", regex, e))
                    })?;
                }
            }
        }
        if self.max_name_tokens == 0 {
            return Err(NidError::InvalidRule("max_name_tokens must be positive".to_string()));
        }
        if self.min_birth_year < 1 {
            return Err(NidError::InvalidRule("min_birth_year must be positive".to_string()));
        }
        Ok(())
    }
}
