use crate::models::{Candidate, ExtractionResult, ExtractionRules, RecognizedFragment};
use crate::processing::dob::DobMatcher;
use crate::processing::id_number::IdMatcher;
use crate::processing::name::NameMatcher;
use crate::processing::normalizer::{normalize_all, normalize_text, NormalizedLine};
use crate::utils::NidError;
use chrono::NaiveDate;
use log::debug;

/// Runs the three field matchers over one OCR pass and merges their picks.
pub struct FieldExtractor {
    dob: DobMatcher,
    id: IdMatcher,
    name: NameMatcher,
}

impl FieldExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self, NidError> {
        rules.validate()?;
        Ok(FieldExtractor {
            dob: DobMatcher::new(rules),
            id: IdMatcher::new(rules)?,
            name: NameMatcher::new(rules),
        })
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.dob = self.dob.with_today(today);
        self
    }

    pub fn extract(&self, fragments: &[RecognizedFragment]) -> ExtractionResult {
        self.extract_lines(&normalize_all(fragments))
    }

    pub fn extract_lines(&self, lines: &[NormalizedLine]) -> ExtractionResult {
        let dob = self.dob.find(lines);
        // The date's text is off limits to the id matcher
        let nid = self.id.find(lines, dob.as_ref());
        let name = self.name.find(lines);
        assemble(name, dob, nid)
    }
}

/// Build the output record; a missing candidate becomes a missing field.
pub fn assemble(
    name: Option<Candidate>,
    dob: Option<Candidate>,
    nid: Option<Candidate>,
) -> ExtractionResult {
    for candidate in [&name, &dob, &nid].into_iter().flatten() {
        debug!(
            "Accepted {} {:?} from fragment {} (score {:.2}, labeled: {})",
            candidate.field, candidate.value, candidate.source_index, candidate.score, candidate.labeled
        );
    }

    ExtractionResult {
        name: name.map(|c| c.value),
        dob: dob.map(|c| c.value),
        nid: nid.map(|c| c.value),
    }
}

/// All fragment text in reading order, joined by single spaces.
pub fn joined_text(fragments: &[RecognizedFragment]) -> String {
    fragments
        .iter()
        .map(|f| normalize_text(&f.text))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
