use crate::models::{ExtractionResult, RecognizedFragment};
use crate::processing::assembler::{joined_text, FieldExtractor};
use crate::processing::ocr::OcrEngine;
use crate::utils::NidError;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

const TEXT_PREVIEW_CHARS: usize = 200;

/// Fields found on one card plus the raw text they were read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDocument {
    #[serde(flatten)]
    pub result: ExtractionResult,
    pub extracted_text: String,
}

pub struct NidParser {
    engine: Arc<dyn OcrEngine>,
    extractor: FieldExtractor,
}

impl NidParser {
    pub fn new(engine: Arc<dyn OcrEngine>, extractor: FieldExtractor) -> Self {
        NidParser { engine, extractor }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// OCR the image, then extract fields from what it returned.
    pub fn parse_image(&self, image_data: &[u8]) -> Result<ParsedDocument, NidError> {
        info!("Running {} OCR on {} byte image", self.engine.name(), image_data.len());
        let fragments = self.engine.recognize(image_data)?;
        Ok(self.parse_fragments(&fragments))
    }

    /// Extract fields from fragments that were already recognized.
    pub fn parse_fragments(&self, fragments: &[RecognizedFragment]) -> ParsedDocument {
        ParsedDocument::from_fragments(&self.extractor, fragments)
    }
}

impl ParsedDocument {
    /// Run extraction without an OCR engine, e.g. on fragments saved earlier.
    pub fn from_fragments(extractor: &FieldExtractor, fragments: &[RecognizedFragment]) -> Self {
        let extracted_text = joined_text(fragments);
        debug!(
            "OCR text ({} fragments): {}",
            fragments.len(),
            extracted_text.chars().take(TEXT_PREVIEW_CHARS).collect::<String>()
        );

        let result = extractor.extract(fragments);
        info!("Extracted {}/3 fields", result.found_count());

        ParsedDocument {
            result,
            extracted_text,
        }
    }
}
