use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Axis-aligned box in image pixel coordinates, `(x0, y0)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

// Gap limits for "label then value" layouts, in multiples of the taller box height
const RIGHT_GAP_FACTOR: f32 = 3.0;
const BELOW_GAP_FACTOR: f32 = 1.5;

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        BoundingBox {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    /// A box with no area carries no usable geometry.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn vertical_overlap(&self, other: &BoundingBox) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    pub fn horizontal_overlap(&self, other: &BoundingBox) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Whether `next` sits directly to the right of this box on the same text
    /// line, or directly underneath it.
    pub fn is_followed_by(&self, next: &BoundingBox) -> bool {
        if self.is_empty() || next.is_empty() {
            return false;
        }
        let line_height = self.height().max(next.height());

        let same_line =
            self.vertical_overlap(next) >= 0.5 * self.height().min(next.height());
        let gap_right = next.x0 - self.x1;
        if same_line
            && next.x0 >= self.x0
            && gap_right >= -0.5 * line_height
            && gap_right <= RIGHT_GAP_FACTOR * line_height
        {
            return true;
        }

        let gap_below = next.y0 - self.y1;
        let aligned = self.horizontal_overlap(next) > 0.0
            || (next.x0 - self.x0).abs() <= 2.0 * line_height;
        next.y0 >= self.y0 + 0.5 * self.height()
            && gap_below >= -0.5 * line_height
            && gap_below <= BELOW_GAP_FACTOR * line_height
            && aligned
    }
}

fn default_confidence() -> f32 {
    1.0
}

/// One span of text recognized by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFragment {
    pub text: String,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl RecognizedFragment {
    pub fn new(text: impl Into<String>, bounding_box: BoundingBox, confidence: f32) -> Self {
        RecognizedFragment {
            text: text.into(),
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Fragment without geometry, e.g. text supplied by hand.
    pub fn text_only(text: impl Into<String>, confidence: f32) -> Self {
        Self::new(text, BoundingBox::default(), confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Name,
    DateOfBirth,
    IdNumber,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldKind::Name => write!(f, "name"),
            FieldKind::DateOfBirth => write!(f, "dob"),
            FieldKind::IdNumber => write!(f, "nid"),
        }
    }
}

/// A provisional field value pulled out of one fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub field: FieldKind,
    pub value: String,
    pub source_index: usize,
    /// Byte range of the match inside the normalized fragment text.
    pub span: Range<usize>,
    /// Pattern fit multiplied by the fragment's OCR confidence.
    pub score: f32,
    pub confidence: f32,
    /// Set when a label keyword anchors the candidate.
    pub labeled: bool,
}

impl Candidate {
    pub fn overlaps(&self, other: &Candidate) -> bool {
        self.source_index == other.source_index
            && self.span.start < other.span.end
            && other.span.start < self.span.end
    }
}

/// Final output of one extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub name: Option<String>,
    pub dob: Option<String>,
    pub nid: Option<String>,
}

impl ExtractionResult {
    pub fn found_count(&self) -> usize {
        [&self.name, &self.dob, &self.nid]
            .iter()
            .filter(|field| field.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }
}
