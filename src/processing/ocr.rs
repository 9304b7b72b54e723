use crate::models::{BoundingBox, RecognizedFragment};
use crate::processing::image::ImageProcessor;
use crate::utils::NidError;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use tesseract::{PageSegMode, Tesseract};

/// Anything that turns image bytes into positioned text fragments.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fragments in the engine's reading order.
    fn recognize(&self, image_data: &[u8]) -> Result<Vec<RecognizedFragment>, NidError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// Tesseract language code, e.g. "eng" or "eng+ben".
    pub language: String,
    /// Directory holding the `.traineddata` files; `None` uses the system default.
    pub datapath: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        OcrConfig {
            language: "eng".to_string(),
            datapath: None,
        }
    }
}

/// Tesseract-backed engine. The handle is expensive to build, so one is kept
/// and reused; a call that fails mid-way drops it and the next call rebuilds.
pub struct TesseractEngine {
    config: OcrConfig,
    api: Mutex<Option<Tesseract>>,
}

impl TesseractEngine {
    pub fn new(config: OcrConfig) -> Result<Self, NidError> {
        let api = Self::init_api(&config)?;
        Ok(TesseractEngine {
            config,
            api: Mutex::new(Some(api)),
        })
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn init_api(config: &OcrConfig) -> Result<Tesseract, NidError> {
        info!(
            "Initializing Tesseract (language: {}, datapath: {})",
            config.language,
            config.datapath.as_deref().unwrap_or("default")
        );
        Tesseract::new(config.datapath.as_deref(), Some(&config.language))
            .map_err(|e| NidError::OcrInitError(format!("Tesseract init error: {}", e)))
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&self, image_data: &[u8]) -> Result<Vec<RecognizedFragment>, NidError> {
        let png = ImageProcessor::prepare(image_data)?;

        let mut guard = self
            .api
            .lock()
            .map_err(|_| NidError::OcrError("OCR engine lock poisoned".to_string()))?;
        let api = match guard.take() {
            Some(api) => api,
            None => Self::init_api(&self.config)?,
        };

        let mut api = api
            .set_image_from_mem(&png)
            .map_err(|e| NidError::OcrError(format!("Tesseract set image error: {}", e)))?;
        api.set_page_seg_mode(PageSegMode::PsmAuto);
        let mut api = api
            .recognize()
            .map_err(|e| NidError::OcrError(format!("Tesseract recognition error: {}", e)))?;
        let tsv = api
            .get_tsv_text(0)
            .map_err(|e| NidError::OcrError(format!("Tesseract error: {}", e)))?;
        *guard = Some(api);

        let fragments = parse_tsv(&tsv);
        debug!("Tesseract returned {} lines", fragments.len());
        Ok(fragments)
    }
}

static SHARED_ENGINE: OnceCell<Arc<TesseractEngine>> = OnceCell::new();

/// Process-wide engine, built on first use. Later calls get the same engine
/// even if they pass a different config.
pub fn shared_engine(config: &OcrConfig) -> Result<Arc<TesseractEngine>, NidError> {
    let engine = SHARED_ENGINE.get_or_try_init(|| TesseractEngine::new(config.clone()).map(Arc::new))?;
    if engine.config() != config {
        warn!("OCR engine already initialized with {:?}; ignoring {:?}", engine.config(), config);
    }
    Ok(Arc::clone(engine))
}

/// Group Tesseract TSV word rows into one fragment per text line. Lines keep
/// the order they first appear in; each gets the union of its word boxes and
/// the mean word confidence scaled to [0, 1].
pub fn parse_tsv(tsv: &str) -> Vec<RecognizedFragment> {
    let mut lines: Vec<((i32, i32, i32, i32), Vec<(String, BoundingBox, f32)>)> = Vec::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        // Word rows only; this also skips the header
        if cols[0].parse::<i32>().unwrap_or(0) != 5 {
            continue;
        }
        let text = cols[11].trim();
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let num = |i: usize| cols[i].parse::<i32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));
        let (left, top) = (num(6) as f32, num(7) as f32);
        let bbox = BoundingBox::new(left, top, left + num(8) as f32, top + num(9) as f32);

        let word = (text.to_string(), bbox, conf);
        match lines.iter_mut().find(|(k, _)| *k == key) {
            Some((_, words)) => words.push(word),
            None => lines.push((key, vec![word])),
        }
    }

    lines
        .into_iter()
        .map(|(_, mut words)| {
            words.sort_by(|a, b| a.1.x0.total_cmp(&b.1.x0));
            let text = words.iter().map(|(t, _, _)| t.as_str()).collect::<Vec<_>>().join(" ");
            let bbox = words
                .iter()
                .skip(1)
                .fold(words[0].1, |acc, (_, b, _)| acc.union(b));
            let conf = words.iter().map(|(_, _, c)| c).sum::<f32>() / words.len() as f32;
            RecognizedFragment::new(text, bbox, conf / 100.0)
        })
        .collect()
}
