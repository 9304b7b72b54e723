use thiserror::Error;

#[derive(Debug, Error)]
pub enum NidError {
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),
    #[error("OCR initialization error: {0}")]
    OcrInitError(String),
    #[error("OCR error: {0}")]
    OcrError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid extraction rule: {0}")]
    InvalidRule(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl NidError {
    /// True for failures caused by the submitted image or the OCR engine, as
    /// opposed to local configuration problems.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            NidError::ImageDecodeError(_) | NidError::OcrError(_) | NidError::OcrInitError(_)
        )
    }
}

impl From<std::io::Error> for NidError {
    fn from(err: std::io::Error) -> Self {
        NidError::IoError(err.to_string())
    }
}
