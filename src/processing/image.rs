use crate::utils::NidError;
use image::{DynamicImage, ImageOutputFormat};
use log::debug;
use std::io::Cursor;

pub struct ImageProcessor;

impl ImageProcessor {
    /// Decode uploaded bytes; anything the image crate cannot read is rejected here.
    pub fn decode(image_data: &[u8]) -> Result<DynamicImage, NidError> {
        if image_data.is_empty() {
            return Err(NidError::ImageDecodeError("empty image data".to_string()));
        }
        image::load_from_memory(image_data)
            .map_err(|e| NidError::ImageDecodeError(format!("Failed to decode image: {}", e)))
    }

    /// Decode and re-encode as PNG so the OCR engine always sees one format.
    pub fn prepare(image_data: &[u8]) -> Result<Vec<u8>, NidError> {
        let img = Self::decode(image_data)?;
        debug!("Decoded image {}x{}", img.width(), img.height());

        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| NidError::ImageDecodeError(format!("Failed to encode image: {}", e)))?;
        Ok(png.into_inner())
    }
}
