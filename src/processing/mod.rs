pub mod assembler;
pub mod dob;
pub mod id_number;
pub mod image;
pub mod name;
pub mod normalizer;
pub mod ocr;

pub use assembler::FieldExtractor;
pub use dob::DobMatcher;
pub use id_number::IdMatcher;
pub use image::ImageProcessor;
pub use name::NameMatcher;
pub use ocr::{shared_engine, OcrConfig, OcrEngine, TesseractEngine};
