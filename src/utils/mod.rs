pub mod error;

pub use error::NidError;
