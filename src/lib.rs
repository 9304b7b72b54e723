pub mod models;
pub mod nid_parser;
pub mod processing;
pub mod server;
pub mod utils;

pub use nid_parser::{NidParser, ParsedDocument};
