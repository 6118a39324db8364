// File I/O operations

pub mod csv;
pub mod error;
pub mod geojson;
pub mod json;

pub use error::IoError;
pub use json::{load_collection, load_or_empty, save_collection, JsonCheckpoint};
