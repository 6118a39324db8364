use std::fmt;

use crate::source::SourceError;

#[derive(Debug)]
pub enum ReconError {
    /// The record collection is not valid JSON or does not fit the record shape.
    CollectionParse(String),
    /// Two records in a loaded collection claim the same primary code.
    DuplicatePrimaryCode(String),
    /// The collection could not be serialized.
    Serialize(String),
    /// Persisting a checkpoint failed.
    Checkpoint(String),
    /// A source failed in a way the caller asked to surface.
    Source(SourceError),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CollectionParse(msg) => write!(f, "record collection parse error: {msg}"),
            Self::DuplicatePrimaryCode(code) => {
                write!(f, "record collection has duplicate primary code '{code}'")
            }
            Self::Serialize(msg) => write!(f, "record collection serialize error: {msg}"),
            Self::Checkpoint(msg) => write!(f, "checkpoint failed: {msg}"),
            Self::Source(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<SourceError> for ReconError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}
