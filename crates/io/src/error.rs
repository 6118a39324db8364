use std::fmt;
use std::path::{Path, PathBuf};

use uaplaces_recon::ReconError;

#[derive(Debug)]
pub enum IoError {
    /// File could not be opened or read.
    Read { path: PathBuf, message: String },
    /// File could not be written or replaced.
    Write { path: PathBuf, message: String },
    /// A tabular input is malformed.
    Csv { path: PathBuf, message: String },
    /// A JSON or GeoJSON input is malformed.
    Json { path: PathBuf, message: String },
    /// The record collection itself was rejected.
    Collection { path: PathBuf, source: ReconError },
}

impl IoError {
    pub(crate) fn read(path: &Path, err: impl fmt::Display) -> Self {
        Self::Read { path: path.to_path_buf(), message: err.to_string() }
    }

    pub(crate) fn write(path: &Path, err: impl fmt::Display) -> Self {
        Self::Write { path: path.to_path_buf(), message: err.to_string() }
    }

    pub(crate) fn csv(path: &Path, err: impl fmt::Display) -> Self {
        Self::Csv { path: path.to_path_buf(), message: err.to_string() }
    }

    pub(crate) fn json(path: &Path, err: impl fmt::Display) -> Self {
        Self::Json { path: path.to_path_buf(), message: err.to_string() }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Csv { path, .. }
            | Self::Json { path, .. }
            | Self::Collection { path, .. } => path,
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Write { path, message } => write!(f, "cannot write {}: {message}", path.display()),
            Self::Csv { path, message } => write!(f, "{}: CSV error: {message}", path.display()),
            Self::Json { path, message } => write!(f, "{}: JSON error: {message}", path.display()),
            Self::Collection { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for IoError {}
