//! Error types for the globedem library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or reading an elevation dataset.
#[derive(Error, Debug)]
pub enum DemError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote fetch of a chunk archive failed.
    #[error("Transfer of chunk {chunk} from {url} failed: {}", describe_status(.status, .reason))]
    Transfer {
        /// Chunk code being fetched.
        chunk: String,
        /// URL that was requested.
        url: String,
        /// HTTP status, if the server answered at all.
        status: Option<u16>,
        /// Transport-level description.
        reason: String,
    },

    /// The downloaded archive does not hold exactly the expected payload.
    #[error("Bad archive contents for chunk {chunk}: expected [{expected}], found {found:?}")]
    ArchiveContents {
        /// Chunk code being fetched.
        chunk: String,
        /// The single entry name that was expected.
        expected: String,
        /// Entry names actually present in the archive.
        found: Vec<String>,
    },

    /// The downloaded archive could not be read at all.
    #[error("Unreadable archive for chunk {chunk}: {reason}")]
    CorruptArchive {
        /// Chunk code being fetched.
        chunk: String,
        /// Decoder error.
        reason: String,
    },

    /// Format conversion of an extracted payload failed.
    #[error("Conversion of chunk {chunk} failed: {reason}")]
    Conversion {
        /// Chunk code being converted.
        chunk: String,
        /// What went wrong.
        reason: String,
    },

    /// Converted payload is not the size its declared resolution implies.
    #[error("Bad converted size for chunk {chunk}: {actual} bytes (expected {expected})")]
    SizeMismatch {
        /// Chunk code being validated.
        chunk: String,
        /// Size on disk.
        actual: u64,
        /// Size implied by the tile shape.
        expected: u64,
    },

    /// Build target already exists; the builder never overwrites or merges.
    #[error("Dataset target already exists: {path}")]
    AlreadyExists {
        /// The refused target.
        path: PathBuf,
    },

    /// Another build owns the workspace, or it holds stray files.
    #[error("Workspace is not empty or is in use by another build: {path}")]
    WorkspaceInUse {
        /// The refused workspace directory.
        path: PathBuf,
    },

    /// The build was cancelled by the caller.
    #[error("Build cancelled")]
    Cancelled,

    /// The coordinate has no backing sample.
    #[error("No data at lat={lat}, lon={lon}")]
    NoData {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },

    /// The coordinate is malformed or outside the valid range.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon} (valid: lat -90..=90, lon -180..360)")]
    InvalidCoordinate {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
    },

    /// Dataset file size does not match the configured geometry.
    #[error("Invalid dataset {path}: {actual} bytes (expected {expected})")]
    Open {
        /// Dataset path.
        path: PathBuf,
        /// Size on disk.
        actual: u64,
        /// Size implied by the layout and chunk list.
        expected: u64,
    },

    /// A chunk code is not part of the layout.
    #[error("Unknown chunk code: {0}")]
    UnknownChunk(String),

    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DemError {
    /// Returns `true` for the routine "no backing sample" outcome of a query.
    pub fn is_no_data(&self) -> bool {
        matches!(self, DemError::NoData { .. })
    }
}

fn describe_status(status: &Option<u16>, reason: &str) -> String {
    match status {
        Some(code) => format!("HTTP {} {}", code, reason),
        None => reason.to_string(),
    }
}

/// Result type alias using [`DemError`].
pub type Result<T> = std::result::Result<T, DemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DemError::SizeMismatch {
            chunk: "C".to_string(),
            actual: 127,
            expected: 128,
        };
        let msg = err.to_string();
        assert!(msg.contains("chunk C"));
        assert!(msg.contains("127"));
        assert!(msg.contains("128"));

        let err = DemError::Transfer {
            chunk: "A".to_string(),
            url: "http://example.com/15-A.zip".to_string(),
            status: Some(404),
            reason: "Not Found".to_string(),
        };
        assert!(err.to_string().contains("HTTP 404"));
        assert!(err.to_string().contains("15-A.zip"));

        let err = DemError::ArchiveContents {
            chunk: "B".to_string(),
            expected: "15-B.tif".to_string(),
            found: vec!["readme.txt".to_string()],
        };
        assert!(err.to_string().contains("readme.txt"));

        let err = DemError::AlreadyExists {
            path: PathBuf::from("/srv/dataset"),
        };
        assert!(err.to_string().contains("/srv/dataset"));
    }

    #[test]
    fn test_is_no_data() {
        assert!(DemError::NoData { lat: 0.0, lon: 0.0 }.is_no_data());
        assert!(!DemError::InvalidCoordinate { lat: 91.0, lon: 0.0 }.is_no_data());
        assert!(!DemError::Cancelled.is_no_data());
    }
}
