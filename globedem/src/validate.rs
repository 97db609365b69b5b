//! Chunk Validator: the size gate between conversion and assembly.

use std::fs;
use std::path::Path;

use crate::error::{DemError, Result};

/// Check that a converted payload holds exactly `expected` bytes.
///
/// Returns the size on success. Any difference, even a single byte, is a
/// [`DemError::SizeMismatch`]; a truncated or oversized chunk must never
/// reach the dataset.
pub fn validate_size(chunk: &str, path: &Path, expected: u64) -> Result<u64> {
    let actual = fs::metadata(path)?.len();
    if actual != expected {
        return Err(DemError::SizeMismatch {
            chunk: chunk.to_string(),
            actual,
            expected,
        });
    }
    Ok(actual)
}
