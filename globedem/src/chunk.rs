//! Chunk descriptors and remote source configuration.
//!
//! A [`SourceConfig`] describes where chunk archives live and what each one
//! must contain. [`ChunkDescriptor::resolve`] combines it with a layout and a
//! list of chunk codes to produce the fixed, ordered work list consumed by
//! the assembler.

use std::collections::HashSet;

use crate::error::{DemError, Result};
use crate::layout::DatasetLayout;

/// Placeholder substituted with the chunk code in URL and entry templates.
pub const CODE_PLACEHOLDER: &str = "{code}";

/// Default timeout for a single archive transfer in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of retries after a failed transfer.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Compression format of a remote chunk archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// ZIP archive holding exactly one payload entry.
    #[default]
    Zip,
    /// Gzip-compressed payload (`.gz`).
    Gzip,
    /// Uncompressed payload.
    None,
}

impl Compression {
    /// Detect compression format from a URL or filename.
    ///
    /// # Examples
    ///
    /// ```
    /// use globedem::chunk::Compression;
    ///
    /// assert_eq!(Compression::from_url("15-A.zip"), Compression::Zip);
    /// assert_eq!(Compression::from_url("15-A.tif.gz"), Compression::Gzip);
    /// assert_eq!(Compression::from_url("15-A.tif"), Compression::None);
    /// ```
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.ends_with(".zip") {
            Compression::Zip
        } else if lower.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// Where chunk archives are fetched from and what they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Archive URL with a `{code}` placeholder.
    pub url_template: String,
    /// Name of the single payload entry, with a `{code}` placeholder.
    pub entry_template: String,
    /// Archive format.
    pub compression: Compression,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retry attempts on transient failure.
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::viewfinder_15()
    }
}

impl SourceConfig {
    /// The 15 arc-second GeoTIFF archives from viewfinderpanoramas.org.
    pub fn viewfinder_15() -> Self {
        Self {
            url_template: "http://www.viewfinderpanoramas.org/DEM/TIF15/15-{code}.zip".into(),
            entry_template: "15-{code}.tif".into(),
            compression: Compression::Zip,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Create a configuration for a custom URL template.
    ///
    /// Compression is auto-detected from the URL extension. The payload
    /// entry name defaults to the viewfinder naming.
    pub fn with_url_template(url_template: impl Into<String>) -> Self {
        let url_template = url_template.into();
        let compression = Compression::from_url(&url_template);
        Self {
            url_template,
            compression,
            ..Self::viewfinder_15()
        }
    }

    /// Set the payload entry template.
    pub fn with_entry_template(mut self, entry_template: impl Into<String>) -> Self {
        self.entry_template = entry_template.into();
        self
    }

    /// Set the archive format explicitly.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the maximum number of retry attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check that both templates are usable.
    pub fn validate(&self) -> Result<()> {
        for (name, template) in [
            ("url template", &self.url_template),
            ("entry template", &self.entry_template),
        ] {
            if !template.contains(CODE_PLACEHOLDER) {
                return Err(DemError::InvalidConfig(format!(
                    "{} '{}' must contain {}",
                    name, template, CODE_PLACEHOLDER
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(DemError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Archive URL for a chunk code.
    pub fn url_for(&self, code: &str) -> String {
        self.url_template.replace(CODE_PLACEHOLDER, code)
    }

    /// Payload entry name for a chunk code.
    pub fn entry_for(&self, code: &str) -> String {
        self.entry_template.replace(CODE_PLACEHOLDER, code)
    }
}

/// One unit of build work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position in the build order; determines the byte offset.
    pub index: usize,
    /// Chunk code.
    pub code: String,
    /// Archive URL.
    pub url: String,
    /// Name of the single payload entry in the archive.
    pub entry_name: String,
    /// Exact size of the converted payload.
    pub expected_bytes: u64,
}

impl ChunkDescriptor {
    /// Resolve an ordered list of chunk codes into descriptors.
    ///
    /// Codes must belong to the layout and appear at most once. The order of
    /// `codes` is kept as given.
    pub fn resolve(
        source: &SourceConfig,
        layout: &DatasetLayout,
        codes: &[String],
    ) -> Result<Vec<ChunkDescriptor>> {
        source.validate()?;
        if codes.is_empty() {
            return Err(DemError::InvalidConfig("no chunk codes to build".into()));
        }

        let expected_bytes = layout.shape().byte_len();
        let mut seen = HashSet::new();
        codes
            .iter()
            .enumerate()
            .map(|(index, code)| {
                if layout.slot_of(code).is_none() {
                    return Err(DemError::UnknownChunk(code.clone()));
                }
                if !seen.insert(code.as_str()) {
                    return Err(DemError::InvalidConfig(format!(
                        "chunk code '{}' listed twice",
                        code
                    )));
                }
                Ok(ChunkDescriptor {
                    index,
                    code: code.clone(),
                    url: source.url_for(code),
                    entry_name: source.entry_for(code),
                    expected_bytes,
                })
            })
            .collect()
    }
}

/// Parse a comma-separated list of chunk codes (`"A,B,X"`).
pub fn parse_chunk_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TileShape;

    #[test]
    fn test_compression_from_url() {
        assert_eq!(Compression::from_url("15-A.zip"), Compression::Zip);
        assert_eq!(Compression::from_url("15-A.ZIP"), Compression::Zip);
        assert_eq!(Compression::from_url("15-A.hgt.gz"), Compression::Gzip);
        assert_eq!(Compression::from_url("15-A.tif"), Compression::None);
        assert_eq!(
            Compression::from_url("http://example.com/dem/15-A.zip"),
            Compression::Zip
        );
    }

    #[test]
    fn test_viewfinder_urls() {
        let source = SourceConfig::viewfinder_15();
        assert_eq!(
            source.url_for("A"),
            "http://www.viewfinderpanoramas.org/DEM/TIF15/15-A.zip"
        );
        assert_eq!(source.entry_for("X"), "15-X.tif");
        assert!(source.validate().is_ok());
    }

    #[test]
    fn test_source_builder() {
        let source = SourceConfig::with_url_template("http://mirror.local/{code}.tif.gz")
            .with_entry_template("{code}.tif")
            .with_timeout(60)
            .with_max_retries(5);

        assert_eq!(source.compression, Compression::Gzip);
        assert_eq!(source.timeout_secs, 60);
        assert_eq!(source.max_retries, 5);
        assert_eq!(source.url_for("B"), "http://mirror.local/B.tif.gz");
    }

    #[test]
    fn test_validate_rejects_missing_placeholder() {
        let source = SourceConfig::with_url_template("http://mirror.local/all.zip");
        assert!(matches!(source.validate(), Err(DemError::InvalidConfig(_))));

        let source = SourceConfig::viewfinder_15().with_entry_template("");
        assert!(source.validate().is_err());

        let source = SourceConfig::viewfinder_15().with_timeout(0);
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_resolve_keeps_order() {
        let layout = DatasetLayout::viewfinder_15().with_shape(TileShape::new(8, 8).unwrap());
        let codes = vec!["X".to_string(), "A".to_string()];
        let chunks =
            ChunkDescriptor::resolve(&SourceConfig::viewfinder_15(), &layout, &codes).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].code, "X");
        assert_eq!(chunks[0].entry_name, "15-X.tif");
        assert_eq!(chunks[1].code, "A");
        assert_eq!(chunks[1].expected_bytes, 128);
    }

    #[test]
    fn test_resolve_rejects_bad_codes() {
        let layout = DatasetLayout::viewfinder_15();
        let source = SourceConfig::viewfinder_15();

        let unknown = vec!["A".to_string(), "Z".to_string()];
        assert!(matches!(
            ChunkDescriptor::resolve(&source, &layout, &unknown),
            Err(DemError::UnknownChunk(code)) if code == "Z"
        ));

        let twice = vec!["A".to_string(), "A".to_string()];
        assert!(ChunkDescriptor::resolve(&source, &layout, &twice).is_err());

        assert!(ChunkDescriptor::resolve(&source, &layout, &[]).is_err());
    }

    #[test]
    fn test_parse_chunk_list() {
        assert_eq!(parse_chunk_list("A, B,,X "), vec!["A", "B", "X"]);
        assert!(parse_chunk_list("").is_empty());
    }
}
