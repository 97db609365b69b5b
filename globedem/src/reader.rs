//! Raster Reader: point lookups against an assembled dataset.
//!
//! The dataset file is memory-mapped read-only and validated against the
//! configured geometry before the first query. A [`DatasetReader`] holds no
//! mutable state, so it can be shared between threads behind an `Arc`.
//!
//! # Example
//!
//! ```ignore
//! use globedem::DatasetReader;
//!
//! let dataset = DatasetReader::builder("/srv/globedem/dataset").open()?;
//! match dataset.query(52.0, 0.0) {
//!     Ok(elevation) => println!("Elevation: {}m", elevation),
//!     Err(e) if e.is_no_data() => println!("no data"),
//!     Err(e) => return Err(e),
//! }
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::chunk::parse_chunk_list;
use crate::error::{DemError, Result};
use crate::layout::{validate_coordinate, DatasetLayout, SampleIndex, TileShape};

/// Where the dataset is looked for when nothing else is configured.
pub const DEFAULT_DATASET_PATH: &str = "/srv/globedem/dataset";

/// Environment variable naming the dataset file.
pub const ENV_DATASET: &str = "GLOBEDEM_DATASET";

/// Environment variable holding the per-chunk shape (`WxH`).
pub const ENV_TILE_SHAPE: &str = "GLOBEDEM_TILE_SHAPE";

/// Environment variable holding the comma-separated chunk list of a subset dataset.
pub const ENV_CHUNKS: &str = "GLOBEDEM_CHUNKS";

/// Environment variable holding the void sentinel.
pub const ENV_VOID_VALUE: &str = "GLOBEDEM_VOID_VALUE";

/// Sample statistics of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStats {
    /// Chunk code.
    pub code: String,
    /// Smallest non-void sample.
    pub min: Option<u16>,
    /// Largest non-void sample.
    pub max: Option<u16>,
    /// Number of samples equal to the void sentinel.
    pub void_count: usize,
    /// Number of samples in the chunk.
    pub samples: usize,
}

/// Summary of an open dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    /// Dataset file.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Per-chunk resolution.
    pub shape: TileShape,
    /// Chunks present in the file, in file order.
    pub chunks: Vec<String>,
    /// Layout chunks absent from the file.
    pub missing: Vec<String>,
    /// Void sentinel, if any.
    pub void_value: Option<u16>,
}

/// Read-only view of an assembled dataset.
pub struct DatasetReader {
    path: PathBuf,
    data: Mmap,
    layout: DatasetLayout,
    /// Chunks in file order.
    chunks: Vec<String>,
    /// For each layout slot, the chunk's position in the file.
    file_index: Vec<Option<usize>>,
    void_value: Option<u16>,
}

impl DatasetReader {
    /// Open a dataset holding every chunk of `layout`, in layout order.
    pub fn open<P: AsRef<Path>>(path: P, layout: DatasetLayout) -> Result<Self> {
        let codes = layout.codes().to_vec();
        Self::open_with_chunks(path, layout, &codes)
    }

    /// Open a dataset holding only `codes`, in that order.
    ///
    /// Layout positions not listed are gaps and answer queries with
    /// [`DemError::NoData`].
    pub fn open_with_chunks<P: AsRef<Path>>(
        path: P,
        layout: DatasetLayout,
        codes: &[String],
    ) -> Result<Self> {
        let path = path.as_ref();
        if codes.is_empty() {
            return Err(DemError::InvalidConfig("dataset has no chunks".into()));
        }

        let mut file_index = vec![None; layout.codes().len()];
        let mut seen = HashSet::new();
        for (position, code) in codes.iter().enumerate() {
            let slot = layout
                .slot_of(code)
                .ok_or_else(|| DemError::UnknownChunk(code.clone()))?;
            if !seen.insert(slot) {
                return Err(DemError::InvalidConfig(format!(
                    "chunk code '{}' listed twice",
                    code
                )));
            }
            file_index[slot] = Some(position);
        }

        let expected = (codes.len() as u64).saturating_mul(layout.shape().byte_len());
        check_size(path, fs::metadata(path)?.len(), expected)?;

        let file = File::open(path)?;
        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let data = unsafe { Mmap::map(&file)? };
        // The file may have changed size since it was measured.
        check_size(path, data.len() as u64, expected)?;

        tracing::debug!(path = %path.display(), chunks = codes.len(), "opened dataset");

        Ok(Self {
            path: path.to_path_buf(),
            data,
            layout,
            chunks: codes.to_vec(),
            file_index,
            void_value: None,
        })
    }

    /// Create a builder for more configuration options.
    pub fn builder<P: AsRef<Path>>(path: P) -> ReaderBuilder {
        ReaderBuilder::new(path)
    }

    /// Nearest-sample elevation at a coordinate.
    ///
    /// # Errors
    ///
    /// - [`DemError::InvalidCoordinate`] for non-finite or out-of-range input
    /// - [`DemError::NoData`] when no chunk covers the coordinate, the chunk is
    ///   absent from the file, or the sample equals the void sentinel
    pub fn query(&self, lat: f64, lon: f64) -> Result<u16> {
        let index = self.locate(lat, lon)?;
        self.sample(index.slot, index.row, index.col)
            .filter(|&v| Some(v) != self.void_value)
            .ok_or(DemError::NoData { lat, lon })
    }

    /// Bilinear interpolation between the four samples around a coordinate.
    ///
    /// Uses only samples of the covering chunk. Fails with
    /// [`DemError::NoData`] if any of the four is missing or void.
    pub fn query_interpolated(&self, lat: f64, lon: f64) -> Result<f64> {
        validate_coordinate(lat, lon)?;
        let no_data = DemError::NoData { lat, lon };
        let frac = self.layout.locate_fractional(lat, lon).ok_or(no_data)?;

        let shape = self.layout.shape();
        let row0 = (frac.row.floor() as usize).min(shape.height() - 2);
        let col0 = (frac.col.floor() as usize).min(shape.width() - 2);
        let dr = frac.row - row0 as f64;
        let dc = frac.col - col0 as f64;

        let value = |row: usize, col: usize| -> Result<f64> {
            self.sample(frac.slot, row, col)
                .filter(|&v| Some(v) != self.void_value)
                .map(f64::from)
                .ok_or(DemError::NoData { lat, lon })
        };

        let top = value(row0, col0)? * (1.0 - dc) + value(row0, col0 + 1)? * dc;
        let bottom = value(row0 + 1, col0)? * (1.0 - dc) + value(row0 + 1, col0 + 1)? * dc;
        Ok(top * (1.0 - dr) + bottom * dr)
    }

    /// Resolve the sample a coordinate maps to.
    pub fn locate(&self, lat: f64, lon: f64) -> Result<SampleIndex> {
        validate_coordinate(lat, lon)?;
        self.layout
            .locate(lat, lon)
            .ok_or(DemError::NoData { lat, lon })
    }

    /// Raw sample at `row`/`col` of the chunk in layout slot `slot`.
    ///
    /// Returns `None` for indices outside the chunk and for chunks absent
    /// from the file. The void sentinel is returned verbatim.
    pub fn sample(&self, slot: usize, row: usize, col: usize) -> Option<u16> {
        let shape = self.layout.shape();
        if row >= shape.height() || col >= shape.width() {
            return None;
        }
        let position = (*self.file_index.get(slot)?)?;
        let offset = (position * shape.sample_count() + row * shape.width() + col) * 2;
        let bytes = self.data.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Min/max/void statistics of one chunk; `None` if the chunk is absent.
    pub fn chunk_stats(&self, code: &str) -> Result<Option<ChunkStats>> {
        let slot = self
            .layout
            .slot_of(code)
            .ok_or_else(|| DemError::UnknownChunk(code.to_string()))?;
        let Some(position) = self.file_index[slot] else {
            return Ok(None);
        };

        let len = self.layout.shape().byte_len() as usize;
        let start = position * len;
        let mut stats = ChunkStats {
            code: code.to_string(),
            min: None,
            max: None,
            void_count: 0,
            samples: len / 2,
        };
        for pair in self.data[start..start + len].chunks_exact(2) {
            let value = u16::from_be_bytes([pair[0], pair[1]]);
            if Some(value) == self.void_value {
                stats.void_count += 1;
                continue;
            }
            stats.min = Some(stats.min.map_or(value, |m| m.min(value)));
            stats.max = Some(stats.max.map_or(value, |m| m.max(value)));
        }
        Ok(Some(stats))
    }

    /// Summary of the dataset.
    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            path: self.path.clone(),
            size_bytes: self.data.len() as u64,
            shape: self.layout.shape(),
            chunks: self.chunks.clone(),
            missing: self
                .layout
                .codes()
                .iter()
                .zip(&self.file_index)
                .filter(|(_, position)| position.is_none())
                .map(|(code, _)| code.clone())
                .collect(),
            void_value: self.void_value,
        }
    }

    /// Dataset file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Geometry the dataset was opened with.
    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Chunks present in the file, in file order.
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// Void sentinel, if any.
    pub fn void_value(&self) -> Option<u16> {
        self.void_value
    }
}

/// Builder for [`DatasetReader`].
#[derive(Debug, Clone)]
pub struct ReaderBuilder {
    path: PathBuf,
    layout: DatasetLayout,
    chunks: Option<Vec<String>>,
    void_value: Option<u16>,
}

impl ReaderBuilder {
    /// Create a builder for the default global layout.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            layout: DatasetLayout::viewfinder_15(),
            chunks: None,
            void_value: None,
        }
    }

    /// Create a builder from environment variables.
    ///
    /// - `GLOBEDEM_DATASET`: dataset file (default `/srv/globedem/dataset`)
    /// - `GLOBEDEM_TILE_SHAPE`: per-chunk shape `WxH` (default 14401x10801)
    /// - `GLOBEDEM_CHUNKS`: comma-separated chunk list of a subset dataset
    /// - `GLOBEDEM_VOID_VALUE`: sample value meaning "no data"
    ///
    /// Malformed values are rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a builder from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup(ENV_DATASET).unwrap_or_else(|| DEFAULT_DATASET_PATH.to_string());
        let mut builder = Self::new(path);

        if let Some(shape) = lookup(ENV_TILE_SHAPE) {
            builder = builder.tile_shape(shape.parse()?);
        }
        if let Some(chunks) = lookup(ENV_CHUNKS) {
            let chunks = parse_chunk_list(&chunks);
            if !chunks.is_empty() {
                builder = builder.chunks(chunks);
            }
        }
        if let Some(void) = lookup(ENV_VOID_VALUE) {
            let value = void.trim().parse().map_err(|_| {
                DemError::InvalidConfig(format!("invalid void value '{}'", void))
            })?;
            builder = builder.void_value(value);
        }
        Ok(builder)
    }

    /// Set the dataset file.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Replace the layout.
    pub fn layout(mut self, layout: DatasetLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the per-chunk resolution of the current layout.
    pub fn tile_shape(mut self, shape: TileShape) -> Self {
        self.layout = self.layout.with_shape(shape);
        self
    }

    /// Declare the file to be a subset holding `chunks`, in that order.
    pub fn chunks(mut self, chunks: Vec<String>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Treat samples equal to `value` as "no data".
    pub fn void_value(mut self, value: u16) -> Self {
        self.void_value = Some(value);
        self
    }

    /// Open and validate the dataset.
    pub fn open(self) -> Result<DatasetReader> {
        let mut reader = match &self.chunks {
            Some(chunks) => DatasetReader::open_with_chunks(&self.path, self.layout, chunks)?,
            None => DatasetReader::open(&self.path, self.layout)?,
        };
        reader.void_value = self.void_value;
        Ok(reader)
    }

    /// Dataset file that will be opened.
    pub fn dataset_path(&self) -> &Path {
        &self.path
    }
}

/// Compare a dataset's size against the size its layout and chunk list imply.
fn check_size(path: &Path, actual: u64, expected: u64) -> Result<()> {
    if actual != expected {
        return Err(DemError::Open {
            path: path.to_path_buf(),
            actual,
            expected,
        });
    }
    Ok(())
}
