//! # globedem - Global Elevation Raster Library
//!
//! Builds a single flat raster file from a grid of downloadable elevation
//! chunks, and answers point queries against it through a memory map.
//!
//! ## Features
//!
//! - **All or nothing**: a build either produces the complete dataset or
//!   leaves no target behind
//! - **Never clobbers**: existing targets are refused, never overwritten
//! - **Fast lookups**: memory-mapped reads, no decoding at query time
//! - **Parallel builds**: chunks are fetched and converted concurrently while
//!   the dataset is still written in grid order
//!
//! ## Quick Start
//!
//! ```ignore
//! use globedem::{
//!     Assembler, BuildOptions, BuildTarget, DatasetLayout, DatasetReader,
//!     MirrorTransport, SourceConfig, TiffConverter,
//! };
//!
//! let layout = DatasetLayout::viewfinder_15();
//! let assembler = Assembler::new(
//!     SourceConfig::viewfinder_15(),
//!     layout.clone(),
//!     MirrorTransport::new("/mnt/mirror"),
//!     TiffConverter,
//! )?;
//! assembler.build(
//!     &BuildTarget::File("/srv/globedem/dataset".into()),
//!     layout.codes(),
//!     "/tmp/globedem-work".as_ref(),
//!     &BuildOptions::default().with_jobs(4),
//!     |p| println!("{}/{} {}", p.completed, p.total, p.code),
//! )?;
//!
//! let dataset = DatasetReader::open("/srv/globedem/dataset", layout)?;
//! println!("Elevation: {}m", dataset.query(52.0, 0.0)?);
//! ```
//!
//! ## Dataset Format
//!
//! The dataset is the concatenation of its chunks in grid order, with no
//! header. Each chunk is `width × height` unsigned 16-bit big-endian
//! samples, row-major from the north-west corner. Rows and columns are
//! edge-inclusive, so adjacent chunks share their boundary samples.
//!
//! The default layout is the 15 arc-second global set: 24 chunks `A`..`X`,
//! 14401×10801 samples each, about 7.47 GB in total.
//!
//! ## Data Sources
//!
//! - <http://www.viewfinderpanoramas.org/dem3.html>

pub mod assemble;
pub mod chunk;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod reader;
pub mod validate;

// Re-export main types at crate root for convenience
pub use assemble::{
    Assembler, BuildOptions, BuildProgress, BuildReport, BuildTarget, CancelFlag,
};
pub use chunk::{ChunkDescriptor, Compression, SourceConfig};
pub use convert::{CommandConverter, Converter, RawConverter, TiffConverter};
pub use error::{DemError, Result};
#[cfg(feature = "download")]
pub use fetch::HttpTransport;
pub use fetch::{ChunkFetcher, MirrorTransport, Transport};
pub use layout::{DatasetLayout, SampleIndex, TileShape};
pub use reader::{ChunkStats, DatasetInfo, DatasetReader, ReaderBuilder};
