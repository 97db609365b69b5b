//! Chunk grid geometry shared by the builder and the reader.
//!
//! A dataset is a row-major grid of equally sized chunks. Each chunk is an
//! edge-inclusive grid of `width × height` samples: the first and last
//! row/column sit exactly on the chunk's boundary, so geographically adjacent
//! chunks repeat the same samples along their shared edge.
//!
//! Nothing about the geometry is stored in the raster file. The
//! [`DatasetLayout`] is the single source of truth for where each chunk lies
//! and must be supplied identically to the builder and the reader.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{DemError, Result};

/// Bytes per elevation sample (16-bit big-endian).
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Samples per chunk row in the 15 arc-second global dataset.
pub const VIEWFINDER_15_WIDTH: usize = 14401;

/// Samples per chunk column in the 15 arc-second global dataset.
pub const VIEWFINDER_15_HEIGHT: usize = 10801;

/// Tolerance used when checking that a layout fits on the globe.
const GRID_EPSILON: f64 = 1e-9;

/// Per-chunk sample resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileShape {
    width: usize,
    height: usize,
}

impl TileShape {
    /// Create a shape, rejecting grids that cannot be edge-inclusive or
    /// whose byte size does not fit in memory.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width < 2 || height < 2 {
            return Err(DemError::InvalidConfig(format!(
                "tile shape {}x{} must be at least 2x2",
                width, height
            )));
        }
        let fits = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(BYTES_PER_SAMPLE as usize))
            .is_some();
        if !fits {
            return Err(DemError::InvalidConfig(format!(
                "tile shape {}x{} is too large",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Samples per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Samples per column.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of samples in one chunk.
    pub fn sample_count(&self) -> usize {
        self.width * self.height
    }

    /// Size in bytes of one converted chunk.
    pub fn byte_len(&self) -> u64 {
        self.sample_count() as u64 * BYTES_PER_SAMPLE
    }
}

impl Default for TileShape {
    fn default() -> Self {
        Self {
            width: VIEWFINDER_15_WIDTH,
            height: VIEWFINDER_15_HEIGHT,
        }
    }
}

impl fmt::Display for TileShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for TileShape {
    type Err = DemError;

    /// Parse a `WxH` string such as `14401x10801`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DemError::InvalidConfig(format!("invalid tile shape '{}', expected WxH", s));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        Self::new(width, height)
    }
}

/// Geographic extent of one chunk, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkBounds {
    /// Latitude of the top edge.
    pub north: f64,
    /// Latitude of the bottom edge.
    pub south: f64,
    /// Longitude of the left edge, in the layout's longitude convention.
    pub west: f64,
    /// Longitude of the right edge, in the layout's longitude convention.
    pub east: f64,
}

impl ChunkBounds {
    /// Check if a (normalized) coordinate lies within the bounds, edges included.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat <= self.north && lat >= self.south && lon >= self.west && lon <= self.east
    }
}

/// Location of one sample: the chunk's grid slot plus row/column within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleIndex {
    /// Position of the chunk in the layout's code list.
    pub slot: usize,
    /// Row within the chunk (0 = north edge).
    pub row: usize,
    /// Column within the chunk (0 = west edge).
    pub col: usize,
}

/// Unrounded position within a chunk, used for interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalIndex {
    /// Position of the chunk in the layout's code list.
    pub slot: usize,
    /// Fractional row, in `0.0..=height-1`.
    pub row: f64,
    /// Fractional column, in `0.0..=width-1`.
    pub col: f64,
}

/// Static mapping from chunk codes to their place on the globe.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayout {
    codes: Vec<String>,
    columns: usize,
    north: f64,
    west: f64,
    span_lat: f64,
    span_lon: f64,
    shape: TileShape,
}

impl DatasetLayout {
    /// Create and validate a layout.
    ///
    /// # Arguments
    ///
    /// * `codes` - Chunk codes in grid order (row-major, north-west first)
    /// * `columns` - Number of chunks per grid row
    /// * `north` - Latitude of the top edge of the first grid row
    /// * `west` - Longitude of the left edge of the first grid column
    /// * `span` - Degrees covered by one chunk as `(latitude, longitude)`
    /// * `shape` - Samples per chunk
    pub fn new(
        codes: Vec<String>,
        columns: usize,
        north: f64,
        west: f64,
        span: (f64, f64),
        shape: TileShape,
    ) -> Result<Self> {
        let (span_lat, span_lon) = span;

        if codes.is_empty() {
            return Err(DemError::InvalidConfig("layout has no chunk codes".into()));
        }
        if columns == 0 || codes.len() % columns != 0 {
            return Err(DemError::InvalidConfig(format!(
                "{} chunk codes cannot fill rows of {} columns",
                codes.len(),
                columns
            )));
        }
        let mut seen = HashSet::new();
        for code in &codes {
            if code.is_empty() || !seen.insert(code.as_str()) {
                return Err(DemError::InvalidConfig(format!(
                    "chunk code '{}' is empty or duplicated",
                    code
                )));
            }
        }
        if !(span_lat.is_finite() && span_lon.is_finite() && span_lat > 0.0 && span_lon > 0.0) {
            return Err(DemError::InvalidConfig(format!(
                "chunk span {}x{} degrees must be positive",
                span_lat, span_lon
            )));
        }
        if !(north.is_finite() && west.is_finite()) {
            return Err(DemError::InvalidConfig("layout origin must be finite".into()));
        }

        let rows = codes.len() / columns;
        let south = north - rows as f64 * span_lat;
        if north > 90.0 + GRID_EPSILON || south < -90.0 - GRID_EPSILON {
            return Err(DemError::InvalidConfig(format!(
                "layout latitude range {}..{} leaves -90..90",
                south, north
            )));
        }
        if columns as f64 * span_lon > 360.0 + GRID_EPSILON {
            return Err(DemError::InvalidConfig(format!(
                "layout spans {} degrees of longitude",
                columns as f64 * span_lon
            )));
        }

        Ok(Self {
            codes,
            columns,
            north,
            west,
            span_lat,
            span_lon,
            shape,
        })
    }

    /// The 15 arc-second global layout: chunks `A`..`X`, six across and
    /// four down, each 60° of longitude by 45° of latitude, starting at
    /// 90°N 180°W.
    pub fn viewfinder_15() -> Self {
        Self {
            codes: chunk_range('A', 'X'),
            columns: 6,
            north: 90.0,
            west: -180.0,
            span_lat: 45.0,
            span_lon: 60.0,
            shape: TileShape::default(),
        }
    }

    /// Replace the per-chunk resolution.
    pub fn with_shape(mut self, shape: TileShape) -> Self {
        self.shape = shape;
        self
    }

    /// Chunk codes in grid order.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// Chunks per grid row.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Number of grid rows.
    pub fn rows(&self) -> usize {
        self.codes.len() / self.columns
    }

    /// Per-chunk resolution.
    pub fn shape(&self) -> TileShape {
        self.shape
    }

    /// Latitude of the grid's top edge.
    pub fn north(&self) -> f64 {
        self.north
    }

    /// Longitude of the grid's left edge.
    pub fn west(&self) -> f64 {
        self.west
    }

    /// Degrees of latitude covered by one chunk.
    pub fn span_lat(&self) -> f64 {
        self.span_lat
    }

    /// Degrees of longitude covered by one chunk.
    pub fn span_lon(&self) -> f64 {
        self.span_lon
    }

    /// Grid slot of a chunk code.
    pub fn slot_of(&self, code: &str) -> Option<usize> {
        self.codes.iter().position(|c| c == code)
    }

    /// Size in bytes of a dataset holding every chunk of the layout.
    ///
    /// Saturates at `u64::MAX`, which no file can match.
    pub fn total_bytes(&self) -> u64 {
        (self.codes.len() as u64).saturating_mul(self.shape.byte_len())
    }

    /// Geographic bounds of the chunk at `slot`.
    pub fn bounds(&self, slot: usize) -> ChunkBounds {
        let grid_row = slot / self.columns;
        let grid_col = slot % self.columns;
        let north = self.north - grid_row as f64 * self.span_lat;
        let west = self.west + grid_col as f64 * self.span_lon;
        ChunkBounds {
            north,
            south: north - self.span_lat,
            west,
            east: west + self.span_lon,
        }
    }

    /// Coordinate of the sample at `row`/`col` of the chunk at `slot`,
    /// as `(lat, lon)` in the layout's longitude convention.
    pub fn sample_position(&self, slot: usize, row: usize, col: usize) -> (f64, f64) {
        let bounds = self.bounds(slot);
        let lat = bounds.north - row as f64 * self.lat_step();
        let lon = bounds.west + col as f64 * self.lon_step();
        (lat, lon)
    }

    /// Resolve the nearest sample for a coordinate.
    ///
    /// Returns `None` when the coordinate is outside the grid. The caller is
    /// expected to have validated the coordinate with [`validate_coordinate`].
    pub fn locate(&self, lat: f64, lon: f64) -> Option<SampleIndex> {
        let frac = self.locate_fractional(lat, lon)?;
        let row = (frac.row.round().max(0.0) as usize).min(self.shape.height() - 1);
        let col = (frac.col.round().max(0.0) as usize).min(self.shape.width() - 1);
        Some(SampleIndex {
            slot: frac.slot,
            row,
            col,
        })
    }

    /// Resolve the unrounded position of a coordinate within its chunk.
    pub fn locate_fractional(&self, lat: f64, lon: f64) -> Option<FractionalIndex> {
        let lon = normalize_longitude(lon, self.west);
        let slot = self.slot_for(lat, lon)?;
        Some(self.fractional_in(slot, lat, lon))
    }

    /// Every chunk whose bounds (edges included) contain the coordinate,
    /// with the nearest sample in each.
    ///
    /// Interior coordinates yield one entry; coordinates on a shared edge
    /// or corner yield one entry per adjacent chunk.
    pub fn covering(&self, lat: f64, lon: f64) -> Vec<SampleIndex> {
        let lon = normalize_longitude(lon, self.west);
        (0..self.codes.len())
            .filter(|&slot| self.bounds(slot).contains(lat, lon))
            .map(|slot| {
                let frac = self.fractional_in(slot, lat, lon);
                SampleIndex {
                    slot,
                    row: (frac.row.round().max(0.0) as usize).min(self.shape.height() - 1),
                    col: (frac.col.round().max(0.0) as usize).min(self.shape.width() - 1),
                }
            })
            .collect()
    }

    /// Grid slot covering a normalized coordinate.
    ///
    /// Coordinates on a boundary shared by two chunks go to the lower/right
    /// chunk. The outer south and east edges of the grid belong to the last
    /// row/column.
    fn slot_for(&self, lat: f64, lon: f64) -> Option<usize> {
        let rows = self.rows();
        let y = (self.north - lat) / self.span_lat;
        let x = (lon - self.west) / self.span_lon;
        if !(y >= 0.0 && x >= 0.0) {
            return None;
        }

        let mut grid_row = y.floor() as usize;
        let mut grid_col = x.floor() as usize;
        if grid_row == rows && y == rows as f64 {
            grid_row = rows - 1;
        }
        if grid_col == self.columns && x == self.columns as f64 {
            grid_col = self.columns - 1;
        }
        if grid_row >= rows || grid_col >= self.columns {
            return None;
        }

        Some(grid_row * self.columns + grid_col)
    }

    fn fractional_in(&self, slot: usize, lat: f64, lon: f64) -> FractionalIndex {
        let bounds = self.bounds(slot);
        let max_row = (self.shape.height() - 1) as f64;
        let max_col = (self.shape.width() - 1) as f64;
        FractionalIndex {
            slot,
            row: ((bounds.north - lat) / self.lat_step()).clamp(0.0, max_row),
            col: ((lon - bounds.west) / self.lon_step()).clamp(0.0, max_col),
        }
    }

    fn lat_step(&self) -> f64 {
        self.span_lat / (self.shape.height() - 1) as f64
    }

    fn lon_step(&self) -> f64 {
        self.span_lon / (self.shape.width() - 1) as f64
    }
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self::viewfinder_15()
    }
}

/// Inclusive range of single-letter chunk codes.
///
/// # Examples
///
/// ```
/// use globedem::layout::chunk_range;
///
/// assert_eq!(chunk_range('A', 'D'), vec!["A", "B", "C", "D"]);
/// assert_eq!(chunk_range('A', 'X').len(), 24);
/// ```
pub fn chunk_range(from: char, to: char) -> Vec<String> {
    (from..=to).map(|c| c.to_string()).collect()
}

/// Fold a longitude into `[west, west + 360)`.
///
/// With `west = 0` this is the easting convention: a west longitude `-d`
/// becomes `360 - d`. With `west = -180` easting values of 180 and above
/// become negative.
///
/// # Examples
///
/// ```
/// use globedem::layout::normalize_longitude;
///
/// assert_eq!(normalize_longitude(-32.0, 0.0), 328.0);
/// assert_eq!(normalize_longitude(359.5, -180.0), -0.5);
/// assert_eq!(normalize_longitude(12.0, -180.0), 12.0);
/// ```
pub fn normalize_longitude(lon: f64, west: f64) -> f64 {
    let offset = (lon - west).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if offset >= 360.0 {
        west
    } else {
        west + offset
    }
}

/// Validate a query coordinate.
///
/// Latitude must lie in `[-90, 90]` and longitude in `[-180, 360)`, which
/// accepts both the signed and the easting convention.
pub fn validate_coordinate(lat: f64, lon: f64) -> Result<()> {
    let valid = lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..360.0).contains(&lon);
    if valid {
        Ok(())
    } else {
        Err(DemError::InvalidCoordinate { lat, lon })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_layout() -> DatasetLayout {
        DatasetLayout::viewfinder_15().with_shape(TileShape::new(8, 8).unwrap())
    }

    #[test]
    fn test_tile_shape_parse() {
        let shape: TileShape = "20x10".parse().unwrap();
        assert_eq!((shape.width(), shape.height()), (20, 10));
        assert_eq!(shape.to_string(), "20x10");
        assert_eq!(shape.byte_len(), 400);

        assert!("20".parse::<TileShape>().is_err());
        assert!("ax10".parse::<TileShape>().is_err());
        assert!("1x10".parse::<TileShape>().is_err());
        assert!("-3x10".parse::<TileShape>().is_err());
    }

    #[test]
    fn test_tile_shape_rejects_overflowing_size() {
        let err = "4294967296x4294967296".parse::<TileShape>().unwrap_err();
        assert!(matches!(err, DemError::InvalidConfig(_)));
        assert!(TileShape::new(usize::MAX, 2).is_err());
        assert!(TileShape::new(usize::MAX / 2 + 1, 2).is_err());

        let largest = TileShape::new(usize::MAX / 4, 2).unwrap();
        assert_eq!(largest.sample_count(), usize::MAX / 4 * 2);
        assert_eq!(
            DatasetLayout::viewfinder_15().with_shape(largest).total_bytes(),
            u64::MAX
        );
    }

    #[test]
    fn test_default_shape_size() {
        assert_eq!(TileShape::default().byte_len(), 14401 * 10801 * 2);
        assert_eq!(
            DatasetLayout::viewfinder_15().total_bytes(),
            24 * 14401 * 10801 * 2
        );
    }

    #[test]
    fn test_layout_validation() {
        let shape = TileShape::new(8, 8).unwrap();
        let codes = chunk_range('A', 'C');

        // 3 codes do not fill rows of 2
        assert!(DatasetLayout::new(codes.clone(), 2, 90.0, -180.0, (45.0, 60.0), shape).is_err());
        // Duplicate code
        let dup = vec!["A".to_string(), "A".to_string()];
        assert!(DatasetLayout::new(dup, 2, 90.0, -180.0, (45.0, 60.0), shape).is_err());
        // Too far south
        assert!(DatasetLayout::new(codes.clone(), 1, 0.0, 0.0, (45.0, 60.0), shape).is_err());
        // Too wide
        assert!(DatasetLayout::new(codes.clone(), 3, 90.0, 0.0, (10.0, 150.0), shape).is_err());
        // Zero span
        assert!(DatasetLayout::new(codes.clone(), 3, 90.0, 0.0, (0.0, 10.0), shape).is_err());
        // Empty
        assert!(DatasetLayout::new(Vec::new(), 1, 90.0, 0.0, (10.0, 10.0), shape).is_err());

        assert!(DatasetLayout::new(codes, 3, 7.0, 0.0, (7.0, 7.0), shape).is_ok());
    }

    #[test]
    fn test_bounds() {
        let layout = DatasetLayout::viewfinder_15();
        let a = layout.bounds(0);
        assert_eq!((a.north, a.south, a.west, a.east), (90.0, 45.0, -180.0, -120.0));

        let x = layout.bounds(layout.slot_of("X").unwrap());
        assert_eq!((x.north, x.south, x.west, x.east), (-45.0, -90.0, 120.0, 180.0));

        let h = layout.bounds(layout.slot_of("H").unwrap());
        assert_eq!((h.north, h.south, h.west, h.east), (45.0, 0.0, -120.0, -60.0));
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(0.0, 0.0), 0.0);
        assert_eq!(normalize_longitude(-0.5, 0.0), 359.5);
        assert_eq!(normalize_longitude(-180.0, 0.0), 180.0);
        assert_eq!(normalize_longitude(180.0, -180.0), -180.0);
        assert!((normalize_longitude(359.999, -180.0) + 0.001).abs() < 1e-9);
        assert!(normalize_longitude(-1e-20, 0.0) < 360.0);
    }

    #[test]
    fn test_validate_coordinate() {
        assert!(validate_coordinate(0.0, 0.0).is_ok());
        assert!(validate_coordinate(90.0, 359.999).is_ok());
        assert!(validate_coordinate(-90.0, -180.0).is_ok());

        assert!(validate_coordinate(-100.0, 0.0).is_err());
        assert!(validate_coordinate(100.0, 0.0).is_err());
        assert!(validate_coordinate(52.0, 374.0).is_err());
        assert!(validate_coordinate(52.0, 360.0).is_err());
        assert!(validate_coordinate(52.0, -181.0).is_err());
        assert!(validate_coordinate(f64::NAN, 0.0).is_err());
        assert!(validate_coordinate(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_locate_interior() {
        // Two 8x8 chunks side by side, 7 degrees each, one sample per degree
        let layout = DatasetLayout::new(
            vec!["L".to_string(), "R".to_string()],
            2,
            7.0,
            0.0,
            (7.0, 7.0),
            TileShape::new(8, 8).unwrap(),
        )
        .unwrap();

        assert_eq!(
            layout.locate(4.0, 12.0),
            Some(SampleIndex { slot: 1, row: 3, col: 5 })
        );
        assert_eq!(
            layout.locate(6.6, 0.4),
            Some(SampleIndex { slot: 0, row: 0, col: 0 })
        );
        // Outside the band
        assert_eq!(layout.locate(-10.0, 3.0), None);
        assert_eq!(layout.locate(8.0, 3.0), None);
        assert_eq!(layout.locate(3.0, 20.0), None);
    }

    #[test]
    fn test_locate_boundaries() {
        let layout = small_layout();

        // North pole: first row of the top grid row
        let idx = layout.locate(90.0, 0.0).unwrap();
        assert_eq!(layout.codes()[idx.slot], "D");
        assert_eq!(idx.row, 0);

        // South pole: last row of the bottom grid row
        let idx = layout.locate(-90.0, 0.0).unwrap();
        assert_eq!(layout.codes()[idx.slot], "V");
        assert_eq!(idx.row, 7);

        // Equator belongs to the southern chunk
        let idx = layout.locate(0.0, 0.0).unwrap();
        assert_eq!(layout.codes()[idx.slot], "P");
        assert_eq!((idx.row, idx.col), (0, 0));

        // 180 easting folds to -180, the first column
        let idx = layout.locate(10.0, 180.0).unwrap();
        assert_eq!(layout.codes()[idx.slot], "G");
        assert_eq!(idx.col, 0);

        // Just short of 360 easting: last column of the chunk west of Greenwich
        let idx = layout.locate(10.0, 359.999).unwrap();
        assert_eq!(layout.codes()[idx.slot], "I");
        assert_eq!(idx.col, 7);
    }

    #[test]
    fn test_covering_shared_edge() {
        let layout = small_layout();

        // Interior: one chunk
        assert_eq!(layout.covering(60.0, -150.0).len(), 1);

        // On the 45N edge between A and G
        let hits = layout.covering(45.0, -150.0);
        let codes: Vec<&str> = hits.iter().map(|h| layout.codes()[h.slot].as_str()).collect();
        assert_eq!(codes, vec!["A", "G"]);
        assert_eq!(hits[0].row, 7);
        assert_eq!(hits[1].row, 0);
        assert_eq!(hits[0].col, hits[1].col);

        // locate picks the southern chunk
        assert_eq!(layout.locate(45.0, -150.0), Some(hits[1]));
    }

    #[test]
    fn test_sample_position_roundtrip() {
        let layout = small_layout();
        for slot in [0, 5, 13, 23] {
            for (row, col) in [(0, 0), (3, 4), (6, 2)] {
                let (lat, lon) = layout.sample_position(slot, row, col);
                let hits = layout.covering(lat, lon);
                assert!(hits.contains(&SampleIndex { slot, row, col }));
            }
        }
    }

    #[test]
    fn test_partial_grid_outer_edges() {
        // Grid covering only 60N..60S and 0..120E
        let layout = DatasetLayout::new(
            chunk_range('A', 'D'),
            2,
            60.0,
            0.0,
            (60.0, 60.0),
            TileShape::new(8, 8).unwrap(),
        )
        .unwrap();

        assert_eq!(layout.locate(-60.0, 120.0).map(|i| i.slot), Some(3));
        assert_eq!(layout.locate(-60.1, 10.0), None);
        assert_eq!(layout.locate(60.1, 10.0), None);
        assert_eq!(layout.locate(10.0, 120.1), None);
        assert_eq!(layout.locate(10.0, -10.0), None);
    }
}
