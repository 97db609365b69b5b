//! Chunk Converter: turn an extracted payload into raw big-endian samples.
//!
//! A converter is a pure format transform. It knows nothing about where the
//! chunk lies or how large it should be; the validator checks the size
//! afterwards.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tiff::decoder::{Decoder, DecodingResult, Limits};

use crate::error::{DemError, Result};

/// Placeholder for the payload path in [`CommandConverter`] arguments.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Placeholder for the output path in [`CommandConverter`] arguments.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Default limit for one external conversion.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Interval between child process status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Normalizes an extracted payload into a 16-bit big-endian sample stream.
pub trait Converter: Send + Sync {
    /// Convert `input` into raw samples written to `output`.
    ///
    /// `chunk` is the chunk code, used for error reporting only.
    fn convert(&self, chunk: &str, input: &Path, output: &Path) -> Result<()>;
}

impl<T: Converter + ?Sized> Converter for Box<T> {
    fn convert(&self, chunk: &str, input: &Path, output: &Path) -> Result<()> {
        (**self).convert(chunk, input, output)
    }
}

fn conversion_error(chunk: &str, reason: impl Into<String>) -> DemError {
    DemError::Conversion {
        chunk: chunk.to_string(),
        reason: reason.into(),
    }
}

/// Decodes single-band grayscale TIFF payloads in-process.
///
/// `U16` samples are written verbatim, `I16` samples as their two's
/// complement bit pattern and `U8` samples widened to 16 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffConverter;

impl TiffConverter {
    /// Decoder limits large enough for a 14401×10801 chunk.
    fn limits() -> Limits {
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        limits
    }
}

impl Converter for TiffConverter {
    fn convert(&self, chunk: &str, input: &Path, output: &Path) -> Result<()> {
        let file = BufReader::new(File::open(input)?);
        let tiff_error = |e: tiff::TiffError| conversion_error(chunk, e.to_string());

        let mut decoder = Decoder::new(file)
            .map_err(tiff_error)?
            .with_limits(Self::limits());
        let (width, height) = decoder.dimensions().map_err(tiff_error)?;
        let pixels = width as usize * height as usize;

        let samples: Vec<u16> = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U16(data) => data,
            DecodingResult::I16(data) => data.into_iter().map(|v| v as u16).collect(),
            DecodingResult::U8(data) => data.into_iter().map(u16::from).collect(),
            _ => {
                return Err(conversion_error(
                    chunk,
                    "unsupported sample format (expected 8 or 16-bit integers)",
                ))
            }
        };

        if samples.len() != pixels {
            return Err(conversion_error(
                chunk,
                format!(
                    "expected a single grayscale band, got {} samples for {}x{} pixels",
                    samples.len(),
                    width,
                    height
                ),
            ));
        }

        let mut out = BufWriter::new(File::create(output)?);
        for sample in samples {
            out.write_all(&sample.to_be_bytes())?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Payload is already a raw big-endian 16-bit stream (e.g. `.hgt`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RawConverter;

impl Converter for RawConverter {
    fn convert(&self, _chunk: &str, input: &Path, output: &Path) -> Result<()> {
        fs::copy(input, output)?;
        Ok(())
    }
}

/// Runs an external program to convert the payload.
///
/// The program must exit successfully within `timeout`; otherwise the child
/// is killed and the chunk fails. Conversions are never retried.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    /// Program to run.
    pub program: String,
    /// Arguments; `{input}` and `{output}` are substituted.
    pub args: Vec<String>,
    /// Limit for one conversion.
    pub timeout: Duration,
}

impl CommandConverter {
    /// Create a converter running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// ImageMagick: `convert {input} -quiet GRAY:{output}`.
    pub fn imagemagick() -> Self {
        Self::new(
            "convert",
            vec![
                INPUT_PLACEHOLDER.to_string(),
                "-quiet".to_string(),
                format!("GRAY:{}", OUTPUT_PLACEHOLDER),
            ],
        )
    }

    /// Set the conversion time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

impl Converter for CommandConverter {
    fn convert(&self, chunk: &str, input: &Path, output: &Path) -> Result<()> {
        let mut stderr = tempfile::tempfile()?;
        let mut child = Command::new(&self.program)
            .args(self.expand_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()
            .map_err(|e| conversion_error(chunk, format!("failed to run {}: {}", self.program, e)))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(conversion_error(
                    chunk,
                    format!("{} timed out after {:?}", self.program, self.timeout),
                ));
            }
            sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let mut message = String::new();
            stderr.seek(SeekFrom::Start(0))?;
            let _ = stderr.read_to_string(&mut message);
            return Err(conversion_error(
                chunk,
                format!("{} exited with {}: {}", self.program, status, message.trim()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn read_be(path: &Path) -> Vec<u16> {
        fs::read(path)
            .unwrap()
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn test_tiff_gray16() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chunk.tif");
        let output = dir.path().join("chunk.raw");

        let data: Vec<u16> = (0..12).map(|i| i * 1000).collect();
        let mut encoder = TiffEncoder::new(File::create(&input).unwrap()).unwrap();
        encoder.write_image::<colortype::Gray16>(4, 3, &data).unwrap();

        TiffConverter.convert("A", &input, &output).unwrap();

        assert_eq!(fs::metadata(&output).unwrap().len(), 24);
        assert_eq!(read_be(&output), data);
    }

    #[test]
    fn test_tiff_signed_keeps_bit_pattern() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chunk.tif");
        let output = dir.path().join("chunk.raw");

        let data: Vec<i16> = vec![-1, 0, 8848, -32768];
        let mut encoder = TiffEncoder::new(File::create(&input).unwrap()).unwrap();
        encoder.write_image::<colortype::GrayI16>(2, 2, &data).unwrap();

        TiffConverter.convert("A", &input, &output).unwrap();

        assert_eq!(read_be(&output), vec![0xFFFF, 0, 8848, 0x8000]);
    }

    #[test]
    fn test_tiff_gray8_widened() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chunk.tif");
        let output = dir.path().join("chunk.raw");

        let mut encoder = TiffEncoder::new(File::create(&input).unwrap()).unwrap();
        encoder.write_image::<colortype::Gray8>(2, 1, &[7u8, 255]).unwrap();

        TiffConverter.convert("A", &input, &output).unwrap();
        assert_eq!(read_be(&output), vec![7, 255]);
    }

    #[test]
    fn test_tiff_rejects_rgb() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chunk.tif");

        let mut encoder = TiffEncoder::new(File::create(&input).unwrap()).unwrap();
        encoder.write_image::<colortype::RGB8>(2, 2, &[0u8; 12]).unwrap();

        let err = TiffConverter
            .convert("C", &input, &dir.path().join("chunk.raw"))
            .unwrap_err();
        assert!(matches!(err, DemError::Conversion { ref chunk, .. } if chunk == "C"));
    }

    #[test]
    fn test_tiff_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("chunk.tif");
        fs::write(&input, b"definitely not a tiff").unwrap();

        let err = TiffConverter
            .convert("A", &input, &dir.path().join("chunk.raw"))
            .unwrap_err();
        assert!(matches!(err, DemError::Conversion { .. }));
    }

    #[test]
    fn test_raw_copies() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("N00E000.hgt");
        let output = dir.path().join("chunk.raw");
        fs::write(&input, [1u8, 2, 3, 4]).unwrap();

        RawConverter.convert("A", &input, &output).unwrap();
        assert_eq!(fs::read(&output).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_imagemagick_args() {
        let converter = CommandConverter::imagemagick();
        let args = converter.expand_args(Path::new("/tmp/in.tif"), Path::new("/tmp/out.gray"));
        assert_eq!(converter.program, "convert");
        assert_eq!(args, vec!["/tmp/in.tif", "-quiet", "GRAY:/tmp/out.gray"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_success() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::write(&input, b"abcd").unwrap();

        let converter = CommandConverter::new(
            "cp",
            vec![INPUT_PLACEHOLDER.to_string(), OUTPUT_PLACEHOLDER.to_string()],
        );
        converter.convert("A", &input, &output).unwrap();
        assert_eq!(fs::read(&output).unwrap(), b"abcd");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure() {
        let dir = TempDir::new().unwrap();
        let converter = CommandConverter::new("false", Vec::new());
        let err = converter
            .convert("B", &dir.path().join("in"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, DemError::Conversion { .. }));

        let missing = CommandConverter::new("globedem-no-such-program", Vec::new());
        assert!(missing
            .convert("B", &dir.path().join("in"), &dir.path().join("out"))
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_timeout() {
        let dir = TempDir::new().unwrap();
        let converter = CommandConverter::new("sleep", vec!["5".to_string()])
            .with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = converter
            .convert("A", &dir.path().join("in"), &dir.path().join("out"))
            .unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
