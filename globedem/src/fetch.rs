//! Chunk Fetcher: retrieve one remote archive and extract its payload.
//!
//! The byte transport is a [`Transport`] so the fetcher can run against the
//! network ([`HttpTransport`], feature `download`) or a local mirror
//! directory ([`MirrorTransport`]). Archive handling is the same for both.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::chunk::{ChunkDescriptor, Compression};
use crate::error::{DemError, Result};

/// Moves one remote chunk archive into a local file.
pub trait Transport: Send + Sync {
    /// Download `chunk.url` into `dest`, replacing any existing content.
    fn download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
        (**self).download(chunk, dest)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
        (**self).download(chunk, dest)
    }
}

/// Serves archives from a local directory laid out like the remote server.
///
/// A URL resolves to `root/<last path segment>`, so a mirror of the remote
/// directory can be used without rewriting URL templates.
#[derive(Debug, Clone)]
pub struct MirrorTransport {
    root: PathBuf,
}

impl MirrorTransport {
    /// Create a transport reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path that `url` resolves to.
    pub fn resolve(&self, url: &str) -> PathBuf {
        let name = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .rsplit('/')
            .next()
            .unwrap_or(url);
        self.root.join(name)
    }
}

impl Transport for MirrorTransport {
    fn download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
        let source = self.resolve(&chunk.url);
        if !source.is_file() {
            return Err(DemError::Transfer {
                chunk: chunk.code.clone(),
                url: chunk.url.clone(),
                status: Some(404),
                reason: format!("{} not found", source.display()),
            });
        }
        fs::copy(&source, dest)?;
        Ok(())
    }
}

#[cfg(feature = "download")]
pub use http::HttpTransport;

#[cfg(feature = "download")]
mod http {
    use std::fs::File;
    use std::path::Path;
    use std::thread::sleep;
    use std::time::Duration;

    use reqwest::blocking::Client;

    use crate::chunk::{ChunkDescriptor, SourceConfig};
    use crate::error::{DemError, Result};

    use super::Transport;

    /// Blocking HTTP transport with bounded retries.
    pub struct HttpTransport {
        client: Client,
        max_retries: u32,
    }

    impl HttpTransport {
        /// Create a transport using the timeout and retry settings of `source`.
        pub fn new(source: &SourceConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(source.timeout_secs))
                .build()
                .map_err(|e| {
                    DemError::InvalidConfig(format!("failed to create HTTP client: {}", e))
                })?;

            Ok(Self {
                client,
                max_retries: source.max_retries,
            })
        }

        fn try_download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
            let transfer_error = |status: Option<u16>, reason: String| DemError::Transfer {
                chunk: chunk.code.clone(),
                url: chunk.url.clone(),
                status,
                reason,
            };

            let mut response = self
                .client
                .get(&chunk.url)
                .send()
                .map_err(|e| transfer_error(None, e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(transfer_error(
                    Some(status.as_u16()),
                    status.canonical_reason().unwrap_or_default().to_string(),
                ));
            }

            let mut file = File::create(dest)?;
            response
                .copy_to(&mut file)
                .map_err(|e| transfer_error(None, e.to_string()))?;
            Ok(())
        }
    }

    impl Transport for HttpTransport {
        fn download(&self, chunk: &ChunkDescriptor, dest: &Path) -> Result<()> {
            let mut attempt = 0;
            loop {
                match self.try_download(chunk, dest) {
                    Ok(()) => return Ok(()),
                    Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                        attempt += 1;
                        tracing::warn!(chunk = %chunk.code, attempt, error = %e, "retrying transfer");
                        sleep(Duration::from_millis(500 * attempt as u64));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Network failures and server errors are transient; client errors are not.
    fn is_retryable(err: &DemError) -> bool {
        match err {
            DemError::Transfer { status: None, .. } => true,
            DemError::Transfer {
                status: Some(code), ..
            } => *code >= 500,
            _ => false,
        }
    }

}

/// Downloads chunk archives and extracts the single expected payload.
pub struct ChunkFetcher<T> {
    transport: T,
    compression: Compression,
}

impl<T: Transport> ChunkFetcher<T> {
    /// Create a fetcher for archives of the given format.
    pub fn new(transport: T, compression: Compression) -> Self {
        Self {
            transport,
            compression,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch `chunk` into `archive_path` and write its payload to `payload_path`.
    ///
    /// ZIP archives must contain exactly one entry named `chunk.entry_name`.
    /// Both paths are owned by the caller, who is responsible for removing them.
    pub fn fetch(&self, chunk: &ChunkDescriptor, archive_path: &Path, payload_path: &Path) -> Result<()> {
        self.transport.download(chunk, archive_path)?;

        match self.compression {
            Compression::Zip => extract_single_entry(chunk, archive_path, payload_path),
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(BufReader::new(File::open(archive_path)?));
                let mut out = File::create(payload_path)?;
                io::copy(&mut decoder, &mut out).map_err(|e| DemError::CorruptArchive {
                    chunk: chunk.code.clone(),
                    reason: format!("failed to decompress gzip: {}", e),
                })?;
                Ok(())
            }
            Compression::None => {
                fs::copy(archive_path, payload_path)?;
                Ok(())
            }
        }
    }
}

/// Extract the payload of an archive that must hold exactly `chunk.entry_name`.
fn extract_single_entry(chunk: &ChunkDescriptor, archive_path: &Path, payload_path: &Path) -> Result<()> {
    let corrupt = |e: zip::result::ZipError| DemError::CorruptArchive {
        chunk: chunk.code.clone(),
        reason: e.to_string(),
    };

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(corrupt)?;

    let found: Vec<String> = archive.file_names().map(str::to_string).collect();
    if found.len() != 1 || found[0] != chunk.entry_name {
        return Err(DemError::ArchiveContents {
            chunk: chunk.code.clone(),
            expected: chunk.entry_name.clone(),
            found,
        });
    }

    let mut entry = archive.by_index(0).map_err(corrupt)?;
    let mut out = File::create(payload_path)?;
    io::copy(&mut entry, &mut out).map_err(|e| DemError::CorruptArchive {
        chunk: chunk.code.clone(),
        reason: format!("failed to extract {}: {}", chunk.entry_name, e),
    })?;
    Ok(())
}
