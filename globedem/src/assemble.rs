//! Dataset Assembler: fetch, convert, validate and append chunks in order.
//!
//! The output is either one flat file holding every chunk back to back
//! ([`BuildTarget::File`]) or one file per chunk in a directory
//! ([`BuildTarget::Directory`]). Either way nothing appears under the final
//! name until every chunk has passed the size gate:
//!
//! - single-file output is written to a hidden temporary file next to the
//!   target and renamed into place (without clobbering) at the end;
//! - split output is staged in a hidden directory inside the target
//!   directory and moved out at the end.
//!
//! Scratch files live in a caller-supplied workspace directory that must be
//! empty, must not overlap the target, and is claimed with a `.lock` file
//! for the duration of the build. Only the scratch files the build created
//! are removed afterwards, whether the build succeeds or fails.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tempfile::{NamedTempFile, TempDir};

use crate::chunk::{ChunkDescriptor, SourceConfig};
use crate::convert::Converter;
use crate::error::{DemError, Result};
use crate::fetch::{ChunkFetcher, Transport};
use crate::layout::DatasetLayout;
use crate::validate::validate_size;

/// Name of the lock file claiming a workspace.
pub const WORKSPACE_LOCK: &str = ".lock";

/// Extension of split-mode chunk files.
pub const CHUNK_FILE_EXTENSION: &str = "raw";

/// Where the assembled dataset goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTarget {
    /// One flat file with every chunk concatenated in order.
    File(PathBuf),
    /// One file per chunk inside a directory.
    Directory {
        /// Target directory; must be absent or empty.
        path: PathBuf,
        /// File name prefix; chunk files are named `{prefix}{index:02}.raw`.
        /// Without a prefix the payload entry's stem is used (`15-A.raw`).
        prefix: Option<String>,
    },
}

impl BuildTarget {
    /// Path of the file or directory being built.
    pub fn path(&self) -> &Path {
        match self {
            BuildTarget::File(path) => path,
            BuildTarget::Directory { path, .. } => path,
        }
    }
}

/// Shared flag for cancelling a running build from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Number of chunks prepared concurrently. Output order never depends on it.
    pub jobs: usize,
    /// Optional external cancellation.
    pub cancel: Option<CancelFlag>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            cancel: None,
        }
    }
}

impl BuildOptions {
    /// Set the number of concurrent workers.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Attach a cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Reported after each chunk is committed to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProgress {
    /// Chunks committed so far.
    pub completed: usize,
    /// Chunks in the build.
    pub total: usize,
    /// Code of the chunk just committed.
    pub code: String,
    /// Bytes written to the output so far.
    pub bytes: u64,
}

/// Summary of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Number of chunks written.
    pub chunks: usize,
    /// Total bytes written.
    pub bytes: u64,
    /// Final file or directory.
    pub target: PathBuf,
}

/// Builds datasets from remote chunks.
pub struct Assembler<T, C> {
    source: SourceConfig,
    layout: DatasetLayout,
    fetcher: ChunkFetcher<T>,
    converter: C,
}

impl<T: Transport, C: Converter> Assembler<T, C> {
    /// Create an assembler.
    ///
    /// # Arguments
    ///
    /// * `source` - Where chunk archives come from
    /// * `layout` - Chunk codes and per-chunk resolution
    /// * `transport` - Moves archives into the workspace
    /// * `converter` - Turns payloads into raw samples
    pub fn new(source: SourceConfig, layout: DatasetLayout, transport: T, converter: C) -> Result<Self> {
        source.validate()?;
        let fetcher = ChunkFetcher::new(transport, source.compression);
        Ok(Self {
            source,
            layout,
            fetcher,
            converter,
        })
    }

    /// The layout chunks are resolved against.
    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// The remote source configuration.
    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Build `codes`, in that order, into `target`.
    ///
    /// The first failing chunk aborts the build; the target is then left
    /// exactly as it was. `progress` is called after each committed chunk.
    pub fn build<F>(
        &self,
        target: &BuildTarget,
        codes: &[String],
        workspace: &Path,
        options: &BuildOptions,
        mut progress: F,
    ) -> Result<BuildReport>
    where
        F: FnMut(&BuildProgress),
    {
        if options.jobs == 0 {
            return Err(DemError::InvalidConfig("jobs must be at least 1".into()));
        }
        let chunks = ChunkDescriptor::resolve(&self.source, &self.layout, codes)?;
        check_target(target)?;
        check_workspace(target, workspace)?;

        let created = !target.path().exists();
        let workspace = Workspace::claim(workspace)?;
        let mut sink = Sink::open(target, created)?;
        let total = chunks.len();
        let mut completed = 0;
        let mut bytes = 0;

        tracing::info!(
            path = %target.path().display(),
            chunks = total,
            jobs = options.jobs,
            "starting dataset build"
        );

        let result = self.run_chunks(&chunks, &workspace, options, |chunk, converted| {
            bytes += sink.append(chunk, converted)?;
            completed += 1;
            tracing::info!(chunk = %chunk.code, completed, total, bytes, "chunk committed");
            progress(&BuildProgress {
                completed,
                total,
                code: chunk.code.clone(),
                bytes,
            });
            Ok(())
        });

        let result = result.and_then(|()| {
            if options.is_cancelled() {
                Err(DemError::Cancelled)
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                let path = sink.finish()?;
                tracing::info!(path = %path.display(), bytes, "dataset build complete");
                Ok(BuildReport {
                    chunks: total,
                    bytes,
                    target: path,
                })
            }
            Err(e) => {
                sink.discard();
                tracing::warn!(error = %e, "dataset build aborted");
                Err(e)
            }
        }
    }

    /// Prepare every chunk and hand each converted file to `commit` in
    /// declared order.
    fn run_chunks<F>(
        &self,
        chunks: &[ChunkDescriptor],
        workspace: &Workspace,
        options: &BuildOptions,
        mut commit: F,
    ) -> Result<()>
    where
        F: FnMut(&ChunkDescriptor, &Path) -> Result<()>,
    {
        if options.jobs == 1 || chunks.len() == 1 {
            for chunk in chunks {
                if options.is_cancelled() {
                    return Err(DemError::Cancelled);
                }
                let converted = self.prepare(chunk, workspace)?;
                let committed = commit(chunk, &converted);
                remove_scratch(&converted);
                committed?;
            }
            return Ok(());
        }

        let stop = AtomicBool::new(false);
        let (work_tx, work_rx) = crossbeam_channel::unbounded();
        for chunk in chunks {
            let _ = work_tx.send(chunk);
        }
        drop(work_tx);
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, Result<PathBuf>)>();

        thread::scope(|scope| {
            for _ in 0..options.jobs.min(chunks.len()) {
                let work_rx = work_rx.clone();
                let done_tx = done_tx.clone();
                let stop = &stop;
                scope.spawn(move || {
                    for chunk in work_rx.iter() {
                        if stop.load(Ordering::SeqCst) || options.is_cancelled() {
                            break;
                        }
                        let result = self.prepare(chunk, workspace);
                        if done_tx.send((chunk.index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(done_tx);

            // Completions arrive in any order; commit strictly by index.
            let mut pending = BTreeMap::new();
            let mut next = 0;
            for (index, result) in done_rx.iter() {
                let converted = match result {
                    Ok(path) => path,
                    Err(e) => {
                        stop.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                };
                pending.insert(index, converted);

                while let Some(converted) = pending.remove(&next) {
                    let committed = commit(&chunks[next], &converted);
                    remove_scratch(&converted);
                    if let Err(e) = committed {
                        stop.store(true, Ordering::SeqCst);
                        return Err(e);
                    }
                    next += 1;
                }
            }

            if next == chunks.len() {
                Ok(())
            } else {
                Err(DemError::Cancelled)
            }
        })
    }

    /// Fetch, convert and validate one chunk, returning the converted file.
    ///
    /// Archive and payload scratch files are always removed; the converted
    /// file is removed on failure.
    fn prepare(&self, chunk: &ChunkDescriptor, workspace: &Workspace) -> Result<PathBuf> {
        let archive = workspace.scratch(chunk, "archive");
        let payload = workspace.scratch(chunk, "payload");
        let converted = workspace.scratch(chunk, "converted");

        tracing::info!(chunk = %chunk.code, url = %chunk.url, "fetching chunk");
        let result = self.prepare_into(chunk, &archive, &payload, &converted);

        remove_scratch(&archive);
        remove_scratch(&payload);
        match result {
            Ok(()) => Ok(converted),
            Err(e) => {
                remove_scratch(&converted);
                tracing::warn!(chunk = %chunk.code, error = %e, "chunk failed");
                Err(e)
            }
        }
    }

    fn prepare_into(
        &self,
        chunk: &ChunkDescriptor,
        archive: &Path,
        payload: &Path,
        converted: &Path,
    ) -> Result<()> {
        self.fetcher.fetch(chunk, archive, payload)?;
        remove_scratch(archive);

        tracing::debug!(chunk = %chunk.code, "converting chunk");
        self.converter.convert(&chunk.code, payload, converted)?;
        remove_scratch(payload);

        validate_size(&chunk.code, converted, chunk.expected_bytes)?;
        Ok(())
    }
}

/// Refuse targets that already hold data.
fn check_target(target: &BuildTarget) -> Result<()> {
    let refused = match target {
        BuildTarget::File(path) => path.symlink_metadata().is_ok(),
        BuildTarget::Directory { path, .. } => match fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_some(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(_) => path.exists(),
        },
    };

    if refused {
        return Err(DemError::AlreadyExists {
            path: target.path().to_path_buf(),
        });
    }
    Ok(())
}

/// Refuse a workspace that is, contains, or sits inside the target.
fn check_workspace(target: &BuildTarget, workspace: &Path) -> Result<()> {
    let target_path = resolve_path(target.path())?;
    let workspace_path = resolve_path(workspace)?;

    if target_path.starts_with(&workspace_path) || workspace_path.starts_with(&target_path) {
        return Err(DemError::InvalidConfig(format!(
            "workspace {} overlaps target {}",
            workspace.display(),
            target.path().display()
        )));
    }
    Ok(())
}

/// Absolute form of a path that may not exist yet: the longest existing
/// ancestor is canonicalized and the remaining components appended.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut resolved) = existing.canonicalize() {
            resolved.extend(missing.iter().rev());
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

/// File name of a chunk in split mode.
pub fn split_file_name(prefix: Option<&str>, chunk: &ChunkDescriptor) -> String {
    match prefix {
        Some(prefix) => format!("{}{:02}.{}", prefix, chunk.index, CHUNK_FILE_EXTENSION),
        None => {
            let stem = Path::new(&chunk.entry_name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| chunk.code.clone());
            format!("{}.{}", stem, CHUNK_FILE_EXTENSION)
        }
    }
}

fn remove_scratch(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

/// An empty directory claimed for one build.
struct Workspace {
    dir: PathBuf,
    lock: PathBuf,
    scratch: Mutex<Vec<PathBuf>>,
}

impl Workspace {
    fn claim(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let in_use = || DemError::WorkspaceInUse {
            path: dir.to_path_buf(),
        };

        if fs::read_dir(dir)?.next().is_some() {
            return Err(in_use());
        }

        let lock = dir.join(WORKSPACE_LOCK);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    in_use()
                } else {
                    DemError::Io(e)
                }
            })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            lock,
            scratch: Mutex::new(Vec::new()),
        })
    }

    /// Hand out a scratch path and remember it for cleanup.
    fn scratch(&self, chunk: &ChunkDescriptor, kind: &str) -> PathBuf {
        let path = self.dir.join(format!("chunk-{:02}.{}", chunk.index, kind));
        self.scratch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.clone());
        path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let scratch = self.scratch.get_mut().unwrap_or_else(PoisonError::into_inner);
        for path in scratch.drain(..) {
            remove_scratch(&path);
        }
        remove_scratch(&self.lock);
    }
}

/// Output being written; invisible under the final name until `finish`.
enum Sink {
    File {
        temp: NamedTempFile,
        target: PathBuf,
    },
    Directory {
        staging: TempDir,
        target: PathBuf,
        created: bool,
        prefix: Option<String>,
        files: Vec<String>,
    },
}

impl Sink {
    /// `created` records whether the build is creating a split target
    /// directory, so a failed build removes it again.
    fn open(target: &BuildTarget, created: bool) -> Result<Self> {
        match target {
            BuildTarget::File(path) => {
                let parent = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let temp = tempfile::Builder::new()
                    .prefix(".globedem-")
                    .suffix(".partial")
                    .tempfile_in(parent)?;
                Ok(Sink::File {
                    temp,
                    target: path.clone(),
                })
            }
            BuildTarget::Directory { path, prefix } => {
                fs::create_dir_all(path)?;
                let staging = tempfile::Builder::new()
                    .prefix(".globedem-staging-")
                    .tempdir_in(path)?;
                Ok(Sink::Directory {
                    staging,
                    target: path.clone(),
                    created,
                    prefix: prefix.clone(),
                    files: Vec::new(),
                })
            }
        }
    }

    /// Append one validated chunk, returning the number of bytes written.
    fn append(&mut self, chunk: &ChunkDescriptor, converted: &Path) -> Result<u64> {
        match self {
            Sink::File { temp, .. } => {
                let mut input = File::open(converted)?;
                Ok(io::copy(&mut input, temp.as_file_mut())?)
            }
            Sink::Directory {
                staging,
                prefix,
                files,
                ..
            } => {
                let name = split_file_name(prefix.as_deref(), chunk);
                let written = fs::copy(converted, staging.path().join(&name))?;
                files.push(name);
                Ok(written)
            }
        }
    }

    /// Move the output under its final name.
    fn finish(self) -> Result<PathBuf> {
        match self {
            Sink::File { temp, target } => {
                temp.as_file().sync_all()?;
                temp.persist_noclobber(&target).map_err(|e| {
                    if e.error.kind() == io::ErrorKind::AlreadyExists {
                        DemError::AlreadyExists {
                            path: target.clone(),
                        }
                    } else {
                        DemError::Io(e.error)
                    }
                })?;
                Ok(target)
            }
            Sink::Directory {
                staging,
                target,
                files,
                ..
            } => {
                for name in &files {
                    let dest = target.join(name);
                    if dest.exists() {
                        return Err(DemError::AlreadyExists { path: dest });
                    }
                    let staged = staging.path().join(name);
                    File::open(&staged)?.sync_all()?;
                    fs::rename(&staged, &dest)?;
                }
                staging.close()?;
                Ok(target)
            }
        }
    }

    /// Drop everything written so far.
    fn discard(self) {
        if let Sink::Directory {
            staging,
            target,
            created,
            ..
        } = self
        {
            let _ = staging.close();
            if created {
                let _ = fs::remove_dir(&target);
            }
        }
    }
}
