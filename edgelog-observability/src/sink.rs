//! Append-only sinks for newline-delimited log records.
//!
//! [`FileSink`] is the default medium: one JSON record per line in a local
//! file that a batch crawler picks up. The destination is created lazily on
//! the first append (`absent → present`) and is never removed by the sink.
//!
//! Optional size-based rotation renames the active file with a UTC timestamp
//! suffix (e.g. `access.log.20250115T103000.123456`) and reopens the base path
//! immediately, so the destination stays present.
//!
//! [`StdoutSink`] writes the same lines to stdout for deployments where a
//! container log router ships stdout to the analytics store.

use chrono::Utc;
use edgelog_core::config::{SinkConfig, SinkKind};
use edgelog_core::EdgelogError;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

// ── Trait ────────────────────────────────────────────────────────────────────

/// An append-only destination for serialized log records.
///
/// Implementations must accept concurrent `append` calls without interleaving
/// partial records.
pub trait Sink: Send + Sync {
    /// Create the destination if it does not exist. Idempotent.
    fn ensure(&self) -> Result<(), EdgelogError>;

    /// Append one record followed by `\n`. Calls `ensure` first if needed.
    fn append(&self, line: &str) -> Result<(), EdgelogError>;

    fn flush(&self) -> Result<(), EdgelogError>;

    fn describe(&self) -> SinkDescription;
}

/// Health-check view of a sink.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SinkDescription {
    pub kind: &'static str,
    pub path: String,
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

/// Build the sink selected by `config.kind`.
pub fn from_config(config: &SinkConfig) -> Arc<dyn Sink> {
    match config.kind {
        SinkKind::File => Arc::new(FileSink::new(FileSinkConfig::from(config))),
        SinkKind::Stdout => Arc::new(StdoutSink),
    }
}

// ── File sink ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Active file, e.g. `logs/access.log`.
    pub file_path: PathBuf,
    /// Rotate when the active file reaches this size. 0 = never.
    pub max_file_size_bytes: u64,
    /// Rotated files to keep. 0 = unlimited.
    pub max_rotated_files: usize,
}

impl From<&SinkConfig> for FileSinkConfig {
    fn from(config: &SinkConfig) -> Self {
        Self {
            file_path: config.file_path(),
            max_file_size_bytes: config.max_file_size_bytes,
            max_rotated_files: config.max_rotated_files,
        }
    }
}

pub struct FileSink {
    config: FileSinkConfig,
    /// `None` until the destination has been ensured.
    inner: Mutex<Option<WriterState>>,
}

struct WriterState {
    file: File,
    current_size: u64,
    /// The file does not end with `\n`, e.g. after a torn write.
    torn_tail: bool,
}

impl FileSink {
    /// Does not touch the filesystem; the file is created on first use.
    pub fn new(config: FileSinkConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.file_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<WriterState>>, EdgelogError> {
        self.inner
            .lock()
            .map_err(|_| EdgelogError::Sink("file sink lock poisoned".into()))
    }

    fn open(&self) -> io::Result<WriterState> {
        if let Some(parent) = self.config.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                // create_dir_all treats an existing directory as success,
                // including one created concurrently by another process.
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.config.file_path)?;
        let current_size = file.metadata()?.len();
        let torn_tail = current_size > 0 && !ends_with_newline(&mut file)?;

        Ok(WriterState {
            file,
            current_size,
            torn_tail,
        })
    }

    /// The open handle no longer backs the configured path (removed or
    /// replaced by whoever consumes the sink).
    fn is_detached(&self, writer: &WriterState) -> bool {
        match fs::metadata(&self.config.file_path) {
            Ok(on_disk) => !same_file(&writer.file, &on_disk),
            Err(_) => true,
        }
    }

    fn ensure_locked(&self, state: &mut Option<WriterState>) -> Result<(), EdgelogError> {
        if let Some(writer) = state.as_ref() {
            if !self.is_detached(writer) {
                return Ok(());
            }
            warn!(path = %self.config.file_path.display(), "Log sink file went away, reopening");
            *state = None;
        }

        let opened = self.open().map_err(|e| sink_io_error(&self.config.file_path, e))?;
        if opened.torn_tail {
            warn!(path = %self.config.file_path.display(), "Log sink file ends mid-line");
        }
        info!(path = %self.config.file_path.display(), "Log sink file opened");
        *state = Some(opened);
        Ok(())
    }

    fn rotate(&self, state: &mut Option<WriterState>) -> Result<(), EdgelogError> {
        if let Some(mut current) = state.take() {
            current
                .file
                .flush()
                .map_err(|e| sink_io_error(&self.config.file_path, e))?;
        }

        let suffix = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();
        let rotated_path = rotated_file_path(&self.config.file_path, &suffix);

        if self.config.file_path.exists() {
            match fs::rename(&self.config.file_path, &rotated_path) {
                Ok(()) => info!(
                    from = %self.config.file_path.display(),
                    to = %rotated_path.display(),
                    "Rotated log sink file"
                ),
                Err(e) => error!(
                    error = %e,
                    from = %self.config.file_path.display(),
                    to = %rotated_path.display(),
                    "Failed to rotate log sink file"
                ),
            }
        }

        if self.config.max_rotated_files > 0 {
            if let Err(e) = prune_rotated_files(&self.config.file_path, self.config.max_rotated_files) {
                warn!(error = %e, "Failed to prune old log sink files");
            }
        }

        self.ensure_locked(state)
    }
}

impl Sink for FileSink {
    fn ensure(&self) -> Result<(), EdgelogError> {
        let mut state = self.lock()?;
        self.ensure_locked(&mut state)
    }

    fn append(&self, line: &str) -> Result<(), EdgelogError> {
        if line.contains('\n') {
            return Err(EdgelogError::InvalidRecord(
                "record line contains a newline".into(),
            ));
        }

        let mut state = self.lock()?;
        self.ensure_locked(&mut state)?;

        let needs_rotate = self.config.max_file_size_bytes > 0
            && state
                .as_ref()
                .is_some_and(|s| s.current_size >= self.config.max_file_size_bytes);
        if needs_rotate {
            self.rotate(&mut state)?;
        }

        let Some(writer) = state.as_mut() else {
            return Err(EdgelogError::Internal("file sink not open after ensure".into()));
        };

        // One write per record so readers never observe a partial line
        // followed by another record.
        let mut buf = Vec::with_capacity(line.len() + 2);
        if writer.torn_tail {
            buf.push(b'\n');
        }
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        match writer.file.write_all(&buf) {
            Ok(()) => {
                writer.current_size += buf.len() as u64;
                writer.torn_tail = false;
                Ok(())
            }
            Err(e) => {
                // Cut a short write back to the last whole record. If that
                // fails too, reopening detects the torn tail.
                let truncated = writer.file.set_len(writer.current_size).is_ok();
                if !truncated {
                    *state = None;
                }
                Err(sink_io_error(&self.config.file_path, e))
            }
        }
    }

    fn flush(&self) -> Result<(), EdgelogError> {
        let mut state = self.lock()?;
        if let Some(writer) = state.as_mut() {
            writer
                .file
                .sync_data()
                .map_err(|e| sink_io_error(&self.config.file_path, e))?;
        }
        Ok(())
    }

    fn describe(&self) -> SinkDescription {
        let meta = fs::metadata(&self.config.file_path).ok();
        SinkDescription {
            kind: "file",
            path: self.config.file_path.to_string_lossy().into_owned(),
            exists: meta.is_some(),
            size_bytes: meta.map(|m| m.len()),
        }
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(unix)]
fn same_file(open: &File, on_disk: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    open.metadata()
        .is_ok_and(|m| m.dev() == on_disk.dev() && m.ino() == on_disk.ino())
}

#[cfg(not(unix))]
fn same_file(_open: &File, _on_disk: &fs::Metadata) -> bool {
    true
}

fn sink_io_error(path: &Path, e: io::Error) -> EdgelogError {
    EdgelogError::Sink(format!("{}: {e}", path.display()))
}

// ── Stdout sink ──────────────────────────────────────────────────────────────

pub struct StdoutSink;

impl Sink for StdoutSink {
    fn ensure(&self) -> Result<(), EdgelogError> {
        Ok(())
    }

    fn append(&self, line: &str) -> Result<(), EdgelogError> {
        if line.contains('\n') {
            return Err(EdgelogError::InvalidRecord(
                "record line contains a newline".into(),
            ));
        }
        let mut out = io::stdout().lock();
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        out.write_all(&buf)
            .and_then(|_| out.flush())
            .map_err(|e| EdgelogError::Sink(format!("stdout: {e}")))
    }

    fn flush(&self) -> Result<(), EdgelogError> {
        io::stdout()
            .flush()
            .map_err(|e| EdgelogError::Sink(format!("stdout: {e}")))
    }

    fn describe(&self) -> SinkDescription {
        SinkDescription {
            kind: "stdout",
            path: "-".into(),
            exists: true,
            size_bytes: None,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `access.log` → `access.log.<suffix>`.
fn rotated_file_path(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

/// Remove old rotated files, keeping only the newest `keep`.
fn prune_rotated_files(base_path: &Path, keep: usize) -> io::Result<()> {
    let parent = match base_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base_name = base_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy();

    let mut rotated_files: Vec<PathBuf> = Vec::new();

    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(&*base_name)
            && name.len() > base_name.len()
            && name.as_bytes()[base_name.len()] == b'.'
        {
            rotated_files.push(entry.path());
        }
    }

    // Timestamp suffixes sort lexicographically, oldest first.
    rotated_files.sort();

    if rotated_files.len() > keep {
        let to_remove = rotated_files.len() - keep;
        for path in rotated_files.iter().take(to_remove) {
            debug!(path = %path.display(), "Pruning old rotated log sink file");
            fs::remove_file(path)?;
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────
