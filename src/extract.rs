//! Extraction of stored entries to disk.
//!
//! [`Extractor`] owns a [`TableReader`] over the archive stream.  It parses
//! the whole table first, leaving the stream on the first payload byte, then
//! copies each payload in table order:
//!
//! ```text
//! NotStarted → Parsing → (Failed | TableReady) → Extracting(i) → (Failed | Done)
//! ```
//!
//! Any fault aborts the run.  Files written for earlier entries stay on disk;
//! there is no rollback.  Each payload is staged in a temporary file next to
//! its target and moved into place only once all `data_size` bytes arrived,
//! so a truncated entry never leaves a partial file at its target path.
//!
//! Entries with a nonzero packing method are not decoded here.  They fail
//! with [`ExtractError::UnsupportedPacking`] so the caller can hand the whole
//! archive to an external extractor instead.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let report = unpbo::extract(
//!     Path::new("co08_escape.Eden.pbo"),
//!     Path::new("out"),
//!     |line| println!("{line}"),
//!     |fraction| eprintln!("{:.0}%", fraction * 100.0),
//! )?;
//! println!("{} files, {} bytes", report.files, report.bytes);
//! # Ok::<(), unpbo::ExtractError>(())
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::entry::{EntryDescriptor, PackingMethod};
use crate::progress::Progress;
use crate::sanitize::{sanitize_entry_path, PathError};
use crate::table::{ParseError, TableReader};

// ── Errors ───────────────────────────────────────────────────────────────────

/// Coarse classification of an [`ExtractError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// End of stream before a structurally required byte count.
    Truncation,
    /// Nonzero packing method.
    UnsupportedEncoding,
    /// Entry name would resolve outside the output root.
    PathSafety,
    /// Filesystem or stream failure.
    Io,
    /// Entry rejected by a strict [`ExtractOptions`] policy.
    Malformed,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("entry '{name}' uses unsupported packing method {method:#010x} ({}); an external extractor is required", packing_name(.method))]
    UnsupportedPacking { name: String, method: u32 },
    #[error("truncated archive: entry '{name}' declares {expected} payload bytes, only {actual} available")]
    TruncatedPayload { name: String, expected: u32, actual: u64 },
    #[error(transparent)]
    UnsafePath(#[from] PathError),
    #[error("entry '{name}': original size {original} differs from stored size {data}")]
    SizeMismatch { name: String, original: u32, data: u32 },
    #[error("entry '{name}' duplicates an earlier entry at '{}'", .path.display())]
    DuplicateEntry { name: String, path: PathBuf },
    #[error("failed to read payload of entry '{name}' from {}: {source}", archive_label(.archive))]
    ReadPayload {
        name:    String,
        archive: Option<PathBuf>,
        #[source]
        source:  io::Error,
    },
    #[error("failed to {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> FaultKind {
        match self {
            ExtractError::Parse(ParseError::Io(_))   => FaultKind::Io,
            ExtractError::Parse(_)                   => FaultKind::Truncation,
            ExtractError::UnsupportedPacking { .. }  => FaultKind::UnsupportedEncoding,
            ExtractError::TruncatedPayload { .. }    => FaultKind::Truncation,
            ExtractError::UnsafePath(_)              => FaultKind::PathSafety,
            ExtractError::SizeMismatch { .. }
            | ExtractError::DuplicateEntry { .. }    => FaultKind::Malformed,
            ExtractError::ReadPayload { .. }
            | ExtractError::Io { .. }                => FaultKind::Io,
        }
    }

    /// True when the archive needs an external, format-capable extractor.
    pub fn is_unsupported_encoding(&self) -> bool {
        self.kind() == FaultKind::UnsupportedEncoding
    }
}

fn packing_name(method: &u32) -> &'static str {
    PackingMethod::from(*method).name()
}

fn archive_label(archive: &Option<PathBuf>) -> String {
    match archive {
        Some(path) => format!("'{}'", path.display()),
        None       => "archive stream".to_owned(),
    }
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> ExtractError {
    let path = path.to_path_buf();
    move |source| ExtractError::Io { action, path, source }
}

// ── ExtractOptions ───────────────────────────────────────────────────────────

/// How `original_size` is treated for stored entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    /// `original_size` is not consulted.
    #[default]
    IgnoreOriginal,
    /// Stored entries must have `original_size == data_size`.
    RequireEqual,
}

/// What happens when two entries map to the same output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Later entries overwrite earlier ones.
    #[default]
    Overwrite,
    /// The second occurrence aborts the extraction before it is written.
    Reject,
}

/// Configuration for [`Extractor`] and [`extract_with_options`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub size_policy:      SizePolicy,
    pub duplicate_policy: DuplicatePolicy,
    /// Create the output root when missing.  When `false` the root must
    /// already be a directory.
    pub create_root:      bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            size_policy:      SizePolicy::IgnoreOriginal,
            duplicate_policy: DuplicatePolicy::Overwrite,
            create_root:      true,
        }
    }
}

// ── ExtractReport ────────────────────────────────────────────────────────────

/// Summary of a completed extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub output_root: PathBuf,
    /// Files written, overwrites of duplicate paths included.
    pub files:       usize,
    pub bytes:       u64,
    /// Relative paths written, in table order.
    pub entries:     Vec<PathBuf>,
}

// ── Extractor ────────────────────────────────────────────────────────────────

pub struct Extractor<R: Read> {
    reader:  TableReader<R>,
    options: ExtractOptions,
    /// Path the stream was opened from, for read-fault messages.
    archive: Option<PathBuf>,
}

impl Extractor<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, options: ExtractOptions) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(io_error("open archive", path))?;
        let mut extractor = Self::new(BufReader::new(file), options);
        extractor.archive = Some(path.to_path_buf());
        Ok(extractor)
    }
}

impl<R: Read> Extractor<R> {
    /// `reader` must be positioned at offset 0 of the archive.
    pub fn new(reader: R, options: ExtractOptions) -> Self {
        Self { reader: TableReader::new(reader), options, archive: None }
    }

    /// Extract every entry under `root`.
    ///
    /// `on_log` receives one line per written entry, a completion line, and
    /// on failure a final line describing the fault.  `on_progress` receives
    /// the combined fraction after every entry.
    pub fn extract_to<L, P>(
        self,
        root:            &Path,
        mut on_log:      L,
        mut on_progress: P,
    ) -> Result<ExtractReport, ExtractError>
    where
        L: FnMut(&str),
        P: FnMut(f64),
    {
        let result = self.run(root, &mut on_log, &mut on_progress);
        report_failure(result, &mut on_log)
    }

    fn run<L, P>(
        self,
        root:        &Path,
        on_log:      &mut L,
        on_progress: &mut P,
    ) -> Result<ExtractReport, ExtractError>
    where
        L: FnMut(&str),
        P: FnMut(f64),
    {
        let Extractor { mut reader, options, archive } = self;
        let table = reader.read_table()?;
        let mut stream = reader.into_inner();

        if options.create_root {
            fs::create_dir_all(root).map_err(io_error("create directory", root))?;
        } else if !root.is_dir() {
            return Err(io_error("open output directory", root)(io::Error::new(
                io::ErrorKind::NotFound,
                "not an existing directory",
            )));
        }

        let mut progress = Progress::new(table.len(), table.total_bytes());
        if table.is_empty() {
            on_progress(progress.fraction());
        }

        let mut seen:    HashSet<PathBuf> = HashSet::new();
        let mut written: Vec<PathBuf>     = Vec::with_capacity(table.len());

        for entry in table.entries() {
            check_entry(entry, &options)?;

            let target = sanitize_entry_path(&entry.name, root)?;
            if !seen.insert(target.relative.clone())
                && options.duplicate_policy == DuplicatePolicy::Reject
            {
                return Err(ExtractError::DuplicateEntry {
                    name: entry.name.clone(),
                    path: target.relative,
                });
            }

            copy_payload(&mut stream, archive.as_deref(), entry, &target.resolved, root)?;

            on_log(&format!("{}  ({} bytes)", entry.name, entry.data_size));
            log::debug!("wrote {} ({} bytes)", target.resolved.display(), entry.data_size);

            progress.advance(entry.data_size as u64);
            on_progress(progress.fraction());
            written.push(target.relative);
        }

        on_log(&format!("extraction complete: {}", root.display()));
        log::info!(
            "extracted {} file(s), {} bytes to {}",
            progress.files_done, progress.bytes_done, root.display()
        );

        Ok(ExtractReport {
            output_root: root.to_path_buf(),
            files:       progress.files_done,
            bytes:       progress.bytes_done,
            entries:     written,
        })
    }
}

// ── Payload copy ─────────────────────────────────────────────────────────────

const COPY_BUF_SIZE: usize = 64 * 1024;

fn check_entry(entry: &EntryDescriptor, options: &ExtractOptions) -> Result<(), ExtractError> {
    if !entry.is_stored() {
        return Err(ExtractError::UnsupportedPacking {
            name:   entry.name.clone(),
            method: entry.packing_method,
        });
    }
    if options.size_policy == SizePolicy::RequireEqual && entry.original_size != entry.data_size {
        return Err(ExtractError::SizeMismatch {
            name:     entry.name.clone(),
            original: entry.original_size,
            data:     entry.data_size,
        });
    }
    Ok(())
}

/// Stream exactly `entry.data_size` bytes from `stream` into `target`.
fn copy_payload<R: Read>(
    stream:  &mut R,
    archive: Option<&Path>,
    entry:   &EntryDescriptor,
    target:  &Path,
    root:    &Path,
) -> Result<(), ExtractError> {
    let dir = target.parent().unwrap_or(root);
    fs::create_dir_all(dir).map_err(io_error("create directory", dir))?;

    let mut staged = staging_file(dir).map_err(io_error("create temporary file in", dir))?;
    let expected = entry.data_size as u64;
    let mut payload = stream.by_ref().take(expected);
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied = 0u64;
    loop {
        let n = match payload.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(ExtractError::ReadPayload {
                    name:    entry.name.clone(),
                    archive: archive.map(Path::to_path_buf),
                    source,
                });
            }
        };
        staged.as_file_mut().write_all(&buf[..n]).map_err(io_error("write", target))?;
        copied += n as u64;
    }
    if copied != expected {
        return Err(ExtractError::TruncatedPayload {
            name:     entry.name.clone(),
            expected: entry.data_size,
            actual:   copied,
        });
    }

    staged.persist(target).map_err(|e| ExtractError::Io {
        action: "write",
        path:   target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn staging_file(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".unpbo-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dir)
}

fn report_failure<T, L: FnMut(&str)>(
    result: Result<T, ExtractError>,
    on_log: &mut L,
) -> Result<T, ExtractError> {
    if let Err(ref err) = result {
        log::warn!("extraction failed ({:?}): {err}", err.kind());
        on_log(&format!("extraction failed: {err}"));
    }
    result
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Extract the archive at `archive_path` under `output_root` with default
/// [`ExtractOptions`].
pub fn extract<L, P>(
    archive_path: &Path,
    output_root:  &Path,
    on_log:       L,
    on_progress:  P,
) -> Result<ExtractReport, ExtractError>
where
    L: FnMut(&str),
    P: FnMut(f64),
{
    extract_with_options(archive_path, output_root, ExtractOptions::default(), on_log, on_progress)
}

pub fn extract_with_options<L, P>(
    archive_path:    &Path,
    output_root:     &Path,
    options:         ExtractOptions,
    mut on_log:      L,
    on_progress:     P,
) -> Result<ExtractReport, ExtractError>
where
    L: FnMut(&str),
    P: FnMut(f64),
{
    match Extractor::open(archive_path, options) {
        Ok(extractor) => extractor.extract_to(output_root, on_log, on_progress),
        Err(err)      => report_failure(Err(err), &mut on_log),
    }
}
