//! Archive a whole directory tree into a single ZIP file
//!
//! The run is one straight line: validate the source, replace whatever sits
//! at the output path, walk the tree and stream every file into a DEFLATE
//! entry named by its root-relative path, then write the central directory.
//!
//! If anything fails once the output file exists, the partial archive is
//! removed before the error is returned, so a failed run never leaves a
//! truncated ZIP behind.

use crate::error::{DirZipError, Result};
use crate::walk::{SourceFile, SourceTree};
use crate::writer::{EntryOptions, StreamingZipWriter};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where to read from and where to write the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub source: PathBuf,
    pub output: PathBuf,
}

impl ArchiveOptions {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
        }
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Canonical source directory
    pub source: PathBuf,
    /// Absolute path of the written archive
    pub destination: PathBuf,
    /// Number of entries written
    pub entries: usize,
    /// Total uncompressed bytes archived
    pub total_bytes: u64,
}

/// Progress notifications emitted during a run
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    /// Paths are resolved and the archive is about to be created
    Started {
        source: &'a Path,
        destination: &'a Path,
    },
    /// A file is about to be added
    Entry { name: &'a str, size: u64 },
    /// The archive has been finalized
    Finished(&'a ArchiveSummary),
}

type Observer<'o> = Box<dyn FnMut(Progress<'_>) + 'o>;

/// Archives one directory into one ZIP file
pub struct Archiver<'o> {
    options: ArchiveOptions,
    observer: Option<Observer<'o>>,
}

impl<'o> Archiver<'o> {
    pub fn new(options: ArchiveOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    /// Receive a [`Progress`] event for the start, every entry and the end of the run
    pub fn on_progress(mut self, observer: impl FnMut(Progress<'_>) + 'o) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn notify(&mut self, event: Progress<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }

    /// Run the archive operation
    pub fn run(mut self) -> Result<ArchiveSummary> {
        let tree = SourceTree::open(&self.options.source)?;
        let destination = prepare_destination(&self.options.output)?;

        info!(
            source = %tree.root().display(),
            destination = %destination.display(),
            "archiving directory"
        );
        self.notify(Progress::Started {
            source: tree.root(),
            destination: &destination,
        });

        // Canonical form of the output, so it is never archived into itself
        let own_path = canonical_destination(&destination)?;

        let file = File::create(&destination).map_err(DirZipError::io_at(&destination))?;
        let mut partial = PartialOutput::new(destination.clone());
        let mut writer = StreamingZipWriter::from_writer(file)?;
        let mut total_bytes = 0u64;

        for source_file in tree.files() {
            let source_file = source_file?;
            if source_file.path == own_path {
                debug!(entry = %source_file.name, "skipping the archive being written");
                continue;
            }
            total_bytes += self.add_file(&mut writer, &source_file)?;
        }

        let entries = writer.entry_count();
        writer.finish()?;
        partial.keep();

        let summary = ArchiveSummary {
            source: tree.root().to_path_buf(),
            destination,
            entries,
            total_bytes,
        };
        info!(entries, total_bytes, "archive written");
        self.notify(Progress::Finished(&summary));
        Ok(summary)
    }

    /// Stream one file into a new entry, returning its size
    fn add_file(
        &mut self,
        writer: &mut StreamingZipWriter<File>,
        source_file: &SourceFile,
    ) -> Result<u64> {
        let io_err = || DirZipError::io_at(&source_file.path);

        let input = File::open(&source_file.path).map_err(io_err())?;
        let metadata = input.metadata().map_err(io_err())?;

        info!(entry = %source_file.name, size = metadata.len(), "zipping");
        self.notify(Progress::Entry {
            name: &source_file.name,
            size: metadata.len(),
        });

        writer.start_entry_with_options(
            &source_file.name,
            EntryOptions::from_metadata(&metadata),
        )?;

        // Read failures belong to the source file, write failures to the archive
        let mut input = SourceReader::new(input);
        writer
            .write_from_reader(&mut input)
            .map_err(|e| match input.error.take() {
                Some(source) => io_err()(source),
                None => e,
            })
    }
}

/// Keeps the last read error so it can be reported against the source file
struct SourceReader<R> {
    inner: R,
    error: Option<io::Error>,
}

impl<R> SourceReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, error: None }
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Err(e) if e.kind() != io::ErrorKind::Interrupted => {
                let kind = e.kind();
                self.error = Some(e);
                Err(kind.into())
            }
            other => other,
        }
    }
}

/// Archive `source_root` into a fresh ZIP at `output_path`
pub fn archive_directory(
    source_root: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
) -> Result<ArchiveSummary> {
    Archiver::new(ArchiveOptions::new(
        source_root.as_ref(),
        output_path.as_ref(),
    ))
    .run()
}

/// Resolve the output path and clear out any previous archive there
fn prepare_destination(output: &Path) -> Result<PathBuf> {
    let destination = std::path::absolute(output).map_err(DirZipError::io_at(output))?;

    let parent = destination
        .parent()
        .ok_or_else(|| DirZipError::InvalidPath(destination.clone()))?;
    if !parent.is_dir() {
        return Err(DirZipError::OutputParentMissing(parent.to_path_buf()));
    }

    match fs::symlink_metadata(&destination) {
        Ok(meta) if meta.is_dir() => {
            return Err(DirZipError::OutputIsDirectory(destination));
        }
        Ok(_) => {
            info!(path = %destination.display(), "removing existing archive");
            fs::remove_file(&destination).map_err(DirZipError::io_at(&destination))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(DirZipError::io_at(&destination)(e)),
    }

    Ok(destination)
}

/// The destination with its parent directory resolved through symlinks
fn canonical_destination(destination: &Path) -> Result<PathBuf> {
    match (destination.parent(), destination.file_name()) {
        (Some(parent), Some(name)) => Ok(fs::canonicalize(parent)
            .map_err(DirZipError::io_at(parent))?
            .join(name)),
        _ => Err(DirZipError::InvalidPath(destination.to_path_buf())),
    }
}

/// Deletes the output file on drop unless the archive was completed
struct PartialOutput {
    path: PathBuf,
    completed: bool,
}

impl PartialOutput {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            completed: false,
        }
    }

    fn keep(&mut self) {
        self.completed = true;
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!(path = %self.path.display(), "removing incomplete archive");
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove incomplete archive"
            );
        }
    }
}
