//! Error types for dirzip

use std::io;
use std::path::PathBuf;

/// Result type for dirzip operations
pub type Result<T> = std::result::Result<T, DirZipError>;

/// Error types that can occur while walking a tree or reading/writing an archive
#[derive(Debug)]
pub enum DirZipError {
    /// I/O error
    Io(io::Error),
    /// I/O error tied to a specific file or directory
    IoAt { path: PathBuf, source: io::Error },
    /// Invalid ZIP format or structure
    InvalidFormat(String),
    /// Entry not found in ZIP archive
    EntryNotFound(String),
    /// Unsupported compression method
    UnsupportedCompression(u16),
    /// The directory to archive does not exist
    SourceNotFound(PathBuf),
    /// The path to archive exists but is not a directory
    SourceNotDirectory(PathBuf),
    /// The directory that should hold the archive does not exist
    OutputParentMissing(PathBuf),
    /// The output path names an existing directory
    OutputIsDirectory(PathBuf),
    /// A path cannot be expressed as a ZIP entry name
    InvalidPath(PathBuf),
    /// No archive name can be derived from the source (e.g. `/`)
    NoDefaultOutput(PathBuf),
}

impl DirZipError {
    /// Attach the path an I/O error happened on
    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| DirZipError::IoAt { path, source }
    }
}

impl std::fmt::Display for DirZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirZipError::Io(e) => write!(f, "I/O error: {}", e),
            DirZipError::IoAt { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            DirZipError::InvalidFormat(msg) => write!(f, "Invalid ZIP format: {}", msg),
            DirZipError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            DirZipError::UnsupportedCompression(method) => {
                write!(f, "Unsupported compression method: {}", method)
            }
            DirZipError::SourceNotFound(path) => {
                write!(f, "Source directory not found: {}", path.display())
            }
            DirZipError::SourceNotDirectory(path) => {
                write!(f, "Source is not a directory: {}", path.display())
            }
            DirZipError::OutputParentMissing(path) => {
                write!(f, "Output directory does not exist: {}", path.display())
            }
            DirZipError::OutputIsDirectory(path) => {
                write!(f, "Output path is a directory: {}", path.display())
            }
            DirZipError::InvalidPath(path) => {
                write!(f, "Path is not valid UTF-8: {}", path.display())
            }
            DirZipError::NoDefaultOutput(path) => write!(
                f,
                "Cannot name an archive after {}; pass --output",
                path.display()
            ),
        }
    }
}

impl std::error::Error for DirZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DirZipError::Io(e) => Some(e),
            DirZipError::IoAt { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for DirZipError {
    fn from(err: io::Error) -> Self {
        DirZipError::Io(err)
    }
}
