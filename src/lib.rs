//! # dirzip: archive a directory tree into a ZIP file
//!
//! `dirzip` walks a directory recursively and writes every regular file into a
//! fresh DEFLATE-compressed ZIP archive, keyed by its path relative to the
//! directory. Files are streamed one at a time, so memory use is bounded by a
//! fixed buffer and not by the size of the tree.
//!
//! ## Features
//!
//! - **Portable entry names**: root-relative paths with `/` separators on every OS
//! - **Replace, never merge**: any file already at the output path is removed first
//! - **No half-written archives**: a failed run deletes its partial output
//! - **Streaming**: on-the-fly compression with ZIP64 support for large trees
//! - **Progress events**: one notification per file for CLI or UI reporting
//!
//! ## Quick Start
//!
//! ### Archiving a directory
//!
//! ```no_run
//! let summary =
//!     dirzip::archive_directory("release/lf-windows", "release/lf-windows-portable.zip")?;
//! println!("{} files, {} bytes", summary.entries, summary.total_bytes);
//! # Ok::<(), dirzip::DirZipError>(())
//! ```
//!
//! ### Reporting progress
//!
//! ```no_run
//! use dirzip::{ArchiveOptions, Archiver, Progress};
//!
//! Archiver::new(ArchiveOptions::new("site", "site.zip"))
//!     .on_progress(|event| {
//!         if let Progress::Entry { name, .. } = event {
//!             println!("Zipping: {}", name);
//!         }
//!     })
//!     .run()?;
//! # Ok::<(), dirzip::DirZipError>(())
//! ```
//!
//! ### Reading an archive back
//!
//! ```no_run
//! use dirzip::StreamingZipReader;
//!
//! let mut reader = StreamingZipReader::open("site.zip")?;
//! for entry in reader.entries() {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//! let index = reader.read_entry_by_name("index.html")?;
//! # Ok::<(), dirzip::DirZipError>(())
//! ```

pub mod archiver;
pub mod cli;
pub mod error;
pub mod layout;
pub mod reader;
pub mod walk;
pub mod writer;

pub use archiver::{archive_directory, ArchiveOptions, ArchiveSummary, Archiver, Progress};
pub use cli::{Cli, LogLevel};
pub use error::{DirZipError, Result};
pub use layout::ReleaseLayout;
pub use reader::{StreamingZipReader, ZipEntry};
pub use walk::{SourceFile, SourceTree};
pub use writer::{DosDateTime, EntryOptions, StreamingZipWriter};
