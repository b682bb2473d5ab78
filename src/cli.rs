use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::archiver::ArchiveOptions;
use crate::error::{DirZipError, Result};
use crate::layout::{ReleaseLayout, DEFAULT_RELEASE_DIR};

#[derive(Parser, Debug)]
#[command(name = "dirzip")]
#[command(version)]
#[command(
    about = "Recursively archive a directory into a deflate-compressed ZIP file",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
  dirzip build/out                  write build/out.zip\n  \
  dirzip build/out -o dist/app.zip  write dist/app.zip\n  \
  dirzip --platform lf-windows      zip release/lf-windows to release/lf-windows-portable.zip")]
pub struct Cli {
    /// Directory to archive
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Output archive (default: <SOURCE>.zip next to the source directory)
    #[arg(short = 'o', long, value_name = "ZIP")]
    pub output: Option<PathBuf>,

    /// Archive <RELEASE_DIR>/<PLATFORM> into <RELEASE_DIR>/<PLATFORM>-portable.zip
    #[arg(long, env = "DIRZIP_PLATFORM", value_name = "PLATFORM")]
    pub platform: Option<String>,

    /// Directory holding the per-platform release folders
    #[arg(
        long,
        env = "DIRZIP_RELEASE_DIR",
        value_name = "DIR",
        default_value = DEFAULT_RELEASE_DIR
    )]
    pub release_dir: PathBuf,

    /// Do not print a line per archived file
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Diagnostic log level (written to stderr)
    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
}

impl Cli {
    /// Source and destination for this invocation.
    ///
    /// An explicit SOURCE wins over `--platform`; `None` when neither is given.
    /// Fails when SOURCE has no name to derive the archive from and `-o` is missing.
    pub fn archive_options(&self) -> Result<Option<ArchiveOptions>> {
        if let Some(source) = &self.source {
            let output = match &self.output {
                Some(output) => output.clone(),
                None => default_output(source)?,
            };
            return Ok(Some(ArchiveOptions::new(source.clone(), output)));
        }

        let Some(platform) = &self.platform else {
            return Ok(None);
        };
        let mut options =
            ReleaseLayout::new(&self.release_dir, platform.clone()).archive_options();
        if let Some(output) = &self.output {
            options.output = output.clone();
        }
        Ok(Some(options))
    }
}

/// `<source>.zip` beside the source directory
///
/// `.` and `..` are resolved first so they name the directory they point at.
fn default_output(source: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(source)
        .or_else(|_| std::path::absolute(source))
        .unwrap_or_else(|_| source.to_path_buf());
    match resolved.file_name() {
        Some(name) => Ok(resolved.with_file_name(format!("{}.zip", name.to_string_lossy()))),
        None => Err(DirZipError::NoDefaultOutput(resolved)),
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Silent => None,
        }
    }
}
