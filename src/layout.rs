//! Release folder naming convention
//!
//! Portable builds live in `<release_dir>/<platform>` and are shipped as
//! `<release_dir>/<platform>-portable.zip`.

use crate::archiver::ArchiveOptions;
use std::path::PathBuf;

/// Default directory holding per-platform release folders
pub const DEFAULT_RELEASE_DIR: &str = "release";

/// Suffix appended to the platform name for the archive file
const PORTABLE_SUFFIX: &str = "-portable.zip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    pub release_dir: PathBuf,
    pub platform: String,
}

impl ReleaseLayout {
    pub fn new(release_dir: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            release_dir: release_dir.into(),
            platform: platform.into(),
        }
    }

    /// Layout rooted at [`DEFAULT_RELEASE_DIR`]
    pub fn for_platform(platform: impl Into<String>) -> Self {
        Self::new(DEFAULT_RELEASE_DIR, platform)
    }

    /// `<release_dir>/<platform>`
    pub fn source(&self) -> PathBuf {
        self.release_dir.join(&self.platform)
    }

    /// `<release_dir>/<platform>-portable.zip`
    pub fn destination(&self) -> PathBuf {
        self.release_dir
            .join(format!("{}{}", self.platform, PORTABLE_SUFFIX))
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::new(self.source(), self.destination())
    }
}
