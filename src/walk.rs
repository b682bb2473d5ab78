//! Recursive enumeration of the files under a source directory

use crate::error::{DirZipError, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// A regular file found under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated; used as the entry name
    pub name: String,
}

/// The directory tree being archived
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    /// Resolve `root` to an absolute path and check that it is a directory
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let root = match fs::canonicalize(root) {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DirZipError::SourceNotFound(root.to_path_buf()))
            }
            Err(e) => return Err(DirZipError::io_at(root)(e)),
        };

        if !root.is_dir() {
            return Err(DirZipError::SourceNotDirectory(root));
        }

        Ok(Self { root })
    }

    /// Absolute, canonical root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iterate over every regular file under the root.
    ///
    /// Traversal is top-down: the files of a directory come first, in the
    /// order the filesystem lists them, then each subdirectory is walked in
    /// turn. Symlinks to files are included; symlinks to directories are not
    /// followed.
    pub fn files(&self) -> Files<'_> {
        Files {
            root: &self.root,
            pending_dirs: vec![self.root.clone()],
            ready: VecDeque::new(),
        }
    }
}

/// Lazy iterator returned by [`SourceTree::files`]
pub struct Files<'a> {
    root: &'a Path,
    pending_dirs: Vec<PathBuf>,
    ready: VecDeque<SourceFile>,
}

impl Files<'_> {
    /// Read one directory, queueing its files and scheduling its subdirectories
    fn read_dir(&mut self, dir: &Path) -> Result<()> {
        debug!(dir = %dir.display(), "reading directory");

        let mut subdirs = Vec::new();
        for entry in fs::read_dir(dir).map_err(DirZipError::io_at(dir))? {
            let entry = entry.map_err(DirZipError::io_at(dir))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(DirZipError::io_at(&path))?;

            if file_type.is_dir() {
                subdirs.push(path);
                continue;
            }

            let is_file = if file_type.is_symlink() {
                let target = fs::metadata(&path).map_err(DirZipError::io_at(&path))?;
                if target.is_dir() {
                    debug!(path = %path.display(), "not following directory symlink");
                }
                target.is_file()
            } else {
                file_type.is_file()
            };

            if !is_file {
                debug!(path = %path.display(), "skipping non-regular file");
                continue;
            }

            let name = relative_name(self.root, &path)?;
            self.ready.push_back(SourceFile { path, name });
        }

        // Reversed so the first subdirectory is popped first
        self.pending_dirs.extend(subdirs.into_iter().rev());
        Ok(())
    }
}

impl Iterator for Files<'_> {
    type Item = Result<SourceFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.ready.pop_front() {
                return Some(Ok(file));
            }
            let dir = self.pending_dirs.pop()?;
            if let Err(e) = self.read_dir(&dir) {
                self.pending_dirs.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Entry name for `path`: its path relative to `root`, joined with `/`
pub fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| DirZipError::InvalidPath(path.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| DirZipError::InvalidPath(path.to_path_buf()))?,
            ),
            Component::CurDir => {}
            _ => return Err(DirZipError::InvalidPath(path.to_path_buf())),
        }
    }

    if parts.is_empty() {
        return Err(DirZipError::InvalidPath(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}
