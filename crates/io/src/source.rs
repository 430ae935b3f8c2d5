//! Resolution of configured source paths.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{DocumentError, Result};

/// What a configured path turned out to be on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePath {
    File(PathBuf),
    /// A directory and its regular files, sorted by name.
    Folder { dir: PathBuf, files: Vec<PathBuf> },
}

impl SourcePath {
    /// A directory yields its listing, a file itself. A path that does not
    /// exist is created as a directory when `create_if_absent`, otherwise it
    /// is an error.
    pub fn resolve(path: &Path, create_if_absent: bool) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Folder {
                dir: path.to_path_buf(),
                files: list_folder(path)?,
            });
        }
        if path.is_file() {
            return Ok(Self::File(path.to_path_buf()));
        }
        if create_if_absent {
            std::fs::create_dir_all(path).map_err(|source| DocumentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "created directory");
            return Ok(Self::Folder {
                dir: path.to_path_buf(),
                files: Vec::new(),
            });
        }
        Err(DocumentError::NotFound(path.to_path_buf()))
    }

    /// Files to load: the file itself, or every file in the folder.
    pub fn files(&self) -> Vec<&Path> {
        match self {
            Self::File(p) => vec![p.as_path()],
            Self::Folder { files, .. } => files.iter().map(PathBuf::as_path).collect(),
        }
    }

    /// The directory outputs are written to.
    pub fn dir(&self) -> &Path {
        match self {
            Self::File(p) => p.parent().unwrap_or(Path::new(".")),
            Self::Folder { dir, .. } => dir,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder { .. })
    }
}

/// Regular, non-hidden files directly under `dir`, sorted.
pub fn list_folder(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |source| DocumentError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
