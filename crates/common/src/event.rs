//! The event model.
//!
//! An [`Event`] is one operation against a single root-relative path. Events travel over the
//! wire (see [`crate::wire`]) and are applied against the local sync root. Every method that
//! touches the filesystem resolves its path with [`resolve`] first, so an event can never
//! reach outside of the root or into one of the names in [`crate::paths::IGNORE_NAMES`].

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;

use crate::paths;

/// Operation carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Write,
    Read,
    Remove,
}

impl Op {
    /// Numeric code used on the wire
    pub fn code(self) -> u8 {
        match self {
            Op::Write => 0,
            Op::Read => 1,
            Op::Remove => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Op::Write),
            1 => Some(Op::Read),
            2 => Some(Op::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Write => write!(f, "WRITE"),
            Op::Read => write!(f, "READ"),
            Op::Remove => write!(f, "REMOVE"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid path {0:?}")]
    InvalidPath(String),
    #[error("path {0:?} is excluded from sync")]
    Ignored(String),
    #[error("path {0:?} passes through a symbolic link")]
    Symlink(String),
    #[error("{op} {path}: data is not empty")]
    DataNotEmpty { op: Op, path: String },
    #[error("{op} {path}: operation cannot be applied to the local tree")]
    NotApplicable { op: Op, path: String },
    #[error("{op} {path}: {source}")]
    Io {
        op: Op,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EventError {
    /// True if the underlying filesystem error is a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, EventError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub op: Op,
    /// Root-relative path with `/` separators
    pub path: String,
    pub data: Bytes,
    pub time: Option<SystemTime>,
}

impl Event {
    /// A request for the contents of `path`, data left empty
    pub fn read_request(path: impl Into<String>) -> Self {
        Self {
            op: Op::Read,
            path: path.into(),
            data: Bytes::new(),
            time: None,
        }
    }

    pub fn write(path: impl Into<String>, data: impl Into<Bytes>, time: Option<SystemTime>) -> Self {
        Self {
            op: Op::Write,
            path: path.into(),
            data: data.into(),
            time,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: Op::Remove,
            path: path.into(),
            data: Bytes::new(),
            time: None,
        }
    }

    fn io_error(&self, source: std::io::Error) -> EventError {
        EventError::Io {
            op: self.op,
            path: self.path.clone(),
            source,
        }
    }

    /// Populate `data` and `time` from the file at `root/path`.
    ///
    /// Refuses to overwrite data that is already present.
    pub async fn load(&mut self, root: &Path) -> Result<(), EventError> {
        if !self.data.is_empty() {
            return Err(EventError::DataNotEmpty {
                op: self.op,
                path: self.path.clone(),
            });
        }
        let full = resolve(root, &self.path)?;

        let data = tokio::fs::read(&full).await.map_err(|e| self.io_error(e))?;
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| self.io_error(e))?;
        let modified = metadata.modified().map_err(|e| self.io_error(e))?;

        self.data = Bytes::from(data);
        self.time = Some(modified);
        Ok(())
    }

    /// Write `data` to `root/path`, creating parent directories, then set the
    /// modification time to `time` when present.
    pub async fn write_to(&self, root: &Path) -> Result<(), EventError> {
        let full = resolve(root, &self.path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&full, &self.data)
            .await
            .map_err(|e| self.io_error(e))?;

        if let Some(time) = self.time {
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&full)
                .await
                .map_err(|e| self.io_error(e))?;
            let file = file.into_std().await;
            tokio::task::spawn_blocking(move || file.set_modified(time))
                .await
                .map_err(|e| self.io_error(std::io::Error::other(e)))?
                .map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }

    pub async fn remove_from(&self, root: &Path) -> Result<(), EventError> {
        let full = resolve(root, &self.path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| self.io_error(e))
    }

    /// Apply a Write or Remove against the local tree
    pub async fn apply(&self, root: &Path) -> Result<(), EventError> {
        match self.op {
            Op::Write => self.write_to(root).await,
            Op::Remove => self.remove_from(root).await,
            Op::Read => Err(EventError::NotApplicable {
                op: self.op,
                path: self.path.clone(),
            }),
        }
    }
}

/// Join a root-relative path onto `root`.
///
/// Rejects empty and absolute paths, parent traversal and any segment that is an
/// ignored name. Every existing entry below `root` along the way must be a real file or
/// directory, so a symbolic link inside the tree can never redirect an event outside of it.
pub fn resolve(root: &Path, rel: &str) -> Result<PathBuf, EventError> {
    let mut full = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(rel).components() {
        match component {
            Component::Normal(part) => {
                if paths::is_ignored_name(part) {
                    return Err(EventError::Ignored(rel.to_string()));
                }
                full.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(EventError::InvalidPath(rel.to_string()));
            }
        }
    }
    if depth == 0 {
        return Err(EventError::InvalidPath(rel.to_string()));
    }
    reject_symlinks(root, &full, rel)?;
    Ok(full)
}

fn reject_symlinks(root: &Path, full: &Path, rel: &str) -> Result<(), EventError> {
    let mut current = root.to_path_buf();
    let Ok(below) = full.strip_prefix(root) else {
        return Err(EventError::InvalidPath(rel.to_string()));
    };
    for part in below.components() {
        current.push(part);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(EventError::Symlink(rel.to_string()));
            }
            Ok(_) => {}
            // nothing further down exists yet
            Err(_) => break,
        }
    }
    Ok(())
}
