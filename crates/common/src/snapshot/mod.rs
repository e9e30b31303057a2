//! Directory snapshots.
//!
//! A [`Snap`] is the flat, path-sorted listing of every file and directory under a sync
//! root, stamped with the id of the peer that took it. Snapshots are what peers publish to
//! the replicated store; receivers compare them against their own tree with
//! [`Snap::difference`].

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::paths;
use crate::peer::PeerId;

mod diff;

pub use diff::{diff, Diff};

/// Metadata of one entry under the sync root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Root-relative path with `/` separators
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snap {
    pub origin: PeerId,
    pub metas: Vec<Meta>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to read metadata of {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
    #[error("failed to decode snapshot: {0}")]
    Decode(String),
}

/// Take a snapshot of `root` on behalf of `origin`.
///
/// The root itself, symlinks, ignored names and everything below an ignored
/// directory are left out. This walks the tree synchronously.
pub fn snapshot(origin: PeerId, root: &Path) -> Result<Snap, SnapshotError> {
    Ok(Snap {
        origin,
        metas: local_metas(root)?,
    })
}

/// Listing of `root` sorted by path
pub fn local_metas(root: &Path) -> Result<Vec<Meta>, SnapshotError> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !paths::is_ignored_name(entry.file_name()));

    let mut metas = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| SnapshotError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }
        let Some(path) = paths::relative_path(root, entry.path()) else {
            continue;
        };

        let metadata = entry.metadata().map_err(|source| SnapshotError::Walk {
            path: entry.path().to_path_buf(),
            source,
        })?;
        let mod_time = metadata.modified().map_err(|source| SnapshotError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;

        metas.push(Meta {
            path,
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            mod_time,
            is_dir: file_type.is_dir(),
        });
    }

    metas.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(metas)
}

impl Snap {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// Diff the local tree at `root` (base) against this snapshot (target)
    pub fn difference(&self, root: &Path) -> Result<Diff, SnapshotError> {
        let local = local_metas(root)?;
        Ok(diff(&local, &self.metas))
    }

    /// Files only, directories left out
    pub fn files(&self) -> impl Iterator<Item = &Meta> {
        self.metas.iter().filter(|meta| !meta.is_dir)
    }
}
