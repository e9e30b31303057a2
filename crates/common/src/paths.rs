//! Names that never cross the sync boundary, and root-relative path helpers.

use std::ffi::OsStr;
use std::path::{Component, Path};

/// Version control directory
pub const VCS_DIR: &str = ".git";
/// Node state directory (config, logs, key) inside the sync root
pub const DATASTORE_DIR: &str = ".peerdrive";
/// Private key file of the node
pub const PRIVATE_KEY_NAME: &str = ".pkey";

pub const IGNORE_NAMES: [&str; 3] = [VCS_DIR, DATASTORE_DIR, PRIVATE_KEY_NAME];

pub fn is_ignored_name(name: &OsStr) -> bool {
    IGNORE_NAMES.iter().any(|ignored| name == OsStr::new(ignored))
}

/// True if any segment of a root-relative path is an ignored name
pub fn is_ignored(rel: &str) -> bool {
    rel.split('/').any(|segment| IGNORE_NAMES.contains(&segment))
}

/// True if any segment of a root-relative path starts with a dot
pub fn is_hidden(rel: &str) -> bool {
    rel.split('/').any(|segment| segment.starts_with('.'))
}

/// Express `path` relative to `root` with `/` separators.
///
/// Returns `None` for the root itself and for paths outside of it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
