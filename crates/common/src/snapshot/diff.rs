use std::collections::HashMap;

use super::Meta;

/// Differences between a base listing and a target listing, each bucket sorted by path.
///
/// Adds and modifies carry the target's metadata, deletes carry the base's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub adds: Vec<Meta>,
    pub deletes: Vec<Meta>,
    pub modifies: Vec<Meta>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.deletes.is_empty() && self.modifies.is_empty()
    }

    /// Non-directory paths that have to be fetched to converge on the target
    pub fn fetches(&self) -> impl Iterator<Item = &Meta> {
        self.adds
            .iter()
            .chain(self.modifies.iter())
            .filter(|meta| !meta.is_dir)
    }

    /// Non-directory paths that have to be removed to converge on the target
    pub fn removals(&self) -> impl Iterator<Item = &Meta> {
        self.deletes.iter().filter(|meta| !meta.is_dir)
    }
}

/// Compare two listings keyed by path.
///
/// An entry present on both sides is modified when its size or modification time
/// differs. Duplicate paths within one listing collapse to the last occurrence.
pub fn diff(base: &[Meta], target: &[Meta]) -> Diff {
    let base_by_path: HashMap<&str, &Meta> =
        base.iter().map(|meta| (meta.path.as_str(), meta)).collect();
    let target_by_path: HashMap<&str, &Meta> =
        target.iter().map(|meta| (meta.path.as_str(), meta)).collect();

    let mut result = Diff::default();
    for (path, base_meta) in &base_by_path {
        match target_by_path.get(path) {
            None => result.deletes.push((*base_meta).clone()),
            Some(target_meta)
                if base_meta.size != target_meta.size
                    || base_meta.mod_time != target_meta.mod_time =>
            {
                result.modifies.push((*target_meta).clone())
            }
            Some(_) => {}
        }
    }
    for (path, target_meta) in &target_by_path {
        if !base_by_path.contains_key(path) {
            result.adds.push((*target_meta).clone());
        }
    }

    result.adds.sort_by(|a, b| a.path.cmp(&b.path));
    result.deletes.sort_by(|a, b| a.path.cmp(&b.path));
    result.modifies.sort_by(|a, b| a.path.cmp(&b.path));
    result
}
