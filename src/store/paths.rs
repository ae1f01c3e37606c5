//! AS path store: content-addresses opaque path encodings and hands out
//! stable path ids.
//!
//! "Core" paths are fully canonical interned paths; "non-core" paths are
//! synthesized variants (e.g. per-origin rewrites) stored under their own
//! ids. The same encoding may exist once as core and once as non-core.

use crate::error::BgpViewError;
use crate::models::AsPath;
use bytes::Bytes;
use std::collections::HashMap;

/// Stable id of a stored path. Equal `(encoding, is_core)` pairs map to the
/// same id for the lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathId {
    pub idx: u32,
    pub is_core: bool,
}

/// A stored path: the opaque encoding plus its store metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    idx: u32,
    is_core: bool,
    encoding: Bytes,
}

impl StorePath {
    pub fn path_id(&self) -> PathId {
        PathId {
            idx: self.idx,
            is_core: self.is_core,
        }
    }

    pub fn encoding(&self) -> &[u8] {
        &self.encoding
    }

    pub fn is_core(&self) -> bool {
        self.is_core
    }

    /// Decodes the stored encoding into an [AsPath].
    pub fn to_path(&self) -> Result<AsPath, BgpViewError> {
        AsPath::decode(&self.encoding)
    }
}

/// Content-addressing store for AS paths.
#[derive(Debug, Default)]
pub struct AsPathStore {
    paths: Vec<StorePath>,
    ids: HashMap<(Bytes, bool), u32>,
}

impl AsPathStore {
    pub fn new() -> Self {
        AsPathStore::default()
    }

    /// Inserts a path encoding and returns its id. Idempotent per
    /// `(encoding, is_core)`.
    pub fn insert(&mut self, encoding: &[u8], is_core: bool) -> Result<PathId, BgpViewError> {
        let key = (Bytes::copy_from_slice(encoding), is_core);
        if let Some(idx) = self.ids.get(&key) {
            return Ok(PathId {
                idx: *idx,
                is_core,
            });
        }

        let idx = u32::try_from(self.paths.len())
            .map_err(|_| BgpViewError::Capacity("path id space"))?;
        self.paths.push(StorePath {
            idx,
            is_core,
            encoding: key.0.clone(),
        });
        self.ids.insert(key, idx);
        Ok(PathId { idx, is_core })
    }

    /// Encodes and inserts an [AsPath].
    pub fn insert_path(&mut self, path: &AsPath, is_core: bool) -> Result<PathId, BgpViewError> {
        let encoding = path.encode()?;
        self.insert(&encoding, is_core)
    }

    /// Looks up a stored path by id.
    pub fn get(&self, id: PathId) -> Result<&StorePath, BgpViewError> {
        match self.paths.get(id.idx as usize) {
            Some(p) if p.is_core == id.is_core => Ok(p),
            _ => Err(BgpViewError::NotFound(format!(
                "path id {} (core: {})",
                id.idx, id.is_core
            ))),
        }
    }

    /// Iterates over all stored paths. Order is unspecified but stable
    /// between inserts.
    pub fn iter_paths(&self) -> impl Iterator<Item = &StorePath> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
