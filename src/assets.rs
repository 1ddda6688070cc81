//! Locating node sources and shader libraries.
//!
//! Graph definitions reference files by asset path (`Common/MatDefs/...`).
//! An [`AssetLoader`] turns such a path into source text.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShaderError};

pub trait AssetLoader: Send + Sync {
    fn load_text(&self, path: &str) -> Result<String>;
}

/// Resolves asset paths against a list of root directories, first hit wins.
#[derive(Debug, Clone, Default)]
pub struct FsAssetLoader {
    roots: Vec<PathBuf>,
}

impl FsAssetLoader {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Filesystem location of an asset path.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        for root in &self.roots {
            let candidate = root.join(relative);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(ShaderError::resolve(path, "file not found in any asset root"))
    }
}

impl AssetLoader for FsAssetLoader {
    fn load_text(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        log::debug!("loading {path} from {}", resolved.display());
        fs::read_to_string(&resolved).map_err(|e| ShaderError::resolve(path, e))
    }
}

/// Assets held in memory, keyed by asset path.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetLoader {
    files: HashMap<String, String>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, source: &str) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: &str, source: &str) {
        self.files.insert(path.to_string(), source.to_string());
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load_text(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ShaderError::resolve(path, "no such asset"))
    }
}
