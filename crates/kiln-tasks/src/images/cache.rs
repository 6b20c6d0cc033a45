//! Freshness checks for encoded images.
//!
//! In hash mode a manifest maps each output (relative to the images output
//! directory) to the blake3 hash of the source it was encoded from. An
//! output is fresh when it exists and the recorded hash matches. Mtime mode
//! compares modification times and never touches the manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kiln_core::fsutil::{is_up_to_date, write_atomic};
use kiln_core::{CacheMode, TaskError};

pub const MANIFEST_FILE: &str = "image-cache.json";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    entries: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct FreshnessCache {
    path: PathBuf,
    mode: CacheMode,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl FreshnessCache {
    /// Load the manifest at `path`. A missing or unreadable manifest starts empty.
    pub fn load(path: PathBuf, mode: CacheMode) -> Self {
        let entries = match mode {
            CacheMode::Mtime => BTreeMap::new(),
            CacheMode::Hash => read_manifest(&path),
        };
        Self {
            path,
            mode,
            entries,
            dirty: false,
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Whether `dest` can be kept as is.
    ///
    /// `key` identifies `dest` in the manifest; `source_hash` is required in
    /// hash mode and ignored otherwise.
    pub fn is_fresh(&self, source: &Path, dest: &Path, key: &str, source_hash: Option<&str>) -> bool {
        match self.mode {
            CacheMode::Mtime => is_up_to_date(source, dest),
            CacheMode::Hash => {
                dest.exists()
                    && source_hash.is_some()
                    && self.entries.get(key).map(String::as_str) == source_hash
            }
        }
    }

    pub fn record(&mut self, key: String, source_hash: String) {
        if self.mode == CacheMode::Hash {
            if self.entries.get(&key) != Some(&source_hash) {
                self.dirty = true;
            }
            self.entries.insert(key, source_hash);
        }
    }

    /// Drop entries whose outputs no longer exist.
    pub fn retain_existing(&mut self, dest_dir: &Path) {
        let before = self.entries.len();
        self.entries.retain(|key, _| dest_dir.join(key).exists());
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    pub fn save(&mut self) -> Result<(), TaskError> {
        if !self.dirty {
            return Ok(());
        }
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| TaskError::encode(&self.path, e))?;
        write_atomic(&self.path, json)?;
        self.dirty = false;
        Ok(())
    }
}

fn read_manifest(path: &Path) -> BTreeMap<String, String> {
    let Ok(content) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    match serde_json::from_str::<Manifest>(&content) {
        Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest.entries,
        Ok(_) => BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt image cache");
            BTreeMap::new()
        }
    }
}
