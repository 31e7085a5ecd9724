//! Process-scoped cache for `#include` targets.
//!
//! The cache is the only state shared across analysis runs. Entries are
//! keyed by absolute path and validated against the file's modification
//! time on every use; a stale or missing entry triggers a synchronous
//! re-read. The backend owns one instance and passes it by reference into
//! the analysis entry point, with explicit invalidation on document close.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct CachedInclude {
    mtime: Option<SystemTime>,
    text: Arc<str>,
}

#[derive(Debug, Default)]
pub struct IncludeCache {
    entries: Mutex<HashMap<PathBuf, CachedInclude>>,
}

impl IncludeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `path`, reusing the cached content while the file's mtime is
    /// unchanged.
    pub fn read(&self, path: &Path) -> io::Result<Arc<str>> {
        let mtime = fs::metadata(path)?.modified().ok();

        let mut entries = self.entries.lock().expect("include cache poisoned");
        if let Some(entry) = entries.get(path) {
            if entry.mtime.is_some() && entry.mtime == mtime {
                return Ok(entry.text.clone());
            }
        }

        let text: Arc<str> = fs::read_to_string(path)?.into();
        entries.insert(
            path.to_path_buf(),
            CachedInclude {
                mtime,
                text: text.clone(),
            },
        );
        Ok(text)
    }

    /// Drop the entry for `path`, forcing the next use to re-read.
    pub fn invalidate(&self, path: &Path) {
        let mut entries = self.entries.lock().expect("include cache poisoned");
        entries.remove(path);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().expect("include cache poisoned").len()
    }
}
