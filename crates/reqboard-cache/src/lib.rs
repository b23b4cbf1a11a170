// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use reqboard_app::CacheEntry;
use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const APP_NAME: &str = "reqboard";
pub const CACHE_FILE_NAME: &str = "request-board.json";
pub const LOG_FILE_NAME: &str = "reqboard.log";
pub const CACHE_PATH_ENV: &str = "REQBOARD_CACHE_PATH";

/// `<cache dir>/reqboard/`, created on demand.
pub fn app_cache_dir() -> Result<PathBuf> {
    let cache_root = dirs::cache_dir().ok_or_else(|| {
        anyhow!("cannot resolve cache directory; set {CACHE_PATH_ENV} or XDG_CACHE_HOME")
    })?;
    let dir = cache_root.join(APP_NAME);
    fs::create_dir_all(&dir)
        .with_context(|| format!("create cache directory {}", dir.display()))?;
    Ok(dir)
}

pub fn default_cache_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(CACHE_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    Ok(app_cache_dir()?.join(CACHE_FILE_NAME))
}

pub fn default_log_path() -> Result<PathBuf> {
    Ok(app_cache_dir()?.join(LOG_FILE_NAME))
}

/// The single persisted snapshot. Writes replace the whole record; the last
/// writer wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(default_cache_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CacheEntry>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("read cache file {}", self.path.display()));
            }
        };
        let entry = serde_json::from_str(&raw)
            .with_context(|| format!("parse cache file {}", self.path.display()))?;
        Ok(Some(entry))
    }

    /// Like [`CacheStore::load`], but an unreadable or corrupt record counts
    /// as no record at all.
    pub fn read_or_none(&self) -> Option<CacheEntry> {
        match self.load() {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %format!("{error:#}"),
                    "ignoring unreadable cache"
                );
                None
            }
        }
    }

    pub fn store(&self, entry: &CacheEntry) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("create cache directory {}", dir.display()))?;

        let encoded = serde_json::to_vec(entry).context("encode cache entry")?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("stage cache file in {}", dir.display()))?;
        staged
            .write_all(&encoded)
            .context("write staged cache file")?;
        staged.as_file().sync_all().context("flush staged cache file")?;
        staged
            .persist(&self.path)
            .map_err(|error| error.error)
            .with_context(|| format!("replace cache file {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            rows = entry.rows.len(),
            "cache written"
        );
        Ok(())
    }

    /// Returns whether a record existed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => {
                Err(error).with_context(|| format!("remove cache file {}", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CACHE_FILE_NAME, CACHE_PATH_ENV, default_cache_path};
    use anyhow::Result;
    use std::env;
    use std::path::PathBuf;

    #[test]
    fn default_cache_path_honors_env_override_and_fixed_name() -> Result<()> {
        let previous = env::var_os(CACHE_PATH_ENV);

        // SAFETY: this is the only test in the crate that touches the
        // variable, and it restores the previous value before returning.
        unsafe {
            env::set_var(CACHE_PATH_ENV, "/tmp/reqboard-override.json");
        }
        let overridden = default_cache_path()?;

        // SAFETY: see above.
        unsafe {
            env::remove_var(CACHE_PATH_ENV);
        }
        let resolved = default_cache_path();

        // SAFETY: see above.
        unsafe {
            match previous {
                Some(value) => env::set_var(CACHE_PATH_ENV, value),
                None => env::remove_var(CACHE_PATH_ENV),
            }
        }

        assert_eq!(overridden, PathBuf::from("/tmp/reqboard-override.json"));
        if let Ok(path) = resolved {
            assert!(path.ends_with(format!("reqboard/{CACHE_FILE_NAME}")));
        }
        Ok(())
    }
}
