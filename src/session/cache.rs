//! On-disk cache mapping operator-supplied cookies to refreshed ones.
//!
//! When the supplied cookies expire and a login issues new ones, the pair is
//! recorded here so the next run started with the same (stale) arguments
//! picks up the refreshed cookies without logging in again. Runs started with
//! credentials only share one entry keyed by the absence of cookies.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::CookiePair;
use crate::error::StoreError;

/// Default cache file name, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = ".uidconf";

/// One cache record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    /// Cookies issued by the most recent login.
    pub current: CookiePair,
    /// Cookies the operator supplied on the run that triggered that login.
    pub supplied: Option<CookiePair>,
    pub saved_at: DateTime<Utc>,
}

/// Cookie cache file.
#[derive(Debug, Clone)]
pub struct CookieCache {
    path: PathBuf,
}

impl CookieCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache; a missing or corrupt file reads as empty.
    pub async fn load(&self) -> Option<CacheEntry> {
        let raw = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(path = %self.path.display(), "Cookie cache corrupted, ignoring it: {e}");
                None
            }
        }
    }

    /// Refreshed cookies for `supplied`, if a previous login started from the
    /// same cookies. A run without cookies matches a login-only run.
    pub async fn substitute(&self, supplied: Option<&CookiePair>) -> Option<CookiePair> {
        let entry = self.load().await?;
        let matches = match (entry.supplied.as_ref(), supplied) {
            (Some(recorded), Some(supplied)) => recorded.same_values(supplied),
            (None, None) => true,
            _ => false,
        };
        if matches {
            debug!("Substituting cached cookies");
            Some(entry.current)
        } else {
            None
        }
    }

    /// Record the cookies issued by a fresh login.
    pub async fn store(
        &self,
        current: CookiePair,
        supplied: Option<CookiePair>,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            current,
            supplied,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| StoreError::io(&self.path, std::io::Error::other(e)))?;
        fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }
}
