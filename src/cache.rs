//! Time-boxed cache of the processed tables for an interactive session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::table::Tables;

struct Snapshot {
    loaded_at: Instant,
    tables: Arc<Tables>,
}

/// Holds one immutable snapshot of the tables and reloads it once it is older
/// than the TTL.
pub struct TableCache {
    processed_dir: PathBuf,
    ttl: Duration,
    snapshot: Option<Snapshot>,
}

impl TableCache {
    pub fn new(processed_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            processed_dir: processed_dir.into(),
            ttl,
            snapshot: None,
        }
    }

    pub fn get_or_reload(&mut self) -> Result<Arc<Tables>> {
        self.get_or_reload_at(Instant::now())
    }

    /// Same as [`TableCache::get_or_reload`] with an explicit clock reading.
    ///
    /// A failed reload returns the error and keeps the previous snapshot, so the
    /// next call tries again.
    pub fn get_or_reload_at(&mut self, now: Instant) -> Result<Arc<Tables>> {
        if let Some(snapshot) = &self.snapshot {
            let age = now.saturating_duration_since(snapshot.loaded_at);
            if age < self.ttl {
                debug!(age_secs = age.as_secs(), "Serving cached tables");
                return Ok(Arc::clone(&snapshot.tables));
            }
            info!(age_secs = age.as_secs(), "Cached tables are stale, reloading");
        }

        let tables = Arc::new(Tables::load(&self.processed_dir).inspect_err(|e| {
            warn!(error = %e, "Reloading tables failed");
        })?);
        self.snapshot = Some(Snapshot {
            loaded_at: now,
            tables: Arc::clone(&tables),
        });
        Ok(tables)
    }

    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    pub fn loaded_at(&self) -> Option<Instant> {
        self.snapshot.as_ref().map(|s| s.loaded_at)
    }
}
