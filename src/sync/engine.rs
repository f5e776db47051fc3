//! Background sync supervisor: full-sync/delta-sync cycles, cursor
//! persistence, and error-count backoff (Component E, §4.3).

use crate::cache::schema::meta_keys;
use crate::cache::store::{read_meta, write_meta};
use crate::cache::CacheHandle;
use crate::client::BackendClient;
use crate::error::{Error, Result};
use crate::sync::reconcile::{apply_remote, mark_tombstone, RemoteNote};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const FULL_SYNC_PAGE_SIZE: u32 = 100;
const DELTA_SYNC_PAGE_SIZE: u32 = 500;
const MAX_CONSECUTIVE_ERRORS: u32 = 5;
const BACKOFF_BASE_SECS: u64 = 60;
const BACKOFF_CAP_SECS: u64 = 3600;

/// Outcome of one sync cycle, used by the supervisor to decide the next
/// due-time and to persist metadata.
pub struct CycleOutcome {
    pub entries_applied: u64,
}

/// A single background sync task. `full_resync_required` starts `true` so
/// the first cycle after any cache reset always walks the full index.
pub struct SyncEngine {
    client: Arc<BackendClient>,
    cache: CacheHandle,
    bucket: String,
    sync_interval: Duration,
    full_resync_required: AtomicBool,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        client: Arc<BackendClient>,
        cache: CacheHandle,
        bucket: String,
        sync_interval: Duration,
        full_resync_required: bool,
    ) -> Self {
        Self {
            client,
            cache,
            bucket,
            sync_interval,
            full_resync_required: AtomicBool::new(full_resync_required),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn request_full_resync(&self) {
        self.full_resync_required.store(true, Ordering::SeqCst);
    }

    /// Spawn the supervisor loop. Runs until cancelled or until
    /// [`MAX_CONSECUTIVE_ERRORS`] consecutive cycles fail.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.supervise().await })
    }

    /// Run exactly one cycle immediately; used by `--once` (§4.11).
    pub async fn run_once(&self) -> Result<CycleOutcome> {
        self.run_tracked_cycle().await
    }

    async fn supervise(self: Arc<Self>) {
        let mut consecutive_errors: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let outcome = self.run_tracked_cycle().await;
            match outcome {
                Ok(_) => {
                    consecutive_errors = 0;
                }
                Err(err) => {
                    consecutive_errors += 1;
                    tracing::error!(error = %err, consecutive_errors, "sync cycle failed");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        self.set_status("stopped (max errors)").await;
                        tracing::error!("sync engine stopping after max consecutive errors");
                        self.cancel.cancel();
                        return;
                    }
                }
            }

            let wait = if consecutive_errors == 0 {
                self.sync_interval
            } else {
                backoff_duration(consecutive_errors)
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    async fn run_tracked_cycle(&self) -> Result<CycleOutcome> {
        let started = Instant::now();
        self.write_meta_now(meta_keys::LAST_SYNC_ATTEMPT_AT).await?;

        let result = self.run_cycle().await;

        let duration_ms = started.elapsed().as_millis() as i64;
        self.write_meta_value(meta_keys::LAST_SYNC_DURATION_MS, duration_ms.to_string())
            .await?;

        match &result {
            Ok(_) => {
                self.write_meta_now(meta_keys::LAST_SUCCESSFUL_SYNC_AT).await?;
                self.set_status("ok").await;
            }
            Err(err) => {
                self.set_status(&format!("error: {err}")).await;
            }
        }
        result
    }

    /// One full-sync or delta-sync pass, per §4.3.
    async fn run_cycle(&self) -> Result<CycleOutcome> {
        let cursor = if self.full_resync_required.swap(false, Ordering::SeqCst) {
            None
        } else {
            self.read_cursor().await?
        };

        match cursor {
            None => self.full_sync().await,
            Some(cursor) => self.delta_sync(&cursor).await,
        }
    }

    async fn full_sync(&self) -> Result<CycleOutcome> {
        let mut applied = 0u64;
        let mut mark: Option<String> = None;
        loop {
            let page = self
                .client
                .index(&self.bucket, None, mark.as_deref(), FULL_SYNC_PAGE_SIZE, false)
                .await?;
            if page.index.is_empty() {
                break;
            }
            for entry in &page.index {
                applied += self.apply_entry_fetching_if_needed(entry).await?;
            }
            if let Some(cursor) = &page.current {
                // `current` lives in the same opaque cursor space regardless of
                // whether it was reached via `mark` or `since` (§9), so it also
                // seeds the delta-sync watermark a subsequent cycle will resume
                // from if the walk is interrupted here.
                self.persist_cursor(cursor).await?;
                mark = Some(cursor.clone());
            } else {
                break;
            }
        }
        Ok(CycleOutcome { entries_applied: applied })
    }

    async fn delta_sync(&self, cursor: &str) -> Result<CycleOutcome> {
        let page = self
            .client
            .index(&self.bucket, Some(cursor), None, DELTA_SYNC_PAGE_SIZE, true)
            .await?;
        let mut applied = 0u64;
        for entry in &page.index {
            applied += self.apply_entry_fetching_if_needed(entry).await?;
        }
        if let Some(new_cursor) = &page.current {
            self.persist_cursor(new_cursor).await?;
        }
        Ok(CycleOutcome { entries_applied: applied })
    }

    async fn apply_entry_fetching_if_needed(
        &self,
        entry: &crate::client::IndexEntry,
    ) -> Result<u64> {
        let data = match &entry.data {
            Some(inline) => inline.clone(),
            None => match self.client.fetch(&self.bucket, &entry.id, entry.version).await {
                Ok(data) => data,
                Err(Error::NotFound(_)) => {
                    let id = entry.id.clone();
                    self.cache
                        .run(move |conn| mark_tombstone(conn, &id).map_err(Error::from))
                        .await?;
                    return Ok(1);
                }
                Err(other) => return Err(other),
            },
        };

        let remote = RemoteNote {
            id: entry.id.clone(),
            server_version: entry.version,
            data,
        };
        let now = now_epoch_secs();
        self.cache
            .run(move |conn| apply_remote(conn, &remote, now).map_err(Error::from))
            .await?;
        Ok(1)
    }

    async fn read_cursor(&self) -> Result<Option<String>> {
        self.cache
            .run(|conn| read_meta(conn, meta_keys::BACKEND_CURSOR).map_err(Error::from))
            .await
    }

    async fn persist_cursor(&self, cursor: &str) -> Result<()> {
        self.write_meta_value(meta_keys::BACKEND_CURSOR, cursor.to_string()).await
    }

    async fn set_status(&self, status: &str) {
        let _ = self.write_meta_value(meta_keys::LAST_SYNC_STATUS, status.to_string()).await;
    }

    async fn write_meta_now(&self, key: &'static str) -> Result<()> {
        self.write_meta_value(key, now_epoch_secs().to_string()).await
    }

    async fn write_meta_value(&self, key: &'static str, value: String) -> Result<()> {
        self.cache
            .run(move |conn| write_meta(conn, key, &value).map_err(Error::from))
            .await
    }
}

fn backoff_duration(consecutive_errors: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS.saturating_mul(1u64 << consecutive_errors.min(10));
    Duration::from_secs(secs.min(BACKOFF_CAP_SECS))
}

fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_duration(1), Duration::from_secs(120));
        assert_eq!(backoff_duration(2), Duration::from_secs(240));
        assert_eq!(backoff_duration(20), Duration::from_secs(BACKOFF_CAP_SECS));
    }
}
