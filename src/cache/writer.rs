//! Single-writer cache access: one task owns the connection, everyone else
//! talks to it over a channel (§5 ambient addition).

use crate::cache::store::{self, OpenOutcome};
use crate::config::Config;
use crate::error::{Error, Result};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce(&Connection) -> Result<BoxedAny> + Send>;
type BoxedAny = Box<dyn std::any::Any + Send>;

/// A command posted to the writer task: run `job` against the connection and
/// send its result back over `respond_to`.
struct CacheCommand {
    job: Job,
    respond_to: oneshot::Sender<Result<BoxedAny>>,
}

/// Cloneable, `Arc`-backed handle to the single cache-owning task. Both
/// reads and writes go through [`CacheHandle::run`]; there is exactly one
/// writer regardless of how many handles exist.
#[derive(Clone)]
pub struct CacheHandle {
    sender: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    /// Opens the cache (creating/resetting per §4.2) and spawns the writer
    /// task. Returns the handle plus whether a reset occurred on open.
    pub fn spawn(config: &Config, owner_hash: &str) -> Result<(Self, OpenOutcome)> {
        Self::spawn_at(&config.cache_file_path(owner_hash), owner_hash, config)
    }

    /// Same as [`Self::spawn`] but against an explicit cache file path,
    /// bypassing `Config::cache_file_path` (used by `--db-path`, §4.11).
    pub fn spawn_at(path: &std::path::Path, owner_hash: &str, config: &Config) -> Result<(Self, OpenOutcome)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Db(format!("failed to create cache dir: {e}")))?;
        }
        let (conn, outcome) = store::open_or_create(
            path,
            owner_hash,
            config.db_encryption_key.as_deref(),
            config.db_encryption_kdf_iterations,
        )?;

        let (tx, mut rx) = mpsc::channel::<CacheCommand>(64);
        std::thread::Builder::new()
            .name("cache-writer".to_string())
            .spawn(move || {
                while let Some(cmd) = rx.blocking_recv() {
                    let result = (cmd.job)(&conn);
                    let _ = cmd.respond_to.send(result);
                }
            })
            .map_err(|e| Error::internal(format!("failed to spawn cache writer thread: {e}")))?;

        Ok((Self { sender: tx }, outcome))
    }

    /// Run `f` against the owning connection and return its result. Used for
    /// both reads and writes; ordering across callers is FIFO.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (respond_to, response) = oneshot::channel();
        let job: Job = Box::new(move |conn| f(conn).map(|v| Box::new(v) as BoxedAny));
        self.sender
            .send(CacheCommand { job, respond_to })
            .await
            .map_err(|_| Error::internal("cache writer task is gone"))?;

        let boxed = response
            .await
            .map_err(|_| Error::internal("cache writer dropped the response channel"))??;
        Ok(*boxed
            .downcast::<T>()
            .expect("CacheHandle::run result type mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            username: "alice".into(),
            password: "secret".into(),
            db_encryption_key: None,
            db_encryption_kdf_iterations: 310_000,
            sync_interval: std::time::Duration::from_secs(300),
            api_timeout: std::time::Duration::from_secs(30),
            log_level: tracing::Level::INFO,
            log_file_path: None,
            cache_dir: dir.to_path_buf(),
            auth_base_url: "https://example.test".into(),
            data_base_url: "https://example.test/1".into(),
            app_id: "notecache".into(),
            app_key: "key".into(),
        }
    }

    #[tokio::test]
    async fn writer_serializes_access_through_one_connection() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let owner = store::owner_identity_hash(&config.username);
        let (handle, outcome) = CacheHandle::spawn(&config, &owner).unwrap();
        assert!(!outcome.full_resync_required());

        handle
            .run(|conn| {
                conn.execute(
                    "INSERT INTO notes(id, local_version, text, modified_at, created_at) VALUES ('a', 1, 'hi', 1, 1)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let count: i64 = handle
            .run(|conn| Ok(conn.query_row("SELECT count(*) FROM notes", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
