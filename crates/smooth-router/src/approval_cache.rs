//! Local record of routers known to be approved.
//!
//! The cache only ever learns "granted". A negative observation is never
//! stored, and nothing in the transfer flow removes an entry: [`ApprovalCache::clear`]
//! is the operator-level uncache path.

use dashmap::DashMap;

use crate::address::TronAddress;
use crate::constants::{APPROVAL_GRANTED, APPROVAL_KEY_PREFIX};
use crate::SmoothError;

/// Namespaced key for the (owner, router) pair.
pub fn approval_key(owner: TronAddress, router: TronAddress) -> String {
    format!("{APPROVAL_KEY_PREFIX}:{owner}:{router}")
}

/// Trait for approval cache backends.
///
/// Implementations must be thread-safe (`Send + Sync`) and `mark_granted`
/// must be idempotent.
pub trait ApprovalCache: Send + Sync {
    /// True when `key` has been recorded as granted.
    fn is_granted(&self, key: &str) -> bool;

    /// Record `key` as granted.
    fn mark_granted(&self, key: &str) -> Result<(), SmoothError>;

    /// Drop every entry. Returns the number removed.
    fn clear(&self) -> Result<usize, SmoothError>;
}

/// Session-scoped cache backed by DashMap. Lost on restart.
pub struct InMemoryApprovalCache {
    entries: DashMap<String, &'static str>,
}

impl InMemoryApprovalCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryApprovalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalCache for InMemoryApprovalCache {
    fn is_granted(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|v| *v == APPROVAL_GRANTED)
            .unwrap_or(false)
    }

    fn mark_granted(&self, key: &str) -> Result<(), SmoothError> {
        self.entries.insert(key.to_string(), APPROVAL_GRANTED);
        Ok(())
    }

    fn clear(&self) -> Result<usize, SmoothError> {
        let before = self.entries.len();
        self.entries.clear();
        Ok(before)
    }
}

#[cfg(feature = "full")]
pub use sqlite::SqliteApprovalCache;

#[cfg(feature = "full")]
mod sqlite {
    use std::sync::{Mutex, MutexGuard};

    use super::ApprovalCache;
    use crate::constants::APPROVAL_GRANTED;
    use crate::SmoothError;

    /// Persistent cache backed by SQLite. Survives restarts.
    pub struct SqliteApprovalCache {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteApprovalCache {
        /// Open (or create) the cache database at `path`.
        ///
        /// On Unix the file is restricted to 0600 (owner read/write only).
        pub fn open(path: &str) -> Result<Self, SmoothError> {
            let conn = rusqlite::Connection::open(path)
                .map_err(|e| SmoothError::Cache(format!("open {path}: {e}")))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS approval_cache (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                PRAGMA journal_mode=WAL;",
            )
            .map_err(|e| SmoothError::Cache(format!("init {path}: {e}")))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set approval cache file permissions to 0600"
                    );
                }
            }

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("approval cache mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }
    }

    fn unix_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    impl ApprovalCache for SqliteApprovalCache {
        fn is_granted(&self, key: &str) -> bool {
            // A read error is a cache miss: the gate re-verifies on chain.
            let value: Option<String> = self
                .conn()
                .query_row(
                    "SELECT value FROM approval_cache WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .ok();
            value.as_deref() == Some(APPROVAL_GRANTED)
        }

        fn mark_granted(&self, key: &str) -> Result<(), SmoothError> {
            self.conn()
                .execute(
                    "INSERT OR REPLACE INTO approval_cache (key, value, recorded_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, APPROVAL_GRANTED, unix_now()],
                )
                .map(|_| ())
                .map_err(|e| SmoothError::Cache(format!("record approval: {e}")))
        }

        fn clear(&self) -> Result<usize, SmoothError> {
            self.conn()
                .execute("DELETE FROM approval_cache", [])
                .map_err(|e| SmoothError::Cache(format!("clear: {e}")))
        }
    }
}
