//! Per-destination advisory lock (§5) so a second migration invocation
//! against the same destination blocks or fails fast rather than racing
//! the first.

use sqlx::{PgConnection, Row};

use crate::error::{EngineError, EngineResult};

/// Fixed tag combined with the destination database name to derive the
/// advisory lock key; arbitrary but stable so every process hashes it the
/// same way.
const LOCK_TAG: i64 = 0x_43415745_42_4d4947; // "CAWEBMIG" squeezed into 56 bits

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryLockMode {
    /// Block until the lock is available.
    Block,
    /// Return `Conflict` immediately if the lock is held elsewhere.
    TryLock,
}

fn lock_key(destination_db: &str) -> i64 {
    let mut hash: i64 = LOCK_TAG;
    for byte in destination_db.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(byte as i64);
    }
    hash
}

/// Acquire the per-destination advisory lock on `conn`. Holding the
/// connection for the lifetime of the migration holds the lock; Postgres
/// releases it automatically when the session ends or `unlock` is called.
pub async fn acquire(
    conn: &mut PgConnection,
    destination_db: &str,
    mode: AdvisoryLockMode,
) -> EngineResult<()> {
    let key = lock_key(destination_db);
    match mode {
        AdvisoryLockMode::Block => {
            sqlx::query("SELECT pg_advisory_lock($1)")
                .bind(key)
                .execute(conn)
                .await
                .map_err(|e| EngineError::db("pg_advisory_lock", e))?;
            Ok(())
        }
        AdvisoryLockMode::TryLock => {
            let row = sqlx::query("SELECT pg_try_advisory_lock($1) AS acquired")
                .bind(key)
                .fetch_one(conn)
                .await
                .map_err(|e| EngineError::db("pg_try_advisory_lock", e))?;
            if row.get::<bool, _>("acquired") {
                Ok(())
            } else {
                Err(EngineError::Conflict(format!(
                    "a migration is already in progress against `{destination_db}`"
                )))
            }
        }
    }
}

pub async fn release(conn: &mut PgConnection, destination_db: &str) -> EngineResult<()> {
    let key = lock_key(destination_db);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(key)
        .execute(conn)
        .await
        .map_err(|e| EngineError::db("pg_advisory_unlock", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic_and_name_sensitive() {
        assert_eq!(lock_key("caweb_prod"), lock_key("caweb_prod"));
        assert_ne!(lock_key("caweb_prod"), lock_key("caweb_dev"));
    }
}
