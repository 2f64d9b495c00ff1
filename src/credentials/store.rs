use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD as BASE64_NO_PAD;
use rand::RngCore;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::credentials::line::{CredentialLine, parse_lines};
use crate::db::connection::{connect_with_retry, connection_url};
use crate::error::{EngineError, EngineResult};

/// Callback invoked with the freshly generated credential lines; it must
/// update the DBMS (in a transaction it begins or joins) to match them.
pub type ChangeCallback<Fut> = Box<dyn FnOnce(Vec<CredentialLine>) -> Fut + Send>;

/// Renames the pending credential file over the live one; the orchestrator
/// calls this only after the outer transaction has committed.
pub type Finalizer = Box<dyn FnOnce() -> EngineResult<()> + Send>;

/// A directory holding a live `pass` file and a pending `pass.new` file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn live_path(&self) -> PathBuf {
        self.dir.join("pass")
    }

    pub fn pending_path(&self) -> PathBuf {
        self.dir.join("pass.new")
    }

    fn read_file(&self, path: &Path) -> EngineResult<Vec<CredentialLine>> {
        match fs::read_to_string(path) {
            Ok(contents) => parse_lines(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    fn find_in(&self, path: &Path, host: &str, port: u16, db: &str, role: &str) -> EngineResult<Option<CredentialLine>> {
        let prefix = format!("{host}:{port}:{db}:{role}");
        Ok(self
            .read_file(path)?
            .into_iter()
            .find(|line| line.prefix() == prefix))
    }

    /// Acquire a pool for `role`, following the live-then-pending fallback
    /// algorithm of 4.C: try the live file first; on failure, fall back to
    /// the pending file and, if that succeeds, atomically promote it.
    pub async fn acquire_connection(
        &self,
        host: &str,
        port: u16,
        db: &str,
        role: &str,
    ) -> EngineResult<PgPool> {
        if let Some(line) = self.find_in(&self.live_path(), host, port, db, role)? {
            if let Ok(pool) = connect_with_retry(&connection_url(&line)).await {
                return Ok(pool);
            }
        }

        if let Some(line) = self.find_in(&self.pending_path(), host, port, db, role)? {
            match connect_with_retry(&connection_url(&line)).await {
                Ok(pool) => {
                    self.promote_pending()?;
                    info!(role, "connected via pending credentials, promoted to live");
                    return Ok(pool);
                }
                Err(e) => return Err(e),
            }
        }

        Err(EngineError::NotFound(format!(
            "no credential line matches {host}:{port}:{db}:{role} in live or pending files"
        )))
    }

    /// Resolve the credential line itself (rather than a pool) via the same
    /// live-then-pending fallback as [`Self::acquire_connection`]. Used by
    /// callers that need the literal password, e.g. to embed in FDW
    /// `CREATE USER MAPPING` options.
    pub async fn resolve_line(
        &self,
        host: &str,
        port: u16,
        db: &str,
        role: &str,
    ) -> EngineResult<CredentialLine> {
        if let Some(line) = self.find_in(&self.live_path(), host, port, db, role)? {
            if connect_with_retry(&connection_url(&line)).await.is_ok() {
                return Ok(line);
            }
        }

        if let Some(line) = self.find_in(&self.pending_path(), host, port, db, role)? {
            if connect_with_retry(&connection_url(&line)).await.is_ok() {
                self.promote_pending()?;
                info!(role, "resolved via pending credentials, promoted to live");
                return Ok(line);
            }
        }

        Err(EngineError::NotFound(format!(
            "no credential line matches {host}:{port}:{db}:{role} in live or pending files"
        )))
    }

    fn write_pending(&self, lines: &[CredentialLine]) -> EngineResult<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = lines
            .iter()
            .map(CredentialLine::to_line)
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        let path = self.pending_path();
        fs::write(&path, contents)?;
        set_owner_only(&path)?;
        Ok(())
    }

    /// Atomically rename the pending file over the live one.
    pub fn promote_pending(&self) -> EngineResult<()> {
        fs::rename(self.pending_path(), self.live_path())?;
        Ok(())
    }

    /// Rotate credentials for a set of `(host, port, db, role)` targets.
    ///
    /// 1. Generates fresh 128-bit random passwords.
    /// 2. Writes the pending file with mode 0600.
    /// 3. Invokes `change` with the new lines so the caller can apply them
    ///    to the DBMS inside its own transaction.
    /// 4. Returns a [`Finalizer`] the orchestrator must call after its
    ///    transaction commits; the finalizer promotes pending over live.
    pub async fn rotate_passwords<F, Fut>(
        &self,
        targets: &[(String, u16, String, String)],
        change: F,
    ) -> EngineResult<Finalizer>
    where
        F: FnOnce(Vec<CredentialLine>) -> Fut,
        Fut: Future<Output = EngineResult<()>>,
    {
        if targets.is_empty() {
            return Err(EngineError::InvalidInput(
                "rotate_passwords requires at least one target".to_string(),
            ));
        }

        let lines: Vec<CredentialLine> = targets
            .iter()
            .map(|(host, port, db, role)| {
                CredentialLine::new(host.clone(), *port, db.clone(), role.clone(), generate_password())
            })
            .collect();

        self.write_pending(&lines)?;

        if let Err(e) = change(lines).await {
            warn!(error = %e, "credential change callback failed, pending file left in place");
            return Err(e);
        }

        let dir = self.dir.clone();
        Ok(Box::new(move || {
            let store = CredentialStore::new(dir);
            store.promote_pending()
        }))
    }
}

/// 128 bits of randomness, base64-encoded without padding.
fn generate_password() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_NO_PAD.encode(bytes)
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> EngineResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> EngineResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_in_reads_matching_prefix_only() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        fs::write(
            store.live_path(),
            "host:5432:db:normal:secret1\nhost:5432:db:admin:secret2\n",
        )
        .unwrap();

        let found = store
            .find_in(&store.live_path(), "host", 5432, "db", "normal")
            .unwrap();
        assert_eq!(found.unwrap().password, "secret1");
    }

    #[test]
    fn missing_file_yields_no_match_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        let found = store
            .find_in(&store.live_path(), "host", 5432, "db", "normal")
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn generate_password_produces_unpadded_base64_of_16_bytes() {
        let pw = generate_password();
        assert!(!pw.contains('='));
        let decoded = BASE64_NO_PAD.decode(&pw).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[tokio::test]
    async fn rotate_passwords_writes_pending_and_calls_change_before_returning_finalizer() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        let targets = vec![(
            "host".to_string(),
            5432,
            "db".to_string(),
            "normal".to_string(),
        )];

        let called = std::sync::Arc::new(std::sync::Mutex::new(false));
        let called_clone = called.clone();

        let finalizer = store
            .rotate_passwords(&targets, move |lines| {
                let called = called_clone.clone();
                async move {
                    assert_eq!(lines.len(), 1);
                    *called.lock().unwrap() = true;
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert!(*called.lock().unwrap());
        assert!(store.pending_path().exists());
        assert!(!store.live_path().exists());

        finalizer().unwrap();
        assert!(store.live_path().exists());
        assert!(!store.pending_path().exists());
    }

    #[tokio::test]
    async fn rotate_passwords_leaves_pending_file_when_change_fails() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path());
        let targets = vec![(
            "host".to_string(),
            5432,
            "db".to_string(),
            "normal".to_string(),
        )];

        let result = store
            .rotate_passwords(&targets, |_lines| async {
                Err(EngineError::InvalidInput("boom".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(store.pending_path().exists());
    }
}
