//! 4.I Settings adapter: erases the per-major config type so the
//! orchestrator can hold one `Settings` value across the whole migration,
//! dispatching to whichever of [`ConfigV1`]/[`ConfigV2`] it wraps.
//!
//! The config major (`versions.config.major`, selecting `V1` vs `V2`) and
//! the schema major (`versions.database.major`, selecting `SchemaMigrator`'s
//! `Mig1`/`Mig2` arm) are independent axes — a migration may cross one
//! without crossing the other. Every method below is explicit about which
//! axis it reads.

use std::future::Future;

use sqlx::{PgPool, Postgres, Transaction};

use crate::config::{BoundsViolation, ConfigStepMigrator, ConfigV1, ConfigV2, ConfigVersion};
use crate::credentials::{CredentialLine, CredentialStore, Finalizer};
use crate::error::{EngineError, EngineResult};
use crate::role::{Role, RoleSuffix};
use crate::schema_migration::{SchemaMigrator, Settler};
use crate::version::SemanticVersion;

#[derive(Debug, Clone)]
pub enum Settings {
    V1(ConfigV1),
    V2(ConfigV2),
}

impl Settings {
    pub fn load(config_major: u16, bytes: &[u8]) -> EngineResult<Self> {
        match config_major {
            1 => Ok(Settings::V1(ConfigV1::load(bytes)?)),
            2 => Ok(Settings::V2(ConfigV2::load(bytes)?)),
            other => Err(EngineError::Unsupported(format!(
                "unsupported config major {other}"
            ))),
        }
    }

    /// Detect the config major from the `versions.config` field of `bytes`
    /// without committing to a concrete type first.
    pub fn load_autodetect(bytes: &[u8]) -> EngineResult<Self> {
        #[derive(serde::Deserialize)]
        struct Peek {
            versions: PeekVersions,
        }
        #[derive(serde::Deserialize)]
        struct PeekVersions {
            config: SemanticVersion,
        }
        let text = crate::config::comments::validate_utf8(bytes)?;
        let peek: Peek = serde_yaml::from_str(text)
            .map_err(|e| EngineError::InvalidInput(format!("invalid config yaml: {e}")))?;
        Self::load(peek.versions.config.major, bytes)
    }

    pub fn config_major(&self) -> u16 {
        match self {
            Settings::V1(_) => 1,
            Settings::V2(_) => 2,
        }
    }

    pub fn config_version(&self) -> SemanticVersion {
        match self {
            Settings::V1(c) => c.versions().config,
            Settings::V2(c) => c.versions().config,
        }
    }

    pub fn schema_version(&self) -> SemanticVersion {
        match self {
            Settings::V1(c) => c.versions().database,
            Settings::V2(c) => c.versions().database,
        }
    }

    pub fn set_schema_version(&mut self, version: SemanticVersion) {
        match self {
            Settings::V1(c) => c.versions_mut().database = version,
            Settings::V2(c) => c.versions_mut().database = version,
        }
    }

    pub fn validate_and_normalize(&mut self) -> Vec<BoundsViolation> {
        match self {
            Settings::V1(c) => c.validate_and_normalize(),
            Settings::V2(c) => c.validate_and_normalize(),
        }
    }

    /// Fold `other`'s bounds into `self`; both sides must wrap the same
    /// config major (`merge_from` never crosses majors — that is
    /// `ConfigStepMigrator`'s job).
    pub fn merge_from(&mut self, other: &Settings) -> EngineResult<()> {
        match (self, other) {
            (Settings::V1(s), Settings::V1(o)) => {
                s.merge_from(o);
                Ok(())
            }
            (Settings::V2(s), Settings::V2(o)) => {
                s.merge_from(o);
                Ok(())
            }
            (s, o) => Err(EngineError::VersionMismatch(format!(
                "cannot merge config major {} from major {}",
                s.config_major(),
                o.config_major()
            ))),
        }
    }

    /// Translate `self` across exactly one config-major boundary toward
    /// `target_major`, via [`ConfigStepMigrator`]. `target_config_version`
    /// is stamped on the result's `versions.config`. The caller still owes
    /// a `merge_from` call against the translated result to fill in the
    /// target major's own bounds (§4.H/I) — this only moves the value
    /// across the boundary, it never merges.
    pub fn step_toward(
        &self,
        target_major: u16,
        target_config_version: SemanticVersion,
    ) -> EngineResult<Settings> {
        match (self, target_major) {
            (Settings::V1(c), 1) => Ok(Settings::V1(c.clone())),
            (Settings::V2(c), 2) => Ok(Settings::V2(c.clone())),
            (Settings::V1(c), 2) => Ok(Settings::V2(ConfigStepMigrator::up(c, target_config_version))),
            (Settings::V2(c), 1) => Ok(Settings::V1(ConfigStepMigrator::down(c, target_config_version))),
            (s, other) => Err(EngineError::Unsupported(format!(
                "no config step from major {} to major {other}",
                s.config_major()
            ))),
        }
    }

    pub fn mutate(&mut self, serialized_mutable: &[u8]) -> EngineResult<()> {
        match self {
            Settings::V1(c) => c.mutate(serialized_mutable),
            Settings::V2(c) => c.mutate(serialized_mutable),
        }
    }

    pub fn serializable(&self) -> EngineResult<Vec<u8>> {
        match self {
            Settings::V1(c) => c.serializable(),
            Settings::V2(c) => c.serializable(),
        }
    }

    pub fn bounds_document(&self) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        match self {
            Settings::V1(c) => c.bounds_document(),
            Settings::V2(c) => c.bounds_document(),
        }
    }

    /// Full YAML re-serialization (versions, every section, preserved
    /// comments) — what the orchestrator writes to the target config path.
    pub fn serialize(&self) -> EngineResult<Vec<u8>> {
        match self {
            Settings::V1(c) => c.marshal_yaml(),
            Settings::V2(c) => c.marshal_yaml(),
        }
    }

    /// The config's own `database:` block — host, port, name, pass-dir,
    /// role suffix, auth method.
    pub fn database(&self) -> &crate::config::types::DatabaseSection {
        match self {
            Settings::V1(c) => &c.database,
            Settings::V2(c) => &c.database,
        }
    }

    /// Mutable access to the `database:` block, for CLI-level overrides
    /// (e.g. `--source-pass-dir`) applied after load but before any
    /// connection is opened.
    pub fn database_mut(&mut self) -> &mut crate::config::types::DatabaseSection {
        match self {
            Settings::V1(c) => &mut c.database,
            Settings::V2(c) => &mut c.database,
        }
    }

    pub fn role_suffix(&self) -> RoleSuffix {
        match &self.database().role_suffix {
            Some(s) => RoleSuffix::new(s.clone()),
            None => RoleSuffix::none(),
        }
    }

    /// Acquire a pooled connection for `role` against this config's
    /// database, via the live/pending credential fallback of 4.C.
    pub async fn database_connection_pool(&self, role: Role) -> EngineResult<PgPool> {
        let db = self.database();
        let role_name = role.qualified_name(&self.role_suffix());
        let store = CredentialStore::new(db.pass_dir.clone());
        store
            .acquire_connection(&db.host, db.port, &db.name, &role_name)
            .await
    }

    /// The schema-version migrator family member for this config's
    /// *schema* major (`versions.database.major`), bound to `tx`.
    pub fn schema_migrator<'a, 'c>(
        &self,
        tx: &'a mut Transaction<'c, Postgres>,
        source_url: impl Into<String>,
    ) -> EngineResult<SchemaMigrator<'a, 'c>> {
        let suffix = self.role_suffix();
        match self.schema_version().major {
            1 => Ok(SchemaMigrator::new_major1(tx, suffix, source_url)),
            2 => Ok(SchemaMigrator::new_major2(tx, suffix, source_url)),
            other => Err(EngineError::Unsupported(format!(
                "unsupported schema major {other}"
            ))),
        }
    }

    /// The settler for this config's schema major, bound to `tx` — used
    /// when the caller wants to persist settings without first walking a
    /// schema migrator chain (e.g. `init`).
    pub fn settings_persister<'a, 'c>(
        &self,
        tx: &'a mut Transaction<'c, Postgres>,
    ) -> EngineResult<Settler<'a, 'c>> {
        let suffix = self.role_suffix();
        match self.schema_version().major {
            1 => Ok(Settler::new(1, tx, suffix)),
            2 => Ok(Settler::new(2, tx, suffix)),
            other => Err(EngineError::Unsupported(format!(
                "unsupported schema major {other}"
            ))),
        }
    }

    /// Rotate the given roles' credentials for this config's database,
    /// applying the role suffix rule. Returns the finalizer the caller
    /// must invoke after its own transaction commits.
    pub async fn renew_passwords<F, Fut>(
        &self,
        roles: &[Role],
        change: F,
    ) -> EngineResult<Finalizer>
    where
        F: FnOnce(Vec<CredentialLine>) -> Fut,
        Fut: Future<Output = EngineResult<()>>,
    {
        let db = self.database();
        let suffix = self.role_suffix();
        if roles.is_empty() {
            return Err(EngineError::InvalidInput(
                "renew_passwords requires at least one role".to_string(),
            ));
        }
        let targets: Vec<(String, u16, String, String)> = roles
            .iter()
            .map(|role| {
                (
                    db.host.clone(),
                    db.port,
                    db.name.clone(),
                    role.qualified_name(&suffix),
                )
            })
            .collect();
        let store = CredentialStore::new(db.pass_dir.clone());
        store.rotate_passwords(&targets, change).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_SAMPLE: &str = "\
versions:
  config: 1.1.0
  database: 1.0.0
database:
  host: db.example
  port: 5432
  name: caweb
  pass-dir: /etc/caweb/pass
usecases:
  cars:
    old-parking-method-delay: 10h
";

    const V2_SAMPLE: &str = "\
versions:
  config: 2.1.0
  database: 2.0.0
database:
  host: db.example
  port: 5432
  name: caweb
  pass-dir: /etc/caweb/pass
usecases:
  cars:
    delay-of-old-parking-method: 10h
";

    #[test]
    fn load_autodetect_picks_the_matching_major() {
        let v1 = Settings::load_autodetect(V1_SAMPLE.as_bytes()).unwrap();
        assert_eq!(v1.config_major(), 1);
        let v2 = Settings::load_autodetect(V2_SAMPLE.as_bytes()).unwrap();
        assert_eq!(v2.config_major(), 2);
    }

    #[test]
    fn merge_from_rejects_mismatched_config_majors() {
        let mut v1 = Settings::load_autodetect(V1_SAMPLE.as_bytes()).unwrap();
        let v2 = Settings::load_autodetect(V2_SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            v1.merge_from(&v2),
            Err(EngineError::VersionMismatch(_))
        ));
    }

    #[test]
    fn step_toward_translates_across_a_config_major_boundary() {
        let v1 = Settings::load_autodetect(V1_SAMPLE.as_bytes()).unwrap();
        let target_version: SemanticVersion = "2.0.0".parse().unwrap();
        let stepped = v1.step_toward(2, target_version).unwrap();
        assert_eq!(stepped.config_major(), 2);
        assert_eq!(stepped.config_version(), target_version);

        let mut target = Settings::load_autodetect(V2_SAMPLE.as_bytes()).unwrap();
        target.merge_from(&stepped).unwrap();
    }

    #[test]
    fn step_toward_same_major_is_a_no_op_clone() {
        let v1 = Settings::load_autodetect(V1_SAMPLE.as_bytes()).unwrap();
        let stepped = v1.step_toward(1, v1.config_version()).unwrap();
        assert_eq!(stepped.config_major(), 1);
    }

    #[test]
    fn schema_version_and_config_version_are_independent_axes() {
        let settings = Settings::load_autodetect(V1_SAMPLE.as_bytes()).unwrap();
        assert_eq!(settings.config_version().major, 1);
        assert_eq!(settings.schema_version().major, 1);

        let mut settings = settings;
        settings.set_schema_version("2.0.0".parse().unwrap());
        assert_eq!(settings.config_version().major, 1);
        assert_eq!(settings.schema_version().major, 2);
    }
}
