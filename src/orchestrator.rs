//! 4.J Migration orchestrator: the one place that wires every other
//! component together and owns the destination transaction end to end.
//!
//! Steps below are numbered to match the algorithm as designed; nothing
//! here runs outside the single destination transaction `tx` between
//! acquiring the advisory lock and committing, except the best-effort
//! post-commit cleanup in step 11.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use sqlx::{Connection, PgPool};
use tracing::{info, info_span, warn, Instrument};

use crate::config::BoundsViolation;
use crate::credentials::{CredentialLine, CredentialStore};
use crate::db::advisory_lock::{self, AdvisoryLockMode};
use crate::db::connection::{connect_with_retry, connection_url};
use crate::db::schema_repo::{ConnectionRepo, Namespace, TransactionRepo};
use crate::error::{EngineError, EngineResult};
use crate::role::Role;
use crate::schema_migration::sql;
use crate::settings::Settings;
use crate::snapshot::{ApplicationSnapshot, SnapshotHandle};

/// `(major, minor)` pairs a destination may carry a stale `fdwN_M` schema
/// under, swept at steps 5 and 11.
const KNOWN_FDW_NAMESPACES: &[(u16, u16)] = &[(1, 0), (1, 1), (2, 0)];
/// Schema majors this build knows how to create a `migN` namespace for.
const KNOWN_SCHEMA_MAJORS: &[u16] = &[1, 2];

/// Default `HostRewrite` hook: no rewrite. A caller embedding the engine in
/// a container-based dev setup may pass a hook that maps loopback to a
/// gateway hostname instead.
pub fn identity_host_rewrite(host: &str) -> String {
    host.to_string()
}

fn latest_minor_for(major: u16) -> EngineResult<u16> {
    match major {
        1 => Ok(sql::MIG1_LATEST_MINOR),
        2 => Ok(sql::MIG2_LATEST_MINOR),
        other => Err(EngineError::Unsupported(format!(
            "unsupported schema major {other}"
        ))),
    }
}

/// Inputs to one [`migrate`] call.
pub struct MigrationRequest {
    pub source_config_path: PathBuf,
    pub target_config_path: PathBuf,
    /// Overrides the source config's own `pass-dir`, if set.
    pub source_pass_dir: Option<PathBuf>,
    /// Overrides the target config's own `pass-dir`, if set.
    pub target_pass_dir: Option<PathBuf>,
    pub lock_mode: AdvisoryLockMode,
}

/// What actually happened, for the CLI to report.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub source_schema_major: u16,
    pub destination_schema_major: u16,
    pub violations: Vec<BoundsViolation>,
}

/// Run the full migration algorithm (4.J steps 1-11). `host_rewrite` is the
/// pluggable loopback-rewrite hook passed to the schema migrator's `load`.
pub async fn migrate(
    request: &MigrationRequest,
    host_rewrite: &dyn Fn(&str) -> String,
) -> EngineResult<(MigrationOutcome, SnapshotHandle)> {
    let mut violations = Vec::new();

    // Step 1: read both configs, apply pass-dir overrides, validate.
    let mut source_cfg = load_config(&request.source_config_path)?;
    let mut target_cfg = load_config(&request.target_config_path)?;

    if let Some(dir) = &request.source_pass_dir {
        source_cfg.database_mut().pass_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(dir) = &request.target_pass_dir {
        target_cfg.database_mut().pass_dir = dir.to_string_lossy().into_owned();
    }

    violations.extend(source_cfg.validate_and_normalize());
    violations.extend(target_cfg.validate_and_normalize());

    {
        let src = source_cfg.database();
        let dst = target_cfg.database();
        if src.host == dst.host && src.port == dst.port && src.name == dst.name {
            return Err(EngineError::Conflict(format!(
                "source and target both name {}:{}/{}",
                src.host, src.port, src.name
            )));
        }
    }

    let source_schema_major = source_cfg.schema_version().major;
    let source_schema_minor = source_cfg.schema_version().minor;
    let destination_schema_major = target_cfg.schema_version().major;

    // Step 2: ensure destination roles and schemas via an admin connection.
    let admin_pool = target_cfg.database_connection_pool(Role::Admin).await?;
    ConnectionRepo::new(&admin_pool)
        .install_fdw_extension_if_missing()
        .await?;
    {
        let mut bootstrap_tx = admin_pool
            .begin()
            .await
            .map_err(|e| EngineError::db("BEGIN (bootstrap)", e))?;
        let mut repo = TransactionRepo::new(&mut bootstrap_tx, target_cfg.role_suffix());
        repo.create_role_if_not_exists(Role::Normal).await?;
        repo.grant_fdw_usage(Role::Normal).await?;
        bootstrap_tx
            .commit()
            .await
            .map_err(|e| EngineError::db("COMMIT (bootstrap)", e))?;
    }

    // Step 3: rotate the destination's `normal` credentials. The new
    // password is captured out of the change callback rather than read
    // back through the credential store, so opening transaction T below
    // never triggers the store's own pending-promotes-on-success path —
    // promotion must wait for T's commit (step 10), not T's connection.
    let rotated_password: Arc<StdMutex<Option<String>>> = Arc::new(StdMutex::new(None));
    let finalizer = {
        let admin_pool = admin_pool.clone();
        let suffix = target_cfg.role_suffix();
        let auth_method = target_cfg.database().auth_method;
        let captured = rotated_password.clone();
        target_cfg
            .renew_passwords(&[Role::Normal], move |lines| {
                let admin_pool = admin_pool.clone();
                let suffix = suffix.clone();
                async move {
                    let line = lines.first().ok_or_else(|| {
                        EngineError::InvalidInput("no credential line to rotate".to_string())
                    })?;
                    *captured.lock().unwrap() = Some(line.password.clone());

                    let mut tx = admin_pool
                        .begin()
                        .await
                        .map_err(|e| EngineError::db("BEGIN (rotate)", e))?;
                    TransactionRepo::new(&mut tx, suffix)
                        .change_passwords(&[Role::Normal], &[line.password.clone()], auth_method)
                        .await?;
                    tx.commit()
                        .await
                        .map_err(|e| EngineError::db("COMMIT (rotate)", e))?;
                    Ok(())
                }
                .instrument(info_span!("rotate_credentials"))
            })
            .await?
    };

    let new_password = rotated_password
        .lock()
        .unwrap()
        .clone()
        .ok_or_else(|| EngineError::InvalidInput("credential rotation produced no password".into()))?;

    // Step 4: open destination transaction T on its own connection, after
    // acquiring the advisory lock on that same connection (pg_advisory_unlock
    // must run on the session that locked, so the transaction must borrow
    // rather than consume the connection).
    let dst = target_cfg.database().clone();
    let normal_role = Role::Normal.qualified_name(&target_cfg.role_suffix());
    let normal_line = CredentialLine::new(
        dst.host.clone(),
        dst.port,
        dst.name.clone(),
        normal_role,
        new_password,
    );
    let dest_pool: PgPool = connect_with_retry(&connection_url(&normal_line)).await?;

    let mut conn = dest_pool
        .acquire()
        .await
        .map_err(|e| EngineError::db("acquire destination connection", e))?;
    advisory_lock::acquire(&mut conn, &dst.name, request.lock_mode).await?;

    let result = run_migration_transaction(
        &mut conn,
        &source_cfg,
        &mut target_cfg,
        source_schema_major,
        source_schema_minor,
        destination_schema_major,
        host_rewrite,
        &mut violations,
    )
    .await;

    let outcome = match result {
        Ok(()) => {
            if let Err(e) = finalizer() {
                warn!(error = %e, "commit succeeded but credential finalizer failed; next connection falls back to pending and auto-promotes");
            }

            write_target_config_atomically(&request.target_config_path, &target_cfg)?;

            let snapshot = ApplicationSnapshot::from_settings(&target_cfg)?;
            let handle = SnapshotHandle::new(snapshot);

            Ok((
                MigrationOutcome {
                    source_schema_major,
                    destination_schema_major,
                    violations,
                },
                handle,
            ))
        }
        Err(e) => Err(e),
    };

    if let Err(e) = advisory_lock::release(&mut conn, &dst.name).await {
        warn!(error = %e, "failed to release advisory lock");
    }
    drop(conn);

    if outcome.is_ok() {
        // Step 11: best-effort cleanup of intermediate schemas, on a fresh
        // connection since T has already committed.
        if let Err(e) = cleanup_intermediate_schemas(&dest_pool, &target_cfg).await {
            warn!(error = %e, "best-effort cleanup of intermediate schemas failed");
        }
    }

    outcome
}

#[allow(clippy::too_many_arguments)]
async fn run_migration_transaction(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Postgres>,
    source_cfg: &Settings,
    target_cfg: &mut Settings,
    source_schema_major: u16,
    source_schema_minor: u16,
    destination_schema_major: u16,
    host_rewrite: &dyn Fn(&str) -> String,
    violations: &mut Vec<BoundsViolation>,
) -> EngineResult<()> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| EngineError::db("BEGIN (migration)", e))?;

    // Step 5: sweep any namespaces left behind by a previous failed
    // attempt, then create this migration's source-major `migN`.
    {
        let suffix = target_cfg.role_suffix();
        let mut repo = TransactionRepo::new(&mut tx, suffix);
        for &major in KNOWN_SCHEMA_MAJORS {
            repo.drop_if_exists(Namespace::Mig { major }).await?;
        }
        for &(major, minor) in KNOWN_FDW_NAMESPACES {
            repo.drop_if_exists(Namespace::Fdw { major, minor }).await?;
        }
        repo.create_schema(Namespace::Mig {
            major: source_schema_major,
        })
        .await?;
    }

    // Step 6: load the source as a foreign schema.
    let source_db = source_cfg.database();
    let source_suffix = source_cfg.role_suffix();
    let source_role = Role::Normal.qualified_name(&source_suffix);
    let source_store = CredentialStore::new(source_db.pass_dir.clone());
    let source_line = source_store
        .resolve_line(&source_db.host, source_db.port, &source_db.name, &source_role)
        .await?;
    let source_url = connection_url(&source_line);

    let mut migrator = source_cfg.schema_migrator(&mut tx, source_url)?;
    migrator
        .load(source_schema_minor, host_rewrite)
        .instrument(info_span!("load"))
        .await?;

    migrator
        .roll_to_latest_minor(source_schema_minor)
        .instrument(info_span!("roll_to_latest_minor"))
        .await?;

    // Step 7: settle directly at the same major, or step across majors
    // one at a time first.
    let mut settler = if destination_schema_major == source_schema_major {
        let mut settler = migrator.settler();
        settler
            .settle_schema()
            .instrument(info_span!("settle_schema"))
            .await?;
        settler
    } else {
        let mut step = migrator.into_step();
        while step.major() != destination_schema_major {
            step = if destination_schema_major > source_schema_major {
                step.migrate_up().instrument(info_span!("migrate_up")).await?
            } else {
                step.migrate_down()
                    .instrument(info_span!("migrate_down"))
                    .await?
            };
        }
        let mut settler = step.settler();
        settler
            .settle_schema()
            .instrument(info_span!("settle_schema"))
            .await?;
        settler
    };

    // Step 8: build the target config from the source config, stepping
    // across a config-major boundary first if the two sides don't already
    // wrap the same one.
    let stepped_source = if target_cfg.config_major() == source_cfg.config_major() {
        None
    } else {
        Some(source_cfg.step_toward(target_cfg.config_major(), target_cfg.config_version())?)
    };
    target_cfg.merge_from(stepped_source.as_ref().unwrap_or(source_cfg))?;
    target_cfg.set_schema_version(crate::version::SemanticVersion::new(
        destination_schema_major,
        latest_minor_for(destination_schema_major)?,
        0,
    ));
    violations.extend(target_cfg.validate_and_normalize());

    // Step 9: persist the merged settings.
    let mutable_bytes = target_cfg.serializable()?;
    let (min_bounds_bytes, max_bounds_bytes) = target_cfg.bounds_document()?;
    settler
        .persist_settings(&mutable_bytes, &min_bounds_bytes, &max_bounds_bytes)
        .instrument(info_span!("persist_settings"))
        .await?;
    drop(settler);

    // Step 10 (commit half): callers handle finalizer/config write/snapshot
    // publish after this returns successfully.
    tx.commit()
        .instrument(info_span!("commit"))
        .await
        .map_err(|e| EngineError::db("COMMIT", e))?;

    Ok(())
}

async fn cleanup_intermediate_schemas(pool: &PgPool, target_cfg: &Settings) -> EngineResult<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EngineError::db("BEGIN (cleanup)", e))?;
    {
        let suffix = target_cfg.role_suffix();
        let mut repo = TransactionRepo::new(&mut tx, suffix);
        for &major in KNOWN_SCHEMA_MAJORS {
            repo.drop_if_exists(Namespace::Mig { major }).await?;
        }
        for &(major, minor) in KNOWN_FDW_NAMESPACES {
            repo.drop_if_exists(Namespace::Fdw { major, minor }).await?;
        }
    }
    tx.commit()
        .await
        .map_err(|e| EngineError::db("COMMIT (cleanup)", e))?;

    let conn_repo = ConnectionRepo::new(pool);
    for &(major, minor) in KNOWN_FDW_NAMESPACES {
        conn_repo
            .drop_server_if_exists(&format!("fdw{major}_{minor}_server"))
            .await?;
    }
    info!("cleaned up intermediate migration schemas and foreign servers");
    Ok(())
}

fn load_config(path: &Path) -> EngineResult<Settings> {
    let bytes = std::fs::read(path)?;
    Settings::load_autodetect(&bytes)
}

fn write_target_config_atomically(path: &Path, settings: &Settings) -> EngineResult<()> {
    let bytes = settings.serialize()?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".new");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
