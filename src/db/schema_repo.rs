//! 4.B Schema-role repository: DDL primitives split across a connection
//! capability (for statements that must not share a transaction with user
//! DDL) and a transaction capability (for everything else).
//!
//! Identifiers are never bound as SQL parameters — PostgreSQL DDL doesn't
//! admit bind parameters for object names — so every identifier is
//! validated against an allow-list before being concatenated into SQL text,
//! and every string literal is escaped by doubling embedded quotes.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::role::{Role, RoleSuffix};
use crate::scram::{self, ScramAlgorithm};

/// Quote a SQL identifier the way standard double-quoting semantics require.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a SQL string literal by doubling embedded single quotes.
pub fn escape_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Reject any identifier containing characters outside the allow-list
/// (ASCII letters, digits, underscore) — DDL text never admits anything
/// else once concatenated.
fn validate_identifier(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidInput(
            "identifier must not be empty".to_string(),
        ));
    }
    let first_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !first_ok || !rest_ok {
        return Err(EngineError::InvalidInput(format!(
            "identifier `{name}` contains characters outside the allow-list"
        )));
    }
    Ok(())
}

/// Supported schema namespaces, parameterized by major/minor, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `fdwN_M` — foreign-schema import of the source's `cawebN`.
    Fdw { major: u16, minor: u16 },
    /// `migN` — transient schema of latest-minor views at major N.
    Mig { major: u16 },
    /// `cawebN` — persistent destination schema for major N.
    Caweb { major: u16 },
}

impl Namespace {
    pub fn name(self) -> String {
        match self {
            Namespace::Fdw { major, minor } => format!("fdw{major}_{minor}"),
            Namespace::Mig { major } => format!("mig{major}"),
            Namespace::Caweb { major } => format!("caweb{major}"),
        }
    }

    /// Reject any identifier that does not originate from this version
    /// family's own naming scheme, even if it happens to be otherwise
    /// syntactically valid.
    pub fn validate(self) -> EngineResult<()> {
        validate_identifier(&self.name())
    }
}

/// Whether a "does this already exist" failure should be treated as
/// success (idempotent variants) or as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExistenceError {
    AlreadyExists,
    DoesNotExist,
}

fn classify_existence_error(e: &sqlx::Error) -> Option<ExistenceError> {
    let sqlx::Error::Database(db_err) = e else {
        return None;
    };
    match db_err.code().as_deref() {
        // duplicate_object / duplicate_schema / duplicate_table / unique_violation
        Some("42710") | Some("42P06") | Some("42P07") | Some("23505") => {
            Some(ExistenceError::AlreadyExists)
        }
        // undefined_object / undefined_table / invalid_schema_name
        Some("42704") | Some("42P01") | Some("3F000") => Some(ExistenceError::DoesNotExist),
        _ => None,
    }
}

/// DDL that must run outside any user transaction (extension install,
/// cascading server drop) — taken over a bare connection or pool.
pub struct ConnectionRepo<'a> {
    pool: &'a PgPool,
}

impl<'a> ConnectionRepo<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn install_fdw_extension_if_missing(&self) -> EngineResult<()> {
        match sqlx::query("CREATE EXTENSION IF NOT EXISTS postgres_fdw")
            .execute(self.pool)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => Err(EngineError::db("CREATE EXTENSION postgres_fdw", e)),
        }
    }

    pub async fn drop_server_if_exists(&self, server_name: &str) -> EngineResult<()> {
        validate_identifier(server_name)?;
        let sql = format!(
            "DROP SERVER IF EXISTS {} CASCADE",
            quote_ident(server_name)
        );
        sqlx::query(&sql)
            .execute(self.pool)
            .await
            .map_err(|e| EngineError::db(sql, e))?;
        Ok(())
    }
}

/// DDL that runs inside the orchestrator's destination transaction.
pub struct TransactionRepo<'a, 'c> {
    tx: &'a mut Transaction<'c, Postgres>,
    suffix: RoleSuffix,
}

impl<'a, 'c> TransactionRepo<'a, 'c> {
    pub fn new(tx: &'a mut Transaction<'c, Postgres>, suffix: RoleSuffix) -> Self {
        Self { tx, suffix }
    }

    pub fn role_name(&self, role: Role) -> String {
        role.qualified_name(&self.suffix)
    }

    async fn exec(&mut self, sql: String) -> EngineResult<()> {
        sqlx::query(&sql)
            .execute(&mut **self.tx)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::db(sql, e))
    }

    /// `true` if the query succeeded or failed with the expected existence
    /// error (in which case it is swallowed and logged as a notice).
    async fn exec_idempotent(&mut self, sql: String, tolerate: ExistenceError) -> EngineResult<()> {
        match sqlx::query(&sql).execute(&mut **self.tx).await {
            Ok(_) => Ok(()),
            Err(e) => match classify_existence_error(&e) {
                Some(kind) if kind == tolerate => {
                    info!(%sql, "ignoring idempotent DDL conflict");
                    Ok(())
                }
                _ => Err(EngineError::db(sql, e)),
            },
        }
    }

    pub async fn create_schema(&mut self, ns: Namespace) -> EngineResult<()> {
        ns.validate()?;
        let sql = format!("CREATE SCHEMA {}", quote_ident(&ns.name()));
        match self.exec(sql.clone()).await {
            Err(EngineError::DbError { source, .. })
                if classify_existence_error(&source) == Some(ExistenceError::AlreadyExists) =>
            {
                Err(EngineError::Conflict(format!(
                    "schema `{}` already exists",
                    ns.name()
                )))
            }
            other => other,
        }
    }

    pub async fn drop_if_exists(&mut self, ns: Namespace) -> EngineResult<()> {
        ns.validate()?;
        let sql = format!("DROP SCHEMA IF EXISTS {}", quote_ident(&ns.name()));
        self.exec(sql).await
    }

    pub async fn drop_cascade(&mut self, ns: Namespace) -> EngineResult<()> {
        ns.validate()?;
        let sql = format!("DROP SCHEMA {} CASCADE", quote_ident(&ns.name()));
        match self.exec(sql).await {
            Err(EngineError::DbError { source, .. })
                if classify_existence_error(&source) == Some(ExistenceError::DoesNotExist) =>
            {
                Err(EngineError::NotFound(format!(
                    "schema `{}` does not exist",
                    ns.name()
                )))
            }
            other => other,
        }
    }

    pub async fn create_role_if_not_exists(&mut self, role: Role) -> EngineResult<()> {
        let name = self.role_name(role);
        validate_identifier(&name)?;
        let sql = format!("CREATE ROLE {} LOGIN", quote_ident(&name));
        self.exec_idempotent(sql, ExistenceError::AlreadyExists)
            .await
    }

    pub async fn grant_privileges(&mut self, ns: Namespace, role: Role) -> EngineResult<()> {
        ns.validate()?;
        let role_name = self.role_name(role);
        validate_identifier(&role_name)?;
        let schema = quote_ident(&ns.name());
        let role_ident = quote_ident(&role_name);
        self.exec(format!("GRANT USAGE ON SCHEMA {schema} TO {role_ident}"))
            .await?;
        self.exec(format!(
            "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA {schema} TO {role_ident}"
        ))
        .await
    }

    pub async fn set_search_path(&mut self, ns: Namespace, role: Role) -> EngineResult<()> {
        ns.validate()?;
        let role_name = self.role_name(role);
        validate_identifier(&role_name)?;
        let sql = format!(
            "ALTER ROLE {} SET search_path = {}",
            quote_ident(&role_name),
            quote_ident(&ns.name())
        );
        self.exec(sql).await
    }

    pub async fn grant_fdw_usage(&mut self, role: Role) -> EngineResult<()> {
        let role_name = self.role_name(role);
        validate_identifier(&role_name)?;
        let sql = format!(
            "GRANT USAGE ON FOREIGN DATA WRAPPER postgres_fdw TO {}",
            quote_ident(&role_name)
        );
        self.exec(sql).await
    }

    /// Hash and store fresh passwords for `roles` in lockstep with
    /// `passwords`. Both slices must be non-empty and of equal length.
    pub async fn change_passwords(
        &mut self,
        roles: &[Role],
        passwords: &[String],
        algorithm: ScramAlgorithm,
    ) -> EngineResult<()> {
        if roles.is_empty() || roles.len() != passwords.len() {
            return Err(EngineError::InvalidInput(
                "change_passwords requires equal, nonzero-length role and password lists"
                    .to_string(),
            ));
        }

        for (role, password) in roles.iter().zip(passwords) {
            let role_name = self.role_name(*role);
            validate_identifier(&role_name)?;
            let hashed = scram::hash_password(algorithm, password, scram::MIN_ITERATIONS)?;
            let sql = format!(
                "ALTER ROLE {} PASSWORD {}",
                quote_ident(&role_name),
                escape_literal(&hashed)
            );
            self.exec(sql).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("mig1"), "\"mig1\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn escape_literal_doubles_embedded_single_quotes() {
        assert_eq!(escape_literal("it's"), "'it''s'");
    }

    #[test]
    fn namespace_names_follow_the_spec_patterns() {
        assert_eq!(Namespace::Fdw { major: 1, minor: 0 }.name(), "fdw1_0");
        assert_eq!(Namespace::Mig { major: 2 }.name(), "mig2");
        assert_eq!(Namespace::Caweb { major: 1 }.name(), "caweb1");
    }

    #[test]
    fn identifier_validation_rejects_injected_suffixes() {
        assert!(validate_identifier("mig1; DROP TABLE users").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1mig").is_err());
        assert!(validate_identifier("mig_1").is_ok());
    }
}
