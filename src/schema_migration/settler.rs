//! 4.F: the per-major settler. Materializes `mig{major}` views into
//! `caweb{major}` tables and persists the settings row — the only place
//! `settings` is ever written (see the Open Question resolution in
//! `SPEC_FULL.md` §4.G: settings rows do not travel through the view
//! chain).

use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};

use crate::db::schema_repo::Namespace;
use crate::error::{EngineError, EngineResult};
use crate::role::RoleSuffix;
use crate::schema_migration::sql;

/// Component name under which the single settings row is persisted.
pub const SETTINGS_COMPONENT: &str = "caweb";

pub struct Settler<'a, 'c> {
    major: u16,
    tx: &'a mut Transaction<'c, Postgres>,
    #[allow(dead_code)]
    suffix: RoleSuffix,
}

impl<'a, 'c> Settler<'a, 'c> {
    pub(crate) fn new(
        major: u16,
        tx: &'a mut Transaction<'c, Postgres>,
        suffix: RoleSuffix,
    ) -> Self {
        Self { major, tx, suffix }
    }

    pub fn major_version(&self) -> u16 {
        self.major
    }

    fn schema_sql(&self) -> EngineResult<&'static str> {
        match self.major {
            1 => Ok(sql::MIG1_SCHEMA),
            2 => Ok(sql::MIG2_SCHEMA),
            other => Err(EngineError::Unsupported(format!(
                "no settler schema program for major {other}"
            ))),
        }
    }

    fn settle_sql(&self) -> EngineResult<&'static str> {
        match self.major {
            1 => Ok(sql::MIG1_SETTLE),
            2 => Ok(sql::MIG2_SETTLE),
            other => Err(EngineError::Unsupported(format!(
                "no settler settle program for major {other}"
            ))),
        }
    }

    fn dev_sql(&self) -> EngineResult<&'static str> {
        match self.major {
            1 => Ok(sql::MIG1_DEV),
            2 => Ok(sql::MIG2_DEV),
            other => Err(EngineError::Unsupported(format!(
                "no dev seed program for major {other}"
            ))),
        }
    }

    fn prod_sql(&self) -> EngineResult<&'static str> {
        match self.major {
            1 => Ok(sql::MIG1_PROD),
            2 => Ok(sql::MIG2_PROD),
            other => Err(EngineError::Unsupported(format!(
                "no prod seed program for major {other}"
            ))),
        }
    }

    async fn ensure_mig_schema_exists(&mut self) -> EngineResult<()> {
        let mig_name = Namespace::Mig { major: self.major }.name();
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1) AS present",
        )
        .bind(&mig_name)
        .fetch_one(&mut **self.tx)
        .await
        .map_err(|e| EngineError::db("check mig schema presence", e))?;

        if row.get::<bool, _>("present") {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!(
                "{mig_name} is absent, cannot settle"
            )))
        }
    }

    /// `schema.sql` then `settle.sql`: create `caweb{major}` tables and
    /// copy rows from the `mig{major}` views.
    pub async fn settle_schema(&mut self) -> EngineResult<()> {
        self.ensure_mig_schema_exists().await?;
        let schema_sql = self.schema_sql()?;
        let settle_sql = self.settle_sql()?;
        sqlx::raw_sql(schema_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("settle schema.sql", e))?;
        sqlx::raw_sql(settle_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("settle settle.sql", e))?;
        Ok(())
    }

    /// `schema.sql` then `dev.sql`: used to initialize an empty
    /// development database with seeded fixture rows.
    pub async fn init_dev_schema(&mut self) -> EngineResult<()> {
        let schema_sql = self.schema_sql()?;
        let dev_sql = self.dev_sql()?;
        sqlx::raw_sql(schema_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("init_dev schema.sql", e))?;
        sqlx::raw_sql(dev_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("init_dev dev.sql", e))?;
        Ok(())
    }

    /// `schema.sql` then `prod.sql`: used to initialize an empty
    /// production database (no seeded rows).
    pub async fn init_prod_schema(&mut self) -> EngineResult<()> {
        let schema_sql = self.schema_sql()?;
        let prod_sql = self.prod_sql()?;
        sqlx::raw_sql(schema_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("init_prod schema.sql", e))?;
        sqlx::raw_sql(prod_sql)
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db("init_prod prod.sql", e))?;
        Ok(())
    }

    /// UPSERT the single settings row for this major's `caweb{major}.settings`.
    pub async fn persist_settings(
        &mut self,
        mutable_bytes: &[u8],
        min_bounds_bytes: &[u8],
        max_bounds_bytes: &[u8],
    ) -> EngineResult<()> {
        let config: serde_json::Value = serde_json::from_slice(mutable_bytes)
            .map_err(|e| EngineError::InvalidInput(format!("invalid mutable settings json: {e}")))?;
        let min_bounds: serde_json::Value = serde_json::from_slice(min_bounds_bytes)
            .map_err(|e| EngineError::InvalidInput(format!("invalid min_bounds json: {e}")))?;
        let max_bounds: serde_json::Value = serde_json::from_slice(max_bounds_bytes)
            .map_err(|e| EngineError::InvalidInput(format!("invalid max_bounds json: {e}")))?;

        let sql = format!(
            "INSERT INTO caweb{}.settings (component, config, min_bounds, max_bounds) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (component) DO UPDATE SET \
             config = EXCLUDED.config, min_bounds = EXCLUDED.min_bounds, max_bounds = EXCLUDED.max_bounds",
            self.major
        );
        sqlx::query(&sql)
            .bind(SETTINGS_COMPONENT)
            .bind(Json(config))
            .bind(Json(min_bounds))
            .bind(Json(max_bounds))
            .execute(&mut **self.tx)
            .await
            .map_err(|e| EngineError::db(sql, e))?;
        Ok(())
    }
}
