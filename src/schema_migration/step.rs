//! 4.E: up/down step migrators. Thin wrapper over [`SchemaMigrator`] that
//! exposes the fixed `(from_major -> to_major)` delta under its own name,
//! matching the component split in the design even though the mechanics
//! (tagged-sum enum, same-type return) are shared with 4.D.

use crate::error::EngineResult;
use crate::schema_migration::migrator::SchemaMigrator;
use crate::schema_migration::settler::Settler;

pub struct StepMigrator<'a, 'c> {
    inner: SchemaMigrator<'a, 'c>,
}

impl<'a, 'c> StepMigrator<'a, 'c> {
    pub(crate) fn from_migrator(inner: SchemaMigrator<'a, 'c>) -> Self {
        Self { inner }
    }

    pub fn major(&self) -> u16 {
        self.inner.major()
    }

    /// Produce `mig{major+1}`, returning a step migrator positioned there.
    /// `Unsupported` at the terminal major.
    pub async fn migrate_up(self) -> EngineResult<StepMigrator<'a, 'c>> {
        Ok(StepMigrator::from_migrator(self.inner.up_step().await?))
    }

    /// Dual of [`Self::migrate_up`].
    pub async fn migrate_down(self) -> EngineResult<StepMigrator<'a, 'c>> {
        Ok(StepMigrator::from_migrator(self.inner.down_step().await?))
    }

    /// The current step's major settler.
    pub fn settler(self) -> Settler<'a, 'c> {
        self.inner.settler()
    }
}
