//! Schema-side migration components (§4.D/E/F): the per-major migrator
//! family, its up/down step wrapper, the settler that materializes
//! `mig{major}` views into `caweb{major}` tables, and the embedded SQL
//! programs that drive all three.

pub mod migrator;
pub mod settler;
pub mod sql;
pub mod step;

pub use migrator::SchemaMigrator;
pub use settler::Settler;
pub use step::StepMigrator;
