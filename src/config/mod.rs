//! 4.G/4.H: the service's own YAML config file, as a small family of
//! per-major types sharing one trait, plus the step migrator that
//! translates an instance across exactly one major boundary.

pub mod bounds;
pub mod comments;
pub mod defaults;
pub mod step;
pub mod types;
pub mod v1;
pub mod v2;

pub use bounds::BoundsViolation;
pub use step::ConfigStepMigrator;
pub use types::Versions;
pub use v1::ConfigV1;
pub use v2::ConfigV2;

use crate::error::EngineResult;

/// Operations every per-major config type must implement, named after
/// §4.G's operation list.
pub trait ConfigVersion: Sized + Clone {
    fn major() -> u16;
    fn load(bytes: &[u8]) -> EngineResult<Self>;
    /// Clamp bounded fields in place, returning what was clamped.
    fn validate_and_normalize(&mut self) -> Vec<BoundsViolation>;
    fn deep_clone(&self) -> Self;
    /// Fold in this major's own hardcoded bounds; `other` is conventionally
    /// `self` itself or a fresh instance of the same major — `merge_from`
    /// never crosses majors (that's `ConfigStepMigrator`'s job).
    fn merge_from(&mut self, other: &Self);
    fn mutate(&mut self, serialized_mutable: &[u8]) -> EngineResult<()>;
    fn serializable(&self) -> EngineResult<Vec<u8>>;
    /// `(min_document, max_document)`, same wire shape as `serializable()`.
    fn bounds_document(&self) -> EngineResult<(Vec<u8>, Vec<u8>)>;
    fn marshal_yaml(&self) -> EngineResult<Vec<u8>>;
    fn versions(&self) -> &Versions;
    fn versions_mut(&mut self) -> &mut Versions;
}
