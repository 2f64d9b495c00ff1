//! Shared clamp-and-report plumbing used by every [`super::ConfigVersion`]
//! implementation's `validate_and_normalize`.

use std::fmt;

use tracing::warn;

use crate::config::types::Bounded;

/// A value that fell outside its bounds and was clamped in place.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundsViolation {
    pub field: String,
    pub original: String,
    pub clamped: String,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} out of bounds, clamped to {}",
            self.field, self.original, self.clamped
        )
    }
}

/// Clamp `bounded` in place; if clamping changed the value, log a warning
/// and return the violation record (the orchestrator surfaces these, it
/// never fails the migration over them — §3's edge case for bounds
/// violations is "clamp and warn", not "reject").
pub fn clamp_and_report<T>(field: &str, bounded: &mut Bounded<T>) -> Option<BoundsViolation>
where
    T: PartialOrd + Clone + fmt::Display,
{
    let original = bounded.clamp_in_place()?;
    let violation = BoundsViolation {
        field: field.to_string(),
        original: original.to_string(),
        clamped: bounded
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    };
    warn!(%violation, "clamped out-of-bounds setting");
    Some(violation)
}
