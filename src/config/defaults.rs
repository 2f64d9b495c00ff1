//! Hardcoded per-major bounds. These never come from the YAML file — they
//! are the "target major's defaults" `merge_from` folds into a freshly
//! loaded or step-migrated [`super::types::Bounded`] field.

use crate::config::types::DurationValue;

/// `usecases.cars`'s `delay_of_opm` bounds for config major 1: unbounded.
pub const CARS_DELAY_OF_OPM_BOUNDS_V1: (Option<DurationValue>, Option<DurationValue>) =
    (None, None);

/// `usecases.cars`'s `delay_of_opm` bounds for config major 2: `[1s, 5h]`.
pub fn cars_delay_of_opm_bounds_v2() -> (Option<DurationValue>, Option<DurationValue>) {
    (
        Some(DurationValue::from_secs(1)),
        Some(DurationValue::from_secs(5 * 3600)),
    )
}
