use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::scram::ScramAlgorithm;
use crate::version::SemanticVersion;

/// A scalar paired with optional `min`/`max` bounds (§3: "every numeric
/// bounded setting is three parallel optional fields").
///
/// `value` is the only part of this type that ever appears in the YAML
/// config file or in a serialized mutable-settings document; `min`/`max`
/// live only in the in-memory object, populated from the target major's
/// hardcoded defaults during `merge_from`. Accordingly [`Bounded`]
/// (de)serializes transparently as just its `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounded<T> {
    pub value: Option<T>,
    pub min: Option<T>,
    pub max: Option<T>,
}

impl<T> Bounded<T> {
    pub fn new(value: Option<T>) -> Self {
        Self {
            value,
            min: None,
            max: None,
        }
    }

    pub fn with_bounds(value: Option<T>, min: Option<T>, max: Option<T>) -> Self {
        Self { value, min, max }
    }
}

impl<T: PartialOrd + Clone> Bounded<T> {
    /// Clamp `value` to `[min, max]` in place. Returns the pre-clamp value
    /// if clamping was necessary (callers turn this into a `BoundsViolation`
    /// warning), or `None` if the value already satisfied its bounds.
    pub fn clamp_in_place(&mut self) -> Option<T> {
        let value = self.value.clone()?;
        let mut clamped = value.clone();
        let mut changed = false;

        if let Some(min) = &self.min {
            if clamped < *min {
                clamped = min.clone();
                changed = true;
            }
        }
        if let Some(max) = &self.max {
            if clamped > *max {
                clamped = max.clone();
                changed = true;
            }
        }

        if changed {
            self.value = Some(clamped);
            Some(value)
        } else {
            None
        }
    }
}

impl<T: Serialize> Serialize for Bounded<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Bounded<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Bounded::new(Option::<T>::deserialize(deserializer)?))
    }
}

/// A duration expressed with a single unit suffix: `s`, `m`, or `h`
/// (e.g. `"2s"`, `"5h"`). The config file's own small vocabulary — not a
/// general-purpose duration grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DurationValue(pub Duration);

impl DurationValue {
    pub fn from_secs(secs: u64) -> Self {
        DurationValue(Duration::from_secs(secs))
    }
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        if secs != 0 && secs % 3600 == 0 {
            write!(f, "{}h", secs / 3600)
        } else if secs != 0 && secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{}s", secs)
        }
    }
}

impl FromStr for DurationValue {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        if s.is_empty() {
            return Err(EngineError::InvalidInput("empty duration".to_string()));
        }
        let (digits, unit) = s.split_at(s.len() - 1);
        let amount: u64 = digits.parse().map_err(|_| {
            EngineError::InvalidInput(format!("invalid duration `{s}`: expected e.g. `10h`"))
        })?;
        let secs = match unit {
            "s" => amount,
            "m" => amount * 60,
            "h" => amount * 3600,
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "invalid duration `{s}`: unknown unit suffix, expected s/m/h"
                )));
            }
        };
        Ok(DurationValue(Duration::from_secs(secs)))
    }
}

impl Serialize for DurationValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DurationValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `versions:` block — independent config and database (schema) version
/// streams; a migration may cross a schema major without crossing a config
/// major, or vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versions {
    pub config: SemanticVersion,
    pub database: SemanticVersion,
}

/// `database:` block — connection info, role suffix, auth method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub host: String,
    pub port: u16,
    pub name: String,
    #[serde(rename = "pass-dir")]
    pub pass_dir: String,
    #[serde(rename = "role-suffix", skip_serializing_if = "Option::is_none")]
    pub role_suffix: Option<String>,
    #[serde(rename = "auth-method", default)]
    pub auth_method: ScramAlgorithm,
}

/// `framework:` block — opaque toggles, passed through unvalidated and
/// untranslated across every migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkSection(pub HashMap<String, serde_json::Value>);

/// `cars` subsection of a mutable-settings document: same JSON field name
/// (`delay_of_opm`) regardless of which config major produced it, even
/// though the YAML key it is read from differs per major (§4.H).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutableCars {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_of_opm: Option<DurationValue>,
}

/// The mutable-settings wire shape: `{"version": "...", "cars": {...}}`.
/// Used both for `serializable()` (current values) and for the two
/// `bounds()` documents (min/max), which reuse the same shape with
/// whichever side of the bound is being reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MutableDoc {
    pub version: SemanticVersion,
    pub cars: MutableCars,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_serializes_as_bare_value() {
        let b = Bounded::with_bounds(Some(5u32), Some(1u32), Some(10u32));
        assert_eq!(serde_json::to_string(&b).unwrap(), "5");
    }

    #[test]
    fn bounded_deserializes_value_only_leaving_bounds_unset() {
        let b: Bounded<u32> = serde_json::from_str("5").unwrap();
        assert_eq!(b.value, Some(5));
        assert_eq!(b.min, None);
        assert_eq!(b.max, None);
    }

    #[test]
    fn bounded_null_round_trips_to_none() {
        let b: Bounded<u32> = serde_json::from_str("null").unwrap();
        assert_eq!(b.value, None);
        assert_eq!(serde_json::to_string(&b).unwrap(), "null");
    }

    #[test]
    fn clamp_in_place_clamps_to_nearest_bound() {
        let mut b = Bounded::with_bounds(
            Some(DurationValue::from_str("10h").unwrap()),
            Some(DurationValue::from_str("1s").unwrap()),
            Some(DurationValue::from_str("5h").unwrap()),
        );
        let original = b.clamp_in_place();
        assert_eq!(original, Some(DurationValue::from_str("10h").unwrap()));
        assert_eq!(b.value, Some(DurationValue::from_str("5h").unwrap()));
    }

    #[test]
    fn clamp_in_place_is_a_noop_within_bounds() {
        let mut b = Bounded::with_bounds(Some(3u32), Some(1u32), Some(10u32));
        assert_eq!(b.clamp_in_place(), None);
        assert_eq!(b.value, Some(3));
    }

    #[test]
    fn duration_value_parses_and_formats() {
        assert_eq!(DurationValue::from_str("2s").unwrap().to_string(), "2s");
        assert_eq!(DurationValue::from_str("5h").unwrap().to_string(), "5h");
        assert_eq!(DurationValue::from_str("120s").unwrap().to_string(), "2m");
    }

    #[test]
    fn duration_value_rejects_unknown_units() {
        assert!(DurationValue::from_str("10x").is_err());
    }
}
