use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The maximum value accepted for any single version component.
///
/// The spec only requires "an implementation-defined maximum (>= 2^16
/// suffices)"; `u16::MAX` is used verbatim as the component's storage type.
pub const MAX_COMPONENT: u32 = u16::MAX as u32;

/// A `major.minor.patch` triple with total ordering and a dedicated
/// major-compatibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl SemanticVersion {
    pub fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Two versions are major-compatible iff their majors are equal and the
    /// right-hand minor is >= the left-hand minor (backward-readable within
    /// a major). Patch never gates compatibility.
    pub fn is_major_compatible_with(&self, other: &SemanticVersion) -> bool {
        self.major == other.major && other.minor >= self.minor
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        let [maj, min, pat] = parts.as_slice() else {
            return Err(EngineError::InvalidInput(format!(
                "invalid version format `{}`: expected exactly three dot-separated components",
                s
            )));
        };

        let parse_component = |component: &str| -> EngineResult<u16> {
            let value: u32 = component.parse().map_err(|_| {
                EngineError::InvalidInput(format!(
                    "invalid version format `{}`: component `{}` is not a non-negative integer",
                    s, component
                ))
            })?;
            if value > MAX_COMPONENT {
                return Err(EngineError::InvalidInput(format!(
                    "invalid version format `{}`: component `{}` exceeds the maximum of {}",
                    s, component, MAX_COMPONENT
                )));
            }
            Ok(value as u16)
        };

        Ok(SemanticVersion {
            major: parse_component(maj)?,
            minor: parse_component(min)?,
            patch: parse_component(pat)?,
        })
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = EngineError;

    fn try_from(value: String) -> EngineResult<Self> {
        value.parse()
    }
}

impl From<SemanticVersion> for String {
    fn from(value: SemanticVersion) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_round_trip() {
        let v: SemanticVersion = "1.2.3".parse().unwrap();
        assert_eq!(v, SemanticVersion::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn leading_zeros_are_accepted() {
        let v: SemanticVersion = "01.002.3".parse().unwrap();
        assert_eq!(v, SemanticVersion::new(1, 2, 3));
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert!("1.2".parse::<SemanticVersion>().is_err());
        assert!("1.2.3.4".parse::<SemanticVersion>().is_err());
    }

    #[test]
    fn rejects_non_numeric_components() {
        assert!("1.x.3".parse::<SemanticVersion>().is_err());
        assert!("-1.2.3".parse::<SemanticVersion>().is_err());
    }

    #[test]
    fn rejects_components_over_the_maximum() {
        let too_big = format!("1.{}.0", MAX_COMPONENT + 1);
        assert!(too_big.parse::<SemanticVersion>().is_err());
    }

    #[test]
    fn total_ordering_is_lexicographic() {
        let a: SemanticVersion = "1.2.3".parse().unwrap();
        let b: SemanticVersion = "1.3.0".parse().unwrap();
        let c: SemanticVersion = "2.0.0".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn exactly_one_ordering_relation_holds() {
        let pairs = [
            ("1.0.0", "1.0.0"),
            ("1.0.0", "1.0.1"),
            ("2.0.0", "1.9.9"),
        ];
        for (l, r) in pairs {
            let a: SemanticVersion = l.parse().unwrap();
            let b: SemanticVersion = r.parse().unwrap();
            let relations = [a < b, a == b, a > b];
            assert_eq!(relations.iter().filter(|x| **x).count(), 1);
        }
    }

    #[test]
    fn major_compatible_requires_same_major_and_ge_minor() {
        let src: SemanticVersion = "1.0.5".parse().unwrap();
        let dst: SemanticVersion = "1.2.0".parse().unwrap();
        assert!(src.is_major_compatible_with(&dst));
        assert!(!dst.is_major_compatible_with(&src));

        let other_major: SemanticVersion = "2.0.0".parse().unwrap();
        assert!(!src.is_major_compatible_with(&other_major));
    }

    #[test]
    fn patch_never_gates_compatibility() {
        let a: SemanticVersion = "1.2.0".parse().unwrap();
        let b: SemanticVersion = "1.2.999".parse().unwrap();
        assert!(a.is_major_compatible_with(&b));
        assert!(b.is_major_compatible_with(&a));
    }
}
