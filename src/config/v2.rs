//! Config major 2: `usecases.cars.delay-of-old-parking-method`, bounded to
//! `[1s, 5h]` by default.

use serde::{Deserialize, Serialize};

use crate::config::bounds::{self, BoundsViolation};
use crate::config::comments::{self, CommentTree};
use crate::config::defaults::cars_delay_of_opm_bounds_v2;
use crate::config::types::{Bounded, DatabaseSection, DurationValue, FrameworkSection, MutableCars, MutableDoc, Versions};
use crate::config::ConfigVersion;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarsV2 {
    #[serde(rename = "delay-of-old-parking-method", default)]
    pub delay_of_opm: Bounded<DurationValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsecasesV2 {
    pub cars: CarsV2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigV2 {
    pub versions: Versions,
    pub database: DatabaseSection,
    #[serde(default)]
    pub framework: FrameworkSection,
    pub usecases: UsecasesV2,
    #[serde(skip)]
    pub comments: CommentTree,
}

impl ConfigV2 {
    fn defaults_for_merge() -> Self {
        let (min, max) = cars_delay_of_opm_bounds_v2();
        ConfigV2 {
            versions: Versions {
                config: "2.0.0".parse().expect("valid literal"),
                database: "1.0.0".parse().expect("valid literal"),
            },
            database: DatabaseSection {
                host: String::new(),
                port: 0,
                name: String::new(),
                pass_dir: String::new(),
                role_suffix: None,
                auth_method: Default::default(),
            },
            framework: FrameworkSection::default(),
            usecases: UsecasesV2 {
                cars: CarsV2 {
                    delay_of_opm: Bounded::with_bounds(None, min, max),
                },
            },
            comments: CommentTree::default(),
        }
    }
}

impl ConfigVersion for ConfigV2 {
    fn major() -> u16 {
        2
    }

    fn load(bytes: &[u8]) -> EngineResult<Self> {
        let text = comments::validate_utf8(bytes)?;
        let mut cfg: ConfigV2 = serde_yaml::from_str(text)
            .map_err(|e| EngineError::InvalidInput(format!("invalid config yaml: {e}")))?;
        if cfg.versions.config.major != Self::major() {
            return Err(EngineError::VersionMismatch(format!(
                "config file declares major {} but this loader expects major {}",
                cfg.versions.config.major,
                Self::major()
            )));
        }
        cfg.comments = CommentTree::scan(text);
        Ok(cfg)
    }

    fn validate_and_normalize(&mut self) -> Vec<BoundsViolation> {
        bounds::clamp_and_report(
            "usecases.cars.delay-of-old-parking-method",
            &mut self.usecases.cars.delay_of_opm,
        )
        .into_iter()
        .collect()
    }

    fn deep_clone(&self) -> Self {
        self.clone()
    }

    fn merge_from(&mut self, other: &Self) {
        self.database = other.database.clone();
        let defaults = Self::defaults_for_merge();
        self.usecases.cars.delay_of_opm.min = defaults.usecases.cars.delay_of_opm.min;
        self.usecases.cars.delay_of_opm.max = defaults.usecases.cars.delay_of_opm.max;
        if self.usecases.cars.delay_of_opm.value.is_none() {
            self.usecases.cars.delay_of_opm.value = other.usecases.cars.delay_of_opm.value;
        }
    }

    fn mutate(&mut self, serialized_mutable: &[u8]) -> EngineResult<()> {
        let doc: MutableDoc = serde_json::from_slice(serialized_mutable)
            .map_err(|e| EngineError::InvalidInput(format!("invalid mutable settings: {e}")))?;
        if doc.version != self.versions.config {
            return Err(EngineError::VersionMismatch(format!(
                "mutable settings declare version {} but config is at {}",
                doc.version, self.versions.config
            )));
        }
        if let Some(delay) = doc.cars.delay_of_opm {
            self.usecases.cars.delay_of_opm.value = Some(delay);
        }
        if let Some(original) = self.usecases.cars.delay_of_opm.clamp_in_place() {
            return Err(EngineError::BoundsViolation {
                field: "usecases.cars.delay-of-old-parking-method".to_string(),
                value: original.to_string(),
                clamped: self
                    .usecases
                    .cars
                    .delay_of_opm
                    .value
                    .expect("clamp_in_place always leaves a value behind")
                    .to_string(),
            });
        }
        Ok(())
    }

    fn serializable(&self) -> EngineResult<Vec<u8>> {
        let doc = MutableDoc {
            version: self.versions.config,
            cars: MutableCars {
                delay_of_opm: self.usecases.cars.delay_of_opm.value,
            },
        };
        serde_json::to_vec(&doc).map_err(|e| EngineError::InvalidInput(e.to_string()))
    }

    fn bounds_document(&self) -> EngineResult<(Vec<u8>, Vec<u8>)> {
        let min_doc = MutableDoc {
            version: self.versions.config,
            cars: MutableCars {
                delay_of_opm: self.usecases.cars.delay_of_opm.min,
            },
        };
        let max_doc = MutableDoc {
            version: self.versions.config,
            cars: MutableCars {
                delay_of_opm: self.usecases.cars.delay_of_opm.max,
            },
        };
        Ok((
            serde_json::to_vec(&min_doc).map_err(|e| EngineError::InvalidInput(e.to_string()))?,
            serde_json::to_vec(&max_doc).map_err(|e| EngineError::InvalidInput(e.to_string()))?,
        ))
    }

    fn marshal_yaml(&self) -> EngineResult<Vec<u8>> {
        let raw = serde_yaml::to_string(self)
            .map_err(|e| EngineError::InvalidInput(format!("failed to marshal config: {e}")))?;
        Ok(self.comments.splice(&raw).into_bytes())
    }

    fn versions(&self) -> &Versions {
        &self.versions
    }

    fn versions_mut(&mut self) -> &mut Versions {
        &mut self.versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
versions:
  config: 2.1.0
  database: 1.0.0
database:
  host: db.example
  port: 5432
  name: caweb
  pass-dir: /etc/caweb/pass
usecases:
  cars:
    delay-of-old-parking-method: 10h
";

    #[test]
    fn load_parses_the_v2_yaml_shape() {
        let cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
    }

    #[test]
    fn merge_from_applies_the_default_bounds_window() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let other = cfg.clone();
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.min,
            Some(DurationValue::from_secs(1))
        );
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.max,
            Some(DurationValue::from_secs(5 * 3600))
        );
    }

    #[test]
    fn merge_from_copies_the_database_block_unconditionally() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let mut other = cfg.clone();
        other.database.name = "other-db".to_string();
        cfg.merge_from(&other);
        assert_eq!(cfg.database.name, "other-db");
    }

    #[test]
    fn merge_from_inherits_the_value_only_when_this_side_is_missing() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let mut other = cfg.clone();
        other.usecases.cars.delay_of_opm.value = Some(DurationValue::from_secs(60));
        cfg.usecases.cars.delay_of_opm.value = None;
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(60))
        );

        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
    }

    #[test]
    fn mutate_rejects_a_mismatched_version() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let patch = serde_json::json!({"version": "2.0.0", "cars": {"delay_of_opm": "2s"}});
        assert!(matches!(
            cfg.mutate(&serde_json::to_vec(&patch).unwrap()),
            Err(EngineError::VersionMismatch(_))
        ));
    }

    #[test]
    fn mutate_clamps_and_reports_a_bounds_violation() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let other = cfg.clone();
        cfg.merge_from(&other);
        let patch = serde_json::json!({"version": "2.1.0", "cars": {"delay_of_opm": "10h"}});
        let result = cfg.mutate(&serde_json::to_vec(&patch).unwrap());
        assert!(matches!(result, Err(EngineError::BoundsViolation { .. })));
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(5 * 3600))
        );
    }

    #[test]
    fn validate_and_normalize_clamps_an_out_of_bounds_value_after_merge() {
        let mut cfg = ConfigV2::load(SAMPLE.as_bytes()).unwrap();
        let other = cfg.clone();
        cfg.merge_from(&other);
        let violations = cfg.validate_and_normalize();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(5 * 3600))
        );
    }
}
