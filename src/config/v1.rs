//! Config major 1: `usecases.cars.old-parking-method-delay`, unbounded.

use serde::{Deserialize, Serialize};

use crate::config::bounds::{self, BoundsViolation};
use crate::config::comments::{self, CommentTree};
use crate::config::defaults::CARS_DELAY_OF_OPM_BOUNDS_V1;
use crate::config::types::{Bounded, DatabaseSection, DurationValue, FrameworkSection, MutableCars, MutableDoc, Versions};
use crate::config::ConfigVersion;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarsV1 {
    #[serde(rename = "old-parking-method-delay", default)]
    pub delay_of_opm: Bounded<DurationValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsecasesV1 {
    pub cars: CarsV1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigV1 {
    pub versions: Versions,
    pub database: DatabaseSection,
    #[serde(default)]
    pub framework: FrameworkSection,
    pub usecases: UsecasesV1,
    #[serde(skip)]
    pub comments: CommentTree,
}

impl ConfigV1 {
    /// Hardcoded defaults `merge_from` folds into a loaded/migrated
    /// instance — only the bounds matter here, `value` is ignored.
    fn defaults_for_merge() -> Self {
        ConfigV1 {
            versions: Versions {
                config: "1.0.0".parse().expect("valid literal"),
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
            usecases: UsecasesV1 {
                cars: CarsV1 {
                    delay_of_opm: Bounded::with_bounds(
                        None,
                        CARS_DELAY_OF_OPM_BOUNDS_V1.0,
                        CARS_DELAY_OF_OPM_BOUNDS_V1.1,
                    ),
                },
            },
            comments: CommentTree::default(),
        }
    }
}

impl ConfigVersion for ConfigV1 {
    fn major() -> u16 {
        1
    }

    fn load(bytes: &[u8]) -> EngineResult<Self> {
        let text = comments::validate_utf8(bytes)?;
        let mut cfg: ConfigV1 = serde_yaml::from_str(text)
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
            "usecases.cars.old-parking-method-delay",
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
                field: "usecases.cars.old-parking-method-delay".to_string(),
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
  config: 1.1.0
  database: 1.0.0
database:
  host: db.example
  port: 5432
  name: caweb
  pass-dir: /etc/caweb/pass
usecases:
  cars:
    old-parking-method-delay: 10h
";

    #[test]
    fn load_parses_the_v1_yaml_shape() {
        let cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
        assert_eq!(cfg.database.host, "db.example");
    }

    #[test]
    fn load_rejects_a_config_file_of_the_wrong_major() {
        let wrong_major = SAMPLE.replace("config: 1.1.0", "config: 2.0.0");
        assert!(matches!(
            ConfigV1::load(wrong_major.as_bytes()),
            Err(EngineError::VersionMismatch(_))
        ));
    }

    #[test]
    fn merge_from_fills_bounds_but_not_value() {
        let mut cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let other = cfg.clone();
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
        assert_eq!(cfg.usecases.cars.delay_of_opm.min, None);
    }

    #[test]
    fn merge_from_copies_the_database_block_unconditionally() {
        let mut cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let mut other = cfg.clone();
        other.database.host = "other.example".to_string();
        cfg.merge_from(&other);
        assert_eq!(cfg.database.host, "other.example");
    }

    #[test]
    fn merge_from_inherits_the_value_only_when_this_side_is_missing() {
        let mut cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let mut other = cfg.clone();
        other.usecases.cars.delay_of_opm.value = Some(DurationValue::from_secs(60));
        cfg.usecases.cars.delay_of_opm.value = None;
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(60))
        );

        let mut cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        cfg.merge_from(&other);
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
    }

    #[test]
    fn serializable_emits_the_mutable_subset_only() {
        let cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let json = cfg.serializable().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["version"], "1.1.0");
        assert_eq!(value["cars"]["delay_of_opm"], "10h");
        assert!(value.get("database").is_none());
    }

    #[test]
    fn mutate_applies_a_new_value_by_field_name() {
        let mut cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let patch = serde_json::json!({"version": "1.1.0", "cars": {"delay_of_opm": "1h"}});
        cfg.mutate(&serde_json::to_vec(&patch).unwrap()).unwrap();
        assert_eq!(
            cfg.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(3600))
        );
    }

    #[test]
    fn marshal_yaml_round_trips_through_load() {
        let cfg = ConfigV1::load(SAMPLE.as_bytes()).unwrap();
        let marshaled = cfg.marshal_yaml().unwrap();
        let reloaded = ConfigV1::load(&marshaled).unwrap();
        assert_eq!(
            reloaded.usecases.cars.delay_of_opm.value,
            cfg.usecases.cars.delay_of_opm.value
        );
    }
}
