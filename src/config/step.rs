//! 4.H: translate a config object across exactly one major boundary.
//!
//! Fields with no counterpart on the other side are dropped (up) or left
//! unset (down); bounds are never carried across — the target-major
//! object's `merge_from` call, made by the caller after translation, fills
//! them from that major's own hardcoded defaults.

use crate::config::types::Versions;
use crate::config::v1::{CarsV1, ConfigV1, UsecasesV1};
use crate::config::v2::{CarsV2, ConfigV2, UsecasesV2};
use crate::version::SemanticVersion;

pub struct ConfigStepMigrator;

impl ConfigStepMigrator {
    /// `old-parking-method-delay` (v1) -> `delay-of-old-parking-method`
    /// (v2): same value, different YAML key, bounds left unset.
    pub fn up(source: &ConfigV1, target_config_version: SemanticVersion) -> ConfigV2 {
        ConfigV2 {
            versions: Versions {
                config: target_config_version,
                database: source.versions.database,
            },
            database: source.database.clone(),
            framework: source.framework.clone(),
            usecases: UsecasesV2 {
                cars: CarsV2 {
                    delay_of_opm: crate::config::types::Bounded::new(
                        source.usecases.cars.delay_of_opm.value,
                    ),
                },
            },
            comments: Default::default(),
        }
    }

    pub fn down(source: &ConfigV2, target_config_version: SemanticVersion) -> ConfigV1 {
        ConfigV1 {
            versions: Versions {
                config: target_config_version,
                database: source.versions.database,
            },
            database: source.database.clone(),
            framework: source.framework.clone(),
            usecases: UsecasesV1 {
                cars: CarsV1 {
                    delay_of_opm: crate::config::types::Bounded::new(
                        source.usecases.cars.delay_of_opm.value,
                    ),
                },
            },
            comments: Default::default(),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DurationValue;
    use crate::config::ConfigVersion;

    const V1_SAMPLE: &str = "\
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
    fn up_carries_the_value_under_the_renamed_key() {
        let v1 = ConfigV1::load(V1_SAMPLE.as_bytes()).unwrap();
        let target: SemanticVersion = "2.1.0".parse().unwrap();
        let v2 = ConfigStepMigrator::up(&v1, target);
        assert_eq!(v2.versions.config, target);
        assert_eq!(
            v2.usecases.cars.delay_of_opm.value,
            Some(DurationValue::from_secs(10 * 3600))
        );
        assert_eq!(v2.usecases.cars.delay_of_opm.min, None);
    }

    #[test]
    fn up_then_down_round_trips_the_value() {
        let v1 = ConfigV1::load(V1_SAMPLE.as_bytes()).unwrap();
        let v2 = ConfigStepMigrator::up(&v1, "2.0.0".parse().unwrap());
        let back = ConfigStepMigrator::down(&v2, "1.0.0".parse().unwrap());
        assert_eq!(
            back.usecases.cars.delay_of_opm.value,
            v1.usecases.cars.delay_of_opm.value
        );
    }
}
