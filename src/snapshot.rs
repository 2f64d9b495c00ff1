//! 4.M Application snapshot: the only process-wide mutable state the
//! engine itself owns. Rebuilt from a committed [`Settings`] value after a
//! successful migration (orchestrator step 10) or a live settings update,
//! never persisted on its own — always a read model derived from the
//! `settings` table.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::EngineResult;
use crate::settings::Settings;

/// Domain-specific read model for the `cars` use case, refreshed in
/// lockstep with `visible_settings`/`min_bounds`/`max_bounds`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CarsUseCase {
    pub delay_of_opm_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ApplicationSnapshot {
    pub visible_settings: serde_json::Value,
    pub min_bounds: serde_json::Value,
    pub max_bounds: serde_json::Value,
    pub cars_use_case: CarsUseCase,
}

impl ApplicationSnapshot {
    /// Build a snapshot from a committed [`Settings`] value. Exposed so the
    /// orchestrator can construct the first snapshot of a process directly,
    /// without going through [`SnapshotHandle::publish`].
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let visible_settings: serde_json::Value =
            serde_json::from_slice(&settings.serializable()?)?;
        let (min_bytes, max_bytes) = settings.bounds_document()?;
        let min_bounds: serde_json::Value = serde_json::from_slice(&min_bytes)?;
        let max_bounds: serde_json::Value = serde_json::from_slice(&max_bytes)?;

        let delay_of_opm_secs = visible_settings
            .get("cars")
            .and_then(|cars| cars.get("delay_of_opm"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<crate::config::types::DurationValue>().ok())
            .map(|d| d.0.as_secs());

        Ok(Self {
            visible_settings,
            min_bounds,
            max_bounds,
            cars_use_case: CarsUseCase { delay_of_opm_secs },
        })
    }
}

/// Reader-writer-lock-guarded snapshot plus an outer mutex so only one
/// rebuild is ever in flight (§5: "acquire mutex -> build -> acquire
/// write-lock -> publish -> release both").
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<ApplicationSnapshot>>,
    publish_lock: Arc<Mutex<()>>,
}

impl SnapshotHandle {
    pub fn new(initial: ApplicationSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
            publish_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn read(&self) -> ApplicationSnapshot {
        self.inner.read().await.clone()
    }

    /// Rebuild from `settings` and publish atomically. Serialized against
    /// concurrent publishers by `publish_lock`; readers never block on it.
    pub async fn publish(&self, settings: &Settings) -> EngineResult<()> {
        let _guard = self.publish_lock.lock().await;
        let fresh = ApplicationSnapshot::from_settings(settings)?;
        let mut write = self.inner.write().await;
        *write = fresh;
        Ok(())
    }
}
