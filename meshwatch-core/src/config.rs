//! Locator configuration
//!
//! Every section has working defaults, so a config file only needs to list
//! what it changes:
//!
//! ```json
//! {
//!   "pathLoss": { "default_exponent": 2.7, "room_exponents": { "garage": 3.5 } },
//!   "knn": { "k": 3 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::CoreResult;
use crate::fingerprint::FingerprintConfig;
use crate::positioning::{KernelConfig, KnnConfig, TrackConfig, TrilaterationConfig};
use crate::ranging::{EnvironmentConfig, PathLossConfig, SmootherConfig};

/// Everything the locator needs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocatorConfig {
    pub path_loss: PathLossConfig,
    pub environment: EnvironmentConfig,
    pub smoother: SmootherConfig,
    pub trilateration: TrilaterationConfig,
    pub knn: KnnConfig,
    pub kernel: KernelConfig,
    pub track: TrackConfig,
    pub fingerprint: FingerprintConfig,
}

impl LocatorConfig {
    /// Replace the path-loss section
    pub fn with_path_loss(mut self, path_loss: PathLossConfig) -> Self {
        self.path_loss = path_loss;
        self
    }

    /// Replace the environment section
    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }

    /// Replace the KNN section
    pub fn with_knn(mut self, knn: KnnConfig) -> Self {
        self.knn = knn;
        self
    }

    /// Replace the kernel section
    pub fn with_kernel(mut self, kernel: KernelConfig) -> Self {
        self.kernel = kernel;
        self
    }

    /// Validate every section
    pub fn validate(&self) -> CoreResult<()> {
        self.path_loss.validate()?;
        self.environment.validate()?;
        self.smoother.validate()?;
        self.trilateration.validate()?;
        self.knn.validate()?;
        self.kernel.validate()?;
        self.track.validate()?;
        self.fingerprint.validate()
    }

    /// Parse and validate JSON
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        log::info!("loading locator config from {}", path.as_ref().display());
        Self::from_json_str(&raw)
    }
}
