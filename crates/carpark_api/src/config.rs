use std::path::{Path, PathBuf};

use anyhow::Context;
use carpark_core::ParkConfig;
use serde::{Deserialize, Serialize};

/// The car park configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarparkConfig {
    pub charging_points: Vec<String>,
    /// Total current available in Ampere
    pub max_current: u32,
    /// Fast charging current in Ampere
    pub high_current: u32,
    /// Slow charging current in Ampere
    pub low_current: u32,
    /// Directory holding `state.json`
    pub state_file_directory: PathBuf,
}

impl CarparkConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: CarparkConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config
            .park_config()
            .validate()
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn park_config(&self) -> ParkConfig {
        ParkConfig {
            names: self.charging_points.clone(),
            max_current: self.max_current,
            high_current: self.high_current,
            low_current: self.low_current,
        }
    }
}
