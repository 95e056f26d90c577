// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! TOML-based with serde defaults, so a partial file (or none at all) is
//! always valid. The buffer capacities are fixed at calibration time and
//! never grow during a run; undersizing them is a fatal capacity error at
//! the point of overflow, not a silent reallocation.

use neuroweave_structures::{WeaveError, WeaveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base seed for every derived random stream.
    pub seed: u64,
    /// Simulation time resolution in ms.
    pub time_resolution: f32,
    /// Maximum prefix-scan input length (worker count per connect call and
    /// table block size share this bound).
    pub scan_capacity: usize,
    pub buffers: BufferConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            time_resolution: 0.1,
            scan_capacity: 1 << 20,
            buffers: BufferConfig::default(),
        }
    }
}

/// Fixed spike-exchange buffer capacities.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Depth of each host-to-host exchange buffer, in messages per link.
    pub max_spike_buffer_size: usize,
    /// Total spikes admitted per time step.
    pub max_spike_num: usize,
    /// Spikes shipped to any single peer host per time step.
    pub max_spike_per_host: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_spike_buffer_size: 128,
            max_spike_num: 1 << 16,
            max_spike_per_host: 1 << 16,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> WeaveResult<Self> {
        let config: EngineConfig = toml::from_str(text)
            .map_err(|e| WeaveError::Config(format!("invalid config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, the `NEUROWEAVE_CONFIG_PATH` environment
    /// variable, or `./neuroweave.toml`; defaults if nothing is found.
    pub fn load(path: Option<&Path>) -> WeaveResult<Self> {
        let candidate: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var("NEUROWEAVE_CONFIG_PATH")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    let local = PathBuf::from("neuroweave.toml");
                    local.exists().then_some(local)
                }),
        };
        match candidate {
            Some(p) => {
                let text = std::fs::read_to_string(&p).map_err(|e| {
                    WeaveError::Config(format!("cannot read config {}: {e}", p.display()))
                })?;
                Self::from_toml_str(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> WeaveResult<()> {
        if self.time_resolution <= 0.0 {
            return Err(WeaveError::Config(format!(
                "time_resolution must be positive (got {})",
                self.time_resolution
            )));
        }
        if self.scan_capacity == 0 {
            return Err(WeaveError::Config("scan_capacity must be non-zero".into()));
        }
        if self.buffers.max_spike_num == 0 || self.buffers.max_spike_per_host == 0 {
            return Err(WeaveError::Config(
                "spike buffer capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
