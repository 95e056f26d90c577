// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Neuroweave Engine

Single-host connection generation for large spiking networks:

- `PrefixScan` — fixed-capacity parallel exclusive scan, the one primitive
  that couples generation workers (counts in, write offsets out)
- `StreamFamily` — stream-split random service; every worker draws from its
  own deterministic stream, so results are independent of scheduling
- rule kernels for one-to-one, all-to-all, fixed-total-number,
  fixed-indegree and fixed-outdegree topologies
- `ConnectionEngine` — validation + generation over any combination of
  range/list populations
- `SimulationContext` — the owned lifecycle object
  (Uncalibrated → Calibrated → Simulating → Finalized) that replaces global
  simulator state
- `IncomingTables` — per-target SoA edge tables built at calibration

Cross-host coordination lives in `neuroweave-cluster`.
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod context;
pub mod engine;
pub mod rng;
pub mod rules;
pub mod scan;
pub mod tables;

pub use config::{BufferConfig, EngineConfig};
pub use context::{LifecycleState, SimulationContext};
pub use engine::ConnectionEngine;
pub use rng::{DrawStream, StreamDomain, StreamFamily};
pub use scan::{partition_mut, PrefixScan};
pub use tables::IncomingTables;
