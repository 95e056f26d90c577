// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Neuroweave - Distributed Connectivity Construction
//!
//! Neuroweave turns declarative connection rules into concrete directed
//! synaptic edges across massively parallel node populations, on one host
//! or across many. It is the network-assembly core of a spiking-network
//! simulator: neuron dynamics, recording and I/O live elsewhere and consume
//! the tables this crate builds.
//!
//! ## Quick Start
//!
//! ```rust
//! use neuroweave::prelude::*;
//!
//! # fn main() -> Result<(), neuroweave::WeaveError> {
//! let mut ctx = SimulationContext::with_defaults()?;
//! let sources = ctx.create_group("iaf_psc_exp", 100, 1)?;
//! let targets = ctx.create_group("aeif_cond_beta", 50, 2)?;
//!
//! let edges = ctx.connect(
//!     sources,
//!     targets,
//!     &ConnSpec::new(ConnRule::FixedIndegree { k: 10 }).multapses(false),
//!     &SynSpec::constant(0.5, 1.0)?,
//! )?;
//! assert_eq!(edges, 500);
//!
//! ctx.calibrate()?;
//! let incoming = ctx.tables().unwrap().incoming(targets.start())?;
//! assert_eq!(incoming.sources.len(), 10);
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! - [`neuroweave_structures`] - populations, group registry, specs, errors
//! - [`neuroweave_engine`] - prefix scan, stream-split RNG, rule kernels,
//!   lifecycle context
//! - [`neuroweave_cluster`] - host partitioning, remote connect, spike
//!   exchange
//!
//! Runs are reproducible: a fixed seed, fixed populations and fixed rule
//! parameters yield bit-identical edge sets regardless of worker
//! scheduling, on one host or many.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use neuroweave_cluster as cluster;
pub use neuroweave_engine as engine;
pub use neuroweave_structures as structures;

pub use neuroweave_cluster::{
    ClusterMessage, ClusterTransport, HostPartition, InMemoryCluster,
    RemoteConnectionCoordinator, SpikeEvent,
};
pub use neuroweave_engine::{
    BufferConfig, EngineConfig, IncomingTables, LifecycleState, PrefixScan, SimulationContext,
    StreamFamily,
};
pub use neuroweave_structures::{
    ConnRule, ConnSpec, Edge, ErrorPolicy, GroupId, HostId, NodeGroupIndex, NodeId, NodeSequence,
    Population, SynSpec, ValueSpec, WeaveError, WeaveResult,
};

/// The common imports for building networks.
pub mod prelude {
    pub use neuroweave_cluster::{
        HostPartition, InMemoryCluster, RemoteConnectionCoordinator, SpikeEvent,
    };
    pub use neuroweave_engine::{EngineConfig, LifecycleState, SimulationContext};
    pub use neuroweave_structures::{
        ConnRule, ConnSpec, HostId, NodeId, NodeSequence, Population, SynSpec, ValueSpec,
        WeaveResult,
    };
}
