// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Neuroweave Cluster

Distributed assembly across hosts:

- `HostPartition` — contiguous ownership ranges tiling the global id space
- `ClusterTransport` — blocking, bounded host-to-host messaging, with an
  in-memory implementation for single-process multi-host runs and tests
- `RemoteConnectionCoordinator` — the cross-host counterparts of every
  connection rule plus the per-step spike exchange

The coordination discipline is SPMD: every host executes the same build
script; the host owning the sources of a cross-host call generates the
edges and ships them to the host owning the targets, and each host retains
only the incoming tables of the nodes it owns.
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod coordinator;
pub mod partition;
pub mod transport;

pub use coordinator::{RemoteConnectionCoordinator, SpikeEvent};
pub use partition::HostPartition;
pub use transport::{ClusterMessage, ClusterTransport, InMemoryCluster};
