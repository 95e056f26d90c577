// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Neuroweave Structures

Foundation types for the neuroweave connectivity engine:

- Identity newtypes (`NodeId`, `HostId`, `GroupId`)
- Node populations: contiguous ranges (`NodeSequence`) and explicit id lists,
  unified behind the `Population` variant
- The node-group registry (`NodeGroup`, `NodeGroupIndex`) mapping global ids
  onto heterogeneous populations sharing one flat id space
- Declarative connection descriptors (`ConnSpec`, `SynSpec`)
- The `Edge` unit produced by connection generation
- The error taxonomy shared by every layer (`WeaveError`)

No algorithms live here; the generation kernels are in `neuroweave-engine`
and the cross-host coordination in `neuroweave-cluster`.
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod edge;
pub mod error;
pub mod group;
pub mod ids;
pub mod sequence;
pub mod spec;

pub use edge::Edge;
pub use error::{ErrorPolicy, ErrorSlot, LastError, WeaveError, WeaveResult};
pub use group::{NodeGroup, NodeGroupIndex, ParamStore};
pub use ids::{GroupId, HostId, NodeId};
pub use sequence::{NodeSequence, Population};
pub use spec::{ConnRule, ConnSpec, SynSpec, ValueSpec};
