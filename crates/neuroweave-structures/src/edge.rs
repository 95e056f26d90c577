// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The unit produced by connection generation.

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};

/// One directed synaptic connection.
///
/// Edges are staged into flat slabs during network construction and folded
/// into per-target tables at calibration; they are not retained as
/// individual objects afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub port: u8,
    pub weight: f32,
    pub delay: f32,
}
