// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Declarative connection descriptors.
//!
//! `ConnSpec` names the topology rule, `SynSpec` the per-edge synapse
//! parameters. Both are pure value objects: validated at construction for
//! structural consistency, and re-validated by the engine against the
//! concrete population sizes of each connect call.

use crate::error::{WeaveError, WeaveResult};
use serde::{Deserialize, Serialize};

/// Connection topology rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ConnRule {
    OneToOne,
    AllToAll,
    FixedTotalNumber { n: u64 },
    FixedIndegree { k: u32 },
    FixedOutdegree { k: u32 },
}

impl ConnRule {
    pub fn name(&self) -> &'static str {
        match self {
            ConnRule::OneToOne => "one_to_one",
            ConnRule::AllToAll => "all_to_all",
            ConnRule::FixedTotalNumber { .. } => "fixed_total_number",
            ConnRule::FixedIndegree { .. } => "fixed_indegree",
            ConnRule::FixedOutdegree { .. } => "fixed_outdegree",
        }
    }
}

/// Validated connection rule descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnSpec {
    pub rule: ConnRule,
    pub allow_autapses: bool,
    pub allow_multapses: bool,
}

impl ConnSpec {
    /// Build a descriptor with the original's defaults: autapses and
    /// multapses allowed.
    pub fn new(rule: ConnRule) -> Self {
        Self {
            rule,
            allow_autapses: true,
            allow_multapses: true,
        }
    }

    pub fn autapses(mut self, allow: bool) -> Self {
        self.allow_autapses = allow;
        self
    }

    pub fn multapses(mut self, allow: bool) -> Self {
        self.allow_multapses = allow;
        self
    }
}

/// Per-edge scalar: a constant, a pre-drawn array, or a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSpec {
    Constant { value: f32 },
    /// Pre-drawn per-edge values; length must equal the edge count of the
    /// call it is used in.
    Array { values: Vec<f32> },
    Normal { mean: f32, stddev: f32 },
    NormalClipped {
        mean: f32,
        stddev: f32,
        min: f32,
        max: f32,
    },
}

impl ValueSpec {
    pub fn constant(value: f32) -> Self {
        ValueSpec::Constant { value }
    }

    fn validate(&self, what: &str) -> WeaveResult<()> {
        match self {
            ValueSpec::Constant { value } => {
                if !value.is_finite() {
                    return Err(WeaveError::Config(format!("{what} must be finite")));
                }
            }
            ValueSpec::Array { values } => {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(WeaveError::Config(format!(
                        "{what} array contains a non-finite value"
                    )));
                }
            }
            ValueSpec::Normal { stddev, .. } => {
                if *stddev < 0.0 {
                    return Err(WeaveError::Config(format!(
                        "{what} stddev cannot be negative"
                    )));
                }
            }
            ValueSpec::NormalClipped {
                stddev, min, max, ..
            } => {
                if *stddev < 0.0 {
                    return Err(WeaveError::Config(format!(
                        "{what} stddev cannot be negative"
                    )));
                }
                if min > max {
                    return Err(WeaveError::Config(format!(
                        "{what} clip range inverted ({min} > {max})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Synapse parameter descriptor: receptor port plus weight/delay sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynSpec {
    pub port: u8,
    pub weight: ValueSpec,
    pub delay: ValueSpec,
}

impl SynSpec {
    pub fn new(port: u8, weight: ValueSpec, delay: ValueSpec) -> WeaveResult<Self> {
        let spec = Self {
            port,
            weight,
            delay,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Constant weight and delay on port 0.
    pub fn constant(weight: f32, delay: f32) -> WeaveResult<Self> {
        Self::new(0, ValueSpec::constant(weight), ValueSpec::constant(delay))
    }

    pub fn validate(&self) -> WeaveResult<()> {
        self.weight.validate("weight")?;
        self.delay.validate("delay")?;
        // A zero or negative constant delay cannot be scheduled.
        if let ValueSpec::Constant { value } = self.delay {
            if value <= 0.0 {
                return Err(WeaveError::Config(format!(
                    "delay must be positive (got {value})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_autapses_and_multapses() {
        let spec = ConnSpec::new(ConnRule::AllToAll);
        assert!(spec.allow_autapses);
        assert!(spec.allow_multapses);
        let spec = spec.autapses(false).multapses(false);
        assert!(!spec.allow_autapses);
        assert!(!spec.allow_multapses);
    }

    #[test]
    fn syn_spec_rejects_nonpositive_delay() {
        assert!(SynSpec::constant(1.0, 0.0).is_err());
        assert!(SynSpec::constant(1.0, -1.0).is_err());
        assert!(SynSpec::constant(1.0, 0.1).is_ok());
    }

    #[test]
    fn syn_spec_rejects_inverted_clip_range() {
        let err = SynSpec::new(
            0,
            ValueSpec::NormalClipped {
                mean: 0.0,
                stddev: 1.0,
                min: 2.0,
                max: -2.0,
            },
            ValueSpec::constant(1.0),
        )
        .unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
    }

    #[test]
    fn syn_spec_rejects_negative_stddev() {
        assert!(SynSpec::new(
            0,
            ValueSpec::Normal {
                mean: 0.0,
                stddev: -0.5
            },
            ValueSpec::constant(1.0),
        )
        .is_err());
    }
}
