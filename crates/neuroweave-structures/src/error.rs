// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by every neuroweave layer.
//!
//! Every fallible operation returns `WeaveResult<T>`; nothing is silently
//! clamped or corrected. Each variant carries a stable numeric code so the
//! last-error slot can be inspected from bindings that only see integers.

use crate::ids::{HostId, NodeId};
use parking_lot::Mutex;

/// Result type for neuroweave operations
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Errors that can occur while building or running a network
#[derive(Debug, Clone, thiserror::Error)]
pub enum WeaveError {
    #[error("range error: {0}")]
    Range(String),

    #[error("node {0} is not registered in any group")]
    Lookup(NodeId),

    #[error("config error: {0}")]
    Config(String),

    #[error("node {node} is not owned by host {host}")]
    Ownership { node: NodeId, host: HostId },

    #[error("capacity exceeded: {what} needs {needed}, capacity is {capacity}")]
    Capacity {
        what: &'static str,
        needed: usize,
        capacity: usize,
    },

    #[error("state error: {0}")]
    State(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl WeaveError {
    /// Stable numeric code for the last-error slot.
    pub fn code(&self) -> u8 {
        match self {
            WeaveError::Range(_) => 1,
            WeaveError::Lookup(_) => 2,
            WeaveError::Config(_) => 3,
            WeaveError::Ownership { .. } => 4,
            WeaveError::Capacity { .. } => 5,
            WeaveError::State(_) => 6,
            WeaveError::Transport(_) => 7,
        }
    }
}

/// What to do when an operation fails: abort the process or hand the error
/// back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    Abort,
    #[default]
    Report,
}

/// Snapshot of the most recent failure.
#[derive(Debug, Clone, Default)]
pub struct LastError {
    pub flag: bool,
    pub message: String,
    pub code: u8,
}

/// Process-wide last-error slot.
///
/// Set on every recorded failure; `take` clears the flag but keeps the
/// message for post-mortem inspection.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    inner: Mutex<LastError>,
    policy: Mutex<ErrorPolicy>,
}

impl ErrorSlot {
    pub fn new(policy: ErrorPolicy) -> Self {
        Self {
            inner: Mutex::new(LastError::default()),
            policy: Mutex::new(policy),
        }
    }

    pub fn set_policy(&self, policy: ErrorPolicy) {
        *self.policy.lock() = policy;
    }

    pub fn policy(&self) -> ErrorPolicy {
        *self.policy.lock()
    }

    /// Record a failure and apply the configured policy. Under
    /// `ErrorPolicy::Abort` this does not return.
    pub fn record(&self, err: WeaveError) -> WeaveError {
        {
            let mut slot = self.inner.lock();
            slot.flag = true;
            slot.message = err.to_string();
            slot.code = err.code();
        }
        if self.policy() == ErrorPolicy::Abort {
            eprintln!("neuroweave: fatal: {err}");
            std::process::abort();
        }
        err
    }

    pub fn last(&self) -> LastError {
        self.inner.lock().clone()
    }

    /// Clear the flag, returning the previous snapshot.
    pub fn take(&self) -> LastError {
        let mut slot = self.inner.lock();
        let prev = slot.clone();
        slot.flag = false;
        prev
    }
}
