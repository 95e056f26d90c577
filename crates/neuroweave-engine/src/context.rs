// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The owned simulation context.
//!
//! One explicit object carries what the original simulator kept as global
//! mutable state: the node-group registry, the staged edge slab, the
//! calibration flag and the last-error slot. Structural mutation is only
//! legal while `Uncalibrated`; `calibrate()` freezes the registry and folds
//! the staged edges into per-target tables; the first step enters
//! `Simulating`; `finalize()` releases everything.

use crate::config::EngineConfig;
use crate::engine::ConnectionEngine;
use crate::tables::IncomingTables;
use neuroweave_structures::{
    ConnRule, ConnSpec, Edge, ErrorPolicy, ErrorSlot, LastError, NodeGroup, NodeGroupIndex,
    NodeId, NodeSequence, Population, SynSpec, ValueSpec, WeaveError, WeaveResult,
};
use std::time::Instant;
use tracing::info;

/// Lifecycle of one network build + run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uncalibrated = 0,
    Calibrated = 1,
    Simulating = 2,
    Finalized = 3,
}

/// Owned simulation state: group registry, engine, staged edges, lifecycle.
pub struct SimulationContext {
    config: EngineConfig,
    index: NodeGroupIndex,
    engine: ConnectionEngine,
    staged: Vec<Edge>,
    tables: Option<IncomingTables>,
    state: LifecycleState,
    call_counter: u64,
    neural_time: f64,
    build_real_time: Option<f64>,
    errors: ErrorSlot,
}

impl SimulationContext {
    pub fn new(config: EngineConfig) -> WeaveResult<Self> {
        config.validate()?;
        let engine = ConnectionEngine::new(config.seed, config.scan_capacity);
        Ok(Self {
            config,
            index: NodeGroupIndex::new(),
            engine,
            staged: Vec::new(),
            tables: None,
            state: LifecycleState::Uncalibrated,
            call_counter: 0,
            neural_time: 0.0,
            build_real_time: None,
            errors: ErrorSlot::new(ErrorPolicy::Report),
        })
    }

    pub fn with_defaults() -> WeaveResult<Self> {
        Self::new(EngineConfig::default())
    }

    // --- accessors -------------------------------------------------------

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &NodeGroupIndex {
        &self.index
    }

    pub fn tables(&self) -> Option<&IncomingTables> {
        self.tables.as_ref()
    }

    pub fn time_resolution(&self) -> f32 {
        self.config.time_resolution
    }

    pub fn neural_time(&self) -> f64 {
        self.neural_time
    }

    /// Wall-clock seconds spent in `calibrate()`, once calibrated.
    pub fn build_real_time(&self) -> Option<f64> {
        self.build_real_time
    }

    pub fn staged_edge_count(&self) -> usize {
        self.staged.len()
    }

    pub fn last_error(&self) -> LastError {
        self.errors.last()
    }

    pub fn set_error_policy(&self, policy: ErrorPolicy) {
        self.errors.set_policy(policy);
    }

    /// Record a failure raised by a layer above (the cluster coordinator)
    /// into this context's last-error slot, applying the error policy.
    pub fn record_error(&self, err: WeaveError) -> WeaveError {
        self.errors.record(err)
    }

    /// Connect-sequence numbers handed out so far.
    pub fn calls_issued(&self) -> u64 {
        self.call_counter
    }

    fn fail<T>(&self, err: WeaveError) -> WeaveResult<T> {
        Err(self.errors.record(err))
    }

    fn check_uncalibrated(&self, what: &str) -> WeaveResult<()> {
        if self.state != LifecycleState::Uncalibrated {
            return Err(WeaveError::State(format!(
                "{what} is only permitted before calibration (state {:?})",
                self.state
            )));
        }
        Ok(())
    }

    // --- construction ----------------------------------------------------

    /// Create a homogeneous node population, registering it into the global
    /// id space.
    pub fn create_group(
        &mut self,
        model: impl Into<String>,
        n_nodes: u32,
        n_ports: u8,
    ) -> WeaveResult<NodeSequence> {
        if let Err(e) = self.check_uncalibrated("create_group") {
            return self.fail(e);
        }
        let group = NodeGroup::new(model, n_nodes, n_ports, 0);
        match self.index.register(group) {
            Ok(seq) => Ok(seq),
            Err(e) => self.fail(e),
        }
    }

    /// Re-seed every derived stream. Only meaningful before any edges are
    /// generated; rejected once calibrated.
    pub fn set_seed(&mut self, seed: u64) -> WeaveResult<()> {
        if let Err(e) = self.check_uncalibrated("set_seed") {
            return self.fail(e);
        }
        self.engine.reseed(seed);
        Ok(())
    }

    /// Connect two populations, staging the generated edges locally.
    /// Returns the number of edges created.
    pub fn connect(
        &mut self,
        source: impl Into<Population>,
        target: impl Into<Population>,
        conn: &ConnSpec,
        syn: &SynSpec,
    ) -> WeaveResult<usize> {
        let edges = self.generate_edges(&source.into(), &target.into(), conn, syn)?;
        let n = edges.len();
        self.staged.extend(edges);
        Ok(n)
    }

    /// Single-edge convenience form.
    pub fn connect_one(
        &mut self,
        source: NodeId,
        target: NodeId,
        port: u8,
        weight: f32,
        delay: f32,
    ) -> WeaveResult<usize> {
        let syn = match SynSpec::new(port, ValueSpec::constant(weight), ValueSpec::constant(delay))
        {
            Ok(syn) => syn,
            Err(e) => return self.fail(e),
        };
        self.connect(
            NodeSequence::new(source, 1),
            NodeSequence::new(target, 1),
            &ConnSpec::new(ConnRule::OneToOne),
            &syn,
        )
    }

    /// Generate edges for one call without staging them. The cluster
    /// coordinator uses this on the generating host; the edges are shipped
    /// to the owner instead of staged here.
    pub fn generate_edges(
        &mut self,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        syn: &SynSpec,
    ) -> WeaveResult<Vec<Edge>> {
        if let Err(e) = self.check_uncalibrated("connect") {
            return self.fail(e);
        }
        let call = self.next_call();
        match self
            .engine
            .generate(&self.index, source, target, conn, syn, call)
        {
            Ok(edges) => Ok(edges),
            Err(e) => self.fail(e),
        }
    }

    /// Stage externally generated edges (received from a peer host).
    pub fn stage_edges(&mut self, edges: Vec<Edge>) -> WeaveResult<()> {
        if let Err(e) = self.check_uncalibrated("stage_edges") {
            return self.fail(e);
        }
        self.staged.extend(edges);
        Ok(())
    }

    /// Advance the connect-sequence counter without generating. Keeps the
    /// numbering aligned across hosts for calls this host takes no part in.
    pub fn skip_call(&mut self) -> WeaveResult<()> {
        if let Err(e) = self.check_uncalibrated("connect") {
            return self.fail(e);
        }
        self.next_call();
        Ok(())
    }

    fn next_call(&mut self) -> u64 {
        let call = self.call_counter;
        self.call_counter += 1;
        call
    }

    // --- lifecycle -------------------------------------------------------

    /// Freeze the registry and fold the staged edges into per-target
    /// incoming tables for the block `[base, base + n_targets)`.
    ///
    /// Single-host runs pass the whole id space; the cluster coordinator
    /// passes the locally owned block.
    pub fn calibrate_block(&mut self, base: u32, n_targets: u32) -> WeaveResult<()> {
        if let Err(e) = self.check_uncalibrated("calibrate") {
            return self.fail(e);
        }
        let started = Instant::now();
        self.index.freeze();
        let tables =
            match IncomingTables::build(self.engine.scan_mut(), &self.staged, base, n_targets) {
                Ok(t) => t,
                Err(e) => return self.fail(e),
            };
        let elapsed = started.elapsed().as_secs_f64();
        info!(
            target: "neuroweave-engine",
            edges = tables.edge_count(),
            targets = n_targets,
            build_seconds = elapsed,
            "calibrated"
        );
        self.staged = Vec::new();
        self.tables = Some(tables);
        self.build_real_time = Some(elapsed);
        self.state = LifecycleState::Calibrated;
        Ok(())
    }

    /// Calibrate over the entire registered id space.
    pub fn calibrate(&mut self) -> WeaveResult<()> {
        let total = self.index.total_nodes();
        self.calibrate_block(0, total)
    }

    /// Advance simulated time by one step. Enters `Simulating` on the first
    /// call; connectivity is structurally immutable from then on.
    pub fn advance_step(&mut self) -> WeaveResult<()> {
        match self.state {
            LifecycleState::Calibrated => self.state = LifecycleState::Simulating,
            LifecycleState::Simulating => {}
            _ => {
                return self.fail(WeaveError::State(format!(
                    "cannot step in state {:?}",
                    self.state
                )))
            }
        }
        self.neural_time += f64::from(self.config.time_resolution);
        Ok(())
    }

    /// Release tables and refuse all further operations.
    pub fn finalize(&mut self) -> WeaveResult<()> {
        if self.state == LifecycleState::Finalized {
            return self.fail(WeaveError::State("already finalized".into()));
        }
        self.tables = None;
        self.staged = Vec::new();
        self.state = LifecycleState::Finalized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_groups() -> (SimulationContext, NodeSequence, NodeSequence) {
        let mut ctx = SimulationContext::with_defaults().unwrap();
        let a = ctx.create_group("iaf_psc_exp", 5, 1).unwrap();
        let b = ctx.create_group("aeif_cond_beta", 5, 2).unwrap();
        (ctx, a, b)
    }

    #[test]
    fn connect_then_calibrate_builds_tables() {
        let (mut ctx, a, b) = two_groups();
        let n = ctx
            .connect(
                a,
                b,
                &ConnSpec::new(ConnRule::OneToOne),
                &SynSpec::constant(0.5, 1.0).unwrap(),
            )
            .unwrap();
        assert_eq!(n, 5);
        ctx.calibrate().unwrap();
        assert_eq!(ctx.state(), LifecycleState::Calibrated);
        let tables = ctx.tables().unwrap();
        assert_eq!(tables.edge_count(), 5);
        assert_eq!(
            tables.incoming(b.start()).unwrap().sources,
            &[a.start()]
        );
    }

    #[test]
    fn connect_after_calibrate_is_rejected_and_tables_survive() {
        let (mut ctx, a, b) = two_groups();
        ctx.connect(
            a,
            b,
            &ConnSpec::new(ConnRule::OneToOne),
            &SynSpec::constant(0.5, 1.0).unwrap(),
        )
        .unwrap();
        ctx.calibrate().unwrap();

        let err = ctx
            .connect(
                a,
                b,
                &ConnSpec::new(ConnRule::AllToAll),
                &SynSpec::constant(0.5, 1.0).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, WeaveError::State(_)));
        assert_eq!(ctx.last_error().code, 6);
        // idempotent rejection: the calibrated tables are unchanged
        assert_eq!(ctx.tables().unwrap().edge_count(), 5);
    }

    #[test]
    fn create_group_after_calibrate_is_rejected() {
        let (mut ctx, _, _) = two_groups();
        ctx.calibrate().unwrap();
        assert!(ctx.create_group("iaf_psc_exp", 3, 1).is_err());
    }

    #[test]
    fn stepping_enters_simulating_and_advances_time() {
        let (mut ctx, _, _) = two_groups();
        ctx.calibrate().unwrap();
        ctx.advance_step().unwrap();
        assert_eq!(ctx.state(), LifecycleState::Simulating);
        ctx.advance_step().unwrap();
        let expected = 2.0 * f64::from(ctx.time_resolution());
        assert!((ctx.neural_time() - expected).abs() < 1e-9);
    }

    #[test]
    fn finalize_releases_everything() {
        let (mut ctx, _, _) = two_groups();
        ctx.calibrate().unwrap();
        ctx.finalize().unwrap();
        assert!(ctx.tables().is_none());
        assert!(ctx.advance_step().is_err());
        assert!(ctx.finalize().is_err());
    }

    #[test]
    fn stepping_before_calibration_is_a_state_error() {
        let (mut ctx, _, _) = two_groups();
        assert!(matches!(
            ctx.advance_step(),
            Err(WeaveError::State(_))
        ));
    }

    #[test]
    fn connect_one_stages_a_single_edge() {
        let (mut ctx, a, b) = two_groups();
        let n = ctx
            .connect_one(a.start(), b.start(), 1, 0.25, 2.0)
            .unwrap();
        assert_eq!(n, 1);
        ctx.calibrate().unwrap();
        let incoming = ctx.tables().unwrap().incoming(b.start()).unwrap();
        assert_eq!(incoming.sources, &[a.start()]);
        assert_eq!(incoming.ports, &[1]);
        assert_eq!(incoming.weights, &[0.25]);
    }
}
