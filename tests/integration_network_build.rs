// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
End-to-end workspace tests: build a network through the umbrella crate,
single-host and two-host, and check the full lifecycle.
*/

use neuroweave::prelude::*;
use neuroweave::{ErrorPolicy, WeaveError};

#[test]
fn single_host_lifecycle_end_to_end() {
    let mut ctx = SimulationContext::with_defaults().unwrap();
    ctx.set_error_policy(ErrorPolicy::Report);

    let excitatory = ctx.create_group("iaf_psc_exp", 80, 1).unwrap();
    let inhibitory = ctx.create_group("iaf_psc_exp", 20, 1).unwrap();

    let syn_ex = SynSpec::new(
        0,
        ValueSpec::Normal {
            mean: 0.4,
            stddev: 0.1,
        },
        ValueSpec::constant(1.5),
    )
    .unwrap();
    let syn_in = SynSpec::new(
        0,
        ValueSpec::NormalClipped {
            mean: -1.0,
            stddev: 0.3,
            min: -2.0,
            max: 0.0,
        },
        ValueSpec::constant(0.8),
    )
    .unwrap();

    let n_ex = ctx
        .connect(
            excitatory,
            inhibitory,
            &ConnSpec::new(ConnRule::FixedIndegree { k: 8 }).multapses(false),
            &syn_ex,
        )
        .unwrap();
    assert_eq!(n_ex, 8 * 20);

    let n_in = ctx
        .connect(
            inhibitory,
            excitatory,
            &ConnSpec::new(ConnRule::FixedOutdegree { k: 5 }).multapses(false),
            &syn_in,
        )
        .unwrap();
    assert_eq!(n_in, 5 * 20);

    // recurrent, no self-loops
    let n_rec = ctx
        .connect(
            excitatory,
            excitatory,
            &ConnSpec::new(ConnRule::FixedTotalNumber { n: 300 })
                .autapses(false)
                .multapses(false),
            &syn_ex,
        )
        .unwrap();
    assert_eq!(n_rec, 300);

    ctx.calibrate().unwrap();
    assert_eq!(ctx.state(), LifecycleState::Calibrated);
    assert!(ctx.build_real_time().is_some());

    let tables = ctx.tables().unwrap();
    assert_eq!(tables.edge_count(), 160 + 100 + 300);
    for t in inhibitory.iter() {
        let incoming = tables.incoming(t).unwrap();
        assert_eq!(incoming.sources.len(), 8);
        // inhibitory weights were clipped to [-2, 0]; these are excitatory
        assert!(incoming.delays.iter().all(|&d| d == 1.5));
    }

    // inhibitory weights land in the clip range
    let mut inhibitory_edges = 0;
    for t in excitatory.iter() {
        let incoming = tables.incoming(t).unwrap();
        for (s, w) in incoming.sources.iter().zip(incoming.weights) {
            if inhibitory.contains(*s) {
                assert!((-2.0..=0.0).contains(w));
                inhibitory_edges += 1;
            }
        }
    }
    assert_eq!(inhibitory_edges, 100);

    ctx.advance_step().unwrap();
    assert_eq!(ctx.state(), LifecycleState::Simulating);
    ctx.finalize().unwrap();
    assert_eq!(ctx.state(), LifecycleState::Finalized);
}

#[test]
fn two_host_build_matches_single_host_topology_counts() {
    let partition = HostPartition::from_ranges(
        2,
        &[
            (HostId(0), NodeSequence::new(NodeId(0), 30)),
            (HostId(1), NodeSequence::new(NodeId(30), 30)),
        ],
    )
    .unwrap();

    let depth = EngineConfig::default().buffers.max_spike_buffer_size;
    let mut hub = InMemoryCluster::hub(2, depth);
    let t1 = hub.pop().unwrap();
    let t0 = hub.pop().unwrap();

    let script = |transport: InMemoryCluster, partition: HostPartition| {
        let mut ctx = SimulationContext::with_defaults().unwrap();
        let a = ctx.create_group("iaf_psc_exp", 30, 1).unwrap();
        let b = ctx.create_group("iaf_psc_exp", 30, 1).unwrap();
        let mut coord = RemoteConnectionCoordinator::new(ctx, partition, transport).unwrap();
        let syn = SynSpec::constant(1.0, 1.0).unwrap();
        let shipped = coord
            .remote_connect(
                HostId(0),
                a,
                HostId(1),
                b,
                &ConnSpec::new(ConnRule::FixedOutdegree { k: 4 }).multapses(false),
                &syn,
            )
            .unwrap();
        coord.calibrate().unwrap();
        (coord, shipped)
    };

    std::thread::scope(|scope| {
        let p0 = partition.clone();
        let p1 = partition.clone();
        let h0 = scope.spawn(move || script(t0, p0));
        let h1 = scope.spawn(move || script(t1, p1));

        let (c0, shipped0) = h0.join().unwrap();
        let (c1, shipped1) = h1.join().unwrap();

        // both sides agree on the edge count: 30 sources x 4
        assert_eq!(shipped0, 120);
        assert_eq!(shipped1, 120);

        // the source host retains nothing, the owner holds every edge
        assert_eq!(c0.ctx().tables().unwrap().edge_count(), 0);
        assert_eq!(c1.ctx().tables().unwrap().edge_count(), 120);
    });
}

#[test]
fn error_slot_reflects_the_last_failure() {
    let mut ctx = SimulationContext::with_defaults().unwrap();
    let a = ctx.create_group("iaf_psc_exp", 5, 1).unwrap();
    ctx.calibrate().unwrap();

    let err = ctx
        .connect(
            a,
            a,
            &ConnSpec::new(ConnRule::AllToAll),
            &SynSpec::constant(1.0, 1.0).unwrap(),
        )
        .unwrap_err();
    assert!(matches!(err, WeaveError::State(_)));

    let last = ctx.last_error();
    assert!(last.flag);
    assert_eq!(last.code, err.code());
    assert!(last.message.contains("calibration"));
}
