use fieldsim::causal::{
    compute_feedback, mean_min_distance, CausalEngine, CausalLoop, CausalSettings, ANOMALY_CAP,
    ANOMALY_FLOOR, SEED_LOOP_COUNT, STRENGTH_MAX, STRENGTH_MIN,
};
use fieldsim::engine::{EngineConfig, FieldEngine, SubsystemOutcome};
use fieldsim::geometry::Vec3;
use fieldsim::lattice::{LatticeSettings, TemporalLattice, COHERENCE_FLOOR};
use fieldsim::params::{FieldParameters, FrameClock};
use fieldsim::population::IdAllocator;
use fieldsim::prng::Prng;
use fieldsim::resonance::{ResonanceNetwork, ResonanceSettings};

const DT: f32 = 1.0 / 60.0;

fn clock(frame: u64) -> FrameClock {
    FrameClock::at_frame(frame, DT).unwrap()
}

#[test]
fn scenario_a_seeded_loops_stay_bounded() {
    let settings = CausalSettings::default().with_retrocausal_strength(0.4);
    let mut causal = CausalEngine::new(settings, Prng::new(100)).unwrap();
    let params = FieldParameters::default();

    let mut last = None;
    for f in 1..=100 {
        last = Some(causal.update(clock(f), &params).unwrap());
    }
    let agg = last.unwrap();
    assert_eq!(agg.loop_count, SEED_LOOP_COUNT);
    let avg = agg.average_strength.unwrap();
    assert!((STRENGTH_MIN..=STRENGTH_MAX).contains(&avg));
    assert_eq!(agg.feedback_matrix.size(), SEED_LOOP_COUNT);
    for i in 0..SEED_LOOP_COUNT {
        for j in 0..SEED_LOOP_COUNT {
            assert!(agg.feedback_matrix.get(i, j).is_finite());
        }
    }
}

#[test]
fn scenario_b_anomalies_churn_under_cap() {
    let settings = CausalSettings::default().with_anomaly_density(1.0);
    let mut causal = CausalEngine::new(settings, Prng::new(200)).unwrap();
    // Weak torsion keeps anomaly lifetimes well inside the run.
    let params = FieldParameters::default().with_em_field_torsion(0.02);

    let (mut spawned, mut expired) = (0, 0);
    for f in 1..=500 {
        let agg = causal.update(clock(f), &params).unwrap();
        assert!(agg.anomaly_count <= ANOMALY_CAP);
        spawned += agg.anomalies_spawned;
        expired += agg.anomalies_expired;
        for a in causal.anomalies().iter() {
            assert!(a.intensity >= ANOMALY_FLOOR);
        }
    }
    assert!(spawned >= 1);
    assert!(expired >= 1);
}

#[test]
fn scenario_c_no_branching_keeps_one_timeline() {
    let settings = LatticeSettings::default().with_branching_probability(0.0);
    let mut lattice = TemporalLattice::new(settings, Prng::new(300)).unwrap();
    let params = FieldParameters::default().with_energy_density(2.0);

    for f in 1..=1000 {
        let frame = lattice.update(clock(f), &params).unwrap();
        assert_eq!(frame.timeline_count, 1);
        assert!(frame.mean_coherence.unwrap() >= COHERENCE_FLOOR);
    }
    assert_eq!(lattice.timelines().len(), 1);
}

#[test]
fn scenario_d_connection_by_distance() {
    let net = ResonanceNetwork::from_positions(
        ResonanceSettings::default(),
        Prng::new(400),
        &[
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 6.0, 1.0),
            Vec3::new(1.0, 1.0, 8.0),
        ],
    );
    let ids: Vec<_> = net.roots().iter().map(|r| r.id).collect();
    assert!(net.is_connected(ids[0], ids[1]));
    assert!(!net.is_connected(ids[0], ids[2]));
}

#[test]
fn feedback_is_asymmetric_with_one_sided_outlier() {
    let a: Vec<Vec3> = (0..8).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
    let mut b: Vec<Vec3> = (0..8).map(|i| Vec3::new(i as f32, 0.5, 0.0)).collect();
    b.push(Vec3::new(0.0, 40.0, 0.0));

    let ab = mean_min_distance(&a, &b).unwrap();
    let ba = mean_min_distance(&b, &a).unwrap();
    assert!(ba > ab);

    let mut ids = IdAllocator::new();
    let loops: Vec<CausalLoop> = [a, b]
        .into_iter()
        .map(|path| CausalLoop {
            id: ids.next_id(),
            path,
            strength: 0.8,
            phase: 0.0,
            retrocausal_factor: 0.5,
            echo_depth: 1,
            created_at: 0.0,
        })
        .collect();
    let m = compute_feedback(&loops, 0.4);
    assert_ne!(m.get(0, 1), m.get(1, 0));
}

#[test]
fn engine_rejects_only_the_bad_subsystem() {
    let mut engine = FieldEngine::new(EngineConfig::default().with_seed(500)).unwrap();
    let good = FieldParameters::default();
    for f in 1..=10 {
        engine.tick(clock(f), &good);
    }
    let loops_before = engine.causal().loops().to_vec();

    let bad = good.with_em_field_torsion(-1.0);
    let report = engine.tick(clock(11), &bad);
    assert!(report.causal.is_rejected());
    assert!(matches!(report.lattice, SubsystemOutcome::Updated(_)));
    assert_eq!(engine.causal().loops(), loops_before.as_slice());
    assert_eq!(engine.causal().frames(), 10);

    let report = engine.tick(clock(12), &good);
    assert!(report.first_error().is_none());
    assert_eq!(engine.causal().frames(), 11);
}

#[test]
fn degenerate_loop_sets_yield_zero_matrix() {
    let mut ids = IdAllocator::new();
    let single = vec![CausalLoop {
        id: ids.next_id(),
        path: vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
        strength: 0.5,
        phase: 0.0,
        retrocausal_factor: 1.0,
        echo_depth: 2,
        created_at: 0.0,
    }];
    assert!(compute_feedback(&[], 1.0).is_zero());
    let m = compute_feedback(&single, 1.0);
    assert_eq!(m.size(), 1);
    assert!(m.is_zero());
}
