use fieldsim::causal::{CausalEngine, CausalSettings, ANOMALY_CAP};
use fieldsim::error::FrameError;
use fieldsim::geometry::Vec3;
use fieldsim::lattice::{LatticeSettings, TemporalLattice};
use fieldsim::params::{FieldParameters, FrameClock};
use fieldsim::prng::Prng;
use fieldsim::resonance::{ResonanceNetwork, ResonanceSettings};

const DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone)]
struct AssayReport {
    seed: u64,

    // A: seeded loops under default coupling.
    loop_count: usize,
    average_strength: Option<f32>,
    feedback_asymmetry: f32,

    // B: saturated anomaly density.
    anomaly_peak: usize,
    anomalies_spawned: usize,
    anomalies_expired: usize,

    // C: branching disabled.
    timelines_without_branching: usize,
    final_coherence: Option<f32>,

    // D: fixed-position roots.
    near_connected: bool,
    far_connected: bool,
}

pub fn run() -> Result<(), FrameError> {
    let seed = 1u64;
    let params = FieldParameters::default();

    // === A: causal loops ===
    let mut causal = CausalEngine::new(CausalSettings::default(), Prng::new(seed))?;
    let mut last = None;
    for f in 1..=100 {
        last = Some(causal.update(FrameClock::at_frame(f, DT)?, &params)?);
    }
    let (loop_count, average_strength) = last
        .as_ref()
        .map_or((0, None), |a| (a.loop_count, a.average_strength));
    let matrix = causal.feedback_matrix();
    let mut feedback_asymmetry = 0.0f32;
    for i in 0..matrix.size() {
        for j in 0..matrix.size() {
            let gap = (matrix.get(i, j) - matrix.get(j, i)).abs();
            feedback_asymmetry = feedback_asymmetry.max(gap);
        }
    }

    // === B: anomaly churn ===
    let mut causal = CausalEngine::new(
        CausalSettings::default().with_anomaly_density(1.0),
        Prng::new(seed),
    )?;
    let weak = params.with_em_field_torsion(0.02);
    let (mut anomaly_peak, mut anomalies_spawned, mut anomalies_expired) = (0, 0, 0);
    for f in 1..=500 {
        let agg = causal.update(FrameClock::at_frame(f, DT)?, &weak)?;
        anomaly_peak = anomaly_peak.max(agg.anomaly_count);
        anomalies_spawned += agg.anomalies_spawned;
        anomalies_expired += agg.anomalies_expired;
    }

    // === C: no branching ===
    let mut lattice = TemporalLattice::new(
        LatticeSettings::default().with_branching_probability(0.0),
        Prng::new(seed),
    )?;
    let mut final_coherence = None;
    for f in 1..=1000 {
        final_coherence = lattice.update(FrameClock::at_frame(f, DT)?, &params)?.mean_coherence;
    }

    // === D: proximity ===
    let net = ResonanceNetwork::from_positions(
        ResonanceSettings::default(),
        Prng::new(seed),
        &[Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), Vec3::new(-7.0, 0.0, 0.0)],
    );
    let ids: Vec<_> = net.roots().iter().map(|r| r.id).collect();

    print_report(&AssayReport {
        seed,
        loop_count,
        average_strength,
        feedback_asymmetry,
        anomaly_peak,
        anomalies_spawned,
        anomalies_expired,
        timelines_without_branching: lattice.timelines().len(),
        final_coherence,
        near_connected: net.is_connected(ids[0], ids[1]),
        far_connected: net.is_connected(ids[0], ids[2]),
    });
    Ok(())
}

fn print_report(r: &AssayReport) {
    println!("fieldsim assays");
    println!("seed={}", r.seed);
    println!("loop_count={}", r.loop_count);
    println!("average_strength={:?}", r.average_strength);
    println!("feedback_asymmetry={:.4}", r.feedback_asymmetry);
    println!("anomaly_peak={} (cap {})", r.anomaly_peak, ANOMALY_CAP);
    println!("anomalies_spawned={}", r.anomalies_spawned);
    println!("anomalies_expired={}", r.anomalies_expired);
    println!("timelines_without_branching={}", r.timelines_without_branching);
    println!("final_coherence={:?}", r.final_coherence);
    println!("near_connected={}", r.near_connected);
    println!("far_connected={}", r.far_connected);
}
