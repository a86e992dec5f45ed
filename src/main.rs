#[path = "experiments/assays.rs"]
mod assays;

use fieldsim::error::FrameError;
use fieldsim::prelude::*;
use tracing_subscriber::EnvFilter;

const DT: f32 = 1.0 / 60.0;
const DEFAULT_FRAMES: u64 = 600;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        Some("--help" | "-h" | "help") => {
            print_help();
            Ok(())
        }
        Some("assays") => assays::run(),
        Some("run") => match parse_frames(args.get(2)) {
            Some(frames) => run(frames, args.iter().any(|a| a == "--json")),
            None => {
                eprintln!("Invalid frame count: {}", args[2]);
                std::process::exit(2);
            }
        },
        None => run(DEFAULT_FRAMES, false),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "simulation aborted");
        std::process::exit(1);
    }
}

fn parse_frames(arg: Option<&String>) -> Option<u64> {
    match arg {
        None => Some(DEFAULT_FRAMES),
        Some(a) if a.starts_with("--") => Some(DEFAULT_FRAMES),
        Some(a) => a.parse().ok(),
    }
}

fn run(frames: u64, json: bool) -> Result<(), FrameError> {
    let config = EngineConfig::default()
        .with_seed(1)
        .with_causal(CausalSettings::default().with_anomaly_density(0.8))
        .with_lattice(LatticeSettings::default().with_branching_probability(0.6))
        .with_resonance(
            ResonanceSettings::default()
                .with_adaptive_anchors(true)
                .with_phase_tracking(true),
        );
    let mut engine = FieldEngine::new(config)?;
    let params = FieldParameters::default();

    for frame in 1..=frames {
        let report = engine.tick(FrameClock::at_frame(frame, DT)?, &params).into_result()?;
        if frame % 60 == 0 {
            print_frame(&report);
        }
    }

    let snapshot = EngineAdapter::new(&engine).snapshot();
    if json {
        match snapshot.to_json_pretty() {
            Ok(s) => println!("{s}"),
            Err(e) => tracing::error!(error = %e, "snapshot serialization failed"),
        }
    } else {
        let o = &snapshot.ontology;
        println!(
            "ontology: events={} depth={:.3} vocabulary={} conceptual_depth={:.2} resolution={:.3}",
            o.recent_events.len(),
            o.ontological_depth,
            o.metrics.vocabulary_size,
            o.metrics.conceptual_depth,
            o.metrics.symbolic_resolution
        );
    }
    Ok(())
}

fn print_frame(r: &FrameReport) {
    let causal = r.causal.updated();
    let lattice = r.lattice.updated();
    let resonance = r.resonance.updated();
    println!(
        "t={:6.2} loops={} strength={} anomalies={} timelines={} coherence={} roots={} edges={}",
        r.elapsed,
        causal.map_or(0, |a| a.loop_count),
        fmt_opt(causal.and_then(|a| a.average_strength)),
        causal.map_or(0, |a| a.anomaly_count),
        lattice.map_or(0, |l| l.timeline_count),
        fmt_opt(lattice.and_then(|l| l.mean_coherence)),
        resonance.map_or(0, |n| n.root_count),
        resonance.map_or(0, |n| n.visible_edges),
    );
}

fn fmt_opt(v: Option<f32>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn print_help() {
    println!("fieldsim (procedural field simulation)");
    println!("usage:");
    println!("  cargo run");
    println!("  cargo run -- run [frames] [--json]");
    println!("  cargo run -- assays");
    println!("  cargo run -- --help");
}
