//! Frame driver. Ticks every subsystem with the same clock in a fixed order
//! and routes the causal aggregate into the ontology.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::causal::{AggregateSink, CausalAggregate, CausalEngine, CausalSettings};
use crate::error::{FrameError, ParamError};
use crate::field::TensorOverlays;
use crate::lattice::{LatticeFrame, LatticeSettings, TemporalLattice};
use crate::ontology::{OntologicalCore, TemporalEvent};
use crate::params::{FieldParameters, FrameClock};
use crate::population::{IdAllocator, Population};
use crate::prng::Prng;
use crate::resonance::{ResonanceFrame, ResonanceNetwork, ResonanceSettings};

pub const TEMPORAL_LOG_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubsystemToggles {
    pub causal: bool,
    pub lattice: bool,
    pub resonance_roots: bool,
    pub ontology: bool,
}

impl Default for SubsystemToggles {
    fn default() -> Self {
        Self {
            causal: true,
            lattice: true,
            resonance_roots: true,
            ontology: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// If set, every subsystem stream is reproducible.
    pub seed: Option<u64>,
    pub causal: CausalSettings,
    pub lattice: LatticeSettings,
    pub resonance: ResonanceSettings,
    pub toggles: SubsystemToggles,
    pub overlays: TensorOverlays,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            causal: CausalSettings::default(),
            lattice: LatticeSettings::default(),
            resonance: ResonanceSettings::default(),
            toggles: SubsystemToggles::default(),
            overlays: TensorOverlays::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_causal(mut self, causal: CausalSettings) -> Self {
        self.causal = causal;
        self
    }

    pub fn with_lattice(mut self, lattice: LatticeSettings) -> Self {
        self.lattice = lattice;
        self
    }

    pub fn with_resonance(mut self, resonance: ResonanceSettings) -> Self {
        self.resonance = resonance;
        self
    }

    pub fn with_toggles(mut self, toggles: SubsystemToggles) -> Self {
        self.toggles = toggles;
        self
    }

    pub fn with_overlays(mut self, overlays: TensorOverlays) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        self.causal.validate()?;
        self.lattice.validate()?;
        Ok(())
    }
}

/// What one subsystem did during a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SubsystemOutcome<T> {
    Updated(T),
    /// The subsystem refused the frame and kept its previous state.
    Rejected(ParamError),
    Disabled,
}

impl<T> SubsystemOutcome<T> {
    fn from_result(name: &'static str, r: Result<T, ParamError>) -> Self {
        match r {
            Ok(v) => SubsystemOutcome::Updated(v),
            Err(e) => {
                warn!(subsystem = name, error = %e, "frame rejected");
                SubsystemOutcome::Rejected(e)
            }
        }
    }

    pub fn updated(&self) -> Option<&T> {
        match self {
            SubsystemOutcome::Updated(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ParamError> {
        match self {
            SubsystemOutcome::Rejected(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SubsystemOutcome::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: f32,
    pub causal: SubsystemOutcome<CausalAggregate>,
    pub lattice: SubsystemOutcome<LatticeFrame>,
    pub resonance: SubsystemOutcome<ResonanceFrame>,
    /// Semantic events recorded this frame.
    pub ontology: SubsystemOutcome<usize>,
    pub temporal_event: Option<TemporalEvent>,
}

impl FrameReport {
    /// First rejection in tick order, if any.
    pub fn first_error(&self) -> Option<&ParamError> {
        self.causal
            .error()
            .or_else(|| self.lattice.error())
            .or_else(|| self.resonance.error())
            .or_else(|| self.ontology.error())
    }

    /// Turn a partially rejected frame into an error.
    pub fn into_result(self) -> Result<Self, FrameError> {
        match self.first_error() {
            Some(e) => Err(e.clone().into()),
            None => Ok(self),
        }
    }
}

pub struct FieldEngine {
    config: EngineConfig,
    causal: CausalEngine,
    lattice: TemporalLattice,
    resonance: ResonanceNetwork,
    ontology: OntologicalCore,
    temporal_ids: IdAllocator,
    temporal_log: Population<TemporalEvent>,
    last_params: Option<FieldParameters>,
    frames: u64,
}

impl FieldEngine {
    pub fn new(config: EngineConfig) -> Result<Self, ParamError> {
        config.validate()?;
        let mut master = Prng::new(config.seed.unwrap_or(1));
        let causal = CausalEngine::new(config.causal, master.fork())?;
        let lattice = TemporalLattice::new(config.lattice, master.fork())?;
        let resonance = ResonanceNetwork::new(config.resonance, master.fork());
        let mut ontology = OntologicalCore::new(master.fork());
        ontology.set_active(config.toggles.ontology);

        debug!(seed = ?config.seed, "field engine created");
        Ok(Self {
            config,
            causal,
            lattice,
            resonance,
            ontology,
            temporal_ids: IdAllocator::new(),
            temporal_log: Population::new(TEMPORAL_LOG_CAP),
            last_params: None,
            frames: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn causal(&self) -> &CausalEngine {
        &self.causal
    }

    pub fn causal_mut(&mut self) -> &mut CausalEngine {
        &mut self.causal
    }

    pub fn lattice(&self) -> &TemporalLattice {
        &self.lattice
    }

    pub fn resonance(&self) -> &ResonanceNetwork {
        &self.resonance
    }

    /// Replace the generated network, e.g. with one built from fixed positions.
    pub fn set_resonance_network(&mut self, network: ResonanceNetwork) {
        self.resonance = network;
    }

    pub fn ontology(&self) -> &OntologicalCore {
        &self.ontology
    }

    pub fn temporal_events(&self) -> &Population<TemporalEvent> {
        &self.temporal_log
    }

    /// Parameters of the last frame, `None` before the first one.
    pub fn field_parameters(&self) -> Option<&FieldParameters> {
        self.last_params.as_ref()
    }

    pub fn set_causal_settings(&mut self, settings: CausalSettings) -> Result<(), ParamError> {
        self.causal.set_settings(settings)?;
        self.config.causal = settings;
        Ok(())
    }

    pub fn set_lattice_settings(&mut self, settings: LatticeSettings) -> Result<(), ParamError> {
        self.lattice.set_settings(settings)?;
        self.config.lattice = settings;
        Ok(())
    }

    pub fn set_resonance_settings(&mut self, settings: ResonanceSettings) {
        self.resonance.set_settings(settings);
        self.config.resonance = settings;
    }

    pub fn set_toggles(&mut self, toggles: SubsystemToggles) {
        self.config.toggles = toggles;
        self.ontology.set_active(toggles.ontology);
    }

    pub fn set_overlays(&mut self, overlays: TensorOverlays) {
        self.config.overlays = overlays;
    }

    pub fn set_sink<S: AggregateSink + 'static>(&mut self, sink: S) {
        self.causal.set_sink(sink);
    }

    /// Run one frame: causal, lattice, resonance, then route into the ontology.
    pub fn tick(&mut self, clock: FrameClock, params: &FieldParameters) -> FrameReport {
        let toggles = self.config.toggles;
        self.frames = self.frames.wrapping_add(1);
        self.last_params = Some(*params);

        let causal = if toggles.causal {
            SubsystemOutcome::from_result("causal", self.causal.update(clock, params))
        } else {
            SubsystemOutcome::Disabled
        };
        let lattice = if toggles.lattice {
            SubsystemOutcome::from_result("lattice", self.lattice.update(clock, params))
        } else {
            SubsystemOutcome::Disabled
        };
        let resonance = if toggles.resonance_roots {
            SubsystemOutcome::from_result("resonance", self.resonance.update(clock, params))
        } else {
            SubsystemOutcome::Disabled
        };

        let temporal_event = causal
            .updated()
            .filter(|agg| agg.anomaly_count > 0)
            .map(|agg| TemporalEvent {
                id: self.temporal_ids.next_id(),
                timestamp: clock.elapsed(),
                magnitude: agg.average_strength.unwrap_or(0.0),
            });
        if let Some(ev) = temporal_event {
            self.temporal_log.spawn(ev);
        }

        let ontology = if toggles.ontology {
            let routed: &[TemporalEvent] = match &temporal_event {
                Some(ev) => std::slice::from_ref(ev),
                None => &[],
            };
            SubsystemOutcome::from_result(
                "ontology",
                self.ontology.observe(clock, params, routed),
            )
        } else {
            SubsystemOutcome::Disabled
        };

        FrameReport {
            frame: self.frames,
            elapsed: clock.elapsed(),
            causal,
            lattice,
            resonance,
            ontology,
            temporal_event,
        }
    }

    /// [`tick`](Self::tick) from raw clock values.
    pub fn step(
        &mut self,
        elapsed: f32,
        delta: f32,
        params: &FieldParameters,
    ) -> Result<FrameReport, FrameError> {
        let clock = FrameClock::new(elapsed, delta)?;
        Ok(self.tick(clock, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::SEED_LOOP_COUNT;
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    fn engine(config: EngineConfig) -> FieldEngine {
        FieldEngine::new(config).unwrap()
    }

    fn run(e: &mut FieldEngine, frames: u64, params: &FieldParameters) -> Vec<FrameReport> {
        (1..=frames)
            .map(|f| e.tick(FrameClock::at_frame(f, DT).unwrap(), params))
            .collect()
    }

    #[test]
    fn default_frame_updates_everything() {
        let mut e = engine(EngineConfig::default().with_seed(7));
        assert_eq!(e.field_parameters(), None);
        let report = e
            .step(DT, DT, &FieldParameters::default())
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(e.field_parameters(), Some(&FieldParameters::default()));
        assert_eq!(report.causal.updated().unwrap().loop_count, SEED_LOOP_COUNT);
        assert_eq!(report.lattice.updated().unwrap().timeline_count, 1);
        assert!(report.resonance.updated().unwrap().regenerated);
        assert!(report.ontology.updated().is_some());
    }

    #[test]
    fn bad_clock_is_an_error() {
        let mut e = engine(EngineConfig::default());
        let err = e.step(f32::NAN, DT, &FieldParameters::default()).unwrap_err();
        assert!(matches!(err, FrameError::Clock(_)));
        assert_eq!(e.frames(), 0);
    }

    #[test]
    fn rejection_is_isolated_per_subsystem() {
        let mut e = engine(EngineConfig::default().with_seed(3));
        // Torsion feeds only the causal subsystem.
        let params = FieldParameters::default().with_em_field_torsion(f32::NAN);
        let report = e.step(DT, DT, &params).unwrap();
        assert!(report.causal.is_rejected());
        assert!(report.lattice.updated().is_some());
        assert!(report.resonance.updated().is_some());
        assert!(report.ontology.updated().is_some());
        assert!(report.temporal_event.is_none());
        assert!(matches!(report.into_result(), Err(FrameError::Param(_))));
    }

    #[test]
    fn disabled_subsystems_are_skipped() {
        let toggles = SubsystemToggles {
            resonance_roots: false,
            lattice: false,
            ..SubsystemToggles::default()
        };
        let mut e = engine(EngineConfig::default().with_toggles(toggles));
        let reports = run(&mut e, 10, &FieldParameters::default());
        assert!(reports
            .iter()
            .all(|r| r.resonance == SubsystemOutcome::Disabled
                && r.lattice == SubsystemOutcome::Disabled));
        assert!(e.resonance().roots().is_empty());
        assert_eq!(e.lattice().frames(), 0);
    }

    #[test]
    fn anomalies_route_temporal_events() {
        let config = EngineConfig::default()
            .with_seed(5)
            .with_causal(CausalSettings::default().with_anomaly_density(1.0));
        let mut e = engine(config);
        let reports = run(&mut e, 600, &FieldParameters::default());

        for r in &reports {
            let agg = r.causal.updated().unwrap();
            assert_eq!(r.temporal_event.is_some(), agg.anomaly_count > 0);
            if let Some(ev) = r.temporal_event {
                assert_eq!(Some(ev.magnitude), agg.average_strength);
                assert_eq!(ev.timestamp, r.elapsed);
            }
        }
        assert!(reports.iter().any(|r| r.temporal_event.is_some()));
        assert_eq!(e.temporal_events().len(), TEMPORAL_LOG_CAP);
        assert!(e.ontology().observed() > 0);
    }

    #[test]
    fn ontology_toggle_stops_observation() {
        let config = EngineConfig::default()
            .with_seed(9)
            .with_causal(CausalSettings::default().with_anomaly_density(1.0));
        let mut e = engine(config);
        e.set_toggles(SubsystemToggles {
            ontology: false,
            ..SubsystemToggles::default()
        });
        let reports = run(&mut e, 300, &FieldParameters::default());
        assert!(reports.iter().all(|r| r.ontology == SubsystemOutcome::Disabled));
        assert_eq!(e.ontology().observed(), 0);
    }

    #[test]
    fn same_seed_replays_identically() {
        let config = EngineConfig::default()
            .with_seed(42)
            .with_causal(CausalSettings::default().with_anomaly_density(0.6))
            .with_lattice(LatticeSettings::default().with_branching_probability(1.0));
        let params = FieldParameters::default().with_energy_density(1.5);
        let mut a = engine(config);
        let mut b = engine(config);
        assert_eq!(run(&mut a, 400, &params), run(&mut b, 400, &params));
        assert_eq!(a.lattice().timelines().to_vec(), b.lattice().timelines().to_vec());
    }

    #[test]
    fn sink_sees_every_causal_frame() {
        let seen = Rc::new(RefCell::new(0usize));
        let counter = Rc::clone(&seen);
        let mut e = engine(EngineConfig::default());
        e.set_sink(move |_: &CausalAggregate| *counter.borrow_mut() += 1);
        run(&mut e, 25, &FieldParameters::default());
        assert_eq!(*seen.borrow(), 25);
    }

    #[test]
    fn scripted_anomaly_and_fixed_roots() {
        use crate::geometry::Vec3;

        let mut e = engine(EngineConfig::default().with_seed(13));
        let net = ResonanceNetwork::from_positions(
            ResonanceSettings::default(),
            Prng::new(13),
            &[Vec3::ZERO, Vec3::new(0.0, 5.0, 0.0)],
        );
        e.set_resonance_network(net);
        e.causal_mut().spawn_anomaly(Vec3::ZERO, 1.0, 1.0, 0.0);

        let report = e.step(DT, DT, &FieldParameters::default()).unwrap();
        let ev = report.temporal_event.unwrap();
        assert_eq!(ev.magnitude, report.causal.updated().unwrap().average_strength.unwrap());
        let res = report.resonance.updated().unwrap();
        assert!(!res.regenerated);
        assert_eq!(res.root_count, 2);
        assert_eq!(res.visible_edges, 1);
    }

    #[test]
    fn invalid_config_is_refused() {
        let lattice = LatticeSettings::default().with_decoherence_rate(-1.0);
        let config = EngineConfig::default().with_lattice(lattice);
        assert!(FieldEngine::new(config).is_err());

        let mut e = engine(EngineConfig::default());
        let bad = CausalSettings::default().with_anomaly_density(3.0);
        assert!(e.set_causal_settings(bad).is_err());
        assert_eq!(e.config().causal, CausalSettings::default());
    }
}
