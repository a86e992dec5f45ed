//! Ontological core: turns routed temporal events into weighted semantic
//! events and keeps a small concept table over them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ParamError;
use crate::params::{FieldParameters, FrameClock};
use crate::population::{Entity, EntityId, IdAllocator, Population};
use crate::prng::Prng;

pub const SEMANTIC_LOG_CAP: usize = 50;
pub const RECORD_CHANCE: f32 = 0.1;

const VOCABULARY_START: u32 = 847;
const CONCEPTUAL_DEPTH_START: f32 = 3.7;
const CONCEPTUAL_DEPTH_MAX: f32 = 10.0;
const SYMBOLIC_RESOLUTION_START: f32 = 0.923;
const SYMBOLIC_RESOLUTION_STEP: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConceptKind {
    RootShift,
    VectorBifurcation,
    TorsionSingularity,
    PhaseCollapse,
}

impl ConceptKind {
    pub const ALL: [ConceptKind; 4] = [
        ConceptKind::RootShift,
        ConceptKind::VectorBifurcation,
        ConceptKind::TorsionSingularity,
        ConceptKind::PhaseCollapse,
    ];

    pub fn base_weight(self) -> f32 {
        match self {
            ConceptKind::RootShift => 0.7,
            ConceptKind::VectorBifurcation => 0.9,
            ConceptKind::TorsionSingularity => 1.0,
            ConceptKind::PhaseCollapse => 0.6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConceptKind::RootShift => "root_shift",
            ConceptKind::VectorBifurcation => "vector_bifurcation",
            ConceptKind::TorsionSingularity => "torsion_singularity",
            ConceptKind::PhaseCollapse => "phase_collapse",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Severity {
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn of(magnitude: f32) -> Self {
        if magnitude > 0.8 {
            Severity::Critical
        } else if magnitude > 0.5 {
            Severity::High
        } else {
            Severity::Moderate
        }
    }
}

/// Causal-side message routed into the ontology by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalEvent {
    pub id: EntityId,
    pub timestamp: f32,
    pub magnitude: f32,
}

impl Entity for TemporalEvent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.magnitude
    }
}

/// Field values the event was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CausalChain {
    pub energy_density: f32,
    pub spin_distribution: f32,
    pub time_sync: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SemanticEvent {
    pub id: EntityId,
    pub timestamp: f32,
    pub kind: ConceptKind,
    pub magnitude: f32,
    pub severity: Severity,
    pub weight: f32,
    pub chain: CausalChain,
}

impl Entity for SemanticEvent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.weight
    }
}

/// `min(1, base · magnitude · (1 + 0.5·(energy + spin)) · (1 + |sin(0.1·timeSync)|))`,
/// floored at 0.
pub fn metaphysical_weight(
    kind: ConceptKind,
    magnitude: f32,
    energy: f32,
    spin: f32,
    time_sync: f32,
) -> f32 {
    let field = 1.0 + 0.5 * (energy + spin);
    let temporal = 1.0 + (0.1 * time_sync).sin().abs();
    let w = kind.base_weight() * magnitude * field * temporal;
    if w.is_finite() {
        w.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConceptNode {
    pub weight: f32,
    /// Summed magnitude of the concept's link to the temporal stream.
    pub temporal_relationship: f32,
    pub observations: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConceptTable {
    nodes: [ConceptNode; 4],
}

impl ConceptTable {
    pub fn record(&mut self, event: &SemanticEvent) {
        let node = &mut self.nodes[event.kind.index()];
        node.weight += event.weight;
        node.temporal_relationship += event.magnitude;
        node.observations += 1;
    }

    pub fn node(&self, kind: ConceptKind) -> ConceptNode {
        self.nodes[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConceptKind, ConceptNode)> + '_ {
        ConceptKind::ALL.into_iter().map(move |k| (k, self.node(k)))
    }

    pub fn total_weight(&self) -> f32 {
        self.nodes.iter().map(|n| n.weight).sum()
    }

    /// Concepts observed at least once.
    pub fn touched(&self) -> usize {
        self.nodes.iter().filter(|n| n.observations > 0).count()
    }

    pub fn ontological_depth(&self) -> f32 {
        self.total_weight() / self.touched().max(1) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InterpretationMetrics {
    pub vocabulary_size: u32,
    pub conceptual_depth: f32,
    pub symbolic_resolution: f32,
}

impl Default for InterpretationMetrics {
    fn default() -> Self {
        Self {
            vocabulary_size: VOCABULARY_START,
            conceptual_depth: CONCEPTUAL_DEPTH_START,
            symbolic_resolution: SYMBOLIC_RESOLUTION_START,
        }
    }
}

pub struct OntologicalCore {
    rng: Prng,
    ids: IdAllocator,
    active: bool,
    log: Population<SemanticEvent>,
    concepts: ConceptTable,
    metrics: InterpretationMetrics,
    observed: u64,
}

impl OntologicalCore {
    pub fn new(rng: Prng) -> Self {
        Self {
            rng,
            ids: IdAllocator::new(),
            active: true,
            log: Population::new(SEMANTIC_LOG_CAP),
            concepts: ConceptTable::default(),
            metrics: InterpretationMetrics::default(),
            observed: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// An inactive core ignores incoming events but keeps its state readable.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SemanticEvent> {
        self.log.iter()
    }

    pub fn event_count(&self) -> usize {
        self.log.len()
    }

    pub fn concepts(&self) -> &ConceptTable {
        &self.concepts
    }

    pub fn metrics(&self) -> InterpretationMetrics {
        self.metrics
    }

    /// Temporal events seen while active.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Feed one frame's worth of temporal events. Returns how many semantic events were recorded.
    pub fn observe(
        &mut self,
        clock: FrameClock,
        params: &FieldParameters,
        events: &[TemporalEvent],
    ) -> Result<usize, ParamError> {
        let chain = CausalChain {
            energy_density: params.energy_density()?,
            spin_distribution: params.spin_distribution()?,
            time_sync: params.time_sync()?,
        };
        if !self.active || events.is_empty() {
            return Ok(0);
        }

        let mut recorded = 0;
        for _ in events {
            self.observed += 1;
            if !self.rng.chance(RECORD_CHANCE) {
                continue;
            }
            let kind = ConceptKind::ALL[self.rng.gen_range_usize(0, ConceptKind::ALL.len())];
            let magnitude = self.rng.next_f32_01();
            let event = SemanticEvent {
                id: self.ids.next_id(),
                timestamp: clock.elapsed(),
                kind,
                magnitude,
                severity: Severity::of(magnitude),
                weight: metaphysical_weight(
                    kind,
                    magnitude,
                    chain.energy_density,
                    chain.spin_distribution,
                    chain.time_sync,
                ),
                chain,
            };
            self.record(event);
            recorded += 1;
        }
        Ok(recorded)
    }

    fn record(&mut self, event: SemanticEvent) {
        trace!(id = %event.id, kind = event.kind.label(), weight = event.weight, "semantic event");
        self.log.spawn(event);
        self.concepts.record(&event);

        let depth = self.concepts.ontological_depth();
        let m = &mut self.metrics;
        m.vocabulary_size += self.rng.gen_range_usize(0, 3) as u32;
        m.conceptual_depth = (m.conceptual_depth + 0.1 * depth).min(CONCEPTUAL_DEPTH_MAX);
        m.symbolic_resolution = (m.symbolic_resolution + SYMBOLIC_RESOLUTION_STEP).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u64, ids: &mut IdAllocator) -> TemporalEvent {
        TemporalEvent {
            id: ids.next_id(),
            timestamp: n as f32,
            magnitude: 0.5,
        }
    }

    fn feed(core: &mut OntologicalCore, frames: u64, params: &FieldParameters) -> usize {
        let mut ids = IdAllocator::new();
        let mut total = 0;
        for f in 1..=frames {
            let clock = FrameClock::at_frame(f, 1.0 / 60.0).unwrap();
            let ev = [event(f, &mut ids)];
            total += core.observe(clock, params, &ev).unwrap();
        }
        total
    }

    #[test]
    fn weight_formula() {
        let w = metaphysical_weight(ConceptKind::PhaseCollapse, 0.5, 0.0, 0.0, 0.0);
        assert!((w - 0.3).abs() < 1e-6);
        // Saturates.
        assert_eq!(
            metaphysical_weight(ConceptKind::TorsionSingularity, 1.0, 2.0, 1.5, 10.0),
            1.0
        );
        // Strong negative spin cannot push weight below zero.
        assert_eq!(
            metaphysical_weight(ConceptKind::RootShift, 1.0, 0.0, -4.0, 0.0),
            0.0
        );
        let sync = metaphysical_weight(ConceptKind::RootShift, 0.5, 0.0, 0.0, 5.0);
        let expected = 0.7 * 0.5 * (1.0 + (0.5f32).sin().abs());
        assert!((sync - expected).abs() < 1e-6);
    }

    #[test]
    fn severity_thresholds() {
        assert_eq!(Severity::of(0.9), Severity::Critical);
        assert_eq!(Severity::of(0.8), Severity::High);
        assert_eq!(Severity::of(0.51), Severity::High);
        assert_eq!(Severity::of(0.5), Severity::Moderate);
    }

    #[test]
    fn depth_averages_over_touched_concepts() {
        let mut table = ConceptTable::default();
        assert_eq!(table.ontological_depth(), 0.0);
        let id = IdAllocator::new().next_id();
        let mk = |kind, weight| SemanticEvent {
            id,
            timestamp: 0.0,
            kind,
            magnitude: 0.5,
            severity: Severity::Moderate,
            weight,
            chain: CausalChain {
                energy_density: 0.0,
                spin_distribution: 0.0,
                time_sync: 0.0,
            },
        };
        table.record(&mk(ConceptKind::RootShift, 0.4));
        table.record(&mk(ConceptKind::RootShift, 0.2));
        table.record(&mk(ConceptKind::PhaseCollapse, 0.6));
        assert_eq!(table.touched(), 2);
        assert!((table.ontological_depth() - 0.6).abs() < 1e-6);
        assert!((table.node(ConceptKind::RootShift).temporal_relationship - 1.0).abs() < 1e-6);
        assert_eq!(table.node(ConceptKind::VectorBifurcation).observations, 0);
    }

    #[test]
    fn log_is_capped_and_metrics_bounded() {
        let mut core = OntologicalCore::new(Prng::new(11));
        let params = FieldParameters::default().with_energy_density(2.0);
        let recorded = feed(&mut core, 5_000, &params);
        assert!(recorded > SEMANTIC_LOG_CAP);
        assert_eq!(core.event_count(), SEMANTIC_LOG_CAP);
        assert_eq!(core.observed(), 5_000);

        let m = core.metrics();
        assert!(m.vocabulary_size >= VOCABULARY_START);
        assert!(m.vocabulary_size <= VOCABULARY_START + 2 * recorded as u32);
        assert!(m.conceptual_depth <= CONCEPTUAL_DEPTH_MAX);
        assert!(m.symbolic_resolution <= 1.0);
        for e in core.events() {
            assert!((0.0..=1.0).contains(&e.weight));
        }
    }

    #[test]
    fn inactive_core_records_nothing() {
        let mut core = OntologicalCore::new(Prng::new(12));
        core.set_active(false);
        assert_eq!(feed(&mut core, 1_000, &FieldParameters::default()), 0);
        assert_eq!(core.event_count(), 0);
        assert_eq!(core.metrics(), InterpretationMetrics::default());
    }

    #[test]
    fn invalid_params_reject_frame() {
        let mut core = OntologicalCore::new(Prng::new(13));
        let mut ids = IdAllocator::new();
        let clock = FrameClock::new(1.0, 0.1).unwrap();
        let bad = FieldParameters::default().with_time_sync(f32::NAN);
        assert!(core.observe(clock, &bad, &[event(1, &mut ids)]).is_err());
        assert_eq!(core.observed(), 0);
    }
}
