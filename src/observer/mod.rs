use crate::causal::{feedback_links, CausalState, EchoRing, FeedbackLink, TorsionAnomaly};
use crate::engine::FieldEngine;
use crate::field::{vector_field, FieldVector, TensorSample};
use crate::geometry::Vec3;
use crate::lattice::Timeline;
use crate::ontology::{ConceptKind, ConceptNode, InterpretationMetrics, SemanticEvent};
use crate::population::EntityId;
use crate::resonance::{ResonanceEdge, ResonanceRoot};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A read-only, owned picture of the engine after the last frame.
///
/// - Observers cannot mutate or steer the simulation.
/// - Snapshotting allocates on demand; the frame loop does not pay for it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineSnapshot {
    pub frame: u64,
    pub causal: CausalSnapshot,
    pub lattice: LatticeSnapshot,
    pub resonance: ResonanceSnapshot,
    pub ontology: OntologySnapshot,
    pub field: FieldSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoopSnapshot {
    pub id: EntityId,
    pub path: Vec<Vec3>,
    pub strength: f32,
    pub phase: f32,
    pub echoes: Vec<EchoRing>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CausalSnapshot {
    pub state: CausalState,
    pub loops: Vec<LoopSnapshot>,
    pub feedback: Vec<Vec<f32>>,
    pub links: Vec<FeedbackLink>,
    pub anomalies: Vec<TorsionAnomaly>,
    pub average_strength: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatticeSnapshot {
    pub lattice: Vec<Vec3>,
    pub branch_candidates: Vec<Vec3>,
    pub timelines: Vec<Timeline>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResonanceSnapshot {
    pub roots: Vec<ResonanceRoot>,
    pub edges: Vec<ResonanceEdge>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OntologySnapshot {
    pub active: bool,
    pub recent_events: Vec<SemanticEvent>,
    pub concepts: Vec<(ConceptKind, ConceptNode)>,
    pub ontological_depth: f32,
    pub metrics: InterpretationMetrics,
}

/// Field samples for the parameters of the last frame.
///
/// Empty before the first frame. A parameter that fails validation empties
/// only the samplers that read it.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldSnapshot {
    pub vectors: Vec<FieldVector>,
    pub tensors: Vec<TensorSample>,
}

/// Number of semantic events carried in a snapshot, newest last.
pub const RECENT_EVENTS: usize = 8;

pub struct EngineAdapter<'a> {
    engine: &'a FieldEngine,
}

impl<'a> EngineAdapter<'a> {
    pub fn new(engine: &'a FieldEngine) -> Self {
        Self { engine }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            frame: self.engine.frames(),
            causal: self.causal(),
            lattice: self.lattice(),
            resonance: ResonanceSnapshot {
                roots: self.engine.resonance().roots().to_vec(),
                edges: self.engine.resonance().edges().to_vec(),
            },
            ontology: self.ontology(),
            field: self.field(),
        }
    }

    fn causal(&self) -> CausalSnapshot {
        let causal = self.engine.causal();
        let loops = causal.loops();
        // The matrix of the last completed frame; nothing to draw before the first one.
        let (feedback, links, average_strength) = match causal.last_aggregate() {
            Some(agg) => (
                agg.feedback_matrix.to_rows(),
                feedback_links(loops, &agg.feedback_matrix),
                agg.average_strength,
            ),
            None => (Vec::new(), Vec::new(), None),
        };

        CausalSnapshot {
            state: causal.state(),
            loops: loops
                .iter()
                .map(|l| LoopSnapshot {
                    id: l.id,
                    path: l.path.clone(),
                    strength: l.strength,
                    phase: l.phase,
                    echoes: l.echo_rings(),
                })
                .collect(),
            feedback,
            links,
            anomalies: causal.anomalies().to_vec(),
            average_strength,
        }
    }

    fn lattice(&self) -> LatticeSnapshot {
        let lattice = self.engine.lattice();
        LatticeSnapshot {
            lattice: lattice.lattice().to_vec(),
            branch_candidates: lattice.branch_candidates().to_vec(),
            timelines: lattice.timelines().to_vec(),
        }
    }

    fn field(&self) -> FieldSnapshot {
        let Some(params) = self.engine.field_parameters() else {
            return FieldSnapshot::default();
        };
        FieldSnapshot {
            vectors: vector_field(params).unwrap_or_default(),
            tensors: self.engine.config().overlays.sample(params),
        }
    }

    fn ontology(&self) -> OntologySnapshot {
        let core = self.engine.ontology();
        let skip = core.event_count().saturating_sub(RECENT_EVENTS);
        OntologySnapshot {
            active: core.is_active(),
            recent_events: core.events().skip(skip).copied().collect(),
            concepts: core.concepts().iter().collect(),
            ontological_depth: core.concepts().ontological_depth(),
            metrics: core.metrics(),
        }
    }
}

#[cfg(feature = "serde")]
impl EngineSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
