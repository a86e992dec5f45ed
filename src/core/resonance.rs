//! Resonance network: roots scattered on spherical shells, a proximity graph
//! built at generation time, and an optional phase-driven drift.

use core::f32::consts::TAU;

use hashbrown::HashSet;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::ParamError;
use crate::geometry::{wrap_phase, Vec3};
use crate::params::{FieldParameters, FrameClock};
use crate::population::{Entity, EntityId, IdAllocator};
use crate::prng::Prng;

pub const MAX_ROOTS: usize = 20;
/// Roots closer than this are linked in the adjacency graph.
pub const CONNECT_RADIUS: f32 = 6.0;
/// Edges at or below this strength are not reported as visible.
pub const VISIBLE_EDGE_MIN: f32 = 0.1;
pub const STABILITY_MIN: f32 = 0.2;
pub const STABILITY_MAX: f32 = 1.0;

const STRENGTH_FALLOFF: f32 = 8.0;
const SHELL_MIN: f32 = 3.0;
const SHELL_MAX: f32 = 8.0;
const PHASE_STEP: f32 = 0.01;
const JITTER: f32 = 0.01;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResonanceSettings {
    pub adaptive_anchors: bool,
    pub phase_tracking: bool,
}

impl ResonanceSettings {
    pub fn with_adaptive_anchors(mut self, on: bool) -> Self {
        self.adaptive_anchors = on;
        self
    }

    pub fn with_phase_tracking(mut self, on: bool) -> Self {
        self.phase_tracking = on;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResonanceRoot {
    pub id: EntityId,
    pub position: Vec3,
    pub phase: f32,
    pub stability: f32,
    /// Fixed when the network is (re)generated; drift does not rewire it.
    pub connections: HashSet<EntityId>,
    pub created_at: f32,
}

impl Entity for ResonanceRoot {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.stability
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResonanceEdge {
    pub from: EntityId,
    pub to: EntityId,
    pub start: Vec3,
    pub end: Vec3,
    pub strength: f32,
    /// Mean stability of the two endpoints.
    pub stability: f32,
}

/// `max(0, 1 - d/8)`. Depends on nothing but the two positions.
pub fn connection_strength(a: Vec3, b: Vec3) -> f32 {
    let s = 1.0 - a.distance(b) / STRENGTH_FALLOFF;
    if s.is_finite() {
        s.max(0.0)
    } else {
        0.0
    }
}

/// Number of roots generated for a given field strength: `floor(4 + 8·strength)`.
///
/// Clamped to [`MAX_ROOTS`], so every strength of 2.0 and above yields 20 roots.
/// Negative results floor at zero and a non-finite strength maps to the cap.
pub fn root_count(field_strength: f32) -> usize {
    let n = (4.0 + 8.0 * field_strength).floor();
    if n.is_finite() {
        (n.max(0.0) as usize).min(MAX_ROOTS)
    } else {
        MAX_ROOTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RootLayout {
    /// Regenerated from the field's energy density whenever it changes.
    Field,
    /// Caller-supplied positions; never regenerated.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResonanceFrame {
    pub root_count: usize,
    pub visible_edges: usize,
    pub regenerated: bool,
    pub mean_stability: Option<f32>,
}

pub struct ResonanceNetwork {
    settings: ResonanceSettings,
    layout: RootLayout,
    rng: Prng,
    ids: IdAllocator,
    roots: Vec<ResonanceRoot>,
    edges: Vec<ResonanceEdge>,
    field_key: Option<u32>,
    generation: u64,
}

impl ResonanceNetwork {
    /// Empty network; roots appear on the first update.
    pub fn new(settings: ResonanceSettings, rng: Prng) -> Self {
        Self {
            settings,
            layout: RootLayout::Field,
            rng,
            ids: IdAllocator::new(),
            roots: Vec::new(),
            edges: Vec::new(),
            field_key: None,
            generation: 0,
        }
    }

    /// Network over fixed root positions. Phases start at zero and stability at the maximum.
    pub fn from_positions(settings: ResonanceSettings, rng: Prng, positions: &[Vec3]) -> Self {
        let mut net = Self::new(settings, rng);
        net.layout = RootLayout::Fixed;
        net.roots = positions
            .iter()
            .map(|&position| ResonanceRoot {
                id: net.ids.next_id(),
                position,
                phase: 0.0,
                stability: STABILITY_MAX,
                connections: HashSet::new(),
                created_at: 0.0,
            })
            .collect();
        net.connect();
        net.rebuild_edges();
        net.generation = 1;
        net
    }

    pub fn settings(&self) -> ResonanceSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: ResonanceSettings) {
        self.settings = settings;
    }

    pub fn layout(&self) -> RootLayout {
        self.layout
    }

    pub fn roots(&self) -> &[ResonanceRoot] {
        &self.roots
    }

    pub fn root(&self, id: EntityId) -> Option<&ResonanceRoot> {
        self.roots.iter().find(|r| r.id == id)
    }

    /// Edges visible after the last update.
    pub fn edges(&self) -> &[ResonanceEdge] {
        &self.edges
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_connected(&self, a: EntityId, b: EntityId) -> bool {
        self.root(a).is_some_and(|r| r.connections.contains(&b))
    }

    /// Discard all roots and scatter a fresh set for `field_strength`.
    pub fn regenerate(&mut self, field_strength: f32, now: f32) {
        let n = root_count(field_strength);
        let mut roots = Vec::with_capacity(n);
        for i in 0..n {
            let theta = TAU * i as f32 / n as f32;
            let phi = (2.0 * self.rng.next_f32_01() - 1.0).clamp(-1.0, 1.0).acos();
            let r = self.rng.gen_range_f32(SHELL_MIN, SHELL_MAX);
            let position = Vec3::new(
                r * phi.sin() * theta.cos(),
                r * phi.sin() * theta.sin(),
                r * phi.cos(),
            );
            roots.push(ResonanceRoot {
                id: self.ids.next_id(),
                position,
                phase: self.rng.gen_range_f32(0.0, TAU),
                stability: self.rng.gen_range_f32(0.5, STABILITY_MAX),
                connections: HashSet::new(),
                created_at: now,
            });
        }
        self.roots = roots;
        self.connect();
        self.generation += 1;
        debug!(
            field_strength,
            roots = n,
            generation = self.generation,
            "regenerated resonance roots"
        );
    }

    /// Advance one frame.
    pub fn update(
        &mut self,
        clock: FrameClock,
        params: &FieldParameters,
    ) -> Result<ResonanceFrame, ParamError> {
        let energy = params.energy_density()?;
        let t = clock.elapsed();

        let mut regenerated = false;
        if self.layout == RootLayout::Field && self.field_key != Some(energy.to_bits()) {
            self.regenerate(energy, t);
            self.field_key = Some(energy.to_bits());
            regenerated = true;
        }

        if self.settings.adaptive_anchors {
            self.adapt(t);
        }
        self.rebuild_edges();

        let n = self.roots.len();
        let mean_stability = if n == 0 {
            None
        } else {
            Some(self.roots.iter().map(|r| r.stability).sum::<f32>() / n as f32)
        };
        Ok(ResonanceFrame {
            root_count: n,
            visible_edges: self.edges.len(),
            regenerated,
            mean_stability,
        })
    }

    fn adapt(&mut self, t: f32) {
        let tracking = self.settings.phase_tracking;
        for root in &mut self.roots {
            let phi = root.phase;
            let shift = if tracking {
                0.1 * (2.0 * t + phi).sin()
            } else {
                0.0
            };
            root.position += Vec3::new(
                (0.5 * t + phi).sin(),
                (0.7 * t + phi).cos(),
                (0.3 * t + phi).sin(),
            ) * shift;
            root.phase = wrap_phase(phi + PHASE_STEP);

            let jitter = (self.rng.next_f32_01() - 0.5) * JITTER;
            root.stability = (root.stability + jitter).clamp(STABILITY_MIN, STABILITY_MAX);
        }
    }

    fn connect(&mut self) {
        let n = self.roots.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if self.roots[i].position.distance(self.roots[j].position) < CONNECT_RADIUS {
                    pairs.push((i, j));
                }
            }
        }
        for root in &mut self.roots {
            root.connections.clear();
        }
        for &(i, j) in &pairs {
            let (a, b) = (self.roots[i].id, self.roots[j].id);
            self.roots[i].connections.insert(b);
            self.roots[j].connections.insert(a);
        }
        trace!(links = pairs.len(), "built resonance adjacency");
    }

    fn rebuild_edges(&mut self) {
        self.edges.clear();
        for (i, a) in self.roots.iter().enumerate() {
            for b in &self.roots[i + 1..] {
                if !a.connections.contains(&b.id) {
                    continue;
                }
                let strength = connection_strength(a.position, b.position);
                if strength > VISIBLE_EDGE_MIN {
                    self.edges.push(ResonanceEdge {
                        from: a.id,
                        to: b.id,
                        start: a.position,
                        end: b.position,
                        strength,
                        stability: 0.5 * (a.stability + b.stability),
                    });
                }
            }
        }
    }
}
