//! Temporal lattice: a fixed 3D sample grid, stochastic branch candidates
//! derived from field influence, and a small population of timelines whose
//! coherence decays over the session.

use std::collections::VecDeque;

use core::f32::consts::{PI, TAU};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{check_non_negative, check_range, ParamError};
use crate::geometry::{wrap_phase, Vec3};
use crate::params::{FieldParameters, FrameClock};
use crate::population::{Entity, EntityId, IdAllocator, Population};
use crate::prng::Prng;

pub const TIMELINE_CAP: usize = 8;
pub const TRAIL_LEN: usize = 20;
pub const COHERENCE_FLOOR: f32 = 0.1;
pub const COHERENCE_MAX: f32 = 1.0;
pub const BRANCH_COHERENCE: f32 = 0.8;

const BRANCH_THRESHOLD: f32 = 0.3;
const BRANCH_RATE: f32 = 0.01;
const PHASE_STEP: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatticeSettings {
    /// Scales both candidate selection and the per-frame branch chance. [0, 1].
    pub branching_probability: f32,
    pub decoherence_rate: f32,
}

impl Default for LatticeSettings {
    fn default() -> Self {
        Self {
            branching_probability: 0.1,
            decoherence_rate: 0.05,
        }
    }
}

impl LatticeSettings {
    pub fn with_branching_probability(mut self, v: f32) -> Self {
        self.branching_probability = v;
        self
    }

    pub fn with_decoherence_rate(mut self, v: f32) -> Self {
        self.decoherence_rate = v;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        check_range("branching_probability", self.branching_probability, 0.0, 1.0)?;
        check_non_negative("decoherence_rate", self.decoherence_rate)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timeline {
    pub id: EntityId,
    pub branch_point: Vec3,
    pub divergence_angle: f32,
    pub coherence: f32,
    pub phase: f32,
    /// Most recent trail points, oldest first.
    pub trail: VecDeque<Vec3>,
    pub created_at: f32,
}

impl Entity for Timeline {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.coherence
    }
}

impl Timeline {
    fn advance(&mut self, t: f32, decay: f32) {
        let c = self.coherence;
        let point = Vec3::new(
            (t + self.phase).sin() * c,
            (1.2 * t + self.phase).cos() * c,
            0.1 * t + self.divergence_angle,
        );
        if self.trail.len() >= TRAIL_LEN {
            self.trail.pop_front();
        }
        self.trail.push_back(point);

        // `max` before `min` so a NaN product lands on the floor.
        self.coherence = (c * decay).max(COHERENCE_FLOOR).min(COHERENCE_MAX);
        self.phase = wrap_phase(self.phase + PHASE_STEP);
    }
}

/// The fixed sample grid: t ∈ [-10, 10] step 2, x, y ∈ [-8, 8] step 4.
pub fn lattice_points() -> Vec<Vec3> {
    let mut points = Vec::with_capacity(11 * 5 * 5);
    for t in (-10..=10).step_by(2) {
        for x in (-8..=8).step_by(4) {
            for y in (-8..=8).step_by(4) {
                points.push(Vec3::new(x as f32, y as f32, t as f32));
            }
        }
    }
    points
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LatticeFrame {
    pub timeline_count: usize,
    pub candidate_count: usize,
    pub branched: Option<EntityId>,
    /// `None` only if the timeline population is empty.
    pub mean_coherence: Option<f32>,
}

pub struct TemporalLattice {
    settings: LatticeSettings,
    rng: Prng,
    ids: IdAllocator,

    lattice: Vec<Vec3>,
    candidates: Vec<Vec3>,
    // (energy density bits, branching probability bits) the candidates were drawn for.
    manifold_key: Option<(u32, u32)>,

    timelines: Population<Timeline>,
    primary: EntityId,
    frames: u64,
}

impl TemporalLattice {
    pub fn new(settings: LatticeSettings, rng: Prng) -> Result<Self, ParamError> {
        settings.validate()?;
        let mut ids = IdAllocator::new();
        let primary = ids.next_id();

        let mut timelines = Population::new(TIMELINE_CAP);
        timelines.spawn(Timeline {
            id: primary,
            branch_point: Vec3::ZERO,
            divergence_angle: 0.0,
            coherence: COHERENCE_MAX,
            phase: 0.0,
            trail: VecDeque::with_capacity(TRAIL_LEN),
            created_at: 0.0,
        });

        Ok(Self {
            settings,
            rng,
            ids,
            lattice: lattice_points(),
            candidates: Vec::new(),
            manifold_key: None,
            timelines,
            primary,
            frames: 0,
        })
    }

    pub fn settings(&self) -> LatticeSettings {
        self.settings
    }

    /// Swap settings between frames. Branch candidates are redrawn on the next update.
    pub fn set_settings(&mut self, settings: LatticeSettings) -> Result<(), ParamError> {
        settings.validate()?;
        self.settings = settings;
        self.manifold_key = None;
        Ok(())
    }

    pub fn lattice(&self) -> &[Vec3] {
        &self.lattice
    }

    pub fn branch_candidates(&self) -> &[Vec3] {
        &self.candidates
    }

    pub fn timelines(&self) -> &Population<Timeline> {
        &self.timelines
    }

    pub fn primary(&self) -> EntityId {
        self.primary
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advance one frame.
    ///
    /// Coherence decays with the absolute session time, not with each timeline's age.
    pub fn update(
        &mut self,
        clock: FrameClock,
        params: &FieldParameters,
    ) -> Result<LatticeFrame, ParamError> {
        let energy = params.energy_density()?;
        self.refresh_manifold(energy);
        self.frames = self.frames.wrapping_add(1);

        let t = clock.elapsed();
        let decay = (-0.1 * self.settings.decoherence_rate * t).exp();
        self.timelines.tick(|tl| tl.advance(t, decay));

        let branched = self.maybe_branch(t);

        let n = self.timelines.len();
        let mean_coherence = if n == 0 {
            None
        } else {
            Some(self.timelines.iter().map(|tl| tl.coherence).sum::<f32>() / n as f32)
        };

        Ok(LatticeFrame {
            timeline_count: n,
            candidate_count: self.candidates.len(),
            branched,
            mean_coherence,
        })
    }

    fn maybe_branch(&mut self, now: f32) -> Option<EntityId> {
        if !self
            .rng
            .chance(BRANCH_RATE * self.settings.branching_probability)
        {
            return None;
        }
        if self.candidates.is_empty() || self.timelines.len() >= TIMELINE_CAP {
            return None;
        }

        let idx = self.rng.gen_range_usize(0, self.candidates.len());
        let id = self.ids.next_id();
        let timeline = Timeline {
            id,
            branch_point: self.candidates[idx],
            divergence_angle: self.rng.gen_range_f32(0.0, PI),
            coherence: BRANCH_COHERENCE,
            phase: self.rng.gen_range_f32(0.0, TAU),
            trail: VecDeque::with_capacity(TRAIL_LEN),
            created_at: now,
        };
        trace!(%id, branch_point = ?timeline.branch_point, "timeline branched");
        self.timelines.spawn(timeline);
        Some(id)
    }

    fn refresh_manifold(&mut self, energy: f32) {
        let bp = self.settings.branching_probability;
        let key = (energy.to_bits(), bp.to_bits());
        if self.manifold_key == Some(key) {
            return;
        }

        let rng = &mut self.rng;
        self.candidates = self
            .lattice
            .iter()
            .copied()
            .filter(|p| {
                let influence = (-0.1 * p.length()).exp() * energy;
                let fluctuation = rng.next_f32_01() * bp;
                influence * fluctuation > BRANCH_THRESHOLD
            })
            .collect();
        self.manifold_key = Some(key);
        debug!(
            energy,
            branching_probability = bp,
            candidates = self.candidates.len(),
            "regenerated branch candidates"
        );
    }
}
