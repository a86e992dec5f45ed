//! Causal loop subsystem: closed-curve loops coupled through an asymmetric
//! feedback matrix, plus short-lived torsion anomalies.

use core::f32::consts::{PI, TAU};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{check_non_negative, check_range, ParamError};
use crate::geometry::{wrap_phase, Vec3};
use crate::params::{FieldParameters, FrameClock};
use crate::population::{Entity, EntityId, IdAllocator, Population};
use crate::prng::Prng;

pub const SEED_LOOP_COUNT: usize = 3;
pub const ANOMALY_CAP: usize = 10;
/// Anomalies are destroyed the first frame their intensity drops below this.
pub const ANOMALY_FLOOR: f32 = 0.01;
pub const STRENGTH_MIN: f32 = 0.1;
pub const STRENGTH_MAX: f32 = 1.0;
pub const MAX_ECHO_DEPTH: u8 = 5;
/// Feedback links weaker than this are not worth drawing.
pub const FEEDBACK_LINK_MIN: f32 = 0.1;

const ANOMALY_DECAY: f32 = 0.995;
const ANOMALY_GROWTH: f32 = 0.01;
const ANOMALY_SPAWN_RATE: f32 = 0.02;
const ANOMALY_BOX: Vec3 = Vec3::new(8.0, 8.0, 4.0);
const PATH_STEPS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CausalSettings {
    /// Global coupling multiplier; also the retrocausal factor stamped on new loops.
    pub retrocausal_strength: f32,
    /// Per-frame anomaly spawn density in [0, 1].
    pub anomaly_density: f32,
}

impl Default for CausalSettings {
    fn default() -> Self {
        Self {
            retrocausal_strength: 0.4,
            anomaly_density: 0.2,
        }
    }
}

impl CausalSettings {
    pub fn with_retrocausal_strength(mut self, v: f32) -> Self {
        self.retrocausal_strength = v;
        self
    }

    pub fn with_anomaly_density(mut self, v: f32) -> Self {
        self.anomaly_density = v;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        check_non_negative("retrocausal_strength", self.retrocausal_strength)?;
        check_range("anomaly_density", self.anomaly_density, 0.0, 1.0)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CausalLoop {
    pub id: EntityId,
    /// Closed path: the last point repeats the first.
    pub path: Vec<Vec3>,
    pub strength: f32,
    pub phase: f32,
    pub retrocausal_factor: f32,
    pub echo_depth: u8,
    pub created_at: f32,
}

impl Entity for CausalLoop {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.strength
    }
}

/// Scaled copy of a loop drawn around it; deeper echoes are larger and fainter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EchoRing {
    pub depth: u8,
    pub strength: f32,
    pub path: Vec<Vec3>,
}

impl CausalLoop {
    pub fn echo_rings(&self) -> Vec<EchoRing> {
        (1..=self.echo_depth)
            .map(|depth| {
                let scale = 1.0 + depth as f32 * 0.1;
                EchoRing {
                    depth,
                    strength: self.strength * 0.7f32.powi(depth as i32),
                    path: self.path.iter().map(|&p| p * scale).collect(),
                }
            })
            .collect()
    }

    /// Middle sample of the path, used as the anchor for feedback links.
    pub fn anchor(&self) -> Option<Vec3> {
        self.path.get(self.path.len() / 2).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TorsionAnomaly {
    pub id: EntityId,
    pub position: Vec3,
    pub intensity: f32,
    pub radius: f32,
    pub created_at: f32,
}

impl Entity for TorsionAnomaly {
    fn id(&self) -> EntityId {
        self.id
    }

    fn vitality(&self) -> f32 {
        self.intensity
    }
}

/// Dense N×N table of pairwise loop feedback; `get(i, j)` is the influence of
/// loop `j` on loop `i` and is not assumed to equal `get(j, i)`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedbackMatrix {
    size: usize,
    values: Vec<f32>,
}

impl FeedbackMatrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        if i >= self.size || j >= self.size {
            return 0.0;
        }
        self.values[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        if i >= self.size {
            return &[];
        }
        &self.values[i * self.size..(i + 1) * self.size]
    }

    pub fn row_sum(&self, i: usize) -> f32 {
        self.row(i).iter().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Row-major nested copy, the shape telemetry consumers expect.
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.size).map(|i| self.row(i).to_vec()).collect()
    }
}

/// Mean over `from` of the distance to the nearest point of `to`.
///
/// `None` when either path is empty. Swapping the arguments generally changes
/// the result: an outlier in `from` raises the mean, an outlier in `to` does not.
pub fn mean_min_distance(from: &[Vec3], to: &[Vec3]) -> Option<f32> {
    if from.is_empty() || to.is_empty() {
        return None;
    }
    let total: f32 = from
        .iter()
        .map(|&p| {
            to.iter()
                .map(|&q| p.distance(q))
                .fold(f32::INFINITY, f32::min)
        })
        .sum();
    Some(total / from.len() as f32)
}

fn feedback_row(loops: &[CausalLoop], i: usize, global_strength: f32) -> Vec<f32> {
    let a = &loops[i];
    loops
        .iter()
        .enumerate()
        .map(|(j, b)| {
            if i == j {
                return 0.0;
            }
            let Some(d) = mean_min_distance(&a.path, &b.path) else {
                return 0.0;
            };
            let f = (-0.1 * d).exp()
                * a.retrocausal_factor
                * b.retrocausal_factor
                * global_strength;
            if f.is_finite() {
                f
            } else {
                0.0
            }
        })
        .collect()
}

/// Pairwise feedback for the given loops.
///
/// With fewer than two non-empty paths every entry is zero.
pub fn compute_feedback(loops: &[CausalLoop], global_strength: f32) -> FeedbackMatrix {
    let n = loops.len();
    let populated = loops.iter().filter(|l| !l.path.is_empty()).count();
    if populated < 2 {
        return FeedbackMatrix::zeros(n);
    }

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f32>> = {
        use rayon::prelude::*;
        (0..n)
            .into_par_iter()
            .map(|i| feedback_row(loops, i, global_strength))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f32>> = (0..n)
        .map(|i| feedback_row(loops, i, global_strength))
        .collect();

    FeedbackMatrix {
        size: n,
        values: rows.into_iter().flatten().collect(),
    }
}

/// Deterministic closed path for the `index`-th seed loop.
pub fn loop_path(index: usize) -> Vec<Vec3> {
    let radius = 3.0 + 2.0 * index as f32;
    let height = 1.5 * index as f32;

    let mut points: Vec<Vec3> = (0..PATH_STEPS)
        .map(|s| {
            let t = s as f32 * PI / 8.0;
            Vec3::new(
                radius * t.cos() + 0.5 * (3.0 * t).sin(),
                radius * t.sin() + 0.5 * (2.0 * t).cos(),
                height + 0.3 * (4.0 * t).sin(),
            )
        })
        .collect();

    if let Some(&first) = points.first() {
        points.push(first);
    }
    points
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedbackLink {
    pub from: usize,
    pub to: usize,
    pub strength: f32,
    pub start: Vec3,
    pub end: Vec3,
}

/// Upper-triangle pairs of `matrix` at or above [`FEEDBACK_LINK_MIN`], anchored on the loop paths.
pub fn feedback_links(loops: &[CausalLoop], matrix: &FeedbackMatrix) -> Vec<FeedbackLink> {
    let n = loops.len().min(matrix.size());
    let mut links = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let strength = matrix.get(i, j);
            if strength < FEEDBACK_LINK_MIN {
                continue;
            }
            if let (Some(start), Some(end)) = (loops[i].anchor(), loops[j].anchor()) {
                links.push(FeedbackLink {
                    from: i,
                    to: j,
                    strength,
                    start,
                    end,
                });
            }
        }
    }
    links
}

/// Per-frame telemetry emitted by the causal subsystem.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CausalAggregate {
    pub frame: u64,
    pub loop_count: usize,
    /// `None` when there are no loops to average over.
    pub average_strength: Option<f32>,
    pub feedback_matrix: FeedbackMatrix,
    pub anomaly_count: usize,
    pub retrocausal_energy: f32,
    pub anomalies_spawned: usize,
    pub anomalies_expired: usize,
}

/// Receiver for the per-frame causal aggregate.
pub trait AggregateSink {
    fn emit(&mut self, aggregate: &CausalAggregate);
}

impl<F: FnMut(&CausalAggregate)> AggregateSink for F {
    fn emit(&mut self, aggregate: &CausalAggregate) {
        self(aggregate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CausalState {
    Uninitialized,
    Seeded,
    Running,
}

#[derive(Debug, Clone)]
struct MatrixCache {
    generation: u64,
    strength_bits: u32,
    matrix: FeedbackMatrix,
}

pub struct CausalEngine {
    settings: CausalSettings,
    state: CausalState,
    rng: Prng,
    ids: IdAllocator,

    loops: Vec<CausalLoop>,
    anomalies: Population<TorsionAnomaly>,

    // Bumped whenever the loop set is regenerated; keys the feedback cache.
    generation: u64,
    cache: Option<MatrixCache>,

    sink: Option<Box<dyn AggregateSink>>,
    frames: u64,
    last_elapsed: f32,
    last_aggregate: Option<CausalAggregate>,
}

impl CausalEngine {
    pub fn new(settings: CausalSettings, rng: Prng) -> Result<Self, ParamError> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: CausalState::Uninitialized,
            rng,
            ids: IdAllocator::new(),
            loops: Vec::with_capacity(SEED_LOOP_COUNT),
            anomalies: Population::with_floor(ANOMALY_CAP, ANOMALY_FLOOR),
            generation: 0,
            cache: None,
            sink: None,
            frames: 0,
            last_elapsed: 0.0,
            last_aggregate: None,
        })
    }

    pub fn settings(&self) -> CausalSettings {
        self.settings
    }

    /// Swap settings between frames. A new retrocausal strength regenerates the loop set.
    pub fn set_settings(&mut self, settings: CausalSettings) -> Result<(), ParamError> {
        settings.validate()?;
        let reseed = settings.retrocausal_strength != self.settings.retrocausal_strength;
        self.settings = settings;
        if reseed && self.state != CausalState::Uninitialized {
            self.generate_loops(self.last_elapsed);
        }
        Ok(())
    }

    pub fn set_sink<S: AggregateSink + 'static>(&mut self, sink: S) {
        self.sink = Some(Box::new(sink));
    }

    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    pub fn state(&self) -> CausalState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn loops(&self) -> &[CausalLoop] {
        &self.loops
    }

    pub fn anomalies(&self) -> &Population<TorsionAnomaly> {
        &self.anomalies
    }

    pub fn last_aggregate(&self) -> Option<&CausalAggregate> {
        self.last_aggregate.as_ref()
    }

    /// Generate the seed loops. Only has an effect on an uninitialized subsystem.
    pub fn seed(&mut self, now: f32) {
        if self.state == CausalState::Uninitialized {
            self.generate_loops(now);
            self.state = CausalState::Seeded;
        }
    }

    /// Insert an anomaly directly (scripted events, tests). Obeys the cap.
    pub fn spawn_anomaly(
        &mut self,
        position: Vec3,
        intensity: f32,
        radius: f32,
        created_at: f32,
    ) -> EntityId {
        let id = self.ids.next_id();
        self.anomalies.spawn(TorsionAnomaly {
            id,
            position,
            intensity: intensity.max(0.0),
            radius: radius.max(0.0),
            created_at,
        });
        id
    }

    /// Feedback matrix for the current loop set, recomputed only when the set
    /// or the global strength changed since the last call.
    pub fn feedback_matrix(&mut self) -> &FeedbackMatrix {
        let strength_bits = self.settings.retrocausal_strength.to_bits();
        let stale = match &self.cache {
            Some(c) => c.generation != self.generation || c.strength_bits != strength_bits,
            None => true,
        };
        let cache = match self.cache.take() {
            Some(c) if !stale => c,
            _ => MatrixCache {
                generation: self.generation,
                strength_bits,
                matrix: compute_feedback(&self.loops, self.settings.retrocausal_strength),
            },
        };
        &self.cache.insert(cache).matrix
    }

    /// Links between loop pairs whose feedback is strong enough to draw.
    pub fn feedback_links(&mut self) -> Vec<FeedbackLink> {
        let matrix = self.feedback_matrix().clone();
        feedback_links(&self.loops, &matrix)
    }

    /// Advance one frame.
    ///
    /// A torsion parameter that is not finite or negative rejects the frame and
    /// leaves every loop and anomaly untouched.
    pub fn update(
        &mut self,
        clock: FrameClock,
        params: &FieldParameters,
    ) -> Result<CausalAggregate, ParamError> {
        let torsion = params.em_field_torsion()?;
        let t = clock.elapsed();

        if self.state == CausalState::Uninitialized {
            self.seed(t);
        }
        self.state = CausalState::Running;
        self.frames = self.frames.wrapping_add(1);
        self.last_elapsed = t;

        self.evolve_loops(t);

        let mut spawned = 0;
        if self.rng.chance(ANOMALY_SPAWN_RATE * self.settings.anomaly_density) {
            self.spawn_random_anomaly(torsion, t);
            spawned = 1;
        }

        let expired = self.anomalies.tick(|a| {
            a.intensity *= ANOMALY_DECAY;
            a.radius += ANOMALY_GROWTH;
        });
        if expired > 0 {
            trace!(expired, "anomalies decayed below floor");
        }

        let aggregate = self.aggregate(spawned, expired);
        if let Some(sink) = self.sink.as_mut() {
            sink.emit(&aggregate);
        }
        self.last_aggregate = Some(aggregate.clone());
        Ok(aggregate)
    }

    fn evolve_loops(&mut self, t: f32) {
        let influence: Vec<f32> = {
            let matrix = self.feedback_matrix();
            (0..matrix.size()).map(|i| matrix.row_sum(i)).collect()
        };

        for (i, l) in self.loops.iter_mut().enumerate() {
            let fi = influence.get(i).copied().unwrap_or(0.0);
            let drift = 0.1 * (0.1 * t + l.phase).sin();
            l.strength = (l.strength + 0.01 * fi).clamp(STRENGTH_MIN, STRENGTH_MAX);
            l.phase = wrap_phase(l.phase + drift + 0.02 * fi);
        }
    }

    fn spawn_random_anomaly(&mut self, torsion: f32, now: f32) {
        let position = Vec3::new(
            self.rng.gen_range_f32(-ANOMALY_BOX.x, ANOMALY_BOX.x),
            self.rng.gen_range_f32(-ANOMALY_BOX.y, ANOMALY_BOX.y),
            self.rng.gen_range_f32(-ANOMALY_BOX.z, ANOMALY_BOX.z),
        );
        let intensity = self.rng.next_f32_01() * torsion;
        let radius = self.rng.gen_range_f32(0.5, 2.5);
        let id = self.spawn_anomaly(position, intensity, radius, now);
        trace!(%id, intensity, radius, "spawned torsion anomaly");
    }

    fn generate_loops(&mut self, now: f32) {
        self.loops.clear();
        for k in 0..SEED_LOOP_COUNT {
            let id = self.ids.next_id();
            self.loops.push(CausalLoop {
                id,
                path: loop_path(k),
                strength: self.rng.gen_range_f32(0.5, 1.0),
                phase: self.rng.gen_range_f32(0.0, TAU),
                retrocausal_factor: self.settings.retrocausal_strength,
                echo_depth: 1 + self.rng.gen_range_usize(0, MAX_ECHO_DEPTH as usize) as u8,
                created_at: now,
            });
        }
        self.generation = self.generation.wrapping_add(1);
        self.cache = None;
        debug!(
            generation = self.generation,
            loops = self.loops.len(),
            retrocausal_strength = self.settings.retrocausal_strength,
            "generated causal loops"
        );
    }

    fn aggregate(&mut self, spawned: usize, expired: usize) -> CausalAggregate {
        let feedback_matrix = self.feedback_matrix().clone();
        let loop_count = self.loops.len();
        let average_strength = if loop_count == 0 {
            None
        } else {
            Some(self.loops.iter().map(|l| l.strength).sum::<f32>() / loop_count as f32)
        };
        CausalAggregate {
            frame: self.frames,
            loop_count,
            average_strength,
            feedback_matrix,
            anomaly_count: self.anomalies.len(),
            retrocausal_energy: self.loops.iter().map(|l| l.retrocausal_factor).sum(),
            anomalies_spawned: spawned,
            anomalies_expired: expired,
        }
    }
}
