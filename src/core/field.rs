//! Sampled field geometry: the displacement vector field over a cubic grid
//! and the scalar tensor overlays (Ricci curvature, torsion, divergence).
//!
//! Both samplers are pure functions of the field parameters. They hold no
//! state and draw no randomness, so any observer can recompute them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::geometry::Vec3;
use crate::params::FieldParameters;

/// Half-width and spacing of the vector grid: 9 samples per axis.
pub const VECTOR_EXTENT: i32 = 8;
pub const VECTOR_SPACING: usize = 2;

/// Half-width and spacing of the tensor grid: 5 samples per axis.
pub const TENSOR_EXTENT: i32 = 6;
pub const TENSOR_SPACING: usize = 3;

/// Samples with `|value|` at or below this are dropped from an overlay.
pub const TENSOR_THRESHOLD: f32 = 0.1;

fn grid(extent: i32, spacing: usize) -> impl Iterator<Item = Vec3> {
    (-extent..=extent).step_by(spacing).flat_map(move |x| {
        (-extent..=extent).step_by(spacing).flat_map(move |y| {
            (-extent..=extent)
                .step_by(spacing)
                .map(move |z| Vec3::new(x as f32, y as f32, z as f32))
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldVector {
    pub position: Vec3,
    pub direction: Vec3,
    pub magnitude: f32,
    pub curvature: f32,
    pub torsion: f32,
}

/// Displacement of the field at `position`.
///
/// With `r = |position|` and `t = 0.1·timeSync`:
/// curvature is `exp(−0.1·r)·energy` and torsion is `sin(0.2·r + t)·spin`.
pub fn field_vector(position: Vec3, energy: f32, spin: f32, time_sync: f32) -> FieldVector {
    let t = 0.1 * time_sync;
    let r = position.length();
    let curvature = (-0.1 * r).exp() * energy;
    let torsion = (0.2 * r + t).sin() * spin;

    let direction = Vec3::new(
        curvature * (t + 0.1 * r).cos() + torsion * position.y,
        curvature * (t + 0.1 * r).sin() - torsion * position.x,
        curvature * (0.15 * r + t).cos() + torsion * 0.5,
    );
    FieldVector {
        position,
        direction,
        magnitude: direction.length(),
        curvature,
        torsion,
    }
}

/// The vector field over `[-8, 8]³` at spacing 2, x-major.
pub fn vector_field(params: &FieldParameters) -> Result<Vec<FieldVector>, ParamError> {
    let energy = params.energy_density()?;
    let spin = params.spin_distribution()?;
    let time_sync = params.time_sync()?;
    Ok(grid(VECTOR_EXTENT, VECTOR_SPACING)
        .map(|p| field_vector(p, energy, spin, time_sync))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TensorKind {
    Ricci,
    Torsion,
    Divergence,
}

impl TensorKind {
    pub const ALL: [TensorKind; 3] = [
        TensorKind::Ricci,
        TensorKind::Torsion,
        TensorKind::Divergence,
    ];

    /// The field parameter that drives this overlay.
    pub fn intensity(self, params: &FieldParameters) -> Result<f32, ParamError> {
        match self {
            TensorKind::Ricci | TensorKind::Torsion => params.em_field_torsion(),
            TensorKind::Divergence => params.energy_density(),
        }
    }

    /// Scalar value of this tensor component at `p`.
    pub fn value_at(self, p: Vec3, intensity: f32) -> f32 {
        let r = p.length();
        match self {
            TensorKind::Ricci => (-0.2 * r).exp() * intensity * (1.0 + (0.5 * r).sin()),
            TensorKind::Torsion => (0.3 * r).sin() * p.y.atan2(p.x).cos() * intensity,
            // Undefined at the origin; the flux through a point is zero.
            TensorKind::Divergence if r == 0.0 => 0.0,
            TensorKind::Divergence => (p.x + p.y + p.z) / r * intensity * (-0.15 * r).exp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorSample {
    pub kind: TensorKind,
    pub position: Vec3,
    pub value: f32,
}

/// Samples of one tensor overlay over `[-6, 6]³` at spacing 3, keeping only
/// finite values with `|value| > 0.1`.
pub fn tensor_samples(kind: TensorKind, intensity: f32) -> Vec<TensorSample> {
    grid(TENSOR_EXTENT, TENSOR_SPACING)
        .map(|position| TensorSample {
            kind,
            position,
            value: kind.value_at(position, intensity),
        })
        .filter(|s| s.value.is_finite() && s.value.abs() > TENSOR_THRESHOLD)
        .collect()
}

/// Which tensor overlays an observer samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorOverlays {
    pub ricci: bool,
    pub torsion: bool,
    pub divergence: bool,
}

impl Default for TensorOverlays {
    fn default() -> Self {
        Self {
            ricci: true,
            torsion: false,
            divergence: false,
        }
    }
}

impl TensorOverlays {
    pub fn all() -> Self {
        Self {
            ricci: true,
            torsion: true,
            divergence: true,
        }
    }

    pub fn enabled(&self, kind: TensorKind) -> bool {
        match kind {
            TensorKind::Ricci => self.ricci,
            TensorKind::Torsion => self.torsion,
            TensorKind::Divergence => self.divergence,
        }
    }

    /// Samples of every enabled overlay whose driving parameter is valid.
    pub fn sample(&self, params: &FieldParameters) -> Vec<TensorSample> {
        TensorKind::ALL
            .into_iter()
            .filter(|&kind| self.enabled(kind))
            .filter_map(|kind| kind.intensity(params).ok().map(|i| tensor_samples(kind, i)))
            .flatten()
            .collect()
    }
}
