#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_finite, check_non_negative, ClockError, ParamError};

/// Scalar field parameters driven by the dashboard sliders.
///
/// Owned by the caller and mutated only between frames. Subsystems read the
/// values they depend on through the checked accessors, so a bad value only
/// stalls the subsystems that actually consume it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldParameters {
    pub energy_density: f32,
    pub spin_distribution: f32,
    pub em_field_torsion: f32,
    pub time_sync: f32,
}

impl Default for FieldParameters {
    fn default() -> Self {
        Self {
            energy_density: 0.5,
            spin_distribution: 0.0,
            em_field_torsion: 0.3,
            time_sync: 1.0,
        }
    }
}

impl FieldParameters {
    pub fn with_energy_density(mut self, v: f32) -> Self {
        self.energy_density = v;
        self
    }

    pub fn with_spin_distribution(mut self, v: f32) -> Self {
        self.spin_distribution = v;
        self
    }

    pub fn with_em_field_torsion(mut self, v: f32) -> Self {
        self.em_field_torsion = v;
        self
    }

    pub fn with_time_sync(mut self, v: f32) -> Self {
        self.time_sync = v;
        self
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        self.energy_density()?;
        self.spin_distribution()?;
        self.em_field_torsion()?;
        self.time_sync()?;
        Ok(())
    }

    pub fn energy_density(&self) -> Result<f32, ParamError> {
        check_non_negative("energy_density", self.energy_density)
    }

    pub fn spin_distribution(&self) -> Result<f32, ParamError> {
        check_finite("spin_distribution", self.spin_distribution)
    }

    pub fn em_field_torsion(&self) -> Result<f32, ParamError> {
        check_non_negative("em_field_torsion", self.em_field_torsion)
    }

    pub fn time_sync(&self) -> Result<f32, ParamError> {
        check_non_negative("time_sync", self.time_sync)
    }
}

/// One tick of the external animation clock, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameClock {
    elapsed: f32,
    delta: f32,
}

impl FrameClock {
    pub fn new(elapsed: f32, delta: f32) -> Result<Self, ClockError> {
        for (name, value) in [("elapsed", elapsed), ("delta", delta)] {
            if !value.is_finite() {
                return Err(ClockError::NonFinite { name, value });
            }
            if value < 0.0 {
                return Err(ClockError::Negative { name, value });
            }
        }
        Ok(Self { elapsed, delta })
    }

    /// Clock for the `frame`-th tick of a fixed-rate driver (frame 1 ends at `delta`).
    pub fn at_frame(frame: u64, delta: f32) -> Result<Self, ClockError> {
        Self::new(frame as f32 * delta, delta)
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }
}
