use thiserror::Error;

/// A field parameter or subsystem setting that cannot be fed into the simulation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("`{name}` is not finite ({value})")]
    NonFinite { name: &'static str, value: f32 },

    #[error("`{name}` = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// A clock tick that cannot drive a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("clock `{name}` is not finite ({value})")]
    NonFinite { name: &'static str, value: f32 },

    #[error("clock `{name}` is negative ({value})")]
    Negative { name: &'static str, value: f32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Clock(#[from] ClockError),
}

pub(crate) fn check_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<f32, ParamError> {
    if !value.is_finite() {
        return Err(ParamError::NonFinite { name, value });
    }
    if value < min || value > max {
        return Err(ParamError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

pub(crate) fn check_non_negative(name: &'static str, value: f32) -> Result<f32, ParamError> {
    check_range(name, value, 0.0, f32::MAX)
}

pub(crate) fn check_finite(name: &'static str, value: f32) -> Result<f32, ParamError> {
    check_range(name, value, f32::MIN, f32::MAX)
}
