//! Frame-driven procedural field simulation.
//!
//! Three independent subsystems evolve bounded populations of geometric
//! entities under a shared set of scalar field parameters:
//!
//! - [`causal`]: closed loops coupled through an asymmetric feedback matrix,
//!   plus decaying torsion anomalies.
//! - [`lattice`]: a fixed sample grid, stochastic branch candidates and
//!   timelines with decaying coherence.
//! - [`resonance`]: roots on spherical shells joined by a proximity graph.
//!
//! [`field`] samples the displacement vector field and the tensor overlays
//! the parameters describe.
//!
//! The [`ontology`] core turns causal telemetry into a weighted concept table,
//! and [`engine::FieldEngine`] drives everything once per frame.
//!
//! ```
//! use fieldsim::prelude::*;
//!
//! let mut engine = FieldEngine::new(EngineConfig::default().with_seed(7))?;
//! let params = FieldParameters::default();
//! for frame in 1..=60 {
//!     let report = engine.tick(FrameClock::at_frame(frame, 1.0 / 60.0)?, &params);
//!     assert!(report.first_error().is_none());
//! }
//! # Ok::<(), fieldsim::error::FrameError>(())
//! ```

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/geometry.rs"]
pub mod geometry;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/params.rs"]
pub mod params;

#[path = "core/population.rs"]
pub mod population;

#[path = "core/causal.rs"]
pub mod causal;

#[path = "core/lattice.rs"]
pub mod lattice;

#[path = "core/resonance.rs"]
pub mod resonance;

#[path = "core/ontology.rs"]
pub mod ontology;

#[path = "core/field.rs"]
pub mod field;

#[path = "core/engine.rs"]
pub mod engine;

pub mod observer;

pub mod prelude {
    pub use crate::causal::{CausalAggregate, CausalEngine, CausalSettings};
    pub use crate::engine::{
        EngineConfig, FieldEngine, FrameReport, SubsystemOutcome, SubsystemToggles,
    };
    pub use crate::error::{ClockError, FrameError, ParamError};
    pub use crate::field::{TensorKind, TensorOverlays};
    pub use crate::geometry::Vec3;
    pub use crate::lattice::{LatticeSettings, TemporalLattice};
    pub use crate::observer::{EngineAdapter, EngineSnapshot};
    pub use crate::params::{FieldParameters, FrameClock};
    pub use crate::population::{Entity, EntityId, Population};
    pub use crate::prng::Prng;
    pub use crate::resonance::{ResonanceNetwork, ResonanceSettings};
}
