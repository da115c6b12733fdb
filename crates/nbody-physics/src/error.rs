//! Configuration errors
//!
//! These are rejected up front. Clamping a bad grid or mass would corrupt every
//! cell index computed afterwards.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("cell count on axis {axis} must be at least 1, got {count}")]
    InvalidCellCount { axis: usize, count: u32 },

    #[error("grid of {cells:?} cells does not fit a 32-bit cell index")]
    TooManyCells { cells: [u32; 3] },

    #[error("2D grids must have exactly one cell along z, got {0}")]
    PlanarDepth(u32),

    #[error("degenerate world bounds on axis {axis}: min {min} must be below max {max}")]
    DegenerateBounds { axis: usize, min: f32, max: f32 },

    #[error("particle {index} has non-positive or non-finite mass {mass}")]
    InvalidMass { index: usize, mass: f32 },

    #[error("mass array has {masses} entries but there are {states} particles")]
    MassCountMismatch { states: usize, masses: usize },

    #[error("particle capacity must be at least 1")]
    ZeroCapacity,

    #[error("particle count {count} exceeds capacity {capacity}")]
    CountExceedsCapacity { count: u32, capacity: u32 },

    #[error("spiral distribution needs 1..={max} arms, got {arms}")]
    InvalidSpiralArms { arms: u32, max: u32 },

    #[error("softening must be positive and finite, got {0}")]
    InvalidSoftening(f32),
}
