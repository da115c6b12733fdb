//! Physical and numerical constants for the N-body simulation
//!
//! Values are in simulation units scaled for real-time visualization inside a
//! unit-sized world, not SI.

/// Default gravitational constant
pub const G: f32 = 1.0e-4;

/// Softening added to squared separation to prevent singularities at r→0
pub const SOFTENING: f32 = 0.001;

/// Default mass of every particle
pub const PARTICLE_MASS: f32 = 1.0;

/// Lower bound for a caller-supplied time step
pub const MIN_DELTA_TIME: f32 = 1.0e-7;

/// Upper bound for a caller-supplied time step.
/// The explicit integrator becomes unstable well above this.
pub const MAX_DELTA_TIME: f32 = 1.0e-3;

/// Speed of the tangential "swirl" initial velocity
pub const SWIRL_SPEED: f32 = 1.7;

/// Default cell count per axis
pub const GRID_CELLS_PER_AXIS: u32 = 32;

/// Default world half-extent; the world spans [-WORLD_HALF_EXTENT, WORLD_HALF_EXTENT] per axis
pub const WORLD_HALF_EXTENT: f32 = 1.0;

/// Default buffer capacity (particles allocated on the device)
pub const MAX_PARTICLES: u32 = 50_000;

/// Default active particle count
pub const DEFAULT_PARTICLE_COUNT: u32 = 20_000;

/// Highest number of arms accepted by the spiral distribution
pub const MAX_SPIRAL_ARMS: u32 = 4;
