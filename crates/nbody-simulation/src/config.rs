//! Simulation configuration
//!
//! Everything a stage needs is passed in explicitly; nothing is read from
//! globals, so several simulations can run side by side.

use nbody_physics::{
    ConfigError, Distribution, Grid, GridConfig, InitialVelocity, DEFAULT_PARTICLE_COUNT, G,
    MAX_DELTA_TIME, MAX_PARTICLES, MIN_DELTA_TIME, PARTICLE_MASS, SOFTENING,
};

/// How forces are summed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Three-stage grid pipeline: exact near field, monopole far field
    #[default]
    Grid,
    /// Single-cell brute force over all pairs
    Direct,
}

/// Reset choices made by the external collaborator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetOptions {
    pub distribution: Distribution,
    pub velocity: InitialVelocity,
    /// Active particles after the reset; must fit the capacity
    pub particle_count: u32,
    /// `Some` for reproducible layouts, `None` to draw from OS entropy
    pub seed: Option<u64>,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            distribution: Distribution::Uniform,
            velocity: InitialVelocity::Swirl,
            particle_count: DEFAULT_PARTICLE_COUNT,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub method: Method,
    /// Allocated particle slots; fixed for the lifetime of a pipeline
    pub capacity: u32,
    pub particle_mass: f32,
    pub softening: f32,
    /// Initial G; can be changed per tick through [`StepInput`]
    pub gravity_constant: f32,
    pub reset: ResetOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            method: Method::Grid,
            capacity: MAX_PARTICLES,
            particle_mass: PARTICLE_MASS,
            softening: SOFTENING,
            gravity_constant: G,
            reset: ResetOptions::default(),
        }
    }
}

impl SimulationConfig {
    /// Validate everything and build the grid topology.
    pub fn validate(&self) -> Result<Grid, ConfigError> {
        let grid = Grid::new(&self.grid)?;

        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.check_count(self.reset.particle_count)?;
        self.reset.distribution.validate()?;

        if !(self.particle_mass.is_finite() && self.particle_mass > 0.0) {
            return Err(ConfigError::InvalidMass {
                index: 0,
                mass: self.particle_mass,
            });
        }
        if !(self.softening.is_finite() && self.softening > 0.0) {
            return Err(ConfigError::InvalidSoftening(self.softening));
        }

        Ok(grid)
    }

    pub fn check_count(&self, count: u32) -> Result<(), ConfigError> {
        if count > self.capacity {
            Err(ConfigError::CountExceedsCapacity {
                count,
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }
}

/// Caller-supplied values for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInput {
    pub delta_time: f32,
    pub gravity_constant: f32,
}

impl StepInput {
    /// Clamp a wall-clock frame time into the stable range.
    pub fn from_frame_time(frame_seconds: f32, gravity_constant: f32) -> Self {
        Self {
            delta_time: clamp_delta_time(frame_seconds),
            gravity_constant,
        }
    }
}

/// Bound a frame time into `[MIN_DELTA_TIME, MAX_DELTA_TIME]`.
///
/// The pipeline does no step-size control of its own; callers keep the
/// explicit integrator stable by passing time steps through this.
pub fn clamp_delta_time(seconds: f32) -> f32 {
    if seconds.is_nan() {
        return MIN_DELTA_TIME;
    }
    seconds.clamp(MIN_DELTA_TIME, MAX_DELTA_TIME)
}
