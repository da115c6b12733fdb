//! The seam between the simulation session and a compute backend

use crate::{error::Result, Method, SimulationConfig, StepInput};
use nbody_physics::{validate_masses, CellAggregate, ConfigError, Grid, ParticleState};

/// Lanes per workgroup for every stage. The aggregation reduction halves the
/// lane count each step, so this must stay a power of two.
pub const WORKGROUP_SIZE: u32 = 128;
const _: () = assert!(WORKGROUP_SIZE.is_power_of_two());

/// A backend that owns the particle buffers and runs the three stages.
///
/// Implementations must run a tick to completion before returning: once
/// [`Pipeline::tick`] is back, [`Pipeline::surface`] shows the new positions.
pub trait Pipeline {
    /// What the display collaborator reads between ticks
    type Surface: ?Sized;

    /// The configuration this pipeline was built from. Sessions read every
    /// setting from here so the two can never disagree.
    fn config(&self) -> &SimulationConfig;

    fn grid(&self) -> &Grid;
    fn particle_count(&self) -> u32;

    fn method(&self) -> Method {
        self.config().method
    }

    fn capacity(&self) -> u32 {
        self.config().capacity
    }

    /// Replace the active particles with `states`/`masses`, slots `0..len`.
    fn upload(&mut self, states: &[ParticleState], masses: &[f32]) -> Result<()>;

    /// Advance every active particle by one step.
    fn tick(&mut self, step: StepInput) -> Result<()>;

    fn read_states(&self) -> Result<Vec<ParticleState>>;

    /// Cell of each active particle as of the last tick.
    fn read_cell_indices(&self) -> Result<Vec<u32>>;

    /// Per-cell sums as of the last tick. Untouched by [`Method::Direct`].
    fn read_cell_aggregates(&self) -> Result<Vec<CellAggregate>>;

    fn surface(&self) -> &Self::Surface;
}

/// Shared upload validation: lengths agree, fit the capacity and every mass is usable.
pub(crate) fn check_upload(capacity: u32, states: &[ParticleState], masses: &[f32]) -> Result<u32> {
    if states.len() != masses.len() {
        return Err(ConfigError::MassCountMismatch {
            states: states.len(),
            masses: masses.len(),
        }
        .into());
    }
    let count = u32::try_from(states.len()).unwrap_or(u32::MAX);
    if count > capacity {
        return Err(ConfigError::CountExceedsCapacity { count, capacity }.into());
    }
    validate_masses(masses)?;
    Ok(count)
}
