//! Session driver: pause, reset, fault latch and the display hand-off

use crate::{
    error::{Result, SimulationError},
    Pipeline, ResetOptions, SimulationConfig, StepInput,
};
use nbody_physics::{generate, Grid, ParticleState};
use rand::{rngs::StdRng, SeedableRng};

/// Read access to the particle states between two ticks.
///
/// Holding a lease borrows the [`Simulation`], so no tick or reset can
/// start until the display collaborator drops it.
pub struct DisplayLease<'a, S: ?Sized> {
    surface: &'a S,
    particle_count: u32,
}

impl<'a, S: ?Sized> DisplayLease<'a, S> {
    pub fn surface(&self) -> &'a S {
        self.surface
    }

    /// Leading slots of the surface that hold live particles
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }
}

/// A running session over one pipeline.
///
/// All settings come from [`Pipeline::config`]; the session only adds the
/// reset options in effect, pause and the fault latch.
pub struct Simulation<P: Pipeline> {
    pipeline: P,
    reset: ResetOptions,
    paused: bool,
    faulted: bool,
    tick_count: u64,
}

impl<P: Pipeline> Simulation<P> {
    /// Take ownership of `pipeline` and populate it from its configured reset.
    pub fn new(pipeline: P) -> Result<Self> {
        let reset = pipeline.config().reset;

        let mut simulation = Self {
            pipeline,
            reset,
            paused: false,
            faulted: false,
            tick_count: 0,
        };
        simulation.reset(reset)?;
        Ok(simulation)
    }

    /// Run one tick, or nothing while paused.
    ///
    /// A failure inside the pipeline faults the session: every later tick
    /// or reset returns [`SimulationError::Faulted`].
    pub fn tick(&mut self, step: StepInput) -> Result<()> {
        if self.faulted {
            return Err(SimulationError::Faulted);
        }
        if self.paused {
            return Ok(());
        }

        if let Err(error) = self.pipeline.tick(step) {
            log::error!("Tick {} failed, faulting session: {error}", self.tick_count);
            self.faulted = true;
            return Err(error);
        }

        self.tick_count += 1;
        log::debug!(
            "Tick {} done (dt = {}, G = {})",
            self.tick_count,
            step.delta_time,
            step.gravity_constant
        );
        Ok(())
    }

    /// Regenerate every active particle. The grid is left as configured.
    ///
    /// Bad options are rejected before anything is touched, so the previous
    /// particles survive a failed reset.
    pub fn reset(&mut self, options: ResetOptions) -> Result<()> {
        if self.faulted {
            return Err(SimulationError::Faulted);
        }
        let config = *self.pipeline.config();
        config.check_count(options.particle_count)?;

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (states, masses) = generate(
            self.pipeline.grid(),
            options.distribution,
            options.velocity,
            options.particle_count as usize,
            config.particle_mass,
            &mut rng,
        )?;

        if states.is_empty() {
            log::warn!("Reset with zero particles; ticks will do nothing");
        }

        if let Err(error) = self.pipeline.upload(&states, &masses) {
            if !matches!(error, SimulationError::Config(_)) {
                log::error!("Upload failed, faulting session: {error}");
                self.faulted = true;
            }
            return Err(error);
        }

        log::info!(
            "Reset: {} particles, {:?}, {:?}",
            states.len(),
            options.distribution,
            options.velocity
        );
        self.reset = options;
        self.tick_count = 0;
        Ok(())
    }

    /// Reset again with the options of the last successful reset.
    pub fn restart(&mut self) -> Result<()> {
        self.reset(self.reset)
    }

    /// Options of the last successful reset
    pub fn reset_options(&self) -> ResetOptions {
        self.reset
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn particle_count(&self) -> u32 {
        self.pipeline.particle_count()
    }

    pub fn capacity(&self) -> u32 {
        self.pipeline.capacity()
    }

    /// Ticks since the last reset; paused ticks don't count
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn grid(&self) -> &Grid {
        self.pipeline.grid()
    }

    pub fn config(&self) -> &SimulationConfig {
        self.pipeline.config()
    }

    pub fn display(&self) -> DisplayLease<'_, P::Surface> {
        DisplayLease {
            surface: self.pipeline.surface(),
            particle_count: self.pipeline.particle_count(),
        }
    }

    pub fn read_states(&self) -> Result<Vec<ParticleState>> {
        if self.faulted {
            return Err(SimulationError::Faulted);
        }
        self.pipeline.read_states()
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }
}
