//! Headless driver
//!
//! Runs a fixed number of ticks on the backend picked by `NBODY_BACKEND`
//! (`gpu` unless set to `cpu`) and logs system diagnostics plus rolling
//! frame and kernel time averages.

use nbody_physics::{center_of_mass, total_momentum};
use nbody_simulation::{
    CpuPipeline, GpuPipeline, Pipeline, Simulation, SimulationConfig, SimulationError, StepInput,
};
use std::collections::VecDeque;
use std::error::Error;
use std::process::ExitCode;
use std::time::Instant;

const TICKS: u32 = 600;
const REPORT_EVERY: u32 = 60;
const TIMING_HISTORY: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Gpu,
    Cpu,
}

impl Backend {
    fn from_env() -> Result<Self, String> {
        match std::env::var("NBODY_BACKEND") {
            Err(_) => Ok(Backend::Gpu),
            Ok(value) => match value.to_ascii_lowercase().as_str() {
                "gpu" => Ok(Backend::Gpu),
                "cpu" => Ok(Backend::Cpu),
                other => Err(format!(
                    "NBODY_BACKEND must be `gpu` or `cpu`, got `{other}`"
                )),
            },
        }
    }
}

/// Rolling window of durations in milliseconds
struct TimingHistory {
    samples: VecDeque<f32>,
}

impl TimingHistory {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(TIMING_HISTORY),
        }
    }

    fn push(&mut self, millis: f32) {
        self.samples.push_back(millis);
        if self.samples.len() > TIMING_HISTORY {
            self.samples.pop_front();
        }
    }

    fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }
}

/// Wall-clock frame time next to the time spent inside the pipeline
struct FrameTimings {
    frame: TimingHistory,
    kernel: TimingHistory,
}

impl FrameTimings {
    fn new() -> Self {
        Self {
            frame: TimingHistory::new(),
            kernel: TimingHistory::new(),
        }
    }

    fn push(&mut self, frame_millis: f32, kernel_millis: f32) {
        self.frame.push(frame_millis);
        self.kernel.push(kernel_millis);
    }

    /// Share of the frame spent in the pipeline, 0 before the first frame
    fn compute_load(&self) -> f32 {
        let frame = self.frame.average();
        if frame > 0.0 {
            self.kernel.average() / frame
        } else {
            0.0
        }
    }
}

fn drive<P: Pipeline>(mut simulation: Simulation<P>) -> Result<(), SimulationError> {
    let gravity_constant = simulation.config().gravity_constant;
    let particle_mass = simulation.config().particle_mass;
    let mut timings = FrameTimings::new();
    let mut last_frame = Instant::now();

    log::info!(
        "Running {} ticks: {} particles (capacity {}), {} cells",
        TICKS,
        simulation.particle_count(),
        simulation.capacity(),
        simulation.grid().total_cells()
    );

    for tick in 1..=TICKS {
        let now = Instant::now();
        let frame_time = (now - last_frame).as_secs_f32();
        let step = StepInput::from_frame_time(frame_time, gravity_constant);
        last_frame = now;

        simulation.tick(step)?;
        timings.push(frame_time * 1000.0, now.elapsed().as_secs_f32() * 1000.0);

        if tick % REPORT_EVERY == 0 {
            let states = simulation.read_states()?;
            let masses = vec![particle_mass; states.len()];
            log::info!(
                "tick {:>4}: frame {:.2} ms, kernel {:.2} ms, load {:.0}%, dt {:.2e}, COM {:.4}, momentum {:.4}",
                tick,
                timings.frame.average(),
                timings.kernel.average(),
                timings.compute_load() * 100.0,
                step.delta_time,
                center_of_mass(&states, &masses),
                total_momentum(&states, &masses)
            );
        }
    }

    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let backend = Backend::from_env()?;
    let config = SimulationConfig::default();
    log::info!("Backend: {:?}, method: {:?}", backend, config.method);

    match backend {
        Backend::Gpu => {
            let pipeline = pollster::block_on(GpuPipeline::headless(&config))?;
            drive(Simulation::new(pipeline)?)?;
        }
        Backend::Cpu => {
            let pipeline = CpuPipeline::new(&config)?;
            drive(Simulation::new(pipeline)?)?;
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            let mut source = error.source();
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
