//! # N-body Simulation
//!
//! Three-stage grid-accelerated gravity: bin particles into cells, reduce
//! each cell to a mass and center of mass, then integrate with exact
//! near-field pairs and monopole far-field cells. Runs on wgpu compute
//! ([`GpuPipeline`]) or on the CPU with rayon ([`CpuPipeline`]).

pub mod config;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod params;
pub mod pipeline;
pub mod simulation;

pub use config::*;
pub use cpu::{AggregationStrategy, CpuPipeline};
pub use error::{Result, SimulationError};
pub use gpu::{GpuContext, GpuPipeline};
pub use params::PipelineParams;
pub use pipeline::{Pipeline, WORKGROUP_SIZE};
pub use simulation::{DisplayLease, Simulation};
