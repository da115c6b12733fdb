//! Errors surfaced by pipeline construction and ticking

use nbody_physics::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no compute adapter available: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),

    #[error("failed to create compute device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("compute kernel `{kernel}` failed to build: {message}")]
    KernelBuild { kernel: &'static str, message: String },

    #[error("out of device memory allocating {bytes} bytes for {capacity} particles")]
    OutOfMemory { bytes: u64, capacity: u32 },

    #[error("{what} needs {requested} but the device allows at most {limit}")]
    DeviceLimit {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("device error while waiting for the tick: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("failed to map readback buffer: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("readback channel closed before the device answered")]
    ReadbackLost,

    #[error("simulation session faulted by an earlier tick")]
    Faulted,
}

pub type Result<T> = std::result::Result<T, SimulationError>;
