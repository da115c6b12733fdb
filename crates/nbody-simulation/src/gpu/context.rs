//! Headless device acquisition

use crate::error::Result;

/// Device and queue used by a [`super::GpuPipeline`].
///
/// A renderer that already owns a device can skip this and hand its own
/// device/queue to [`super::GpuPipeline::new`], so the state buffer can be
/// bound for drawing without a copy.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using adapter: {} ({:?})",
            adapter_info.name,
            adapter_info.backend
        );

        // Large capacities need more than the default 128 MiB storage binding
        let supported = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
            max_buffer_size: supported.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("N-body Device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// [`GpuContext::new`] for callers without an async runtime.
    pub fn blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }
}
