//! wgpu compute backend
//!
//! Buffers are sized to the configured capacity once; resets only rewrite
//! the leading `particle_count` slots. Each tick records every stage into
//! one encoder and blocks until the device finishes it.

mod context;

pub use context::GpuContext;

use crate::{
    error::{Result, SimulationError},
    pipeline::{check_upload, Pipeline, WORKGROUP_SIZE},
    Method, PipelineParams, SimulationConfig, StepInput,
};
use glam::Vec3;
use nbody_physics::{CellAggregate, Grid, ParticleState};

const STATE_SIZE: u64 = std::mem::size_of::<ParticleState>() as u64;
const CELL_SUM_SIZE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

const CELL_INDEX_SHADER: &str = concat!(
    include_str!("../shaders/common.wgsl"),
    include_str!("../shaders/cell_index.wgsl")
);
const CELL_AGGREGATE_SHADER: &str = concat!(
    include_str!("../shaders/common.wgsl"),
    include_str!("../shaders/cell_aggregate.wgsl")
);
const GRID_UPDATE_SHADER: &str = concat!(
    include_str!("../shaders/common.wgsl"),
    include_str!("../shaders/grid_update.wgsl")
);
const DIRECT_UPDATE_SHADER: &str = concat!(
    include_str!("../shaders/common.wgsl"),
    include_str!("../shaders/direct_update.wgsl")
);

pub struct GpuPipeline {
    device: wgpu::Device,
    queue: wgpu::Queue,

    config: SimulationConfig,
    grid: Grid,
    params: PipelineParams,
    max_groups_per_dimension: u32,
    cell_groups: (u32, u32),

    // Buffers
    state_buffer: wgpu::Buffer,
    scratch_buffer: wgpu::Buffer,
    mass_buffer: wgpu::Buffer,
    cell_index_buffer: wgpu::Buffer,
    cell_mass_buffer: wgpu::Buffer,
    cell_weighted_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,

    // Kernels
    cell_index_pipeline: wgpu::ComputePipeline,
    cell_aggregate_pipeline: wgpu::ComputePipeline,
    grid_update_pipeline: wgpu::ComputePipeline,
    direct_update_pipeline: wgpu::ComputePipeline,

    cell_index_bind_group: wgpu::BindGroup,
    cell_aggregate_bind_group: wgpu::BindGroup,
    grid_update_bind_group: wgpu::BindGroup,
    direct_update_bind_group: wgpu::BindGroup,
}

impl GpuPipeline {
    pub async fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: &SimulationConfig,
    ) -> Result<Self> {
        log::info!("Initializing GpuPipeline...");
        let grid = config.validate()?;
        let capacity = config.capacity;
        let total_cells = grid.total_cells();

        let limits = device.limits();
        let binding_limit =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        let state_bytes = u64::from(capacity) * STATE_SIZE;
        let cell_bytes = u64::from(total_cells) * CELL_SUM_SIZE;
        check_limit("particle state buffer", state_bytes, binding_limit)?;
        check_limit("cell aggregate buffer", cell_bytes, binding_limit)?;

        let max_groups_per_dimension = limits.max_compute_workgroups_per_dimension;
        split_dispatch(
            capacity.div_ceil(WORKGROUP_SIZE),
            max_groups_per_dimension,
            "particle workgroups",
        )?;
        let cell_groups = split_dispatch(total_cells, max_groups_per_dimension, "cell workgroups")?;

        let mut params = PipelineParams::new(&grid, 0, config.softening);
        params.set_step(nbody_physics::MIN_DELTA_TIME, config.gravity_constant);

        // Allocation failures surface here rather than on the first tick
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let state_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle State Buffer"),
            size: state_bytes,
            // VERTEX so a renderer sharing the device can draw straight from it
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let scratch_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Scratch Buffer"),
            size: state_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let mass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Mass Buffer"),
            size: u64::from(capacity) * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cell_index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Index Buffer"),
            size: u64::from(capacity) * 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let cell_mass_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Mass Buffer"),
            size: u64::from(total_cells) * 4,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        // xyz: Σ m·x, w: unused
        let cell_weighted_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cell Weighted Position Buffer"),
            size: cell_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pipeline Params Buffer"),
            size: std::mem::size_of::<PipelineParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if let Some(error) = device.pop_error_scope().await {
            log::error!("Buffer allocation failed: {error}");
            // states + scratch, masses + cell indices, both cell sum buffers
            let bytes = 2 * state_bytes
                + 8 * u64::from(capacity)
                + cell_bytes
                + 4 * u64::from(total_cells);
            return Err(SimulationError::OutOfMemory { bytes, capacity });
        }
        log::debug!(
            "Allocated buffers: {} particle slots, {} cells",
            capacity,
            total_cells
        );

        let cell_index_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cell Index Bind Group Layout"),
            entries: &[uniform_entry(0), storage_entry(1, true), storage_entry(2, false)],
        });

        let cell_aggregate_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Cell Aggregate Bind Group Layout"),
                entries: &[
                    uniform_entry(0),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, true),
                    storage_entry(4, false),
                    storage_entry(5, false),
                ],
            });

        let grid_update_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Grid Update Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, false),
            ],
        });

        let direct_update_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Direct Update Bind Group Layout"),
                entries: &[
                    uniform_entry(0),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, false),
                ],
            });

        let cell_index_pipeline =
            build_kernel(&device, "cell_index", CELL_INDEX_SHADER, &cell_index_layout).await?;
        let cell_aggregate_pipeline = build_kernel(
            &device,
            "cell_aggregate",
            CELL_AGGREGATE_SHADER,
            &cell_aggregate_layout,
        )
        .await?;
        let grid_update_pipeline =
            build_kernel(&device, "grid_update", GRID_UPDATE_SHADER, &grid_update_layout).await?;
        let direct_update_pipeline = build_kernel(
            &device,
            "direct_update",
            DIRECT_UPDATE_SHADER,
            &direct_update_layout,
        )
        .await?;
        log::info!("Kernels built");

        let cell_index_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cell Index Bind Group"),
            layout: &cell_index_layout,
            entries: &bind_entries(&[&params_buffer, &state_buffer, &cell_index_buffer]),
        });

        let cell_aggregate_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cell Aggregate Bind Group"),
            layout: &cell_aggregate_layout,
            entries: &bind_entries(&[
                &params_buffer,
                &state_buffer,
                &mass_buffer,
                &cell_index_buffer,
                &cell_mass_buffer,
                &cell_weighted_buffer,
            ]),
        });

        let grid_update_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Grid Update Bind Group"),
            layout: &grid_update_layout,
            entries: &bind_entries(&[
                &params_buffer,
                &state_buffer,
                &mass_buffer,
                &cell_index_buffer,
                &cell_mass_buffer,
                &cell_weighted_buffer,
                &scratch_buffer,
            ]),
        });

        let direct_update_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Direct Update Bind Group"),
            layout: &direct_update_layout,
            entries: &bind_entries(&[&params_buffer, &state_buffer, &mass_buffer, &scratch_buffer]),
        });

        let pipeline = Self {
            device,
            queue,
            config: *config,
            grid,
            params,
            max_groups_per_dimension,
            cell_groups,
            state_buffer,
            scratch_buffer,
            mass_buffer,
            cell_index_buffer,
            cell_mass_buffer,
            cell_weighted_buffer,
            params_buffer,
            cell_index_pipeline,
            cell_aggregate_pipeline,
            grid_update_pipeline,
            direct_update_pipeline,
            cell_index_bind_group,
            cell_aggregate_bind_group,
            grid_update_bind_group,
            direct_update_bind_group,
        };
        pipeline.write_params();

        log::info!("GpuPipeline ready");
        Ok(pipeline)
    }

    /// Device and queue from a fresh headless [`GpuContext`].
    pub async fn headless(config: &SimulationConfig) -> Result<Self> {
        let context = GpuContext::new().await?;
        Self::new(context.device, context.queue, config).await
    }

    /// Particle states, valid for `particle_count` slots. Read-only for
    /// anyone but the pipeline.
    pub fn state_buffer(&self) -> &wgpu::Buffer {
        &self.state_buffer
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn write_params(&self) {
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&self.params));
    }

    fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        let index = self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: None,
        })?;
        Ok(())
    }

    fn read_buffer<T: bytemuck::Pod>(&self, source: &wgpu::Buffer, len: usize) -> Result<Vec<T>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let size = (len * std::mem::size_of::<T>()) as u64;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: None,
        })?;
        rx.recv().map_err(|_| SimulationError::ReadbackLost)??;

        let data = slice.get_mapped_range();
        let values = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        staging.unmap();

        Ok(values)
    }

    fn encode_pass(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: (u32, u32),
    ) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(pipeline);
        compute_pass.set_bind_group(0, bind_group, &[]);
        compute_pass.dispatch_workgroups(groups.0, groups.1, 1);
    }
}

impl Pipeline for GpuPipeline {
    type Surface = wgpu::Buffer;

    fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn particle_count(&self) -> u32 {
        self.params.particle_count()
    }

    fn upload(&mut self, states: &[ParticleState], masses: &[f32]) -> Result<()> {
        let count = check_upload(self.config.capacity, states, masses)?;

        if count > 0 {
            self.queue
                .write_buffer(&self.state_buffer, 0, bytemuck::cast_slice(states));
            self.queue
                .write_buffer(&self.mass_buffer, 0, bytemuck::cast_slice(masses));
        }
        self.params.set_particle_count(count);
        self.write_params();

        // Readbacks before the first tick report empty cells
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Upload Encoder"),
            });
        encoder.clear_buffer(&self.cell_index_buffer, 0, None);
        encoder.clear_buffer(&self.cell_mass_buffer, 0, None);
        encoder.clear_buffer(&self.cell_weighted_buffer, 0, None);
        self.submit_and_wait(encoder)?;

        log::debug!("Uploaded {} particles", count);
        Ok(())
    }

    fn tick(&mut self, step: StepInput) -> Result<()> {
        self.params.set_step(step.delta_time, step.gravity_constant);
        let count = self.params.particle_count();
        if count == 0 {
            self.write_params();
            return Ok(());
        }

        let particle_groups = split_dispatch(
            count.div_ceil(WORKGROUP_SIZE),
            self.max_groups_per_dimension,
            "particle workgroups",
        )?;
        self.params
            .set_dispatch_widths(particle_groups.0, self.cell_groups.0);
        self.write_params();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Simulation Encoder"),
            });

        match self.config.method {
            Method::Grid => {
                // Stage 1: bin particles
                Self::encode_pass(
                    &mut encoder,
                    "Cell Index Pass",
                    &self.cell_index_pipeline,
                    &self.cell_index_bind_group,
                    particle_groups,
                );
                // Stage 2: one workgroup per cell
                Self::encode_pass(
                    &mut encoder,
                    "Cell Aggregate Pass",
                    &self.cell_aggregate_pipeline,
                    &self.cell_aggregate_bind_group,
                    self.cell_groups,
                );
                // Stage 3: forces + integration into scratch
                Self::encode_pass(
                    &mut encoder,
                    "Grid Update Pass",
                    &self.grid_update_pipeline,
                    &self.grid_update_bind_group,
                    particle_groups,
                );
            }
            Method::Direct => {
                Self::encode_pass(
                    &mut encoder,
                    "Direct Update Pass",
                    &self.direct_update_pipeline,
                    &self.direct_update_bind_group,
                    particle_groups,
                );
            }
        }

        encoder.copy_buffer_to_buffer(
            &self.scratch_buffer,
            0,
            &self.state_buffer,
            0,
            u64::from(count) * STATE_SIZE,
        );

        self.submit_and_wait(encoder)
    }

    fn read_states(&self) -> Result<Vec<ParticleState>> {
        self.read_buffer(&self.state_buffer, self.particle_count() as usize)
    }

    fn read_cell_indices(&self) -> Result<Vec<u32>> {
        self.read_buffer(&self.cell_index_buffer, self.particle_count() as usize)
    }

    fn read_cell_aggregates(&self) -> Result<Vec<CellAggregate>> {
        let total = self.grid.total_cells() as usize;
        let masses: Vec<f32> = self.read_buffer(&self.cell_mass_buffer, total)?;
        let weighted: Vec<[f32; 4]> = self.read_buffer(&self.cell_weighted_buffer, total)?;

        Ok(masses
            .into_iter()
            .zip(weighted)
            .map(|(mass, w)| CellAggregate {
                mass,
                weighted_position: Vec3::new(w[0], w[1], w[2]),
            })
            .collect())
    }

    fn surface(&self) -> &wgpu::Buffer {
        &self.state_buffer
    }
}

async fn build_kernel(
    device: &wgpu::Device,
    kernel: &'static str,
    source: &'static str,
    layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::ComputePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kernel),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(kernel),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    match device.pop_error_scope().await {
        Some(error) => {
            log::error!("Kernel `{kernel}` failed to build: {error}");
            Err(SimulationError::KernelBuild {
                kernel,
                message: error.to_string(),
            })
        }
        None => Ok(pipeline),
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(binding, wgpu::BufferBindingType::Uniform)
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(binding, wgpu::BufferBindingType::Storage { read_only })
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Bind each buffer whole, at bindings 0, 1, 2... in order.
fn bind_entries<'a>(buffers: &[&'a wgpu::Buffer]) -> Vec<wgpu::BindGroupEntry<'a>> {
    buffers
        .iter()
        .zip(0u32..)
        .map(|(&buffer, binding)| wgpu::BindGroupEntry {
            binding,
            resource: buffer.as_entire_binding(),
        })
        .collect()
}

fn check_limit(what: &'static str, requested: u64, limit: u64) -> Result<()> {
    if requested > limit {
        Err(SimulationError::DeviceLimit {
            what,
            requested,
            limit,
        })
    } else {
        Ok(())
    }
}

/// Lay `groups` workgroups out as an (x, y) launch within the
/// per-dimension limit. Kernels rebuild the linear id from x and y.
pub(crate) fn split_dispatch(
    groups: u32,
    max_per_dimension: u32,
    what: &'static str,
) -> Result<(u32, u32)> {
    if groups <= max_per_dimension {
        return Ok((groups, 1));
    }
    let rows = groups.div_ceil(max_per_dimension);
    if rows > max_per_dimension {
        return Err(SimulationError::DeviceLimit {
            what,
            requested: u64::from(groups),
            limit: u64::from(max_per_dimension) * u64::from(max_per_dimension),
        });
    }
    Ok((max_per_dimension, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_dispatch_stays_one_dimensional() {
        assert_eq!(split_dispatch(40, 65535, "cells").unwrap(), (40, 1));
        assert_eq!(split_dispatch(65535, 65535, "cells").unwrap(), (65535, 1));
    }

    #[test]
    fn large_dispatch_folds_into_rows() {
        // 2^20 cells at a limit of 65535 groups per dimension
        let (x, y) = split_dispatch(1 << 20, 65535, "cells").unwrap();
        assert_eq!(x, 65535);
        assert_eq!(y, 17);
        assert!(u64::from(x) * u64::from(y) >= 1 << 20);
    }

    #[test]
    fn dispatch_beyond_two_dimensions_is_rejected() {
        assert!(matches!(
            split_dispatch(101, 10, "particle workgroups"),
            Err(SimulationError::DeviceLimit { what: "particle workgroups", .. })
        ));
    }
}
