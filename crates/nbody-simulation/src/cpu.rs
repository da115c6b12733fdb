//! Multithreaded CPU backend
//!
//! Runs the same three stages as the GPU kernels with rayon. Used as the
//! reference for parity tests and as the explicit `NBODY_BACKEND=cpu` choice
//! on machines without a compute adapter.

use crate::{
    error::Result,
    pipeline::{check_upload, Pipeline, WORKGROUP_SIZE},
    Method, PipelineParams, SimulationConfig, StepInput,
};
use nbody_physics::{
    direct_acceleration, far_field_acceleration, near_field_acceleration, CellAggregate,
    Dimension, Grid, ParticleState,
};
use rayon::prelude::*;

/// How stage 2 groups particles by cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationStrategy {
    /// Counting sort by cell, then one contiguous sum per cell
    #[default]
    Partition,
    /// Lane-for-lane emulation of the GPU kernel: strided scan over all
    /// particles per cell, then a halving tree reduction of the partials
    Scan,
}

pub struct CpuPipeline {
    config: SimulationConfig,
    grid: Grid,
    strategy: AggregationStrategy,
    params: PipelineParams,

    states: Vec<ParticleState>,
    scratch: Vec<ParticleState>,
    masses: Vec<f32>,
    cell_indices: Vec<u32>,
    cells: Vec<CellAggregate>,
}

impl CpuPipeline {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let grid = config.validate()?;
        let params = PipelineParams::new(&grid, 0, config.softening);
        log::info!(
            "CPU pipeline: {} cells, capacity {}, {:?}",
            grid.total_cells(),
            config.capacity,
            config.method
        );

        Ok(Self {
            config: *config,
            strategy: AggregationStrategy::default(),
            params,
            states: Vec::with_capacity(config.capacity as usize),
            scratch: Vec::with_capacity(config.capacity as usize),
            masses: Vec::with_capacity(config.capacity as usize),
            cell_indices: Vec::with_capacity(config.capacity as usize),
            cells: vec![CellAggregate::default(); grid.total_cells() as usize],
            grid,
        })
    }

    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> AggregationStrategy {
        self.strategy
    }

    fn assign_cells(&mut self) {
        let grid = &self.grid;
        self.states
            .par_iter()
            .map(|state| grid.cell_index(state.position()))
            .collect_into_vec(&mut self.cell_indices);
    }

    fn aggregate(&mut self) {
        self.cells = match self.strategy {
            AggregationStrategy::Partition => aggregate_partitioned(
                self.grid.total_cells(),
                &self.states,
                &self.masses,
                &self.cell_indices,
            ),
            AggregationStrategy::Scan => aggregate_scanned(
                self.grid.total_cells(),
                &self.states,
                &self.masses,
                &self.cell_indices,
            ),
        };
    }

    fn integrate(&mut self) {
        let g = self.params.gravity_constant();
        let dt = self.params.delta_time();
        let softening = self.params.softening();
        let planar = self.grid.dimension() == Dimension::Two;

        let grid = &self.grid;
        let method = self.config.method;
        let states = &self.states;
        let masses = &self.masses;
        let cell_indices = &self.cell_indices;
        let cells = &self.cells;

        // Reads come from `states` only; results land in `scratch`
        (0..states.len())
            .into_par_iter()
            .map(|i| {
                let mut acceleration = match method {
                    Method::Grid => {
                        near_field_acceleration(grid, i, states, masses, cell_indices, g, softening)
                            + far_field_acceleration(
                                grid,
                                states[i].position(),
                                cell_indices[i],
                                cells,
                                g,
                                softening,
                            )
                    }
                    Method::Direct => direct_acceleration(i, states, masses, g, softening),
                };
                if planar {
                    acceleration.z = 0.0;
                }
                states[i].kick_drift(acceleration, dt)
            })
            .collect_into_vec(&mut self.scratch);

        std::mem::swap(&mut self.states, &mut self.scratch);
    }
}

impl Pipeline for CpuPipeline {
    type Surface = [ParticleState];

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

        self.states.clear();
        self.states.extend_from_slice(states);
        self.masses.clear();
        self.masses.extend_from_slice(masses);
        self.cell_indices.clear();
        self.cell_indices.resize(states.len(), 0);
        self.cells.fill(CellAggregate::default());
        self.params.set_particle_count(count);

        log::debug!("Uploaded {} particles", count);
        Ok(())
    }

    fn tick(&mut self, step: StepInput) -> Result<()> {
        self.params.set_step(step.delta_time, step.gravity_constant);
        if self.states.is_empty() {
            return Ok(());
        }

        if self.config.method == Method::Grid {
            self.assign_cells();
            self.aggregate();
        }
        self.integrate();
        Ok(())
    }

    fn read_states(&self) -> Result<Vec<ParticleState>> {
        Ok(self.states.clone())
    }

    fn read_cell_indices(&self) -> Result<Vec<u32>> {
        Ok(self.cell_indices.clone())
    }

    fn read_cell_aggregates(&self) -> Result<Vec<CellAggregate>> {
        Ok(self.cells.clone())
    }

    fn surface(&self) -> &[ParticleState] {
        &self.states
    }
}

/// Bucket particles by cell with a counting sort, then sum each bucket.
pub fn aggregate_partitioned(
    total_cells: u32,
    states: &[ParticleState],
    masses: &[f32],
    cell_indices: &[u32],
) -> Vec<CellAggregate> {
    let total = total_cells as usize;

    // offsets[c]..offsets[c + 1] is the bucket of cell c
    let mut offsets = vec![0usize; total + 1];
    for &cell in cell_indices {
        offsets[cell as usize + 1] += 1;
    }
    for c in 0..total {
        offsets[c + 1] += offsets[c];
    }

    let mut cursor = offsets.clone();
    let mut order = vec![0usize; cell_indices.len()];
    for (i, &cell) in cell_indices.iter().enumerate() {
        let slot = &mut cursor[cell as usize];
        order[*slot] = i;
        *slot += 1;
    }

    (0..total)
        .into_par_iter()
        .map(|c| {
            order[offsets[c]..offsets[c + 1]]
                .iter()
                .fold(CellAggregate::default(), |mut cell, &i| {
                    cell.accumulate(states[i].position(), masses[i]);
                    cell
                })
        })
        .collect()
}

/// One emulated workgroup per cell, summed in the same order the kernel does.
pub fn aggregate_scanned(
    total_cells: u32,
    states: &[ParticleState],
    masses: &[f32],
    cell_indices: &[u32],
) -> Vec<CellAggregate> {
    let lanes = WORKGROUP_SIZE as usize;

    (0..total_cells)
        .into_par_iter()
        .map(|cell| {
            let mut partials = vec![CellAggregate::default(); lanes];
            for (lane, partial) in partials.iter_mut().enumerate() {
                for i in (lane..cell_indices.len()).step_by(lanes) {
                    if cell_indices[i] == cell {
                        partial.accumulate(states[i].position(), masses[i]);
                    }
                }
            }

            let mut stride = lanes / 2;
            while stride > 0 {
                for lane in 0..stride {
                    partials[lane] = partials[lane].merge(partials[lane + stride]);
                }
                stride /= 2;
            }
            partials[0]
        })
        .collect()
}
