//! Per-tick uniform parameters shared by all three compute stages

use bytemuck::{Pod, Zeroable};
use nbody_physics::{Dimension, Grid};

/// Uniform block read by every kernel. Mirrors `Params` in the WGSL sources.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PipelineParams {
    // Group 1: Grid topology
    // x: nx, y: ny, z: nz, w: total cells
    pub dims: [u32; 4],

    // Group 2: World origin + gravity
    // xyz: world min, w: G
    pub world_min: [f32; 4],

    // Group 3: Binning + integration
    // xyz: inverse cell size (z is 0 for planar grids), w: dt
    pub inv_cell_size: [f32; 4],

    // Group 4: Counts
    // x: active particles, y: particle dispatch width (workgroups along x),
    // z: cell dispatch width (workgroups along x), w: spatial axes (2 or 3)
    pub counts: [u32; 4],

    // Group 5: Tuning
    // x: softening, y: padding, z: padding, w: padding
    pub tuning: [f32; 4],
}

impl PipelineParams {
    pub fn new(grid: &Grid, particle_count: u32, softening: f32) -> Self {
        let dims = grid.dims();
        let inv = grid.inv_cell_size();
        let min = grid.world_min();
        let axes = match grid.dimension() {
            Dimension::Two => 2,
            Dimension::Three => 3,
        };

        Self {
            dims: [dims.x, dims.y, dims.z, grid.total_cells()],
            world_min: [min.x, min.y, min.z, nbody_physics::G],
            inv_cell_size: [inv.x, inv.y, inv.z, 0.0],
            counts: [particle_count, 0, 0, axes],
            tuning: [softening, 0.0, 0.0, 0.0],
        }
    }

    pub fn particle_count(&self) -> u32 {
        self.counts[0]
    }

    pub fn set_particle_count(&mut self, count: u32) {
        self.counts[0] = count;
    }

    pub fn set_step(&mut self, delta_time: f32, gravity_constant: f32) {
        self.inv_cell_size[3] = delta_time;
        self.world_min[3] = gravity_constant;
    }

    pub fn set_dispatch_widths(&mut self, particle_groups_x: u32, cell_groups_x: u32) {
        self.counts[1] = particle_groups_x;
        self.counts[2] = cell_groups_x;
    }

    pub fn delta_time(&self) -> f32 {
        self.inv_cell_size[3]
    }

    pub fn gravity_constant(&self) -> f32 {
        self.world_min[3]
    }

    pub fn softening(&self) -> f32 {
        self.tuning[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbody_physics::GridConfig;

    #[test]
    fn uniform_is_vec4_aligned() {
        assert_eq!(std::mem::size_of::<PipelineParams>(), 80);
        assert_eq!(std::mem::size_of::<PipelineParams>() % 16, 0);
    }

    #[test]
    fn packs_grid_and_step() {
        let grid = Grid::new(&GridConfig::square(8, 2.0)).unwrap();
        let mut params = PipelineParams::new(&grid, 100, 0.001);
        params.set_step(0.0005, 2.5);

        assert_eq!(params.dims, [8, 8, 1, 64]);
        assert_eq!(params.counts[3], 2);
        assert_eq!(params.inv_cell_size, [2.0, 2.0, 0.0, 0.0005]);
        assert_eq!(params.gravity_constant(), 2.5);
        assert_eq!(params.particle_count(), 100);
    }
}
