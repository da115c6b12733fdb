//! Uniform spatial grid
//!
//! The grid is an axis-aligned partition of the world box into
//! `nx × ny × nz` cells. Topology is fixed once built; only what the cells
//! contain changes from step to step.
//!
//! 2D grids are represented with `nz == 1`. The z axis is ignored for cell
//! assignment, so every particle lands on layer 0 and the flattened index
//! reduces to `x + y * nx`.

use glam::{UVec3, Vec3};

use crate::constants::{GRID_CELLS_PER_AXIS, WORLD_HALF_EXTENT};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Two,
    Three,
}

impl Dimension {
    /// Number of spatial axes that take part in binning and forces
    pub fn axes(self) -> usize {
        match self {
            Dimension::Two => 2,
            Dimension::Three => 3,
        }
    }
}

/// User-facing grid description, validated into a [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub dimension: Dimension,
    /// Cells per axis. For 2D the z count must be 1.
    pub cells: [u32; 3],
    pub world_min: [f32; 3],
    pub world_max: [f32; 3],
}

impl GridConfig {
    pub fn cube(cells_per_axis: u32, half_extent: f32) -> Self {
        Self {
            dimension: Dimension::Three,
            cells: [cells_per_axis; 3],
            world_min: [-half_extent; 3],
            world_max: [half_extent; 3],
        }
    }

    pub fn square(cells_per_axis: u32, half_extent: f32) -> Self {
        Self {
            dimension: Dimension::Two,
            cells: [cells_per_axis, cells_per_axis, 1],
            world_min: [-half_extent, -half_extent, 0.0],
            world_max: [half_extent, half_extent, 0.0],
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::cube(GRID_CELLS_PER_AXIS, WORLD_HALF_EXTENT)
    }
}

/// Validated, immutable grid topology
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    dimension: Dimension,
    dims: UVec3,
    world_min: Vec3,
    world_max: Vec3,
    cell_size: Vec3,
    inv_cell_size: Vec3,
}

impl Grid {
    pub fn new(config: &GridConfig) -> Result<Self, ConfigError> {
        let axes = config.dimension.axes();

        for (axis, &count) in config.cells.iter().enumerate() {
            if count == 0 {
                return Err(ConfigError::InvalidCellCount { axis, count });
            }
        }
        if config.dimension == Dimension::Two && config.cells[2] != 1 {
            return Err(ConfigError::PlanarDepth(config.cells[2]));
        }
        // Flattened indices are u32, so the product must fit
        let [nx, ny, nz] = config.cells;
        if nx.checked_mul(ny).and_then(|layer| layer.checked_mul(nz)).is_none() {
            return Err(ConfigError::TooManyCells {
                cells: config.cells,
            });
        }

        for axis in 0..axes {
            let (min, max) = (config.world_min[axis], config.world_max[axis]);
            // NaN bounds fail this comparison too
            if !(min < max) || !min.is_finite() || !max.is_finite() {
                return Err(ConfigError::DegenerateBounds { axis, min, max });
            }
        }

        let dims = UVec3::from_array(config.cells);
        let mut world_min = Vec3::from_array(config.world_min);
        let mut world_max = Vec3::from_array(config.world_max);
        if config.dimension == Dimension::Two {
            world_min.z = 0.0;
            world_max.z = 0.0;
        }

        let extent = world_max - world_min;
        let mut cell_size = extent / dims.as_vec3();
        let mut inv_cell_size = dims.as_vec3() / extent;
        if config.dimension == Dimension::Two {
            // A zero inverse size pins every particle to layer 0
            cell_size.z = 0.0;
            inv_cell_size.z = 0.0;
        }

        Ok(Self {
            dimension: config.dimension,
            dims,
            world_min,
            world_max,
            cell_size,
            inv_cell_size,
        })
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn world_min(&self) -> Vec3 {
        self.world_min
    }

    pub fn world_max(&self) -> Vec3 {
        self.world_max
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn inv_cell_size(&self) -> Vec3 {
        self.inv_cell_size
    }

    pub fn total_cells(&self) -> u32 {
        self.dims.x * self.dims.y * self.dims.z
    }

    /// Integer cell coordinates of a position, clamped per axis into the grid.
    ///
    /// Positions outside the world box are absorbed by the nearest boundary
    /// cell rather than rejected.
    pub fn cell_coords(&self, position: Vec3) -> UVec3 {
        let raw = ((position - self.world_min) * self.inv_cell_size).floor();
        let max = (self.dims - UVec3::ONE).as_vec3();
        // Clamp in float space so negatives and huge values never wrap.
        // NaN falls to 0 through the max() inside clamp.
        raw.clamp(Vec3::ZERO, max).as_uvec3()
    }

    pub fn cell_index(&self, position: Vec3) -> u32 {
        self.flatten(self.cell_coords(position))
    }

    pub fn flatten(&self, coords: UVec3) -> u32 {
        coords.x + coords.y * self.dims.x + coords.z * self.dims.x * self.dims.y
    }

    pub fn decode(&self, index: u32) -> UVec3 {
        let layer = self.dims.x * self.dims.y;
        UVec3::new(
            index % self.dims.x,
            (index / self.dims.x) % self.dims.y,
            index / layer,
        )
    }

    /// True when two cells are the same or adjacent on every axis
    /// (Chebyshev distance ≤ 1). This is the exact-force neighborhood.
    pub fn is_near(a: UVec3, b: UVec3) -> bool {
        let d = (a.as_ivec3() - b.as_ivec3()).abs();
        d.max_element() <= 1
    }

    pub fn is_near_index(&self, a: u32, b: u32) -> bool {
        Self::is_near(self.decode(a), self.decode(b))
    }
}
