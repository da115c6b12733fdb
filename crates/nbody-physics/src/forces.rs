//! Gravitational acceleration: exact pair terms and the cell monopole approximation
//!
//! NOTE: These are scalar reference implementations. They back the CPU
//! pipeline and the tests; the GPU kernels mirror the same formulas in WGSL.

use glam::Vec3;

use crate::grid::Grid;
use crate::particle::ParticleState;

/// Acceleration on a particle at `position` caused by a point mass at `other`.
///
/// `r² = |d|² + softening`, scaled by `1/sqrt(r²)³`. Coincident points yield
/// zero because the direction vector is zero, never NaN.
#[inline]
pub fn pair_acceleration(position: Vec3, other: Vec3, mass: f32, g: f32, softening: f32) -> Vec3 {
    let direction = other - position;
    let dist_sqr = direction.length_squared() + softening;
    let inv_dist = 1.0 / dist_sqr.sqrt();
    let inv_dist_cube = inv_dist * inv_dist * inv_dist;
    direction * (g * mass * inv_dist_cube)
}

/// Per-cell reduction output
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellAggregate {
    pub mass: f32,
    /// Σ m·x over member particles
    pub weighted_position: Vec3,
}

impl CellAggregate {
    pub fn is_empty(&self) -> bool {
        self.mass <= 0.0
    }

    /// `None` for empty cells, so nothing ever divides by zero.
    pub fn center_of_mass(&self) -> Option<Vec3> {
        if self.is_empty() {
            None
        } else {
            Some(self.weighted_position / self.mass)
        }
    }

    pub fn accumulate(&mut self, position: Vec3, mass: f32) {
        self.mass += mass;
        self.weighted_position += position * mass;
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            mass: self.mass + other.mass,
            weighted_position: self.weighted_position + other.weighted_position,
        }
    }
}

/// Straightforward serial aggregation. Used as the reference for the
/// parallel reductions.
pub fn aggregate_cells(
    total_cells: u32,
    states: &[ParticleState],
    masses: &[f32],
    cell_indices: &[u32],
) -> Vec<CellAggregate> {
    let mut cells = vec![CellAggregate::default(); total_cells as usize];
    for ((state, &mass), &cell) in states.iter().zip(masses).zip(cell_indices) {
        cells[cell as usize].accumulate(state.position(), mass);
    }
    cells
}

/// Exact sum over every other particle whose cell is within the
/// Chebyshev-1 neighborhood of particle `index`.
pub fn near_field_acceleration(
    grid: &Grid,
    index: usize,
    states: &[ParticleState],
    masses: &[f32],
    cell_indices: &[u32],
    g: f32,
    softening: f32,
) -> Vec3 {
    let position = states[index].position();
    let own_cell = grid.decode(cell_indices[index]);

    states
        .iter()
        .zip(masses)
        .zip(cell_indices)
        .enumerate()
        .filter(|&(j, (_, &cell))| j != index && Grid::is_near(own_cell, grid.decode(cell)))
        .map(|(_, ((other, &mass), _))| {
            pair_acceleration(position, other.position(), mass, g, softening)
        })
        .sum()
}

/// Monopole sum over every non-empty cell outside the near neighborhood.
pub fn far_field_acceleration(
    grid: &Grid,
    position: Vec3,
    own_cell: u32,
    cells: &[CellAggregate],
    g: f32,
    softening: f32,
) -> Vec3 {
    let own = grid.decode(own_cell);

    cells
        .iter()
        .enumerate()
        .filter(|(c, _)| !Grid::is_near(own, grid.decode(*c as u32)))
        .filter_map(|(_, cell)| cell.center_of_mass().map(|com| (com, cell.mass)))
        .map(|(com, mass)| pair_acceleration(position, com, mass, g, softening))
        .sum()
}

/// All-pairs sum for particle `index`; the no-grid variant.
pub fn direct_acceleration(
    index: usize,
    states: &[ParticleState],
    masses: &[f32],
    g: f32,
    softening: f32,
) -> Vec3 {
    let position = states[index].position();
    states
        .iter()
        .zip(masses)
        .enumerate()
        .filter(|&(j, _)| j != index)
        .map(|(_, (other, &mass))| {
            pair_acceleration(position, other.position(), mass, g, softening)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SOFTENING;
    use crate::grid::GridConfig;

    #[test]
    fn pair_points_toward_other() {
        let a = pair_acceleration(Vec3::ZERO, Vec3::X, 2.0, 1.0, 0.0);
        assert!((a - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn coincident_points_are_finite() {
        let a = pair_acceleration(Vec3::ONE, Vec3::ONE, 1.0, 1.0, SOFTENING);
        assert_eq!(a, Vec3::ZERO);
    }

    #[test]
    fn empty_cell_has_no_center() {
        let cell = CellAggregate::default();
        assert!(cell.is_empty());
        assert_eq!(cell.center_of_mass(), None);
    }

    #[test]
    fn far_field_skips_empty_and_near_cells() {
        let grid = Grid::new(&GridConfig::square(4, 1.0)).unwrap();
        let mut cells = vec![CellAggregate::default(); 16];
        // Adjacent to cell 0, must be ignored
        let adjacent = grid.flatten(glam::UVec3::new(1, 1, 0)) as usize;
        cells[adjacent].accumulate(Vec3::new(-0.25, -0.25, 0.0), 5.0);

        let position = Vec3::new(-0.9, -0.9, 0.0);
        let own = grid.cell_index(position);
        let a = far_field_acceleration(&grid, position, own, &cells, 1.0, SOFTENING);
        assert_eq!(a, Vec3::ZERO);

        // Two cells away on x, must contribute
        let far = grid.flatten(glam::UVec3::new(3, 0, 0)) as usize;
        cells[far].accumulate(Vec3::new(0.75, -0.75, 0.0), 1.0);
        let a = far_field_acceleration(&grid, position, own, &cells, 1.0, SOFTENING);
        assert!(a.x > 0.0 && a.is_finite());
    }
}
