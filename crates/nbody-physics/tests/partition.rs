//! Near/far partition checks on the reference math.
//!
//! Every (particle, other particle) pair must be handled exactly once: in the
//! exact near pass, through its cell in the far pass, or skipped as self.

use glam::{UVec3, Vec3};
use nbody_physics::{
    aggregate_cells, direct_acceleration, far_field_acceleration, near_field_acceleration,
    pair_acceleration, CellAggregate, Dimension, Grid, GridConfig, ParticleState, SOFTENING,
};

fn planar_grid(cells: u32) -> Grid {
    Grid::new(&GridConfig {
        dimension: Dimension::Two,
        cells: [cells, cells, 1],
        world_min: [0.0, 0.0, 0.0],
        world_max: [1.0, 1.0, 0.0],
    })
    .unwrap()
}

fn cell_indices(grid: &Grid, states: &[ParticleState]) -> Vec<u32> {
    states.iter().map(|s| grid.cell_index(s.position())).collect()
}

fn far_field(
    grid: &Grid,
    p: usize,
    states: &[ParticleState],
    cells: &[u32],
    aggregates: &[CellAggregate],
) -> Vec3 {
    far_field_acceleration(grid, states[p].position(), cells[p], aggregates, 1.0, SOFTENING)
}

#[test]
fn two_by_two_grid_is_all_near_field() {
    let grid = planar_grid(2);
    let states = [
        ParticleState::at_rest(Vec3::new(0.1, 0.1, 0.0)),
        ParticleState::at_rest(Vec3::new(0.9, 0.9, 0.0)),
    ];
    let cells = cell_indices(&grid, &states);
    assert_eq!(grid.decode(cells[0]), UVec3::new(0, 0, 0));
    assert_eq!(grid.decode(cells[1]), UVec3::new(1, 1, 0));
    assert!(grid.is_near_index(cells[0], cells[1]));

    let masses = [1.0, 1.0];
    let aggregates = aggregate_cells(grid.total_cells(), &states, &masses, &cells);
    let far = far_field(&grid, 0, &states, &cells, &aggregates);
    assert_eq!(far, Vec3::ZERO);

    let near = near_field_acceleration(&grid, 0, &states, &masses, &cells, 1.0, SOFTENING);
    let direct = direct_acceleration(0, &states, &masses, 1.0, SOFTENING);
    assert!((near - direct).length() < 1e-6);
}

#[test]
fn four_by_four_grid_has_genuine_far_field() {
    let grid = planar_grid(4);
    let states = [
        ParticleState::at_rest(Vec3::new(0.1, 0.1, 0.0)),
        ParticleState::at_rest(Vec3::new(0.9, 0.9, 0.0)),
        ParticleState::at_rest(Vec3::new(0.3, 0.3, 0.0)),
    ];
    let masses = [1.0, 2.0, 3.0];
    let cells = cell_indices(&grid, &states);
    assert!(!grid.is_near_index(cells[0], cells[1]));
    assert!(grid.is_near_index(cells[0], cells[2]));

    let aggregates = aggregate_cells(grid.total_cells(), &states, &masses, &cells);

    let near = near_field_acceleration(&grid, 0, &states, &masses, &cells, 1.0, SOFTENING);
    let far = far_field(&grid, 0, &states, &cells, &aggregates);

    // Only particle 2 is near; only particle 1's cell is far
    let origin = states[0].position();
    let expected_near = pair_acceleration(origin, states[2].position(), 3.0, 1.0, SOFTENING);
    let expected_far = pair_acceleration(origin, states[1].position(), 2.0, 1.0, SOFTENING);
    assert!((near - expected_near).length() < 1e-6);
    assert!((far - expected_far).length() < 1e-6);

    // A single particle per cell makes the monopole exact
    let direct = direct_acceleration(0, &states, &masses, 1.0, SOFTENING);
    assert!((near + far - direct).length() < 1e-5);
}

#[test]
fn near_plus_far_matches_direct_with_one_particle_per_cell() {
    // With at most one particle per cell the monopole is exact, so any
    // double-counted or omitted pair shows up as a mismatch against all-pairs.
    let grid = Grid::new(&GridConfig::cube(5, 1.0)).unwrap();
    let states: Vec<ParticleState> = (0..grid.total_cells())
        .map(|c| grid.decode(c))
        .filter(|c| (c.x + c.y + c.z) % 3 == 0)
        .map(|c| {
            let center = grid.world_min() + (c.as_vec3() + 0.5) * grid.cell_size();
            ParticleState::at_rest(center)
        })
        .collect();
    let masses: Vec<f32> = (0..states.len()).map(|i| 1.0 + i as f32 * 0.1).collect();
    let cells = cell_indices(&grid, &states);
    let aggregates = aggregate_cells(grid.total_cells(), &states, &masses, &cells);

    for p in 0..states.len() {
        let near = near_field_acceleration(&grid, p, &states, &masses, &cells, 1.0, SOFTENING);
        let far = far_field(&grid, p, &states, &cells, &aggregates);
        let direct = direct_acceleration(p, &states, &masses, 1.0, SOFTENING);
        let error = (near + far - direct).length();
        assert!(error <= 1e-4 * direct.length().max(1.0), "particle {p}: error {error}");
    }
}

#[test]
fn empty_cells_inject_no_nan() {
    let grid = Grid::new(&GridConfig::cube(6, 1.0)).unwrap();
    let states = [
        ParticleState::at_rest(Vec3::new(-0.9, -0.9, -0.9)),
        ParticleState::at_rest(Vec3::new(0.9, 0.9, 0.9)),
    ];
    let masses = [1.0, 1.0];
    let cells = cell_indices(&grid, &states);
    let aggregates = aggregate_cells(grid.total_cells(), &states, &masses, &cells);

    let empty = aggregates.iter().filter(|c| c.is_empty()).count();
    assert_eq!(empty, aggregates.len() - 2);
    assert!(aggregates
        .iter()
        .filter(|c| c.is_empty())
        .all(|c| *c == CellAggregate::default()));

    let far = far_field(&grid, 0, &states, &cells, &aggregates);
    assert!(far.is_finite());
    assert!(far.x > 0.0);
}
