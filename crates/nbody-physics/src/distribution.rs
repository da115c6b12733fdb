//! Initial particle layouts used by simulation reset
//!
//! Every layout is generated inside the world box of the grid so the first
//! cell assignment starts with nothing clamped. Masses are uniform.

use glam::{Vec2, Vec3};
use rand::Rng;
use std::f32::consts::TAU;

use crate::constants::{MAX_SPIRAL_ARMS, SWIRL_SPEED};
use crate::error::ConfigError;
use crate::grid::{Dimension, Grid};
use crate::particle::ParticleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distribution {
    /// Uniform random over the world box
    #[default]
    Uniform,
    /// Evenly spaced points on a circle in the xy plane
    Ring,
    /// Uniform random inside a triangle in the xy plane
    Triangle,
    /// Normally distributed blob around the world center
    Gaussian,
    /// Logarithmic spiral arms around the world center
    Spiral { arms: u32 },
}

impl Distribution {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Distribution::Spiral { arms } if arms == 0 || arms > MAX_SPIRAL_ARMS => {
                Err(ConfigError::InvalidSpiralArms {
                    arms,
                    max: MAX_SPIRAL_ARMS,
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitialVelocity {
    Zero,
    /// Each axis uniform in [-max_speed, max_speed]
    Random { max_speed: f32 },
    /// Every other particle gets a tangential kick whose angle walks once
    /// around the circle over the array
    #[default]
    Swirl,
}

/// Positions, velocities and masses for `count` particles.
pub fn generate<R: Rng + ?Sized>(
    grid: &Grid,
    distribution: Distribution,
    velocity: InitialVelocity,
    count: usize,
    mass: f32,
    rng: &mut R,
) -> Result<(Vec<ParticleState>, Vec<f32>), ConfigError> {
    distribution.validate()?;
    if !(mass.is_finite() && mass > 0.0) {
        return Err(ConfigError::InvalidMass { index: 0, mass });
    }

    let center = (grid.world_min() + grid.world_max()) * 0.5;
    let half = (grid.world_max() - grid.world_min()) * 0.5;
    let planar = grid.dimension() == Dimension::Two;

    let positions: Vec<Vec3> = (0..count)
        .map(|i| {
            let local = match distribution {
                Distribution::Uniform => uniform(rng, half),
                Distribution::Ring => ring(i, count, half),
                Distribution::Triangle => triangle(rng, half),
                Distribution::Gaussian => gaussian(rng, half),
                Distribution::Spiral { arms } => spiral(rng, i, arms, half),
            };
            let mut p = center + local;
            if planar {
                p.z = 0.0;
            }
            p
        })
        .collect();

    let velocities = initial_velocities(rng, velocity, count, planar);

    let states = positions
        .into_iter()
        .zip(velocities)
        .map(|(p, v)| ParticleState::new(p, v))
        .collect();

    Ok((states, vec![mass; count]))
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, half: Vec3) -> Vec3 {
    Vec3::new(
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
    ) * half
}

fn ring(i: usize, count: usize, half: Vec3) -> Vec3 {
    let angle = i as f32 / count.max(1) as f32 * TAU;
    let radius = 0.25 * half.x.min(half.y);
    Vec3::new(radius * angle.sin(), radius * angle.cos(), 0.0)
}

fn triangle<R: Rng + ?Sized>(rng: &mut R, half: Vec3) -> Vec3 {
    let scale = 0.8 * half.x.min(half.y);
    let a = Vec2::new(0.0, 1.0) * scale;
    let b = Vec2::new(-0.866, -0.5) * scale;
    let c = Vec2::new(0.866, -0.5) * scale;

    // Fold the unit square onto the triangle
    let (mut u, mut v): (f32, f32) = (rng.random(), rng.random());
    if u + v > 1.0 {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    let p = a + (b - a) * u + (c - a) * v;
    p.extend(0.0)
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, half: Vec3) -> Vec3 {
    let sigma = half * 0.15;
    let sample = Vec3::new(normal(rng), normal(rng), normal(rng)) * sigma;
    sample.clamp(-half, half)
}

fn spiral<R: Rng + ?Sized>(rng: &mut R, i: usize, arms: u32, half: Vec3) -> Vec3 {
    let extent = 0.9 * half.x.min(half.y);
    let arm = (i as u32 % arms) as f32;
    let t: f32 = rng.random();
    let radius = 0.05 * extent + t * 0.95 * extent;
    // Two full turns from core to rim
    let angle = arm / arms as f32 * TAU + t * 2.0 * TAU;
    let jitter = 0.04 * extent;
    let scatter = Vec2::new(normal(rng), normal(rng)) * jitter;
    let thickness = normal(rng) * 0.02 * half.z;

    let p = Vec2::from_angle(angle) * radius + scatter;
    Vec3::new(p.x, p.y, thickness).clamp(-half, half)
}

/// Standard normal sample via Box-Muller
fn normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f32 = rng.random_range(f32::EPSILON..1.0);
    let u2: f32 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

fn initial_velocities<R: Rng + ?Sized>(
    rng: &mut R,
    velocity: InitialVelocity,
    count: usize,
    planar: bool,
) -> Vec<Vec3> {
    let mut velocities = vec![Vec3::ZERO; count];

    match velocity {
        InitialVelocity::Zero => {}
        InitialVelocity::Random { max_speed } => {
            for v in velocities.iter_mut() {
                *v = Vec3::new(
                    rng.random_range(-1.0..=1.0),
                    rng.random_range(-1.0..=1.0),
                    if planar { 0.0 } else { rng.random_range(-1.0..=1.0) },
                ) * max_speed;
            }
        }
        InitialVelocity::Swirl => {
            let half_count = (count / 2).max(1) as f32;
            for (i, v) in velocities.iter_mut().enumerate().step_by(2) {
                let angle = i as f32 / half_count * TAU;
                *v = Vec3::new(-angle.cos() * SWIRL_SPEED, angle.sin() * SWIRL_SPEED, 0.0);
            }
        }
    }

    velocities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cube() -> Grid {
        Grid::new(&GridConfig::cube(8, 1.0)).unwrap()
    }

    #[test]
    fn layouts_stay_inside_world() {
        let grid = cube();
        let mut rng = StdRng::seed_from_u64(7);
        for distribution in [
            Distribution::Uniform,
            Distribution::Ring,
            Distribution::Triangle,
            Distribution::Gaussian,
            Distribution::Spiral { arms: 3 },
        ] {
            let (states, masses) =
                generate(&grid, distribution, InitialVelocity::Zero, 500, 1.0, &mut rng).unwrap();
            assert_eq!(states.len(), 500);
            assert_eq!(masses.len(), 500);
            for s in &states {
                let p = s.position();
                assert!(
                    p.cmpge(grid.world_min()).all() && p.cmple(grid.world_max()).all(),
                    "{distribution:?} produced {p}"
                );
            }
        }
    }

    #[test]
    fn planar_layouts_have_flat_z() {
        let grid = Grid::new(&GridConfig::square(8, 1.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let (states, _) = generate(
            &grid,
            Distribution::Gaussian,
            InitialVelocity::Random { max_speed: 0.5 },
            100,
            1.0,
            &mut rng,
        )
        .unwrap();
        assert!(states.iter().all(|s| s.position[2] == 0.0 && s.velocity[2] == 0.0));
    }

    #[test]
    fn swirl_kicks_every_other_particle() {
        let grid = cube();
        let mut rng = StdRng::seed_from_u64(3);
        let (states, _) =
            generate(&grid, Distribution::Ring, InitialVelocity::Swirl, 10, 1.0, &mut rng).unwrap();
        assert!((states[0].velocity() - Vec3::new(-SWIRL_SPEED, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(states[1].velocity(), Vec3::ZERO);
        assert!((states[2].velocity().length() - SWIRL_SPEED).abs() < 1e-5);
    }

    #[test]
    fn rejects_bad_spiral_and_mass() {
        let grid = cube();
        let mut rng = StdRng::seed_from_u64(0);
        let mut attempt = |distribution, mass| {
            generate(&grid, distribution, InitialVelocity::Zero, 4, mass, &mut rng)
        };
        assert_eq!(
            attempt(Distribution::Spiral { arms: 0 }, 1.0).unwrap_err(),
            ConfigError::InvalidSpiralArms { arms: 0, max: 4 }
        );
        assert!(attempt(Distribution::Spiral { arms: 5 }, 1.0).is_err());
        assert!(attempt(Distribution::Uniform, 0.0).is_err());
    }

    #[test]
    fn same_seed_same_layout() {
        let grid = cube();
        let layout = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let velocity = InitialVelocity::Random { max_speed: 1.0 };
            generate(&grid, Distribution::Uniform, velocity, 64, 1.0, &mut rng).unwrap()
        };
        assert_eq!(layout(9), layout(9));
        assert_ne!(layout(9), layout(10));
    }
}
