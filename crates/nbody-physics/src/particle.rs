//! Particle state record shared with the display layer

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::ConfigError;

/// GPU-compatible interleaved position + velocity record.
/// Aligned for WGSL struct compatibility (two `vec4<f32>`, 32 bytes).
///
/// Mass and cell index live in separate parallel arrays indexed identically.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleState {
    /// xyz position, w unused (kept at 0)
    pub position: [f32; 4],
    /// xyz velocity, w unused (kept at 0)
    pub velocity: [f32; 4],
}

impl ParticleState {
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position: position.extend(0.0).to_array(),
            velocity: velocity.extend(0.0).to_array(),
        }
    }

    pub fn at_rest(position: Vec3) -> Self {
        Self::new(position, Vec3::ZERO)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.position[0], self.position[1], self.position[2])
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::new(self.velocity[0], self.velocity[1], self.velocity[2])
    }

    /// Semi-implicit Euler: the updated velocity feeds the position update.
    pub fn kick_drift(&self, acceleration: Vec3, dt: f32) -> Self {
        let velocity = self.velocity() + acceleration * dt;
        let position = self.position() + velocity * dt;
        Self::new(position, velocity)
    }
}

/// Reject zero, negative and non-finite masses.
pub fn validate_masses(masses: &[f32]) -> Result<(), ConfigError> {
    match masses
        .iter()
        .enumerate()
        .find(|(_, m)| !(m.is_finite() && **m > 0.0))
    {
        Some((index, &mass)) => Err(ConfigError::InvalidMass { index, mass }),
        None => Ok(()),
    }
}

/// Mass-weighted mean position of the whole system.
pub fn center_of_mass(states: &[ParticleState], masses: &[f32]) -> Vec3 {
    let (weighted, total) = states
        .iter()
        .zip(masses)
        .fold((Vec3::ZERO, 0.0f32), |(sum, mass), (s, &m)| {
            (sum + s.position() * m, mass + m)
        });

    if total > 0.0 {
        weighted / total
    } else {
        Vec3::ZERO
    }
}

/// Sum of m·v over all particles.
pub fn total_momentum(states: &[ParticleState], masses: &[f32]) -> Vec3 {
    states
        .iter()
        .zip(masses)
        .map(|(s, &m)| s.velocity() * m)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_matches_wgsl_stride() {
        assert_eq!(std::mem::size_of::<ParticleState>(), 32);
    }

    #[test]
    fn kick_precedes_drift() {
        let s = ParticleState::at_rest(Vec3::ZERO);
        let next = s.kick_drift(Vec3::new(2.0, 0.0, 0.0), 0.5);
        // v = 1.0 after the kick, so the drift already uses it
        assert_eq!(next.velocity(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(next.position(), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn rejects_bad_masses() {
        assert!(validate_masses(&[1.0, 2.0]).is_ok());
        assert_eq!(
            validate_masses(&[1.0, 0.0]),
            Err(ConfigError::InvalidMass { index: 1, mass: 0.0 })
        );
        assert!(validate_masses(&[-1.0]).is_err());
        assert!(validate_masses(&[f32::NAN]).is_err());
    }

    #[test]
    fn center_of_mass_is_weighted() {
        let states = [
            ParticleState::at_rest(Vec3::new(-1.0, 0.0, 0.0)),
            ParticleState::at_rest(Vec3::new(2.0, 0.0, 0.0)),
        ];
        let com = center_of_mass(&states, &[2.0, 1.0]);
        assert!(com.abs_diff_eq(Vec3::ZERO, 1e-6));
    }
}
