//! # N-body Physics
//!
//! Data model and scalar reference math for grid-accelerated gravity:
//! particle records, the uniform grid, pair/cell accelerations and the
//! initial layouts used on reset.

pub mod constants;
pub mod distribution;
pub mod error;
pub mod forces;
pub mod grid;
pub mod particle;

pub use constants::*;
pub use distribution::*;
pub use error::*;
pub use forces::*;
pub use grid::*;
pub use particle::*;
