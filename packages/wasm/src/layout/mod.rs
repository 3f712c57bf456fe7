//! Physics for the force-directed layout.
//!
//! This module holds the simulation constants and the force laws the
//! layout graph applies each step. The spatial approximation of repulsion
//! lives in [`crate::spatial`].

pub mod constants;
pub mod forces;

pub use constants::{ConfigError, PhysicsConstants, PhysicsOverrides};
