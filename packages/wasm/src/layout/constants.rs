//! Physics constants for the force simulation.
//!
//! The constants are read by every force computation. A vertex may override
//! a subset of them through [`PhysicsOverrides`]; an override only takes
//! effect when it is present, non-zero and finite.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when validating simulation configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A constant is NaN or infinite.
    #[error("{name} must be finite, got {value}")]
    NotFinite { name: &'static str, value: f32 },

    /// A constant that must be strictly positive is zero or negative.
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },

    /// Damping lies outside of [0, 1].
    #[error("damping must be within [0, 1], got {0}")]
    DampingOutOfRange(f32),
}

/// Named simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsConstants {
    /// Spring constant; more K, more attraction (default: 2.0).
    #[serde(alias = "K")]
    pub spring: f32,
    /// Repulsion constant; more f0, more repulsion (default: 20.0).
    #[serde(alias = "f0")]
    pub repulsion: f32,
    /// Integration time step (default: 0.02).
    #[serde(alias = "dt")]
    pub time_step: f32,
    /// Velocity damping factor in [0, 1] (default: 0.75).
    #[serde(alias = "D")]
    pub damping: f32,
    /// Minimum effective distance between two bodies (default: 0.1).
    pub epsilon: f32,
    /// Barnes-Hut accuracy threshold; larger is faster and coarser (default: 0.5).
    pub theta: f32,
    /// Radius around a cluster centroid within which vertices join the
    /// cluster's inner set (default: 25.0).
    pub inner_distance: f32,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            spring: 2.0,
            repulsion: 20.0,
            time_step: 0.02,
            damping: 0.75,
            epsilon: 0.1,
            theta: 0.5,
            inner_distance: 25.0,
        }
    }
}

impl PhysicsConstants {
    /// Check that every constant is usable by the integrator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("spring", self.spring),
            ("repulsion", self.repulsion),
            ("timeStep", self.time_step),
            ("damping", self.damping),
            ("epsilon", self.epsilon),
            ("theta", self.theta),
            ("innerDistance", self.inner_distance),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { name, value });
            }
        }

        let positive = [
            ("timeStep", self.time_step),
            ("epsilon", self.epsilon),
            ("theta", self.theta),
            ("innerDistance", self.inner_distance),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ConfigError::DampingOutOfRange(self.damping));
        }

        Ok(())
    }

    /// Effective constants for a vertex carrying `overrides`.
    pub fn merged(&self, overrides: &PhysicsOverrides) -> Self {
        Self {
            repulsion: pick(overrides.repulsion, self.repulsion),
            epsilon: pick(overrides.epsilon, self.epsilon),
            time_step: pick(overrides.time_step, self.time_step),
            damping: pick(overrides.damping, self.damping),
            ..*self
        }
    }
}

/// Per-vertex overrides of [`PhysicsConstants`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsOverrides {
    #[serde(alias = "f0")]
    pub repulsion: Option<f32>,
    pub epsilon: Option<f32>,
    #[serde(alias = "dt")]
    pub time_step: Option<f32>,
    #[serde(alias = "D")]
    pub damping: Option<f32>,
}

impl PhysicsOverrides {
    /// True if no override would change the graph constants.
    pub fn is_empty(&self) -> bool {
        [self.repulsion, self.epsilon, self.time_step, self.damping]
            .iter()
            .all(|value| value.filter(|v| is_set(*v)).is_none())
    }
}

#[inline]
fn is_set(value: f32) -> bool {
    value != 0.0 && value.is_finite()
}

#[inline]
fn pick(value: Option<f32>, fallback: f32) -> f32 {
    value.filter(|v| is_set(*v)).unwrap_or(fallback)
}
