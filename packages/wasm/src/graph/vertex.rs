//! Vertex type and related structures.
//!
//! Vertices are the simulated particles of the layout. Each vertex has:
//! - A stable identifier, unique among live vertices
//! - Position, velocity and acceleration in 3D
//! - Optional overrides of the physics constants
//! - The set of incident edges, used to cascade removal

use std::collections::BTreeSet;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::edge::EdgeId;
use crate::layout::forces;
use crate::layout::{PhysicsConstants, PhysicsOverrides};

/// Stable vertex identifier.
///
/// Remains valid while the vertex is live, regardless of other vertices
/// being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u32);

impl VertexId {
    /// Create a new VertexId from a raw u32.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vertex-{}", self.0)
    }
}

impl From<u32> for VertexId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<VertexId> for u32 {
    #[inline]
    fn from(id: VertexId) -> Self {
        id.0
    }
}

/// Vertex flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexFlags {
    flags: u8,
}

impl VertexFlags {
    const PINNED: u8 = 0b0000_0001;
    const REPULSION_EXEMPT: u8 = 0b0000_0010;

    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    /// Check if the vertex is pinned (kept in place by the integrator).
    #[inline]
    pub fn is_pinned(self) -> bool {
        self.flags & Self::PINNED != 0
    }

    #[inline]
    pub fn set_pinned(&mut self, pinned: bool) {
        self.set(Self::PINNED, pinned);
    }

    /// Check if the vertex ignores repulsion from other vertices.
    #[inline]
    pub fn is_repulsion_exempt(self) -> bool {
        self.flags & Self::REPULSION_EXEMPT != 0
    }

    #[inline]
    pub fn set_repulsion_exempt(&mut self, exempt: bool) {
        self.set(Self::REPULSION_EXEMPT, exempt);
    }

    #[inline]
    fn set(&mut self, bit: u8, on: bool) {
        if on {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
    }
}

/// Options accepted when adding a vertex.
///
/// Fields the engine does not know (color, size, label, ...) are kept in
/// `payload` untouched for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VertexOptions {
    /// Explicit id. A generated one is used when absent.
    pub id: Option<VertexId>,
    /// Initial position. Drawn at random inside the spawn cube when absent.
    pub position: Option<Vec3>,
    pub pinned: bool,
    pub repulsion_exempt: bool,
    #[serde(flatten)]
    pub physics: PhysicsOverrides,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl VertexOptions {
    pub fn with_id(id: impl Into<VertexId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }
}

/// A simulated particle.
#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) acceleration: Vec3,
    overrides: PhysicsOverrides,
    pub(crate) flags: VertexFlags,
    pub(crate) edges: BTreeSet<EdgeId>,
    pub(crate) payload: Map<String, Value>,
}

impl Vertex {
    /// Create a vertex at rest at `position`.
    pub fn new(id: VertexId, position: Vec3, options: VertexOptions) -> Self {
        let mut flags = VertexFlags::new();
        flags.set_pinned(options.pinned);
        flags.set_repulsion_exempt(options.repulsion_exempt);

        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            overrides: options.physics,
            flags,
            edges: BTreeSet::new(),
            payload: options.payload,
        }
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Force accumulated since the last integration.
    pub fn acceleration(&self) -> Vec3 {
        self.acceleration
    }

    pub fn overrides(&self) -> &PhysicsOverrides {
        &self.overrides
    }

    pub fn flags(&self) -> VertexFlags {
        self.flags
    }

    /// Ids of the edges with this vertex as source or target.
    pub fn incident_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().copied()
    }

    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    /// Presentation fields passed through from the options.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// The graph constants with this vertex's overrides applied.
    pub fn constants(&self, base: &PhysicsConstants) -> PhysicsConstants {
        base.merged(&self.overrides)
    }

    /// Fold the accumulated acceleration into velocity and position.
    ///
    /// Pinned vertices stay put and lose their velocity.
    pub(crate) fn update(&mut self, base: &PhysicsConstants) -> Vec3 {
        if self.flags.is_pinned() {
            self.velocity = Vec3::ZERO;
            self.acceleration = Vec3::ZERO;
            return self.position;
        }

        let constants = self.constants(base);
        forces::integrate(
            &mut self.position,
            &mut self.velocity,
            &mut self.acceleration,
            constants.time_step,
            constants.damping,
        );
        self.position
    }
}
