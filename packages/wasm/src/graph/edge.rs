//! Edge type and related structures.
//!
//! Edges are springs between two vertices. Each edge has:
//! - A stable unique identifier
//! - Source and target vertex IDs
//! - Presentation fields the engine passes through

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::vertex::VertexId;

/// Stable edge identifier.
///
/// This ID remains valid even after other edges are removed from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u32);

impl EdgeId {
    /// Create a new EdgeId from a raw u32.
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

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge-{}", self.0)
    }
}

impl From<u32> for EdgeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EdgeId> for u32 {
    #[inline]
    fn from(id: EdgeId) -> Self {
        id.0
    }
}

/// Options accepted when adding an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeOptions {
    /// Explicit id. A generated one is used when absent.
    pub id: Option<EdgeId>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EdgeOptions {
    pub fn with_id(id: impl Into<EdgeId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// A spring between two vertices. The edge does not own its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    id: EdgeId,
    source: VertexId,
    target: VertexId,
    pub(crate) payload: Map<String, Value>,
}

impl Edge {
    pub fn new(id: EdgeId, source: VertexId, target: VertexId, options: EdgeOptions) -> Self {
        Self {
            id,
            source,
            target,
            payload: options.payload,
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn target(&self) -> VertexId {
        self.target
    }

    /// True if `vertex` is either endpoint.
    pub fn touches(&self, vertex: VertexId) -> bool {
        self.source == vertex || self.target == vertex
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}
