//! Graph data structures and the layout engine.
//!
//! Topology lives in petgraph's StableGraph so vertex and edge indices stay
//! valid across removals. Vertices carry their own simulation state.

mod edge;
mod layout_graph;
mod vertex;

pub use edge::{Edge, EdgeId, EdgeOptions};
pub use layout_graph::{
    ElementId, LayoutConfig, LayoutGraph, ParseElementError, RepulsionMode, VertexPosition,
};
pub use vertex::{Vertex, VertexFlags, VertexId, VertexOptions};
