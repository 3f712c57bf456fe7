//! Spatial indexing.
//!
//! - [`octree`]: incremental Barnes-Hut octree used to approximate repulsion
//! - [`rtree`]: R-tree over vertex positions for nearest/box queries

pub mod octree;
mod rtree;

pub use octree::{Body, Octant, OctreeNode, SpatialTree};
pub use rtree::PickIndex;
