//! LayoutGraph - force-directed layout over a mutable graph.
//!
//! The LayoutGraph stores the topology in petgraph's StableGraph, with the
//! simulated vertex state as node weights and edges as edge weights. Each
//! `step()` rebuilds the octree from current positions, accumulates
//! repulsion through it, accumulates spring attraction along edges and
//! integrates every vertex once.

use glam::Vec3;
use petgraph::Undirected;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::edge::{Edge, EdgeId, EdgeOptions};
use super::vertex::{Vertex, VertexId, VertexOptions};
use crate::layout::forces;
use crate::layout::{ConfigError, PhysicsConstants};
use crate::spatial::{PickIndex, SpatialTree};

/// How repulsion is computed during a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepulsionMode {
    /// Octree approximation.
    #[default]
    BarnesHut,
    /// Every pair, O(n^2). For validation and small graphs.
    Exact,
}

/// Construction parameters for a [`LayoutGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub constants: PhysicsConstants,
    /// Edge of the cube `[0, spawn_extent)^3` new vertices are placed in
    /// when no position is given (default: 5.0).
    pub spawn_extent: f32,
    /// Seed for initial placement (default: 0).
    pub seed: u64,
    pub repulsion: RepulsionMode,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            constants: PhysicsConstants::default(),
            spawn_extent: 5.0,
            seed: 0,
            repulsion: RepulsionMode::BarnesHut,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.constants.validate()?;
        if !self.spawn_extent.is_finite() {
            return Err(ConfigError::NotFinite {
                name: "spawnExtent",
                value: self.spawn_extent,
            });
        }
        if self.spawn_extent <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "spawnExtent",
                value: self.spawn_extent,
            });
        }
        Ok(())
    }
}

/// A vertex position as handed to the renderer after a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VertexPosition {
    pub id: VertexId,
    pub position: Vec3,
}

/// Either kind of graph element.
///
/// The string form is the id's display form, `vertex-N` or `edge-N`, so
/// vertex and edge ids with the same number stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    Vertex(VertexId),
    Edge(EdgeId),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Vertex(id) => fmt::Display::fmt(id, f),
            ElementId::Edge(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<VertexId> for ElementId {
    fn from(id: VertexId) -> Self {
        ElementId::Vertex(id)
    }
}

impl From<EdgeId> for ElementId {
    fn from(id: EdgeId) -> Self {
        ElementId::Edge(id)
    }
}

/// A key that is neither `vertex-N` nor `edge-N`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected `vertex-<n>` or `edge-<n>`, got {0:?}")]
pub struct ParseElementError(String);

impl FromStr for ElementId {
    type Err = ParseElementError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseElementError(key.to_string());
        if let Some(raw) = key.strip_prefix("vertex-") {
            raw.parse().map(|n| ElementId::Vertex(VertexId(n))).map_err(|_| invalid())
        } else if let Some(raw) = key.strip_prefix("edge-") {
            raw.parse().map(|n| ElementId::Edge(EdgeId(n))).map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    }
}

/// The layout engine.
///
/// This struct manages:
/// - Graph topology via petgraph
/// - Vertex simulation state (node weights)
/// - The octree used for repulsion, rebuilt every step
/// - A lazily rebuilt pick index for nearest-vertex queries
/// - Id allocation for vertices and edges
pub struct LayoutGraph {
    /// Vertices as node weights, edges as edge weights.
    graph: StableGraph<Vertex, Edge, Undirected>,

    /// Map from stable VertexId to petgraph NodeIndex
    vertex_index: HashMap<VertexId, NodeIndex>,

    /// Map from stable EdgeId to petgraph EdgeIndex
    edge_index: HashMap<EdgeId, EdgeIndex>,

    /// Next vertex ID to try when none is supplied
    next_vertex_id: u32,

    /// Next edge ID to try when none is supplied
    next_edge_id: u32,

    config: LayoutConfig,

    /// Octree over live vertices
    tree: SpatialTree,

    /// Random source for initial placement
    rng: SmallRng,

    pick: PickIndex,

    /// Whether the pick index needs rebuilding
    pick_dirty: bool,
}

impl LayoutGraph {
    /// Create an empty graph with default configuration.
    pub fn new() -> Self {
        Self::build(LayoutConfig::default())
    }

    /// Create an empty graph after validating `config`.
    pub fn with_config(config: LayoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Create an empty graph with custom constants and default placement.
    pub fn with_constants(constants: PhysicsConstants) -> Result<Self, ConfigError> {
        Self::with_config(LayoutConfig {
            constants,
            ..Default::default()
        })
    }

    fn build(config: LayoutConfig) -> Self {
        Self {
            graph: StableGraph::default(),
            vertex_index: HashMap::new(),
            edge_index: HashMap::new(),
            next_vertex_id: 0,
            next_edge_id: 0,
            tree: SpatialTree::new(&config.constants),
            rng: SmallRng::seed_from_u64(config.seed),
            pick: PickIndex::new(),
            pick_dirty: false,
            config,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn constants(&self) -> &PhysicsConstants {
        &self.config.constants
    }

    /// Replace the physics constants. Takes effect on the next step.
    pub fn set_constants(&mut self, constants: PhysicsConstants) -> Result<(), ConfigError> {
        constants.validate()?;
        self.config.constants = constants;
        self.tree = self.build_tree();
        Ok(())
    }

    pub fn repulsion_mode(&self) -> RepulsionMode {
        self.config.repulsion
    }

    pub fn set_repulsion_mode(&mut self, mode: RepulsionMode) {
        self.config.repulsion = mode;
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance the simulation by one frame.
    ///
    /// Returns a snapshot of every live vertex's position, in the order of
    /// [`positions`](Self::positions).
    pub fn step(&mut self) -> Vec<VertexPosition> {
        trace!(
            vertices = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "layout step"
        );

        self.tree = self.build_tree();
        self.apply_repulsion();
        self.apply_attraction();

        let constants = self.config.constants;
        for vertex in self.graph.node_weights_mut() {
            vertex.update(&constants);
        }
        self.pick_dirty = true;

        self.positions()
    }

    /// Run `steps` frames and return the final snapshot.
    pub fn run(&mut self, steps: usize) -> Vec<VertexPosition> {
        for _ in 0..steps {
            self.step();
        }
        self.positions()
    }

    /// Current position of every live vertex, in vertex storage order.
    ///
    /// Storage order is insertion order until a vertex is removed. Freed
    /// slots are reused, so a vertex added after a removal takes the place
    /// of the removed one. The order matches [`vertex_ids`](Self::vertex_ids).
    pub fn positions(&self) -> Vec<VertexPosition> {
        self.graph
            .node_weights()
            .map(|v| VertexPosition {
                id: v.id(),
                position: v.position(),
            })
            .collect()
    }

    fn build_tree(&self) -> SpatialTree {
        SpatialTree::build(
            &self.config.constants,
            self.graph.node_weights().map(|v| (v.id(), v.position())),
        )
    }

    fn apply_repulsion(&mut self) {
        let constants = self.config.constants;

        let forces: Vec<(NodeIndex, Vec3)> = match self.config.repulsion {
            RepulsionMode::BarnesHut => self
                .graph
                .node_indices()
                .filter(|&i| !self.graph[i].flags.is_repulsion_exempt())
                .map(|i| {
                    let vertex = &self.graph[i];
                    let own = vertex.constants(&constants);
                    let force = self.tree.estimate(vertex.id(), vertex.position(), |p, q| {
                        forces::repulsion(p, q, own.repulsion, own.epsilon)
                    });
                    (i, force)
                })
                .collect(),
            RepulsionMode::Exact => {
                let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
                let positions: Vec<Vec3> =
                    indices.iter().map(|&i| self.graph[i].position()).collect();
                indices
                    .iter()
                    .enumerate()
                    .filter(|&(_, &i)| !self.graph[i].flags.is_repulsion_exempt())
                    .map(|(slot, &i)| {
                        let own = self.graph[i].constants(&constants);
                        let force =
                            forces::exact_repulsion(&positions, slot, own.repulsion, own.epsilon);
                        (i, force)
                    })
                    .collect()
            }
        };

        for (index, force) in forces {
            self.graph[index].acceleration += force;
        }
    }

    fn apply_attraction(&mut self) {
        let k = self.config.constants.spring;

        let springs: Vec<(NodeIndex, NodeIndex, Vec3)> = self
            .graph
            .edge_references()
            .map(|e| {
                let force = forces::spring(
                    self.graph[e.source()].position(),
                    self.graph[e.target()].position(),
                    k,
                );
                (e.source(), e.target(), force)
            })
            .collect();

        for (source, target, force) in springs {
            self.graph[source].acceleration -= force;
            self.graph[target].acceleration += force;
        }
    }

    // =========================================================================
    // Vertex Operations
    // =========================================================================

    /// Add a vertex and return its id.
    ///
    /// An explicit id that is already live is not replaced: the existing
    /// vertex is kept and its id returned.
    pub fn add_vertex(&mut self, options: VertexOptions) -> VertexId {
        let id = match options.id {
            Some(id) if self.vertex_index.contains_key(&id) => {
                warn!(%id, "vertex id already in use, keeping existing vertex");
                return id;
            }
            Some(id) => id,
            None => self.allocate_vertex_id(),
        };

        let position = options.position.unwrap_or_else(|| self.spawn_position());
        let index = self.graph.add_node(Vertex::new(id, position, options));
        self.vertex_index.insert(id, index);
        self.tree.insert(id, position);
        self.pick_dirty = true;

        debug!(%id, ?position, "vertex added");
        id
    }

    /// Remove a vertex and every edge incident to it.
    ///
    /// Returns false if the vertex does not exist.
    pub fn remove_vertex(&mut self, id: VertexId) -> bool {
        let Some(&index) = self.vertex_index.get(&id) else {
            return false;
        };

        let incident: Vec<EdgeId> = self.graph[index].incident_edges().collect();
        for edge in incident {
            self.remove_edge(edge);
        }

        self.tree.remove(id);
        self.graph.remove_node(index);
        self.vertex_index.remove(&id);
        self.pick_dirty = true;

        debug!(%id, "vertex removed");
        true
    }

    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertex_index.contains_key(&id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertex_index.get(&id).map(|&index| &self.graph[index])
    }

    /// Live vertices in storage order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.graph.node_weights()
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices().map(Vertex::id).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn vertex_position(&self, id: VertexId) -> Option<Vec3> {
        self.vertex(id).map(Vertex::position)
    }

    /// Move a vertex. Returns false if it does not exist.
    pub fn set_vertex_position(&mut self, id: VertexId, position: Vec3) -> bool {
        let Some(vertex) = self.vertex_mut(id) else {
            return false;
        };
        vertex.position = position;
        self.tree.insert(id, position);
        self.pick_dirty = true;
        true
    }

    /// Pin a vertex (kept in place by the integrator).
    pub fn pin_vertex(&mut self, id: VertexId) -> bool {
        self.vertex_mut(id)
            .map(|v| v.flags.set_pinned(true))
            .is_some()
    }

    pub fn unpin_vertex(&mut self, id: VertexId) -> bool {
        self.vertex_mut(id)
            .map(|v| v.flags.set_pinned(false))
            .is_some()
    }

    pub fn is_vertex_pinned(&self, id: VertexId) -> bool {
        self.vertex(id)
            .map(|v| v.flags().is_pinned())
            .unwrap_or(false)
    }

    pub fn set_repulsion_exempt(&mut self, id: VertexId, exempt: bool) -> bool {
        self.vertex_mut(id)
            .map(|v| v.flags.set_repulsion_exempt(exempt))
            .is_some()
    }

    pub fn vertex_payload(&self, id: VertexId) -> Option<&Map<String, Value>> {
        self.vertex(id).map(Vertex::payload)
    }

    /// Replace the presentation fields of a vertex.
    pub fn set_vertex_payload(&mut self, id: VertexId, payload: Map<String, Value>) -> bool {
        self.vertex_mut(id).map(|v| v.payload = payload).is_some()
    }

    /// Ids of the edges incident to a vertex.
    pub fn incident_edges(&self, id: VertexId) -> Vec<EdgeId> {
        self.vertex(id)
            .map(|v| v.incident_edges().collect())
            .unwrap_or_default()
    }

    /// Vertices sharing an edge with `id`.
    pub fn neighbors(&self, id: VertexId) -> Vec<VertexId> {
        self.vertex_index
            .get(&id)
            .map(|&index| {
                self.graph
                    .neighbors(index)
                    .map(|n| self.graph[n].id())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        let index = *self.vertex_index.get(&id)?;
        self.graph.node_weight_mut(index)
    }

    fn allocate_vertex_id(&mut self) -> VertexId {
        loop {
            let id = VertexId(self.next_vertex_id);
            self.next_vertex_id = self.next_vertex_id.wrapping_add(1);
            if !self.vertex_index.contains_key(&id) {
                return id;
            }
        }
    }

    fn spawn_position(&mut self) -> Vec3 {
        let extent = self.config.spawn_extent;
        Vec3::new(
            self.rng.random::<f32>() * extent,
            self.rng.random::<f32>() * extent,
            self.rng.random::<f32>() * extent,
        )
    }

    // =========================================================================
    // Edge Operations
    // =========================================================================

    /// Add an edge between two live vertices.
    ///
    /// Returns `None`, leaving the graph untouched, if either endpoint does
    /// not exist or an explicit edge id is already in use.
    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        options: EdgeOptions,
    ) -> Option<EdgeId> {
        let (Some(&source_index), Some(&target_index)) =
            (self.vertex_index.get(&source), self.vertex_index.get(&target))
        else {
            debug!(%source, %target, "edge rejected, endpoint missing");
            return None;
        };

        let id = match options.id {
            Some(id) if self.edge_index.contains_key(&id) => {
                warn!(%id, "edge id already in use, edge not added");
                return None;
            }
            Some(id) => id,
            None => self.allocate_edge_id(),
        };

        let index = self
            .graph
            .add_edge(source_index, target_index, Edge::new(id, source, target, options));
        self.edge_index.insert(id, index);
        self.graph[source_index].edges.insert(id);
        self.graph[target_index].edges.insert(id);

        debug!(%id, %source, %target, "edge added");
        Some(id)
    }

    /// Remove an edge and detach it from both endpoints.
    ///
    /// Returns false if the edge does not exist.
    pub fn remove_edge(&mut self, id: EdgeId) -> bool {
        let Some(index) = self.edge_index.remove(&id) else {
            return false;
        };
        let Some(edge) = self.graph.remove_edge(index) else {
            return false;
        };

        for endpoint in [edge.source(), edge.target()] {
            if let Some(vertex) = self.vertex_mut(endpoint) {
                vertex.edges.remove(&id);
            }
        }

        debug!(%id, "edge removed");
        true
    }

    /// Remove a vertex (with its edges) or an edge.
    pub fn remove(&mut self, element: impl Into<ElementId>) -> bool {
        match element.into() {
            ElementId::Vertex(id) => self.remove_vertex(id),
            ElementId::Edge(id) => self.remove_edge(id),
        }
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge_index.contains_key(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index
            .get(&id)
            .and_then(|&index| self.graph.edge_weight(index))
    }

    /// Live edges in storage order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph.edge_weights()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges().map(Edge::id).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edge_payload(&self, id: EdgeId) -> Option<&Map<String, Value>> {
        self.edge(id).map(Edge::payload)
    }

    pub fn set_edge_payload(&mut self, id: EdgeId, payload: Map<String, Value>) -> bool {
        let Some(&index) = self.edge_index.get(&id) else {
            return false;
        };
        self.graph
            .edge_weight_mut(index)
            .map(|e| e.payload = payload)
            .is_some()
    }

    fn allocate_edge_id(&mut self) -> EdgeId {
        loop {
            let id = EdgeId(self.next_edge_id);
            self.next_edge_id = self.next_edge_id.wrapping_add(1);
            if !self.edge_index.contains_key(&id) {
                return id;
            }
        }
    }

    // =========================================================================
    // Spatial Queries
    // =========================================================================

    /// The octree as of the last step or topology change.
    pub fn tree(&self) -> &SpatialTree {
        &self.tree
    }

    /// Find the vertex nearest to `point`.
    pub fn find_nearest_vertex(&mut self, point: Vec3) -> Option<VertexId> {
        self.refresh_pick_index();
        self.pick.nearest(point)
    }

    /// Find the vertex nearest to `point` no further than `max_distance`.
    pub fn find_nearest_vertex_within(&mut self, point: Vec3, max_distance: f32) -> Option<VertexId> {
        self.refresh_pick_index();
        self.pick.nearest_within(point, max_distance)
    }

    /// Find all vertices inside the box spanned by `min` and `max`.
    pub fn find_vertices_in_box(&mut self, min: Vec3, max: Vec3) -> Vec<VertexId> {
        self.refresh_pick_index();
        self.pick.in_box(min, max)
    }

    /// Find all vertices within `radius` of `point`.
    pub fn find_vertices_in_radius(&mut self, point: Vec3, radius: f32) -> Vec<VertexId> {
        self.refresh_pick_index();
        self.pick.in_radius(point, radius)
    }

    fn refresh_pick_index(&mut self) {
        if self.pick_dirty {
            self.pick
                .rebuild(self.graph.node_weights().map(|v| (v.id(), v.position())));
            self.pick_dirty = false;
        }
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Mean position of all live vertices.
    pub fn center(&self) -> Option<Vec3> {
        let count = self.graph.node_count();
        if count == 0 {
            return None;
        }
        let sum = self
            .graph
            .node_weights()
            .fold(Vec3::ZERO, |acc, v| acc + v.position());
        Some(sum / count as f32)
    }

    /// Axis-aligned bounds of all live vertices as `(min, max)`.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut positions = self.graph.node_weights().map(Vertex::position);
        let first = positions.next()?;
        Some(positions.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }

    /// Remove all vertices and edges and reset id allocation.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.vertex_index.clear();
        self.edge_index.clear();
        self.next_vertex_id = 0;
        self.next_edge_id = 0;
        self.tree.clear();
        self.pick.clear();
        self.pick_dirty = false;
    }
}

impl Default for LayoutGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-5;

    fn graph() -> LayoutGraph {
        LayoutGraph::new()
    }

    fn at(x: f32, y: f32, z: f32) -> VertexOptions {
        VertexOptions::at(Vec3::new(x, y, z))
    }

    #[test]
    fn test_add_vertex_generates_ids() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());

        assert_eq!(a, VertexId(0));
        assert_eq!(b, VertexId(1));
        assert_eq!(graph.vertex_count(), 2);
        assert!(graph.tree().contains(a));
        assert!(graph.tree().contains(b));
    }

    #[test]
    fn test_spawn_inside_cube() {
        let mut graph = graph();
        for _ in 0..50 {
            let id = graph.add_vertex(VertexOptions::default());
            let p = graph.vertex_position(id).unwrap();
            assert!(p.cmpge(Vec3::ZERO).all() && p.cmplt(Vec3::splat(5.0)).all());
        }
        // Random placement must not collapse onto one point.
        let (min, max) = graph.bounds().unwrap();
        assert!((max - min).length() > 0.1);
    }

    #[test]
    fn test_spawn_is_seeded() {
        let mut a = graph();
        let mut b = graph();
        for _ in 0..5 {
            a.add_vertex(VertexOptions::default());
            b.add_vertex(VertexOptions::default());
        }
        assert_eq!(a.positions(), b.positions());
    }

    #[test]
    fn test_explicit_ids_are_kept() {
        let mut graph = graph();
        let id = graph.add_vertex(VertexOptions::with_id(VertexId(10)));
        assert_eq!(id, VertexId(10));

        // Generated ids skip live explicit ones.
        graph.add_vertex(VertexOptions::with_id(VertexId(0)));
        assert_eq!(graph.add_vertex(VertexOptions::default()), VertexId(1));
    }

    #[test]
    fn test_duplicate_explicit_id_keeps_existing() {
        let mut graph = graph();
        graph.add_vertex(VertexOptions {
            id: Some(VertexId(3)),
            position: Some(Vec3::ONE),
            ..Default::default()
        });
        let again = graph.add_vertex(VertexOptions {
            id: Some(VertexId(3)),
            position: Some(Vec3::ZERO),
            ..Default::default()
        });

        assert_eq!(again, VertexId(3));
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.vertex_position(VertexId(3)), Some(Vec3::ONE));
    }

    #[test]
    fn test_independent_graphs_have_independent_counters() {
        let mut a = graph();
        let mut b = graph();
        a.add_vertex(VertexOptions::default());
        a.add_vertex(VertexOptions::default());
        assert_eq!(b.add_vertex(VertexOptions::default()), VertexId(0));
    }

    #[test]
    fn test_add_edge_links_endpoints() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());

        let edge = graph.add_edge(a, b, EdgeOptions::default()).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.incident_edges(a), vec![edge]);
        assert_eq!(graph.incident_edges(b), vec![edge]);
        assert_eq!(graph.neighbors(a), vec![b]);
        assert_eq!(graph.neighbors(b), vec![a]);
        assert_eq!(graph.vertex(a).unwrap().degree(), 1);

        let stored = graph.edge(edge).unwrap();
        assert_eq!((stored.source(), stored.target()), (a, b));
    }

    #[test]
    fn test_add_edge_guard() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());

        assert_eq!(graph.add_edge(a, VertexId(99), EdgeOptions::default()), None);
        assert_eq!(graph.add_edge(VertexId(99), a, EdgeOptions::default()), None);
        assert_eq!(graph.edge_count(), 0);

        graph.remove_vertex(b);
        assert_eq!(graph.add_edge(a, b, EdgeOptions::default()), None);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.incident_edges(a), vec![]);
    }

    #[test]
    fn test_duplicate_explicit_edge_id_rejected() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());

        assert_eq!(graph.add_edge(a, b, EdgeOptions::with_id(EdgeId(5))), Some(EdgeId(5)));
        assert_eq!(graph.add_edge(b, a, EdgeOptions::with_id(EdgeId(5))), None);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_remove_vertex_cascades() {
        let mut graph = graph();
        let ids: Vec<_> = (0..5)
            .map(|_| graph.add_vertex(VertexOptions::default()))
            .collect();
        for i in 0..5 {
            for j in (i + 1)..5 {
                graph.add_edge(ids[i], ids[j], EdgeOptions::default());
            }
        }
        assert_eq!(graph.edge_count(), 10);

        assert!(graph.remove_vertex(ids[2]));
        assert_eq!(graph.edge_count(), 6);
        assert!(graph.edges().all(|e| !e.touches(ids[2])));
        for &id in ids.iter().filter(|&&id| id != ids[2]) {
            assert_eq!(graph.incident_edges(id).len(), 3);
        }
        assert!(!graph.tree().contains(ids[2]));
    }

    #[test]
    fn test_remove_vertex_is_idempotent() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());
        graph.add_edge(a, b, EdgeOptions::default());

        assert!(graph.remove_vertex(a));
        let positions = graph.positions();
        assert!(!graph.remove_vertex(a));
        assert_eq!(graph.positions(), positions);
        assert_eq!(graph.vertex_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());
        let edge = graph.add_edge(a, b, EdgeOptions::default()).unwrap();

        assert!(graph.remove_edge(edge));
        assert!(!graph.remove_edge(edge));
        assert!(!graph.remove_edge(EdgeId(77)));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.incident_edges(a).is_empty());
        assert!(graph.incident_edges(b).is_empty());
        assert_eq!(graph.vertex_count(), 2);
    }

    #[test]
    fn test_step_empty() {
        let mut graph = graph();
        assert!(graph.step().is_empty());
    }

    #[test]
    fn test_step_single_vertex_is_stable() {
        let mut graph = graph();
        let id = graph.add_vertex(at(1.0, 2.0, 3.0));

        for _ in 0..10 {
            let positions = graph.step();
            assert_eq!(positions.len(), 1);
            assert_eq!(positions[0].id, id);
            assert_eq!(positions[0].position, Vec3::new(1.0, 2.0, 3.0));
        }
    }

    #[test]
    fn test_step_returns_snapshot() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));

        let snapshot = graph.step();
        let ids: Vec<_> = snapshot.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a, b]);

        graph.step();
        assert_ne!(graph.vertex_position(a), Some(snapshot[0].position));
    }

    #[test]
    fn test_snapshot_order_reuses_freed_slots() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));
        let c = graph.add_vertex(at(2.0, 0.0, 0.0));
        graph.remove_vertex(a);
        let d = graph.add_vertex(at(3.0, 0.0, 0.0));

        let order: Vec<_> = graph.step().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![d, b, c]);
        assert_eq!(order, graph.vertex_ids());
    }

    #[test]
    fn test_element_keys() {
        assert_eq!("vertex-3".parse(), Ok(ElementId::Vertex(VertexId(3))));
        assert_eq!("edge-3".parse(), Ok(ElementId::Edge(EdgeId(3))));
        assert_eq!(ElementId::from(EdgeId(12)).to_string(), "edge-12");
        for bad in ["3", "node-1", "vertex-", "edge-x", "vertex--1"] {
            assert!(bad.parse::<ElementId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_remove_edge_with_overlapping_vertex_id() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());
        let edge = graph.add_edge(a, b, EdgeOptions::default()).unwrap();
        assert_eq!(edge.raw(), a.raw());

        let key: ElementId = edge.to_string().parse().unwrap();
        assert!(graph.remove(key));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.vertex_count(), 2);

        assert!(graph.remove(a));
        assert!(!graph.remove(a));
        assert_eq!(graph.vertex_ids(), vec![b]);
    }

    #[test]
    fn test_two_vertex_symmetry() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(1.0, 2.0, -0.5));
        graph.step();

        let va = graph.vertex(a).unwrap().velocity();
        let vb = graph.vertex(b).unwrap().velocity();
        assert!((va + vb).length() < TOL);
        assert!(va.length() > 0.0);
    }

    #[test]
    fn test_coincident_vertices_stay_finite() {
        let mut graph = graph();
        graph.add_vertex(at(1.0, 1.0, 1.0));
        graph.add_vertex(at(1.0, 1.0, 1.0));

        for p in graph.step() {
            assert!(p.position.is_finite());
            assert_eq!(p.position, Vec3::ONE);
        }
    }

    /// Expected position change for an acceleration `a` on a vertex at rest.
    fn delta(a: f32) -> f32 {
        let c = PhysicsConstants::default();
        a * c.time_step * c.damping * c.time_step
    }

    #[test]
    fn test_line_scenario_repulsion_dominates() {
        // A=(0,0,0), B=(1,0,0), C=(10,0,0), edge A-B. All three share one
        // cluster, so repulsion is exact.
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));
        let c = graph.add_vertex(at(10.0, 0.0, 0.0));
        graph.add_edge(a, b, EdgeOptions::default());
        graph.step();

        // f0 / d^2 repulsion, K * d^2 * (A - B) spring.
        let on_a = -20.0 - 20.0 / 100.0 + 2.0;
        let on_b = 20.0 - 20.0 / 81.0 - 2.0;
        let on_c = 20.0 / 100.0 + 20.0 / 81.0;

        let pa = graph.vertex_position(a).unwrap();
        let pb = graph.vertex_position(b).unwrap();
        let pc = graph.vertex_position(c).unwrap();
        assert!((pa.x - delta(on_a)).abs() < TOL, "{pa}");
        assert!((pb.x - (1.0 + delta(on_b))).abs() < TOL, "{pb}");
        assert!((pc.x - (10.0 + delta(on_c))).abs() < TOL, "{pc}");
        assert!(pa.x < 0.0 && pb.x > 1.0 && pc.x > 10.0);
        assert_eq!(pa.y, 0.0);
        assert_eq!(pc.z, 0.0);
    }

    #[test]
    fn test_line_scenario_attraction_dominates() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(3.0, 0.0, 0.0));
        let c = graph.add_vertex(at(10.0, 0.0, 0.0));
        graph.add_edge(a, b, EdgeOptions::default());
        graph.step();

        // Spring pull 2 * 9 * 3 = 54 outweighs repulsion 20 / 9.
        let on_a = -20.0 / 9.0 - 20.0 / 100.0 + 54.0;
        let on_b = 20.0 / 9.0 - 20.0 / 49.0 - 54.0;

        let pa = graph.vertex_position(a).unwrap();
        let pb = graph.vertex_position(b).unwrap();
        let pc = graph.vertex_position(c).unwrap();
        assert!((pa.x - delta(on_a)).abs() < TOL);
        assert!((pb.x - (3.0 + delta(on_b))).abs() < TOL);
        assert!(pa.x > 0.0 && pb.x < 3.0, "A and B move toward each other");
        assert!(pc.x > 10.0, "C is only repelled");
    }

    #[test]
    fn test_exact_mode_matches_single_cluster() {
        let mut approx = graph();
        let mut exact = graph();
        exact.set_repulsion_mode(RepulsionMode::Exact);
        for g in [&mut approx, &mut exact] {
            for i in 0..8 {
                let t = i as f32;
                g.add_vertex(at(t, (t * 1.7) % 3.0, (t * 0.9) % 2.0));
            }
        }

        let a = approx.step();
        let e = exact.step();
        for (p, q) in a.iter().zip(&e) {
            assert_eq!(p.id, q.id);
            assert!((p.position - q.position).length() < TOL);
        }
    }

    #[test]
    fn test_pinned_vertex_stays() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));
        assert!(graph.pin_vertex(a));
        assert!(graph.is_vertex_pinned(a));

        graph.run(5);
        assert_eq!(graph.vertex_position(a), Some(Vec3::ZERO));
        assert!(graph.vertex_position(b).unwrap().x > 1.0);

        assert!(graph.unpin_vertex(a));
        graph.step();
        assert!(graph.vertex_position(a).unwrap().x < 0.0);
        assert!(!graph.pin_vertex(VertexId(42)));
    }

    #[test]
    fn test_repulsion_exempt_vertex() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions {
            position: Some(Vec3::ZERO),
            repulsion_exempt: true,
            ..Default::default()
        });
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));
        graph.step();

        assert_eq!(graph.vertex_position(a), Some(Vec3::ZERO));
        assert!(graph.vertex_position(b).unwrap().x > 1.0);
    }

    #[test]
    fn test_vertex_overrides_apply() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions {
            position: Some(Vec3::ZERO),
            physics: crate::layout::PhysicsOverrides {
                repulsion: Some(40.0),
                ..Default::default()
            },
            ..Default::default()
        });
        let b = graph.add_vertex(at(1.0, 0.0, 0.0));
        graph.step();

        // A repels itself away twice as hard as B does.
        let va = graph.vertex(a).unwrap().velocity();
        let vb = graph.vertex(b).unwrap().velocity();
        assert!((va.x + 2.0 * vb.x).abs() < TOL);
    }

    #[test]
    fn test_set_vertex_position() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        assert!(graph.set_vertex_position(a, Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(graph.vertex_position(a), Some(Vec3::new(4.0, 5.0, 6.0)));
        assert!(!graph.set_vertex_position(VertexId(9), Vec3::ZERO));
        assert_eq!(graph.tree().len(), 1);
    }

    #[test]
    fn test_tree_rebuilt_each_step() {
        let mut graph = graph();
        for i in 0..20 {
            graph.add_vertex(at(i as f32 * 30.0, 0.0, 0.0));
        }
        graph.step();

        let tree = graph.tree();
        assert_eq!(tree.len(), 20);
        let inner: usize = tree.root().nodes().map(|n| n.inner().len()).sum();
        assert_eq!(inner, 20);
    }

    #[test]
    fn test_payload_roundtrip() {
        let mut graph = graph();
        let mut options = VertexOptions::default();
        options.payload.insert("color".into(), Value::from("#ff4500"));
        let a = graph.add_vertex(options);
        let b = graph.add_vertex(VertexOptions::default());
        let e = graph.add_edge(a, b, EdgeOptions::default()).unwrap();

        assert_eq!(
            graph.vertex_payload(a).and_then(|p| p.get("color")),
            Some(&Value::from("#ff4500"))
        );

        let mut replaced = Map::new();
        replaced.insert("linewidth".into(), Value::from(2.0));
        assert!(graph.set_edge_payload(e, replaced.clone()));
        assert_eq!(graph.edge_payload(e), Some(&replaced));
        assert!(graph.set_vertex_payload(b, replaced.clone()));
        assert_eq!(graph.vertex_payload(b), Some(&replaced));
    }

    #[test]
    fn test_find_nearest_vertex() {
        let mut graph = graph();
        let a = graph.add_vertex(at(0.0, 0.0, 0.0));
        let b = graph.add_vertex(at(50.0, 0.0, 0.0));

        assert_eq!(graph.find_nearest_vertex(Vec3::new(1.0, 0.0, 0.0)), Some(a));
        assert_eq!(graph.find_nearest_vertex(Vec3::new(49.0, 0.0, 0.0)), Some(b));
        assert_eq!(
            graph.find_nearest_vertex_within(Vec3::new(25.0, 0.0, 0.0), 1.0),
            None
        );

        graph.set_vertex_position(b, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(
            graph.find_vertices_in_radius(Vec3::ZERO, 3.0).len(),
            2
        );
        assert_eq!(
            graph.find_vertices_in_box(Vec3::splat(-1.0), Vec3::splat(1.0)),
            vec![a]
        );
    }

    #[test]
    fn test_center_and_bounds() {
        let mut graph = graph();
        assert_eq!(graph.center(), None);
        assert_eq!(graph.bounds(), None);

        graph.add_vertex(at(-2.0, 0.0, 1.0));
        graph.add_vertex(at(4.0, 2.0, -1.0));
        assert_eq!(graph.center(), Some(Vec3::new(1.0, 1.0, 0.0)));
        assert_eq!(
            graph.bounds(),
            Some((Vec3::new(-2.0, 0.0, -1.0), Vec3::new(4.0, 2.0, 1.0)))
        );
    }

    #[test]
    fn test_clear_resets_ids() {
        let mut graph = graph();
        let a = graph.add_vertex(VertexOptions::default());
        let b = graph.add_vertex(VertexOptions::default());
        graph.add_edge(a, b, EdgeOptions::default());

        graph.clear();
        assert_eq!(graph.vertex_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.tree().is_empty());
        assert_eq!(graph.add_vertex(VertexOptions::default()), VertexId(0));
    }

    #[test]
    fn test_with_config_validates() {
        let bad = LayoutConfig {
            spawn_extent: 0.0,
            ..Default::default()
        };
        assert!(LayoutGraph::with_config(bad).is_err());

        let constants = PhysicsConstants {
            damping: -0.1,
            ..Default::default()
        };
        assert!(LayoutGraph::with_constants(constants).is_err());

        let mut graph = graph();
        assert!(graph.set_constants(constants).is_err());
        assert_eq!(graph.constants(), &PhysicsConstants::default());
    }

    #[test]
    fn test_remove_heavy_churn_keeps_tree_consistent() {
        let mut graph = graph();
        let ids: Vec<_> = (0..40)
            .map(|i| graph.add_vertex(at((i * 37 % 200) as f32, (i * 11 % 90) as f32, 0.0)))
            .collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], EdgeOptions::default());
        }
        for id in ids.iter().step_by(3) {
            graph.remove_vertex(*id);
        }

        let tree = graph.tree();
        assert_eq!(tree.len(), graph.vertex_count());
        let inner: usize = tree.root().nodes().map(|n| n.inner().len()).sum();
        assert_eq!(inner, graph.vertex_count());
        assert!(graph.edges().all(|e| graph.contains_vertex(e.source())
            && graph.contains_vertex(e.target())));

        for p in graph.step() {
            assert!(p.position.is_finite());
        }
    }
}
