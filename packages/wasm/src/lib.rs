//! Scene Layout - WASM Module
//!
//! Force-directed 3D graph layout for the scene-graph renderer. The crate is
//! compiled to WebAssembly and exposes a JavaScript-friendly API via
//! wasm-bindgen; the same types are usable directly from Rust.
//!
//! # Architecture
//!
//! - `graph`: Vertices, edges and the `LayoutGraph` engine on petgraph's StableGraph
//! - `spatial`: Barnes-Hut octree for repulsion, R-tree for picking
//! - `layout`: Physics constants and force laws

use glam::Vec3;
use js_sys::Float32Array;
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub mod graph;
pub mod layout;
pub mod spatial;

pub use graph::{
    Edge, EdgeId, EdgeOptions, ElementId, LayoutConfig, LayoutGraph, RepulsionMode, Vertex,
    VertexId, VertexOptions, VertexPosition,
};
pub use layout::{ConfigError, PhysicsConstants, PhysicsOverrides};
pub use spatial::SpatialTree;

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Main entry point for the layout engine.
///
/// Wraps a [`LayoutGraph`] and provides the public API exposed to
/// JavaScript. Vertex and edge ids are plain numbers on this side; the two
/// kinds overlap, so `remove` takes a `"vertex-N"` or `"edge-N"` key.
#[wasm_bindgen]
pub struct SceneLayout {
    graph: LayoutGraph,
}

#[wasm_bindgen]
impl SceneLayout {
    /// Create an empty layout.
    ///
    /// `config` is an optional object with `constants` (`K`, `f0`, `dt`, `D`,
    /// `epsilon`, `theta`, `innerDistance`), `spawnExtent`, `seed` and
    /// `repulsion` (`"barnesHut"` or `"exact"`).
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<SceneLayout, JsError> {
        let config: LayoutConfig = if config.is_undefined() || config.is_null() {
            LayoutConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        Ok(Self {
            graph: LayoutGraph::with_config(config)?,
        })
    }

    /// Replace the physics constants. Missing fields take their defaults.
    #[wasm_bindgen(js_name = setConstants)]
    pub fn set_constants(&mut self, constants: JsValue) -> Result<(), JsError> {
        let constants: PhysicsConstants = serde_wasm_bindgen::from_value(constants)?;
        self.graph.set_constants(constants)?;
        Ok(())
    }

    /// Current physics constants as an object.
    #[wasm_bindgen(js_name = getConstants)]
    pub fn get_constants(&self) -> Result<JsValue, JsError> {
        to_js(self.graph.constants())
    }

    // =========================================================================
    // Vertex Operations
    // =========================================================================

    /// Add a vertex and return its id.
    ///
    /// `options` may carry `id`, `position` (`[x, y, z]`), `pinned`,
    /// `repulsionExempt` and physics overrides; any other field is kept as
    /// presentation payload.
    #[wasm_bindgen(js_name = addVertex)]
    pub fn add_vertex(&mut self, options: JsValue) -> Result<u32, JsError> {
        let options: VertexOptions = from_js_or_default(options)?;
        Ok(self.graph.add_vertex(options).raw())
    }

    /// Remove a vertex and its incident edges.
    ///
    /// Returns true if the vertex existed and was removed.
    #[wasm_bindgen(js_name = removeVertex)]
    pub fn remove_vertex(&mut self, vertex_id: u32) -> bool {
        self.graph.remove_vertex(VertexId(vertex_id))
    }

    /// Set a vertex's position.
    #[wasm_bindgen(js_name = setVertexPosition)]
    pub fn set_vertex_position(&mut self, vertex_id: u32, x: f32, y: f32, z: f32) -> bool {
        self.graph
            .set_vertex_position(VertexId(vertex_id), Vec3::new(x, y, z))
    }

    /// Get a vertex's position as `[x, y, z]`.
    #[wasm_bindgen(js_name = getVertexPosition)]
    pub fn get_vertex_position(&self, vertex_id: u32) -> Option<Vec<f32>> {
        self.graph
            .vertex_position(VertexId(vertex_id))
            .map(|p| p.to_array().to_vec())
    }

    #[wasm_bindgen(js_name = pinVertex)]
    pub fn pin_vertex(&mut self, vertex_id: u32) -> bool {
        self.graph.pin_vertex(VertexId(vertex_id))
    }

    #[wasm_bindgen(js_name = unpinVertex)]
    pub fn unpin_vertex(&mut self, vertex_id: u32) -> bool {
        self.graph.unpin_vertex(VertexId(vertex_id))
    }

    /// Presentation fields stored with a vertex.
    #[wasm_bindgen(js_name = getVertexPayload)]
    pub fn get_vertex_payload(&self, vertex_id: u32) -> Result<JsValue, JsError> {
        match self.graph.vertex_payload(VertexId(vertex_id)) {
            Some(payload) => to_js(payload),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = setVertexPayload)]
    pub fn set_vertex_payload(&mut self, vertex_id: u32, payload: JsValue) -> Result<bool, JsError> {
        let payload = serde_wasm_bindgen::from_value(payload)?;
        Ok(self.graph.set_vertex_payload(VertexId(vertex_id), payload))
    }

    /// Get the number of vertices.
    #[wasm_bindgen(js_name = vertexCount)]
    pub fn vertex_count(&self) -> u32 {
        self.graph.vertex_count() as u32
    }

    /// Ids of all live vertices, in the order `positions()` reports them.
    #[wasm_bindgen(js_name = vertexIds)]
    pub fn vertex_ids(&self) -> Vec<u32> {
        self.graph.vertex_ids().into_iter().map(VertexId::raw).collect()
    }

    /// Ids of the vertices sharing an edge with `vertex_id`.
    pub fn neighbors(&self, vertex_id: u32) -> Vec<u32> {
        self.graph
            .neighbors(VertexId(vertex_id))
            .into_iter()
            .map(VertexId::raw)
            .collect()
    }

    // =========================================================================
    // Edge Operations
    // =========================================================================

    /// Add an edge between two vertices.
    ///
    /// Returns the edge id, or undefined if either vertex does not exist or
    /// the requested id is taken.
    #[wasm_bindgen(js_name = addEdge)]
    pub fn add_edge(&mut self, source: u32, target: u32, options: JsValue) -> Result<Option<u32>, JsError> {
        let options: EdgeOptions = from_js_or_default(options)?;
        Ok(self
            .graph
            .add_edge(VertexId(source), VertexId(target), options)
            .map(EdgeId::raw))
    }

    /// Remove an edge by ID.
    #[wasm_bindgen(js_name = removeEdge)]
    pub fn remove_edge(&mut self, edge_id: u32) -> bool {
        self.graph.remove_edge(EdgeId(edge_id))
    }

    /// Remove the element named by `key`, `"vertex-N"` or `"edge-N"`.
    ///
    /// Returns false if no such element exists.
    pub fn remove(&mut self, key: &str) -> Result<bool, JsError> {
        let element: ElementId = key.parse()?;
        Ok(self.graph.remove(element))
    }

    #[wasm_bindgen(js_name = getEdgePayload)]
    pub fn get_edge_payload(&self, edge_id: u32) -> Result<JsValue, JsError> {
        match self.graph.edge_payload(EdgeId(edge_id)) {
            Some(payload) => to_js(payload),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = setEdgePayload)]
    pub fn set_edge_payload(&mut self, edge_id: u32, payload: JsValue) -> Result<bool, JsError> {
        let payload = serde_wasm_bindgen::from_value(payload)?;
        Ok(self.graph.set_edge_payload(EdgeId(edge_id), payload))
    }

    /// Get the number of edges.
    #[wasm_bindgen(js_name = edgeCount)]
    pub fn edge_count(&self) -> u32 {
        self.graph.edge_count() as u32
    }

    /// Ids of the edges incident to a vertex.
    #[wasm_bindgen(js_name = incidentEdges)]
    pub fn incident_edges(&self, vertex_id: u32) -> Vec<u32> {
        self.graph
            .incident_edges(VertexId(vertex_id))
            .into_iter()
            .map(EdgeId::raw)
            .collect()
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Advance one frame and return `[{ id, position: [x, y, z] }, ...]`.
    pub fn step(&mut self) -> Result<JsValue, JsError> {
        let snapshot: Vec<JsVertexPosition> = self
            .graph
            .step()
            .into_iter()
            .map(JsVertexPosition::from)
            .collect();
        to_js(&snapshot)
    }

    /// Advance one frame and write positions into `out` as
    /// `[x0, y0, z0, x1, ...]` in `vertexIds()` order.
    ///
    /// Returns the number of vertices written, which is less than the vertex
    /// count if `out` is too short.
    #[wasm_bindgen(js_name = stepInto)]
    pub fn step_into(&mut self, out: &mut [f32]) -> u32 {
        let snapshot = self.graph.step();
        let mut written = 0;
        for (slot, p) in out.chunks_exact_mut(3).zip(&snapshot) {
            slot.copy_from_slice(&p.position.to_array());
            written += 1;
        }
        written
    }

    /// Current positions as `[x0, y0, z0, x1, ...]` in `vertexIds()` order.
    pub fn positions(&self) -> Float32Array {
        let flat: Vec<f32> = self
            .graph
            .positions()
            .iter()
            .flat_map(|p| p.position.to_array())
            .collect();
        Float32Array::from(&flat[..])
    }

    /// Mean position of all vertices as `[x, y, z]`, or undefined when empty.
    pub fn center(&self) -> Option<Vec<f32>> {
        self.graph.center().map(|c| c.to_array().to_vec())
    }

    /// Bounds as `[minX, minY, minZ, maxX, maxY, maxZ]`, or undefined when empty.
    #[wasm_bindgen(js_name = getBounds)]
    pub fn get_bounds(&self) -> Option<Vec<f32>> {
        self.graph.bounds().map(|(min, max)| {
            let mut bounds = min.to_array().to_vec();
            bounds.extend_from_slice(&max.to_array());
            bounds
        })
    }

    // =========================================================================
    // Spatial Queries
    // =========================================================================

    /// Find the vertex nearest to a point.
    ///
    /// With `max_distance`, vertices further away are ignored.
    #[wasm_bindgen(js_name = findNearestVertex)]
    pub fn find_nearest_vertex(&mut self, x: f32, y: f32, z: f32, max_distance: Option<f32>) -> Option<u32> {
        let point = Vec3::new(x, y, z);
        match max_distance {
            Some(max) => self.graph.find_nearest_vertex_within(point, max),
            None => self.graph.find_nearest_vertex(point),
        }
        .map(VertexId::raw)
    }

    /// Find all vertices in a box.
    #[wasm_bindgen(js_name = findVerticesInBox)]
    pub fn find_vertices_in_box(
        &mut self,
        min_x: f32,
        min_y: f32,
        min_z: f32,
        max_x: f32,
        max_y: f32,
        max_z: f32,
    ) -> Vec<u32> {
        self.graph
            .find_vertices_in_box(
                Vec3::new(min_x, min_y, min_z),
                Vec3::new(max_x, max_y, max_z),
            )
            .into_iter()
            .map(VertexId::raw)
            .collect()
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Clear all vertices and edges.
    pub fn clear(&mut self) {
        self.graph.clear();
    }
}

/// Snapshot entry as sent to JavaScript, with a numeric id.
#[derive(Serialize)]
struct JsVertexPosition {
    id: u32,
    position: [f32; 3],
}

impl From<VertexPosition> for JsVertexPosition {
    fn from(p: VertexPosition) -> Self {
        Self {
            id: p.id.raw(),
            position: p.position.to_array(),
        }
    }
}

fn from_js_or_default<T>(value: JsValue) -> Result<T, JsError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_wasm_bindgen::from_value(value)?)
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsError> {
    // Payload maps come out as plain objects rather than `Map`s.
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    Ok(value.serialize(&serializer)?)
}
