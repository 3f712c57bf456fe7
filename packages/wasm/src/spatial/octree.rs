//! Barnes-Hut style octree for approximate repulsion.
//!
//! Each node keeps a small *inner* set of bodies that sit within
//! `inner_distance` of the set's centroid and treats them as co-located.
//! Bodies further away are routed to one of eight children keyed by their
//! octant relative to that centroid.
//!
//! Force queries sum the inner set exactly when the query body belongs to
//! it, and otherwise collapse the inner set into one pseudo-body at its
//! centroid weighted by the set's cardinality. A child whose centroid is at
//! least `theta * size` away from the parent centroid is collapsed into a
//! single pseudo-body; nearer children are refined recursively.
//!
//! Centroids are recomputed from the inner bodies on every call. Bodies
//! carry the position they had when inserted; the layout rebuilds the tree
//! from current positions before each step.

use std::collections::HashMap;
use std::fmt;

use glam::Vec3;
use smallvec::SmallVec;

use crate::graph::VertexId;
use crate::layout::PhysicsConstants;

/// Octant path from the root to the node holding a body.
type Path = SmallVec<[Octant; 8]>;

/// One of the eight spatial subdivisions around a centroid.
///
/// Bit 0 is set when the position lies on the positive x side, bit 1 for
/// y and bit 2 for z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Octant(u8);

impl Octant {
    const X: u8 = 0b001;
    const Y: u8 = 0b010;
    const Z: u8 = 0b100;

    /// Octant of `position` relative to `center`.
    #[inline]
    pub fn of(center: Vec3, position: Vec3) -> Self {
        let mut bits = 0;
        if center.x < position.x {
            bits |= Self::X;
        }
        if center.y < position.y {
            bits |= Self::Y;
        }
        if center.z < position.z {
            bits |= Self::Z;
        }
        Self(bits)
    }

    /// Slot of this octant in a node's child array.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Three-letter code: `l`/`r` for x, `u`/`d` for y, `i`/`o` for z.
    pub fn code(self) -> [char; 3] {
        [
            if self.0 & Self::X != 0 { 'l' } else { 'r' },
            if self.0 & Self::Y != 0 { 'u' } else { 'd' },
            if self.0 & Self::Z != 0 { 'i' } else { 'o' },
        ]
    }

    fn from_index(index: usize) -> Self {
        Self(index as u8 & 0b111)
    }
}

impl fmt::Display for Octant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.code();
        write!(f, "{x}{y}{z}")
    }
}

/// A vertex as seen by the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub id: VertexId,
    pub position: Vec3,
}

impl Body {
    pub fn new(id: VertexId, position: Vec3) -> Self {
        Self { id, position }
    }
}

/// A node of the octree.
#[derive(Debug, Default)]
pub struct OctreeNode {
    inner: Vec<Body>,
    children: [Option<Box<OctreeNode>>; 8],
    /// Bodies in this subtree, inner set included.
    count: usize,
}

impl OctreeNode {
    /// Bodies treated as co-located at this node.
    pub fn inner(&self) -> &[Body] {
        &self.inner
    }

    /// Occupied children, in octant order.
    pub fn children(&self) -> impl Iterator<Item = (Octant, &OctreeNode)> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(i, child)| child.as_deref().map(|c| (Octant::from_index(i), c)))
    }

    /// The child for `octant`, if any body was routed there.
    pub fn child(&self, octant: Octant) -> Option<&OctreeNode> {
        self.children[octant.index()].as_deref()
    }

    /// Mean position of the inner set, or `None` if it is empty.
    pub fn centroid(&self) -> Option<Vec3> {
        if self.inner.is_empty() {
            return None;
        }
        let sum = self.inner.iter().fold(Vec3::ZERO, |acc, b| acc + b.position);
        Some(sum / self.inner.len() as f32)
    }

    /// Number of bodies in this subtree.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Body count floored at 1, used to scale the opening threshold.
    pub fn size(&self) -> usize {
        self.count.max(1)
    }

    /// This node and every node below it, depth first.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }

    fn insert(&mut self, body: Body, inner_distance: f32, path: &mut Path) {
        self.count += 1;

        let center = match self.centroid() {
            Some(center) if center.distance(body.position) >= inner_distance => center,
            _ => {
                self.inner.push(body);
                return;
            }
        };

        let octant = Octant::of(center, body.position);
        path.push(octant);
        self.children[octant.index()]
            .get_or_insert_with(Default::default)
            .insert(body, inner_distance, path);
    }

    fn remove(&mut self, id: VertexId, path: &[Octant]) -> Option<Body> {
        let Some((octant, rest)) = path.split_first() else {
            let index = self.inner.iter().position(|b| b.id == id)?;
            self.count -= 1;
            return Some(self.inner.remove(index));
        };

        let slot = &mut self.children[octant.index()];
        let child = slot.as_mut()?;
        let removed = child.remove(id, rest)?;
        if child.is_empty() {
            *slot = None;
        }
        self.count -= 1;
        Some(removed)
    }

    /// `path` is `Some` while the query body lives in this subtree and holds
    /// the remaining octants down to its node.
    fn estimate<F>(&self, body: &Body, path: Option<&[Octant]>, theta: f32, force: &F) -> Vec3
    where
        F: Fn(Vec3, Vec3) -> Vec3,
    {
        let centroid = self.centroid();
        let mut total = Vec3::ZERO;

        match (path, centroid) {
            (Some([]), _) => {
                for other in &self.inner {
                    if other.id != body.id {
                        total += force(body.position, other.position);
                    }
                }
            }
            (_, Some(center)) => {
                total += force(body.position, center) * self.inner.len() as f32;
            }
            (_, None) => {}
        }

        let (next, rest) = match path {
            Some([first, rest @ ..]) => (Some(*first), Some(rest)),
            _ => (None, None),
        };
        let threshold = theta * self.size() as f32;

        for (octant, child) in self.children() {
            if next == Some(octant) {
                total += child.estimate(body, rest, theta, force);
                continue;
            }

            match (centroid, child.centroid()) {
                (Some(center), Some(child_center)) if center.distance(child_center) >= threshold => {
                    total += force(body.position, child_center);
                }
                _ => total += child.estimate(body, None, theta, force),
            }
        }

        total
    }
}

/// Depth-first iterator over the nodes of a subtree.
pub struct Nodes<'a> {
    stack: Vec<&'a OctreeNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a OctreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().map(|(_, child)| child));
        Some(node)
    }
}

/// Incremental octree over the live vertices.
///
/// Alongside the nodes the tree records each body's octant path, so that
/// removal and the self-containing descent during estimation cost
/// O(depth) rather than a scan of the subtree.
#[derive(Debug)]
pub struct SpatialTree {
    root: OctreeNode,
    paths: HashMap<VertexId, Path>,
    inner_distance: f32,
    theta: f32,
}

impl SpatialTree {
    /// Create an empty tree using the clustering radius and accuracy
    /// threshold from `constants`.
    pub fn new(constants: &PhysicsConstants) -> Self {
        Self::with_capacity(constants, 0)
    }

    pub fn with_capacity(constants: &PhysicsConstants, capacity: usize) -> Self {
        Self {
            root: OctreeNode::default(),
            paths: HashMap::with_capacity(capacity),
            inner_distance: constants.inner_distance,
            theta: constants.theta,
        }
    }

    /// Build a tree from `(id, position)` pairs in order.
    pub fn build<I>(constants: &PhysicsConstants, bodies: I) -> Self
    where
        I: IntoIterator<Item = (VertexId, Vec3)>,
    {
        let bodies = bodies.into_iter();
        let mut tree = Self::with_capacity(constants, bodies.size_hint().0);
        for (id, position) in bodies {
            tree.insert(id, position);
        }
        tree
    }

    /// Insert a vertex at `position`.
    ///
    /// A vertex already in the tree is moved. Returns true if it was not
    /// present before.
    pub fn insert(&mut self, id: VertexId, position: Vec3) -> bool {
        let fresh = !self.remove(id);
        let mut path = Path::new();
        self.root
            .insert(Body::new(id, position), self.inner_distance, &mut path);
        self.paths.insert(id, path);
        fresh
    }

    /// Remove a vertex. Unknown ids are ignored and return false.
    pub fn remove(&mut self, id: VertexId) -> bool {
        let Some(path) = self.paths.remove(&id) else {
            return false;
        };
        self.root.remove(id, &path).is_some()
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.paths.contains_key(&id)
    }

    /// Approximate net force on the vertex `id` at `position` from every
    /// other body in the tree.
    ///
    /// `force(position, other)` is the pairwise force exerted on the query
    /// body by a body (or pseudo-body) at `other`. A vertex not in the tree
    /// is treated as an outside probe.
    pub fn estimate<F>(&self, id: VertexId, position: Vec3, force: F) -> Vec3
    where
        F: Fn(Vec3, Vec3) -> Vec3,
    {
        let path = self.paths.get(&id).map(|p| p.as_slice());
        self.root
            .estimate(&Body::new(id, position), path, self.theta, &force)
    }

    /// Depth of the node holding `id` (the root is depth 0).
    pub fn depth_of(&self, id: VertexId) -> Option<usize> {
        self.paths.get(&id).map(|p| p.len())
    }

    pub fn root(&self) -> &OctreeNode {
        &self.root
    }

    /// Number of bodies in the tree.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Body count floored at 1.
    pub fn size(&self) -> usize {
        self.root.size()
    }

    /// Drop every body.
    pub fn clear(&mut self) {
        self.root = OctreeNode::default();
        self.paths.clear();
    }
}
