//! R-tree pick index over vertex positions using the rstar crate.
//!
//! Answers the lookups a picking or selection layer needs:
//! - Nearest vertex
//! - Nearest vertex within a distance
//! - Vertices inside an axis-aligned box or a sphere

use glam::Vec3;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use crate::graph::VertexId;

/// A vertex position stored in the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexPoint {
    pub id: VertexId,
    pub position: [f32; 3],
}

impl VertexPoint {
    pub fn new(id: VertexId, position: Vec3) -> Self {
        Self {
            id,
            position: position.to_array(),
        }
    }
}

impl RTreeObject for VertexPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for VertexPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        Vec3::from_array(self.position).distance_squared(Vec3::from_array(*point))
    }
}

/// Point index rebuilt in bulk from a position snapshot.
#[derive(Default)]
pub struct PickIndex {
    tree: RTree<VertexPoint>,
}

impl PickIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `points`.
    pub fn rebuild<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = (VertexId, Vec3)>,
    {
        let points: Vec<_> = points
            .into_iter()
            .map(|(id, position)| VertexPoint::new(id, position))
            .collect();
        self.tree = RTree::bulk_load(points);
    }

    /// Nearest vertex to `point`.
    pub fn nearest(&self, point: Vec3) -> Option<VertexId> {
        self.tree.nearest_neighbor(&point.to_array()).map(|p| p.id)
    }

    /// Nearest vertex no further than `max_distance` from `point`.
    pub fn nearest_within(&self, point: Vec3, max_distance: f32) -> Option<VertexId> {
        let query = point.to_array();
        self.tree
            .nearest_neighbor(&query)
            .filter(|p| p.distance_2(&query) <= max_distance * max_distance)
            .map(|p| p.id)
    }

    /// Vertices inside the box spanned by `min` and `max`.
    pub fn in_box(&self, min: Vec3, max: Vec3) -> Vec<VertexId> {
        let envelope = AABB::from_corners(min.to_array(), max.to_array());
        self.tree
            .locate_in_envelope(&envelope)
            .map(|p| p.id)
            .collect()
    }

    /// Vertices within `radius` of `point`.
    pub fn in_radius(&self, point: Vec3, radius: f32) -> Vec<VertexId> {
        self.tree
            .locate_within_distance(point.to_array(), radius * radius)
            .map(|p| p.id)
            .collect()
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PickIndex {
        let mut index = PickIndex::new();
        index.rebuild([
            (VertexId(0), Vec3::ZERO),
            (VertexId(1), Vec3::new(10.0, 10.0, 10.0)),
            (VertexId(2), Vec3::new(5.0, 5.0, 0.0)),
        ]);
        index
    }

    #[test]
    fn test_nearest() {
        let index = index();
        assert_eq!(index.nearest(Vec3::new(0.5, 0.0, 0.0)), Some(VertexId(0)));
        assert_eq!(index.nearest(Vec3::new(6.0, 6.0, 1.0)), Some(VertexId(2)));
        assert_eq!(index.nearest(Vec3::new(11.0, 11.0, 11.0)), Some(VertexId(1)));
    }

    #[test]
    fn test_nearest_within() {
        let index = index();
        assert_eq!(index.nearest_within(Vec3::ZERO, 1.0), Some(VertexId(0)));
        assert_eq!(index.nearest_within(Vec3::new(0.0, 0.0, 20.0), 1.0), None);
    }

    #[test]
    fn test_in_box_and_radius() {
        let index = index();
        let inside = index.in_box(Vec3::splat(-1.0), Vec3::new(6.0, 6.0, 1.0));
        assert_eq!(inside.len(), 2);
        assert!(inside.contains(&VertexId(0)));
        assert!(inside.contains(&VertexId(2)));

        let near = index.in_radius(Vec3::ZERO, 8.0);
        assert_eq!(near.len(), 2);
        assert!(!near.contains(&VertexId(1)));
    }

    #[test]
    fn test_clear() {
        let mut index = index();
        assert_eq!(index.len(), 3);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.nearest(Vec3::ZERO), None);
    }
}
