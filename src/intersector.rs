//! Picking traversal state: tests scene-graph geometry against a polytope.
//!
//! [`PolytopeIntersector`] is a plain object driven by a scene traversal. The
//! traversal pushes and pops transforms and array state as it descends, asks
//! [`intersects`](PolytopeIntersector::intersects) whether a subtree's
//! bounding sphere can be culled, and reports draw calls through
//! [`intersect_draw`](PolytopeIntersector::intersect_draw) and
//! [`intersect_draw_indexed`](PolytopeIntersector::intersect_draw_indexed).
//! Hits accumulate in [`intersections`](PolytopeIntersector::intersections).
//!
//! The primitive test is conservative in reverse: a triangle counts as hit
//! when any of its vertices lies inside the polytope, so triangles that
//! straddle the region with all vertices outside are missed.

use std::sync::Arc;

use ash::vk;
use glam::{DMat4, DVec3, Vec3};
use smallvec::SmallVec;

use crate::polytope::{Camera, Polytope, Sphere};

/// Vertex positions as bound for a draw.
pub type Vec3Array = Vec<Vec3>;

/// A scene-graph node that contributes a transform to the traversal path.
pub trait TransformNode: Send + Sync {
    /// Composes this node's transform onto the accumulated parent matrix.
    fn transform(&self, parent: DMat4) -> DMat4;
}

/// The canonical [`TransformNode`]: a fixed matrix.
pub struct MatrixTransform {
    pub matrix: DMat4,
}

impl MatrixTransform {
    pub fn new(matrix: DMat4) -> Arc<Self> {
        Arc::new(Self { matrix })
    }
}

impl TransformNode for MatrixTransform {
    fn transform(&self, parent: DMat4) -> DMat4 {
        parent * self.matrix
    }
}

/// The chain of transform nodes from the scene root to the current node.
pub type NodePath = Vec<Arc<dyn TransformNode>>;

/// Folds a node path into its local-to-world matrix.
pub fn compute_transform(node_path: &[Arc<dyn TransformNode>]) -> DMat4 {
    node_path
        .iter()
        .fold(DMat4::IDENTITY, |matrix, node| node.transform(matrix))
}

/// The vertex input state in effect for the current draw calls.
#[derive(Clone)]
pub struct ArrayState {
    pub topology: vk::PrimitiveTopology,
    pub vertices: Option<Arc<Vec3Array>>,
    pub ushort_indices: Option<Arc<Vec<u16>>>,
    pub uint_indices: Option<Arc<Vec<u32>>>,
}

impl Default for ArrayState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::POINT_LIST,
            vertices: None,
            ushort_indices: None,
            uint_indices: None,
        }
    }
}

impl ArrayState {
    /// The vertex array to use for the given instance.
    pub fn vertex_array(&self, _instance_index: u32) -> Option<Arc<Vec3Array>> {
        self.vertices.clone()
    }
}

/// One corner of a hit primitive with its barycentric weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexRatio {
    pub index: u32,
    pub ratio: f64,
}

pub type IndexRatios = SmallVec<[IndexRatio; 3]>;

/// A recorded hit.
pub struct Intersection {
    pub local_intersection: DVec3,
    pub world_intersection: DVec3,
    pub ratio: f64,
    pub local_to_world: DMat4,
    pub node_path: NodePath,
    pub arrays: Vec<Arc<Vec3Array>>,
    pub index_ratios: IndexRatios,
    pub instance_index: u32,
}

/// Tests traversed geometry against a convex region.
///
/// The polytope stack mirrors the transform stack: entry 0 is the world-space
/// region, and each pushed transform appends the region re-expressed in that
/// node's local space, so primitive tests always run in local coordinates.
pub struct PolytopeIntersector {
    polytope_stack: Vec<Polytope>,
    local_to_world_stack: Vec<DMat4>,
    world_to_local_stack: Vec<DMat4>,
    node_path: NodePath,
    array_state_stack: Vec<ArrayState>,
    pub intersections: Vec<Intersection>,
}

impl PolytopeIntersector {
    /// Starts a traversal against an explicit world-space polytope.
    pub fn new(polytope: Polytope) -> Self {
        Self {
            polytope_stack: vec![polytope],
            local_to_world_stack: Vec::new(),
            world_to_local_stack: Vec::new(),
            node_path: Vec::new(),
            array_state_stack: vec![ArrayState::default()],
            intersections: Vec::new(),
        }
    }

    /// Starts a traversal against the region swept by a pixel-space pick
    /// rectangle on the given camera.
    pub fn from_camera_rect(
        camera: &Camera,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> Self {
        Self::new(Polytope::from_camera_rect(camera, x_min, y_min, x_max, y_max))
    }

    /// The region in the current local space.
    pub fn polytope(&self) -> &Polytope {
        self.polytope_stack
            .last()
            .expect("the world-space polytope is never popped")
    }

    pub fn local_to_world(&self) -> DMat4 {
        self.local_to_world_stack
            .last()
            .copied()
            .unwrap_or(DMat4::IDENTITY)
    }

    pub fn world_to_local(&self) -> DMat4 {
        self.world_to_local_stack
            .last()
            .copied()
            .unwrap_or(DMat4::IDENTITY)
    }

    /// Enters a transform node: extends the matrix stacks and re-expresses
    /// the world-space region in the node's local space.
    pub fn push_transform(&mut self, node: Arc<dyn TransformNode>) {
        let parent = self.local_to_world();
        let local_to_world = node.transform(parent);
        let world_to_local = local_to_world.inverse();

        self.local_to_world_stack.push(local_to_world);
        self.world_to_local_stack.push(world_to_local);
        self.node_path.push(node);

        let world_space = &self.polytope_stack[0];
        let local_space = world_space.transformed(&local_to_world);
        self.polytope_stack.push(local_space);
    }

    /// Leaves a transform node, popping all stacks in lockstep.
    ///
    /// # Panics
    ///
    /// Panics when called without a matching
    /// [`push_transform`](PolytopeIntersector::push_transform).
    pub fn pop_transform(&mut self) {
        assert!(
            !self.local_to_world_stack.is_empty(),
            "pop_transform without matching push_transform"
        );
        self.polytope_stack.pop();
        self.local_to_world_stack.pop();
        self.world_to_local_stack.pop();
        self.node_path.pop();
    }

    /// Enters a state group that changes the vertex input state.
    pub fn push_array_state(&mut self, array_state: ArrayState) {
        self.array_state_stack.push(array_state);
    }

    /// Leaves a state group.
    ///
    /// # Panics
    ///
    /// Panics when called without a matching
    /// [`push_array_state`](PolytopeIntersector::push_array_state).
    pub fn pop_array_state(&mut self) {
        assert!(
            self.array_state_stack.len() > 1,
            "pop_array_state without matching push_array_state"
        );
        self.array_state_stack.pop();
    }

    fn array_state(&self) -> &ArrayState {
        self.array_state_stack
            .last()
            .expect("the initial array state is never popped")
    }

    /// Conservative bounding-sphere test against the current local-space
    /// region, used by the traversal for hierarchical pruning. Invalid
    /// spheres report no intersection.
    pub fn intersects(&self, sphere: &Sphere) -> bool {
        self.polytope().intersects_sphere(sphere)
    }

    /// Records a hit at `coord` (current local space).
    pub fn add(
        &mut self,
        coord: DVec3,
        ratio: f64,
        index_ratios: IndexRatios,
        instance_index: u32,
    ) {
        let local_to_world = compute_transform(&self.node_path);
        let arrays = self
            .array_state()
            .vertices
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        self.intersections.push(Intersection {
            local_intersection: coord,
            world_intersection: local_to_world.transform_point3(coord),
            ratio,
            local_to_world,
            node_path: self.node_path.clone(),
            arrays,
            index_ratios,
            instance_index,
        });
    }

    /// Tests the triangles of a non-indexed draw, recording a hit for every
    /// triangle with a vertex inside the region. Returns whether any hits
    /// were added. Draws with a topology other than `TRIANGLE_LIST`, fewer
    /// than three vertices, or no vertex array yield no hits.
    pub fn intersect_draw(
        &mut self,
        first_vertex: u32,
        vertex_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) -> bool {
        let previous_count = self.intersections.len();

        let array_state = self.array_state().clone();
        if array_state.topology != vk::PrimitiveTopology::TRIANGLE_LIST || vertex_count < 3 {
            return false;
        }

        let last_instance = if instance_count > 1 {
            first_instance + instance_count
        } else {
            first_instance + 1
        };
        let mut hits = Vec::new();
        for instance_index in first_instance..last_instance {
            let Some(vertices) = array_state.vertex_array(instance_index) else {
                return false;
            };

            let end_vertex = ((first_vertex + vertex_count) / 3) * 3;
            let mut i = first_vertex;
            while i < end_vertex {
                if let Some(hit) = self.test_triangle(&vertices, [i, i + 1, i + 2], instance_index)
                {
                    hits.push(hit);
                }
                i += 3;
            }
        }
        for (coord, index_ratios, instance_index) in hits {
            self.add(coord, 1.0, index_ratios, instance_index);
        }

        self.intersections.len() != previous_count
    }

    /// Indexed variant of [`intersect_draw`](PolytopeIntersector::intersect_draw),
    /// reading corner indices from the bound 16-bit array, or the 32-bit
    /// array when no 16-bit array is bound.
    pub fn intersect_draw_indexed(
        &mut self,
        first_index: u32,
        index_count: u32,
        first_instance: u32,
        instance_count: u32,
    ) -> bool {
        let previous_count = self.intersections.len();

        let array_state = self.array_state().clone();
        if array_state.topology != vk::PrimitiveTopology::TRIANGLE_LIST || index_count < 3 {
            return false;
        }

        let last_instance = if instance_count > 1 {
            first_instance + instance_count
        } else {
            first_instance + 1
        };
        let end_index = ((first_index + index_count) / 3) * 3;

        let mut hits = Vec::new();
        for instance_index in first_instance..last_instance {
            let Some(vertices) = array_state.vertex_array(instance_index) else {
                continue;
            };

            let mut i = first_index;
            while i < end_index {
                let corners = if let Some(indices) = &array_state.ushort_indices {
                    Self::fetch_corners(indices, i, |v| *v as u32)
                } else if let Some(indices) = &array_state.uint_indices {
                    Self::fetch_corners(indices, i, |v| *v)
                } else {
                    None
                };
                if let Some(corners) = corners {
                    if let Some(hit) = self.test_triangle(&vertices, corners, instance_index) {
                        hits.push(hit);
                    }
                }
                i += 3;
            }
        }
        for (coord, index_ratios, instance_index) in hits {
            self.add(coord, 1.0, index_ratios, instance_index);
        }

        self.intersections.len() != previous_count
    }

    fn fetch_corners<T>(indices: &[T], first: u32, to_u32: impl Fn(&T) -> u32) -> Option<[u32; 3]> {
        let first = first as usize;
        Some([
            to_u32(indices.get(first)?),
            to_u32(indices.get(first + 1)?),
            to_u32(indices.get(first + 2)?),
        ])
    }

    /// Any-vertex-inside triangle test. Returns the hit coordinate (the
    /// first inside vertex), the per-corner ratios, and the instance index.
    fn test_triangle(
        &self,
        vertices: &Vec3Array,
        corners: [u32; 3],
        instance_index: u32,
    ) -> Option<(DVec3, IndexRatios, u32)> {
        let polytope = self.polytope();
        for (corner, &index) in corners.iter().enumerate() {
            let Some(vertex) = vertices.get(index as usize) else {
                continue;
            };
            let point = vertex.as_dvec3();
            if polytope.contains(point) {
                let index_ratios = corners
                    .iter()
                    .enumerate()
                    .map(|(k, &index)| IndexRatio {
                        index,
                        ratio: if k == corner { 1.0 } else { 0.0 },
                    })
                    .collect();
                return Some((point, index_ratios, instance_index));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polytope::Plane;

    fn unit_box() -> Polytope {
        Polytope::from_planes(vec![
            Plane::new(1.0, 0.0, 0.0, 0.0),
            Plane::new(-1.0, 0.0, 0.0, 1.0),
            Plane::new(0.0, 1.0, 0.0, 0.0),
            Plane::new(0.0, -1.0, 0.0, 1.0),
            Plane::new(0.0, 0.0, 1.0, 0.0),
            Plane::new(0.0, 0.0, -1.0, 1.0),
        ])
    }

    fn triangle_state(vertices: Vec<Vec3>) -> ArrayState {
        ArrayState {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            vertices: Some(Arc::new(vertices)),
            ..Default::default()
        }
    }

    #[test]
    fn test_stacks_move_in_lockstep() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        assert_eq!(intersector.polytope_stack.len(), 1);

        intersector.push_transform(MatrixTransform::new(DMat4::IDENTITY));
        intersector.push_transform(MatrixTransform::new(DMat4::from_translation(
            DVec3::new(1.0, 0.0, 0.0),
        )));
        assert_eq!(intersector.polytope_stack.len(), 3);
        assert_eq!(intersector.local_to_world_stack.len(), 2);
        assert_eq!(intersector.world_to_local_stack.len(), 2);

        intersector.pop_transform();
        intersector.pop_transform();
        assert_eq!(intersector.polytope_stack.len(), 1);
        assert_eq!(intersector.local_to_world_stack.len(), 0);
        assert_eq!(intersector.world_to_local_stack.len(), 0);
    }

    #[test]
    #[should_panic(expected = "pop_transform without matching push_transform")]
    fn test_unmatched_pop_panics() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.pop_transform();
    }

    #[test]
    fn test_pushed_transform_localizes_the_region() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        // local frame sits at world x = +5
        intersector.push_transform(MatrixTransform::new(DMat4::from_translation(
            DVec3::new(5.0, 0.0, 0.0),
        )));

        // world [0,1] in x is local [-5,-4]
        assert!(intersector.intersects(&Sphere::new(DVec3::new(-4.5, 0.5, 0.5), 0.1)));
        assert!(!intersector.intersects(&Sphere::new(DVec3::new(0.5, 0.5, 0.5), 0.1)));

        intersector.pop_transform();
        assert!(intersector.intersects(&Sphere::new(DVec3::new(0.5, 0.5, 0.5), 0.1)));
    }

    #[test]
    fn test_sphere_outside_every_plane() {
        let intersector = PolytopeIntersector::new(unit_box());
        assert!(!intersector.intersects(&Sphere::new(DVec3::new(3.0, 0.5, 0.5), 1.0)));
    }

    #[test]
    fn test_draw_records_hit_for_inside_vertex() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(triangle_state(vec![
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ]));

        assert!(intersector.intersect_draw(0, 3, 0, 1));
        assert_eq!(intersector.intersections.len(), 1);
        let hit = &intersector.intersections[0];
        assert_eq!(hit.local_intersection, DVec3::new(0.5, 0.5, 0.5));
        assert_eq!(hit.world_intersection, DVec3::new(0.5, 0.5, 0.5));
        assert_eq!(hit.instance_index, 0);
        assert_eq!(hit.index_ratios.len(), 3);
        assert_eq!(hit.index_ratios[0].index, 0);
        assert_eq!(hit.index_ratios[0].ratio, 1.0);
        assert_eq!(hit.index_ratios[1].ratio, 0.0);
    }

    #[test]
    fn test_draw_misses_straddling_triangle() {
        // all three vertices outside, triangle passes through the box: the
        // conservative test does not see it
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(triangle_state(vec![
            Vec3::new(-5.0, 0.5, 0.5),
            Vec3::new(5.0, 0.5, 0.5),
            Vec3::new(0.0, 10.0, 0.5),
        ]));
        assert!(!intersector.intersect_draw(0, 3, 0, 1));
        assert!(intersector.intersections.is_empty());
    }

    #[test]
    fn test_draw_requires_triangle_list() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        let mut state = triangle_state(vec![Vec3::splat(0.5); 3]);
        state.topology = vk::PrimitiveTopology::TRIANGLE_STRIP;
        intersector.push_array_state(state);
        assert!(!intersector.intersect_draw(0, 3, 0, 1));
    }

    #[test]
    fn test_draw_without_vertices_yields_no_hits() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(ArrayState {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        });
        assert!(!intersector.intersect_draw(0, 3, 0, 1));
    }

    #[test]
    fn test_draw_under_transform_maps_world_coordinates() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        // local frame at world (0.5, 0.5, 0.5): local origin is inside
        intersector.push_transform(MatrixTransform::new(DMat4::from_translation(
            DVec3::new(0.5, 0.5, 0.5),
        )));
        intersector.push_array_state(triangle_state(vec![
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
        ]));

        assert!(intersector.intersect_draw(0, 3, 0, 1));
        let hit = &intersector.intersections[0];
        assert_eq!(hit.local_intersection, DVec3::ZERO);
        assert_eq!(hit.world_intersection, DVec3::new(0.5, 0.5, 0.5));
        assert_eq!(hit.node_path.len(), 1);
    }

    #[test]
    fn test_indexed_draw_with_ushort_indices() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        let mut state = triangle_state(vec![
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(6.0, 6.0, 6.0),
            Vec3::new(7.0, 7.0, 7.0),
        ]);
        state.ushort_indices = Some(Arc::new(vec![3, 1, 0]));
        intersector.push_array_state(state);

        assert!(intersector.intersect_draw_indexed(0, 3, 0, 1));
        let hit = &intersector.intersections[0];
        assert_eq!(hit.local_intersection, DVec3::new(0.5, 0.5, 0.5));
        assert_eq!(hit.index_ratios[1].index, 1);
        assert_eq!(hit.index_ratios[1].ratio, 1.0);
    }

    #[test]
    fn test_indexed_draw_with_uint_indices() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        let mut state = triangle_state(vec![
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(6.0, 6.0, 6.0),
        ]);
        state.uint_indices = Some(Arc::new(vec![0, 1, 2]));
        intersector.push_array_state(state);

        assert!(intersector.intersect_draw_indexed(0, 3, 0, 1));
        assert_eq!(intersector.intersections.len(), 1);
    }

    #[test]
    fn test_indexed_draw_without_indices_yields_no_hits() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(triangle_state(vec![Vec3::splat(0.5); 3]));
        assert!(!intersector.intersect_draw_indexed(0, 3, 0, 1));
    }

    #[test]
    fn test_partial_trailing_triangle_is_ignored() {
        // five vertices: only the first complete triangle is tested
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(triangle_state(vec![
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(6.0, 6.0, 6.0),
            Vec3::new(7.0, 7.0, 7.0),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(0.5, 0.5, 0.5),
        ]));
        assert!(!intersector.intersect_draw(0, 5, 0, 1));
    }

    #[test]
    fn test_instanced_draw_reports_instance_index() {
        let mut intersector = PolytopeIntersector::new(unit_box());
        intersector.push_array_state(triangle_state(vec![
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
        ]));

        assert!(intersector.intersect_draw(0, 3, 2, 3));
        assert_eq!(intersector.intersections.len(), 3);
        let instances: Vec<u32> = intersector
            .intersections
            .iter()
            .map(|hit| hit.instance_index)
            .collect();
        assert_eq!(instances, vec![2, 3, 4]);
    }
}
