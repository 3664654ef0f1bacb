//! Convex regions expressed as intersections of half-spaces.
//!
//! A [`Polytope`] generalizes the view frustum: any convex region bounded by
//! a finite set of planes. Picking a sub-rectangle of the screen yields a
//! six-plane polytope via [`Polytope::from_camera_rect`], and scene-graph
//! traversal retransforms it into each node's local space with
//! [`Polytope::transformed`].

use ash::vk;
use glam::{DMat4, DVec3, DVec4};

/// A half-space: the set of points with `a·x + b·y + c·z + d ≥ 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane(pub DVec4);

impl Plane {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self(DVec4::new(a, b, c, d))
    }

    /// Signed distance from the plane, scaled by the normal's length.
    /// Positive on the inside.
    pub fn distance(&self, point: DVec3) -> f64 {
        self.0.dot(point.extend(1.0))
    }

    /// Transforms the plane as a row vector: `p' = p · M`.
    ///
    /// With `M` mapping space B to space A, this takes a plane expressed in A
    /// to the equivalent plane in B; membership is preserved without forming
    /// an inverse transpose.
    pub fn transform(&self, matrix: &DMat4) -> Plane {
        Plane(DVec4::new(
            self.0.dot(matrix.x_axis),
            self.0.dot(matrix.y_axis),
            self.0.dot(matrix.z_axis),
            self.0.dot(matrix.w_axis),
        ))
    }
}

/// A sphere used for hierarchical culling during traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: DVec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// A sphere is valid when its center is finite and its radius positive.
    pub fn valid(&self) -> bool {
        self.center.is_finite() && self.radius > 0.0
    }
}

/// A camera description sufficient to build a picking polytope: projection,
/// view, and the viewport the pick coordinates are relative to.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub projection: DMat4,
    pub view: DMat4,
    pub viewport: vk::Viewport,
}

/// The intersection of a set of half-spaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polytope {
    planes: Vec<Plane>,
}

impl Polytope {
    pub fn from_planes(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Builds the world-space polytope for a pixel-space pick rectangle.
    ///
    /// The rectangle is mapped into NDC through the camera's viewport (passed
    /// through unchanged when the viewport has zero extent), six clip-space
    /// planes are formed, and each is carried through the projection and view
    /// matrices. Reverse-Z projections are detected from the sign of the
    /// projection matrix's (2,2) element and flip which viewport depth bound
    /// is near.
    pub fn from_camera_rect(
        camera: &Camera,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> Self {
        let viewport = &camera.viewport;
        let to_ndc_x = |x: f64| {
            if viewport.width > 0.0 {
                2.0 * (x - viewport.x as f64) / viewport.width as f64 - 1.0
            } else {
                x
            }
        };
        let to_ndc_y = |y: f64| {
            if viewport.height > 0.0 {
                2.0 * (y - viewport.y as f64) / viewport.height as f64 - 1.0
            } else {
                y
            }
        };
        let ndc_x_min = to_ndc_x(x_min);
        let ndc_x_max = to_ndc_x(x_max);
        let ndc_y_min = to_ndc_y(y_min);
        let ndc_y_max = to_ndc_y(y_max);

        let reverse_depth = camera.projection.z_axis.z > 0.0;
        let (ndc_near, ndc_far) = if reverse_depth {
            (viewport.max_depth as f64, viewport.min_depth as f64)
        } else {
            (viewport.min_depth as f64, viewport.max_depth as f64)
        };
        let ndc_z_min = ndc_near.min(ndc_far);
        let ndc_z_max = ndc_near.max(ndc_far);

        let clip_space = Polytope::from_planes(vec![
            Plane::new(1.0, 0.0, 0.0, -ndc_x_min), // left
            Plane::new(-1.0, 0.0, 0.0, ndc_x_max), // right
            Plane::new(0.0, 1.0, 0.0, -ndc_y_min), // bottom
            Plane::new(0.0, -1.0, 0.0, ndc_y_max), // top
            Plane::new(0.0, 0.0, 1.0, -ndc_z_min), // near
            Plane::new(0.0, 0.0, -1.0, ndc_z_max), // far
        ]);

        let eye_space = clip_space.transformed(&camera.projection);
        eye_space.transformed(&camera.view)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Transforms every plane by `matrix` (row-vector convention, see
    /// [`Plane::transform`]).
    pub fn transformed(&self, matrix: &DMat4) -> Polytope {
        Polytope {
            planes: self
                .planes
                .iter()
                .map(|plane| plane.transform(matrix))
                .collect(),
        }
    }

    /// Whether the point satisfies every half-space.
    pub fn contains(&self, point: DVec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(point) >= 0.0)
    }

    /// Conservative sphere test: the sphere intersects unless it lies
    /// entirely outside some half-space. Invalid spheres never intersect.
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        if !sphere.valid() {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.distance(sphere.center) >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Polytope {
        // 0 <= x,y,z <= 1
        Polytope::from_planes(vec![
            Plane::new(1.0, 0.0, 0.0, 0.0),
            Plane::new(-1.0, 0.0, 0.0, 1.0),
            Plane::new(0.0, 1.0, 0.0, 0.0),
            Plane::new(0.0, -1.0, 0.0, 1.0),
            Plane::new(0.0, 0.0, 1.0, 0.0),
            Plane::new(0.0, 0.0, -1.0, 1.0),
        ])
    }

    #[test]
    fn test_contains() {
        let polytope = unit_box();
        assert!(polytope.contains(DVec3::new(0.5, 0.5, 0.5)));
        assert!(polytope.contains(DVec3::ZERO));
        assert!(!polytope.contains(DVec3::new(1.5, 0.5, 0.5)));
        assert!(!polytope.contains(DVec3::new(0.5, -0.1, 0.5)));
    }

    #[test]
    fn test_sphere_intersection() {
        let polytope = unit_box();
        // inside
        assert!(polytope.intersects_sphere(&Sphere::new(DVec3::splat(0.5), 0.1)));
        // overlapping a face from outside
        assert!(polytope.intersects_sphere(&Sphere::new(DVec3::new(1.2, 0.5, 0.5), 0.3)));
        // entirely outside one half-space
        assert!(!polytope.intersects_sphere(&Sphere::new(DVec3::new(2.0, 0.5, 0.5), 0.5)));
    }

    #[test]
    fn test_invalid_spheres_never_intersect() {
        let polytope = unit_box();
        assert!(!polytope.intersects_sphere(&Sphere::new(DVec3::splat(0.5), 0.0)));
        assert!(!polytope.intersects_sphere(&Sphere::new(DVec3::splat(0.5), -1.0)));
        assert!(!polytope.intersects_sphere(&Sphere::new(
            DVec3::new(f64::NAN, 0.5, 0.5),
            1.0
        )));
    }

    #[test]
    fn test_plane_transform_preserves_membership() {
        // world half-space x >= 0, local frame at world x = +5
        let plane = Plane::new(1.0, 0.0, 0.0, 0.0);
        let local_to_world = DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0));
        let local_plane = plane.transform(&local_to_world);
        // local x = -2 is world x = 3
        assert!(local_plane.distance(DVec3::new(-2.0, 0.0, 0.0)) >= 0.0);
        // local x = -6 is world x = -1
        assert!(local_plane.distance(DVec3::new(-6.0, 0.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_camera_rect_polytope() {
        let camera = Camera {
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: 800.0,
                height: 600.0,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        };
        // lower-right quadrant of the viewport
        let polytope = Polytope::from_camera_rect(&camera, 400.0, 300.0, 800.0, 600.0);
        assert_eq!(polytope.planes().len(), 6);
        assert!(polytope.contains(DVec3::new(0.5, 0.5, 0.5)));
        assert!(!polytope.contains(DVec3::new(-0.5, 0.0, 0.5)));
        // boundary of the rectangle is inside
        assert!(polytope.contains(DVec3::new(0.0, 0.0, 0.0)));
        assert!(polytope.contains(DVec3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_zero_extent_viewport_passes_coordinates_through() {
        let camera = Camera {
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        };
        let polytope = Polytope::from_camera_rect(&camera, -1.0, -1.0, 1.0, 1.0);
        assert!(polytope.contains(DVec3::new(0.0, 0.0, 0.5)));
        assert!(!polytope.contains(DVec3::new(2.0, 0.0, 0.5)));
    }

    #[test]
    fn test_reverse_depth_detection() {
        let mut projection = DMat4::IDENTITY;
        projection.z_axis.z = 0.5; // positive (2,2): reverse-Z
        let camera = Camera {
            projection,
            view: DMat4::IDENTITY,
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 100.0,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        };
        let polytope = Polytope::from_camera_rect(&camera, 0.0, 0.0, 100.0, 100.0);
        // depth bounds still admit the full [0, 1] range; projection scales z
        // by 0.5, so NDC z = 0.4 corresponds to pre-projection z = 0.8
        assert!(polytope.contains(DVec3::new(0.0, 0.0, 0.8)));
        assert!(!polytope.contains(DVec3::new(0.0, 0.0, 2.5)));
    }
}
