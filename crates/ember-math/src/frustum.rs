use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::{BoundingBox, BoundingSphere};

/// A plane `dot(normal, p) + d = 0`, normal pointing inside the volume.
/// Pod so frustum planes upload directly into culling uniforms.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Plane(pub Vec4);

impl Plane {
    pub fn normalized(v: Vec4) -> Self {
        let inv_len = v.xyz().length().recip();
        Self(v * inv_len)
    }

    pub fn distance(&self, point: Vec3) -> f32 {
        self.0.xyz().dot(point) + self.0.w
    }
}

/// View frustum as 6 inward-facing planes, extracted from a view-projection
/// matrix with a [0,1] clip depth range (either depth direction).
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::normalized(r3 + r0), // left
                Plane::normalized(r3 - r0), // right
                Plane::normalized(r3 + r1), // bottom
                Plane::normalized(r3 - r1), // top
                Plane::normalized(r2),      // z >= 0
                Plane::normalized(r3 - r2), // z <= w
            ],
        }
    }

    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance(sphere.center) >= -sphere.radius)
    }

    pub fn contains_box(&self, bounds: &BoundingBox) -> bool {
        self.planes.iter().all(|plane| {
            // p-vertex: the corner farthest along the plane normal
            let normal = plane.0.xyz();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), bounds.max, bounds.min);
            plane.distance(p) >= 0.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perspective_reverse_z;

    fn test_frustum() -> Frustum {
        // Camera at origin looking down +Z, 90 degree fov.
        let proj = perspective_reverse_z(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&proj)
    }

    #[test]
    fn sphere_containment() {
        let frustum = test_frustum();
        assert!(frustum.contains_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        // Behind the camera.
        assert!(!frustum.contains_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
        // Beyond the far plane.
        assert!(!frustum.contains_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 200.0), 1.0)));
        // Straddling the near plane.
        assert!(frustum.contains_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 0.0), 1.0)));
    }

    #[test]
    fn box_containment() {
        let frustum = test_frustum();
        let inside = BoundingBox::from_center_extents(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE);
        let outside = BoundingBox::from_center_extents(Vec3::new(0.0, 50.0, 1.0), Vec3::ONE);
        assert!(frustum.contains_box(&inside));
        assert!(!frustum.contains_box(&outside));
    }
}
