use glam::{Mat4, Vec3};

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Empty box that grows from the first `extend`.
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            Vec3::new(mn.x, mn.y, mn.z),
            Vec3::new(mx.x, mn.y, mn.z),
            Vec3::new(mn.x, mx.y, mn.z),
            Vec3::new(mx.x, mx.y, mn.z),
            Vec3::new(mn.x, mn.y, mx.z),
            Vec3::new(mx.x, mn.y, mx.z),
            Vec3::new(mn.x, mx.y, mx.z),
            Vec3::new(mx.x, mx.y, mx.z),
        ]
    }

    /// Transform all corners and refit.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let mut result = Self::empty();
        for corner in self.corners() {
            result.extend(transform.transform_point3(corner));
        }
        result
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let closest = sphere.center.clamp(self.min, self.max);
        closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius
    }
}

/// Bounding sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn transformed(&self, transform: &Mat4) -> Self {
        let scale = transform.to_scale_rotation_translation().0;
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * scale.max_element(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_box_intersection() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        assert!(b.intersects_sphere(&BoundingSphere::new(Vec3::splat(0.5), 0.1)));
        assert!(b.intersects_sphere(&BoundingSphere::new(Vec3::new(1.5, 0.5, 0.5), 0.6)));
        assert!(!b.intersects_sphere(&BoundingSphere::new(Vec3::new(3.0, 0.5, 0.5), 0.5)));
    }

    #[test]
    fn transform_refits_corners() {
        let b = BoundingBox::new(-Vec3::ONE, Vec3::ONE);
        let t = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let moved = b.transformed(&t);
        assert_eq!(moved.center(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(moved.extents(), Vec3::ONE);
    }
}
