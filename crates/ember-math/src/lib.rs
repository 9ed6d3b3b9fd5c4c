//! Math additions over `glam` used by the renderer crates.

mod bounding;
mod frustum;

pub use bounding::{BoundingBox, BoundingSphere};
pub use frustum::{Frustum, Plane};

pub use glam::{
    IVec2, IVec3, Mat3, Mat4, Quat, UVec2, UVec3, UVec4, Vec2, Vec3, Vec3A, Vec4, Vec4Swizzles,
};

/// Smallest power of two >= `value` (`next_power_of_two(0) == 1`).
pub fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

/// `ceil(numerator / denominator)` for dispatch sizing.
pub fn divide_and_round_up(numerator: u32, denominator: u32) -> u32 {
    (numerator + denominator - 1) / denominator
}

/// Left-handed look-to view matrix.
pub fn look_to(eye: Vec3, dir: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_to_lh(eye, dir, up)
}

/// Off-center orthographic projection mapping `near` to z=1 and `far` to z=0
/// when called with `near > far` (reverse-Z).
pub fn ortho_off_center(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    Mat4::orthographic_lh(left, right, bottom, top, near, far)
}

/// Reverse-Z perspective projection: depth 1 at `near`, 0 at infinity-side `far`.
pub fn perspective_reverse_z(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_lh(fov_y, aspect, far, near)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_rounding() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(33), 64);
        assert_eq!(next_power_of_two(64), 64);
        assert_eq!(next_power_of_two(1920), 2048);
        assert_eq!(next_power_of_two(1080), 2048);
    }

    #[test]
    fn dispatch_rounding() {
        assert_eq!(divide_and_round_up(1920, 64), 30);
        assert_eq!(divide_and_round_up(1080, 64), 17);
        assert_eq!(divide_and_round_up(64, 64), 1);
        assert_eq!(divide_and_round_up(65, 64), 2);
    }

    #[test]
    fn reverse_z_depth_mapping() {
        let proj = perspective_reverse_z(1.0, 1.0, 0.1, 100.0);
        let near = proj.project_point3(Vec3::new(0.0, 0.0, 0.1));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, 100.0));
        assert!((near.z - 1.0).abs() < 1e-5);
        assert!(far.z.abs() < 1e-5);
    }
}
