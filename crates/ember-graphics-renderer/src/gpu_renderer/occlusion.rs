//! CPU side of the culling kernels.
//!
//! The culling shaders and this module implement the same math; the CPU
//! copy drives the debug tooling and validates the pipeline headlessly.

use ember_math::{BoundingBox, BoundingSphere, Frustum, Mat4, Vec3};

use super::hzb::DepthPyramid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullResult {
    Visible,
    FrustumCulled,
    /// In frustum but behind previously drawn geometry; phase 2 retests.
    Occluded,
}

/// Screen-space footprint of a projected bounding volume.
#[derive(Clone, Copy, Debug)]
pub struct ScreenBounds {
    pub min_uv: (f32, f32),
    pub max_uv: (f32, f32),
    /// Depth of the nearest point; reverse-Z, so larger is nearer.
    pub nearest_depth: f32,
}

/// Project a world-space sphere to a conservative screen rectangle. Returns
/// `None` when the sphere crosses the camera plane, in which case it must be
/// treated as visible.
pub fn project_sphere(view_projection: &Mat4, sphere: &BoundingSphere) -> Option<ScreenBounds> {
    let aabb = BoundingBox::from_center_extents(sphere.center, Vec3::splat(sphere.radius));

    let mut min_uv = (f32::MAX, f32::MAX);
    let mut max_uv = (f32::MIN, f32::MIN);
    let mut nearest_depth = f32::MIN;

    for corner in aabb.corners() {
        let clip = *view_projection * corner.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip / clip.w;
        let u = ndc.x * 0.5 + 0.5;
        let v = -ndc.y * 0.5 + 0.5;
        min_uv = (min_uv.0.min(u), min_uv.1.min(v));
        max_uv = (max_uv.0.max(u), max_uv.1.max(v));
        nearest_depth = nearest_depth.max(ndc.z);
    }

    Some(ScreenBounds {
        min_uv: (min_uv.0.clamp(0.0, 1.0), min_uv.1.clamp(0.0, 1.0)),
        max_uv: (max_uv.0.clamp(0.0, 1.0), max_uv.1.clamp(0.0, 1.0)),
        nearest_depth: nearest_depth.clamp(0.0, 1.0),
    })
}

/// Occluded when every stored occluder depth in the covered footprint is
/// nearer than the volume's nearest point.
pub fn is_occluded(pyramid: &DepthPyramid, bounds: &ScreenBounds) -> bool {
    pyramid.min_depth_in_rect(bounds.min_uv, bounds.max_uv) > bounds.nearest_depth
}

/// Instance-level culling: frustum reject, then occlusion against the
/// pyramid when one is supplied.
pub fn cull_instance(
    frustum: &Frustum,
    view_projection: &Mat4,
    sphere: &BoundingSphere,
    pyramid: Option<&DepthPyramid>,
) -> CullResult {
    if !frustum.contains_sphere(sphere) {
        return CullResult::FrustumCulled;
    }
    if let Some(pyramid) = pyramid {
        if let Some(bounds) = project_sphere(view_projection, sphere) {
            if is_occluded(pyramid, &bounds) {
                return CullResult::Occluded;
            }
        }
    }
    CullResult::Visible
}

/// Backface cone test for a meshlet. `cone_cutoff` is the precomputed
/// cos(angle + 90deg) bound; a meshlet whose every triangle faces away from
/// the camera is rejected.
pub fn meshlet_cone_culled(
    camera_position: Vec3,
    cone_apex: Vec3,
    cone_axis: Vec3,
    cone_cutoff: f32,
) -> bool {
    let to_meshlet = (cone_apex - camera_position).normalize_or_zero();
    to_meshlet.dot(cone_axis) >= cone_cutoff
}

/// Meshlet-level culling: frustum, cone, then occlusion.
#[allow(clippy::too_many_arguments)]
pub fn cull_meshlet(
    frustum: &Frustum,
    view_projection: &Mat4,
    camera_position: Vec3,
    sphere: &BoundingSphere,
    cone_axis: Vec3,
    cone_cutoff: f32,
    pyramid: Option<&DepthPyramid>,
) -> CullResult {
    if !frustum.contains_sphere(sphere) {
        return CullResult::FrustumCulled;
    }
    if cone_cutoff < 1.0
        && meshlet_cone_culled(camera_position, sphere.center, cone_axis, cone_cutoff)
    {
        return CullResult::FrustumCulled;
    }
    if let Some(pyramid) = pyramid {
        if let Some(bounds) = project_sphere(view_projection, sphere) {
            if is_occluded(pyramid, &bounds) {
                return CullResult::Occluded;
            }
        }
    }
    CullResult::Visible
}

/// Splat a sphere's footprint into a depth buffer at its nearest depth,
/// keeping the nearest value per texel. Debug stand-in for rasterization
/// when reconstructing what the occlusion test saw.
pub fn splat_sphere_depth(
    depth: &mut [f32],
    width: u32,
    height: u32,
    view_projection: &Mat4,
    sphere: &BoundingSphere,
) {
    let bounds = match project_sphere(view_projection, sphere) {
        Some(bounds) => bounds,
        None => return,
    };
    let x0 = (bounds.min_uv.0 * width as f32) as u32;
    let x1 = ((bounds.max_uv.0 * width as f32).ceil() as u32).min(width);
    let y0 = (bounds.min_uv.1 * height as f32) as u32;
    let y1 = ((bounds.max_uv.1 * height as f32).ceil() as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let texel = &mut depth[(y * width + x) as usize];
            *texel = texel.max(bounds.nearest_depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_math::perspective_reverse_z;

    fn camera() -> (Frustum, Mat4) {
        let view_projection =
            perspective_reverse_z(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        (Frustum::from_view_projection(&view_projection), view_projection)
    }

    #[test]
    fn frustum_reject_comes_first() {
        let (frustum, view_projection) = camera();
        let behind = BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0);
        assert_eq!(
            cull_instance(&frustum, &view_projection, &behind, None),
            CullResult::FrustumCulled
        );
    }

    #[test]
    fn no_pyramid_means_visible() {
        let (frustum, view_projection) = camera();
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0);
        assert_eq!(
            cull_instance(&frustum, &view_projection, &sphere, None),
            CullResult::Visible
        );
    }

    #[test]
    fn occluder_in_front_occludes() {
        let (frustum, view_projection) = camera();

        // Near sphere splatted into the depth buffer occludes the far one.
        let near = BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 2.0);
        let far = BoundingSphere::new(Vec3::new(0.0, 0.0, 50.0), 2.0);

        let mut depth = vec![0.0f32; 64 * 64];
        splat_sphere_depth(&mut depth, 64, 64, &view_projection, &near);
        let pyramid = DepthPyramid::build_from_depth(&depth, 64, 64);

        assert_eq!(
            cull_instance(&frustum, &view_projection, &far, Some(&pyramid)),
            CullResult::Occluded
        );
        // The occluder itself still passes.
        assert_eq!(
            cull_instance(&frustum, &view_projection, &near, Some(&pyramid)),
            CullResult::Visible
        );
    }

    #[test]
    fn empty_pyramid_occludes_nothing() {
        let (frustum, view_projection) = camera();
        let depth = vec![0.0f32; 64 * 64];
        let pyramid = DepthPyramid::build_from_depth(&depth, 64, 64);
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 50.0), 2.0);
        assert_eq!(
            cull_instance(&frustum, &view_projection, &sphere, Some(&pyramid)),
            CullResult::Visible
        );
    }

    #[test]
    fn cone_rejects_backfacing_meshlets() {
        // Camera at origin; meshlet at z=10 whose cone faces away (+Z).
        assert!(meshlet_cone_culled(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::Z,
            0.5
        ));
        // Facing the camera.
        assert!(!meshlet_cone_culled(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, 10.0),
            -Vec3::Z,
            0.5
        ));
    }
}
