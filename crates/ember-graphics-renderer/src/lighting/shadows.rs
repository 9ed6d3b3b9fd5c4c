//! Frustum-partitioned shadow maps for directional lights, plus the per-face
//! and per-cone views of point and spot lights.
//!
//! Cascade splits blend logarithmic and uniform distributions (the PSSM
//! factor), optionally tightened by the scene depth bounds read back from
//! the depth buffer. Cascade projections can be stabilized: the fit switches
//! to a rotation-invariant bounding sphere and the projection is snapped to
//! shadow-map texel centers so camera rotation does not make edges swim.

use ember_core::{CvarBool, CvarFloat, CvarInt};
use ember_graphics_api::{DeviceContext, Format, GfxResult, Texture, TextureDesc};
use ember_math::{look_to, ortho_off_center, Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::core::render_view::{Light, LightKind, ShadowData};
use crate::gpu_data::{GpuShadowData, MAX_SHADOW_VIEWS};

pub static CVAR_SDSM: CvarBool = CvarBool::new("r.Shadows.SDSM", false);
pub static CVAR_STABILIZE_CASCADES: CvarBool = CvarBool::new("r.Shadows.StabilizeCascades", true);
pub static CVAR_SHADOW_CASCADES: CvarInt = CvarInt::new("r.Shadows.CascadeCount", 4);
pub static CVAR_PSSM_FACTOR: CvarFloat = CvarFloat::new("r.Shadows.PSSMFactor", 1.0);

pub const MAX_CASCADES: u32 = 4;
const CASCADE_MAP_SIZE: u32 = 2048;
const LOCAL_LIGHT_MAP_SIZE: u32 = 512;

#[derive(Clone, Copy, Debug)]
pub struct ShadowSettings {
    /// Clamped to [1, 4].
    pub cascade_count: u32,
    /// Blend between uniform (0) and logarithmic (1) splits.
    pub pssm_factor: f32,
    pub stabilize: bool,
    pub shadow_map_size: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            cascade_count: 4,
            pssm_factor: 1.0,
            stabilize: true,
            shadow_map_size: CASCADE_MAP_SIZE,
        }
    }
}

impl ShadowSettings {
    pub fn from_cvars() -> Self {
        Self {
            cascade_count: (CVAR_SHADOW_CASCADES.get().max(1) as u32).min(MAX_CASCADES),
            pssm_factor: CVAR_PSSM_FACTOR.get().clamp(0.0, 1.0),
            stabilize: CVAR_STABILIZE_CASCADES.get(),
            shadow_map_size: CASCADE_MAP_SIZE,
        }
    }
}

/// View-space split distances from the camera near plane, one per cascade.
/// `depth_bounds` is the normalized scene [min, max] depth range, `(0, 1)`
/// without a readback.
pub fn compute_cascade_splits(
    near: f32,
    far: f32,
    cascade_count: u32,
    pssm_factor: f32,
    depth_bounds: (f32, f32),
) -> [f32; MAX_CASCADES as usize] {
    let near_plane = near.min(far);
    let far_plane = near.max(far);
    let clip_range = far_plane - near_plane;

    let min_z = near_plane + depth_bounds.0 * clip_range;
    let max_z = near_plane + depth_bounds.1 * clip_range;

    let mut splits = [0.0f32; MAX_CASCADES as usize];
    for i in 0..cascade_count.min(MAX_CASCADES) as usize {
        let p = (i + 1) as f32 / cascade_count as f32;
        let log_split = min_z * (max_z / min_z).powf(p);
        let uniform_split = min_z + (max_z - min_z) * p;
        let d = pssm_factor * (log_split - uniform_split) + uniform_split;
        splits[i] = d - near_plane;
    }
    splits
}

/// The camera-frustum slab of one cascade, expressed as the world-space
/// corner set between two split distances.
fn cascade_corners(view_projection_inv: &Mat4, prev_split: f32, split: f32) -> [Vec3; 8] {
    // Reverse-Z: the near plane sits at z = 1, the far plane at z = 0.
    let ndc_corners = [
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
    ];

    let mut corners = [Vec3::ZERO; 8];
    for (index, ndc) in ndc_corners.iter().enumerate() {
        corners[index] = view_projection_inv.project_point3(*ndc);
    }

    // Slide the near/far quads along the corner rays to the split planes.
    for j in 0..4 {
        let corner_ray = (corners[j + 4] - corners[j]).normalize();
        let near_point = prev_split * corner_ray;
        let far_point = split * corner_ray;
        corners[j + 4] = corners[j] + far_point;
        corners[j] += near_point;
    }
    corners
}

/// Shadow view-projection for one directional cascade.
pub fn directional_cascade_matrix(
    view_projection_inv: &Mat4,
    light_direction: Vec3,
    prev_split: f32,
    split: f32,
    stabilize: bool,
    shadow_map_size: f32,
) -> Mat4 {
    let corners = cascade_corners(view_projection_inv, prev_split, split);

    let mut center = Vec3::ZERO;
    for corner in &corners {
        center += *corner;
    }
    center /= 8.0;

    let (min_extents, max_extents) = if stabilize {
        // A bounding sphere keeps the projection extent constant under
        // camera rotation.
        let mut radius = 0.0f32;
        for corner in &corners {
            radius = radius.max(center.distance(*corner));
        }
        (Vec3::splat(-radius), Vec3::splat(radius))
    } else {
        let light_view = look_to(center, light_direction, Vec3::Y);
        let mut min_extents = Vec3::splat(f32::MAX);
        let mut max_extents = Vec3::splat(f32::MIN);
        for corner in &corners {
            let p = light_view.transform_point3(*corner);
            min_extents = min_extents.min(p);
            max_extents = max_extents.max(p);
        }
        (min_extents, max_extents)
    };

    let shadow_view = look_to(center + light_direction * -100.0, light_direction, Vec3::Y);
    let mut projection = ortho_off_center(
        min_extents.x,
        max_extents.x,
        min_extents.y,
        max_extents.y,
        max_extents.z + 200.0,
        0.0,
    );
    let mut light_view_projection = projection * shadow_view;

    if stabilize {
        // Snap the projection to texel centers: project the world origin,
        // measure its sub-texel offset and translate by the rounding error.
        let shadow_origin =
            light_view_projection * Vec4::new(0.0, 0.0, 0.0, 1.0) * (shadow_map_size / 2.0);
        let rounded = shadow_origin.round();
        let mut rounded_offset = (rounded - shadow_origin) * (2.0 / shadow_map_size);
        rounded_offset.z = 0.0;
        rounded_offset.w = 0.0;

        projection = Mat4::from_translation(rounded_offset.xyz()) * projection;
        light_view_projection = projection * shadow_view;
    }

    light_view_projection
}

fn spot_matrix(light: &Light) -> Mat4 {
    let up = if light.direction.abs_diff_eq(Vec3::Y, 1e-4) {
        Vec3::X
    } else {
        Vec3::Y
    };
    let projection =
        ember_math::perspective_reverse_z(light.spot_angle, 1.0, 1.0, light.range);
    projection * look_to(light.position, light.direction, up)
}

fn point_matrices(light: &Light) -> [Mat4; 6] {
    let views = [
        look_to(light.position, -Vec3::X, Vec3::Y),
        look_to(light.position, Vec3::X, Vec3::Y),
        look_to(light.position, -Vec3::Y, -Vec3::Z),
        look_to(light.position, Vec3::Y, Vec3::Z),
        look_to(light.position, -Vec3::Z, Vec3::Y),
        look_to(light.position, Vec3::Z, Vec3::Y),
    ];
    let projection =
        ember_math::perspective_reverse_z(std::f32::consts::FRAC_PI_2, 1.0, 1.0, light.range);
    views.map(|view| projection * view)
}

/// One shadow rendering job: which light, which slot, which matrix.
#[derive(Clone, Debug)]
pub struct ShadowView {
    pub light_index: usize,
    pub slot: usize,
    pub view_projection: Mat4,
}

/// Partition output: the per-light slot assignment plus the cascade data
/// shading consumes.
pub struct ShadowPartition {
    pub data: ShadowData,
    pub views: Vec<ShadowView>,
}

/// Owns the shadow map textures and performs the per-frame partition.
pub struct ShadowPartitioner {
    device: DeviceContext,
    maps: Vec<Texture>,
}

impl ShadowPartitioner {
    pub fn new(device: &DeviceContext) -> Self {
        Self {
            device: device.clone(),
            maps: Vec::new(),
        }
    }

    pub fn shadow_map(&self, slot: usize) -> Option<&Texture> {
        self.maps.get(slot)
    }

    /// Assign shadow slots to every casting light and compute their
    /// view-projection matrices. `lights` gets its `shadow_index` fields
    /// rewritten; cascade slots come first.
    #[allow(clippy::too_many_arguments)]
    pub fn partition(
        &mut self,
        view_projection_inv: &Mat4,
        near: f32,
        far: f32,
        settings: &ShadowSettings,
        depth_bounds: (f32, f32),
        lights: &mut [Light],
    ) -> GfxResult<ShadowPartition> {
        let cascade_count = settings.cascade_count.clamp(1, MAX_CASCADES);
        let splits = compute_cascade_splits(
            near,
            far,
            cascade_count,
            settings.pssm_factor,
            depth_bounds,
        );

        let mut data = ShadowData {
            cascade_count,
            cascade_depths: splits,
            light_view_projections: Vec::new(),
        };
        let mut views = Vec::new();
        let mut slot = 0usize;

        for (light_index, light) in lights.iter_mut().enumerate() {
            if !light.cast_shadows || slot >= MAX_SHADOW_VIEWS {
                light.shadow_index = -1;
                continue;
            }
            light.shadow_index = slot as i32;

            match light.kind {
                LightKind::Directional => {
                    for cascade in 0..cascade_count as usize {
                        let prev_split = if cascade == 0 {
                            depth_bounds.0
                        } else {
                            splits[cascade - 1]
                        };
                        let matrix = directional_cascade_matrix(
                            view_projection_inv,
                            light.direction,
                            prev_split,
                            splits[cascade],
                            settings.stabilize,
                            settings.shadow_map_size as f32,
                        );
                        data.light_view_projections.push(matrix);
                        views.push(ShadowView {
                            light_index,
                            slot,
                            view_projection: matrix,
                        });
                        slot += 1;
                    }
                }
                LightKind::Spot => {
                    let matrix = spot_matrix(light);
                    data.light_view_projections.push(matrix);
                    views.push(ShadowView {
                        light_index,
                        slot,
                        view_projection: matrix,
                    });
                    slot += 1;
                }
                LightKind::Point => {
                    for matrix in point_matrices(light) {
                        data.light_view_projections.push(matrix);
                        views.push(ShadowView {
                            light_index,
                            slot,
                            view_projection: matrix,
                        });
                        slot += 1;
                    }
                }
            }
        }

        self.ensure_maps(slot)?;
        for light in lights.iter_mut() {
            if light.shadow_index >= 0 {
                light.shadow_map_size =
                    self.maps[light.shadow_index as usize].definition().width;
            }
        }

        Ok(ShadowPartition { data, views })
    }

    /// Grow the shadow map array; the first four slots get full-resolution
    /// cascade maps, local lights get smaller ones.
    fn ensure_maps(&mut self, count: usize) -> GfxResult<()> {
        while self.maps.len() < count {
            let index = self.maps.len();
            let size = if index < MAX_CASCADES as usize {
                CASCADE_MAP_SIZE
            } else {
                LOCAL_LIGHT_MAP_SIZE
            };
            self.maps.push(self.device.create_texture(
                TextureDesc::create_depth(size, size, Format::D32_FLOAT),
                &format!("ShadowMap{}", index),
            )?);
        }
        Ok(())
    }
}

impl ShadowData {
    pub fn to_gpu(&self) -> GpuShadowData {
        let mut gpu = GpuShadowData {
            cascade_depths: self.cascade_depths,
            cascade_count: self.cascade_count,
            ..Default::default()
        };
        for (index, matrix) in self
            .light_view_projections
            .iter()
            .take(MAX_SHADOW_VIEWS)
            .enumerate()
        {
            gpu.light_view_projections[index] = matrix.to_cols_array_2d();
        }
        gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_math::perspective_reverse_z;

    #[test]
    fn splits_are_increasing_and_cover_the_range() {
        let near = 0.1;
        let far = 100.0;
        let splits = compute_cascade_splits(near, far, 4, 1.0, (0.0, 1.0));
        for i in 1..4 {
            assert!(splits[i] > splits[i - 1]);
        }
        assert!((splits[3] + near - far).abs() < 1e-3);

        // Uniform splits with factor 0.
        let splits = compute_cascade_splits(near, far, 4, 0.0, (0.0, 1.0));
        let step = (far - near) / 4.0;
        for (i, split) in splits.iter().enumerate() {
            assert!((split - (i as f32 + 1.0) * step).abs() < 1e-2);
        }
    }

    #[test]
    fn sdsm_bounds_tighten_the_range() {
        let full = compute_cascade_splits(0.1, 100.0, 4, 1.0, (0.0, 1.0));
        let tight = compute_cascade_splits(0.1, 100.0, 4, 1.0, (0.2, 0.6));
        assert!(tight[3] < full[3]);
        assert!(tight[0] > 0.0);
    }

    fn camera_view_projection(yaw: f32) -> Mat4 {
        let projection = perspective_reverse_z(1.0, 16.0 / 9.0, 0.1, 100.0);
        let view = Mat4::from_rotation_y(yaw).inverse();
        projection * view
    }

    #[test]
    fn stabilized_cascade_snaps_to_texel_centers() {
        let light_direction = Vec3::new(0.3, -0.8, 0.4).normalize();
        let shadow_map_size = 2048.0f32;

        for step in 0..360 {
            let yaw = (step as f32).to_radians();
            let view_projection = camera_view_projection(yaw);
            let matrix = directional_cascade_matrix(
                &view_projection.inverse(),
                light_direction,
                0.0,
                20.0,
                true,
                shadow_map_size,
            );

            // The projected world origin must land on a texel center:
            // in texel space its fractional part stays below one texel.
            let origin = matrix * Vec4::new(0.0, 0.0, 0.0, 1.0) * (shadow_map_size / 2.0);
            let fract_x = (origin.x - origin.x.round()).abs();
            let fract_y = (origin.y - origin.y.round()).abs();
            assert!(
                fract_x < 1e-2 && fract_y < 1e-2,
                "cascade not texel aligned at yaw {}: ({}, {})",
                step,
                fract_x,
                fract_y
            );
        }
    }

    #[test]
    fn stabilized_extent_is_rotation_invariant() {
        let light_direction = Vec3::new(0.0, -1.0, 0.2).normalize();
        let reference = directional_cascade_matrix(
            &camera_view_projection(0.0).inverse(),
            light_direction,
            0.0,
            20.0,
            true,
            2048.0,
        );
        // The orthographic scale terms only depend on the bounding sphere
        // radius, which rotation does not change.
        for step in [45, 90, 200] {
            let rotated = directional_cascade_matrix(
                &camera_view_projection((step as f32).to_radians()).inverse(),
                light_direction,
                0.0,
                20.0,
                true,
                2048.0,
            );
            assert!((reference.x_axis.x - rotated.x_axis.x).abs() < 1e-4);
            assert!((reference.y_axis.y - rotated.y_axis.y).abs() < 1e-4);
        }
    }

    #[test]
    fn slot_assignment_per_light_kind() {
        let device = DeviceContext::new(&ember_graphics_api::DeviceDesc::default()).unwrap();
        let mut partitioner = ShadowPartitioner::new(&device);

        let mut lights = vec![
            {
                let mut light = Light::directional(Vec3::new(0.2, -1.0, 0.2), Vec3::ONE, 1.0);
                light.cast_shadows = true;
                light
            },
            {
                let mut light = Light::spot(
                    Vec3::new(0.0, 5.0, 0.0),
                    Vec3::NEG_Y,
                    20.0,
                    1.0,
                    Vec3::ONE,
                    1.0,
                );
                light.cast_shadows = true;
                light
            },
            {
                let mut light = Light::point(Vec3::ZERO, 10.0, Vec3::ONE, 1.0);
                light.cast_shadows = true;
                light
            },
        ];

        let view_projection = camera_view_projection(0.0);
        let partition = partitioner
            .partition(
                &view_projection.inverse(),
                0.1,
                100.0,
                &ShadowSettings::default(),
                (0.0, 1.0),
                &mut lights,
            )
            .unwrap();

        // 4 cascades + 1 spot + 6 point faces.
        assert_eq!(partition.views.len(), 11);
        assert_eq!(partition.data.light_view_projections.len(), 11);
        assert_eq!(lights[0].shadow_index, 0);
        assert_eq!(lights[1].shadow_index, 4);
        assert_eq!(lights[2].shadow_index, 5);
        // Cascade maps are full size, local lights smaller.
        assert_eq!(lights[0].shadow_map_size, 2048);
        assert_eq!(lights[2].shadow_map_size, 512);
    }
}
