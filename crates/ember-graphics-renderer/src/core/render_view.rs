use std::sync::Arc;

use bit_set::BitSet;
use ember_graphics_api::{Buffer, Texture};
use ember_math::{BoundingBox, BoundingSphere, Frustum, Mat4, UVec2, Vec3};

use crate::gpu_data::ViewUniforms;

/// A single drawable instance: mesh + material + world transform + bounds.
#[derive(Clone, Debug)]
pub struct Batch {
    pub instance_id: u32,
    pub mesh_index: u32,
    pub material_index: u32,
    pub world: Mat4,
    /// World-space bounds.
    pub bounds: BoundingBox,
    pub bounding_sphere: BoundingSphere,
    pub meshlet_count: u32,
    pub alpha_masked: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Clone, Debug)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    /// Outer cone angle in radians, spots only.
    pub spot_angle: f32,
    pub cast_shadows: bool,
    /// First slot into the shadow view array, -1 when none assigned.
    pub shadow_index: i32,
    pub shadow_map_size: u32,
}

impl Light {
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            direction: direction.normalize(),
            color,
            intensity,
            range: f32::MAX,
            spot_angle: 0.0,
            cast_shadows: false,
            shadow_index: -1,
            shadow_map_size: 0,
        }
    }

    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::Z,
            color,
            intensity,
            range,
            spot_angle: 0.0,
            cast_shadows: false,
            shadow_index: -1,
            shadow_map_size: 0,
        }
    }

    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        angle: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot,
            position,
            direction: direction.normalize(),
            color,
            intensity,
            range,
            spot_angle: angle,
            cast_shadows: false,
            shadow_index: -1,
            shadow_map_size: 0,
        }
    }

    /// World-space bounding sphere used for light culling.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        match self.kind {
            LightKind::Directional => BoundingSphere::new(Vec3::ZERO, f32::MAX),
            LightKind::Point => BoundingSphere::new(self.position, self.range),
            // Conservative: the cone fits inside the range sphere.
            LightKind::Spot => BoundingSphere::new(self.position, self.range),
        }
    }

    /// Number of shadow views this light occupies when casting.
    pub fn shadow_view_count(&self, cascade_count: u32) -> u32 {
        match self.kind {
            LightKind::Directional => cascade_count,
            LightKind::Point => 6,
            LightKind::Spot => 1,
        }
    }
}

/// Shadow partition output consumed by shading.
#[derive(Clone, Debug, Default)]
pub struct ShadowData {
    pub cascade_count: u32,
    pub cascade_depths: [f32; 4],
    pub light_view_projections: Vec<Mat4>,
}

/// Handles to the scene-global buffers the application uploads; the renderer
/// never owns their content.
#[derive(Clone, Debug)]
pub struct SceneBuffers {
    pub meshes: Buffer,
    pub meshlets: Buffer,
    pub materials: Buffer,
    pub instances: Buffer,
    pub transforms: Buffer,
    pub lights: Buffer,
    pub tlas: Option<Buffer>,
    pub sky: Option<Texture>,
}

/// Immutable per-frame snapshot consumed by render passes. Shared by `Arc`
/// so pass closures borrow the same copy.
#[derive(Clone, Debug)]
pub struct RenderView {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub view_projection_inv: Mat4,
    pub view_projection_prev: Mat4,
    pub frustum: Frustum,
    pub camera_position: Vec3,
    pub near_plane: f32,
    pub far_plane: f32,
    pub viewport: UVec2,
    pub frame_index: u64,

    pub batches: Vec<Batch>,
    /// One bit per instance id, set when the instance passed CPU culling.
    pub visibility: BitSet,
    pub lights: Vec<Light>,
    pub shadow_data: ShadowData,

    pub scene_buffers: SceneBuffers,
}

pub type RenderViewRef = Arc<RenderView>;

impl RenderView {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        view: Mat4,
        projection: Mat4,
        view_projection_prev: Mat4,
        camera_position: Vec3,
        near_plane: f32,
        far_plane: f32,
        viewport: UVec2,
        frame_index: u64,
        batches: Vec<Batch>,
        lights: Vec<Light>,
        scene_buffers: SceneBuffers,
    ) -> Self {
        let view_projection = projection * view;
        let frustum = Frustum::from_view_projection(&view_projection);

        let mut visibility = BitSet::with_capacity(batches.len());
        for batch in &batches {
            if frustum.contains_box(&batch.bounds) {
                visibility.insert(batch.instance_id as usize);
            }
        }

        Self {
            view,
            projection,
            view_projection,
            view_projection_inv: view_projection.inverse(),
            view_projection_prev,
            frustum,
            camera_position,
            near_plane,
            far_plane,
            viewport,
            frame_index,
            batches,
            visibility,
            lights,
            shadow_data: ShadowData::default(),
            scene_buffers,
        }
    }

    pub fn total_meshlet_count(&self) -> u32 {
        self.batches.iter().map(|batch| batch.meshlet_count).sum()
    }

    pub fn uniforms(&self) -> ViewUniforms {
        ViewUniforms {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            view_projection: self.view_projection.to_cols_array_2d(),
            view_projection_inv: self.view_projection_inv.to_cols_array_2d(),
            view_projection_prev: self.view_projection_prev.to_cols_array_2d(),
            camera_position: self.camera_position.to_array(),
            near_plane: self.near_plane,
            viewport: [self.viewport.x as f32, self.viewport.y as f32],
            far_plane: self.far_plane,
            frame_index: (self.frame_index & 0xffff_ffff) as u32,
            instance_count: self.batches.len() as u32,
            light_count: self.lights.len() as u32,
            _padding: [0; 2],
        }
    }
}
