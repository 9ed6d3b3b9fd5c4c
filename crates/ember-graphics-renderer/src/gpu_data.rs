//! Structured-buffer layouts shared with shaders. Must be kept in sync with
//! the HLSL side; every struct is tightly packed `repr(C)`.

use bytemuck::{Pod, Zeroable};

/// One culling candidate: an instance paired with one of its meshlets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshletCandidate {
    pub instance_id: u32,
    pub meshlet_index: u32,
}

/// Geometry registration for one mesh: where its meshlets and vertex data
/// live in the global buffers, plus local-space bounds.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MeshData {
    pub meshlet_offset: u32,
    pub meshlet_count: u32,
    pub vertex_offset: u32,
    pub index_offset: u32,
    /// xyz = local bounds center, w = bounding radius.
    pub bounds: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub roughness: f32,
    pub metalness: f32,
    /// Nonzero for alpha-masked materials; drives pipeline binning.
    pub alpha_masked: u32,
    pub base_color_texture: u32,
    pub normal_texture: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MeshInstance {
    pub mesh_index: u32,
    pub material_index: u32,
    pub flags: u32,
    pub _padding: u32,
    pub world: [[f32; 4]; 4],
    pub world_prev: [[f32; 4]; 4],
}

pub const LIGHT_KIND_DIRECTIONAL: u32 = 0;
pub const LIGHT_KIND_POINT: u32 = 1;
pub const LIGHT_KIND_SPOT: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    pub kind: u32,
    pub color: [f32; 3],
    pub intensity: f32,
    /// cos(outer), cos(inner) for spots.
    pub spot_angles: [f32; 2],
    pub shadow_index: i32,
    pub shadow_map_size: u32,
}

pub const MAX_SHADOW_VIEWS: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuShadowData {
    pub cascade_depths: [f32; 4],
    pub cascade_count: u32,
    pub _padding: [u32; 3],
    pub light_view_projections: [[[f32; 4]; 4]; MAX_SHADOW_VIEWS],
}

impl Default for GpuShadowData {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Per-view constants bound at the view CBV slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ViewUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub view_projection_inv: [[f32; 4]; 4],
    pub view_projection_prev: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    pub near_plane: f32,
    pub viewport: [f32; 2],
    pub far_plane: f32,
    pub frame_index: u32,
    pub instance_count: u32,
    pub light_count: u32,
    pub _padding: [u32; 2],
}

/// Indirect dispatch record.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DispatchArgs {
    pub group_count_x: u32,
    pub group_count_y: u32,
    pub group_count_z: u32,
}

/// Per-bin dispatch-mesh record: group counts consumed by the indirect
/// dispatch, plus the bin's start offset into the binned-meshlet list.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct BinOffsetAndCount {
    pub group_count_x: u32,
    pub group_count_y: u32,
    pub group_count_z: u32,
    pub offset: u32,
}

/// GPU-written culling counters, read back for the stats overlay.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CullingStats {
    pub total_instances: u32,
    pub frustum_culled_instances: u32,
    pub occluded_instances: u32,
    pub total_meshlets: u32,
    pub visible_meshlets_phase1: u32,
    pub visible_meshlets_phase2: u32,
}

/// (offset, count) pair per cluster.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightGridEntry {
    pub offset: u32,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_side() {
        assert_eq!(std::mem::size_of::<MeshletCandidate>(), 8);
        assert_eq!(std::mem::size_of::<DispatchArgs>(), 12);
        assert_eq!(std::mem::size_of::<BinOffsetAndCount>(), 16);
        assert_eq!(std::mem::size_of::<GpuLight>(), 64);
        assert_eq!(std::mem::size_of::<MeshInstance>(), 16 + 128);
        assert_eq!(
            std::mem::size_of::<GpuShadowData>(),
            16 + 16 + 64 * MAX_SHADOW_VIEWS
        );
    }
}
