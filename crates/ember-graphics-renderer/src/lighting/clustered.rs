//! Clustered light culling and volumetric fog.
//!
//! The view frustum is divided into 64-pixel screen tiles and 32
//! exponential depth slices. A compute pass intersects every light's
//! bounding sphere with the cluster boxes and appends indices into a per
//! cluster range of the light index list. The fog path reuses the same grid
//! over a finer froxel volume, with temporal reprojection from the previous
//! frame's scattering volume.

use std::sync::Arc;

use ember_core::CvarBool;
use ember_graphics_api::{
    Buffer, BufferDesc, ComputePipelineDef, DeviceContext, Format, GfxResult, PipelineDef,
    ResourceView, RootSignatureDef, ShaderRef, Texture, TextureDesc, ROOT_SLOT_CONSTANTS,
    ROOT_SLOT_SRV_TABLE, ROOT_SLOT_UAV_TABLE, ROOT_SLOT_VIEW_CBV,
};
use ember_math::{divide_and_round_up, BoundingBox, BoundingSphere, Mat4, UVec2, UVec3, Vec2, Vec4};

use crate::core::render_graph::{RGPassFlags, RenderGraph, RenderGraphResource};
use crate::core::render_view::{Light, LightKind, RenderViewRef};
use crate::gpu_data::LightGridEntry;
use crate::resources::{PipelineHandle, PipelineManager};

pub static CVAR_VOLUMETRIC_FOG: CvarBool = CvarBool::new("r.VolumetricFog", true);

pub const LIGHT_CLUSTER_TEXEL_SIZE: u32 = 64;
pub const LIGHT_CLUSTERS_NUM_Z: u32 = 32;
pub const MAX_LIGHTS_PER_CLUSTER: u32 = 32;

pub const VOLUMETRIC_FROXEL_TEXEL_SIZE: u32 = 8;
pub const VOLUMETRIC_NUM_Z_SLICES: u32 = 128;

/// Cluster grid dimensions for a viewport: 64-pixel tiles, fixed 32 slices.
pub fn cluster_dimensions(viewport: UVec2) -> UVec3 {
    UVec3::new(
        divide_and_round_up(viewport.x, LIGHT_CLUSTER_TEXEL_SIZE),
        divide_and_round_up(viewport.y, LIGHT_CLUSTER_TEXEL_SIZE),
        LIGHT_CLUSTERS_NUM_Z,
    )
}

/// Scale/bias turning a view depth into an exponential slice index:
/// `slice = log(z) * params.x - params.y`.
pub fn volume_grid_params(near: f32, far: f32, num_slices: u32) -> Vec2 {
    let n = near.min(far);
    let f = near.max(far);
    Vec2::new(
        num_slices as f32 / (f / n).ln(),
        num_slices as f32 * n.ln() / (f / n).ln(),
    )
}

/// Exponential [front, back] view depths of slice `cz`.
pub fn cluster_depth_bounds(near: f32, far: f32, cz: u32, num_slices: u32) -> (f32, f32) {
    let n = near.min(far);
    let f = near.max(far);
    (
        n * (f / n).powf(cz as f32 / num_slices as f32),
        n * (f / n).powf((cz + 1) as f32 / num_slices as f32),
    )
}

/// View-space AABB of one cluster, built from its four screen-corner rays
/// intersected with the slice depths. The shader carries the same math.
pub fn compute_cluster_bounds(
    projection_inv: &Mat4,
    viewport: UVec2,
    cluster: UVec3,
    near: f32,
    far: f32,
) -> BoundingBox {
    let dimensions = cluster_dimensions(viewport);
    let (z_front, z_back) = cluster_depth_bounds(near, far, cluster.z, dimensions.z);

    let mut bounds = BoundingBox::empty();
    for corner in 0..4u32 {
        let px = ((cluster.x + (corner & 1)) * LIGHT_CLUSTER_TEXEL_SIZE).min(viewport.x);
        let py = ((cluster.y + (corner >> 1)) * LIGHT_CLUSTER_TEXEL_SIZE).min(viewport.y);
        let ndc_x = px as f32 / viewport.x as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - py as f32 / viewport.y as f32 * 2.0;

        // Unproject to the near plane (reverse-Z: z = 1), then scale the
        // ray so its view depth matches each slice plane.
        let unprojected = *projection_inv * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let view_pos = unprojected.truncate() / unprojected.w;
        let per_unit_z = view_pos / view_pos.z;

        bounds.extend(per_unit_z * z_front);
        bounds.extend(per_unit_z * z_back);
    }
    bounds
}

/// CPU reference of the light-culling kernel: every light sphere against
/// every cluster box, appending into per-cluster ranges of the index list.
pub fn cull_lights_cpu(
    view: &Mat4,
    projection_inv: &Mat4,
    viewport: UVec2,
    near: f32,
    far: f32,
    lights: &[Light],
) -> (Vec<LightGridEntry>, Vec<u32>) {
    let dimensions = cluster_dimensions(viewport);
    let cluster_count = (dimensions.x * dimensions.y * dimensions.z) as usize;

    let view_spheres: Vec<Option<BoundingSphere>> = lights
        .iter()
        .map(|light| match light.kind {
            // Directional lights touch every cluster and are not culled.
            LightKind::Directional => None,
            _ => Some(BoundingSphere::new(
                view.transform_point3(light.position),
                light.range,
            )),
        })
        .collect();

    let mut grid = vec![LightGridEntry::default(); cluster_count];
    let mut index_list = vec![0u32; cluster_count * MAX_LIGHTS_PER_CLUSTER as usize];

    for cz in 0..dimensions.z {
        for cy in 0..dimensions.y {
            for cx in 0..dimensions.x {
                let cluster_index =
                    ((cz * dimensions.y + cy) * dimensions.x + cx) as usize;
                let bounds = compute_cluster_bounds(
                    projection_inv,
                    viewport,
                    UVec3::new(cx, cy, cz),
                    near,
                    far,
                );

                let offset = cluster_index as u32 * MAX_LIGHTS_PER_CLUSTER;
                let mut count = 0u32;
                for (light_index, sphere) in view_spheres.iter().enumerate() {
                    if count >= MAX_LIGHTS_PER_CLUSTER {
                        break;
                    }
                    let intersects = match sphere {
                        None => true,
                        Some(sphere) => bounds.intersects_sphere(sphere),
                    };
                    if intersects {
                        index_list[(offset + count) as usize] = light_index as u32;
                        count += 1;
                    }
                }
                grid[cluster_index] = LightGridEntry { offset, count };
            }
        }
    }

    (grid, index_list)
}

fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut fraction = 1.0f32;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Graph resources the shading pass consumes.
#[derive(Clone, Copy, Default)]
pub struct ClusteredLightingResult {
    pub light_grid: Option<RenderGraphResource>,
    pub light_index_list: Option<RenderGraphResource>,
    pub fog_volume: Option<RenderGraphResource>,
}

pub struct ClusteredLighting {
    device: DeviceContext,
    pipeline_manager: Arc<PipelineManager>,

    viewport: UVec2,
    dimensions: UVec3,
    viewport_dirty: bool,

    aabbs: Buffer,
    light_index_list: Buffer,
    light_grid: Buffer,
    light_scattering_volumes: [Texture; 2],
    final_fog_volume: Texture,

    create_aabbs: PipelineHandle,
    cull_lights: PipelineHandle,
    inject_fog: PipelineHandle,
    accumulate_fog: PipelineHandle,
}

impl ClusteredLighting {
    pub fn new(
        device: &DeviceContext,
        pipeline_manager: &Arc<PipelineManager>,
        viewport: UVec2,
    ) -> GfxResult<Self> {
        let compute = |path: &str, entry: &str| {
            PipelineDef::Compute(ComputePipelineDef {
                shader: ShaderRef::new(path, entry)
                    .with_define("CLUSTER_TEXEL_SIZE", LIGHT_CLUSTER_TEXEL_SIZE)
                    .with_define("MAX_LIGHTS_PER_CLUSTER", MAX_LIGHTS_PER_CLUSTER),
                root_signature: RootSignatureDef::default(),
            })
        };
        let manager = pipeline_manager.as_ref();

        let (aabbs, light_index_list, light_grid, volumes, final_fog) =
            Self::create_resources(device, viewport)?;

        Ok(Self {
            device: device.clone(),
            pipeline_manager: Arc::clone(pipeline_manager),
            viewport,
            dimensions: cluster_dimensions(viewport),
            viewport_dirty: true,
            aabbs,
            light_index_list,
            light_grid,
            light_scattering_volumes: volumes,
            final_fog_volume: final_fog,
            create_aabbs: manager.register_pipeline(compute("ClusterAABBGeneration.hlsl", "GenerateAABBs")),
            cull_lights: manager.register_pipeline(compute("ClusteredLightCulling.hlsl", "LightCulling")),
            inject_fog: manager.register_pipeline(compute("VolumetricFog.hlsl", "InjectFogLightingCS")),
            accumulate_fog: manager.register_pipeline(compute("VolumetricFog.hlsl", "AccumulateFogCS")),
        })
    }

    #[allow(clippy::type_complexity)]
    fn create_resources(
        device: &DeviceContext,
        viewport: UVec2,
    ) -> GfxResult<(Buffer, Buffer, Buffer, [Texture; 2], Texture)> {
        let dimensions = cluster_dimensions(viewport);
        let cluster_count = (dimensions.x * dimensions.y * dimensions.z) as u64;

        let aabbs = device.create_buffer(
            BufferDesc::create_structured(cluster_count, 2 * 16),
            "Clusters.AABBs",
        )?;
        let light_index_list = device.create_buffer(
            BufferDesc::create_structured(cluster_count * MAX_LIGHTS_PER_CLUSTER as u64, 4),
            "Clusters.LightIndexList",
        )?;
        // Two u32 per cluster: offset and count.
        let light_grid = device.create_buffer(
            BufferDesc::create_structured(cluster_count * 2, 4),
            "Clusters.LightGrid",
        )?;

        let volume_desc = TextureDesc::create_3d(
            divide_and_round_up(viewport.x, VOLUMETRIC_FROXEL_TEXEL_SIZE),
            divide_and_round_up(viewport.y, VOLUMETRIC_FROXEL_TEXEL_SIZE),
            VOLUMETRIC_NUM_Z_SLICES,
            Format::R16G16B16A16_FLOAT,
        );
        let volumes = [
            device.create_texture(volume_desc, "Fog.LightScattering0")?,
            device.create_texture(volume_desc, "Fog.LightScattering1")?,
        ];
        let final_fog = device.create_texture(volume_desc, "Fog.Final")?;

        Ok((aabbs, light_index_list, light_grid, volumes, final_fog))
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn light_grid(&self) -> &Buffer {
        &self.light_grid
    }

    pub fn light_index_list(&self) -> &Buffer {
        &self.light_index_list
    }

    pub fn on_resize(&mut self, viewport: UVec2) -> GfxResult<()> {
        if viewport == self.viewport {
            return Ok(());
        }
        let (aabbs, light_index_list, light_grid, volumes, final_fog) =
            Self::create_resources(&self.device, viewport)?;

        self.device.defer_release_buffer(std::mem::replace(&mut self.aabbs, aabbs));
        self.device
            .defer_release_buffer(std::mem::replace(&mut self.light_index_list, light_index_list));
        self.device
            .defer_release_buffer(std::mem::replace(&mut self.light_grid, light_grid));
        let [volume0, volume1] = std::mem::replace(&mut self.light_scattering_volumes, volumes);
        self.device.defer_release_texture(volume0);
        self.device.defer_release_texture(volume1);
        self.device
            .defer_release_texture(std::mem::replace(&mut self.final_fog_volume, final_fog));

        self.viewport = viewport;
        self.dimensions = cluster_dimensions(viewport);
        self.viewport_dirty = true;
        Ok(())
    }

    /// Schedule cluster building, light culling and (optionally) the fog
    /// volume update for this frame.
    pub fn execute(&mut self, graph: &mut RenderGraph, view: &RenderViewRef) -> ClusteredLightingResult {
        let mut result = ClusteredLightingResult::default();

        let dimensions = self.dimensions;
        let mut aabbs = graph.import_buffer("Clusters.AABBs", &self.aabbs);
        let mut light_grid = graph.import_buffer("Clusters.LightGrid", &self.light_grid);
        let mut light_index_list =
            graph.import_buffer("Clusters.LightIndexList", &self.light_index_list);

        // Cluster boxes only depend on the projection; rebuild on viewport
        // changes.
        if self.viewport_dirty {
            self.viewport_dirty = false;
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.create_aabbs;
            let view = Arc::clone(view);
            let aabbs_h = aabbs;
            graph
                .add_pass("Cluster AABBs", RGPassFlags::COMPUTE)
                .write(&mut aabbs)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

                    #[repr(C)]
                    #[derive(Clone, Copy)]
                    struct Constants {
                        cluster_dimensions: [u32; 4],
                        cluster_size: [u32; 2],
                    }
                    context.set_root_constants(
                        ROOT_SLOT_CONSTANTS,
                        &Constants {
                            cluster_dimensions: [dimensions.x, dimensions.y, dimensions.z, 0],
                            cluster_size: [LIGHT_CLUSTER_TEXEL_SIZE, LIGHT_CLUSTER_TEXEL_SIZE],
                        },
                    );
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[ResourceView::Buffer(resources.get_buffer_uav(aabbs_h))],
                    );

                    // 32 slices fit one thread group in z.
                    context.dispatch(dimensions.x, dimensions.y, dimensions.z / 32);
                });
        }

        // Light culling: sphere vs cluster box, accumulating the grid.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.cull_lights;
            let view = Arc::clone(view);
            let aabbs_h = aabbs;
            let light_grid_h = light_grid;
            let light_index_list_h = light_index_list;
            graph
                .add_pass("Light Culling", RGPassFlags::COMPUTE)
                .read(aabbs)
                .write(&mut light_grid)
                .write(&mut light_index_list)
                .bind(move |context, resources| {
                    // The shader accumulates counts, so start from zero.
                    context.clear_uav_uint(resources.get_buffer(light_grid_h), [0; 4]);

                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

                    #[repr(C)]
                    #[derive(Clone, Copy)]
                    struct Constants {
                        cluster_dimensions: [u32; 3],
                    }
                    context.set_root_constants(
                        ROOT_SLOT_CONSTANTS,
                        &Constants {
                            cluster_dimensions: dimensions.to_array(),
                        },
                    );
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(light_index_list_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(light_grid_h)),
                        ],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_srv(aabbs_h)),
                            ResourceView::Buffer(view.scene_buffers.lights.srv()),
                        ],
                    );

                    context.dispatch(
                        divide_and_round_up(dimensions.x, 4),
                        divide_and_round_up(dimensions.y, 4),
                        divide_and_round_up(dimensions.z, 4),
                    );
                });
        }

        result.light_grid = Some(light_grid);
        result.light_index_list = Some(light_index_list);

        if CVAR_VOLUMETRIC_FOG.get() {
            result.fog_volume =
                Some(self.record_fog(graph, view, light_grid, light_index_list));
        }

        result
    }

    fn record_fog(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        light_grid: RenderGraphResource,
        light_index_list: RenderGraphResource,
    ) -> RenderGraphResource {
        // Ping-pong: read the volume written last frame, write the other.
        // Frame 0 reads a zero-filled volume.
        let frame = view.frame_index;
        let source_volume = &self.light_scattering_volumes[(frame % 2) as usize];
        let dest_volume = &self.light_scattering_volumes[((frame + 1) % 2) as usize];

        let source = graph.import_texture("Fog.ScatteringPrev", source_volume);
        let mut dest = graph.import_texture("Fog.Scattering", dest_volume);
        let mut final_fog = graph.import_texture("Fog.Final", &self.final_fog_volume);

        let volume_desc = *dest_volume.definition();
        let volume_dimensions = UVec3::new(
            volume_desc.width,
            volume_desc.height,
            volume_desc.depth_or_array,
        );
        let grid_params =
            volume_grid_params(view.near_plane, view.far_plane, LIGHT_CLUSTERS_NUM_Z);

        #[repr(C)]
        #[derive(Clone, Copy)]
        struct FogConstants {
            cluster_dimensions: [u32; 3],
            jitter: f32,
            inv_cluster_dimensions: [f32; 3],
            light_cluster_size_factor: f32,
            light_grid_params: [f32; 2],
            light_cluster_dimensions: [u32; 2],
        }
        let constants = FogConstants {
            cluster_dimensions: volume_dimensions.to_array(),
            jitter: halton((frame & 1023) as u32, 2),
            inv_cluster_dimensions: [
                1.0 / volume_dimensions.x as f32,
                1.0 / volume_dimensions.y as f32,
                1.0 / volume_dimensions.z as f32,
            ],
            light_cluster_size_factor: VOLUMETRIC_FROXEL_TEXEL_SIZE as f32
                / LIGHT_CLUSTER_TEXEL_SIZE as f32,
            light_grid_params: grid_params.to_array(),
            light_cluster_dimensions: [self.dimensions.x, self.dimensions.y],
        };

        // Per-froxel lighting, blended against the reprojected previous
        // frame.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.inject_fog;
            let view = Arc::clone(view);
            let dest_h = dest;
            graph
                .add_pass("Inject Volume Lights", RGPassFlags::COMPUTE)
                .read(source)
                .read(light_grid)
                .read(light_index_list)
                .write(&mut dest)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());
                    context.set_root_constants(ROOT_SLOT_CONSTANTS, &constants);
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[ResourceView::Texture(resources.get_uav(dest_h))],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_srv(light_grid)),
                            ResourceView::Buffer(resources.get_buffer_srv(light_index_list)),
                            ResourceView::Texture(resources.get_srv(source)),
                            ResourceView::Buffer(view.scene_buffers.lights.srv()),
                        ],
                    );
                    context.dispatch(
                        divide_and_round_up(volume_dimensions.x, 8),
                        divide_and_round_up(volume_dimensions.y, 8),
                        divide_and_round_up(volume_dimensions.z, 4),
                    );
                });
        }

        // March front to back, accumulating transmittance into the volume
        // sampled at shading time.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.accumulate_fog;
            let view = Arc::clone(view);
            let dest_h = dest;
            let final_h = final_fog;
            graph
                .add_pass("Accumulate Volume Fog", RGPassFlags::COMPUTE)
                .read(dest)
                .write(&mut final_fog)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());
                    context.set_root_constants(ROOT_SLOT_CONSTANTS, &constants);
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[ResourceView::Texture(resources.get_uav(final_h))],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[ResourceView::Texture(resources.get_srv(dest_h))],
                    );
                    context.dispatch(
                        divide_and_round_up(volume_dimensions.x, 8),
                        divide_and_round_up(volume_dimensions.y, 8),
                        1,
                    );
                });
        }

        final_fog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_math::{perspective_reverse_z, Vec3};

    #[test]
    fn dimensions_for_full_hd() {
        let dimensions = cluster_dimensions(UVec2::new(1920, 1080));
        assert_eq!(dimensions, UVec3::new(30, 17, 32));
        // Index list capacity follows the cluster count.
        assert_eq!(
            (dimensions.x * dimensions.y * dimensions.z * MAX_LIGHTS_PER_CLUSTER) as usize,
            522_240
        );
    }

    #[test]
    fn slice_depths_are_exponential_and_contiguous() {
        let near = 0.5;
        let far = 500.0;
        let mut previous_back = near;
        for cz in 0..LIGHT_CLUSTERS_NUM_Z {
            let (front, back) = cluster_depth_bounds(near, far, cz, LIGHT_CLUSTERS_NUM_Z);
            assert!((front - previous_back).abs() < previous_back * 1e-4 + 1e-5);
            assert!(back > front);
            previous_back = back;
        }
        assert!((previous_back - far).abs() < far * 1e-4);
    }

    #[test]
    fn light_counts_match_between_grid_and_lights() {
        let viewport = UVec2::new(1920, 1080);
        let near = 0.1;
        let far = 100.0;
        let projection = perspective_reverse_z(1.2, viewport.x as f32 / viewport.y as f32, near, far);
        let view = Mat4::IDENTITY;

        // 100 point lights spread through the frustum.
        let mut lights = Vec::new();
        for i in 0..100 {
            let f = i as f32;
            lights.push(Light::point(
                Vec3::new(
                    (f * 0.37).sin() * 20.0,
                    (f * 0.53).cos() * 10.0,
                    5.0 + (f * 0.91).fract() * 80.0,
                ),
                2.0,
                Vec3::ONE,
                1.0,
            ));
        }

        let (grid, index_list) = cull_lights_cpu(
            &view,
            &projection.inverse(),
            viewport,
            near,
            far,
            &lights,
        );

        let dimensions = cluster_dimensions(viewport);
        assert_eq!(
            index_list.len(),
            (dimensions.x * dimensions.y * dimensions.z * MAX_LIGHTS_PER_CLUSTER) as usize
        );

        // The total of the per-cluster counts equals the number of
        // (light, cluster) intersections counted from the light side.
        let grid_total: u64 = grid.iter().map(|entry| u64::from(entry.count)).sum();

        let mut light_total = 0u64;
        for (light_index, light) in lights.iter().enumerate() {
            let sphere = BoundingSphere::new(view.transform_point3(light.position), light.range);
            for cz in 0..dimensions.z {
                for cy in 0..dimensions.y {
                    for cx in 0..dimensions.x {
                        let bounds = compute_cluster_bounds(
                            &projection.inverse(),
                            viewport,
                            UVec3::new(cx, cy, cz),
                            near,
                            far,
                        );
                        if bounds.intersects_sphere(&sphere) {
                            light_total += 1;
                        }
                    }
                }
            }
            let _ = light_index;
        }

        assert!(grid_total > 0, "expected some lights to land in clusters");
        assert_eq!(grid_total, light_total);
    }

    #[test]
    fn fog_ping_pong_reads_previous_frame() {
        let read_index = |frame: u64| (frame % 2) as usize;
        let write_index = |frame: u64| ((frame + 1) % 2) as usize;
        for frame in 0u64..4 {
            // Whatever frame N writes, frame N+1 reads.
            assert_eq!(write_index(frame), read_index(frame + 1));
            // And never the volume being written this frame.
            assert_ne!(write_index(frame), read_index(frame));
        }
    }

    #[test]
    fn halton_is_in_unit_range() {
        for i in 0..64 {
            let value = halton(i, 2);
            assert!((0.0..1.0).contains(&value));
        }
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
    }
}
