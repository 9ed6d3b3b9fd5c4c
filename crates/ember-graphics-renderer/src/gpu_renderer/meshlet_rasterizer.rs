//! GPU-driven meshlet rasterization with two-phase occlusion culling.
//!
//! Frustum culling, occlusion culling and draw recording all run on the GPU,
//! over a two-level hierarchy of instances and meshlets.
//!
//! Phase 1 tests every instance against the current frustum and the
//! *previous* frame's depth pyramid. Unoccluded instances emit their
//! meshlets as candidates; occluded ones are queued for phase 2. Visible
//! meshlets are classified into pipeline bins and rasterized indirectly,
//! after which the pyramid is rebuilt from the partial depth. Phase 2
//! retests the queued instances against that fresh pyramid, rasterizes what
//! became visible, and rebuilds the pyramid once more for the next frame.

use std::sync::Arc;

use ember_graphics_api::{
    Buffer, BufferDesc, CommandSignature, ComputePipelineDef, CullMode, DepthState, DeviceContext,
    Format, GfxError, GfxResult, GraphicsPipelineDef, PipelineDef, ResourceState, ResourceUsage,
    ResourceView, RootSignatureDef, ShaderRef, StateObject, StateObjectDef, Texture, TextureDesc,
    ROOT_SLOT_CONSTANTS, ROOT_SLOT_SRV_TABLE, ROOT_SLOT_UAV_TABLE, ROOT_SLOT_VIEW_CBV,
};
use ember_math::{divide_and_round_up, UVec2};
use parking_lot::Mutex;
use strum::{EnumCount, IntoEnumIterator};

use crate::core::render_graph::{
    DepthStencilAccess, RGPassFlags, RenderGraph, RenderGraphResource, RenderTargetAccess,
};
use crate::core::render_view::RenderViewRef;
use crate::gpu_data::{BinOffsetAndCount, CullingStats, DispatchArgs, MeshletCandidate};
use crate::resources::{GpuBufferWithReadback, PipelineHandle, PipelineManager};

use super::hzb::{self, HzbPipelines};

/// ~1 million meshlets x 8-byte candidates, double-buffered between the
/// candidate and visible lists.
pub const MAX_NUM_MESHLETS: u32 = 1 << 20;
/// ~16k instances x 4 bytes for the phase-2 carry-over list.
pub const MAX_NUM_INSTANCES: u32 = 1 << 14;

pub const CULL_INSTANCE_THREAD_GROUP_SIZE: u32 = 64;
pub const CULL_MESHLET_THREAD_GROUP_SIZE: u32 = 64;

/// One bin per pipeline permutation; meshlets are bucketed so each bin draws
/// with a single indirect dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter, strum::EnumCount)]
pub enum PipelineBin {
    Opaque,
    AlphaMasked,
}

pub const NUM_RASTER_BINS: u32 = PipelineBin::COUNT as u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterMode {
    VisibilityBuffer,
    Shadows,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterPhase {
    Phase1,
    Phase2,
}

/// Per-pixel debug visualization modes for the visibility buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityDebugMode {
    Instances,
    Meshlets,
    Triangles,
    Overdraw,
}

/// Persistent culling state for one view. Created once per viewport
/// geometry and reallocated on resize; the depth pyramid lives here across
/// frames.
pub struct RasterContext {
    pub mode: RasterMode,
    pub enable_occlusion_culling: bool,
    pub enable_debug: bool,
    pub use_work_graphs: bool,

    viewport: UVec2,
    candidate_meshlets: Buffer,
    visible_meshlets: Buffer,
    occluded_instances: Buffer,
    occluded_instances_counter: Buffer,
    // 0: total | 1: phase 1 | 2: phase 2
    candidate_meshlets_counter: Buffer,
    // 0: phase 1 | 1: phase 2
    visible_meshlets_counter: Buffer,
    previous_hzb: Texture,
    // Physical identity of the work-graph backing per phase; a mismatch
    // forces reinitialization.
    work_graph_buffer_ids: Arc<Mutex<[u64; 2]>>,
}

impl RasterContext {
    pub fn new(device: &DeviceContext, viewport: UVec2, mode: RasterMode) -> GfxResult<Self> {
        let candidate_stride = std::mem::size_of::<MeshletCandidate>() as u64;
        Ok(Self {
            mode,
            enable_occlusion_culling: true,
            enable_debug: false,
            use_work_graphs: false,
            viewport,
            candidate_meshlets: device.create_buffer(
                BufferDesc::create_structured(MAX_NUM_MESHLETS as u64, candidate_stride),
                "GPURender.CandidateMeshlets",
            )?,
            visible_meshlets: device.create_buffer(
                BufferDesc::create_structured(MAX_NUM_MESHLETS as u64, candidate_stride),
                "GPURender.VisibleMeshlets",
            )?,
            occluded_instances: device.create_buffer(
                BufferDesc::create_structured(MAX_NUM_INSTANCES as u64, 4),
                "GPURender.OccludedInstances",
            )?,
            occluded_instances_counter: device.create_buffer(
                BufferDesc::create_structured(1, 4),
                "GPURender.OccludedInstances.Counter",
            )?,
            candidate_meshlets_counter: device.create_buffer(
                BufferDesc::create_structured(3, 4),
                "GPURender.CandidateMeshlets.Counter",
            )?,
            visible_meshlets_counter: device.create_buffer(
                BufferDesc::create_structured(2, 4),
                "GPURender.VisibleMeshlets.Counter",
            )?,
            previous_hzb: device.create_texture(hzb::hzb_desc(viewport), "HZB.Previous")?,
            work_graph_buffer_ids: Arc::new(Mutex::new([0; 2])),
        })
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    /// Previous frame's depth pyramid; empty (all far plane) right after
    /// creation or a resize.
    pub fn previous_hzb(&self) -> &Texture {
        &self.previous_hzb
    }

    /// Reallocate the viewport-sized state. The culling buffers are
    /// viewport-independent and survive.
    pub fn resize(&mut self, device: &DeviceContext, viewport: UVec2) -> GfxResult<()> {
        if viewport == self.viewport {
            return Ok(());
        }
        self.viewport = viewport;
        let new_hzb = device.create_texture(hzb::hzb_desc(viewport), "HZB.Previous")?;
        let old = std::mem::replace(&mut self.previous_hzb, new_hzb);
        device.defer_release_texture(old);
        // The backing identity check handles work-graph reinitialization.
        Ok(())
    }
}

/// Graph resources produced by [`MeshletRasterizer::render`].
#[derive(Default, Clone, Copy)]
pub struct RasterResult {
    pub hzb: Option<RenderGraphResource>,
    pub visibility_buffer: Option<RenderGraphResource>,
    pub debug_data: Option<RenderGraphResource>,
    pub visible_meshlets: Option<RenderGraphResource>,
    /// Per-phase bin tables, kept for the stats pass.
    pub bin_tables: [Option<RenderGraphResource>; 2],
}

struct WorkGraphPrograms {
    state_objects: [StateObject; 2],
    state_object_no_occlusion: StateObject,
    clear_bins: PipelineHandle,
}

pub struct MeshletRasterizer {
    device: DeviceContext,
    pipeline_manager: Arc<PipelineManager>,
    hzb_pipelines: HzbPipelines,

    clear_counters: PipelineHandle,
    build_instance_cull_args: PipelineHandle,
    // Indexed by phase.
    cull_instances: [PipelineHandle; 2],
    cull_meshlets: [PipelineHandle; 2],
    build_meshlet_cull_args: [PipelineHandle; 2],
    cull_instances_no_occlusion: PipelineHandle,
    cull_meshlets_no_occlusion: PipelineHandle,

    bin_prepare_args: PipelineHandle,
    bin_classify: PipelineHandle,
    bin_allocate_ranges: PipelineHandle,
    bin_write: PipelineHandle,

    // Indexed by bin.
    raster_visibility: Vec<PipelineHandle>,
    raster_visibility_debug: Vec<PipelineHandle>,
    raster_depth_only: Vec<PipelineHandle>,

    print_stats: PipelineHandle,
    visibility_debug_render: PipelineHandle,

    work_graphs: Option<WorkGraphPrograms>,

    stats: Arc<Mutex<GpuBufferWithReadback>>,
}

impl MeshletRasterizer {
    pub fn new(
        device: &DeviceContext,
        pipeline_manager: &Arc<PipelineManager>,
    ) -> GfxResult<Self> {
        if !device.capabilities().mesh_shading {
            return Err(GfxError::UnsupportedCapability("mesh_shading"));
        }

        let defines = |shader: ShaderRef| {
            shader
                .with_define("MAX_NUM_MESHLETS", MAX_NUM_MESHLETS)
                .with_define("MAX_NUM_INSTANCES", MAX_NUM_INSTANCES)
                .with_define("NUM_CULL_INSTANCES_THREADS", CULL_INSTANCE_THREAD_GROUP_SIZE)
                .with_define("NUM_CULL_MESHLETS_THREADS", CULL_MESHLET_THREAD_GROUP_SIZE)
                .with_define("NUM_RASTER_BINS", NUM_RASTER_BINS)
        };
        let compute = |entry: &str, extra: &[(&str, &str)]| {
            let mut shader = defines(ShaderRef::new("MeshletCull.hlsl", entry));
            for (key, value) in extra {
                shader = shader.with_define(key, value);
            }
            PipelineDef::Compute(ComputePipelineDef {
                shader,
                root_signature: RootSignatureDef::default(),
            })
        };
        let binning = |entry: &str| {
            PipelineDef::Compute(ComputePipelineDef {
                shader: defines(ShaderRef::new("MeshletBinning.hlsl", entry)),
                root_signature: RootSignatureDef::default(),
            })
        };

        let raster_pso = |bin: PipelineBin, mode: RasterMode, debug: bool| {
            let mut mesh_shader = defines(ShaderRef::new("MeshletRasterize.hlsl", "MSMain"))
                .with_define("ALPHA_MASK", matches!(bin, PipelineBin::AlphaMasked))
                .with_define("ENABLE_DEBUG_DATA", debug);
            let mut pixel_shader = Some(
                ShaderRef::new("MeshletRasterize.hlsl", "PSMain")
                    .with_define("ALPHA_MASK", matches!(bin, PipelineBin::AlphaMasked))
                    .with_define("ENABLE_DEBUG_DATA", debug),
            );
            let color_formats = match mode {
                RasterMode::VisibilityBuffer => vec![Format::R32_UINT],
                RasterMode::Shadows => {
                    mesh_shader = mesh_shader.with_define("DEPTH_ONLY", true);
                    // Alpha-masked shadows still need the pixel shader for
                    // the clip test.
                    if matches!(bin, PipelineBin::Opaque) {
                        pixel_shader = None;
                    }
                    vec![]
                }
            };
            PipelineDef::Graphics(GraphicsPipelineDef {
                vertex_shader: None,
                amplification_shader: Some(defines(ShaderRef::new(
                    "MeshletRasterize.hlsl",
                    "ASMain",
                ))),
                mesh_shader: Some(mesh_shader),
                pixel_shader,
                root_signature: RootSignatureDef::default(),
                depth_state: DepthState::reverse_z(true),
                cull_mode: if matches!(bin, PipelineBin::AlphaMasked) {
                    CullMode::None
                } else {
                    CullMode::Back
                },
                color_formats,
                depth_stencil_format: Some(Format::D32_FLOAT),
                sample_count: Default::default(),
            })
        };

        let manager = pipeline_manager.as_ref();
        let mut raster_visibility = Vec::new();
        let mut raster_visibility_debug = Vec::new();
        let mut raster_depth_only = Vec::new();
        for bin in PipelineBin::iter() {
            raster_visibility
                .push(manager.register_pipeline(raster_pso(bin, RasterMode::VisibilityBuffer, false)));
            raster_visibility_debug
                .push(manager.register_pipeline(raster_pso(bin, RasterMode::VisibilityBuffer, true)));
            raster_depth_only
                .push(manager.register_pipeline(raster_pso(bin, RasterMode::Shadows, false)));
        }

        let work_graphs = if device.capabilities().work_graphs {
            let state_object = |first_pass: bool, occlusion: bool| {
                device.create_state_object(StateObjectDef {
                    library: defines(ShaderRef::new("MeshletCullWG.hlsl", ""))
                        .with_define("OCCLUSION_FIRST_PASS", first_pass)
                        .with_define("OCCLUSION_CULL", occlusion),
                    root_signature: RootSignatureDef::default(),
                    program_name: "WG".to_string(),
                })
            };
            Some(WorkGraphPrograms {
                state_objects: [state_object(true, true)?, state_object(false, true)?],
                state_object_no_occlusion: state_object(true, false)?,
                clear_bins: manager.register_pipeline(PipelineDef::Compute(ComputePipelineDef {
                    shader: defines(ShaderRef::new("MeshletCullWG.hlsl", "ClearRasterBins")),
                    root_signature: RootSignatureDef::default(),
                })),
            })
        } else {
            None
        };

        Ok(Self {
            device: device.clone(),
            pipeline_manager: Arc::clone(pipeline_manager),
            hzb_pipelines: HzbPipelines::new(manager),
            clear_counters: manager.register_pipeline(compute("ClearCountersCS", &[])),
            build_instance_cull_args: manager
                .register_pipeline(compute("BuildInstanceCullIndirectArgs", &[])),
            cull_instances: [
                manager.register_pipeline(compute(
                    "CullInstancesCS",
                    &[("OCCLUSION_FIRST_PASS", "1")],
                )),
                manager.register_pipeline(compute(
                    "CullInstancesCS",
                    &[("OCCLUSION_FIRST_PASS", "0")],
                )),
            ],
            cull_meshlets: [
                manager.register_pipeline(compute(
                    "CullMeshletsCS",
                    &[("OCCLUSION_FIRST_PASS", "1")],
                )),
                manager.register_pipeline(compute(
                    "CullMeshletsCS",
                    &[("OCCLUSION_FIRST_PASS", "0")],
                )),
            ],
            build_meshlet_cull_args: [
                manager.register_pipeline(compute(
                    "BuildMeshletCullIndirectArgs",
                    &[("OCCLUSION_FIRST_PASS", "1")],
                )),
                manager.register_pipeline(compute(
                    "BuildMeshletCullIndirectArgs",
                    &[("OCCLUSION_FIRST_PASS", "0")],
                )),
            ],
            cull_instances_no_occlusion: manager.register_pipeline(compute(
                "CullInstancesCS",
                &[("OCCLUSION_CULL", "0"), ("OCCLUSION_FIRST_PASS", "1")],
            )),
            cull_meshlets_no_occlusion: manager.register_pipeline(compute(
                "CullMeshletsCS",
                &[("OCCLUSION_CULL", "0"), ("OCCLUSION_FIRST_PASS", "1")],
            )),
            bin_prepare_args: manager.register_pipeline(binning("PrepareArgsCS")),
            bin_classify: manager.register_pipeline(binning("ClassifyMeshletsCS")),
            bin_allocate_ranges: manager.register_pipeline(binning("AllocateBinRangesCS")),
            bin_write: manager.register_pipeline(binning("WriteBinsCS")),
            raster_visibility,
            raster_visibility_debug,
            raster_depth_only,
            print_stats: manager.register_pipeline(compute("PrintStatsCS", &[])),
            visibility_debug_render: manager.register_pipeline(PipelineDef::Compute(
                ComputePipelineDef {
                    shader: ShaderRef::new("VisibilityDebugView.hlsl", "DebugRenderCS"),
                    root_signature: RootSignatureDef::default(),
                },
            )),
            work_graphs,
            stats: Arc::new(Mutex::new(GpuBufferWithReadback::new(
                device,
                "GPURender.Stats",
                std::mem::size_of::<CullingStats>() as u64,
            )?)),
        })
    }

    /// Latest culling efficiency numbers, one or more frames old.
    pub fn culling_stats(&self) -> Option<CullingStats> {
        self.stats.lock().read_latest(&self.device)
    }

    /// Called once per frame after the graph submission with its fence.
    pub fn end_frame(&self, fence: u64) {
        self.stats.lock().end_frame(fence);
    }

    /// Schedule culling and rasterization for one view. `depth` is the depth
    /// target the caller registered; phase 1 clears it, phase 2 loads it.
    pub fn render(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        raster_context: &RasterContext,
        depth: &mut RenderGraphResource,
    ) -> RasterResult {
        debug_assert!(
            view.batches.len() as u32 <= MAX_NUM_INSTANCES,
            "instance count exceeds the culling buffer capacity"
        );
        debug_assert!(
            view.total_meshlet_count() <= MAX_NUM_MESHLETS,
            "meshlet count exceeds the culling buffer capacity"
        );

        let mut result = RasterResult::default();

        if raster_context.mode == RasterMode::VisibilityBuffer {
            let viewport = raster_context.viewport;
            result.visibility_buffer = Some(graph.create(
                "Visibility",
                TextureDesc::create_render_target(viewport.x, viewport.y, Format::R32_UINT),
            ));
        }

        let mut hzb = graph.import_texture("HZB", &raster_context.previous_hzb);
        if raster_context.enable_occlusion_culling {
            result.hzb = Some(hzb);
        }

        if raster_context.enable_debug {
            let viewport = raster_context.viewport;
            let debug_data = graph.create(
                "GPURender.DebugData",
                TextureDesc::create_2d(viewport.x, viewport.y, Format::R32_UINT),
            );
            result.debug_data = Some(debug_data);
        }

        let mut candidate_counter =
            graph.import_buffer("CandidateMeshlets.Counter", &raster_context.candidate_meshlets_counter);
        let mut occluded_counter = graph.import_buffer(
            "OccludedInstances.Counter",
            &raster_context.occluded_instances_counter,
        );
        let mut visible_counter =
            graph.import_buffer("VisibleMeshlets.Counter", &raster_context.visible_meshlets_counter);
        let mut candidate_meshlets =
            graph.import_buffer("CandidateMeshlets", &raster_context.candidate_meshlets);
        let mut occluded_instances =
            graph.import_buffer("OccludedInstances", &raster_context.occluded_instances);
        let mut visible_meshlets =
            graph.import_buffer("VisibleMeshlets", &raster_context.visible_meshlets);

        // Clear all counters (and the debug target) up front.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let clear_counters = self.clear_counters;
            let stats = Arc::clone(&self.stats);
            let debug_data = result.debug_data;
            let candidate_counter_h = candidate_counter;
            let occluded_counter_h = occluded_counter;
            let visible_counter_h = visible_counter;
            let mut builder = graph
                .add_pass("Clear UAVs", RGPassFlags::COMPUTE)
                .write(&mut candidate_counter)
                .write(&mut occluded_counter)
                .write(&mut visible_counter);
            if let Some(debug) = result.debug_data.as_mut() {
                builder = builder.write(debug);
            }
            builder.bind(move |context, resources| {
                if let Some(debug) = debug_data {
                    context.clear_texture_uav_uint(resources.get_texture(debug), [0; 4]);
                }
                stats.lock().clear(context);

                let pipeline = match manager.get_pipeline(clear_counters) {
                    Some(pipeline) => pipeline,
                    None => return,
                };
                context.set_compute_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);
                context.bind_resources(
                    ROOT_SLOT_UAV_TABLE,
                    &[
                        ResourceView::Buffer(resources.get_buffer_uav(candidate_counter_h)),
                        ResourceView::Buffer(resources.get_buffer_uav(occluded_counter_h)),
                        ResourceView::Buffer(resources.get_buffer_uav(visible_counter_h)),
                    ],
                );
                context.dispatch_1d(1);
                context.uav_barrier();
            });
        }

        let mut buffers = CullBuffers {
            candidate_meshlets: &mut candidate_meshlets,
            candidate_counter: &mut candidate_counter,
            occluded_instances: &mut occluded_instances,
            occluded_counter: &mut occluded_counter,
            visible_meshlets: &mut visible_meshlets,
            visible_counter: &mut visible_counter,
            depth,
            hzb: &mut hzb,
        };

        self.cull_and_rasterize(
            graph,
            view,
            RasterPhase::Phase1,
            raster_context,
            &mut buffers,
            &mut result,
        );

        // With occlusion culling off, phase 1 already rendered everything.
        if raster_context.enable_occlusion_culling {
            self.cull_and_rasterize(
                graph,
                view,
                RasterPhase::Phase2,
                raster_context,
                &mut buffers,
                &mut result,
            );
        }

        result.visible_meshlets = Some(*buffers.visible_meshlets);
        if raster_context.enable_occlusion_culling {
            // The handle now points at the fully rebuilt pyramid.
            result.hzb = Some(hzb);
        }
        result
    }

    #[allow(clippy::too_many_lines)]
    fn cull_and_rasterize(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        phase: RasterPhase,
        raster_context: &RasterContext,
        buffers: &mut CullBuffers<'_>,
        result: &mut RasterResult,
    ) {
        let phase_index = match phase {
            RasterPhase::Phase1 => 0usize,
            RasterPhase::Phase2 => 1usize,
        };
        let occlusion = raster_context.enable_occlusion_culling;
        // Phase 1 tests against the previous frame's pyramid contents; the
        // handle version at this point is exactly that.
        let source_hzb = occlusion.then_some(*buffers.hzb);
        let hzb_dimensions = {
            let desc = raster_context.previous_hzb.definition();
            UVec2::new(desc.width, desc.height)
        };

        let (cull_instances_pso, cull_meshlets_pso) = if occlusion {
            (self.cull_instances[phase_index], self.cull_meshlets[phase_index])
        } else {
            (self.cull_instances_no_occlusion, self.cull_meshlets_no_occlusion)
        };

        // Bin classification output: one dispatch-mesh record per bin plus
        // an indirection list back into the visible meshlets.
        let mut bin_table = graph.create(
            "GPURender.Classify.MeshletOffsetAndCounts",
            BufferDesc::create_indirect_arguments(
                NUM_RASTER_BINS as u64,
                std::mem::size_of::<BinOffsetAndCount>() as u64,
            ),
        );
        let mut binned_meshlets = graph.create(
            "GPURender.Classify.BinnedMeshlets",
            BufferDesc::create_structured(MAX_NUM_MESHLETS as u64, 4),
        );

        let use_work_graphs = raster_context.use_work_graphs && self.work_graphs.is_some();
        if use_work_graphs {
            self.record_work_graph_culling(
                graph,
                view,
                phase,
                raster_context,
                buffers,
                source_hzb,
                hzb_dimensions,
                &mut bin_table,
                &mut binned_meshlets,
            );
        } else {
            // Phase 2 dispatches over the carry-over list; its size only
            // exists on the GPU, so build the arguments indirectly.
            let mut instance_cull_args = None;
            if phase == RasterPhase::Phase2 {
                let mut args = graph.create(
                    "GPURender.InstanceCullArgs",
                    BufferDesc::create_indirect_arguments(
                        1,
                        std::mem::size_of::<DispatchArgs>() as u64,
                    ),
                );
                let manager = Arc::clone(&self.pipeline_manager);
                let pso = self.build_instance_cull_args;
                let occluded_counter_h = *buffers.occluded_counter;
                let args_h = args;
                graph
                    .add_pass("Build Instance Cull Arguments", RGPassFlags::COMPUTE)
                    .read(occluded_counter_h)
                    .write(&mut args)
                    .bind(move |context, resources| {
                        let pipeline = match manager.get_pipeline(pso) {
                            Some(pipeline) => pipeline,
                            None => return,
                        };
                        context.set_compute_root_signature(pipeline.root_signature());
                        context.set_pipeline_state(&pipeline);
                        context.bind_resources(
                            ROOT_SLOT_UAV_TABLE,
                            &[ResourceView::Buffer(resources.get_buffer_uav(args_h))],
                        );
                        context.bind_resources(
                            ROOT_SLOT_SRV_TABLE,
                            &[ResourceView::Buffer(
                                resources.get_buffer_srv(occluded_counter_h),
                            )],
                        );
                        context.dispatch_1d(1);
                    });
                instance_cull_args = Some(args);
            }

            // Cull instances: frustum test, then the pyramid. Phase 1 queues
            // occluded instances for retest; phase 2 re-emits the ones that
            // became visible.
            {
                let manager = Arc::clone(&self.pipeline_manager);
                let stats = Arc::clone(&self.stats);
                let view = Arc::clone(view);
                let candidate_meshlets_h = *buffers.candidate_meshlets;
                let candidate_counter_h = *buffers.candidate_counter;
                let occluded_instances_h = *buffers.occluded_instances;
                let occluded_counter_h = *buffers.occluded_counter;
                let args = instance_cull_args;

                let mut builder = graph
                    .add_pass("Cull Instances", RGPassFlags::COMPUTE)
                    .write(buffers.candidate_meshlets)
                    .write(buffers.candidate_counter)
                    .write(buffers.occluded_instances)
                    .write(buffers.occluded_counter);
                if let Some(args) = instance_cull_args {
                    builder = builder.read_indirect_args(args);
                }
                if let Some(source_hzb) = source_hzb {
                    builder = builder.read(source_hzb);
                }
                builder.bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(cull_instances_pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

                    #[repr(C)]
                    #[derive(Clone, Copy)]
                    struct Constants {
                        hzb_dimensions: [u32; 2],
                    }
                    context.set_root_constants(
                        ROOT_SLOT_CONSTANTS,
                        &Constants {
                            hzb_dimensions: hzb_dimensions.to_array(),
                        },
                    );

                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(candidate_meshlets_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(candidate_counter_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(occluded_instances_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(occluded_counter_h)),
                            ResourceView::Buffer(stats.lock().buffer().uav()),
                        ],
                    );
                    let mut srvs = vec![
                        ResourceView::Buffer(view.scene_buffers.instances.srv()),
                        ResourceView::Buffer(view.scene_buffers.meshes.srv()),
                    ];
                    if let Some(source_hzb) = source_hzb {
                        srvs.push(ResourceView::Texture(resources.get_srv(source_hzb)));
                    }
                    context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);

                    match args {
                        None => {
                            context.dispatch_1d(divide_and_round_up(
                                view.batches.len() as u32,
                                CULL_INSTANCE_THREAD_GROUP_SIZE,
                            ));
                        }
                        Some(args) => {
                            context.execute_indirect(
                                CommandSignature::DISPATCH,
                                1,
                                resources.get_buffer(args),
                                0,
                            );
                        }
                    }
                });
            }

            // Size the meshlet-cull dispatch from the candidate counter
            // segment this phase owns.
            let mut meshlet_cull_args = graph.create(
                "GPURender.MeshletCullArgs",
                BufferDesc::create_indirect_arguments(1, std::mem::size_of::<DispatchArgs>() as u64),
            );
            {
                let manager = Arc::clone(&self.pipeline_manager);
                let pso = self.build_meshlet_cull_args[phase_index];
                let candidate_counter_h = *buffers.candidate_counter;
                let args_h = meshlet_cull_args;
                graph
                    .add_pass("Build Meshlet Cull Arguments", RGPassFlags::COMPUTE)
                    .read(candidate_counter_h)
                    .write(&mut meshlet_cull_args)
                    .bind(move |context, resources| {
                        let pipeline = match manager.get_pipeline(pso) {
                            Some(pipeline) => pipeline,
                            None => return,
                        };
                        context.set_compute_root_signature(pipeline.root_signature());
                        context.set_pipeline_state(&pipeline);
                        context.bind_resources(
                            ROOT_SLOT_UAV_TABLE,
                            &[ResourceView::Buffer(resources.get_buffer_uav(args_h))],
                        );
                        context.bind_resources(
                            ROOT_SLOT_SRV_TABLE,
                            &[ResourceView::Buffer(
                                resources.get_buffer_srv(candidate_counter_h),
                            )],
                        );
                        context.dispatch_1d(1);
                    });
            }

            // Cull meshlets: frustum and cone against the camera, then the
            // pyramid. Phase-retained meshlets go back to the candidate
            // list's phase-2 segment.
            {
                let manager = Arc::clone(&self.pipeline_manager);
                let view = Arc::clone(view);
                let candidate_meshlets_h = *buffers.candidate_meshlets;
                let candidate_counter_h = *buffers.candidate_counter;
                let visible_meshlets_h = *buffers.visible_meshlets;
                let visible_counter_h = *buffers.visible_counter;
                let args_h = meshlet_cull_args;

                let mut builder = graph
                    .add_pass("Cull Meshlets", RGPassFlags::COMPUTE)
                    .read_indirect_args(meshlet_cull_args)
                    .write(buffers.candidate_meshlets)
                    .write(buffers.candidate_counter)
                    .write(buffers.visible_meshlets)
                    .write(buffers.visible_counter);
                if let Some(source_hzb) = source_hzb {
                    builder = builder.read(source_hzb);
                }
                builder.bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(cull_meshlets_pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

                    #[repr(C)]
                    #[derive(Clone, Copy)]
                    struct Constants {
                        hzb_dimensions: [u32; 2],
                    }
                    context.set_root_constants(
                        ROOT_SLOT_CONSTANTS,
                        &Constants {
                            hzb_dimensions: hzb_dimensions.to_array(),
                        },
                    );

                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(candidate_meshlets_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(candidate_counter_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(visible_meshlets_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(visible_counter_h)),
                        ],
                    );
                    let mut srvs = vec![
                        ResourceView::Buffer(view.scene_buffers.meshlets.srv()),
                        ResourceView::Buffer(view.scene_buffers.instances.srv()),
                    ];
                    if let Some(source_hzb) = source_hzb {
                        srvs.push(ResourceView::Texture(resources.get_srv(source_hzb)));
                    }
                    context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);

                    context.execute_indirect(
                        CommandSignature::DISPATCH,
                        1,
                        resources.get_buffer(args_h),
                        0,
                    );
                });
            }

            self.record_classification(
                graph,
                view,
                phase,
                buffers,
                &mut bin_table,
                &mut binned_meshlets,
            );
        }

        result.bin_tables[phase_index] = Some(bin_table);

        self.record_rasterize(
            graph,
            view,
            phase,
            raster_context,
            buffers,
            bin_table,
            binned_meshlets,
            result,
        );

        // Rebuild the pyramid so phase 2 (and next frame's phase 1) test
        // against everything drawn so far.
        if occlusion {
            hzb::build_hzb(
                graph,
                &self.pipeline_manager,
                &self.hzb_pipelines,
                *buffers.depth,
                buffers.hzb,
            );
        }
    }

    fn record_classification(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        phase: RasterPhase,
        buffers: &mut CullBuffers<'_>,
        bin_table: &mut RenderGraphResource,
        binned_meshlets: &mut RenderGraphResource,
    ) {
        // Visible meshlets land in one unordered list; bucket them per
        // pipeline bin so each bin draws with its own state.
        let is_second_phase = phase == RasterPhase::Phase2;

        let mut bin_counts = graph.create(
            "GPURender.Classify.MeshletCounts",
            BufferDesc::create_structured(NUM_RASTER_BINS as u64, 4),
        );
        let mut global_count = graph.create(
            "GPURender.Classify.GlobalCount",
            BufferDesc::create_structured(1, 4),
        );
        let mut classify_args = graph.create(
            "GPURender.Classify.Args",
            BufferDesc::create_indirect_arguments(1, std::mem::size_of::<DispatchArgs>() as u64),
        );

        #[repr(C)]
        #[derive(Clone, Copy)]
        struct ClassifyConstants {
            num_bins: u32,
            is_second_phase: u32,
        }
        let constants = ClassifyConstants {
            num_bins: NUM_RASTER_BINS,
            is_second_phase: is_second_phase as u32,
        };

        // Clear counters and set up the classify dispatch.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.bin_prepare_args;
            let visible_counter_h = *buffers.visible_counter;
            let bin_counts_h = bin_counts;
            let global_count_h = global_count;
            let classify_args_h = classify_args;
            graph
                .add_pass("Prepare Classify", RGPassFlags::COMPUTE)
                .read(visible_counter_h)
                .write(&mut bin_counts)
                .write(&mut global_count)
                .write(&mut classify_args)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_constants(ROOT_SLOT_CONSTANTS, &constants);
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(bin_counts_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(global_count_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(classify_args_h)),
                        ],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[ResourceView::Buffer(
                            resources.get_buffer_srv(visible_counter_h),
                        )],
                    );
                    context.dispatch_1d(1);
                    context.uav_barrier();
                });
        }

        // Count how many meshlets each bin receives.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let view = Arc::clone(view);
            let pso = self.bin_classify;
            let visible_meshlets_h = *buffers.visible_meshlets;
            let visible_counter_h = *buffers.visible_counter;
            let bin_counts_h = bin_counts;
            let classify_args_h = classify_args;
            graph
                .add_pass("Count Meshlets", RGPassFlags::COMPUTE)
                .read_indirect_args(classify_args_h)
                .read(visible_meshlets_h)
                .read(visible_counter_h)
                .write(&mut bin_counts)
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
                        &[ResourceView::Buffer(resources.get_buffer_uav(bin_counts_h))],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_srv(visible_meshlets_h)),
                            ResourceView::Buffer(resources.get_buffer_srv(visible_counter_h)),
                            ResourceView::Buffer(view.scene_buffers.materials.srv()),
                            ResourceView::Buffer(view.scene_buffers.instances.srv()),
                        ],
                    );
                    context.execute_indirect(
                        CommandSignature::DISPATCH,
                        1,
                        resources.get_buffer(classify_args_h),
                        0,
                    );
                });
        }

        // Exclusive prefix sum over the bin counts; a single workgroup
        // handles every bin.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = self.bin_allocate_ranges;
            let bin_counts_h = bin_counts;
            let bin_table_h = *bin_table;
            let global_count_h = global_count;
            graph
                .add_pass("Compute Bin Offsets", RGPassFlags::COMPUTE)
                .read(bin_counts_h)
                .write(bin_table)
                .write(&mut global_count)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.set_root_constants(ROOT_SLOT_CONSTANTS, &constants);
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(bin_table_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(global_count_h)),
                        ],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[ResourceView::Buffer(resources.get_buffer_srv(bin_counts_h))],
                    );
                    context.dispatch_1d(divide_and_round_up(NUM_RASTER_BINS, 64));
                    context.uav_barrier();
                });
        }

        // Scatter meshlet indices into their bin's range.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let view = Arc::clone(view);
            let pso = self.bin_write;
            let visible_meshlets_h = *buffers.visible_meshlets;
            let visible_counter_h = *buffers.visible_counter;
            let bin_table_h = *bin_table;
            let binned_meshlets_h = *binned_meshlets;
            let classify_args_h = classify_args;
            graph
                .add_pass("Write Bins", RGPassFlags::COMPUTE)
                .read_indirect_args(classify_args_h)
                .read(visible_meshlets_h)
                .read(visible_counter_h)
                .write(bin_table)
                .write(binned_meshlets)
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
                        &[
                            ResourceView::Buffer(resources.get_buffer_uav(bin_table_h)),
                            ResourceView::Buffer(resources.get_buffer_uav(binned_meshlets_h)),
                        ],
                    );
                    context.bind_resources(
                        ROOT_SLOT_SRV_TABLE,
                        &[
                            ResourceView::Buffer(resources.get_buffer_srv(visible_meshlets_h)),
                            ResourceView::Buffer(resources.get_buffer_srv(visible_counter_h)),
                            ResourceView::Buffer(view.scene_buffers.materials.srv()),
                            ResourceView::Buffer(view.scene_buffers.instances.srv()),
                        ],
                    );
                    context.execute_indirect(
                        CommandSignature::DISPATCH,
                        1,
                        resources.get_buffer(classify_args_h),
                        0,
                    );
                });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_work_graph_culling(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        phase: RasterPhase,
        raster_context: &RasterContext,
        buffers: &mut CullBuffers<'_>,
        source_hzb: Option<RenderGraphResource>,
        hzb_dimensions: UVec2,
        bin_table: &mut RenderGraphResource,
        binned_meshlets: &mut RenderGraphResource,
    ) {
        let programs = self.work_graphs.as_ref().unwrap();
        let phase_index = match phase {
            RasterPhase::Phase1 => 0usize,
            RasterPhase::Phase2 => 1usize,
        };
        let state_object = if raster_context.enable_occlusion_culling {
            programs.state_objects[phase_index].clone()
        } else {
            programs.state_object_no_occlusion.clone()
        };

        // The graph culling nodes write bins directly; clear them first.
        {
            let manager = Arc::clone(&self.pipeline_manager);
            let pso = programs.clear_bins;
            let bin_table_h = *bin_table;
            graph
                .add_pass("Clear Raster Bins", RGPassFlags::COMPUTE)
                .write(bin_table)
                .bind(move |context, resources| {
                    let pipeline = match manager.get_pipeline(pso) {
                        Some(pipeline) => pipeline,
                        None => return,
                    };
                    context.set_compute_root_signature(pipeline.root_signature());
                    context.set_pipeline_state(&pipeline);
                    context.bind_resources(
                        ROOT_SLOT_UAV_TABLE,
                        &[ResourceView::Buffer(resources.get_buffer_uav(bin_table_h))],
                    );
                    context.dispatch_1d(1);
                    context.uav_barrier();
                });
        }

        let mut backing = graph.create(
            "Work Graph Buffer",
            BufferDesc::create_byte_address(
                state_object.workgraph_backing_size(),
                ResourceUsage::AS_UNORDERED_ACCESS,
            ),
        );

        let view = Arc::clone(view);
        let backing_ids = Arc::clone(&raster_context.work_graph_buffer_ids);
        let candidate_meshlets_h = *buffers.candidate_meshlets;
        let candidate_counter_h = *buffers.candidate_counter;
        let occluded_instances_h = *buffers.occluded_instances;
        let occluded_counter_h = *buffers.occluded_counter;
        let visible_meshlets_h = *buffers.visible_meshlets;
        let visible_counter_h = *buffers.visible_counter;
        let bin_table_h = *bin_table;
        let binned_meshlets_h = *binned_meshlets;
        let backing_h = backing;

        let mut builder = graph
            .add_pass("Work Graph", RGPassFlags::COMPUTE)
            .write(&mut backing)
            .write(bin_table)
            .write(binned_meshlets)
            .write(buffers.candidate_meshlets)
            .write(buffers.candidate_counter)
            .write(buffers.occluded_instances)
            .write(buffers.occluded_counter)
            .write(buffers.visible_meshlets)
            .write(buffers.visible_counter);
        if let Some(source_hzb) = source_hzb {
            builder = builder.read(source_hzb);
        }
        builder.bind(move |context, resources| {
            let backing_buffer = resources.get_buffer(backing_h).clone();

            // Reinitialize whenever the backing identity changes; never
            // assume an implicit reset.
            let initialize = {
                let mut ids = backing_ids.lock();
                let changed = ids[phase_index] != backing_buffer.id();
                ids[phase_index] = backing_buffer.id();
                changed
            };
            context.set_program(&state_object, &backing_buffer, initialize);
            context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

            #[repr(C)]
            #[derive(Clone, Copy)]
            struct Constants {
                hzb_dimensions: [u32; 2],
            }
            context.set_root_constants(
                ROOT_SLOT_CONSTANTS,
                &Constants {
                    hzb_dimensions: hzb_dimensions.to_array(),
                },
            );

            let mut uavs = vec![
                ResourceView::Buffer(resources.get_buffer_uav(candidate_meshlets_h)),
                ResourceView::Buffer(resources.get_buffer_uav(candidate_counter_h)),
                ResourceView::Buffer(resources.get_buffer_uav(occluded_instances_h)),
                ResourceView::Buffer(resources.get_buffer_uav(occluded_counter_h)),
                ResourceView::Buffer(resources.get_buffer_uav(visible_meshlets_h)),
                ResourceView::Buffer(resources.get_buffer_uav(visible_counter_h)),
                ResourceView::Buffer(resources.get_buffer_uav(bin_table_h)),
                ResourceView::Buffer(resources.get_buffer_uav(binned_meshlets_h)),
            ];
            let mut srvs = vec![
                ResourceView::Buffer(view.scene_buffers.instances.srv()),
                ResourceView::Buffer(view.scene_buffers.meshes.srv()),
                ResourceView::Buffer(view.scene_buffers.meshlets.srv()),
            ];
            if let Some(source_hzb) = source_hzb {
                srvs.push(ResourceView::Texture(resources.get_srv(source_hzb)));
            }
            uavs.push(ResourceView::Buffer(backing_buffer.uav()));
            context.bind_resources(ROOT_SLOT_UAV_TABLE, &uavs);
            context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);

            // Phase 1 seeds one record per instance group; phase 2 kicks the
            // carried-over instances from a single entry node.
            let record_count = match phase {
                RasterPhase::Phase1 => divide_and_round_up(
                    view.batches.len() as u32,
                    CULL_INSTANCE_THREAD_GROUP_SIZE,
                )
                .max(1),
                RasterPhase::Phase2 => 1,
            };
            context.dispatch_graph(phase_index as u32, record_count);
            context.uav_barrier();
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn record_rasterize(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        phase: RasterPhase,
        raster_context: &RasterContext,
        buffers: &mut CullBuffers<'_>,
        bin_table: RenderGraphResource,
        binned_meshlets: RenderGraphResource,
        result: &mut RasterResult,
    ) {
        let pipelines: Vec<PipelineHandle> = match (raster_context.mode, raster_context.enable_debug)
        {
            (RasterMode::Shadows, _) => self.raster_depth_only.clone(),
            (RasterMode::VisibilityBuffer, false) => self.raster_visibility.clone(),
            (RasterMode::VisibilityBuffer, true) => self.raster_visibility_debug.clone(),
        };

        let manager = Arc::clone(&self.pipeline_manager);
        let view = Arc::clone(view);
        let visible_meshlets_h = *buffers.visible_meshlets;
        let bin_table_h = bin_table;
        let binned_meshlets_h = binned_meshlets;
        let debug_data = result.debug_data;

        let mut builder = graph
            .add_pass("Rasterize", RGPassFlags::RASTER)
            .read(visible_meshlets_h)
            .read_indirect_args(bin_table_h)
            .read(binned_meshlets_h)
            .depth_stencil(
                buffers.depth,
                if phase == RasterPhase::Phase1 {
                    DepthStencilAccess::clear()
                } else {
                    DepthStencilAccess::load()
                },
            );
        if let Some(mut visibility) = result.visibility_buffer {
            builder = builder.render_target(
                &mut visibility,
                if phase == RasterPhase::Phase1 {
                    RenderTargetAccess::clear(Default::default())
                } else {
                    RenderTargetAccess::load()
                },
            );
            result.visibility_buffer = Some(visibility);
        }
        if let Some(mut debug) = result.debug_data {
            builder = builder.write(&mut debug);
            result.debug_data = Some(debug);
        }
        builder.bind(move |context, resources| {
            context.set_stencil_ref(1);
            context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

            for (bin_index, handle) in pipelines.iter().enumerate() {
                let pipeline = match manager.get_pipeline(*handle) {
                    Some(pipeline) => pipeline,
                    None => continue,
                };
                context.set_graphics_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);

                #[repr(C)]
                #[derive(Clone, Copy)]
                struct Constants {
                    bin_index: u32,
                }
                context.set_root_constants(
                    ROOT_SLOT_CONSTANTS,
                    &Constants {
                        bin_index: bin_index as u32,
                    },
                );

                let mut srvs = vec![
                    ResourceView::Buffer(resources.get_buffer_srv(visible_meshlets_h)),
                    ResourceView::Buffer(resources.get_buffer_srv(binned_meshlets_h)),
                    ResourceView::Buffer(resources.get_buffer_srv(bin_table_h)),
                    ResourceView::Buffer(view.scene_buffers.meshlets.srv()),
                    ResourceView::Buffer(view.scene_buffers.instances.srv()),
                    ResourceView::Buffer(view.scene_buffers.materials.srv()),
                ];
                if let Some(debug) = debug_data {
                    srvs.push(ResourceView::Texture(resources.get_uav(debug)));
                }
                context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);

                context.execute_indirect(
                    CommandSignature::DISPATCH_MESH,
                    1,
                    resources.get_buffer(bin_table_h),
                    std::mem::size_of::<BinOffsetAndCount>() as u64 * bin_index as u64,
                );
            }
        });
    }

    /// Print the counter values on screen through a small never-culled
    /// compute pass; reads stay on the GPU.
    pub fn print_stats(&self, graph: &mut RenderGraph, view: &RenderViewRef, result: &RasterResult) {
        let manager = Arc::clone(&self.pipeline_manager);
        let stats = Arc::clone(&self.stats);
        let pso = self.print_stats;
        let view = Arc::clone(view);

        let mut builder = graph.add_pass(
            "Print Stats",
            RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL,
        );
        let mut bin_reads = Vec::new();
        for bin_table in result.bin_tables.iter().flatten() {
            builder = builder.read(*bin_table);
            bin_reads.push(*bin_table);
        }
        builder.bind(move |context, resources| {
            let pipeline = match manager.get_pipeline(pso) {
                Some(pipeline) => pipeline,
                None => return,
            };
            context.set_compute_root_signature(pipeline.root_signature());
            context.set_pipeline_state(&pipeline);
            context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

            let mut srvs = vec![ResourceView::Buffer(stats.lock().buffer().srv())];
            for bin_table in &bin_reads {
                srvs.push(ResourceView::Buffer(resources.get_buffer_srv(*bin_table)));
            }
            context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);
            context.dispatch_1d(1);
        });
    }

    /// Copy the stats counters into the readback ring; call once per frame
    /// after the last culling pass.
    pub fn copy_stats(&self, graph: &mut RenderGraph) {
        let stats = Arc::clone(&self.stats);
        graph
            .add_pass("Copy Stats", RGPassFlags::COPY | RGPassFlags::NEVER_CULL)
            .bind(move |context, _resources| {
                stats.lock().copy_to_readback(context);
            });
    }

    /// Expand the visibility buffer into a human-readable view of instance /
    /// meshlet / triangle identity or overdraw.
    pub fn render_visibility_debug(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        result: &RasterResult,
        mode: VisibilityDebugMode,
        target: &mut RenderGraphResource,
    ) {
        let (visibility, visible_meshlets) = match (result.visibility_buffer, result.visible_meshlets)
        {
            (Some(visibility), Some(visible)) => (visibility, visible),
            _ => return,
        };
        let target_desc = match graph.texture_desc(*target) {
            Some(desc) => desc,
            None => return,
        };

        let manager = Arc::clone(&self.pipeline_manager);
        let pso = self.visibility_debug_render;
        let view = Arc::clone(view);
        let debug_data = result.debug_data;
        let target_h = *target;

        let mut builder = graph
            .add_pass("Visibility Debug Render", RGPassFlags::COMPUTE)
            .read(visibility)
            .read(visible_meshlets)
            .write(target);
        if let Some(debug) = debug_data {
            builder = builder.read(debug);
        }
        builder.bind(move |context, resources| {
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
                mode: u32,
            }
            context.set_root_constants(
                ROOT_SLOT_CONSTANTS,
                &Constants {
                    mode: match mode {
                        VisibilityDebugMode::Instances => 0,
                        VisibilityDebugMode::Meshlets => 1,
                        VisibilityDebugMode::Triangles => 2,
                        VisibilityDebugMode::Overdraw => 3,
                    },
                },
            );

            context.bind_resources(
                ROOT_SLOT_UAV_TABLE,
                &[ResourceView::Texture(resources.get_uav(target_h))],
            );
            let mut srvs = vec![
                ResourceView::Texture(resources.get_srv(visibility)),
                ResourceView::Buffer(resources.get_buffer_srv(visible_meshlets)),
            ];
            if let Some(debug) = debug_data {
                srvs.push(ResourceView::Texture(resources.get_srv(debug)));
            }
            context.bind_resources(ROOT_SLOT_SRV_TABLE, &srvs);

            context.dispatch(
                divide_and_round_up(target_desc.width, 8),
                divide_and_round_up(target_desc.height, 8),
                1,
            );
        });
    }
}

/// Mutable graph handles threaded through the two phases.
struct CullBuffers<'a> {
    candidate_meshlets: &'a mut RenderGraphResource,
    candidate_counter: &'a mut RenderGraphResource,
    occluded_instances: &'a mut RenderGraphResource,
    occluded_counter: &'a mut RenderGraphResource,
    visible_meshlets: &'a mut RenderGraphResource,
    visible_counter: &'a mut RenderGraphResource,
    depth: &'a mut RenderGraphResource,
    hzb: &'a mut RenderGraphResource,
}
