//! Per-frame orchestration: takes the scene snapshot, drives the meshlet
//! rasterizer, shadow partitioner and light culling, and executes the
//! resulting render graph.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use ember_core::{CommandLine, ConsoleRegistry, CvarBool, CvarFloat, CvarInt};
use ember_graphics_api::{
    DeviceContext, DeviceDesc, Format, GfxError, GfxResult, TextureDesc,
};
use ember_math::{Mat4, UVec2, Vec3};

use crate::core::render_graph::{RenderGraph, RenderGraphResourcePool};
use crate::core::render_view::{RenderView, RenderViewRef};
use crate::gpu_renderer::{MeshletRasterizer, RasterContext, RasterMode, VisibilityDebugMode};
use crate::lighting::{
    ClusteredLighting, DepthBoundsReadback, ShadowPartitioner, ShadowSettings, TiledLighting,
    CVAR_SDSM,
};
use crate::resources::{PipelineManager, ScreenshotQueue};

pub static CVAR_TONEMAPPER: CvarInt = CvarInt::new("r.Tonemapper", 2);
pub static CVAR_EXPOSURE_MIN: CvarFloat = CvarFloat::new("r.Exposure.Min", -8.0);
pub static CVAR_EXPOSURE_MAX: CvarFloat = CvarFloat::new("r.Exposure.Max", 2.0);
pub static CVAR_BLOOM_THRESHOLD: CvarFloat = CvarFloat::new("r.Bloom.Threshold", 4.0);
pub static CVAR_BLOOM_MAX_BRIGHTNESS: CvarFloat = CvarFloat::new("r.Bloom.MaxBrightness", 8.0);
pub static CVAR_SSR_SAMPLES: CvarInt = CvarInt::new("r.SSRSamples", 8);
pub static CVAR_RAYTRACING: CvarBool = CvarBool::new("r.Raytracing", false);
pub static CVAR_WORK_GRAPH_CULLING: CvarBool = CvarBool::new("r.WorkGraph.Culling", false);
pub static CVAR_OCCLUSION_CULLING: CvarBool = CvarBool::new("r.OcclusionCulling", true);
pub static CVAR_CLUSTERED_LIGHTING: CvarBool = CvarBool::new("r.ClusteredLighting", true);
pub static CVAR_CULLING_STATS: CvarBool = CvarBool::new("r.CullingStats", false);
pub static CVAR_VISIBILITY_DEBUG: CvarBool = CvarBool::new("r.VisibilityDebugMode", false);

/// Register every renderer tweakable with the console and clamp the ones the
/// device cannot honor; their UI toggles stay off afterwards.
pub fn register_console_variables(device: &DeviceContext) {
    ConsoleRegistry::register_int(&CVAR_TONEMAPPER);
    ConsoleRegistry::register_float(&CVAR_EXPOSURE_MIN);
    ConsoleRegistry::register_float(&CVAR_EXPOSURE_MAX);
    ConsoleRegistry::register_float(&CVAR_BLOOM_THRESHOLD);
    ConsoleRegistry::register_float(&CVAR_BLOOM_MAX_BRIGHTNESS);
    ConsoleRegistry::register_int(&CVAR_SSR_SAMPLES);
    ConsoleRegistry::register_bool(&CVAR_RAYTRACING);
    ConsoleRegistry::register_bool(&CVAR_WORK_GRAPH_CULLING);
    ConsoleRegistry::register_bool(&CVAR_OCCLUSION_CULLING);
    ConsoleRegistry::register_bool(&CVAR_CLUSTERED_LIGHTING);
    ConsoleRegistry::register_bool(&CVAR_CULLING_STATS);
    ConsoleRegistry::register_bool(&crate::lighting::CVAR_VOLUMETRIC_FOG);
    ConsoleRegistry::register_bool(&CVAR_SDSM);
    ConsoleRegistry::register_bool(&crate::lighting::CVAR_STABILIZE_CASCADES);
    ConsoleRegistry::register_int(&crate::lighting::CVAR_SHADOW_CASCADES);
    ConsoleRegistry::register_float(&crate::lighting::CVAR_PSSM_FACTOR);

    let capabilities = device.capabilities();
    if !capabilities.raytracing && CVAR_RAYTRACING.get() {
        log::warn!("ray tracing not supported, forcing r.Raytracing off");
        CVAR_RAYTRACING.set(false);
    }
    if !capabilities.work_graphs && CVAR_WORK_GRAPH_CULLING.get() {
        log::warn!("work graphs not supported, forcing r.WorkGraph.Culling off");
        CVAR_WORK_GRAPH_CULLING.set(false);
    }
}

/// Translate the diagnostic command-line flags into a device description.
pub fn device_desc_from_command_line(command_line: &CommandLine) -> DeviceDesc {
    let debug_layer = command_line.get_bool("d3ddebug");
    let gpu_validation = command_line.get_bool("gpuvalidation");
    if command_line.get_bool("dred") {
        log::info!("device-removed diagnostics requested");
    }
    if command_line.get_bool("pix") {
        log::info!("frame-capture runtime attach requested");
    }
    if command_line.get_bool("warp") {
        log::info!("software adapter requested");
    }
    DeviceDesc {
        app_name: "ember".to_string(),
        enable_validation: debug_layer || gpu_validation,
        ..DeviceDesc::default()
    }
}

/// The renderer core. Owns the persistent per-view state and schedules a
/// frame's worth of passes on a fresh graph each call.
pub struct Renderer {
    device: DeviceContext,
    pipeline_manager: Arc<PipelineManager>,
    pool: RenderGraphResourcePool,

    viewport: UVec2,
    meshlet_rasterizer: Option<MeshletRasterizer>,
    raster_context: Option<RasterContext>,
    shadow_contexts: HashMap<u32, RasterContext>,

    shadow_partitioner: ShadowPartitioner,
    depth_bounds: DepthBoundsReadback,
    clustered: ClusteredLighting,
    tiled: TiledLighting,

    screenshots: ScreenshotQueue,
    screenshot_requested: bool,
    debug_target: ember_graphics_api::Texture,
}

impl Renderer {
    pub fn new(
        device: &DeviceContext,
        viewport: UVec2,
        screenshot_directory: &Path,
    ) -> GfxResult<Self> {
        let pipeline_manager = Arc::new(PipelineManager::new(device));

        // Mesh shading carries the whole GPU-driven path; without it the
        // renderer falls back to scheduling nothing for geometry.
        let meshlet_rasterizer = match MeshletRasterizer::new(device, &pipeline_manager) {
            Ok(rasterizer) => Some(rasterizer),
            Err(GfxError::UnsupportedCapability(capability)) => {
                log::warn!("{} unavailable, GPU-driven rendering disabled", capability);
                None
            }
            Err(error) => return Err(error),
        };
        let raster_context = meshlet_rasterizer
            .as_ref()
            .map(|_| RasterContext::new(device, viewport, RasterMode::VisibilityBuffer))
            .transpose()?;

        Ok(Self {
            device: device.clone(),
            pipeline_manager: Arc::clone(&pipeline_manager),
            pool: RenderGraphResourcePool::new(),
            viewport,
            meshlet_rasterizer,
            raster_context,
            shadow_contexts: HashMap::new(),
            shadow_partitioner: ShadowPartitioner::new(device),
            depth_bounds: DepthBoundsReadback::new(device, &pipeline_manager)?,
            clustered: ClusteredLighting::new(device, &pipeline_manager, viewport)?,
            tiled: TiledLighting::new(device, &pipeline_manager, viewport)?,
            screenshots: ScreenshotQueue::new(device, screenshot_directory),
            screenshot_requested: false,
            debug_target: device.create_texture(
                TextureDesc::create_render_target(viewport.x, viewport.y, Format::R8G8B8A8_UNORM),
                "DebugTarget",
            )?,
        })
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn pipeline_manager(&self) -> &Arc<PipelineManager> {
        &self.pipeline_manager
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    pub fn resize(&mut self, viewport: UVec2) -> GfxResult<()> {
        if viewport == self.viewport {
            return Ok(());
        }
        self.viewport = viewport;
        if let Some(context) = self.raster_context.as_mut() {
            context.resize(&self.device, viewport)?;
        }
        self.clustered.on_resize(viewport)?;
        self.tiled.on_resize(viewport);
        // Transients from the old viewport no longer alias anything useful.
        self.pool.clear(&self.device);

        let new_target = self.device.create_texture(
            TextureDesc::create_render_target(viewport.x, viewport.y, Format::R8G8B8A8_UNORM),
            "DebugTarget",
        )?;
        self.device
            .defer_release_texture(std::mem::replace(&mut self.debug_target, new_target));
        Ok(())
    }

    /// Capture the next presented frame to the screenshot directory.
    pub fn request_screenshot(&mut self) {
        self.screenshot_requested = true;
    }

    /// Build, schedule and submit one frame from the scene snapshot. The
    /// snapshot's lights get their shadow slots assigned before freezing.
    pub fn render_frame(&mut self, mut view: RenderView) -> GfxResult<u64> {
        // Shadow partition first so the snapshot carries the assignments.
        let settings = ShadowSettings::from_cvars();
        let depth_bounds = if CVAR_SDSM.get() {
            self.depth_bounds.latest()
        } else {
            (0.0, 1.0)
        };
        let view_projection_inv = view.view_projection_inv;
        let near = view.near_plane;
        let far = view.far_plane;
        let partition = self.shadow_partitioner.partition(
            &view_projection_inv,
            near,
            far,
            &settings,
            depth_bounds,
            &mut view.lights,
        )?;
        view.shadow_data = partition.data.clone();

        let view: RenderViewRef = Arc::new(view);
        let mut graph = RenderGraph::new(&self.device);

        let mut depth = graph.create(
            "Depth",
            TextureDesc::create_depth(self.viewport.x, self.viewport.y, Format::D32_FLOAT),
        );

        let mut raster_result = Default::default();
        if let (Some(rasterizer), Some(raster_context)) =
            (self.meshlet_rasterizer.as_ref(), self.raster_context.as_mut())
        {
            raster_context.enable_occlusion_culling = CVAR_OCCLUSION_CULLING.get();
            raster_context.use_work_graphs = CVAR_WORK_GRAPH_CULLING.get();
            raster_context.enable_debug = CVAR_VISIBILITY_DEBUG.get();
            raster_result = rasterizer.render(&mut graph, &view, raster_context, &mut depth);

            // Shadow maps render through the same machinery in depth-only
            // mode, one pass chain per shadow view.
            for shadow_view in &partition.views {
                let map = match self.shadow_partitioner.shadow_map(shadow_view.slot) {
                    Some(map) => map.clone(),
                    None => continue,
                };
                let map_size = map.definition().width;
                let shadow_context = match self.shadow_contexts.entry(map_size) {
                    std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        let mut context = RasterContext::new(
                            &self.device,
                            UVec2::splat(map_size),
                            RasterMode::Shadows,
                        )?;
                        // Shadow views have no persistent pyramid worth
                        // keeping; draw everything.
                        context.enable_occlusion_culling = false;
                        entry.insert(context)
                    }
                };

                let shadow_render_view: RenderViewRef = Arc::new(RenderView::new(
                    shadow_view.view_projection,
                    Mat4::IDENTITY,
                    shadow_view.view_projection,
                    Vec3::ZERO,
                    near,
                    far,
                    UVec2::splat(map_size),
                    view.frame_index,
                    view.batches.clone(),
                    Vec::new(),
                    view.scene_buffers.clone(),
                ));

                let mut shadow_depth =
                    graph.import_texture(&format!("ShadowMap{}", shadow_view.slot), &map);
                rasterizer.render(&mut graph, &shadow_render_view, shadow_context, &mut shadow_depth);
            }
        }

        // Light culling consumes the same snapshot; the tiled path needs the
        // final depth.
        if CVAR_CLUSTERED_LIGHTING.get() {
            self.clustered.execute(&mut graph, &view);
        } else {
            self.tiled.execute(&mut graph, &view, depth);
        }

        self.depth_bounds.schedule(&mut graph, &view, depth);

        if let Some(rasterizer) = self.meshlet_rasterizer.as_ref() {
            if CVAR_CULLING_STATS.get() {
                rasterizer.print_stats(&mut graph, &view, &raster_result);
            }
            rasterizer.copy_stats(&mut graph);

            if CVAR_VISIBILITY_DEBUG.get() || self.screenshot_requested {
                let mut debug_target = graph.import_texture("DebugTarget", &self.debug_target);
                rasterizer.render_visibility_debug(
                    &mut graph,
                    &view,
                    &raster_result,
                    VisibilityDebugMode::Meshlets,
                    &mut debug_target,
                );
                if self.screenshot_requested {
                    self.screenshot_requested = false;
                    self.screenshots.capture(&mut graph, debug_target)?;
                }
            }
        }

        let fence = graph.execute(&mut self.pool)?;

        if let Some(rasterizer) = self.meshlet_rasterizer.as_ref() {
            rasterizer.end_frame(fence);
        }
        self.depth_bounds.end_frame(fence);
        self.screenshots.notify_submitted(fence);
        self.screenshots.tick();
        self.device.tick_frame();

        Ok(fence)
    }
}
