//! Scene depth bounds readback feeding the sample-distribution cascade
//! splits. The reduction result is consumed one or more frames later; until
//! the first readback completes the full [0, 1] range is reported.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ember_graphics_api::{
    ComputePipelineDef, DeviceContext, GfxResult, PipelineDef, ResourceView, RootSignatureDef,
    ShaderRef, ROOT_SLOT_SRV_TABLE, ROOT_SLOT_UAV_TABLE, ROOT_SLOT_VIEW_CBV,
};
use ember_math::divide_and_round_up;
use parking_lot::Mutex;

use crate::core::render_graph::{RGPassFlags, RenderGraph, RenderGraphResource};
use crate::core::render_view::RenderViewRef;
use crate::resources::{GpuBufferWithReadback, PipelineHandle, PipelineManager};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
struct DepthBounds {
    min: f32,
    max: f32,
}

pub struct DepthBoundsReadback {
    device: DeviceContext,
    pipeline_manager: Arc<PipelineManager>,
    reduce: PipelineHandle,
    readback: Arc<Mutex<GpuBufferWithReadback>>,
}

impl DepthBoundsReadback {
    pub fn new(device: &DeviceContext, pipeline_manager: &Arc<PipelineManager>) -> GfxResult<Self> {
        Ok(Self {
            device: device.clone(),
            pipeline_manager: Arc::clone(pipeline_manager),
            reduce: pipeline_manager.register_pipeline(PipelineDef::Compute(ComputePipelineDef {
                shader: ShaderRef::new("ReduceDepth.hlsl", "ReduceDepthCS"),
                root_signature: RootSignatureDef::default(),
            })),
            readback: Arc::new(Mutex::new(GpuBufferWithReadback::new(
                device,
                "DepthBounds",
                std::mem::size_of::<DepthBounds>() as u64,
            )?)),
        })
    }

    /// Reduce the depth target to a normalized [min, max] pair and queue the
    /// copy into the readback ring.
    pub fn schedule(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        depth: RenderGraphResource,
    ) {
        let depth_desc = match graph.texture_desc(depth) {
            Some(desc) => desc,
            None => return,
        };

        let manager = Arc::clone(&self.pipeline_manager);
        let readback = Arc::clone(&self.readback);
        let pso = self.reduce;
        let view = Arc::clone(view);

        graph
            .add_pass(
                "Depth Bounds Reduce",
                RGPassFlags::COMPUTE | RGPassFlags::NEVER_CULL,
            )
            .read(depth)
            .bind(move |context, resources| {
                let pipeline = match manager.get_pipeline(pso) {
                    Some(pipeline) => pipeline,
                    None => return,
                };
                let mut readback = readback.lock();
                readback.clear(context);

                context.set_compute_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);
                context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());
                context.bind_resources(
                    ROOT_SLOT_UAV_TABLE,
                    &[ResourceView::Buffer(readback.buffer().uav())],
                );
                context.bind_resources(
                    ROOT_SLOT_SRV_TABLE,
                    &[ResourceView::Texture(resources.get_srv(depth))],
                );
                context.dispatch(
                    divide_and_round_up(depth_desc.width, 16),
                    divide_and_round_up(depth_desc.height, 16),
                    1,
                );

                readback.copy_to_readback(context);
            });
    }

    /// Called once per frame with the submission fence.
    pub fn end_frame(&self, fence: u64) {
        self.readback.lock().end_frame(fence);
    }

    /// Latest completed bounds, `(0, 1)` until one arrives.
    pub fn latest(&self) -> (f32, f32) {
        match self.readback.lock().read_latest::<DepthBounds>(&self.device) {
            Some(bounds) if bounds.max > bounds.min => (bounds.min, bounds.max),
            _ => (0.0, 1.0),
        }
    }
}
