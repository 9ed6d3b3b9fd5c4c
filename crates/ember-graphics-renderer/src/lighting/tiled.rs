//! Tiled light culling: the screen-space alternative to clusters.
//!
//! 16x16 pixel tiles, each with separate light lists for opaque and
//! transparent geometry. The tile depth bounds come from the depth buffer,
//! so transparent geometry (which can sit in front of any opaque depth)
//! keeps the looser near-bound list.

use std::sync::Arc;

use ember_graphics_api::{
    Buffer, BufferDesc, ComputePipelineDef, DeviceContext, Format, GfxResult, PipelineDef,
    ResourceView, RootSignatureDef, ShaderRef, TextureDesc, ROOT_SLOT_SRV_TABLE,
    ROOT_SLOT_UAV_TABLE, ROOT_SLOT_VIEW_CBV,
};
use ember_math::{divide_and_round_up, UVec2};

use crate::core::render_graph::{RGPassFlags, RenderGraph, RenderGraphResource};
use crate::core::render_view::RenderViewRef;
use crate::resources::{PipelineHandle, PipelineManager};

pub const TILE_SIZE: u32 = 16;
pub const MAX_LIGHTS_PER_TILE: u32 = 32;

pub fn tile_dimensions(viewport: UVec2) -> UVec2 {
    UVec2::new(
        divide_and_round_up(viewport.x, TILE_SIZE),
        divide_and_round_up(viewport.y, TILE_SIZE),
    )
}

#[derive(Clone, Copy, Default)]
pub struct TiledLightingResult {
    pub light_grid_opaque: Option<RenderGraphResource>,
    pub light_grid_transparent: Option<RenderGraphResource>,
    pub light_index_list_opaque: Option<RenderGraphResource>,
    pub light_index_list_transparent: Option<RenderGraphResource>,
}

pub struct TiledLighting {
    pipeline_manager: Arc<PipelineManager>,
    viewport: UVec2,
    light_index_counter: Buffer,
    cull_lights: PipelineHandle,
}

impl TiledLighting {
    pub fn new(
        device: &DeviceContext,
        pipeline_manager: &Arc<PipelineManager>,
        viewport: UVec2,
    ) -> GfxResult<Self> {
        Ok(Self {
            pipeline_manager: Arc::clone(pipeline_manager),
            viewport,
            // Two counters: opaque and transparent list heads.
            light_index_counter: device.create_buffer(
                BufferDesc::create_structured(2, 4),
                "Tiles.LightIndexCounter",
            )?,
            cull_lights: pipeline_manager.register_pipeline(PipelineDef::Compute(
                ComputePipelineDef {
                    shader: ShaderRef::new("TiledLightCulling.hlsl", "CSMain")
                        .with_define("BLOCK_SIZE", TILE_SIZE)
                        .with_define("MAX_LIGHT_DENSITY", MAX_LIGHTS_PER_TILE),
                    root_signature: RootSignatureDef::default(),
                },
            )),
        })
    }

    pub fn on_resize(&mut self, viewport: UVec2) {
        self.viewport = viewport;
    }

    /// One compute pass producing both tile grids and their index lists.
    pub fn execute(
        &self,
        graph: &mut RenderGraph,
        view: &RenderViewRef,
        depth: RenderGraphResource,
    ) -> TiledLightingResult {
        let tiles = tile_dimensions(self.viewport);
        let tile_count = u64::from(tiles.x) * u64::from(tiles.y);

        let mut counter = graph.import_buffer("Tiles.LightIndexCounter", &self.light_index_counter);
        let mut grid_opaque = graph.create(
            "Tiles.LightGridOpaque",
            TextureDesc::create_2d(tiles.x, tiles.y, Format::R32G32_UINT),
        );
        let mut grid_transparent = graph.create(
            "Tiles.LightGridTransparent",
            TextureDesc::create_2d(tiles.x, tiles.y, Format::R32G32_UINT),
        );
        let mut list_opaque = graph.create(
            "Tiles.LightIndexListOpaque",
            BufferDesc::create_structured(tile_count * u64::from(MAX_LIGHTS_PER_TILE), 4),
        );
        let mut list_transparent = graph.create(
            "Tiles.LightIndexListTransparent",
            BufferDesc::create_structured(tile_count * u64::from(MAX_LIGHTS_PER_TILE), 4),
        );

        let manager = Arc::clone(&self.pipeline_manager);
        let pso = self.cull_lights;
        let view = Arc::clone(view);
        let counter_h = counter;
        let grid_opaque_h = grid_opaque;
        let grid_transparent_h = grid_transparent;
        let list_opaque_h = list_opaque;
        let list_transparent_h = list_transparent;

        graph
            .add_pass("Tiled Light Culling", RGPassFlags::COMPUTE)
            .read(depth)
            .write(&mut counter)
            .write(&mut grid_opaque)
            .write(&mut grid_transparent)
            .write(&mut list_opaque)
            .write(&mut list_transparent)
            .bind(move |context, resources| {
                // The append positions start from zero each frame.
                context.clear_uav_uint(resources.get_buffer(counter_h), [0; 4]);

                let pipeline = match manager.get_pipeline(pso) {
                    Some(pipeline) => pipeline,
                    None => return,
                };
                context.set_compute_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);
                context.set_root_cbv(ROOT_SLOT_VIEW_CBV, &view.uniforms());

                context.bind_resources(
                    ROOT_SLOT_UAV_TABLE,
                    &[
                        ResourceView::Buffer(resources.get_buffer_uav(counter_h)),
                        ResourceView::Buffer(resources.get_buffer_uav(list_opaque_h)),
                        ResourceView::Buffer(resources.get_buffer_uav(list_transparent_h)),
                        ResourceView::Texture(resources.get_uav(grid_opaque_h)),
                        ResourceView::Texture(resources.get_uav(grid_transparent_h)),
                    ],
                );
                context.bind_resources(
                    ROOT_SLOT_SRV_TABLE,
                    &[
                        ResourceView::Texture(resources.get_srv(depth)),
                        ResourceView::Buffer(view.scene_buffers.lights.srv()),
                    ],
                );

                // One thread group per tile.
                let tiles = tile_dimensions(
                    UVec2::new(view.viewport.x, view.viewport.y),
                );
                context.dispatch(tiles.x, tiles.y, 1);
            });

        TiledLightingResult {
            light_grid_opaque: Some(grid_opaque),
            light_grid_transparent: Some(grid_transparent),
            light_index_list_opaque: Some(list_opaque),
            light_index_list_transparent: Some(list_transparent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_grid_covers_the_viewport() {
        assert_eq!(tile_dimensions(UVec2::new(1920, 1080)), UVec2::new(120, 68));
        assert_eq!(tile_dimensions(UVec2::new(16, 16)), UVec2::new(1, 1));
        assert_eq!(tile_dimensions(UVec2::new(17, 16)), UVec2::new(2, 1));
    }
}
