//! Hierarchical depth pyramid.
//!
//! Reverse-Z is in use everywhere: depth 1 is the near plane and 0 the far
//! plane, so the reduction takes the minimum to stay conservative for
//! occlusion tests.

use std::sync::Arc;

use ember_graphics_api::{
    ComputePipelineDef, Format, PipelineDef, ResourceView, RootSignatureDef, ShaderRef,
    TextureDesc, ROOT_SLOT_CONSTANTS, ROOT_SLOT_SRV_TABLE, ROOT_SLOT_UAV_TABLE,
};
use ember_math::{divide_and_round_up, next_power_of_two, UVec2};

use crate::core::render_graph::{RGPassFlags, RenderGraph, RenderGraphResource};
use crate::resources::{PipelineHandle, PipelineManager};

/// Base dimensions and mip count of the pyramid for a viewport: half the
/// next power of two in each axis, reduced down to a single texel.
pub fn hzb_dimensions(viewport: UVec2) -> (UVec2, u32) {
    let width = (next_power_of_two(viewport.x) >> 1).max(1);
    let height = (next_power_of_two(viewport.y) >> 1).max(1);
    let mip_count = 32 - width.max(height).leading_zeros();
    (UVec2::new(width, height), mip_count)
}

pub fn hzb_desc(viewport: UVec2) -> TextureDesc {
    let (base, mip_count) = hzb_dimensions(viewport);
    TextureDesc::create_2d_with_mips(base.x, base.y, Format::R16_FLOAT, mip_count)
}

pub struct HzbPipelines {
    init: PipelineHandle,
    downsample: PipelineHandle,
}

impl HzbPipelines {
    pub fn new(pipeline_manager: &PipelineManager) -> Self {
        Self {
            init: pipeline_manager.register_pipeline(PipelineDef::Compute(ComputePipelineDef {
                shader: ShaderRef::new("HZB.hlsl", "HZBInitCS"),
                root_signature: RootSignatureDef::default(),
            })),
            downsample: pipeline_manager.register_pipeline(PipelineDef::Compute(
                ComputePipelineDef {
                    shader: ShaderRef::new("HZB.hlsl", "HZBCreateCS"),
                    root_signature: RootSignatureDef::default(),
                },
            )),
        }
    }
}

/// Schedule the two passes that (re)build the pyramid from `depth`.
/// `depth` must be shader-readable on entry; every mip of `hzb` ends
/// shader-readable.
pub fn build_hzb(
    graph: &mut RenderGraph,
    pipeline_manager: &Arc<PipelineManager>,
    pipelines: &HzbPipelines,
    depth: RenderGraphResource,
    hzb: &mut RenderGraphResource,
) {
    let hzb_desc = match graph.texture_desc(*hzb) {
        Some(desc) => desc,
        None => return,
    };
    let hzb_dimensions = UVec2::new(hzb_desc.width, hzb_desc.height);
    let mip_count = hzb_desc.mip_count;

    // Fetch-and-reduce into mip 0.
    {
        let manager = Arc::clone(pipeline_manager);
        let init = pipelines.init;
        let hzb_handle = *hzb;
        graph
            .add_pass("HZB Create", RGPassFlags::COMPUTE)
            .read(depth)
            .write(hzb)
            .bind(move |context, resources| {
                let pipeline = match manager.get_pipeline(init) {
                    Some(pipeline) => pipeline,
                    None => return,
                };
                context.set_compute_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);

                #[repr(C)]
                #[derive(Clone, Copy)]
                struct Constants {
                    dimensions_inv: [f32; 2],
                }
                context.set_root_constants(
                    ROOT_SLOT_CONSTANTS,
                    &Constants {
                        dimensions_inv: [
                            1.0 / hzb_dimensions.x as f32,
                            1.0 / hzb_dimensions.y as f32,
                        ],
                    },
                );
                context.bind_resources(
                    ROOT_SLOT_UAV_TABLE,
                    &[ResourceView::Texture(resources.get_uav_mip(hzb_handle, 0))],
                );
                context.bind_resources(
                    ROOT_SLOT_SRV_TABLE,
                    &[ResourceView::Texture(resources.get_srv(depth))],
                );
                context.dispatch(
                    divide_and_round_up(hzb_dimensions.x, 16),
                    divide_and_round_up(hzb_dimensions.y, 16),
                    1,
                );
            });
    }

    // Counter-based single-dispatch reduction of mips 1..N: each workgroup
    // reduces a 64x64 tile and the last group alive carries the tail mips.
    {
        let mut spd_counter = graph.create(
            "HZB.SPDCounter",
            ember_graphics_api::BufferDesc::create_structured(1, 4),
        );
        let manager = Arc::clone(pipeline_manager);
        let downsample = pipelines.downsample;
        let hzb_handle_read = *hzb;
        let counter_handle = spd_counter;
        graph
            .add_pass("HZB Mips", RGPassFlags::COMPUTE)
            .write(hzb)
            .write(&mut spd_counter)
            .bind(move |context, resources| {
                context.clear_uav_uint(resources.get_buffer(counter_handle), [0; 4]);

                let pipeline = match manager.get_pipeline(downsample) {
                    Some(pipeline) => pipeline,
                    None => return,
                };
                context.set_compute_root_signature(pipeline.root_signature());
                context.set_pipeline_state(&pipeline);

                let work_groups = UVec2::new(
                    divide_and_round_up(hzb_dimensions.x, 64),
                    divide_and_round_up(hzb_dimensions.y, 64),
                );

                #[repr(C)]
                #[derive(Clone, Copy)]
                struct Constants {
                    num_mips: u32,
                    num_work_groups: u32,
                    work_group_offset: [u32; 2],
                }
                context.set_root_constants(
                    ROOT_SLOT_CONSTANTS,
                    &Constants {
                        num_mips: mip_count - 1,
                        num_work_groups: work_groups.x * work_groups.y,
                        work_group_offset: [0, 0],
                    },
                );

                let mut uavs = vec![ResourceView::Buffer(
                    resources.get_buffer_uav(counter_handle),
                )];
                for mip in 0..mip_count {
                    uavs.push(ResourceView::Texture(
                        resources.get_uav_mip(hzb_handle_read, mip),
                    ));
                }
                context.bind_resources(ROOT_SLOT_UAV_TABLE, &uavs);
                context.dispatch(work_groups.x, work_groups.y, 1);
            });
    }
}

/// CPU mirror of the pyramid, fed by depth readbacks. The culling shaders
/// and the debug tooling share this exact reduction.
#[derive(Clone, Debug)]
pub struct DepthPyramid {
    pub base_width: u32,
    pub base_height: u32,
    /// `mips[m]` is `base >> m` texels, clamped to 1, row-major.
    pub mips: Vec<Vec<f32>>,
}

impl DepthPyramid {
    /// Reduce a depth buffer of `width` x `height` into a pyramid sized per
    /// [`hzb_dimensions`]. Each base texel takes the minimum (farthest under
    /// reverse-Z) of the source texels it covers.
    pub fn build_from_depth(depth: &[f32], width: u32, height: u32) -> Self {
        assert_eq!(depth.len(), (width * height) as usize);
        let (base, mip_count) = hzb_dimensions(UVec2::new(width, height));

        let mut mip0 = vec![0.0f32; (base.x * base.y) as usize];
        for y in 0..base.y {
            for x in 0..base.x {
                // Source rect covered by this output texel.
                let x0 = x * width / base.x;
                let x1 = (((x + 1) * width).div_ceil(base.x)).min(width);
                let y0 = y * height / base.y;
                let y1 = (((y + 1) * height).div_ceil(base.y)).min(height);

                let mut value = f32::MAX;
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        value = value.min(depth[(sy * width + sx) as usize]);
                    }
                }
                mip0[(y * base.x + x) as usize] = value;
            }
        }

        let mut mips = vec![mip0];
        for mip in 1..mip_count {
            let prev_w = (base.x >> (mip - 1)).max(1);
            let prev_h = (base.y >> (mip - 1)).max(1);
            let w = (base.x >> mip).max(1);
            let h = (base.y >> mip).max(1);
            let prev = &mips[mip as usize - 1];

            let mut data = vec![0.0f32; (w * h) as usize];
            for y in 0..h {
                for x in 0..w {
                    let mut value = f32::MAX;
                    for dy in 0..2u32 {
                        for dx in 0..2u32 {
                            let sx = (x * 2 + dx).min(prev_w - 1);
                            let sy = (y * 2 + dy).min(prev_h - 1);
                            value = value.min(prev[(sy * prev_w + sx) as usize]);
                        }
                    }
                    data[(y * w + x) as usize] = value;
                }
            }
            mips.push(data);
        }

        Self {
            base_width: base.x,
            base_height: base.y,
            mips,
        }
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn mip_dimensions(&self, mip: u32) -> UVec2 {
        UVec2::new(
            (self.base_width >> mip).max(1),
            (self.base_height >> mip).max(1),
        )
    }

    /// Point-sample a mip at normalized coordinates.
    pub fn sample(&self, mip: u32, u: f32, v: f32) -> f32 {
        let dims = self.mip_dimensions(mip);
        let x = ((u * dims.x as f32) as u32).min(dims.x - 1);
        let y = ((v * dims.y as f32) as u32).min(dims.y - 1);
        self.mips[mip as usize][(y * dims.x + x) as usize]
    }

    /// Minimum depth over the up-to-2x2 footprint of a normalized rectangle
    /// at the mip whose texels cover it.
    pub fn min_depth_in_rect(&self, min_uv: (f32, f32), max_uv: (f32, f32)) -> f32 {
        let width_px = (max_uv.0 - min_uv.0) * self.base_width as f32;
        let height_px = (max_uv.1 - min_uv.1) * self.base_height as f32;
        let mip = (width_px.max(height_px).max(1.0).log2().ceil() as u32)
            .min(self.mip_count() - 1);

        self.sample(mip, min_uv.0, min_uv.1)
            .min(self.sample(mip, max_uv.0, min_uv.1))
            .min(self.sample(mip, min_uv.0, max_uv.1))
            .min(self.sample(mip, max_uv.0, max_uv.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_are_half_next_pow2() {
        let (base, mips) = hzb_dimensions(UVec2::new(64, 64));
        assert_eq!(base, UVec2::new(32, 32));
        assert_eq!(mips, 6);

        let (base, mips) = hzb_dimensions(UVec2::new(1920, 1080));
        assert_eq!(base, UVec2::new(1024, 1024));
        assert_eq!(mips, 11);
    }

    #[test]
    fn reduction_is_conservative_min() {
        // A 64x64 depth buffer cleared to the far plane (0) with a square of
        // closer geometry at depth 0.75.
        let mut depth = vec![0.0f32; 64 * 64];
        for y in 16..48 {
            for x in 16..48 {
                depth[y * 64 + x] = 0.75;
            }
        }
        let pyramid = DepthPyramid::build_from_depth(&depth, 64, 64);
        assert_eq!(pyramid.mip_count(), 6);

        // Every texel at mip m bounds (from below) the source texels it
        // covers at mip m-1.
        for mip in 1..pyramid.mip_count() {
            let dims = pyramid.mip_dimensions(mip);
            let prev_dims = pyramid.mip_dimensions(mip - 1);
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let value = pyramid.mips[mip as usize][(y * dims.x + x) as usize];
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let sx = (x * 2 + dx).min(prev_dims.x - 1);
                            let sy = (y * 2 + dy).min(prev_dims.y - 1);
                            let source =
                                pyramid.mips[mip as usize - 1][(sy * prev_dims.x + sx) as usize];
                            assert!(value <= source);
                        }
                    }
                }
            }
        }

        // The top of a fully reduced pyramid holds the global minimum: the
        // clear value.
        let top = pyramid.mips.last().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0], 0.0);
    }

    #[test]
    fn fully_covered_buffer_reduces_to_geometry_depth() {
        let depth = vec![0.75f32; 64 * 64];
        let pyramid = DepthPyramid::build_from_depth(&depth, 64, 64);
        assert_eq!(pyramid.mips.last().unwrap()[0], 0.75);
    }
}
