mod hzb;
mod meshlet_rasterizer;
mod occlusion;

pub use hzb::{build_hzb, hzb_desc, hzb_dimensions, DepthPyramid, HzbPipelines};
pub use meshlet_rasterizer::{
    MeshletRasterizer, PipelineBin, RasterContext, RasterMode, RasterPhase, RasterResult,
    VisibilityDebugMode, CULL_INSTANCE_THREAD_GROUP_SIZE, CULL_MESHLET_THREAD_GROUP_SIZE,
    MAX_NUM_INSTANCES, MAX_NUM_MESHLETS, NUM_RASTER_BINS,
};
pub use occlusion::{
    cull_instance, cull_meshlet, is_occluded, meshlet_cone_culled, project_sphere,
    splat_sphere_depth, CullResult, ScreenBounds,
};
