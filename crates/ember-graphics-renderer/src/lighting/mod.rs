mod clustered;
mod depth_bounds;
mod shadows;
mod tiled;

pub use clustered::{
    cluster_depth_bounds, cluster_dimensions, compute_cluster_bounds, cull_lights_cpu,
    volume_grid_params, ClusteredLighting, ClusteredLightingResult, CVAR_VOLUMETRIC_FOG,
    LIGHT_CLUSTERS_NUM_Z, LIGHT_CLUSTER_TEXEL_SIZE, MAX_LIGHTS_PER_CLUSTER,
    VOLUMETRIC_FROXEL_TEXEL_SIZE, VOLUMETRIC_NUM_Z_SLICES,
};
pub use depth_bounds::DepthBoundsReadback;
pub use shadows::{
    compute_cascade_splits, directional_cascade_matrix, ShadowPartition, ShadowPartitioner,
    ShadowSettings, ShadowView, CVAR_PSSM_FACTOR, CVAR_SDSM, CVAR_SHADOW_CASCADES,
    CVAR_STABILIZE_CASCADES, MAX_CASCADES,
};
pub use tiled::{tile_dimensions, TiledLighting, TiledLightingResult, MAX_LIGHTS_PER_TILE, TILE_SIZE};
