mod blackboard;
mod render_graph;
mod resource_pool;

pub use blackboard::Blackboard;
pub use render_graph::{
    DepthStencilAccess, ExportSlot, GraphError, RGPassFlags, RenderGraph, RenderGraphPassBuilder,
    RenderGraphResource, RenderGraphResourceDesc, RenderGraphResources, RenderTargetAccess,
};
pub use resource_pool::RenderGraphResourcePool;
