//! Explicit graphics device abstraction.
//!
//! Resources carry explicit states moved through barriers, command contexts
//! record one submission each, and the device tracks completion with
//! monotonically increasing fence values. The backend in this crate executes
//! in-process and records the submitted streams; real GPU backends are
//! separate services with the same surface.

// crate-specific lint exceptions:
#![allow(clippy::new_without_default)]

pub mod backend;
mod buffer;
mod command_context;
mod device_context;
mod error;
mod pipeline;
mod texture;
mod types;

pub use buffer::{Buffer, BufferDesc, BufferView, BufferViewDef, ResourceView};
pub use command_context::{
    ColorRenderTargetBinding, CommandContext, DepthStencilRenderTargetBinding, TransientAllocation,
};
pub use device_context::{
    DeviceCapabilities, DeviceContext, DeviceDesc, MAX_IN_FLIGHT_FRAMES,
};
pub use error::{GfxError, GfxResult};
pub use pipeline::{
    CommandSignature, ComputePipelineDef, DepthState, GraphicsPipelineDef, IndirectOp, Pipeline,
    PipelineDef, PipelineType, RootSignature, RootSignatureDef, ShaderRef, StateObject,
    StateObjectDef, MAX_ROOT_CONSTANT_DWORDS, ROOT_SLOT_CONSTANTS, ROOT_SLOT_SRV_TABLE,
    ROOT_SLOT_UAV_TABLE, ROOT_SLOT_VIEW_CBV,
};
pub use texture::{Texture, TextureDesc, TextureKind, TextureView, TextureViewDef};
pub use types::*;
