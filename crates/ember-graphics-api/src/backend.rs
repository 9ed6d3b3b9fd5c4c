//! In-process backend: recorded command streams and immediate fence
//! completion. Stands in for the GPU backend service, which is out of scope;
//! the recorded stream is inspectable, which is what headless runs and tests
//! key off.

use crate::{IndirectOp, ResourceState};

/// One recorded command. Payloads carry stable resource/pipeline ids plus the
/// arguments that matter for validating a stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BeginLabel(String),
    EndLabel,

    TransitionTexture {
        texture_id: u64,
        mip: Option<u8>,
        src_state: ResourceState,
        dst_state: ResourceState,
    },
    TransitionBuffer {
        buffer_id: u64,
        src_state: ResourceState,
        dst_state: ResourceState,
    },
    UavBarrier {
        resource_id: Option<u64>,
    },

    BeginRenderPass {
        color_target_ids: Vec<u64>,
        depth_target_id: Option<u64>,
    },
    EndRenderPass,

    SetGraphicsRootSignature {
        signature_id: u64,
    },
    SetComputeRootSignature {
        signature_id: u64,
    },
    SetPipeline {
        pipeline_id: u64,
    },
    SetProgram {
        state_object_id: u64,
        backing_buffer_id: u64,
        initialize: bool,
    },
    SetRootConstants {
        slot: u32,
        data: Vec<u8>,
    },
    SetRootCbv {
        slot: u32,
        data: Vec<u8>,
    },
    BindResources {
        slot: u32,
        resource_ids: Vec<u64>,
    },
    SetStencilRef {
        value: u32,
    },

    Dispatch {
        group_count: [u32; 3],
    },
    DispatchMesh {
        group_count: [u32; 3],
    },
    DispatchGraph {
        entry_point: u32,
        record_count: u32,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
        instance_count: u32,
    },
    ExecuteIndirect {
        op: IndirectOp,
        max_count: u32,
        args_buffer_id: u64,
        args_offset: u64,
    },

    CopyBuffer {
        src_id: u64,
        dst_id: u64,
        size: u64,
    },
    CopyTexture {
        src_id: u64,
        dst_id: u64,
    },
    CopyTextureToBuffer {
        src_id: u64,
        dst_id: u64,
    },
    ResolveTexture {
        src_id: u64,
        dst_id: u64,
    },
    ClearUavUint {
        resource_id: u64,
        values: [u32; 4],
    },
    ClearUavFloat {
        resource_id: u64,
        values: [f32; 4],
    },
    FillBuffer {
        buffer_id: u64,
        offset: u64,
        size: u64,
        value: u32,
    },
}

/// A submitted command stream and the fence value that signals its
/// completion.
#[derive(Debug)]
pub struct Submission {
    pub fence: u64,
    pub commands: Vec<Command>,
}
