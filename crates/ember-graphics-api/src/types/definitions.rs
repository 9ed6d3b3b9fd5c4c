bitflags::bitflags! {
    pub struct ResourceUsage: u16 {
        // buffer
        const AS_CONST_BUFFER = 0x0001;
        // buffer/texture
        const AS_SHADER_RESOURCE = 0x0002;
        // buffer/texture
        const AS_UNORDERED_ACCESS = 0x0004;
        // texture
        const AS_RENDER_TARGET = 0x0008;
        // texture
        const AS_DEPTH_STENCIL = 0x0010;
        // buffer
        const AS_INDIRECT_ARGS = 0x0020;
        // buffer, CPU-readable
        const AS_READBACK = 0x0040;
        // buffer
        const AS_ACCELERATION_STRUCTURE = 0x0080;
        // buffer/texture
        const AS_TRANSFERABLE = 0x0100;
        // meta
        const BUFFER_ONLY_USAGE_FLAGS =
            Self::AS_CONST_BUFFER.bits|
            Self::AS_INDIRECT_ARGS.bits|
            Self::AS_READBACK.bits|
            Self::AS_ACCELERATION_STRUCTURE.bits;
        const TEXTURE_ONLY_USAGE_FLAGS =
            Self::AS_RENDER_TARGET.bits|
            Self::AS_DEPTH_STENCIL.bits;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GPUViewType {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    RenderTarget,
    DepthStencil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaneSlice {
    Default,
    Depth,
    Stencil,
}

/// Which type of queue a submission targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}
