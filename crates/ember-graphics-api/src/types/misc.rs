bitflags::bitflags! {
    /// The current state of a resource. When an operation references a
    /// resource it must be in the matching state; resources move between
    /// states through barriers.
    pub struct ResourceState: u32 {
        const UNDEFINED = 0;
        const RENDER_TARGET = 0x1;
        const UNORDERED_ACCESS = 0x2;
        const DEPTH_WRITE = 0x4;
        const DEPTH_READ = 0x8;
        const NON_PIXEL_SHADER_RESOURCE = 0x10;
        const PIXEL_SHADER_RESOURCE = 0x20;
        const SHADER_RESOURCE = 0x10 | 0x20;
        const INDIRECT_ARGUMENT = 0x40;
        const COPY_DST = 0x80;
        const COPY_SRC = 0x100;
        const RESOLVE_DST = 0x200;
        const RESOLVE_SRC = 0x400;
        const ACCELERATION_STRUCTURE = 0x800;
    }
}

/// Texel/element formats. Only the formats the renderer actually produces
/// or consumes are listed.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    R8G8B8A8_UNORM,
    R8G8B8A8_UNORM_SRGB,
    R16_FLOAT,
    R16G16_FLOAT,
    R16G16B16A16_FLOAT,
    R32_FLOAT,
    R32G32_FLOAT,
    R32G32B32A32_FLOAT,
    R8_UINT,
    R16_UINT,
    R32_UINT,
    R32G32_UINT,
    R11G11B10_FLOAT,
    R10G10B10A2_UNORM,
    D32_FLOAT,
    D32_FLOAT_S8_UINT,
    D16_UNORM,
    Unknown,
}

impl Format {
    pub fn has_depth(self) -> bool {
        matches!(self, Self::D32_FLOAT | Self::D32_FLOAT_S8_UINT | Self::D16_UNORM)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D32_FLOAT_S8_UINT)
    }

    /// Bytes per texel (per element for typed buffers).
    pub fn block_size(self) -> u64 {
        match self {
            Self::R8_UINT => 1,
            Self::R16_FLOAT | Self::R16_UINT | Self::D16_UNORM => 2,
            Self::R8G8B8A8_UNORM
            | Self::R8G8B8A8_UNORM_SRGB
            | Self::R16G16_FLOAT
            | Self::R32_FLOAT
            | Self::R32_UINT
            | Self::R11G11B10_FLOAT
            | Self::R10G10B10A2_UNORM
            | Self::D32_FLOAT => 4,
            Self::D32_FLOAT_S8_UINT => 5,
            Self::R32G32_FLOAT | Self::R32G32_UINT | Self::R16G16B16A16_FLOAT => 8,
            Self::R32G32B32A32_FLOAT => 16,
            Self::Unknown => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleCount {
    SampleCount1 = 1,
    SampleCount2 = 2,
    SampleCount4 = 4,
    SampleCount8 = 8,
}

impl Default for SampleCount {
    fn default() -> Self {
        Self::SampleCount1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOp {
    DontCare,
    Load,
    Clear,
}

impl Default for LoadOp {
    fn default() -> Self {
        Self::DontCare
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    DontCare,
    Store,
    Resolve,
}

impl Default for StoreOp {
    fn default() -> Self {
        Self::Store
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorClearValue(pub [f32; 4]);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthStencilClearValue {
    pub depth: f32,
    pub stencil: u8,
}

impl Default for DepthStencilClearValue {
    /// Reverse-Z clears depth to 0 (the far plane).
    fn default() -> Self {
        Self {
            depth: 0.0,
            stencil: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl Default for CompareOp {
    fn default() -> Self {
        Self::Never
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    None,
    Back,
    Front,
}

impl Default for CullMode {
    fn default() -> Self {
        Self::Back
    }
}
