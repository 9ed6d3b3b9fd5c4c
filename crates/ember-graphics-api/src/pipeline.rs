use std::sync::Arc;

use crate::{CompareOp, CullMode, Format, SampleCount};

/// Reference to a shader entry point, resolved by the out-of-process shader
/// pipeline. Compilation itself is a service this crate does not provide.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderRef {
    pub path: String,
    pub entry_point: String,
    pub defines: Vec<(String, String)>,
}

impl ShaderRef {
    pub fn new(path: &str, entry_point: &str) -> Self {
        Self {
            path: path.to_string(),
            entry_point: entry_point.to_string(),
            defines: Vec::new(),
        }
    }

    pub fn with_define(mut self, key: &str, value: impl ToString) -> Self {
        self.defines.push((key.to_string(), value.to_string()));
        self
    }
}

/// Root parameter layout shared by every pipeline: inline constants in
/// slot 0, the view constant buffer in slot 1, then UAV / SRV tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootSignatureDef {
    /// Inline root constants, at most 18 dwords.
    pub push_constant_dwords: u32,
    pub num_constant_buffers: u32,
}

impl Default for RootSignatureDef {
    fn default() -> Self {
        Self {
            push_constant_dwords: 18,
            num_constant_buffers: 1,
        }
    }
}

pub const ROOT_SLOT_CONSTANTS: u32 = 0;
pub const ROOT_SLOT_VIEW_CBV: u32 = 1;
pub const ROOT_SLOT_UAV_TABLE: u32 = 2;
pub const ROOT_SLOT_SRV_TABLE: u32 = 3;
pub const MAX_ROOT_CONSTANT_DWORDS: u32 = 18;

struct RootSignatureInner {
    id: u64,
    def: RootSignatureDef,
}

#[derive(Clone)]
pub struct RootSignature {
    inner: Arc<RootSignatureInner>,
}

impl RootSignature {
    pub(crate) fn new(id: u64, def: RootSignatureDef) -> Self {
        assert!(def.push_constant_dwords <= MAX_ROOT_CONSTANT_DWORDS);
        Self {
            inner: Arc::new(RootSignatureInner { id, def }),
        }
    }

    pub fn definition(&self) -> &RootSignatureDef {
        &self.inner.def
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl PartialEq for RootSignature {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineType {
    Graphics,
    Compute,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DepthState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_test_enable: bool,
    pub stencil_write_mask: u8,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Never,
            stencil_test_enable: false,
            stencil_write_mask: 0xFF,
        }
    }
}

impl DepthState {
    /// Reverse-Z depth testing: greater passes.
    pub fn reverse_z(write: bool) -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: write,
            depth_compare_op: CompareOp::Greater,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDef {
    pub vertex_shader: Option<ShaderRef>,
    pub amplification_shader: Option<ShaderRef>,
    pub mesh_shader: Option<ShaderRef>,
    pub pixel_shader: Option<ShaderRef>,
    pub root_signature: RootSignatureDef,
    pub depth_state: DepthState,
    pub cull_mode: CullMode,
    pub color_formats: Vec<Format>,
    pub depth_stencil_format: Option<Format>,
    pub sample_count: SampleCount,
}

impl Default for GraphicsPipelineDef {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            amplification_shader: None,
            mesh_shader: None,
            pixel_shader: None,
            root_signature: RootSignatureDef::default(),
            depth_state: DepthState::default(),
            cull_mode: CullMode::Back,
            color_formats: Vec::new(),
            depth_stencil_format: None,
            sample_count: SampleCount::SampleCount1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComputePipelineDef {
    pub shader: ShaderRef,
    pub root_signature: RootSignatureDef,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineDef {
    Graphics(GraphicsPipelineDef),
    Compute(ComputePipelineDef),
}

struct PipelineInner {
    id: u64,
    def: PipelineDef,
    root_signature: RootSignature,
}

/// An immutable pipeline-state object.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub(crate) fn new(id: u64, def: PipelineDef, root_signature: RootSignature) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                id,
                def,
                root_signature,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn definition(&self) -> &PipelineDef {
        &self.inner.def
    }

    pub fn pipeline_type(&self) -> PipelineType {
        match self.inner.def {
            PipelineDef::Graphics(_) => PipelineType::Graphics,
            PipelineDef::Compute(_) => PipelineType::Compute,
        }
    }

    pub fn root_signature(&self) -> &RootSignature {
        &self.inner.root_signature
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

/// A work-graph program: a library of nodes dispatched as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct StateObjectDef {
    pub library: ShaderRef,
    pub root_signature: RootSignatureDef,
    pub program_name: String,
}

#[derive(Debug)]
struct StateObjectInner {
    id: u64,
    def: StateObjectDef,
    backing_size: u64,
}

#[derive(Clone, Debug)]
pub struct StateObject {
    inner: Arc<StateObjectInner>,
}

impl StateObject {
    pub(crate) fn new(id: u64, def: StateObjectDef, backing_size: u64) -> Self {
        Self {
            inner: Arc::new(StateObjectInner {
                id,
                def,
                backing_size,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn definition(&self) -> &StateObjectDef {
        &self.inner.def
    }

    /// Size of the persistent backing memory the dispatch requires.
    pub fn workgraph_backing_size(&self) -> u64 {
        self.inner.backing_size
    }
}

impl PartialEq for StateObject {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

/// Argument layout for `execute_indirect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndirectOp {
    Dispatch,
    DispatchMesh,
    Draw,
    DrawIndexed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSignature {
    pub op: IndirectOp,
    pub stride: u32,
}

impl CommandSignature {
    pub const DISPATCH: Self = Self {
        op: IndirectOp::Dispatch,
        stride: 12,
    };
    pub const DISPATCH_MESH: Self = Self {
        op: IndirectOp::DispatchMesh,
        stride: 12,
    };
    pub const DRAW: Self = Self {
        op: IndirectOp::Draw,
        stride: 16,
    };
    pub const DRAW_INDEXED: Self = Self {
        op: IndirectOp::DrawIndexed,
        stride: 20,
    };
}
