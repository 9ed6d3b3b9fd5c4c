use std::collections::HashMap;
use std::sync::Arc;

use ember_graphics_api::{
    Buffer, BufferDesc, BufferView, ColorClearValue, ColorRenderTargetBinding, CommandContext,
    DepthStencilClearValue, DepthStencilRenderTargetBinding, DeviceContext, GfxResult, LoadOp,
    ResourceState, StoreOp, Texture, TextureDesc, TextureView, TextureViewDef,
};
use parking_lot::Mutex;

use super::{Blackboard, RenderGraphResourcePool};

bitflags::bitflags! {
    pub struct RGPassFlags: u32 {
        const COMPUTE = 0x1;
        const RASTER = 0x2;
        const COPY = 0x4;
        const NEVER_CULL = 0x8;
    }
}

/// Graph-scoped handle to a virtual resource. The version counts writes;
/// a read observes the version its handle carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderGraphResource {
    id: u32,
    version: u32,
}

impl RenderGraphResource {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderGraphResourceDesc {
    Texture(TextureDesc),
    Buffer(BufferDesc),
}

impl From<TextureDesc> for RenderGraphResourceDesc {
    fn from(desc: TextureDesc) -> Self {
        Self::Texture(desc)
    }
}

impl From<BufferDesc> for RenderGraphResourceDesc {
    fn from(desc: BufferDesc) -> Self {
        Self::Buffer(desc)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PhysicalResource {
    Texture(Texture),
    Buffer(Buffer),
}

impl PhysicalResource {
    fn as_texture(&self) -> &Texture {
        match self {
            Self::Texture(texture) => texture,
            Self::Buffer(buffer) => {
                panic!("resource '{}' is a buffer, not a texture", buffer.name())
            }
        }
    }

    fn as_buffer(&self) -> &Buffer {
        match self {
            Self::Buffer(buffer) => buffer,
            Self::Texture(texture) => {
                panic!("resource '{}' is a texture, not a buffer", texture.name())
            }
        }
    }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("pass '{pass}': resource '{resource}' appears in both the read and write set at the same version")]
    ReadWriteOverlap { pass: String, resource: String },

    #[error("pass '{pass}' is a compute pass but declares render targets")]
    ComputePassWithRenderTargets { pass: String },

    #[error("pass '{pass}' is a raster pass but declares no render targets")]
    RasterPassWithoutTargets { pass: String },

    #[error("pass '{pass}': indirect argument buffer '{resource}' was not written within this graph")]
    IndirectArgsNotWritten { pass: String, resource: String },

    #[error("pass '{pass}': render target attachments do not share dimensions and sample count")]
    RenderTargetMismatch { pass: String },

    #[error("pass '{pass}': reads '{resource}' before any pass has written it")]
    ReadBeforeWrite { pass: String, resource: String },
}

#[derive(Clone, Copy, Debug)]
struct ResourceAccess {
    resource: RenderGraphResource,
    state: ResourceState,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderTargetAccess {
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ColorClearValue,
}

impl RenderTargetAccess {
    pub fn clear(clear_value: ColorClearValue) -> Self {
        Self {
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            clear_value,
        }
    }

    pub fn load() -> Self {
        Self {
            load_op: LoadOp::Load,
            store_op: StoreOp::Store,
            clear_value: ColorClearValue::default(),
        }
    }

    pub fn dont_care() -> Self {
        Self {
            load_op: LoadOp::DontCare,
            store_op: StoreOp::Store,
            clear_value: ColorClearValue::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DepthStencilAccess {
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub read_only: bool,
    pub clear_value: DepthStencilClearValue,
}

impl DepthStencilAccess {
    /// Clear to the reverse-Z far plane (depth 0).
    pub fn clear() -> Self {
        Self {
            depth_load_op: LoadOp::Clear,
            depth_store_op: StoreOp::Store,
            stencil_load_op: LoadOp::Clear,
            stencil_store_op: StoreOp::DontCare,
            read_only: false,
            clear_value: DepthStencilClearValue::default(),
        }
    }

    pub fn load() -> Self {
        Self {
            depth_load_op: LoadOp::Load,
            depth_store_op: StoreOp::Store,
            stencil_load_op: LoadOp::Load,
            stencil_store_op: StoreOp::DontCare,
            read_only: false,
            clear_value: DepthStencilClearValue::default(),
        }
    }

    pub fn read_only() -> Self {
        Self {
            depth_load_op: LoadOp::Load,
            depth_store_op: StoreOp::DontCare,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            read_only: true,
            clear_value: DepthStencilClearValue::default(),
        }
    }
}

#[derive(Clone, Debug)]
struct RenderTargetInfo {
    access: ResourceAccess,
    rt: RenderTargetAccess,
    resolve: Option<ResourceAccess>,
}

#[derive(Clone, Debug)]
struct DepthStencilInfo {
    access: ResourceAccess,
    ds: DepthStencilAccess,
}

type ExecuteFn = Box<dyn FnOnce(&mut CommandContext, &RenderGraphResources<'_>)>;

struct RGPass {
    name: String,
    flags: RGPassFlags,
    reads: Vec<ResourceAccess>,
    writes: Vec<ResourceAccess>,
    render_targets: Vec<RenderTargetInfo>,
    depth_stencil: Option<DepthStencilInfo>,
    execute_fn: Option<ExecuteFn>,
    live: bool,
}

impl RGPass {
    fn new(name: &str, flags: RGPassFlags) -> Self {
        Self {
            name: name.to_string(),
            flags,
            reads: Vec::new(),
            writes: Vec::new(),
            render_targets: Vec::new(),
            depth_stencil: None,
            execute_fn: None,
            live: false,
        }
    }

    fn all_accesses(&self) -> impl Iterator<Item = &ResourceAccess> {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .chain(self.render_targets.iter().map(|rt| &rt.access))
            .chain(self.render_targets.iter().filter_map(|rt| rt.resolve.as_ref()))
            .chain(self.depth_stencil.iter().map(|ds| &ds.access))
    }

    /// Write accesses produce the next version of their resource.
    fn produced_versions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.writes
            .iter()
            .chain(self.render_targets.iter().map(|rt| &rt.access))
            .chain(self.render_targets.iter().filter_map(|rt| rt.resolve.as_ref()))
            .chain(
                self.depth_stencil
                    .iter()
                    .filter(|ds| !ds.ds.read_only)
                    .map(|ds| &ds.access),
            )
            .map(|access| (access.resource.id, access.resource.version + 1))
    }

    fn consumed_versions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.reads
            .iter()
            .map(|access| (access.resource.id, access.resource.version))
            .chain(
                self.depth_stencil
                    .iter()
                    .filter(|ds| ds.ds.read_only)
                    .map(|ds| (ds.access.resource.id, ds.access.resource.version)),
            )
    }
}

pub type ExportSlot = Arc<Mutex<Option<Texture>>>;

struct ResourceInfo {
    name: String,
    desc: RenderGraphResourceDesc,
    imported: Option<PhysicalResource>,
    exported: bool,
    export_slot: Option<ExportSlot>,
    latest_version: u32,
}

/// Read-only mapping from virtual resources to the physical resources of the
/// current execution, handed to pass closures.
pub struct RenderGraphResources<'a> {
    physical: &'a [Option<PhysicalResource>],
    infos: &'a [ResourceInfo],
}

impl<'a> RenderGraphResources<'a> {
    fn physical(&self, resource: RenderGraphResource) -> &PhysicalResource {
        self.physical[resource.id as usize].as_ref().unwrap_or_else(|| {
            panic!(
                "resource '{}' is not resolved at this point of execution",
                self.infos[resource.id as usize].name
            )
        })
    }

    pub fn get_texture(&self, resource: RenderGraphResource) -> &Texture {
        self.physical(resource).as_texture()
    }

    pub fn get_buffer(&self, resource: RenderGraphResource) -> &Buffer {
        self.physical(resource).as_buffer()
    }

    pub fn get_srv(&self, resource: RenderGraphResource) -> TextureView {
        self.get_texture(resource).srv()
    }

    pub fn get_srv_mips(
        &self,
        resource: RenderGraphResource,
        first_mip: u32,
        mip_count: u32,
    ) -> TextureView {
        let texture = self.get_texture(resource);
        texture.create_view(TextureViewDef::as_srv_with_mip(
            texture.definition(),
            first_mip,
            mip_count,
        ))
    }

    pub fn get_uav(&self, resource: RenderGraphResource) -> TextureView {
        self.get_texture(resource).uav(0)
    }

    pub fn get_uav_mip(&self, resource: RenderGraphResource, mip: u32) -> TextureView {
        self.get_texture(resource).uav(mip)
    }

    pub fn get_buffer_srv(&self, resource: RenderGraphResource) -> BufferView {
        self.get_buffer(resource).srv()
    }

    pub fn get_buffer_uav(&self, resource: RenderGraphResource) -> BufferView {
        self.get_buffer(resource).uav()
    }
}

/// Transient-resource frame scheduler.
///
/// Passes are recorded declaratively with their resource accesses; `execute`
/// compiles the dependency graph (culling, lifetimes, physical aliasing),
/// derives barriers, and runs the surviving passes on one command context.
pub struct RenderGraph {
    device: DeviceContext,
    resources: Vec<ResourceInfo>,
    passes: Vec<RGPass>,
    pub blackboard: Blackboard,
    compile_errors: Vec<GraphError>,
}

impl RenderGraph {
    pub fn new(device: &DeviceContext) -> Self {
        Self {
            device: device.clone(),
            resources: Vec::new(),
            passes: Vec::new(),
            blackboard: Blackboard::default(),
            compile_errors: Vec::new(),
        }
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    //
    // Resource registration
    //

    pub fn create(
        &mut self,
        name: &str,
        desc: impl Into<RenderGraphResourceDesc>,
    ) -> RenderGraphResource {
        let id = self.resources.len() as u32;
        self.resources.push(ResourceInfo {
            name: name.to_string(),
            desc: desc.into(),
            imported: None,
            exported: false,
            export_slot: None,
            latest_version: 0,
        });
        RenderGraphResource { id, version: 0 }
    }

    pub fn import_texture(&mut self, name: &str, texture: &Texture) -> RenderGraphResource {
        let id = self.resources.len() as u32;
        self.resources.push(ResourceInfo {
            name: name.to_string(),
            desc: RenderGraphResourceDesc::Texture(*texture.definition()),
            imported: Some(PhysicalResource::Texture(texture.clone())),
            exported: true,
            export_slot: None,
            latest_version: 0,
        });
        RenderGraphResource { id, version: 0 }
    }

    pub fn import_buffer(&mut self, name: &str, buffer: &Buffer) -> RenderGraphResource {
        let id = self.resources.len() as u32;
        self.resources.push(ResourceInfo {
            name: name.to_string(),
            desc: RenderGraphResourceDesc::Buffer(*buffer.definition()),
            imported: Some(PhysicalResource::Buffer(buffer.clone())),
            exported: true,
            export_slot: None,
            latest_version: 0,
        });
        RenderGraphResource { id, version: 0 }
    }

    /// Import `texture` when present, else the supplied fallback.
    pub fn try_import_texture(
        &mut self,
        name: &str,
        texture: Option<&Texture>,
        fallback: &Texture,
    ) -> RenderGraphResource {
        self.import_texture(name, texture.unwrap_or(fallback))
    }

    /// Mark a created resource as surviving the graph; the physical texture
    /// is stored into `slot` during execution.
    pub fn export_texture(&mut self, resource: RenderGraphResource, slot: &ExportSlot) {
        let info = &mut self.resources[resource.id as usize];
        info.exported = true;
        info.export_slot = Some(Arc::clone(slot));
    }

    //
    // Pass registration
    //

    pub fn add_pass(&mut self, name: &str, flags: RGPassFlags) -> RenderGraphPassBuilder<'_> {
        RenderGraphPassBuilder {
            pass: Some(RGPass::new(name, flags)),
            graph: self,
        }
    }

    /// Single copy pass from `src` to `dst`.
    pub fn add_copy_pass(
        &mut self,
        name: &str,
        src: RenderGraphResource,
        dst: &mut RenderGraphResource,
    ) {
        let src_copy = src;
        let dst_copy = *dst;
        self.add_pass(name, RGPassFlags::COPY)
            .read_as(src, ResourceState::COPY_SRC)
            .write_as(dst, ResourceState::COPY_DST)
            .bind(move |context, resources| {
                match (
                    &resources.physical[src_copy.id as usize],
                    &resources.physical[dst_copy.id as usize],
                ) {
                    (Some(PhysicalResource::Buffer(src)), Some(PhysicalResource::Buffer(dst))) => {
                        context.copy_buffer(src, dst);
                    }
                    (
                        Some(PhysicalResource::Texture(src)),
                        Some(PhysicalResource::Texture(dst)),
                    ) => {
                        context.copy_texture(src, dst);
                    }
                    _ => panic!("copy pass endpoints must be the same resource kind"),
                }
            });
    }

    pub(crate) fn bump_version(&mut self, resource: &mut RenderGraphResource) {
        let info = &mut self.resources[resource.id as usize];
        // A stale handle means two writers race for the same version.
        debug_assert_eq!(
            resource.version, info.latest_version,
            "resource '{}' written through a stale handle; a version has exactly one writer",
            info.name
        );
        info.latest_version += 1;
        resource.version = info.latest_version;
    }

    fn resource_name(&self, id: u32) -> &str {
        &self.resources[id as usize].name
    }

    /// Descriptor of a registered texture resource.
    pub fn texture_desc(&self, resource: RenderGraphResource) -> Option<TextureDesc> {
        match self.resources[resource.id as usize].desc {
            RenderGraphResourceDesc::Texture(desc) => Some(desc),
            RenderGraphResourceDesc::Buffer(_) => None,
        }
    }

    /// Descriptor of a registered buffer resource.
    pub fn buffer_desc(&self, resource: RenderGraphResource) -> Option<BufferDesc> {
        match self.resources[resource.id as usize].desc {
            RenderGraphResourceDesc::Buffer(desc) => Some(desc),
            RenderGraphResourceDesc::Texture(_) => None,
        }
    }

    //
    // Compile
    //

    fn validate_pass(&self, pass: &RGPass) -> Result<(), GraphError> {
        if pass.flags.contains(RGPassFlags::COMPUTE) && !pass.render_targets.is_empty() {
            return Err(GraphError::ComputePassWithRenderTargets {
                pass: pass.name.clone(),
            });
        }
        if pass.flags.contains(RGPassFlags::RASTER)
            && pass.render_targets.is_empty()
            && pass.depth_stencil.is_none()
        {
            return Err(GraphError::RasterPassWithoutTargets {
                pass: pass.name.clone(),
            });
        }

        // Same resource at the same version on both sides.
        for read in &pass.reads {
            for write in &pass.writes {
                if read.resource == write.resource {
                    return Err(GraphError::ReadWriteOverlap {
                        pass: pass.name.clone(),
                        resource: self.resource_name(read.resource.id).to_string(),
                    });
                }
            }
        }

        // Indirect arguments must be produced by this graph.
        for read in &pass.reads {
            if read.state == ResourceState::INDIRECT_ARGUMENT && read.resource.version == 0 {
                return Err(GraphError::IndirectArgsNotWritten {
                    pass: pass.name.clone(),
                    resource: self.resource_name(read.resource.id).to_string(),
                });
            }
        }

        // Reading a created resource nothing has written yet observes
        // garbage.
        for (id, version) in pass.consumed_versions() {
            let info = &self.resources[id as usize];
            if version == 0 && info.imported.is_none() {
                return Err(GraphError::ReadBeforeWrite {
                    pass: pass.name.clone(),
                    resource: info.name.clone(),
                });
            }
        }

        // Attachments must agree on dimensions and sample count.
        let mut reference: Option<(u32, u32, ember_graphics_api::SampleCount)> = None;
        for rt in &pass.render_targets {
            if let RenderGraphResourceDesc::Texture(desc) =
                self.resources[rt.access.resource.id as usize].desc
            {
                let key = (desc.width, desc.height, desc.sample_count);
                if *reference.get_or_insert(key) != key {
                    return Err(GraphError::RenderTargetMismatch {
                        pass: pass.name.clone(),
                    });
                }
            }
        }
        if let (Some(ds), Some(reference)) = (&pass.depth_stencil, reference) {
            if let RenderGraphResourceDesc::Texture(desc) =
                self.resources[ds.access.resource.id as usize].desc
            {
                if desc.sample_count != reference.2 {
                    return Err(GraphError::RenderTargetMismatch {
                        pass: pass.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn compile(&mut self) -> Vec<GraphError> {
        let mut errors = std::mem::take(&mut self.compile_errors);

        for pass in &mut self.passes {
            pass.live = true;
        }

        for (index, pass) in self.passes.iter().enumerate() {
            if let Err(error) = self.validate_pass(pass) {
                errors.push(error);
                // Recover locally: refuse to execute the offending pass.
                let _ = index;
            }
        }
        for error in &errors {
            if cfg!(debug_assertions) {
                panic!("render graph: {}", error);
            }
            log::error!("render graph: {}", error);
        }
        let failed: Vec<String> = errors
            .iter()
            .map(|e| match e {
                GraphError::ReadWriteOverlap { pass, .. }
                | GraphError::ComputePassWithRenderTargets { pass }
                | GraphError::RasterPassWithoutTargets { pass }
                | GraphError::IndirectArgsNotWritten { pass, .. }
                | GraphError::RenderTargetMismatch { pass }
                | GraphError::ReadBeforeWrite { pass, .. } => pass.clone(),
            })
            .collect();
        for pass in &mut self.passes {
            if failed.contains(&pass.name) {
                pass.live = false;
            }
        }

        // Producer of each (resource, version).
        let mut producers: HashMap<(u32, u32), usize> = HashMap::new();
        for (index, pass) in self.passes.iter().enumerate() {
            for produced in pass.produced_versions() {
                producers.insert(produced, index);
            }
        }

        // Cull: a pass stays when it carries NEVER_CULL, touches an
        // imported/exported resource, or feeds a live reader.
        loop {
            let mut changed = false;
            for index in (0..self.passes.len()).rev() {
                if !self.passes[index].live {
                    continue;
                }
                let pass = &self.passes[index];
                let mut keep = pass.flags.contains(RGPassFlags::NEVER_CULL);
                if !keep {
                    keep = pass.produced_versions().any(|(id, _)| {
                        let info = &self.resources[id as usize];
                        info.imported.is_some() || info.exported
                    });
                }
                if !keep {
                    keep = pass.produced_versions().any(|produced| {
                        self.passes
                            .iter()
                            .any(|other| other.live && other.consumed_versions().any(|c| c == produced))
                    });
                }
                if !keep {
                    self.passes[index].live = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Schedule sanity: every consumed version was produced earlier.
        for (index, pass) in self.passes.iter().enumerate() {
            if !pass.live {
                continue;
            }
            for consumed in pass.consumed_versions() {
                if consumed.1 > 0 {
                    if let Some(&producer) = producers.get(&consumed) {
                        debug_assert!(
                            producer < index,
                            "pass '{}' consumes a version produced by the later pass '{}'",
                            pass.name,
                            self.passes[producer].name
                        );
                    }
                }
            }
        }

        errors
    }

    /// Per-resource [first, last] live pass index, `None` when unused.
    fn lifetimes(&self) -> Vec<Option<(usize, usize)>> {
        let mut lifetimes = vec![None; self.resources.len()];
        for (index, pass) in self.passes.iter().enumerate() {
            if !pass.live {
                continue;
            }
            for access in pass.all_accesses() {
                let entry = &mut lifetimes[access.resource.id as usize];
                match entry {
                    None => *entry = Some((index, index)),
                    Some((_, last)) => *last = index,
                }
            }
        }
        lifetimes
    }

    //
    // Execute
    //

    pub fn execute(mut self, pool: &mut RenderGraphResourcePool) -> GfxResult<u64> {
        let errors = self.compile();
        if !errors.is_empty() {
            log::warn!("render graph: {} passes refused execution", errors.len());
        }

        let lifetimes = self.lifetimes();
        let mut physical: Vec<Option<PhysicalResource>> = self
            .resources
            .iter()
            .map(|info| info.imported.clone())
            .collect();

        let device = self.device.clone();
        let mut context_handle = pool.acquire_context(&device);
        let passes = std::mem::take(&mut self.passes);

        for (index, pass) in passes.into_iter().enumerate() {
            if !pass.live {
                continue;
            }

            // Allocate transients whose lifetime starts here.
            for access in pass.all_accesses() {
                let res_idx = access.resource.id as usize;
                if physical[res_idx].is_none() {
                    debug_assert_eq!(lifetimes[res_idx].map(|l| l.0), Some(index));
                    let info = &self.resources[res_idx];
                    let resource = match pool.acquire(&device, &info.desc, &info.name) {
                        Ok(resource) => resource,
                        Err(error) => {
                            pool.release_context(context_handle, 0);
                            return Err(error);
                        }
                    };
                    if let (Some(slot), PhysicalResource::Texture(texture)) =
                        (&info.export_slot, &resource)
                    {
                        *slot.lock() = Some(texture.clone());
                    }
                    physical[res_idx] = Some(resource);
                }
            }

            self.record_pass(pass, context_handle.as_mut(), &physical);

            // Return transients whose lifetime ended with this pass.
            for (res_idx, lifetime) in lifetimes.iter().enumerate() {
                let info = &self.resources[res_idx];
                if info.imported.is_some() || info.exported {
                    continue;
                }
                if let Some((_, last)) = lifetime {
                    if *last == index {
                        if let Some(resource) = physical[res_idx].clone() {
                            pool.release(resource);
                        }
                    }
                }
            }
        }

        match context_handle.as_mut().execute(false) {
            Ok(fence) => {
                pool.release_context(context_handle, fence);
                Ok(fence)
            }
            Err(error) => {
                pool.release_context(context_handle, 0);
                Err(error)
            }
        }
    }

    fn record_pass(
        &self,
        mut pass: RGPass,
        context: &mut CommandContext,
        physical: &[Option<PhysicalResource>],
    ) {
        context.with_label(&pass.name, |context| {
            // Transitions to each access's declared state. Back-to-back
            // unordered writes with no read in between still need a UAV
            // barrier even though the state does not change.
            for access in pass.reads.iter().chain(pass.writes.iter()) {
                match physical[access.resource.id as usize].as_ref().unwrap() {
                    PhysicalResource::Texture(texture) => {
                        if access.state == ResourceState::UNORDERED_ACCESS
                            && texture.sub_state(0) == ResourceState::UNORDERED_ACCESS
                        {
                            context.uav_barrier_texture(texture);
                        }
                        context.transition(texture, access.state);
                    }
                    PhysicalResource::Buffer(buffer) => {
                        if access.state == ResourceState::UNORDERED_ACCESS
                            && buffer.state() == ResourceState::UNORDERED_ACCESS
                        {
                            context.uav_barrier_buffer(buffer);
                        }
                        context.transition_buffer(buffer, access.state);
                    }
                }
            }
            for rt in &pass.render_targets {
                let texture = physical[rt.access.resource.id as usize]
                    .as_ref()
                    .unwrap()
                    .as_texture();
                context.transition(texture, ResourceState::RENDER_TARGET);
                if let Some(resolve) = &rt.resolve {
                    let resolve_texture = physical[resolve.resource.id as usize]
                        .as_ref()
                        .unwrap()
                        .as_texture();
                    context.transition(resolve_texture, ResourceState::RESOLVE_DST);
                }
            }
            if let Some(ds) = &pass.depth_stencil {
                let texture = physical[ds.access.resource.id as usize]
                    .as_ref()
                    .unwrap()
                    .as_texture();
                context.transition(
                    texture,
                    if ds.ds.read_only {
                        ResourceState::DEPTH_READ
                    } else {
                        ResourceState::DEPTH_WRITE
                    },
                );
            }
            context.flush_barriers();

            let is_raster = pass.flags.contains(RGPassFlags::RASTER);
            if is_raster {
                let color_targets: Vec<ColorRenderTargetBinding> = pass
                    .render_targets
                    .iter()
                    .map(|rt| ColorRenderTargetBinding {
                        texture_view: physical[rt.access.resource.id as usize]
                            .as_ref()
                            .unwrap()
                            .as_texture()
                            .rtv(),
                        load_op: rt.rt.load_op,
                        store_op: rt.rt.store_op,
                        clear_value: rt.rt.clear_value,
                        resolve_target: rt.resolve.as_ref().map(|resolve| {
                            physical[resolve.resource.id as usize]
                                .as_ref()
                                .unwrap()
                                .as_texture()
                                .rtv()
                        }),
                    })
                    .collect();
                let depth_target = pass.depth_stencil.as_ref().map(|ds| {
                    DepthStencilRenderTargetBinding {
                        texture_view: physical[ds.access.resource.id as usize]
                            .as_ref()
                            .unwrap()
                            .as_texture()
                            .dsv(),
                        depth_load_op: ds.ds.depth_load_op,
                        depth_store_op: ds.ds.depth_store_op,
                        stencil_load_op: ds.ds.stencil_load_op,
                        stencil_store_op: ds.ds.stencil_store_op,
                        write_depth: !ds.ds.read_only,
                        clear_value: ds.ds.clear_value,
                    }
                });
                context.begin_render_pass(&color_targets, &depth_target);
            }

            if let Some(execute_fn) = pass.execute_fn.take() {
                let resources = RenderGraphResources {
                    physical,
                    infos: &self.resources,
                };
                execute_fn(context, &resources);
            }

            if is_raster {
                context.end_render_pass();
            }
        });
    }

    /// Human-readable node-link dump for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for pass in &self.passes {
            out += &format!("*-{} [{:?}]\n", pass.name, pass.flags);
            if !pass.render_targets.is_empty() {
                out += "  | Render targets:\n";
                for rt in &pass.render_targets {
                    out += &format!(
                        "  |   {} v{}\n",
                        self.resource_name(rt.access.resource.id),
                        rt.access.resource.version
                    );
                }
            }
            if let Some(ds) = &pass.depth_stencil {
                out += &format!(
                    "  | Depth stencil:\n  |   {} v{}{}\n",
                    self.resource_name(ds.access.resource.id),
                    ds.access.resource.version,
                    if ds.ds.read_only { " (read only)" } else { "" }
                );
            }
            if !pass.reads.is_empty() {
                out += "  | Reads:\n";
                for read in &pass.reads {
                    out += &format!(
                        "  |   {} v{}\n",
                        self.resource_name(read.resource.id),
                        read.resource.version
                    );
                }
            }
            if !pass.writes.is_empty() {
                out += "  | Writes:\n";
                for write in &pass.writes {
                    out += &format!(
                        "  |   {} v{}\n",
                        self.resource_name(write.resource.id),
                        write.resource.version
                    );
                }
            }
        }
        out
    }
}

/// Builder returned by [`RenderGraph::add_pass`]; the pass is recorded when
/// the builder is dropped or `bind` is called.
pub struct RenderGraphPassBuilder<'a> {
    graph: &'a mut RenderGraph,
    pass: Option<RGPass>,
}

impl<'a> RenderGraphPassBuilder<'a> {
    fn pass_mut(&mut self) -> &mut RGPass {
        self.pass.as_mut().unwrap()
    }

    pub fn read(mut self, resource: RenderGraphResource) -> Self {
        self.pass_mut().reads.push(ResourceAccess {
            resource,
            state: ResourceState::SHADER_RESOURCE,
        });
        self
    }

    pub fn read_as(mut self, resource: RenderGraphResource, state: ResourceState) -> Self {
        self.pass_mut().reads.push(ResourceAccess { resource, state });
        self
    }

    pub fn read_indirect_args(self, resource: RenderGraphResource) -> Self {
        self.read_as(resource, ResourceState::INDIRECT_ARGUMENT)
    }

    pub fn write(mut self, resource: &mut RenderGraphResource) -> Self {
        let access = ResourceAccess {
            resource: *resource,
            state: ResourceState::UNORDERED_ACCESS,
        };
        self.graph.bump_version(resource);
        self.pass_mut().writes.push(access);
        self
    }

    pub fn write_as(mut self, resource: &mut RenderGraphResource, state: ResourceState) -> Self {
        let access = ResourceAccess {
            resource: *resource,
            state,
        };
        self.graph.bump_version(resource);
        self.pass_mut().writes.push(access);
        self
    }

    pub fn render_target(
        mut self,
        resource: &mut RenderGraphResource,
        rt: RenderTargetAccess,
    ) -> Self {
        let access = ResourceAccess {
            resource: *resource,
            state: ResourceState::RENDER_TARGET,
        };
        self.graph.bump_version(resource);
        self.pass_mut().render_targets.push(RenderTargetInfo {
            access,
            rt,
            resolve: None,
        });
        self
    }

    pub fn render_target_resolve(
        mut self,
        resource: &mut RenderGraphResource,
        rt: RenderTargetAccess,
        resolve: &mut RenderGraphResource,
    ) -> Self {
        let access = ResourceAccess {
            resource: *resource,
            state: ResourceState::RENDER_TARGET,
        };
        self.graph.bump_version(resource);
        let resolve_access = ResourceAccess {
            resource: *resolve,
            state: ResourceState::RESOLVE_DST,
        };
        self.graph.bump_version(resolve);
        self.pass_mut().render_targets.push(RenderTargetInfo {
            access,
            rt,
            resolve: Some(resolve_access),
        });
        self
    }

    pub fn depth_stencil(
        mut self,
        resource: &mut RenderGraphResource,
        ds: DepthStencilAccess,
    ) -> Self {
        let access = ResourceAccess {
            resource: *resource,
            state: if ds.read_only {
                ResourceState::DEPTH_READ
            } else {
                ResourceState::DEPTH_WRITE
            },
        };
        if !ds.read_only {
            self.graph.bump_version(resource);
        }
        self.pass_mut().depth_stencil = Some(DepthStencilInfo { access, ds });
        self
    }

    pub fn bind<F>(mut self, f: F)
    where
        F: FnOnce(&mut CommandContext, &RenderGraphResources<'_>) + 'static,
    {
        self.pass_mut().execute_fn = Some(Box::new(f));
        // Recording happens in Drop.
    }
}

impl<'a> Drop for RenderGraphPassBuilder<'a> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.graph.passes.push(pass);
        }
    }
}
