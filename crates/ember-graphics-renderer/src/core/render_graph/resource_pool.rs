use ember_core::{Handle, SubmissionPool};
use ember_graphics_api::{
    Buffer, BufferDesc, CommandContext, DeviceContext, GfxResult, Texture, TextureDesc,
};

use super::render_graph::PhysicalResource;
use super::RenderGraphResourceDesc;

/// Free-list of physical resources keyed by descriptor equality, shared by
/// graph executions across frames, plus the recycled command contexts the
/// graph records into. The pool owns nothing the graph imported; only
/// graph-created transients are recycled here.
#[derive(Default)]
pub struct RenderGraphResourcePool {
    free_textures: Vec<(TextureDesc, Texture)>,
    free_buffers: Vec<(BufferDesc, Buffer)>,
    allocation_count: u64,
    contexts: SubmissionPool<CommandContext>,
}

impl RenderGraphResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources allocated over the pool lifetime (reuse does not count).
    pub fn allocation_count(&self) -> u64 {
        self.allocation_count
    }

    pub fn available_count(&self) -> usize {
        self.free_textures.len() + self.free_buffers.len()
    }

    /// Command contexts the pool owns, in flight or free.
    pub fn context_count(&self) -> usize {
        self.contexts.total_count()
    }

    /// Reuse a context whose submission has completed, else allocate one.
    pub(crate) fn acquire_context(&mut self, device: &DeviceContext) -> Handle<CommandContext> {
        self.contexts.recycle(device.last_completed_fence());
        self.contexts.acquire(|| device.allocate_context())
    }

    /// Park a context until `fence` completes.
    pub(crate) fn release_context(&mut self, handle: Handle<CommandContext>, fence: u64) {
        self.contexts.release(fence, handle);
    }

    pub(crate) fn acquire(
        &mut self,
        device: &DeviceContext,
        desc: &RenderGraphResourceDesc,
        name: &str,
    ) -> GfxResult<PhysicalResource> {
        match desc {
            RenderGraphResourceDesc::Texture(texture_desc) => {
                if let Some(index) = self
                    .free_textures
                    .iter()
                    .position(|(free_desc, _)| free_desc == texture_desc)
                {
                    let (_, texture) = self.free_textures.swap_remove(index);
                    return Ok(PhysicalResource::Texture(texture));
                }
                self.allocation_count += 1;
                log::debug!("render graph pool: creating texture '{}'", name);
                Ok(PhysicalResource::Texture(
                    device.create_texture(*texture_desc, name)?,
                ))
            }
            RenderGraphResourceDesc::Buffer(buffer_desc) => {
                if let Some(index) = self
                    .free_buffers
                    .iter()
                    .position(|(free_desc, _)| free_desc == buffer_desc)
                {
                    let (_, buffer) = self.free_buffers.swap_remove(index);
                    return Ok(PhysicalResource::Buffer(buffer));
                }
                self.allocation_count += 1;
                log::debug!("render graph pool: creating buffer '{}'", name);
                Ok(PhysicalResource::Buffer(
                    device.create_buffer(*buffer_desc, name)?,
                ))
            }
        }
    }

    pub(crate) fn release(&mut self, resource: PhysicalResource) {
        match resource {
            PhysicalResource::Texture(texture) => {
                self.free_textures.push((*texture.definition(), texture));
            }
            PhysicalResource::Buffer(buffer) => {
                self.free_buffers.push((*buffer.definition(), buffer));
            }
        }
    }

    /// Hand every pooled resource to the device's deferred-free queue, e.g.
    /// on viewport resize.
    pub fn clear(&mut self, device: &DeviceContext) {
        for (_, texture) in self.free_textures.drain(..) {
            device.defer_release_texture(texture);
        }
        for (_, buffer) in self.free_buffers.drain(..) {
            device.defer_release_buffer(buffer);
        }
    }
}
