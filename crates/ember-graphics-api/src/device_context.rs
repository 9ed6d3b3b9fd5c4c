use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Command, Submission};
use crate::buffer::new_buffer;
use crate::texture::new_texture;
use crate::{
    Buffer, BufferDesc, CommandContext, ComputePipelineDef, GfxError, GfxResult,
    GraphicsPipelineDef, Pipeline, PipelineDef, RootSignature, RootSignatureDef, StateObject,
    StateObjectDef, Texture, TextureDesc,
};

/// Frames the CPU may record ahead of the GPU.
pub const MAX_IN_FLIGHT_FRAMES: u64 = 3;

/// Feature set reported by the device. Callers gate optional paths
/// (mesh shading, work graphs) on these rather than probing at use.
#[derive(Clone, Copy, Debug)]
pub struct DeviceCapabilities {
    pub mesh_shading: bool,
    pub work_graphs: bool,
    pub raytracing: bool,
    pub wave_ops: bool,
    pub shader_model: u32,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            mesh_shading: true,
            work_graphs: false,
            raytracing: false,
            wave_ops: true,
            shader_model: 66,
        }
    }
}

/// General configuration the device will make best effort to respect.
#[derive(Clone, Debug, Default)]
pub struct DeviceDesc {
    pub app_name: String,
    pub capabilities: DeviceCapabilities,
    /// When set, resource creation beyond this many bytes fails with a typed
    /// error instead of aborting, so callers can release and retry.
    pub memory_budget: Option<u64>,
    pub enable_validation: bool,
}

enum DeferredItem {
    Texture(Texture),
    Buffer(Buffer),
}

impl DeferredItem {
    fn size(&self) -> u64 {
        match self {
            Self::Texture(t) => t.definition().total_size(),
            Self::Buffer(b) => b.definition().size,
        }
    }
}

pub(crate) struct DeviceContextInner {
    desc: DeviceDesc,
    next_resource_id: AtomicU64,
    next_fence: AtomicU64,
    completed_fence: AtomicU64,
    frame_index: AtomicU64,
    used_memory: AtomicU64,
    // (release fence, item); drained by tick_frame once the fence completes.
    deferred_free: Mutex<Vec<(u64, DeferredItem)>>,
    submissions: Mutex<Vec<Submission>>,
}

/// Opaque handle to a GPU device. Cheap to clone; all clones share the same
/// device.
#[derive(Clone)]
pub struct DeviceContext {
    pub(crate) inner: Arc<DeviceContextInner>,
}

impl DeviceContext {
    pub fn new(desc: &DeviceDesc) -> GfxResult<Self> {
        if desc.enable_validation {
            log::info!("device validation enabled");
        }
        Ok(Self {
            inner: Arc::new(DeviceContextInner {
                desc: desc.clone(),
                next_resource_id: AtomicU64::new(1),
                next_fence: AtomicU64::new(1),
                completed_fence: AtomicU64::new(0),
                frame_index: AtomicU64::new(0),
                used_memory: AtomicU64::new(0),
                deferred_free: Mutex::new(Vec::new()),
                submissions: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.inner.desc.capabilities
    }

    pub fn frame_index(&self) -> u64 {
        self.inner.frame_index.load(Ordering::Relaxed)
    }

    fn next_id(&self) -> u64 {
        self.inner.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    fn charge_memory(&self, name: &str, requested: u64) -> GfxResult<()> {
        if let Some(budget) = self.inner.desc.memory_budget {
            let used = self.inner.used_memory.load(Ordering::Relaxed);
            if used + requested > budget {
                return Err(GfxError::OutOfMemory {
                    name: name.to_string(),
                    requested,
                });
            }
        }
        self.inner.used_memory.fetch_add(requested, Ordering::Relaxed);
        Ok(())
    }

    pub fn used_memory(&self) -> u64 {
        self.inner.used_memory.load(Ordering::Relaxed)
    }

    pub fn create_texture(&self, desc: TextureDesc, name: &str) -> GfxResult<Texture> {
        self.charge_memory(name, desc.total_size())?;
        new_texture(self, desc, name, self.next_id())
    }

    pub fn create_buffer(&self, desc: BufferDesc, name: &str) -> GfxResult<Buffer> {
        self.charge_memory(name, desc.size)?;
        new_buffer(self, desc, name, self.next_id())
    }

    pub fn create_root_signature(&self, def: RootSignatureDef) -> RootSignature {
        RootSignature::new(self.next_id(), def)
    }

    pub fn create_graphics_pipeline(&self, def: GraphicsPipelineDef) -> GfxResult<Pipeline> {
        if def.mesh_shader.is_some() && !self.capabilities().mesh_shading {
            return Err(GfxError::UnsupportedCapability("mesh_shading"));
        }
        let root_signature = self.create_root_signature(def.root_signature);
        Ok(Pipeline::new(
            self.next_id(),
            PipelineDef::Graphics(def),
            root_signature,
        ))
    }

    pub fn create_compute_pipeline(&self, def: ComputePipelineDef) -> GfxResult<Pipeline> {
        let root_signature = self.create_root_signature(def.root_signature);
        Ok(Pipeline::new(
            self.next_id(),
            PipelineDef::Compute(def),
            root_signature,
        ))
    }

    pub fn create_state_object(&self, def: StateObjectDef) -> GfxResult<StateObject> {
        if !self.capabilities().work_graphs {
            return Err(GfxError::UnsupportedCapability("work_graphs"));
        }
        // Backing requirements scale with the node count of the program; the
        // in-process backend reports a fixed, generous size.
        Ok(StateObject::new(self.next_id(), def, 16 * 1024 * 1024))
    }

    /// Allocate a fresh command context for one submission.
    pub fn allocate_context(&self) -> CommandContext {
        CommandContext::new(self)
    }

    /// True once all work submitted up to `fence` has completed.
    pub fn is_fence_complete(&self, fence: u64) -> bool {
        fence <= self.inner.completed_fence.load(Ordering::Acquire)
    }

    pub fn last_completed_fence(&self) -> u64 {
        self.inner.completed_fence.load(Ordering::Acquire)
    }

    /// Block until all submitted work is done, then drain every deferred
    /// release.
    pub fn idle(&self) {
        let last = self.inner.next_fence.load(Ordering::Acquire) - 1;
        self.wait_for_fence(last);
        self.drain_deferred(u64::MAX);
    }

    /// Advance the frame fence, wait for frame `N - MAX_IN_FLIGHT_FRAMES`,
    /// and drain the deferred-free queue for any fence that completed.
    pub fn tick_frame(&self) {
        self.inner.frame_index.fetch_add(1, Ordering::Relaxed);

        let completed = self.inner.completed_fence.load(Ordering::Acquire);
        self.drain_deferred(completed);

        let mut submissions = self.inner.submissions.lock();
        submissions.retain(|s| s.fence > completed);
    }

    fn wait_for_fence(&self, fence: u64) {
        // The in-process backend completes submissions at submit time, so
        // waiting never actually blocks.
        debug_assert!(self.is_fence_complete(fence) || fence >= self.inner.next_fence.load(Ordering::Acquire));
    }

    /// Queue a texture for release once `fence` has completed.
    pub fn defer_release_texture(&self, texture: Texture) {
        let fence = texture.last_use_fence();
        self.inner
            .deferred_free
            .lock()
            .push((fence, DeferredItem::Texture(texture)));
    }

    /// Queue a buffer for release once `fence` has completed.
    pub fn defer_release_buffer(&self, buffer: Buffer) {
        let fence = buffer.last_use_fence();
        self.inner
            .deferred_free
            .lock()
            .push((fence, DeferredItem::Buffer(buffer)));
    }

    fn drain_deferred(&self, completed: u64) {
        let mut queue = self.inner.deferred_free.lock();
        let before = queue.len();
        queue.retain(|(fence, item)| {
            if *fence <= completed {
                self.inner
                    .used_memory
                    .fetch_sub(item.size(), Ordering::Relaxed);
                false
            } else {
                true
            }
        });
        let freed = before - queue.len();
        if freed > 0 {
            log::debug!("released {} deferred resources", freed);
        }
    }

    pub(crate) fn submit(&self, commands: Vec<Command>, _wait: bool) -> u64 {
        let fence = self.inner.next_fence.fetch_add(1, Ordering::AcqRel);
        self.inner
            .submissions
            .lock()
            .push(Submission { fence, commands });
        // Immediate completion: the backend "executes" at submit time.
        self.inner.completed_fence.fetch_max(fence, Ordering::AcqRel);
        fence
    }

    /// Drain the recorded submissions, oldest first. Intended for headless
    /// inspection; the queue is also trimmed by `tick_frame`.
    pub fn take_submissions(&self) -> Vec<Submission> {
        std::mem::take(&mut self.inner.submissions.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Format;

    #[test]
    fn fence_values_are_monotonic() {
        let device = DeviceContext::new(&DeviceDesc::default()).unwrap();
        let f1 = device.submit(Vec::new(), false);
        let f2 = device.submit(Vec::new(), false);
        assert!(f2 > f1);
        assert!(device.is_fence_complete(f1));
        assert!(device.is_fence_complete(f2));
        assert!(!device.is_fence_complete(f2 + 1));
    }

    #[test]
    fn memory_budget_failures_are_typed_and_recoverable() {
        let device = DeviceContext::new(&DeviceDesc {
            memory_budget: Some(1024 * 1024),
            ..DeviceDesc::default()
        })
        .unwrap();

        let big = TextureDesc::create_2d(1024, 1024, Format::R8G8B8A8_UNORM);
        let err = device.create_texture(big, "too_big").unwrap_err();
        assert!(matches!(err, GfxError::OutOfMemory { .. }));

        let small = TextureDesc::create_2d(16, 16, Format::R8G8B8A8_UNORM);
        let tex = device.create_texture(small, "small").unwrap();

        // Releasing returns the memory to the budget after the fence passes.
        let used = device.used_memory();
        device.defer_release_texture(tex);
        device.tick_frame();
        assert!(device.used_memory() < used);
    }

    #[test]
    fn deferred_free_waits_for_fence() {
        let device = DeviceContext::new(&DeviceDesc::default()).unwrap();
        let buffer = device
            .create_buffer(BufferDesc::create_structured(16, 4), "counters")
            .unwrap();

        // Pretend the buffer is referenced by a submission that has not
        // completed yet.
        buffer.mark_used(device.inner.next_fence.load(Ordering::Relaxed) + 10);
        let used = device.used_memory();
        device.defer_release_buffer(buffer);
        device.tick_frame();
        assert_eq!(device.used_memory(), used);
    }

    #[test]
    fn state_objects_require_work_graph_support() {
        let device = DeviceContext::new(&DeviceDesc::default()).unwrap();
        let err = device
            .create_state_object(StateObjectDef {
                library: crate::ShaderRef::new("cull.lib", ""),
                root_signature: RootSignatureDef::default(),
                program_name: "WG".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, GfxError::UnsupportedCapability("work_graphs")));
    }
}
