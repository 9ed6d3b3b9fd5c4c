use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::{DeviceContext, GPUViewType, GfxResult, MemoryUsage, ResourceState, ResourceUsage};

/// Fully describes a buffer; structural equality drives transient aliasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    /// Element stride for structured access, 0 for raw buffers.
    pub stride: u64,
    pub usage_flags: ResourceUsage,
    pub memory_usage: MemoryUsage,
}

impl BufferDesc {
    pub fn create_structured(element_count: u64, stride: u64) -> Self {
        Self {
            size: element_count * stride,
            stride,
            usage_flags: ResourceUsage::AS_SHADER_RESOURCE | ResourceUsage::AS_UNORDERED_ACCESS,
            memory_usage: MemoryUsage::GpuOnly,
        }
    }

    pub fn create_structured_with_usage(
        element_count: u64,
        stride: u64,
        usage_flags: ResourceUsage,
    ) -> Self {
        Self {
            usage_flags,
            ..Self::create_structured(element_count, stride)
        }
    }

    pub fn create_byte_address(size: u64, usage_flags: ResourceUsage) -> Self {
        Self {
            size,
            stride: 0,
            usage_flags,
            memory_usage: MemoryUsage::GpuOnly,
        }
    }

    /// Indirect-argument buffer holding `count` records of `stride` bytes.
    pub fn create_indirect_arguments(count: u64, stride: u64) -> Self {
        Self {
            size: count * stride,
            stride,
            usage_flags: ResourceUsage::AS_INDIRECT_ARGS
                | ResourceUsage::AS_SHADER_RESOURCE
                | ResourceUsage::AS_UNORDERED_ACCESS,
            memory_usage: MemoryUsage::GpuOnly,
        }
    }

    pub fn create_readback(size: u64) -> Self {
        Self {
            size,
            stride: 0,
            usage_flags: ResourceUsage::AS_READBACK | ResourceUsage::AS_TRANSFERABLE,
            memory_usage: MemoryUsage::GpuToCpu,
        }
    }

    pub fn create_upload(size: u64) -> Self {
        Self {
            size,
            stride: 0,
            usage_flags: ResourceUsage::AS_TRANSFERABLE,
            memory_usage: MemoryUsage::CpuToGpu,
        }
    }

    pub fn element_count(&self) -> u64 {
        if self.stride == 0 {
            self.size
        } else {
            self.size / self.stride
        }
    }

    pub fn verify(&self) {
        assert_ne!(self.size, 0);
        assert!(!self
            .usage_flags
            .intersects(ResourceUsage::TEXTURE_ONLY_USAGE_FLAGS));
    }
}

pub(crate) struct BufferInner {
    pub(crate) device_context: DeviceContext,
    pub(crate) desc: BufferDesc,
    pub(crate) name: String,
    pub(crate) buffer_id: u64,
    pub(crate) state: Mutex<ResourceState>,
    pub(crate) last_use_fence: AtomicU64,
    // Host-visible storage for CpuToGpu/GpuToCpu memory.
    pub(crate) mapped: Option<Mutex<Vec<u8>>>,
}

/// A GPU-backed buffer, shared by handle. Equality and hashing use the
/// stable buffer id.
#[derive(Clone)]
pub struct Buffer {
    pub(crate) inner: Arc<BufferInner>,
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.inner.buffer_id == other.inner.buffer_id
    }
}

impl Eq for Buffer {}

impl Hash for Buffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.buffer_id.hash(state);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.buffer_id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Buffer {
    pub fn definition(&self) -> &BufferDesc {
        &self.inner.desc
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> u64 {
        self.inner.buffer_id
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.inner.device_context
    }

    pub fn state(&self) -> ResourceState {
        *self.inner.state.lock()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.inner.state.lock() = state;
    }

    pub fn last_use_fence(&self) -> u64 {
        self.inner.last_use_fence.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_used(&self, fence: u64) {
        self.inner.last_use_fence.fetch_max(fence, Ordering::Relaxed);
    }

    /// Host-visible bytes for readback/upload memory; panics for GPU-only
    /// buffers.
    pub fn mapped_data(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner
            .mapped
            .as_ref()
            .expect("mapped_data on a GPU-only buffer")
            .lock()
    }

    pub fn copy_to_host_visible_buffer<T: Copy>(&self, data: &[T]) {
        let data_size = std::mem::size_of_val(data);
        let mut mapped = self.mapped_data();
        assert!(data_size as u64 <= self.inner.desc.size);

        let src = data.as_ptr().cast::<u8>();
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(src, mapped.as_mut_ptr(), data_size);
        }
    }

    pub fn read_host_visible_buffer<T: Copy + Default>(&self, count: usize) -> Vec<T> {
        let mapped = self.mapped_data();
        let elem_size = std::mem::size_of::<T>();
        assert!((count * elem_size) as u64 <= self.inner.desc.size);

        let mut out = vec![T::default(); count];
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(
                mapped.as_ptr(),
                out.as_mut_ptr().cast::<u8>(),
                count * elem_size,
            );
        }
        out
    }

    pub fn create_view(&self, view_def: BufferViewDef) -> BufferView {
        debug_assert!(view_def.byte_offset + view_def.element_count * view_def.element_size.max(1) <= self.inner.desc.size);
        BufferView {
            buffer: self.clone(),
            def: view_def,
        }
    }

    pub fn srv(&self) -> BufferView {
        self.create_view(BufferViewDef::as_shader_resource(self.definition()))
    }

    pub fn uav(&self) -> BufferView {
        self.create_view(BufferViewDef::as_unordered_access(self.definition()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferViewDef {
    pub gpu_view_type: GPUViewType,
    pub byte_offset: u64,
    pub element_count: u64,
    pub element_size: u64,
}

impl BufferViewDef {
    pub fn as_shader_resource(desc: &BufferDesc) -> Self {
        Self {
            gpu_view_type: GPUViewType::ShaderResource,
            byte_offset: 0,
            element_count: desc.element_count(),
            element_size: desc.stride,
        }
    }

    pub fn as_unordered_access(desc: &BufferDesc) -> Self {
        Self {
            gpu_view_type: GPUViewType::UnorderedAccess,
            byte_offset: 0,
            element_count: desc.element_count(),
            element_size: desc.stride,
        }
    }
}

/// A buffer plus the sub-range and interpretation a shader binds.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferView {
    buffer: Buffer,
    def: BufferViewDef,
}

impl BufferView {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn definition(&self) -> &BufferViewDef {
        &self.def
    }
}

/// Either kind of shader-visible view, for table binds.
#[derive(Clone, Debug)]
pub enum ResourceView {
    Texture(crate::TextureView),
    Buffer(BufferView),
}

impl From<crate::TextureView> for ResourceView {
    fn from(view: crate::TextureView) -> Self {
        Self::Texture(view)
    }
}

impl From<BufferView> for ResourceView {
    fn from(view: BufferView) -> Self {
        Self::Buffer(view)
    }
}

pub(crate) fn new_buffer(
    device_context: &DeviceContext,
    desc: BufferDesc,
    name: &str,
    buffer_id: u64,
) -> GfxResult<Buffer> {
    desc.verify();
    let mapped = match desc.memory_usage {
        MemoryUsage::GpuOnly => None,
        MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
            Some(Mutex::new(vec![0u8; desc.size as usize]))
        }
    };
    Ok(Buffer {
        inner: Arc::new(BufferInner {
            device_context: device_context.clone(),
            desc,
            name: name.to_string(),
            buffer_id,
            state: Mutex::new(ResourceState::UNDEFINED),
            last_use_fence: AtomicU64::new(0),
            mapped,
        }),
    })
}
