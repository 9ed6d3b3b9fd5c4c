use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    DeviceContext, Format, GPUViewType, GfxResult, PlaneSlice, ResourceState, ResourceUsage,
    SampleCount,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
}

/// Fully describes a texture; two textures with equal descriptors are
/// interchangeable for transient aliasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array length otherwise.
    pub depth_or_array: u32,
    pub mip_count: u32,
    pub sample_count: SampleCount,
    pub format: Format,
    pub usage_flags: ResourceUsage,
}

impl TextureDesc {
    pub fn create_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            kind: TextureKind::Texture2D,
            width,
            height,
            depth_or_array: 1,
            mip_count: 1,
            sample_count: SampleCount::SampleCount1,
            format,
            usage_flags: ResourceUsage::AS_SHADER_RESOURCE | ResourceUsage::AS_UNORDERED_ACCESS,
        }
    }

    pub fn create_2d_with_mips(width: u32, height: u32, format: Format, mip_count: u32) -> Self {
        Self {
            mip_count,
            ..Self::create_2d(width, height, format)
        }
    }

    pub fn create_3d(width: u32, height: u32, depth: u32, format: Format) -> Self {
        Self {
            kind: TextureKind::Texture3D,
            width,
            height,
            depth_or_array: depth,
            mip_count: 1,
            sample_count: SampleCount::SampleCount1,
            format,
            usage_flags: ResourceUsage::AS_SHADER_RESOURCE | ResourceUsage::AS_UNORDERED_ACCESS,
        }
    }

    pub fn create_render_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            usage_flags: ResourceUsage::AS_RENDER_TARGET | ResourceUsage::AS_SHADER_RESOURCE,
            ..Self::create_2d(width, height, format)
        }
    }

    pub fn create_depth(width: u32, height: u32, format: Format) -> Self {
        debug_assert!(format.has_depth());
        Self {
            format,
            usage_flags: ResourceUsage::AS_DEPTH_STENCIL | ResourceUsage::AS_SHADER_RESOURCE,
            ..Self::create_2d(width, height, Format::Unknown)
        }
    }

    pub fn with_sample_count(self, sample_count: SampleCount) -> Self {
        Self {
            sample_count,
            ..self
        }
    }

    pub fn with_usage(self, usage_flags: ResourceUsage) -> Self {
        Self {
            usage_flags,
            ..self
        }
    }

    pub fn verify(&self) {
        assert!(self.width >= 1 && self.height >= 1 && self.depth_or_array >= 1);
        assert!(self.mip_count >= 1);
        assert!(
            !(self.kind == TextureKind::Texture3D
                && self.usage_flags.intersects(ResourceUsage::AS_DEPTH_STENCIL)
                && self.depth_or_array > 1),
            "3D depth-stencil textures may not have depth > 1"
        );
        assert!(!self
            .usage_flags
            .intersects(ResourceUsage::BUFFER_ONLY_USAGE_FLAGS));
    }

    pub fn mip_extents(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            if self.kind == TextureKind::Texture3D {
                (self.depth_or_array >> mip).max(1)
            } else {
                self.depth_or_array
            },
        )
    }

    /// Approximate allocation size, used for the device memory budget.
    pub fn total_size(&self) -> u64 {
        let mut size = 0u64;
        for mip in 0..self.mip_count {
            let (w, h, d) = self.mip_extents(mip);
            size += u64::from(w) * u64::from(h) * u64::from(d) * self.format.block_size();
        }
        size * self.sample_count as u64
    }
}

pub(crate) struct TextureInner {
    pub(crate) device_context: DeviceContext,
    pub(crate) desc: TextureDesc,
    pub(crate) name: String,
    pub(crate) texture_id: u64,
    // Per-mip resource states, updated as barriers are recorded.
    pub(crate) sub_states: Mutex<Vec<ResourceState>>,
    pub(crate) last_use_fence: AtomicU64,
}

/// A GPU-backed texture, shared by handle. Equality and hashing use the
/// stable texture id.
#[derive(Clone)]
pub struct Texture {
    pub(crate) inner: Arc<TextureInner>,
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.inner.texture_id == other.inner.texture_id
    }
}

impl Eq for Texture {}

impl Hash for Texture {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.texture_id.hash(state);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.texture_id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Texture {
    pub fn definition(&self) -> &TextureDesc {
        &self.inner.desc
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> u64 {
        self.inner.texture_id
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.inner.device_context
    }

    pub fn sub_state(&self, mip: u32) -> ResourceState {
        self.inner.sub_states.lock()[mip as usize]
    }

    pub(crate) fn set_sub_state(&self, mip: u32, state: ResourceState) {
        self.inner.sub_states.lock()[mip as usize] = state;
    }

    pub fn last_use_fence(&self) -> u64 {
        self.inner.last_use_fence.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_used(&self, fence: u64) {
        self.inner.last_use_fence.fetch_max(fence, Ordering::Relaxed);
    }

    pub fn create_view(&self, view_def: TextureViewDef) -> TextureView {
        debug_assert!(view_def.first_mip + view_def.mip_count <= self.inner.desc.mip_count);
        TextureView {
            texture: self.clone(),
            def: view_def,
        }
    }

    pub fn srv(&self) -> TextureView {
        self.create_view(TextureViewDef::as_shader_resource(self.definition()))
    }

    pub fn uav(&self, mip: u32) -> TextureView {
        self.create_view(TextureViewDef::as_unordered_access(mip))
    }

    pub fn rtv(&self) -> TextureView {
        self.create_view(TextureViewDef::as_render_target(0))
    }

    pub fn dsv(&self) -> TextureView {
        self.create_view(TextureViewDef {
            gpu_view_type: GPUViewType::DepthStencil,
            first_mip: 0,
            mip_count: 1,
            plane_slice: PlaneSlice::Depth,
            first_array_slice: 0,
            array_size: 1,
            read_only: false,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureViewDef {
    pub gpu_view_type: GPUViewType,
    pub first_mip: u32,
    pub mip_count: u32,
    pub plane_slice: PlaneSlice,
    pub first_array_slice: u32,
    pub array_size: u32,
    pub read_only: bool,
}

impl TextureViewDef {
    pub fn as_shader_resource(desc: &TextureDesc) -> Self {
        Self {
            gpu_view_type: GPUViewType::ShaderResource,
            first_mip: 0,
            mip_count: desc.mip_count,
            plane_slice: if desc.format.has_depth() {
                PlaneSlice::Depth
            } else {
                PlaneSlice::Default
            },
            first_array_slice: 0,
            array_size: 1,
            read_only: true,
        }
    }

    pub fn as_srv_with_mip(desc: &TextureDesc, first_mip: u32, mip_count: u32) -> Self {
        Self {
            first_mip,
            mip_count,
            ..Self::as_shader_resource(desc)
        }
    }

    pub fn as_unordered_access(mip: u32) -> Self {
        Self {
            gpu_view_type: GPUViewType::UnorderedAccess,
            first_mip: mip,
            mip_count: 1,
            plane_slice: PlaneSlice::Default,
            first_array_slice: 0,
            array_size: 1,
            read_only: false,
        }
    }

    pub fn as_render_target(mip: u32) -> Self {
        Self {
            gpu_view_type: GPUViewType::RenderTarget,
            first_mip: mip,
            mip_count: 1,
            plane_slice: PlaneSlice::Default,
            first_array_slice: 0,
            array_size: 1,
            read_only: false,
        }
    }
}

/// A texture plus the sub-range and interpretation a shader binds.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureView {
    texture: Texture,
    def: TextureViewDef,
}

impl TextureView {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn definition(&self) -> &TextureViewDef {
        &self.def
    }
}

pub(crate) fn new_texture(
    device_context: &DeviceContext,
    desc: TextureDesc,
    name: &str,
    texture_id: u64,
) -> GfxResult<Texture> {
    desc.verify();
    Ok(Texture {
        inner: Arc::new(TextureInner {
            device_context: device_context.clone(),
            desc,
            name: name.to_string(),
            texture_id,
            sub_states: Mutex::new(vec![ResourceState::UNDEFINED; desc.mip_count as usize]),
            last_use_fence: AtomicU64::new(0),
        }),
    })
}
