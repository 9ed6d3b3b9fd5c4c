use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Command;
use crate::{
    Buffer, ColorClearValue, CommandSignature, DepthStencilClearValue, DeviceContext, GfxResult,
    LoadOp, Pipeline, PipelineType, ResourceState, ResourceView, RootSignature, StateObject,
    StoreOp, Texture, TextureView, MAX_ROOT_CONSTANT_DWORDS,
};

#[derive(Clone, Debug)]
pub struct ColorRenderTargetBinding {
    pub texture_view: TextureView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_value: ColorClearValue,
    pub resolve_target: Option<TextureView>,
}

#[derive(Clone, Debug)]
pub struct DepthStencilRenderTargetBinding {
    pub texture_view: TextureView,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub write_depth: bool,
    pub clear_value: DepthStencilClearValue,
}

/// CPU-writable memory valid for the lifetime of one submission, with a GPU
/// address shaders can consume.
#[derive(Clone)]
pub struct TransientAllocation {
    data: Arc<Mutex<Vec<u8>>>,
    gpu_address: u64,
}

impl TransientAllocation {
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    pub fn size(&self) -> usize {
        self.data.lock().len()
    }

    pub fn write_slice<T: Copy>(&self, offset: usize, data: &[T]) {
        let byte_len = std::mem::size_of_val(data);
        let mut dst = self.data.lock();
        assert!(offset + byte_len <= dst.len());
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr().cast::<u8>(),
                dst.as_mut_ptr().add(offset),
                byte_len,
            );
        }
    }
}

/// A stateful recorder bound to a single submission.
///
/// Barriers are coalesced: `transition_*` only queues them, and the pending
/// set is flushed by `flush_barriers` or implicitly before any GPU work.
pub struct CommandContext {
    device_context: DeviceContext,
    commands: Vec<Command>,
    pending_barriers: Vec<Command>,
    cur_pipeline: Option<Pipeline>,
    cur_graphics_signature: Option<RootSignature>,
    cur_compute_signature: Option<RootSignature>,
    has_active_render_pass: bool,
    touched_textures: Vec<Texture>,
    touched_buffers: Vec<Buffer>,
    transient_allocations: Vec<TransientAllocation>,
    next_transient_address: u64,
}

impl CommandContext {
    pub(crate) fn new(device_context: &DeviceContext) -> Self {
        Self {
            device_context: device_context.clone(),
            commands: Vec::new(),
            pending_barriers: Vec::new(),
            cur_pipeline: None,
            cur_graphics_signature: None,
            cur_compute_signature: None,
            has_active_render_pass: false,
            touched_textures: Vec::new(),
            touched_buffers: Vec::new(),
            transient_allocations: Vec::new(),
            next_transient_address: 0x0100_0000,
        }
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.device_context
    }

    //
    // Barriers
    //

    /// Queue a transition of every mip of `texture` to `new_state`.
    pub fn transition(&mut self, texture: &Texture, new_state: ResourceState) {
        for mip in 0..texture.definition().mip_count {
            self.transition_mip(texture, mip, new_state);
        }
    }

    pub fn transition_mip(&mut self, texture: &Texture, mip: u32, new_state: ResourceState) {
        debug_assert!(
            !self.has_active_render_pass,
            "barriers may not be recorded inside a render pass"
        );
        let src_state = texture.sub_state(mip);
        if src_state == new_state {
            return;
        }
        texture.set_sub_state(mip, new_state);
        self.touched_textures.push(texture.clone());
        self.pending_barriers.push(Command::TransitionTexture {
            texture_id: texture.id(),
            mip: Some(mip as u8),
            src_state,
            dst_state: new_state,
        });
    }

    pub fn transition_buffer(&mut self, buffer: &Buffer, new_state: ResourceState) {
        debug_assert!(
            !self.has_active_render_pass,
            "barriers may not be recorded inside a render pass"
        );
        let src_state = buffer.state();
        if src_state == new_state {
            return;
        }
        buffer.set_state(new_state);
        self.touched_buffers.push(buffer.clone());
        self.pending_barriers.push(Command::TransitionBuffer {
            buffer_id: buffer.id(),
            src_state,
            dst_state: new_state,
        });
    }

    /// Wait for all previous unordered writes before further unordered access.
    pub fn uav_barrier(&mut self) {
        self.pending_barriers
            .push(Command::UavBarrier { resource_id: None });
    }

    pub fn uav_barrier_buffer(&mut self, buffer: &Buffer) {
        self.touched_buffers.push(buffer.clone());
        self.pending_barriers.push(Command::UavBarrier {
            resource_id: Some(buffer.id()),
        });
    }

    pub fn uav_barrier_texture(&mut self, texture: &Texture) {
        self.touched_textures.push(texture.clone());
        self.pending_barriers.push(Command::UavBarrier {
            resource_id: Some(texture.id()),
        });
    }

    pub fn flush_barriers(&mut self) {
        self.commands.append(&mut self.pending_barriers);
    }

    //
    // Render passes
    //

    pub fn begin_render_pass(
        &mut self,
        color_targets: &[ColorRenderTargetBinding],
        depth_target: &Option<DepthStencilRenderTargetBinding>,
    ) {
        assert!(
            !(color_targets.is_empty() && depth_target.is_none()),
            "no color or depth target supplied to begin_render_pass"
        );
        if self.has_active_render_pass {
            self.end_render_pass();
        }
        self.flush_barriers();

        // All attachments must agree on dimensions and sample count.
        let reference = color_targets
            .first()
            .map(|c| c.texture_view.texture().definition())
            .or_else(|| depth_target.as_ref().map(|d| d.texture_view.texture().definition()));
        if let Some(reference) = reference {
            for target in color_targets {
                let desc = target.texture_view.texture().definition();
                assert!(
                    desc.width == reference.width
                        && desc.height == reference.height
                        && desc.sample_count == reference.sample_count,
                    "render target attachments must share dimensions and sample count"
                );
            }
            if let Some(depth) = depth_target {
                let desc = depth.texture_view.texture().definition();
                assert!(
                    desc.sample_count == reference.sample_count,
                    "depth target sample count must match color targets"
                );
            }
        }

        for target in color_targets {
            self.touched_textures.push(target.texture_view.texture().clone());
            if let Some(resolve) = &target.resolve_target {
                self.touched_textures.push(resolve.texture().clone());
            }
        }
        if let Some(depth) = depth_target {
            self.touched_textures.push(depth.texture_view.texture().clone());
        }

        self.commands.push(Command::BeginRenderPass {
            color_target_ids: color_targets
                .iter()
                .map(|c| c.texture_view.texture().id())
                .collect(),
            depth_target_id: depth_target.as_ref().map(|d| d.texture_view.texture().id()),
        });
        self.has_active_render_pass = true;
    }

    pub fn end_render_pass(&mut self) {
        debug_assert!(self.has_active_render_pass);
        self.commands.push(Command::EndRenderPass);
        self.has_active_render_pass = false;
    }

    pub fn with_label<F>(&mut self, label: &str, f: F)
    where
        F: FnOnce(&mut Self),
    {
        self.commands.push(Command::BeginLabel(label.to_string()));
        f(self);
        self.commands.push(Command::EndLabel);
    }

    //
    // Binds
    //

    pub fn set_graphics_root_signature(&mut self, signature: &RootSignature) {
        self.cur_graphics_signature = Some(signature.clone());
        self.commands.push(Command::SetGraphicsRootSignature {
            signature_id: signature.id(),
        });
    }

    pub fn set_compute_root_signature(&mut self, signature: &RootSignature) {
        self.cur_compute_signature = Some(signature.clone());
        self.commands.push(Command::SetComputeRootSignature {
            signature_id: signature.id(),
        });
    }

    pub fn set_pipeline_state(&mut self, pipeline: &Pipeline) {
        self.cur_pipeline = Some(pipeline.clone());
        self.commands.push(Command::SetPipeline {
            pipeline_id: pipeline.id(),
        });
    }

    /// Bind a work-graph program with its persistent backing memory.
    /// `initialize` must be set whenever the backing buffer identity changed.
    pub fn set_program(&mut self, state_object: &StateObject, backing: &Buffer, initialize: bool) {
        debug_assert!(backing.definition().size >= state_object.workgraph_backing_size());
        self.touched_buffers.push(backing.clone());
        self.commands.push(Command::SetProgram {
            state_object_id: state_object.id(),
            backing_buffer_id: backing.id(),
            initialize,
        });
    }

    pub fn set_root_constants<T: Copy>(&mut self, slot: u32, constants: &T) {
        let size = std::mem::size_of::<T>();
        assert!(size as u32 <= MAX_ROOT_CONSTANT_DWORDS * 4);
        self.commands.push(Command::SetRootConstants {
            slot,
            data: as_bytes(constants),
        });
    }

    pub fn set_root_cbv<T: Copy>(&mut self, slot: u32, data: &T) {
        self.commands.push(Command::SetRootCbv {
            slot,
            data: as_bytes(data),
        });
    }

    pub fn bind_resources(&mut self, slot: u32, views: &[ResourceView]) {
        let resource_ids = views
            .iter()
            .map(|view| match view {
                ResourceView::Texture(v) => {
                    self.touched_textures.push(v.texture().clone());
                    v.texture().id()
                }
                ResourceView::Buffer(v) => {
                    self.touched_buffers.push(v.buffer().clone());
                    v.buffer().id()
                }
            })
            .collect();
        self.commands.push(Command::BindResources { slot, resource_ids });
    }

    pub fn set_stencil_ref(&mut self, value: u32) {
        self.commands.push(Command::SetStencilRef { value });
    }

    //
    // Work
    //

    fn pre_work(&mut self, expected: Option<PipelineType>) {
        if let Some(expected) = expected {
            let pipeline = self
                .cur_pipeline
                .as_ref()
                .expect("GPU work recorded without a bound pipeline");
            debug_assert!(
                pipeline.pipeline_type() == expected,
                "bound pipeline type does not match the recorded operation"
            );
            debug_assert!(
                match expected {
                    PipelineType::Graphics => self.cur_graphics_signature.is_some(),
                    PipelineType::Compute => self.cur_compute_signature.is_some(),
                },
                "no root signature bound for the recorded operation"
            );
        }
        if !self.has_active_render_pass {
            self.flush_barriers();
        }
    }

    pub fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        debug_assert!(!self.has_active_render_pass, "dispatch inside a render pass");
        self.pre_work(Some(PipelineType::Compute));
        self.commands.push(Command::Dispatch {
            group_count: [group_count_x, group_count_y, group_count_z],
        });
    }

    pub fn dispatch_1d(&mut self, group_count_x: u32) {
        self.dispatch(group_count_x, 1, 1);
    }

    pub fn dispatch_mesh(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.pre_work(Some(PipelineType::Graphics));
        self.commands.push(Command::DispatchMesh {
            group_count: [group_count_x, group_count_y, group_count_z],
        });
    }

    pub fn dispatch_graph(&mut self, entry_point: u32, record_count: u32) {
        debug_assert!(
            self.device_context.capabilities().work_graphs,
            "dispatch_graph on a device without work-graph support"
        );
        self.pre_work(None);
        self.commands.push(Command::DispatchGraph {
            entry_point,
            record_count,
        });
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.draw_instanced(vertex_count, first_vertex, 1);
    }

    pub fn draw_instanced(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32) {
        self.pre_work(Some(PipelineType::Graphics));
        self.commands.push(Command::Draw {
            vertex_count,
            first_vertex,
            instance_count,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
        instance_count: u32,
    ) {
        self.pre_work(Some(PipelineType::Graphics));
        self.commands.push(Command::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
            instance_count,
        });
    }

    pub fn execute_indirect(
        &mut self,
        signature: CommandSignature,
        max_count: u32,
        args_buffer: &Buffer,
        args_offset: u64,
    ) {
        debug_assert!(
            args_buffer
                .definition()
                .usage_flags
                .intersects(crate::ResourceUsage::AS_INDIRECT_ARGS),
            "indirect argument buffer is missing the indirect-args usage"
        );
        self.pre_work(None);
        self.touched_buffers.push(args_buffer.clone());
        self.commands.push(Command::ExecuteIndirect {
            op: signature.op,
            max_count,
            args_buffer_id: args_buffer.id(),
            args_offset,
        });
    }

    //
    // Copies and clears
    //

    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer) {
        self.pre_work(None);
        self.touched_buffers.push(src.clone());
        self.touched_buffers.push(dst.clone());
        // The in-process backend moves host-visible bytes so readbacks
        // observe real data.
        if let (Some(src_mem), Some(dst_mem)) = (&src.inner.mapped, &dst.inner.mapped) {
            let src_data = src_mem.lock().clone();
            let mut dst_data = dst_mem.lock();
            let n = src_data.len().min(dst_data.len());
            dst_data[..n].copy_from_slice(&src_data[..n]);
        }
        self.commands.push(Command::CopyBuffer {
            src_id: src.id(),
            dst_id: dst.id(),
            size: src.definition().size.min(dst.definition().size),
        });
    }

    pub fn copy_texture(&mut self, src: &Texture, dst: &Texture) {
        self.pre_work(None);
        self.touched_textures.push(src.clone());
        self.touched_textures.push(dst.clone());
        self.commands.push(Command::CopyTexture {
            src_id: src.id(),
            dst_id: dst.id(),
        });
    }

    pub fn copy_texture_to_buffer(&mut self, src: &Texture, dst: &Buffer) {
        self.pre_work(None);
        self.touched_textures.push(src.clone());
        self.touched_buffers.push(dst.clone());
        self.commands.push(Command::CopyTextureToBuffer {
            src_id: src.id(),
            dst_id: dst.id(),
        });
    }

    pub fn resolve_texture(&mut self, src: &Texture, dst: &Texture) {
        self.pre_work(None);
        self.touched_textures.push(src.clone());
        self.touched_textures.push(dst.clone());
        self.commands.push(Command::ResolveTexture {
            src_id: src.id(),
            dst_id: dst.id(),
        });
    }

    pub fn clear_uav_uint(&mut self, buffer: &Buffer, values: [u32; 4]) {
        self.pre_work(None);
        self.touched_buffers.push(buffer.clone());
        self.commands.push(Command::ClearUavUint {
            resource_id: buffer.id(),
            values,
        });
    }

    pub fn clear_texture_uav_uint(&mut self, texture: &Texture, values: [u32; 4]) {
        self.pre_work(None);
        self.touched_textures.push(texture.clone());
        self.commands.push(Command::ClearUavUint {
            resource_id: texture.id(),
            values,
        });
    }

    pub fn clear_uav_float(&mut self, texture: &Texture, values: [f32; 4]) {
        self.pre_work(None);
        self.touched_textures.push(texture.clone());
        self.commands.push(Command::ClearUavFloat {
            resource_id: texture.id(),
            values,
        });
    }

    pub fn fill_buffer(&mut self, buffer: &Buffer, offset: u64, size: u64, value: u32) {
        self.pre_work(None);
        self.touched_buffers.push(buffer.clone());
        self.commands.push(Command::FillBuffer {
            buffer_id: buffer.id(),
            offset,
            size,
            value,
        });
    }

    //
    // Transient uploads
    //

    pub fn allocate_transient_memory(&mut self, size: usize) -> TransientAllocation {
        let allocation = TransientAllocation {
            data: Arc::new(Mutex::new(vec![0u8; size])),
            gpu_address: self.next_transient_address,
        };
        self.next_transient_address += (size as u64 + 255) & !255;
        self.transient_allocations.push(allocation.clone());
        allocation
    }

    //
    // Submission
    //

    /// Submit the recorded stream. Returns the fence value signaled at
    /// completion; with `wait_for_completion` the call blocks until then.
    pub fn execute(&mut self, wait_for_completion: bool) -> GfxResult<u64> {
        assert!(
            !self.has_active_render_pass,
            "execute called with an open render pass"
        );
        self.flush_barriers();

        let commands = std::mem::take(&mut self.commands);
        let fence = self.device_context.submit(commands, wait_for_completion);

        for texture in self.touched_textures.drain(..) {
            texture.mark_used(fence);
        }
        for buffer in self.touched_buffers.drain(..) {
            buffer.mark_used(fence);
        }
        self.transient_allocations.clear();
        self.cur_pipeline = None;
        self.cur_graphics_signature = None;
        self.cur_compute_signature = None;

        Ok(fence)
    }

    /// Number of commands recorded and not yet submitted.
    pub fn recorded_command_count(&self) -> usize {
        self.commands.len() + self.pending_barriers.len()
    }
}

fn as_bytes<T: Copy>(value: &T) -> Vec<u8> {
    let size = std::mem::size_of::<T>();
    let mut data = vec![0u8; size];
    #[allow(unsafe_code)]
    unsafe {
        std::ptr::copy_nonoverlapping((value as *const T).cast::<u8>(), data.as_mut_ptr(), size);
    }
    data
}

#[cfg(test)]
mod tests {
    use crate::backend::Command;
    use crate::{
        BufferDesc, ComputePipelineDef, DeviceContext, DeviceDesc, Format, ResourceState,
        RootSignatureDef, ShaderRef, TextureDesc,
    };

    fn device() -> DeviceContext {
        DeviceContext::new(&DeviceDesc::default()).unwrap()
    }

    #[test]
    fn barriers_are_coalesced_until_work() {
        let device = device();
        let texture = device
            .create_texture(TextureDesc::create_2d(64, 64, Format::R32_UINT), "vis")
            .unwrap();
        let mut context = device.allocate_context();

        context.transition(&texture, ResourceState::UNORDERED_ACCESS);
        assert_eq!(context.recorded_command_count(), 1);

        let pipeline = device
            .create_compute_pipeline(ComputePipelineDef {
                shader: ShaderRef::new("clear.comp", "main"),
                root_signature: RootSignatureDef::default(),
            })
            .unwrap();
        context.set_compute_root_signature(pipeline.root_signature());
        context.set_pipeline_state(&pipeline);
        context.dispatch(1, 1, 1);

        context.execute(false).unwrap();
        let submissions = device.take_submissions();
        let commands = &submissions[0].commands;

        // The transition lands before the dispatch.
        let barrier_at = commands
            .iter()
            .position(|c| matches!(c, Command::TransitionTexture { .. }))
            .unwrap();
        let dispatch_at = commands
            .iter()
            .position(|c| matches!(c, Command::Dispatch { .. }))
            .unwrap();
        assert!(barrier_at < dispatch_at);
    }

    #[test]
    fn redundant_transitions_are_dropped() {
        let device = device();
        let buffer = device
            .create_buffer(BufferDesc::create_structured(4, 4), "counters")
            .unwrap();
        let mut context = device.allocate_context();

        context.transition_buffer(&buffer, ResourceState::UNORDERED_ACCESS);
        context.transition_buffer(&buffer, ResourceState::UNORDERED_ACCESS);
        assert_eq!(context.recorded_command_count(), 1);
        context.execute(false).unwrap();
    }

    #[test]
    fn resources_are_fence_tracked() {
        let device = device();
        let buffer = device
            .create_buffer(BufferDesc::create_structured(4, 4), "counters")
            .unwrap();
        let mut context = device.allocate_context();
        context.transition_buffer(&buffer, ResourceState::COPY_DST);
        let fence = context.execute(false).unwrap();
        assert_eq!(buffer.last_use_fence(), fence);
    }

    #[test]
    #[should_panic(expected = "without a bound pipeline")]
    fn dispatch_without_pipeline_fails_loudly() {
        let device = device();
        let mut context = device.allocate_context();
        context.dispatch(1, 1, 1);
    }

    #[test]
    fn transient_allocations_are_writable_and_addressed() {
        let device = device();
        let mut context = device.allocate_context();

        let first = context.allocate_transient_memory(256);
        let second = context.allocate_transient_memory(64);
        assert_ne!(first.gpu_address(), second.gpu_address());

        first.write_slice(0, &[1.0f32, 2.0, 3.0]);
        assert_eq!(first.size(), 256);
        context.execute(false).unwrap();
    }
}
