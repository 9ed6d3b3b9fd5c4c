use bytemuck::Pod;
use ember_graphics_api::{
    Buffer, BufferDesc, CommandContext, DeviceContext, GfxResult, ResourceState,
};

/// A GPU buffer paired with a ring of readback buffers, polled on fence
/// values rather than blocked on. Used for culling stats and the SDSM depth
/// bounds.
pub struct GpuBufferWithReadback {
    buffer: Buffer,
    readbacks: Vec<(Buffer, u64)>,
    cursor: usize,
}

impl GpuBufferWithReadback {
    pub fn new(device: &DeviceContext, name: &str, size: u64) -> GfxResult<Self> {
        let buffer = device.create_buffer(
            BufferDesc::create_structured_with_usage(
                1,
                size,
                ember_graphics_api::ResourceUsage::AS_SHADER_RESOURCE
                    | ember_graphics_api::ResourceUsage::AS_UNORDERED_ACCESS
                    | ember_graphics_api::ResourceUsage::AS_TRANSFERABLE,
            ),
            name,
        )?;

        let mut readbacks = Vec::new();
        for index in 0..ember_graphics_api::MAX_IN_FLIGHT_FRAMES {
            readbacks.push((
                device.create_buffer(
                    BufferDesc::create_readback(size),
                    &format!("{}.readback{}", name, index),
                )?,
                0,
            ));
        }

        Ok(Self {
            buffer,
            readbacks,
            cursor: 0,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn clear(&self, context: &mut CommandContext) {
        context.transition_buffer(&self.buffer, ResourceState::UNORDERED_ACCESS);
        context.clear_uav_uint(&self.buffer, [0; 4]);
    }

    /// Record a copy into the next readback slot; the fence is remembered
    /// once the submission executes.
    pub fn copy_to_readback(&mut self, context: &mut CommandContext) {
        context.transition_buffer(&self.buffer, ResourceState::COPY_SRC);
        let (readback, _) = &self.readbacks[self.cursor];
        context.copy_buffer(&self.buffer, readback);
    }

    /// Called after the submission, with its fence value.
    pub fn end_frame(&mut self, fence: u64) {
        self.readbacks[self.cursor].1 = fence;
        self.cursor = (self.cursor + 1) % self.readbacks.len();
    }

    /// Latest completed readback, if any slot's fence has passed.
    pub fn read_latest<T: Pod + Default>(&self, device: &DeviceContext) -> Option<T> {
        let mut best: Option<(u64, &Buffer)> = None;
        for (buffer, fence) in &self.readbacks {
            if *fence != 0 && device.is_fence_complete(*fence) {
                if best.map_or(true, |(best_fence, _)| *fence > best_fence) {
                    best = Some((*fence, buffer));
                }
            }
        }
        best.map(|(_, buffer)| {
            let data = buffer.read_host_visible_buffer::<u8>(std::mem::size_of::<T>());
            bytemuck::pod_read_unaligned(&data)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_graphics_api::DeviceDesc;

    #[test]
    fn readback_is_polled_not_blocking() {
        let device = DeviceContext::new(&DeviceDesc::default()).unwrap();
        let mut readback =
            GpuBufferWithReadback::new(&device, "stats", std::mem::size_of::<u32>() as u64).unwrap();

        assert_eq!(readback.read_latest::<u32>(&device), None);

        let mut context = device.allocate_context();
        readback.clear(&mut context);
        readback.copy_to_readback(&mut context);
        let fence = context.execute(false).unwrap();
        readback.end_frame(fence);

        assert_eq!(readback.read_latest::<u32>(&device), Some(0));
    }
}
