use std::path::{Path, PathBuf};

use ember_graphics_api::{
    Buffer, BufferDesc, DeviceContext, GfxResult, ResourceState,
};

use crate::core::render_graph::{RGPassFlags, RenderGraph, RenderGraphResource};

struct PendingScreenshot {
    readback: Buffer,
    fence: u64,
    width: u32,
    height: u32,
}

/// Captures the final LDR target into a readback buffer and encodes it as a
/// PNG once the copy's fence completes. Completion is polled, never waited
/// on.
pub struct ScreenshotQueue {
    device: DeviceContext,
    directory: PathBuf,
    pending: Vec<PendingScreenshot>,
}

impl ScreenshotQueue {
    pub fn new(device: &DeviceContext, directory: &Path) -> Self {
        Self {
            device: device.clone(),
            directory: directory.to_path_buf(),
            pending: Vec::new(),
        }
    }

    /// Schedule a copy of `target` (an RGBA8 render target) into a fresh
    /// readback buffer. Call [`Self::notify_submitted`] with the submission
    /// fence afterwards.
    pub fn capture(
        &mut self,
        graph: &mut RenderGraph,
        target: RenderGraphResource,
    ) -> GfxResult<()> {
        let desc = graph
            .texture_desc(target)
            .ok_or_else(|| ember_graphics_api::GfxError::from("screenshot target must be a texture"))?;
        let size = u64::from(desc.width) * u64::from(desc.height) * 4;
        let readback = self
            .device
            .create_buffer(BufferDesc::create_readback(size), "Screenshot.Readback")?;

        let readback_clone = readback.clone();
        graph
            .add_pass("Screenshot Copy", RGPassFlags::COPY | RGPassFlags::NEVER_CULL)
            .read_as(target, ResourceState::COPY_SRC)
            .bind(move |context, resources| {
                context.transition_buffer(&readback_clone, ResourceState::COPY_DST);
                context.copy_texture_to_buffer(resources.get_texture(target), &readback_clone);
            });

        self.pending.push(PendingScreenshot {
            readback,
            fence: 0,
            width: desc.width,
            height: desc.height,
        });
        Ok(())
    }

    /// Record the fence of the submission that carried the copy.
    pub fn notify_submitted(&mut self, fence: u64) {
        for pending in &mut self.pending {
            if pending.fence == 0 {
                pending.fence = fence;
            }
        }
    }

    /// Poll outstanding captures; encode and write each one whose fence has
    /// completed. Returns the paths written this call.
    pub fn tick(&mut self) -> Vec<PathBuf> {
        let mut written = Vec::new();
        let device = self.device.clone();
        let directory = self.directory.clone();

        self.pending.retain(|pending| {
            if pending.fence == 0 || !device.is_fence_complete(pending.fence) {
                return true;
            }

            let data = pending
                .readback
                .read_host_visible_buffer::<u8>((pending.width * pending.height * 4) as usize);
            let timestamp = chrono::Local::now().format("%Y_%m_%d__%H_%M_%S_%3f");
            let path = directory.join(format!("Screenshot_{}.png", timestamp));

            match image::RgbaImage::from_raw(pending.width, pending.height, data) {
                Some(img) => {
                    if let Err(error) = img.save(&path) {
                        log::error!("failed to write screenshot {}: {}", path.display(), error);
                    } else {
                        log::info!("saved screenshot {}", path.display());
                        written.push(path);
                    }
                }
                None => log::error!("screenshot readback size mismatch"),
            }

            device.defer_release_buffer(pending.readback.clone());
            false
        });

        written
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render_graph::{RenderGraph, RenderGraphResourcePool};
    use ember_graphics_api::{DeviceDesc, Format, TextureDesc};

    #[test]
    fn capture_polls_fence_then_writes_png() {
        let device = DeviceContext::new(&DeviceDesc::default()).unwrap();
        let dir = std::env::temp_dir().join("ember_screenshot_test");
        std::fs::create_dir_all(&dir).unwrap();
        let mut queue = ScreenshotQueue::new(&device, &dir);

        let ldr = device
            .create_texture(
                TextureDesc::create_render_target(64, 32, Format::R8G8B8A8_UNORM),
                "ldr",
            )
            .unwrap();

        let mut graph = RenderGraph::new(&device);
        let target = graph.import_texture("ldr", &ldr);
        queue.capture(&mut graph, target).unwrap();

        let mut pool = RenderGraphResourcePool::new();
        let fence = graph.execute(&mut pool).unwrap();
        queue.notify_submitted(fence);
        assert_eq!(queue.pending_count(), 1);

        let written = queue.tick();
        assert_eq!(written.len(), 1);
        assert_eq!(queue.pending_count(), 0);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Screenshot_"));
        assert!(name.ends_with(".png"));
        assert!(written[0].exists());

        std::fs::remove_file(&written[0]).ok();
    }
}
