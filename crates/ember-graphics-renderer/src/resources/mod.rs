mod pipeline_manager;
mod readback;
mod screenshot;

pub use pipeline_manager::{PipelineHandle, PipelineManager};
pub use readback::GpuBufferWithReadback;
pub use screenshot::ScreenshotQueue;
