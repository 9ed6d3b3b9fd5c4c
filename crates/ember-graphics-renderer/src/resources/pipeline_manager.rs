use ember_graphics_api::{DeviceContext, GfxResult, Pipeline, PipelineDef};
use parking_lot::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineHandle(u32);

impl PipelineHandle {
    pub fn invalid() -> Self {
        Self(u32::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }
}

struct Slot {
    def: PipelineDef,
    pipeline: Option<Pipeline>,
}

/// Registry of pipeline-state objects addressed by handle.
///
/// A failed (re)build keeps the previous pipeline alive and logs the
/// diagnostic, so a bad shader edit never takes down rendering.
pub struct PipelineManager {
    device: DeviceContext,
    slots: RwLock<Vec<Slot>>,
}

impl PipelineManager {
    pub fn new(device: &DeviceContext) -> Self {
        Self {
            device: device.clone(),
            slots: RwLock::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &DeviceContext {
        &self.device
    }

    pub fn register_pipeline(&self, def: PipelineDef) -> PipelineHandle {
        let pipeline = match self.build(&def) {
            Ok(pipeline) => Some(pipeline),
            Err(error) => {
                log::error!("pipeline creation failed: {}", error);
                None
            }
        };
        let mut slots = self.slots.write();
        slots.push(Slot { def, pipeline });
        PipelineHandle(slots.len() as u32 - 1)
    }

    /// Swap in a new definition, e.g. after a shader edit on disk. The old
    /// pipeline survives when the rebuild fails.
    pub fn rebuild_pipeline(&self, handle: PipelineHandle, def: PipelineDef) {
        let mut slots = self.slots.write();
        let slot = &mut slots[handle.0 as usize];
        match self.build(&def) {
            Ok(pipeline) => {
                slot.def = def;
                slot.pipeline = Some(pipeline);
            }
            Err(error) => {
                log::error!(
                    "pipeline rebuild failed, keeping previous pipeline: {}",
                    error
                );
            }
        }
    }

    pub fn get_pipeline(&self, handle: PipelineHandle) -> Option<Pipeline> {
        if !handle.is_valid() {
            return None;
        }
        self.slots.read()[handle.0 as usize].pipeline.clone()
    }

    fn build(&self, def: &PipelineDef) -> GfxResult<Pipeline> {
        match def {
            PipelineDef::Graphics(graphics) => self.device.create_graphics_pipeline(graphics.clone()),
            PipelineDef::Compute(compute) => self.device.create_compute_pipeline(compute.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_graphics_api::{
        ComputePipelineDef, DeviceDesc, GraphicsPipelineDef, RootSignatureDef, ShaderRef,
    };

    #[test]
    fn failed_rebuild_keeps_previous_pipeline() {
        // Mesh shaders are rejected when the capability is off, which stands
        // in for a failed shader compile.
        let device = DeviceContext::new(&DeviceDesc {
            capabilities: ember_graphics_api::DeviceCapabilities {
                mesh_shading: false,
                ..Default::default()
            },
            ..DeviceDesc::default()
        })
        .unwrap();
        let manager = PipelineManager::new(&device);

        let handle = manager.register_pipeline(PipelineDef::Compute(ComputePipelineDef {
            shader: ShaderRef::new("cull.hlsl", "CullInstancesCS"),
            root_signature: RootSignatureDef::default(),
        }));
        let before = manager.get_pipeline(handle).unwrap();

        let mut bad = GraphicsPipelineDef::default();
        bad.mesh_shader = Some(ShaderRef::new("raster.hlsl", "MSMain"));
        manager.rebuild_pipeline(handle, PipelineDef::Graphics(bad));

        let after = manager.get_pipeline(handle).unwrap();
        assert_eq!(after.id(), before.id());
    }
}
