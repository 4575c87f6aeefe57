use wgpu::{
    Adapter, Device, DeviceDescriptor, ExperimentalFeatures, Instance, InstanceDescriptor,
    MemoryHints, PowerPreference, Queue, RequestAdapterOptions, Trace,
};

use crate::error::PlayerError;

/// Headless device handle. The output surface is an offscreen texture, so no
/// window or swapchain is involved.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
}

impl GpuContext {
    pub fn new(power_preference: PowerPreference) -> Result<Self, PlayerError> {
        let instance = Instance::new(&InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| PlayerError::ContextCreation(format!("no adapter: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("alphaclip-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: ExperimentalFeatures::default(),
            memory_hints: MemoryHints::Performance,
            trace: Trace::Off,
        }))
        .map_err(|e| PlayerError::ContextCreation(format!("device request failed: {e}")))?;

        log::info!(
            "GPU initialized: {} ({:?}), max texture {}px",
            adapter.get_info().name,
            adapter.get_info().backend,
            device.limits().max_texture_dimension_2d
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}
