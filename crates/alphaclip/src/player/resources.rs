use crate::gpu::{BufferHandle, GeometryBuffers, ProgramHandle, RenderDevice, TextureHandle};
use crate::shader::{Diagnostics, ShaderProgram};

/// Identities of the lazily built GPU objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceIds {
    pub program: ProgramHandle,
    pub position_buffer: BufferHandle,
    pub tex_coord_buffer: BufferHandle,
    pub texture: TextureHandle,
}

/// Program, quad buffers and frame texture. Built once on the first ready
/// frame and shared by every later session.
#[derive(Debug)]
pub struct GpuResources {
    pub program: ShaderProgram,
    pub geometry: GeometryBuffers,
    texture: Option<TextureHandle>,
}

impl GpuResources {
    /// `None` if the program failed to build; the failure has been reported.
    pub fn build(device: &mut dyn RenderDevice, diagnostics: &mut Diagnostics) -> Option<Self> {
        let Some(program) = ShaderProgram::build(device, diagnostics) else {
            log::error!("Shader program unavailable; compositing disabled");
            return None;
        };
        let geometry = GeometryBuffers::new(device);
        let texture = device.create_texture("packed-frame");
        log::info!("GPU resources built on {} device", device.label());
        Some(Self {
            program,
            geometry,
            texture: Some(texture),
        })
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn ids(&self) -> Option<ResourceIds> {
        Some(ResourceIds {
            program: self.program.handle()?,
            position_buffer: self.geometry.position()?,
            tex_coord_buffer: self.geometry.tex_coord()?,
            texture: self.texture?,
        })
    }

    /// Release every object this holds. Safe on partially released state.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        self.geometry.release(device);
        if let Some(texture) = self.texture.take() {
            device.delete_texture(texture);
        }
        self.program.release(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareDevice;

    #[test]
    fn build_then_release_leaves_nothing_live() {
        let mut device = SoftwareDevice::new();
        let mut diagnostics = Diagnostics::default();
        let mut resources = GpuResources::build(&mut device, &mut diagnostics).unwrap();
        assert!(resources.ids().is_some());
        // program + 2 shaders + 2 buffers + texture
        assert_eq!(device.stats().live_objects, 6);
        resources.release(&mut device);
        resources.release(&mut device);
        assert_eq!(device.stats().live_objects, 0);
        assert!(resources.ids().is_none());
    }

    #[test]
    fn link_failure_builds_nothing() {
        let mut device = SoftwareDevice::new();
        device.fail_next_link("no");
        let mut diagnostics = Diagnostics::new(|_| {});
        assert!(GpuResources::build(&mut device, &mut diagnostics).is_none());
        assert_eq!(device.stats().buffers_created, 0);
        assert_eq!(device.stats().live_objects, 0);
    }
}
