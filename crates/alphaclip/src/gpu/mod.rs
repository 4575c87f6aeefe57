pub mod context;
pub mod geometry;
pub mod render_target;
pub mod software;
pub mod uniforms;
pub mod wgpu_device;

use serde::{Deserialize, Serialize};

pub use context::GpuContext;
pub use geometry::GeometryBuffers;
pub use software::SoftwareDevice;
pub use wgpu_device::WgpuDevice;

use crate::error::{PlayerError, ShaderStage};
use crate::media::DecodedFrame;
use crate::settings::PlayerConfig;

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn id(self) -> u32 {
                self.0
            }
        }
    };
}

gpu_handle!(
    /// Compiled shader stage.
    ShaderHandle
);
gpu_handle!(
    /// Linked vertex + fragment pair.
    ProgramHandle
);
gpu_handle!(BufferHandle);
gpu_handle!(TextureHandle);

/// Hands out device-unique, never-reused object ids.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    fn next(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn shader(&mut self) -> ShaderHandle {
        ShaderHandle(self.next())
    }

    pub fn program(&mut self) -> ProgramHandle {
        ProgramHandle(self.next())
    }

    pub fn buffer(&mut self) -> BufferHandle {
        BufferHandle(self.next())
    }

    pub fn texture(&mut self) -> TextureHandle {
        TextureHandle(self.next())
    }
}

/// How often a vertex buffer is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written once at creation.
    Static,
    /// Rewritten every composite tick.
    Dynamic,
}

/// Everything one composite needs: a cleared color+depth target and a
/// textured quad drawn with `program`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub position_buffer: BufferHandle,
    pub tex_coord_buffer: BufferHandle,
    pub texture: TextureHandle,
    pub resolution: [f32; 2],
    pub clear_color: [f64; 4],
    pub vertex_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub shaders_compiled: u32,
    pub programs_linked: u32,
    pub buffers_created: u32,
    pub buffer_writes: u64,
    pub textures_created: u32,
    pub frame_uploads: u64,
    pub draws: u64,
    pub live_objects: u32,
}

/// Largest 2D texture side wgpu guarantees with `Limits::default()`.
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Reject textures the device cannot allocate before asking it to.
pub fn check_texture_size(width: u32, height: u32, max_dimension: u32) -> Result<(), String> {
    if width == 0 || height == 0 {
        return Err(format!("texture {width}x{height} is empty"));
    }
    if width > max_dimension || height > max_dimension {
        return Err(format!(
            "texture {width}x{height} exceeds the device limit of {max_dimension}px"
        ));
    }
    Ok(())
}

/// The GPU operations the player needs, addressed by opaque handles.
///
/// Deleting an unknown handle is a no-op that returns `false`.
pub trait RenderDevice {
    fn label(&self) -> &str;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String>;
    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, String>;

    fn create_buffer(&mut self, label: &str, contents: &[f32], usage: BufferUsage) -> BufferHandle;
    fn write_buffer(&mut self, buffer: BufferHandle, contents: &[f32]) -> Result<(), String>;

    fn create_texture(&mut self, label: &str) -> TextureHandle;
    /// Upload a full RGBA8 frame (RGBA internal, RGBA source, one unsigned byte
    /// per channel). Reallocates storage when the frame size changes.
    fn upload_frame(&mut self, texture: TextureHandle, frame: &DecodedFrame) -> Result<(), String>;

    fn resize_surface(&mut self, width: u32, height: u32);
    fn surface_size(&self) -> Option<(u32, u32)>;
    fn draw(&mut self, call: &DrawCall) -> Result<(), String>;
    /// Read the output surface back as straight-alpha RGBA.
    fn read_surface(&mut self) -> Result<image::RgbaImage, String>;

    fn delete_buffer(&mut self, buffer: BufferHandle) -> bool;
    fn delete_texture(&mut self, texture: TextureHandle) -> bool;
    fn delete_program(&mut self, program: ProgramHandle) -> bool;
    fn delete_shader(&mut self, shader: ShaderHandle) -> bool;

    fn stats(&self) -> DeviceStats;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gpu,
    Software,
}

/// Acquire a render device. GPU adapter or device failure is fatal.
pub fn create_device(config: &PlayerConfig) -> Result<Box<dyn RenderDevice>, PlayerError> {
    match config.backend {
        BackendKind::Gpu => {
            let gpu = GpuContext::new(config.power_preference.into())?;
            Ok(Box::new(WgpuDevice::new(gpu)))
        }
        BackendKind::Software => Ok(Box::new(SoftwareDevice::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_reused() {
        let mut alloc = HandleAllocator::default();
        let a = alloc.buffer();
        let b = alloc.buffer();
        let t = alloc.texture();
        assert_ne!(a, b);
        assert_ne!(b.id(), t.id());
        assert!(a.id() > 0);
    }

    #[test]
    fn texture_size_checked_against_limit() {
        assert!(check_texture_size(3840, 1080, DEFAULT_MAX_TEXTURE_DIMENSION).is_ok());
        let err = check_texture_size(3840, 1080, 2048).unwrap_err();
        assert!(err.contains("2048"));
        assert!(check_texture_size(0, 4, 2048).is_err());
    }

    #[test]
    fn software_backend_always_available() {
        let config = PlayerConfig {
            backend: BackendKind::Software,
            ..PlayerConfig::default()
        };
        let device = create_device(&config).unwrap();
        assert_eq!(device.label(), "software");
    }
}
