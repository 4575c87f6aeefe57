use bytemuck::{Pod, Zeroable};
use wgpu::{Buffer, Device, Queue};

/// Vertex-stage uniforms (16 bytes).
/// Must be kept in sync with the WGSL `QuadUniforms` struct.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct QuadUniforms {
    /// Output surface size in pixels.
    pub resolution: [f32; 2],
    pub _pad: [f32; 2],
}

impl QuadUniforms {
    pub fn new(resolution: [f32; 2]) -> Self {
        Self {
            resolution,
            _pad: [0.0; 2],
        }
    }
}

pub struct UniformBuffer {
    pub buffer: Buffer,
}

impl UniformBuffer {
    pub fn new(device: &Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad-uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer }
    }

    pub fn update(&self, queue: &Queue, uniforms: &QuadUniforms) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(uniforms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_uniforms_size_16() {
        assert_eq!(std::mem::size_of::<QuadUniforms>(), 16);
    }

    #[test]
    fn resolution_is_first_field() {
        let u = QuadUniforms::new([128.0, 64.0]);
        let bytes = bytemuck::bytes_of(&u);
        assert_eq!(&bytes[0..4], &128.0f32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &64.0f32.to_ne_bytes());
    }
}
