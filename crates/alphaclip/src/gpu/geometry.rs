use super::{BufferHandle, BufferUsage, RenderDevice};

/// Vertices per quad: two triangles, no index buffer.
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Texture coordinates selecting the left (color) half of the packed frame.
/// Vertex order matches [`quad_vertices`].
pub const PACKED_TEX_COORDS: [f32; 12] = [
    0.0, 0.0, //
    0.5, 0.0, //
    0.0, 1.0, //
    0.0, 1.0, //
    0.5, 0.0, //
    0.5, 1.0, //
];

/// Pixel-space rectangle as two triangles, origin top-left.
pub fn quad_vertices(x: f32, y: f32, width: f32, height: f32) -> [f32; 12] {
    let x1 = x;
    let x2 = x + width;
    let y1 = y;
    let y2 = y + height;
    [
        x1, y1, //
        x2, y1, //
        x1, y2, //
        x1, y2, //
        x2, y1, //
        x2, y2, //
    ]
}

/// Quad buffers: positions rewritten per composite, tex coords written once.
#[derive(Debug)]
pub struct GeometryBuffers {
    position: Option<BufferHandle>,
    tex_coord: Option<BufferHandle>,
}

impl GeometryBuffers {
    pub fn new(device: &mut dyn RenderDevice) -> Self {
        let position = device.create_buffer(
            "quad-position",
            &quad_vertices(0.0, 0.0, 1.0, 1.0),
            BufferUsage::Dynamic,
        );
        let tex_coord =
            device.create_buffer("quad-texcoord", &PACKED_TEX_COORDS, BufferUsage::Static);
        Self {
            position: Some(position),
            tex_coord: Some(tex_coord),
        }
    }

    pub fn position(&self) -> Option<BufferHandle> {
        self.position
    }

    pub fn tex_coord(&self) -> Option<BufferHandle> {
        self.tex_coord
    }

    /// Re-upload the quad to span a `width`x`height` surface. The buffer is reused.
    pub fn set_surface_rect(
        &self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
    ) -> Result<(), String> {
        let buffer = self.position.ok_or("position buffer released")?;
        device.write_buffer(buffer, &quad_vertices(0.0, 0.0, width as f32, height as f32))
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(buffer) = self.position.take() {
            device.delete_buffer(buffer);
        }
        if let Some(buffer) = self.tex_coord.take() {
            device.delete_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareDevice;

    #[test]
    fn quad_covers_rect_with_two_triangles() {
        let v = quad_vertices(0.0, 0.0, 128.0, 64.0);
        assert_eq!(v.len() as u32, QUAD_VERTEX_COUNT * 2);
        assert_eq!(&v[0..2], &[0.0, 0.0]);
        assert_eq!(&v[10..12], &[128.0, 64.0]);
        let xs: Vec<f32> = v.iter().step_by(2).copied().collect();
        assert!(xs.iter().all(|&x| x == 0.0 || x == 128.0));
    }

    #[test]
    fn tex_coords_stay_in_left_half() {
        for pair in PACKED_TEX_COORDS.chunks(2) {
            assert!((0.0..=0.5).contains(&pair[0]));
            assert!((0.0..=1.0).contains(&pair[1]));
        }
    }

    #[test]
    fn resize_rewrites_without_reallocating() {
        let mut device = SoftwareDevice::new();
        let geometry = GeometryBuffers::new(&mut device);
        let before = geometry.position();
        geometry.set_surface_rect(&mut device, 64, 32).unwrap();
        geometry.set_surface_rect(&mut device, 128, 32).unwrap();
        assert_eq!(geometry.position(), before);
        assert_eq!(device.stats().buffers_created, 2);
        assert_eq!(device.stats().buffer_writes, 2);
        let contents = device.buffer_contents(before.unwrap()).unwrap();
        assert_eq!(&contents[10..12], &[128.0, 32.0]);
    }

    #[test]
    fn release_is_idempotent() {
        let mut device = SoftwareDevice::new();
        let mut geometry = GeometryBuffers::new(&mut device);
        geometry.release(&mut device);
        geometry.release(&mut device);
        assert!(geometry.position().is_none());
        assert_eq!(device.stats().live_objects, 0);
    }
}
