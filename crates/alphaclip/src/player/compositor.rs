use super::resources::GpuResources;
use crate::gpu::geometry::QUAD_VERTEX_COUNT;
use crate::gpu::{DrawCall, RenderDevice};
use crate::media::{DecodedFrame, SessionToken};

/// Fully transparent, so areas outside the quad composite as nothing.
const CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.0, 0.0];

/// Per-frame render step plus its one-shot re-arm slot.
///
/// Each composite schedules the next one for the session that produced it.
/// The host fires the scheduled composite on its next tick; a stale token
/// makes it a no-op.
#[derive(Debug, Default)]
pub struct FrameCompositor {
    pending: Option<SessionToken>,
    frames: u64,
}

impl FrameCompositor {
    pub fn arm(&mut self, session: SessionToken) {
        self.pending = Some(session);
    }

    /// Take the composite scheduled on the previous tick.
    pub fn take_pending(&mut self) -> Option<SessionToken> {
        self.pending.take()
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn frames_composited(&self) -> u64 {
        self.frames
    }

    /// Draw `frame` over the whole `width`x`height` output surface.
    pub fn composite(
        &mut self,
        device: &mut dyn RenderDevice,
        resources: &GpuResources,
        width: u32,
        height: u32,
        frame: &DecodedFrame,
    ) -> Result<(), String> {
        let ids = resources.ids().ok_or("GPU resources released")?;
        resources.geometry.set_surface_rect(device, width, height)?;
        device.upload_frame(ids.texture, frame)?;
        device.draw(&DrawCall {
            program: ids.program,
            position_buffer: ids.position_buffer,
            tex_coord_buffer: ids.tex_coord_buffer,
            texture: ids.texture,
            resolution: [width as f32, height as f32],
            clear_color: CLEAR_COLOR,
            vertex_count: QUAD_VERTEX_COUNT,
        })?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareDevice;
    use crate::media::VideoSourceController;
    use crate::media::testing::{ScriptedElement, packed_frame};
    use crate::shader::Diagnostics;

    #[test]
    fn composite_rewrites_quad_and_draws() {
        let mut device = SoftwareDevice::new();
        let resources = GpuResources::build(&mut device, &mut Diagnostics::default()).unwrap();
        device.resize_surface(4, 2);
        let mut compositor = FrameCompositor::default();
        let frame = packed_frame(8, 2, [0, 0, 255], 255);

        compositor
            .composite(&mut device, &resources, 4, 2, &frame)
            .unwrap();
        compositor
            .composite(&mut device, &resources, 4, 2, &frame)
            .unwrap();

        let stats = device.stats();
        assert_eq!(stats.draws, 2);
        assert_eq!(stats.frame_uploads, 2);
        assert_eq!(stats.buffer_writes, 2);
        assert_eq!(stats.buffers_created, 2);
        assert_eq!(compositor.frames_composited(), 2);
        let out = device.read_surface().unwrap();
        assert_eq!(out.get_pixel(3, 1).0, [0, 0, 255, 255]);
    }

    #[test]
    fn pending_slot_is_one_shot() {
        let mut controller =
            VideoSourceController::new(Box::new(ScriptedElement::new(2, 1)));
        let token = controller.load("clip.mp4");
        let mut compositor = FrameCompositor::default();
        assert!(compositor.take_pending().is_none());
        compositor.arm(token);
        assert!(compositor.is_armed());
        assert_eq!(compositor.take_pending(), Some(token));
        assert!(!compositor.is_armed());
        compositor.arm(token);
        compositor.cancel();
        assert!(compositor.take_pending().is_none());
    }
}
