use std::collections::HashMap;

use super::{
    BufferHandle, BufferUsage, DEFAULT_MAX_TEXTURE_DIMENSION, DeviceStats, DrawCall,
    HandleAllocator, ProgramHandle, RenderDevice, ShaderHandle, TextureHandle,
    check_texture_size,
};
use crate::error::ShaderStage;
use crate::media::DecodedFrame;
use crate::shader::program::{FRAGMENT_ENTRY, VERTEX_ENTRY};

/// CPU reference device.
///
/// Rasterizes the axis-aligned quad described by the bound position and
/// texcoord buffers and applies the packed-alpha rule with nearest sampling:
/// color from `(u, v)`, alpha from the red channel at `(u + 0.5, v)`.
/// Shader "compilation" only checks that the stage's entry point is present.
pub struct SoftwareDevice {
    handles: HandleAllocator,
    shaders: HashMap<ShaderHandle, ShaderStage>,
    programs: HashMap<ProgramHandle, (ShaderHandle, ShaderHandle)>,
    buffers: HashMap<BufferHandle, Vec<f32>>,
    textures: HashMap<TextureHandle, DecodedFrame>,
    surface: Option<image::RgbaImage>,
    stats: DeviceStats,
    fail_next_link: Option<String>,
    max_texture_dimension: u32,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            handles: HandleAllocator::default(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            surface: None,
            stats: DeviceStats::default(),
            fail_next_link: None,
            max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
        }
    }

    /// Emulate a device whose textures are capped at `max` pixels per side.
    pub fn with_max_texture_dimension(max: u32) -> Self {
        Self {
            max_texture_dimension: max,
            ..Self::new()
        }
    }

    /// Make the next `link_program` fail with `log`.
    pub fn fail_next_link(&mut self, log: &str) {
        self.fail_next_link = Some(log.to_string());
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[f32]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    fn live_objects(&self) -> u32 {
        (self.shaders.len() + self.programs.len() + self.buffers.len() + self.textures.len())
            as u32
    }
}

/// Nearest texel at normalized `(u, v)`, clamped to the edge.
fn sample_nearest(frame: &DecodedFrame, u: f32, v: f32) -> [u8; 4] {
    let x = ((u * frame.width as f32).floor() as i64).clamp(0, frame.width as i64 - 1) as usize;
    let y = ((v * frame.height as f32).floor() as i64).clamp(0, frame.height as i64 - 1) as usize;
    let idx = (y * frame.width as usize + x) * 4;
    [
        frame.data[idx],
        frame.data[idx + 1],
        frame.data[idx + 2],
        frame.data[idx + 3],
    ]
}

/// The packed-alpha fragment rule.
pub fn shade_packed(frame: &DecodedFrame, u: f32, v: f32) -> [u8; 4] {
    let mut color = sample_nearest(frame, u, v);
    if u < 0.5 {
        let mask = sample_nearest(frame, u + 0.5, v);
        color[3] = mask[0];
    }
    color
}

fn unit_to_u8(c: f64) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl RenderDevice for SoftwareDevice {
    fn label(&self) -> &str {
        "software"
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderHandle, String> {
        let entry = match stage {
            ShaderStage::Vertex => VERTEX_ENTRY,
            ShaderStage::Fragment => FRAGMENT_ENTRY,
        };
        if source.trim().is_empty() {
            return Err("empty shader source".to_string());
        }
        if !source.contains(&format!("fn {entry}")) {
            return Err(format!("entry point `{entry}` not found"));
        }
        let handle = self.handles.shader();
        self.shaders.insert(handle, stage);
        self.stats.shaders_compiled += 1;
        Ok(handle)
    }

    fn link_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, String> {
        if let Some(log) = self.fail_next_link.take() {
            return Err(log);
        }
        match (self.shaders.get(&vertex), self.shaders.get(&fragment)) {
            (Some(ShaderStage::Vertex), Some(ShaderStage::Fragment)) => {}
            (Some(_), Some(_)) => {
                return Err("shader stages do not pair up as vertex + fragment".to_string());
            }
            _ => return Err("unknown shader".to_string()),
        }
        let handle = self.handles.program();
        self.programs.insert(handle, (vertex, fragment));
        self.stats.programs_linked += 1;
        Ok(handle)
    }

    fn create_buffer(&mut self, _label: &str, contents: &[f32], _usage: BufferUsage) -> BufferHandle {
        let handle = self.handles.buffer();
        self.buffers.insert(handle, contents.to_vec());
        self.stats.buffers_created += 1;
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, contents: &[f32]) -> Result<(), String> {
        let target = self.buffers.get_mut(&buffer).ok_or("unknown buffer")?;
        if target.len() != contents.len() {
            return Err(format!(
                "buffer holds {} floats, write of {} floats",
                target.len(),
                contents.len()
            ));
        }
        target.copy_from_slice(contents);
        self.stats.buffer_writes += 1;
        Ok(())
    }

    fn create_texture(&mut self, _label: &str) -> TextureHandle {
        let handle = self.handles.texture();
        self.textures.insert(
            handle,
            DecodedFrame {
                data: vec![0; 4],
                width: 1,
                height: 1,
            },
        );
        self.stats.textures_created += 1;
        handle
    }

    fn upload_frame(&mut self, texture: TextureHandle, frame: &DecodedFrame) -> Result<(), String> {
        if !frame.is_well_formed() {
            return Err(format!(
                "frame {}x{} carries {} bytes",
                frame.width,
                frame.height,
                frame.data.len()
            ));
        }
        check_texture_size(frame.width, frame.height, self.max_texture_dimension)?;
        let target = self.textures.get_mut(&texture).ok_or("unknown texture")?;
        target.clone_from(frame);
        self.stats.frame_uploads += 1;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if let Err(e) = check_texture_size(width, height, self.max_texture_dimension) {
            log::error!("Output surface not resized: {e}");
            self.surface = None;
            return;
        }
        if self.surface_size() != Some((width, height)) {
            self.surface = Some(image::RgbaImage::new(width, height));
        }
    }

    fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| s.dimensions())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), String> {
        if !self.programs.contains_key(&call.program) {
            return Err("unknown program".to_string());
        }
        let positions = self
            .buffers
            .get(&call.position_buffer)
            .ok_or("unknown position buffer")?;
        let tex_coords = self
            .buffers
            .get(&call.tex_coord_buffer)
            .ok_or("unknown texcoord buffer")?;
        let frame = self.textures.get(&call.texture).ok_or("unknown texture")?;
        let surface = self.surface.as_mut().ok_or("output surface not sized")?;
        if positions.len() < 12 || tex_coords.len() < 12 || call.vertex_count < 6 {
            return Err("quad needs six vertices".to_string());
        }

        let clear = call.clear_color.map(unit_to_u8);
        for px in surface.pixels_mut() {
            px.0 = clear;
        }

        // Vertex 0 is the top-left corner, vertex 5 the bottom-right.
        let (sw, sh) = surface.dimensions();
        let [res_w, res_h] = call.resolution;
        if res_w <= 0.0 || res_h <= 0.0 {
            return Err("resolution must be positive".to_string());
        }
        let to_px_x = |x: f32| x / res_w * sw as f32;
        let to_px_y = |y: f32| y / res_h * sh as f32;
        let (x1, y1) = (to_px_x(positions[0]), to_px_y(positions[1]));
        let (x2, y2) = (to_px_x(positions[10]), to_px_y(positions[11]));
        let (u1, v1) = (tex_coords[0], tex_coords[1]);
        let (u2, v2) = (tex_coords[10], tex_coords[11]);
        if x2 <= x1 || y2 <= y1 {
            self.stats.draws += 1;
            return Ok(());
        }

        for (x, y, px) in surface.enumerate_pixels_mut() {
            let cx = x as f32 + 0.5;
            let cy = y as f32 + 0.5;
            if cx < x1 || cx >= x2 || cy < y1 || cy >= y2 {
                continue;
            }
            let u = u1 + (cx - x1) / (x2 - x1) * (u2 - u1);
            let v = v1 + (cy - y1) / (y2 - y1) * (v2 - v1);
            px.0 = shade_packed(frame, u, v);
        }
        self.stats.draws += 1;
        Ok(())
    }

    fn read_surface(&mut self) -> Result<image::RgbaImage, String> {
        self.surface
            .clone()
            .ok_or_else(|| "output surface not sized".to_string())
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> bool {
        self.buffers.remove(&buffer).is_some()
    }

    fn delete_texture(&mut self, texture: TextureHandle) -> bool {
        self.textures.remove(&texture).is_some()
    }

    fn delete_program(&mut self, program: ProgramHandle) -> bool {
        self.programs.remove(&program).is_some()
    }

    fn delete_shader(&mut self, shader: ShaderHandle) -> bool {
        self.shaders.remove(&shader).is_some()
    }

    fn stats(&self) -> DeviceStats {
        DeviceStats {
            live_objects: self.live_objects(),
            ..self.stats
        }
    }
}
