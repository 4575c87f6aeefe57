use crate::error::{PlayerError, ShaderStage};
use crate::gpu::{ProgramHandle, RenderDevice, ShaderHandle};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Maps a pixel-space quad to clip space (origin top-left, y flipped) and
/// passes texture coordinates through for interpolation.
pub const PACKED_ALPHA_VS: &str = r#"
struct QuadUniforms {
    resolution: vec2f,
    _pad: vec2f,
}

@group(0) @binding(2) var<uniform> quad: QuadUniforms;

struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) tex_coord: vec2f,
}

@vertex
fn vs_main(@location(0) position: vec2f, @location(1) tex_coord: vec2f) -> VertexOutput {
    let zero_to_one = position / quad.resolution;
    let clip_space = zero_to_one * 2.0 - 1.0;
    var out: VertexOutput;
    out.position = vec4f(clip_space * vec2f(1.0, -1.0), 0.0, 1.0);
    out.tex_coord = tex_coord;
    return out;
}
"#;

/// Samples color from the left half and takes alpha from the red channel of
/// the matching texel in the right half.
pub const PACKED_ALPHA_FS: &str = r#"
@group(0) @binding(0) var packed: texture_2d<f32>;
@group(0) @binding(1) var packed_sampler: sampler;

@fragment
fn fs_main(@location(0) tex_coord: vec2f) -> @location(0) vec4f {
    var color = textureSample(packed, packed_sampler, tex_coord);
    // Sampled unconditionally: textureSample needs uniform control flow.
    let mask = textureSample(packed, packed_sampler, vec2f(tex_coord.x + 0.5, tex_coord.y));
    color.a = select(color.a, mask.r, tex_coord.x < 0.5);
    return color;
}
"#;

/// Attribute locations and bind-group slots shared by both shader stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationTable {
    pub position: u32,
    pub tex_coord: u32,
    pub image: u32,
    pub sampler: u32,
    pub resolution: u32,
}

pub const LOCATIONS: LocationTable = LocationTable {
    position: 0,
    tex_coord: 1,
    image: 0,
    sampler: 1,
    resolution: 2,
};

/// Receives compile and link reports. Defaults to the error log.
pub struct Diagnostics {
    hook: Box<dyn FnMut(&PlayerError)>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(|err| log::error!("{err}"))
    }
}

impl Diagnostics {
    pub fn new(hook: impl FnMut(&PlayerError) + 'static) -> Self {
        Self {
            hook: Box::new(hook),
        }
    }

    pub fn report(&mut self, err: &PlayerError) {
        (self.hook)(err);
    }
}

/// Source with 1-based line numbers, for compile reports.
pub fn numbered_listing(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiled vertex + fragment pair. Immutable once built.
#[derive(Debug)]
pub struct ShaderProgram {
    program: Option<ProgramHandle>,
    vertex: Option<ShaderHandle>,
    fragment: Option<ShaderHandle>,
}

impl ShaderProgram {
    /// Build the packed-alpha program. Failures are reported and yield `None`.
    pub fn build(device: &mut dyn RenderDevice, diagnostics: &mut Diagnostics) -> Option<Self> {
        Self::build_from_sources(device, diagnostics, PACKED_ALPHA_VS, PACKED_ALPHA_FS)
    }

    pub fn build_from_sources(
        device: &mut dyn RenderDevice,
        diagnostics: &mut Diagnostics,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Option<Self> {
        let fragment = compile(device, diagnostics, ShaderStage::Fragment, fragment_source)?;
        let Some(vertex) = compile(device, diagnostics, ShaderStage::Vertex, vertex_source) else {
            device.delete_shader(fragment);
            return None;
        };

        match device.link_program(vertex, fragment) {
            Ok(program) => Some(Self {
                program: Some(program),
                vertex: Some(vertex),
                fragment: Some(fragment),
            }),
            Err(log) => {
                diagnostics.report(&PlayerError::Link(log));
                device.delete_shader(vertex);
                device.delete_shader(fragment);
                None
            }
        }
    }

    pub fn handle(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn locations(&self) -> LocationTable {
        LOCATIONS
    }

    /// Delete the program and both stages. Each handle is released at most once.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(program) = self.program.take() {
            device.delete_program(program);
        }
        if let Some(shader) = self.fragment.take() {
            device.delete_shader(shader);
        }
        if let Some(shader) = self.vertex.take() {
            device.delete_shader(shader);
        }
    }
}

fn compile(
    device: &mut dyn RenderDevice,
    diagnostics: &mut Diagnostics,
    stage: ShaderStage,
    source: &str,
) -> Option<ShaderHandle> {
    match device.compile_shader(stage, source) {
        Ok(handle) => Some(handle),
        Err(log) => {
            diagnostics.report(&PlayerError::ShaderCompile {
                stage,
                log: format!("{log}\n{}", numbered_listing(source)),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::gpu::SoftwareDevice;

    fn recording() -> (Diagnostics, Rc<RefCell<Vec<PlayerError>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (
            Diagnostics::new(move |err| sink.borrow_mut().push(err.clone())),
            seen,
        )
    }

    #[test]
    fn listing_numbers_from_one() {
        assert_eq!(numbered_listing("a\nb"), "1: a\n2: b");
    }

    #[test]
    fn builtin_sources_define_entry_points_and_bindings() {
        assert!(PACKED_ALPHA_VS.contains("fn vs_main"));
        assert!(PACKED_ALPHA_FS.contains("fn fs_main"));
        assert!(PACKED_ALPHA_VS.contains(&format!("@binding({})", LOCATIONS.resolution)));
        assert!(PACKED_ALPHA_FS.contains(&format!("@binding({})", LOCATIONS.image)));
        assert!(PACKED_ALPHA_FS.contains(&format!("@binding({})", LOCATIONS.sampler)));
    }

    #[test]
    fn builds_against_software_device() {
        let mut device = SoftwareDevice::new();
        let (mut diagnostics, seen) = recording();
        let program = ShaderProgram::build(&mut device, &mut diagnostics).unwrap();
        assert!(program.handle().is_some());
        assert!(seen.borrow().is_empty());
        assert_eq!(device.stats().shaders_compiled, 2);
        assert_eq!(device.stats().programs_linked, 1);
    }

    #[test]
    fn compile_failure_reports_numbered_source_and_yields_none() {
        let mut device = SoftwareDevice::new();
        let (mut diagnostics, seen) = recording();
        let program = ShaderProgram::build_from_sources(
            &mut device,
            &mut diagnostics,
            "fn not_a_vertex_shader() {}",
            PACKED_ALPHA_FS,
        );
        assert!(program.is_none());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            PlayerError::ShaderCompile { stage, log } => {
                assert_eq!(*stage, ShaderStage::Vertex);
                assert!(log.contains("1: fn not_a_vertex_shader() {}"));
            }
            other => panic!("unexpected report {other:?}"),
        }
        // The fragment stage that did compile is not leaked.
        assert_eq!(device.stats().live_objects, 0);
    }

    #[test]
    fn link_failure_releases_both_stages() {
        let mut device = SoftwareDevice::new();
        let (mut diagnostics, seen) = recording();
        device.fail_next_link("entry point mismatch");
        let program = ShaderProgram::build(&mut device, &mut diagnostics);
        assert!(program.is_none());
        assert_eq!(
            seen.borrow()[0],
            PlayerError::Link("entry point mismatch".into())
        );
        assert_eq!(device.stats().live_objects, 0);
    }

    #[test]
    fn release_twice_is_harmless() {
        let mut device = SoftwareDevice::new();
        let mut diagnostics = Diagnostics::default();
        let mut program = ShaderProgram::build(&mut device, &mut diagnostics).unwrap();
        program.release(&mut device);
        program.release(&mut device);
        assert!(program.handle().is_none());
        assert_eq!(device.stats().live_objects, 0);
    }
}
