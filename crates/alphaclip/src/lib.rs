//! Packed-alpha video playback.
//!
//! Sources carry transparency by packing each frame side by side: color on the
//! left half, a greyscale alpha mask on the right. [`AlphaPlayer`] drives a
//! media element, tracks playback through an explicit state machine, and
//! composites every frame into a half-width straight-alpha RGBA surface on a
//! wgpu device (or the CPU reference device).

pub mod error;
pub mod gpu;
pub mod media;
pub mod player;
pub mod settings;
pub mod shader;

pub use error::{PlayerError, PlayerResult, ShaderStage};
pub use gpu::{BackendKind, RenderDevice};
pub use media::{ClipElement, MediaElement};
pub use player::{AlphaPlayer, OutputSurface, PlaybackState, PlayerEvent};
pub use settings::PlayerConfig;
