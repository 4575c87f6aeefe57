pub mod controller;
pub mod decoder;
pub mod element;
pub mod types;
#[cfg(feature = "video")]
pub mod video;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{SessionToken, SignalKind, SourceSignal, VideoSourceController};
pub use decoder::MediaSource;
pub use element::{ClipElement, MediaElement};
pub use types::{DecodedFrame, ElementState, LoadCancel, MediaEvent};
