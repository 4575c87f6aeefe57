use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A decoded packed frame ready for GPU upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub data: Vec<u8>, // RGBA8
    pub width: u32,
    pub height: u32,
}

impl DecodedFrame {
    /// Width of the color half of a side-by-side packed frame.
    pub fn color_width(&self) -> u32 {
        self.width / 2
    }

    /// Whether the buffer length agrees with the stated dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Observable state changes of a media element, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Native packed dimensions are known.
    LoadedMetadata { width: u32, height: u32 },
    /// Enough data is buffered to start playback.
    CanPlay,
    /// The play position advanced.
    TimeUpdate { position_secs: f64 },
    /// End of stream. A looping element rewinds and keeps advancing afterwards.
    Ended,
    /// Network or decode failure. No automatic retry.
    Error(String),
}

/// Readiness of a media element, roughly mirroring an HTML media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Empty,
    Loading,
    Ready,
    Advancing,
    Ended,
    Failed,
}

/// Shared flag telling a background load its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct LoadCancel(Arc<AtomicBool>);

impl LoadCancel {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let cancel = LoadCancel::default();
        let seen_by_loader = cancel.clone();
        assert!(!seen_by_loader.is_cancelled());
        cancel.cancel();
        assert!(seen_by_loader.is_cancelled());
    }

    #[test]
    fn color_width_is_half_of_packed_width() {
        let frame = DecodedFrame {
            data: vec![0; 256 * 128 * 4],
            width: 256,
            height: 128,
        };
        assert_eq!(frame.color_width(), 128);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn short_buffer_is_not_well_formed() {
        let frame = DecodedFrame {
            data: vec![255, 0, 0, 255],
            width: 2,
            height: 1,
        };
        assert!(!frame.is_well_formed());
    }
}
