use super::state::{PlaybackState, Transition};
use crate::media::SessionToken;

/// Pixel buffer the collaborator samples from: the color half of the packed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSurface {
    pub width: u32,
    pub height: u32,
}

impl OutputSurface {
    /// Surface for a packed source of `native_width`x`native_height`.
    pub fn for_packed(native_width: u32, native_height: u32) -> Self {
        Self {
            width: native_width / 2,
            height: native_height,
        }
    }
}

/// The single active decode context, replaced on every `play`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub token: SessionToken,
    pub source_uri: String,
    pub state: PlaybackState,
    /// Full packed-frame size, known from the first ready frame.
    pub native_size: Option<(u32, u32)>,
}

impl PlaybackSession {
    pub fn new(token: SessionToken, source_uri: &str) -> Self {
        Self {
            token,
            source_uri: source_uri.to_string(),
            state: PlaybackState::Loading,
            native_size: None,
        }
    }

    /// Apply `t` if legal. Returns whether the state changed.
    pub fn apply(&mut self, t: Transition) -> bool {
        match self.state.next(t) {
            Some(next) => {
                log::debug!("{}: {:?} -> {:?}", self.source_uri, self.state, next);
                self.state = next;
                true
            }
            None => {
                log::debug!("{}: ignoring {:?} in {:?}", self.source_uri, t, self.state);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_is_color_half() {
        assert_eq!(
            OutputSurface::for_packed(256, 128),
            OutputSurface {
                width: 128,
                height: 128
            }
        );
        assert_eq!(OutputSurface::for_packed(7, 3).width, 3);
    }
}
