use super::element::MediaElement;
use super::types::{DecodedFrame, MediaEvent};
use crate::error::PlayerError;

/// Identity of one `load` call. Signals and scheduled work carry the token that
/// was current when they were produced and are dropped once it goes stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(u64);

impl SessionToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Decoder has enough data; a muted play request was issued.
    ReadyToPlay,
    /// First play-position advance of this load (or of a natural loop).
    FirstFrameReady { width: u32, height: u32 },
    Ended,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSignal {
    pub session: SessionToken,
    pub kind: SignalKind,
}

/// Owns the media element and turns its raw events into session-tagged signals.
pub struct VideoSourceController {
    element: Box<dyn MediaElement>,
    session: SessionToken,
    ready: bool,
    first_frame_sent: bool,
}

impl VideoSourceController {
    pub fn new(element: Box<dyn MediaElement>) -> Self {
        Self {
            element,
            session: SessionToken(0),
            ready: false,
            first_frame_sent: false,
        }
    }

    /// Start a new session for `uri`, invalidating the previous one.
    pub fn load(&mut self, uri: &str) -> SessionToken {
        self.session = SessionToken(self.session.0 + 1);
        self.ready = false;
        self.first_frame_sent = false;
        log::debug!("Session {} loading {uri}", self.session.0);
        self.element.set_source(uri);
        self.session
    }

    pub fn session(&self) -> SessionToken {
        self.session
    }

    pub fn element(&self) -> &dyn MediaElement {
        self.element.as_ref()
    }

    pub fn element_mut(&mut self) -> &mut dyn MediaElement {
        self.element.as_mut()
    }

    pub fn looping(&self) -> bool {
        self.element.looping()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.element.set_looping(looping);
    }

    pub fn current_frame(&self) -> Option<&DecodedFrame> {
        self.element.current_frame()
    }

    /// Drive the element clock and translate what it observed.
    pub fn pump(&mut self, dt_secs: f64) -> Vec<SourceSignal> {
        if self.session.0 == 0 {
            return Vec::new();
        }
        let events = self.element.update(dt_secs);
        let mut signals = Vec::with_capacity(events.len());
        for event in events {
            if let Some(kind) = self.translate(event) {
                signals.push(SourceSignal {
                    session: self.session,
                    kind,
                });
            }
        }
        signals
    }

    fn translate(&mut self, event: MediaEvent) -> Option<SignalKind> {
        match event {
            MediaEvent::LoadedMetadata { width, height } => {
                log::info!("Packed source metadata: {width}x{height}");
                None
            }
            MediaEvent::CanPlay => {
                if self.element.is_advancing() {
                    return None;
                }
                // Alpha lives in the picture; audio is never mixed.
                self.element.set_muted(true);
                self.element.play();
                self.ready = true;
                Some(SignalKind::ReadyToPlay)
            }
            MediaEvent::TimeUpdate { .. } => {
                if !self.ready || self.first_frame_sent {
                    return None;
                }
                self.first_frame_sent = true;
                let (width, height) = self.element.video_size().unwrap_or((0, 0));
                if width < 2 || height == 0 {
                    let err = PlayerError::InvalidFrame { width, height };
                    return Some(SignalKind::Error(err.to_string()));
                }
                Some(SignalKind::FirstFrameReady { width, height })
            }
            MediaEvent::Ended => {
                self.first_frame_sent = false;
                Some(SignalKind::Ended)
            }
            MediaEvent::Error(message) => {
                log::error!("Media error: {message}");
                Some(SignalKind::Error(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::ScriptedElement;

    fn controller() -> (VideoSourceController, ScriptedElement) {
        let element = ScriptedElement::new(256, 128);
        (
            VideoSourceController::new(Box::new(element.clone())),
            element,
        )
    }

    fn kinds(signals: &[SourceSignal]) -> Vec<SignalKind> {
        signals.iter().map(|s| s.kind.clone()).collect()
    }

    #[test]
    fn pump_before_load_is_silent() {
        let (mut ctl, script) = controller();
        script.push(MediaEvent::CanPlay);
        assert!(ctl.pump(0.016).is_empty());
    }

    #[test]
    fn ready_issues_muted_play() {
        let (mut ctl, script) = controller();
        ctl.load("clip.mp4");
        script.push(MediaEvent::CanPlay);
        let signals = ctl.pump(0.016);
        assert_eq!(kinds(&signals), vec![SignalKind::ReadyToPlay]);
        assert!(script.muted());
        assert_eq!(script.play_calls(), 1);
    }

    #[test]
    fn can_play_while_advancing_is_ignored() {
        let (mut ctl, script) = controller();
        ctl.load("clip.mp4");
        script.set_advancing(true);
        script.push(MediaEvent::CanPlay);
        assert!(ctl.pump(0.016).is_empty());
        assert_eq!(script.play_calls(), 0);
    }

    #[test]
    fn first_frame_fires_once_per_load() {
        let (mut ctl, script) = controller();
        let token = ctl.load("clip.mp4");
        script.push_batch(vec![
            MediaEvent::CanPlay,
            MediaEvent::TimeUpdate { position_secs: 0.1 },
            MediaEvent::TimeUpdate { position_secs: 0.2 },
        ]);
        let signals = ctl.pump(0.016);
        assert_eq!(
            kinds(&signals),
            vec![
                SignalKind::ReadyToPlay,
                SignalKind::FirstFrameReady {
                    width: 256,
                    height: 128
                }
            ]
        );
        assert!(signals.iter().all(|s| s.session == token));
    }

    #[test]
    fn time_update_before_ready_is_ignored() {
        let (mut ctl, script) = controller();
        ctl.load("clip.mp4");
        script.push(MediaEvent::TimeUpdate { position_secs: 0.1 });
        assert!(ctl.pump(0.016).is_empty());
    }

    #[test]
    fn ended_rearms_first_frame_for_natural_loop() {
        let (mut ctl, script) = controller();
        ctl.load("clip.mp4");
        script.push_batch(vec![
            MediaEvent::CanPlay,
            MediaEvent::TimeUpdate { position_secs: 0.1 },
        ]);
        ctl.pump(0.016);
        script.push_batch(vec![
            MediaEvent::Ended,
            MediaEvent::TimeUpdate { position_secs: 0.0 },
        ]);
        let signals = ctl.pump(0.016);
        assert_eq!(
            kinds(&signals),
            vec![
                SignalKind::Ended,
                SignalKind::FirstFrameReady {
                    width: 256,
                    height: 128
                }
            ]
        );
    }

    #[test]
    fn degenerate_packing_is_an_error() {
        let element = ScriptedElement::new(1, 128);
        let mut ctl = VideoSourceController::new(Box::new(element.clone()));
        ctl.load("thin.mp4");
        element.push_batch(vec![
            MediaEvent::CanPlay,
            MediaEvent::TimeUpdate { position_secs: 0.1 },
        ]);
        let signals = ctl.pump(0.016);
        assert!(matches!(signals[1].kind, SignalKind::Error(_)));
    }

    #[test]
    fn each_load_gets_a_fresh_token() {
        let (mut ctl, script) = controller();
        let first = ctl.load("a.mp4");
        let second = ctl.load("b.mp4");
        assert!(second > first);
        assert_eq!(ctl.session(), second);
        assert_eq!(script.source().as_deref(), Some("b.mp4"));
    }
}
