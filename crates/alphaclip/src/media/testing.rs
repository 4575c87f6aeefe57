//! Scripted media element for driving the controller and player in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::element::MediaElement;
use super::types::{DecodedFrame, ElementState, MediaEvent};

#[derive(Default)]
struct Script {
    events: VecDeque<Vec<MediaEvent>>,
    source: Option<String>,
    frame: Option<DecodedFrame>,
    size: Option<(u32, u32)>,
    looping: bool,
    muted: bool,
    advancing: bool,
    play_calls: usize,
    set_source_calls: usize,
}

/// Element whose observations are queued by the test. Clones share one script,
/// so a test keeps a clone after boxing the element into the player.
#[derive(Clone)]
pub struct ScriptedElement {
    script: Rc<RefCell<Script>>,
    source: Option<String>,
    frame: Option<DecodedFrame>,
}

impl ScriptedElement {
    /// Element reporting a `width`x`height` packed source with an opaque red/white frame.
    pub fn new(width: u32, height: u32) -> Self {
        let frame = packed_frame(width, height, [255, 0, 0], 255);
        let script = Script {
            frame: Some(frame),
            size: Some((width, height)),
            ..Script::default()
        };
        Self {
            script: Rc::new(RefCell::new(script)),
            source: None,
            frame: None,
        }
    }

    /// Queue one event for the next `update` call.
    pub fn push(&self, event: MediaEvent) {
        self.push_batch(vec![event]);
    }

    /// Queue a batch delivered together by a single `update` call.
    pub fn push_batch(&self, events: Vec<MediaEvent>) {
        self.script.borrow_mut().events.push_back(events);
    }

    pub fn set_frame(&self, frame: DecodedFrame) {
        let mut script = self.script.borrow_mut();
        script.size = Some((frame.width, frame.height));
        script.frame = Some(frame);
    }

    pub fn set_advancing(&self, advancing: bool) {
        self.script.borrow_mut().advancing = advancing;
    }

    pub fn source(&self) -> Option<String> {
        self.script.borrow().source.clone()
    }

    pub fn muted(&self) -> bool {
        self.script.borrow().muted
    }

    pub fn looping(&self) -> bool {
        self.script.borrow().looping
    }

    pub fn play_calls(&self) -> usize {
        self.script.borrow().play_calls
    }

    pub fn set_source_calls(&self) -> usize {
        self.script.borrow().set_source_calls
    }
}

/// Packed frame: left half `rgb` at full alpha, right half a grey mask of `mask`.
pub fn packed_frame(width: u32, height: u32, rgb: [u8; 3], mask: u8) -> DecodedFrame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _y in 0..height {
        for x in 0..width {
            if x < width / 2 {
                data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            } else {
                data.extend_from_slice(&[mask, mask, mask, 255]);
            }
        }
    }
    DecodedFrame {
        data,
        width,
        height,
    }
}

impl MediaElement for ScriptedElement {
    fn set_source(&mut self, uri: &str) {
        let mut script = self.script.borrow_mut();
        script.source = Some(uri.to_string());
        script.set_source_calls += 1;
        script.advancing = false;
        self.source = Some(uri.to_string());
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn play(&mut self) {
        self.script.borrow_mut().play_calls += 1;
    }

    fn is_advancing(&self) -> bool {
        self.script.borrow().advancing
    }

    fn set_looping(&mut self, looping: bool) {
        self.script.borrow_mut().looping = looping;
    }

    fn looping(&self) -> bool {
        self.script.borrow().looping
    }

    fn set_muted(&mut self, muted: bool) {
        self.script.borrow_mut().muted = muted;
    }

    fn muted(&self) -> bool {
        self.script.borrow().muted
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        self.script.borrow().size
    }

    fn current_frame(&self) -> Option<&DecodedFrame> {
        self.frame.as_ref()
    }

    fn state(&self) -> ElementState {
        if self.script.borrow().advancing {
            ElementState::Advancing
        } else {
            ElementState::Ready
        }
    }

    fn update(&mut self, _dt_secs: f64) -> Vec<MediaEvent> {
        let mut script = self.script.borrow_mut();
        self.frame.clone_from(&script.frame);
        script.events.pop_front().unwrap_or_default()
    }
}
