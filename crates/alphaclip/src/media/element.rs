use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use super::decoder::{MediaSource, load_image_media};
use super::types::{DecodedFrame, ElementState, LoadCancel, MediaEvent};
use crate::settings::MediaConfig;

/// The decodable media resource the player drives.
///
/// Implementations load asynchronously and report what they observed through
/// [`MediaElement::update`], which the host calls once per frame tick.
pub trait MediaElement {
    /// Begin loading a new source. Any in-flight load is abandoned.
    fn set_source(&mut self, uri: &str);
    fn source(&self) -> Option<&str>;
    /// Request playback. Honored immediately if loaded, otherwise once ready.
    fn play(&mut self);
    /// True once the play position has moved and the element is neither paused nor ended.
    fn is_advancing(&self) -> bool;
    fn set_looping(&mut self, looping: bool);
    fn looping(&self) -> bool;
    fn set_muted(&mut self, muted: bool);
    fn muted(&self) -> bool;
    /// Native packed dimensions, once metadata is available.
    fn video_size(&self) -> Option<(u32, u32)>;
    fn current_frame(&self) -> Option<&DecodedFrame>;
    fn state(&self) -> ElementState;
    /// Advance the media clock by `dt_secs` and return the state changes observed.
    fn update(&mut self, dt_secs: f64) -> Vec<MediaEvent>;
}

type Loader = Arc<dyn Fn(&str, &LoadCancel) -> Result<MediaSource, String> + Send + Sync>;

/// Pick a decoder by extension. URLs and unknown extensions go to ffmpeg.
pub fn default_loader(
    config: MediaConfig,
) -> impl Fn(&str, &LoadCancel) -> Result<MediaSource, String> {
    move |uri: &str, cancel: &LoadCancel| {
        let path = Path::new(uri);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let is_image = matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "webp" | "gif");
        if is_image {
            return load_image_media(path, config.still_frame_ms);
        }
        load_video_source(&config, uri, cancel)
    }
}

#[cfg(feature = "video")]
fn load_video_source(
    config: &MediaConfig,
    uri: &str,
    cancel: &LoadCancel,
) -> Result<MediaSource, String> {
    super::video::load_video(config, uri, cancel)
}

#[cfg(not(feature = "video"))]
fn load_video_source(
    _config: &MediaConfig,
    uri: &str,
    _cancel: &LoadCancel,
) -> Result<MediaSource, String> {
    Err(format!("{uri}: video decoding not compiled in (enable the `video` feature)"))
}

/// Media element backed by a pre-decoded clip.
///
/// Loading runs on a background thread; the decoded clip is handed over a
/// channel and picked up by the next `update`. Playback is paced by the
/// clip's frame delays.
pub struct ClipElement {
    loader: Loader,
    source_uri: Option<String>,
    pending: Option<Receiver<Result<MediaSource, String>>>,
    cancel: Option<LoadCancel>,
    ready_result: Option<Result<MediaSource, String>>,
    media: Option<MediaSource>,
    state: ElementState,
    looping: bool,
    muted: bool,
    play_requested: bool,
    current_frame: usize,
    frame_elapsed_ms: f64,
    position_secs: f64,
    has_advanced: bool,
}

impl ClipElement {
    pub fn new(config: MediaConfig) -> Self {
        Self::with_loader(default_loader(config))
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn(&str, &LoadCancel) -> Result<MediaSource, String> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            source_uri: None,
            pending: None,
            cancel: None,
            ready_result: None,
            media: None,
            state: ElementState::Empty,
            looping: false,
            muted: false,
            play_requested: false,
            current_frame: 0,
            frame_elapsed_ms: 0.0,
            position_secs: 0.0,
            has_advanced: false,
        }
    }

    /// Block until the in-flight load finishes or `timeout` passes.
    /// The result is still reported by the next `update`.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        let Some(rx) = self.pending.as_ref() else {
            return self.ready_result.is_some() || self.media.is_some();
        };
        match rx.recv_timeout(timeout) {
            Ok(result) => {
                self.ready_result = Some(result);
                self.pending = None;
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.ready_result = Some(Err("loader exited without a result".to_string()));
                self.pending = None;
                true
            }
        }
    }

    pub fn position_secs(&self) -> f64 {
        self.position_secs
    }

    fn spawn_load(&mut self, uri: &str) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let loader = Arc::clone(&self.loader);
        let cancel = LoadCancel::default();
        self.cancel = Some(cancel.clone());
        let uri_owned = uri.to_string();
        let spawned = std::thread::Builder::new()
            .name("clip-loader".into())
            .spawn(move || {
                let result = loader(&uri_owned, &cancel);
                // Receiver is gone if the source was replaced meanwhile.
                let _ = tx.send(result);
            });
        match spawned {
            Ok(_) => self.pending = Some(rx),
            Err(e) => {
                self.ready_result = Some(Err(format!("Failed to spawn loader thread: {e}")));
            }
        }
    }

    /// Tell the in-flight loader, if any, to stop.
    fn cancel_load(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    fn take_load_result(&mut self) -> Option<Result<MediaSource, String>> {
        if let Some(result) = self.ready_result.take() {
            return Some(result);
        }
        let rx = self.pending.as_ref()?;
        match rx.try_recv() {
            Ok(result) => {
                self.pending = None;
                self.cancel = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                Some(Err("loader exited without a result".to_string()))
            }
        }
    }

    fn finish_load(&mut self, result: Result<MediaSource, String>, events: &mut Vec<MediaEvent>) {
        match result {
            Ok(media) => {
                let (width, height) = media.dimensions();
                log::debug!(
                    "Loaded {}: {}x{}, {} frames",
                    self.source_uri.as_deref().unwrap_or("?"),
                    width,
                    height,
                    media.frame_count()
                );
                self.media = Some(media);
                self.state = ElementState::Ready;
                events.push(MediaEvent::LoadedMetadata { width, height });
                events.push(MediaEvent::CanPlay);
                if self.play_requested {
                    self.state = ElementState::Advancing;
                }
            }
            Err(e) => {
                self.state = ElementState::Failed;
                events.push(MediaEvent::Error(e));
            }
        }
    }

    fn advance_clock(&mut self, dt_secs: f64, events: &mut Vec<MediaEvent>) {
        let Some(media) = self.media.as_ref() else {
            return;
        };
        let num_frames = media.frame_count();
        if num_frames == 0 {
            return;
        }

        self.frame_elapsed_ms += dt_secs * 1000.0;
        self.position_secs += dt_secs;
        self.has_advanced = true;

        let mut ended = false;
        loop {
            let current_delay = media.delay_ms(self.current_frame).max(1) as f64;
            if self.frame_elapsed_ms < current_delay {
                break;
            }
            self.frame_elapsed_ms -= current_delay;
            self.current_frame += 1;
            if self.current_frame >= num_frames {
                ended = true;
                break;
            }
        }

        if ended {
            events.push(MediaEvent::Ended);
            if self.looping {
                self.current_frame = 0;
                self.frame_elapsed_ms = 0.0;
                self.position_secs = 0.0;
                events.push(MediaEvent::TimeUpdate { position_secs: 0.0 });
            } else {
                self.current_frame = num_frames - 1;
                self.state = ElementState::Ended;
                self.play_requested = false;
            }
        } else {
            events.push(MediaEvent::TimeUpdate {
                position_secs: self.position_secs,
            });
        }
    }
}

impl Drop for ClipElement {
    fn drop(&mut self) {
        self.cancel_load();
    }
}

impl MediaElement for ClipElement {
    fn set_source(&mut self, uri: &str) {
        self.cancel_load();
        self.source_uri = Some(uri.to_string());
        self.pending = None;
        self.ready_result = None;
        self.media = None;
        self.state = ElementState::Loading;
        self.play_requested = false;
        self.current_frame = 0;
        self.frame_elapsed_ms = 0.0;
        self.position_secs = 0.0;
        self.has_advanced = false;
        self.spawn_load(uri);
    }

    fn source(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    fn play(&mut self) {
        self.play_requested = true;
        match self.state {
            ElementState::Ready => self.state = ElementState::Advancing,
            ElementState::Ended => {
                self.current_frame = 0;
                self.frame_elapsed_ms = 0.0;
                self.position_secs = 0.0;
                self.state = ElementState::Advancing;
            }
            _ => {}
        }
    }

    fn is_advancing(&self) -> bool {
        self.state == ElementState::Advancing && self.has_advanced && self.position_secs > 0.0
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn looping(&self) -> bool {
        self.looping
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn video_size(&self) -> Option<(u32, u32)> {
        self.media.as_ref().map(MediaSource::dimensions)
    }

    fn current_frame(&self) -> Option<&DecodedFrame> {
        self.media.as_ref()?.frame(self.current_frame)
    }

    fn state(&self) -> ElementState {
        self.state
    }

    fn update(&mut self, dt_secs: f64) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        if self.state == ElementState::Loading {
            if let Some(result) = self.take_load_result() {
                self.finish_load(result, &mut events);
            }
        }
        if self.state == ElementState::Advancing && dt_secs > 0.0 {
            self.advance_clock(dt_secs, &mut events);
        }
        events
    }
}
