pub mod compositor;
pub mod events;
pub mod resources;
pub mod session;
pub mod state;

use compositor::FrameCompositor;
use resources::{GpuResources, ResourceIds};

pub use events::{EVENT_QUEUE_CAPACITY, ListenerId, PlayerEvent};
pub use session::{OutputSurface, PlaybackSession};
pub use state::{PlaybackState, Transition};

use crate::error::{PlayerError, PlayerResult};
use crate::gpu::{DeviceStats, RenderDevice, create_device};
use crate::media::{
    ClipElement, MediaElement, SessionToken, SignalKind, SourceSignal, VideoSourceController,
};
use crate::settings::PlayerConfig;
use crate::shader::Diagnostics;
use events::EventHub;

/// Packed-alpha video player.
///
/// Owns the media element, the render device and the playback state
/// machine. The host calls [`AlphaPlayer::tick`] once per display frame and
/// reads the output surface afterwards.
pub struct AlphaPlayer {
    device: Option<Box<dyn RenderDevice>>,
    controller: Option<VideoSourceController>,
    session: Option<PlaybackSession>,
    resources: Option<GpuResources>,
    gpu_failed: bool,
    surface: Option<OutputSurface>,
    compositor: FrameCompositor,
    hub: EventHub,
    diagnostics: Diagnostics,
}

impl AlphaPlayer {
    /// Acquire the configured device and a `ClipElement`. Fails if no GPU
    /// context can be created for the GPU backend.
    pub fn new(config: &PlayerConfig) -> PlayerResult<Self> {
        let device = create_device(config)?;
        let mut element = ClipElement::new(config.media.clone());
        element.set_looping(config.default_loop);
        Ok(Self::with_parts(device, Box::new(element)))
    }

    pub fn with_parts(device: Box<dyn RenderDevice>, element: Box<dyn MediaElement>) -> Self {
        let mut player = Self {
            device: Some(device),
            controller: None,
            session: None,
            resources: None,
            gpu_failed: false,
            surface: None,
            compositor: FrameCompositor::default(),
            hub: EventHub::default(),
            diagnostics: Diagnostics::default(),
        };
        player.initialize(element);
        player
    }

    /// Create the source controller. GPU objects wait for the first ready frame.
    fn initialize(&mut self, element: Box<dyn MediaElement>) {
        self.controller = Some(VideoSourceController::new(element));
    }

    /// Load and play a packed-alpha source. No-op once destroyed.
    pub fn play(&mut self, uri: &str) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };
        log::info!("play {uri}");
        self.compositor.cancel();
        self.gpu_failed = false;
        let token = controller.load(uri);
        self.session = Some(PlaybackSession::new(token, uri));
    }

    /// Advance one display frame: run the composite scheduled last tick and
    /// handle whatever the media element observed.
    pub fn tick(&mut self, dt_secs: f64) {
        let scheduled = self.compositor.take_pending();
        let signals = match self.controller.as_mut() {
            Some(controller) => controller.pump(dt_secs),
            None => return,
        };
        for signal in signals {
            self.handle_signal(signal);
        }
        if let Some(token) = scheduled {
            if !self.compositor.is_armed() {
                self.run_composite(token);
            }
        }
    }

    fn handle_signal(&mut self, signal: SourceSignal) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if signal.session != session.token {
            log::debug!(
                "Dropping {:?} from stale session {}",
                signal.kind,
                signal.session.value()
            );
            return;
        }
        match signal.kind {
            SignalKind::ReadyToPlay => {
                session.apply(Transition::Buffered);
            }
            SignalKind::FirstFrameReady { width, height } => {
                if session.apply(Transition::FirstAdvance) {
                    self.begin_playback(width, height);
                }
            }
            SignalKind::Ended => {
                if session.apply(Transition::EndOfStream) {
                    self.compositor.cancel();
                    let source = session.source_uri.clone();
                    self.hub.emit(PlayerEvent::PlayEnd { source });
                }
            }
            SignalKind::Error(message) => {
                if session.apply(Transition::Failure) {
                    self.compositor.cancel();
                    let source = session.source_uri.clone();
                    self.hub.emit(PlayerEvent::Error {
                        source,
                        error: PlayerError::Source(message),
                    });
                }
            }
        }
    }

    /// The single point where the surface is sized and GPU objects are built.
    fn begin_playback(&mut self, width: u32, height: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(device) = self.device.as_mut() else {
            return;
        };
        let token = session.token;
        let source = session.source_uri.clone();

        if session.native_size.is_none() {
            session.native_size = Some((width, height));
            let surface = OutputSurface::for_packed(width, height);
            log::info!(
                "{source}: packed {width}x{height}, surface {}x{}",
                surface.width,
                surface.height
            );
            device.resize_surface(surface.width, surface.height);
            self.surface = Some(surface);
        }

        if self.resources.is_none() && !self.gpu_failed {
            self.resources = GpuResources::build(device.as_mut(), &mut self.diagnostics);
            self.gpu_failed = self.resources.is_none();
        }

        self.run_composite(token);
        self.hub.emit(PlayerEvent::PlayBegin { source });
    }

    /// One composite tick for `token`; re-arms only while that session plays.
    fn run_composite(&mut self, token: SessionToken) {
        let Self {
            device,
            controller,
            session,
            resources,
            surface,
            compositor,
            ..
        } = self;
        let (Some(device), Some(controller), Some(session), Some(resources), Some(surface)) =
            (device, controller, session.as_ref(), resources.as_ref(), surface.as_ref())
        else {
            return;
        };
        if session.token != token || session.state != PlaybackState::Playing {
            return;
        }
        let Some(frame) = controller.current_frame() else {
            compositor.arm(token);
            return;
        };
        match compositor.composite(
            device.as_mut(),
            resources,
            surface.width,
            surface.height,
            frame,
        ) {
            Ok(()) => compositor.arm(token),
            Err(e) => log::error!("{}: composite failed, stopping: {e}", session.source_uri),
        }
    }

    pub fn looping(&self) -> bool {
        self.controller.as_ref().is_some_and(|c| c.looping())
    }

    pub fn set_looping(&mut self, looping: bool) {
        if let Some(controller) = self.controller.as_mut() {
            controller.set_looping(looping);
        }
    }

    /// Size of the drawable surface, once the first frame of a session was ready.
    pub fn output_surface(&self) -> Option<OutputSurface> {
        self.surface
    }

    /// Read the composited surface back as straight-alpha RGBA.
    pub fn read_output(&mut self) -> Option<image::RgbaImage> {
        self.surface?;
        let device = self.device.as_mut()?;
        match device.read_surface() {
            Ok(img) => Some(img),
            Err(e) => {
                log::warn!("Surface readback failed: {e}");
                None
            }
        }
    }

    pub fn media_handle(&self) -> Option<&dyn MediaElement> {
        self.controller.as_ref().map(VideoSourceController::element)
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn state(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map_or(PlaybackState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn set_play_begin_callback(&mut self, cb: impl FnMut() + 'static) {
        self.hub.set_play_begin(Box::new(cb));
    }

    pub fn set_play_end_callback(&mut self, cb: impl FnMut() + 'static) {
        self.hub.set_play_end(Box::new(cb));
    }

    pub fn set_error_callback(&mut self, cb: impl FnMut() + 'static) {
        self.hub.set_error(Box::new(cb));
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&PlayerEvent) + 'static) -> ListenerId {
        self.hub.subscribe(Box::new(listener))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Polled event queue. Every notification is also queued here; only the
    /// newest [`EVENT_QUEUE_CAPACITY`] are kept.
    pub fn events(&self) -> crossbeam_channel::Receiver<PlayerEvent> {
        self.hub.receiver()
    }

    /// Where shader compile and link reports go.
    pub fn set_diagnostics_hook(&mut self, hook: impl FnMut(&PlayerError) + 'static) {
        self.diagnostics = Diagnostics::new(hook);
    }

    pub fn resource_ids(&self) -> Option<ResourceIds> {
        self.resources.as_ref().and_then(GpuResources::ids)
    }

    pub fn device_stats(&self) -> Option<DeviceStats> {
        self.device.as_ref().map(|d| d.stats())
    }

    pub fn frames_composited(&self) -> u64 {
        self.compositor.frames_composited()
    }

    /// Release every GPU object and drop the device and media element.
    /// Later calls on this player are no-ops.
    pub fn destroy(&mut self) {
        self.compositor.cancel();
        if let Some(device) = self.device.as_mut() {
            if let Some(mut resources) = self.resources.take() {
                resources.release(device.as_mut());
                log::info!("GPU resources released");
            }
        }
        self.resources = None;
        self.device = None;
        self.controller = None;
        self.session = None;
        self.surface = None;
        self.gpu_failed = false;
        self.hub.clear();
    }
}

impl Drop for AlphaPlayer {
    fn drop(&mut self) {
        self.destroy();
    }
}
