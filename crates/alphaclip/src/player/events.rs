use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::PlayerError;

/// Notifications raised at state-machine transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    PlayBegin { source: String },
    PlayEnd { source: String },
    Error { source: String, error: PlayerError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Events kept for `events()` pollers. Older ones are dropped first.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

type Callback = Box<dyn FnMut()>;
type Listener = Box<dyn FnMut(&PlayerEvent)>;

/// Fans events out to the single-slot callbacks, registered listeners and
/// the polled queue, in that order. The queue is bounded so a host that never
/// polls it does not accumulate events.
pub struct EventHub {
    on_play_begin: Option<Callback>,
    on_play_end: Option<Callback>,
    on_error: Option<Callback>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    queue_tx: Sender<PlayerEvent>,
    queue_rx: Receiver<PlayerEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        let (queue_tx, queue_rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        Self {
            on_play_begin: None,
            on_play_end: None,
            on_error: None,
            listeners: Vec::new(),
            next_listener: 0,
            queue_tx,
            queue_rx,
        }
    }
}

impl EventHub {
    pub fn set_play_begin(&mut self, cb: Callback) {
        self.on_play_begin = Some(cb);
    }

    pub fn set_play_end(&mut self, cb: Callback) {
        self.on_play_end = Some(cb);
    }

    pub fn set_error(&mut self, cb: Callback) {
        self.on_error = Some(cb);
    }

    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// Receiver side of the event queue. Clones share one queue.
    pub fn receiver(&self) -> Receiver<PlayerEvent> {
        self.queue_rx.clone()
    }

    pub fn emit(&mut self, event: PlayerEvent) {
        let slot = match &event {
            PlayerEvent::PlayBegin { .. } => self.on_play_begin.as_mut(),
            PlayerEvent::PlayEnd { .. } => self.on_play_end.as_mut(),
            PlayerEvent::Error { .. } => self.on_error.as_mut(),
        };
        if let Some(cb) = slot {
            cb();
        }
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
        self.enqueue(event);
    }

    fn enqueue(&self, mut event: PlayerEvent) {
        // We hold a receiver, so the channel is never disconnected.
        while let Err(TrySendError::Full(rejected)) = self.queue_tx.try_send(event) {
            let _ = self.queue_rx.try_recv();
            event = rejected;
        }
    }

    /// Drop every hook and drain the queue.
    pub fn clear(&mut self) {
        self.on_play_begin = None;
        self.on_play_end = None;
        self.on_error = None;
        self.listeners.clear();
        while self.queue_rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    fn begin() -> PlayerEvent {
        PlayerEvent::PlayBegin {
            source: "clip.mp4".into(),
        }
    }

    #[test]
    fn single_slot_is_last_write_wins() {
        let mut hub = EventHub::default();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));
        let f = Rc::clone(&first);
        hub.set_play_begin(Box::new(move || f.set(f.get() + 1)));
        let s = Rc::clone(&second);
        hub.set_play_begin(Box::new(move || s.set(s.get() + 1)));
        hub.emit(begin());
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn listeners_can_unsubscribe() {
        let mut hub = EventHub::default();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let id = hub.subscribe(Box::new(move |_| h.set(h.get() + 1)));
        hub.emit(begin());
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(begin());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn queue_receives_every_event() {
        let mut hub = EventHub::default();
        let rx = hub.receiver();
        hub.emit(begin());
        hub.emit(PlayerEvent::PlayEnd {
            source: "clip.mp4".into(),
        });
        assert_eq!(rx.try_recv().unwrap(), begin());
        assert!(matches!(rx.try_recv().unwrap(), PlayerEvent::PlayEnd { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn error_callback_only_on_error() {
        let mut hub = EventHub::default();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        hub.set_error(Box::new(move || h.set(h.get() + 1)));
        hub.emit(begin());
        hub.emit(PlayerEvent::Error {
            source: "clip.mp4".into(),
            error: PlayerError::Source("404".into()),
        });
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unpolled_queue_stays_bounded() {
        let mut hub = EventHub::default();
        let rx = hub.receiver();
        for i in 0..1000 {
            hub.emit(PlayerEvent::PlayEnd {
                source: format!("loop-{i}"),
            });
        }
        assert_eq!(rx.len(), EVENT_QUEUE_CAPACITY);
        let oldest = rx.try_recv().unwrap();
        assert_eq!(
            oldest,
            PlayerEvent::PlayEnd {
                source: format!("loop-{}", 1000 - EVENT_QUEUE_CAPACITY),
            }
        );
    }
}
