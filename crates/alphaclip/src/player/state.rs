/// Playback lifecycle of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    ReadyWaiting,
    Playing,
    Ended,
    Error,
}

/// Inputs that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Load,
    Buffered,
    FirstAdvance,
    EndOfStream,
    Failure,
}

impl PlaybackState {
    /// The state reached by applying `t`, or `None` if `t` is not legal here.
    pub fn next(self, t: Transition) -> Option<PlaybackState> {
        use PlaybackState::*;
        match (self, t) {
            (_, Transition::Load) => Some(Loading),
            (Loading, Transition::Buffered) => Some(ReadyWaiting),
            // Ended -> Playing is the native loop coming around again.
            (ReadyWaiting | Ended, Transition::FirstAdvance) => Some(Playing),
            (Playing, Transition::EndOfStream) => Some(Ended),
            (Loading | ReadyWaiting | Playing, Transition::Failure) => Some(Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Ended | PlaybackState::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackState::*;
    use super::*;

    #[test]
    fn happy_path() {
        let s = Idle.next(Transition::Load).unwrap();
        let s = s.next(Transition::Buffered).unwrap();
        let s = s.next(Transition::FirstAdvance).unwrap();
        assert_eq!(s, Playing);
        assert_eq!(s.next(Transition::EndOfStream), Some(Ended));
    }

    #[test]
    fn load_resets_from_anywhere() {
        for s in [Idle, Loading, ReadyWaiting, Playing, Ended, Error] {
            assert_eq!(s.next(Transition::Load), Some(Loading));
        }
    }

    #[test]
    fn failure_only_from_active_states() {
        assert_eq!(Loading.next(Transition::Failure), Some(Error));
        assert_eq!(ReadyWaiting.next(Transition::Failure), Some(Error));
        assert_eq!(Playing.next(Transition::Failure), Some(Error));
        assert_eq!(Idle.next(Transition::Failure), None);
        assert_eq!(Ended.next(Transition::Failure), None);
        assert_eq!(Error.next(Transition::Failure), None);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert_eq!(Idle.next(Transition::Buffered), None);
        assert_eq!(Loading.next(Transition::FirstAdvance), None);
        assert_eq!(Playing.next(Transition::Buffered), None);
        assert_eq!(ReadyWaiting.next(Transition::EndOfStream), None);
        assert_eq!(Error.next(Transition::FirstAdvance), None);
    }

    #[test]
    fn natural_loop_reenters_playing() {
        assert_eq!(Ended.next(Transition::FirstAdvance), Some(Playing));
        assert!(Ended.is_terminal());
        assert!(!Playing.is_terminal());
    }
}
