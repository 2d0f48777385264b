//! Playback lifecycle shared between the session controller and both threads

use std::sync::atomic::{AtomicU8, Ordering};

/// Session playback state
///
/// `Prefilling -> Playing -> Draining -> Stopped`. A session can also go from
/// `Prefilling` straight to `Stopped` if setup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// Buffering before the device callback is attached
    Prefilling,
    /// Device pulling, producer writing
    Playing,
    /// Producer halted, device consuming what is left
    Draining,
    /// Session over
    Stopped,
}

impl PlaybackState {
    fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Prefilling => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Draining => 2,
            PlaybackState::Stopped => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Prefilling,
            1 => PlaybackState::Playing,
            2 => PlaybackState::Draining,
            _ => PlaybackState::Stopped,
        }
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, next),
            (Prefilling, Playing)
                | (Prefilling, Stopped)
                | (Playing, Draining)
                | (Draining, Stopped)
        )
    }
}

/// Lock-free holder for [`PlaybackState`], readable from any thread
#[derive(Debug)]
pub struct SharedPlaybackState(AtomicU8);

impl SharedPlaybackState {
    /// Create in `Prefilling`
    pub fn new() -> Self {
        SharedPlaybackState(AtomicU8::new(PlaybackState::Prefilling.to_u8()))
    }

    /// Current state
    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to` if the state is still `from`
    ///
    /// Returns false when another thread already moved the state on, or when the
    /// transition is not part of the lifecycle.
    pub fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        if !from.can_transition_to(to) {
            return false;
        }
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for SharedPlaybackState {
    fn default() -> Self {
        Self::new()
    }
}
