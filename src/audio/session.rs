//! Per-session bookkeeping for the playback engine: the live callback set,
//! the session generation and the end-fired guard.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::error::PlaybackError;
use crate::models::AudioState;

pub type EndedCallback = Arc<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&PlaybackError) + Send + Sync>;

/// Completion and failure callbacks bound to one `play()` session
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_ended: Option<EndedCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl Callbacks {
    pub fn is_empty(&self) -> bool {
        self.on_ended.is_none() && self.on_error.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_ended", &self.on_ended.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// At-most-once latch shared by both end detectors.
#[derive(Debug, Default)]
pub struct EndGuard {
    fired: AtomicBool,
}

impl EndGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the completion. Only the first caller after a re-arm gets `true`.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Allow the next completion to fire
    pub fn rearm(&self) {
        self.fired.store(false, Ordering::Release);
    }

    /// Swallow any completion until the next re-arm
    pub fn mark_fired(&self) {
        self.fired.store(true, Ordering::Release);
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Mutable engine state guarded by the engine's session lock
#[derive(Debug, Default)]
pub struct Session {
    pub state: AudioState,
    /// Bumped by every `play()` and `stop()`
    pub generation: u64,
    pub locator: Option<String>,
    pub callbacks: Callbacks,
    pub error_reported: bool,
    /// `pause()` arrived before the platform accepted this session's play
    pub pause_requested: bool,
    /// A `resume()` is waiting for the output's `Play` event
    pub resume_requested: bool,
}

impl Session {
    /// Start a new session, dropping the previous callback set. Returns its generation.
    pub fn begin(&mut self, locator: &str, callbacks: Callbacks) -> u64 {
        self.generation += 1;
        self.locator = Some(locator.to_string());
        self.callbacks = callbacks;
        self.error_reported = false;
        self.pause_requested = false;
        self.resume_requested = false;
        self.state = AudioState::Loading;
        self.generation
    }

    /// Invalidate the live session without starting another
    pub fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.callbacks = Callbacks::default();
        self.pause_requested = false;
        self.resume_requested = false;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Take the error callback if this session has not reported an error yet
    pub fn claim_error_callback(&mut self) -> Option<Option<ErrorCallback>> {
        if self.error_reported {
            return None;
        }
        self.error_reported = true;
        Some(self.callbacks.on_error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn test_end_guard_fires_once() {
        let guard = EndGuard::new();
        assert!(guard.try_fire());
        assert!(!guard.try_fire());
        assert!(guard.has_fired());

        guard.rearm();
        assert!(!guard.has_fired());
        assert!(guard.try_fire());
    }

    #[test]
    fn test_mark_fired_suppresses() {
        let guard = EndGuard::new();
        guard.mark_fired();
        assert!(!guard.try_fire());
    }

    #[test]
    fn test_end_guard_race_single_winner() {
        let guard = Arc::new(EndGuard::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if guard.try_fire() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_begin_rebinds() {
        let mut session = Session::default();
        let first = session.begin(
            "a.mp3",
            Callbacks { on_ended: Some(Arc::new(|| {})), on_error: None },
        );
        assert_eq!(session.state, AudioState::Loading);
        assert!(session.callbacks.on_ended.is_some());

        let second = session.begin("b.mp3", Callbacks::default());
        assert!(second > first);
        assert!(!session.is_current(first));
        assert!(session.callbacks.is_empty());
        assert_eq!(session.locator.as_deref(), Some("b.mp3"));
    }

    #[test]
    fn test_error_claimed_once_per_session() {
        let mut session = Session::default();
        session.begin("a.mp3", Callbacks::default());

        assert!(session.claim_error_callback().is_some());
        assert!(session.claim_error_callback().is_none());

        session.begin("b.mp3", Callbacks::default());
        assert!(session.claim_error_callback().is_some());
    }

    #[test]
    fn test_invalidate_clears_callbacks() {
        let mut session = Session::default();
        let generation = session.begin(
            "a.mp3",
            Callbacks { on_ended: Some(Arc::new(|| {})), on_error: Some(Arc::new(|_| {})) },
        );
        session.pause_requested = true;
        session.resume_requested = true;
        session.invalidate();
        assert!(!session.is_current(generation));
        assert!(session.callbacks.is_empty());
        assert!(!session.pause_requested);
        assert!(!session.resume_requested);
    }
}
