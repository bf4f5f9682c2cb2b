//! In-memory [`AudioOutput`] that behaves like a mobile media element.
//!
//! The output half is handed to the engine; the [`SimulationController`] half
//! stays with the caller and plays the part of the platform: user gestures,
//! buffering progress, position reports, native end events, resource errors
//! and deferred play answers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use log::{debug, trace};
use tokio::sync::{mpsc, oneshot};
use crate::audio::{AudioOutput, EventEmitter, OutputEvent, OutputEventKind, PlayFuture};
use crate::error::OutputError;
use crate::models::ReadyState;

/// How the simulated platform gates `play()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    /// Desktop-like: any play request is accepted
    #[default]
    Permissive,
    /// Mobile-like: play must happen inside a user gesture until the output
    /// has been activated once
    RequiresGesture,
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub autoplay: AutoplayPolicy,
    /// Report full readiness as soon as a source is loaded
    pub auto_ready: bool,
    /// Duration reported for every loaded source, seconds
    pub duration: f64,
    /// Hold play answers until [`SimulationController::resolve_pending_play`]
    pub defer_play: bool,
    /// Whether running off the end raises a native ended event
    pub native_end_events: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            autoplay: AutoplayPolicy::Permissive,
            auto_ready: true,
            duration: 10.0,
            defer_play: false,
            native_end_events: true,
        }
    }
}

struct PendingPlay {
    epoch: u64,
    answer: oneshot::Sender<Result<(), OutputError>>,
}

struct SimState {
    options: SimulationOptions,
    source: Option<String>,
    paused: bool,
    current_time: f64,
    duration: f64,
    ready_state: ReadyState,
    volume: f32,
    playback_rate: f32,
    error: Option<String>,
    in_gesture: bool,
    activated: bool,
    play_requests: usize,
    scripted_rejection: Option<OutputError>,
    pending: VecDeque<PendingPlay>,
}

impl SimState {
    fn new(options: SimulationOptions) -> Self {
        Self {
            options,
            source: None,
            paused: true,
            current_time: 0.0,
            duration: f64::NAN,
            ready_state: ReadyState::HaveNothing,
            volume: 1.0,
            playback_rate: 1.0,
            error: None,
            in_gesture: false,
            activated: false,
            play_requests: 0,
            scripted_rejection: None,
            pending: VecDeque::new(),
        }
    }

    /// Whether the platform would accept a play request right now
    fn admit_play(&mut self) -> Result<(), OutputError> {
        if let Some(rejection) = self.scripted_rejection.take() {
            return Err(rejection);
        }
        if self.source.is_none() {
            return Err(OutputError::NotSupported("no source assigned".to_string()));
        }
        if let Some(error) = &self.error {
            return Err(OutputError::NotSupported(error.clone()));
        }
        if self.options.autoplay == AutoplayPolicy::RequiresGesture && !self.in_gesture && !self.activated {
            return Err(OutputError::NotAllowed(
                "play() can only be initiated by a user gesture".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply an accepted play: leave the paused state and restart an ended resource
    fn start(&mut self) {
        self.activated = true;
        self.paused = false;
        if self.duration.is_finite() && self.current_time >= self.duration {
            self.current_time = 0.0;
        }
    }

    /// Abort outstanding play answers; a new source or a pause cancels them
    fn abort_pending(&mut self) {
        for pending in self.pending.drain(..) {
            let _ = pending.answer.send(Err(OutputError::Aborted));
        }
    }
}

/// Simulated output; see the module docs
pub struct SimulatedOutput {
    state: Arc<Mutex<SimState>>,
    emitter: EventEmitter,
}

impl SimulatedOutput {
    pub fn new(options: SimulationOptions) -> (SimulatedOutput, SimulationController) {
        let state = Arc::new(Mutex::new(SimState::new(options)));
        let emitter = EventEmitter::new();

        let output = SimulatedOutput {
            state: Arc::clone(&state),
            emitter: emitter.clone(),
        };
        let controller = SimulationController { state, emitter };
        (output, controller)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }
}

impl AudioOutput for SimulatedOutput {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent> {
        self.emitter.subscribe()
    }

    fn source(&self) -> Option<String> {
        self.state().source.clone()
    }

    fn set_source(&mut self, locator: Option<&str>) -> u64 {
        let mut state = self.state();
        state.abort_pending();
        state.source = locator.map(str::to_owned);
        state.paused = true;
        state.current_time = 0.0;
        state.duration = f64::NAN;
        state.ready_state = ReadyState::HaveNothing;
        state.error = None;
        let epoch = self.emitter.advance_epoch();
        trace!("Simulated source -> {:?} (epoch {})", state.source, epoch);
        epoch
    }

    fn epoch(&self) -> u64 {
        self.emitter.epoch()
    }

    fn load(&mut self) {
        let mut state = self.state();
        if state.source.is_none() || !state.options.auto_ready {
            return;
        }
        state.duration = state.options.duration;
        state.ready_state = ReadyState::HaveEnoughData;
        let duration = state.duration;
        drop(state);

        self.emitter.emit(OutputEventKind::LoadedMetadata { duration });
        self.emitter.emit(OutputEventKind::CanPlay);
        self.emitter.emit(OutputEventKind::CanPlayThrough);
    }

    fn play(&mut self) -> PlayFuture {
        let mut state = self.state();
        state.play_requests += 1;

        if let Err(rejection) = state.admit_play() {
            debug!("Simulated platform rejected play: {}", rejection);
            return Box::pin(std::future::ready(Err(rejection)));
        }

        if state.options.defer_play {
            let (answer, receiver) = oneshot::channel();
            state.pending.push_back(PendingPlay {
                epoch: self.emitter.epoch(),
                answer,
            });
            return Box::pin(async move { receiver.await.unwrap_or(Err(OutputError::Aborted)) });
        }

        state.start();
        drop(state);
        self.emitter.emit(OutputEventKind::Play);
        Box::pin(std::future::ready(Ok(())))
    }

    fn pause(&mut self) {
        let mut state = self.state();
        state.abort_pending();
        if state.paused {
            return;
        }
        state.paused = true;
        drop(state);
        self.emitter.emit(OutputEventKind::Pause);
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn current_time(&self) -> f64 {
        self.state().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut state = self.state();
        let mut position = seconds.max(0.0);
        if state.duration.is_finite() {
            position = position.min(state.duration);
        }
        state.current_time = position;
    }

    fn duration(&self) -> f64 {
        self.state().duration
    }

    fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn volume(&self) -> f32 {
        self.state().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.state().volume = volume;
    }

    fn playback_rate(&self) -> f32 {
        self.state().playback_rate
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.state().playback_rate = rate;
    }

    fn error_message(&self) -> Option<String> {
        self.state().error.clone()
    }
}

/// Platform-side handle onto a [`SimulatedOutput`]
#[derive(Clone)]
pub struct SimulationController {
    state: Arc<Mutex<SimState>>,
    emitter: EventEmitter,
}

impl SimulationController {
    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    pub fn begin_gesture(&self) {
        self.state().in_gesture = true;
    }

    pub fn end_gesture(&self) {
        self.state().in_gesture = false;
    }

    pub fn set_autoplay(&self, policy: AutoplayPolicy) {
        self.state().options.autoplay = policy;
    }

    pub fn set_defer_play(&self, defer: bool) {
        self.state().options.defer_play = defer;
    }

    /// Assign a source the way page markup would, before the engine touches it
    pub fn preload(&self, locator: &str) {
        let mut state = self.state();
        state.source = Some(locator.to_string());
        self.emitter.advance_epoch();
    }

    /// Report buffering progress for the current source
    pub fn set_ready(&self, ready_state: ReadyState) {
        let mut state = self.state();
        state.ready_state = ready_state;
        if ready_state >= ReadyState::HaveMetadata && !state.duration.is_finite() {
            state.duration = state.options.duration;
        }
        let duration = state.duration;
        drop(state);

        if ready_state >= ReadyState::HaveMetadata {
            self.emitter.emit(OutputEventKind::LoadedMetadata { duration });
        }
        if ready_state >= ReadyState::HaveFutureData {
            self.emitter.emit(OutputEventKind::CanPlay);
        }
        if ready_state >= ReadyState::HaveEnoughData {
            self.emitter.emit(OutputEventKind::CanPlayThrough);
        }
    }

    /// Move the playhead and report it, without raising a native end event
    pub fn advance_to(&self, position: f64) {
        let mut state = self.state();
        let mut position = position.max(0.0);
        if state.duration.is_finite() {
            position = position.min(state.duration);
        }
        state.current_time = position;
        let duration = state.duration;
        drop(state);

        self.emitter.emit(OutputEventKind::TimeUpdate { position, duration });
    }

    /// Let `seconds` of wall time pass. Playback runs off the end like a
    /// real element would, raising the native end event when enabled.
    pub fn advance_by(&self, seconds: f64) {
        let mut state = self.state();
        if state.paused || !state.duration.is_finite() {
            return;
        }
        let position = (state.current_time + seconds * state.playback_rate as f64).min(state.duration);
        state.current_time = position;
        let duration = state.duration;
        let reached_end = position >= duration;
        let native_end = reached_end && state.options.native_end_events;
        if reached_end {
            state.paused = true;
        }
        drop(state);

        self.emitter.emit(OutputEventKind::TimeUpdate { position, duration });
        if reached_end {
            self.emitter.emit(OutputEventKind::Pause);
        }
        if native_end {
            self.emitter.emit(OutputEventKind::Ended);
        }
    }

    /// Run to the end and raise the native end event
    pub fn finish(&self) {
        let mut state = self.state();
        if state.duration.is_finite() {
            state.current_time = state.duration;
        }
        let was_playing = !state.paused;
        state.paused = true;
        drop(state);

        if was_playing {
            self.emitter.emit(OutputEventKind::Pause);
        }
        self.emitter.emit(OutputEventKind::Ended);
    }

    /// Fail the current resource. The event carries no message; the engine
    /// has to read it back from the output.
    pub fn fail_resource(&self, message: &str) {
        self.state().error = Some(message.to_string());
        self.emitter.emit(OutputEventKind::Error { message: None });
    }

    /// Reject the next play request with `rejection`
    pub fn reject_next_play(&self, rejection: OutputError) {
        self.state().scripted_rejection = Some(rejection);
    }

    /// Answer the oldest deferred play request. Returns false when none is pending.
    pub fn resolve_pending_play(&self, result: Result<(), OutputError>) -> bool {
        let mut state = self.state();
        let Some(pending) = state.pending.pop_front() else {
            return false;
        };
        let accepted = result.is_ok();
        if accepted {
            state.start();
        }
        drop(state);

        if accepted {
            self.emitter.emit_for(pending.epoch, OutputEventKind::Play);
        }
        let _ = pending.answer.send(result);
        true
    }

    /// Raise an arbitrary event for `epoch`, e.g. a late event from an old source
    pub fn emit_for_epoch(&self, epoch: u64, kind: OutputEventKind) {
        self.emitter.emit_for(epoch, kind);
    }

    pub fn epoch(&self) -> u64 {
        self.emitter.epoch()
    }

    pub fn pending_plays(&self) -> usize {
        self.state().pending.len()
    }

    pub fn play_requests(&self) -> usize {
        self.state().play_requests
    }

    pub fn source(&self) -> Option<String> {
        self.state().source.clone()
    }

    pub fn volume(&self) -> f32 {
        self.state().volume
    }

    pub fn playback_rate(&self) -> f32 {
        self.state().playback_rate
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn current_time(&self) -> f64 {
        self.state().current_time
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutputEvent>) -> Vec<OutputEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn test_load_reports_readiness() {
        let (mut output, _controller) = SimulatedOutput::new(SimulationOptions::default());
        let mut rx = output.subscribe();

        output.set_source(Some("a.mp3"));
        output.load();

        assert_eq!(output.ready_state(), ReadyState::HaveEnoughData);
        assert_eq!(output.duration(), 10.0);
        assert_eq!(
            drain(&mut rx),
            vec![
                OutputEventKind::LoadedMetadata { duration: 10.0 },
                OutputEventKind::CanPlay,
                OutputEventKind::CanPlayThrough,
            ]
        );
    }

    #[tokio::test]
    async fn test_gesture_gate() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            autoplay: AutoplayPolicy::RequiresGesture,
            ..Default::default()
        });
        output.set_source(Some("a.mp3"));

        match output.play().await {
            Err(OutputError::NotAllowed(_)) => {}
            other => panic!("Expected NotAllowed, got {:?}", other),
        }

        controller.begin_gesture();
        assert!(output.play().await.is_ok());
        controller.end_gesture();

        // Once activated, later plays need no gesture
        output.pause();
        assert!(output.play().await.is_ok());
        assert_eq!(controller.play_requests(), 3);
    }

    #[tokio::test]
    async fn test_play_without_source_rejected() {
        let (mut output, _controller) = SimulatedOutput::new(SimulationOptions::default());
        assert!(matches!(output.play().await, Err(OutputError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_scripted_rejection_applies_once() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions::default());
        output.set_source(Some("a.mp3"));
        controller.reject_next_play(OutputError::Aborted);

        assert_eq!(output.play().await, Err(OutputError::Aborted));
        assert!(output.play().await.is_ok());
    }

    #[tokio::test]
    async fn test_deferred_play_resolves_with_original_epoch() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            defer_play: true,
            ..Default::default()
        });
        let mut rx = output.subscribe();
        let epoch = output.set_source(Some("a.mp3"));

        let answer = output.play();
        assert_eq!(controller.pending_plays(), 1);
        assert!(controller.resolve_pending_play(Ok(())));
        assert!(answer.await.is_ok());

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events, vec![OutputEvent { epoch, kind: OutputEventKind::Play }]);
        assert!(!controller.resolve_pending_play(Ok(())));
    }

    #[tokio::test]
    async fn test_new_source_aborts_pending_play() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            defer_play: true,
            ..Default::default()
        });
        output.set_source(Some("a.mp3"));
        let answer = output.play();

        output.set_source(Some("b.mp3"));
        assert_eq!(answer.await, Err(OutputError::Aborted));
        assert_eq!(controller.pending_plays(), 0);
    }

    #[tokio::test]
    async fn test_pause_aborts_pending_play() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            defer_play: true,
            ..Default::default()
        });
        let mut rx = output.subscribe();
        output.set_source(Some("a.mp3"));
        let answer = output.play();
        assert!(output.is_paused());

        // Already paused, yet the pending answer is still cancelled
        output.pause();
        assert_eq!(answer.await, Err(OutputError::Aborted));
        assert_eq!(controller.pending_plays(), 0);
        assert!(!controller.resolve_pending_play(Ok(())));
        assert!(output.is_paused());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_advance_by_runs_off_the_end() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            duration: 1.0,
            ..Default::default()
        });
        let mut rx = output.subscribe();
        output.set_source(Some("a.mp3"));
        output.load();
        assert!(output.play().await.is_ok());
        drain(&mut rx);

        controller.advance_by(0.6);
        controller.advance_by(0.6);

        assert!(output.is_paused());
        assert_eq!(output.current_time(), 1.0);
        assert_eq!(
            drain(&mut rx),
            vec![
                OutputEventKind::TimeUpdate { position: 0.6, duration: 1.0 },
                OutputEventKind::TimeUpdate { position: 1.0, duration: 1.0 },
                OutputEventKind::Pause,
                OutputEventKind::Ended,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_native_end_event() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions {
            duration: 1.0,
            native_end_events: false,
            ..Default::default()
        });
        let mut rx = output.subscribe();
        output.set_source(Some("a.mp3"));
        output.load();
        assert!(output.play().await.is_ok());
        drain(&mut rx);

        controller.advance_by(2.0);
        let kinds = drain(&mut rx);
        assert!(!kinds.contains(&OutputEventKind::Ended));
        assert!(kinds.contains(&OutputEventKind::TimeUpdate { position: 1.0, duration: 1.0 }));
    }

    #[tokio::test]
    async fn test_play_after_end_restarts() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions::default());
        output.set_source(Some("a.mp3"));
        output.load();
        assert!(output.play().await.is_ok());
        controller.finish();
        assert_eq!(output.current_time(), 10.0);

        assert!(output.play().await.is_ok());
        assert_eq!(output.current_time(), 0.0);
    }

    #[test]
    fn test_fail_resource_exposes_message() {
        let (mut output, controller) = SimulatedOutput::new(SimulationOptions::default());
        let mut rx = output.subscribe();
        output.set_source(Some("a.mp3"));

        controller.fail_resource("MEDIA_ERR_SRC_NOT_SUPPORTED");
        assert_eq!(output.error_message().as_deref(), Some("MEDIA_ERR_SRC_NOT_SUPPORTED"));
        assert_eq!(drain(&mut rx), vec![OutputEventKind::Error { message: None }]);

        output.set_source(Some("b.mp3"));
        assert_eq!(output.error_message(), None);
    }

    #[test]
    fn test_set_current_time_clamps_to_duration() {
        let (mut output, _controller) = SimulatedOutput::new(SimulationOptions::default());
        output.set_source(Some("a.mp3"));
        output.load();

        output.set_current_time(42.0);
        assert_eq!(output.current_time(), 10.0);
        output.set_current_time(-1.0);
        assert_eq!(output.current_time(), 0.0);
    }
}
