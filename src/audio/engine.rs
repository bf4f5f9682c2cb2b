use crate::audio::session::{Callbacks, EndGuard, EndedCallback, ErrorCallback, Session};
use crate::audio::{AudioOutput, OutputEvent, OutputEventKind};
use crate::config::{EngineConfig, ReadinessPolicy};
use crate::error::{AudioError, OutputError, PlaybackError};
use crate::logging::{AudioLogger, OperationTimer};
use crate::models::{AudioState, PlaybackSnapshot};
use log::{debug, info, trace, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

/// Per-call parameters for [`PlaybackEngine::play`]
#[derive(Clone, Default)]
pub struct PlayOptions {
    pub on_ended: Option<EndedCallback>,
    pub on_error: Option<ErrorCallback>,
    /// Output volume in [0, 1]; clamped
    pub volume: Option<f32>,
    /// Playback rate, must be positive
    pub playback_rate: Option<f32>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ended<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_ended = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PlaybackError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn playback_rate(mut self, rate: f32) -> Self {
        self.playback_rate = Some(rate);
        self
    }
}

impl fmt::Debug for PlayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayOptions")
            .field("on_ended", &self.on_ended.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("volume", &self.volume)
            .field("playback_rate", &self.playback_rate)
            .finish()
    }
}

/// Outcome of waiting for the readiness threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    TimedOut,
    /// A newer `play()` or a `stop()` took over the session
    Superseded,
    /// The resource reported an error while loading
    Failed,
}

struct Shared<O: AudioOutput> {
    output: Mutex<O>,
    session: Mutex<Session>,
    end_guard: EndGuard,
    unlocked: AtomicBool,
    readiness: Notify,
    pump: Mutex<Option<JoinHandle<()>>>,
    config: EngineConfig,
    logger: AudioLogger,
}

/// Mobile-safe playback engine.
///
/// Owns exactly one [`AudioOutput`] for its whole lifetime. The output is
/// handed over at construction and is never replaced or rebuilt: on strict
/// platforms the unlocked status belongs to that one resource instance.
/// The handle is cheap to clone; clones drive the same engine.
///
/// Lock order is session before output. Callbacks run with no lock held.
pub struct PlaybackEngine<O: AudioOutput> {
    shared: Arc<Shared<O>>,
}

impl<O: AudioOutput> Clone for PlaybackEngine<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<O: AudioOutput> PlaybackEngine<O> {
    /// Create an engine around `output`. Must be called inside a Tokio runtime.
    pub fn new(output: O, config: EngineConfig) -> Result<Self, AudioError> {
        let logger = AudioLogger::with_capacity(config.event_history);
        Self::with_logger(output, config, logger)
    }

    pub fn with_logger(mut output: O, config: EngineConfig, logger: AudioLogger) -> Result<Self, AudioError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AudioError::NoRuntime(e.to_string()))?;

        let events = output.subscribe();
        output.set_volume(config.default_volume.clamp(0.0, 1.0));

        let shared = Arc::new(Shared {
            output: Mutex::new(output),
            session: Mutex::new(Session::default()),
            end_guard: EndGuard::new(),
            unlocked: AtomicBool::new(false),
            readiness: Notify::new(),
            pump: Mutex::new(None),
            config,
            logger,
        });

        let pump = runtime.spawn(Self::pump_events(Arc::downgrade(&shared), events));
        *lock(&shared.pump) = Some(pump);

        info!("Playback engine created");
        Ok(Self { shared })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn logger(&self) -> &AudioLogger {
        &self.shared.logger
    }

    /// Satisfy the platform's gesture requirement by playing the silent clip.
    ///
    /// Call this synchronously from a user input handler. Returns `false` when
    /// the platform refused; the caller retries inside a later gesture.
    pub async fn unlock(&self) -> bool {
        if self.is_unlocked() {
            return true;
        }

        let (previous_source, silent_epoch, request) = {
            let mut session = self.session();
            session.state = AudioState::Unlocking;

            let mut output = self.output();
            let previous_source = output.source();
            output.set_volume(0.0);
            let silent_epoch = output.set_source(Some(self.shared.config.silent_source.as_str()));
            output.load();
            (previous_source, silent_epoch, output.play())
        };

        let result = request.await;

        {
            let mut session = self.session();
            let mut output = self.output();
            if output.epoch() == silent_epoch {
                output.pause();
                output.set_current_time(0.0);
                output.set_source(previous_source.as_deref());
                output.set_volume(1.0);
            } else {
                // A play() replaced the silent clip while we waited; it owns the output now.
                warn!("Source changed during unlock; leaving the newer session's source in place");
                if output.volume() == 0.0 {
                    output.set_volume(1.0);
                }
            }
            if session.state == AudioState::Unlocking {
                session.state = AudioState::Idle;
            }
        }

        match result {
            Ok(()) => {
                self.shared.unlocked.store(true, Ordering::Release);
                self.shared.logger.log_unlock(true, "silent clip accepted by the platform");
                true
            }
            Err(rejection) => {
                self.shared.logger.log_unlock(false, &rejection.to_string());
                false
            }
        }
    }

    /// Play `locator`, superseding whatever was playing.
    ///
    /// Resolves `true` once the platform accepted the request. Completion and
    /// failure are reported through the callbacks in `options`, at most once each.
    pub async fn play(&self, locator: &str, options: PlayOptions) -> bool {
        if !self.is_unlocked() && !self.unlock().await {
            warn!("Auto-unlock before '{}' was rejected; attempting playback anyway", locator);
        }

        let PlayOptions { on_ended, on_error, volume, playback_rate } = options;

        let (generation, epoch) = {
            let mut session = self.session();
            let generation = session.begin(locator, Callbacks { on_ended, on_error });
            self.shared.end_guard.rearm();

            let mut output = self.output();
            if !output.is_paused() {
                output.pause();
            }
            let epoch = output.set_source(Some(locator));
            if let Some(volume) = volume {
                if volume.is_nan() {
                    warn!("Ignoring NaN volume for '{}'", locator);
                } else {
                    output.set_volume(volume.clamp(0.0, 1.0));
                }
            }
            if let Some(rate) = playback_rate {
                if rate.is_finite() && rate > 0.0 {
                    output.set_playback_rate(rate);
                } else {
                    warn!("Ignoring invalid playback rate {} for '{}'", rate, locator);
                }
            }
            output.load();
            (generation, epoch)
        };

        // Wake a previous play() still waiting for readiness so it can bow out.
        self.shared.readiness.notify_waiters();
        self.shared.logger.log_playback_requested(locator, generation);

        let timer = OperationTimer::new(format!("readiness wait for '{}'", locator));
        let readiness = self.wait_until_ready(generation).await;
        let waited = timer.finish();

        match readiness {
            Readiness::Ready => {
                debug!("'{}' ready after {}ms", locator, waited.as_millis());
            }
            Readiness::Superseded => {
                self.shared.logger.log_session_superseded(locator, generation);
                return false;
            }
            Readiness::Failed => return false,
            Readiness::TimedOut => {
                let timeout = self.shared.config.readiness_timeout();
                match self.shared.config.readiness_policy {
                    ReadinessPolicy::Optimistic => {
                        self.shared.logger.log_readiness_timeout(locator, timeout, true);
                    }
                    ReadinessPolicy::Strict => {
                        self.fail_session(
                            generation,
                            PlaybackError::ReadinessTimeout {
                                locator: locator.to_string(),
                                waited_ms: self.shared.config.readiness_timeout_ms,
                            },
                        );
                        return false;
                    }
                }
            }
        }

        if self.settle_paused(generation) {
            return false;
        }

        let request = self.output().play();

        match request.await {
            Ok(()) => {
                if !self.is_current(generation) {
                    // stop() ran while the platform answered; keep the output silent
                    let mut output = self.output();
                    if output.epoch() == epoch {
                        output.pause();
                    }
                    drop(output);
                    self.shared.logger.log_session_superseded(locator, generation);
                    return false;
                }
                if self.settle_paused(generation) {
                    self.output().pause();
                    return false;
                }
                true
            }
            Err(rejection) => {
                if !self.is_current(generation) {
                    self.shared.logger.log_session_superseded(locator, generation);
                    return false;
                }
                if rejection == OutputError::Aborted && self.settle_paused(generation) {
                    return false;
                }
                self.fail_session(
                    generation,
                    PlaybackError::Rejected {
                        locator: locator.to_string(),
                        source: rejection,
                    },
                );
                false
            }
        }
    }

    /// Pause the output. Only a `Playing` session moves to `Paused`.
    pub fn pause(&self) {
        let mut session = self.session();
        if session.state == AudioState::Loading {
            session.pause_requested = true;
        }
        let position = {
            let mut output = self.output();
            let was_paused = output.is_paused();
            // Always forwarded: it cancels a play answer that is still pending
            output.pause();
            if was_paused {
                return;
            }
            output.current_time()
        };

        if session.state == AudioState::Playing {
            session.state = AudioState::Paused;
            drop(session);
            self.shared.logger.log_playback_paused(position);
        }
    }

    /// Resume the current source. Fails fast when nothing is loaded.
    pub async fn resume(&self) -> bool {
        let (request, position) = {
            let mut session = self.session();
            let mut output = self.output();
            if output.source().is_none() {
                warn!("resume() called with no source loaded");
                return false;
            }
            session.resume_requested = true;
            let position = output.current_time();
            (output.play(), position)
        };

        match request.await {
            Ok(()) => {
                self.shared.logger.log_playback_resumed(position);
                true
            }
            Err(rejection) => {
                self.session().resume_requested = false;
                warn!("Resume rejected by the platform: {}", rejection);
                false
            }
        }
    }

    /// Stop playback and drop the live callbacks. Always ends in `Idle`.
    pub fn stop(&self) {
        {
            let mut session = self.session();
            session.invalidate();
            self.shared.end_guard.mark_fired();
            session.state = AudioState::Idle;

            let mut output = self.output();
            output.pause();
            output.set_current_time(0.0);
        }
        self.shared.readiness.notify_waiters();
        self.shared.logger.log_playback_stopped("stop requested");
    }

    /// Move the playhead. Re-arms completion so a later natural end fires again.
    pub fn seek(&self, seconds: f64) {
        if !seconds.is_finite() {
            warn!("Ignoring seek to non-finite position {}", seconds);
            return;
        }

        let target = seconds.max(0.0);
        let from = {
            let mut output = self.output();
            let from = output.current_time();
            output.set_current_time(target);
            from
        };
        self.shared.end_guard.rearm();
        self.shared.logger.log_seek_operation(from, target);
    }

    /// Set output volume, clamped to [0, 1]
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        self.output().set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn set_playback_rate(&self, rate: f32) {
        self.output().set_playback_rate(rate);
    }

    pub fn is_unlocked(&self) -> bool {
        self.shared.unlocked.load(Ordering::Acquire)
    }

    /// True only when the output is running and the state machine agrees.
    pub fn is_playing(&self) -> bool {
        let session = self.session();
        session.state == AudioState::Playing && !self.output().is_paused()
    }

    pub fn current_time(&self) -> f64 {
        self.output().current_time()
    }

    pub fn duration(&self) -> f64 {
        self.output().duration()
    }

    pub fn volume(&self) -> f32 {
        self.output().volume()
    }

    pub fn playback_rate(&self) -> f32 {
        self.output().playback_rate()
    }

    pub fn state(&self) -> AudioState {
        self.session().state
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let session = self.session();
        let output = self.output();
        let duration = output.duration();

        PlaybackSnapshot {
            state: session.state,
            locator: session.locator.clone(),
            position: output.current_time(),
            duration: (duration.is_finite() && duration > 0.0).then_some(duration),
            volume: output.volume(),
            playback_rate: output.playback_rate(),
            unlocked: self.is_unlocked(),
            playing: session.state == AudioState::Playing && !output.is_paused(),
        }
    }

    /// Tear the engine down. Test and cleanup paths only.
    pub fn destroy(&self) {
        self.stop();
        if let Some(pump) = lock(&self.shared.pump).take() {
            pump.abort();
        }
        self.output().set_source(None);
        info!("Playback engine destroyed");
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.shared.session)
    }

    fn output(&self) -> MutexGuard<'_, O> {
        lock(&self.shared.output)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session().is_current(generation)
    }

    async fn wait_until_ready(&self, generation: u64) -> Readiness {
        let threshold = self.shared.config.readiness_threshold;
        let deadline = tokio::time::Instant::now() + self.shared.config.readiness_timeout();

        loop {
            let notified = self.shared.readiness.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let session = self.session();
                if !session.is_current(generation) {
                    return Readiness::Superseded;
                }
                if session.state == AudioState::Error {
                    return Readiness::Failed;
                }
            }

            let ready = self.output().ready_state() >= threshold;
            if ready {
                return Readiness::Ready;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Readiness::TimedOut;
            }
        }
    }

    fn fail_session(&self, generation: u64, error: PlaybackError) {
        let callback = {
            let mut session = self.session();
            if !session.is_current(generation) {
                return;
            }
            session.state = AudioState::Error;
            session.claim_error_callback()
        };

        self.report_failure(callback, &error);
    }

    /// Log and deliver a session failure. `claim` is `None` once the session
    /// has already reported one; later failures are only traced.
    fn report_failure(&self, claim: Option<Option<ErrorCallback>>, error: &PlaybackError) {
        let Some(callback) = claim else {
            debug!("Session already reported an error; dropping: {}", error);
            return;
        };

        let logger = &self.shared.logger;
        match error {
            PlaybackError::Rejected { locator, source } => {
                logger.log_playback_rejected(locator, &source.to_string());
            }
            PlaybackError::ReadinessTimeout { locator, waited_ms } => {
                logger.log_readiness_timeout(locator, Duration::from_millis(*waited_ms), false);
            }
            PlaybackError::Resource { locator, message } => {
                logger.log_resource_error(Some(locator), message);
            }
        }

        if let Some(callback) = callback {
            callback(error);
        }
    }

    /// Honour a `pause()` that arrived while this session was starting.
    /// Returns true when the session now rests in `Paused`.
    fn settle_paused(&self, generation: u64) -> bool {
        let mut session = self.session();
        if !session.is_current(generation) || !session.pause_requested {
            return false;
        }
        session.pause_requested = false;
        session.state = AudioState::Paused;
        debug!("Play for generation {} held back by an earlier pause()", generation);
        true
    }

    async fn pump_events(shared: Weak<Shared<O>>, mut events: mpsc::UnboundedReceiver<OutputEvent>) {
        while let Some(event) = events.recv().await {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            PlaybackEngine { shared }.handle_event(event);
        }
        debug!("Output event pump finished");
    }

    fn handle_event(&self, event: OutputEvent) {
        let live_epoch = self.output().epoch();
        if event.epoch != live_epoch {
            trace!("Dropping {:?} from source epoch {} (live {})", event.kind, event.epoch, live_epoch);
            return;
        }

        if event.kind.is_readiness() {
            self.shared.readiness.notify_waiters();
            return;
        }

        if self.state() == AudioState::Unlocking {
            trace!("Ignoring {:?} while unlocking", event.kind);
            return;
        }

        match event.kind {
            OutputEventKind::Play => self.on_play_event(),
            OutputEventKind::Pause => self.on_pause_event(),
            OutputEventKind::TimeUpdate { position, duration } => {
                if self.reached_end(position, duration) {
                    self.complete("position monitor");
                }
            }
            OutputEventKind::Ended => self.complete("native end event"),
            OutputEventKind::Error { message } => self.on_resource_error(message),
            OutputEventKind::LoadedMetadata { .. }
            | OutputEventKind::CanPlay
            | OutputEventKind::CanPlayThrough => {}
        }
    }

    fn on_play_event(&self) {
        let started = {
            let mut session = self.session();
            let resumed = std::mem::take(&mut session.resume_requested);
            match session.state {
                AudioState::Playing => None,
                AudioState::Idle if !resumed => {
                    debug!("Ignoring Play while idle");
                    None
                }
                _ => {
                    session.state = AudioState::Playing;
                    Some(session.locator.clone())
                }
            }
        };

        if let Some(locator) = started {
            self.shared.logger.log_playback_started(locator.as_deref());
        }
    }

    fn on_pause_event(&self) {
        let mut session = self.session();
        if session.state == AudioState::Playing {
            session.state = AudioState::Paused;
        }
    }

    fn reached_end(&self, position: f64, duration: f64) -> bool {
        duration.is_finite()
            && duration > 0.0
            && position.is_finite()
            && duration - position <= self.shared.config.end_epsilon_secs
    }

    /// Shared exit for both end detectors.
    ///
    /// The state gate is the first filter: once a detector has won the state
    /// is `Ended`, so a later signal stops there. The end guard settles races
    /// between signals that both pass the gate, and keeps a signal that
    /// arrives after `stop()` or before a `seek()` re-arm from firing.
    fn complete(&self, signal: &str) {
        let (callback, locator) = {
            let mut session = self.session();
            if !matches!(session.state, AudioState::Playing | AudioState::Paused) {
                return;
            }
            if !self.shared.end_guard.try_fire() {
                trace!("Completion via {} already reported", signal);
                return;
            }
            session.state = AudioState::Ended;
            (session.callbacks.on_ended.clone(), session.locator.clone())
        };

        self.shared.logger.log_playback_ended(locator.as_deref(), signal);
        if let Some(callback) = callback {
            callback();
        }
    }

    fn on_resource_error(&self, message: Option<String>) {
        let message = message
            .or_else(|| self.output().error_message())
            .unwrap_or_else(|| "Unknown audio error".to_string());

        let (callback, locator) = {
            let mut session = self.session();
            if session.state == AudioState::Idle {
                debug!("Resource error with no active session: {}", message);
                return;
            }
            session.state = AudioState::Error;
            (session.claim_error_callback(), session.locator.clone().unwrap_or_default())
        };

        self.shared.readiness.notify_waiters();

        self.report_failure(callback, &PlaybackError::Resource { locator, message });
    }
}

/// Lock without propagating poison; engine state stays usable after a panicking callback elsewhere.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::{SimulatedOutput, SimulationOptions};
    use crate::logging::PlaybackEventType;
    use crate::models::ReadyState;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn create_engine(options: SimulationOptions) -> (PlaybackEngine<SimulatedOutput>, crate::audio::SimulationController) {
        let (output, controller) = SimulatedOutput::new(options);
        let engine = PlaybackEngine::new(output, EngineConfig::default())
            .expect("engine should start inside a runtime");
        (engine, controller)
    }

    #[test]
    fn test_engine_requires_runtime() {
        let (output, _controller) = SimulatedOutput::new(SimulationOptions::default());
        match PlaybackEngine::new(output, EngineConfig::default()) {
            Err(AudioError::NoRuntime(_)) => {}
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Expected NoRuntime error"),
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (engine, controller) = create_engine(SimulationOptions::default());

        assert_eq!(engine.state(), AudioState::Idle);
        assert!(!engine.is_unlocked());
        assert!(!engine.is_playing());
        assert_eq!(engine.current_time(), 0.0);
        assert!(engine.duration().is_nan());
        assert_eq!(controller.volume(), 1.0);
    }

    #[tokio::test]
    async fn test_default_volume_applied_from_config() {
        let (output, controller) = SimulatedOutput::new(SimulationOptions::default());
        let config = EngineConfig { default_volume: 0.4, ..Default::default() };
        let _engine = PlaybackEngine::new(output, config).unwrap();
        assert_eq!(controller.volume(), 0.4);
    }

    #[tokio::test]
    async fn test_play_reaches_playing_via_output_event() {
        let (engine, controller) = create_engine(SimulationOptions::default());

        assert!(engine.play("https://example.com/a.mp3", PlayOptions::new()).await);
        assert_eq!(controller.source().as_deref(), Some("https://example.com/a.mp3"));

        settle().await;
        assert_eq!(engine.state(), AudioState::Playing);
        assert!(engine.is_playing());
        assert!(engine.is_unlocked());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.play("a.mp3", PlayOptions::new()).await);
        settle().await;

        engine.pause();
        assert_eq!(engine.state(), AudioState::Paused);
        assert!(controller.is_paused());
        assert!(!engine.is_playing());

        // Second pause is a no-op
        engine.pause();
        assert_eq!(engine.state(), AudioState::Paused);

        assert!(engine.resume().await);
        settle().await;
        assert_eq!(engine.state(), AudioState::Playing);
    }

    #[tokio::test]
    async fn test_pause_during_loading_keeps_state() {
        let (engine, _controller) = create_engine(SimulationOptions {
            auto_ready: false,
            ..Default::default()
        });
        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.play("slow.mp3", PlayOptions::new()).await }
        });
        settle().await;

        assert_eq!(engine.state(), AudioState::Loading);
        engine.pause();
        assert_eq!(engine.state(), AudioState::Loading);

        engine.stop();
        assert!(!handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_resume_without_source_fails_fast() {
        let (engine, controller) = create_engine(SimulationOptions::default());

        assert!(!engine.resume().await);
        assert_eq!(controller.play_requests(), 0);
        assert_eq!(engine.state(), AudioState::Idle);
    }

    #[tokio::test]
    async fn test_volume_and_rate_passthrough() {
        let (engine, controller) = create_engine(SimulationOptions::default());

        engine.set_volume(0.25);
        assert_eq!(engine.volume(), 0.25);

        engine.set_volume(f32::NAN);
        assert_eq!(controller.volume(), 0.25);

        engine.set_playback_rate(1.5);
        assert_eq!(engine.playback_rate(), 1.5);
        assert_eq!(controller.playback_rate(), 1.5);
    }

    #[tokio::test]
    async fn test_play_options_applied() {
        let (engine, controller) = create_engine(SimulationOptions::default());

        assert!(engine.play("a.mp3", PlayOptions::new().volume(2.0).playback_rate(0.75)).await);
        assert_eq!(controller.volume(), 1.0);
        assert_eq!(controller.playback_rate(), 0.75);

        assert!(engine.play("b.mp3", PlayOptions::new().volume(0.3).playback_rate(-1.0)).await);
        assert_eq!(controller.volume(), 0.3);
        assert_eq!(controller.playback_rate(), 0.75);
    }

    #[tokio::test]
    async fn test_seek_sets_position() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.play("a.mp3", PlayOptions::new()).await);

        engine.seek(4.5);
        assert_eq!(engine.current_time(), 4.5);

        engine.seek(-3.0);
        assert_eq!(controller.current_time(), 0.0);

        engine.seek(f64::NAN);
        assert_eq!(controller.current_time(), 0.0);
    }

    #[tokio::test]
    async fn test_stop_resets_position_and_state() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.play("a.mp3", PlayOptions::new()).await);
        settle().await;
        controller.advance_to(3.0);

        engine.stop();
        assert_eq!(engine.state(), AudioState::Idle);
        assert_eq!(engine.current_time(), 0.0);
        assert!(controller.is_paused());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_engine() {
        let (engine, controller) = create_engine(SimulationOptions { duration: 8.0, ..Default::default() });
        assert!(engine.play("a.mp3", PlayOptions::new().volume(0.5)).await);
        settle().await;
        controller.advance_to(2.0);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.state, AudioState::Playing);
        assert_eq!(snapshot.locator.as_deref(), Some("a.mp3"));
        assert_eq!(snapshot.position, 2.0);
        assert_eq!(snapshot.duration, Some(8.0));
        assert_eq!(snapshot.volume, 0.5);
        assert!(snapshot.unlocked);
        assert!(snapshot.playing);
    }

    #[tokio::test]
    async fn test_lifecycle_is_logged() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.play("a.mp3", PlayOptions::new()).await);
        settle().await;
        controller.finish();
        settle().await;

        let types: Vec<_> = engine
            .logger()
            .get_recent_events(20)
            .into_iter()
            .map(|event| event.event_type)
            .collect();
        assert!(types.contains(&PlaybackEventType::UnlockSucceeded));
        assert!(types.contains(&PlaybackEventType::PlaybackRequested));
        assert!(types.contains(&PlaybackEventType::PlaybackStarted));
        assert!(types.contains(&PlaybackEventType::PlaybackEnded));
        assert_eq!(engine.logger().get_event_statistics().completions, 1);
    }

    #[tokio::test]
    async fn test_unlock_restores_previous_source() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        controller.preload("https://example.com/intro.mp3");

        assert!(engine.unlock().await);
        assert_eq!(controller.source().as_deref(), Some("https://example.com/intro.mp3"));
        assert_eq!(controller.volume(), 1.0);
        assert!(controller.is_paused());
        assert_eq!(engine.state(), AudioState::Idle);
    }

    #[tokio::test]
    async fn test_unlock_without_previous_source_clears_silent_clip() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.unlock().await);
        assert_eq!(controller.source(), None);
        settle().await;
        assert_eq!(engine.state(), AudioState::Idle);
    }

    #[tokio::test]
    async fn test_readiness_threshold_from_config() {
        let (output, controller) = SimulatedOutput::new(SimulationOptions {
            auto_ready: false,
            ..Default::default()
        });
        let config = EngineConfig {
            readiness_threshold: ReadyState::HaveEnoughData,
            ..Default::default()
        };
        let engine = PlaybackEngine::new(output, config).unwrap();
        assert!(engine.unlock().await);

        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { engine.play("a.mp3", PlayOptions::new()).await }
        });
        settle().await;

        controller.set_ready(ReadyState::HaveFutureData);
        settle().await;
        assert_eq!(controller.play_requests(), 1);

        controller.set_ready(ReadyState::HaveEnoughData);
        assert!(handle.await.unwrap());
        assert_eq!(controller.play_requests(), 2);
    }

    #[tokio::test]
    async fn test_destroy_detaches_events() {
        let (engine, controller) = create_engine(SimulationOptions::default());
        assert!(engine.play("a.mp3", PlayOptions::new()).await);
        settle().await;

        engine.destroy();
        assert_eq!(engine.state(), AudioState::Idle);
        assert_eq!(controller.source(), None);

        controller.emit_for_epoch(controller.epoch(), OutputEventKind::Play);
        settle().await;
        assert_eq!(engine.state(), AudioState::Idle);
    }

    #[test]
    fn test_play_options_debug() {
        let options = PlayOptions::new().on_ended(|| {}).volume(0.5);
        let debug = format!("{:?}", options);
        assert!(debug.contains("on_ended: true"));
        assert!(debug.contains("on_error: false"));
        assert!(debug.contains("Some(0.5)"));
    }
}
