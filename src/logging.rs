use log::{info, warn, error, debug, trace};
use std::time::{Duration, Instant};
use std::sync::{Arc, Mutex};
use std::collections::VecDeque;
use chrono::{DateTime, Utc};

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "GESTURE_AUDIO_LOG_LEVEL";

/// Playback lifecycle event for logging and debugging
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    UnlockSucceeded,
    UnlockRejected,
    PlaybackRequested,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackResumed,
    PlaybackStopped,
    PlaybackEnded,
    SeekOperation,
    ReadinessTimeout,
    PlaybackRejected,
    ResourceError,
    SessionSuperseded,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::UnlockSucceeded => "UNLOCK_SUCCEEDED",
            PlaybackEventType::UnlockRejected => "UNLOCK_REJECTED",
            PlaybackEventType::PlaybackRequested => "PLAYBACK_REQUESTED",
            PlaybackEventType::PlaybackStarted => "PLAYBACK_STARTED",
            PlaybackEventType::PlaybackPaused => "PLAYBACK_PAUSED",
            PlaybackEventType::PlaybackResumed => "PLAYBACK_RESUMED",
            PlaybackEventType::PlaybackStopped => "PLAYBACK_STOPPED",
            PlaybackEventType::PlaybackEnded => "PLAYBACK_ENDED",
            PlaybackEventType::SeekOperation => "SEEK_OPERATION",
            PlaybackEventType::ReadinessTimeout => "READINESS_TIMEOUT",
            PlaybackEventType::PlaybackRejected => "PLAYBACK_REJECTED",
            PlaybackEventType::ResourceError => "RESOURCE_ERROR",
            PlaybackEventType::SessionSuperseded => "SESSION_SUPERSEDED",
        }
    }
}

/// Logger for playback engine operations and debugging
#[derive(Clone)]
pub struct AudioLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for AudioLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioLogger {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Logger keeping at most `max_events` entries of history
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV)
            .unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(Self::parse_level(&log_level));
        builder.try_init()?;

        info!("Playback engine logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Map a level name to a filter; unknown names fall back to Info
    pub fn parse_level(level: &str) -> log::LevelFilter {
        match level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Info,
        }
    }

    /// Log a playback event
    pub fn log_event(&self, event_type: PlaybackEventType, details: String, duration: Option<Duration>) {
        match event_type {
            PlaybackEventType::UnlockSucceeded
            | PlaybackEventType::PlaybackStarted
            | PlaybackEventType::PlaybackStopped
            | PlaybackEventType::PlaybackEnded => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::PlaybackRequested
            | PlaybackEventType::PlaybackPaused
            | PlaybackEventType::PlaybackResumed
            | PlaybackEventType::SessionSuperseded => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::SeekOperation => {
                debug!("[{}] {} (took: {:?})", event_type.as_str(), details, duration);
            }
            PlaybackEventType::UnlockRejected | PlaybackEventType::ReadinessTimeout => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            PlaybackEventType::PlaybackRejected | PlaybackEventType::ResourceError => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let event = PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_unlock(&self, succeeded: bool, details: &str) {
        let event_type = if succeeded {
            PlaybackEventType::UnlockSucceeded
        } else {
            PlaybackEventType::UnlockRejected
        };
        self.log_event(event_type, details.to_string(), None);
    }

    pub fn log_playback_requested(&self, locator: &str, generation: u64) {
        self.log_event(
            PlaybackEventType::PlaybackRequested,
            format!("Session {} requested '{}'", generation, locator),
            None,
        );
    }

    pub fn log_playback_started(&self, locator: Option<&str>) {
        self.log_event(
            PlaybackEventType::PlaybackStarted,
            format!("Playing: {}", locator.unwrap_or("<no source>")),
            None,
        );
    }

    pub fn log_playback_paused(&self, position: f64) {
        self.log_event(
            PlaybackEventType::PlaybackPaused,
            format!("Playback paused at position: {:.2}s", position),
            None,
        );
    }

    pub fn log_playback_resumed(&self, position: f64) {
        self.log_event(
            PlaybackEventType::PlaybackResumed,
            format!("Playback resumed from position: {:.2}s", position),
            None,
        );
    }

    pub fn log_playback_stopped(&self, reason: &str) {
        self.log_event(
            PlaybackEventType::PlaybackStopped,
            format!("Playback stopped: {}", reason),
            None,
        );
    }

    /// `signal` names which end detector won the race
    pub fn log_playback_ended(&self, locator: Option<&str>, signal: &str) {
        self.log_event(
            PlaybackEventType::PlaybackEnded,
            format!("Finished '{}' (detected by {})", locator.unwrap_or("<no source>"), signal),
            None,
        );
    }

    pub fn log_seek_operation(&self, from_position: f64, to_position: f64) {
        self.log_event(
            PlaybackEventType::SeekOperation,
            format!("Seek from {:.2}s to {:.2}s", from_position, to_position),
            None,
        );
    }

    pub fn log_readiness_timeout(&self, locator: &str, waited: Duration, proceeding: bool) {
        self.log_event(
            PlaybackEventType::ReadinessTimeout,
            format!(
                "'{}' not ready after {}ms ({})",
                locator,
                waited.as_millis(),
                if proceeding { "attempting playback anyway" } else { "failing session" }
            ),
            Some(waited),
        );
    }

    pub fn log_playback_rejected(&self, locator: &str, reason: &str) {
        self.log_event(
            PlaybackEventType::PlaybackRejected,
            format!("Platform rejected '{}': {}", locator, reason),
            None,
        );
    }

    pub fn log_resource_error(&self, locator: Option<&str>, message: &str) {
        self.log_event(
            PlaybackEventType::ResourceError,
            format!("Resource error for '{}': {}", locator.unwrap_or("<no source>"), message),
            None,
        );
    }

    pub fn log_session_superseded(&self, locator: &str, generation: u64) {
        self.log_event(
            PlaybackEventType::SessionSuperseded,
            format!("Session {} for '{}' was superseded", generation, locator),
            None,
        );
    }

    /// Get recent events for debugging, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(count);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Clear event history
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Get event statistics
    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        let Ok(events) = self.events.lock() else {
            return stats;
        };

        for event in events.iter() {
            match event.event_type {
                PlaybackEventType::UnlockRejected => stats.unlock_rejections += 1,
                PlaybackEventType::PlaybackEnded => stats.completions += 1,
                PlaybackEventType::PlaybackRejected | PlaybackEventType::ResourceError => {
                    stats.errors += 1
                }
                PlaybackEventType::ReadinessTimeout => stats.readiness_timeouts += 1,
                PlaybackEventType::SessionSuperseded => stats.superseded_sessions += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub unlock_rejections: usize,
    pub completions: usize,
    pub errors: usize,
    pub readiness_timeouts: usize,
    pub superseded_sessions: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }
}
