use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine state machine. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioState {
    #[default]
    Idle,
    Unlocking,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

impl AudioState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioState::Idle => "idle",
            AudioState::Unlocking => "unlocking",
            AudioState::Loading => "loading",
            AudioState::Playing => "playing",
            AudioState::Paused => "paused",
            AudioState::Ended => "ended",
            AudioState::Error => "error",
        }
    }

    /// States in which a session has finished and the caller decides what's next
    pub fn is_terminal(&self) -> bool {
        matches!(self, AudioState::Idle | AudioState::Ended | AudioState::Error)
    }
}

impl fmt::Display for AudioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buffering level reported by an output, ordered from least to most data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadyState::HaveNothing => "have_nothing",
            ReadyState::HaveMetadata => "have_metadata",
            ReadyState::HaveCurrentData => "have_current_data",
            ReadyState::HaveFutureData => "have_future_data",
            ReadyState::HaveEnoughData => "have_enough_data",
        }
    }
}

/// Point-in-time view of the engine for UI polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: AudioState,
    pub locator: Option<String>,
    /// Position in seconds
    pub position: f64,
    /// Duration in seconds; `None` while unknown or for unbounded streams
    pub duration: Option<f64>,
    pub volume: f32,
    pub playback_rate: f32,
    pub unlocked: bool,
    pub playing: bool,
}

impl PlaybackSnapshot {
    /// Progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        match self.duration {
            Some(duration) if duration > 0.0 => (self.position / duration).clamp(0.0, 1.0) as f32,
            _ => 0.0,
        }
    }

    /// Remaining time in seconds, if the duration is known
    pub fn remaining(&self) -> Option<f64> {
        self.duration.map(|duration| (duration - self.position).max(0.0))
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            state: AudioState::Idle,
            locator: None,
            position: 0.0,
            duration: None,
            volume: 1.0,
            playback_rate: 1.0,
            unlocked: false,
            playing: false,
        }
    }
}
