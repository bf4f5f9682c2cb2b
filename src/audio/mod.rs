pub mod engine;
pub mod session;
pub mod simulated;
pub mod native;
pub mod decoder;
pub mod resampler;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use crate::error::OutputError;
use crate::models::ReadyState;

pub use engine::{PlaybackEngine, PlayOptions};
pub use session::{EndGuard, Callbacks};
pub use simulated::{SimulatedOutput, SimulationController, SimulationOptions, AutoplayPolicy};
pub use native::NativeOutput;

/// Platform answer to a play request. Settles once, independently of what
/// the engine has done with the source in the meantime.
pub type PlayFuture = Pin<Box<dyn Future<Output = Result<(), OutputError>> + Send + 'static>>;

/// Event reported by an output, tagged with the source epoch it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct OutputEvent {
    pub epoch: u64,
    pub kind: OutputEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEventKind {
    LoadedMetadata { duration: f64 },
    CanPlay,
    CanPlayThrough,
    Play,
    Pause,
    /// Periodic position report, seconds
    TimeUpdate { position: f64, duration: f64 },
    Ended,
    Error { message: Option<String> },
}

impl OutputEventKind {
    /// Events that can move the ready state forward
    pub fn is_readiness(&self) -> bool {
        matches!(
            self,
            OutputEventKind::LoadedMetadata { .. }
                | OutputEventKind::CanPlay
                | OutputEventKind::CanPlayThrough
        )
    }
}

/// The single persistent audio output resource the engine drives.
///
/// Implementations behave like a media element: assigning a source resets
/// position and readiness, `play()` answers asynchronously, and state changes
/// are reported as [`OutputEvent`]s through the channel handed out by
/// [`AudioOutput::subscribe`].
pub trait AudioOutput: Send + 'static {
    /// Channel on which this output reports events. Replaces any earlier subscriber.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent>;

    fn source(&self) -> Option<String>;

    /// Assign (or clear) the source and return the new source epoch
    fn set_source(&mut self, locator: Option<&str>) -> u64;

    /// Epoch of the current source
    fn epoch(&self) -> u64;

    /// Begin fetching the current source
    fn load(&mut self);

    fn play(&mut self) -> PlayFuture;

    /// Pause playback. Play answers still pending settle with
    /// [`OutputError::Aborted`], even when the output was already paused.
    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    /// Duration in seconds, NaN while unknown, infinite for unbounded streams
    fn duration(&self) -> f64;

    fn ready_state(&self) -> ReadyState;

    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn playback_rate(&self) -> f32;

    fn set_playback_rate(&mut self, rate: f32);

    /// Message of the last resource error, if any
    fn error_message(&self) -> Option<String>;
}

/// Shared helper outputs use to tag and deliver events.
///
/// Cloning is cheap; clones share the subscriber and the epoch counter, so
/// worker threads can report events for the source they were started for.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<OutputEvent>>>>,
    epoch: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut sender) = self.sender.lock() {
            *sender = Some(tx);
        }
        rx
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Start a new source epoch and return it
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Emit for the current epoch
    pub fn emit(&self, kind: OutputEventKind) {
        self.emit_for(self.epoch(), kind);
    }

    /// Emit on behalf of a specific epoch. Returns false when nobody listens.
    pub fn emit_for(&self, epoch: u64, kind: OutputEventKind) -> bool {
        let Ok(sender) = self.sender.lock() else {
            return false;
        };
        match sender.as_ref() {
            Some(tx) => tx.send(OutputEvent { epoch, kind }).is_ok(),
            None => false,
        }
    }
}
