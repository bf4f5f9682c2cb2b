//! Speaker-backed [`AudioOutput`] built on cpal, with symphonia decoding.
//!
//! One cpal stream is opened at construction and kept running for the
//! lifetime of the output; sources are swapped underneath it. The stream
//! lives on its own thread since cpal streams cannot move between threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::audio::decoder::decode_locator;
use crate::audio::resampler::prepare_for_device;
use crate::audio::{AudioOutput, EventEmitter, OutputEvent, OutputEventKind, PlayFuture};
use crate::error::{AudioError, OutputError};
use crate::models::ReadyState;

const MONITOR_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Render state shared between the control side and the device callback
#[derive(Debug)]
struct Playhead {
    epoch: u64,
    /// Interleaved at device rate and layout
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    /// Position in device frames; fractional under non-unit rates
    position: f64,
    playing: bool,
    volume: f32,
    rate: f32,
    ready_state: ReadyState,
    duration: f64,
    error: Option<String>,
    reached_end: bool,
    end_reported: bool,
}

impl Playhead {
    fn new() -> Self {
        Self {
            epoch: 0,
            samples: Vec::new(),
            channels: 0,
            sample_rate: 0,
            position: 0.0,
            playing: false,
            volume: 1.0,
            rate: 1.0,
            ready_state: ReadyState::HaveNothing,
            duration: f64::NAN,
            error: None,
            reached_end: false,
            end_reported: false,
        }
    }

    fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    fn is_loaded(&self) -> bool {
        self.ready_state >= ReadyState::HaveEnoughData
    }

    fn position_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position / self.sample_rate as f64
    }

    /// Forget the current resource and start a new epoch
    fn reset(&mut self, epoch: u64) {
        self.epoch = epoch;
        self.samples = Vec::new();
        self.position = 0.0;
        self.playing = false;
        self.ready_state = ReadyState::HaveNothing;
        self.duration = f64::NAN;
        self.error = None;
        self.reached_end = false;
        self.end_reported = false;
    }

    /// Fill one device buffer, advancing the position
    fn render<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let channels = self.channels;
        if channels == 0 {
            data.iter_mut().for_each(|s| *s = T::EQUILIBRIUM);
            return;
        }

        let frames = self.frames();
        for frame in data.chunks_mut(channels) {
            let index = self.position as usize;
            if self.playing && self.is_loaded() && index < frames {
                let base = index * channels;
                for (c, sample) in frame.iter_mut().enumerate() {
                    *sample = T::from_sample(self.samples[base + c] * self.volume);
                }
                self.position += self.rate.max(0.0) as f64;
            } else {
                frame.iter_mut().for_each(|s| *s = T::EQUILIBRIUM);
            }
        }

        if self.playing && self.is_loaded() && self.position as usize >= frames {
            self.position = frames as f64;
            self.playing = false;
            self.reached_end = true;
        }
    }
}

/// Output that plays through the system's audio device
pub struct NativeOutput {
    emitter: EventEmitter,
    playhead: Arc<Mutex<Playhead>>,
    source: Option<String>,
    device_name: String,
    running: Arc<AtomicBool>,
    audio_thread: Option<thread::JoinHandle<()>>,
    monitor_thread: Option<thread::JoinHandle<()>>,
}

impl NativeOutput {
    /// Open the preferred device, falling back to the default one
    pub fn new(preferred_device: Option<&str>) -> Result<Self, AudioError> {
        let emitter = EventEmitter::new();
        let playhead = Arc::new(Mutex::new(Playhead::new()));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let audio_thread = {
            let playhead = Arc::clone(&playhead);
            let running = Arc::clone(&running);
            let preferred = preferred_device.map(str::to_owned);
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    let stream = match open_stream(preferred.as_deref(), &playhead) {
                        Ok((stream, name)) => {
                            let _ = ready_tx.send(Ok(name));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    while running.load(Ordering::Relaxed) {
                        thread::sleep(IDLE_POLL);
                    }
                    let _ = stream.pause();
                })
                .map_err(|e| AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?
        };

        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = audio_thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(AudioError::InitializationFailed(
                    "audio thread exited before opening a stream".to_string(),
                ))
            }
        };

        let monitor_thread = {
            let playhead = Arc::clone(&playhead);
            let running = Arc::clone(&running);
            let emitter = emitter.clone();
            thread::Builder::new()
                .name("audio-monitor".to_string())
                .spawn(move || monitor_loop(&playhead, &emitter, &running))
                .map_err(|e| AudioError::InitializationFailed(format!("Failed to create monitor thread: {}", e)))?
        };

        info!("Native output opened on '{}'", device_name);

        Ok(Self {
            emitter,
            playhead,
            source: None,
            device_name,
            running,
            audio_thread: Some(audio_thread),
            monitor_thread: Some(monitor_thread),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Names of the output devices the host exposes
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn playhead(&self) -> MutexGuard<'_, Playhead> {
        lock(&self.playhead)
    }
}

impl AudioOutput for NativeOutput {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent> {
        self.emitter.subscribe()
    }

    fn source(&self) -> Option<String> {
        self.source.clone()
    }

    fn set_source(&mut self, locator: Option<&str>) -> u64 {
        let epoch = self.emitter.advance_epoch();
        self.playhead().reset(epoch);
        self.source = locator.map(str::to_owned);
        epoch
    }

    fn epoch(&self) -> u64 {
        self.emitter.epoch()
    }

    fn load(&mut self) {
        let Some(locator) = self.source.clone() else {
            return;
        };
        let epoch = self.emitter.epoch();
        let playhead = Arc::clone(&self.playhead);
        let emitter = self.emitter.clone();

        let spawned = thread::Builder::new()
            .name("audio-loader".to_string())
            .spawn(move || load_source(&locator, epoch, &playhead, &emitter));

        if let Err(e) = spawned {
            let message = format!("Failed to start loader: {}", e);
            error!("{}", message);
            self.playhead().error = Some(message.clone());
            self.emitter.emit_for(epoch, OutputEventKind::Error { message: Some(message) });
        }
    }

    fn play(&mut self) -> PlayFuture {
        let result = if self.source.is_none() {
            Err(OutputError::NotSupported("no source assigned".to_string()))
        } else if !self.running.load(Ordering::Relaxed) {
            Err(OutputError::Device("output stream is not running".to_string()))
        } else {
            let mut head = self.playhead();
            match head.error.clone() {
                Some(message) => Err(OutputError::NotSupported(message)),
                None => {
                    if !head.playing {
                        if head.is_loaded() && head.position as usize >= head.frames() {
                            head.position = 0.0;
                        }
                        head.playing = true;
                        head.reached_end = false;
                        head.end_reported = false;
                        drop(head);
                        self.emitter.emit(OutputEventKind::Play);
                    }
                    Ok(())
                }
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn pause(&mut self) {
        let mut head = self.playhead();
        if !head.playing {
            return;
        }
        head.playing = false;
        drop(head);
        self.emitter.emit(OutputEventKind::Pause);
    }

    fn is_paused(&self) -> bool {
        !self.playhead().playing
    }

    fn current_time(&self) -> f64 {
        self.playhead().position_secs()
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut head = self.playhead();
        let mut frame = seconds.max(0.0) * head.sample_rate as f64;
        if head.is_loaded() {
            frame = frame.min(head.frames() as f64);
        }
        head.position = frame;
        head.reached_end = false;
        head.end_reported = false;
    }

    fn duration(&self) -> f64 {
        self.playhead().duration
    }

    fn ready_state(&self) -> ReadyState {
        self.playhead().ready_state
    }

    fn volume(&self) -> f32 {
        self.playhead().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.playhead().volume = volume;
    }

    fn playback_rate(&self) -> f32 {
        self.playhead().rate
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.playhead().rate = rate;
    }

    fn error_message(&self) -> Option<String> {
        self.playhead().error.clone()
    }
}

impl Drop for NativeOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.monitor_thread.take() {
            let _ = handle.join();
        }
        debug!("Native output closed");
    }
}

fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device, AudioError> {
    if let Some(name) = preferred {
        let found = host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match found {
            Some(device) => return Ok(device),
            None => {
                warn!("Output device '{}' not found, falling back to default", name);
                return host.default_output_device().ok_or_else(|| AudioError::DeviceNotFound {
                    device: name.to_string(),
                });
            }
        }
    }

    host.default_output_device()
        .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))
}

fn open_stream(preferred: Option<&str>, playhead: &Arc<Mutex<Playhead>>) -> Result<(Stream, String), AudioError> {
    let host = cpal::default_host();
    let device = select_device(&host, preferred)?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let default_config = device
        .default_output_config()
        .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;
    let sample_format = default_config.sample_format();
    let config: StreamConfig = default_config.config();

    {
        let mut head = lock(playhead);
        head.channels = config.channels as usize;
        head.sample_rate = config.sample_rate.0;
    }

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, playhead),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, playhead),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, playhead),
        other => Err(AudioError::StreamError(format!("Unsupported sample format: {:?}", other))),
    }?;

    stream
        .play()
        .map_err(|e| AudioError::StreamError(format!("Failed to start audio stream: {}", e)))?;

    debug!(
        "Stream running: {} Hz, {} channels, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );
    Ok((stream, name))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    playhead: &Arc<Mutex<Playhead>>,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    T: cpal::FromSample<f32>,
{
    let playhead = Arc::clone(playhead);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| match playhead.lock() {
                Ok(mut head) => head.render(data),
                Err(_) => data.iter_mut().for_each(|s| *s = T::EQUILIBRIUM),
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Decode `locator` and install it if `epoch` is still current
fn load_source(locator: &str, epoch: u64, playhead: &Arc<Mutex<Playhead>>, emitter: &EventEmitter) {
    let (sample_rate, channels) = {
        let head = lock(playhead);
        if head.epoch != epoch {
            return;
        }
        (head.sample_rate, head.channels)
    };

    match decode_locator(locator) {
        Ok(decoded) => {
            let samples = prepare_for_device(&decoded, sample_rate, channels as u16);
            let duration = decoded.duration_secs();
            {
                let mut head = lock(playhead);
                if head.epoch != epoch {
                    debug!("Discarding decoded '{}': source changed", locator);
                    return;
                }
                head.samples = samples;
                head.duration = duration;
                head.ready_state = ReadyState::HaveEnoughData;
            }
            debug!("Loaded '{}' ({:.2}s)", locator, duration);
            emitter.emit_for(epoch, OutputEventKind::LoadedMetadata { duration });
            emitter.emit_for(epoch, OutputEventKind::CanPlay);
            emitter.emit_for(epoch, OutputEventKind::CanPlayThrough);
        }
        Err(e) => {
            let message = e.user_message();
            {
                let mut head = lock(playhead);
                if head.epoch != epoch {
                    return;
                }
                head.error = Some(message.clone());
            }
            warn!("Failed to load '{}': {}", locator, e);
            emitter.emit_for(epoch, OutputEventKind::Error { message: Some(message) });
        }
    }
}

fn monitor_loop(playhead: &Arc<Mutex<Playhead>>, emitter: &EventEmitter, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        thread::sleep(MONITOR_INTERVAL);

        let (epoch, events) = {
            let mut head = lock(playhead);
            let mut events = Vec::new();
            if head.playing && head.is_loaded() {
                events.push(OutputEventKind::TimeUpdate {
                    position: head.position_secs(),
                    duration: head.duration,
                });
            }
            if head.reached_end && !head.end_reported {
                head.end_reported = true;
                events.push(OutputEventKind::TimeUpdate {
                    position: head.duration,
                    duration: head.duration,
                });
                events.push(OutputEventKind::Pause);
                events.push(OutputEventKind::Ended);
            }
            (head.epoch, events)
        };

        for kind in events {
            emitter.emit_for(epoch, kind);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
