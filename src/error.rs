use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CLI parse error: {0}")]
    Parse(#[from] crate::cli::ParseError),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::Playback(err) => err.user_message(),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Io(err) => format!("Terminal I/O failed: {}", err),
            PlayerError::Parse(err) => format!("Command error: {}", err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Audio(err) => err.recovery_suggestions(),
            PlayerError::Playback(err) => err.recovery_suggestions(),
            PlayerError::Decode(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Io(_) => vec!["Check that the terminal is still attached".to_string()],
            PlayerError::Parse(_) => vec!["Type 'help' to see available commands".to_string()],
        }
    }

    /// Check if the caller can reasonably try the operation again
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::Playback(err) => err.is_recoverable(),
            PlayerError::Decode(err) => err.is_recoverable(),
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::Io(_) => false,
            PlayerError::Parse(_) => false, // Parse errors require correct input
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::Playback(PlaybackError::ReadinessTimeout { .. }) => ErrorSeverity::Warning,
            PlayerError::Playback(_) => ErrorSeverity::Error,
            PlayerError::Decode(DecodeError::UnsupportedLocator { .. }) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Io(_) => ErrorSeverity::Critical,
            PlayerError::Parse(_) => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Rejection reported by the platform when it refuses a play request.
///
/// Names mirror the DOM exceptions a media element rejects its play promise
/// with, so logs read the same regardless of which output produced them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
    #[error("NotAllowedError: {0}")]
    NotAllowed(String),

    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    #[error("AbortError: play request was interrupted")]
    Aborted,

    #[error("Device error: {0}")]
    Device(String),
}

impl OutputError {
    /// DOM-style exception name
    pub fn name(&self) -> &'static str {
        match self {
            OutputError::NotAllowed(_) => "NotAllowedError",
            OutputError::NotSupported(_) => "NotSupportedError",
            OutputError::Aborted => "AbortError",
            OutputError::Device(_) => "DeviceError",
        }
    }

    /// Whether the rejection is the autoplay policy refusing a non-gesture call
    pub fn is_autoplay_block(&self) -> bool {
        matches!(self, OutputError::NotAllowed(_))
    }
}

/// Errors delivered to a session's `on_error` callback
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("Playback of '{locator}' rejected: {source}")]
    Rejected {
        locator: String,
        #[source]
        source: OutputError,
    },

    #[error("Audio resource error for '{locator}': {message}")]
    Resource { locator: String, message: String },

    #[error("Audio resource '{locator}' not ready after {waited_ms}ms")]
    ReadinessTimeout { locator: String, waited_ms: u64 },
}

impl PlaybackError {
    /// Locator of the session the error belongs to
    pub fn locator(&self) -> &str {
        match self {
            PlaybackError::Rejected { locator, .. }
            | PlaybackError::Resource { locator, .. }
            | PlaybackError::ReadinessTimeout { locator, .. } => locator,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Rejected { source, .. } if source.is_autoplay_block() => {
                "Playback was blocked until you interact with the page".to_string()
            }
            PlaybackError::Rejected { source, .. } => {
                format!("The audio output refused to start playback ({})", source.name())
            }
            PlaybackError::Resource { message, .. } => {
                format!("The audio could not be loaded: {}", message)
            }
            PlaybackError::ReadinessTimeout { waited_ms, .. } => {
                format!("The audio did not finish buffering within {:.1}s", *waited_ms as f64 / 1000.0)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlaybackError::Rejected { source, .. } if source.is_autoplay_block() => vec![
                "Tap or press a key, then start playback again".to_string(),
                "Call unlock() from inside a user input handler".to_string(),
            ],
            PlaybackError::Rejected { .. } => vec![
                "Start playback again".to_string(),
                "Check that the output device is still available".to_string(),
            ],
            PlaybackError::Resource { .. } => vec![
                "Check that the audio link is reachable".to_string(),
                "Request a fresh audio link and play it again".to_string(),
            ],
            PlaybackError::ReadinessTimeout { .. } => vec![
                "Check the network connection".to_string(),
                "Switch the readiness policy to 'optimistic'".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            PlaybackError::Rejected { .. } => true, // Retry after a gesture
            PlaybackError::Resource { .. } => false, // Same locator will fail again
            PlaybackError::ReadinessTimeout { .. } => true,
        }
    }
}

/// Audio system errors (engine construction and output devices)
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::NoRuntime(_) => {
                "The playback engine must be created inside the async runtime".to_string()
            }
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::NoRuntime(_) => vec![
                "Construct the engine from within a Tokio runtime".to_string(),
            ],
            AudioError::DeviceNotFound { .. } => vec![
                "Check that your audio device is connected and powered on".to_string(),
                "Reset the preferred device with 'config device default'".to_string(),
            ],
            AudioError::StreamError(_) => vec![
                "Stop and start playback again".to_string(),
                "Check audio device connections".to_string(),
            ],
            AudioError::InitializationFailed(_) => vec![
                "Restart the application".to_string(),
                "Try the simulated output with --simulate".to_string(),
                "Verify audio drivers are properly installed".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::NoRuntime(_) => false,
            AudioError::DeviceNotFound { .. } => true, // Can fall back to default device
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => true,
        }
    }
}

/// Decoding errors for the native output
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported locator: {locator}")]
    UnsupportedLocator { locator: String },

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Corrupted source: {0}")]
    CorruptedSource(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedLocator { locator } => {
                format!("'{}' cannot be played by the local output", locator)
            }
            DecodeError::InvalidDataUri(msg) => {
                format!("Embedded audio data is malformed: {}", msg)
            }
            DecodeError::CorruptedSource(msg) => {
                format!("Audio appears to be corrupted or damaged: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => {
                format!("Failed to decode audio data: {}", msg)
            }
            DecodeError::Io(err) => {
                format!("Cannot read audio file: {}", err)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::UnsupportedLocator { .. } => vec![
                "Use a local file path, a file:// URL or a data: URI".to_string(),
                "Download remote audio before playing it locally".to_string(),
            ],
            DecodeError::InvalidDataUri(_) => vec![
                "Check that the data URI is base64 encoded".to_string(),
            ],
            DecodeError::CorruptedSource(_) | DecodeError::DecodeFailed(_) => vec![
                "Try re-downloading the file".to_string(),
                "Verify the file plays in another audio player".to_string(),
            ],
            DecodeError::Io(_) => vec![
                "Check that the file path is correct".to_string(),
                "Check file permissions".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            DecodeError::UnsupportedLocator { .. } => false,
            DecodeError::InvalidDataUri(_) => false,
            DecodeError::CorruptedSource(_) => false,
            DecodeError::DecodeFailed(_) => false,
            DecodeError::Io(_) => true, // File may appear or become readable
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/gesture-audio/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
                "Try resetting configuration with 'config reset'".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // Defaults are always available
    }
}
