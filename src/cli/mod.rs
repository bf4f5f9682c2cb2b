use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::StatusDisplay;

/// Gesture-gated audio playback CLI
#[derive(Parser)]
#[command(name = "gesture-audio")]
#[command(about = "Mobile-safe audio playback engine with a terminal front end")]
#[command(version = "0.1.0")]
pub struct CliApp {
    /// Drive a simulated mobile output instead of the sound card
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Make the simulated output demand a user gesture before playing
    #[arg(long, global = true)]
    pub strict_autoplay: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Debug, PartialEq, Subcommand)]
pub enum Commands {
    /// Play a resource until it ends
    Play {
        /// File path, file:// URI or data: URI
        locator: String,
        /// Volume level (0-100)
        #[arg(short, long)]
        volume: Option<u8>,
        /// Playback rate (e.g. 1.25)
        #[arg(short, long)]
        rate: Option<f32>,
        /// Attempts per failure before giving up
        #[arg(long, default_value_t = 2)]
        retries: u32,
    },
    /// Unlock the output and report whether the platform accepted it
    Unlock,
    /// Interactive shell (default)
    Shell,
    /// Audio output device management
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Device management subcommands
#[derive(Debug, PartialEq, Subcommand)]
pub enum DeviceAction {
    /// List available audio output devices
    List,
    /// Prefer an output device by name
    Set {
        /// Device name
        device: String,
    },
    /// Go back to the system default device
    Clear,
}

/// Configuration subcommands
#[derive(Debug, PartialEq, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Restore defaults
    Reset,
    /// How long play() waits for the resource to become ready
    Timeout {
        /// Milliseconds
        ms: u64,
    },
    /// What happens when the readiness wait times out (optimistic|strict)
    Policy { policy: String },
    /// Default volume level (0-100)
    Volume { level: u8 },
}

/// Commands understood by the interactive shell
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Play { locator: String },
    Pause,
    Resume,
    Stop,
    Seek { position: Duration },
    Volume { level: u8 },
    Rate { rate: f32 },
    Unlock,
    Status,
    Events { count: usize },
    Quit,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Expand `~` in plain paths; URIs pass through untouched
    pub fn expand_locator(locator: &str) -> String {
        if locator.contains(':') && !locator.starts_with('~') {
            return locator.to_string();
        }
        Self::expand_path(locator).to_string_lossy().into_owned()
    }

    /// Parse command from string (for interactive mode)
    pub fn parse_command(input: &str) -> Result<ShellCommand, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        if args.is_empty() {
            return Err(ParseError::EmptyCommand);
        }

        match args[0] {
            "play" => {
                if args.len() > 1 {
                    Ok(ShellCommand::Play {
                        locator: Self::expand_locator(&args[1..].join(" ")),
                    })
                } else {
                    Err(ParseError::MissingArgument {
                        command: "play".to_string(),
                        argument: "locator".to_string(),
                    })
                }
            }
            "pause" => Ok(ShellCommand::Pause),
            "resume" => Ok(ShellCommand::Resume),
            "stop" => Ok(ShellCommand::Stop),
            "unlock" => Ok(ShellCommand::Unlock),
            "status" => Ok(ShellCommand::Status),
            "exit" | "quit" => Ok(ShellCommand::Quit),
            "seek" => {
                if args.len() > 1 {
                    Ok(ShellCommand::Seek {
                        position: Self::parse_time(args[1])?,
                    })
                } else {
                    Err(ParseError::MissingArgument {
                        command: "seek".to_string(),
                        argument: "position".to_string(),
                    })
                }
            }
            "volume" => {
                if args.len() > 1 {
                    match args[1].parse::<u8>() {
                        Ok(level) if level <= 100 => Ok(ShellCommand::Volume { level }),
                        Ok(_) => Err(ParseError::InvalidArgument {
                            argument: "volume level".to_string(),
                            value: args[1].to_string(),
                            expected: "0-100".to_string(),
                        }),
                        Err(_) => Err(ParseError::InvalidArgument {
                            argument: "volume level".to_string(),
                            value: args[1].to_string(),
                            expected: "number 0-100".to_string(),
                        }),
                    }
                } else {
                    Err(ParseError::MissingArgument {
                        command: "volume".to_string(),
                        argument: "level".to_string(),
                    })
                }
            }
            "rate" => {
                if args.len() > 1 {
                    match args[1].trim_end_matches('x').parse::<f32>() {
                        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(ShellCommand::Rate { rate }),
                        _ => Err(ParseError::InvalidArgument {
                            argument: "playback rate".to_string(),
                            value: args[1].to_string(),
                            expected: "positive number".to_string(),
                        }),
                    }
                } else {
                    Err(ParseError::MissingArgument {
                        command: "rate".to_string(),
                        argument: "rate".to_string(),
                    })
                }
            }
            "events" => match args.get(1) {
                None => Ok(ShellCommand::Events { count: 10 }),
                Some(value) => value
                    .parse::<usize>()
                    .map(|count| ShellCommand::Events { count })
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "event count".to_string(),
                        value: value.to_string(),
                        expected: "number".to_string(),
                    }),
            },
            "help" => Err(ParseError::HelpRequested),
            _ => Err(ParseError::UnknownCommand {
                command: args[0].to_string(),
            }),
        }
    }

    /// Display help information
    pub fn display_help() {
        println!("Gesture Audio - Available Commands:");
        println!();
        println!("Playback Control:");
        println!("  play <locator>  - Play a file path, file:// or data: URI");
        println!("  pause           - Pause playback");
        println!("  resume          - Resume playback");
        println!("  stop            - Stop playback and reset position");
        println!("  seek <time>     - Seek to position (e.g., '1:30', '90s')");
        println!("  volume <0-100>  - Set volume level");
        println!("  rate <factor>   - Set playback rate (e.g., '1.25')");
        println!();
        println!("Output:");
        println!("  unlock          - Unlock the output (counts as a user gesture)");
        println!();
        println!("Information:");
        println!("  status          - Show current playback status");
        println!("  events [n]      - Show the last n lifecycle events");
        println!();
        println!("General:");
        println!("  help            - Show this help message");
        println!("  exit, quit      - Exit");
    }

    /// Parse time string to Duration with enhanced validation
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        // "1:30", "1:30.5", "90", "90s"
        if trimmed.contains(':') {
            let parts: Vec<&str> = trimmed.split(':').collect();
            if parts.len() != 2 {
                return Err(invalid());
            }

            let minutes: u64 = parts[0].parse().map_err(|_| invalid())?;
            let seconds: f64 = parts[1].parse().map_err(|_| invalid())?;

            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }

            Ok(Duration::from_secs_f64(minutes as f64 * 60.0 + seconds))
        } else {
            let seconds: f64 = trimmed.trim_end_matches('s').parse().map_err(|_| invalid())?;

            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid());
            }

            Ok(Duration::from_secs_f64(seconds))
        }
    }

    /// Validate seek position against the resource duration, when it is known
    pub fn validate_seek_time(position: Duration, duration: f64) -> Result<Duration, ParseError> {
        if duration.is_finite() && duration > 0.0 && position.as_secs_f64() > duration {
            return Err(ParseError::SeekBeyondDuration {
                position: position.as_secs_f64(),
                duration,
            });
        }
        Ok(position)
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Seek position {position:.2}s exceeds duration {duration:.2}s")]
    SeekBeyondDuration { position: f64, duration: f64 },

    #[error("Help requested")]
    HelpRequested,
}
