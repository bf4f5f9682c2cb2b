use std::io::{self, Write};
use crate::error::{AudioError, DecodeError, ErrorSeverity, PlaybackError, PlayerError};
use crate::logging::PlaybackEvent;
use crate::models::{AudioState, PlaybackSnapshot};

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display the full engine snapshot
    pub fn display_full_status(snapshot: &PlaybackSnapshot) {
        println!("┌─ Playback Status ───────────────────────────────────────┐");

        match &snapshot.locator {
            Some(locator) => {
                println!("│ Source: {}", Self::truncate(locator, 48));
                println!("│ State: {}", Self::format_state(snapshot.state));
                Self::display_position(snapshot);
            }
            None => {
                println!("│ No source loaded");
                println!("│ State: {}", Self::format_state(snapshot.state));
            }
        }

        println!("│");
        println!("│ Volume: {}%", (snapshot.volume * 100.0).round() as u8);
        println!("│ Rate: {:.2}x", snapshot.playback_rate);
        println!("│ Output: {}", if snapshot.unlocked { "unlocked" } else { "locked (needs a gesture)" });
        println!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_position(snapshot: &PlaybackSnapshot) {
        match snapshot.duration {
            Some(duration) => {
                let progress = snapshot.progress();
                println!("│ Position: {} / {}",
                    Self::format_seconds(snapshot.position),
                    Self::format_seconds(duration)
                );
                println!("│ Progress: [{}] {:.1}%", Self::create_progress_bar(progress, 40), progress * 100.0);
                if let Some(remaining) = snapshot.remaining() {
                    println!("│ Remaining: {}", Self::format_seconds(remaining));
                }
            }
            None => println!("│ Position: {} / --:--", Self::format_seconds(snapshot.position)),
        }
    }

    /// One-line status, e.g. for the playback progress line
    pub fn compact_line(snapshot: &PlaybackSnapshot) -> String {
        let name = snapshot
            .locator
            .as_deref()
            .map(|locator| Self::truncate(Self::short_name(locator), 32))
            .unwrap_or_else(|| "No source".to_string());

        match snapshot.duration {
            Some(duration) => format!(
                "{} | {} | [{}] {}/{}",
                Self::format_state(snapshot.state),
                name,
                Self::create_progress_bar(snapshot.progress(), 20),
                Self::format_seconds(snapshot.position),
                Self::format_seconds(duration)
            ),
            None => format!(
                "{} | {} | {}",
                Self::format_state(snapshot.state),
                name,
                Self::format_seconds(snapshot.position)
            ),
        }
    }

    /// Overwrite the current terminal line with the compact status
    pub fn display_position_update(snapshot: &PlaybackSnapshot) {
        print!("\r{:<80}", Self::compact_line(snapshot));
        let _ = io::stdout().flush();
    }

    /// Display recent lifecycle events, oldest first
    pub fn display_events(events: &[PlaybackEvent]) {
        if events.is_empty() {
            println!("No playback events recorded");
            return;
        }
        for event in events {
            let timing = event
                .duration
                .map(|d| format!(" ({}ms)", d.as_millis()))
                .unwrap_or_default();
            println!(
                "{} {:<20} {}{}",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.event_type.as_str(),
                event.details,
                timing
            );
        }
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        Self::display_error_context(error);

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_error_context(error: &PlayerError) {
        match error {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => {
                eprintln!("│");
                eprintln!("│ Use 'device list' to see available devices");
            }
            PlayerError::Playback(PlaybackError::Rejected { source, .. }) if source.is_autoplay_block() => {
                eprintln!("│");
                eprintln!("│ Run 'unlock' from a user action, then play again");
            }
            PlayerError::Playback(PlaybackError::ReadinessTimeout { .. }) => {
                eprintln!("│");
                eprintln!("│ 'config policy optimistic' plays without waiting");
            }
            PlayerError::Decode(DecodeError::UnsupportedLocator { .. }) => {
                eprintln!("│");
                eprintln!("│ Local output plays files, file:// and data: URIs");
            }
            PlayerError::Config(_) => {
                eprintln!("│");
                eprintln!("│ Configuration will use default values");
            }
            _ => {}
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() + 1 <= width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(current_line);
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }

        lines.into_iter()
            .map(|line| format!("{:<width$}", line, width = width))
            .collect()
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    /// Format seconds as MM:SS or HH:MM:SS; non-finite values render as --:--
    pub fn format_seconds(seconds: f64) -> String {
        if !seconds.is_finite() || seconds < 0.0 {
            return "--:--".to_string();
        }
        let total_seconds = seconds as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{:02}:{:02}", minutes, secs)
        }
    }

    /// Last path segment of a locator; inline data shows its media type
    pub fn short_name(locator: &str) -> &str {
        if let Some(rest) = locator.strip_prefix("data:") {
            return rest.split([';', ',']).next().unwrap_or("data");
        }
        locator
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(locator)
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    /// Create a progress bar string
    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        let empty = width - filled;
        format!("{}{}",
            "█".repeat(filled),
            "░".repeat(empty)
        )
    }

    pub fn format_state(state: AudioState) -> String {
        match state {
            AudioState::Idle => "⏹ Idle".to_string(),
            AudioState::Unlocking => "🔓 Unlocking".to_string(),
            AudioState::Loading => "⏳ Loading".to_string(),
            AudioState::Playing => "▶ Playing".to_string(),
            AudioState::Paused => "⏸ Paused".to_string(),
            AudioState::Ended => "✔ Ended".to_string(),
            AudioState::Error => "✗ Error".to_string(),
        }
    }
}
