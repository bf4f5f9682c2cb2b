use crate::error::{AudioError, OutputError, PlaybackError, PlayerError};
use log::{info, warn};
use std::collections::HashMap;

const UNLOCK_KEY: &str = "unlock";

/// What the caller should do after a failed unlock or play
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Call `unlock()` again from the next user gesture, then play
    RetryUnlock(String),
    /// Issue the same `play()` again
    ReissuePlay(String),
    GiveUp(String),
}

impl RecoveryAction {
    pub fn is_retry(&self) -> bool {
        !matches!(self, RecoveryAction::GiveUp(_))
    }

    pub fn message(&self) -> &str {
        match self {
            RecoveryAction::RetryUnlock(msg)
            | RecoveryAction::ReissuePlay(msg)
            | RecoveryAction::GiveUp(msg) => msg,
        }
    }
}

/// Retry bookkeeping for playback failures, bounded per locator
pub struct RetryAdvisor {
    attempts: HashMap<String, u32>,
    max_attempts: u32,
}

impl RetryAdvisor {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: HashMap::new(),
            max_attempts,
        }
    }

    /// Advice for an error delivered through `on_error`
    pub fn advise(&mut self, error: &PlaybackError) -> RecoveryAction {
        if let Some(exhausted) = self.bump(error.locator()) {
            return exhausted;
        }

        let action = match error {
            PlaybackError::Rejected { source, .. } => match source {
                OutputError::NotAllowed(_) => RecoveryAction::RetryUnlock(
                    "The platform wants a user gesture; unlock and play again".to_string(),
                ),
                OutputError::Aborted => RecoveryAction::ReissuePlay(
                    "The play request was interrupted; issuing it again".to_string(),
                ),
                OutputError::Device(msg) => {
                    RecoveryAction::ReissuePlay(format!("Output device hiccup ({}); trying again", msg))
                }
                OutputError::NotSupported(msg) => {
                    RecoveryAction::GiveUp(format!("The resource cannot be played: {}", msg))
                }
            },
            PlaybackError::ReadinessTimeout { waited_ms, .. } => RecoveryAction::ReissuePlay(format!(
                "Resource was not ready after {}ms; trying again",
                waited_ms
            )),
            PlaybackError::Resource { message, .. } => {
                RecoveryAction::GiveUp(format!("The resource failed to load: {}", message))
            }
        };

        match &action {
            RecoveryAction::GiveUp(msg) => warn!("Giving up on '{}': {}", error.locator(), msg),
            other => info!("Recovery for '{}': {}", error.locator(), other.message()),
        }
        action
    }

    /// Advice after `unlock()` resolved false
    pub fn advise_unlock_failure(&mut self) -> RecoveryAction {
        if let Some(exhausted) = self.bump(UNLOCK_KEY) {
            return exhausted;
        }
        RecoveryAction::RetryUnlock("Unlock was refused; retry from the next user gesture".to_string())
    }

    /// Advice for errors surfaced outside the engine callbacks
    pub fn advise_player_error(&mut self, error: &PlayerError) -> RecoveryAction {
        match error {
            PlayerError::Playback(playback) => self.advise(playback),
            PlayerError::Audio(AudioError::DeviceNotFound { device }) => RecoveryAction::GiveUp(format!(
                "Device '{}' not found; use 'device clear' to go back to the default device",
                device
            )),
            other => RecoveryAction::GiveUp(other.user_message()),
        }
    }

    /// Forget the attempts for `locator` once it played through
    pub fn record_success(&mut self, locator: &str) {
        self.attempts.remove(locator);
        self.attempts.remove(UNLOCK_KEY);
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
    }

    pub fn statistics(&self) -> RecoveryStatistics {
        RecoveryStatistics {
            tracked_keys: self.attempts.len(),
            total_attempts: self.attempts.values().sum(),
            max_attempts: self.max_attempts,
        }
    }

    /// Count an attempt; returns the give-up action once the budget is spent
    fn bump(&mut self, key: &str) -> Option<RecoveryAction> {
        let attempts = self.attempts.entry(key.to_string()).or_insert(0);
        *attempts += 1;

        if *attempts > self.max_attempts {
            warn!("Maximum recovery attempts ({}) exceeded for '{}'", self.max_attempts, key);
            return Some(RecoveryAction::GiveUp(format!(
                "Maximum attempts ({}) exceeded for '{}'",
                self.max_attempts, key
            )));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryStatistics {
    pub tracked_keys: usize,
    pub total_attempts: u32,
    pub max_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(source: OutputError) -> PlaybackError {
        PlaybackError::Rejected {
            locator: "a.mp3".to_string(),
            source,
        }
    }

    #[test]
    fn test_autoplay_block_suggests_unlock() {
        let mut advisor = RetryAdvisor::new(3);
        let action = advisor.advise(&rejected(OutputError::NotAllowed("gesture".to_string())));
        assert!(matches!(action, RecoveryAction::RetryUnlock(_)));
        assert!(action.is_retry());
    }

    #[test]
    fn test_transient_failures_reissue() {
        let mut advisor = RetryAdvisor::new(5);
        assert!(matches!(advisor.advise(&rejected(OutputError::Aborted)), RecoveryAction::ReissuePlay(_)));
        assert!(matches!(
            advisor.advise(&rejected(OutputError::Device("xrun".to_string()))),
            RecoveryAction::ReissuePlay(_)
        ));

        let timeout = PlaybackError::ReadinessTimeout { locator: "a.mp3".to_string(), waited_ms: 5000 };
        match advisor.advise(&timeout) {
            RecoveryAction::ReissuePlay(msg) => assert!(msg.contains("5000ms")),
            other => panic!("Expected ReissuePlay, got {:?}", other),
        }
        assert_eq!(advisor.attempts("a.mp3"), 3);
    }

    #[test]
    fn test_permanent_failures_give_up() {
        let mut advisor = RetryAdvisor::new(3);
        let resource = PlaybackError::Resource {
            locator: "a.mp3".to_string(),
            message: "MEDIA_ERR_SRC_NOT_SUPPORTED".to_string(),
        };
        let action = advisor.advise(&resource);
        assert!(!action.is_retry());
        assert!(action.message().contains("MEDIA_ERR_SRC_NOT_SUPPORTED"));

        assert!(!advisor.advise(&rejected(OutputError::NotSupported("codec".to_string()))).is_retry());
    }

    #[test]
    fn test_max_attempts_per_locator() {
        let mut advisor = RetryAdvisor::new(2);
        let error = rejected(OutputError::Aborted);

        assert!(advisor.advise(&error).is_retry());
        assert!(advisor.advise(&error).is_retry());
        match advisor.advise(&error) {
            RecoveryAction::GiveUp(msg) => assert!(msg.contains("Maximum attempts (2)")),
            other => panic!("Expected GiveUp, got {:?}", other),
        }

        // Other locators keep their own budget
        let other = PlaybackError::Rejected { locator: "b.mp3".to_string(), source: OutputError::Aborted };
        assert!(advisor.advise(&other).is_retry());
    }

    #[test]
    fn test_unlock_budget() {
        let mut advisor = RetryAdvisor::new(1);
        assert!(matches!(advisor.advise_unlock_failure(), RecoveryAction::RetryUnlock(_)));
        assert!(matches!(advisor.advise_unlock_failure(), RecoveryAction::GiveUp(_)));
    }

    #[test]
    fn test_record_success_resets() {
        let mut advisor = RetryAdvisor::new(1);
        let error = rejected(OutputError::Aborted);
        assert!(advisor.advise(&error).is_retry());
        advisor.advise_unlock_failure();

        advisor.record_success("a.mp3");
        assert_eq!(advisor.attempts("a.mp3"), 0);
        assert_eq!(advisor.attempts(UNLOCK_KEY), 0);
        assert!(advisor.advise(&error).is_retry());
    }

    #[test]
    fn test_player_error_advice() {
        let mut advisor = RetryAdvisor::new(3);
        let action = advisor.advise_player_error(&PlayerError::Audio(AudioError::DeviceNotFound {
            device: "USB DAC".to_string(),
        }));
        assert!(action.message().contains("USB DAC"));
        assert!(!action.is_retry());

        let action = advisor.advise_player_error(&PlayerError::Playback(rejected(OutputError::Aborted)));
        assert!(action.is_retry());
    }

    #[test]
    fn test_statistics() {
        let mut advisor = RetryAdvisor::new(4);
        advisor.advise(&rejected(OutputError::Aborted));
        advisor.advise(&rejected(OutputError::Aborted));
        advisor.advise_unlock_failure();

        let stats = advisor.statistics();
        assert_eq!(stats.tracked_keys, 2);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.max_attempts, 4);

        advisor.clear();
        assert_eq!(advisor.statistics().tracked_keys, 0);
    }
}
