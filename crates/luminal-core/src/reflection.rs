//! Reflection Trigger: a single-threaded idle timer that, after a period of
//! inactivity, asks for a synthetic self-summary turn.
//!
//! A plain config struct plus a small state machine owning its own timing
//! state.

use chrono::{DateTime, Duration, Utc};

use crate::config::ReflectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionState {
    Idle,
    Armed,
    Firing,
}

pub struct ReflectionTrigger {
    config: ReflectionConfig,
    state: ReflectionState,
    last_user_ts: Option<DateTime<Utc>>,
    messages_since_reflection: u32,
}

impl ReflectionTrigger {
    pub fn new(config: ReflectionConfig) -> Self {
        Self {
            config,
            state: ReflectionState::Idle,
            last_user_ts: None,
            messages_since_reflection: 0,
        }
    }

    pub fn state(&self) -> ReflectionState {
        self.state
    }

    pub fn prompt(&self) -> &str {
        &self.config.prompt
    }

    pub fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    /// Record a new user message: (re)arms the idle timer.
    pub fn on_user_message(&mut self, now: DateTime<Utc>) {
        self.last_user_ts = Some(now);
        self.messages_since_reflection += 1;
        if self.config.enabled && self.state != ReflectionState::Firing {
            self.state = ReflectionState::Armed;
        }
    }

    /// Check the idle timer; transitions to `Firing` and returns `true`
    /// exactly when both thresholds are met.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled || self.state != ReflectionState::Armed {
            return false;
        }
        let Some(last) = self.last_user_ts else {
            return false;
        };

        let min_inactivity = Duration::milliseconds(self.config.min_inactivity_ms as i64);
        let elapsed = now - last;

        if elapsed >= min_inactivity && self.messages_since_reflection >= self.config.min_messages {
            self.state = ReflectionState::Firing;
            true
        } else {
            false
        }
    }

    /// Call once the synthetic system+assistant turn has been persisted.
    pub fn complete_firing(&mut self) {
        self.messages_since_reflection = 0;
        self.state = ReflectionState::Idle;
    }
}
