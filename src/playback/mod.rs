pub mod engine;

pub use engine::TimelineEngine;

use std::time::Duration;

use crate::core::Message;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Snapshot of the engine-owned state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    /// Index of the next message to process within the current run
    pub cursor: usize,
}

/// Pacing rules applied by the engine
#[derive(Debug, Clone)]
pub struct PlaybackTiming {
    /// Shortest typing/recording indicator
    pub typing_min: Duration,
    /// Longest typing/recording indicator
    pub typing_max: Duration,
    /// Pause after a reveal before the next message starts
    pub settle_pause: Duration,
    /// Extra wait after a voice message's own duration
    pub voice_buffer: Duration,
    /// Delay between revealing a voice message and auto-playing it
    pub autoplay_delay: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            typing_min: Duration::from_millis(1000),
            typing_max: Duration::from_millis(3000),
            settle_pause: Duration::from_millis(500),
            voice_buffer: Duration::from_millis(1000),
            autoplay_delay: Duration::from_millis(500),
        }
    }
}

impl PlaybackTiming {
    /// Indicator time: half the authored delay, clamped to [min, max]
    pub fn typing_time(&self, delay_ms: u64) -> Duration {
        Duration::from_millis(delay_ms / 2).clamp(self.typing_min, self.typing_max)
    }

    /// Wait between revealing `message` and starting the next one
    pub fn post_reveal_wait(&self, message: &Message) -> Duration {
        if message.has_playable_audio() {
            Duration::from_secs(u64::from(message.duration_seconds)) + self.voice_buffer
        } else {
            self.settle_pause
        }
    }
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub speed: f64, // 1.0 = real-time, 2.0 = 2x speed
    pub timing: PlaybackTiming,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            timing: PlaybackTiming::default(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_speed(speed: f64) -> Self {
        Self {
            speed: clamp_speed(speed),
            ..Self::default()
        }
    }

    /// Scale a nominal wait by the playback speed
    pub fn scaled(&self, nominal: Duration) -> Duration {
        if self.speed == 1.0 {
            nominal
        } else {
            nominal.div_f64(self.speed)
        }
    }
}

pub(crate) fn clamp_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.clamp(0.1, 10.0)
    } else {
        1.0
    }
}
