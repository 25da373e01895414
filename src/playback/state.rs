use std::fmt;

use crate::types::AudioBuffer;

/// A prepared segment and how many times to play it.
#[derive(Clone, Debug)]
pub struct PlaybackRequest {
    pub segment: AudioBuffer,
    /// 0 = loop until stopped.
    pub loop_count: u32,
}

impl PlaybackRequest {
    pub fn new(segment: AudioBuffer, loop_count: u32) -> Self {
        Self {
            segment,
            loop_count,
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.loop_count == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
    Completed,
    Failed(String),
}

impl PlaybackState {
    /// Playing or Paused: a worker owns the sink.
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Completed => write!(f, "completed"),
            PlaybackState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Point-in-time view of a controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Iterations played to the end in the current session.
    pub loops_played: u32,
    pub loop_count: u32,
}

impl PlaybackStatus {
    /// `loops_played / loop_count`, or `None` when looping forever.
    pub fn progress(&self) -> Option<f32> {
        if self.loop_count == 0 {
            return None;
        }
        Some((self.loops_played as f32 / self.loop_count as f32).min(1.0))
    }
}
