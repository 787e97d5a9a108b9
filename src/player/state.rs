use serde::{Deserialize, Serialize};
use crate::core::{MediaErrorKind, Result, VideoErrorCode, VideoResolution};
use super::analytics::{VideoAnalytics, VideoInteraction, WatchedSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Buffering,
    Ended,
    Error,
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Buffering => "buffering",
            PlayerState::Ended => "ended",
            PlayerState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Observable state of one player
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    /// Seconds
    pub current_time: f64,
    /// Seconds, 0 until metadata is loaded
    pub duration: f64,
    /// 0.0..=1.0
    pub volume: f64,
    pub muted: bool,
    pub fullscreen: bool,
    pub quality: VideoResolution,
    pub playback_rate: f64,
    /// Buffered percentage
    pub buffered: f64,
    pub loading: bool,
    pub error: Option<String>,
}

impl PlayerSnapshot {
    pub fn new(quality: VideoResolution, start_time: f64) -> Self {
        Self {
            state: PlayerState::Idle,
            current_time: start_time,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            quality,
            playback_rate: 1.0,
            buffered: 0.0,
            loading: false,
            error: None,
        }
    }
}

/// Events reported by the underlying media element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadedMetadata { duration: f64 },
    Play,
    Pause,
    TimeUpdate { current_time: f64 },
    /// Playback stalled waiting for data
    Waiting,
    CanPlay,
    Ended,
    Error { kind: MediaErrorKind },
    VolumeChange { volume: f64, muted: bool },
    RateChange { rate: f64 },
    /// End of the last buffered range, seconds
    Progress { buffered_end: f64 },
    FullscreenChange { active: bool },
}

/// Playback position report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    pub current_time: f64,
    pub duration: f64,
    pub percentage: f64,
    pub watched_segments: Vec<WatchedSegment>,
}

/// Published on the player's broadcast channel
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },
    Progress(VideoProgress),
    Interaction(VideoInteraction),
    Error {
        code: VideoErrorCode,
        message: String,
    },
    Analytics(Box<VideoAnalytics>),
}

/// Control surface of a media element (browser video tag, native decoder, test double).
///
/// Commands only request a change; the element confirms it with a [`MediaEvent`].
pub trait MediaElement: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, time: f64);

    fn is_paused(&self) -> bool;

    fn set_volume(&mut self, volume: f64);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn set_playback_rate(&mut self, rate: f64);

    fn set_source(&mut self, url: &str);

    fn load(&mut self);

    fn set_fullscreen(&mut self, active: bool) -> Result<()>;
}
