use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use crate::config::PlayerConfig;
use crate::core::{MediaErrorKind, Result, VideoError, VideoId, VideoResolution};
use super::analytics::{InteractionKind, PlaybackAnalytics, VideoAnalytics, VideoInteraction};
use super::annotations::{Annotations, NewComment, NewNote, VideoComment, VideoNote};
use super::keyboard::{key_action, Key, KeyAction};
use super::state::{MediaElement, MediaEvent, PlayerEvent, PlayerSnapshot, PlayerState, VideoProgress};
use super::calculate_video_progress;

/// Quality switch waiting for the new source's metadata
#[derive(Debug, Clone, Copy)]
struct PendingQuality {
    quality: VideoResolution,
    resume_at: f64,
    resume_playing: bool,
}

/// Mirrors media element events into a [`PlayerSnapshot`].
///
/// `ended` and `error` are sticky: a `play` event there is ignored until
/// [`VideoPlayer::restart`] or [`VideoPlayer::reload`] re-arms the player.
pub struct VideoPlayer<M> {
    video_id: VideoId,
    element: M,
    config: PlayerConfig,
    sources: HashMap<VideoResolution, String>,
    snapshot: PlayerSnapshot,
    /// State to return to when buffering ends
    resume_state: Option<PlayerState>,
    play_armed: bool,
    pending_quality: Option<PendingQuality>,
    start_time: f64,
    end_time: Option<f64>,
    metadata_loaded: bool,
    analytics: PlaybackAnalytics,
    annotations: Annotations,
    event_tx: broadcast::Sender<PlayerEvent>,
}

impl<M: MediaElement> VideoPlayer<M> {
    pub fn new(video_id: VideoId, element: M, sources: HashMap<VideoResolution, String>, config: PlayerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let snapshot = PlayerSnapshot::new(config.default_quality, 0.0);
        let mut analytics = PlaybackAnalytics::new();
        if !config.analytics {
            analytics.stop();
        }

        Self {
            annotations: Annotations::new(video_id.clone()),
            video_id,
            element,
            config,
            sources,
            snapshot,
            resume_state: None,
            play_armed: false,
            pending_quality: None,
            start_time: 0.0,
            end_time: None,
            metadata_loaded: false,
            analytics,
            event_tx,
        }
    }

    /// Play only `[start_time, end_time)`; playback pauses once `end_time` is reached.
    pub fn with_range(mut self, start_time: f64, end_time: Option<f64>) -> Self {
        self.start_time = start_time.max(0.0);
        self.end_time = end_time;
        self.snapshot.current_time = self.start_time;
        self
    }

    pub fn with_annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> &PlayerSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> PlayerState {
        self.snapshot.state
    }

    pub fn element(&self) -> &M {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut M {
        &mut self.element
    }

    pub fn analytics(&self) -> &PlaybackAnalytics {
        &self.analytics
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot.state == PlayerState::Playing
    }

    pub fn progress(&self) -> VideoProgress {
        VideoProgress {
            current_time: self.snapshot.current_time,
            duration: self.snapshot.duration,
            percentage: calculate_video_progress(self.snapshot.current_time, self.snapshot.duration),
            watched_segments: self.analytics.watched_segments.clone(),
        }
    }

    pub fn analytics_report(&self) -> VideoAnalytics {
        self.analytics.report(&self.video_id, self.snapshot.duration, self.snapshot.quality)
    }

    /// Publish the current analytics report to subscribers
    pub fn report_analytics(&self) {
        self.emit(PlayerEvent::Analytics(Box::new(self.analytics_report())));
    }

    /// Point the element at the source of the current quality and start loading.
    pub fn load(&mut self) -> Result<()> {
        let Some(url) = self.source_for(self.snapshot.quality) else {
            let kind = MediaErrorKind::SrcNotSupported;
            self.fail(kind);
            return Err(VideoError::Media(kind));
        };

        self.element.set_source(&url);
        self.element.load();
        self.metadata_loaded = false;
        self.snapshot.loading = true;
        self.snapshot.error = None;
        self.set_state(PlayerState::Loading);
        Ok(())
    }

    /// Leave `error` (or any state) by loading the source again.
    pub fn reload(&mut self) -> Result<()> {
        if self.config.analytics {
            self.analytics.resume();
        }
        self.resume_state = None;
        self.pending_quality = None;
        self.play_armed = true;
        self.load()
    }

    fn source_for(&self, quality: VideoResolution) -> Option<String> {
        self.sources
            .get(&quality)
            .or_else(|| self.sources.values().next())
            .cloned()
    }

    pub fn handle_event(&mut self, event: MediaEvent) {
        if self.snapshot.state == PlayerState::Error {
            debug!(video_id = %self.video_id, ?event, "Ignoring media event in error state");
            return;
        }

        match event {
            MediaEvent::LoadedMetadata { duration } => self.on_loaded_metadata(duration),
            MediaEvent::Play => {
                if matches!(self.snapshot.state, PlayerState::Ended) && !self.play_armed {
                    debug!(video_id = %self.video_id, "Ignoring play event after end");
                    return;
                }
                self.play_armed = false;
                self.resume_state = None;
                self.analytics.track(InteractionKind::Play);
                self.set_state(PlayerState::Playing);
            }
            MediaEvent::Pause => {
                if matches!(self.snapshot.state, PlayerState::Ended | PlayerState::Paused) {
                    return;
                }
                self.resume_state = None;
                self.analytics.track(InteractionKind::Pause);
                self.set_state(PlayerState::Paused);
            }
            MediaEvent::TimeUpdate { current_time } => self.on_time_update(current_time),
            MediaEvent::Waiting => {
                self.snapshot.loading = true;
                if matches!(self.snapshot.state, PlayerState::Playing | PlayerState::Paused) {
                    self.resume_state = Some(self.snapshot.state);
                    self.set_state(PlayerState::Buffering);
                }
            }
            MediaEvent::CanPlay => {
                self.snapshot.loading = false;
                match self.snapshot.state {
                    PlayerState::Buffering => {
                        let resume = self.resume_state.take().unwrap_or(PlayerState::Paused);
                        self.set_state(resume);
                    }
                    PlayerState::Loading => self.set_state(PlayerState::Paused),
                    _ => {}
                }
            }
            MediaEvent::Ended => {
                self.play_armed = false;
                self.resume_state = None;
                self.analytics.track(InteractionKind::Ended);
                self.set_state(PlayerState::Ended);
                self.report_analytics();
            }
            MediaEvent::Error { kind } => self.fail(kind),
            MediaEvent::VolumeChange { volume, muted } => {
                self.snapshot.volume = volume.clamp(0.0, 1.0);
                self.snapshot.muted = muted;
            }
            MediaEvent::RateChange { rate } => {
                self.snapshot.playback_rate = rate;
            }
            MediaEvent::Progress { buffered_end } => {
                self.snapshot.buffered = calculate_video_progress(buffered_end, self.snapshot.duration);
            }
            MediaEvent::FullscreenChange { active } => {
                self.snapshot.fullscreen = active;
            }
        }
    }

    fn on_loaded_metadata(&mut self, duration: f64) {
        self.snapshot.duration = duration.max(0.0);

        if let Some(pending) = self.pending_quality.take() {
            self.snapshot.quality = pending.quality;
            self.element.set_current_time(pending.resume_at);
            if pending.resume_playing {
                if let Err(err) = self.element.play() {
                    warn!(video_id = %self.video_id, "Failed to resume after quality change: {}", err);
                }
            }
            return;
        }

        if !self.metadata_loaded {
            self.metadata_loaded = true;
            if self.start_time > 0.0 {
                self.element.set_current_time(self.start_time);
            }
            if self.config.auto_play && self.snapshot.duration > 0.0 {
                if let Err(err) = self.element.play() {
                    warn!(video_id = %self.video_id, "Autoplay failed: {}", err);
                }
            }
        }
    }

    fn on_time_update(&mut self, current_time: f64) {
        self.snapshot.current_time = current_time;
        self.analytics.on_time_update(current_time, self.snapshot.duration);
        self.emit(PlayerEvent::Progress(self.progress()));

        if let Some(end_time) = self.end_time {
            if current_time >= end_time && self.snapshot.state == PlayerState::Playing {
                self.element.pause();
            }
        }
    }

    fn fail(&mut self, kind: MediaErrorKind) {
        let err = VideoError::Media(kind);
        warn!(video_id = %self.video_id, "Player error: {}", err);

        self.analytics.stop();
        self.resume_state = None;
        self.pending_quality = None;
        self.play_armed = false;
        self.snapshot.loading = false;
        self.snapshot.error = Some(err.to_string());
        self.set_state(PlayerState::Error);
        self.emit(PlayerEvent::Error {
            code: err.code(),
            message: err.to_string(),
        });
    }

    fn set_state(&mut self, new_state: PlayerState) {
        let old_state = self.snapshot.state;
        if old_state == new_state {
            return;
        }
        self.snapshot.state = new_state;
        debug!(video_id = %self.video_id, %old_state, %new_state, "Player state changed");
        self.emit(PlayerEvent::StateChanged { old_state, new_state });
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.event_tx.send(event);
    }

    fn interact(&mut self, kind: InteractionKind, value: Option<serde_json::Value>) {
        if self.analytics.is_stopped() {
            return;
        }
        if kind != InteractionKind::Fullscreen {
            self.analytics.track(kind);
        }
        let interaction = VideoInteraction::new(&self.video_id, kind, self.snapshot.current_time, value);
        self.emit(PlayerEvent::Interaction(interaction));
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.snapshot.state == PlayerState::Error {
            return Err(VideoError::Rejected("Player is in error state, reload first".to_string()));
        }
        Ok(())
    }

    /// Ask the element to play; after the end this restarts from the start time.
    pub fn play(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.snapshot.state == PlayerState::Ended {
            self.restart()?;
        }
        self.element.play()
    }

    pub fn pause(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.element.pause();
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Clamped to `[0, duration]`
    pub fn seek(&mut self, time: f64) -> Result<()> {
        self.ensure_usable()?;
        let target = time.clamp(0.0, self.snapshot.duration.max(0.0));
        self.element.set_current_time(target);
        self.interact(InteractionKind::Seek, Some(serde_json::json!(target)));
        Ok(())
    }

    /// Clamped to `[0, 1]`
    pub fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.ensure_usable()?;
        let volume = volume.clamp(0.0, 1.0);
        self.element.set_volume(volume);
        self.interact(InteractionKind::VolumeChange, Some(serde_json::json!(volume)));
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let muted = !self.element.is_muted();
        self.element.set_muted(muted);
        self.interact(InteractionKind::Mute, Some(serde_json::json!(muted)));
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if !self.config.enable_fullscreen {
            return Err(VideoError::Rejected("Fullscreen is disabled".to_string()));
        }
        let active = !self.snapshot.fullscreen;
        self.element.set_fullscreen(active)?;
        self.analytics.track_fullscreen(active);
        self.interact(InteractionKind::Fullscreen, Some(serde_json::json!(active)));
        Ok(())
    }

    /// Switch source, keeping position and play state once the new metadata arrives.
    pub fn change_quality(&mut self, quality: VideoResolution) -> Result<()> {
        self.ensure_usable()?;
        if quality == self.snapshot.quality && self.pending_quality.is_none() {
            return Ok(());
        }
        let url = self.sources.get(&quality).cloned().ok_or_else(|| {
            VideoError::InvalidParameters(vec![format!("No source for quality {}", quality)])
        })?;

        self.pending_quality = Some(PendingQuality {
            quality,
            resume_at: self.element.current_time(),
            resume_playing: !self.element.is_paused(),
        });
        self.snapshot.loading = true;
        self.element.set_source(&url);
        self.element.load();
        self.interact(InteractionKind::QualityChange, Some(serde_json::json!(quality)));
        Ok(())
    }

    /// Only rates listed in the player configuration are accepted.
    pub fn change_speed(&mut self, rate: f64) -> Result<()> {
        self.ensure_usable()?;
        if !self.config.playback_rates.iter().any(|allowed| (allowed - rate).abs() < f64::EPSILON) {
            return Err(VideoError::InvalidParameters(vec![format!("Unsupported playback rate {}", rate)]));
        }
        self.element.set_playback_rate(rate);
        self.interact(InteractionKind::SpeedChange, Some(serde_json::json!(rate)));
        Ok(())
    }

    /// Defaults to the configured seek step
    pub fn rewind(&mut self, seconds: Option<f64>) -> Result<()> {
        self.ensure_usable()?;
        let seconds = seconds.unwrap_or(self.config.seek_step);
        let target = (self.element.current_time() - seconds).max(0.0);
        self.element.set_current_time(target);
        self.interact(InteractionKind::Rewind, Some(serde_json::json!(seconds)));
        Ok(())
    }

    pub fn forward(&mut self, seconds: Option<f64>) -> Result<()> {
        self.ensure_usable()?;
        let seconds = seconds.unwrap_or(self.config.seek_step);
        let target = (self.element.current_time() + seconds).min(self.snapshot.duration);
        self.element.set_current_time(target);
        self.interact(InteractionKind::Forward, Some(serde_json::json!(seconds)));
        Ok(())
    }

    /// Back to the start time; re-arms playback after the end.
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.element.set_current_time(self.start_time);
        self.play_armed = true;
        self.interact(InteractionKind::Restart, None);
        Ok(())
    }

    pub fn handle_key(&mut self, key: Key) -> Result<()> {
        match key_action(key, self.config.keyboard_seek_step, self.config.volume_step) {
            KeyAction::TogglePlay => self.toggle_play(),
            KeyAction::Rewind(seconds) => self.rewind(Some(seconds)),
            KeyAction::Forward(seconds) => self.forward(Some(seconds)),
            KeyAction::Volume(delta) => self.set_volume(self.snapshot.volume + delta),
            KeyAction::ToggleMute => self.toggle_mute(),
            KeyAction::ToggleFullscreen => self.toggle_fullscreen(),
            KeyAction::SeekFraction(fraction) => self.seek(self.snapshot.duration * fraction),
        }
    }

    pub fn add_comment(&mut self, comment: NewComment) -> Result<VideoComment> {
        let comment = self.annotations.add_comment(comment, self.snapshot.current_time)?;
        self.interact(InteractionKind::CommentAdded, None);
        Ok(comment)
    }

    pub fn remove_comment(&mut self, comment_id: &str) -> bool {
        let removed = self.annotations.remove_comment(comment_id);
        if removed {
            self.interact(InteractionKind::CommentRemoved, None);
        }
        removed
    }

    pub fn add_note(&mut self, note: NewNote) -> Result<VideoNote> {
        let note = self.annotations.add_note(note, self.snapshot.current_time)?;
        self.interact(InteractionKind::NoteAdded, None);
        Ok(note)
    }

    pub fn remove_note(&mut self, note_id: &str) -> bool {
        let removed = self.annotations.remove_note(note_id);
        if removed {
            self.interact(InteractionKind::NoteRemoved, None);
        }
        removed
    }
}
