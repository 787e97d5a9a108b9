use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::{VideoId, VideoResolution};

/// Deltas at or above this many seconds between two time updates are jumps, not viewing.
pub const CONTINUOUS_PLAYBACK_THRESHOLD: f64 = 2.0;

// Placeholder weights, not calibrated against real viewing data
const WATCH_WEIGHT: f64 = 0.7;
const INTERACTION_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatchedSegment {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Play,
    Pause,
    Seek,
    VolumeChange,
    Mute,
    Fullscreen,
    QualityChange,
    SpeedChange,
    Rewind,
    Forward,
    Restart,
    Ended,
    CommentAdded,
    CommentRemoved,
    NoteAdded,
    NoteRemoved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInteraction {
    pub id: String,
    pub video_id: VideoId,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    /// Media time when it happened
    pub timestamp: f64,
    pub value: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Report built from one playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAnalytics {
    pub video_id: VideoId,
    pub total_views: u32,
    pub total_watch_time: f64,
    pub average_watch_time: f64,
    pub completion_rate: f64,
    pub engagement_score: f64,
    pub interactions: u32,
    pub quality_distribution: HashMap<VideoResolution, f64>,
    pub watched_segments: Vec<WatchedSegment>,
    pub bounce_rate: f64,
    pub retention_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// In-memory accumulator for one player
#[derive(Debug, Clone, Default)]
pub struct PlaybackAnalytics {
    pub play_count: u32,
    pub pause_count: u32,
    pub seek_count: u32,
    pub quality_changes: u32,
    pub speed_changes: u32,
    pub fullscreen_usage: u32,
    pub interaction_count: u32,
    /// Seconds of continuous playback
    pub total_watch_time: f64,
    /// Furthest position reached, percentage
    pub completion_rate: f64,
    pub watched_segments: Vec<WatchedSegment>,
    last_time: Option<f64>,
    stopped: bool,
}

impl PlaybackAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop accumulating, e.g. after a media error
    pub fn stop(&mut self) {
        self.stopped = true;
        self.last_time = None;
    }

    pub fn resume(&mut self) {
        self.stopped = false;
    }

    pub fn track(&mut self, kind: InteractionKind) {
        if self.stopped {
            return;
        }

        self.interaction_count += 1;
        match kind {
            InteractionKind::Play => self.play_count += 1,
            InteractionKind::Pause => self.pause_count += 1,
            InteractionKind::Seek | InteractionKind::Rewind | InteractionKind::Forward => self.seek_count += 1,
            InteractionKind::QualityChange => self.quality_changes += 1,
            InteractionKind::SpeedChange => self.speed_changes += 1,
            InteractionKind::Ended => self.completion_rate = 100.0,
            _ => {}
        }
    }

    pub fn track_fullscreen(&mut self, active: bool) {
        self.track(InteractionKind::Fullscreen);
        if active && !self.stopped {
            self.fullscreen_usage += 1;
        }
    }

    /// Accumulate watch time from a `timeupdate` position.
    pub fn on_time_update(&mut self, current_time: f64, duration: f64) {
        if self.stopped {
            return;
        }

        if let Some(last) = self.last_time {
            let delta = current_time - last;
            if delta > 0.0 && delta < CONTINUOUS_PLAYBACK_THRESHOLD {
                self.total_watch_time += delta;
                self.extend_segments(last, current_time);
            }
        }
        self.last_time = Some(current_time);

        if duration > 0.0 {
            let reached = (current_time / duration * 100.0).clamp(0.0, 100.0);
            self.completion_rate = self.completion_rate.max(reached);
        }
    }

    fn extend_segments(&mut self, from: f64, to: f64) {
        match self.watched_segments.last_mut() {
            Some(segment) if (segment.end - from).abs() < CONTINUOUS_PLAYBACK_THRESHOLD => segment.end = to,
            _ => self.watched_segments.push(WatchedSegment { start: from, end: to }),
        }
    }

    /// `min(100, 0.7 * watch% + 0.3 * interactions per minute)`; a zero duration counts as one second.
    pub fn engagement_score(&self, duration: f64) -> f64 {
        let duration = if duration > 0.0 { duration } else { 1.0 };
        let watch_percentage = self.total_watch_time / duration * 100.0;
        let interaction_rate = self.interaction_count as f64 / (duration / 60.0);
        (watch_percentage * WATCH_WEIGHT + interaction_rate * INTERACTION_WEIGHT).min(100.0)
    }

    pub fn report(&self, video_id: &VideoId, duration: f64, quality: VideoResolution) -> VideoAnalytics {
        let mut quality_distribution = HashMap::new();
        quality_distribution.insert(quality, 100.0);

        VideoAnalytics {
            video_id: video_id.clone(),
            total_views: self.play_count,
            total_watch_time: self.total_watch_time,
            average_watch_time: self.total_watch_time / self.play_count.max(1) as f64,
            completion_rate: self.completion_rate,
            engagement_score: self.engagement_score(duration),
            interactions: self.interaction_count,
            quality_distribution,
            watched_segments: self.watched_segments.clone(),
            bounce_rate: if self.completion_rate < 10.0 { 100.0 } else { 0.0 },
            retention_rate: self.completion_rate,
            created_at: Utc::now(),
        }
    }
}

impl VideoInteraction {
    pub fn new(video_id: &VideoId, kind: InteractionKind, timestamp: f64, value: Option<serde_json::Value>) -> Self {
        Self {
            id: format!("interaction_{}", Uuid::new_v4().simple()),
            video_id: video_id.clone(),
            kind,
            timestamp,
            value,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_time_ignores_jumps() {
        let mut analytics = PlaybackAnalytics::new();
        for time in [0.0, 0.5, 1.0, 1.5, 30.0, 30.5, 29.0] {
            analytics.on_time_update(time, 100.0);
        }

        // 0 -> 1.5 continuous, jump to 30, 30 -> 30.5, backwards jump
        assert!((analytics.total_watch_time - 2.0).abs() < 1e-9);
        assert_eq!(
            analytics.watched_segments,
            vec![
                WatchedSegment { start: 0.0, end: 1.5 },
                WatchedSegment { start: 30.0, end: 30.5 },
            ]
        );
        assert_eq!(analytics.completion_rate, 30.5);
    }

    #[test]
    fn test_stopped_analytics_do_not_accumulate() {
        let mut analytics = PlaybackAnalytics::new();
        analytics.on_time_update(0.0, 10.0);
        analytics.stop();
        analytics.on_time_update(1.0, 10.0);
        analytics.track(InteractionKind::Play);
        assert_eq!(analytics.total_watch_time, 0.0);
        assert_eq!(analytics.interaction_count, 0);
    }

    #[test]
    fn test_engagement_score() {
        let mut analytics = PlaybackAnalytics::new();
        analytics.total_watch_time = 60.0;
        analytics.interaction_count = 2;
        // 50% watched of 120s, 1 interaction per minute
        assert!((analytics.engagement_score(120.0) - (50.0 * 0.7 + 1.0 * 0.3)).abs() < 1e-9);

        analytics.total_watch_time = 1000.0;
        assert_eq!(analytics.engagement_score(120.0), 100.0);
        assert_eq!(analytics.engagement_score(0.0), 100.0);
    }

    #[test]
    fn test_report() {
        let mut analytics = PlaybackAnalytics::new();
        analytics.track(InteractionKind::Play);
        analytics.track(InteractionKind::Play);
        analytics.track_fullscreen(true);
        analytics.total_watch_time = 10.0;

        let report = analytics.report(&VideoId::from("video_1"), 100.0, VideoResolution::P1080);
        assert_eq!(report.total_views, 2);
        assert_eq!(report.average_watch_time, 5.0);
        assert_eq!(report.interactions, 3);
        assert_eq!(report.bounce_rate, 100.0);
        assert_eq!(report.quality_distribution.get(&VideoResolution::P1080), Some(&100.0));
        assert_eq!(analytics.fullscreen_usage, 1);
    }
}
