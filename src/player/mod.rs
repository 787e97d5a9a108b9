mod analytics;
mod annotations;
mod keyboard;
mod machine;
mod state;

pub use analytics::{
    InteractionKind, PlaybackAnalytics, VideoAnalytics, VideoInteraction, WatchedSegment,
    CONTINUOUS_PLAYBACK_THRESHOLD,
};
pub use annotations::{Annotations, NewComment, NewNote, VideoComment, VideoNote};
pub use keyboard::{key_action, Key, KeyAction};
pub use machine::VideoPlayer;
pub use state::{MediaElement, MediaEvent, PlayerEvent, PlayerSnapshot, PlayerState, VideoProgress};

/// Percentage of `duration` reached at `current_time`, always within `[0, 100]`.
pub fn calculate_video_progress(current_time: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 {
        return 0.0;
    }
    let percentage = current_time / duration * 100.0;
    if percentage.is_nan() {
        return 0.0;
    }
    percentage.clamp(0.0, 100.0)
}

/// `m:ss`, or `h:mm:ss` from one hour on
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(calculate_video_progress(10.0, 0.0), 0.0);
        assert_eq!(calculate_video_progress(10.0, -5.0), 0.0);
        assert_eq!(calculate_video_progress(-1.0, 100.0), 0.0);
        assert_eq!(calculate_video_progress(150.0, 100.0), 100.0);
        assert_eq!(calculate_video_progress(25.0, 100.0), 25.0);
        assert_eq!(calculate_video_progress(f64::NAN, 100.0), 0.0);
    }

    #[test]
    fn test_progress_with_infinite_values() {
        assert_eq!(calculate_video_progress(f64::INFINITY, 100.0), 100.0);
        assert_eq!(calculate_video_progress(f64::NEG_INFINITY, 100.0), 0.0);
        assert_eq!(calculate_video_progress(30.0, f64::INFINITY), 0.0);
        assert_eq!(calculate_video_progress(f64::INFINITY, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3600.0), "1:00:00");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(-3.0), "0:00");
    }
}
