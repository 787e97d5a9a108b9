use std::time::{Duration, Instant};
use crate::core::UploadProgress;

/// Tracks bytes sent during one transfer run and derives speed and ETA.
///
/// `initial_offset` is what the server already held before this run (a
/// resumed session); it counts towards `loaded` but not towards speed.
#[derive(Debug, Clone)]
pub struct TransferMeter {
    total_bytes: u64,
    initial_offset: u64,
    transferred: u64,
    start_time: Instant,
}

impl TransferMeter {
    pub fn new(total_bytes: u64) -> Self {
        Self::with_offset(total_bytes, 0)
    }

    pub fn with_offset(total_bytes: u64, initial_offset: u64) -> Self {
        Self {
            total_bytes,
            initial_offset: initial_offset.min(total_bytes),
            transferred: 0,
            start_time: Instant::now(),
        }
    }

    /// 增加传输字节数
    pub fn add_bytes(&mut self, bytes: u64) -> UploadProgress {
        self.transferred += bytes;
        self.progress()
    }

    pub fn loaded(&self) -> u64 {
        (self.initial_offset + self.transferred).min(self.total_bytes)
    }

    pub fn progress(&self) -> UploadProgress {
        self.progress_at(self.start_time.elapsed())
    }

    pub fn progress_at(&self, elapsed: Duration) -> UploadProgress {
        let loaded = self.loaded();
        let percentage = if self.total_bytes > 0 {
            (loaded as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        };

        let elapsed_ms = elapsed.as_millis();
        let speed = if elapsed_ms > 0 {
            self.transferred as f64 / elapsed_ms as f64 * 1000.0
        } else {
            0.0
        };

        let remaining = self.total_bytes.saturating_sub(loaded);
        let eta = if speed > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / speed))
        } else {
            None
        };

        UploadProgress {
            loaded,
            total: self.total_bytes,
            percentage,
            speed,
            eta,
        }
    }
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "--".to_string();
    };

    let secs = eta.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
