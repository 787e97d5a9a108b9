use std::path::{Path, PathBuf};
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::{Result, VideoError};

/// Local identifier of a queued file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Video identifier, generated client side before the first upload call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    pub fn generate() -> Self {
        Self(format!("video_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VideoId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server assigned chunked-upload session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Webm,
    Mov,
    Avi,
}

impl VideoFormat {
    pub const ALL: [VideoFormat; 4] = [VideoFormat::Mp4, VideoFormat::Webm, VideoFormat::Mov, VideoFormat::Avi];

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "mp4" => Some(VideoFormat::Mp4),
            "webm" => Some(VideoFormat::Webm),
            "mov" => Some(VideoFormat::Mov),
            "avi" => Some(VideoFormat::Avi),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
            VideoFormat::Mov => "mov",
            VideoFormat::Avi => "avi",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Webm => "video/webm",
            VideoFormat::Mov => "video/quicktime",
            VideoFormat::Avi => "video/x-msvideo",
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum VideoResolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    K4,
}

impl Default for VideoResolution {
    fn default() -> Self {
        VideoResolution::P720
    }
}

impl std::fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VideoResolution::P360 => "360p",
            VideoResolution::P720 => "720p",
            VideoResolution::P1080 => "1080p",
            VideoResolution::K4 => "4k",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCategory {
    Commercial,
    Engineering,
    Installation,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

/// Server side lifecycle of a stored video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploading,
    #[default]
    Processing,
    Ready,
    Error,
}

/// Descriptive metadata the user attaches to an upload
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: VideoCategory,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

impl UploadMetadata {
    /// Defaults used when a file is queued: the file stem becomes the title.
    pub fn for_file(file: &VideoFile) -> Self {
        let title = Path::new(&file.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&file.name)
            .to_string();

        Self {
            title,
            ..Default::default()
        }
    }
}

/// Partial metadata edit; absent fields are left untouched
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<VideoCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl MetadataUpdate {
    pub fn apply_to(&self, metadata: &mut UploadMetadata) {
        if let Some(title) = &self.title {
            metadata.title = title.clone();
        }
        if let Some(description) = &self.description {
            metadata.description = description.clone();
        }
        if let Some(category) = self.category {
            metadata.category = category;
        }
        if let Some(visibility) = self.visibility {
            metadata.visibility = visibility;
        }
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
    }
}

/// A local file selected for upload
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VideoFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

impl VideoFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_metadata = tokio::fs::metadata(path).await?;
        if !file_metadata.is_file() {
            return Err(VideoError::Rejected(format!("Not a file: {}", path.display())));
        }

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| VideoError::Rejected(format!("Invalid file name: {}", path.display())))?
            .to_string();

        Ok(Self::with_size(path, name, file_metadata.len()))
    }

    /// Build a descriptor without touching the disk; the mime type is derived from the extension.
    pub fn with_size(path: impl Into<PathBuf>, name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        let mime_type = mime_type_for(&name).to_string();

        Self {
            path: path.into(),
            name,
            size,
            mime_type,
        }
    }

    /// Lower-cased text after the last dot, empty when there is none
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((_, extension)) => extension.to_ascii_lowercase(),
            None => String::new(),
        }
    }

    pub fn format(&self) -> Option<VideoFormat> {
        VideoFormat::from_extension(&self.extension())
    }
}

fn mime_type_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    if let Some(format) = VideoFormat::from_extension(extension) {
        return format.mime_type();
    }

    match extension.to_ascii_lowercase().as_str() {
        "mkv" => "video/x-matroska",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// Lifecycle of a queued file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UploadStatus::Uploading | UploadStatus::Processing)
    }
}

/// Transfer progress of one file
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UploadProgress {
    /// Bytes acknowledged so far
    pub loaded: u64,
    pub total: u64,
    pub percentage: f64,
    /// Bytes per second
    pub speed: f64,
    pub eta: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: SessionId,
    pub video_id: VideoId,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    #[serde(default)]
    pub uploaded_chunks: Vec<u32>,
    /// Token issued by the client, needed to resume the session later
    #[serde(default)]
    pub upload_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub video_id: VideoId,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub processing_status: VideoStatus,
    /// Seconds
    #[serde(default)]
    pub estimated_processing_time: u64,
    #[serde(default)]
    pub thumbnail_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub status: ProcessingState,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Aggregated viewing numbers attached to a stored video
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSnapshot {
    pub total_views: u64,
    pub total_watch_time: f64,
    pub average_watch_time: f64,
    pub completion_rate: f64,
    pub engagement_score: f64,
}

/// Descriptive record of a stored video
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub id: VideoId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: VideoCategory,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub qualities: Vec<VideoResolution>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub format: Option<VideoFormat>,
    #[serde(default)]
    pub status: VideoStatus,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub analytics: Option<AnalyticsSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file tracked by the upload queue
#[derive(Debug, Clone, Serialize)]
pub struct UploadFile {
    pub id: FileId,
    pub file: VideoFile,
    pub status: UploadStatus,
    pub progress: Option<UploadProgress>,
    pub session: Option<UploadSession>,
    pub video_id: Option<VideoId>,
    pub metadata: UploadMetadata,
    /// Final metadata once processing completed
    pub video: Option<VideoMetadata>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadFile {
    pub fn new(file: VideoFile) -> Self {
        let metadata = UploadMetadata::for_file(&file);
        Self {
            id: FileId::new(),
            file,
            status: UploadStatus::Pending,
            progress: None,
            session: None,
            video_id: None,
            metadata,
            video: None,
            error: None,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub uploading: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a UploadFile>) -> Self {
        let mut stats = QueueStats::default();
        for file in files {
            stats.total += 1;
            match file.status {
                UploadStatus::Pending => stats.pending += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                UploadStatus::Processing => stats.processing += 1,
                UploadStatus::Completed => stats.completed += 1,
                UploadStatus::Error => stats.error += 1,
                UploadStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

/// Progress across every queued file
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OverallProgress {
    /// Mean of the per-file percentages
    pub percentage: f64,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    /// Sum of the per-file speeds
    pub speed: f64,
    /// Longest per-file estimate
    pub eta: Option<Duration>,
}

impl OverallProgress {
    pub fn from_files(files: &[UploadFile]) -> Self {
        if files.is_empty() {
            return Self::default();
        }

        let mut progress = OverallProgress::default();
        let mut percentage_sum = 0.0;
        for file in files {
            progress.total_bytes += file.file.size;
            if let Some(p) = &file.progress {
                percentage_sum += p.percentage;
                progress.uploaded_bytes += p.loaded;
                progress.speed += p.speed;
                progress.eta = match (progress.eta, p.eta) {
                    (Some(current), Some(eta)) => Some(current.max(eta)),
                    (current, eta) => current.or(eta),
                };
            }
        }
        progress.percentage = percentage_sum / files.len() as f64;
        progress
    }
}
