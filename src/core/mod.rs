mod errors;
mod events;
mod traits;
mod types;

pub use errors::{MediaErrorKind, Result, VideoError, VideoErrorCode};
pub use events::{TransferUpdate, UploadEvent};
pub use traits::{ChunkUpload, CreateSessionRequest, DirectUpload, ProgressCallback, VideoApi};
pub use types::{
    AnalyticsSnapshot,
    FileId,
    MetadataUpdate,
    OverallProgress,
    ProcessingState,
    ProcessingStatus,
    QueueStats,
    SessionId,
    UploadFile,
    UploadMetadata,
    UploadProgress,
    UploadResult,
    UploadSession,
    UploadStatus,
    VideoCategory,
    VideoFile,
    VideoFormat,
    VideoId,
    VideoMetadata,
    VideoResolution,
    VideoStatus,
    Visibility,
};
