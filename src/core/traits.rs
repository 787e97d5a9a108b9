use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use super::errors::Result;
use super::types::{
    MetadataUpdate,
    ProcessingStatus,
    SessionId,
    UploadMetadata,
    UploadProgress,
    UploadResult,
    UploadSession,
    VideoFile,
    VideoId,
    VideoMetadata,
};

pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Body of the create-session call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub video_id: VideoId,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub chunk_size: u64,
    pub metadata: UploadMetadata,
}

/// One chunk of a chunked upload
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub session_id: SessionId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Lower-case hex SHA-256 of `data`
    pub checksum: String,
    pub data: Bytes,
}

/// Single request upload of a small file
pub struct DirectUpload<'a> {
    pub video_id: &'a VideoId,
    pub upload_token: &'a str,
    pub file: &'a VideoFile,
    pub metadata: &'a UploadMetadata,
}

/// Remote video API contract
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// `POST /api/videos/upload`
    async fn upload_direct(&self, upload: DirectUpload<'_>, on_progress: ProgressCallback) -> Result<UploadResult>;

    /// `POST /api/videos/upload/session`
    async fn create_session(&self, request: &CreateSessionRequest, upload_token: &str) -> Result<UploadSession>;

    /// `POST /api/videos/upload/chunk`
    async fn upload_chunk(&self, chunk: ChunkUpload, upload_token: &str) -> Result<()>;

    /// `POST /api/videos/upload/finalize`
    async fn finalize(&self, session_id: &SessionId, upload_token: &str) -> Result<UploadResult>;

    /// `GET /api/videos/upload/session/{id}/chunks`
    async fn uploaded_chunks(&self, session_id: &SessionId) -> Result<Vec<u32>>;

    /// `DELETE /api/videos/upload/session/{id}/cancel`
    async fn cancel_session(&self, session_id: &SessionId) -> Result<()>;

    /// `GET /api/videos/{id}/processing`
    async fn processing_status(&self, video_id: &VideoId) -> Result<ProcessingStatus>;

    /// `GET /api/videos/{id}/metadata`
    async fn get_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata>;

    /// `PUT /api/videos/{id}/metadata`
    async fn update_metadata(&self, video_id: &VideoId, update: &MetadataUpdate) -> Result<VideoMetadata>;

    /// `DELETE /api/videos/{id}`
    async fn delete_video(&self, video_id: &VideoId) -> Result<()>;

    /// `GET /api/health`
    async fn health_check(&self) -> Result<()>;
}
