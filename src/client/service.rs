use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::UploadConfig;
use crate::core::{
    ChunkUpload,
    CreateSessionRequest,
    DirectUpload,
    MetadataUpdate,
    ProcessingState,
    ProgressCallback,
    Result,
    SessionId,
    TransferUpdate,
    UploadMetadata,
    UploadResult,
    UploadSession,
    VideoApi,
    VideoError,
    VideoFile,
    VideoId,
    VideoMetadata,
};
use crate::utils::TransferMeter;
use super::chunk::{chunk_at, missing_chunks, read_chunk, sha256_hex, total_chunks};
use super::validation::{generate_upload_token, validate_file, validate_metadata, validate_metadata_update};

pub type UpdateCallback = Arc<dyn Fn(TransferUpdate) + Send + Sync>;

/// Per-transfer cancellation and update sink
#[derive(Clone, Default)]
pub struct UploadContext {
    pub cancel: CancellationToken,
    on_update: Option<UpdateCallback>,
}

impl UploadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_update(mut self, callback: impl Fn(TransferUpdate) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(callback));
        self
    }

    fn emit(&self, update: TransferUpdate) {
        if let Some(callback) = &self.on_update {
            callback(update);
        }
    }

    fn progress_callback(&self) -> ProgressCallback {
        let ctx = self.clone();
        Arc::new(move |progress| ctx.emit(TransferUpdate::Progress(progress)))
    }
}

/// Race `future` against the token; cancellation wins ties.
pub async fn cancellable<T>(cancel: &CancellationToken, future: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VideoError::Cancelled),
        result = future => result,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadStats {
    pub active_sessions: usize,
    pub total_uploads: u64,
    pub completed_uploads: u64,
    pub failed_uploads: u64,
    pub cancelled_uploads: u64,
    /// Completed / finished (cancelled excluded), 0..=100
    pub success_rate: f64,
}

#[derive(Debug, Default)]
struct UploadCounters {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl UploadCounters {
    fn record<T>(&self, result: &Result<T>) {
        let counter = match result {
            Ok(_) => &self.completed,
            Err(err) if err.is_cancellation() => &self.cancelled,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Moves local video files to a [`VideoApi`], directly or in checksummed chunks.
///
/// Sessions of chunked transfers that failed stay registered so they can be
/// resumed with [`VideoUploadService::resume_upload`].
pub struct VideoUploadService<A> {
    api: Arc<A>,
    config: UploadConfig,
    sessions: RwLock<HashMap<SessionId, UploadSession>>,
    counters: UploadCounters,
}

impl<A: VideoApi> VideoUploadService<A> {
    /// Fails with `ConfigError` when `config` does not pass [`UploadConfig::validate`].
    pub fn new(api: Arc<A>, config: UploadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api,
            config,
            sessions: RwLock::new(HashMap::new()),
            counters: UploadCounters::default(),
        })
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Validate, then send `file` in one request or in chunks when it is larger than `chunk_size`.
    pub async fn upload_video(&self, file: &VideoFile, metadata: &UploadMetadata, ctx: &UploadContext) -> Result<UploadResult> {
        validate_file(file, &self.config)?;
        validate_metadata(metadata)?;
        if self.config.chunk_size == 0 {
            return Err(VideoError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        self.cleanup_expired_sessions(Utc::now()).await;

        let video_id = VideoId::generate();
        let upload_token = generate_upload_token(&video_id, metadata.uploaded_by.as_deref())?;
        let chunked = file.size > self.config.chunk_size;
        info!(video_id = %video_id, file = %file.name, size = file.size, chunked, "Starting upload");

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let result = if chunked {
            self.upload_chunked(file, metadata, &video_id, &upload_token, ctx).await
        } else {
            self.upload_direct(file, metadata, &video_id, &upload_token, ctx).await
        };
        let result = result.map_err(into_upload_error);
        self.counters.record(&result);

        match &result {
            Ok(upload) => info!(video_id = %upload.video_id, "Upload finished"),
            Err(err) if err.is_cancellation() => info!(video_id = %video_id, "Upload cancelled"),
            Err(err) => warn!(video_id = %video_id, "Upload failed: {}", err),
        }
        result
    }

    /// Continue a chunked session: only indices the server has not acknowledged are sent.
    pub async fn resume_upload(&self, session: &UploadSession, file: &VideoFile, ctx: &UploadContext) -> Result<UploadResult> {
        validate_file(file, &self.config)?;
        if file.size != session.total_size {
            return Err(VideoError::InvalidParameters(vec![format!(
                "File size {} does not match session size {}",
                file.size, session.total_size
            )]));
        }
        if session.chunk_size == 0 || session.total_chunks != total_chunks(session.total_size, session.chunk_size) {
            return Err(VideoError::InvalidParameters(vec![format!(
                "Session {} has an invalid chunk plan",
                session.session_id
            )]));
        }
        if session.is_expired(Utc::now()) {
            self.sessions.write().await.remove(&session.session_id);
            return Err(VideoError::upload_failed(format!("Upload session {} expired", session.session_id)));
        }

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let result = self.resume_chunks(session, file, ctx).await.map_err(into_upload_error);
        self.counters.record(&result);
        result
    }

    async fn resume_chunks(&self, session: &UploadSession, file: &VideoFile, ctx: &UploadContext) -> Result<UploadResult> {
        let mut acknowledged = cancellable(&ctx.cancel, self.api.uploaded_chunks(&session.session_id)).await?;
        acknowledged.retain(|index| *index < session.total_chunks);
        acknowledged.sort_unstable();
        acknowledged.dedup();

        let missing = missing_chunks(session.total_chunks, &acknowledged);
        let offset: u64 = acknowledged
            .iter()
            .map(|index| chunk_at(*index, session.total_size, session.chunk_size).size)
            .sum();
        info!(
            session_id = %session.session_id,
            acknowledged = acknowledged.len(),
            missing = missing.len(),
            "Resuming upload"
        );

        let mut session = session.clone();
        session.uploaded_chunks = acknowledged;
        self.sessions.write().await.insert(session.session_id.clone(), session.clone());

        let meter = TransferMeter::with_offset(file.size, offset);
        ctx.emit(TransferUpdate::Progress(meter.progress()));
        self.transfer_chunks(&session, file, missing, meter, ctx).await
    }

    async fn upload_direct(
        &self,
        file: &VideoFile,
        metadata: &UploadMetadata,
        video_id: &VideoId,
        upload_token: &str,
        ctx: &UploadContext,
    ) -> Result<UploadResult> {
        let upload = DirectUpload {
            video_id,
            upload_token,
            file,
            metadata,
        };
        cancellable(&ctx.cancel, self.api.upload_direct(upload, ctx.progress_callback())).await
    }

    async fn upload_chunked(
        &self,
        file: &VideoFile,
        metadata: &UploadMetadata,
        video_id: &VideoId,
        upload_token: &str,
        ctx: &UploadContext,
    ) -> Result<UploadResult> {
        let request = CreateSessionRequest {
            video_id: video_id.clone(),
            file_name: file.name.clone(),
            file_size: file.size,
            file_type: file.mime_type.clone(),
            chunk_size: self.config.chunk_size,
            metadata: metadata.clone(),
        };
        let mut session = cancellable(&ctx.cancel, self.api.create_session(&request, upload_token)).await?;

        // the local plan is authoritative
        let expected = total_chunks(file.size, self.config.chunk_size);
        if session.total_chunks != expected || session.chunk_size != self.config.chunk_size {
            warn!(
                session_id = %session.session_id,
                server_chunks = session.total_chunks,
                expected,
                "Server chunk plan differs from the local one"
            );
        }
        session.total_size = file.size;
        session.chunk_size = self.config.chunk_size;
        session.total_chunks = expected;
        session.uploaded_chunks.clear();
        session.upload_token = upload_token.to_string();

        debug!(session_id = %session.session_id, total_chunks = expected, "Upload session created");
        self.sessions.write().await.insert(session.session_id.clone(), session.clone());
        ctx.emit(TransferUpdate::SessionCreated(session.clone()));

        let indices = (0..session.total_chunks).collect();
        self.transfer_chunks(&session, file, indices, TransferMeter::new(file.size), ctx).await
    }

    async fn transfer_chunks(
        &self,
        session: &UploadSession,
        file: &VideoFile,
        indices: Vec<u32>,
        mut meter: TransferMeter,
        ctx: &UploadContext,
    ) -> Result<UploadResult> {
        let outcome = async {
            for index in indices {
                let chunk = chunk_at(index, session.total_size, session.chunk_size);
                let data = read_chunk(&file.path, &chunk).await?;
                let upload = ChunkUpload {
                    session_id: session.session_id.clone(),
                    chunk_index: index,
                    total_chunks: session.total_chunks,
                    checksum: sha256_hex(&data),
                    data,
                };

                cancellable(&ctx.cancel, self.api.upload_chunk(upload, &session.upload_token)).await?;
                self.mark_acknowledged(&session.session_id, index).await;
                debug!(session_id = %session.session_id, chunk = index, total = session.total_chunks, "Chunk acknowledged");

                ctx.emit(TransferUpdate::ChunkAcknowledged {
                    chunk_index: index,
                    total_chunks: session.total_chunks,
                });
                ctx.emit(TransferUpdate::Progress(meter.add_bytes(chunk.size)));
            }

            cancellable(&ctx.cancel, self.api.finalize(&session.session_id, &session.upload_token)).await
        }
        .await;

        match outcome {
            Ok(result) => {
                self.sessions.write().await.remove(&session.session_id);
                Ok(result)
            }
            Err(VideoError::Cancelled) => {
                self.abort_session(&session.session_id).await;
                Err(VideoError::Cancelled)
            }
            Err(err) => {
                warn!(session_id = %session.session_id, "Chunked transfer stopped, session kept for resume: {}", err);
                Err(err)
            }
        }
    }

    async fn mark_acknowledged(&self, session_id: &SessionId, index: u32) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            if !session.uploaded_chunks.contains(&index) {
                session.uploaded_chunks.push(index);
            }
        }
    }

    /// Best-effort server side cancel, the local session is dropped either way
    async fn abort_session(&self, session_id: &SessionId) {
        if let Err(err) = self.api.cancel_session(session_id).await {
            warn!(session_id = %session_id, "Failed to cancel upload session: {}", err);
        }
        self.sessions.write().await.remove(session_id);
    }

    /// Poll until processing completes or fails; `processing_timeout` bounds the wait.
    pub async fn wait_for_processing(&self, video_id: &VideoId, cancel: &CancellationToken) -> Result<VideoMetadata> {
        let started = Instant::now();

        loop {
            let status = cancellable(cancel, self.api.processing_status(video_id)).await?;
            match status.status {
                ProcessingState::Completed => {
                    info!(video_id = %video_id, "Processing completed");
                    return cancellable(cancel, self.api.get_metadata(video_id)).await;
                }
                ProcessingState::Failed => {
                    let message = status.error.unwrap_or_else(|| "Video processing failed".to_string());
                    warn!(video_id = %video_id, "Processing failed: {}", message);
                    return Err(VideoError::ProcessingFailed(message));
                }
                state => debug!(video_id = %video_id, ?state, progress = ?status.progress, "Still processing"),
            }

            if let Some(limit) = self.config.processing_timeout {
                if started.elapsed() >= limit {
                    return Err(VideoError::ProcessingTimeout(limit));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(VideoError::Cancelled),
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    pub async fn get_video_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata> {
        self.api.get_metadata(video_id).await
    }

    pub async fn update_video_metadata(&self, video_id: &VideoId, update: &MetadataUpdate) -> Result<VideoMetadata> {
        validate_metadata_update(update)?;
        self.api.update_metadata(video_id, update).await
    }

    pub async fn delete_video(&self, video_id: &VideoId) -> Result<()> {
        self.api.delete_video(video_id).await?;
        info!(video_id = %video_id, "Video deleted");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        self.api.health_check().await
    }

    /// Cancel a registered session on the server and forget it locally.
    pub async fn cancel_upload(&self, session_id: &SessionId) -> Result<()> {
        if !self.sessions.read().await.contains_key(session_id) {
            return Err(VideoError::InvalidParameters(vec![format!(
                "No upload session found: {}",
                session_id
            )]));
        }

        self.api.cancel_session(session_id).await?;
        self.sessions.write().await.remove(session_id);
        info!(session_id = %session_id, "Upload session cancelled");
        Ok(())
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<UploadSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn sessions(&self) -> Vec<UploadSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn upload_stats(&self) -> UploadStats {
        let completed = self.counters.completed.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let finished = completed + failed;
        let success_rate = if finished > 0 {
            completed as f64 / finished as f64 * 100.0
        } else {
            0.0
        };

        UploadStats {
            active_sessions: self.sessions.read().await.len(),
            total_uploads: self.counters.total.load(Ordering::Relaxed),
            completed_uploads: completed,
            failed_uploads: failed,
            cancelled_uploads: self.counters.cancelled.load(Ordering::Relaxed),
            success_rate,
        }
    }

    /// Drop sessions whose expiry is before `now`; returns how many were removed.
    pub async fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Expired upload sessions removed");
        }
        removed
    }
}

/// Transfer failures surface as `UPLOAD_FAILED`; cancellation and validation keep their kind.
fn into_upload_error(err: VideoError) -> VideoError {
    match err {
        VideoError::Cancelled | VideoError::UploadFailed(_) => err,
        err if err.is_validation() => err,
        err => VideoError::upload_failed(err.to_string()),
    }
}
