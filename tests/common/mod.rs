#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use solara_video::client::chunk::{sha256_hex, total_chunks};
use solara_video::config::UploadConfig;
use solara_video::core::{
    ChunkUpload,
    CreateSessionRequest,
    DirectUpload,
    MetadataUpdate,
    ProcessingState,
    ProcessingStatus,
    ProgressCallback,
    Result,
    SessionId,
    UploadProgress,
    UploadResult,
    UploadSession,
    VideoApi,
    VideoError,
    VideoFile,
    VideoId,
    VideoMetadata,
    VideoStatus,
};

struct FakeSession {
    video_id: VideoId,
    total_chunks: u32,
    received: BTreeSet<u32>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    sessions: HashMap<SessionId, FakeSession>,
    next_session: u32,
    /// Accepted chunk indices, in arrival order
    chunk_order: Vec<u32>,
    finalize_calls: u32,
    direct_uploads: u32,
    cancelled_sessions: Vec<SessionId>,
    titles: HashMap<VideoId, String>,
    processing_script: VecDeque<ProcessingStatus>,
    fail_chunk_once: Option<u32>,
    chunk_delay: Option<Duration>,
    processing_delay: Option<Duration>,
}

/// In-memory video API that checks chunk checksums and refuses early finalize
#[derive(Default)]
pub struct FakeVideoApi {
    state: Mutex<FakeState>,
}

impl FakeVideoApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn network_calls(&self) -> usize {
        self.with_state(|state| state.calls.len())
    }

    pub fn chunk_order(&self) -> Vec<u32> {
        self.with_state(|state| state.chunk_order.clone())
    }

    pub fn finalize_calls(&self) -> u32 {
        self.with_state(|state| state.finalize_calls)
    }

    pub fn direct_uploads(&self) -> u32 {
        self.with_state(|state| state.direct_uploads)
    }

    pub fn cancelled_sessions(&self) -> Vec<SessionId> {
        self.with_state(|state| state.cancelled_sessions.clone())
    }

    /// The next upload of `index` fails with a 503
    pub fn fail_chunk_once(&self, index: u32) {
        self.with_state(|state| state.fail_chunk_once = Some(index));
    }

    pub fn set_chunk_delay(&self, delay: Duration) {
        self.with_state(|state| state.chunk_delay = Some(delay));
    }

    pub fn set_processing_delay(&self, delay: Duration) {
        self.with_state(|state| state.processing_delay = Some(delay));
    }

    /// Statuses returned by successive polls; `completed` once exhausted
    pub fn script_processing(&self, statuses: Vec<ProcessingStatus>) {
        self.with_state(|state| state.processing_script = statuses.into());
    }

    /// Register a session the server already holds `received` chunks of
    pub fn seed_session(&self, total_size: u64, chunk_size: u64, received: &[u32]) -> UploadSession {
        self.with_state(|state| {
            state.next_session += 1;
            let session_id = SessionId::from(format!("seeded_{}", state.next_session).as_str());
            let video_id = VideoId::generate();
            let count = total_chunks(total_size, chunk_size);
            state.sessions.insert(session_id.clone(), FakeSession {
                video_id: video_id.clone(),
                total_chunks: count,
                received: received.iter().copied().collect(),
            });
            state.titles.insert(video_id.clone(), "seeded".to_string());

            UploadSession {
                session_id,
                video_id,
                total_size,
                chunk_size,
                total_chunks: count,
                uploaded_chunks: Vec::new(),
                upload_token: "token".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
                created_at: Utc::now(),
            }
        })
    }
}

pub fn processing(status: ProcessingState) -> ProcessingStatus {
    ProcessingStatus {
        status,
        progress: None,
        error: None,
    }
}

fn upload_result(video_id: VideoId) -> UploadResult {
    UploadResult {
        video_id,
        upload_url: String::new(),
        processing_status: VideoStatus::Processing,
        estimated_processing_time: 0,
        thumbnail_urls: Vec::new(),
    }
}

#[async_trait]
impl VideoApi for FakeVideoApi {
    async fn upload_direct(&self, upload: DirectUpload<'_>, on_progress: ProgressCallback) -> Result<UploadResult> {
        self.with_state(|state| {
            state.calls.push("upload_direct".to_string());
            state.direct_uploads += 1;
            state.titles.insert(upload.video_id.clone(), upload.metadata.title.clone());
        });
        on_progress(UploadProgress {
            loaded: upload.file.size,
            total: upload.file.size,
            percentage: 100.0,
            ..Default::default()
        });
        Ok(upload_result(upload.video_id.clone()))
    }

    async fn create_session(&self, request: &CreateSessionRequest, _upload_token: &str) -> Result<UploadSession> {
        Ok(self.with_state(|state| {
            state.calls.push("create_session".to_string());
            state.next_session += 1;
            let session_id = SessionId::from(format!("session_{}", state.next_session).as_str());
            let count = total_chunks(request.file_size, request.chunk_size);
            state.sessions.insert(session_id.clone(), FakeSession {
                video_id: request.video_id.clone(),
                total_chunks: count,
                received: BTreeSet::new(),
            });
            state.titles.insert(request.video_id.clone(), request.metadata.title.clone());

            UploadSession {
                session_id,
                video_id: request.video_id.clone(),
                total_size: request.file_size,
                chunk_size: request.chunk_size,
                total_chunks: count,
                uploaded_chunks: Vec::new(),
                upload_token: String::new(),
                expires_at: Utc::now() + chrono::Duration::hours(24),
                created_at: Utc::now(),
            }
        }))
    }

    async fn upload_chunk(&self, chunk: ChunkUpload, _upload_token: &str) -> Result<()> {
        let delay = self.with_state(|state| {
            state.calls.push(format!("upload_chunk:{}", chunk.chunk_index));
            state.chunk_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.with_state(|state| {
            if state.fail_chunk_once == Some(chunk.chunk_index) {
                state.fail_chunk_once = None;
                return Err(VideoError::server_error(503, "chunk store unavailable"));
            }
            if sha256_hex(&chunk.data) != chunk.checksum {
                return Err(VideoError::server_error(400, "checksum mismatch"));
            }
            let session = state
                .sessions
                .get_mut(&chunk.session_id)
                .ok_or_else(|| VideoError::server_error(404, "unknown session"))?;
            if chunk.chunk_index >= session.total_chunks || chunk.total_chunks != session.total_chunks {
                return Err(VideoError::server_error(400, "chunk out of range"));
            }
            session.received.insert(chunk.chunk_index);
            state.chunk_order.push(chunk.chunk_index);
            Ok(())
        })
    }

    async fn finalize(&self, session_id: &SessionId, _upload_token: &str) -> Result<UploadResult> {
        self.with_state(|state| {
            state.calls.push("finalize".to_string());
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| VideoError::server_error(404, "unknown session"))?;
            if session.received.len() as u32 != session.total_chunks {
                return Err(VideoError::server_error(409, "missing chunks"));
            }
            let video_id = session.video_id.clone();
            state.sessions.remove(session_id);
            state.finalize_calls += 1;
            Ok(upload_result(video_id))
        })
    }

    async fn uploaded_chunks(&self, session_id: &SessionId) -> Result<Vec<u32>> {
        self.with_state(|state| {
            state.calls.push("uploaded_chunks".to_string());
            state
                .sessions
                .get(session_id)
                .map(|session| session.received.iter().copied().collect())
                .ok_or_else(|| VideoError::server_error(404, "unknown session"))
        })
    }

    async fn cancel_session(&self, session_id: &SessionId) -> Result<()> {
        self.with_state(|state| {
            state.calls.push("cancel_session".to_string());
            state.sessions.remove(session_id);
            state.cancelled_sessions.push(session_id.clone());
        });
        Ok(())
    }

    async fn processing_status(&self, _video_id: &VideoId) -> Result<ProcessingStatus> {
        let delay = self.with_state(|state| {
            state.calls.push("processing_status".to_string());
            state.processing_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.with_state(|state| {
            state
                .processing_script
                .pop_front()
                .unwrap_or_else(|| processing(ProcessingState::Completed))
        }))
    }

    async fn get_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata> {
        let title = self.with_state(|state| {
            state.calls.push("get_metadata".to_string());
            state.titles.get(video_id).cloned()
        });
        let title = title.ok_or_else(|| VideoError::NotFound(format!("Video {}", video_id)))?;
        let now = Utc::now();
        Ok(serde_json::from_value(serde_json::json!({
            "id": video_id,
            "title": title,
            "status": "ready",
            "createdAt": now,
            "updatedAt": now,
        }))?)
    }

    async fn update_metadata(&self, video_id: &VideoId, update: &MetadataUpdate) -> Result<VideoMetadata> {
        if let Some(title) = &update.title {
            self.with_state(|state| state.titles.insert(video_id.clone(), title.clone()));
        }
        self.get_metadata(video_id).await
    }

    async fn delete_video(&self, video_id: &VideoId) -> Result<()> {
        self.with_state(|state| {
            state.calls.push("delete_video".to_string());
            state.titles.remove(video_id);
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        self.with_state(|state| state.calls.push("health_check".to_string()));
        Ok(())
    }
}

/// Upload settings scaled down so tests move a handful of small chunks
pub fn test_upload_config(chunk_size: u64) -> UploadConfig {
    UploadConfig {
        chunk_size,
        poll_interval: Duration::from_millis(10),
        processing_timeout: Some(Duration::from_secs(5)),
        ..UploadConfig::default()
    }
}

/// Write `size` bytes of a repeating pattern and describe the file
pub async fn write_video(dir: &Path, name: &str, size: usize) -> VideoFile {
    let path = dir.join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    tokio::fs::write(&path, data).await.unwrap();
    VideoFile::open(&path).await.unwrap()
}
