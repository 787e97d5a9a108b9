use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::cache::LocalCache;
use crate::client::VideoUploadService;
use crate::config::QueueConfig;
use crate::core::{
    FileId,
    MetadataUpdate,
    OverallProgress,
    QueueStats,
    Result,
    UploadEvent,
    UploadFile,
    VideoApi,
    VideoError,
    VideoErrorCode,
    VideoFile,
};
use super::worker::QueueWorker;

/// A file refused by [`UploadQueue::add_files`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedFile {
    pub name: String,
    pub code: VideoErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AddFilesOutcome {
    pub added: Vec<FileId>,
    pub rejected: Vec<RejectedFile>,
}

pub(crate) enum QueueCommand {
    AddFiles {
        files: Vec<VideoFile>,
        reply: oneshot::Sender<Result<AddFilesOutcome>>,
    },
    RemoveFile {
        file_id: FileId,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveAllFiles {
        reply: oneshot::Sender<()>,
    },
    StartUpload {
        file_id: Option<FileId>,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelUpload {
        file_id: FileId,
        reply: oneshot::Sender<Result<()>>,
    },
    CancelAllUploads {
        reply: oneshot::Sender<()>,
    },
    RetryUpload {
        file_id: FileId,
        reply: oneshot::Sender<Result<()>>,
    },
    RetryFailedUploads {
        reply: oneshot::Sender<usize>,
    },
    UpdateFileMetadata {
        file_id: FileId,
        update: MetadataUpdate,
        reply: oneshot::Sender<Result<()>>,
    },
    GetFile {
        file_id: FileId,
        reply: oneshot::Sender<Option<UploadFile>>,
    },
    GetFiles {
        reply: oneshot::Sender<Vec<UploadFile>>,
    },
    GetStats {
        reply: oneshot::Sender<QueueStats>,
    },
    GetOverallProgress {
        reply: oneshot::Sender<OverallProgress>,
    },
    ClearCompleted {
        reply: oneshot::Sender<usize>,
    },
    ClearErrors {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the queue worker; cheap to clone.
#[derive(Clone)]
pub struct UploadQueue {
    command_tx: mpsc::Sender<QueueCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// 上传队列句柄 - 包含队列和工作线程
pub struct UploadQueueHandle {
    pub queue: UploadQueue,
    pub worker_handle: JoinHandle<()>,
}

impl UploadQueueHandle {
    /// Cancel running jobs and wait for the worker to exit.
    pub async fn shutdown(self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.queue.command_tx.send(QueueCommand::Shutdown { reply: reply_tx }).await.is_ok() {
            let _ = reply_rx.await;
        }
        drop(self.queue);

        self.worker_handle
            .await
            .map_err(|err| VideoError::internal_error(format!("Worker panic: {}", err)))
    }
}

impl UploadQueue {
    /// Spawn the worker; fails with `ConfigError` when `config` does not pass [`QueueConfig::validate`].
    pub fn new<A>(service: Arc<VideoUploadService<A>>, config: QueueConfig, cache: Option<LocalCache>) -> Result<UploadQueueHandle>
    where
        A: VideoApi + 'static,
    {
        config.validate()?;
        let (command_tx, command_rx) = mpsc::channel(100);
        // 最大缓存 256 个事件
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(QueueWorker::run(service, config, cache, command_rx, event_tx.clone()));

        Ok(UploadQueueHandle {
            queue: Self { command_tx, event_tx },
            worker_handle,
        })
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| VideoError::internal_error("Upload queue shut down"))?;

        // 等待响应
        reply_rx
            .await
            .map_err(|err| VideoError::internal_error(err.to_string()))
    }

    /// Validate and enqueue files as pending.
    ///
    /// The whole batch fails when it breaks the multiple-file or `max_files`
    /// limits; otherwise invalid files are reported one by one in the outcome.
    pub async fn add_files(&self, files: Vec<VideoFile>) -> Result<AddFilesOutcome> {
        self.request(|reply| QueueCommand::AddFiles { files, reply }).await?
    }

    pub async fn remove_file(&self, file_id: FileId) -> Result<()> {
        self.request(|reply| QueueCommand::RemoveFile { file_id, reply }).await?
    }

    pub async fn remove_all_files(&self) -> Result<()> {
        self.request(|reply| QueueCommand::RemoveAllFiles { reply }).await
    }

    /// Start one pending file, or every pending file when `file_id` is `None`.
    pub async fn start_upload(&self, file_id: Option<FileId>) -> Result<()> {
        self.request(|reply| QueueCommand::StartUpload { file_id, reply }).await?
    }

    /// Idempotent; late results of the cancelled attempt are discarded.
    pub async fn cancel_upload(&self, file_id: FileId) -> Result<()> {
        self.request(|reply| QueueCommand::CancelUpload { file_id, reply }).await?
    }

    pub async fn cancel_all_uploads(&self) -> Result<()> {
        self.request(|reply| QueueCommand::CancelAllUploads { reply }).await
    }

    /// Move an errored or cancelled file back to pending and start it again.
    pub async fn retry_upload(&self, file_id: FileId) -> Result<()> {
        self.request(|reply| QueueCommand::RetryUpload { file_id, reply }).await?
    }

    /// Retry every errored file; returns how many were restarted.
    pub async fn retry_failed_uploads(&self) -> Result<usize> {
        self.request(|reply| QueueCommand::RetryFailedUploads { reply }).await
    }

    pub async fn update_file_metadata(&self, file_id: FileId, update: MetadataUpdate) -> Result<()> {
        self.request(|reply| QueueCommand::UpdateFileMetadata { file_id, update, reply }).await?
    }

    pub async fn get_file(&self, file_id: FileId) -> Result<Option<UploadFile>> {
        self.request(|reply| QueueCommand::GetFile { file_id, reply }).await
    }

    pub async fn files(&self) -> Result<Vec<UploadFile>> {
        self.request(|reply| QueueCommand::GetFiles { reply }).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.request(|reply| QueueCommand::GetStats { reply }).await
    }

    pub async fn overall_progress(&self) -> Result<OverallProgress> {
        self.request(|reply| QueueCommand::GetOverallProgress { reply }).await
    }

    pub async fn is_uploading(&self) -> Result<bool> {
        let stats = self.stats().await?;
        Ok(stats.uploading + stats.processing > 0)
    }

    /// Drop completed files; returns how many were removed.
    pub async fn clear_completed(&self) -> Result<usize> {
        self.request(|reply| QueueCommand::ClearCompleted { reply }).await
    }

    /// Drop errored files; returns how many were removed.
    pub async fn clear_errors(&self) -> Result<usize> {
        self.request(|reply| QueueCommand::ClearErrors { reply }).await
    }

    /// 订阅事件
    ///
    /// 注意：
    /// - 如果接收速度跟不上发送速度，可能会丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }
}
