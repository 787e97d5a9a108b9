use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::cache::LocalCache;
use crate::client::validation::{describe_file, validate_metadata_update, validate_queued_file};
use crate::client::{UploadContext, VideoUploadService};
use crate::config::QueueConfig;
use crate::core::{
    FileId,
    MetadataUpdate,
    OverallProgress,
    QueueStats,
    Result,
    TransferUpdate,
    UploadEvent,
    UploadFile,
    UploadMetadata,
    UploadProgress,
    UploadSession,
    UploadStatus,
    VideoApi,
    VideoError,
    VideoFile,
    VideoId,
    VideoMetadata,
};
use super::manager::{AddFilesOutcome, QueueCommand, RejectedFile};

struct ActiveJob {
    attempt: u64,
    cancel: CancellationToken,
    // dropped on cancel so the job can still reach its session cleanup
    _join_handle: JoinHandle<()>,
}

enum JobUpdate {
    Transfer(TransferUpdate),
    /// Transfer accepted, server side processing started
    Uploaded(VideoId),
    Finished(Result<VideoMetadata>),
}

struct JobMessage {
    file_id: FileId,
    attempt: u64,
    update: JobUpdate,
}

/// Owns the file list; every mutation happens on this task.
pub struct QueueWorker<A> {
    service: Arc<VideoUploadService<A>>,
    config: QueueConfig,
    cache: Option<LocalCache>,
    files: Vec<UploadFile>,
    run_queue: VecDeque<FileId>,
    active: HashMap<FileId, ActiveJob>,
    next_attempt: u64,

    event_tx: broadcast::Sender<UploadEvent>,
    job_tx: mpsc::UnboundedSender<JobMessage>,
    job_rx: mpsc::UnboundedReceiver<JobMessage>,
}

impl<A: VideoApi + 'static> QueueWorker<A> {
    pub(crate) async fn run(
        service: Arc<VideoUploadService<A>>,
        config: QueueConfig,
        cache: Option<LocalCache>,
        mut command_rx: mpsc::Receiver<QueueCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            service,
            config,
            cache,
            files: Vec::new(),
            run_queue: VecDeque::new(),
            active: HashMap::new(),
            next_attempt: 0,
            event_tx,
            job_tx,
            job_rx,
        };

        // 主事件循环, 循环等待命令
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(QueueCommand::Shutdown { reply }) => {
                        worker.cancel_active();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => worker.handle_command(command).await,
                    None => {
                        worker.cancel_active();
                        break;
                    }
                },
                Some(message) = worker.job_rx.recv() => {
                    worker.handle_job_message(message).await;
                }
            }

            worker.process_queue();
        }

        debug!("Upload queue worker stopped");
    }

    async fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::AddFiles { files, reply } => {
                let _ = reply.send(self.add_files(files));
            }
            QueueCommand::RemoveFile { file_id, reply } => {
                let _ = reply.send(self.remove_file(file_id));
            }
            QueueCommand::RemoveAllFiles { reply } => {
                self.cancel_active();
                self.run_queue.clear();
                let removed: Vec<FileId> = self.files.drain(..).map(|file| file.id).collect();
                for file_id in removed {
                    self.emit(UploadEvent::FileRemoved { file_id });
                }
                let _ = reply.send(());
            }
            QueueCommand::StartUpload { file_id, reply } => {
                let _ = reply.send(self.start_upload(file_id));
            }
            QueueCommand::CancelUpload { file_id, reply } => {
                let _ = reply.send(self.cancel_upload(file_id));
            }
            QueueCommand::CancelAllUploads { reply } => {
                let ids: Vec<FileId> = self.files
                    .iter()
                    .filter(|file| matches!(file.status, UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Processing))
                    .map(|file| file.id)
                    .collect();
                for file_id in ids {
                    let _ = self.cancel_upload(file_id);
                }
                let _ = reply.send(());
            }
            QueueCommand::RetryUpload { file_id, reply } => {
                let _ = reply.send(self.retry_upload(file_id));
            }
            QueueCommand::RetryFailedUploads { reply } => {
                let ids: Vec<FileId> = self.files
                    .iter()
                    .filter(|file| file.status == UploadStatus::Error)
                    .map(|file| file.id)
                    .collect();
                let retried = ids
                    .into_iter()
                    .filter(|file_id| self.retry_upload(*file_id).is_ok())
                    .count();
                let _ = reply.send(retried);
            }
            QueueCommand::UpdateFileMetadata { file_id, update, reply } => {
                let _ = reply.send(self.update_file_metadata(file_id, &update));
            }
            QueueCommand::GetFile { file_id, reply } => {
                let file = self.files.iter().find(|file| file.id == file_id).cloned();
                let _ = reply.send(file);
            }
            QueueCommand::GetFiles { reply } => {
                let _ = reply.send(self.files.clone());
            }
            QueueCommand::GetStats { reply } => {
                let _ = reply.send(QueueStats::from_files(&self.files));
            }
            QueueCommand::GetOverallProgress { reply } => {
                let _ = reply.send(OverallProgress::from_files(&self.files));
            }
            QueueCommand::ClearCompleted { reply } => {
                let _ = reply.send(self.clear_with_status(UploadStatus::Completed));
            }
            QueueCommand::ClearErrors { reply } => {
                let _ = reply.send(self.clear_with_status(UploadStatus::Error));
            }
            // handled by the run loop
            QueueCommand::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn add_files(&mut self, files: Vec<VideoFile>) -> Result<AddFilesOutcome> {
        if !self.config.allow_multiple && files.len() > 1 {
            return Err(VideoError::InvalidParameters(vec![
                "Only one file can be added at a time".to_string(),
            ]));
        }
        if self.files.len() + files.len() > self.config.max_files {
            return Err(VideoError::InvalidParameters(vec![format!(
                "At most {} files can be queued",
                self.config.max_files
            )]));
        }

        let mut outcome = AddFilesOutcome::default();
        for file in files {
            if let Err(err) = validate_queued_file(&file, self.service.config()) {
                info!("Rejected {}: {}", describe_file(&file), err);
                let rejected = RejectedFile {
                    name: file.name.clone(),
                    code: err.code(),
                    message: err.to_string(),
                };
                self.emit(UploadEvent::FileRejected {
                    name: rejected.name.clone(),
                    code: rejected.code,
                    message: rejected.message.clone(),
                });
                outcome.rejected.push(rejected);
                continue;
            }

            let upload_file = UploadFile::new(file);
            let file_id = upload_file.id;
            debug!(file_id = %file_id, "Queued {}", describe_file(&upload_file.file));
            self.emit(UploadEvent::FileAdded {
                file_id,
                name: upload_file.file.name.clone(),
            });
            self.files.push(upload_file);
            outcome.added.push(file_id);
        }

        if self.config.auto_start {
            for file_id in &outcome.added {
                self.run_queue.push_back(*file_id);
            }
        }

        Ok(outcome)
    }

    fn remove_file(&mut self, file_id: FileId) -> Result<()> {
        let index = self.index_of(file_id)?;
        if let Some(job) = self.active.remove(&file_id) {
            job.cancel.cancel();
        }
        self.run_queue.retain(|id| *id != file_id);
        self.files.remove(index);
        self.emit(UploadEvent::FileRemoved { file_id });
        Ok(())
    }

    fn start_upload(&mut self, file_id: Option<FileId>) -> Result<()> {
        match file_id {
            Some(file_id) => {
                let index = self.index_of(file_id)?;
                let status = self.files[index].status;
                if status != UploadStatus::Pending {
                    return Err(VideoError::Rejected(format!("File {} is {:?}, not pending", file_id, status)));
                }
                self.enqueue(file_id);
            }
            None => {
                let pending: Vec<FileId> = self.files
                    .iter()
                    .filter(|file| file.status == UploadStatus::Pending)
                    .map(|file| file.id)
                    .collect();
                for file_id in pending {
                    self.enqueue(file_id);
                }
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, file_id: FileId) {
        if !self.run_queue.contains(&file_id) && !self.active.contains_key(&file_id) {
            self.run_queue.push_back(file_id);
        }
    }

    fn cancel_upload(&mut self, file_id: FileId) -> Result<()> {
        let index = self.index_of(file_id)?;
        let old_status = self.files[index].status;
        if !matches!(old_status, UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Processing) {
            return Ok(());
        }

        // 取消正在进行的上传
        if let Some(job) = self.active.remove(&file_id) {
            job.cancel.cancel();
        }
        self.run_queue.retain(|id| *id != file_id);

        let file = &mut self.files[index];
        file.status = UploadStatus::Cancelled;
        file.session = None;
        file.completed_at = Some(Utc::now());
        let video_id = file.video_id.clone();

        info!(file_id = %file_id, "Upload cancelled");
        self.emit_state_change(file_id, old_status, UploadStatus::Cancelled);
        self.emit(UploadEvent::Cancelled { file_id, video_id });
        Ok(())
    }

    fn retry_upload(&mut self, file_id: FileId) -> Result<()> {
        let index = self.index_of(file_id)?;
        let file = &mut self.files[index];
        let old_status = file.status;
        if !matches!(old_status, UploadStatus::Error | UploadStatus::Cancelled) {
            return Err(VideoError::Rejected(format!("File {} is {:?}, nothing to retry", file_id, old_status)));
        }

        if file.session.as_ref().is_some_and(|session| session.is_expired(Utc::now())) {
            file.session = None;
        }
        file.status = UploadStatus::Pending;
        file.error = None;
        file.progress = None;
        file.completed_at = None;

        self.emit_state_change(file_id, old_status, UploadStatus::Pending);
        self.enqueue(file_id);
        Ok(())
    }

    fn update_file_metadata(&mut self, file_id: FileId, update: &MetadataUpdate) -> Result<()> {
        validate_metadata_update(update)?;
        let index = self.index_of(file_id)?;
        let file = &mut self.files[index];
        if file.status.is_active() {
            return Err(VideoError::Rejected(format!("File {} is already uploading", file_id)));
        }
        update.apply_to(&mut file.metadata);
        Ok(())
    }

    fn clear_with_status(&mut self, status: UploadStatus) -> usize {
        let removed: Vec<FileId> = self.files
            .iter()
            .filter(|file| file.status == status)
            .map(|file| file.id)
            .collect();
        self.files.retain(|file| file.status != status);
        for file_id in &removed {
            self.emit(UploadEvent::FileRemoved { file_id: *file_id });
        }
        removed.len()
    }

    fn process_queue(&mut self) {
        while self.active.len() < self.config.max_concurrent {
            let Some(file_id) = self.run_queue.pop_front() else {
                break;
            };
            self.launch(file_id);
        }
    }

    fn launch(&mut self, file_id: FileId) {
        let Ok(index) = self.index_of(file_id) else {
            return;
        };
        if self.files[index].status != UploadStatus::Pending {
            return;
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let cancel = CancellationToken::new();

        let file = &mut self.files[index];
        file.status = UploadStatus::Uploading;
        file.started_at = Some(Utc::now());
        file.progress = Some(UploadProgress {
            total: file.file.size,
            ..Default::default()
        });

        let job = UploadJob {
            file_id,
            attempt,
            file: file.file.clone(),
            metadata: file.metadata.clone(),
            session: file.session.clone(),
            cancel: cancel.clone(),
            job_tx: self.job_tx.clone(),
        };
        let join_handle = tokio::spawn(job.run(self.service.clone()));

        self.active.insert(file_id, ActiveJob {
            attempt,
            cancel,
            _join_handle: join_handle,
        });
        info!(file_id = %file_id, attempt, "Upload started");
        self.emit_state_change(file_id, UploadStatus::Pending, UploadStatus::Uploading);
    }

    async fn handle_job_message(&mut self, message: JobMessage) {
        let JobMessage { file_id, attempt, update } = message;

        // 丢弃已取消或过期的结果
        if self.active.get(&file_id).map(|job| job.attempt) != Some(attempt) {
            debug!(file_id = %file_id, attempt, "Dropping stale job update");
            return;
        }
        let Ok(index) = self.index_of(file_id) else {
            self.active.remove(&file_id);
            return;
        };

        match update {
            JobUpdate::Transfer(TransferUpdate::SessionCreated(session)) => {
                let file = &mut self.files[index];
                file.video_id = Some(session.video_id.clone());
                file.session = Some(session.clone());
                self.emit(UploadEvent::SessionCreated { file_id, session });
            }
            JobUpdate::Transfer(TransferUpdate::ChunkAcknowledged { chunk_index, .. }) => {
                if let Some(session) = self.files[index].session.as_mut() {
                    if !session.uploaded_chunks.contains(&chunk_index) {
                        session.uploaded_chunks.push(chunk_index);
                    }
                }
            }
            JobUpdate::Transfer(TransferUpdate::Progress(progress)) => {
                self.files[index].progress = Some(progress.clone());
                self.emit(UploadEvent::Progress { file_id, progress });
            }
            JobUpdate::Uploaded(video_id) => {
                let file = &mut self.files[index];
                let old_status = file.status;
                file.video_id = Some(video_id);
                file.session = None;
                file.status = UploadStatus::Processing;
                self.emit_state_change(file_id, old_status, UploadStatus::Processing);
            }
            JobUpdate::Finished(result) => {
                self.active.remove(&file_id);
                self.finish(index, result).await;
            }
        }
    }

    async fn finish(&mut self, index: usize, result: Result<VideoMetadata>) {
        let file = &mut self.files[index];
        let file_id = file.id;
        let old_status = file.status;
        file.completed_at = Some(Utc::now());

        match result {
            Ok(video) => {
                file.status = UploadStatus::Completed;
                file.video_id = Some(video.id.clone());
                file.video = Some(video.clone());
                file.error = None;
                if let Some(progress) = file.progress.as_mut() {
                    progress.loaded = progress.total;
                    progress.percentage = 100.0;
                    progress.eta = None;
                }

                info!(file_id = %file_id, video_id = %video.id, "Upload completed");
                self.emit_state_change(file_id, old_status, UploadStatus::Completed);
                self.mirror_to_cache(&video).await;
                self.emit(UploadEvent::Completed { file_id, video });

                if self.files.iter().all(|file| file.status == UploadStatus::Completed) {
                    let videos = self.files.iter().filter_map(|file| file.video.clone()).collect();
                    self.emit(UploadEvent::AllCompleted { videos });
                }
            }
            Err(VideoError::Cancelled) => {
                file.status = UploadStatus::Cancelled;
                file.session = None;
                let video_id = file.video_id.clone();
                self.emit_state_change(file_id, old_status, UploadStatus::Cancelled);
                self.emit(UploadEvent::Cancelled { file_id, video_id });
            }
            Err(err) => {
                file.status = UploadStatus::Error;
                file.error = Some(err.to_string());
                file.retry_count += 1;

                warn!(file_id = %file_id, retry_count = file.retry_count, "Upload failed: {}", err);
                self.emit_state_change(file_id, old_status, UploadStatus::Error);
                self.emit(UploadEvent::Failed {
                    file_id,
                    error: err.to_string(),
                });
            }
        }
    }

    async fn mirror_to_cache(&self, video: &VideoMetadata) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.upsert_video(video).await {
                warn!(video_id = %video.id, "Failed to cache video metadata: {}", err);
            }
        }
    }

    fn cancel_active(&mut self) {
        for (_, job) in self.active.drain() {
            job.cancel.cancel();
        }
    }

    fn index_of(&self, file_id: FileId) -> Result<usize> {
        self.files
            .iter()
            .position(|file| file.id == file_id)
            .ok_or_else(|| VideoError::NotFound(format!("File {}", file_id)))
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_state_change(&self, file_id: FileId, old_status: UploadStatus, new_status: UploadStatus) {
        self.emit(UploadEvent::StateChanged {
            file_id,
            old_status,
            new_status,
        });
    }
}

/// One attempt at moving one file through upload and processing
struct UploadJob {
    file_id: FileId,
    attempt: u64,
    file: VideoFile,
    metadata: UploadMetadata,
    session: Option<UploadSession>,
    cancel: CancellationToken,
    job_tx: mpsc::UnboundedSender<JobMessage>,
}

impl UploadJob {
    async fn run<A: VideoApi>(self, service: Arc<VideoUploadService<A>>) {
        let UploadJob { file_id, attempt, file, metadata, session, cancel, job_tx } = self;
        let send = |update: JobUpdate| {
            let _ = job_tx.send(JobMessage { file_id, attempt, update });
        };

        let ctx = {
            let job_tx = job_tx.clone();
            UploadContext::new()
                .with_cancel(cancel.clone())
                .on_update(move |update| {
                    let _ = job_tx.send(JobMessage {
                        file_id,
                        attempt,
                        update: JobUpdate::Transfer(update),
                    });
                })
        };

        let upload = match &session {
            Some(session) => service.resume_upload(session, &file, &ctx).await,
            None => service.upload_video(&file, &metadata, &ctx).await,
        };

        let result = match upload {
            Ok(upload) => {
                send(JobUpdate::Uploaded(upload.video_id.clone()));
                service.wait_for_processing(&upload.video_id, &cancel).await
            }
            Err(err) => Err(err),
        };

        send(JobUpdate::Finished(result));
    }
}
