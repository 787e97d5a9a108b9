mod common;

use std::sync::Arc;
use std::time::Duration;
use common::{test_upload_config, write_video, FakeVideoApi};
use solara_video::cache::LocalCache;
use solara_video::config::QueueConfig;
use solara_video::core::{MetadataUpdate, UploadEvent, UploadStatus, VideoErrorCode, VideoError};
use solara_video::{UploadQueue, UploadQueueHandle, VideoUploadService};
use tokio::sync::broadcast;

const CHUNK: u64 = 4 * 1024;

fn start_queue(api: Arc<FakeVideoApi>, config: QueueConfig, cache: Option<LocalCache>) -> UploadQueueHandle {
    let service = Arc::new(VideoUploadService::new(api, test_upload_config(CHUNK)).unwrap());
    UploadQueue::new(service, config, cache).unwrap()
}

/// Wait for the first event matching `predicate`, collecting everything seen on the way.
async fn wait_for(
    events: &mut broadcast::Receiver<UploadEvent>,
    seen: &mut Vec<UploadEvent>,
    predicate: impl Fn(&UploadEvent) -> bool,
) -> UploadEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            seen.push(event.clone());
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for upload event")
}

fn status_changes(seen: &[UploadEvent]) -> Vec<UploadStatus> {
    seen.iter()
        .filter_map(|event| match event {
            UploadEvent::StateChanged { new_status, .. } => Some(*new_status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_chunked_file_goes_through_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let cache = LocalCache::new(dir.path().join("cache"));
    let api = Arc::new(FakeVideoApi::new());
    let handle = start_queue(api.clone(), QueueConfig::default(), Some(cache.clone()));
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let file = write_video(dir.path(), "commissioning.mp4", 10 * CHUNK as usize).await;
    let outcome = queue.add_files(vec![file]).await.unwrap();
    assert_eq!(outcome.added.len(), 1);
    let file_id = outcome.added[0];
    assert_eq!(queue.get_file(file_id).await.unwrap().unwrap().status, UploadStatus::Pending);

    queue
        .update_file_metadata(file_id, MetadataUpdate {
            title: Some("Commissioning walkthrough".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    queue.start_upload(None).await.unwrap();

    let mut seen = Vec::new();
    let completed = wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::Completed { .. })).await;
    let UploadEvent::Completed { video, .. } = completed else {
        unreachable!()
    };
    assert_eq!(video.title, "Commissioning walkthrough");

    assert_eq!(
        status_changes(&seen),
        vec![UploadStatus::Uploading, UploadStatus::Processing, UploadStatus::Completed]
    );
    assert!(seen.iter().any(|event| matches!(event, UploadEvent::SessionCreated { .. })));
    wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::AllCompleted { .. })).await;

    assert_eq!(api.chunk_order(), (0..10).collect::<Vec<u32>>());
    assert_eq!(api.finalize_calls(), 1);

    let file = queue.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, UploadStatus::Completed);
    assert!(file.session.is_none());
    assert_eq!(file.progress.unwrap().percentage, 100.0);
    assert!(!queue.is_uploading().await.unwrap());
    assert_eq!(cache.videos().await.unwrap().len(), 1);

    assert_eq!(queue.clear_completed().await.unwrap(), 1);
    assert!(queue.files().await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_file_never_enters_the_list() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    let handle = start_queue(api.clone(), QueueConfig::default(), None);
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let video = write_video(dir.path(), "ok.mp4", 100).await;
    let text = write_video(dir.path(), "notes.txt", 100).await;
    let outcome = queue.add_files(vec![video, text]).await.unwrap();

    assert_eq!(outcome.added.len(), 1);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].name, "notes.txt");
    assert_eq!(outcome.rejected[0].code, VideoErrorCode::UnsupportedFormat);

    let files = queue.files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert!(files.iter().all(|file| file.file.name != "notes.txt"));

    let mut seen = Vec::new();
    wait_for(&mut events, &mut seen, |event| {
        matches!(event, UploadEvent::FileRejected { name, .. } if name == "notes.txt")
    })
    .await;
    assert_eq!(api.network_calls(), 0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_batch_limits() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    let config = QueueConfig {
        max_files: 2,
        allow_multiple: false,
        ..QueueConfig::default()
    };
    let handle = start_queue(api, config, None);
    let queue = handle.queue.clone();

    let a = write_video(dir.path(), "a.mp4", 10).await;
    let b = write_video(dir.path(), "b.mp4", 10).await;
    let c = write_video(dir.path(), "c.mp4", 10).await;

    let err = queue.add_files(vec![a.clone(), b.clone()]).await.unwrap_err();
    assert!(matches!(err, VideoError::InvalidParameters(_)));
    assert!(queue.files().await.unwrap().is_empty());

    queue.add_files(vec![a]).await.unwrap();
    queue.add_files(vec![b]).await.unwrap();
    let err = queue.add_files(vec![c]).await.unwrap_err();
    assert!(matches!(err, VideoError::InvalidParameters(_)));
    assert_eq!(queue.files().await.unwrap().len(), 2);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_is_terminal_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    api.set_chunk_delay(Duration::from_millis(30));
    let handle = start_queue(api.clone(), QueueConfig::default(), None);
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let file = write_video(dir.path(), "long.mp4", 20 * CHUNK as usize).await;
    let file_id = queue.add_files(vec![file]).await.unwrap().added[0];
    queue.start_upload(Some(file_id)).await.unwrap();

    let mut seen = Vec::new();
    wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::Progress { .. })).await;

    queue.cancel_upload(file_id).await.unwrap();
    queue.cancel_upload(file_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let file = queue.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, UploadStatus::Cancelled);
    assert!(file.session.is_none());
    assert!(!seen.iter().any(|event| matches!(event, UploadEvent::Completed { .. })));
    let cancelled_events = seen
        .iter()
        .filter(|event| matches!(event, UploadEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancelled_events, 1);

    assert!(api.chunk_order().len() < 20);
    assert_eq!(api.finalize_calls(), 0);
    assert_eq!(api.cancelled_sessions().len(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_during_processing_ignores_late_result() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    api.set_processing_delay(Duration::from_millis(100));
    let handle = start_queue(api.clone(), QueueConfig::default(), None);
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let file = write_video(dir.path(), "short.mp4", 100).await;
    let file_id = queue.add_files(vec![file]).await.unwrap().added[0];
    queue.start_upload(Some(file_id)).await.unwrap();

    let mut seen = Vec::new();
    wait_for(&mut events, &mut seen, |event| {
        matches!(event, UploadEvent::StateChanged { new_status: UploadStatus::Processing, .. })
    })
    .await;
    queue.cancel_upload(file_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    let file = queue.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, UploadStatus::Cancelled);
    assert!(file.video.is_none());
    assert!(!seen.iter().any(|event| matches!(event, UploadEvent::Completed { .. })));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_retry_resumes_failed_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    api.fail_chunk_once(1);
    let handle = start_queue(api.clone(), QueueConfig::default(), None);
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let file = write_video(dir.path(), "retry.mp4", 4 * CHUNK as usize).await;
    let file_id = queue.add_files(vec![file]).await.unwrap().added[0];
    queue.start_upload(None).await.unwrap();

    let mut seen = Vec::new();
    wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::Failed { .. })).await;

    let failed = queue.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(failed.status, UploadStatus::Error);
    assert_eq!(failed.retry_count, 1);
    assert!(failed.error.is_some());
    assert_eq!(failed.session.as_ref().map(|session| session.uploaded_chunks.clone()), Some(vec![0]));

    // only errored or cancelled files can be retried
    assert!(queue.start_upload(Some(file_id)).await.is_err());

    queue.retry_upload(file_id).await.unwrap();
    wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::Completed { .. })).await;

    assert_eq!(api.chunk_order(), vec![0, 1, 2, 3]);
    assert_eq!(api.finalize_calls(), 1);
    assert!(api.calls().iter().any(|call| call == "uploaded_chunks"));

    let file = queue.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(file.status, UploadStatus::Completed);
    assert_eq!(file.retry_count, 1);
    assert!(queue.retry_upload(file_id).await.is_err());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sequential_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeVideoApi::new());
    let config = QueueConfig {
        auto_start: true,
        ..QueueConfig::default()
    };
    let handle = start_queue(api.clone(), config, None);
    let queue = handle.queue.clone();
    let mut events = queue.subscribe();

    let a = write_video(dir.path(), "a.mp4", 2 * CHUNK as usize).await;
    let b = write_video(dir.path(), "b.mp4", 2 * CHUNK as usize).await;
    queue.add_files(vec![a, b]).await.unwrap();

    let mut seen = Vec::new();
    wait_for(&mut events, &mut seen, |event| matches!(event, UploadEvent::AllCompleted { .. })).await;

    // one file at a time: the second session starts after the first finalize
    let calls = api.calls();
    let first_finalize = calls.iter().position(|call| call == "finalize").unwrap();
    let second_session = calls.iter().rposition(|call| call == "create_session").unwrap();
    assert!(first_finalize < second_session);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 2);
    let progress = queue.overall_progress().await.unwrap();
    assert_eq!(progress.percentage, 100.0);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_zero_concurrency_is_rejected() {
    let api = Arc::new(FakeVideoApi::new());
    let service = Arc::new(VideoUploadService::new(api.clone(), test_upload_config(CHUNK)).unwrap());
    let config = QueueConfig {
        max_concurrent: 0,
        ..QueueConfig::default()
    };

    assert!(matches!(
        UploadQueue::new(service, config, None),
        Err(VideoError::ConfigError(_))
    ));
    assert_eq!(api.network_calls(), 0);
}
