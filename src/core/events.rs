use super::errors::VideoErrorCode;
use super::types::{
    FileId,
    UploadProgress,
    UploadSession,
    UploadStatus,
    VideoId,
    VideoMetadata,
};

/// Update emitted by the upload service while one transfer runs
#[derive(Debug, Clone)]
pub enum TransferUpdate {
    /// A chunked session exists server side; keep it to resume later
    SessionCreated(UploadSession),

    /// A chunk index was acknowledged
    ChunkAcknowledged {
        chunk_index: u32,
        total_chunks: u32,
    },

    Progress(UploadProgress),
}

/// Queue event, published on the queue's broadcast channel
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// File accepted into the list as pending
    FileAdded {
        file_id: FileId,
        name: String,
    },

    /// File refused by validation, never entered the list
    FileRejected {
        name: String,
        code: VideoErrorCode,
        message: String,
    },

    FileRemoved {
        file_id: FileId,
    },

    StateChanged {
        file_id: FileId,
        old_status: UploadStatus,
        new_status: UploadStatus,
    },

    SessionCreated {
        file_id: FileId,
        session: UploadSession,
    },

    Progress {
        file_id: FileId,
        progress: UploadProgress,
    },

    Completed {
        file_id: FileId,
        video: VideoMetadata,
    },

    Failed {
        file_id: FileId,
        error: String,
    },

    Cancelled {
        file_id: FileId,
        video_id: Option<VideoId>,
    },

    /// Every file in a non-empty list is completed
    AllCompleted {
        videos: Vec<VideoMetadata>,
    },
}

// Events cross task boundaries
const _: fn() = || {
    fn assert_send<T: Send>() {}
    assert_send::<UploadEvent>();
    assert_send::<TransferUpdate>();
};
