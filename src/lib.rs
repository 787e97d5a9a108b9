pub mod cache;
pub mod client;
pub mod config;
pub mod core;
pub mod player;
pub mod queue;
pub mod simulation;
pub mod utils;

// Core re-exports
pub use crate::core::{
    FileId,
    UploadEvent,
    UploadFile,
    UploadMetadata,
    UploadProgress,
    UploadStatus,
    VideoApi,
    VideoError,
    VideoFile,
    VideoId,
    VideoMetadata,
    Result,
};

pub use client::{HttpVideoApi, UploadContext, VideoUploadService};
pub use config::Config;
pub use queue::{UploadQueue, UploadQueueHandle};
pub use player::VideoPlayer;
