mod manager;
mod worker;

pub use manager::{AddFilesOutcome, RejectedFile, UploadQueue, UploadQueueHandle};
pub use worker::QueueWorker;
