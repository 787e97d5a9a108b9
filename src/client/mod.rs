pub mod chunk;
pub mod validation;
mod http;
mod service;

pub use http::HttpVideoApi;
pub use service::{cancellable, UpdateCallback, UploadContext, UploadStats, VideoUploadService};
