mod progress;
mod progress_stream;

pub use progress::{format_bytes, format_eta, format_speed, TransferMeter};
pub use progress_stream::ProgressStream;
