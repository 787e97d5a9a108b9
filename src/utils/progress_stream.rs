use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use crate::core::ProgressCallback;
use super::progress::TransferMeter;

pin_project! {
    /// Byte stream that reports transfer progress as the body is consumed
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        meter: TransferMeter,
        callback: ProgressCallback,
        last_update: Option<Instant>,
        update_interval: Duration,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total_bytes: u64, callback: ProgressCallback) -> Self {
        Self {
            inner,
            meter: TransferMeter::new(total_bytes),
            callback,
            last_update: None,
            update_interval: Duration::from_millis(500),
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    let progress = this.meter.add_bytes(chunk.len() as u64);
                    let now = Instant::now();
                    let due = match this.last_update {
                        Some(last) => now.duration_since(*last) >= *this.update_interval,
                        None => true,
                    };
                    if due {
                        *this.last_update = Some(now);
                        (this.callback)(progress);
                    }
                }

                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                // 流结束时，发送最终更新
                (this.callback)(this.meter.progress());
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
