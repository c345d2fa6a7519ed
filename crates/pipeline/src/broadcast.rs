//! Single-producer, many-consumer distribution of the latest annotated
//! frame.
//!
//! Built on `tokio::sync::watch`: the producer never blocks, each
//! subscriber holds at most one pending frame, and a slow subscriber simply
//! skips to whatever is newest. A subscriber that joins late receives the
//! current frame immediately; one that joins after close receives `Ended`
//! immediately. Dropping a subscription releases it, so disappearing
//! clients leak nothing.

use gatewatch_core::types::Timestamp;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Metadata accompanying each published frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    /// Strictly increasing publish counter within the job. Unlike the
    /// source frame index this never goes backwards, even across seeks.
    pub sequence: u64,
    /// 0-based index of the frame within its source.
    pub frame_index: u64,
    pub captured_at: Timestamp,
}

/// An encoded frame ready for MJPEG delivery.
#[derive(Debug)]
pub struct JpegFrame {
    pub bytes: Vec<u8>,
    pub meta: FrameMeta,
}

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Empty,
    Frame(Arc<JpegFrame>),
    Ended,
}

/// Result of waiting for the next frame.
#[derive(Debug)]
pub enum NextFrame {
    Frame(Arc<JpegFrame>),
    /// The producer closed the stream; no further frames will arrive.
    Ended,
    /// The caller's cancellation fired first.
    Canceled,
}

/// Producer handle. Cheap to clone; all clones publish into the same slot.
#[derive(Debug, Clone)]
pub struct FrameBroadcaster {
    tx: watch::Sender<Slot>,
}

impl FrameBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Slot::Empty);
        Self { tx }
    }

    /// Publish a frame, replacing any frame not yet seen by a subscriber.
    /// Never blocks.
    pub fn publish(&self, frame: Arc<JpegFrame>) {
        self.tx.send_replace(Slot::Frame(frame));
    }

    /// Mark end of stream. All pending and future `next` calls observe
    /// `Ended`.
    pub fn close(&self) {
        self.tx.send_replace(Slot::Ended);
    }

    pub fn subscribe(&self) -> FrameSubscription {
        let mut rx = self.tx.subscribe();
        // Deliver whatever is current (frame or end marker) on first `next`.
        rx.mark_changed();
        FrameSubscription { rx }
    }
}

impl Default for FrameBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// One consumer's view of the stream.
#[derive(Debug)]
pub struct FrameSubscription {
    rx: watch::Receiver<Slot>,
}

impl FrameSubscription {
    /// Wait for a frame newer than the last one seen, the end of the
    /// stream, or cancellation, whichever comes first.
    pub async fn next(&mut self, cancel: &CancellationToken) -> NextFrame {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return NextFrame::Canceled,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // Producer dropped without an explicit close.
                        return NextFrame::Ended;
                    }
                    match self.rx.borrow_and_update().clone() {
                        Slot::Frame(frame) => return NextFrame::Frame(frame),
                        Slot::Ended => return NextFrame::Ended,
                        Slot::Empty => continue,
                    }
                }
            }
        }
    }
}
