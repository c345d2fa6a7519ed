//! Per-job control channel.
//!
//! Senders (HTTP handlers) must never block: Pause/Resume/Stop are
//! idempotent and deduplicated, Seek coalesces to the latest request. With
//! at most one queued message per command kind the queue is bounded by
//! construction; the configured capacity is an upper bound, not a tuning
//! knob.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Control commands a worker observes at iteration boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMsg {
    Pause,
    Resume,
    Stop,
    /// Seek the source by a signed number of frames (file jobs only).
    Seek(i64),
}

/// Bounded, non-blocking control queue with a notification for paused
/// workers.
#[derive(Debug)]
pub struct ControlChannel {
    queue: Mutex<VecDeque<ControlMsg>>,
    notify: Notify,
    cap: usize,
}

impl ControlChannel {
    pub fn new(cap: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(cap)),
            notify: Notify::new(),
            cap,
        }
    }

    /// Enqueue a command. Never blocks.
    ///
    /// Duplicate Pause/Resume/Stop are dropped; a queued Seek is replaced by
    /// the newest one. If the queue is somehow full the oldest message is
    /// discarded.
    pub fn push(&self, msg: ControlMsg) {
        {
            let mut queue = self.queue.lock();
            match msg {
                ControlMsg::Seek(_) => {
                    queue.retain(|m| !matches!(m, ControlMsg::Seek(_)));
                }
                _ => {
                    if queue.contains(&msg) {
                        return;
                    }
                }
            }
            if queue.len() == self.cap {
                queue.pop_front();
            }
            queue.push_back(msg);
        }
        self.notify.notify_one();
    }

    /// Non-blocking dequeue; used on every loop iteration.
    pub fn try_pop(&self) -> Option<ControlMsg> {
        self.queue.lock().pop_front()
    }

    /// Await the next command; used while paused.
    pub async fn recv(&self) -> ControlMsg {
        loop {
            if let Some(msg) = self.try_pop() {
                return msg;
            }
            self.notify.notified().await;
        }
    }
}
