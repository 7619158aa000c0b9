//! Single-slot, drop-oldest mailbox between a producer thread/task and the
//! one consumer that turns encoded frames into RTP or WS frames.
//!
//! Grounded on the Python `PipelineBridge.set_data`/`get_data` pair: a
//! producer overwrites whatever is waiting; a consumer blocks until
//! something is there, then takes the newest value only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Single-producer, single-consumer, capacity-1, drop-oldest-on-overflow.
pub struct PipelineBridge<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> Default for PipelineBridge<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }
}

impl<T> PipelineBridge<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new sample, overwriting and discarding any unread one.
    pub fn set(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        *slot = Some(value);
        drop(slot);
        self.notify.notify_one();
    }

    /// Wait for and take the most recent sample.
    pub async fn get(&self) -> T {
        loop {
            if let Some(value) = self.slot.lock().unwrap().take() {
                return value;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking take, for poll-style consumers.
    pub fn try_get(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn consumer_sees_newest_after_overflow() {
        let bridge: Arc<PipelineBridge<u32>> = Arc::new(PipelineBridge::new());
        bridge.set(1);
        bridge.set(2);
        bridge.set(3);
        assert_eq!(bridge.dropped_count(), 2);
        assert_eq!(bridge.get().await, 3);
    }

    #[tokio::test]
    async fn get_blocks_until_a_value_is_set() {
        let bridge: Arc<PipelineBridge<u32>> = Arc::new(PipelineBridge::new());
        let consumer = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        bridge.set(42);
        assert_eq!(consumer.await.unwrap(), 42);
    }
}
