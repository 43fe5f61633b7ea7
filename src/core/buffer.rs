//! Bounded audio buffer shared between the ingest and process loops.
//!
//! The buffer is the admission point for inbound audio: writers never
//! suspend (a full buffer is reported through the boolean return so the
//! ingest loop can apply backpressure instead of stalling), while readers
//! suspend until at least one byte is available.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Byte-oriented bounded buffer with waitable not-empty / not-full conditions.
///
/// Invariant: `0 <= size() <= max_size` at every observation point. Overflow
/// is a normal condition signalled by `write` returning `false`, never an
/// error.
pub struct BoundedAudioBuffer {
    max_size: usize,
    bytes: Mutex<VecDeque<u8>>,
    not_empty: Notify,
    not_full: Notify,
}

impl BoundedAudioBuffer {
    /// Create a buffer that holds at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            bytes: Mutex::new(VecDeque::new()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Maximum capacity in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append `data` to the buffer.
    ///
    /// Returns `false` and leaves the buffer unchanged when the write would
    /// exceed `max_size`. The caller must treat a rejected write as
    /// backpressure, not as an error. Never suspends.
    pub fn write(&self, data: &[u8]) -> bool {
        let mut bytes = self.bytes.lock();
        if bytes.len() + data.len() > self.max_size {
            return false;
        }
        bytes.extend(data);
        drop(bytes);
        self.not_empty.notify_waiters();
        true
    }

    /// Read up to `max_bytes` from the front of the buffer, or everything
    /// when `None`. Suspends until at least one byte is available.
    pub async fn read(&self, max_bytes: Option<usize>) -> Vec<u8> {
        loop {
            // Arm the notification before checking so a concurrent write
            // between the check and the await cannot be missed.
            let notified = self.not_empty.notified();

            {
                let mut bytes = self.bytes.lock();
                if !bytes.is_empty() {
                    let take = match max_bytes {
                        Some(n) => n.min(bytes.len()),
                        None => bytes.len(),
                    };
                    let data: Vec<u8> = bytes.drain(..take).collect();
                    drop(bytes);
                    self.not_full.notify_waiters();
                    return data;
                }
            }

            notified.await;
        }
    }

    /// Suspend until the buffer has room for at least one more byte.
    pub async fn wait_not_full(&self) {
        loop {
            let notified = self.not_full.notified();
            if self.bytes.lock().len() < self.max_size {
                return;
            }
            notified.await;
        }
    }

    /// Instantaneous number of buffered bytes.
    pub fn size(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Discard all buffered bytes and release any writer parked on not-full.
    pub fn clear(&self) {
        self.bytes.lock().clear();
        self.not_full.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_write_within_capacity() {
        let buffer = BoundedAudioBuffer::new(16);
        assert!(buffer.write(b"hello"));
        assert_eq!(buffer.size(), 5);
        assert!(buffer.write(b"world"));
        assert_eq!(buffer.size(), 10);
    }

    #[test]
    fn test_write_overflow_rejected_and_unchanged() {
        let buffer = BoundedAudioBuffer::new(8);
        assert!(buffer.write(b"12345678"));
        assert!(!buffer.write(b"x"));
        assert_eq!(buffer.size(), 8);
        // Rejection is idempotent: repeating the write changes nothing.
        assert!(!buffer.write(b"x"));
        assert_eq!(buffer.size(), 8);
    }

    #[test]
    fn test_write_exactly_to_capacity() {
        let buffer = BoundedAudioBuffer::new(4);
        assert!(buffer.write(b"1234"));
        assert!(!buffer.write(b"5"));
        assert_eq!(buffer.size(), 4);
    }

    #[tokio::test]
    async fn test_read_drains_in_order() {
        let buffer = BoundedAudioBuffer::new(64);
        buffer.write(b"abc");
        buffer.write(b"def");

        let first = buffer.read(Some(4)).await;
        assert_eq!(first, b"abcd");
        let rest = buffer.read(None).await;
        assert_eq!(rest, b"ef");
        assert_eq!(buffer.size(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_bytes() {
        let buffer = BoundedAudioBuffer::new(1024);
        let mut written = Vec::new();
        for i in 0u8..10 {
            let chunk = vec![i; 37];
            assert!(buffer.write(&chunk));
            written.extend_from_slice(&chunk);
        }

        let mut read_back = Vec::new();
        while buffer.size() > 0 {
            read_back.extend(buffer.read(Some(50)).await);
        }
        assert_eq!(read_back, written);
    }

    #[tokio::test]
    async fn test_read_suspends_until_write() {
        let buffer = Arc::new(BoundedAudioBuffer::new(64));

        let reader = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.read(None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        buffer.write(b"data");
        let data = reader.await.unwrap();
        assert_eq!(data, b"data");
    }

    #[tokio::test]
    async fn test_clear_releases_waiting_writer() {
        let buffer = Arc::new(BoundedAudioBuffer::new(4));
        buffer.write(b"1234");

        let waiter = {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                buffer.wait_not_full().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        buffer.clear();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("writer should be released by clear")
            .unwrap();
        assert_eq!(buffer.size(), 0);
        assert!(buffer.write(b"ok"));
    }
}
