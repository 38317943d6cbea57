//! Mock dome adapter for testing
//!
//! Simulates the dome controller end of the serial line:
//! - Records every write for test verification
//! - Answers each write with the acknowledgment byte (optionally preceded
//!   by noise bytes the link must skip)
//! - Can stay silent, in which case reads report a closed link

use super::Adapter;
use crate::error::CaptureResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
    writes: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    cleared: usize,
}

/// Mock serial adapter
///
/// Clones share state, so a test can keep one handle for inspection while
/// the link owns the other.
///
/// # Example
///
/// ```
/// use rticap::adapters::MockAdapter;
///
/// let adapter = MockAdapter::new();
/// let wire = adapter.clone();
/// assert!(wire.writes().is_empty());
/// ```
#[derive(Clone)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
    ack: Option<u8>,
    noise: Vec<u8>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Adapter that acknowledges every write with `0x01`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            ack: Some(0x01),
            noise: Vec::new(),
        }
    }

    /// Adapter that never answers.
    pub fn silent() -> Self {
        Self {
            ack: None,
            ..Self::new()
        }
    }

    /// Send these bytes ahead of every acknowledgment.
    pub fn with_noise(mut self, noise: &[u8]) -> Self {
        self.noise = noise.to_vec();
        self
    }

    /// Queue bytes as if they arrived unsolicited.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// All writes seen so far, one entry per `write` call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Number of times pending input was discarded.
    pub fn clear_count(&self) -> usize {
        self.lock().cleared
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn write(&mut self, bytes: &[u8]) -> CaptureResult<()> {
        let mut state = self.lock();
        state.writes.push(bytes.to_vec());
        if let Some(ack) = self.ack {
            state.rx.extend(self.noise.iter().copied());
            state.rx.push_back(ack);
        }
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> CaptureResult<usize> {
        let mut state = self.lock();
        let mut n = 0;
        while n < buffer.len() {
            match state.rx.pop_front() {
                Some(byte) => {
                    buffer[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    async fn clear_input(&mut self) -> CaptureResult<()> {
        let mut state = self.lock();
        state.rx.clear();
        state.cleared += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acknowledges_each_write() {
        let mut adapter = MockAdapter::new().with_noise(&[0x7F]);
        adapter.write(&[0x42, 0, 0]).await.unwrap();

        let mut buf = [0u8; 4];
        let n = adapter.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x7F, 0x01]);
        assert_eq!(adapter.writes(), vec![vec![0x42, 0, 0]]);
    }

    #[tokio::test]
    async fn test_silent_adapter_reads_nothing() {
        let mut adapter = MockAdapter::silent();
        adapter.write(&[1]).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(adapter.read(&mut buf).await.unwrap(), 0);
    }
}
