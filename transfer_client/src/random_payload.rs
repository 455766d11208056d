use bytes::Bytes;
use rand::RngCore;

use crate::constants::RANDOM_BUFFER_SIZE;

/// An immutable block of random bytes used as upload data.
///
/// Generated once per upload stream; every chunk written is a zero-copy slice of it.
#[derive(Clone, Debug)]
pub struct RandomPayload {
    data: Bytes,
}

impl RandomPayload {
    pub fn new(len: usize) -> Self {
        let mut data = vec![0u8; len];
        rand::rng().fill_bytes(&mut data);
        Self { data: data.into() }
    }

    pub fn with_default_size() -> Self {
        Self::new((*RANDOM_BUFFER_SIZE).max(1))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The next chunk to send when `remaining` bytes are left: the payload truncated
    /// to `min(remaining, payload length)`.
    pub fn chunk(&self, remaining: u64) -> Bytes {
        let len = remaining.min(self.data.len() as u64) as usize;
        self.data.slice(..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_truncates() {
        let payload = RandomPayload::new(1024);
        assert_eq!(payload.len(), 1024);
        assert_eq!(payload.chunk(100).len(), 100);
        assert_eq!(payload.chunk(1024).len(), 1024);
        assert_eq!(payload.chunk(5_000_000).len(), 1024);
        assert!(payload.chunk(0).is_empty());

        // Chunks share the same backing data.
        assert_eq!(payload.chunk(10), payload.chunk(1024).slice(..10));
    }

    #[test]
    fn test_payload_is_not_constant() {
        let payload = RandomPayload::new(4096);
        let chunk = payload.chunk(4096);
        assert!(chunk.iter().any(|&b| b != chunk[0]));
    }
}
