//! Caller-owned destination memory for read requests.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Destination buffer for a read, owned by the external caller.
///
/// Cloning produces another handle to the same memory. Requests hold a clone
/// only while they are live; the graph drops its clone when the request
/// reaches a terminal status, so [`holders`](Self::holders) falls back to the
/// caller's own handles once the work is done.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    /// Creates a zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; len])),
        }
    }

    /// Returns the buffer capacity in bytes.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the buffer has no capacity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `bytes` into the buffer at `offset`.
    ///
    /// Returns false without writing anything if the range does not fit.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> bool {
        let mut data = self.data.lock();
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= data.len() => end,
            _ => return false,
        };
        data[offset..end].copy_from_slice(bytes);
        true
    }

    /// Returns a copy of the buffer contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Number of live handles to this buffer, including the caller's.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.len())
            .field("holders", &self.holders())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_len_is_zeroed() {
        let buffer = OutputBuffer::with_len(4);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.to_vec(), vec![0, 0, 0, 0]);
        assert!(OutputBuffer::default().is_empty());
    }

    #[test]
    fn test_write_at_within_bounds() {
        let buffer = OutputBuffer::with_len(6);
        assert!(buffer.write_at(2, &[1, 2, 3]));
        assert_eq!(buffer.to_vec(), vec![0, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_write_at_out_of_bounds_is_rejected() {
        let buffer = OutputBuffer::with_len(4);
        assert!(!buffer.write_at(3, &[1, 2]));
        assert!(!buffer.write_at(usize::MAX, &[1]));
        assert_eq!(buffer.to_vec(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_clones_share_memory() {
        let buffer = OutputBuffer::with_len(2);
        let borrowed = buffer.clone();
        assert_eq!(buffer.holders(), 2);

        borrowed.write_at(0, &[9]);
        assert_eq!(buffer.to_vec(), vec![9, 0]);

        drop(borrowed);
        assert_eq!(buffer.holders(), 1);
    }
}
