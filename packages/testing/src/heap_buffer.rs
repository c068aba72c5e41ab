use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

/// A value that owns a heap allocation filled with a known byte.
///
/// Used to check that a container releases everything it owns: [`live_count()`][1] reports how
/// many buffers exist process-wide, and [`is_intact()`][2] confirms the contents were never
/// overwritten while the buffer sat in a container.
///
/// The live count is shared by all threads, so tests that assert on it must not run
/// concurrently with other tests that create buffers. Compare against a baseline taken at the
/// start of the test rather than against zero.
///
/// [1]: Self::live_count
/// [2]: Self::is_intact
#[derive(Debug)]
pub struct HeapBuffer {
    bytes: Vec<u8>,
    fill: u8,
}

impl HeapBuffer {
    /// Allocates a buffer of `len` bytes, each set to `fill`.
    #[must_use]
    pub fn new(len: usize, fill: u8) -> Self {
        LIVE_BUFFERS.fetch_add(1, Ordering::Relaxed);

        Self {
            bytes: vec![fill; len],
            fill,
        }
    }

    /// Size of the owned allocation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether every byte still holds the fill value.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.bytes.iter().all(|byte| *byte == self.fill)
    }

    /// Number of buffers currently alive in the process.
    #[must_use]
    pub fn live_count() -> usize {
        LIVE_BUFFERS.load(Ordering::Relaxed)
    }
}

impl Clone for HeapBuffer {
    fn clone(&self) -> Self {
        Self::new(self.len(), self.fill)
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        LIVE_BUFFERS.fetch_sub(1, Ordering::Relaxed);
    }
}
