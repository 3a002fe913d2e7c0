//! Bounded capture of subprocess output streams.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes captured from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,

    /// The stream produced more than the capture limit.
    pub truncated: bool,
}

impl Captured {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Output buffer that keeps the first `limit` bytes and counts the rest.
#[derive(Debug)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    limit: usize,
    dropped: u64,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        let keep = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..keep]);
        self.dropped += (chunk.len() - keep) as u64;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes discarded after the limit was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn snapshot(&self) -> Captured {
        Captured {
            bytes: self.data.clone(),
            truncated: self.dropped > 0,
        }
    }
}

/// Capture buffer shared between a reader task and the process runner.
///
/// The runner keeps its handle so partial output survives an aborted reader.
#[derive(Debug, Clone)]
pub struct SharedCapture(Arc<Mutex<CaptureBuffer>>);

impl SharedCapture {
    pub fn new(limit: usize) -> Self {
        Self(Arc::new(Mutex::new(CaptureBuffer::new(limit))))
    }

    fn lock(&self) -> MutexGuard<'_, CaptureBuffer> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, chunk: &[u8]) {
        self.lock().push(chunk);
    }

    pub fn snapshot(&self) -> Captured {
        self.lock().snapshot()
    }
}

/// Read `reader` to end-of-stream into `sink`.
///
/// Reading continues past the capture limit so the writer never blocks on a
/// full pipe.
pub async fn drain<R>(mut reader: R, sink: SharedCapture) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.push(&chunk[..n]);
    }
}
