//! Fan-out of captured bytes to multiple sinks.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use tracing::warn;

/// Writer that mirrors every chunk to all attached sinks.
///
/// A sink that fails a write is detached (with a warning) rather than
/// failing the write: capture must not die because a mirror broke.
#[derive(Default)]
pub struct TeeWriter {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl TeeWriter {
    /// Creates a tee with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sink that receives a copy of every chunk.
    pub fn attach(&mut self, sink: Box<dyn Write + Send>) {
        self.sinks.push(sink);
    }

    /// Whether any sinks are attached.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Writes `bytes` to every sink, detaching any that fail.
    pub fn broadcast(&mut self, bytes: &[u8]) {
        self.sinks
            .retain_mut(|sink| match sink.write_all(bytes).and_then(|_| sink.flush()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "detaching failed mirror sink");
                    false
                }
            });
    }
}

impl fmt::Debug for TeeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeWriter")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Read adapter that mirrors every chunk it yields into a [`TeeWriter`].
///
/// This is how one stream is simultaneously captured and externally
/// consumed: the reader loop pulls bytes through this adapter, and each
/// chunk reaches the attached sinks before line assembly sees it.
#[derive(Debug)]
pub struct MirrorRead<R> {
    inner: R,
    tee: Arc<Mutex<TeeWriter>>,
}

impl<R: Read> MirrorRead<R> {
    /// Wraps `inner`, mirroring into `tee`.
    pub fn new(inner: R, tee: Arc<Mutex<TeeWriter>>) -> Self {
        Self { inner, tee }
    }
}

impl<R: Read> Read for MirrorRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            let mut tee = match self.tee.lock() {
                Ok(tee) => tee,
                Err(poisoned) => poisoned.into_inner(),
            };
            tee.broadcast(&buf[..n]);
        }
        Ok(n)
    }
}
