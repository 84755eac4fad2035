//! Deadline-bounded reading of blocking byte sources.
//!
//! The OS hands a process's output back through blocking pipes. The readers
//! here adapt that into incremental consumption: a caller is never blocked
//! past its configured timeout, and whatever partial line arrived in the
//! window is handed over and continued — never duplicated — on a later call.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Outcome of one deadline-bounded read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes that arrived within the window.
    Bytes(Vec<u8>),
    /// Exactly zero bytes arrived within the window; retry later.
    TimedOut,
    /// The source is exhausted; every further read returns this.
    Eof,
}

/// Adapts a blocking byte source into a reader that never blocks past a
/// timeout.
///
/// A dedicated background thread performs the blocking reads and hands
/// chunks over a channel; [`read`](Self::read) waits on that channel for at
/// most the given timeout. A read error on the source is treated as end of
/// stream — a terminating process legitimately closes its pipes mid-read.
#[derive(Debug)]
pub struct NonBlockingReader {
    rx: Receiver<Vec<u8>>,
    eof: bool,
}

impl NonBlockingReader {
    const CHUNK: usize = 4096;

    /// Spawns the background read loop over `source`.
    pub fn spawn<R>(source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut source = source;
            let mut buf = [0u8; Self::CHUNK];
            loop {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        // Receiver gone means nobody is consuming anymore.
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        trace!(error = %e, "stream read failed, treating as end of stream");
                        break;
                    }
                }
            }
        });
        Self { rx, eof: false }
    }

    /// Waits up to `timeout` for the next chunk.
    pub fn read(&mut self, timeout: Duration) -> ReadOutcome {
        if self.eof {
            return ReadOutcome::Eof;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => ReadOutcome::Bytes(bytes),
            Err(RecvTimeoutError::Timeout) => ReadOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                self.eof = true;
                ReadOutcome::Eof
            }
        }
    }

    /// Returns an already-queued chunk without waiting at all.
    pub fn try_read(&mut self) -> ReadOutcome {
        if self.eof {
            return ReadOutcome::Eof;
        }
        match self.rx.try_recv() {
            Ok(bytes) => ReadOutcome::Bytes(bytes),
            Err(TryRecvError::Empty) => ReadOutcome::TimedOut,
            Err(TryRecvError::Disconnected) => {
                self.eof = true;
                ReadOutcome::Eof
            }
        }
    }
}

/// Incremental line assembly over arbitrary byte chunks.
///
/// Recognizes CR, LF, and CRLF terminators. A CR at the end of the available
/// input is held back until the next byte shows whether it is half of a
/// CRLF. Text is decoded lossily as UTF-8 when a line is handed out.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    pending_cr: bool,
    /// Bytes of `pending` already handed out as a partial line.
    reported: usize,
}

impl LineAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `bytes`, returning any lines they complete (terminators
    /// stripped).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if self.pending_cr {
                // The held CR terminated the line; a directly following LF
                // belongs to the same terminator.
                self.pending_cr = false;
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\n' => {
                    if let Some(line) = self.take_line() {
                        lines.push(line);
                    }
                }
                b'\r' => self.pending_cr = true,
                _ => self.pending.push(b),
            }
        }
        lines
    }

    /// Reports the unfinished line if it grew since the last report.
    ///
    /// The content is retained, so a later [`push`](Self::push) continues
    /// the same logical line; repeated calls without new bytes report
    /// nothing.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() || self.pending.len() == self.reported {
            return None;
        }
        self.reported = self.pending.len();
        Some(String::from_utf8_lossy(&self.pending).into_owned())
    }

    /// Flushes the unfinished line at end of stream, stripping a held
    /// trailing terminator.
    pub fn flush(&mut self) -> Option<String> {
        self.pending_cr = false;
        self.take_line()
    }

    /// Whether an unfinished line is being accumulated.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the pending bytes as a finished line.
    ///
    /// Returns `None` when the exact content was already handed out as a
    /// partial line and nothing was added since — emitting it again would
    /// duplicate the logical line.
    fn take_line(&mut self) -> Option<String> {
        let fully_reported = !self.pending.is_empty() && self.reported == self.pending.len();
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.reported = 0;
        if fully_reported {
            None
        } else {
            Some(line)
        }
    }
}

/// Batch of lines produced by one deadline-bounded read window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LineBatch {
    /// Lines assembled in this window, oldest first. The last entry may be
    /// a partial line; its completion arrives as a new entry in a later
    /// batch.
    pub lines: Vec<String>,
    /// The stream is exhausted; later batches are always empty.
    pub eof: bool,
}

/// Line-oriented layer over [`NonBlockingReader`].
///
/// Each [`read_lines`](Self::read_lines) call collects lines for up to the
/// given window. If the window closes mid-line, the partial line is returned
/// and also retained, so the next successful read continues the same logical
/// line instead of duplicating it.
#[derive(Debug)]
pub struct NonBlockingLineReader {
    inner: NonBlockingReader,
    assembler: LineAssembler,
    done: bool,
}

impl NonBlockingLineReader {
    /// Spawns the background read loop over `source`.
    pub fn spawn<R>(source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: NonBlockingReader::spawn(source),
            assembler: LineAssembler::new(),
            done: false,
        }
    }

    /// Collects lines for up to `timeout`.
    ///
    /// At the deadline, an unfinished line that grew during the window is
    /// appended to the batch and retained for continuation. At end of
    /// stream the unfinished line is flushed once and `eof` is set.
    pub fn read_lines(&mut self, timeout: Duration) -> LineBatch {
        let mut batch = LineBatch::default();
        if self.done {
            batch.eof = true;
            return batch;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                if let Some(partial) = self.assembler.take_partial() {
                    batch.lines.push(partial);
                }
                return batch;
            }
            match self.inner.read(remaining) {
                ReadOutcome::Bytes(bytes) => batch.lines.extend(self.assembler.push(&bytes)),
                ReadOutcome::TimedOut => {
                    if let Some(partial) = self.assembler.take_partial() {
                        batch.lines.push(partial);
                    }
                    return batch;
                }
                ReadOutcome::Eof => {
                    if let Some(last) = self.assembler.flush() {
                        batch.lines.push(last);
                    }
                    self.done = true;
                    batch.eof = true;
                    return batch;
                }
            }
        }
    }
}

/// Fully blocking line reader sharing the same assembly semantics.
///
/// Trades responsiveness for simpler ordering: lines are only ever complete
/// (plus the final flush at end of stream), which suits draining a stream to
/// completion.
#[derive(Debug)]
pub struct BlockingLineReader<R> {
    source: R,
    assembler: LineAssembler,
    queue: VecDeque<String>,
    done: bool,
}

impl<R: Read> BlockingLineReader<R> {
    const CHUNK: usize = 4096;

    /// Wraps a blocking byte source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            assembler: LineAssembler::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Blocks for the next complete line; `None` at end of stream.
    ///
    /// Read errors are treated as end of stream, like the non-blocking
    /// reader does.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.queue.pop_front() {
                return Some(line);
            }
            if self.done {
                return None;
            }
            let mut buf = [0u8; Self::CHUNK];
            let n = match self.source.read(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    trace!(error = %e, "stream read failed, treating as end of stream");
                    0
                }
            };
            if n == 0 {
                self.done = true;
                if let Some(last) = self.assembler.flush() {
                    return Some(last);
                }
                return None;
            }
            self.queue.extend(self.assembler.push(&buf[..n]));
        }
    }
}
