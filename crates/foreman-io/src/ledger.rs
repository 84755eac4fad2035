//! Append-only record of a run's IO events.

use std::sync::{Arc, RwLock};

use crate::error::{IoError, Result};
use crate::event::{IoEvent, IoKind};

/// Append-only, kind-partitioned record of every IO event of one run.
///
/// Events are partitioned by [`IoKind`] so per-kind iteration never scans
/// other kinds; the cross-kind view is merged lazily by sequence number, so
/// it always reflects global arrival order. Nothing is ever removed or
/// reordered.
///
/// # Concurrency
///
/// The ledger is single-writer by convention (the pump thread of one run)
/// but safe for any number of concurrent readers.
#[derive(Debug, Default)]
pub struct IoLedger {
    inner: RwLock<Partitions>,
}

#[derive(Debug, Default)]
struct Partitions {
    by_kind: [Vec<Arc<IoEvent>>; 4],
    next_seq: u64,
}

impl IoLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, assigning the next arrival position.
    pub fn record(&self, kind: IoKind, text: impl Into<String>) -> Result<Arc<IoEvent>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| IoError::LockPoisoned(e.to_string()))?;
        let event = Arc::new(IoEvent::new(kind, text.into(), inner.next_seq));
        inner.next_seq += 1;
        inner.by_kind[kind.index()].push(Arc::clone(&event));
        Ok(event)
    }

    /// Snapshot of one kind's events in arrival order.
    pub fn by_kind(&self, kind: IoKind) -> Vec<Arc<IoEvent>> {
        match self.inner.read() {
            Ok(inner) => inner.by_kind[kind.index()].clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Merged snapshot across all kinds, in global arrival order.
    pub fn events(&self) -> Vec<Arc<IoEvent>> {
        let partitions = match self.inner.read() {
            Ok(inner) => inner.by_kind.clone(),
            Err(_) => return Vec::new(),
        };
        merge(partitions)
    }

    /// Concatenated text of one kind's events, one event per line.
    pub fn text(&self, kind: IoKind) -> String {
        let lines: Vec<String> = self
            .by_kind(kind)
            .iter()
            .map(|e| e.text().to_string())
            .collect();
        lines.join("\n")
    }

    /// The last `n` events across all kinds, in arrival order.
    pub fn tail(&self, n: usize) -> Vec<Arc<IoEvent>> {
        let mut events = self.events();
        let skip = events.len().saturating_sub(n);
        events.split_off(skip)
    }

    /// Total number of recorded events.
    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.by_kind.iter().map(Vec::len).sum(),
            Err(_) => 0,
        }
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// K-way merge of per-kind partitions by sequence number.
///
/// Each partition is already sorted, so repeatedly taking the smallest head
/// reproduces global arrival order.
fn merge(partitions: [Vec<Arc<IoEvent>>; 4]) -> Vec<Arc<IoEvent>> {
    let total: usize = partitions.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut heads = [0usize; 4];
    while merged.len() < total {
        let mut next: Option<usize> = None;
        for (p, partition) in partitions.iter().enumerate() {
            let Some(candidate) = partition.get(heads[p]) else {
                continue;
            };
            match next {
                Some(n) if partitions[n][heads[n]].seq() <= candidate.seq() => {}
                _ => next = Some(p),
            }
        }
        match next {
            Some(p) => {
                merged.push(Arc::clone(&partitions[p][heads[p]]));
                heads[p] += 1;
            }
            None => break,
        }
    }
    merged
}
