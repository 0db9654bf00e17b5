use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::change::ScoredChange;
use crate::config::DebounceConfig;
use crate::stats::{PipelineStats, bump};

/// Latest pending change per path, plus the order it arrived in.
#[derive(Debug, Default)]
pub struct PendingBatch {
    entries: HashMap<PathBuf, (u64, ScoredChange)>,
    next_seq: u64,
}

impl PendingBatch {
    /// Insert or replace the pending change for its path. Returns `true` if an
    /// earlier change for the same path was superseded.
    pub fn upsert(&mut self, change: ScoredChange) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(change.path().clone(), (seq, change))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the batch, returning at most `max` changes ordered by descending
    /// score, ties in arrival order. The second value counts what was cut.
    pub fn take_sorted(&mut self, max: usize) -> (Vec<ScoredChange>, usize) {
        let mut entries: Vec<(u64, ScoredChange)> = self.entries.drain().map(|(_, e)| e).collect();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(seq_a.cmp(seq_b))
        });
        let dropped = entries.len().saturating_sub(max);
        entries.truncate(max);
        (entries.into_iter().map(|(_, change)| change).collect(), dropped)
    }
}

/// Trailing-edge debounce over the whole pending batch.
///
/// Every added change restarts one shared countdown. When it runs out the batch
/// is sorted, truncated and sent downstream in a single step. The buffer lives
/// inside one task, so a flush can never interleave with an add.
pub struct DebounceBuffer {
    batch: PendingBatch,
    delay: Duration,
    max_batch_size: usize,
    stats: Arc<PipelineStats>,
}

impl DebounceBuffer {
    pub fn new(config: &DebounceConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            batch: PendingBatch::default(),
            delay: config.delay(),
            max_batch_size: config.max_batch_size.max(1),
            stats,
        }
    }

    pub fn add(&mut self, change: ScoredChange) {
        if self.batch.upsert(change) {
            tracing::trace!("superseded pending change");
        }
    }

    /// Snapshot and clear the pending batch.
    pub fn flush(&mut self) -> Vec<ScoredChange> {
        if self.batch.is_empty() {
            return Vec::new();
        }
        let pending = self.batch.len();
        let (batch, dropped) = self.batch.take_sorted(self.max_batch_size);
        bump(&self.stats.flushes, 1);
        if dropped > 0 {
            bump(&self.stats.truncated, dropped);
            tracing::info!(
                "flushing {} of {pending} pending change(s); {dropped} lowest-scored dropped",
                batch.len()
            );
        } else {
            tracing::debug!("flushing {pending} pending change(s)");
        }
        batch
    }

    /// Consume changes from `rx` until it closes, sending flushed batches to `tx`.
    ///
    /// When `rx` closes, anything still pending is flushed immediately.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<ScoredChange>,
        tx: mpsc::UnboundedSender<Vec<ScoredChange>>,
    ) {
        let timer = tokio::time::sleep(self.delay);
        tokio::pin!(timer);
        let mut armed = false;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(change) => {
                        self.add(change);
                        timer.as_mut().reset(Instant::now() + self.delay);
                        armed = true;
                    }
                    None => {
                        let batch = self.flush();
                        if !batch.is_empty()
                            && let Err(lost) = tx.send(batch)
                        {
                            tracing::warn!(
                                "delivery stage gone; dropped final batch of {} change(s)",
                                lost.0.len()
                            );
                        }
                        break;
                    }
                },
                () = &mut timer, if armed => {
                    armed = false;
                    let batch = self.flush();
                    if batch.is_empty() {
                        continue;
                    }
                    if tx.send(batch).is_err() {
                        tracing::debug!("delivery stage gone; stopping debounce buffer");
                        break;
                    }
                }
            }
        }
    }
}
