use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Counters shared by the pipeline stages. Relaxed ordering: they are only
/// ever read for reporting.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: AtomicUsize,
    pub malformed: AtomicUsize,
    pub ignored: AtomicUsize,
    pub scored: AtomicUsize,
    pub flushes: AtomicUsize,
    pub truncated: AtomicUsize,
    pub insignificant: AtomicUsize,
    pub enriched: AtomicUsize,
    pub not_meaningful: AtomicUsize,
    pub delivered: AtomicUsize,
    pub consumer_errors: AtomicUsize,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: usize,
    pub malformed: usize,
    pub ignored: usize,
    pub scored: usize,
    pub flushes: usize,
    pub truncated: usize,
    pub insignificant: usize,
    pub enriched: usize,
    pub not_meaningful: usize,
    pub delivered: usize,
    pub consumer_errors: usize,
}

pub fn bump(counter: &AtomicUsize, n: usize) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        StatsSnapshot {
            received: get(&self.received),
            malformed: get(&self.malformed),
            ignored: get(&self.ignored),
            scored: get(&self.scored),
            flushes: get(&self.flushes),
            truncated: get(&self.truncated),
            insignificant: get(&self.insignificant),
            enriched: get(&self.enriched),
            not_meaningful: get(&self.not_meaningful),
            delivered: get(&self.delivered),
            consumer_errors: get(&self.consumer_errors),
        }
    }
}
