pub mod buffer;
pub mod diff;
pub mod enrich;
pub mod filter;
pub mod scorer;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::change::{ChangeEvent, ChangeKind, EnrichedChange, ScoredChange};
use crate::config::RadarConfig;
use crate::error::PipelineError;
use crate::parser::ContentParser;
use crate::stats::{PipelineStats, StatsSnapshot, bump};
use crate::watcher::event::RawChange;

use buffer::DebounceBuffer;
use diff::DiffProvider;
use enrich::Enricher;
use filter::{IgnoreReason, NoiseFilter};
use scorer::SignificanceScorer;

/// Capacity of the raw-event and scored-change channels.
const CHANNEL_CAPACITY: usize = 1024;

/// Receives the meaningful changes of each flush, in descending score order.
#[async_trait]
pub trait ChangeConsumer: Send + Sync {
    async fn deliver(&self, changes: Vec<EnrichedChange>) -> anyhow::Result<()>;
}

/// Front of the pipeline: turns raw notifications into scored changes.
///
/// Runs the noise filter twice: once on the path alone, and again once the
/// diff for a modification is known, so the whitespace check can apply.
pub struct Ingestor {
    root: PathBuf,
    filter: NoiseFilter,
    scorer: SignificanceScorer,
    diff: Arc<dyn DiffProvider>,
    next_id: AtomicU64,
    stats: Arc<PipelineStats>,
}

impl Ingestor {
    pub fn new(
        root: &Path,
        config: &RadarConfig,
        diff: Arc<dyn DiffProvider>,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            root: root.to_path_buf(),
            filter: NoiseFilter::new(&config.filter)?,
            scorer: SignificanceScorer::new(config)?,
            diff,
            next_id: AtomicU64::new(1),
            stats,
        })
    }

    /// Validate a raw notification and give it an id and a root-relative path.
    pub fn to_event(&self, raw: RawChange) -> Result<ChangeEvent, PipelineError> {
        if raw.path.as_os_str().is_empty() {
            return Err(PipelineError::malformed("event has no path"));
        }
        let path = if raw.path.is_absolute() {
            raw.path
                .strip_prefix(&self.root)
                .map_err(|_| {
                    PipelineError::malformed(format!(
                        "{} is outside {}",
                        raw.path.display(),
                        self.root.display()
                    ))
                })?
                .to_path_buf()
        } else {
            raw.path
        };
        let path: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if path.as_os_str().is_empty() {
            return Err(PipelineError::malformed("event names the project root itself"));
        }

        Ok(ChangeEvent {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            path,
            kind: raw.kind,
            observed_at: raw.timestamp,
        })
    }

    /// Filter and score one notification, reporting why it was dropped if it was.
    pub async fn evaluate(&mut self, raw: RawChange) -> Result<Evaluation, PipelineError> {
        let event = self.to_event(raw)?;

        if let Some(reason) = self.filter.ignore_reason(&event, None) {
            return Ok(Evaluation::Ignored(event, reason));
        }

        let diff = match event.kind {
            ChangeKind::Modified => self.diff.diff(&event.path).await,
            ChangeKind::Added | ChangeKind::Deleted => None,
        };

        if let Some(reason) = self.filter.ignore_reason(&event, diff.as_deref()) {
            return Ok(Evaluation::Ignored(event, reason));
        }

        Ok(Evaluation::Scored(self.scorer.score(&event, diff.as_deref())))
    }

    /// Like [`Ingestor::evaluate`], counting and logging drops. `None` means dropped.
    pub async fn ingest(&mut self, raw: RawChange) -> Option<ScoredChange> {
        bump(&self.stats.received, 1);

        match self.evaluate(raw).await {
            Ok(Evaluation::Scored(scored)) => {
                bump(&self.stats.scored, 1);
                tracing::debug!(
                    "scored {} {} at {:.2}{}",
                    scored.kind().as_str(),
                    scored.path().display(),
                    scored.score,
                    if scored.is_significant { "" } else { " (below threshold)" }
                );
                Some(scored)
            }
            Ok(Evaluation::Ignored(event, reason)) => {
                bump(&self.stats.ignored, 1);
                tracing::debug!("ignored {} ({})", event.path.display(), reason.as_str());
                None
            }
            Err(err) => {
                bump(&self.stats.malformed, 1);
                tracing::warn!("dropping event: {err}");
                None
            }
        }
    }
}

/// Outcome of running one event through the filter and scorer.
#[derive(Debug)]
pub enum Evaluation {
    Ignored(ChangeEvent, IgnoreReason),
    Scored(ScoredChange),
}

/// The assembled change pipeline, ready to start.
pub struct Pipeline {
    config: RadarConfig,
    ingestor: Ingestor,
    enricher: Enricher,
    stats: Arc<PipelineStats>,
}

impl Pipeline {
    pub fn new(
        root: &Path,
        config: RadarConfig,
        diff: Arc<dyn DiffProvider>,
        parser: Arc<dyn ContentParser>,
    ) -> Result<Self, PipelineError> {
        let stats = Arc::new(PipelineStats::default());
        let ingestor = Ingestor::new(root, &config, Arc::clone(&diff), Arc::clone(&stats))?;
        let enricher = Enricher::new(root, diff, parser);
        Ok(Self {
            config,
            ingestor,
            enricher,
            stats,
        })
    }

    /// Spawn the ingest, debounce and delivery tasks.
    ///
    /// Returns the handle used to feed raw changes and stop the pipeline, and
    /// the channel on which consumer failures are reported.
    pub fn start(
        self,
        consumer: Arc<dyn ChangeConsumer>,
    ) -> (PipelineHandle, mpsc::UnboundedReceiver<PipelineError>) {
        let (raw_tx, mut raw_rx) = mpsc::channel::<RawChange>(CHANNEL_CAPACITY);
        let (scored_tx, scored_rx) = mpsc::channel::<ScoredChange>(CHANNEL_CAPACITY);
        let (batch_tx, batch_rx) = mpsc::unbounded_channel::<Vec<ScoredChange>>();
        let (error_tx, error_rx) = mpsc::unbounded_channel::<PipelineError>();

        let mut ingestor = self.ingestor;
        let ingest_task = tokio::spawn(async move {
            while let Some(raw) = raw_rx.recv().await {
                if let Some(scored) = ingestor.ingest(raw).await
                    && scored_tx.send(scored).await.is_err()
                {
                    break;
                }
            }
        });

        let buffer = DebounceBuffer::new(&self.config.debounce, Arc::clone(&self.stats));
        let buffer_task = tokio::spawn(buffer.run(scored_rx, batch_tx));

        let delivery_task = tokio::spawn(deliver_batches(
            batch_rx,
            self.enricher,
            consumer,
            error_tx,
            Arc::clone(&self.stats),
        ));

        tracing::info!(
            "pipeline started (delay {}ms, max batch {}, threshold {})",
            self.config.debounce.delay_ms,
            self.config.debounce.max_batch_size,
            self.config.scoring.threshold
        );

        (
            PipelineHandle {
                sender: raw_tx,
                tasks: vec![
                    ("ingest", ingest_task),
                    ("debounce", buffer_task),
                    ("delivery", delivery_task),
                ],
                stats: self.stats,
            },
            error_rx,
        )
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    sender: mpsc::Sender<RawChange>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    /// A sender for a raw change source. Clones keep the pipeline open until dropped.
    pub fn sender(&self) -> mpsc::Sender<RawChange> {
        self.sender.clone()
    }

    /// Resolves when a stage's task ends while the pipeline is still open,
    /// which only happens if it panicked. Returns the stage name and its join
    /// result; the stage is no longer awaited by [`PipelineHandle::shutdown`].
    pub async fn stopped_stage(&mut self) -> (&'static str, Result<(), JoinError>) {
        if self.tasks.is_empty() {
            return std::future::pending().await;
        }
        let (result, index) = {
            let running = self.tasks.iter_mut().map(|(_, task)| task);
            let (result, index, _) = futures::future::select_all(running).await;
            (result, index)
        };
        let (stage, _) = self.tasks.remove(index);
        (stage, result)
    }

    /// Stop accepting events and wait for the pipeline to drain.
    ///
    /// Pending changes are flushed at once rather than after the debounce
    /// delay, and in-flight enrichment and delivery run to completion. Every
    /// other sender obtained from [`PipelineHandle::sender`] must be dropped
    /// for this to return.
    pub async fn shutdown(self) -> StatsSnapshot {
        drop(self.sender);
        for (stage, task) in self.tasks {
            if let Err(err) = task.await {
                tracing::error!("pipeline {stage} task failed: {err}");
            }
        }
        tracing::info!("pipeline stopped");
        self.stats.snapshot()
    }
}

/// Enrich each flushed batch, apply the significance and meaningful gates, and
/// hand the survivors to the consumer. A consumer failure is reported and the
/// batch is not retried.
async fn deliver_batches(
    mut batches: mpsc::UnboundedReceiver<Vec<ScoredChange>>,
    enricher: Enricher,
    consumer: Arc<dyn ChangeConsumer>,
    errors: mpsc::UnboundedSender<PipelineError>,
    stats: Arc<PipelineStats>,
) {
    while let Some(batch) = batches.recv().await {
        let (significant, insignificant): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(|c| c.is_significant);
        bump(&stats.insignificant, insignificant.len());
        if significant.is_empty() {
            continue;
        }

        let enriched = enricher.enrich_batch(significant).await;
        bump(&stats.enriched, enriched.len());

        let (meaningful, dropped): (Vec<_>, Vec<_>) =
            enriched.into_iter().partition(|c| c.is_meaningful);
        bump(&stats.not_meaningful, dropped.len());
        for change in &dropped {
            tracing::debug!("not meaningful: {}", change.scored.path().display());
        }
        if meaningful.is_empty() {
            continue;
        }

        let batch_len = meaningful.len();
        match consumer.deliver(meaningful).await {
            Ok(()) => bump(&stats.delivered, batch_len),
            Err(source) => {
                bump(&stats.consumer_errors, 1);
                let err = PipelineError::Consumer { batch_len, source };
                if let Err(unreported) = errors.send(err) {
                    tracing::warn!("{}", unreported.0);
                }
            }
        }
    }
}
