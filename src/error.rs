use std::path::PathBuf;

/// Failure kinds surfaced by the change pipeline.
///
/// None of these stop the pipeline. Each stage degrades in its own way:
/// malformed events are dropped, scoring falls back to a neutral sub-score,
/// enrichment nulls its optional fields, and consumer failures are forwarded on
/// the error channel returned by [`crate::pipeline::Pipeline::start`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed change event: {reason}")]
    FilterEvaluation { reason: String },

    #[error("cannot compute {dimension} score for {}: {reason}", path.display())]
    Scoring {
        path: PathBuf,
        dimension: &'static str,
        reason: String,
    },

    #[error("enrichment I/O failed for {}: {source}", path.display())]
    EnrichmentIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("consumer rejected a batch of {batch_len} change(s): {source}")]
    Consumer {
        batch_len: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::FilterEvaluation {
            reason: reason.into(),
        }
    }
}
