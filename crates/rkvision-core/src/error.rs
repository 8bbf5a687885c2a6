use std::path::PathBuf;

use thiserror::Error;

/// Errors that cross a component boundary. Per-frame failures (bad pitch,
/// converter refusal, one dropped packet) are *not* represented here — they
/// are counted and logged, never propagated (see the supervisor's restart
/// policy in `rkvision-media::supervisor`).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stream-level failure: demux open failure, hard decoder error, EOF
    /// that the supervisor must restart from. Recoverable via backoff.
    #[error("stream error on channel {channel}: {source}")]
    Transient {
        channel: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Same shape as `Transient` but already counted against the
    /// consecutive-failure limit; kept distinct so supervisors can log
    /// "restarting" vs "giving up" without re-deriving the count.
    #[error("channel {channel} failed: {source}")]
    StreamFailure {
        channel: u32,
        #[source]
        source: anyhow::Error,
    },

    /// Bad channel configuration, model load failure, publisher bind
    /// failure, surface allocation failure. Some of these degrade a
    /// capability (RGA/DMA falls back to software); a model load failure
    /// terminates the channel.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// DMA buffer pool allocation failure.
    #[error("dma allocation failed for {width}x{height}: {reason}")]
    Dma {
        width: u32,
        height: u32,
        reason: String,
    },

    /// Model file or label file could not be read or parsed.
    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The process is shutting down; not actionable besides unwinding.
    #[error("shutdown requested")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
