//! Error kinds for the segmentation pipeline.
//!
//! Mirrors the recoverable/fatal split in the design: most kinds are
//! downgraded to a neutral value and logged rather than propagated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Cooperative cancellation token shared between the host and the
/// running pipeline.
pub type CancelToken = Arc<AtomicBool>;

pub fn new_cancel_token() -> CancelToken {
    Arc::new(AtomicBool::new(false))
}

/// Checked at every suspension point; any Decoder call gated behind
/// this is skipped once the host has asked to cancel.
pub fn check_cancelled(cancel: &Option<CancelToken>) -> Result<(), CancelledError> {
    if let Some(token) = cancel {
        if token.load(Ordering::Relaxed) {
            return Err(CancelledError);
        }
    }
    Ok(())
}

/// A single Decoder call failed; the caller downgrades the affected
/// signal to its neutral value (zeros / empty list) and continues.
#[derive(Debug, Error, Clone)]
#[error("decoder call failed: {0}")]
pub struct DecoderError(pub String);

/// The feature cache could not be read or parsed; treated as a miss.
#[derive(Debug, Error, Clone)]
#[error("feature cache error: {0}")]
pub struct CacheError(pub String);

/// A clip window was invalid after clamping (`end <= start`); the
/// anchor that produced it is discarded.
#[derive(Debug, Error, Clone)]
#[error("invalid window for anchor at {anchor_time_sec}s: {reason}")]
pub struct InvalidWindowError {
    pub anchor_time_sec: f64,
    pub reason: String,
}

/// Writing a debug artifact failed; the pipeline result is still
/// returned to the host.
#[derive(Debug, Error, Clone)]
#[error("debug artifact write failed: {0}")]
pub struct DebugWriteError(pub String);

/// The host cancelled the run at a suspension point.
#[derive(Debug, Error, Clone)]
#[error("pipeline cancelled")]
pub struct CancelledError;

/// Probing the source video failed or returned no duration — the
/// only unrecoverable Decoder failure.
#[derive(Debug, Error, Clone)]
#[error("fatal decoder error: could not determine video duration: {0}")]
pub struct FatalDecoderError(pub String);

/// Top-level error returned across the Pipeline/Host boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fatal(#[from] FatalDecoderError),

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}
