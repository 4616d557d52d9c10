// Abort and cancellation signals shared by all stages of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::error;

use crate::error::PipelineError;

/// Handle for stopping a run from outside.
///
/// The reader checks it between chunks; a cancelled run ends with
/// [`PipelineError::Cancelled`]. A token stays cancelled once set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pipeline-wide abort flag plus the fatal error that raised it.
///
/// Raising is idempotent: the first cause is kept, later ones are dropped.
#[derive(Debug, Default)]
pub(crate) struct AbortSignal {
    raised: AtomicBool,
    cause: OnceLock<PipelineError>,
}

impl AbortSignal {
    /// Returns true if this call set the cause.
    pub(crate) fn raise(&self, cause: PipelineError) -> bool {
        let message = cause.to_string();
        let first = self.cause.set(cause).is_ok();
        self.raised.store(true, Ordering::Release);
        if first {
            error!(cause = %message, "pipeline aborted");
        }
        first
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    pub(crate) fn into_cause(self) -> Option<PipelineError> {
        self.cause.into_inner()
    }
}
