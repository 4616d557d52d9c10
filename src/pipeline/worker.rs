// Parse task run on the worker pool.
//
// Decode and tokenize failures are classified and returned as a failed
// ChunkResult. A panic is not classified: it aborts the whole run.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::state::RunContext;
use crate::error::PipelineError;
use crate::result::{ChunkOutcome, ChunkResult};
use crate::strategy::ChunkParser;
use crate::validate::{validate_rows, RowValidator};

/// One boundary-safe slice of input, owned by exactly one worker.
pub(crate) struct ParseTask {
    pub sequence: u64,
    pub offset: u64,
    pub bytes: Vec<u8>,
}

pub(crate) enum TaskOutcome {
    Completed(ChunkResult),
    /// The run is aborting; nothing to deliver.
    Aborted,
}

pub(crate) fn run_task(
    task: ParseTask,
    parser: &ChunkParser,
    validator: Option<&dyn RowValidator>,
    ctx: &RunContext,
) -> TaskOutcome {
    if ctx.is_aborted() {
        return TaskOutcome::Aborted;
    }
    let ParseTask {
        sequence,
        offset,
        bytes,
    } = task;

    match catch_unwind(AssertUnwindSafe(|| parse_chunk(parser, validator, bytes, offset))) {
        Ok(outcome) => TaskOutcome::Completed(ChunkResult {
            sequence,
            offset,
            outcome,
        }),
        Err(payload) => {
            ctx.abort(PipelineError::WorkerPanicked {
                sequence,
                message: panic_message(&*payload),
            });
            TaskOutcome::Aborted
        }
    }
}

fn parse_chunk(
    parser: &ChunkParser,
    validator: Option<&dyn RowValidator>,
    bytes: Vec<u8>,
    offset: u64,
) -> ChunkOutcome {
    match parser.parse_owned(bytes, offset) {
        Ok(parsed) => match validator {
            Some(validator) => {
                let violations =
                    validate_rows(validator, parsed.rows(), parsed.text(), parsed.quote());
                ChunkOutcome::Parsed(parsed.with_violations(violations))
            }
            None => ChunkOutcome::Parsed(parsed),
        },
        Err(e) => ChunkOutcome::Failed(e),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
