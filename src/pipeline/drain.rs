// Ordered drain
//
// Pops the in-flight queue in submission order and waits on each entry's
// result before handing it to the sink, so the sink sees chunks in input
// order whatever order workers finish in. An in-flight slot is released only
// after the sink has taken the result.

use crossbeam_channel::Receiver;
use tracing::{debug, trace, warn};

use super::state::RunContext;
use super::worker::TaskOutcome;
use crate::error::{PipelineError, SinkError};
use crate::result::ChunkResult;

/// Downstream consumer, called once per chunk in input order.
///
/// Any `FnMut(ChunkResult)` closure is a sink; wrap a closure returning
/// `Result<(), SinkError>` with [`try_sink`] to let it stop the run.
pub trait ChunkSink: Send {
    fn accept(&mut self, result: ChunkResult) -> Result<(), SinkError>;
}

impl<F> ChunkSink for F
where
    F: FnMut(ChunkResult) + Send,
{
    fn accept(&mut self, result: ChunkResult) -> Result<(), SinkError> {
        self(result);
        Ok(())
    }
}

/// Sink backed by a fallible closure. An `Err` aborts the run.
pub struct TrySink<F>(F);

pub fn try_sink<F>(f: F) -> TrySink<F>
where
    F: FnMut(ChunkResult) -> Result<(), SinkError> + Send,
{
    TrySink(f)
}

impl<F> ChunkSink for TrySink<F>
where
    F: FnMut(ChunkResult) -> Result<(), SinkError> + Send,
{
    fn accept(&mut self, result: ChunkResult) -> Result<(), SinkError> {
        (self.0)(result)
    }
}

/// Queue entry: a forked task's result slot, or end of input.
pub(crate) enum InFlight {
    Pending {
        sequence: u64,
        result: Receiver<TaskOutcome>,
    },
    End,
}

/// Counters gathered while draining.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainStats {
    pub chunks: u64,
    pub rows: u64,
    pub failed_chunks: u64,
    pub violations: u64,
    pub truncated_rows: u64,
}

impl DrainStats {
    fn record(&mut self, result: &ChunkResult) {
        self.chunks += 1;
        match result.parsed() {
            Some(parsed) => {
                self.rows += parsed.len() as u64;
                self.violations += parsed.violations().len() as u64;
                self.truncated_rows += parsed.rows().truncated_rows() as u64;
            }
            None => self.failed_chunks += 1,
        }
    }
}

pub(crate) fn drain<S: ChunkSink>(
    queue: Receiver<InFlight>,
    slots: Receiver<()>,
    mut sink: S,
    ctx: &RunContext,
) -> DrainStats {
    let mut stats = DrainStats::default();

    for entry in queue.iter() {
        let (sequence, result) = match entry {
            InFlight::Pending { sequence, result } => (sequence, result),
            InFlight::End => {
                debug!(chunks = stats.chunks, "drain reached end of input");
                break;
            }
        };

        let chunk = match result.recv() {
            Ok(TaskOutcome::Completed(chunk)) => chunk,
            Ok(TaskOutcome::Aborted) => break,
            Err(_) => {
                ctx.abort(PipelineError::ResultLost { sequence });
                break;
            }
        };
        if ctx.is_aborted() {
            debug!(sequence, "discarding in-flight results after abort");
            break;
        }

        stats.record(&chunk);
        match chunk.error() {
            Some(e) => warn!(sequence, offset = chunk.offset, error = %e, "chunk failed"),
            None => trace!(
                sequence,
                offset = chunk.offset,
                rows = chunk.row_count(),
                in_flight = ctx.in_flight(),
                "chunk delivered"
            ),
        }

        if let Err(e) = sink.accept(chunk) {
            ctx.abort(e.into());
            break;
        }
        // One slot per pending entry, taken before the entry was queued
        let _ = slots.try_recv();
        ctx.task_finished();
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::abort::CancelToken;
    use crate::result::ChunkOutcome;
    use crate::strategy::ChunkParser;
    use crossbeam_channel::bounded;

    fn completed(sequence: u64, text: &str) -> TaskOutcome {
        let parsed = ChunkParser::new(&PipelineConfig::default())
            .unwrap()
            .parse_owned(text.as_bytes().to_vec(), 0)
            .unwrap();
        TaskOutcome::Completed(ChunkResult {
            sequence,
            offset: 0,
            outcome: ChunkOutcome::Parsed(parsed),
        })
    }

    #[test]
    fn test_drain_follows_queue_order() {
        let ctx = RunContext::new(CancelToken::new());
        let (queue_tx, queue_rx) = bounded(4);
        let (slots_tx, slots_rx) = bounded(4);

        let mut senders = Vec::new();
        for sequence in 0..3 {
            let (tx, rx) = bounded(1);
            slots_tx.send(()).unwrap();
            ctx.task_started();
            queue_tx
                .send(InFlight::Pending {
                    sequence,
                    result: rx,
                })
                .unwrap();
            senders.push(tx);
        }
        queue_tx.send(InFlight::End).unwrap();

        // Complete in reverse order
        for (sequence, tx) in senders.into_iter().enumerate().rev() {
            tx.send(completed(sequence as u64, "a,b\nc,d\n")).unwrap();
        }

        let mut seen = Vec::new();
        let stats = drain(queue_rx, slots_rx, |r: ChunkResult| seen.push(r.sequence), &ctx);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.rows, 6);
        assert_eq!(ctx.in_flight(), 0);
        assert!(slots_tx.is_empty());
    }

    #[test]
    fn test_lost_result_aborts() {
        let ctx = RunContext::new(CancelToken::new());
        let (queue_tx, queue_rx) = bounded(1);
        let (_slots_tx, slots_rx) = bounded::<()>(1);
        let (tx, rx) = bounded::<TaskOutcome>(1);
        drop(tx);
        queue_tx
            .send(InFlight::Pending {
                sequence: 5,
                result: rx,
            })
            .unwrap();
        drop(queue_tx);

        drain(queue_rx, slots_rx, |_: ChunkResult| {}, &ctx);
        assert!(matches!(
            ctx.into_cause(),
            Some(PipelineError::ResultLost { sequence: 5 })
        ));
    }

    #[test]
    fn test_sink_error_aborts() {
        let ctx = RunContext::new(CancelToken::new());
        let (queue_tx, queue_rx) = bounded(2);
        let (_slots_tx, slots_rx) = bounded::<()>(2);
        for sequence in 0..2 {
            let (tx, rx) = bounded(1);
            tx.send(completed(sequence, "x\n")).unwrap();
            queue_tx
                .send(InFlight::Pending {
                    sequence,
                    result: rx,
                })
                .unwrap();
        }
        drop(queue_tx);

        let mut calls = 0;
        let sink = try_sink(|_| {
            calls += 1;
            Err(SinkError::new("full"))
        });
        let stats = drain(queue_rx, slots_rx, sink, &ctx);
        assert_eq!(calls, 1);
        assert_eq!(stats.chunks, 1);
        assert!(matches!(ctx.into_cause(), Some(PipelineError::Sink(_))));
    }
}
