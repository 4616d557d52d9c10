// Chunk pipeline
//
// Three stages per run:
// 1. Reader (caller thread): reads chunks, splits at safe record boundaries,
//    forks one parse task per complete part.
// 2. Workers (rayon pool owned by the run): decode, tokenize, validate.
// 3. Drain (scoped thread): takes results in submission order and feeds the
//    sink.
//
// Forked tasks sit in a bounded FIFO of result slots. A separate slot
// channel of the same capacity is acquired before each fork and released
// after the sink has taken the result, so at most `max_concurrency` chunks
// are ever in flight and the reader blocks beyond that.
//
// The pool, the queues and the drain thread are created at run start and
// torn down before `run` returns, on every exit path.

mod abort;
mod drain;
mod reader;
mod state;
mod worker;

pub use abort::CancelToken;
pub use drain::{try_sink, ChunkSink, TrySink};

use crossbeam_channel::bounded;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{ConfigError, PipelineError};
use crate::result::ChunkResult;
use crate::strategy::ChunkParser;
use crate::validate::RowValidator;

use drain::InFlight;
use state::{RunContext, RunState};
use worker::{panic_message, ParseTask, TaskOutcome};

/// Counters for one completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Chunks delivered to the sink.
    pub chunks: u64,
    pub rows: u64,
    /// Chunks delivered with a non-fatal error.
    pub failed_chunks: u64,
    pub violations: u64,
    /// Rows that had fields dropped at the width cap.
    pub truncated_rows: u64,
    /// Input bytes read.
    pub bytes: u64,
    /// Highest number of chunks in flight at once.
    pub peak_in_flight: usize,
}

/// Reads a source in chunks, parses them in parallel and delivers results in
/// input order.
pub struct ChunkPipeline {
    config: PipelineConfig,
    validator: Option<Arc<dyn RowValidator>>,
    cancel: CancelToken,
}

impl ChunkPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ChunkPipeline {
            config,
            validator: None,
            cancel: CancelToken::new(),
        })
    }

    /// Validate every row; violations are attached to the chunk results.
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: RowValidator + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels runs of this pipeline from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Replace the cancel token, e.g. to reuse a pipeline after a cancelled
    /// run or to share one token across several pipelines.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run_file<P, S>(&self, path: P, sink: S) -> Result<RunSummary, PipelineError>
    where
        P: AsRef<Path>,
        S: ChunkSink,
    {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        info!(path = %path.display(), len, "processing file");
        self.run(file, sink)
    }

    /// Run and gather every result in memory.
    pub fn collect<R: Read>(
        &self,
        source: R,
    ) -> Result<(Vec<ChunkResult>, RunSummary), PipelineError> {
        let mut results = Vec::new();
        let summary = self.run(source, |r: ChunkResult| results.push(r))?;
        Ok((results, summary))
    }

    /// Process `source` to the end, delivering each chunk's result to `sink`
    /// in input order.
    ///
    /// Returns the first fatal error if the run was aborted; results
    /// delivered before the abort stay delivered.
    pub fn run<R, S>(&self, mut source: R, sink: S) -> Result<RunSummary, PipelineError>
    where
        R: Read,
        S: ChunkSink,
    {
        let started = Instant::now();
        let workers = self.config.worker_count();
        let capacity = self.config.max_concurrency;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("chunkcsv-worker-{i}"))
            .build()?;

        let parser = ChunkParser::new(&self.config)?;
        let splitter = *parser.splitter();
        let validator = self.validator.as_deref();
        let ctx = RunContext::new(self.cancel.clone());
        ctx.advance(RunState::Running);
        info!(
            chunk_size = self.config.chunk_size,
            max_concurrency = capacity,
            workers,
            "pipeline run started"
        );

        let (queue_tx, queue_rx) = bounded::<InFlight>(capacity);
        let (slots_tx, slots_rx) = bounded::<()>(capacity);

        let (read, drained) = std::thread::scope(|scope| {
            let ctx = &ctx;
            let drain = scope.spawn(move || drain::drain(queue_rx, slots_rx, sink, ctx));

            let read = pool.in_place_scope(|tasks| {
                let mut sequence = 0u64;
                reader::read_chunks(
                    &mut source,
                    &splitter,
                    self.config.chunk_size,
                    self.config.max_leftover,
                    ctx,
                    |offset, bytes| {
                        // Blocks while `capacity` chunks are in flight
                        if ctx.is_aborted() || slots_tx.send(()).is_err() {
                            return false;
                        }
                        ctx.task_started();
                        let (result_tx, result_rx) = bounded::<TaskOutcome>(1);
                        let task = ParseTask {
                            sequence,
                            offset,
                            bytes,
                        };
                        tasks.spawn(move |_| {
                            let _ = result_tx.send(worker::run_task(task, &parser, validator, ctx));
                        });
                        let pending = InFlight::Pending {
                            sequence,
                            result: result_rx,
                        };
                        if queue_tx.send(pending).is_err() {
                            return false;
                        }
                        debug!(sequence, offset, "chunk submitted");
                        sequence += 1;
                        true
                    },
                )
            });

            let read = match read {
                Ok(stats) => {
                    if !ctx.is_aborted() {
                        ctx.advance(RunState::Draining);
                        let _ = queue_tx.send(InFlight::End);
                    }
                    Some(stats)
                }
                Err(e) => {
                    ctx.abort(e);
                    None
                }
            };
            drop(queue_tx);
            drop(slots_tx);

            let drained = drain
                .join()
                .map_err(|payload| PipelineError::DrainPanicked(panic_message(&*payload)));
            (read, drained)
        });

        let drained = match drained {
            Ok(stats) => Some(stats),
            Err(e) => {
                ctx.abort(e);
                None
            }
        };
        let peak_in_flight = ctx.peak_in_flight();
        debug!(state = ?ctx.state(), "tearing down run");
        ctx.advance(RunState::Terminated);
        if let Some(cause) = ctx.into_cause() {
            return Err(cause);
        }

        let read = read.unwrap_or_default();
        let drained = drained.unwrap_or_default();
        let summary = RunSummary {
            chunks: drained.chunks,
            rows: drained.rows,
            failed_chunks: drained.failed_chunks,
            violations: drained.violations,
            truncated_rows: drained.truncated_rows,
            bytes: read.bytes,
            peak_in_flight,
        };
        info!(
            chunks = summary.chunks,
            rows = summary.rows,
            failed_chunks = summary.failed_chunks,
            violations = summary.violations,
            bytes = summary.bytes,
            peak_in_flight,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseStrategy;
    use std::io::Cursor;

    fn pipeline(chunk_size: usize) -> ChunkPipeline {
        ChunkPipeline::new(
            PipelineConfig::default()
                .with_chunk_size(chunk_size)
                .with_max_concurrency(2)
                .with_workers(2),
        )
        .unwrap()
    }

    fn rows(results: &[ChunkResult]) -> Vec<Vec<String>> {
        results
            .iter()
            .filter_map(ChunkResult::parsed)
            .flat_map(|p| p.to_strings())
            .collect()
    }

    #[test]
    fn test_header_example() {
        let input = b"name,age,address\njuergen,43,graz\n";
        let (results, summary) = pipeline(25).collect(Cursor::new(input)).unwrap();
        assert_eq!(
            rows(&results),
            vec![vec!["name", "age", "address"], vec!["juergen", "43", "graz"]]
        );
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.bytes, input.len() as u64);
    }

    #[test]
    fn test_sequences_and_offsets() {
        let input = b"a\nb\nc\nd\n";
        let (results, _) = pipeline(2).collect(Cursor::new(input)).unwrap();
        let provenance: Vec<(u64, u64)> = results.iter().map(|r| (r.sequence, r.offset)).collect();
        assert_eq!(provenance, vec![(0, 0), (1, 2), (2, 4), (3, 6)]);
    }

    #[test]
    fn test_empty_input() {
        let (results, summary) = pipeline(8).collect(Cursor::new(b"")).unwrap();
        assert!(results.is_empty());
        assert_eq!(summary, RunSummary::default());
    }

    #[test]
    fn test_unterminated_tail_is_final_chunk() {
        let (results, _) = pipeline(4).collect(Cursor::new(b"a,b\nc,d")).unwrap();
        assert_eq!(rows(&results), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_strategy_does_not_change_pipeline_output() {
        let input = b"x,\"y\ny\"\nz,w\n";
        let mut outputs = Vec::new();
        for strategy in [ParseStrategy::SplitThenTokenize, ParseStrategy::LeftoverCombine] {
            let p = ChunkPipeline::new(
                PipelineConfig::default()
                    .with_chunk_size(3)
                    .with_strategy(strategy),
            )
            .unwrap();
            outputs.push(rows(&p.collect(Cursor::new(input)).unwrap().0));
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn test_cancelled_token_needs_replacing() {
        let p = pipeline(4);
        p.cancel_token().cancel();
        let err = p.collect(Cursor::new(b"a\nb\n")).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));

        let p = p.with_cancel_token(CancelToken::new());
        let (results, _) = p.collect(Cursor::new(b"a\nb\n")).unwrap();
        assert_eq!(rows(&results), vec![vec!["a"], vec!["b"]]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_max_concurrency(0);
        assert!(ChunkPipeline::new(config).is_err());
    }
}
