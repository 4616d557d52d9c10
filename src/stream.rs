// Streaming transformer
//
// Push-based variant for open-ended input: no file, no worker pool. Each
// arriving chunk is handed to a transform together with the leftover of the
// previous successful step; the leftover is state owned by the transformer
// and only replaced when a transform succeeds.
//
// Single writer: one chunk is processed at a time, in arrival order.

use crossbeam_channel::{Receiver, Sender};
use std::marker::PhantomData;
use tracing::{debug, error, warn};

use crate::config::PipelineConfig;
use crate::error::{ChunkError, ConfigError, StreamError};
use crate::strategy::{ChunkParser, ParsedBatch};

/// Output of a transform that carries unconsumed input forward.
pub trait CarriesLeftover {
    fn leftover(&self) -> &[u8];
}

/// What to do when a transform fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPolicy<T> {
    /// Surface the error downstream and end the stream.
    FailFast,
    /// Drop the chunk and keep going with the pre-failure leftover.
    ///
    /// A failure caused by bytes already in the leftover (say, a malformed
    /// byte in an unterminated record) repeats on every later chunk, so
    /// everything after it is skipped. Use `FailFast` or a transform that
    /// resynchronizes when that matters.
    SkipOnError,
    /// Emit this value instead and keep going with the pre-failure leftover.
    Fallback(T),
}

/// One item delivered downstream.
pub type StreamItem<T, E> = Result<T, StreamError<E>>;

/// Applies `transform(chunk, leftover)` to each arriving chunk.
pub struct StreamingTransformer<F, T, E> {
    transform: F,
    policy: ErrorPolicy<T>,
    leftover: Vec<u8>,
    next_index: u64,
    skipped: u64,
    fallbacks: u64,
    terminated: bool,
    _error: PhantomData<fn() -> E>,
}

impl<F, T, E> StreamingTransformer<F, T, E>
where
    F: FnMut(&[u8], &[u8]) -> Result<T, E>,
    T: CarriesLeftover + Clone,
    E: std::error::Error + 'static,
{
    pub fn new(transform: F, policy: ErrorPolicy<T>) -> Self {
        StreamingTransformer {
            transform,
            policy,
            leftover: Vec::new(),
            next_index: 0,
            skipped: 0,
            fallbacks: 0,
            terminated: false,
            _error: PhantomData,
        }
    }

    /// Process one chunk.
    ///
    /// Returns `None` when the chunk was skipped or the stream has already
    /// ended after a fail-fast error.
    pub fn push(&mut self, chunk: &[u8]) -> Option<StreamItem<T, E>> {
        if self.terminated {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        match (self.transform)(chunk, &self.leftover) {
            Ok(output) => {
                self.leftover.clear();
                self.leftover.extend_from_slice(output.leftover());
                Some(Ok(output))
            }
            Err(source) => match &self.policy {
                ErrorPolicy::FailFast => {
                    error!(index, error = %source, "transform failed, ending stream");
                    self.terminated = true;
                    Some(Err(StreamError::Transform { index, source }))
                }
                ErrorPolicy::SkipOnError => {
                    warn!(index, error = %source, "skipping chunk");
                    self.skipped += 1;
                    None
                }
                ErrorPolicy::Fallback(value) => {
                    warn!(index, error = %source, "substituting fallback for chunk");
                    self.fallbacks += 1;
                    Some(Ok(value.clone()))
                }
            },
        }
    }

    /// Bytes carried into the next push.
    pub fn leftover(&self) -> &[u8] {
        &self.leftover
    }

    /// True once a fail-fast error has ended the stream.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Chunks pushed so far, including skipped ones.
    pub fn chunks_seen(&self) -> u64 {
        self.next_index
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// End of input: hand back the final leftover. Nothing is flushed; the
    /// caller decides whether an unterminated tail is a record.
    pub fn finish(self) -> Vec<u8> {
        debug!(
            chunks = self.next_index,
            skipped = self.skipped,
            leftover = self.leftover.len(),
            "stream finished"
        );
        self.leftover
    }

    /// Pull-based adapter over any chunk source.
    pub fn process<I>(self, source: I) -> Transformed<I::IntoIter, F, T, E>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        Transformed {
            source: source.into_iter(),
            inner: self,
        }
    }

    /// Drive the transformer from a channel until the source closes, the
    /// downstream hangs up, or a fail-fast error is delivered. Returns the
    /// final leftover.
    pub fn process_channel(
        mut self,
        source: Receiver<Vec<u8>>,
        downstream: Sender<StreamItem<T, E>>,
    ) -> Vec<u8> {
        for chunk in source.iter() {
            let Some(item) = self.push(&chunk) else {
                continue;
            };
            let failed = item.is_err();
            if downstream.send(item).is_err() {
                debug!("downstream closed, stopping stream");
                break;
            }
            if failed {
                break;
            }
        }
        self.finish()
    }
}

/// Build a CSV streaming transformer from pipeline settings (strategy,
/// dialect, width, leftover ceiling). Fails on an invalid config.
///
/// Decode errors carry the input position of the buffer that failed,
/// counted over the chunks accepted so far.
pub fn csv_transformer(
    config: &PipelineConfig,
    policy: ErrorPolicy<ParsedBatch>,
) -> Result<
    StreamingTransformer<
        impl FnMut(&[u8], &[u8]) -> Result<ParsedBatch, ChunkError>,
        ParsedBatch,
        ChunkError,
    >,
    ConfigError,
> {
    let parser = ChunkParser::new(config)?;
    // Input position of the first leftover byte
    let mut position = 0u64;
    Ok(StreamingTransformer::new(
        move |chunk: &[u8], leftover: &[u8]| {
            let batch = parser.parse_at(chunk, leftover, position)?;
            position += (leftover.len() + chunk.len() - batch.leftover.len()) as u64;
            Ok(batch)
        },
        policy,
    ))
}

/// Iterator returned by [`StreamingTransformer::process`].
pub struct Transformed<I, F, T, E> {
    source: I,
    inner: StreamingTransformer<F, T, E>,
}

impl<I, F, T, E> Transformed<I, F, T, E>
where
    F: FnMut(&[u8], &[u8]) -> Result<T, E>,
    T: CarriesLeftover + Clone,
    E: std::error::Error + 'static,
{
    pub fn leftover(&self) -> &[u8] {
        self.inner.leftover()
    }

    pub fn into_inner(self) -> StreamingTransformer<F, T, E> {
        self.inner
    }
}

impl<I, F, T, E> Iterator for Transformed<I, F, T, E>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
    F: FnMut(&[u8], &[u8]) -> Result<T, E>,
    T: CarriesLeftover + Clone,
    E: std::error::Error + 'static,
{
    type Item = StreamItem<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.inner.is_terminated() {
                return None;
            }
            let chunk = self.source.next()?;
            if let Some(item) = self.inner.push(chunk.as_ref()) {
                return Some(item);
            }
        }
    }
}
