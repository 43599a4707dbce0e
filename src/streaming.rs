use crate::decoder::{AggregatedResponse, GenerationStats, StreamDecoder, StreamRecord};
use crate::framing::{FramingError, LineFramer};
use crate::logging::StreamMetric;
use crate::sink::MessageSink;
use crate::transport::ByteStream;
use crate::types::{MurmurError, Result, Role};
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initial,
    Streaming,
    Finished,
}

/// Outcome of one fully consumed generation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: AggregatedResponse,
    /// False when the server closed the stream without a terminal record.
    pub terminated: bool,
    pub stats: Option<GenerationStats>,
    pub decode_errors: usize,
    pub surplus_lines: usize,
    pub elapsed: Duration,
}

impl Completion {
    pub fn text(&self) -> &str {
        self.response.text()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Longest silence tolerated between two chunks.
    pub idle_timeout: Option<Duration>,
}

pub struct StreamHandler<'a, S: MessageSink> {
    sink: &'a mut S,
    framer: LineFramer,
    decoder: StreamDecoder,
    response: AggregatedResponse,
    metrics: StreamMetric,
    state: StreamState,
    stats: Option<GenerationStats>,
}

impl<'a, S: MessageSink> StreamHandler<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            framer: LineFramer::new(),
            decoder: StreamDecoder::new(),
            response: AggregatedResponse::new(),
            metrics: StreamMetric::new(),
            state: StreamState::Initial,
            stats: None,
        }
    }

    /// Consumes the stream until the terminal record, stream end, a failure,
    /// or cancellation. The stream is dropped on return, which releases the
    /// underlying connection.
    pub async fn consume(
        mut self,
        mut stream: ByteStream,
        options: &StreamOptions,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let start = Instant::now();
        self.state = StreamState::Streaming;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        "[⌨️  -> ⚙️ ] Generation cancelled after {} fragments",
                        self.response.fragment_count()
                    );
                    return Err(MurmurError::Cancelled.into());
                }
                next = read_chunk(&mut stream, options.idle_timeout) => next?,
            };

            let Some(chunk) = chunk else {
                break;
            };
            self.metrics.record_chunk(chunk.len());

            // Lines after the terminal record in the same chunk are counted as surplus.
            let lines: Vec<_> = self.framer.feed(&chunk).collect();
            for line in lines {
                self.handle_line(line)?;
            }

            if self.state == StreamState::Finished {
                break;
            }
        }

        if self.state != StreamState::Finished {
            if let Some(line) = self.framer.flush() {
                self.handle_line(line)?;
            }
        }

        Ok(self.finish(start.elapsed()))
    }

    fn handle_line(&mut self, line: std::result::Result<String, FramingError>) -> Result<()> {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!("[☁️  -> ⚙️ ] Dropping unframeable line: {}", e);
                self.metrics.record_decode_error();
                return Ok(());
            }
        };
        self.metrics.record_line();

        if self.decoder.is_finished() {
            tracing::debug!("[☁️  -> ⚙️ ] Ignoring surplus line after terminal record");
            self.metrics.record_surplus();
            return Ok(());
        }

        match self.decoder.decode(&line) {
            Ok(record) => self.apply_record(record),
            Err(e) => {
                tracing::warn!("[☁️  -> ⚙️ ] Error parsing JSON from stream: {}", e);
                self.metrics.record_decode_error();
                Ok(())
            }
        }
    }

    fn apply_record(&mut self, record: StreamRecord) -> Result<()> {
        if let Some(err) = record.error {
            tracing::error!("[☁️  -> ⚙️ ] Server reported an error mid-stream: {}", err);
            return Err(MurmurError::Server(err).into());
        }

        if let Some(fragment) = record.fragment.as_deref() {
            if !fragment.is_empty() && self.response.push(fragment) {
                self.metrics.record_fragment(fragment);
                self.sink.notify(Role::Assistant, self.response.text(), false);
            }
        }

        if record.done {
            tracing::debug!("[☁️  -> ⚙️ ] Terminal record received");
            self.response.seal();
            self.stats = record.stats;
            self.state = StreamState::Finished;
        }
        Ok(())
    }

    fn finish(mut self, elapsed: Duration) -> Completion {
        let terminated = self.state == StreamState::Finished;
        if !terminated {
            tracing::warn!("[☁️  -> ⚙️ ] Stream closed without a terminal record");
            self.state = StreamState::Finished;
        }
        self.sink.notify(Role::Assistant, self.response.text(), true);
        self.metrics.log_summary(self.stats.as_ref());

        Completion {
            response: self.response,
            terminated,
            stats: self.stats,
            decode_errors: self.metrics.decode_errors,
            surplus_lines: self.metrics.surplus_lines,
            elapsed,
        }
    }
}

async fn read_chunk(stream: &mut ByteStream, idle_timeout: Option<Duration>) -> Result<Option<Bytes>> {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::error!("[☁️  -> ⚙️ ] No data for {:?}, giving up on stream", limit);
                return Err(MurmurError::Stalled(limit).into());
            }
        },
        None => stream.next().await,
    };

    match next {
        Some(Ok(bytes)) => Ok(Some(bytes)),
        Some(Err(e)) => {
            tracing::error!("[☁️  -> ⚙️ ] Stream read failed: {}", e);
            Err(MurmurError::Io(e).into())
        }
        None => Ok(None),
    }
}
