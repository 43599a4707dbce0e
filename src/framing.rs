use crate::constants::MAX_LINE_LENGTH;
use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("line exceeds {0} bytes and was discarded")]
    LineTooLong(usize),
    #[error("line could not be decoded: {0}")]
    Io(#[from] std::io::Error),
}

/// Splits a byte stream into newline-delimited text lines.
///
/// Bytes are buffered until a full line is available, so a line (or a
/// multi-byte character) split across chunks is reassembled before decoding.
/// Whitespace-only lines are never surfaced.
pub struct LineFramer {
    codec: LinesCodec,
    buffer: BytesMut,
    max_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_length),
            buffer: BytesMut::new(),
            max_length,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> FramedLines<'_> {
        self.buffer.extend_from_slice(chunk);
        FramedLines { framer: self }
    }

    /// Drains whatever partial line remains once the stream has ended.
    pub fn flush(&mut self) -> Option<Result<String, FramingError>> {
        loop {
            match self.codec.decode_eof(&mut self.buffer) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => return None,
                Err(e) => {
                    // the stream is over, drop whatever is left of the rejected tail
                    self.buffer.clear();
                    return Some(Err(self.map_error(e)));
                }
            }
        }
    }

    fn map_error(&self, e: LinesCodecError) -> FramingError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => FramingError::LineTooLong(self.max_length),
            LinesCodecError::Io(io) => FramingError::Io(io),
        }
    }
}

pub struct FramedLines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for FramedLines<'_> {
    type Item = Result<String, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.framer.codec.decode(&mut self.framer.buffer) {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(Ok(line)),
                Ok(None) => return None,
                Err(e) => return Some(Err(self.framer.map_error(e))),
            }
        }
    }
}
