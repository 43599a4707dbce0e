use crate::constants::LINE_PREVIEW_CHARS;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed stream line ({source}): {preview}")]
pub struct DecodeError {
    pub preview: String,
    #[source]
    pub source: serde_json::Error,
}

/// Timing and token counts reported on the terminal record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationStats {
    pub done_reason: Option<String>,
    pub total_duration: Option<Duration>,
    pub load_duration: Option<Duration>,
    pub prompt_eval_count: Option<u64>,
    pub eval_count: Option<u64>,
    pub eval_duration: Option<Duration>,
}

impl GenerationStats {
    pub fn tokens_per_second(&self) -> Option<f64> {
        let count = self.eval_count?;
        let secs = self.eval_duration?.as_secs_f64();
        if secs > 0.0 {
            Some(count as f64 / secs)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRecord {
    pub fragment: Option<String>,
    pub done: bool,
    pub error: Option<String>,
    pub stats: Option<GenerationStats>,
}

// Durations on the wire are nanoseconds.
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    total_duration: Option<u64>,
    #[serde(default)]
    load_duration: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    eval_duration: Option<u64>,
}

impl From<WireRecord> for StreamRecord {
    fn from(wire: WireRecord) -> Self {
        let stats = if wire.done {
            Some(GenerationStats {
                done_reason: wire.done_reason,
                total_duration: wire.total_duration.map(Duration::from_nanos),
                load_duration: wire.load_duration.map(Duration::from_nanos),
                prompt_eval_count: wire.prompt_eval_count,
                eval_count: wire.eval_count,
                eval_duration: wire.eval_duration.map(Duration::from_nanos),
            })
        } else {
            None
        };

        Self {
            fragment: wire.response,
            done: wire.done,
            error: wire.error,
            stats,
        }
    }
}

/// Each line must be a JSON object. A derived struct would also accept an
/// array (fields by position), so the shape is checked before mapping.
pub fn decode_line(line: &str) -> Result<StreamRecord, DecodeError> {
    let fail = |source: serde_json::Error| DecodeError {
        preview: preview(line),
        source,
    };

    let value: serde_json::Value = serde_json::from_str(line.trim()).map_err(fail)?;
    if !value.is_object() {
        return Err(fail(serde::de::Error::custom(
            "stream record is not a JSON object",
        )));
    }

    let wire: WireRecord = serde_json::from_value(value).map_err(fail)?;
    Ok(wire.into())
}

fn preview(line: &str) -> String {
    match line.char_indices().nth(LINE_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

/// Decodes one generation stream and remembers whether its terminal record
/// has been seen.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, line: &str) -> Result<StreamRecord, DecodeError> {
        let record = decode_line(line)?;
        if record.done {
            self.finished = true;
        }
        Ok(record)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Running text of one generation. Sealed once the terminal record arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedResponse {
    text: String,
    fragments: usize,
    sealed: bool,
}

impl AggregatedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and leaves the text untouched) once sealed.
    pub fn push(&mut self, fragment: &str) -> bool {
        if self.sealed {
            return false;
        }
        self.text.push_str(fragment);
        self.fragments += 1;
        true
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }
}
