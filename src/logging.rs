use crate::decoder::GenerationStats;
use crate::types::{MurmurError, Result};
use std::panic;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "murmur.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub log_dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "murmur=warn".to_string(),
            log_dir: None,
            json: false,
        }
    }
}

pub fn build_filter(default_filter: &str) -> EnvFilter {
    match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::new(default_filter),
    }
}

/// Installs the global subscriber. With a log directory, events go to a
/// daily-rolling file instead of stderr; keep the returned guard alive until
/// exit so buffered lines are flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(&config.default_filter);

    let (writer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (non_blocking, Some(guard))
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
            (non_blocking, Some(guard))
        }
    };
    let ansi = config.log_dir.is_none();

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .map_err(|e| MurmurError::Config(format!("Failed to install tracing subscriber: {}", e)))?;

    Ok(guard)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    match payload.downcast_ref::<&str>() {
        Some(s) => *s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => s.as_str(),
            None => "non-string panic payload",
        },
    }
}

/// Routes panics through tracing before the default hook prints them, so a
/// crash mid-generation also lands in the log file.
pub fn setup_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = match info.location() {
            Some(l) => format!("{}:{}", l.file(), l.line()),
            None => "<unknown>".to_string(),
        };
        let thread = std::thread::current();

        error!(
            target: "murmur::panic",
            thread = thread.name().unwrap_or("<unnamed>"),
            location = %location,
            backtrace = %std::backtrace::Backtrace::capture(),
            "murmur panicked: {}",
            panic_message(info.payload())
        );

        previous(info);
    }));
}

/// Per-generation stream counters, summarized once the stream ends.
#[derive(Debug, Default, Clone)]
pub struct StreamMetric {
    pub chunks: usize,
    pub bytes: usize,
    pub lines: usize,
    pub fragments: usize,
    pub text_chars: usize,
    pub decode_errors: usize,
    pub surplus_lines: usize,
}

impl StreamMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_chunk(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len;
    }

    pub fn record_line(&mut self) {
        self.lines += 1;
    }

    pub fn record_fragment(&mut self, fragment: &str) {
        self.fragments += 1;
        self.text_chars += fragment.chars().count();
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub fn record_surplus(&mut self) {
        self.surplus_lines += 1;
    }

    pub fn log_summary(&self, stats: Option<&GenerationStats>) {
        let tokens = match stats.and_then(|s| s.eval_count) {
            Some(count) => match stats.and_then(|s| s.tokens_per_second()) {
                Some(tps) => format!("{} ({:.1} tok/s)", count, tps),
                None => count.to_string(),
            },
            None => "unavailable".to_string(),
        };

        info!(
            target: "flight_recorder",
            "[STREAM END] Chunks: {} ({} bytes) | Lines: {} | Fragments: {} | Text: {} chars | Decode errors: {} | Surplus: {} | Tokens: {}",
            self.chunks,
            self.bytes,
            self.lines,
            self.fragments,
            self.text_chars,
            self.decode_errors,
            self.surplus_lines,
            tokens
        );
    }
}
