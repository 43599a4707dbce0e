use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_LIST_TIMEOUT_SECS,
    DEFAULT_OLLAMA_HOST, FALLBACK_MODEL,
};
use crate::logging::LoggingConfig;
use crate::session::SessionConfig;
use crate::transport::TransportConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming chat client for a local Ollama server", long_about = None)]
pub struct Args {
    /// Ollama base URL. A bare host:port gets http:// prepended.
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_OLLAMA_HOST)]
    pub host: String,
    /// Preferred model. Kept when the server lists it, otherwise the first listed model wins.
    #[arg(long, env = "MURMUR_MODEL")]
    pub model: Option<String>,
    #[arg(long, default_value = FALLBACK_MODEL)]
    pub fallback_model: String,
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
    #[arg(long, default_value_t = DEFAULT_LIST_TIMEOUT_SECS)]
    pub list_timeout_secs: u64,
    /// 0 disables stall detection.
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout_secs: u64,
    /// Filter used when RUST_LOG is unset.
    #[arg(long, default_value = "murmur=warn")]
    pub log_level: String,
    /// Write logs to a daily-rolling file in this directory instead of stderr.
    #[arg(long, env = "MURMUR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List installed models and exit.
    Models,
    /// Send one prompt, stream the answer and exit.
    Ask { prompt: String },
    /// Interactive session (default).
    Chat,
}

impl Args {
    pub fn command(&self) -> Command {
        match &self.command {
            Some(c) => c.clone(),
            None => Command::Chat,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.host.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            list_timeout: Duration::from_secs(self.list_timeout_secs),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let idle_timeout = match self.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        SessionConfig {
            fallback_model: self.fallback_model.clone(),
            idle_timeout,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            default_filter: self.log_level.clone(),
            log_dir: self.log_dir.clone(),
            json: self.log_json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_subcommand() {
        let args = match Args::try_parse_from(["murmur", "--host", "http://localhost:11434"]) {
            Ok(a) => a,
            Err(e) => panic!("parse failed: {}", e),
        };
        assert_eq!(args.command(), Command::Chat);
        assert_eq!(args.fallback_model, "llama2");

        let session = args.session_config();
        assert_eq!(session.idle_timeout, Some(Duration::from_secs(300)));

        let transport = args.transport_config();
        assert_eq!(transport.connect_timeout, Duration::from_secs(10));
        assert_eq!(transport.list_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_idle_timeout_disables_stall_detection() {
        let args = match Args::try_parse_from([
            "murmur",
            "--host",
            "localhost:11434",
            "--idle-timeout-secs",
            "0",
        ]) {
            Ok(a) => a,
            Err(e) => panic!("parse failed: {}", e),
        };
        assert_eq!(args.session_config().idle_timeout, None);
    }

    #[test]
    fn ask_takes_a_prompt() {
        let args = match Args::try_parse_from([
            "murmur",
            "--host",
            "localhost",
            "--model",
            "mistral",
            "ask",
            "why is the sky blue?",
        ]) {
            Ok(a) => a,
            Err(e) => panic!("parse failed: {}", e),
        };
        assert_eq!(args.model.as_deref(), Some("mistral"));
        assert_eq!(
            args.command(),
            Command::Ask {
                prompt: "why is the sky blue?".into()
            }
        );
    }

    #[test]
    fn log_flags_flow_into_logging_config() {
        let args = match Args::try_parse_from([
            "murmur",
            "--host",
            "localhost",
            "--log-dir",
            "/tmp/murmur-logs",
            "--log-json",
            "--log-level",
            "murmur=debug",
        ]) {
            Ok(a) => a,
            Err(e) => panic!("parse failed: {}", e),
        };
        let logging = args.logging_config();
        assert!(logging.json);
        assert_eq!(logging.default_filter, "murmur=debug");
        assert_eq!(logging.log_dir, Some(PathBuf::from("/tmp/murmur-logs")));
    }
}
