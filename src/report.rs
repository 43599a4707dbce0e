use crate::constants::{DEFAULT_OLLAMA_PORT, OLLAMA_DOWNLOAD_URL};
use crate::types::{ErrorCategory, MurmurError, ObservedError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref MODEL_NOT_FOUND_REGEX: Regex =
        Regex::new(r#"(?i)model\s+(?:["'`]([^"'`]+)["'`]\s+)?(?:was\s+)?not\s+found"#)
            .expect("Invalid model-not-found regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Human-readable failure, ready for the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorNotice {
    fn new(category: ErrorCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Shown when the startup connection check fails.
pub fn disconnected_notice() -> ErrorNotice {
    ErrorNotice::new(
        ErrorCategory::Connectivity,
        Severity::Error,
        "Error: Cannot connect to Ollama API",
    )
    .with_details(format!(
        "Please check:\n\
         - Is Ollama installed? Download here: {}\n\
         - Is the Ollama service running?\n\
         - Is it running on the default port ({})?",
        OLLAMA_DOWNLOAD_URL, DEFAULT_OLLAMA_PORT
    ))
}

/// Shown when the server answers but lists no installed models.
pub fn no_models_notice(suggested_model: &str) -> ErrorNotice {
    ErrorNotice::new(
        ErrorCategory::Connectivity,
        Severity::Warning,
        "Ollama is running but has no models installed.",
    )
    .with_details(format!(
        "Run \"ollama pull {}\" (or any other model) and reconnect.",
        suggested_model
    ))
}

/// If server error text says a model is missing, returns the model it names
/// (or `requested` when the text names none).
pub fn missing_model(text: &str, requested: &str) -> Option<String> {
    let caps = MODEL_NOT_FOUND_REGEX.captures(text)?;
    match caps.get(1) {
        Some(m) => Some(m.as_str().to_string()),
        None => Some(requested.to_string()),
    }
}

/// Turns server-reported failures that name a missing model into
/// `ModelNotInstalled`; everything else passes through untouched.
pub fn refine(err: ObservedError, requested_model: &str) -> ObservedError {
    let text = match &err.inner {
        MurmurError::Upstream(_, body) => body,
        MurmurError::Server(msg) => msg,
        _ => return err,
    };

    match missing_model(text, requested_model) {
        Some(model) => {
            tracing::debug!("Server error names a missing model: {}", model);
            ObservedError {
                inner: MurmurError::ModelNotInstalled {
                    model,
                    detail: text.clone(),
                },
                span_trace: err.span_trace,
            }
        }
        None => err,
    }
}

pub fn classify(err: &MurmurError, model: &str) -> ErrorNotice {
    let category = err.category();
    match err {
        MurmurError::Validation(msg) => ErrorNotice::new(category, Severity::Warning, msg.clone()),
        MurmurError::Network(_) => {
            ErrorNotice::new(category, Severity::Error, "Network error: Could not connect to Ollama API.")
                .with_details("Make sure Ollama is running and accessible.")
        }
        MurmurError::Io(e) => ErrorNotice::new(
            category,
            Severity::Error,
            "Network error: The connection to Ollama was interrupted.",
        )
        .with_details(format!("The response stream ended unexpectedly ({}).", e)),
        MurmurError::Stalled(after) => ErrorNotice::new(
            category,
            Severity::Error,
            "Network error: Ollama stopped sending data.",
        )
        .with_details(format!("No data arrived for {} seconds.", after.as_secs())),
        MurmurError::Upstream(status, body) => {
            let details = if body.is_empty() {
                "The Ollama server returned an error. Check the server logs for more details."
                    .to_string()
            } else {
                format!(
                    "The Ollama server returned an error: {}. Check the server logs for more details.",
                    body
                )
            };
            ErrorNotice::new(
                category,
                Severity::Error,
                format!("Server error: HTTP error! Status: {}", status.as_u16()),
            )
            .with_details(details)
        }
        MurmurError::Server(msg) => ErrorNotice::new(category, Severity::Error, "Server error.")
            .with_details(format!("Ollama reported: {}", msg)),
        MurmurError::Serialization(e) => ErrorNotice::new(
            category,
            Severity::Error,
            "Server error: Unexpected response from Ollama API.",
        )
        .with_details(e.to_string()),
        MurmurError::Unreachable(reason) => ErrorNotice::new(
            category,
            Severity::Error,
            "Cannot connect to Ollama. Please make sure Ollama is running.",
        )
        .with_details(reason.clone()),
        MurmurError::ModelNotInstalled { model: missing, .. } => {
            let name = if missing.is_empty() { model } else { missing.as_str() };
            ErrorNotice::new(category, Severity::Error, "Model not found error.").with_details(format!(
                "The selected model \"{}\" is not installed. Run \"ollama pull {}\" to install it.",
                name, name
            ))
        }
        MurmurError::Decode(e) => {
            ErrorNotice::new(category, Severity::Warning, "Skipped a malformed response line.")
                .with_details(e.to_string())
        }
        MurmurError::Busy => ErrorNotice::new(
            category,
            Severity::Warning,
            "A response is still being generated. Please wait for it to finish.",
        ),
        MurmurError::Cancelled => ErrorNotice::new(category, Severity::Warning, "Generation cancelled."),
        MurmurError::Config(msg) => ErrorNotice::new(category, Severity::Error, "Configuration error.")
            .with_details(msg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_model_extracts_quoted_name() {
        assert_eq!(
            missing_model(r#"model "codellama:7b" not found, try pulling it first"#, "x").as_deref(),
            Some("codellama:7b")
        );
        assert_eq!(
            missing_model("model 'phi' not found", "x").as_deref(),
            Some("phi")
        );
    }

    #[test]
    fn missing_model_falls_back_to_requested() {
        assert_eq!(missing_model("Model not found", "llama2").as_deref(), Some("llama2"));
        assert!(missing_model("out of memory", "llama2").is_none());
    }

    #[test]
    fn refine_upgrades_upstream_404() {
        let err: ObservedError = MurmurError::Upstream(
            reqwest::StatusCode::NOT_FOUND,
            r#"model "mistral" not found, try pulling it first"#.into(),
        )
        .into();
        let refined = refine(err, "mistral");
        assert_eq!(refined.category(), ErrorCategory::ModelNotInstalled);
        let notice = classify(&refined.inner, "mistral");
        assert_eq!(notice.message, "Model not found error.");
        assert!(notice.details.unwrap_or_default().contains("ollama pull mistral"));
    }

    #[test]
    fn refine_leaves_transport_errors_alone() {
        let err: ObservedError = MurmurError::Stalled(Duration::from_secs(3)).into();
        assert_eq!(refine(err, "m").category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn upstream_notice_keeps_status() {
        let notice = classify(
            &MurmurError::Upstream(reqwest::StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            "m",
        );
        assert_eq!(notice.message, "Server error: HTTP error! Status: 500");
        assert_eq!(notice.severity, Severity::Error);
    }

    #[test]
    fn validation_is_a_warning() {
        let notice = classify(&MurmurError::Validation("Please enter a prompt before sending.".into()), "m");
        assert_eq!(notice.severity, Severity::Warning);
        assert_eq!(notice.category, ErrorCategory::Validation);
    }

    #[test]
    fn no_models_notice_suggests_a_pull() {
        let notice = no_models_notice("llama2");
        assert_eq!(notice.severity, Severity::Warning);
        assert!(notice.details.unwrap_or_default().contains("ollama pull llama2"));
    }

    #[test]
    fn disconnected_notice_mentions_default_port() {
        let notice = disconnected_notice();
        assert!(notice.details.unwrap_or_default().contains("11434"));
    }
}
