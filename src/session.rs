use crate::constants::FALLBACK_MODEL;
use crate::directory::ModelDirectory;
use crate::report::{classify, disconnected_notice, no_models_notice, refine};
use crate::sink::MessageSink;
use crate::state::{ConnectionState, StateMachine};
use crate::streaming::{Completion, StreamHandler, StreamOptions};
use crate::transport::Transport;
use crate::types::{
    ErrorCategory, GenerationRequest, ModelDescriptor, MurmurError, ObservedError, Result, Role,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub fallback_model: String,
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fallback_model: FALLBACK_MODEL.to_string(),
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Connected { models: usize },
    /// The server answered but lists no models.
    NoModels,
    Unreachable(String),
}

impl ConnectionOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionOutcome::Connected { .. })
    }

    fn into_error(self) -> MurmurError {
        match self {
            ConnectionOutcome::Connected { .. } => {
                MurmurError::Config("connection outcome is not a failure".into())
            }
            ConnectionOutcome::NoModels => MurmurError::Unreachable(
                "Ollama is running but has no models installed. Run \"ollama pull <model>\" first."
                    .into(),
            ),
            ConnectionOutcome::Unreachable(reason) => MurmurError::Unreachable(reason),
        }
    }
}

/// Drives one conversation: connection checks, sends, and error reporting.
///
/// Every failure is reported to the sink exactly once, after the generation
/// state is already back to idle, and also returned to the caller.
pub struct ChatSession<T, S, D> {
    transport: T,
    sink: S,
    directory: D,
    state: StateMachine,
    config: SessionConfig,
}

impl<T, S, D> ChatSession<T, S, D>
where
    T: Transport,
    S: MessageSink,
    D: ModelDirectory,
{
    pub fn new(transport: T, sink: S, directory: D, config: SessionConfig) -> Self {
        Self {
            transport,
            sink,
            directory,
            state: StateMachine::new(),
            config,
        }
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    /// Connection check that reports failures: the setup help notice when the
    /// server is unreachable, a pull hint when it lists no models. Used at
    /// startup and for manual reconnects.
    pub async fn initialize(&mut self) -> ConnectionOutcome {
        let outcome = self.check_connection().await;
        match &outcome {
            ConnectionOutcome::Connected { .. } => {}
            ConnectionOutcome::NoModels => {
                self.sink
                    .error(&no_models_notice(&self.config.fallback_model));
            }
            ConnectionOutcome::Unreachable(_) => self.sink.error(&disconnected_notice()),
        }
        outcome
    }

    /// Fetches the model list and resolves the connection axis. On failure or
    /// an empty listing the directory gets the single fallback model.
    pub async fn check_connection(&mut self) -> ConnectionOutcome {
        self.state.begin_connecting();

        let outcome = match self.transport.list_models().await {
            Ok(models) if models.is_empty() => {
                tracing::warn!("No models found in Ollama API response");
                ConnectionOutcome::NoModels
            }
            Ok(models) => {
                tracing::info!("Ollama API connection successful ({} models)", models.len());
                self.directory.populate(&models);
                ConnectionOutcome::Connected {
                    models: models.len(),
                }
            }
            Err(e) => {
                tracing::error!("Error connecting to Ollama API: {}", e);
                ConnectionOutcome::Unreachable(e.to_string())
            }
        };

        if !outcome.is_connected() {
            let fallback = ModelDescriptor::named(self.config.fallback_model.clone());
            self.directory.populate(std::slice::from_ref(&fallback));
        }

        self.state.resolve_connection(outcome.is_connected());
        outcome
    }

    pub fn selected_model(&self) -> String {
        match self.directory.selected_model() {
            Some(name) => name,
            None => self.config.fallback_model.clone(),
        }
    }

    pub async fn send(&mut self, prompt: &str, model: &str) -> Result<Completion> {
        self.send_with_cancel(prompt, model, CancellationToken::new())
            .await
    }

    pub async fn send_with_cancel(
        &mut self,
        prompt: &str,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        self.dispatch(prompt, Some(model), cancel).await
    }

    /// Sends with whatever model the directory has selected once the
    /// connection is resolved, so a reconnect that repopulates the list is
    /// honored.
    pub async fn send_selected(&mut self, prompt: &str) -> Result<Completion> {
        self.send_selected_with_cancel(prompt, CancellationToken::new())
            .await
    }

    pub async fn send_selected_with_cancel(
        &mut self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        self.dispatch(prompt, None, cancel).await
    }

    #[tracing::instrument(
        name = "session.send",
        skip_all,
        fields(
            generation_id = tracing::field::Empty,
            model = tracing::field::Empty,
            outcome = tracing::field::Empty,
        )
    )]
    async fn dispatch(
        &mut self,
        prompt: &str,
        model: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        let span = tracing::Span::current();
        let generation_id = uuid::Uuid::new_v4().to_string();
        span.record("generation_id", generation_id.as_str());

        let result = self.run_send(prompt, model, &cancel).await;

        match result {
            Ok(completion) => {
                span.record("outcome", "ok");
                tracing::info!(
                    "[☁️  -> ⚙️ ] Generation finished in {:?} ({} chars, terminated: {})",
                    completion.elapsed,
                    completion.text().chars().count(),
                    completion.terminated
                );
                Ok(completion)
            }
            Err(e) => {
                let model = self.resolve_model(model);
                let e = refine(e, &model);
                span.record("outcome", tracing::field::debug(e.category()));
                self.report(&e, &model);
                Err(e)
            }
        }
    }

    fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(m) => m.to_string(),
            None => self.selected_model(),
        }
    }

    async fn run_send(
        &mut self,
        prompt: &str,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(MurmurError::Validation("Please enter a prompt before sending.".into()).into());
        }

        if self.state.snapshot().connection != ConnectionState::Connected {
            tracing::info!("Not connected, attempting one reconnect before sending");
            let outcome = self.check_connection().await;
            if !outcome.is_connected() {
                return Err(outcome.into_error().into());
            }
        }

        // Idle again when this guard goes out of scope, on every exit path.
        let guard = self.state.begin_generation()?;

        let model = self.resolve_model(model);
        tracing::Span::current().record("model", model.as_str());
        tracing::info!(
            "[⌨️  -> ⚙️ ] Prompt accepted ({} chars) for {}",
            prompt.chars().count(),
            model
        );
        self.sink.notify(Role::User, prompt, true);

        let request = GenerationRequest::streaming(model, prompt);
        let options = StreamOptions {
            idle_timeout: self.config.idle_timeout,
        };

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ObservedError::from(MurmurError::Cancelled)),
            stream = self.transport.generate(&request) => stream,
        };

        let result = match stream {
            Ok(stream) => {
                StreamHandler::new(&mut self.sink)
                    .consume(stream, &options, cancel)
                    .await
            }
            Err(e) => Err(e),
        };

        guard.finish();
        result
    }

    fn report(&mut self, err: &ObservedError, model: &str) {
        let notice = classify(&err.inner, model);
        match err.category() {
            ErrorCategory::Validation | ErrorCategory::Cancelled => {
                tracing::debug!("Send ended: {}", err)
            }
            _ => tracing::error!("Error generating response: {}", err),
        }
        self.sink.error(&notice);
    }
}
