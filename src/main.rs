#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]
use murmur::logging::{init_logging, setup_panic_hook};
use murmur::sink::ConsoleSink;
use murmur::*;

use clap::Parser;
use colored::Colorize;
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

type Session = ChatSession<HttpTransport, ConsoleSink<std::io::Stdout>, ModelCatalog>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplInput {
    Prompt(String),
    Models,
    Model(Option<String>),
    Status,
    Reconnect,
    Help,
    Quit,
    Unknown(String),
}

impl ReplInput {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return ReplInput::Prompt(trimmed.to_string());
        };

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

        match name {
            "models" => ReplInput::Models,
            "model" => ReplInput::Model(rest.map(str::to_string)),
            "status" => ReplInput::Status,
            "reconnect" => ReplInput::Reconnect,
            "help" | "?" => ReplInput::Help,
            "quit" | "exit" | "q" => ReplInput::Quit,
            other => ReplInput::Unknown(other.to_string()),
        }
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  /models          list installed models");
    println!("  /model [name]    show or switch the active model");
    println!("  /status          show connection state");
    println!("  /reconnect       re-run the connection check");
    println!("  /help            show this help");
    println!("  /quit            leave (Ctrl+C or Ctrl+D at the prompt works too)");
    println!("Anything else is sent as a prompt. Ctrl+C stops a running generation.");
}

fn print_status(session: &Session) {
    let ui = session.state().snapshot();
    let status = match ui.connection {
        ConnectionState::Connected => ui.status_text().green(),
        ConnectionState::Connecting => ui.status_text().yellow(),
        ConnectionState::Disconnected => ui.status_text().red(),
    };
    println!(
        "{} | model: {} | {}",
        status,
        session.selected_model().bold(),
        ui.send_label()
    );
}

fn describe_model(model: &murmur::types::ModelDescriptor) -> String {
    let mut line = model.name.clone();
    if let Some(size) = model.size {
        line.push_str(&format!("  {:.1} GB", size as f64 / 1_000_000_000.0));
    }
    if let Some(details) = &model.details {
        if let Some(params) = &details.parameter_size {
            line.push_str(&format!("  {}", params));
        }
        if let Some(quant) = &details.quantization_level {
            line.push_str(&format!("  {}", quant));
        }
    }
    if let Some(modified) = model.modified_at.as_deref() {
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(modified) {
            line.push_str(&format!("  modified {}", ts.format("%Y-%m-%d %H:%M")));
        }
    }
    line
}

fn print_models(session: &Session) {
    let selected = session.selected_model();
    for model in session.directory().models() {
        let marker = if model.name == selected { "*" } else { " " };
        println!("{} {}", marker.green().bold(), describe_model(model));
    }
}

/// Cancels `token` on the first Ctrl+C. Abort the handle once the generation ends.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("[⌨️  -> ⚙️ ] Ctrl+C received, cancelling generation");
            token.cancel();
        }
    })
}

async fn send_prompt(session: &mut Session, prompt: &str) -> bool {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let result = session.send_selected_with_cancel(prompt, cancel).await;
    watcher.abort();

    match result {
        Ok(completion) => {
            if let Some(tps) = completion.stats.as_ref().and_then(|s| s.tokens_per_second()) {
                println!("{}", format!("({:.1} tok/s)", tps).dimmed());
            }
            true
        }
        Err(_) => false,
    }
}

#[derive(Debug)]
enum ReadOutcome {
    Line(String),
    Eof,
    /// Ctrl+C at the idle prompt.
    Interrupted,
    Failed(std::io::Error),
}

/// Waits for the next input line or an interrupt, whichever comes first.
/// Reading a line is cancel-safe, so losing the race drops nothing.
async fn read_input<S, F>(lines: &mut S, interrupt: F) -> ReadOutcome
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
    F: Future<Output = std::io::Result<()>>,
{
    let next = tokio::select! {
        biased;
        next = lines.next() => next,
        signal = interrupt => match signal {
            Ok(()) => return ReadOutcome::Interrupted,
            Err(e) => {
                tracing::warn!("Ctrl+C handler unavailable: {}", e);
                lines.next().await
            }
        },
    };

    match next {
        Some(Ok(line)) => ReadOutcome::Line(line),
        Some(Err(e)) => ReadOutcome::Failed(e),
        None => ReadOutcome::Eof,
    }
}

async fn run_models(mut session: Session) -> i32 {
    match session.transport().list_models().await {
        Ok(models) if models.is_empty() => {
            println!("No models installed. Run \"ollama pull <model>\" to install one.");
            0
        }
        Ok(models) => {
            session.directory_mut().populate(&models);
            print_models(&session);
            0
        }
        Err(e) => {
            tracing::error!("Failed to list models: {}", e);
            session
                .sink_mut()
                .error(&murmur::report::disconnected_notice());
            1
        }
    }
}

async fn run_ask(mut session: Session, prompt: &str) -> i32 {
    if !session.initialize().await.is_connected() {
        return 1;
    }
    if send_prompt(&mut session, prompt).await {
        0
    } else {
        1
    }
}

async fn run_repl(mut session: Session) -> i32 {
    println!("{}", "murmur: chat with a local Ollama model".bold());
    println!("Type /help for commands.");

    session.initialize().await;
    print_status(&session);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());

    loop {
        print!("{} ", ">".cyan().bold());
        let _ = std::io::stdout().flush();

        let line = match read_input(&mut lines, tokio::signal::ctrl_c()).await {
            ReadOutcome::Line(line) => line,
            ReadOutcome::Failed(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                eprintln!("Failed to read input: {}", e);
                return 1;
            }
            ReadOutcome::Eof | ReadOutcome::Interrupted => {
                println!();
                break;
            }
        };

        match ReplInput::parse(&line) {
            ReplInput::Prompt(prompt) => {
                send_prompt(&mut session, &prompt).await;
            }
            ReplInput::Models => print_models(&session),
            ReplInput::Model(None) => println!("Active model: {}", session.selected_model().bold()),
            ReplInput::Model(Some(name)) => {
                if session.directory_mut().select(&name) {
                    println!("Switched to {}", name.bold());
                } else {
                    println!(
                        "{}",
                        format!("Model \"{}\" is not in the list. Try /models.", name).yellow()
                    );
                }
            }
            ReplInput::Status => print_status(&session),
            ReplInput::Reconnect => {
                session.initialize().await;
                print_status(&session);
            }
            ReplInput::Help => print_help(),
            ReplInput::Quit => break,
            ReplInput::Unknown(name) => {
                println!("{}", format!("Unknown command /{}. Try /help.", name).yellow())
            }
        }
    }

    0
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_guard = match init_logging(&args.logging_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize global panic hook
    setup_panic_hook();

    let transport = match HttpTransport::new(&args.transport_config()) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let session = ChatSession::new(
        transport,
        ConsoleSink::stdout(),
        ModelCatalog::new(args.model.clone()),
        args.session_config(),
    );

    let code = match args.command() {
        Command::Models => run_models(session).await,
        Command::Ask { prompt } => run_ask(session, &prompt).await,
        Command::Chat => run_repl(session).await,
    };

    // flush buffered log lines before exiting
    drop(log_guard);
    if code != 0 {
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_prompt() {
        assert_eq!(
            ReplInput::parse("  why is the sky blue?  "),
            ReplInput::Prompt("why is the sky blue?".into())
        );
        assert_eq!(ReplInput::parse(""), ReplInput::Prompt(String::new()));
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(ReplInput::parse("/models"), ReplInput::Models);
        assert_eq!(ReplInput::parse("/model"), ReplInput::Model(None));
        assert_eq!(
            ReplInput::parse("/model  mistral:7b "),
            ReplInput::Model(Some("mistral:7b".into()))
        );
        assert_eq!(ReplInput::parse("/q"), ReplInput::Quit);
        assert_eq!(ReplInput::parse("/nope"), ReplInput::Unknown("nope".into()));
    }

    #[tokio::test]
    async fn interrupt_at_idle_prompt_ends_input() {
        let mut lines = futures_util::stream::pending::<std::io::Result<String>>();
        let outcome = read_input(&mut lines, std::future::ready(Ok(()))).await;
        assert!(matches!(outcome, ReadOutcome::Interrupted));
    }

    #[tokio::test]
    async fn ready_line_wins_over_pending_interrupt() {
        let mut lines = futures_util::stream::iter(vec![Ok("hello".to_string())]);
        let outcome = read_input(&mut lines, std::future::pending()).await;
        match outcome {
            ReadOutcome::Line(line) => assert_eq!(line, "hello"),
            other => panic!("Expected a line, got {:?}", other),
        }
        let outcome = read_input(&mut lines, std::future::pending()).await;
        assert!(matches!(outcome, ReadOutcome::Eof));
    }

    #[tokio::test]
    async fn missing_signal_handler_falls_back_to_input() {
        let mut lines = futures_util::stream::iter(vec![Ok("/quit".to_string())]);
        let broken = std::future::ready(Err(std::io::Error::other("no signal driver")));
        match read_input(&mut lines, broken).await {
            ReadOutcome::Line(line) => assert_eq!(line, "/quit"),
            other => panic!("Expected a line, got {:?}", other),
        }
    }

    #[test]
    fn model_line_shows_size_and_date() {
        let mut model = murmur::types::ModelDescriptor::named("llama2:7b");
        model.size = Some(3_800_000_000);
        model.modified_at = Some("2024-01-15T10:30:00.123456789-05:00".into());
        let line = describe_model(&model);
        assert!(line.starts_with("llama2:7b"));
        assert!(line.contains("3.8 GB"));
        assert!(line.contains("2024-01-15 10:30"));
    }
}
