use crate::report::{ErrorNotice, Severity};
use crate::types::Role;
use colored::*;
use std::io::Write;

/// Receives transcript updates and categorized notices from a session.
///
/// For the assistant role `text` is the whole response so far, not the
/// latest fragment; `is_final` marks the last update of a message.
pub trait MessageSink {
    fn notify(&mut self, role: Role, text: &str, is_final: bool);

    fn error(&mut self, notice: &ErrorNotice);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Message {
        role: Role,
        text: String,
        is_final: bool,
    },
    Error(ErrorNotice),
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, role: Role) -> Vec<(String, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Message {
                    role: r,
                    text,
                    is_final,
                } if *r == role => Some((text.clone(), *is_final)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&ErrorNotice> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Error(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Last assistant text seen, final or not.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            SinkEvent::Message {
                role: Role::Assistant,
                text,
                ..
            } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl MessageSink for RecordingSink {
    fn notify(&mut self, role: Role, text: &str, is_final: bool) {
        self.events.push(SinkEvent::Message {
            role,
            text: text.to_string(),
            is_final,
        });
    }

    fn error(&mut self, notice: &ErrorNotice) {
        self.events.push(SinkEvent::Error(notice.clone()));
    }
}

/// Renders a transcript to a terminal, printing only the newly grown tail of
/// each assistant update.
pub struct ConsoleSink<W: Write> {
    out: W,
    printed: usize,
    open: bool,
}

impl ConsoleSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_open_message(&mut self) {
        if self.open {
            let _ = writeln!(self.out);
            self.open = false;
            self.printed = 0;
        }
    }
}

impl<W: Write> MessageSink for ConsoleSink<W> {
    fn notify(&mut self, role: Role, text: &str, is_final: bool) {
        match role {
            Role::User => {
                self.end_open_message();
                let _ = writeln!(self.out, "{} {}", "You:".bold().cyan(), text);
            }
            Role::Assistant => {
                if !self.open {
                    let _ = write!(self.out, "{} ", "Assistant:".bold().green());
                    self.open = true;
                    self.printed = 0;
                }
                // text only ever grows, so the unseen part is a suffix
                if let Some(tail) = text.get(self.printed..) {
                    let _ = write!(self.out, "{}", tail);
                    self.printed = text.len();
                }
                if is_final {
                    self.end_open_message();
                }
            }
        }
        let _ = self.out.flush();
    }

    fn error(&mut self, notice: &ErrorNotice) {
        self.end_open_message();
        let message = match notice.severity {
            Severity::Error => notice.message.red().bold(),
            Severity::Warning => notice.message.yellow().bold(),
            Severity::Info => notice.message.blue(),
        };
        let _ = writeln!(self.out, "{}", message);
        if let Some(details) = &notice.details {
            for line in details.lines() {
                let _ = writeln!(self.out, "  {}", line);
            }
        }
        let _ = self.out.flush();
    }
}
