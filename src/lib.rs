#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod config;
pub mod constants;
pub mod decoder;
pub mod directory;
pub mod framing;
pub mod logging;
pub mod report;
pub mod session;
pub mod sink;
pub mod state;
pub mod streaming;
pub mod transport;
pub mod types;

pub use types::*;

pub use config::{Args, Command};
pub use directory::{ModelCatalog, ModelDirectory};
pub use session::{ChatSession, ConnectionOutcome, SessionConfig};
pub use sink::{ConsoleSink, MessageSink, RecordingSink};
pub use state::{ConnectionState, GenerationState, StateMachine, UiState};
pub use transport::{HttpTransport, Transport, TransportConfig};
