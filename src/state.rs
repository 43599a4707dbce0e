use crate::types::{MurmurError, Result};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Generating,
}

/// Snapshot of both state axes, as read by UI gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiState {
    pub connection: ConnectionState,
    pub generation: GenerationState,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Connecting,
            generation: GenerationState::Idle,
        }
    }
}

impl UiState {
    /// Sending stays enabled while disconnected so the user can retry.
    pub fn send_enabled(&self) -> bool {
        self.generation == GenerationState::Idle && self.connection != ConnectionState::Connecting
    }

    pub fn is_generating(&self) -> bool {
        self.generation == GenerationState::Generating
    }

    pub fn status_text(&self) -> &'static str {
        match self.connection {
            ConnectionState::Connecting => "Connecting to Ollama...",
            ConnectionState::Connected => "Connected to Ollama",
            ConnectionState::Disconnected => "Disconnected from Ollama",
        }
    }

    pub fn send_label(&self) -> &'static str {
        match self.generation {
            GenerationState::Idle => "Send",
            GenerationState::Generating => "Generating...",
        }
    }
}

/// Owner of the connection/generation state. Cloning yields another handle
/// onto the same state; observers follow changes through `subscribe`.
#[derive(Clone)]
pub struct StateMachine {
    tx: Arc<watch::Sender<UiState>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(UiState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> UiState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.tx.subscribe()
    }

    pub fn begin_connecting(&self) {
        self.set_connection(ConnectionState::Connecting);
    }

    pub fn resolve_connection(&self, connected: bool) {
        let next = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.set_connection(next);
    }

    /// Moves the generation axis to `Generating`. The returned guard moves it
    /// back to `Idle` when finished or dropped, whichever comes first.
    pub fn begin_generation(&self) -> Result<GenerationGuard> {
        let accepted = self.tx.send_if_modified(|state| {
            if state.generation == GenerationState::Generating {
                return false;
            }
            state.generation = GenerationState::Generating;
            true
        });

        if !accepted {
            tracing::warn!("Send refused: a generation is already in progress");
            return Err(MurmurError::Busy.into());
        }

        tracing::debug!("Generation state: Idle -> Generating");
        Ok(GenerationGuard {
            tx: Arc::clone(&self.tx),
            released: false,
        })
    }

    fn set_connection(&self, next: ConnectionState) {
        self.tx.send_if_modified(|state| {
            if state.connection == next {
                return false;
            }
            tracing::debug!("Connection state: {:?} -> {:?}", state.connection, next);
            state.connection = next;
            true
        });
    }
}

pub struct GenerationGuard {
    tx: Arc<watch::Sender<UiState>>,
    released: bool,
}

impl GenerationGuard {
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.tx.send_modify(|state| state.generation = GenerationState::Idle);
        tracing::debug!("Generation state: Generating -> Idle");
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCategory;

    #[test]
    fn starts_connecting_with_send_disabled() {
        let sm = StateMachine::new();
        let s = sm.snapshot();
        assert_eq!(s.connection, ConnectionState::Connecting);
        assert_eq!(s.generation, GenerationState::Idle);
        assert!(!s.send_enabled());
        assert_eq!(s.status_text(), "Connecting to Ollama...");
    }

    #[test]
    fn disconnected_still_allows_send() {
        let sm = StateMachine::new();
        sm.resolve_connection(false);
        assert!(sm.snapshot().send_enabled());
        assert_eq!(sm.snapshot().status_text(), "Disconnected from Ollama");
    }

    #[test]
    fn second_generation_is_refused() {
        let sm = StateMachine::new();
        sm.resolve_connection(true);
        let guard = match sm.begin_generation() {
            Ok(g) => g,
            Err(e) => panic!("Expected guard, got {:?}", e),
        };
        let snap = sm.snapshot();
        assert!(snap.is_generating());
        assert!(!snap.send_enabled());
        assert_eq!(snap.send_label(), "Generating...");

        match sm.begin_generation() {
            Err(e) => assert_eq!(e.category(), ErrorCategory::Busy),
            Ok(_) => panic!("Expected Busy"),
        }

        guard.finish();
        assert!(!sm.snapshot().is_generating());
        assert!(sm.begin_generation().is_ok());
    }

    #[test]
    fn dropped_guard_returns_to_idle() {
        let sm = StateMachine::new();
        {
            let _guard = sm.begin_generation().unwrap();
            assert!(sm.snapshot().is_generating());
        }
        assert_eq!(sm.snapshot().generation, GenerationState::Idle);
    }

    #[test]
    fn idle_transition_is_published_once() {
        let sm = StateMachine::new();
        let mut rx = sm.subscribe();
        rx.borrow_and_update();

        let guard = sm.begin_generation().unwrap();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        guard.finish();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().generation, GenerationState::Idle);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn clones_share_state() {
        let sm = StateMachine::new();
        let other = sm.clone();
        other.resolve_connection(true);
        assert_eq!(sm.snapshot().connection, ConnectionState::Connected);
    }
}
