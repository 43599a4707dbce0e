#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use murmur::directory::ModelCatalog;
use murmur::session::{ChatSession, SessionConfig};
use murmur::sink::RecordingSink;
use murmur::transport::{ByteStream, Transport};
use murmur::types::*;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Chunk {
    Data(Vec<u8>),
    Fail(io::ErrorKind),
}

impl Chunk {
    pub fn text(s: &str) -> Self {
        Chunk::Data(s.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    /// Body chunks in order. With `hang` the stream stays open afterwards.
    Stream { chunks: Vec<Chunk>, hang: bool },
    /// Non-2xx answer carrying the server's error text.
    Status(u16, String),
    /// The request never gets a response.
    Pending,
}

impl Reply {
    pub fn chunks(chunks: Vec<Chunk>) -> Self {
        Reply::Stream {
            chunks,
            hang: false,
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Reply::chunks(vec![Chunk::Data(ndjson(lines))])
    }
}

/// Joins records into an NDJSON body with a trailing newline.
pub fn ndjson(lines: &[&str]) -> Vec<u8> {
    let mut body = lines.join("\n");
    body.push('\n');
    body.into_bytes()
}

pub fn fragment(text: &str) -> String {
    serde_json::json!({ "model": "llama2", "response": text, "done": false }).to_string()
}

pub fn done() -> String {
    serde_json::json!({
        "model": "llama2",
        "response": "",
        "done": true,
        "done_reason": "stop",
        "eval_count": 4,
        "eval_duration": 2_000_000_000u64
    })
    .to_string()
}

/// In-memory transport playing back scripted replies.
pub struct ScriptedTransport {
    /// `None` means the server is unreachable.
    models: Mutex<Option<Vec<String>>>,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    list_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(models: Option<&[&str]>) -> Self {
        Self {
            models: Mutex::new(models.map(|m| m.iter().map(|s| s.to_string()).collect())),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(self, reply: Reply) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn push_reply(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_models(&self, models: Option<&[&str]>) {
        *self.models.lock().unwrap() = models.map(|m| m.iter().map(|s| s.to_string()).collect());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let models = self.models.lock().unwrap().clone();
        match models {
            Some(names) => Ok(names.into_iter().map(ModelDescriptor::named).collect()),
            None => Err(MurmurError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
            .into()),
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<ByteStream> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Stream { chunks, hang }) => {
                let items: Vec<std::result::Result<Bytes, io::Error>> = chunks
                    .into_iter()
                    .map(|c| match c {
                        Chunk::Data(bytes) => Ok(Bytes::from(bytes)),
                        Chunk::Fail(kind) => Err(io::Error::new(kind, "scripted failure")),
                    })
                    .collect();
                let body = stream::iter(items);
                if hang {
                    Ok(Box::pin(body.chain(stream::pending())))
                } else {
                    Ok(Box::pin(body))
                }
            }
            Some(Reply::Status(code, body)) => {
                let status = match reqwest::StatusCode::from_u16(code) {
                    Ok(s) => s,
                    Err(_) => reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                };
                Err(MurmurError::Upstream(status, body).into())
            }
            Some(Reply::Pending) => std::future::pending().await,
            None => Err(MurmurError::Upstream(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                "no scripted reply".into(),
            )
            .into()),
        }
    }
}

pub type TestSession = ChatSession<ScriptedTransport, RecordingSink, ModelCatalog>;

pub fn session(transport: ScriptedTransport) -> TestSession {
    session_with(transport, SessionConfig::default())
}

pub fn session_with(transport: ScriptedTransport, config: SessionConfig) -> TestSession {
    ChatSession::new(transport, RecordingSink::new(), ModelCatalog::new(None), config)
}
