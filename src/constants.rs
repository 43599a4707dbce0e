/// Ollama API defaults
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
pub const OLLAMA_DOWNLOAD_URL: &str = "https://ollama.ai/download";

pub const TAGS_PATH: &str = "/api/tags";
pub const GENERATE_PATH: &str = "/api/generate";

/// Placeholder offered when the model list cannot be retrieved
pub const FALLBACK_MODEL: &str = "llama2";

/// Stream framing limits
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;
pub const LINE_PREVIEW_CHARS: usize = 120;

/// Timeout defaults (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LIST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
