//! Process configuration. A flat struct of env-backed
//! fields with typed defaults, built with the donor's
//! `std::env::var(...).ok().and_then(...).unwrap_or(default)` chains
//! rather than a settings-framework macro — there's no `pydantic`
//! equivalent in this workspace's dependency stack, and none is
//! introduced here.

use std::path::{Path, PathBuf};
use std::time::Duration;

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|s| s.parse().ok())
}

fn try_load_dotenv_override(path: &Path) -> Result<(), String> {
    dotenvy::from_path_override(path).map(|_| ()).map_err(|e| e.to_string())
}

/// Load `.env` from `MEMORY_DOTENV_PATH` if set, otherwise search the
/// current directory and its ancestors, otherwise fall back to
/// `dotenvy`'s own cwd discovery. Never fatal — a missing or unparsable
/// `.env` just means defaults/real env vars win.
fn load_dotenv_best_effort() {
    if let Some(p) = env_nonempty("MEMORY_DOTENV_PATH") {
        let path = PathBuf::from(p);
        if path.is_file() {
            if let Err(e) = try_load_dotenv_override(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse MEMORY_DOTENV_PATH");
            }
            return;
        }
        tracing::warn!(path = %path.display(), "MEMORY_DOTENV_PATH is set but is not a file");
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors() {
            let candidate = dir.join(".env");
            if candidate.is_file() {
                if let Err(e) = try_load_dotenv_override(&candidate) {
                    tracing::warn!(path = %candidate.display(), error = %e, "failed to parse .env");
                }
                return;
            }
        }
    }

    let _ = dotenvy::dotenv();
}

#[derive(Debug, Clone)]
pub struct Config {
    pub qdrant_host: String,
    pub qdrant_port: u16,
    pub collection_name: String,

    pub ollama_base_url: String,
    pub embed_model: String,
    pub ollama_embed_path: String,

    pub api_host: String,
    pub api_port: u16,
    pub api_auth_token: Option<String>,

    pub max_text_length: usize,
    pub max_batch_size: usize,
    pub health_check_timeout: Duration,
}

impl Config {
    pub fn load() -> Self {
        load_dotenv_best_effort();

        Self {
            qdrant_host: env_nonempty("QDRANT_HOST").unwrap_or_else(|| "localhost".to_string()),
            qdrant_port: env_parsed("QDRANT_PORT").unwrap_or(6333),
            collection_name: env_nonempty("COLLECTION_NAME").unwrap_or_else(|| "memories".to_string()),

            ollama_base_url: env_nonempty("OLLAMA_BASE_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            embed_model: env_nonempty("EMBED_MODEL").unwrap_or_else(|| "nomic-embed-text".to_string()),
            ollama_embed_path: env_nonempty("OLLAMA_EMBED_PATH").unwrap_or_else(|| "/api/embed".to_string()),

            api_host: env_nonempty("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            api_port: env_parsed("API_PORT").unwrap_or(8100),
            api_auth_token: env_nonempty("API_AUTH_TOKEN"),

            max_text_length: env_parsed("MAX_TEXT_LENGTH").unwrap_or(8000),
            max_batch_size: env_parsed("MAX_BATCH_SIZE").unwrap_or(100),
            health_check_timeout: env_parsed::<f64>("HEALTH_CHECK_TIMEOUT_S")
                .map(Duration::from_secs_f64)
                .unwrap_or(Duration::from_secs_f64(5.0)),
        }
    }

    pub fn qdrant_url(&self) -> String {
        format!("http://{}:{}", self.qdrant_host, self.qdrant_port)
    }

    /// The cursor secret (§4.3): the configured auth token when set,
    /// otherwise a random 32-byte hex generated once at startup — cursors
    /// then don't survive a restart with no auth token configured, which
    /// is accepted.
    pub fn cursor_secret(&self) -> Vec<u8> {
        match &self.api_auth_token {
            Some(token) => token.clone().into_bytes(),
            None => {
                let bytes: [u8; 32] = rand::random();
                hex::encode(bytes).into_bytes()
            }
        }
    }
}
