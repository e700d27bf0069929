//! Runtime configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables:
//! - `OLLAMA_HOST`, `OLLAMA_MODEL` for the report model
//! - `OLLAMA_URL`, `OCR_MODEL` for the OCR worker
//! - `PORFIRY_MENTION_PHRASE`, `PORFIRY_LISTEN`, `PORFIRY_STORE`

use crate::error::AssemblyError;
use crate::message::ModelOptions;
use porfiry_refs::MentionSyntax;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PorfiryConfig {
    /// Report model backend
    pub model: ModelConfig,
    /// OCR worker backend
    pub ocr: OcrConfig,
    /// Reference resolution
    pub resolver: ResolverConfig,
    /// Generation post-processing and admission
    pub assembly: AssemblyConfig,
    /// HTTP service
    pub server: ServerConfig,
    /// Report store
    pub store: StoreConfig,
}

impl PorfiryConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` (if any) and apply process environment overrides
    ///
    /// # Errors
    /// - `AssemblyError::Config` if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self, AssemblyError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AssemblyError::Config(format!("failed reading {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse TOML text; missing sections and keys take defaults
    ///
    /// # Errors
    /// - `AssemblyError::Config` on malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, AssemblyError> {
        toml::from_str(text).map_err(|e| AssemblyError::Config(e.to_string()))
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OLLAMA_HOST") {
            self.model.host = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = get("OLLAMA_URL") {
            self.ocr.host = v;
        }
        if let Some(v) = get("OCR_MODEL") {
            self.ocr.model = v;
        }
        if let Some(v) = get("PORFIRY_MENTION_PHRASE") {
            self.resolver.mention_phrase = v;
        }
        if let Some(v) = get("PORFIRY_LISTEN") {
            self.server.listen = v;
        }
        if let Some(v) = get("PORFIRY_STORE") {
            self.store.path = PathBuf::from(v);
        }
    }

    /// Numbered-mention syntax for the configured phrase
    ///
    /// # Errors
    /// - `AssemblyError::Config` for a blank phrase
    pub fn mention_syntax(&self) -> Result<MentionSyntax, AssemblyError> {
        let build = if self.resolver.case_insensitive {
            MentionSyntax::case_insensitive
        } else {
            MentionSyntax::new
        };
        build(&self.resolver.mention_phrase).map_err(|e| AssemblyError::Config(e.to_string()))
    }

    /// Parsed listen address
    ///
    /// # Errors
    /// - `AssemblyError::Config` if `server.listen` is not `host:port`
    pub fn listen_addr(&self) -> Result<SocketAddr, AssemblyError> {
        self.server
            .listen
            .parse()
            .map_err(|e| AssemblyError::Config(format!("server.listen '{}': {e}", self.server.listen)))
    }
}

/// Report model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Ollama base URL
    pub host: String,
    /// Vision model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub num_predict: u32,
    /// Context window
    pub num_ctx: u32,
    /// Bound on a non-streamed call, on opening a stream and on the gap between
    /// streamed chunks
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Sampling options for report generation
    #[must_use]
    pub fn options(&self) -> ModelOptions {
        ModelOptions {
            temperature: Some(self.temperature),
            num_predict: Some(self.num_predict),
            num_ctx: Some(self.num_ctx),
            ..ModelOptions::default()
        }
    }

    /// Timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "gemma3:27b".to_string(),
            temperature: 0.10,
            num_predict: 2048,
            num_ctx: 14096,
            timeout_secs: 180,
        }
    }
}

/// OCR worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Ollama base URL
    pub host: String,
    /// OCR model name
    pub model: String,
    /// Instruction sent with every image
    pub prompt: String,
    /// Context window
    pub num_ctx: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling
    pub top_p: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Repetition penalty
    pub repeat_penalty: f32,
    /// Window for the repetition penalty
    pub repeat_last_n: u32,
    /// Tail-free sampling
    pub tfs_z: f32,
    /// Bound on a non-streamed OCR call and on opening a streamed one
    pub timeout_secs: u64,
    /// Bound on the gap between streamed chunks
    pub stream_idle_timeout_secs: u64,
    /// Bound on fetching a remote image
    pub fetch_timeout_secs: u64,
}

impl OcrConfig {
    /// Sampling options for OCR
    #[must_use]
    pub fn options(&self) -> ModelOptions {
        ModelOptions {
            temperature: Some(self.temperature),
            num_ctx: Some(self.num_ctx),
            top_p: Some(self.top_p),
            top_k: Some(self.top_k),
            repeat_penalty: Some(self.repeat_penalty),
            repeat_last_n: Some(self.repeat_last_n),
            tfs_z: Some(self.tfs_z),
            num_predict: None,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "benhaotang/Nanonets-OCR-s".to_string(),
            prompt: "Extract all text from screenshot, make OCR in markdown".to_string(),
            num_ctx: 8192,
            temperature: 0.1,
            top_p: 0.95,
            top_k: 40,
            repeat_penalty: 1.2,
            repeat_last_n: 256,
            tfs_z: 0.9,
            timeout_secs: 600,
            stream_idle_timeout_secs: 120,
            fetch_timeout_secs: 10,
        }
    }
}

/// Reference resolution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Trigger phrase of numbered mentions (`<phrase> 2: caption`)
    pub mention_phrase: String,
    /// Match the phrase in any letter case
    pub case_insensitive: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mention_phrase: porfiry_refs::scan::DEFAULT_MENTION_PHRASE.to_string(),
            case_insensitive: false,
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Repair stray line breaks before resolving
    pub tidy_linebreaks: bool,
    /// Allow only one generation at a time
    pub single_flight_generation: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            tidy_linebreaks: true,
            single_flight_generation: false,
        }
    }
}

/// HTTP service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to bind
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Report store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON document holding saved reports
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("reports.json"),
        }
    }
}
