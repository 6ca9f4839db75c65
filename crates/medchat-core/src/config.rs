use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MedchatError, Result};

/// Top-level configuration for the medchat server.
///
/// Loaded from `~/.medchat/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedchatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MedchatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MedchatConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply `MEDCHAT_*` environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary key lookup.
    ///
    /// Recognised keys: `MEDCHAT_API_URL`, `MEDCHAT_API_KEY` (falls back to
    /// `GROQ_API_KEY`), `MEDCHAT_DATABASE`, `MEDCHAT_TERMS_PATH`,
    /// `MEDCHAT_PORT`. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("MEDCHAT_API_URL") {
            self.completion.api_url = url;
        }
        if let Some(key) = get("MEDCHAT_API_KEY").or_else(|| get("GROQ_API_KEY")) {
            self.completion.api_key = key;
        }
        if let Some(db) = get("MEDCHAT_DATABASE") {
            self.storage.database_path = db;
        }
        if let Some(terms) = get("MEDCHAT_TERMS_PATH") {
            self.classifier.terms_path = terms;
        }
        if let Some(port) = get("MEDCHAT_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid MEDCHAT_PORT"),
            }
        }
    }

    /// Reject values that cannot work at all.
    ///
    /// Missing credentials or corpus files are not errors here: those
    /// degrade at runtime instead.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.classifier.threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(MedchatError::Config(format!(
                "classifier.threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.completion.timeout_secs == 0 {
            return Err(MedchatError::Config(
                "completion.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(MedchatError::Config(format!(
                "completion.temperature must be within [0, 2], got {}",
                self.completion.temperature
            )));
        }
        if self.completion.api_url.trim().is_empty() {
            return Err(MedchatError::Config(
                "completion.api_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and logs.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Optional log file written in addition to stderr.
    pub log_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.medchat/data".to_string(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Remote chat-completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Full URL of the OpenAI-compatible `chat/completions` endpoint.
    pub api_url: String,
    /// Bearer credential. Empty means unset; requests will be rejected
    /// upstream and fall back to the apology reply.
    pub api_key: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Replaces the built-in system instruction when set.
    pub system_prompt: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "llama3-70b-8192".to_string(),
            temperature: 0.7,
            timeout_secs: 30,
            system_prompt: None,
        }
    }
}

/// Medical-relevance classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Reference term file, one phrase per line.
    pub terms_path: String,
    /// A message is medical when any similarity is strictly above this.
    pub threshold: f32,
    /// Embedding backend: "onnx" or "mock".
    pub embedding_backend: String,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            terms_path: "resources/medical_terms.txt".to_string(),
            threshold: 0.5,
            embedding_backend: "onnx".to_string(),
            model_dir: "~/.medchat/models/all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Conversation context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum number of prior turns rendered into a prompt.
    pub max_turns: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_turns: 5 }
    }
}

/// Response sanitizer allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// Tag names kept in model output; everything else is stripped.
    pub allowed_tags: Vec<String>,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            allowed_tags: ["p", "ul", "li", "h3", "strong"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// Turn storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "~/.medchat/data/medchat.db".to_string(),
        }
    }
}
