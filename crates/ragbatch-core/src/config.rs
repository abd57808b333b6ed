//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_EMBEDDER__PROVIDER`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::redact::mask_key;

const MIN_KEY_CHARS: usize = 20;

/// Which embedder capability a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Upstage,
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    Ollama,
    Local,
    Fake,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upstage" => Some(Self::Upstage),
            "openai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            "local" | "sentence-transformers" => Some(Self::Local),
            "fake" => Some(Self::Fake),
            _ => None,
        }
    }

    /// Hosted providers need an API key and enforce server-side rate limits.
    pub fn is_hosted(&self) -> bool {
        matches!(self, Self::Upstage | Self::OpenAi)
    }

    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::Upstage => Some("UPSTAGE_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }

    /// Reject hosted keys whose shape cannot be right before any request is sent.
    pub fn check_api_key(&self, key: &str) -> Result<()> {
        static OPENAI: OnceLock<Option<Regex>> = OnceLock::new();
        static UPSTAGE: OnceLock<Option<Regex>> = OnceLock::new();
        let (pattern, expected) = match self {
            Self::OpenAi => (
                OPENAI.get_or_init(|| Regex::new(r"^sk-[A-Za-z0-9_\-]{20,}$").ok()),
                "an 'sk-' prefix followed by letters, digits, '-' or '_'",
            ),
            Self::Upstage => (
                UPSTAGE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]{20,}$").ok()),
                "letters, digits, '-' or '_' only",
            ),
            _ => return Ok(()),
        };
        let key = key.trim();
        if key.chars().count() < MIN_KEY_CHARS {
            return Err(Error::InvalidConfig(format!(
                "{:?} API key {} is too short (need at least {} characters)",
                self,
                mask_key(key),
                MIN_KEY_CHARS
            )));
        }
        match pattern {
            Some(re) if !re.is_match(key) => Err(Error::InvalidConfig(format!(
                "{:?} API key {} is malformed (expected {})",
                self,
                mask_key(key),
                expected
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedderSettings {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the provider profile's per-attempt timeout.
    pub request_timeout_secs: Option<u64>,
    /// Directory holding `tokenizer.json`, `config.json` and weights for the local model.
    pub model_dir: Option<String>,
}

impl EmbedderSettings {
    /// Configured key, else the provider's conventional environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        let configured = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        if let Some(key) = configured {
            return Some(key.to_string());
        }
        self.provider
            .api_key_env()
            .and_then(|var| env::var(var).ok())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Total attempts per batch, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// Runs whose success rate falls below this are reported as failed.
    pub failure_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1000, max_jitter_ms: 100, failure_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub embedder: EmbedderSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_attempts == 0 {
            return Err(Error::InvalidConfig("pipeline.max_attempts must be at least 1".to_string()));
        }
        let t = self.pipeline.failure_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::InvalidConfig(format!("pipeline.failure_threshold must be within [0, 1], got {}", t)));
        }
        if self.embedder.provider.is_hosted() {
            let Some(key) = self.embedder.resolve_api_key() else {
                let var = self.embedder.provider.api_key_env().unwrap_or("embedder.api_key");
                return Err(Error::InvalidConfig(format!(
                    "provider {:?} needs an API key (set embedder.api_key or {})",
                    self.embedder.provider, var
                )));
            };
            self.embedder.provider.check_api_key(&key)?;
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self::from_figment(figment, env_name))
    }

    pub fn from_figment(figment: Figment, env_name: &str) -> Self {
        Self { figment, env_name: env_name.to_string() }
    }

    /// Merge one value on top of every other layer, e.g. a command-line flag.
    pub fn with_override<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.figment = self.figment.merge(Serialized::default(key, value));
        self
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Setting { key: key.to_string(), source: Box::new(e) })
    }

    /// Typed settings, validated for the active environment.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Setting { key: "<root>".to_string(), source: Box::new(e) })?;
        settings.validate()?;
        self.validate_for_env(&settings)?;
        Ok(settings)
    }

    fn validate_for_env(&self, settings: &Settings) -> Result<()> {
        match self.env_name.as_str() {
            "prod" | "production" if settings.embedder.provider == ProviderKind::Fake => {
                Err(Error::InvalidConfig("the fake embedder cannot be used in production".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
