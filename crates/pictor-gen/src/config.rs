//! Layered configuration system
//!
//! Config is loaded with three layers of precedence (highest wins):
//! 1. Environment variables: `DASHSCOPE_API_KEY`, `DASHSCOPE_T2I_ENDPOINT`, ...
//! 2. Project-local: `.pictor/config.toml`
//! 3. Global: `~/.pictor/config.toml`
//!
//! There is no built-in API key. A provider without one fails to construct.

use pictor_core::{PictorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::PollPolicy;

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub task_endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Unset means enabled
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Merged into every request's negative prompt
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            size: default_size(),
            count: default_count(),
            negative_prompt: None,
        }
    }
}

fn default_provider() -> String {
    "dashscope".to_string()
}
fn default_size() -> String {
    "1024*1024".to_string()
}
fn default_count() -> u32 {
    1
}

/// Poll loop overrides; unset fields fall back to the provider's defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// Top-level config file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PictorConfigFile {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Copy)]
enum ProviderField {
    ApiKey,
    Endpoint,
    TaskEndpoint,
    Model,
}

const ENV_OVERRIDES: &[(&str, &str, ProviderField)] = &[
    ("dashscope", "DASHSCOPE_API_KEY", ProviderField::ApiKey),
    ("dashscope", "DASHSCOPE_T2I_ENDPOINT", ProviderField::Endpoint),
    ("dashscope", "DASHSCOPE_T2I_TASK_ENDPOINT", ProviderField::TaskEndpoint),
    ("dashscope", "DASHSCOPE_T2I_MODEL", ProviderField::Model),
    ("zhipu", "ZHIPU_API_KEY", ProviderField::ApiKey),
    ("zhipu", "ZHIPU_T2I_MODEL", ProviderField::Model),
];

/// Resolved configuration with environment variable overrides applied
#[derive(Debug, Clone, Default)]
pub struct PictorConfig {
    pub providers: HashMap<String, ProviderConfig>,
    pub generation: GenerationConfig,
    pub polling: PollingConfig,
}

impl PictorConfig {
    /// Load config with layered precedence: global < project < env vars
    pub fn load() -> Result<Self> {
        let mut config = PictorConfigFile::default();

        // Layer 1: Global config (~/.pictor/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                Self::merge_into(&mut config, global);
            }
        }

        // Layer 2: Project-local config (.pictor/config.toml)
        let local_path = PathBuf::from(".pictor/config.toml");
        if local_path.exists() {
            let local = Self::load_file(&local_path)?;
            Self::merge_into(&mut config, local);
        }

        // Layer 3: Environment variable overrides
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());

        Ok(Self::from_file(config))
    }

    /// Load config from a specific file path, plus environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(Self::from_file(config))
    }

    pub fn provider(&self, provider_name: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider_name)
    }

    /// Mutable provider section, created on first access (for CLI overrides)
    pub fn provider_mut(&mut self, provider_name: &str) -> &mut ProviderConfig {
        self.providers.entry(provider_name.to_string()).or_default()
    }

    /// Get API key for a provider; blank keys count as missing
    pub fn api_key(&self, provider_name: &str) -> Option<&str> {
        self.provider(provider_name)
            .and_then(|p| p.api_key.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn endpoint(&self, provider_name: &str) -> Option<&str> {
        self.provider(provider_name)
            .and_then(|p| p.endpoint.as_deref())
    }

    pub fn task_endpoint(&self, provider_name: &str) -> Option<&str> {
        self.provider(provider_name)
            .and_then(|p| p.task_endpoint.as_deref())
    }

    pub fn model(&self, provider_name: &str) -> Option<&str> {
        self.provider(provider_name).and_then(|p| p.model.as_deref())
    }

    /// Check if a provider is enabled
    pub fn is_enabled(&self, provider_name: &str) -> bool {
        self.provider(provider_name)
            .and_then(|p| p.enabled)
            .unwrap_or(true)
    }

    pub fn default_provider(&self) -> &str {
        &self.generation.provider
    }

    pub fn default_negative_prompt(&self) -> Option<&str> {
        self.generation.negative_prompt.as_deref()
    }

    /// Apply configured polling overrides on top of a provider default
    pub fn poll_policy(&self, base: PollPolicy) -> PollPolicy {
        PollPolicy {
            max_attempts: self.polling.max_attempts.unwrap_or(base.max_attempts),
            interval: self
                .polling
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(base.interval),
        }
    }

    fn from_file(file: PictorConfigFile) -> Self {
        Self {
            providers: file.providers,
            generation: file.generation,
            polling: file.polling,
        }
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".pictor").join("config.toml"))
    }

    fn load_file(path: &Path) -> Result<PictorConfigFile> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            PictorError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    fn merge_into(base: &mut PictorConfigFile, overlay: PictorConfigFile) {
        for (name, provider) in overlay.providers {
            let entry = base.providers.entry(name).or_default();
            if provider.api_key.is_some() {
                entry.api_key = provider.api_key;
            }
            if provider.endpoint.is_some() {
                entry.endpoint = provider.endpoint;
            }
            if provider.task_endpoint.is_some() {
                entry.task_endpoint = provider.task_endpoint;
            }
            if provider.model.is_some() {
                entry.model = provider.model;
            }
            if provider.enabled.is_some() {
                entry.enabled = provider.enabled;
            }
        }

        if overlay.generation.provider != default_provider() {
            base.generation.provider = overlay.generation.provider;
        }
        if overlay.generation.size != default_size() {
            base.generation.size = overlay.generation.size;
        }
        if overlay.generation.count != default_count() {
            base.generation.count = overlay.generation.count;
        }
        if overlay.generation.negative_prompt.is_some() {
            base.generation.negative_prompt = overlay.generation.negative_prompt;
        }

        if overlay.polling.max_attempts.is_some() {
            base.polling.max_attempts = overlay.polling.max_attempts;
        }
        if overlay.polling.interval_secs.is_some() {
            base.polling.interval_secs = overlay.polling.interval_secs;
        }
    }

    fn apply_env_overrides(config: &mut PictorConfigFile, lookup: impl Fn(&str) -> Option<String>) {
        for (provider, var, field) in ENV_OVERRIDES {
            let Some(value) = lookup(*var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let entry = config.providers.entry(provider.to_string()).or_default();
            match field {
                ProviderField::ApiKey => entry.api_key = Some(value),
                ProviderField::Endpoint => entry.endpoint = Some(value),
                ProviderField::TaskEndpoint => entry.task_endpoint = Some(value),
                ProviderField::Model => entry.model = Some(value),
            }
        }
    }
}
