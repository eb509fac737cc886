pub mod fetch;
pub mod generate;
pub mod job;
pub mod providers;

use anyhow::{bail, Context, Result};
use clap::Args;
use pictor_gen::providers::create_provider;
use pictor_gen::{
    AsyncJobClient, GenerationRequest, ImageProvider, ImageSize, PictorConfig, PollPolicy,
};
use std::path::PathBuf;
use std::time::Duration;

/// Prompt text and image parameters
#[derive(Args, Debug, Clone, Default)]
pub struct PromptOpts {
    /// Text prompt
    #[arg(long, short, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the prompt from a file instead
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Image size as WIDTH*HEIGHT or WIDTHxHEIGHT
    #[arg(long)]
    pub size: Option<String>,

    /// Negative prompt, merged after [generation].negative_prompt
    #[arg(long, visible_alias = "style")]
    pub negative: Option<String>,

    /// Number of images to request
    #[arg(long, short = 'n')]
    pub count: Option<u32>,
}

/// Provider selection and credential overrides shared by every networked command
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderOpts {
    /// Provider to use (dashscope, zhipu); defaults to [generation].provider
    #[arg(long)]
    pub provider: Option<String>,

    /// API key (overrides environment and config files)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Submission endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Task status endpoint URL
    #[arg(long)]
    pub task_endpoint: Option<String>,

    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,
}

/// Poll schedule overrides
#[derive(Args, Debug, Clone, Default)]
pub struct PollOpts {
    /// Maximum number of status checks
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds to wait before each status check
    #[arg(long)]
    pub interval: Option<u64>,
}

impl PromptOpts {
    /// Build a validated request, falling back to the [generation] defaults
    pub fn request(&self, config: &PictorConfig) -> Result<GenerationRequest> {
        let prompt = match (&self.prompt, &self.prompt_file) {
            (Some(prompt), None) => prompt.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read prompt file {}", path.display()))?,
            _ => bail!("exactly one of --prompt or --prompt-file is required"),
        };

        let size: ImageSize = self
            .size
            .as_deref()
            .unwrap_or(config.generation.size.as_str())
            .parse()?;
        let count = self.count.unwrap_or(config.generation.count);

        let mut request = GenerationRequest::new(prompt.trim())?
            .with_size(size)
            .with_count(count);
        if let Some(negative) = &self.negative {
            request = request.with_negative_prompt(negative.as_str());
        }
        let request = request.merge_negative_prompt(config.default_negative_prompt());
        request.validate()?;
        Ok(request)
    }
}

impl ProviderOpts {
    /// Load layered config and apply CLI overrides to the selected provider.
    /// Returns the config together with the resolved provider name.
    pub fn resolve(&self, fallback_provider: Option<&str>) -> Result<(PictorConfig, String)> {
        let mut config = PictorConfig::load().context("failed to load configuration")?;
        let name = self
            .provider
            .clone()
            .or_else(|| fallback_provider.map(str::to_string))
            .unwrap_or_else(|| config.default_provider().to_string());
        self.apply(&mut config, &name);
        Ok((config, name))
    }

    fn apply(&self, config: &mut PictorConfig, provider_name: &str) {
        let section = config.provider_mut(provider_name);
        if let Some(key) = &self.api_key {
            section.api_key = Some(key.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            section.endpoint = Some(endpoint.clone());
        }
        if let Some(task_endpoint) = &self.task_endpoint {
            section.task_endpoint = Some(task_endpoint.clone());
        }
        if let Some(model) = &self.model {
            section.model = Some(model.clone());
        }
    }
}

impl PollOpts {
    /// CLI flags over config over the provider's own cadence
    pub fn policy(&self, config: &PictorConfig, provider: &dyn ImageProvider) -> PollPolicy {
        let base = config.poll_policy(provider.default_poll_policy());
        PollPolicy::new(
            self.max_attempts.unwrap_or(base.max_attempts),
            self.interval.map(Duration::from_secs).unwrap_or(base.interval),
        )
    }
}

/// HTTP client for the named provider with the resolved poll policy
pub fn connect(config: &PictorConfig, provider_name: &str, poll: &PollOpts) -> Result<AsyncJobClient> {
    let provider = create_provider(provider_name, config)?;
    let policy = poll.policy(config, provider.as_ref());
    Ok(AsyncJobClient::new(provider).with_policy(policy))
}
