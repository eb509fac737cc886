//! One-shot generation: submit, wait, download

use anyhow::{bail, Context, Result};
use log::{info, warn};
use pictor_gen::providers::create_provider;
use pictor_gen::providers::dashscope::DashScopeProvider;
use pictor_gen::{
    AsyncJobClient, GenerationRequest, ImageProvider, MockTransport, PictorConfig, Transport,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{PollOpts, PromptOpts, ProviderOpts};

pub struct GenerateArgs {
    pub prompt: PromptOpts,
    pub output_dir: PathBuf,
    pub debug_dir: Option<PathBuf>,
    pub offline: bool,
    pub provider: ProviderOpts,
    pub poll: PollOpts,
}

#[derive(Serialize)]
struct RequestDump<'a> {
    provider: &'a str,
    model: &'a str,
    endpoint: &'a str,
    prompt: &'a str,
    prompt_length: usize,
    parameters: &'a serde_json::Value,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let (config, provider_name) = args.provider.resolve(None)?;
    let request = args.prompt.request(&config)?;

    if args.offline {
        check_offline_provider(&provider_name)?;
        let key = config.api_key("dashscope").unwrap_or("offline").to_string();
        let mut provider = DashScopeProvider::new(key);
        if let Some(model) = config.model("dashscope") {
            provider = provider.with_model(model);
        }
        info!("Offline mode: using the in-process mock task API");
        let client = AsyncJobClient::with_transport(Box::new(provider), MockTransport::new());
        return execute(client, &request, &args, &config);
    }

    let provider = create_provider(&provider_name, &config)?;
    execute(AsyncJobClient::new(provider), &request, &args, &config)
}

/// The offline mock speaks the DashScope dialect only
fn check_offline_provider(provider_name: &str) -> Result<()> {
    if provider_name != "dashscope" {
        bail!(
            "--offline emulates the DashScope task API only; provider '{}' cannot run offline",
            provider_name
        );
    }
    Ok(())
}

fn execute<T: Transport>(
    client: AsyncJobClient<T>,
    request: &GenerationRequest,
    args: &GenerateArgs,
    config: &PictorConfig,
) -> Result<()> {
    let policy = args.poll.policy(config, client.provider());
    let client = client.with_policy(policy);

    if let Some(dir) = &args.debug_dir {
        if let Err(e) = write_debug_dump(client.provider(), request, dir) {
            warn!("Could not write request dump: {}", e);
        }
    }

    let outcome = client
        .generate(request, &args.output_dir)
        .context("image generation failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Write the outgoing submission to `t2i_input_<timestamp>.json`
fn write_debug_dump(
    provider: &dyn ImageProvider,
    request: &GenerationRequest,
    dir: &Path,
) -> Result<PathBuf> {
    let call = provider.build_submission(request);
    let dump = RequestDump {
        provider: provider.name(),
        model: provider.model(),
        endpoint: &call.url,
        prompt: request.prompt(),
        prompt_length: request.prompt_length(),
        parameters: &call.body,
    };

    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S%3f");
    let path = dir.join(format!("t2i_input_{}.json", stamp));
    std::fs::write(&path, serde_json::to_string_pretty(&dump)?)?;
    info!("Request dump written to {}", path.display());
    Ok(path)
}
