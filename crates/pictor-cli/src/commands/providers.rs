use anyhow::{Context, Result};
use pictor_gen::providers::available_providers;
use pictor_gen::PictorConfig;

pub fn run() -> Result<()> {
    let config = PictorConfig::load().context("failed to load configuration")?;

    println!("Providers:");
    for line in describe(&config) {
        println!("  {}", line);
    }
    Ok(())
}

fn describe(config: &PictorConfig) -> Vec<String> {
    available_providers()
        .into_iter()
        .map(|name| {
            let key = if config.api_key(name).is_some() {
                "key configured"
            } else {
                "no key"
            };
            let enabled = if config.is_enabled(name) { "" } else { ", disabled" };
            let default = if config.default_provider() == name {
                " (default)"
            } else {
                ""
            };
            format!("{}{} [{}{}]", name, default, key, enabled)
        })
        .collect()
}
