//! Provider registry
//!
//! Maps provider names to concrete implementations.

pub mod dashscope;
pub mod zhipu;

use crate::config::PictorConfig;
use crate::provider::ImageProvider;
use pictor_core::{PictorError, Result};

/// Create a provider by name with configuration
pub fn create_provider(name: &str, config: &PictorConfig) -> Result<Box<dyn ImageProvider>> {
    if !config.is_enabled(name) {
        return Err(PictorError::Config(format!(
            "Provider '{}' is disabled in config",
            name
        )));
    }

    match name {
        "dashscope" => Ok(Box::new(dashscope::DashScopeProvider::from_config(config)?)),
        "zhipu" => Ok(Box::new(zhipu::ZhipuProvider::from_config(config)?)),
        _ => Err(PictorError::Config(format!(
            "Unknown provider '{}'. Available: {}",
            name,
            available_providers().join(", ")
        ))),
    }
}

/// List all available provider names
pub fn available_providers() -> Vec<&'static str> {
    vec!["dashscope", "zhipu"]
}
