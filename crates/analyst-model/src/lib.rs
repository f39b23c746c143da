mod anthropic;
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;

use analyst_config::ModelConfig;

/// Resolve the configured API key: explicit value, then the named env var.
fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    match cfg.provider.as_str() {
        "anthropic" => std::env::var("ANTHROPIC_API_KEY").ok(),
        "openai" => std::env::var("OPENAI_API_KEY").ok(),
        _ => None,
    }
}

/// Build a [`ModelProvider`] from configuration. Mirrors the teacher's
/// `from_config` dispatch, trimmed to the drivers this service ships.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    let key = resolve_api_key(cfg);
    match cfg.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicProvider::new(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        "openai" => Ok(Box::new(OpenAiCompatProvider::new(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        "mock" => Ok(Box::new(MockProvider)),
        other => anyhow::bail!("unknown model provider: {other}"),
    }
}
