//! Model provider implementations for Infrared.
//!
//! All providers implement the `infrared_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use infrared_config::AppConfig;
use infrared_core::error::ProviderError;
use std::sync::Arc;

/// Known base URLs for named providers.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "deepseek" => Some("https://api.deepseek.com"),
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

/// Build the configured provider.
///
/// `api_url` wins over the provider's well-known URL. A missing key is only
/// acceptable for local endpoints.
pub fn build_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn infrared_core::Provider>, ProviderError> {
    let base_url = match (&config.api_url, default_base_url(&config.provider)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "Unknown provider '{}'; set api_url for custom endpoints",
                config.provider
            )));
        }
    };

    let api_key = match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => key.to_string(),
        _ if config.provider == "ollama" => "ollama".to_string(),
        _ => {
            return Err(ProviderError::NotConfigured(
                "No API key. Set INFRARED_API_KEY or DEEPSEEK_API_KEY, or api_key in config.toml"
                    .into(),
            ));
        }
    };

    let provider = OpenAiCompatProvider::new(config.provider.clone(), base_url, api_key)?;
    tracing::info!(provider = %config.provider, url = %provider.base_url(), "Provider configured");
    Ok(Arc::new(provider))
}
