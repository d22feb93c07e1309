//! LLM provider abstraction.
//!
//! One `complete` contract over a local inference backend (Ollama) and
//! hosted API backends (Gemini, OpenRouter). Which backend answers is a
//! configuration-time decision; the orchestrator never inspects the
//! concrete type.

pub mod gemini;
pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{ProviderBackend, ProviderSettings};
use crate::core::errors::{CoreError, Result};

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;
pub use provider::LlmProvider;
pub use types::CompletionRequest;

/// Build the provider selected by configuration.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>> {
    build_backend(settings.backend, settings)
}

/// Build the configured fallback provider, if any.
pub fn build_fallback_provider(
    settings: &ProviderSettings,
) -> Result<Option<Arc<dyn LlmProvider>>> {
    settings
        .fallback_backend
        .map(|backend| build_backend(backend, settings))
        .transpose()
}

fn build_backend(
    backend: ProviderBackend,
    settings: &ProviderSettings,
) -> Result<Arc<dyn LlmProvider>> {
    let timeout = Duration::from_secs(settings.timeout_secs);

    match backend {
        ProviderBackend::Ollama => Ok(Arc::new(OllamaProvider::new(
            settings.ollama_base_url.clone(),
            settings.ollama_model.clone(),
            timeout,
        ))),
        ProviderBackend::Gemini => {
            let api_key = settings.gemini_api_key.clone().ok_or_else(|| {
                CoreError::Validation("GEMINI_API_KEY required for the gemini backend".into())
            })?;
            Ok(Arc::new(GeminiProvider::new(
                api_key,
                settings.gemini_model.clone(),
                timeout,
            )))
        }
        ProviderBackend::Openrouter => {
            let api_key = settings.openrouter_api_key.clone().ok_or_else(|| {
                CoreError::Validation(
                    "OPENROUTER_API_KEY required for the openrouter backend".into(),
                )
            })?;
            Ok(Arc::new(OpenRouterProvider::new(
                api_key,
                settings.openrouter_model.clone(),
                timeout,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderSettings;

    #[test]
    fn selection_is_configuration_driven() {
        let mut settings = ProviderSettings::default();
        assert_eq!(build_provider(&settings).unwrap().name(), "ollama");

        settings.backend = ProviderBackend::Gemini;
        assert!(build_provider(&settings).is_err());

        settings.gemini_api_key = Some("key".into());
        assert_eq!(build_provider(&settings).unwrap().name(), "gemini");
    }

    #[test]
    fn fallback_is_optional() {
        let mut settings = ProviderSettings::default();
        assert!(build_fallback_provider(&settings).unwrap().is_none());

        settings.fallback_backend = Some(ProviderBackend::Openrouter);
        settings.openrouter_api_key = Some("key".into());
        let fallback = build_fallback_provider(&settings).unwrap().unwrap();
        assert_eq!(fallback.name(), "openrouter");
    }
}
