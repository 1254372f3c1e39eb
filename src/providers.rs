use std::sync::Arc;

use llm_provider::{ProviderInitError, TurnProvider};
use llm_provider_gemini::{GeminiProvider, GeminiProviderConfig, GEMINI_PROVIDER_ID};
use llm_provider_mock::{ScriptedProvider, MOCK_PROVIDER_ID};

use crate::config::AppConfig;

pub const DEFAULT_PROVIDER_ID: &str = GEMINI_PROVIDER_ID;

/// Builds the provider named `provider_id` from `config`.
///
/// A missing Gemini API key is not an error here; it surfaces as a
/// configuration error when the first turn starts.
pub fn provider_for_id(
    provider_id: &str,
    config: &AppConfig,
) -> Result<Arc<dyn TurnProvider>, ProviderInitError> {
    match provider_id.trim() {
        GEMINI_PROVIDER_ID => {
            let provider_config = GeminiProviderConfig::new(config.api_key.clone())
                .with_model(config.model.clone())
                .with_timeout(config.timeout)
                .with_safety_threshold(config.safety_threshold.clone());
            Ok(Arc::new(GeminiProvider::new(provider_config)?))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(ScriptedProvider::interviewer())),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {GEMINI_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::FileConfig;

    fn config() -> AppConfig {
        AppConfig::resolve(FileConfig::default(), |_| None, Path::new("/tmp/prepf"), false)
            .expect("default config")
    }

    #[test]
    fn provider_for_id_supports_gemini_and_mock() {
        let gemini = provider_for_id("gemini", &config()).expect("gemini provider should resolve");
        assert_eq!(gemini.profile().provider_id, "gemini");
        assert!(!gemini.credential_configured());

        let mock = provider_for_id("mock", &config()).expect("mock provider should resolve");
        assert_eq!(mock.profile().provider_id, "mock");
    }

    #[test]
    fn provider_for_id_rejects_unknown_provider() {
        let error = match provider_for_id("custom", &config()) {
            Ok(_) => panic!("unknown providers should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains("Unsupported provider 'custom'"));
    }
}
