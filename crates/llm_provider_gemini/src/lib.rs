//! Gemini-backed implementation of the shared `llm_provider` contract.
//!
//! This adapter translates `gemini_api` stream semantics into the ordered
//! `ProviderEvent` sequence and `ProviderError` taxonomy the chat client
//! expects.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use gemini_api::config::DEFAULT_MODEL_ID;
use gemini_api::{
    Content, FinishReason, GeminiApiClient, GeminiApiConfig, GeminiApiError, GeminiStreamEvent,
    GenerateContentRequest,
};
use llm_provider::{
    CancelSignal, ProviderError, ProviderEvent, ProviderInitError, ProviderProfile, TokenUsage,
    TurnProvider, TurnRequest, WireContent,
};

/// Stable provider identifier used by startup selection.
pub const GEMINI_PROVIDER_ID: &str = "gemini";

/// Runtime configuration for the Gemini provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiProviderConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub safety_threshold: Option<String>,
}

impl GeminiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_url: None,
            timeout: None,
            safety_threshold: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_safety_threshold(mut self, threshold: impl Into<String>) -> Self {
        self.safety_threshold = Some(threshold.into());
        self
    }

    fn into_gemini_api_config(self) -> GeminiApiConfig {
        let mut config = GeminiApiConfig::new(self.api_key).with_model(self.model_id);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        if let Some(threshold) = self.safety_threshold {
            config = config.with_safety_threshold(threshold);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn stream(
        &self,
        request: &GenerateContentRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(GeminiStreamEvent),
    ) -> Result<Option<FinishReason>, GeminiApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: GeminiApiClient,
}

impl StreamClient for DefaultStreamClient {
    fn stream(
        &self,
        request: &GenerateContentRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(GeminiStreamEvent),
    ) -> Result<Option<FinishReason>, GeminiApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                GeminiApiError::Runtime(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .stream_with_handler(request, Some(cancel), |event| on_event(event)),
        )
    }
}

/// `TurnProvider` adapter backed by `gemini_api` transport primitives.
pub struct GeminiProvider {
    model_id: String,
    api_key_configured: bool,
    stream_client: Arc<dyn StreamClient>,
}

impl GeminiProvider {
    /// Creates a provider using real Gemini API transport.
    pub fn new(config: GeminiProviderConfig) -> Result<Self, ProviderInitError> {
        let model_id = config.model_id.clone();
        let api_key_configured = !config.api_key.trim().is_empty();
        let stream_client = Arc::new(DefaultStreamClient {
            client: GeminiApiClient::new(config.into_gemini_api_config())
                .map_err(map_init_error)?,
        });

        Ok(Self {
            model_id,
            api_key_configured,
            stream_client,
        })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(stream_client: Arc<dyn StreamClient>) -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key_configured: true,
            stream_client,
        }
    }
}

impl TurnProvider for GeminiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: GEMINI_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn credential_configured(&self) -> bool {
        self.api_key_configured
    }

    fn stream_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(ProviderEvent),
    ) -> Result<(), ProviderError> {
        if cancel.load(Ordering::Acquire) {
            return Err(ProviderError::Cancelled);
        }

        let request = build_request(&req);
        let mut on_event = |event: GeminiStreamEvent| match event {
            GeminiStreamEvent::TextDelta { text } => {
                if !text.is_empty() {
                    emit(ProviderEvent::Text(text));
                }
            }
            GeminiStreamEvent::Usage(usage) => emit(ProviderEvent::Usage(TokenUsage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ))),
            _ => {}
        };

        let finish = self
            .stream_client
            .stream(&request, &cancel, &mut on_event)
            .map_err(map_stream_error)?;

        match finish {
            Some(reason) if reason.is_success() => Ok(()),
            Some(reason) => Err(ProviderError::Protocol(format!(
                "response ended with finish reason {}",
                reason.as_str()
            ))),
            None => Err(ProviderError::Protocol(
                "stream ended without a finish reason".to_string(),
            )),
        }
    }
}

fn build_request(req: &TurnRequest) -> GenerateContentRequest {
    let contents = req.contents.iter().map(to_content).collect();
    GenerateContentRequest::new(contents).with_system_instruction(req.system_instruction.as_deref())
}

fn to_content(content: &WireContent) -> Content {
    Content::new(content.role.as_str(), content.text.clone())
}

fn map_stream_error(error: GeminiApiError) -> ProviderError {
    match error {
        GeminiApiError::Cancelled => ProviderError::Cancelled,
        GeminiApiError::SafetyBlocked { reason } => ProviderError::SafetyBlocked(reason),
        GeminiApiError::MissingApiKey | GeminiApiError::InvalidHeader(_) => {
            ProviderError::Configuration(error.to_string())
        }
        GeminiApiError::MalformedChunk(_)
        | GeminiApiError::Serde(_)
        | GeminiApiError::InvalidRequestPayload(_) => ProviderError::Protocol(error.to_string()),
        GeminiApiError::Request(_)
        | GeminiApiError::Status(..)
        | GeminiApiError::RetryExhausted { .. }
        | GeminiApiError::StreamFailed { .. }
        | GeminiApiError::Runtime(_) => {
            tracing::warn!(error = %error, "gemini transport failure");
            ProviderError::Transport(format!("Gemini API request failed: {error}"))
        }
    }
}

fn map_init_error(error: GeminiApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize gemini provider: {error}"))
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, MutexGuard};

    use gemini_api::UsageMetadata;
    use pretty_assertions::assert_eq;

    use super::*;

    fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    enum FakeStreamOutcome {
        Success(Vec<GeminiStreamEvent>, Option<FinishReason>),
        Error(GeminiApiError),
    }

    struct FakeStreamClient {
        observed_request: Mutex<Option<GenerateContentRequest>>,
        outcome: Mutex<Option<FakeStreamOutcome>>,
    }

    impl FakeStreamClient {
        fn success(events: Vec<GeminiStreamEvent>, finish: Option<FinishReason>) -> Arc<Self> {
            Arc::new(Self {
                observed_request: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Success(events, finish))),
            })
        }

        fn failure(error: GeminiApiError) -> Arc<Self> {
            Arc::new(Self {
                observed_request: Mutex::new(None),
                outcome: Mutex::new(Some(FakeStreamOutcome::Error(error))),
            })
        }

        fn observed_request(&self) -> Option<GenerateContentRequest> {
            lock_unpoisoned(&self.observed_request).clone()
        }
    }

    impl StreamClient for FakeStreamClient {
        fn stream(
            &self,
            request: &GenerateContentRequest,
            _cancel: &CancelSignal,
            on_event: &mut dyn FnMut(GeminiStreamEvent),
        ) -> Result<Option<FinishReason>, GeminiApiError> {
            *lock_unpoisoned(&self.observed_request) = Some(request.clone());

            match lock_unpoisoned(&self.outcome).take() {
                Some(FakeStreamOutcome::Success(events, finish)) => {
                    for event in events {
                        on_event(event);
                    }
                    Ok(finish)
                }
                Some(FakeStreamOutcome::Error(error)) => Err(error),
                None => panic!("fake stream outcome should be consumed exactly once"),
            }
        }
    }

    fn request() -> TurnRequest {
        TurnRequest {
            turn_id: 9,
            contents: vec![
                WireContent::user("hi"),
                WireContent::model("Tell me about yourself"),
                WireContent::user("I build compilers"),
            ],
            system_instruction: Some("You are an interviewer.".to_string()),
        }
    }

    fn run(provider: &GeminiProvider) -> (Vec<ProviderEvent>, Result<(), ProviderError>) {
        let mut events = Vec::new();
        let result = provider.stream_turn(request(), CancelSignal::default(), &mut |event| {
            events.push(event)
        });
        (events, result)
    }

    #[test]
    fn profile_reports_gemini_provider_id_and_model() {
        let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::success(
            Vec::new(),
            Some(FinishReason::Stop),
        ));

        let profile = provider.profile();
        assert_eq!(profile.provider_id, GEMINI_PROVIDER_ID);
        assert_eq!(profile.model_id, "gemini-2.5-flash");
    }

    #[test]
    fn missing_api_key_reports_unconfigured_credential() {
        let provider = GeminiProvider::new(GeminiProviderConfig::new("   "))
            .expect("provider construction does not require a key");
        assert!(!provider.credential_configured());

        let provider = GeminiProvider::new(GeminiProviderConfig::new("key").with_model("gemini-2.5-pro"))
            .expect("provider");
        assert!(provider.credential_configured());
        assert_eq!(provider.profile().model_id, "gemini-2.5-pro");
    }

    #[test]
    fn stream_maps_wire_roles_and_system_instruction() {
        let stream = FakeStreamClient::success(Vec::new(), Some(FinishReason::Stop));
        let provider =
            GeminiProvider::with_stream_client_for_tests(Arc::clone(&stream) as Arc<dyn StreamClient>);

        let _ = run(&provider);

        let observed = stream.observed_request().expect("request should be observed");
        let roles: Vec<Option<String>> = observed
            .contents
            .iter()
            .map(|content| content.role.clone())
            .collect();
        assert_eq!(
            roles,
            vec![
                Some("user".to_string()),
                Some("model".to_string()),
                Some("user".to_string())
            ]
        );
        assert_eq!(
            observed.system_instruction.map(|content| content.parts[0].text.clone()),
            Some("You are an interviewer.".to_string())
        );
    }

    #[test]
    fn stream_emits_text_and_usage_in_order() {
        let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::success(
            vec![
                GeminiStreamEvent::TextDelta {
                    text: "Hello".to_string(),
                },
                GeminiStreamEvent::TextDelta {
                    text: String::new(),
                },
                GeminiStreamEvent::TextDelta {
                    text: " world".to_string(),
                },
                GeminiStreamEvent::Usage(UsageMetadata {
                    prompt_token_count: 10,
                    candidates_token_count: 2,
                    total_token_count: 12,
                }),
                GeminiStreamEvent::Finished {
                    reason: FinishReason::Stop,
                },
            ],
            Some(FinishReason::Stop),
        ));

        let (events, result) = run(&provider);

        assert_eq!(result, Ok(()));
        assert_eq!(
            events,
            vec![
                ProviderEvent::Text("Hello".to_string()),
                ProviderEvent::Text(" world".to_string()),
                ProviderEvent::Usage(TokenUsage::new(10, 2)),
            ]
        );
    }

    #[test]
    fn missing_or_unusable_finish_reason_is_protocol_error() {
        let provider =
            GeminiProvider::with_stream_client_for_tests(FakeStreamClient::success(Vec::new(), None));
        assert!(matches!(run(&provider).1, Err(ProviderError::Protocol(_))));

        let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::success(
            Vec::new(),
            Some(FinishReason::Recitation),
        ));
        assert!(matches!(
            run(&provider).1,
            Err(ProviderError::Protocol(message)) if message.contains("RECITATION")
        ));
    }

    #[test]
    fn transport_errors_map_to_provider_taxonomy() {
        let cases = vec![
            (GeminiApiError::Cancelled, ProviderError::Cancelled),
            (
                GeminiApiError::SafetyBlocked {
                    reason: "SAFETY".to_string(),
                },
                ProviderError::SafetyBlocked("SAFETY".to_string()),
            ),
        ];
        for (error, expected) in cases {
            let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::failure(error));
            assert_eq!(run(&provider).1, Err(expected));
        }

        let provider =
            GeminiProvider::with_stream_client_for_tests(FakeStreamClient::failure(GeminiApiError::MissingApiKey));
        assert!(matches!(run(&provider).1, Err(ProviderError::Configuration(_))));

        let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::failure(
            GeminiApiError::MalformedChunk("{".to_string()),
        ));
        assert!(matches!(run(&provider).1, Err(ProviderError::Protocol(_))));

        let provider = GeminiProvider::with_stream_client_for_tests(FakeStreamClient::failure(
            GeminiApiError::RetryExhausted {
                status: None,
                last_error: Some("connection reset".to_string()),
            },
        ));
        assert!(matches!(
            run(&provider).1,
            Err(ProviderError::Transport(message)) if message.contains("connection reset")
        ));
    }

    #[test]
    fn pre_cancelled_turn_never_reaches_transport() {
        let stream = FakeStreamClient::success(Vec::new(), Some(FinishReason::Stop));
        let provider =
            GeminiProvider::with_stream_client_for_tests(Arc::clone(&stream) as Arc<dyn StreamClient>);
        let cancel = CancelSignal::default();
        cancel.store(true, Ordering::Release);

        let result = provider.stream_turn(request(), cancel, &mut |_| {});

        assert_eq!(result, Err(ProviderError::Cancelled));
        assert!(stream.observed_request().is_none());
    }
}
