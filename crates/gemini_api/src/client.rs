use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::config::GeminiApiConfig;
use crate::error::{parse_error_message, GeminiApiError};
use crate::events::{FinishReason, GeminiStreamEvent};
use crate::headers::build_headers;
use crate::payload::{safety_settings, GenerateContentRequest, GenerationConfig};
use crate::retry::{is_retryable_http_error, retry_delay_ms, MAX_RETRIES};
use crate::sse::SseStreamParser;
use crate::url::stream_endpoint;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct GeminiApiClient {
    http: Client,
    config: GeminiApiConfig,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<GeminiStreamEvent>,
    pub finish: Option<FinishReason>,
}

impl StreamResult {
    /// Concatenated text of every delta, in arrival order.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                GeminiStreamEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl GeminiApiClient {
    pub fn new(config: GeminiApiConfig) -> Result<Self, GeminiApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(GeminiApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiApiConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        stream_endpoint(&self.config.base_url, &self.config.model)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, GeminiApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| GeminiApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| GeminiApiError::InvalidHeader(format!("invalid value for {key}")))?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<reqwest::RequestBuilder, GeminiApiError> {
        validate_request_payload_shape(request)?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let payload = self.request_with_transport_defaults(request);
        Ok(self.http.post(self.endpoint()).headers(headers).json(&payload))
    }

    /// Fill generation and safety settings the caller left unset.
    pub fn request_with_transport_defaults(
        &self,
        request: &GenerateContentRequest,
    ) -> GenerateContentRequest {
        let mut payload = request.clone();
        if payload.generation_config.is_none() {
            payload.generation_config = Some(GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
            });
        }
        if payload.safety_settings.is_empty() {
            payload.safety_settings = safety_settings(&self.config.safety_threshold);
        }
        payload
    }

    /// Open the stream, retrying transient failures until a body is available.
    pub async fn send_with_retry(
        &self,
        request: &GenerateContentRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, GeminiApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }

            let response = self.build_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(GeminiApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            "retrying gemini request"
                        );
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(GeminiApiError::Status(status, message));
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message);
                    if attempt < MAX_RETRIES {
                        tracing::warn!(attempt = attempt + 1, error = %error, "retrying gemini request");
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(GeminiApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(GeminiApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Stream one request, handing each event to `on_event` as it arrives.
    ///
    /// Returns the finish reason of the candidate, or `None` when the body
    /// ended without one.
    pub async fn stream_with_handler<F>(
        &self,
        request: &GenerateContentRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<Option<FinishReason>, GeminiApiError>
    where
        F: FnMut(GeminiStreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        let mut finish = None;

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }
            let chunk = chunk.map_err(GeminiApiError::from)?;
            for event in parser.feed(&chunk)? {
                process_stream_event(event, &mut finish, &mut on_event)?;
            }
        }

        if is_cancelled(cancellation) {
            return Err(GeminiApiError::Cancelled);
        }

        Ok(finish)
    }

    pub async fn stream(
        &self,
        request: &GenerateContentRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, GeminiApiError> {
        let mut events = Vec::new();
        let finish = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, finish })
    }
}

fn validate_request_payload_shape(request: &GenerateContentRequest) -> Result<(), GeminiApiError> {
    let Some(last) = request.contents.last() else {
        return Err(GeminiApiError::InvalidRequestPayload(
            "'contents' must not be empty".to_owned(),
        ));
    };

    match last.role.as_deref() {
        Some("user") => Ok(()),
        other => Err(GeminiApiError::InvalidRequestPayload(format!(
            "last content must have role 'user', got {}",
            other.unwrap_or("none")
        ))),
    }
}

fn process_stream_event<F>(
    event: GeminiStreamEvent,
    finish: &mut Option<FinishReason>,
    on_event: &mut F,
) -> Result<(), GeminiApiError>
where
    F: FnMut(GeminiStreamEvent),
{
    if let Some(error) = stream_failure_from_event(&event) {
        return Err(error);
    }

    if let GeminiStreamEvent::Finished { reason } = &event {
        *finish = Some(reason.clone());
    }

    on_event(event);
    Ok(())
}

fn stream_failure_from_event(event: &GeminiStreamEvent) -> Option<GeminiApiError> {
    match event {
        GeminiStreamEvent::PromptBlocked { reason } => Some(GeminiApiError::SafetyBlocked {
            reason: reason.clone(),
        }),
        GeminiStreamEvent::Finished { reason } if reason.is_safety() => {
            Some(GeminiApiError::SafetyBlocked {
                reason: reason.as_str().to_owned(),
            })
        }
        GeminiStreamEvent::Error {
            code,
            status,
            message,
        } => Some(GeminiApiError::StreamFailed {
            code: status
                .clone()
                .or_else(|| code.map(|code| code.to_string())),
            message: message
                .clone()
                .unwrap_or_else(|| "Gemini stream reported an error".to_owned()),
        }),
        _ => None,
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, GeminiApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(GeminiApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(GeminiApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{process_stream_event, validate_request_payload_shape};
    use crate::error::GeminiApiError;
    use crate::events::{FinishReason, GeminiStreamEvent};
    use crate::payload::{Content, GenerateContentRequest};
    use crate::sse::SseStreamParser;

    #[test]
    fn process_stream_event_emits_deltas_in_parser_order() {
        let frames = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"A\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"B\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );
        let parsed = SseStreamParser::parse_frames(frames).expect("frames should parse");

        let mut finish = None;
        let mut observed = Vec::new();
        for event in parsed {
            process_stream_event(event, &mut finish, &mut |event| observed.push(event))
                .expect("deltas should process successfully");
        }

        assert_eq!(finish, Some(FinishReason::Stop));
        assert_eq!(
            observed,
            vec![
                GeminiStreamEvent::TextDelta {
                    text: "A".to_string()
                },
                GeminiStreamEvent::TextDelta {
                    text: "B".to_string()
                },
                GeminiStreamEvent::Finished {
                    reason: FinishReason::Stop
                },
            ]
        );
    }

    #[test]
    fn safety_finish_reason_aborts_stream() {
        let mut finish = None;
        let mut observed = Vec::new();
        let error = process_stream_event(
            GeminiStreamEvent::Finished {
                reason: FinishReason::ProhibitedContent,
            },
            &mut finish,
            &mut |event| observed.push(event),
        )
        .expect_err("safety finish should fail");

        assert!(error.is_safety_block());
        assert!(observed.is_empty());
        assert!(finish.is_none());
    }

    #[test]
    fn stream_error_event_maps_to_stream_failed() {
        let error = process_stream_event(
            GeminiStreamEvent::Error {
                code: Some(500),
                status: Some("INTERNAL".to_string()),
                message: Some("boom".to_string()),
            },
            &mut None,
            &mut |_| {},
        )
        .expect_err("error event should fail");

        assert_eq!(error.to_string(), "stream failed (INTERNAL): boom");
    }

    #[test]
    fn preflight_rejects_empty_contents_and_trailing_model_turn() {
        let empty = GenerateContentRequest::new(Vec::new());
        assert!(matches!(
            validate_request_payload_shape(&empty),
            Err(GeminiApiError::InvalidRequestPayload(_))
        ));

        let trailing_model =
            GenerateContentRequest::new(vec![Content::user("q"), Content::model("a")]);
        assert!(matches!(
            validate_request_payload_shape(&trailing_model),
            Err(GeminiApiError::InvalidRequestPayload(_))
        ));

        let valid = GenerateContentRequest::new(vec![Content::user("q")]);
        assert!(validate_request_payload_shape(&valid).is_ok());
    }
}
