/// Default base URL for Gemini transport requests.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// API version segment appended to the base URL.
pub const API_VERSION: &str = "v1beta";

/// Build the streaming endpoint for `model`.
///
/// Normalization rules:
/// 1) blank base falls back to [`DEFAULT_GEMINI_BASE_URL`]
/// 2) the `/v1beta` segment is appended only when missing
/// 3) a leading `models/` on the model id is dropped
pub fn stream_endpoint(base_url: &str, model: &str) -> String {
    let base = if base_url.trim().is_empty() {
        DEFAULT_GEMINI_BASE_URL
    } else {
        base_url.trim()
    };

    let trimmed = base.trim_end_matches('/');
    let versioned = if trimmed.ends_with(&format!("/{API_VERSION}")) {
        trimmed.to_string()
    } else {
        format!("{trimmed}/{API_VERSION}")
    };

    let model = model.trim();
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!("{versioned}/models/{model}:streamGenerateContent?alt=sse")
}
