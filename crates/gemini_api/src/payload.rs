use serde::{Deserialize, Serialize};

/// Harm categories covered by every request's safety settings.
pub const HARM_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// Request body for `streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            system_instruction: None,
            generation_config: None,
            safety_settings: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: Option<&str>) -> Self {
        self.system_instruction = instruction
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| Content {
                role: None,
                parts: vec![Part::text(text)],
            });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            parts: vec![Part::text(text)],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new("model", text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Map a user-facing threshold label to the API's block threshold.
///
/// Unknown labels fall back to blocking only high-probability harm.
pub fn block_threshold(label: &str) -> &'static str {
    match label.trim().to_ascii_uppercase().as_str() {
        "MEDIUM_AND_ABOVE" => "BLOCK_MEDIUM_AND_ABOVE",
        "LOW_AND_ABOVE" => "BLOCK_LOW_AND_ABOVE",
        "NONE" => "BLOCK_NONE",
        "OFF" => "OFF",
        _ => "BLOCK_ONLY_HIGH",
    }
}

/// One setting per harm category, all at the same threshold.
pub fn safety_settings(label: &str) -> Vec<SafetySetting> {
    let threshold = block_threshold(label);
    HARM_CATEGORIES
        .iter()
        .map(|category| SafetySetting {
            category: (*category).to_owned(),
            threshold: threshold.to_owned(),
        })
        .collect()
}
