use reqwest::blocking::Client as HttpClient;
use sequencer_contracts::{EditError, ImagePayload};
use serde_json::{json, Value};

use crate::config::GeminiConfig;
use crate::http::{response_json_or_error, send_error};
use crate::{ImageEditor, SuggestionSource};

pub const SUGGESTION_PROMPT: &str = "Analyze this image and provide creative edit suggestions.
The suggestions should be concise and actionable phrases, like a prompt.
For example: \"Make the sky look like a sunset\", \"Add a curious robot in the corner\", or \"Apply a vintage film effect\".
Provide exactly 3 suggestions for each of the following categories:
1. 'realistic': Subtle, plausible changes that improve the photo's quality or composition.
2. 'fun': Creative and imaginative additions or transformations.
3. 'experimental': Abstract, artistic, or unusual edits.";

/// Client for the `generateContent` endpoint, used both as the edit invoker
/// and as the suggestion model.
pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn generate_content(
        &self,
        context: &str,
        model: &str,
        payload: &Value,
    ) -> Result<Value, EditError> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .map_err(|err| send_error(context, err))?;
        response_json_or_error(context, response)
    }
}

impl ImageEditor for GeminiClient {
    fn apply_edit(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<ImagePayload, EditError> {
        let payload = build_edit_payload(image, instruction);
        let response = self.generate_content("Gemini edit", &self.config.edit_model, &payload)?;
        extract_first_image(&response)
    }
}

impl SuggestionSource for GeminiClient {
    fn suggest(&self, image: &ImagePayload) -> Result<String, EditError> {
        let payload = build_suggestion_payload(image);
        let response =
            self.generate_content("Gemini suggestions", &self.config.suggest_model, &payload)?;
        Ok(extract_text(&response))
    }
}

fn image_part(image: &ImagePayload) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type(),
            "data": image.data(),
        }
    })
}

pub fn build_edit_payload(image: &ImagePayload, instruction: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [image_part(image), { "text": instruction }],
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
        },
    })
}

/// Output schema for suggestions: three required string arrays.
pub fn suggestion_response_schema() -> Value {
    let category = |description: &str| {
        json!({
            "type": "ARRAY",
            "description": description,
            "items": { "type": "STRING" },
        })
    };
    json!({
        "type": "OBJECT",
        "properties": {
            "realistic": category("3 realistic and subtle edit suggestions."),
            "fun": category("3 fun and creative edit suggestions."),
            "experimental": category("3 experimental and unusual edit suggestions."),
        },
        "required": ["realistic", "fun", "experimental"],
    })
}

pub fn build_suggestion_payload(image: &ImagePayload) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [image_part(image), { "text": SUGGESTION_PROMPT }],
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": suggestion_response_schema(),
        },
    })
}

fn first_candidate_parts(response: &Value) -> &[Value] {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Takes the first part with inline image data, in the order the model
/// returned them. Without one, the model's text becomes the error detail.
pub fn extract_first_image(response: &Value) -> Result<ImagePayload, EditError> {
    for part in first_candidate_parts(response) {
        let Some(inline) = part.get("inlineData").or_else(|| part.get("inline_data")) else {
            continue;
        };
        let data = inline.get("data").and_then(Value::as_str).unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or("image/png");
        return Ok(ImagePayload::new(mime_type, data));
    }
    let text = extract_text(response);
    Err(EditError::no_image(Some(&text)))
}

/// Concatenated text parts of the first candidate, trimmed.
pub fn extract_text(response: &Value) -> String {
    first_candidate_parts(response)
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>()
        .trim()
        .to_string()
}
