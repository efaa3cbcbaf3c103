use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use sequencer_contracts::queue::{QueueInput, QueueStatusSnapshot};
use sequencer_contracts::{EditError, ImagePayload};
use serde_json::Value;

use crate::config::FalConfig;
use crate::http::{response_json_or_error, send_error, truncate_text};
use crate::queue::QueueTransport;

/// HTTP transport for the Fal job queue.
pub struct FalQueueClient {
    config: FalConfig,
    http: HttpClient,
}

impl FalQueueClient {
    pub fn new(config: FalConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Result<Self, EditError> {
        Ok(Self::new(FalConfig::from_env()?))
    }

    fn submit_url(&self, model: &str) -> String {
        format!("{}/{}", self.config.base_url, model.trim().trim_matches('/'))
    }

    fn request_url(&self, model: &str, request_id: &str) -> String {
        format!(
            "{}/{}/requests/{}",
            self.config.base_url,
            queue_family(model),
            request_id
        )
    }

    fn get_json(&self, context: &str, url: &str) -> Result<Value, EditError> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Key {}", self.config.api_key))
            .timeout(self.config.request_timeout)
            .send()
            .map_err(|err| send_error(context, err))?;
        response_json_or_error(context, response)
    }

    /// Downloads a finished artifact. The mime type comes from `Content-Type`.
    pub fn download_image(&self, url: &str) -> Result<ImagePayload, EditError> {
        let context = "Fal image download";
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .map_err(|err| send_error(context, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EditError::transport(
                context,
                Some(status.as_u16()),
                truncate_text(&body, 512),
            ));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().map_err(|err| send_error(context, err))?;
        Ok(ImagePayload::from_bytes(&bytes, mime_type))
    }
}

impl QueueTransport for FalQueueClient {
    fn submit(&self, model: &str, input: &QueueInput) -> Result<String, EditError> {
        let context = "Fal submit";
        let response = self
            .http
            .post(self.submit_url(model))
            .header(AUTHORIZATION, format!("Key {}", self.config.api_key))
            .timeout(self.config.request_timeout)
            .json(input)
            .send()
            .map_err(|err| send_error(context, err))?;
        let payload = response_json_or_error(context, response)?;
        payload
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                EditError::transport(
                    context,
                    None,
                    format!(
                        "response missing request_id: {}",
                        truncate_text(&payload.to_string(), 512)
                    ),
                )
            })
    }

    fn poll(&self, model: &str, request_id: &str) -> Result<QueueStatusSnapshot, EditError> {
        let url = format!("{}/status?logs=1", self.request_url(model, request_id));
        let payload = self.get_json("Fal status", &url)?;
        QueueStatusSnapshot::from_value(&payload)
    }

    fn fetch_result(&self, model: &str, request_id: &str) -> Result<Value, EditError> {
        self.get_json("Fal result", &self.request_url(model, request_id))
    }
}

/// Status and result routes live under the model family, which is the
/// owner plus the base model (`fal-ai/flux-pro/kontext/max` → `fal-ai/flux-pro`).
pub fn queue_family(model: &str) -> String {
    model
        .trim()
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join("/")
}
