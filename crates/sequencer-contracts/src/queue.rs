use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::EditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn from_wire(raw: &str) -> Result<Self, EditError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "IN_QUEUE" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(EditError::UnknownQueueStatus(raw.to_string())),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLog {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatusSnapshot {
    pub status: QueueStatus,
    pub logs: Vec<QueueLog>,
}

impl QueueStatusSnapshot {
    /// Reads a `{status, logs?}` status body.
    pub fn from_value(payload: &Value) -> Result<Self, EditError> {
        let raw_status = payload
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = QueueStatus::from_wire(raw_status)?;
        let logs = payload
            .get("logs")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| serde_json::from_value::<QueueLog>(row.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self { status, logs })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueJob {
    pub request_id: String,
    pub status: QueueStatus,
}

/// Body of a queue submission: `{prompt, image_url, ...extra}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueInput {
    pub prompt: String,
    pub image_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueInput {
    pub fn new(prompt: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_url: image_url.into(),
            extra: Map::new(),
        }
    }

    /// Adds a provider option. `prompt` and `image_url` cannot be overridden.
    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        if !matches!(key, "prompt" | "image_url") {
            self.extra.insert(key.to_string(), value);
        }
        self
    }
}

/// One observed poll, handed to the caller's observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUpdate {
    pub request_id: String,
    pub poll: u32,
    pub status: QueueStatus,
    pub logs: Vec<QueueLog>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueResult {
    pub request_id: String,
    pub data: Value,
}

/// Finds the output image URL of a finished job.
///
/// `images[0].url` wins; a top-level `image_url` is the fallback.
pub fn extract_result_url(data: &Value) -> Result<String, EditError> {
    if data
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| status.eq_ignore_ascii_case("FAILED"))
    {
        let request_id = data
            .get("request_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        return Err(EditError::RequestFailed { request_id });
    }

    let from_images = data
        .get("images")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("url"))
        .and_then(Value::as_str);
    let from_field = data.get("image_url").and_then(Value::as_str);

    from_images
        .or(from_field)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(EditError::NoResultUrlFound)
}
