use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::queue::{QueueLog, QueueStatus};
use crate::suggestions::Category;

/// Everything a session records in `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        command: String,
        out_dir: String,
    },
    FilesSelected {
        files: Vec<String>,
    },
    SuggestionsReady {
        image: String,
        prompts: usize,
    },
    PreviewSettled {
        category: Category,
        index: usize,
        prompt: String,
        ready: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SuggestionsFailed {
        image: String,
        error: String,
    },
    ImageStarted {
        image: String,
        index: usize,
        total: usize,
    },
    StepStarted {
        image: String,
        step: usize,
        instruction: String,
    },
    ImageFinished {
        image: String,
        output_path: String,
    },
    ImageFailed {
        image: String,
        error: String,
    },
    QueueUpdate {
        request_id: String,
        poll: u32,
        status: QueueStatus,
        logs: Vec<QueueLog>,
    },
    QueueFinished {
        request_id: String,
        image_url: String,
    },
    SessionFinished {
        ok: bool,
    },
}

/// Append-only JSONL writer for session events.
///
/// - default fields are `session_id` and `ts`; the event's own fields
///   (including `type`) are merged after them
/// - one compact JSON object per line
/// - clones share one file lock
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: Option<PathBuf>,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::build(Some(path.into()), session_id.into())
    }

    /// A writer that formats events but never touches the file system.
    pub fn disabled() -> Self {
        Self::build(None, "disabled".to_string())
    }

    fn build(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path,
                session_id,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let mut record = Map::new();
        record.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        record.insert("ts".to_string(), Value::String(now_utc_iso()));
        if let Value::Object(fields) = serde_json::to_value(event)? {
            for (key, value) in fields {
                record.insert(key, value);
            }
        }
        let record = Value::Object(record);

        let Some(path) = self.inner.path.as_ref() else {
            return Ok(record);
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(record)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
