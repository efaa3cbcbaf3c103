use std::thread;
use std::time::Duration;

use sequencer_contracts::queue::{
    extract_result_url, QueueInput, QueueJob, QueueResult, QueueStatus, QueueStatusSnapshot,
    QueueUpdate,
};
use sequencer_contracts::EditError;
use serde_json::Value;

/// Submit / poll / fetch stages of a remote asynchronous job queue.
pub trait QueueTransport: Send + Sync {
    /// Submits a job and returns its request id.
    fn submit(&self, model: &str, input: &QueueInput) -> Result<String, EditError>;
    fn poll(&self, model: &str, request_id: &str) -> Result<QueueStatusSnapshot, EditError>;
    fn fetch_result(&self, model: &str, request_id: &str) -> Result<Value, EditError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Wait before every poll.
    pub poll_interval: Duration,
    /// `None` polls until the job settles. At least one poll always happens.
    pub max_polls: Option<u32>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: Some(600),
        }
    }
}

/// Submits once, then polls on a fixed cadence until the job settles.
///
/// `on_update` sees every poll, including its log lines. A failed job never
/// reaches the fetch stage.
pub fn run_to_completion<T>(
    transport: &T,
    model: &str,
    input: &QueueInput,
    settings: QueueSettings,
    mut on_update: impl FnMut(&QueueUpdate),
) -> Result<QueueResult, EditError>
where
    T: QueueTransport + ?Sized,
{
    let mut job = QueueJob {
        request_id: transport.submit(model, input)?,
        status: QueueStatus::Queued,
    };
    let mut polls = 0u32;

    while !job.status.is_terminal() {
        if settings.max_polls.is_some_and(|max| polls >= max.max(1)) {
            return Err(EditError::Timeout {
                request_id: job.request_id,
                polls,
            });
        }
        if !settings.poll_interval.is_zero() {
            thread::sleep(settings.poll_interval);
        }
        let snapshot = transport.poll(model, &job.request_id)?;
        polls += 1;
        job.status = snapshot.status;
        on_update(&QueueUpdate {
            request_id: job.request_id.clone(),
            poll: polls,
            status: snapshot.status,
            logs: snapshot.logs,
        });
    }

    if job.status == QueueStatus::Failed {
        return Err(EditError::RequestFailed {
            request_id: job.request_id,
        });
    }
    let data = transport.fetch_result(model, &job.request_id)?;
    Ok(QueueResult {
        request_id: job.request_id,
        data,
    })
}

/// Single-shot image edit through the queue; returns the output image URL.
pub fn request_image_edit<T>(
    transport: &T,
    model: &str,
    prompt: &str,
    image_url: &str,
    settings: QueueSettings,
    on_update: impl FnMut(&QueueUpdate),
) -> Result<String, EditError>
where
    T: QueueTransport + ?Sized,
{
    let input = QueueInput::new(prompt, image_url);
    let result = run_to_completion(transport, model, &input, settings, on_update)?;
    extract_result_url(&result.data)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use sequencer_contracts::queue::{QueueInput, QueueLog, QueueStatus, QueueStatusSnapshot};
    use sequencer_contracts::EditError;
    use serde_json::{json, Value};

    use super::{request_image_edit, run_to_completion, QueueSettings, QueueTransport};

    struct ScriptedQueue {
        statuses: Mutex<VecDeque<QueueStatus>>,
        result: Value,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedQueue {
        fn new(statuses: &[QueueStatus], result: Value) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                result,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl QueueTransport for ScriptedQueue {
        fn submit(&self, model: &str, input: &QueueInput) -> Result<String, EditError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("submit {model} {}", input.prompt));
            Ok("req-42".to_string())
        }

        fn poll(&self, _model: &str, request_id: &str) -> Result<QueueStatusSnapshot, EditError> {
            self.calls.lock().unwrap().push(format!("poll {request_id}"));
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(QueueStatus::Running);
            Ok(QueueStatusSnapshot {
                status,
                logs: vec![QueueLog {
                    message: format!("{status:?}"),
                    level: None,
                    timestamp: None,
                }],
            })
        }

        fn fetch_result(&self, _model: &str, request_id: &str) -> Result<Value, EditError> {
            self.calls.lock().unwrap().push(format!("fetch {request_id}"));
            Ok(self.result.clone())
        }
    }

    fn fast() -> QueueSettings {
        QueueSettings {
            poll_interval: Duration::ZERO,
            max_polls: None,
        }
    }

    #[test]
    fn polls_until_completed_then_fetches() {
        let queue = ScriptedQueue::new(
            &[QueueStatus::Queued, QueueStatus::Running, QueueStatus::Completed],
            json!({"images": [{"url": "https://v3.fal.media/out.png"}]}),
        );
        let mut updates = Vec::new();
        let result = run_to_completion(
            &queue,
            "fal-ai/flux-pro/kontext/max",
            &QueueInput::new("add a donut", "https://cdn/in.png"),
            fast(),
            |update| updates.push(update.clone()),
        )
        .unwrap();

        assert_eq!(result.request_id, "req-42");
        assert_eq!(
            queue.calls(),
            [
                "submit fal-ai/flux-pro/kontext/max add a donut",
                "poll req-42",
                "poll req-42",
                "poll req-42",
                "fetch req-42",
            ]
        );
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates.iter().map(|update| update.status).collect::<Vec<_>>(),
            [QueueStatus::Queued, QueueStatus::Running, QueueStatus::Completed]
        );
        assert_eq!(updates[2].poll, 3);
        assert_eq!(updates[1].logs[0].message, "Running");
    }

    #[test]
    fn failed_job_never_fetches() {
        let queue = ScriptedQueue::new(&[QueueStatus::Queued, QueueStatus::Failed], json!({}));
        let mut update_count = 0;
        let err = run_to_completion(
            &queue,
            "fal-ai/flux-pro/kontext",
            &QueueInput::new("p", "u"),
            fast(),
            |_| update_count += 1,
        )
        .unwrap_err();

        assert_eq!(
            err,
            EditError::RequestFailed {
                request_id: "req-42".to_string()
            }
        );
        assert_eq!(update_count, 2);
        assert!(!queue.calls().iter().any(|call| call.starts_with("fetch")));
    }

    #[test]
    fn max_polls_bounds_a_stuck_job() {
        let queue = ScriptedQueue::new(&[], json!({}));
        let settings = QueueSettings {
            poll_interval: Duration::ZERO,
            max_polls: Some(4),
        };
        let err = run_to_completion(&queue, "m/f", &QueueInput::new("p", "u"), settings, |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            EditError::Timeout {
                request_id: "req-42".to_string(),
                polls: 4
            }
        );
        assert_eq!(queue.calls().len(), 5);
    }

    #[test]
    fn zero_max_polls_still_polls_once() {
        let settings = QueueSettings {
            poll_interval: Duration::ZERO,
            max_polls: Some(0),
        };

        let done = ScriptedQueue::new(&[QueueStatus::Completed], json!({"image_url": "https://x/y.png"}));
        let url = request_image_edit(&done, "m/f", "p", "u", settings, |_| {}).unwrap();
        assert_eq!(url, "https://x/y.png");

        let stuck = ScriptedQueue::new(&[], json!({}));
        let err = run_to_completion(&stuck, "m/f", &QueueInput::new("p", "u"), settings, |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            EditError::Timeout {
                request_id: "req-42".to_string(),
                polls: 1
            }
        );
        assert_eq!(stuck.calls(), ["submit m/f p", "poll req-42"]);
    }

    #[test]
    fn image_edit_extracts_single_url_fallback() {
        let queue = ScriptedQueue::new(
            &[QueueStatus::Completed],
            json!({"image_url": "https://v3.fal.media/single.png"}),
        );
        let url = request_image_edit(&queue, "m/f", "p", "u", fast(), |_| {}).unwrap();
        assert_eq!(url, "https://v3.fal.media/single.png");

        let empty = ScriptedQueue::new(&[QueueStatus::Completed], json!({"seed": 7}));
        assert_eq!(
            request_image_edit(&empty, "m/f", "p", "u", fast(), |_| {}).unwrap_err(),
            EditError::NoResultUrlFound
        );
    }

    #[test]
    fn default_settings_poll_every_second() {
        let settings = QueueSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.max_polls, Some(600));
    }
}
