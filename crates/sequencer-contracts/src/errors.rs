/// Failure kinds shared by the edit invoker, the pipeline, the suggestion
/// generator and the queue client.
///
/// Every variant renders a message that can be shown to a user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// The network call errored, or the server answered with a non-success status.
    #[error("{}", describe_transport(.context, .status, .body))]
    Transport {
        context: String,
        status: Option<u16>,
        body: String,
    },

    /// A queue job reached its terminal failed state.
    #[error("queue request {request_id} failed")]
    RequestFailed { request_id: String },

    /// The model answered without any inline image data.
    #[error("{}", describe_missing_image(.model_text.as_deref()))]
    NoImageReturned { model_text: Option<String> },

    #[error("Model returned an empty response for suggestions.")]
    EmptyResponse,

    #[error("Model returned an invalid format for suggestions: {0}")]
    InvalidSuggestionFormat(String),

    /// The queue job completed but its result carries no usable image URL.
    #[error("No image URL found in queue result.")]
    NoResultUrlFound,

    #[error("queue request {request_id} still pending after {polls} polls")]
    Timeout { request_id: String, polls: u32 },

    #[error("unknown queue status '{0}'")]
    UnknownQueueStatus(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("{0} not set")]
    MissingApiKey(String),

    #[error("Please select at least one image and add at least one edit prompt.")]
    NothingToProcess,
}

impl EditError {
    pub fn transport(
        context: impl Into<String>,
        status: Option<u16>,
        body: impl Into<String>,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            status,
            body: body.into(),
        }
    }

    pub fn no_image(model_text: Option<&str>) -> Self {
        let model_text = model_text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Self::NoImageReturned { model_text }
    }
}

fn describe_transport(context: &str, status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("{context} failed (status {code}): {body}"),
        None => format!("{context} failed: {body}"),
    }
}

fn describe_missing_image(model_text: Option<&str>) -> String {
    match model_text {
        Some(text) => format!("Model returned text instead of image: \"{text}\""),
        None => "Model did not return an image. The request may have been filtered.".to_string(),
    }
}
