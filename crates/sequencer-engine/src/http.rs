use reqwest::blocking::Response as HttpResponse;
use sequencer_contracts::EditError;
use serde_json::Value;

const BODY_PREVIEW_CHARS: usize = 512;

/// Reads a JSON body, turning non-success statuses into transport errors
/// that carry the status code and the (truncated) body.
pub(crate) fn response_json_or_error(
    context: &str,
    response: HttpResponse,
) -> Result<Value, EditError> {
    let status = response.status();
    let body = response.text().map_err(|err| {
        EditError::transport(
            context,
            Some(status.as_u16()),
            err.without_url().to_string(),
        )
    })?;
    if !status.is_success() {
        return Err(EditError::transport(
            context,
            Some(status.as_u16()),
            truncate_text(&body, BODY_PREVIEW_CHARS),
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        EditError::transport(
            context,
            Some(status.as_u16()),
            format!(
                "invalid JSON payload ({err}): {}",
                truncate_text(&body, BODY_PREVIEW_CHARS)
            ),
        )
    })
}

/// Drops the request URL from the message; Gemini URLs carry the API key.
pub(crate) fn send_error(context: &str, err: reqwest::Error) -> EditError {
    EditError::transport(
        context,
        err.status().map(|status| status.as_u16()),
        err.without_url().to_string(),
    )
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
