use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sequencer_contracts::events::{EventWriter, SessionEvent};
use sequencer_contracts::models::{Capability, ModelSelection, ModelSelector};
use sequencer_contracts::suggestions::{Category, PreviewState, SuggestionSet, SuggestionSlot};
use sequencer_contracts::ImagePayload;
use sequencer_engine::queue::request_image_edit;
use sequencer_engine::session::{BatchProgress, UploadedImage};
use sequencer_engine::{
    EditSession, FalQueueClient, GeminiClient, GeminiConfig, QueueSettings,
};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "sequencer", version, about = "Sequential AI image edits")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask for categorized edit ideas and render a preview of each.
    Suggest(SuggestArgs),
    /// Apply an ordered list of edits to one or more images.
    Edit(EditArgs),
    /// Single-shot edit through the asynchronous job queue.
    Compare(CompareArgs),
}

#[derive(Debug, Parser)]
struct SuggestArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    edit_model: Option<String>,
    #[arg(long)]
    suggest_model: Option<String>,
    /// Per-request timeout for model calls.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long = "prompt", required = true)]
    prompts: Vec<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    edit_model: Option<String>,
    /// Per-request timeout for model calls.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value_t = 1000)]
    poll_interval_ms: u64,
    /// 0 polls until the job settles.
    #[arg(long, default_value_t = 600)]
    max_polls: u32,
    /// Echo queue log lines to stderr.
    #[arg(long)]
    logs: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("sequencer error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Suggest(args) => run_suggest(args),
        Command::Edit(args) => run_edit(args),
        Command::Compare(args) => run_compare(args),
    }
}

fn open_events(out: &Path, events: Option<&Path>, command: &str) -> Result<EventWriter> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    let writer = EventWriter::new(path, Uuid::new_v4().to_string());
    writer.emit(&SessionEvent::SessionStarted {
        command: command.to_string(),
        out_dir: out.display().to_string(),
    })?;
    Ok(writer)
}

fn select_model(requested: Option<&str>, capability: Capability) -> Result<ModelSelection> {
    let selection = ModelSelector::new(None)
        .select(requested, capability)
        .map_err(anyhow::Error::msg)?;
    if let (Some(_), Some(reason)) = (&selection.requested, &selection.fallback_reason) {
        eprintln!("{reason} Using {}.", selection.model.name);
    }
    Ok(selection)
}

fn gemini_client(
    edit_model: Option<&str>,
    suggest_model: Option<&str>,
    timeout_secs: u64,
) -> Result<GeminiClient> {
    let edit = select_model(edit_model, Capability::Edit)?;
    let suggest = select_model(suggest_model, Capability::Suggest)?;
    let config = GeminiConfig::from_env()?
        .with_edit_model(edit.model.name)
        .with_suggest_model(suggest.model.name)
        .with_request_timeout(Duration::from_secs(timeout_secs));
    Ok(GeminiClient::new(config))
}

/// Records a terminal failure for `image` before handing the error back.
fn record_failure<T>(events: &EventWriter, image: &str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        let _ = events.emit(&SessionEvent::ImageFailed {
            image: image.to_string(),
            error: format!("{err:#}"),
        });
        let _ = events.emit(&SessionEvent::SessionFinished { ok: false });
    }
    result
}

fn load_uploads(paths: &[PathBuf]) -> Result<Vec<UploadedImage>> {
    paths
        .iter()
        .map(|path| {
            UploadedImage::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))
        })
        .collect()
}

/// `<out>/<stem>-<suffix>.<ext>`, extension taken from the payload.
fn output_path(out: &Path, name: &str, suffix: &str, image: &ImagePayload) -> PathBuf {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("image");
    out.join(format!("{stem}-{suffix}.{}", image.file_extension()))
}

fn preview_file_name(slot: SuggestionSlot, image: &ImagePayload) -> String {
    format!(
        "preview-{}-{}.{}",
        slot.category.key(),
        slot.index + 1,
        image.file_extension()
    )
}

fn run_suggest(args: SuggestArgs) -> Result<i32> {
    let events = open_events(&args.out, args.events.as_deref(), "suggest")?;
    let client = Arc::new(gemini_client(
        args.edit_model.as_deref(),
        args.suggest_model.as_deref(),
        args.timeout_secs,
    )?);
    let upload = UploadedImage::from_path(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;
    let image_name = upload.name.clone();
    events.emit(&SessionEvent::FilesSelected {
        files: vec![image_name.clone()],
    })?;

    let mut session = EditSession::new(client.clone(), client);
    let stream = match session.handle_files_selected(vec![upload]) {
        Ok(Some(stream)) => stream,
        Ok(None) => return Ok(0),
        Err(err) => {
            events.emit(&SessionEvent::SuggestionsFailed {
                image: image_name,
                error: err.to_string(),
            })?;
            events.emit(&SessionEvent::SessionFinished { ok: false })?;
            return Err(err.into());
        }
    };

    let mut reported: HashSet<SuggestionSlot> = HashSet::new();
    let mut last: Option<SuggestionSet> = None;
    for snapshot in stream {
        if last.is_none() {
            events.emit(&SessionEvent::SuggestionsReady {
                image: image_name.clone(),
                prompts: snapshot.len(),
            })?;
            for category in Category::ALL {
                for item in snapshot.items(category) {
                    println!("[{}] {}", category.key(), item.prompt);
                }
            }
        }
        for (slot, item) in snapshot.iter() {
            if item.preview.is_pending() || !reported.insert(slot) {
                continue;
            }
            let error = match &item.preview {
                PreviewState::Failed(reason) => Some(reason.clone()),
                _ => None,
            };
            events.emit(&SessionEvent::PreviewSettled {
                category: slot.category,
                index: slot.index,
                prompt: item.prompt.clone(),
                ready: error.is_none(),
                error,
            })?;
        }
        println!(
            "previews settled: {}/{}",
            snapshot.len() - snapshot.pending_count(),
            snapshot.len()
        );
        last = Some(snapshot);
    }

    let Some(settled) = last else {
        return Ok(0);
    };
    let summary_path = args.out.join("suggestions.json");
    let written = write_previews(&args.out, &settled).and_then(|summary| {
        fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("failed to write {}", summary_path.display()))
    });
    record_failure(&events, &image_name, written)?;
    println!("Suggestions written to {}", summary_path.display());
    events.emit(&SessionEvent::SessionFinished { ok: true })?;
    Ok(0)
}

/// Writes ready previews next to the summary; returns the summary document.
fn write_previews(out: &Path, settled: &SuggestionSet) -> Result<Value> {
    let mut summary = serde_json::Map::new();
    for category in Category::ALL {
        let mut rows = Vec::new();
        for (index, item) in settled.items(category).iter().enumerate() {
            let slot = SuggestionSlot { category, index };
            let row = match &item.preview {
                PreviewState::Ready(image) => {
                    let file_name = preview_file_name(slot, image);
                    image.write_to(&out.join(&file_name))?;
                    json!({"prompt": item.prompt, "state": "ready", "file": file_name})
                }
                PreviewState::Failed(reason) => {
                    json!({"prompt": item.prompt, "state": "failed", "error": reason})
                }
                PreviewState::Pending => json!({"prompt": item.prompt, "state": "pending"}),
            };
            rows.push(row);
        }
        summary.insert(category.key().to_string(), Value::Array(rows));
    }
    Ok(Value::Object(summary))
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let events = open_events(&args.out, args.events.as_deref(), "edit")?;
    let client = Arc::new(gemini_client(
        args.edit_model.as_deref(),
        None,
        args.timeout_secs,
    )?);
    let uploads = load_uploads(&args.images)?;
    events.emit(&SessionEvent::FilesSelected {
        files: uploads.iter().map(|upload| upload.name.clone()).collect(),
    })?;

    let mut session = EditSession::new(client.clone(), client);
    session.select_files(uploads);
    for prompt in &args.prompts {
        session.instructions_mut().push(prompt);
    }

    let outcome = session.process(|progress| match progress {
        BatchProgress::ImageStarted { index, total, name } => {
            println!("[{}/{total}] {name}", index + 1);
            let _ = events.emit(&SessionEvent::ImageStarted {
                image: name.to_string(),
                index,
                total,
            });
        }
        BatchProgress::Step {
            name,
            step,
            instruction,
        } => {
            println!("  step {}: {instruction}", step + 1);
            let _ = events.emit(&SessionEvent::StepStarted {
                image: name.to_string(),
                step,
                instruction: instruction.to_string(),
            });
        }
    })?;

    for processed in session.processed() {
        let path = output_path(&args.out, &processed.name, "edited", &processed.edited);
        record_failure(&events, &processed.name, processed.edited.write_to(&path))?;
        events.emit(&SessionEvent::ImageFinished {
            image: processed.name.clone(),
            output_path: path.display().to_string(),
        })?;
        println!("Edited {} -> {}", processed.name, path.display());
    }

    if let Some(failure) = &outcome.failure {
        events.emit(&SessionEvent::ImageFailed {
            image: failure.name.clone(),
            error: failure.error.to_string(),
        })?;
        eprintln!("Failed to process {}: {}", failure.name, failure.error);
    }
    events.emit(&SessionEvent::SessionFinished {
        ok: outcome.is_success(),
    })?;
    Ok(if outcome.is_success() { 0 } else { 1 })
}

fn run_compare(args: CompareArgs) -> Result<i32> {
    let events = open_events(&args.out, args.events.as_deref(), "compare")?;
    let model = select_model(args.model.as_deref(), Capability::QueueEdit)?.model.name;
    let client = FalQueueClient::from_env()?;
    let upload = UploadedImage::from_path(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;
    let settings = QueueSettings {
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        max_polls: (args.max_polls > 0).then_some(args.max_polls),
    };

    let mut request_id = String::new();
    let result = request_image_edit(
        &client,
        &model,
        &args.prompt,
        &upload.image.to_data_url(),
        settings,
        |update| {
            request_id.clone_from(&update.request_id);
            if args.logs {
                for log in &update.logs {
                    eprintln!("[{}] {}", update.status.as_str(), log.message);
                }
            }
            let _ = events.emit(&SessionEvent::QueueUpdate {
                request_id: update.request_id.clone(),
                poll: update.poll,
                status: update.status,
                logs: update.logs.clone(),
            });
        },
    );
    let image_url = record_failure(&events, &upload.name, result.map_err(anyhow::Error::from))?;

    let saved = client
        .download_image(&image_url)
        .map_err(anyhow::Error::from)
        .and_then(|edited| {
            let path = output_path(&args.out, &upload.name, "compare", &edited);
            edited.write_to(&path)?;
            Ok(path)
        });
    let path = record_failure(&events, &upload.name, saved)?;
    events.emit(&SessionEvent::QueueFinished {
        request_id,
        image_url: image_url.clone(),
    })?;
    events.emit(&SessionEvent::ImageFinished {
        image: upload.name,
        output_path: path.display().to_string(),
    })?;
    events.emit(&SessionEvent::SessionFinished { ok: true })?;
    println!("Queue result {image_url} -> {}", path.display());
    Ok(0)
}
