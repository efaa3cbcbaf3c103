//! Edit pipeline, suggestion generator and queue client for the image
//! sequencer, plus the HTTP clients that back them.

use sequencer_contracts::{EditError, ImagePayload};

pub mod config;
pub mod fal;
pub mod gemini;
mod http;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod suggestions;

pub use config::{FalConfig, GeminiConfig};
pub use fal::FalQueueClient;
pub use gemini::GeminiClient;
pub use pipeline::EditPipeline;
pub use queue::{QueueSettings, QueueTransport};
pub use session::EditSession;
pub use suggestions::{SuggestionGenerator, SuggestionStream};

/// Applies one natural-language instruction to one image.
pub trait ImageEditor: Send + Sync {
    fn apply_edit(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<ImagePayload, EditError>;
}

/// Asks a text model for categorized edit ideas; returns the raw JSON text.
pub trait SuggestionSource: Send + Sync {
    fn suggest(&self, image: &ImagePayload) -> Result<String, EditError>;
}
