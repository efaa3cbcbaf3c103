use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use sequencer_contracts::suggestions::{
    parse_suggestions, PreviewState, SuggestionSet, SuggestionSlot,
};
use sequencer_contracts::{EditError, ImagePayload};

use crate::{ImageEditor, SuggestionSource};

const WORKER_LOST: &str = "preview worker exited without reporting";

struct PreviewSettlement {
    slot: SuggestionSlot,
    state: PreviewState,
}

/// Produces categorized suggestions for an image, then a preview for each
/// suggestion.
pub struct SuggestionGenerator {
    source: Arc<dyn SuggestionSource>,
    editor: Arc<dyn ImageEditor>,
}

impl SuggestionGenerator {
    pub fn new(source: Arc<dyn SuggestionSource>, editor: Arc<dyn ImageEditor>) -> Self {
        Self { source, editor }
    }

    /// Fetches and validates the suggestions, then starts one preview worker
    /// per suggestion against the original image.
    ///
    /// Errors from the suggestion model are returned before any snapshot
    /// exists. Preview failures never fail the batch; they settle that one
    /// item as [`PreviewState::Failed`].
    pub fn generate(&self, image: &ImagePayload) -> Result<SuggestionStream, EditError> {
        let text = self.source.suggest(image)?;
        let working = parse_suggestions(&text)?;

        let (sender, settlements) = mpsc::channel();
        for (slot, item) in working.iter() {
            self.spawn_preview(slot, item.prompt.clone(), image.clone(), sender.clone());
        }

        Ok(SuggestionStream {
            working,
            settlements,
            initial_sent: false,
            closed: false,
        })
    }

    /// Callback form of [`generate`](Self::generate): `on_update` receives
    /// every snapshot, and this returns once all previews have settled.
    pub fn generate_with(
        &self,
        image: &ImagePayload,
        mut on_update: impl FnMut(SuggestionSet),
    ) -> Result<(), EditError> {
        for snapshot in self.generate(image)? {
            on_update(snapshot);
        }
        Ok(())
    }

    fn spawn_preview(
        &self,
        slot: SuggestionSlot,
        prompt: String,
        image: ImagePayload,
        sender: Sender<PreviewSettlement>,
    ) {
        let editor = Arc::clone(&self.editor);
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("preview-{}-{}", slot.category.key(), slot.index))
            .spawn(move || {
                let state = match editor.apply_edit(&image, &prompt) {
                    Ok(preview) => PreviewState::Ready(preview),
                    Err(err) => PreviewState::Failed(err.to_string()),
                };
                // The consumer may have stopped listening.
                let _ = worker_sender.send(PreviewSettlement { slot, state });
            });
        if let Err(err) = spawned {
            let _ = sender.send(PreviewSettlement {
                slot,
                state: PreviewState::Failed(format!("failed to start preview worker: {err}")),
            });
        }
    }
}

/// Finite, non-restartable sequence of suggestion snapshots.
///
/// The first item has every preview pending; each later item follows exactly
/// one settled preview. Every item is an independent copy.
pub struct SuggestionStream {
    working: SuggestionSet,
    settlements: Receiver<PreviewSettlement>,
    initial_sent: bool,
    closed: bool,
}

impl SuggestionStream {
    /// State as of the last yielded snapshot.
    pub fn current(&self) -> &SuggestionSet {
        &self.working
    }

    /// Drains the stream and returns the settled set.
    pub fn finish(mut self) -> SuggestionSet {
        while self.next().is_some() {}
        self.working
    }
}

impl Iterator for SuggestionStream {
    type Item = SuggestionSet;

    fn next(&mut self) -> Option<SuggestionSet> {
        if !self.initial_sent {
            self.initial_sent = true;
            return Some(self.working.clone());
        }
        if self.closed || self.working.pending_count() == 0 {
            return None;
        }
        loop {
            match self.settlements.recv() {
                Ok(settlement) => {
                    if self.working.settle(settlement.slot, settlement.state) {
                        return Some(self.working.clone());
                    }
                }
                Err(_) => {
                    // Every worker is gone; whatever is still pending never will settle.
                    let orphaned: Vec<SuggestionSlot> = self
                        .working
                        .iter()
                        .filter(|(_, item)| item.preview.is_pending())
                        .map(|(slot, _)| slot)
                        .collect();
                    for slot in orphaned {
                        self.working
                            .settle(slot, PreviewState::Failed(WORKER_LOST.to_string()));
                    }
                    self.closed = true;
                    return Some(self.working.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use sequencer_contracts::suggestions::{Category, PreviewState};
    use sequencer_contracts::{EditError, ImagePayload};
    use serde_json::json;

    use super::SuggestionGenerator;
    use crate::{ImageEditor, SuggestionSource};

    struct CannedSource(Result<String, EditError>);

    impl SuggestionSource for CannedSource {
        fn suggest(&self, _image: &ImagePayload) -> Result<String, EditError> {
            self.0.clone()
        }
    }

    /// Renders each prompt as the preview data; fails prompts listed in `failing`.
    struct PromptEchoEditor {
        failing: Vec<String>,
        inputs: Mutex<Vec<ImagePayload>>,
        calls: AtomicUsize,
    }

    impl PromptEchoEditor {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|item| item.to_string()).collect(),
                inputs: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ImageEditor for PromptEchoEditor {
        fn apply_edit(
            &self,
            image: &ImagePayload,
            instruction: &str,
        ) -> Result<ImagePayload, EditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(image.clone());
            // Stagger completions so they do not arrive in launch order.
            let delay = (instruction.len() % 4) as u64;
            thread::sleep(Duration::from_millis(delay * 3));
            if self.failing.iter().any(|item| item == instruction) {
                return Err(EditError::no_image(None));
            }
            Ok(ImagePayload::new("image/png", instruction))
        }
    }

    /// Panics instead of answering, so its worker never reports back.
    struct PanickingEditor;

    impl ImageEditor for PanickingEditor {
        fn apply_edit(
            &self,
            _image: &ImagePayload,
            _instruction: &str,
        ) -> Result<ImagePayload, EditError> {
            panic!("editor crashed");
        }
    }

    fn suggestions_json() -> String {
        json!({
            "realistic": ["r1", "r22", "r333"],
            "fun": ["f1", "f22", "f333"],
            "experimental": ["e1", "e22", "e333"]
        })
        .to_string()
    }

    fn generator(source: CannedSource, editor: Arc<dyn ImageEditor>) -> SuggestionGenerator {
        SuggestionGenerator::new(Arc::new(source), editor)
    }

    #[test]
    fn first_snapshot_is_all_pending_then_one_per_preview() {
        let editor = Arc::new(PromptEchoEditor::new(&[]));
        let original = ImagePayload::new("image/jpeg", "original");
        let mut snapshots = Vec::new();

        generator(CannedSource(Ok(suggestions_json())), editor.clone())
            .generate_with(&original, |snapshot| snapshots.push(snapshot))
            .unwrap();

        assert_eq!(snapshots.len(), 10);
        assert_eq!(snapshots[0].pending_count(), 9);
        for (index, snapshot) in snapshots.iter().enumerate() {
            assert_eq!(snapshot.len(), 9);
            assert_eq!(snapshot.pending_count(), 9 - index);
        }
        let last = snapshots.last().unwrap();
        assert_eq!(last.pending_count(), 0);
        assert_eq!(last.ready_count(), 9);
        for (_, item) in last.iter() {
            let expected = ImagePayload::new("image/png", item.prompt.as_str());
            assert_eq!(item.preview, PreviewState::Ready(expected));
        }

        assert_eq!(editor.calls.load(Ordering::SeqCst), 9);
        assert!(editor.inputs.lock().unwrap().iter().all(|input| *input == original));
    }

    #[test]
    fn one_failed_preview_does_not_fail_the_batch() {
        let editor = Arc::new(PromptEchoEditor::new(&["f22"]));
        let settled = generator(CannedSource(Ok(suggestions_json())), editor)
            .generate(&ImagePayload::new("image/png", "x"))
            .unwrap()
            .finish();

        assert_eq!(settled.pending_count(), 0);
        assert_eq!(settled.failed_count(), 1);
        assert_eq!(settled.ready_count(), 8);
        assert!(matches!(
            settled.items(Category::Fun)[1].preview,
            PreviewState::Failed(ref reason) if reason.contains("may have been filtered")
        ));
    }

    #[test]
    fn malformed_suggestions_never_emit_a_snapshot() {
        let editor = Arc::new(PromptEchoEditor::new(&[]));
        let text = json!({"realistic": ["a", "b", "c"], "experimental": ["d", "e", "f"]}).to_string();
        let mut updates = 0;

        let err = generator(CannedSource(Ok(text)), editor.clone())
            .generate_with(&ImagePayload::new("image/png", "x"), |_| updates += 1)
            .unwrap_err();

        assert!(matches!(err, EditError::InvalidSuggestionFormat(_)));
        assert_eq!(updates, 0);
        assert_eq!(editor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn source_errors_propagate_unchanged() {
        let editor = Arc::new(PromptEchoEditor::new(&[]));
        let transport = EditError::transport("Gemini suggestions", Some(503), "overloaded");
        let result = generator(CannedSource(Err(transport.clone())), editor)
            .generate(&ImagePayload::new("image/png", "x"));
        assert_eq!(result.err(), Some(transport));

        let editor = Arc::new(PromptEchoEditor::new(&[]));
        let result = generator(CannedSource(Ok("   ".to_string())), editor)
            .generate(&ImagePayload::new("image/png", "x"));
        assert_eq!(result.err(), Some(EditError::EmptyResponse));
    }

    #[test]
    fn lost_workers_settle_as_failed() {
        let stream = generator(CannedSource(Ok(suggestions_json())), Arc::new(PanickingEditor))
            .generate(&ImagePayload::new("image/png", "x"))
            .unwrap();
        let snapshots: Vec<_> = stream.collect();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].pending_count(), 9);
        assert_eq!(snapshots[1].failed_count(), 9);
    }

    #[test]
    fn snapshots_are_independent_copies() {
        let editor = Arc::new(PromptEchoEditor::new(&[]));
        let mut stream = generator(CannedSource(Ok(suggestions_json())), editor)
            .generate(&ImagePayload::new("image/png", "x"))
            .unwrap();
        let first = stream.next().unwrap();
        let _second = stream.next().unwrap();
        assert_eq!(first.pending_count(), 9);
        assert_eq!(stream.current().pending_count(), 8);
    }
}
