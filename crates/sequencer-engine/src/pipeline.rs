use sequencer_contracts::{EditError, ImagePayload};

use crate::ImageEditor;

/// Appended to every instruction sent to the edit model.
pub const PRESERVATION_DIRECTIVE: &str = "IMPORTANT: You must preserve any people in the image. \
Do not change their faces, bodies, or identities. \
The core subjects of the photo should remain recognizable after the edit.";

/// Builds the text sent for the next step, given the instructions already
/// applied (original wording, in order).
pub fn contextual_instruction(history: &[String], instruction: &str) -> String {
    if history.is_empty() {
        return format!("{instruction} {PRESERVATION_DIRECTIVE}");
    }
    let previous = history
        .iter()
        .enumerate()
        .map(|(index, applied)| format!("Step {}: \"{applied}\"", index + 1))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "You have already performed the following edits in order: {previous}. \
Now, please apply this new edit to the image: \"{instruction}\". {PRESERVATION_DIRECTIVE}"
    )
}

/// Applies an ordered instruction list to one image, one step at a time.
///
/// Each step edits the previous step's output. The first failing step aborts
/// the run and its error is returned unchanged.
pub struct EditPipeline<'a, E: ImageEditor + ?Sized> {
    editor: &'a E,
}

impl<'a, E: ImageEditor + ?Sized> EditPipeline<'a, E> {
    pub fn new(editor: &'a E) -> Self {
        Self { editor }
    }

    pub fn run(
        &self,
        initial: ImagePayload,
        instructions: &[String],
    ) -> Result<ImagePayload, EditError> {
        self.run_with(initial, instructions, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_step` with the step index before
    /// each edit starts.
    pub fn run_with(
        &self,
        initial: ImagePayload,
        instructions: &[String],
        mut on_step: impl FnMut(usize),
    ) -> Result<ImagePayload, EditError> {
        let mut current = initial;
        let mut history: Vec<String> = Vec::with_capacity(instructions.len());

        for (step, instruction) in instructions.iter().enumerate() {
            on_step(step);
            let prompt = contextual_instruction(&history, instruction);
            current = self.editor.apply_edit(&current, &prompt)?;
            history.push(instruction.clone());
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use sequencer_contracts::{EditError, ImagePayload};

    use super::{contextual_instruction, EditPipeline, PRESERVATION_DIRECTIVE};
    use crate::ImageEditor;

    /// Records every call and answers with a payload naming the call index.
    struct RecordingEditor {
        fail_at: Option<usize>,
        calls: Mutex<Vec<(ImagePayload, String)>>,
    }

    impl RecordingEditor {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                fail_at,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(ImagePayload, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ImageEditor for RecordingEditor {
        fn apply_edit(
            &self,
            image: &ImagePayload,
            instruction: &str,
        ) -> Result<ImagePayload, EditError> {
            let mut calls = self.calls.lock().unwrap();
            let index = calls.len();
            calls.push((image.clone(), instruction.to_string()));
            if self.fail_at == Some(index) {
                return Err(EditError::no_image(Some("refused")));
            }
            Ok(ImagePayload::new("image/webp", format!("out-{index}")))
        }
    }

    fn instructions(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn first_step_only_gets_preservation_directive() {
        assert_eq!(
            contextual_instruction(&[], "add a unicorn"),
            format!("add a unicorn {PRESERVATION_DIRECTIVE}")
        );
    }

    #[test]
    fn later_steps_summarize_applied_history() {
        let history = instructions(&["make it sunset", "add a unicorn"]);
        let text = contextual_instruction(&history, "apply film grain");
        assert_eq!(
            text,
            format!(
                "You have already performed the following edits in order: \
Step 1: \"make it sunset\"; Step 2: \"add a unicorn\". \
Now, please apply this new edit to the image: \"apply film grain\". {PRESERVATION_DIRECTIVE}"
            )
        );
    }

    #[test]
    fn chains_outputs_and_history_through_every_step() {
        let editor = RecordingEditor::new(None);
        let steps = instructions(&["sunset sky", "add a unicorn", "sunset sky"]);
        let initial = ImagePayload::new("image/jpeg", "original");
        let mut seen_steps = Vec::new();

        let result = EditPipeline::new(&editor)
            .run_with(initial.clone(), &steps, |step| seen_steps.push(step))
            .unwrap();

        assert_eq!(result, ImagePayload::new("image/webp", "out-2"));
        assert_eq!(seen_steps, [0, 1, 2]);

        let calls = editor.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].0, initial);
        assert_eq!(calls[1].0, ImagePayload::new("image/webp", "out-0"));
        assert_eq!(calls[2].0, ImagePayload::new("image/webp", "out-1"));

        assert!(!calls[0].1.contains("already performed"));
        let third = &calls[2].1;
        let first_pos = third.find("Step 1: \"sunset sky\"").unwrap();
        let second_pos = third.find("Step 2: \"add a unicorn\"").unwrap();
        assert!(first_pos < second_pos);
        assert!(!third.contains("Step 3:"));
        for (_, prompt) in &calls {
            assert!(prompt.ends_with(PRESERVATION_DIRECTIVE));
        }
    }

    #[test]
    fn empty_instruction_list_returns_input_untouched() {
        let editor = RecordingEditor::new(None);
        let initial = ImagePayload::new("image/png", "untouched");
        let result = EditPipeline::new(&editor).run(initial.clone(), &[]).unwrap();
        assert_eq!(result, initial);
        assert!(editor.calls().is_empty());
    }

    #[test]
    fn failure_aborts_remaining_steps() {
        let editor = RecordingEditor::new(Some(1));
        let steps = instructions(&["a", "b", "c", "d"]);
        let mut seen_steps = Vec::new();

        let err = EditPipeline::new(&editor)
            .run_with(ImagePayload::new("image/png", "x"), &steps, |step| {
                seen_steps.push(step)
            })
            .unwrap_err();

        assert_eq!(
            err,
            EditError::NoImageReturned {
                model_text: Some("refused".to_string())
            }
        );
        assert_eq!(editor.calls().len(), 2);
        assert_eq!(seen_steps, [0, 1]);
    }

    #[test]
    fn works_through_trait_objects() {
        let editor = RecordingEditor::new(None);
        let dynamic: &dyn ImageEditor = &editor;
        let result = EditPipeline::new(dynamic)
            .run(ImagePayload::new("image/png", "x"), &instructions(&["a"]))
            .unwrap();
        assert_eq!(result.data(), "out-0");
    }
}
