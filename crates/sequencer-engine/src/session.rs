use std::path::Path;
use std::sync::Arc;

use sequencer_contracts::instructions::InstructionList;
use sequencer_contracts::{EditError, ImagePayload};

use crate::pipeline::EditPipeline;
use crate::suggestions::{SuggestionGenerator, SuggestionStream};
use crate::{ImageEditor, SuggestionSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub name: String,
    pub image: ImagePayload,
}

impl UploadedImage {
    pub fn new(name: impl Into<String>, image: ImagePayload) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, EditError> {
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, ImagePayload::from_path(path)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub name: String,
    pub original: ImagePayload,
    pub edited: ImagePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchProgress<'a> {
    ImageStarted {
        index: usize,
        total: usize,
        name: &'a str,
    },
    Step {
        name: &'a str,
        step: usize,
        instruction: &'a str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub name: String,
    pub error: EditError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Images that finished during this run.
    pub processed: usize,
    pub failure: Option<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Selected files, the instruction list and the results of the last batch.
pub struct EditSession {
    editor: Arc<dyn ImageEditor>,
    suggestions: SuggestionGenerator,
    files: Vec<UploadedImage>,
    instructions: InstructionList,
    processed: Vec<ProcessedImage>,
}

impl EditSession {
    pub fn new(editor: Arc<dyn ImageEditor>, source: Arc<dyn SuggestionSource>) -> Self {
        Self {
            suggestions: SuggestionGenerator::new(source, Arc::clone(&editor)),
            editor,
            files: Vec::new(),
            instructions: InstructionList::new(),
            processed: Vec::new(),
        }
    }

    /// Replaces the selection and starts suggestions for the first file.
    ///
    /// The selection is kept even when the suggestion request fails.
    pub fn handle_files_selected(
        &mut self,
        uploads: Vec<UploadedImage>,
    ) -> Result<Option<SuggestionStream>, EditError> {
        self.select_files(uploads);
        match self.files.first() {
            Some(first) => self.suggestions.generate(&first.image).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces the selection without asking for suggestions.
    pub fn select_files(&mut self, uploads: Vec<UploadedImage>) {
        self.files = uploads;
        self.processed.clear();
    }

    pub fn files(&self) -> &[UploadedImage] {
        &self.files
    }

    pub fn instructions(&self) -> &InstructionList {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut InstructionList {
        &mut self.instructions
    }

    pub fn processed(&self) -> &[ProcessedImage] {
        &self.processed
    }

    /// Runs the instruction list over every selected image, in order.
    ///
    /// Stops at the first failing image; results recorded before it stay.
    pub fn process(
        &mut self,
        mut on_progress: impl FnMut(BatchProgress<'_>),
    ) -> Result<BatchOutcome, EditError> {
        if self.files.is_empty() || self.instructions.is_empty() {
            return Err(EditError::NothingToProcess);
        }
        self.processed.clear();

        let instructions = self.instructions.as_slice();
        let pipeline = EditPipeline::new(self.editor.as_ref());
        let total = self.files.len();
        let mut outcome = BatchOutcome {
            processed: 0,
            failure: None,
        };

        for (index, upload) in self.files.iter().enumerate() {
            on_progress(BatchProgress::ImageStarted {
                index,
                total,
                name: &upload.name,
            });
            let result = pipeline.run_with(upload.image.clone(), instructions, |step| {
                on_progress(BatchProgress::Step {
                    name: &upload.name,
                    step,
                    instruction: &instructions[step],
                })
            });
            match result {
                Ok(edited) => {
                    self.processed.push(ProcessedImage {
                        name: upload.name.clone(),
                        original: upload.image.clone(),
                        edited,
                    });
                    outcome.processed += 1;
                }
                Err(error) => {
                    outcome.failure = Some(BatchFailure {
                        name: upload.name.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Start over: drops files, instructions and results.
    pub fn reset(&mut self) {
        self.files.clear();
        self.instructions.clear();
        self.processed.clear();
    }
}
