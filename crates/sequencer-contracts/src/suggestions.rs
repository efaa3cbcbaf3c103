use serde::{Deserialize, Serialize};

use crate::errors::EditError;
use crate::images::ImagePayload;

pub const SUGGESTIONS_PER_CATEGORY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Realistic,
    Fun,
    Experimental,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Realistic, Category::Fun, Category::Experimental];

    pub fn key(self) -> &'static str {
        match self {
            Self::Realistic => "realistic",
            Self::Fun => "fun",
            Self::Experimental => "experimental",
        }
    }
}

/// Preview lifecycle: `Pending` settles exactly once into `Ready` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PreviewState {
    Pending,
    Ready(ImagePayload),
    Failed(String),
}

impl PreviewState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionItem {
    pub prompt: String,
    pub preview: PreviewState,
}

/// Identifies one suggestion inside a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuggestionSlot {
    pub category: Category,
    pub index: usize,
}

/// Three categories, each holding exactly three suggestions.
///
/// Only preview states change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestionSet {
    realistic: Vec<SuggestionItem>,
    fun: Vec<SuggestionItem>,
    experimental: Vec<SuggestionItem>,
}

impl SuggestionSet {
    pub fn items(&self, category: Category) -> &[SuggestionItem] {
        match category {
            Category::Realistic => &self.realistic,
            Category::Fun => &self.fun,
            Category::Experimental => &self.experimental,
        }
    }

    pub fn get(&self, slot: SuggestionSlot) -> Option<&SuggestionItem> {
        self.items(slot.category).get(slot.index)
    }

    /// Every slot with its item, in category order.
    pub fn iter(&self) -> impl Iterator<Item = (SuggestionSlot, &SuggestionItem)> {
        Category::ALL.into_iter().flat_map(move |category| {
            self.items(category)
                .iter()
                .enumerate()
                .map(move |(index, item)| (SuggestionSlot { category, index }, item))
        })
    }

    /// Settles a pending preview. Returns false when the slot does not exist
    /// or was already settled.
    pub fn settle(&mut self, slot: SuggestionSlot, state: PreviewState) -> bool {
        if state.is_pending() {
            return false;
        }
        let items = match slot.category {
            Category::Realistic => &mut self.realistic,
            Category::Fun => &mut self.fun,
            Category::Experimental => &mut self.experimental,
        };
        match items.get_mut(slot.index) {
            Some(item) if item.preview.is_pending() => {
                item.preview = state;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.realistic.len() + self.fun.len() + self.experimental.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.iter().filter(|(_, item)| item.preview.is_pending()).count()
    }

    pub fn ready_count(&self) -> usize {
        self.iter()
            .filter(|(_, item)| matches!(item.preview, PreviewState::Ready(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.iter()
            .filter(|(_, item)| matches!(item.preview, PreviewState::Failed(_)))
            .count()
    }
}

#[derive(Debug, Deserialize)]
struct RawSuggestions {
    realistic: Vec<String>,
    fun: Vec<String>,
    experimental: Vec<String>,
}

/// Parses the suggestion model's JSON answer into an all-pending set.
///
/// A category with fewer than three prompts is rejected; extra prompts are
/// dropped.
pub fn parse_suggestions(text: &str) -> Result<SuggestionSet, EditError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EditError::EmptyResponse);
    }
    let raw: RawSuggestions = serde_json::from_str(trimmed)
        .map_err(|err| EditError::InvalidSuggestionFormat(err.to_string()))?;

    let build = |category: Category, prompts: Vec<String>| {
        if prompts.len() < SUGGESTIONS_PER_CATEGORY {
            return Err(EditError::InvalidSuggestionFormat(format!(
                "expected {SUGGESTIONS_PER_CATEGORY} '{}' suggestions, got {}",
                category.key(),
                prompts.len()
            )));
        }
        Ok(prompts
            .into_iter()
            .take(SUGGESTIONS_PER_CATEGORY)
            .map(|prompt| SuggestionItem {
                prompt,
                preview: PreviewState::Pending,
            })
            .collect::<Vec<_>>())
    };

    Ok(SuggestionSet {
        realistic: build(Category::Realistic, raw.realistic)?,
        fun: build(Category::Fun, raw.fun)?,
        experimental: build(Category::Experimental, raw.experimental)?,
    })
}
