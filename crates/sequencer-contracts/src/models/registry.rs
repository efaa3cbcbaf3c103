use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Image + instruction in, edited image out.
    Edit,
    /// Image in, structured edit suggestions out.
    Suggest,
    /// Single-shot edit through the asynchronous job queue.
    QueueEdit,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Suggest => "suggest",
            Self::QueueEdit => "queue-edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    /// Models supporting `capability`, in registration order.
    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[Capability]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities.to_vec(),
            },
        );
    };

    insert("gemini-2.5-flash-image-preview", "gemini", &[Capability::Edit]);
    insert("gemini-2.5-flash-image", "gemini", &[Capability::Edit]);
    insert("gemini-2.5-flash", "gemini", &[Capability::Suggest]);
    insert("gemini-2.5-pro", "gemini", &[Capability::Suggest]);
    insert("fal-ai/flux-pro/kontext/max", "fal", &[Capability::QueueEdit]);
    insert("fal-ai/flux-pro/kontext", "fal", &[Capability::QueueEdit]);

    map
}
