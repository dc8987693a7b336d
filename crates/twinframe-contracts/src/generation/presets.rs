use indexmap::IndexMap;

pub const SELF_PROMPT: &str = "Take a Polaroid-style image of my current self hugging my younger self. Keep both faces exactly the same as references, add subtle grain, mild blur, single flash from a dark room, white curtains background, handwriting caption at the bottom.";
pub const CELEBRITY_PROMPT: &str = "Create a candid Polaroid photo with white border and date stamp, indoor on-camera flash, light film grain. Keep both faces unchanged. Make it look like a casual party snapshot of me and [celebrity] standing close, slight motion blur, warm tone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPreset {
    pub key: String,
    pub title: String,
    pub prompt: String,
}

/// Named starting prompts, kept in display order. The first entry is the
/// default mode.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: IndexMap<String, PromptPreset>,
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PresetRegistry {
    pub fn new(presets: Option<IndexMap<String, PromptPreset>>) -> Self {
        Self {
            presets: presets.unwrap_or_else(default_presets),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PromptPreset> {
        self.presets.get(key.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &PromptPreset> {
        self.presets.values()
    }

    pub fn default_preset(&self) -> Option<&PromptPreset> {
        self.presets.values().next()
    }
}

fn default_presets() -> IndexMap<String, PromptPreset> {
    let mut map = IndexMap::new();
    let mut insert = |key: &str, title: &str, prompt: &str| {
        map.insert(
            key.to_string(),
            PromptPreset {
                key: key.to_string(),
                title: title.to_string(),
                prompt: prompt.to_string(),
            },
        );
    };
    insert("self", "Hug your younger self", SELF_PROMPT);
    insert("celebrity", "Snapshot with a celebrity", CELEBRITY_PROMPT);
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_lists_self_first() {
        let registry = PresetRegistry::default();
        let keys: Vec<&str> = registry.list().map(|preset| preset.key.as_str()).collect();
        assert_eq!(keys, vec!["self", "celebrity"]);
        assert_eq!(
            registry.default_preset().map(|preset| preset.prompt.as_str()),
            Some(SELF_PROMPT)
        );
    }

    #[test]
    fn lookup_trims_key() {
        let registry = PresetRegistry::default();
        assert_eq!(
            registry.get(" celebrity ").map(|preset| preset.prompt.as_str()),
            Some(CELEBRITY_PROMPT)
        );
        assert!(registry.get("unknown").is_none());
    }
}
