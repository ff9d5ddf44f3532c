//! Predefined workflow definitions.
//!
//! The shipped set exercises the builder and the essential transformers;
//! deployments can register their own definitions at startup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::definition::WorkflowDefinition;
use super::transform;

/// Named workflow definitions, addressable by submission name.
#[derive(Debug, Default)]
pub struct WorkflowLibrary {
    definitions: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowLibrary {
    /// Create an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library holding the shipped definitions.
    #[must_use]
    pub fn with_builtins() -> Self {
        let library = Self::new();

        library.register(
            WorkflowDefinition::builder("chat")
                .description("Single text completion")
                .text_step("complete", transform::input_to_chat_messages())
                .build()
                .expect("builtin definition"),
        );

        library.register(
            WorkflowDefinition::builder("illustrated-story")
                .description("Write a short story, then illustrate it")
                .text_step("write", transform::input_to_chat_messages())
                .image_step("illustrate", transform::previous_text_to_image_input())
                .build()
                .expect("builtin definition"),
        );

        library.register(
            WorkflowDefinition::builder("narrated-story")
                .description("Write a short story, then narrate it")
                .text_step("write", transform::input_to_chat_messages())
                .audio_step("narrate", transform::previous_text_to_audio_input())
                .build()
                .expect("builtin definition"),
        );

        library.register(
            WorkflowDefinition::builder("image-critique")
                .description("Generate an image, then describe what came out")
                .image_step("generate", transform::input_to_image_input())
                .vision_step(
                    "critique",
                    transform::previous_image_to_vision_input(
                        "Describe this image and note anything unusual about it.",
                    ),
                )
                .build()
                .expect("builtin definition"),
        );

        library
    }

    /// Register a definition. Re-registering a name replaces it.
    pub fn register(&self, definition: WorkflowDefinition) {
        self.definitions
            .write()
            .insert(definition.name.clone(), Arc::new(definition));
    }

    /// Fetch a definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    /// Every definition, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut all: Vec<_> = self.definitions.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    /// Whether the library is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let library = WorkflowLibrary::with_builtins();
        assert!(library.get("chat").is_some());
        assert!(library.get("illustrated-story").is_some());
        assert!(library.get("narrated-story").is_some());
        assert!(library.get("image-critique").is_some());
        assert!(library.get("missing").is_none());
    }

    #[test]
    fn test_list_sorted_by_name() {
        let library = WorkflowLibrary::with_builtins();
        let names: Vec<_> = library.list().iter().map(|d| d.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_register_replaces_by_name() {
        let library = WorkflowLibrary::new();
        library.register(
            WorkflowDefinition::builder("demo")
                .text_step("a", transform::input_to_chat_messages())
                .build()
                .unwrap(),
        );
        library.register(
            WorkflowDefinition::builder("demo")
                .description("second")
                .text_step("b", transform::input_to_chat_messages())
                .build()
                .unwrap(),
        );
        assert_eq!(library.len(), 1);
        assert_eq!(
            library.get("demo").unwrap().description.as_deref(),
            Some("second")
        );
    }
}
