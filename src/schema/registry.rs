//! Definition registry for looking up record shapes by name.
//!
//! Arena-style: definitions are registered once during initialization and
//! looked up read-only by key afterwards — never mutated post-construction.

use crate::schema::definition::RecordDefinition;
use indexmap::IndexMap;
use std::sync::Arc;

/// Registry of record definitions, keyed by record-type name.
///
/// Populate the registry before the first validation run; the shared
/// `Arc<RecordDefinition>` handles it returns stay valid for the registry's
/// lifetime.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: IndexMap<String, Arc<RecordDefinition>>,
}

impl DefinitionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            definitions: IndexMap::new(),
        }
    }

    /// Register a definition under its record-type name.
    ///
    /// Re-registering a name replaces the previous definition; runs already
    /// holding the old `Arc` are unaffected.
    pub fn register(&mut self, definition: Arc<RecordDefinition>) {
        self.definitions
            .insert(definition.name().to_string(), definition);
    }

    /// Look up a definition by record-type name.
    pub fn get(&self, name: &str) -> Option<Arc<RecordDefinition>> {
        self.definitions.get(name).cloned()
    }

    /// Check if a record type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Registered record-type names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(|s| s.as_str())
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FieldType;
    use crate::schema::definition::FieldDefinition;

    fn person() -> Arc<RecordDefinition> {
        RecordDefinition::builder("person")
            .field(FieldDefinition::new("name", FieldType::String))
            .build_shared()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DefinitionRegistry::new();
        registry.register(person());

        assert!(registry.contains("person"));
        assert_eq!(registry.len(), 1);

        let def = registry.get("person").unwrap();
        assert_eq!(def.name(), "person");
        assert!(registry.get("animal").is_none());
    }

    #[test]
    fn test_lookup_returns_shared_definition() {
        let mut registry = DefinitionRegistry::new();
        registry.register(person());

        let a = registry.get("person").unwrap();
        let b = registry.get("person").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
