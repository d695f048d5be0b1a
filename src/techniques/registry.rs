use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use super::Technique;

#[derive(Debug, Error)]
pub enum TechniqueRegistryError {
    #[error("technique '{0}' is already registered with a different implementation")]
    ConflictingRegistration(String),
    #[error("unknown technique id(s): {0:?}")]
    UnknownIds(Vec<String>),
}

struct Entry {
    technique: Arc<dyn Technique>,
    /// Identity marker for the idempotency check: re-registering the exact
    /// same `Arc` pointer is a no-op; a different implementation under the
    /// same id is rejected.
    ptr: usize,
}

/// Process-wide registry of `TechniqueDescriptor -> implementation`.
/// Grounded on `agent/tools/registry.rs::ToolRegistry`.
#[derive(Default)]
pub struct TechniqueRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl TechniqueRegistry {
    pub fn new() -> Self {
        TechniqueRegistry::default()
    }

    pub fn register(&self, technique: Arc<dyn Technique>) -> Result<(), TechniqueRegistryError> {
        let id = technique.descriptor().id.to_string();
        let ptr = Arc::as_ptr(&technique) as *const () as usize;
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&id) {
            if existing.ptr == ptr {
                return Ok(());
            }
            return Err(TechniqueRegistryError::ConflictingRegistration(id));
        }
        entries.insert(id, Entry { technique, ptr });
        Ok(())
    }

    pub fn unregister(&self, id: &str) {
        self.entries.write().remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Technique>> {
        self.entries.read().get(id).map(|e| e.technique.clone())
    }

    pub fn list_enabled(&self) -> Vec<Arc<dyn Technique>> {
        self.entries
            .read()
            .values()
            .filter(|e| e.technique.descriptor().enabled)
            .map(|e| e.technique.clone())
            .collect()
    }

    /// Validates that every requested id names an enabled, registered
    /// technique, returning all unknown ids together (spec's
    /// `ValidationError` on unknown technique id).
    pub fn validate_ids(&self, ids: &[String]) -> Result<(), TechniqueRegistryError> {
        let entries = self.entries.read();
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !entries.get(id.as_str()).map(|e| e.technique.descriptor().enabled).unwrap_or(false))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(TechniqueRegistryError::UnknownIds(unknown))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::techniques::implementations::ZeroShotTechnique;

    #[test]
    fn register_then_get_roundtrips() {
        let registry = TechniqueRegistry::new();
        let technique: Arc<dyn Technique> = Arc::new(ZeroShotTechnique::new());
        registry.register(technique.clone()).unwrap();
        assert!(registry.get("zero_shot").is_some());
    }

    #[test]
    fn re_registering_same_arc_is_idempotent() {
        let registry = TechniqueRegistry::new();
        let technique: Arc<dyn Technique> = Arc::new(ZeroShotTechnique::new());
        registry.register(technique.clone()).unwrap();
        registry.register(technique).unwrap();
    }

    #[test]
    fn conflicting_registration_rejected() {
        let registry = TechniqueRegistry::new();
        registry.register(Arc::new(ZeroShotTechnique::new())).unwrap();
        let err = registry.register(Arc::new(ZeroShotTechnique::new())).unwrap_err();
        assert!(matches!(err, TechniqueRegistryError::ConflictingRegistration(_)));
    }

    #[test]
    fn validate_ids_reports_unknown() {
        let registry = TechniqueRegistry::new();
        registry.register(Arc::new(ZeroShotTechnique::new())).unwrap();
        let err = registry
            .validate_ids(&["zero_shot".to_string(), "nonexistent".to_string()])
            .unwrap_err();
        match err {
            TechniqueRegistryError::UnknownIds(ids) => assert_eq!(ids, vec!["nonexistent".to_string()]),
            _ => panic!("wrong error variant"),
        }
    }
}
