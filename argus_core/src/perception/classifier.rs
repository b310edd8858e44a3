// argus_core/src/perception/classifier.rs

//! Maps hit objects onto the provider's configured detection classes.
//!
//! Matching is **first-match in configuration order**, not best-match: when an
//! object carries tags for several configured classes, the class listed first
//! wins. Put the most specific classes first.

use std::sync::Arc;

use crate::config::DetectionClass;
use crate::error::PerceptionError;
use crate::perception::backend::{ClassifiableObject, QueryBackend};
use crate::perception::hit::HitResult;

/// The outcome of classifying one hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class_index: Option<usize>,
    pub label: Option<Arc<str>>,
    pub importance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct HitClassifier {
    classes: Vec<DetectionClass>,
    // Shared label per class so stored hits clone a pointer, not a string.
    labels: Vec<Arc<str>>,
}

impl HitClassifier {
    pub fn new(classes: Vec<DetectionClass>) -> Self {
        let labels = classes.iter().map(|c| Arc::from(c.name.as_str())).collect();
        Self { classes, labels }
    }

    pub fn classes(&self) -> &[DetectionClass] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    /// Appends a class at the lowest matching priority.
    pub fn add(&mut self, class: DetectionClass) -> Result<(), PerceptionError> {
        if self.index_of(&class.name).is_some() {
            return Err(PerceptionError::DuplicateClass(class.name));
        }
        self.labels.push(Arc::from(class.name.as_str()));
        self.classes.push(class);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<DetectionClass, PerceptionError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| PerceptionError::UnknownClass(name.to_string()))?;
        self.labels.remove(index);
        Ok(self.classes.remove(index))
    }

    /// Classifies a hit object. A hit with no resolvable object, or one that
    /// matches no configured class, falls back to its own label (or none) with
    /// importance `1.0`.
    pub fn classify(&self, object: Option<&dyn ClassifiableObject>) -> Classification {
        let Some(object) = object else {
            return Classification {
                class_index: None,
                label: None,
                importance: 1.0,
            };
        };

        let tags = object.class_tags();
        for (index, class) in self.classes.iter().enumerate() {
            if tags.iter().any(|tag| *tag == class.name) {
                return Classification {
                    class_index: Some(index),
                    label: Some(self.labels[index].clone()),
                    importance: class.importance,
                };
            }
        }

        Classification {
            class_index: None,
            label: object.label().map(Arc::from),
            importance: 1.0,
        }
    }

    /// Classifies `hit` in place. Misses are left untouched.
    pub fn apply(&self, hit: &mut HitResult, backend: &dyn QueryBackend) {
        if !hit.has_hit {
            return;
        }
        let object = hit.object.and_then(|handle| backend.classifiable(handle));
        let classification = self.classify(object);
        hit.velocity = object.map(|o| o.velocity()).unwrap_or_default();
        hit.class_index = classification.class_index;
        hit.class_label = classification.label;
        hit.importance = classification.importance;
    }
}
