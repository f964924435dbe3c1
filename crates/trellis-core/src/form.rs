//! Flat form-submission data and the field naming scheme.
//!
//! The edit layer submits one flat map of string fields. Composite blocks
//! address their children with dashed prefixes:
//!
//! - struct child:  `{prefix}-{name}`
//! - sequence item: `{prefix}-{i}-value`, plus the `{prefix}-count`,
//!   `{prefix}-{i}-order`, `{prefix}-{i}-deleted`, `{prefix}-{i}-id` and
//!   (streams only) `{prefix}-{i}-type` markers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A flat form submission: string fields plus opaque upload handles.
///
/// None of the built-in field blocks read `files`; the seam exists for leaf
/// blocks that accept uploads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormData {
    fields: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    files: HashMap<String, String>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set one field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn set_file(&mut self, name: impl Into<String>, handle: impl Into<String>) {
        self.files.insert(name.into(), handle.into());
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }
}

/// Key for the number of submitted sequence items under `prefix`.
pub fn count_key(prefix: &str) -> String {
    format!("{prefix}-count")
}

/// Key for a marker or sub-field of sequence item `index` under `prefix`.
pub fn item_key(prefix: &str, index: usize, field: &str) -> String {
    format!("{prefix}-{index}-{field}")
}

/// Key for the named child of a struct under `prefix`.
pub fn child_key(prefix: &str, name: &str) -> String {
    format!("{prefix}-{name}")
}

/// Number of submitted items under `prefix`, zero when absent or garbled.
pub(crate) fn item_count(form: &FormData, prefix: &str) -> usize {
    form.get(&count_key(prefix))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Whether item `index` carries a non-empty deleted marker.
pub(crate) fn is_deleted(form: &FormData, prefix: &str, index: usize) -> bool {
    form.get(&item_key(prefix, index, "deleted"))
        .is_some_and(|v| !v.is_empty())
}

/// The submitted sort position for item `index`, falling back to the input
/// position so that items without a marker keep their submitted order.
pub(crate) fn item_order(form: &FormData, prefix: &str, index: usize) -> i64 {
    form.get(&item_key(prefix, index, "order"))
        .and_then(|v| v.parse().ok())
        .unwrap_or(index as i64)
}

/// The submitted identity for item `index`, if any.
pub(crate) fn item_id(form: &FormData, prefix: &str, index: usize) -> Option<String> {
    form.get(&item_key(prefix, index, "id"))
        .filter(|v| !v.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(count_key("body"), "body-count");
        assert_eq!(item_key("body", 2, "order"), "body-2-order");
        assert_eq!(child_key("body-0-value", "title"), "body-0-value-title");
    }

    #[test]
    fn count_defaults_to_zero() {
        let form = FormData::new();
        assert_eq!(item_count(&form, "body"), 0);

        let form = FormData::new().with_field("body-count", "not a number");
        assert_eq!(item_count(&form, "body"), 0);
    }

    #[test]
    fn order_falls_back_to_input_position() {
        let form = FormData::new().with_field("body-1-order", "7");
        assert_eq!(item_order(&form, "body", 1), 7);
        assert_eq!(item_order(&form, "body", 4), 4);
    }

    #[test]
    fn empty_deleted_marker_is_not_deleted() {
        let form = FormData::new()
            .with_field("body-0-deleted", "")
            .with_field("body-1-deleted", "1");
        assert!(!is_deleted(&form, "body", 0));
        assert!(is_deleted(&form, "body", 1));
    }
}
