//! Validation and schema error types.
//!
//! Validation produces a single aggregate error per block: per-child errors
//! keyed by name (struct) or index (list/stream), plus a separate list of
//! block-level errors (required-ness, count bounds). The two payloads are
//! independently meaningful; a stream can fail on `min_num` alone with no
//! child errors at all.

use std::collections::BTreeMap;

/// Aggregate validation error for one block value.
///
/// Child errors are sparse: only names/indices that actually failed carry an
/// entry. Consumers redistribute them positionally to each child's own
/// editor; block-level errors render at the parent level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// One or more messages from a leaf block.
    #[error("{}", .messages.join("; "))]
    Leaf { messages: Vec<String> },

    #[error("{0}")]
    Struct(StructError),

    #[error("{0}")]
    List(ListError),

    #[error("{0}")]
    Stream(StreamError),
}

impl ValidationError {
    /// Build a leaf error carrying a single message.
    pub fn leaf(message: impl Into<String>) -> Self {
        ValidationError::Leaf {
            messages: vec![message.into()],
        }
    }

    /// The standard required-but-empty message.
    pub fn required() -> Self {
        ValidationError::leaf("This field is required.")
    }
}

/// Per-child and block-level errors for a struct block, keyed by child name.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error(
    "{} child block(s) failed validation, {} block-level error(s)",
    .child_errors.len(),
    .non_block_errors.len()
)]
pub struct StructError {
    pub child_errors: BTreeMap<String, ValidationError>,
    pub non_block_errors: Vec<String>,
}

impl StructError {
    pub fn is_empty(&self) -> bool {
        self.child_errors.is_empty() && self.non_block_errors.is_empty()
    }
}

/// Per-child and block-level errors for a list block, keyed by item index.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error(
    "{} item(s) failed validation, {} block-level error(s)",
    .child_errors.len(),
    .non_block_errors.len()
)]
pub struct ListError {
    pub child_errors: BTreeMap<usize, ValidationError>,
    pub non_block_errors: Vec<String>,
}

impl ListError {
    pub fn is_empty(&self) -> bool {
        self.child_errors.is_empty() && self.non_block_errors.is_empty()
    }
}

/// Per-child and block-level errors for a stream block, keyed by item index.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error(
    "{} item(s) failed validation, {} block-level error(s)",
    .child_errors.len(),
    .non_block_errors.len()
)]
pub struct StreamError {
    pub child_errors: BTreeMap<usize, ValidationError>,
    pub non_block_errors: Vec<String>,
}

impl StreamError {
    pub fn is_empty(&self) -> bool {
        self.child_errors.is_empty() && self.non_block_errors.is_empty()
    }
}

/// Error raised when a value operation names a child the schema does not
/// define (an unknown struct field, or an unknown stream block type).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown child block '{name}'")]
pub struct UnknownChildError {
    pub name: String,
}

impl UnknownChildError {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Schema self-check diagnostics.
///
/// These are programmer errors, detected by `check()` at schema review time
/// and reported to the integrator. They never surface during content
/// conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate child block name '{name}'")]
    DuplicateChildName { name: String },

    #[error("child block name must not be empty")]
    EmptyChildName,

    #[error("min_num {min} is greater than max_num {max}")]
    InvalidCountRange { min: usize, max: usize },

    #[error("block_counts refers to unknown child block '{name}'")]
    UnknownBlockCount { name: String },

    #[error("block_counts minimum for '{name}' exceeds max_num {max_num}")]
    BlockCountExceedsMax { name: String, max_num: usize },

    #[error("min_value {min} is greater than max_value {max}")]
    InvalidValueRange { min: i64, max: i64 },

    #[error("choice block has no choices")]
    NoChoices,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_error_joins_messages() {
        let err = ValidationError::Leaf {
            messages: vec!["too long".to_string(), "bad prefix".to_string()],
        };
        assert_eq!(err.to_string(), "too long; bad prefix");
    }

    #[test]
    fn stream_error_counts_both_payloads() {
        let mut err = StreamError::default();
        assert!(err.is_empty());

        err.non_block_errors
            .push("The minimum number of items is 2".to_string());
        assert!(!err.is_empty());
        assert!(err.child_errors.is_empty());

        err.child_errors.insert(3, ValidationError::required());
        assert_eq!(
            err.to_string(),
            "1 item(s) failed validation, 1 block-level error(s)"
        );
    }
}
