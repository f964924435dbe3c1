//! The block definition union and the leaf block contract.
//!
//! A schema is a tree of `BlockDef` nodes: three structural variants
//! (struct, list, stream) plus a leaf seam for field-level blocks. Every
//! definition is immutable after construction and shared via `Arc`, so one
//! schema safely serves any number of concurrent operations.
//!
//! All conversion and validation entry points live here as a single
//! match-based dispatch; the per-variant semantics live with the variant.

use std::fmt;
use std::sync::Arc;

use trellis_api::Value;

use crate::error::{SchemaError, ValidationError};
use crate::form::FormData;
use crate::list::{ListBlock, ListValue};
use crate::stream::{StreamBlock, StreamValue};
use crate::struct_block::{StructBlock, StructValue};

/// A native (converted) content value.
///
/// Leaf blocks produce the scalar variants; the structural variants wrap
/// their own value types, recursively.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockValue {
    /// Absent / empty value, e.g. an unfilled optional field.
    None,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Struct(StructValue),
    List(ListValue),
    Stream(StreamValue),
}

impl BlockValue {
    pub fn is_none(&self) -> bool {
        matches!(self, BlockValue::None)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BlockValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BlockValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BlockValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            BlockValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut StructValue> {
        match self {
            BlockValue::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            BlockValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListValue> {
        match self {
            BlockValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamValue> {
        match self {
            BlockValue::Stream(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut StreamValue> {
        match self {
            BlockValue::Stream(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for BlockValue {
    fn from(s: &str) -> Self {
        BlockValue::Str(s.to_string())
    }
}

impl From<String> for BlockValue {
    fn from(s: String) -> Self {
        BlockValue::Str(s)
    }
}

impl From<i64> for BlockValue {
    fn from(i: i64) -> Self {
        BlockValue::Int(i)
    }
}

impl From<bool> for BlockValue {
    fn from(b: bool) -> Self {
        BlockValue::Bool(b)
    }
}

/// Capability contract for a leaf (field-level) block.
///
/// Implementations convert between the wire shape and a native value, parse
/// flat form fields, and validate. `bulk_to_native` exists for leaves whose
/// conversion needs an expensive lookup: the containing sequence guarantees
/// it is invoked at most once per batch of same-typed items, so a batched
/// fetch pays off. The default just maps `to_native`.
pub trait LeafBlock: fmt::Debug + Send + Sync {
    /// Short kind name for diagnostics (e.g. "char", "integer").
    fn kind(&self) -> &str;

    /// Convert one wire value to its native form. Never fails; values that
    /// cannot be interpreted become an empty native and are reported by
    /// `clean` instead.
    fn to_native(&self, raw: &Value) -> BlockValue;

    /// Batch conversion. Output order must match input order.
    fn bulk_to_native(&self, raws: &[Value]) -> Vec<BlockValue> {
        raws.iter().map(|raw| self.to_native(raw)).collect()
    }

    /// Convert a native value back to the wire shape.
    fn to_wire(&self, value: &BlockValue) -> Value;

    /// A fresh default value. Must allocate per call, never alias shared
    /// state.
    fn default_value(&self) -> BlockValue;

    /// Parse this block's value out of a flat form submission.
    fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue;

    /// Validate, returning the cleaned value or an aggregate error.
    fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError>;

    /// Read-only projection for API consumers. Defaults to the wire shape.
    fn api_representation(&self, value: &BlockValue) -> Value {
        self.to_wire(value)
    }

    /// Plain-text fragments for a search indexer.
    fn searchable_text(&self, _value: &BlockValue) -> Vec<String> {
        Vec::new()
    }

    /// Self-check of the block's own configuration.
    fn check(&self) -> Vec<SchemaError> {
        Vec::new()
    }
}

/// A schema node: one content shape.
///
/// Cheap to clone (all variants are `Arc`s); clones share the definition.
#[derive(Debug, Clone)]
pub enum BlockDef {
    Leaf(Arc<dyn LeafBlock>),
    Struct(Arc<StructBlock>),
    List(Arc<ListBlock>),
    Stream(Arc<StreamBlock>),
}

impl BlockDef {
    /// Wrap a leaf block implementation.
    pub fn leaf(block: impl LeafBlock + 'static) -> Self {
        BlockDef::Leaf(Arc::new(block))
    }

    /// A fresh default value for this definition.
    pub fn default_value(&self) -> BlockValue {
        match self {
            BlockDef::Leaf(b) => b.default_value(),
            BlockDef::Struct(b) => BlockValue::Struct(b.default_value()),
            BlockDef::List(b) => BlockValue::List(b.default_value()),
            BlockDef::Stream(b) => BlockValue::Stream(b.default_value()),
        }
    }

    /// Convert a just-deserialized wire value into a native value.
    ///
    /// Streams and lists come back lazy: their items stay in wire form until
    /// first access.
    pub fn to_native(&self, raw: &Value) -> BlockValue {
        match self {
            BlockDef::Leaf(b) => b.to_native(raw),
            BlockDef::Struct(b) => BlockValue::Struct(b.to_native(raw)),
            BlockDef::List(b) => BlockValue::List(b.to_native(raw)),
            BlockDef::Stream(b) => BlockValue::Stream(b.to_native(raw)),
        }
    }

    /// Batch variant of [`BlockDef::to_native`].
    ///
    /// Structural variants group their children so that any child type's
    /// conversion runs once per batch, not once per item. Output order
    /// matches input order.
    pub fn bulk_to_native(&self, raws: &[Value]) -> Vec<BlockValue> {
        match self {
            BlockDef::Leaf(b) => b.bulk_to_native(raws),
            BlockDef::Struct(b) => b
                .bulk_to_native(raws)
                .into_iter()
                .map(BlockValue::Struct)
                .collect(),
            BlockDef::List(b) => b
                .bulk_to_native(raws)
                .into_iter()
                .map(BlockValue::List)
                .collect(),
            BlockDef::Stream(b) => b
                .bulk_to_native(raws)
                .into_iter()
                .map(BlockValue::Stream)
                .collect(),
        }
    }

    /// Serialize a native value back to the wire shape.
    ///
    /// Takes the value mutably because any sequence item still missing an
    /// identity is assigned one here, in place, so that repeated calls emit
    /// the same id.
    pub fn to_wire(&self, value: &mut BlockValue) -> Value {
        match (self, value) {
            (BlockDef::Leaf(b), value) => b.to_wire(value),
            (BlockDef::Struct(b), BlockValue::Struct(v)) => b.to_wire(v),
            (BlockDef::List(_), BlockValue::List(v)) => v.to_wire(),
            (BlockDef::Stream(_), BlockValue::Stream(v)) => v.to_wire(),
            (def, _) => {
                tracing::warn!(
                    definition = def.kind_name(),
                    "value does not match block definition, emitting null"
                );
                Value::Null
            }
        }
    }

    /// Validate a value against this definition, returning a freshly built
    /// cleaned value or one aggregate error.
    pub fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError> {
        match (self, value) {
            (BlockDef::Leaf(b), value) => b.clean(value),
            (BlockDef::Struct(b), BlockValue::Struct(v)) => b.clean(v).map(BlockValue::Struct),
            (BlockDef::List(b), BlockValue::List(v)) => b.clean(v).map(BlockValue::List),
            (BlockDef::Stream(b), BlockValue::Stream(v)) => b.clean(v).map(BlockValue::Stream),
            (BlockDef::Struct(b), BlockValue::None) => {
                b.clean(&b.default_value()).map(BlockValue::Struct)
            }
            (BlockDef::List(b), BlockValue::None) => {
                b.clean(&b.empty_value()).map(BlockValue::List)
            }
            (BlockDef::Stream(b), BlockValue::None) => {
                b.clean(&b.empty_value()).map(BlockValue::Stream)
            }
            (def, _) => Err(ValidationError::leaf(format!(
                "expected a {} value",
                def.kind_name()
            ))),
        }
    }

    /// Parse this block's value out of a flat form submission.
    pub fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue {
        match self {
            BlockDef::Leaf(b) => b.value_from_form(form, prefix),
            BlockDef::Struct(b) => BlockValue::Struct(b.value_from_form(form, prefix)),
            BlockDef::List(b) => BlockValue::List(b.value_from_form(form, prefix)),
            BlockDef::Stream(b) => BlockValue::Stream(b.value_from_form(form, prefix)),
        }
    }

    /// Read-only projection for API consumers.
    ///
    /// Unlike [`BlockDef::to_wire`] this never assigns identities; lazy
    /// items are converted transiently. Not a hot path.
    pub fn api_representation(&self, value: &BlockValue) -> Value {
        match (self, value) {
            (BlockDef::Leaf(b), value) => b.api_representation(value),
            (BlockDef::Struct(b), BlockValue::Struct(v)) => b.api_representation(v),
            (BlockDef::List(b), BlockValue::List(v)) => b.api_representation(v),
            (BlockDef::Stream(b), BlockValue::Stream(v)) => b.api_representation(v),
            _ => Value::Null,
        }
    }

    /// Plain-text fragments for a search indexer, in document order.
    pub fn searchable_text(&self, value: &BlockValue) -> Vec<String> {
        match (self, value) {
            (BlockDef::Leaf(b), value) => b.searchable_text(value),
            (BlockDef::Struct(b), BlockValue::Struct(v)) => b.searchable_text(v),
            (BlockDef::List(b), BlockValue::List(v)) => b.searchable_text(v),
            (BlockDef::Stream(b), BlockValue::Stream(v)) => b.searchable_text(v),
            _ => Vec::new(),
        }
    }

    /// Recursive schema self-check: duplicate or empty child names,
    /// inconsistent count bounds, misconfigured leaves.
    pub fn check(&self) -> Vec<SchemaError> {
        match self {
            BlockDef::Leaf(b) => b.check(),
            BlockDef::Struct(b) => b.check(),
            BlockDef::List(b) => b.check(),
            BlockDef::Stream(b) => b.check(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            BlockDef::Leaf(_) => "leaf",
            BlockDef::Struct(_) => "struct",
            BlockDef::List(_) => "list",
            BlockDef::Stream(_) => "stream",
        }
    }
}

impl From<StructBlock> for BlockDef {
    fn from(block: StructBlock) -> Self {
        BlockDef::Struct(Arc::new(block))
    }
}

impl From<ListBlock> for BlockDef {
    fn from(block: ListBlock) -> Self {
        BlockDef::List(Arc::new(block))
    }
}

impl From<StreamBlock> for BlockDef {
    fn from(block: StreamBlock) -> Self {
        BlockDef::Stream(Arc::new(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CharBlock, IntegerBlock};
    use serde_json::json;

    fn wire(value: serde_json::Value) -> Value {
        Value::from_json_value(value)
    }

    fn article() -> BlockDef {
        let caption = StructBlock::new(vec![
            ("text", BlockDef::leaf(CharBlock::new())),
            ("credit", BlockDef::leaf(CharBlock::new().with_required(false))),
        ]);
        BlockDef::from(
            StreamBlock::new(vec![
                ("paragraph", BlockDef::leaf(CharBlock::new())),
                ("caption", BlockDef::from(caption)),
                ("rating", BlockDef::leaf(IntegerBlock::new())),
            ])
            .with_required(false),
        )
    }

    #[test]
    fn cleaning_an_absent_value_applies_block_level_rules() {
        let def = BlockDef::from(
            StreamBlock::new(vec![("text", BlockDef::leaf(CharBlock::new()))]),
        );

        let err = def.clean(&BlockValue::None).unwrap_err();
        let ValidationError::Stream(err) = err else {
            panic!("expected a stream error, got {err:?}");
        };
        assert_eq!(err.non_block_errors, ["This field is required."]);
    }

    #[test]
    fn cleaning_a_mismatched_value_is_an_error_not_a_panic() {
        let def = article();
        let err = def.clean(&BlockValue::Int(3)).unwrap_err();
        assert!(err.to_string().contains("expected a stream value"));
    }

    #[test]
    fn serializing_a_mismatched_value_emits_null() {
        let def = article();
        let mut value = BlockValue::Int(3);
        assert_eq!(def.to_wire(&mut value), Value::Null);
    }

    #[test]
    fn searchable_text_walks_the_whole_tree() {
        let def = article();
        let value = def.to_native(&wire(json!([
            {"type": "paragraph", "value": "Opening words", "id": "1"},
            {"type": "caption", "value": {"text": "A photo", "credit": "Someone"}, "id": "2"},
            {"type": "rating", "value": 5, "id": "3"},
        ])));

        assert_eq!(
            def.searchable_text(&value),
            ["Opening words", "A photo", "Someone"]
        );
    }

    #[test]
    fn api_representation_descends_through_structs() {
        let def = article();
        let value = def.to_native(&wire(json!([
            {"type": "caption", "value": {"text": "A photo"}, "id": "c1"},
        ])));

        let api = def.api_representation(&value);
        let entries = api.as_array().unwrap();
        let caption = entries[0].get("value").unwrap();
        assert_eq!(caption.get("text").and_then(Value::as_string), Some("A photo"));
        assert_eq!(caption.get("credit").and_then(Value::as_string), Some(""));
    }

    #[test]
    fn definitions_are_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BlockDef>();
    }

    #[test]
    fn block_defs_share_their_schema_across_clones() {
        let def = article();
        let clone = def.clone();
        let (BlockDef::Stream(a), BlockDef::Stream(b)) = (&def, &clone) else {
            panic!("expected stream definitions");
        };
        assert!(Arc::ptr_eq(a, b));
    }
}
