//! Struct blocks: a fixed set of named, heterogeneous children.
//!
//! The schema's declared child order is authoritative: iteration and
//! serialization follow it, not insertion order. Struct values are eager;
//! laziness lives in the sequence blocks.

use std::collections::HashMap;
use std::sync::Arc;

use trellis_api::Value;

use crate::base::{BlockDef, BlockValue};
use crate::error::{SchemaError, StructError, UnknownChildError, ValidationError};
use crate::form::{child_key, FormData};

/// Schema node for a heterogeneous record of named children.
#[derive(Debug)]
pub struct StructBlock {
    children: Vec<(String, BlockDef)>,
    index: HashMap<String, usize>,
    default: Option<Value>,
}

impl StructBlock {
    pub fn new(children: Vec<(impl Into<String>, BlockDef)>) -> Self {
        let children: Vec<(String, BlockDef)> = children
            .into_iter()
            .map(|(name, block)| (name.into(), block))
            .collect();
        let index = children
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Self {
            children,
            index,
            default: None,
        }
    }

    /// Builder: explicit default wire value, used instead of the per-child
    /// defaults.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn child(&self, name: &str) -> Option<&BlockDef> {
        self.index.get(name).map(|&i| &self.children[i].1)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &BlockDef)> {
        self.children.iter().map(|(name, block)| (name.as_str(), block))
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// A fresh default value: the configured default, else every child's
    /// own default.
    pub fn default_value(self: &Arc<Self>) -> StructValue {
        match &self.default {
            Some(raw) => self.to_native(raw),
            None => StructValue {
                block: Arc::clone(self),
                values: self
                    .children
                    .iter()
                    .map(|(_, child)| child.default_value())
                    .collect(),
            },
        }
    }

    /// Convert a wire object to a struct value.
    ///
    /// Keys the schema does not declare are ignored; declared keys missing
    /// from storage fall back to the child's default.
    pub fn to_native(self: &Arc<Self>, raw: &Value) -> StructValue {
        let map = raw.as_object();
        if map.is_none() && !raw.is_null() {
            tracing::debug!(
                found = raw.type_name(),
                "struct wire value is not an object, using defaults"
            );
        }
        let values = self
            .children
            .iter()
            .map(|(name, child)| match map.and_then(|m| m.get(name)) {
                Some(child_raw) => child.to_native(child_raw),
                None => child.default_value(),
            })
            .collect();
        StructValue {
            block: Arc::clone(self),
            values,
        }
    }

    /// Batch conversion: one bulk call per declared child over the column
    /// of inputs that carry it, so a child needing an expensive lookup pays
    /// for it once per batch.
    pub fn bulk_to_native(self: &Arc<Self>, raws: &[Value]) -> Vec<StructValue> {
        let mut rows: Vec<Vec<Option<BlockValue>>> =
            (0..raws.len()).map(|_| vec![None; self.children.len()]).collect();

        for (col, (name, child)) in self.children.iter().enumerate() {
            let mut present_rows = Vec::new();
            let mut present_raws = Vec::new();
            for (row, raw) in raws.iter().enumerate() {
                if let Some(child_raw) = raw.as_object().and_then(|m| m.get(name)) {
                    present_rows.push(row);
                    present_raws.push(child_raw.clone());
                }
            }
            let converted = child.bulk_to_native(&present_raws);
            debug_assert_eq!(converted.len(), present_rows.len());
            for (row, native) in present_rows.into_iter().zip(converted) {
                rows[row][col] = Some(native);
            }
        }

        rows.into_iter()
            .map(|cells| StructValue {
                block: Arc::clone(self),
                values: cells
                    .into_iter()
                    .enumerate()
                    .map(|(col, cell)| {
                        cell.unwrap_or_else(|| self.children[col].1.default_value())
                    })
                    .collect(),
            })
            .collect()
    }

    /// Serialize back to a wire object, in one pass over the declared
    /// children.
    pub fn to_wire(&self, value: &mut StructValue) -> Value {
        Value::Object(
            self.children
                .iter()
                .zip(value.values.iter_mut())
                .map(|((name, child), child_value)| (name.clone(), child.to_wire(child_value)))
                .collect(),
        )
    }

    /// Validate every child, aggregating failures by child name.
    pub fn clean(&self, value: &StructValue) -> Result<StructValue, ValidationError> {
        let mut errors = StructError::default();
        let mut cleaned = Vec::with_capacity(self.children.len());

        for ((name, child), child_value) in self.children.iter().zip(&value.values) {
            match child.clean(child_value) {
                Ok(v) => cleaned.push(v),
                Err(e) => {
                    errors.child_errors.insert(name.clone(), e);
                    cleaned.push(child_value.clone());
                }
            }
        }

        if errors.is_empty() {
            Ok(StructValue {
                block: Arc::clone(&value.block),
                values: cleaned,
            })
        } else {
            Err(ValidationError::Struct(errors))
        }
    }

    /// Parse the struct's children out of a flat form submission, each
    /// under `{prefix}-{name}`.
    pub fn value_from_form(self: &Arc<Self>, form: &FormData, prefix: &str) -> StructValue {
        StructValue {
            block: Arc::clone(self),
            values: self
                .children
                .iter()
                .map(|(name, child)| child.value_from_form(form, &child_key(prefix, name)))
                .collect(),
        }
    }

    pub fn api_representation(&self, value: &StructValue) -> Value {
        Value::Object(
            self.children
                .iter()
                .zip(&value.values)
                .map(|((name, child), child_value)| {
                    (name.clone(), child.api_representation(child_value))
                })
                .collect(),
        )
    }

    pub fn searchable_text(&self, value: &StructValue) -> Vec<String> {
        self.children
            .iter()
            .zip(&value.values)
            .flat_map(|((_, child), child_value)| child.searchable_text(child_value))
            .collect()
    }

    pub fn check(&self) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (name, child) in &self.children {
            if name.is_empty() {
                errors.push(SchemaError::EmptyChildName);
            }
            if !seen.insert(name.as_str()) {
                errors.push(SchemaError::DuplicateChildName { name: name.clone() });
            }
            errors.extend(child.check());
        }
        errors
    }
}

/// A struct block's value: one native value per declared child.
///
/// Mutation goes through [`StructValue::set`], which rejects names the
/// schema does not declare; there is no way to attach ad hoc keys.
#[derive(Debug, Clone)]
pub struct StructValue {
    block: Arc<StructBlock>,
    values: Vec<BlockValue>,
}

impl StructValue {
    pub fn definition(&self) -> &StructBlock {
        &self.block
    }

    pub fn get(&self, name: &str) -> Option<&BlockValue> {
        self.block.index.get(name).map(|&i| &self.values[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut BlockValue> {
        self.block.index.get(name).map(|&i| &mut self.values[i])
    }

    pub fn set(&mut self, name: &str, value: BlockValue) -> Result<(), UnknownChildError> {
        match self.block.index.get(name) {
            Some(&i) => {
                self.values[i] = value;
                Ok(())
            }
            None => Err(UnknownChildError::new(name)),
        }
    }

    /// Iterate `(name, value)` pairs in the schema's declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BlockValue)> {
        self.block
            .children
            .iter()
            .zip(&self.values)
            .map(|((name, _), value)| (name.as_str(), value))
    }

    /// Children paired with their definitions, for rendering and
    /// introspection. Computed on demand.
    pub fn bound_children(&self) -> impl Iterator<Item = BoundChild<'_>> {
        self.block
            .children
            .iter()
            .zip(&self.values)
            .map(|((name, block), value)| BoundChild {
                name: name.as_str(),
                block,
                value,
            })
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.block, &other.block) {
            // Different definitions can still describe the same shape.
            let names_match = self
                .block
                .children
                .iter()
                .map(|(name, _)| name)
                .eq(other.block.children.iter().map(|(name, _)| name));
            if !names_match {
                return false;
            }
        }
        self.values == other.values
    }
}

/// One struct child with its name, definition, and current value.
#[derive(Debug, Clone, Copy)]
pub struct BoundChild<'a> {
    pub name: &'a str,
    pub block: &'a BlockDef,
    pub value: &'a BlockValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::field::{CharBlock, IntegerBlock};
    use serde_json::json;

    fn heading_block() -> Arc<StructBlock> {
        Arc::new(StructBlock::new(vec![
            ("title", BlockDef::leaf(CharBlock::new())),
            ("subtitle", BlockDef::leaf(CharBlock::new().with_required(false))),
            ("level", BlockDef::leaf(IntegerBlock::new().with_default(2))),
        ]))
    }

    fn wire(value: serde_json::Value) -> Value {
        Value::from_json_value(value)
    }

    #[test]
    fn iteration_follows_declared_order() {
        let block = heading_block();
        let value = block.to_native(&wire(json!({
            "level": 3,
            "title": "Hello",
            "subtitle": "world",
        })));

        let names: Vec<&str> = value.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["title", "subtitle", "level"]);
    }

    #[test]
    fn unknown_keys_are_ignored_and_missing_keys_defaulted() {
        let block = heading_block();
        let value = block.to_native(&wire(json!({
            "title": "Hello",
            "retired_field": true,
        })));

        assert_eq!(value.get("title"), Some(&BlockValue::Str("Hello".to_string())));
        assert_eq!(value.get("subtitle"), Some(&BlockValue::Str(String::new())));
        assert_eq!(value.get("level"), Some(&BlockValue::Int(2)));
        assert_eq!(value.get("retired_field"), None);
    }

    #[test]
    fn set_rejects_names_outside_the_schema() {
        let block = heading_block();
        let mut value = block.default_value();

        value.set("title", BlockValue::Str("ok".to_string())).unwrap();
        let err = value
            .set("banner", BlockValue::Str("nope".to_string()))
            .unwrap_err();
        assert_eq!(err.name, "banner");
    }

    #[test]
    fn clean_aggregates_failures_by_child_name() {
        let block = heading_block();
        let value = block.to_native(&wire(json!({
            "title": "",
            "subtitle": "fine",
            "level": null,
        })));

        let err = block.clean(&value).unwrap_err();
        let ValidationError::Struct(err) = err else {
            panic!("expected a struct error, got {err:?}");
        };
        let failed: Vec<&str> = err.child_errors.keys().map(String::as_str).collect();
        assert_eq!(failed, ["level", "title"]);
        assert!(err.non_block_errors.is_empty());
    }

    #[test]
    fn wire_output_covers_every_declared_child() {
        let block = heading_block();
        let mut value = block.to_native(&wire(json!({"title": "Hi"})));
        let out = block.to_wire(&mut value);

        assert_eq!(out.get("title").and_then(Value::as_string), Some("Hi"));
        assert_eq!(out.get("subtitle").and_then(Value::as_string), Some(""));
        assert_eq!(out.get("level").and_then(Value::as_i64), Some(2));
    }

    #[test]
    fn bound_children_pair_values_with_definitions() {
        let block = heading_block();
        let value = block.default_value();

        let children: Vec<_> = value.bound_children().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].name, "title");
        assert!(matches!(children[0].block, BlockDef::Leaf(_)));
    }

    #[test]
    fn check_reports_duplicate_and_empty_names() {
        let block = StructBlock::new(vec![
            ("title", BlockDef::leaf(CharBlock::new())),
            ("title", BlockDef::leaf(CharBlock::new())),
            ("", BlockDef::leaf(CharBlock::new())),
        ]);

        let errors = block.check();
        assert!(errors.contains(&SchemaError::DuplicateChildName {
            name: "title".to_string()
        }));
        assert!(errors.contains(&SchemaError::EmptyChildName));
    }

    #[test]
    fn form_parsing_reads_each_child_under_its_name() {
        let block = heading_block();
        let form = crate::form::FormData::new()
            .with_field("heading-title", "From the form")
            .with_field("heading-level", "4");

        let value = block.value_from_form(&form, "heading");
        assert_eq!(
            value.get("title"),
            Some(&BlockValue::Str("From the form".to_string()))
        );
        assert_eq!(value.get("level"), Some(&BlockValue::Int(4)));
    }
}
