//! Stream blocks: a heterogeneous, ordered, identified sequence.
//!
//! Each item carries the name of the child definition it was built with, so
//! one stream mixes any of its declared types in any order. Values read
//! from storage are lazy; conversion happens on first access, batched per
//! type, and items never touched round-trip back to storage verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trellis_api::Value;

use crate::base::{BlockDef, BlockValue};
use crate::error::{SchemaError, StreamError, UnknownChildError, ValidationError};
use crate::form::{self, item_key, FormData};
use crate::slot::{
    self, bind_matching, encode_entries, entries_eq, parse_stream_entries, BoundEntry, Slot,
};

/// Per-type item count bounds for one stream child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockCount {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl BlockCount {
    pub fn at_least(min: usize) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: usize) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Schema node for an ordered mix of named child shapes.
#[derive(Debug)]
pub struct StreamBlock {
    children: Vec<(String, BlockDef)>,
    index: HashMap<String, usize>,
    required: bool,
    min_num: Option<usize>,
    max_num: Option<usize>,
    block_counts: Vec<(String, BlockCount)>,
    default: Option<Value>,
}

impl StreamBlock {
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
            required: true,
            min_num: None,
            max_num: None,
            block_counts: Vec::new(),
            default: None,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_min_num(mut self, min_num: usize) -> Self {
        self.min_num = Some(min_num);
        self
    }

    pub fn with_max_num(mut self, max_num: usize) -> Self {
        self.max_num = Some(max_num);
        self
    }

    /// Builder: count bounds for one child type.
    pub fn with_block_count(mut self, name: impl Into<String>, count: BlockCount) -> Self {
        self.block_counts.push((name.into(), count));
        self
    }

    /// Builder: explicit default wire value for the whole stream.
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

    /// A fresh default value: the configured default, else empty.
    pub fn default_value(self: &Arc<Self>) -> StreamValue {
        match &self.default {
            Some(raw) => self.to_native(raw),
            None => self.empty_value(),
        }
    }

    /// An empty stream value.
    pub fn empty_value(self: &Arc<Self>) -> StreamValue {
        StreamValue {
            block: Arc::clone(self),
            slots: Vec::new(),
        }
    }

    /// Convert a wire array to a lazy stream value.
    ///
    /// Entries of unrecognized type are dropped here, silently: content is
    /// readable across schema versions, and a removed type disappears on
    /// the next full rewrite.
    pub fn to_native(self: &Arc<Self>, raw: &Value) -> StreamValue {
        let slots = parse_stream_entries(raw, |ty| self.index.contains_key(ty));
        StreamValue {
            block: Arc::clone(self),
            slots,
        }
    }

    /// Batch conversion across many streams at once.
    ///
    /// All entries from all inputs are bucketed by type, each present
    /// type's conversion runs exactly once over its bucket, and the results
    /// are redistributed to their recorded (stream, index) positions. Item
    /// order inside each stream is untouched; only conversion call order is
    /// grouped.
    pub fn bulk_to_native(self: &Arc<Self>, raws: &[Value]) -> Vec<StreamValue> {
        let mut parsed: Vec<Vec<Slot>> = raws
            .iter()
            .map(|raw| parse_stream_entries(raw, |ty| self.index.contains_key(ty)))
            .collect();

        let mut buckets: HashMap<String, (Vec<(usize, usize)>, Vec<Value>)> = HashMap::new();
        for (stream_index, slots) in parsed.iter().enumerate() {
            for (item_index, entry_slot) in slots.iter().enumerate() {
                if let Slot::Raw(entry) = entry_slot {
                    let bucket = buckets.entry(entry.block_type.clone()).or_default();
                    bucket.0.push((stream_index, item_index));
                    bucket.1.push(entry.value.clone());
                }
            }
        }

        // Declared child order keeps the conversion call order deterministic.
        for (name, child) in &self.children {
            let Some((positions, values)) = buckets.remove(name) else {
                continue;
            };
            tracing::trace!(
                block_type = name.as_str(),
                count = values.len(),
                "converting wire entries in one batch"
            );
            let natives = child.bulk_to_native(&values);
            debug_assert_eq!(natives.len(), positions.len());
            for ((stream_index, item_index), native) in positions.into_iter().zip(natives) {
                let entry_slot = &mut parsed[stream_index][item_index];
                let id = match entry_slot {
                    Slot::Raw(entry) => entry.id.take(),
                    Slot::Bound(entry) => entry.id.take(),
                };
                *entry_slot = Slot::Bound(BoundEntry {
                    block_type: name.clone(),
                    value: native,
                    id,
                });
            }
        }

        parsed
            .into_iter()
            .map(|slots| StreamValue {
                block: Arc::clone(self),
                slots,
            })
            .collect()
    }

    /// Validate every item plus the stream-level constraints: required-ness,
    /// total count bounds, and per-type count bounds.
    pub fn clean(&self, value: &StreamValue) -> Result<StreamValue, ValidationError> {
        let mut work = value.clone();
        work.bind_all();

        let mut errors = StreamError::default();
        let mut cleaned = Vec::with_capacity(work.slots.len());
        for (i, entry_slot) in work.slots.iter().enumerate() {
            let Slot::Bound(entry) = entry_slot else {
                continue;
            };
            let Some(child) = self.child(&entry.block_type) else {
                cleaned.push(entry.clone());
                continue;
            };
            match child.clean(&entry.value) {
                Ok(v) => cleaned.push(BoundEntry {
                    block_type: entry.block_type.clone(),
                    value: v,
                    id: entry.id.clone(),
                }),
                Err(e) => {
                    errors.child_errors.insert(i, e);
                    cleaned.push(entry.clone());
                }
            }
        }

        let len = work.slots.len();
        if self.required && len == 0 {
            errors
                .non_block_errors
                .push("This field is required.".to_string());
        }
        if let Some(min) = self.min_num {
            if len < min {
                errors
                    .non_block_errors
                    .push(format!("The minimum number of items is {min}"));
            }
        }
        if let Some(max) = self.max_num {
            if len > max {
                errors
                    .non_block_errors
                    .push(format!("The maximum number of items is {max}"));
            }
        }
        for (name, count) in &self.block_counts {
            let present = work
                .slots
                .iter()
                .filter(|entry_slot| entry_slot.block_type() == name)
                .count();
            if let Some(min) = count.min {
                if present < min {
                    errors
                        .non_block_errors
                        .push(format!("The minimum number of '{name}' blocks is {min}"));
                }
            }
            if let Some(max) = count.max {
                if present > max {
                    errors
                        .non_block_errors
                        .push(format!("The maximum number of '{name}' blocks is {max}"));
                }
            }
        }

        if errors.is_empty() {
            Ok(StreamValue {
                block: Arc::clone(&value.block),
                slots: cleaned.into_iter().map(Slot::Bound).collect(),
            })
        } else {
            Err(ValidationError::Stream(errors))
        }
    }

    /// Parse submitted items: drop deleted ones and unknown types, keep
    /// submitted identities, and order by the numeric `order` field (ties
    /// keep input order).
    pub fn value_from_form(self: &Arc<Self>, form: &FormData, prefix: &str) -> StreamValue {
        let count = form::item_count(form, prefix);
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            if form::is_deleted(form, prefix, i) {
                continue;
            }
            let Some(block_type) = form.get(&item_key(prefix, i, "type")) else {
                continue;
            };
            let Some(child) = self.child(block_type) else {
                tracing::debug!(block_type, "dropping submitted item of unknown type");
                continue;
            };
            let order = form::item_order(form, prefix, i);
            let value = child.value_from_form(form, &item_key(prefix, i, "value"));
            items.push((
                order,
                BoundEntry {
                    block_type: block_type.to_string(),
                    value,
                    id: form::item_id(form, prefix, i),
                },
            ));
        }
        items.sort_by_key(|(order, _)| *order);

        StreamValue {
            block: Arc::clone(self),
            slots: items
                .into_iter()
                .map(|(_, entry)| Slot::Bound(entry))
                .collect(),
        }
    }

    /// Array of `{type, value, id}` projections for API consumers. Items
    /// still in wire form are converted transiently; identities are passed
    /// through as-is (null until first serialization assigns them).
    pub fn api_representation(&self, value: &StreamValue) -> Value {
        let resolve = |ty: &str| self.child(ty).cloned();
        Value::Array(
            value
                .slots
                .iter()
                .map(|entry_slot| {
                    let (block_type, id, native) = slot::bound_view(entry_slot, &resolve);
                    let api = self
                        .child(block_type)
                        .map(|child| child.api_representation(&native))
                        .unwrap_or(Value::Null);
                    Value::Object(
                        [
                            ("type".to_string(), Value::String(block_type.to_string())),
                            ("value".to_string(), api),
                            (
                                "id".to_string(),
                                id.map(|i| Value::String(i.to_string()))
                                    .unwrap_or(Value::Null),
                            ),
                        ]
                        .into_iter()
                        .collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn searchable_text(&self, value: &StreamValue) -> Vec<String> {
        let resolve = |ty: &str| self.child(ty).cloned();
        value
            .slots
            .iter()
            .flat_map(|entry_slot| {
                let (block_type, _, native) = slot::bound_view(entry_slot, &resolve);
                self.child(block_type)
                    .map(|child| child.searchable_text(&native))
                    .unwrap_or_default()
            })
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
        if let (Some(min), Some(max)) = (self.min_num, self.max_num) {
            if min > max {
                errors.push(SchemaError::InvalidCountRange { min, max });
            }
        }
        for (name, count) in &self.block_counts {
            if !self.index.contains_key(name) {
                errors.push(SchemaError::UnknownBlockCount { name: name.clone() });
            }
            if let (Some(min), Some(max)) = (count.min, count.max) {
                if min > max {
                    errors.push(SchemaError::InvalidCountRange { min, max });
                }
            }
            if let (Some(min), Some(max_num)) = (count.min, self.max_num) {
                if min > max_num {
                    errors.push(SchemaError::BlockCountExceedsMax {
                        name: name.clone(),
                        max_num,
                    });
                }
            }
        }
        errors
    }
}

/// A stream block's value: an ordered sequence of typed, identified items,
/// materialized lazily and batched per type.
#[derive(Debug, Clone)]
pub struct StreamValue {
    block: Arc<StreamBlock>,
    slots: Vec<Slot>,
}

impl StreamValue {
    /// Build a fully bound stream from (type, value) pairs. Items carry no
    /// identity until first serialized.
    pub fn from_items(
        block: &Arc<StreamBlock>,
        items: Vec<(impl Into<String>, BlockValue)>,
    ) -> Result<Self, UnknownChildError> {
        let mut slots = Vec::with_capacity(items.len());
        for (block_type, value) in items {
            let block_type = block_type.into();
            if block.child(&block_type).is_none() {
                return Err(UnknownChildError::new(block_type));
            }
            slots.push(Slot::Bound(BoundEntry::new(block_type, value)));
        }
        Ok(Self {
            block: Arc::clone(block),
            slots,
        })
    }

    pub fn definition(&self) -> &StreamBlock {
        &self.block
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the item at `index` has been converted out of wire form.
    pub fn is_bound(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Slot::is_bound)
    }

    /// The item at `index`.
    ///
    /// A first access converts every other pending item of the same type in
    /// the same batch: reading one index may bind several, though never an
    /// index of a different type, and never reorders anything.
    pub fn get(&mut self, index: usize) -> Option<&BoundEntry> {
        let block_type = self.slots.get(index)?.block_type().to_string();
        if !self.slots[index].is_bound() {
            match self.block.child(&block_type) {
                Some(child) => bind_matching(&mut self.slots, &block_type, child),
                None => return None,
            }
        }
        match &self.slots[index] {
            Slot::Bound(entry) => Some(entry),
            Slot::Raw(_) => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockValue> {
        self.get(index)?;
        match &mut self.slots[index] {
            Slot::Bound(entry) => Some(&mut entry.value),
            Slot::Raw(_) => None,
        }
    }

    /// Overwrite the item at `index` with a freshly written (type, value)
    /// pair.
    ///
    /// The previous entry, and its identity, is discarded; a new id is
    /// assigned on the next serialization.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn set(
        &mut self,
        index: usize,
        block_type: &str,
        value: BlockValue,
    ) -> Result<(), UnknownChildError> {
        assert!(index < self.slots.len(), "stream index out of bounds");
        if self.block.child(block_type).is_none() {
            return Err(UnknownChildError::new(block_type));
        }
        self.slots[index] = Slot::Bound(BoundEntry::new(block_type, value));
        Ok(())
    }

    pub fn push(&mut self, block_type: &str, value: BlockValue) -> Result<(), UnknownChildError> {
        if self.block.child(block_type).is_none() {
            return Err(UnknownChildError::new(block_type));
        }
        self.slots.push(Slot::Bound(BoundEntry::new(block_type, value)));
        Ok(())
    }

    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(
        &mut self,
        index: usize,
        block_type: &str,
        value: BlockValue,
    ) -> Result<(), UnknownChildError> {
        assert!(index <= self.slots.len(), "stream index out of bounds");
        if self.block.child(block_type).is_none() {
            return Err(UnknownChildError::new(block_type));
        }
        self.slots
            .insert(index, Slot::Bound(BoundEntry::new(block_type, value)));
        Ok(())
    }

    /// Remove and return the entry at `index`, converting it if needed.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> BoundEntry {
        assert!(index < self.slots.len(), "stream index out of bounds");
        let _ = self.get(index);
        match self.slots.remove(index) {
            Slot::Bound(entry) => entry,
            Slot::Raw(entry) => BoundEntry {
                block_type: entry.block_type,
                value: BlockValue::None,
                id: entry.id,
            },
        }
    }

    /// Convert every pending item now, one batch per distinct type.
    pub fn bind_all(&mut self) {
        let block = Arc::clone(&self.block);
        slot::bind_all(&mut self.slots, move |ty| block.child(ty).cloned());
    }

    /// Iterate items in order, converting pending items first.
    pub fn iter(&mut self) -> impl Iterator<Item = &BoundEntry> {
        self.bind_all();
        self.slots.iter().filter_map(|entry_slot| match entry_slot {
            Slot::Bound(entry) => Some(entry),
            Slot::Raw(_) => None,
        })
    }

    /// Serialize back to the wire array.
    ///
    /// Items never touched since read are re-emitted verbatim, so their
    /// conversion is never paid. Missing identities are assigned here, in
    /// place, so repeated calls emit the same ids.
    pub fn to_wire(&mut self) -> Value {
        let block = Arc::clone(&self.block);
        encode_entries(&mut self.slots, move |ty| block.child(ty).cloned())
    }
}

impl PartialEq for StreamValue {
    fn eq(&self, other: &Self) -> bool {
        let resolve_a = |ty: &str| self.block.child(ty).cloned();
        let resolve_b = |ty: &str| other.block.child(ty).cloned();
        entries_eq(&self.slots, &resolve_a, &other.slots, &resolve_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CharBlock, IntegerBlock};
    use serde_json::json;

    fn page_body() -> Arc<StreamBlock> {
        Arc::new(
            StreamBlock::new(vec![
                ("text", BlockDef::leaf(CharBlock::new())),
                ("num", BlockDef::leaf(IntegerBlock::new())),
            ])
            .with_required(false),
        )
    }

    fn wire(value: serde_json::Value) -> Value {
        Value::from_json_value(value)
    }

    #[test]
    fn null_and_empty_string_read_as_empty() {
        let block = page_body();
        assert!(block.to_native(&wire(json!(null))).is_empty());
        assert!(block.to_native(&Value::String(String::new())).is_empty());
        assert!(block.to_native(&wire(json!({"not": "an array"}))).is_empty());
    }

    #[test]
    fn push_and_set_reject_unknown_types() {
        let block = page_body();
        let mut value = block.empty_value();

        value.push("text", BlockValue::Str("ok".to_string())).unwrap();
        let err = value
            .push("video", BlockValue::Str("nope".to_string()))
            .unwrap_err();
        assert_eq!(err.name, "video");

        let err = value
            .set(0, "video", BlockValue::Str("nope".to_string()))
            .unwrap_err();
        assert_eq!(err.name, "video");
        assert_eq!(value.get(0).unwrap().value.as_str(), Some("ok"));
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let block = page_body();
        let mut value = block.empty_value();
        value.push("text", BlockValue::Str("a".to_string())).unwrap();
        value.push("text", BlockValue::Str("c".to_string())).unwrap();
        value
            .insert(1, "num", BlockValue::Int(2))
            .unwrap();

        let kinds: Vec<&str> = value.iter().map(|e| e.block_type.as_str()).collect();
        assert_eq!(kinds, ["text", "num", "text"]);

        let removed = value.remove(1);
        assert_eq!(removed.value, BlockValue::Int(2));
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn fresh_items_have_no_identity_until_serialized() {
        let block = page_body();
        let mut value = block.empty_value();
        value.push("text", BlockValue::Str("new".to_string())).unwrap();

        assert_eq!(value.get(0).unwrap().id, None);

        let out = value.to_wire();
        let entries = out.as_array().unwrap();
        assert!(entries[0].get("id").and_then(Value::as_string).is_some());
        // And the minted id is now held by the item itself.
        assert_eq!(
            value.get(0).unwrap().id.as_deref(),
            entries[0].get("id").and_then(Value::as_string)
        );
    }

    #[test]
    fn api_representation_carries_type_value_and_id() {
        let block = page_body();
        let value = block.to_native(&wire(json!([
            {"type": "num", "value": 3, "id": "u1"},
        ])));

        let api = block.api_representation(&value);
        let entries = api.as_array().unwrap();
        assert_eq!(entries[0].get("type").and_then(Value::as_string), Some("num"));
        assert_eq!(entries[0].get("value").and_then(Value::as_i64), Some(3));
        assert_eq!(entries[0].get("id").and_then(Value::as_string), Some("u1"));
    }

    #[test]
    fn searchable_text_walks_items_in_order() {
        let block = page_body();
        let value = block.to_native(&wire(json!([
            {"type": "text", "value": "first", "id": "1"},
            {"type": "num", "value": 2, "id": "2"},
            {"type": "text", "value": "third", "id": "3"},
        ])));

        assert_eq!(block.searchable_text(&value), ["first", "third"]);
    }

    #[test]
    fn from_items_validates_types() {
        let block = page_body();
        let err = StreamValue::from_items(
            &block,
            vec![("carousel", BlockValue::Str("x".to_string()))],
        )
        .unwrap_err();
        assert_eq!(err.name, "carousel");
    }

    #[test]
    fn check_reports_schema_mistakes() {
        let block = StreamBlock::new(vec![
            ("text", BlockDef::leaf(CharBlock::new())),
            ("text", BlockDef::leaf(CharBlock::new())),
        ])
        .with_min_num(5)
        .with_max_num(2)
        .with_block_count("video", BlockCount::at_least(1));

        let errors = block.check();
        assert!(errors.contains(&SchemaError::DuplicateChildName {
            name: "text".to_string()
        }));
        assert!(errors.contains(&SchemaError::InvalidCountRange { min: 5, max: 2 }));
        assert!(errors.contains(&SchemaError::UnknownBlockCount {
            name: "video".to_string()
        }));
    }

    #[test]
    fn block_count_minimum_above_max_num_is_flagged() {
        let block = StreamBlock::new(vec![("text", BlockDef::leaf(CharBlock::new()))])
            .with_max_num(2)
            .with_block_count("text", BlockCount::at_least(3));

        let errors = block.check();
        assert!(errors.contains(&SchemaError::BlockCountExceedsMax {
            name: "text".to_string(),
            max_num: 2,
        }));
    }
}
