//! List blocks: a homogeneous, identified sequence of one child shape.
//!
//! On the wire every item is an `{"type": "item", "value": …, "id": …}`
//! envelope; `"item"` is a constant marker, not a dispatch key. Values are
//! lazy: items stay in wire form until first access, and a first access
//! converts all pending items in one batch.

use std::sync::Arc;

use trellis_api::Value;

use crate::base::{BlockDef, BlockValue};
use crate::error::{ListError, SchemaError, ValidationError};
use crate::form::{self, item_key, FormData};
use crate::slot::{
    self, bind_matching, encode_entries, entries_eq, parse_list_entries, BoundEntry, Slot,
    LIST_ITEM_TYPE,
};

/// Schema node for a repeated child block.
#[derive(Debug)]
pub struct ListBlock {
    child: BlockDef,
    required: bool,
    min_num: Option<usize>,
    max_num: Option<usize>,
    default: Option<Value>,
}

impl ListBlock {
    pub fn new(child: BlockDef) -> Self {
        Self {
            child,
            required: true,
            min_num: None,
            max_num: None,
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

    /// Builder: explicit default wire value for the whole list.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn child(&self) -> &BlockDef {
        &self.child
    }

    /// A fresh default value: the configured default, else a single default
    /// child item. Contents are allocated per call, never shared.
    pub fn default_value(self: &Arc<Self>) -> ListValue {
        match &self.default {
            Some(raw) => self.to_native(raw),
            None => ListValue {
                block: Arc::clone(self),
                slots: vec![Slot::Bound(BoundEntry::new(
                    LIST_ITEM_TYPE,
                    self.child.default_value(),
                ))],
            },
        }
    }

    /// An empty list value.
    pub fn empty_value(self: &Arc<Self>) -> ListValue {
        ListValue {
            block: Arc::clone(self),
            slots: Vec::new(),
        }
    }

    /// Convert a wire array to a lazy list value.
    pub fn to_native(self: &Arc<Self>, raw: &Value) -> ListValue {
        ListValue {
            block: Arc::clone(self),
            slots: parse_list_entries(raw),
        }
    }

    /// Batch conversion: items from every input list are flattened into one
    /// child conversion call, then redistributed, so per-item order inside
    /// each list is untouched.
    pub fn bulk_to_native(self: &Arc<Self>, raws: &[Value]) -> Vec<ListValue> {
        let parsed: Vec<Vec<Slot>> = raws.iter().map(parse_list_entries).collect();

        let mut flat = Vec::new();
        for slots in &parsed {
            for entry_slot in slots {
                if let Slot::Raw(entry) = entry_slot {
                    flat.push(entry.value.clone());
                }
            }
        }
        let mut natives = self.child.bulk_to_native(&flat).into_iter();

        parsed
            .into_iter()
            .map(|slots| ListValue {
                block: Arc::clone(self),
                slots: slots
                    .into_iter()
                    .map(|entry_slot| match entry_slot {
                        Slot::Raw(entry) => Slot::Bound(BoundEntry {
                            block_type: entry.block_type,
                            value: natives.next().unwrap_or(BlockValue::None),
                            id: entry.id,
                        }),
                        bound => bound,
                    })
                    .collect(),
            })
            .collect()
    }

    /// Validate every item plus the list-level count bounds.
    pub fn clean(&self, value: &ListValue) -> Result<ListValue, ValidationError> {
        let mut work = value.clone();
        work.bind_all();

        let mut errors = ListError::default();
        let mut cleaned = Vec::with_capacity(work.slots.len());
        for (i, entry_slot) in work.slots.iter().enumerate() {
            let Slot::Bound(entry) = entry_slot else {
                continue;
            };
            match self.child.clean(&entry.value) {
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

        if errors.is_empty() {
            Ok(ListValue {
                block: Arc::clone(&value.block),
                slots: cleaned.into_iter().map(Slot::Bound).collect(),
            })
        } else {
            Err(ValidationError::List(errors))
        }
    }

    /// Parse submitted items: drop deleted ones, keep submitted identities,
    /// and order by the numeric `order` field (ties keep input order).
    pub fn value_from_form(self: &Arc<Self>, form: &FormData, prefix: &str) -> ListValue {
        let count = form::item_count(form, prefix);
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            if form::is_deleted(form, prefix, i) {
                continue;
            }
            let order = form::item_order(form, prefix, i);
            let value = self
                .child
                .value_from_form(form, &item_key(prefix, i, "value"));
            items.push((
                order,
                BoundEntry {
                    block_type: LIST_ITEM_TYPE.to_string(),
                    value,
                    id: form::item_id(form, prefix, i),
                },
            ));
        }
        items.sort_by_key(|(order, _)| *order);

        ListValue {
            block: Arc::clone(self),
            slots: items
                .into_iter()
                .map(|(_, entry)| Slot::Bound(entry))
                .collect(),
        }
    }

    /// Plain array of child representations; identities are a storage
    /// concern and stay out of the API shape.
    pub fn api_representation(&self, value: &ListValue) -> Value {
        let resolve = |_: &str| Some(self.child.clone());
        Value::Array(
            value
                .slots
                .iter()
                .map(|entry_slot| {
                    let (_, _, native) = slot::bound_view(entry_slot, &resolve);
                    self.child.api_representation(&native)
                })
                .collect(),
        )
    }

    pub fn searchable_text(&self, value: &ListValue) -> Vec<String> {
        let resolve = |_: &str| Some(self.child.clone());
        value
            .slots
            .iter()
            .flat_map(|entry_slot| {
                let (_, _, native) = slot::bound_view(entry_slot, &resolve);
                self.child.searchable_text(&native)
            })
            .collect()
    }

    pub fn check(&self) -> Vec<SchemaError> {
        let mut errors = Vec::new();
        if let (Some(min), Some(max)) = (self.min_num, self.max_num) {
            if min > max {
                errors.push(SchemaError::InvalidCountRange { min, max });
            }
        }
        errors.extend(self.child.check());
        errors
    }
}

/// A list block's value: an ordered, identified sequence of one child
/// shape, materialized lazily.
#[derive(Debug, Clone)]
pub struct ListValue {
    block: Arc<ListBlock>,
    slots: Vec<Slot>,
}

impl ListValue {
    pub fn definition(&self) -> &ListBlock {
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

    /// The item value at `index`.
    ///
    /// A first access converts every pending item in one batch; list items
    /// share one child type, so there is nothing to gain from converting
    /// them separately.
    pub fn get(&mut self, index: usize) -> Option<&BlockValue> {
        if index >= self.slots.len() {
            return None;
        }
        self.bind_all();
        match &self.slots[index] {
            Slot::Bound(entry) => Some(&entry.value),
            Slot::Raw(_) => None,
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BlockValue> {
        if index >= self.slots.len() {
            return None;
        }
        self.bind_all();
        match &mut self.slots[index] {
            Slot::Bound(entry) => Some(&mut entry.value),
            Slot::Raw(_) => None,
        }
    }

    /// The full (value, id) entry at `index`, for callers that need
    /// identity.
    pub fn entry(&mut self, index: usize) -> Option<&BoundEntry> {
        if index >= self.slots.len() {
            return None;
        }
        self.bind_all();
        match &self.slots[index] {
            Slot::Bound(entry) => Some(entry),
            Slot::Raw(_) => None,
        }
    }

    /// Overwrite the item at `index` with a freshly written value.
    ///
    /// The previous entry, and its identity, is discarded; a new id is
    /// assigned on the next serialization.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: BlockValue) {
        assert!(index < self.slots.len(), "list index out of bounds");
        self.slots[index] = Slot::Bound(BoundEntry::new(LIST_ITEM_TYPE, value));
    }

    pub fn push(&mut self, value: BlockValue) {
        self.slots
            .push(Slot::Bound(BoundEntry::new(LIST_ITEM_TYPE, value)));
    }

    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: BlockValue) {
        self.slots
            .insert(index, Slot::Bound(BoundEntry::new(LIST_ITEM_TYPE, value)));
    }

    /// Remove and return the entry at `index`, converting it if needed.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> BoundEntry {
        self.bind_all();
        match self.slots.remove(index) {
            Slot::Bound(entry) => entry,
            Slot::Raw(entry) => BoundEntry {
                block_type: entry.block_type,
                value: BlockValue::None,
                id: entry.id,
            },
        }
    }

    /// Convert every pending item now, in one batch.
    pub fn bind_all(&mut self) {
        bind_matching(&mut self.slots, LIST_ITEM_TYPE, self.block.child());
    }

    /// Iterate item values in order, converting pending items first.
    pub fn iter(&mut self) -> impl Iterator<Item = &BlockValue> {
        self.bind_all();
        self.slots.iter().filter_map(|entry_slot| match entry_slot {
            Slot::Bound(entry) => Some(&entry.value),
            Slot::Raw(_) => None,
        })
    }

    /// Iterate full (value, id) entries in order.
    pub fn bound_entries(&mut self) -> impl Iterator<Item = &BoundEntry> {
        self.bind_all();
        self.slots.iter().filter_map(|entry_slot| match entry_slot {
            Slot::Bound(entry) => Some(entry),
            Slot::Raw(_) => None,
        })
    }

    /// Serialize back to the wire array. Items never touched since read are
    /// re-emitted verbatim; missing identities are assigned here.
    pub fn to_wire(&mut self) -> Value {
        let child = self.block.child().clone();
        encode_entries(&mut self.slots, |_| Some(child.clone()))
    }
}

impl PartialEq for ListValue {
    fn eq(&self, other: &Self) -> bool {
        let resolve_a = |_: &str| Some(self.block.child().clone());
        let resolve_b = |_: &str| Some(other.block.child().clone());
        entries_eq(&self.slots, &resolve_a, &other.slots, &resolve_b)
    }
}
