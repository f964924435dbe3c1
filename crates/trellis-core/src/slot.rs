//! Per-item slot state for lazily materialized sequences.
//!
//! A list or stream value holds one `Slot` per item. Each slot is
//! authoritatively either `Raw` (the wire entry, untouched) or `Bound` (the
//! converted native entry); converting or overwriting an item replaces the
//! whole slot, so there is no "half converted" state to reason about.
//!
//! Binding is grouped: converting the item at one index converts every
//! other still-raw item of the same type in a single `bulk_to_native` call.
//! Item order is never affected, only the conversion call order.

use std::borrow::Cow;

use trellis_api::Value;
use uuid::Uuid;

use crate::base::{BlockDef, BlockValue};

/// The constant `type` marker carried by list item envelopes on the wire.
pub(crate) const LIST_ITEM_TYPE: &str = "item";

/// A wire entry as stored, not yet converted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawEntry {
    pub block_type: String,
    pub value: Value,
    pub id: Option<String>,
}

/// A converted sequence item: its type name, native value, and identity.
///
/// `id` is `None` for freshly written items; an identity is assigned on the
/// next serialization and preserved from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundEntry {
    pub block_type: String,
    pub value: BlockValue,
    pub id: Option<String>,
}

impl BoundEntry {
    pub(crate) fn new(block_type: impl Into<String>, value: BlockValue) -> Self {
        Self {
            block_type: block_type.into(),
            value,
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Raw(RawEntry),
    Bound(BoundEntry),
}

impl Slot {
    pub fn is_bound(&self) -> bool {
        matches!(self, Slot::Bound(_))
    }

    pub fn block_type(&self) -> &str {
        match self {
            Slot::Raw(entry) => &entry.block_type,
            Slot::Bound(entry) => &entry.block_type,
        }
    }
}

/// Mint a fresh item identity.
pub(crate) fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a stream's wire value into raw slots.
///
/// `null` and the empty string mean an empty stream. Entries whose `type`
/// is not recognized, and entries too malformed to carry a string `type`,
/// are dropped, never errored: content written under a newer or older
/// schema must stay readable.
pub(crate) fn parse_stream_entries(raw: &Value, is_known: impl Fn(&str) -> bool) -> Vec<Slot> {
    let items = match raw {
        Value::Null => return Vec::new(),
        Value::String(s) if s.is_empty() => return Vec::new(),
        Value::Array(items) => items,
        other => {
            tracing::debug!(
                found = other.type_name(),
                "stream wire value is not an array, reading as empty"
            );
            return Vec::new();
        }
    };

    let mut slots = Vec::with_capacity(items.len());
    for entry in items {
        let Some(block_type) = entry.get("type").and_then(Value::as_string) else {
            tracing::debug!("dropping stream entry without a string 'type'");
            continue;
        };
        if !is_known(block_type) {
            tracing::debug!(block_type, "dropping stream entry of unknown type");
            continue;
        }
        slots.push(Slot::Raw(RawEntry {
            block_type: block_type.to_string(),
            value: entry.get("value").cloned().unwrap_or(Value::Null),
            id: entry.get("id").and_then(Value::as_string).map(String::from),
        }));
    }
    slots
}

/// Parse a list's wire value into raw slots.
///
/// Current-format elements are `{"type": "item", "value": …, "id": …}`
/// envelopes. Anything else is accepted as the legacy plain-array shape:
/// the element itself is the child's wire value, with no identity yet.
pub(crate) fn parse_list_entries(raw: &Value) -> Vec<Slot> {
    let items = match raw {
        Value::Null => return Vec::new(),
        Value::String(s) if s.is_empty() => return Vec::new(),
        Value::Array(items) => items,
        other => {
            tracing::debug!(
                found = other.type_name(),
                "list wire value is not an array, reading as empty"
            );
            return Vec::new();
        }
    };

    items
        .iter()
        .map(|entry| {
            let is_envelope = entry.get("type").and_then(Value::as_string) == Some(LIST_ITEM_TYPE)
                && entry.get("value").is_some();
            if is_envelope {
                Slot::Raw(RawEntry {
                    block_type: LIST_ITEM_TYPE.to_string(),
                    value: entry.get("value").cloned().unwrap_or(Value::Null),
                    id: entry.get("id").and_then(Value::as_string).map(String::from),
                })
            } else {
                Slot::Raw(RawEntry {
                    block_type: LIST_ITEM_TYPE.to_string(),
                    value: entry.clone(),
                    id: None,
                })
            }
        })
        .collect()
}

/// Convert every still-raw slot of `block_type` in one batch.
pub(crate) fn bind_matching(slots: &mut [Slot], block_type: &str, child: &BlockDef) {
    let mut indices = Vec::new();
    let mut raws = Vec::new();
    for (i, slot) in slots.iter().enumerate() {
        if let Slot::Raw(entry) = slot {
            if entry.block_type == block_type {
                indices.push(i);
                raws.push(entry.value.clone());
            }
        }
    }
    if indices.is_empty() {
        return;
    }

    tracing::trace!(
        block_type,
        count = indices.len(),
        "converting wire entries in one batch"
    );
    let natives = child.bulk_to_native(&raws);
    debug_assert_eq!(natives.len(), indices.len());

    for (i, native) in indices.into_iter().zip(natives) {
        let id = match &slots[i] {
            Slot::Raw(entry) => entry.id.clone(),
            Slot::Bound(entry) => entry.id.clone(),
        };
        slots[i] = Slot::Bound(BoundEntry {
            block_type: block_type.to_string(),
            value: native,
            id,
        });
    }
}

/// Convert every still-raw slot, one batch per distinct type.
pub(crate) fn bind_all(slots: &mut [Slot], resolve: impl Fn(&str) -> Option<BlockDef>) {
    loop {
        let next = slots.iter().find_map(|slot| match slot {
            Slot::Raw(entry) => Some(entry.block_type.clone()),
            Slot::Bound(_) => None,
        });
        let Some(block_type) = next else {
            return;
        };
        match resolve(&block_type) {
            Some(child) => bind_matching(slots, &block_type, &child),
            None => {
                // Raw entries are filtered against the schema on parse, so
                // this only fires if a definition lost a child after the
                // value was built.
                tracing::warn!(block_type, "no definition for raw entries, emptying them");
                for slot in slots.iter_mut() {
                    if let Slot::Raw(entry) = slot {
                        if entry.block_type == block_type {
                            let id = entry.id.clone();
                            *slot = Slot::Bound(BoundEntry {
                                block_type: block_type.clone(),
                                value: BlockValue::None,
                                id,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Serialize slots back to an array of wire envelopes.
///
/// Still-raw slots re-emit their stored entry verbatim; bound slots
/// re-encode through the child definition. Either way an item without an
/// identity is assigned one here, in place, so repeated calls agree.
pub(crate) fn encode_entries(
    slots: &mut [Slot],
    resolve: impl Fn(&str) -> Option<BlockDef>,
) -> Value {
    let mut out = Vec::with_capacity(slots.len());
    for slot in slots.iter_mut() {
        match slot {
            Slot::Raw(entry) => {
                let id = entry.id.get_or_insert_with(new_item_id).clone();
                out.push(envelope(&entry.block_type, entry.value.clone(), id));
            }
            Slot::Bound(entry) => {
                let id = entry.id.get_or_insert_with(new_item_id).clone();
                let value = match resolve(&entry.block_type) {
                    Some(child) => child.to_wire(&mut entry.value),
                    None => {
                        tracing::warn!(
                            block_type = entry.block_type.as_str(),
                            "no definition for bound entry, emitting null value"
                        );
                        Value::Null
                    }
                };
                out.push(envelope(&entry.block_type, value, id));
            }
        }
    }
    Value::Array(out)
}

fn envelope(block_type: &str, value: Value, id: String) -> Value {
    Value::Object(
        [
            ("type".to_string(), Value::String(block_type.to_string())),
            ("value".to_string(), value),
            ("id".to_string(), Value::String(id)),
        ]
        .into_iter()
        .collect(),
    )
}

/// A bound (type, id, value) view of one slot, converting transiently when
/// the slot is still raw. Used by equality and the read-only projections,
/// none of which may mutate the value.
pub(crate) fn bound_view<'a>(
    slot: &'a Slot,
    resolve: &impl Fn(&str) -> Option<BlockDef>,
) -> (&'a str, Option<&'a str>, Cow<'a, BlockValue>) {
    match slot {
        Slot::Bound(entry) => (
            &entry.block_type,
            entry.id.as_deref(),
            Cow::Borrowed(&entry.value),
        ),
        Slot::Raw(entry) => {
            let native = resolve(&entry.block_type)
                .map(|child| child.to_native(&entry.value))
                .unwrap_or(BlockValue::None);
            (&entry.block_type, entry.id.as_deref(), Cow::Owned(native))
        }
    }
}

/// Compare two slot sequences by the rules sequence values use for
/// equality: same length; indices where both sides are still raw compare
/// their wire entries directly; any other combination compares the bound
/// (type, id, value) triples.
pub(crate) fn entries_eq(
    a: &[Slot],
    resolve_a: &impl Fn(&str) -> Option<BlockDef>,
    b: &[Slot],
    resolve_b: &impl Fn(&str) -> Option<BlockDef>,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).all(|(x, y)| match (x, y) {
        (Slot::Raw(rx), Slot::Raw(ry)) => rx == ry,
        _ => {
            let (tx, ix, vx) = bound_view(x, resolve_a);
            let (ty, iy, vy) = bound_view(y, resolve_b);
            tx == ty && ix == iy && vx == vy
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::CharBlock;
    use serde_json::json;

    fn wire(value: serde_json::Value) -> Value {
        Value::from_json_value(value)
    }

    #[test]
    fn stream_parsing_drops_malformed_entries() {
        let raw = wire(json!([
            {"type": "text", "value": "kept"},
            {"value": "no type"},
            "not even an object",
            {"type": 42, "value": "numeric type"},
        ]));
        let slots = parse_stream_entries(&raw, |ty| ty == "text");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].block_type(), "text");
    }

    #[test]
    fn list_parsing_distinguishes_envelopes_from_legacy_values() {
        let raw = wire(json!([
            {"type": "item", "value": "enveloped", "id": "u1"},
            "bare",
            {"type": "item"},
        ]));
        let slots = parse_list_entries(&raw);
        assert_eq!(slots.len(), 3);

        let Slot::Raw(first) = &slots[0] else {
            panic!("expected raw slot");
        };
        assert_eq!(first.value, Value::String("enveloped".to_string()));
        assert_eq!(first.id.as_deref(), Some("u1"));

        // A bare value, and an object that only looks like an envelope,
        // are both taken verbatim as legacy child values.
        let Slot::Raw(second) = &slots[1] else {
            panic!("expected raw slot");
        };
        assert_eq!(second.value, Value::String("bare".to_string()));
        assert_eq!(second.id, None);

        let Slot::Raw(third) = &slots[2] else {
            panic!("expected raw slot");
        };
        assert!(third.value.get("type").is_some());
    }

    #[test]
    fn encoding_assigns_missing_ids_in_place() {
        let mut slots = vec![
            Slot::Raw(RawEntry {
                block_type: "text".to_string(),
                value: Value::String("a".to_string()),
                id: None,
            }),
            Slot::Bound(BoundEntry {
                block_type: "text".to_string(),
                value: BlockValue::Str("b".to_string()),
                id: None,
            }),
        ];
        let child = BlockDef::leaf(CharBlock::new());
        let out = encode_entries(&mut slots, |_| Some(child.clone()));

        let entries = out.as_array().unwrap();
        for (slot, entry) in slots.iter().zip(entries) {
            let emitted = entry.get("id").and_then(Value::as_string).unwrap();
            let held = match slot {
                Slot::Raw(e) => e.id.as_deref(),
                Slot::Bound(e) => e.id.as_deref(),
            };
            assert_eq!(held, Some(emitted));
        }
    }

    #[test]
    fn binding_converts_only_the_requested_type() {
        let child = BlockDef::leaf(CharBlock::new());
        let mut slots = vec![
            Slot::Raw(RawEntry {
                block_type: "a".to_string(),
                value: Value::String("one".to_string()),
                id: None,
            }),
            Slot::Raw(RawEntry {
                block_type: "b".to_string(),
                value: Value::String("two".to_string()),
                id: None,
            }),
        ];

        bind_matching(&mut slots, "a", &child);
        assert!(slots[0].is_bound());
        assert!(!slots[1].is_bound());
    }
}
