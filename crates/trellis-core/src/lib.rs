//! Schema-described content trees.
//!
//! This crate provides the block model used to store editorial content as a
//! single semi-structured value:
//! - `BlockDef`: an immutable, shareable schema node (struct, list,
//!   stream, or a leaf field block)
//! - `StructValue` / `ListValue` / `StreamValue`: the native value wrappers,
//!   with lazy, type-batched conversion for sequences
//! - `ValidationError`: aggregate validation reporting that keeps each
//!   child error addressable by name or index
//!
//! Content read from storage stays in wire form until first access, and
//! items never touched round-trip back to storage without ever paying
//! their conversion cost.

pub mod base;
pub mod error;
pub mod field;
pub mod form;
pub mod list;
mod slot;
pub mod stream;
pub mod struct_block;


pub use base::{BlockDef, BlockValue, LeafBlock};
pub use error::{
    ListError, SchemaError, StreamError, StructError, UnknownChildError, ValidationError,
};
pub use field::{BooleanBlock, CharBlock, ChoiceBlock, IntegerBlock};
pub use form::FormData;
pub use list::{ListBlock, ListValue};
pub use slot::BoundEntry;
pub use stream::{BlockCount, StreamBlock, StreamValue};
pub use struct_block::{BoundChild, StructBlock, StructValue};
