//! Wire-level data model for Trellis content trees.
//!
//! This crate provides the `Value` type: the JSON-shaped representation that
//! content trees are persisted as. The persistence column owns the outer
//! JSON text; everything above it works in terms of `Value`.

pub mod value;

pub use value::{Value, ValueTypeError};
