//! Built-in field blocks: the basic leaf shapes most schemas are made of.
//!
//! Wire conversion is deliberately forgiving: whatever is stored becomes
//! *some* native value, and `clean` is where problems are reported. That
//! split keeps reads infallible even over content written by older schema
//! versions.

use trellis_api::Value;

use crate::base::{BlockValue, LeafBlock};
use crate::error::{SchemaError, ValidationError};
use crate::form::FormData;

/// A single line of text.
#[derive(Debug, Clone)]
pub struct CharBlock {
    required: bool,
    max_length: Option<usize>,
    default: Option<String>,
}

impl CharBlock {
    pub fn new() -> Self {
        Self {
            required: true,
            max_length: None,
            default: None,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

impl LeafBlock for CharBlock {
    fn kind(&self) -> &str {
        "char"
    }

    fn to_native(&self, raw: &Value) -> BlockValue {
        match raw {
            Value::String(s) => BlockValue::Str(s.clone()),
            Value::Null => BlockValue::Str(String::new()),
            Value::Integer(i) => BlockValue::Str(i.to_string()),
            Value::Float(f) => BlockValue::Str(f.to_string()),
            Value::Boolean(b) => BlockValue::Str(b.to_string()),
            other => {
                tracing::debug!(found = other.type_name(), "char value is not text");
                BlockValue::Str(String::new())
            }
        }
    }

    fn to_wire(&self, value: &BlockValue) -> Value {
        match value.as_str() {
            Some(s) => Value::String(s.to_string()),
            None => Value::Null,
        }
    }

    fn default_value(&self) -> BlockValue {
        BlockValue::Str(self.default.clone().unwrap_or_default())
    }

    fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue {
        BlockValue::Str(form.get(prefix).unwrap_or("").to_string())
    }

    fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError> {
        let text = value.as_str().unwrap_or("");
        let mut messages = Vec::new();
        if self.required && text.is_empty() {
            messages.push("This field is required.".to_string());
        }
        if let Some(max) = self.max_length {
            let length = text.chars().count();
            if length > max {
                messages.push(format!(
                    "Ensure this value has at most {max} characters (it has {length})."
                ));
            }
        }
        if messages.is_empty() {
            Ok(BlockValue::Str(text.to_string()))
        } else {
            Err(ValidationError::Leaf { messages })
        }
    }

    fn searchable_text(&self, value: &BlockValue) -> Vec<String> {
        match value.as_str() {
            Some(s) if !s.is_empty() => vec![s.to_string()],
            _ => Vec::new(),
        }
    }
}

/// A whole number, optionally bounded.
#[derive(Debug, Clone)]
pub struct IntegerBlock {
    required: bool,
    min_value: Option<i64>,
    max_value: Option<i64>,
    default: Option<i64>,
}

impl IntegerBlock {
    pub fn new() -> Self {
        Self {
            required: true,
            min_value: None,
            max_value: None,
            default: None,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_min_value(mut self, min_value: i64) -> Self {
        self.min_value = Some(min_value);
        self
    }

    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn with_default(mut self, default: i64) -> Self {
        self.default = Some(default);
        self
    }
}

impl LeafBlock for IntegerBlock {
    fn kind(&self) -> &str {
        "integer"
    }

    fn to_native(&self, raw: &Value) -> BlockValue {
        match raw {
            Value::Integer(i) => BlockValue::Int(*i),
            Value::Float(f) if f.fract() == 0.0 => BlockValue::Int(*f as i64),
            Value::String(s) => s
                .trim()
                .parse()
                .map(BlockValue::Int)
                .unwrap_or(BlockValue::None),
            Value::Null => BlockValue::None,
            other => {
                tracing::debug!(found = other.type_name(), "integer value is not numeric");
                BlockValue::None
            }
        }
    }

    fn to_wire(&self, value: &BlockValue) -> Value {
        match value.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Null,
        }
    }

    fn default_value(&self) -> BlockValue {
        match self.default {
            Some(i) => BlockValue::Int(i),
            None => BlockValue::None,
        }
    }

    fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue {
        form.get(prefix)
            .and_then(|v| v.trim().parse().ok())
            .map(BlockValue::Int)
            .unwrap_or(BlockValue::None)
    }

    fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError> {
        let Some(number) = value.as_i64() else {
            if self.required {
                return Err(ValidationError::required());
            }
            return Ok(BlockValue::None);
        };
        let mut messages = Vec::new();
        if let Some(min) = self.min_value {
            if number < min {
                messages.push(format!(
                    "Ensure this value is greater than or equal to {min}."
                ));
            }
        }
        if let Some(max) = self.max_value {
            if number > max {
                messages.push(format!("Ensure this value is less than or equal to {max}."));
            }
        }
        if messages.is_empty() {
            Ok(BlockValue::Int(number))
        } else {
            Err(ValidationError::Leaf { messages })
        }
    }

    fn check(&self) -> Vec<SchemaError> {
        match (self.min_value, self.max_value) {
            (Some(min), Some(max)) if min > max => {
                vec![SchemaError::InvalidValueRange { min, max }]
            }
            _ => Vec::new(),
        }
    }
}

/// A checkbox. `required` means the box must be checked, which is what a
/// consent/confirmation field wants; use `with_required(false)` for a plain
/// toggle.
#[derive(Debug, Clone)]
pub struct BooleanBlock {
    required: bool,
}

impl BooleanBlock {
    pub fn new() -> Self {
        Self { required: true }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

impl LeafBlock for BooleanBlock {
    fn kind(&self) -> &str {
        "boolean"
    }

    fn to_native(&self, raw: &Value) -> BlockValue {
        match raw {
            Value::Boolean(b) => BlockValue::Bool(*b),
            Value::Integer(i) => BlockValue::Bool(*i != 0),
            Value::String(s) => BlockValue::Bool(matches!(s.as_str(), "true" | "1" | "on")),
            _ => BlockValue::Bool(false),
        }
    }

    fn to_wire(&self, value: &BlockValue) -> Value {
        Value::Boolean(value.as_bool().unwrap_or(false))
    }

    fn default_value(&self) -> BlockValue {
        BlockValue::Bool(false)
    }

    fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue {
        // Browsers omit unchecked checkboxes from the submission.
        let checked = form
            .get(prefix)
            .is_some_and(|v| matches!(v, "on" | "true" | "1"));
        BlockValue::Bool(checked)
    }

    fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError> {
        let checked = value.as_bool().unwrap_or(false);
        if self.required && !checked {
            return Err(ValidationError::required());
        }
        Ok(BlockValue::Bool(checked))
    }
}

/// One value out of a fixed set of (value, label) choices.
#[derive(Debug, Clone)]
pub struct ChoiceBlock {
    choices: Vec<(String, String)>,
    required: bool,
    default: Option<String>,
}

impl ChoiceBlock {
    pub fn new(choices: Vec<(impl Into<String>, impl Into<String>)>) -> Self {
        Self {
            choices: choices
                .into_iter()
                .map(|(value, label)| (value.into(), label.into()))
                .collect(),
            required: true,
            default: None,
        }
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn label_for(&self, value: &str) -> Option<&str> {
        self.choices
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, label)| label.as_str())
    }
}

impl LeafBlock for ChoiceBlock {
    fn kind(&self) -> &str {
        "choice"
    }

    fn to_native(&self, raw: &Value) -> BlockValue {
        match raw {
            Value::String(s) => BlockValue::Str(s.clone()),
            Value::Null => BlockValue::Str(String::new()),
            other => {
                tracing::debug!(found = other.type_name(), "choice value is not text");
                BlockValue::Str(String::new())
            }
        }
    }

    fn to_wire(&self, value: &BlockValue) -> Value {
        match value.as_str() {
            Some(s) => Value::String(s.to_string()),
            None => Value::Null,
        }
    }

    fn default_value(&self) -> BlockValue {
        BlockValue::Str(self.default.clone().unwrap_or_default())
    }

    fn value_from_form(&self, form: &FormData, prefix: &str) -> BlockValue {
        BlockValue::Str(form.get(prefix).unwrap_or("").to_string())
    }

    fn clean(&self, value: &BlockValue) -> Result<BlockValue, ValidationError> {
        let selected = value.as_str().unwrap_or("");
        if selected.is_empty() {
            if self.required {
                return Err(ValidationError::required());
            }
            return Ok(BlockValue::Str(String::new()));
        }
        if self.label_for(selected).is_none() {
            return Err(ValidationError::leaf(format!(
                "Select a valid choice. '{selected}' is not one of the available choices."
            )));
        }
        Ok(BlockValue::Str(selected.to_string()))
    }

    fn searchable_text(&self, value: &BlockValue) -> Vec<String> {
        value
            .as_str()
            .and_then(|v| self.label_for(v))
            .map(|label| vec![label.to_string()])
            .unwrap_or_default()
    }

    fn check(&self) -> Vec<SchemaError> {
        if self.choices.is_empty() {
            vec![SchemaError::NoChoices]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::BlockDef;

    #[test]
    fn char_clean_checks_required_and_length() {
        let block = CharBlock::new().with_max_length(5);

        assert!(block.clean(&BlockValue::Str("ok".into())).is_ok());

        let err = block.clean(&BlockValue::Str("".into())).unwrap_err();
        assert_eq!(err.to_string(), "This field is required.");

        let err = block.clean(&BlockValue::Str("too long".into())).unwrap_err();
        assert!(err.to_string().contains("at most 5 characters"));
    }

    #[test]
    fn char_optional_accepts_empty() {
        let block = CharBlock::new().with_required(false);
        assert_eq!(
            block.clean(&BlockValue::Str(String::new())).unwrap(),
            BlockValue::Str(String::new())
        );
    }

    #[test]
    fn integer_to_native_is_lenient() {
        let block = IntegerBlock::new();
        assert_eq!(block.to_native(&Value::Integer(3)), BlockValue::Int(3));
        assert_eq!(block.to_native(&Value::Float(3.0)), BlockValue::Int(3));
        assert_eq!(block.to_native(&Value::from(" 7 ")), BlockValue::Int(7));
        assert_eq!(block.to_native(&Value::from("x")), BlockValue::None);
        assert_eq!(block.to_native(&Value::Null), BlockValue::None);
    }

    #[test]
    fn integer_range_messages() {
        let block = IntegerBlock::new().with_min_value(1).with_max_value(10);
        let err = block.clean(&BlockValue::Int(0)).unwrap_err();
        assert!(err.to_string().contains("greater than or equal to 1"));

        let err = block.clean(&BlockValue::Int(11)).unwrap_err();
        assert!(err.to_string().contains("less than or equal to 10"));
    }

    #[test]
    fn integer_check_flags_inverted_range() {
        let block = IntegerBlock::new().with_min_value(10).with_max_value(1);
        assert_eq!(
            block.check(),
            vec![SchemaError::InvalidValueRange { min: 10, max: 1 }]
        );
    }

    #[test]
    fn boolean_form_parsing_treats_absence_as_unchecked() {
        let block = BooleanBlock::new().with_required(false);
        let form = FormData::new().with_field("agree", "on");
        assert_eq!(block.value_from_form(&form, "agree"), BlockValue::Bool(true));
        assert_eq!(
            block.value_from_form(&form, "missing"),
            BlockValue::Bool(false)
        );
    }

    #[test]
    fn choice_rejects_values_outside_the_set() {
        let block = ChoiceBlock::new(vec![("draft", "Draft"), ("live", "Live")]);
        assert!(block.clean(&BlockValue::Str("live".into())).is_ok());

        let err = block.clean(&BlockValue::Str("retired".into())).unwrap_err();
        assert!(err.to_string().contains("not one of the available choices"));
    }

    #[test]
    fn choice_searchable_text_uses_the_label() {
        let block = ChoiceBlock::new(vec![("draft", "Draft"), ("live", "Live")]);
        assert_eq!(
            block.searchable_text(&BlockValue::Str("draft".into())),
            vec!["Draft".to_string()]
        );
    }

    #[test]
    fn defaults_are_fresh_values() {
        let def = BlockDef::leaf(CharBlock::new().with_default("hello"));
        let a = def.default_value();
        let b = def.default_value();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), Some("hello"));
    }
}
