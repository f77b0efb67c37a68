//! Explicit request-parameter validation.
//!
//! Violations are collected in field declaration order so the rendered
//! message is stable: `owner is missing, owner is empty, key is missing, ...`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    Empty,
    Invalid,
    NotAllowed,
}

impl ViolationKind {
    pub fn message(&self) -> &'static str {
        match self {
            ViolationKind::Missing => "is missing",
            ViolationKind::Empty => "is empty",
            ViolationKind::Invalid => "is invalid",
            ViolationKind::NotAllowed => "does not have a valid value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub kind: ViolationKind,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.kind.message())
    }
}

/// Ordered list of violations. Never reordered or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldViolations(Vec<FieldViolation>);

impl FieldViolations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, kind: ViolationKind) {
        self.0.push(FieldViolation {
            field: field.into(),
            kind,
        });
    }

    /// An absent field reports both `is missing` and `is empty`.
    pub fn missing(&mut self, field: &str) {
        self.push(field, ViolationKind::Missing);
        self.push(field, ViolationKind::Empty);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldViolation> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldViolations> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Presence check for a required text field.
pub fn require_present(violations: &mut FieldViolations, field: &str, value: Option<&str>) {
    match value {
        None => violations.missing(field),
        Some(v) if v.trim().is_empty() => violations.push(field, ViolationKind::Empty),
        Some(_) => {}
    }
}

/// Typed reader over the `data` object of an envelope payload.
///
/// Each accessor records its own violation and returns `None` on failure,
/// so a handler can read every field before deciding.
pub struct Params<'a> {
    data: &'a Map<String, Value>,
    violations: FieldViolations,
}

impl<'a> Params<'a> {
    pub fn new(data: &'a Map<String, Value>) -> Self {
        Self {
            data,
            violations: FieldViolations::new(),
        }
    }

    /// Required non-blank string. Numbers and booleans are accepted in their
    /// textual form; `null` counts as empty.
    pub fn required_str(&mut self, field: &str) -> Option<String> {
        let Some(raw) = self.data.get(field) else {
            self.violations.missing(field);
            return None;
        };
        match scalar_text(raw) {
            Ok(text) if text.trim().is_empty() => {
                self.violations.push(field, ViolationKind::Empty);
                None
            }
            Ok(text) => Some(text),
            Err(()) => {
                self.violations.push(field, ViolationKind::Invalid);
                None
            }
        }
    }

    /// Required string that must also pass `check`, else `is invalid`.
    pub fn required_matching(
        &mut self,
        field: &str,
        check: impl FnOnce(&str) -> bool,
    ) -> Option<String> {
        let text = self.required_str(field)?;
        if check(text.trim()) {
            Some(text)
        } else {
            self.violations.push(field, ViolationKind::Invalid);
            None
        }
    }

    /// Optional string. Blank and `null` read as absent.
    pub fn optional_str(&mut self, field: &str) -> Option<String> {
        let raw = self.data.get(field)?;
        match scalar_text(raw) {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(text),
            Err(()) => {
                self.violations.push(field, ViolationKind::Invalid);
                None
            }
        }
    }

    /// Optional boolean. Accepts JSON booleans and `"true"` / `"false"`.
    pub fn optional_bool(&mut self, field: &str) -> Option<bool> {
        match self.data.get(field)? {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                "" => None,
                _ => {
                    self.violations.push(field, ViolationKind::Invalid);
                    None
                }
            },
            _ => {
                self.violations.push(field, ViolationKind::Invalid);
                None
            }
        }
    }

    /// Optional integer. Accepts JSON integers and decimal strings.
    pub fn optional_i64(&mut self, field: &str) -> Option<i64> {
        let parsed = match self.data.get(field)? {
            Value::Null => return None,
            Value::Number(n) => n.as_i64(),
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.violations.push(field, ViolationKind::Invalid);
        }
        parsed
    }

    /// Optional unix timestamp in seconds. Out of `DateTime` range is `is invalid`.
    pub fn optional_timestamp(&mut self, field: &str) -> Option<DateTime<Utc>> {
        let secs = self.optional_i64(field)?;
        let at = DateTime::<Utc>::from_timestamp(secs, 0);
        if at.is_none() {
            self.violations.push(field, ViolationKind::Invalid);
        }
        at
    }

    /// Optional value constrained by `parse`; failures report
    /// `does not have a valid value`.
    pub fn optional_parsed<T>(
        &mut self,
        field: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        let text = self.optional_str(field)?;
        let parsed = parse(text.trim());
        if parsed.is_none() {
            self.violations.push(field, ViolationKind::NotAllowed);
        }
        parsed
    }

    pub fn finish(self) -> Result<(), FieldViolations> {
        self.violations.into_result()
    }
}

fn scalar_text(value: &Value) -> Result<String, ()> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) | Value::Object(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_all_missing_in_declaration_order() {
        let data = Map::new();
        let mut params = Params::new(&data);
        params.required_str("owner");
        params.required_str("key");
        params.required_str("value");
        assert_eq!(
            params.finish().unwrap_err().to_string(),
            "owner is missing, owner is empty, key is missing, key is empty, value is missing, value is empty"
        );
    }

    #[test]
    fn test_blank_is_empty_only() {
        let data = data(json!({ "owner": "ID1", "key": "  ", "value": null }));
        let mut params = Params::new(&data);
        assert_eq!(params.required_str("owner").as_deref(), Some("ID1"));
        assert!(params.required_str("key").is_none());
        assert!(params.required_str("value").is_none());
        assert_eq!(
            params.finish().unwrap_err().to_string(),
            "key is empty, value is empty"
        );
    }

    #[test]
    fn test_scalars_read_as_text() {
        let data = data(json!({ "value": 42, "flag": true }));
        let mut params = Params::new(&data);
        assert_eq!(params.required_str("value").as_deref(), Some("42"));
        assert_eq!(params.required_str("flag").as_deref(), Some("true"));
        assert!(params.finish().is_ok());
    }

    #[test]
    fn test_structured_value_is_invalid() {
        let data = data(json!({ "key": ["a"] }));
        let mut params = Params::new(&data);
        assert!(params.required_str("key").is_none());
        assert_eq!(params.finish().unwrap_err().to_string(), "key is invalid");
    }

    #[test]
    fn test_required_matching_keeps_declaration_order() {
        let data = data(json!({ "email": "not-an-address" }));
        let mut params = Params::new(&data);
        assert!(params.required_matching("email", |e| e.contains('@')).is_none());
        assert!(params.required_str("password").is_none());
        assert_eq!(
            params.finish().unwrap_err().to_string(),
            "email is invalid, password is missing, password is empty"
        );
    }

    #[test]
    fn test_optional_bool() {
        let data = data(json!({ "a": false, "b": "true", "c": "maybe" }));
        let mut params = Params::new(&data);
        assert_eq!(params.optional_bool("a"), Some(false));
        assert_eq!(params.optional_bool("b"), Some(true));
        assert_eq!(params.optional_bool("c"), None);
        assert_eq!(params.optional_bool("absent"), None);
        assert_eq!(params.finish().unwrap_err().to_string(), "c is invalid");
    }

    #[test]
    fn test_optional_i64() {
        let data = data(json!({ "from": 1_700_000_000, "to": "1700000500", "bad": 1.5 }));
        let mut params = Params::new(&data);
        assert_eq!(params.optional_i64("from"), Some(1_700_000_000));
        assert_eq!(params.optional_i64("to"), Some(1_700_000_500));
        assert_eq!(params.optional_i64("bad"), None);
        assert_eq!(params.finish().unwrap_err().to_string(), "bad is invalid");
    }

    #[test]
    fn test_optional_timestamp_out_of_range() {
        let data = data(json!({
            "from": 1_700_000_000,
            "to": -99_999_999_999_999_i64,
            "at": 99_999_999_999_999_i64
        }));
        let mut params = Params::new(&data);
        assert_eq!(
            params.optional_timestamp("from").map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert!(params.optional_timestamp("to").is_none());
        assert!(params.optional_timestamp("at").is_none());
        assert!(params.optional_timestamp("absent").is_none());
        assert_eq!(
            params.finish().unwrap_err().to_string(),
            "to is invalid, at is invalid"
        );
    }

    #[test]
    fn test_optional_parsed_not_allowed() {
        let data = data(json!({ "scope": "secret" }));
        let mut params = Params::new(&data);
        let scope = params.optional_parsed("scope", |s| (s == "public").then_some(s.to_string()));
        assert!(scope.is_none());
        assert_eq!(
            params.finish().unwrap_err().to_string(),
            "scope does not have a valid value"
        );
    }

    #[test]
    fn test_require_present() {
        let mut violations = FieldViolations::new();
        require_present(&mut violations, "owner", Some("ID1"));
        require_present(&mut violations, "key", None);
        require_present(&mut violations, "value", Some(""));
        assert_eq!(violations.len(), 3);
        assert_eq!(
            violations.to_string(),
            "key is missing, key is empty, value is empty"
        );
    }
}
