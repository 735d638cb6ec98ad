// Wire types and value formats for the datastore write path.
//
// `SubmissionRequest` is what a caller hands to the submitter;
// `SubmissionOutcome` is the single classified result it gets back.
// `SubmitBody` / `SubmitResponse` are the JSON shapes exchanged with
// the hub's datastore endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Returned when a `SubmissionRequest` is built from invalid parts.
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("datastore target id must not be empty")]
    EmptyTarget,

    #[error("datastore format must not be empty")]
    EmptyFormat,
}

/// Returned when user text cannot be interpreted under a datastore format.
#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("`{input}` is not a valid number")]
    InvalidNumber { input: String },

    #[error("`{input}` is not a valid boolean (expected true/false, yes/no, on/off, 1/0)")]
    InvalidBool { input: String },

    #[error("`{input}` is not a number followed by units")]
    InvalidUnits { input: String },
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// How a datastore value is interpreted.
///
/// Unknown tags are treated as string formats, keeping the given tag so
/// it round-trips to the server unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Number,
    NumberUnits,
    Bool,
    String(String),
}

impl Format {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "number" => Format::Number,
            "number+units" => Format::NumberUnits,
            "bool" => Format::Bool,
            _ => Format::String(tag.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Format::Number => "number",
            Format::NumberUnits => "number+units",
            Format::Bool => "bool",
            Format::String(tag) => tag,
        }
    }

    /// Interpret raw user input as a JSON value under this format.
    pub fn parse_value(&self, raw: &str) -> Result<Value, ValueError> {
        match self {
            Format::Number => parse_number(raw.trim()).ok_or_else(|| ValueError::InvalidNumber {
                input: raw.to_string(),
            }),
            Format::Bool => parse_bool(raw.trim()).map(Value::Bool).ok_or_else(|| {
                ValueError::InvalidBool {
                    input: raw.to_string(),
                }
            }),
            Format::NumberUnits => {
                parse_number_units(raw.trim()).ok_or_else(|| ValueError::InvalidUnits {
                    input: raw.to_string(),
                })
            }
            Format::String(_) => Ok(Value::String(raw.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Integers stay integers on the wire; everything else must be a finite f64.
fn parse_number(s: &str) -> Option<Value> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::from(n));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    serde_json::Number::from_f64(f).map(Value::Number)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `"21.5C"` / `"21.5 C"` -> `{"value": 21.5, "units": "C"}`.
fn parse_number_units(s: &str) -> Option<Value> {
    let split = s
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0))
        })
        .map(|(i, _)| i)?;
    let (number, units) = s.split_at(split);
    let units = units.trim();
    if units.is_empty() {
        return None;
    }
    let value = parse_number(number)?;
    Some(serde_json::json!({ "value": value, "units": units }))
}

// ---------------------------------------------------------------------------
// SubmissionRequest
// ---------------------------------------------------------------------------

/// A value to be written to one datastore. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
    target_id: String,
    value: Value,
    format: String,
}

impl SubmissionRequest {
    pub fn new(
        target_id: impl Into<String>,
        value: Value,
        format: impl Into<String>,
    ) -> Result<Self, RequestError> {
        let target_id = target_id.into();
        let format = format.into();
        if target_id.trim().is_empty() {
            return Err(RequestError::EmptyTarget);
        }
        if format.trim().is_empty() {
            return Err(RequestError::EmptyFormat);
        }
        Ok(Self {
            target_id,
            value,
            format,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub(crate) fn body(&self) -> SubmitBody<'_> {
        SubmitBody {
            value: &self.value,
            format: &self.format,
        }
    }
}

// ---------------------------------------------------------------------------
// SubmissionOutcome
// ---------------------------------------------------------------------------

/// Classified result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The endpoint stored the value.
    Accepted,
    /// The endpoint refused the value for a business reason.
    Rejected { reason: String },
    /// Network, status, or response-parsing failure.
    TransportError { detail: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted)
    }

    pub(crate) fn transport(detail: impl Into<String>) -> Self {
        SubmissionOutcome::TransportError {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionOutcome::Accepted => f.write_str("accepted"),
            SubmissionOutcome::Rejected { reason } => write!(f, "rejected: {reason}"),
            SubmissionOutcome::TransportError { detail } => write!(f, "error: {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

/// JSON body of a write: `{"value": ..., "format": "..."}`.
#[derive(Debug, Serialize)]
pub(crate) struct SubmitBody<'a> {
    pub value: &'a Value,
    pub format: &'a str,
}

/// JSON body the endpoint answers a successful write with.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_rejects_empty_target() {
        let err = SubmissionRequest::new("", json!(1), "number").unwrap_err();
        assert_eq!(err, RequestError::EmptyTarget);
    }

    #[test]
    fn request_rejects_blank_format() {
        let err = SubmissionRequest::new("temp1", json!(1), "  ").unwrap_err();
        assert_eq!(err, RequestError::EmptyFormat);
    }

    #[test]
    fn body_serializes_value_and_format() {
        let req = SubmissionRequest::new("temp1", json!(21.5), "number").unwrap();
        let body = serde_json::to_value(req.body()).unwrap();
        assert_eq!(body, json!({ "value": 21.5, "format": "number" }));
    }

    #[test]
    fn response_reason_is_optional() {
        let resp: SubmitResponse = serde_json::from_str(r#"{"accepted":true}"#).unwrap();
        assert!(resp.accepted);
        assert!(resp.reason.is_none());

        let resp: SubmitResponse =
            serde_json::from_str(r#"{"accepted":false,"reason":"out of range"}"#).unwrap();
        assert!(!resp.accepted);
        assert_eq!(resp.reason.as_deref(), Some("out of range"));
    }

    #[test]
    fn response_without_accepted_flag_fails_to_parse() {
        assert!(serde_json::from_str::<SubmitResponse>(r#"{"ok":true}"#).is_err());
    }

    // -- Format --

    #[test]
    fn format_tags_are_case_insensitive() {
        assert_eq!(Format::from_tag("NUMBER"), Format::Number);
        assert_eq!(Format::from_tag("number+units"), Format::NumberUnits);
        assert_eq!(Format::from_tag("Bool"), Format::Bool);
    }

    #[test]
    fn unknown_format_keeps_its_tag() {
        let f = Format::from_tag("rfid");
        assert_eq!(f, Format::String("rfid".to_string()));
        assert_eq!(f.tag(), "rfid");
        assert_eq!(f.parse_value("04:a2:ff").unwrap(), json!("04:a2:ff"));
    }

    #[test]
    fn number_keeps_integers_integral() {
        assert_eq!(Format::Number.parse_value("42").unwrap(), json!(42));
        assert_eq!(Format::Number.parse_value(" 21.5 ").unwrap(), json!(21.5));
    }

    #[test]
    fn number_rejects_garbage_and_non_finite() {
        assert!(matches!(
            Format::Number.parse_value("warm"),
            Err(ValueError::InvalidNumber { .. })
        ));
        assert!(Format::Number.parse_value("inf").is_err());
        assert!(Format::Number.parse_value("NaN").is_err());
    }

    #[test]
    fn bool_accepts_common_spellings() {
        for s in ["true", "YES", "on", "1"] {
            assert_eq!(Format::Bool.parse_value(s).unwrap(), json!(true), "{s}");
        }
        for s in ["false", "No", "OFF", "0"] {
            assert_eq!(Format::Bool.parse_value(s).unwrap(), json!(false), "{s}");
        }
        assert!(Format::Bool.parse_value("maybe").is_err());
    }

    #[test]
    fn number_units_splits_value_and_units() {
        assert_eq!(
            Format::NumberUnits.parse_value("21.5C").unwrap(),
            json!({ "value": 21.5, "units": "C" })
        );
        assert_eq!(
            Format::NumberUnits.parse_value("-3 km/h").unwrap(),
            json!({ "value": -3, "units": "km/h" })
        );
    }

    #[test]
    fn number_units_requires_both_parts() {
        assert!(Format::NumberUnits.parse_value("21.5").is_err());
        assert!(Format::NumberUnits.parse_value("C").is_err());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(SubmissionOutcome::Accepted.to_string(), "accepted");
        assert_eq!(
            SubmissionOutcome::Rejected {
                reason: "out of range".into()
            }
            .to_string(),
            "rejected: out of range"
        );
        assert_eq!(
            SubmissionOutcome::transport("boom").to_string(),
            "error: boom"
        );
    }
}
