//! Schema validation
//!
//! Evaluates a candidate field map against an intake schema and maps
//! constraint failures to structured field errors plus next-action hints
//! that tell the calling agent what to do next.
//!
//! Partial validation (for in-progress submissions) reports
//! missing-required fields without failing, because those fields are
//! expected to be filled by a later actor. Full validation, run at
//! submit, fails on anything incomplete.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::FieldMap;
use crate::schema::{FieldKind, FieldSpec, IntakeSchema};

/// Machine-readable constraint-failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorCode {
    Required,
    InvalidType,
    InvalidFormat,
    InvalidValue,
    TooLong,
    TooShort,
    FileRequired,
    FileTooLarge,
    FileWrongType,
    Custom,
}

/// One constraint failure, addressed to a field path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub path: String,
    pub code: FieldErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl FieldError {
    pub fn new(path: impl Into<String>, code: FieldErrorCode, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            message: message.into(),
            expected: None,
            received: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn received(mut self, received: impl Into<String>) -> Self {
        self.received = Some(received.into());
        self
    }
}

/// What the calling actor should do next to move the submission forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    CollectField {
        field: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestUpload {
        field: String,
        accept: Vec<String>,
        max_bytes: u64,
    },
    RetryDelivery,
    Cancel,
    WaitForReview,
}

/// Outcome of a validation pass.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// False only when a present field violates its constraints (or, in
    /// full mode, when anything required is missing).
    pub ok: bool,
    /// Present fields, normalized (trimmed emails, etc.).
    pub normalized: FieldMap,
    pub errors: Vec<FieldError>,
    /// Required paths absent from the candidate map.
    pub missing: Vec<String>,
    pub next_actions: Vec<NextAction>,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

/// Validate present fields only; report absent required fields as
/// missing hints, not failures.
pub fn validate_partial(schema: &IntakeSchema, candidate: &FieldMap) -> ValidationReport {
    let mut report = validate_present(schema, candidate);
    report.missing = missing_required(schema, candidate);
    report.next_actions = hints_for_missing(schema, &report.missing);
    report
}

/// Validate the complete field map at submit time. Every required field
/// must be present and valid; required file fields must appear in
/// `completed_uploads`.
pub fn validate_full(
    schema: &IntakeSchema,
    fields: &FieldMap,
    completed_uploads: &BTreeSet<String>,
) -> ValidationReport {
    let mut report = validate_present(schema, fields);

    for path in schema.required_paths() {
        let spec = schema.field(path).expect("required path exists in schema");
        if spec.is_file() {
            if !completed_uploads.contains(path) {
                report.ok = false;
                report.missing.push(path.to_string());
                report.errors.push(
                    FieldError::new(path, FieldErrorCode::FileRequired, "a completed upload is required")
                        .expected("completed upload"),
                );
            }
        } else if !fields.contains_key(path) {
            report.ok = false;
            report.missing.push(path.to_string());
            report
                .errors
                .push(FieldError::new(path, FieldErrorCode::Required, "field is required"));
        }
    }

    report.next_actions = hints_for_missing(schema, &report.missing);
    report
}

fn validate_present(schema: &IntakeSchema, candidate: &FieldMap) -> ValidationReport {
    let mut normalized = FieldMap::new();
    let mut errors = Vec::new();

    for (path, value) in candidate {
        match schema.field(path) {
            None => errors.push(FieldError::new(
                path,
                FieldErrorCode::Custom,
                "field is not declared by the intake",
            )),
            Some(spec) => match validate_value(path, spec, value) {
                Ok(clean) => {
                    normalized.insert(path.clone(), clean);
                }
                Err(error) => errors.push(error),
            },
        }
    }

    ValidationReport {
        ok: errors.is_empty(),
        normalized,
        errors,
        missing: Vec::new(),
        next_actions: Vec::new(),
    }
}

fn validate_value(path: &str, spec: &FieldSpec, value: &Value) -> Result<Value, FieldError> {
    match &spec.kind {
        FieldKind::String => {
            let s = expect_string(path, value, "string")?;
            check_length(path, spec, s)?;
            Ok(Value::String(s.to_string()))
        }
        FieldKind::Email => {
            let s = expect_string(path, value, "email")?;
            let trimmed = s.trim().to_ascii_lowercase();
            if !EMAIL_RE.is_match(&trimmed) {
                return Err(FieldError::new(
                    path,
                    FieldErrorCode::InvalidFormat,
                    "not a valid email address",
                )
                .expected("email")
                .received(s.to_string()));
            }
            Ok(Value::String(trimmed))
        }
        FieldKind::Number => {
            if value.is_number() {
                Ok(value.clone())
            } else {
                Err(type_error(path, value, "number"))
            }
        }
        FieldKind::Boolean => {
            if value.is_boolean() {
                Ok(value.clone())
            } else {
                Err(type_error(path, value, "boolean"))
            }
        }
        FieldKind::Enum { values } => {
            let s = expect_string(path, value, "string")?;
            if values.iter().any(|allowed| allowed == s) {
                Ok(Value::String(s.to_string()))
            } else {
                Err(FieldError::new(
                    path,
                    FieldErrorCode::InvalidValue,
                    "value is not one of the allowed options",
                )
                .expected(values.join(" | "))
                .received(s.to_string()))
            }
        }
        FieldKind::File { .. } => Err(FieldError::new(
            path,
            FieldErrorCode::InvalidValue,
            "file fields are populated through the upload flow, not direct writes",
        )),
    }
}

fn expect_string<'v>(
    path: &str,
    value: &'v Value,
    expected: &'static str,
) -> Result<&'v str, FieldError> {
    value.as_str().ok_or_else(|| type_error(path, value, expected))
}

fn type_error(path: &str, value: &Value, expected: &'static str) -> FieldError {
    FieldError::new(path, FieldErrorCode::InvalidType, format!("expected a {expected}"))
        .expected(expected)
        .received(json_type_name(value))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_length(path: &str, spec: &FieldSpec, s: &str) -> Result<(), FieldError> {
    let chars = s.chars().count();
    if let Some(min) = spec.min_len {
        if chars < min {
            return Err(FieldError::new(path, FieldErrorCode::TooShort, format!("shorter than {min} characters"))
                .expected(format!(">= {min} chars"))
                .received(chars.to_string()));
        }
    }
    if let Some(max) = spec.max_len {
        if chars > max {
            return Err(FieldError::new(path, FieldErrorCode::TooLong, format!("longer than {max} characters"))
                .expected(format!("<= {max} chars"))
                .received(chars.to_string()));
        }
    }
    Ok(())
}

fn missing_required(schema: &IntakeSchema, candidate: &FieldMap) -> Vec<String> {
    schema
        .required_paths()
        .filter(|path| !candidate.contains_key(*path))
        .map(str::to_string)
        .collect()
}

fn hints_for_missing(schema: &IntakeSchema, missing: &[String]) -> Vec<NextAction> {
    missing
        .iter()
        .map(|path| match schema.field(path).map(|spec| &spec.kind) {
            Some(FieldKind::File { accept, max_bytes }) => NextAction::RequestUpload {
                field: path.clone(),
                accept: accept.clone(),
                max_bytes: *max_bytes,
            },
            _ => NextAction::CollectField { field: path.clone() },
        })
        .collect()
}
