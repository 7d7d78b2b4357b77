//! Normalized intake schemas
//!
//! The core does not parse external schema formats. An importer hands it
//! this already-normalized shape, and validation treats it as the single
//! description of what a complete submission looks like.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schema for one intake: field paths mapped to their constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeSchema {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl IntakeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, path: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(path.into(), spec);
        self
    }

    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.get(path)
    }

    pub fn required_paths(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(path, _)| path.as_str())
    }

    /// File-typed field paths with their upload constraints.
    pub fn file_fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.is_file())
            .map(|(path, spec)| (path.as_str(), spec))
    }
}

/// Constraints for a single field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            min_len: None,
            max_len: None,
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn email() -> Self {
        Self::new(FieldKind::Email)
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn one_of(values: Vec<String>) -> Self {
        Self::new(FieldKind::Enum { values })
    }

    pub fn file(accept: Vec<String>, max_bytes: u64) -> Self {
        Self::new(FieldKind::File { accept, max_bytes })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = Some(n);
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, FieldKind::File { .. })
    }
}

/// Field type plus type-specific constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Email,
    Number,
    Boolean,
    Enum {
        values: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        #[serde(default)]
        accept: Vec<String>,
        max_bytes: u64,
    },
}
