//! Intake definitions: schema plus policy
//!
//! An intake is a registered form definition. It is read-only after
//! registration; submissions reference it by id.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::fields::FieldMap;
use crate::schema::IntakeSchema;

/// A registered intake definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeDefinition {
    pub id: String,
    pub version: u32,
    pub name: String,
    pub schema: IntakeSchema,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approval_gates: Vec<ApprovalGate>,
    /// Default submission lifetime; callers may override per submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    pub destination: Destination,
    /// Opaque rendering hints passed through to form renderers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_hints: Option<Value>,
}

/// Where finalized submissions are delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    Webhook { url: String },
    Callback { name: String },
    Queue { name: String },
}

impl Destination {
    pub fn kind(&self) -> &'static str {
        match self {
            Destination::Webhook { .. } => "webhook",
            Destination::Callback { .. } => "callback",
            Destination::Queue { .. } => "queue",
        }
    }
}

/// A checkpoint that forces a submission through human review unless its
/// predicate auto-approves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalGate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_if: Option<GatePredicate>,
}

/// Predicate evaluated against the submission's fields at submit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum GatePredicate {
    Always,
    FieldEquals { path: String, value: Value },
}

impl ApprovalGate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            auto_approve_if: None,
        }
    }

    pub fn auto_approve_if(mut self, predicate: GatePredicate) -> Self {
        self.auto_approve_if = Some(predicate);
        self
    }

    /// True when the gate lets the submission pass without review.
    pub fn auto_approves(&self, fields: &FieldMap) -> bool {
        match &self.auto_approve_if {
            None => false,
            Some(GatePredicate::Always) => true,
            Some(GatePredicate::FieldEquals { path, value }) => fields.get(path) == Some(value),
        }
    }
}

/// Rejections raised when a definition fails registration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntakeRegistrationError {
    #[error("intake field `{field}` is required and must be non-empty")]
    MissingField { field: &'static str },

    #[error("webhook destination `{url}` is not an absolute URL")]
    InvalidDestinationUrl { url: String },

    #[error("approval gate names must be unique and non-empty (offending gate: `{name}`)")]
    InvalidGateName { name: String },

    #[error("ttlMs must be positive when present")]
    NonPositiveTtl,

    #[error("intake `{id}` is already registered")]
    DuplicateIntake { id: String },
}

impl IntakeDefinition {
    /// Registration-time validation. Definitions that fail here are never
    /// admitted to the registry.
    pub fn validate(&self) -> Result<(), IntakeRegistrationError> {
        if self.id.trim().is_empty() {
            return Err(IntakeRegistrationError::MissingField { field: "id" });
        }
        if self.name.trim().is_empty() {
            return Err(IntakeRegistrationError::MissingField { field: "name" });
        }

        if let Destination::Webhook { url } = &self.destination {
            let parsed = Url::parse(url).map_err(|_| IntakeRegistrationError::InvalidDestinationUrl {
                url: url.clone(),
            })?;
            if parsed.cannot_be_a_base() || parsed.host().is_none() {
                return Err(IntakeRegistrationError::InvalidDestinationUrl { url: url.clone() });
            }
        }

        let mut seen = BTreeSet::new();
        for gate in &self.approval_gates {
            if gate.name.trim().is_empty() || !seen.insert(gate.name.as_str()) {
                return Err(IntakeRegistrationError::InvalidGateName {
                    name: gate.name.clone(),
                });
            }
        }

        if self.ttl_ms == Some(0) {
            return Err(IntakeRegistrationError::NonPositiveTtl);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn definition() -> IntakeDefinition {
        IntakeDefinition {
            id: "contact_form".to_string(),
            version: 1,
            name: "Contact form".to_string(),
            schema: IntakeSchema::new().with_field("name", FieldSpec::string().required()),
            approval_gates: vec![],
            ttl_ms: None,
            destination: Destination::Webhook {
                url: "https://example.test/hook".to_string(),
            },
            ui_hints: None,
        }
    }

    #[test]
    fn valid_definition_passes() {
        assert!(definition().validate().is_ok());
    }

    #[test]
    fn blank_id_and_name_are_rejected() {
        let mut bad = definition();
        bad.id = "  ".to_string();
        assert_eq!(
            bad.validate(),
            Err(IntakeRegistrationError::MissingField { field: "id" })
        );

        let mut bad = definition();
        bad.name = String::new();
        assert_eq!(
            bad.validate(),
            Err(IntakeRegistrationError::MissingField { field: "name" })
        );
    }

    #[test]
    fn relative_webhook_urls_are_rejected() {
        let mut bad = definition();
        bad.destination = Destination::Webhook {
            url: "/hook".to_string(),
        };
        assert!(matches!(
            bad.validate(),
            Err(IntakeRegistrationError::InvalidDestinationUrl { .. })
        ));
    }

    #[test]
    fn duplicate_gate_names_are_rejected() {
        let mut bad = definition();
        bad.approval_gates = vec![ApprovalGate::named("legal"), ApprovalGate::named("legal")];
        assert!(matches!(
            bad.validate(),
            Err(IntakeRegistrationError::InvalidGateName { .. })
        ));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut bad = definition();
        bad.ttl_ms = Some(0);
        assert_eq!(bad.validate(), Err(IntakeRegistrationError::NonPositiveTtl));
    }

    #[test]
    fn gate_predicates_evaluate_against_fields() {
        let gate = ApprovalGate::named("finance").auto_approve_if(GatePredicate::FieldEquals {
            path: "amount_band".to_string(),
            value: json!("small"),
        });

        let mut fields = FieldMap::new();
        fields.insert("amount_band".to_string(), json!("small"));
        assert!(gate.auto_approves(&fields));

        fields.insert("amount_band".to_string(), json!("large"));
        assert!(!gate.auto_approves(&fields));

        assert!(!ApprovalGate::named("manual").auto_approves(&fields));
        assert!(ApprovalGate::named("open")
            .auto_approve_if(GatePredicate::Always)
            .auto_approves(&fields));
    }

    #[test]
    fn destination_kind_names_match_the_wire() {
        let json = serde_json::to_value(Destination::Webhook {
            url: "https://example.test/hook".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "webhook");
    }
}
