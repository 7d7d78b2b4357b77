//! Prefixed ULID identifiers

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! prefixed_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Ulid::new()))
            }

            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

prefixed_id!(
    /// Submission identifier: `sub_<ULID>`. Server-assigned at creation,
    /// collision-resistant, opaque to callers.
    SubmissionId,
    "sub"
);

prefixed_id!(
    /// Event identifier: `evt_<ULID>`. Duplicate ids are the idempotency
    /// signal for event writers.
    EventId,
    "evt"
);

prefixed_id!(
    /// Upload identifier: `upl_<ULID>`.
    UploadId,
    "upl"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(SubmissionId::new().as_str().starts_with("sub_"));
        assert!(EventId::new().as_str().starts_with("evt_"));
        assert!(UploadId::new().as_str().starts_with("upl_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SubmissionId::new(), SubmissionId::new());
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = SubmissionId::from_string("sub_01TEST".to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"sub_01TEST\"");
    }
}
