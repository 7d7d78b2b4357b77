//! Rotating capability tokens
//!
//! The resume token IS the write authorization for a submission: whoever
//! holds the current token owns the session. Tokens rotate on every
//! successful state-mutating operation, so a leaked token has a
//! write-once lifetime.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// An opaque capability conferring write authority on one submission.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken(String);

impl ResumeToken {
    /// Entropy per token. 256 bits, URL-safe base64 encoded.
    pub const BYTES: usize = 32;

    /// Generate a fresh token from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut buf = [0u8; Self::BYTES];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        Self(URL_SAFE_NO_PAD.encode(buf))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a presented token. Length is the
    /// only thing allowed to short-circuit; tokens we mint are all the
    /// same length.
    pub fn matches(&self, candidate: &str) -> bool {
        let a = self.0.as_bytes();
        let b = candidate.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

// Tokens are capabilities; keep them out of debug output and logs.
impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResumeToken(<redacted>)")
    }
}
