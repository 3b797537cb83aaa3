//! Instance token guard
//!
//! Inbound WuzAPI events carry the tenant's shared token at the payload
//! root. The guard runs before any parsing; a mismatch is a silent discard
//! logged at `warn` — the sender is a system we don't control and must not
//! see an error that invites retries against a rejected tenant.

use tracing::warn;

/// Validates the shared instance token on inbound WhatsApp-side events.
#[derive(Debug, Clone)]
pub struct TokenGuard {
    expected: String,
}

impl TokenGuard {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    /// Whether the presented token matches the configured one.
    ///
    /// Constant-time over the compared bytes; an absent token never matches.
    pub fn permits(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            warn!("event without instance token discarded");
            return false;
        };

        if !constant_time_eq(presented.as_bytes(), self.expected.as_bytes()) {
            warn!("instance token mismatch, event discarded");
            return false;
        }

        true
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_token_permits() {
        let guard = TokenGuard::new("ABC");
        assert!(guard.permits(Some("ABC")));
    }

    #[test]
    fn test_wrong_token_denied() {
        let guard = TokenGuard::new("ABC");
        assert!(!guard.permits(Some("WRONG")));
    }

    #[test]
    fn test_missing_token_denied() {
        let guard = TokenGuard::new("ABC");
        assert!(!guard.permits(None));
    }

    #[test]
    fn test_length_mismatch_denied() {
        let guard = TokenGuard::new("ABC");
        assert!(!guard.permits(Some("AB")));
        assert!(!guard.permits(Some("ABCD")));
    }
}
