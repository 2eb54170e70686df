use std::fmt;

use serde::{Deserialize, Serialize};

/// How a caller authenticated against the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthMode {
    /// Trusted caller inside the deployment boundary. No caller-supplied key.
    TrustedInternal,
    /// External caller presenting an API key with an expiry.
    ExternalKeyed,
}

impl AuthMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TrustedInternal => "trusted_internal",
            Self::ExternalKeyed => "external_keyed",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validity window of an API key, in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyWindow {
    /// Earliest instant the key is accepted. `None` means valid since issue.
    pub not_before: Option<u64>,
    /// Instant from which the key is rejected.
    pub expires_at: u64,
}

impl KeyWindow {
    /// Whether `now` falls inside `[not_before, expires_at)`.
    #[must_use]
    pub fn contains(&self, now: u64) -> bool {
        self.not_before.is_none_or(|nb| now >= nb) && now < self.expires_at
    }
}

/// Authenticated identity attached to an invocation once it leaves the
/// `Authorizing` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    /// Principal id: the JWT subject for internal callers, the key id for keyed callers.
    pub principal: String,
    pub mode: AuthMode,
    /// Present only for `ExternalKeyed` callers.
    pub key_window: Option<KeyWindow>,
}

impl AuthorizationContext {
    #[must_use]
    pub fn trusted(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            mode: AuthMode::TrustedInternal,
            key_window: None,
        }
    }

    #[must_use]
    pub fn keyed(key_id: impl Into<String>, window: KeyWindow) -> Self {
        Self {
            principal: key_id.into(),
            mode: AuthMode::ExternalKeyed,
            key_window: Some(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_half_open() {
        let w = KeyWindow {
            not_before: Some(100),
            expires_at: 200,
        };
        assert!(!w.contains(99));
        assert!(w.contains(100));
        assert!(w.contains(199));
        assert!(!w.contains(200));
    }

    #[test]
    fn window_without_start_accepts_early_instants() {
        let w = KeyWindow {
            not_before: None,
            expires_at: 50,
        };
        assert!(w.contains(0));
        assert!(!w.contains(50));
    }

    #[test]
    fn auth_mode_serializes_screaming_snake() {
        let json = serde_json::to_string(&AuthMode::ExternalKeyed).unwrap();
        assert_eq!(json, "\"EXTERNAL_KEYED\"");
    }
}
