//! Caller authentication and per-operation authorization.
//!
//! Two modes are recognized:
//! - **Trusted internal**: in-process callers, or HTTP callers presenting an
//!   HS256 bearer token signed with the gateway's internal secret.
//! - **External keyed**: callers presenting an API key that has a validity
//!   window. Keys are stored only as SHA-256 digests and compared in
//!   constant time.

use std::path::Path;
use std::sync::Arc;

use closing_doors_core::{AuthMode, AuthorizationContext, ClockSource, KeyWindow, OperationId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::operation::Credentials;

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("bearer token expired")]
    TokenExpired,
    #[error("API key expired at {expired_at}")]
    KeyExpired { expired_at: u64 },
    #[error("API key not valid before {not_before}")]
    KeyNotYetValid { not_before: u64 },
    #[error("authorization mode {mode} is not accepted by {operation}")]
    ModeNotAllowed {
        mode: AuthMode,
        operation: OperationId,
    },
}

impl AuthError {
    /// `true` when the caller is authenticated but not allowed; `false` when
    /// the caller could not be authenticated at all.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::ModeNotAllowed { .. })
    }
}

// ---------------------------------------------------------------------------
// API keys
// ---------------------------------------------------------------------------

/// API key definition as it appears in the keys file. Times are Unix seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyEntry {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub not_before: Option<u64>,
    pub expires_at: u64,
}

#[derive(Debug, Clone)]
struct StoredKey {
    id: String,
    digest: [u8; 32],
    window: KeyWindow,
}

fn digest(secret: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(secret.as_bytes()));
    out
}

/// Set of API keys accepted for external-keyed access.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: Vec<StoredKey>,
}

impl ApiKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. Only the digest of `secret` is retained.
    pub fn insert(&mut self, id: impl Into<String>, secret: &str, window: KeyWindow) {
        self.keys.push(StoredKey {
            id: id.into(),
            digest: digest(secret),
            window,
        });
    }

    #[must_use]
    pub fn from_entries(entries: Vec<ApiKeyEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            let window = KeyWindow {
                not_before: entry.not_before.map(|s| s.saturating_mul(1000)),
                expires_at: entry.expires_at.saturating_mul(1000),
            };
            store.insert(entry.id, &entry.key, window);
        }
        store
    }

    /// Loads keys from a JSON array of [`ApiKeyEntry`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)?;
        let entries: Vec<ApiKeyEntry> = serde_json::from_slice(&raw)?;
        Ok(Self::from_entries(entries))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finds the key matching `presented`. Every stored digest is compared so
    /// the time taken does not depend on which key matched.
    fn find(&self, presented: &str) -> Option<&StoredKey> {
        let presented = digest(presented);
        let mut found = None;
        for key in &self.keys {
            if bool::from(key.digest[..].ct_eq(&presented[..])) && found.is_none() {
                found = Some(key);
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Internal bearer tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct InternalClaims {
    sub: String,
    exp: u64,
}

/// Signs and verifies internal bearer tokens (HS256).
#[derive(Clone)]
pub struct InternalTokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl InternalTokenVerifier {
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issues a token for `subject` expiring at `expires_at_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be encoded.
    pub fn issue(&self, subject: &str, expires_at_secs: u64) -> anyhow::Result<String> {
        let claims = InternalClaims {
            sub: subject.to_string(),
            exp: expires_at_secs,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verifies a token and returns its subject.
    ///
    /// # Errors
    ///
    /// `TokenExpired` for an expired token, `InvalidCredentials` for any
    /// other verification failure.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<InternalClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidCredentials,
            }
        })?;
        Ok(data.claims.sub)
    }
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Turns raw [`Credentials`] into an [`AuthorizationContext`] and checks it
/// against an operation's accepted modes.
pub struct Authenticator {
    api_keys: ApiKeyStore,
    internal: Option<InternalTokenVerifier>,
    clock: Arc<dyn ClockSource>,
}

impl Authenticator {
    /// `internal` is `None` when no internal secret is configured; bearer
    /// tokens are then always rejected.
    #[must_use]
    pub fn new(
        api_keys: ApiKeyStore,
        internal: Option<InternalTokenVerifier>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            api_keys,
            internal,
            clock,
        }
    }

    /// Verifies credentials.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when credentials are absent, unknown,
    /// malformed, or outside their validity window.
    pub fn authenticate(&self, credentials: &Credentials) -> Result<AuthorizationContext, AuthError> {
        match credentials {
            Credentials::Absent => Err(AuthError::MissingCredentials),
            Credentials::Trusted { principal } => Ok(AuthorizationContext::trusted(principal.clone())),
            Credentials::BearerToken(token) => {
                let verifier = self.internal.as_ref().ok_or(AuthError::InvalidCredentials)?;
                verifier.verify(token).map(AuthorizationContext::trusted)
            }
            Credentials::ApiKey(presented) => {
                let key = self
                    .api_keys
                    .find(presented)
                    .ok_or(AuthError::InvalidCredentials)?;
                let now = self.clock.now();
                if now >= key.window.expires_at {
                    return Err(AuthError::KeyExpired {
                        expired_at: key.window.expires_at,
                    });
                }
                if let Some(not_before) = key.window.not_before.filter(|nb| now < *nb) {
                    return Err(AuthError::KeyNotYetValid { not_before });
                }
                Ok(AuthorizationContext::keyed(key.id.clone(), key.window))
            }
        }
    }

    /// Checks an authenticated caller against the modes an operation accepts.
    ///
    /// # Errors
    ///
    /// Returns `ModeNotAllowed` if the caller's mode is not in `accepted`.
    pub fn authorize(
        ctx: &AuthorizationContext,
        accepted: &[AuthMode],
        operation: &OperationId,
    ) -> Result<(), AuthError> {
        if accepted.contains(&ctx.mode) {
            Ok(())
        } else {
            Err(AuthError::ModeNotAllowed {
                mode: ctx.mode,
                operation: operation.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use closing_doors_core::ManualClock;

    use super::*;

    const NOW_MS: u64 = 1_700_000_000_000;

    fn authenticator(clock: Arc<ManualClock>) -> Authenticator {
        let mut keys = ApiKeyStore::new();
        keys.insert(
            "web",
            "da2-live",
            KeyWindow {
                not_before: None,
                expires_at: NOW_MS + 60_000,
            },
        );
        keys.insert(
            "old",
            "da2-old",
            KeyWindow {
                not_before: None,
                expires_at: NOW_MS - 1,
            },
        );
        keys.insert(
            "future",
            "da2-future",
            KeyWindow {
                not_before: Some(NOW_MS + 10_000),
                expires_at: NOW_MS + 20_000,
            },
        );
        Authenticator::new(keys, Some(InternalTokenVerifier::new(b"internal-secret")), clock)
    }

    #[test]
    fn absent_credentials_are_rejected() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        assert_eq!(
            auth.authenticate(&Credentials::Absent),
            Err(AuthError::MissingCredentials)
        );
    }

    #[test]
    fn valid_api_key_yields_keyed_context() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        let ctx = auth
            .authenticate(&Credentials::ApiKey("da2-live".into()))
            .unwrap();
        assert_eq!(ctx.mode, AuthMode::ExternalKeyed);
        assert_eq!(ctx.principal, "web");
        assert_eq!(ctx.key_window.unwrap().expires_at, NOW_MS + 60_000);
    }

    #[test]
    fn unknown_api_key_is_invalid() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        assert_eq!(
            auth.authenticate(&Credentials::ApiKey("da2-guess".into())),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn expired_api_key_is_rejected() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        assert_eq!(
            auth.authenticate(&Credentials::ApiKey("da2-old".into())),
            Err(AuthError::KeyExpired {
                expired_at: NOW_MS - 1
            })
        );
    }

    #[test]
    fn key_expires_as_clock_advances() {
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let auth = authenticator(clock.clone());
        assert!(auth.authenticate(&Credentials::ApiKey("da2-live".into())).is_ok());
        clock.advance(60_000);
        assert!(matches!(
            auth.authenticate(&Credentials::ApiKey("da2-live".into())),
            Err(AuthError::KeyExpired { .. })
        ));
    }

    #[test]
    fn key_not_yet_valid_is_rejected() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        assert_eq!(
            auth.authenticate(&Credentials::ApiKey("da2-future".into())),
            Err(AuthError::KeyNotYetValid {
                not_before: NOW_MS + 10_000
            })
        );
    }

    #[test]
    fn bearer_token_roundtrip() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        let verifier = InternalTokenVerifier::new(b"internal-secret");
        let token = verifier.issue("feed-refresher", 4_000_000_000).unwrap();
        let ctx = auth.authenticate(&Credentials::BearerToken(token)).unwrap();
        assert_eq!(ctx, AuthorizationContext::trusted("feed-refresher"));
    }

    #[test]
    fn bearer_token_with_wrong_secret_is_invalid() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        let forged = InternalTokenVerifier::new(b"other-secret")
            .issue("intruder", 4_000_000_000)
            .unwrap();
        assert_eq!(
            auth.authenticate(&Credentials::BearerToken(forged)),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn expired_bearer_token_is_reported() {
        let auth = authenticator(Arc::new(ManualClock::new(NOW_MS)));
        let token = InternalTokenVerifier::new(b"internal-secret")
            .issue("feed-refresher", 1_000)
            .unwrap();
        assert_eq!(
            auth.authenticate(&Credentials::BearerToken(token)),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn bearer_token_without_configured_secret_is_invalid() {
        let auth = Authenticator::new(
            ApiKeyStore::new(),
            None,
            Arc::new(ManualClock::new(NOW_MS)),
        );
        assert_eq!(
            auth.authenticate(&Credentials::BearerToken("x.y.z".into())),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn mode_check_uses_accepted_set() {
        let op = OperationId::query("trainTimes");
        let keyed = AuthorizationContext::keyed(
            "web",
            KeyWindow {
                not_before: None,
                expires_at: u64::MAX,
            },
        );
        assert!(Authenticator::authorize(&keyed, &[AuthMode::ExternalKeyed], &op).is_ok());
        let err = Authenticator::authorize(&keyed, &[AuthMode::TrustedInternal], &op).unwrap_err();
        assert!(err.is_forbidden());
    }

    #[test]
    fn key_file_uses_seconds() {
        let entries: Vec<ApiKeyEntry> = serde_json::from_str(
            r#"[{"id": "web", "key": "da2-abc", "expiresAt": 1700000060}]"#,
        )
        .unwrap();
        let store = ApiKeyStore::from_entries(entries);
        assert_eq!(store.len(), 1);
        let auth = Authenticator::new(store, None, Arc::new(ManualClock::new(1_700_000_059_999)));
        assert!(auth.authenticate(&Credentials::ApiKey("da2-abc".into())).is_ok());
    }
}
