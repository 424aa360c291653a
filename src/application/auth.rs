//! Operator authentication for the REST cache route.

use std::sync::Arc;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

/// Length of the per-site shared secret.
pub const SITE_TOKEN_LEN: usize = 32;
/// Length of a single-sign-on token (a hyphenated UUID).
pub const SSO_TOKEN_LEN: usize = 36;

const TOKEN_SCHEME: &str = "token ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    Missing,
    #[error("token has unsupported length {0}")]
    Length(usize),
    #[error("invalid token")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    SiteToken,
    SingleSignOn,
}

/// Remote verification of single-sign-on tokens.
#[async_trait]
pub trait SsoVerifier: Send + Sync {
    /// `true` only when the platform confirmed the token.
    async fn verify(&self, token: &str) -> bool;
}

/// Remove an optional `Token ` scheme, matched case-insensitively.
pub fn strip_token_scheme(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..TOKEN_SCHEME.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) => {
            raw[TOKEN_SCHEME.len()..].trim_start()
        }
        _ => raw,
    }
}

#[derive(Clone)]
pub struct TokenAuthenticator {
    site_token: String,
    sso: Arc<dyn SsoVerifier>,
}

impl TokenAuthenticator {
    pub fn new(site_token: impl Into<String>, sso: Arc<dyn SsoVerifier>) -> Self {
        Self {
            site_token: site_token.into(),
            sso,
        }
    }

    pub async fn authenticate(&self, raw: Option<&str>) -> Result<Principal, AuthError> {
        let token = raw.map(strip_token_scheme).unwrap_or_default();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        match token.len() {
            SITE_TOKEN_LEN => {
                if self.site_token.len() == SITE_TOKEN_LEN
                    && bool::from(token.as_bytes().ct_eq(self.site_token.as_bytes()))
                {
                    Ok(Principal::SiteToken)
                } else {
                    Err(AuthError::Invalid)
                }
            }
            SSO_TOKEN_LEN => {
                if self.sso.verify(token).await {
                    Ok(Principal::SingleSignOn)
                } else {
                    Err(AuthError::Invalid)
                }
            }
            other => {
                debug!(length = other, "Rejecting token of unsupported length");
                Err(AuthError::Length(other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Sso {
        answer: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SsoVerifier for Sso {
        async fn verify(&self, _token: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn authenticator(answer: bool) -> (TokenAuthenticator, Arc<Sso>) {
        let sso = Arc::new(Sso {
            answer,
            calls: AtomicUsize::new(0),
        });
        (TokenAuthenticator::new(SECRET, sso.clone()), sso)
    }

    #[test]
    fn scheme_is_stripped_case_insensitively() {
        assert_eq!(strip_token_scheme("Token abc"), "abc");
        assert_eq!(strip_token_scheme("TOKEN abc"), "abc");
        assert_eq!(strip_token_scheme("token   abc "), "abc");
        assert_eq!(strip_token_scheme("Bearer abc"), "Bearer abc");
        assert_eq!(strip_token_scheme("abc"), "abc");
    }

    #[tokio::test]
    async fn site_token_must_match() {
        let (auth, sso) = authenticator(true);
        assert_eq!(auth.authenticate(Some(SECRET)).await, Ok(Principal::SiteToken));
        assert_eq!(
            auth.authenticate(Some(&format!("Token {SECRET}"))).await,
            Ok(Principal::SiteToken)
        );
        assert_eq!(
            auth.authenticate(Some("ffffffffffffffffffffffffffffffff")).await,
            Err(AuthError::Invalid)
        );
        assert_eq!(sso.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn uuid_length_tokens_are_delegated() {
        let token = "6f1c2a9e-3b4d-4c5e-8f70-112233445566";
        let (accepting, sso) = authenticator(true);
        assert_eq!(
            accepting.authenticate(Some(token)).await,
            Ok(Principal::SingleSignOn)
        );
        assert_eq!(sso.calls.load(Ordering::SeqCst), 1);

        let (rejecting, _) = authenticator(false);
        assert_eq!(rejecting.authenticate(Some(token)).await, Err(AuthError::Invalid));
    }

    #[tokio::test]
    async fn other_lengths_are_rejected_without_lookup() {
        let (auth, sso) = authenticator(true);
        assert_eq!(auth.authenticate(None).await, Err(AuthError::Missing));
        assert_eq!(auth.authenticate(Some("  ")).await, Err(AuthError::Missing));
        assert_eq!(auth.authenticate(Some("short")).await, Err(AuthError::Length(5)));
        assert_eq!(
            auth.authenticate(Some(&format!("{SECRET}x"))).await,
            Err(AuthError::Length(33))
        );
        assert_eq!(sso.calls.load(Ordering::SeqCst), 0);
    }
}
