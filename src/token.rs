//! Token newtypes held in memory. Each kind wraps a `SecretString` so values
//! stay out of `Debug` output and cannot be passed where another kind is
//! expected.

use secrecy::{ExposeSecret, SecretString};

/// Bearer credential attached to authenticated API calls.
#[derive(Clone, Debug)]
pub struct BearerToken(SecretString);

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Opaque handle identifying a pending login-phase MFA challenge.
#[derive(Clone, Debug)]
pub struct MfaChallengeToken(SecretString);

impl MfaChallengeToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Short-lived proof of a fresh step-up verification. Consumed by exactly one
/// sensitive request.
#[derive(Clone, Debug)]
pub struct ActionToken(SecretString);

impl ActionToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}
