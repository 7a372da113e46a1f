//! Credential Verifier: the seam through which the session core reaches the
//! authentication service. The rest of the crate depends only on the trait,
//! so tests substitute scripted verifiers and hosts may swap transports.

mod http;
mod types;

pub use http::HttpCredentialVerifier;
pub use types::{AuthenticatedSession, LoginOutcome, MfaSetup, MfaStatus};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::operator::Operator;
use crate::token::{ActionToken, BearerToken, MfaChallengeToken};

/// Verifier-layer failures. Converted into `AuthError` at the session and
/// coordinator boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    #[error("Request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("Response error: {0}")]
    Parse(String),
    /// The presented credential (bearer, challenge, or password) was refused.
    #[error("Unauthorized")]
    Unauthorized,
    /// A verification code was refused; the message is safe to render.
    #[error("{0}")]
    CodeRejected(String),
}

/// Contract with the authentication service.
///
/// Every method is a single request/response exchange; retries, refresh, and
/// caching belong to the caller. Secret parameters arrive as `SecretString`
/// or token newtypes and must never be logged by implementations.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Exchanges credentials for either a session or an MFA challenge.
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, VerifierError>;

    /// Completes a login-phase MFA challenge.
    async fn verify_mfa(
        &self,
        challenge: &MfaChallengeToken,
        code: &str,
    ) -> Result<AuthenticatedSession, VerifierError>;

    /// Verifies a fresh code for a sensitive action and returns the one-time
    /// action token proving it.
    async fn verify_step_up(
        &self,
        bearer: &BearerToken,
        code: &str,
    ) -> Result<ActionToken, VerifierError>;

    /// Resolves a stored bearer token to the current operator.
    /// Returns `None` when the token is no longer good for a session.
    async fn fetch_session(&self, bearer: &BearerToken) -> Result<Option<Operator>, VerifierError>;

    /// Reports whether the operator has MFA enrolled and whether policy
    /// requires it.
    async fn mfa_status(&self, bearer: &BearerToken) -> Result<MfaStatus, VerifierError>;

    /// Starts authenticator enrollment and returns the material to display.
    async fn setup_mfa(&self, bearer: &BearerToken) -> Result<MfaSetup, VerifierError>;

    /// Confirms enrollment with a first code; returns one-time backup codes.
    async fn enable_mfa(
        &self,
        bearer: &BearerToken,
        code: &str,
    ) -> Result<Vec<String>, VerifierError>;

    /// Turns MFA off after verifying a current code.
    async fn disable_mfa(&self, bearer: &BearerToken, code: &str) -> Result<(), VerifierError>;

    /// Fetches the operator's backup codes. Callers are expected to present
    /// a fresh action token; the service refuses the request without one.
    async fn backup_codes(
        &self,
        bearer: &BearerToken,
        action: Option<&ActionToken>,
    ) -> Result<Vec<String>, VerifierError>;

    /// Revokes the session server-side.
    async fn logout(&self, bearer: &BearerToken) -> Result<(), VerifierError>;
}
