//! Wire types for the auth API and their conversions into domain values.

use serde::Deserialize;
use uuid::Uuid;

use secrecy::SecretString;

use super::VerifierError;
use crate::capability::parse_tags;
use crate::operator::Operator;
use crate::token::{BearerToken, MfaChallengeToken};

/// Result of a password login.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted; a second factor must be verified before a
    /// session exists.
    MfaRequired { challenge: MfaChallengeToken },
    /// Credentials accepted with no second factor enrolled.
    Authenticated(AuthenticatedSession),
}

/// A fully established session as returned by the auth service.
#[derive(Debug)]
pub struct AuthenticatedSession {
    pub operator: Operator,
    pub bearer: BearerToken,
    /// Opaque refresh credential. Persisted alongside the bearer token and
    /// consumed by the transport layer, never by this crate.
    pub refresh_token: Option<SecretString>,
}

/// MFA enrollment state for the signed-in operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MfaStatus {
    pub mfa_enabled: bool,
    #[serde(default)]
    pub mfa_required: bool,
}

/// Material needed to enroll an authenticator app.
#[derive(Debug, Deserialize)]
pub struct MfaSetup {
    pub secret: String,
    /// `otpauth://` provisioning URI rendered as a QR code by the console.
    pub qr_code: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct OperatorProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub mfa_enabled: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl OperatorProfile {
    pub(super) fn into_operator(self) -> Operator {
        Operator {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            mfa_enabled: self.mfa_enabled,
            capabilities: parse_tags(self.capabilities.iter().map(String::as_str)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginResponse {
    #[serde(default)]
    pub mfa_required: bool,
    pub mfa_token: Option<String>,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub operator: Option<OperatorProfile>,
}

impl LoginResponse {
    pub(super) fn into_outcome(self) -> Result<LoginOutcome, VerifierError> {
        if self.mfa_required {
            let mfa_token = self
                .mfa_token
                .ok_or_else(|| VerifierError::Parse("no mfa_token in response".to_string()))?;
            return Ok(LoginOutcome::MfaRequired {
                challenge: MfaChallengeToken::new(mfa_token),
            });
        }

        match (self.token, self.operator) {
            (Some(token), Some(operator)) => {
                Ok(LoginOutcome::Authenticated(AuthenticatedSession {
                    operator: operator.into_operator(),
                    bearer: BearerToken::new(token),
                    refresh_token: self.refresh_token.map(SecretString::from),
                }))
            }
            _ => Err(VerifierError::Parse(
                "no token or operator in response".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SessionTokensResponse {
    pub token: String,
    pub refresh_token: Option<String>,
    pub operator: OperatorProfile,
}

impl SessionTokensResponse {
    pub(super) fn into_session(self) -> AuthenticatedSession {
        AuthenticatedSession {
            operator: self.operator.into_operator(),
            bearer: BearerToken::new(self.token),
            refresh_token: self.refresh_token.map(SecretString::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StepUpVerifyResponse {
    pub action_token: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}
