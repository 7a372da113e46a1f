//! MFA enrollment settings for the signed-in operator.

use std::sync::Arc;

use tracing::info;

use crate::error::AuthError;
use crate::session::store::SessionStore;
use crate::token::{ActionToken, BearerToken};
use crate::verifier::{CredentialVerifier, MfaSetup, MfaStatus, VerifierError};

/// Enrollment operations that keep the in-session `mfa_enabled` flag in step
/// with the server.
pub struct MfaSettings {
    session: Arc<SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl MfaSettings {
    #[must_use]
    pub fn new(session: Arc<SessionStore>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { session, verifier }
    }

    /// Current enrollment state.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `SessionExpired` when the
    /// service rejects the bearer token, `Transport` on verifier failure.
    pub async fn status(&self) -> Result<MfaStatus, AuthError> {
        let bearer = self.bearer()?;
        match self.verifier.mfa_status(&bearer).await {
            Ok(status) => Ok(status),
            Err(err) => Err(self.map_error(err).await),
        }
    }

    /// Starts authenticator enrollment and returns the secret and QR code
    /// material to display.
    ///
    /// # Errors
    ///
    /// Same as [`MfaSettings::status`].
    pub async fn setup(&self) -> Result<MfaSetup, AuthError> {
        let bearer = self.bearer()?;
        match self.verifier.setup_mfa(&bearer).await {
            Ok(setup) => Ok(setup),
            Err(err) => Err(self.map_error(err).await),
        }
    }

    /// Confirms enrollment with a first code and returns one-time backup
    /// codes for display. On success the session immediately reflects
    /// `mfa_enabled = true`.
    ///
    /// # Errors
    ///
    /// `InvalidMfaCode` on a rejected code, otherwise as
    /// [`MfaSettings::status`].
    pub async fn enable(&self, code: &str) -> Result<Vec<String>, AuthError> {
        let bearer = self.bearer()?;
        match self.verifier.enable_mfa(&bearer, code).await {
            Ok(codes) => {
                info!("MFA enabled for the current operator");
                self.session.set_operator_mfa(true);
                Ok(codes)
            }
            Err(err) => Err(self.map_error(err).await),
        }
    }

    /// Turns MFA off after verifying a current code.
    ///
    /// # Errors
    ///
    /// `InvalidMfaCode` on a rejected code, otherwise as
    /// [`MfaSettings::status`].
    pub async fn disable(&self, code: &str) -> Result<(), AuthError> {
        let bearer = self.bearer()?;
        match self.verifier.disable_mfa(&bearer, code).await {
            Ok(()) => {
                info!("MFA disabled for the current operator");
                self.session.set_operator_mfa(false);
                Ok(())
            }
            Err(err) => Err(self.map_error(err).await),
        }
    }

    /// Fetches the operator's backup codes. Pass the action token produced
    /// by a step-up verification; the service refuses the request without
    /// one.
    ///
    /// # Errors
    ///
    /// Same as [`MfaSettings::status`].
    pub async fn backup_codes(&self, action: Option<&ActionToken>) -> Result<Vec<String>, AuthError> {
        let bearer = self.bearer()?;
        match self.verifier.backup_codes(&bearer, action).await {
            Ok(codes) => Ok(codes),
            Err(err) => Err(self.map_error(err).await),
        }
    }

    fn bearer(&self) -> Result<BearerToken, AuthError> {
        self.session.bearer_token().ok_or(AuthError::NotAuthenticated)
    }

    async fn map_error(&self, err: VerifierError) -> AuthError {
        match err {
            VerifierError::Unauthorized => {
                self.session.handle_session_expired().await;
                AuthError::SessionExpired
            }
            VerifierError::CodeRejected(message) => AuthError::InvalidMfaCode(message),
            other => AuthError::Transport(other.to_string()),
        }
    }
}
