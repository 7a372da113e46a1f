//! Session store owning the login state machine.
//!
//! Flow Overview:
//! 1) `login` exchanges credentials. Operators with MFA enrolled park in
//!    `AwaitingMfa` holding a challenge token; the rest go straight to
//!    `Authenticated`.
//! 2) `verify_mfa` spends the challenge token and commits the session.
//! 3) `logout` and `handle_session_expired` drop back to `Anonymous`.
//! 4) `hydrate` restores a session from durable storage at startup.
//!
//! Security boundaries:
//! - No network call runs under the state lock. Every transition captures
//!   the epoch before awaiting and re-checks it at commit, so a response
//!   that raced a newer transition is discarded instead of applied.
//! - Tokens live only in the active phase and in durable storage; published
//!   snapshots never carry them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::session::phase::{Phase, SessionPhase, SessionSnapshot};
use crate::storage::{TokenStore, BEARER_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::token::BearerToken;
use crate::verifier::{AuthenticatedSession, CredentialVerifier, LoginOutcome, VerifierError};

struct SessionState {
    phase: SessionPhase,
    last_error: Option<AuthError>,
    /// Bumped on every committed change. In-flight responses compare against
    /// the epoch they started from.
    epoch: u64,
    /// Rejected codes for the current challenge. Reset on every phase change.
    mfa_attempts: u32,
}

/// Owns the session state machine and publishes [`SessionSnapshot`]s.
pub struct SessionStore {
    state: Mutex<SessionState>,
    /// Serializes durable-storage writes against clears, so a persist that
    /// raced a logout cannot land a token back after the clear.
    storage_gate: tokio::sync::Mutex<()>,
    notify: watch::Sender<SessionSnapshot>,
    verifier: Arc<dyn CredentialVerifier>,
    storage: Arc<dyn TokenStore>,
    config: AuthConfig,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        verifier: Arc<dyn CredentialVerifier>,
        storage: Arc<dyn TokenStore>,
    ) -> Self {
        let initial = SessionSnapshot::new(Phase::Anonymous, None, None, 0);
        let (notify, _) = watch::channel(initial);

        Self {
            state: Mutex::new(SessionState {
                phase: SessionPhase::Anonymous,
                last_error: None,
                epoch: 0,
                mfa_attempts: 0,
            }),
            storage_gate: tokio::sync::Mutex::new(()),
            notify,
            verifier,
            storage,
            config,
        }
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.notify.borrow().clone()
    }

    /// Watch channel receiving every committed snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.notify.subscribe()
    }

    pub(crate) fn bearer_token(&self) -> Option<BearerToken> {
        match &lock(&self.state).phase {
            SessionPhase::Authenticated { bearer, .. } => Some(bearer.clone()),
            _ => None,
        }
    }

    /// Exchanges credentials for a session or an MFA challenge and returns
    /// the phase the session landed in.
    ///
    /// A malformed email fails locally with `InvalidCredentials`; the
    /// password never leaves the process. Calling while `AwaitingMfa`
    /// discards the pending challenge and starts over.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` when the service refuses the pair,
    /// `InvalidTransition` when already signed in, `StaleResponse` when the
    /// session changed while the request was in flight, `Transport` on
    /// verifier failure.
    pub async fn login(&self, email: &str, password: SecretString) -> Result<Phase, AuthError> {
        if !valid_email(email) {
            let error = AuthError::InvalidCredentials("Invalid email address".to_string());
            let mut state = lock(&self.state);
            self.record_error(&mut state, error.clone());
            return Err(error);
        }

        let epoch = {
            let mut state = lock(&self.state);
            match &state.phase {
                SessionPhase::Authenticated { .. } => {
                    return Err(AuthError::InvalidTransition {
                        from: Phase::Authenticated.as_str(),
                        operation: "log in",
                    });
                }
                SessionPhase::AwaitingMfa { .. } => {
                    debug!("Discarding pending MFA challenge for a new login attempt");
                    self.commit(&mut state, SessionPhase::Anonymous, None);
                }
                SessionPhase::Anonymous => {}
            }
            state.epoch
        };

        let outcome = self.verifier.login(email, &password).await;

        // The lock scope closes before the storage write so the login future
        // stays `Send`; the commit hands out what to persist.
        let (landed, persist) = {
            let mut state = lock(&self.state);
            if state.epoch != epoch {
                debug!("Discarding login response: session changed while in flight");
                return Err(AuthError::StaleResponse);
            }

            match outcome {
                Ok(LoginOutcome::MfaRequired { challenge }) => {
                    info!("Login accepted, MFA verification required");
                    self.commit(&mut state, SessionPhase::AwaitingMfa { challenge }, None);
                    (Phase::AwaitingMfa, None)
                }
                Ok(LoginOutcome::Authenticated(session)) => {
                    let AuthenticatedSession {
                        operator,
                        bearer,
                        refresh_token,
                    } = session;
                    info!(operator_id = %operator.id, "Login succeeded");
                    self.commit(
                        &mut state,
                        SessionPhase::Authenticated {
                            operator,
                            bearer: bearer.clone(),
                        },
                        None,
                    );
                    (
                        Phase::Authenticated,
                        Some((state.epoch, bearer, refresh_token)),
                    )
                }
                Err(err) => {
                    let error = login_error(err);
                    self.record_error(&mut state, error.clone());
                    return Err(error);
                }
            }
        };

        if let Some((epoch, bearer, refresh_token)) = persist {
            self.persist_tokens(epoch, &bearer, refresh_token.as_ref())
                .await;
        }
        Ok(landed)
    }

    /// Completes the pending MFA challenge.
    ///
    /// A rejected code keeps the challenge open until the configured attempt
    /// limit is reached, after which the challenge is cancelled.
    ///
    /// # Errors
    ///
    /// `InvalidMfaCode` on a rejected code, `MfaAttemptsExhausted` when the
    /// limit is hit, `SessionExpired` when the challenge itself lapsed,
    /// `InvalidTransition` outside `AwaitingMfa`, `StaleResponse` when the
    /// session changed while the request was in flight, `Transport` on
    /// verifier failure.
    pub async fn verify_mfa(&self, code: &str) -> Result<(), AuthError> {
        let (challenge, epoch) = {
            let state = lock(&self.state);
            match &state.phase {
                SessionPhase::AwaitingMfa { challenge } => (challenge.clone(), state.epoch),
                other => {
                    return Err(AuthError::InvalidTransition {
                        from: other.phase().as_str(),
                        operation: "verify a code",
                    });
                }
            }
        };

        let result = self.verifier.verify_mfa(&challenge, code).await;

        // As in `login`, the lock scope closes before the storage write.
        let (persist_epoch, bearer, refresh_token) = {
            let mut state = lock(&self.state);
            if state.epoch != epoch {
                debug!("Discarding MFA verification response: session changed while in flight");
                return Err(AuthError::StaleResponse);
            }

            match result {
                Ok(session) => {
                    let AuthenticatedSession {
                        operator,
                        bearer,
                        refresh_token,
                    } = session;
                    info!(operator_id = %operator.id, "MFA verification succeeded");
                    self.commit(
                        &mut state,
                        SessionPhase::Authenticated {
                            operator,
                            bearer: bearer.clone(),
                        },
                        None,
                    );
                    (state.epoch, bearer, refresh_token)
                }
                Err(VerifierError::CodeRejected(message)) => {
                    state.mfa_attempts += 1;
                    if let Some(limit) = self.config.max_mfa_attempts() {
                        if state.mfa_attempts >= limit {
                            warn!("MFA attempt limit reached, cancelling the challenge");
                            self.commit(
                                &mut state,
                                SessionPhase::Anonymous,
                                Some(AuthError::MfaAttemptsExhausted),
                            );
                            return Err(AuthError::MfaAttemptsExhausted);
                        }
                    }
                    let error = AuthError::InvalidMfaCode(message);
                    self.record_error(&mut state, error.clone());
                    return Err(error);
                }
                Err(VerifierError::Unauthorized) => {
                    // The challenge token itself lapsed server-side.
                    self.commit(
                        &mut state,
                        SessionPhase::Anonymous,
                        Some(AuthError::SessionExpired),
                    );
                    return Err(AuthError::SessionExpired);
                }
                Err(other) => {
                    let error = AuthError::Transport(other.to_string());
                    self.record_error(&mut state, error.clone());
                    return Err(error);
                }
            }
        };

        self.persist_tokens(persist_epoch, &bearer, refresh_token.as_ref())
            .await;
        Ok(())
    }

    /// Abandons the pending challenge. The challenge token is dropped
    /// without a server call; outside `AwaitingMfa` this is a no-op.
    pub fn cancel_mfa(&self) {
        let mut state = lock(&self.state);
        if matches!(state.phase, SessionPhase::AwaitingMfa { .. }) {
            debug!("MFA challenge cancelled");
            self.commit(&mut state, SessionPhase::Anonymous, None);
        }
    }

    /// Signs out. Local state and stored tokens are cleared first; server
    /// revocation runs after and is best-effort.
    pub async fn logout(&self) {
        let bearer = {
            let mut state = lock(&self.state);
            let bearer = match &state.phase {
                SessionPhase::Authenticated { bearer, .. } => Some(bearer.clone()),
                _ => None,
            };
            if !matches!(state.phase, SessionPhase::Anonymous) {
                info!("Signing out");
                self.commit(&mut state, SessionPhase::Anonymous, None);
            }
            bearer
        };

        self.clear_stored_tokens().await;

        if let Some(bearer) = bearer {
            if let Err(err) = self.verifier.logout(&bearer).await {
                // The local session is already gone either way.
                warn!("Failed to revoke session server-side: {err}");
            }
        }
    }

    /// Drops to `Anonymous` after the transport layer saw the session
    /// rejected. Clears stored tokens like `logout` but never calls the
    /// server; repeated invocations are no-ops.
    pub async fn handle_session_expired(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(state.phase, SessionPhase::Anonymous) {
                return;
            }
            warn!("Session expired, dropping to anonymous");
            self.commit(
                &mut state,
                SessionPhase::Anonymous,
                Some(AuthError::SessionExpired),
            );
        }

        self.clear_stored_tokens().await;
    }

    /// Restores a session from durable storage. Called once at startup,
    /// before any login form renders.
    ///
    /// A stored token the service no longer accepts is removed and the
    /// session stays `Anonymous`. On transport failure the token is kept for
    /// a later retry.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` when the session already left `Anonymous`,
    /// `StaleResponse` when it changed while the lookup was in flight,
    /// `Transport` when the service could not be reached, `Storage` when
    /// the stored token could not be read.
    pub async fn hydrate(&self) -> Result<Phase, AuthError> {
        let stored = match self.storage.get(BEARER_TOKEN_KEY).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Failed to read stored bearer token: {err}");
                return Err(AuthError::Storage(err.to_string()));
            }
        };

        let Some(raw) = stored else {
            debug!("No stored session to restore");
            return Ok(Phase::Anonymous);
        };
        let bearer = BearerToken::new(raw);

        let epoch = {
            let state = lock(&self.state);
            if !matches!(state.phase, SessionPhase::Anonymous) {
                return Err(AuthError::InvalidTransition {
                    from: state.phase.phase().as_str(),
                    operation: "restore a stored session",
                });
            }
            state.epoch
        };

        match self.verifier.fetch_session(&bearer).await {
            Ok(Some(operator)) => {
                let mut state = lock(&self.state);
                if state.epoch != epoch {
                    debug!("Discarding restored session: session changed while in flight");
                    return Err(AuthError::StaleResponse);
                }
                info!(operator_id = %operator.id, "Session restored from storage");
                self.commit(
                    &mut state,
                    SessionPhase::Authenticated { operator, bearer },
                    None,
                );
                Ok(Phase::Authenticated)
            }
            Ok(None) => {
                debug!("Stored bearer token is no longer valid");
                self.clear_stored_tokens().await;
                Ok(Phase::Anonymous)
            }
            Err(err) => {
                // Keep the stored token so a later start can retry.
                let error = AuthError::Transport(err.to_string());
                let mut state = lock(&self.state);
                if state.epoch == epoch {
                    self.record_error(&mut state, error.clone());
                }
                Err(error)
            }
        }
    }

    /// Updates the signed-in operator's enrollment flag after the MFA
    /// settings flow changed it server-side.
    pub(crate) fn set_operator_mfa(&self, enabled: bool) {
        let mut state = lock(&self.state);
        let SessionPhase::Authenticated { operator, .. } = &mut state.phase else {
            return;
        };
        if operator.mfa_enabled == enabled {
            return;
        }
        operator.mfa_enabled = enabled;
        state.epoch += 1;
        self.publish(&state);
    }

    /// Commits a phase transition: resets the attempt counter, bumps the
    /// epoch, publishes a fresh snapshot. Callers hold the lock.
    fn commit(&self, state: &mut SessionState, phase: SessionPhase, error: Option<AuthError>) {
        state.phase = phase;
        state.last_error = error;
        state.epoch += 1;
        state.mfa_attempts = 0;
        self.publish(state);
    }

    /// Records a failed transition without leaving the current phase.
    fn record_error(&self, state: &mut SessionState, error: AuthError) {
        state.last_error = Some(error);
        state.epoch += 1;
        self.publish(state);
    }

    fn publish(&self, state: &SessionState) {
        let operator = match &state.phase {
            SessionPhase::Authenticated { operator, .. } => Some(operator.clone()),
            _ => None,
        };
        self.notify.send_replace(SessionSnapshot::new(
            state.phase.phase(),
            operator,
            state.last_error.clone(),
            state.epoch,
        ));
    }

    // Storage is best-effort: the in-memory session stays authoritative and
    // a failed write only costs rehydration on the next start. The epoch is
    // re-checked under the gate: a persist whose session has since logged
    // out or changed is skipped rather than resurrecting a cleared token.
    async fn persist_tokens(
        &self,
        epoch: u64,
        bearer: &BearerToken,
        refresh: Option<&SecretString>,
    ) {
        let _gate = self.storage_gate.lock().await;
        let current = lock(&self.state).epoch;
        if current != epoch {
            debug!("Skipping token persist: session changed after commit");
            return;
        }

        if let Err(err) = self
            .storage
            .put(BEARER_TOKEN_KEY, bearer.expose_secret())
            .await
        {
            warn!("Failed to persist bearer token: {err}");
        }

        match refresh {
            Some(refresh) => {
                if let Err(err) = self
                    .storage
                    .put(REFRESH_TOKEN_KEY, refresh.expose_secret())
                    .await
                {
                    warn!("Failed to persist refresh token: {err}");
                }
            }
            // A refresh token from an older session must not pair with the
            // new bearer token.
            None => {
                if let Err(err) = self.storage.remove(REFRESH_TOKEN_KEY).await {
                    warn!("Failed to clear stale refresh token: {err}");
                }
            }
        }
    }

    async fn clear_stored_tokens(&self) {
        let _gate = self.storage_gate.lock().await;
        for key in [BEARER_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(err) = self.storage.remove(key).await {
                warn!("Failed to clear stored token {key}: {err}");
            }
        }
    }
}

fn login_error(err: VerifierError) -> AuthError {
    match err {
        VerifierError::Unauthorized => {
            AuthError::InvalidCredentials("Invalid email or password".to_string())
        }
        other => AuthError::Transport(other.to_string()),
    }
}

fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
