//! Scripted test doubles for the state-machine tests. Each verifier method
//! pops the next queued answer; an empty queue is a test bug and panics.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::capability::Capability;
use crate::operator::Operator;
use crate::token::{ActionToken, BearerToken, MfaChallengeToken};
use crate::verifier::{
    AuthenticatedSession, CredentialVerifier, LoginOutcome, MfaSetup, MfaStatus, VerifierError,
};

pub(crate) fn operator_with(capabilities: &[Capability]) -> Operator {
    Operator {
        id: Uuid::new_v4(),
        email: "admin@example.com".to_string(),
        display_name: "Admin".to_string(),
        mfa_enabled: true,
        capabilities: capabilities.iter().copied().collect(),
    }
}

pub(crate) fn session_for(operator: Operator) -> AuthenticatedSession {
    AuthenticatedSession {
        operator,
        bearer: BearerToken::new("bearer-1"),
        refresh_token: Some(SecretString::from("refresh-1".to_string())),
    }
}

type Script<T> = Mutex<VecDeque<Result<T, VerifierError>>>;

fn pop<T>(script: &Script<T>, method: &str) -> Result<T, VerifierError> {
    script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| panic!("no scripted answer left for {method}"))
}

/// In-memory [`CredentialVerifier`] driven by per-method answer queues.
///
/// Gates let a test hold a response in flight: when a gate is installed the
/// method waits on it before answering, so the test can interleave other
/// transitions first.
#[derive(Default)]
pub(crate) struct ScriptedVerifier {
    pub login: Script<LoginOutcome>,
    pub verify: Script<AuthenticatedSession>,
    pub step_up: Script<ActionToken>,
    pub fetch: Script<Option<Operator>>,
    pub status: Script<MfaStatus>,
    pub setup: Script<MfaSetup>,
    pub enable: Script<Vec<String>>,
    pub disable: Script<()>,
    pub codes: Script<Vec<String>>,
    pub logout_calls: AtomicUsize,
    pub logout_answers: Script<()>,
    pub login_gate: Option<Arc<Notify>>,
    pub verify_gate: Option<Arc<Notify>>,
    pub step_up_gate: Option<Arc<Notify>>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_login(&self, answer: Result<LoginOutcome, VerifierError>) {
        self.login.lock().unwrap().push_back(answer);
    }

    pub fn queue_verify(&self, answer: Result<AuthenticatedSession, VerifierError>) {
        self.verify.lock().unwrap().push_back(answer);
    }

    pub fn queue_step_up(&self, answer: Result<ActionToken, VerifierError>) {
        self.step_up.lock().unwrap().push_back(answer);
    }

    pub fn queue_fetch(&self, answer: Result<Option<Operator>, VerifierError>) {
        self.fetch.lock().unwrap().push_back(answer);
    }
}

#[async_trait]
impl CredentialVerifier for ScriptedVerifier {
    async fn login(
        &self,
        _email: &str,
        _password: &SecretString,
    ) -> Result<LoginOutcome, VerifierError> {
        if let Some(gate) = &self.login_gate {
            gate.notified().await;
        }
        pop(&self.login, "login")
    }

    async fn verify_mfa(
        &self,
        _challenge: &MfaChallengeToken,
        _code: &str,
    ) -> Result<AuthenticatedSession, VerifierError> {
        if let Some(gate) = &self.verify_gate {
            gate.notified().await;
        }
        pop(&self.verify, "verify_mfa")
    }

    async fn verify_step_up(
        &self,
        _bearer: &BearerToken,
        _code: &str,
    ) -> Result<ActionToken, VerifierError> {
        if let Some(gate) = &self.step_up_gate {
            gate.notified().await;
        }
        pop(&self.step_up, "verify_step_up")
    }

    async fn fetch_session(
        &self,
        _bearer: &BearerToken,
    ) -> Result<Option<Operator>, VerifierError> {
        pop(&self.fetch, "fetch_session")
    }

    async fn mfa_status(&self, _bearer: &BearerToken) -> Result<MfaStatus, VerifierError> {
        pop(&self.status, "mfa_status")
    }

    async fn setup_mfa(&self, _bearer: &BearerToken) -> Result<MfaSetup, VerifierError> {
        pop(&self.setup, "setup_mfa")
    }

    async fn enable_mfa(
        &self,
        _bearer: &BearerToken,
        _code: &str,
    ) -> Result<Vec<String>, VerifierError> {
        pop(&self.enable, "enable_mfa")
    }

    async fn disable_mfa(&self, _bearer: &BearerToken, _code: &str) -> Result<(), VerifierError> {
        pop(&self.disable, "disable_mfa")
    }

    async fn backup_codes(
        &self,
        _bearer: &BearerToken,
        _action: Option<&ActionToken>,
    ) -> Result<Vec<String>, VerifierError> {
        pop(&self.codes, "backup_codes")
    }

    async fn logout(&self, _bearer: &BearerToken) -> Result<(), VerifierError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.logout_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
