//! # Pordisto (Admin Console Session Core)
//!
//! `pordisto` is the session-authentication and step-up-authorization core
//! of the administrative console. It owns the login state machine, decides
//! what the console may render, and demands fresh MFA proof before sensitive
//! operations. Rendering and routing stay in the host; all server
//! interaction goes through the [`verifier::CredentialVerifier`] seam.
//!
//! ## Session Lifecycle
//!
//! A session is always in exactly one phase: `Anonymous`, `AwaitingMfa`, or
//! `Authenticated`. Phase-specific credentials live inside the phase, so a
//! challenge token cannot outlive its challenge and no token survives
//! signing out.
//!
//! - **Two-Phase Login:** Password first; operators with MFA enrolled must
//!   then verify a one-time code before a session exists.
//! - **Stale-Response Protection:** Every transition re-checks that the
//!   session did not change while its network call was in flight; late
//!   responses are discarded, never applied.
//! - **Hydration:** At startup a stored bearer token is resolved back into a
//!   session, or removed if the service no longer accepts it.
//!
//! ## Step-Up Authorization
//!
//! Sensitive operations run through [`stepup::StepUpCoordinator`], which
//! parks the operation, prompts for a fresh code, and only runs the
//! operation once verification succeeds. The resulting action token is
//! handed over through a one-slot channel and cleared however the operation
//! settles, so the proof never authorizes more than one request.
//!
//! ## Guards
//!
//! Route guards evaluate [`session::SessionSnapshot`]s into render
//! decisions. They gate what the console shows; the service still authorizes
//! every request. Unauthenticated operators are redirected to login before
//! capability checks run, so guards never reveal which capabilities a page
//! needs.

pub mod capability;
pub mod config;
pub mod error;
pub mod guard;
pub mod operator;
pub mod session;
pub mod stepup;
pub mod storage;
pub mod token;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use capability::Capability;
pub use config::AuthConfig;
pub use error::AuthError;
pub use guard::{AuthRequired, CapabilityGuard, GuardOutcome, GuestOnly};
pub use operator::Operator;
pub use session::{MfaSettings, Phase, SessionSnapshot, SessionStore};
pub use stepup::{ActionTokenChannel, StepUpCoordinator, StepUpPrompt};
pub use storage::{FileTokenStore, MemoryTokenStore, StorageError, TokenStore};
pub use token::{ActionToken, BearerToken, MfaChallengeToken};
pub use verifier::{
    AuthenticatedSession, CredentialVerifier, HttpCredentialVerifier, LoginOutcome, MfaSetup,
    MfaStatus, VerifierError,
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
