use thiserror::Error;

/// Errors surfaced by session transitions and step-up coordination.
///
/// Display strings are shown to operators verbatim, so they carry no token
/// material and no upstream response bodies beyond a trimmed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Login was refused. The message is safe to render.
    #[error("{0}")]
    InvalidCredentials(String),
    /// A verification code was rejected. The message is safe to render.
    #[error("{0}")]
    InvalidMfaCode(String),
    #[error("Too many failed verification attempts")]
    MfaAttemptsExhausted,
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Session expired")]
    SessionExpired,
    #[error("Another sensitive action is awaiting verification")]
    StepUpInProgress,
    #[error("Verification was cancelled")]
    StepUpCancelled,
    /// A network response arrived after the session had already moved on.
    /// The response was discarded without touching the session.
    #[error("Response discarded: the session changed while the request was in flight")]
    StaleResponse,
    #[error("Cannot {operation} while {from}")]
    InvalidTransition {
        from: &'static str,
        operation: &'static str,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Storage(String),
}
