use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::operator::Operator;
use crate::token::{BearerToken, MfaChallengeToken};

/// Discriminant of the session state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Anonymous,
    AwaitingMfa,
    Authenticated,
}

impl Phase {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::AwaitingMfa => "awaiting MFA",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Full session phase holding phase-specific credentials. Exactly one
/// variant exists at a time, so a challenge token cannot coexist with a
/// bearer token by construction.
#[derive(Clone, Debug)]
pub(crate) enum SessionPhase {
    Anonymous,
    AwaitingMfa {
        challenge: MfaChallengeToken,
    },
    Authenticated {
        operator: Operator,
        bearer: BearerToken,
    },
}

impl SessionPhase {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            Self::Anonymous => Phase::Anonymous,
            Self::AwaitingMfa { .. } => Phase::AwaitingMfa,
            Self::Authenticated { .. } => Phase::Authenticated,
        }
    }
}

/// Consistent, token-free view of the session published to observers.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    phase: Phase,
    operator: Option<Operator>,
    last_error: Option<AuthError>,
    epoch: u64,
}

impl SessionSnapshot {
    pub(crate) fn new(
        phase: Phase,
        operator: Option<Operator>,
        last_error: Option<AuthError>,
        epoch: u64,
    ) -> Self {
        Self {
            phase,
            operator,
            last_error,
            epoch,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The signed-in operator; `Some` exactly when the phase is
    /// `Authenticated`.
    #[must_use]
    pub fn operator(&self) -> Option<&Operator> {
        self.operator.as_ref()
    }

    /// Outcome of the most recent failed transition, cleared by the next
    /// successful one.
    #[must_use]
    pub fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    #[must_use]
    pub fn is_awaiting_mfa(&self) -> bool {
        self.phase == Phase::AwaitingMfa
    }

    /// Monotonic transition counter, bumped on every committed change.
    /// Hosts can capture it before an async operation and discard a result
    /// whose session has since moved on.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
