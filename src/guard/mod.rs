//! Route guards: render-gating decisions over session snapshots.
//!
//! Guards shape what the console shows; they are not access control. Every
//! request a guarded page makes is still authorized server-side.

use crate::capability::Capability;
use crate::config::AuthConfig;
use crate::session::{Phase, SessionSnapshot};

/// Decision returned by every guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    /// Send the operator to the login page, remembering where they were
    /// headed when the config says to.
    RedirectToLogin { return_to: Option<String> },
    /// Send the signed-in operator back to the landing route.
    RedirectToHome { route: String },
    /// Signed in but lacking capabilities. Distinct from unauthenticated so
    /// the console can say "ask an admin" instead of showing a login form.
    Forbidden { missing: Vec<Capability> },
}

/// Pages only guests may see, such as the login form. Anything past
/// `Anonymous` is redirected to the landing route; the pending-challenge
/// form lives inside the login flow, not behind this guard.
pub struct GuestOnly;

impl GuestOnly {
    #[must_use]
    pub fn evaluate(snapshot: &SessionSnapshot, config: &AuthConfig) -> GuardOutcome {
        if snapshot.phase() == Phase::Anonymous {
            GuardOutcome::Allow
        } else {
            GuardOutcome::RedirectToHome {
                route: config.landing_route().to_string(),
            }
        }
    }
}

/// Pages requiring a signed-in operator.
pub struct AuthRequired;

impl AuthRequired {
    #[must_use]
    pub fn evaluate(
        snapshot: &SessionSnapshot,
        config: &AuthConfig,
        requested_location: &str,
    ) -> GuardOutcome {
        if snapshot.is_authenticated() {
            GuardOutcome::Allow
        } else {
            GuardOutcome::RedirectToLogin {
                return_to: return_to(config, requested_location),
            }
        }
    }
}

/// Capability-gated pages and actions. Authentication is evaluated first,
/// so an anonymous operator is sent to login rather than told about
/// permissions they could not know they lack.
pub struct CapabilityGuard {
    required: Vec<Capability>,
}

impl CapabilityGuard {
    /// Allows operators holding this capability.
    #[must_use]
    pub fn require(capability: Capability) -> Self {
        Self {
            required: vec![capability],
        }
    }

    /// Allows operators holding any one of the listed capabilities. An
    /// empty list requires nothing and always allows.
    #[must_use]
    pub fn require_any(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            required: capabilities.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn evaluate(
        &self,
        snapshot: &SessionSnapshot,
        config: &AuthConfig,
        requested_location: &str,
    ) -> GuardOutcome {
        let Some(operator) = snapshot.operator() else {
            return GuardOutcome::RedirectToLogin {
                return_to: return_to(config, requested_location),
            };
        };

        if self.required.is_empty()
            || self
                .required
                .iter()
                .any(|capability| operator.has_capability(*capability))
        {
            GuardOutcome::Allow
        } else {
            GuardOutcome::Forbidden {
                missing: self.required.clone(),
            }
        }
    }
}

fn return_to(config: &AuthConfig, requested_location: &str) -> Option<String> {
    config
        .remember_requested_route()
        .then(|| requested_location.to_string())
}
