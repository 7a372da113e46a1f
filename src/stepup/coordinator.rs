//! Step-up coordinator for sensitive operations.
//!
//! Flow Overview:
//! 1) `execute_with_mfa` parks the operation and opens a challenge prompt.
//!    Operators without MFA enrolled run immediately and skip the prompt.
//! 2) The console collects a code and calls `handle_mfa_verified`; a
//!    rejected code reopens the prompt with the parked operation intact.
//! 3) On success the fresh action token lands on the channel, the parked
//!    operation runs, and the channel is cleared however the operation
//!    settles.
//! 4) `cancel` abandons the parked operation; its caller resolves with
//!    `StepUpCancelled` and the channel is never written.
//!
//! Security boundaries:
//! - The action token exists only between a successful verification and the
//!   end of the single operation it authorizes.
//! - A rejected or abandoned challenge never runs the operation.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::session::SessionStore;
use crate::stepup::channel::ActionTokenChannel;
use crate::token::ActionToken;
use crate::verifier::{CredentialVerifier, VerifierError};

/// Observable state of the step-up challenge prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepUpPrompt {
    Idle,
    /// A challenge is open for the named action. `rejection` carries the
    /// message of the last failed attempt, if any.
    Open {
        action_name: String,
        action_description: String,
        rejection: Option<String>,
    },
    /// A code is being verified server-side.
    Verifying {
        action_name: String,
        action_description: String,
    },
}

/// Wakes the `execute_with_mfa` caller with the operation's output. Kept
/// separate from the operation future so the wake happens only after the
/// channel is cleared.
type Resolver = Box<dyn FnOnce() + Send>;

type PendingOperation =
    Box<dyn FnOnce(Option<ActionToken>) -> BoxFuture<'static, Resolver> + Send>;

enum CoordinatorState {
    Idle,
    /// An operation is parked awaiting verification.
    Pending {
        action_name: String,
        action_description: String,
        operation: PendingOperation,
        verifying: bool,
    },
    /// A verified operation is running; no new challenge may open.
    Running,
}

struct CoordinatorSlot {
    state: CoordinatorState,
    /// Bumped whenever a new challenge opens. In-flight verifications carry
    /// the generation they started from, so a result that outlived its
    /// challenge can never act on a later one.
    generation: u64,
}

/// Serializes step-up challenges: at most one sensitive operation is parked
/// or running at a time.
pub struct StepUpCoordinator {
    slot: Mutex<CoordinatorSlot>,
    notify: watch::Sender<StepUpPrompt>,
    session: Arc<SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
    channel: Arc<ActionTokenChannel>,
}

impl StepUpCoordinator {
    #[must_use]
    pub fn new(
        session: Arc<SessionStore>,
        verifier: Arc<dyn CredentialVerifier>,
        channel: Arc<ActionTokenChannel>,
    ) -> Self {
        let (notify, _) = watch::channel(StepUpPrompt::Idle);

        Self {
            slot: Mutex::new(CoordinatorSlot {
                state: CoordinatorState::Idle,
                generation: 0,
            }),
            notify,
            session,
            verifier,
            channel,
        }
    }

    /// Latest published prompt state.
    #[must_use]
    pub fn prompt(&self) -> StepUpPrompt {
        self.notify.borrow().clone()
    }

    /// Watch channel receiving every prompt change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StepUpPrompt> {
        self.notify.subscribe()
    }

    /// Runs `operation` behind a fresh MFA verification and resolves with
    /// its output once it ran. Operators without MFA enrolled run
    /// immediately and receive no action token.
    ///
    /// The returned future stays pending while the challenge is open; the
    /// caller's output travels back through a one-shot channel.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without a session, `StepUpInProgress` when another
    /// challenge is already open, `StepUpCancelled` when the challenge is
    /// abandoned before verification succeeds.
    pub async fn execute_with_mfa<F, Fut, T>(
        &self,
        action_name: impl Into<String>,
        action_description: impl Into<String>,
        operation: F,
    ) -> Result<T, AuthError>
    where
        F: FnOnce(Option<ActionToken>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let snapshot = self.session.snapshot();
        let Some(operator) = snapshot.operator() else {
            return Err(AuthError::NotAuthenticated);
        };

        if !operator.mfa_enabled {
            debug!("Running sensitive action without step-up: MFA not enrolled");
            return Ok(operation(None).await);
        }

        let action_name = action_name.into();
        let action_description = action_description.into();
        let (sender, receiver) = oneshot::channel();

        {
            let mut slot = lock(&self.slot);
            if !matches!(slot.state, CoordinatorState::Idle) {
                return Err(AuthError::StepUpInProgress);
            }

            let operation: PendingOperation = Box::new(move |token| {
                Box::pin(async move {
                    let output = operation(token).await;
                    let resolver: Resolver = Box::new(move || {
                        let _ = sender.send(output);
                    });
                    resolver
                })
            });

            slot.generation += 1;
            slot.state = CoordinatorState::Pending {
                action_name: action_name.clone(),
                action_description: action_description.clone(),
                operation,
                verifying: false,
            };
            info!(action = %action_name, "Step-up challenge opened");
            self.notify.send_replace(StepUpPrompt::Open {
                action_name,
                action_description,
                rejection: None,
            });
        }

        match receiver.await {
            Ok(output) => Ok(output),
            Err(_) => Err(AuthError::StepUpCancelled),
        }
    }

    /// Verifies a code for the open challenge and, on success, runs the
    /// parked operation with the fresh action token.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` without an open challenge, `StepUpInProgress`
    /// while a previous code is still being verified, `InvalidMfaCode` on a
    /// rejected code (the challenge stays open), `SessionExpired` when the
    /// session is gone (the challenge is abandoned), `Transport` on verifier
    /// failure (the challenge stays open).
    pub async fn handle_mfa_verified(&self, code: &str) -> Result<(), AuthError> {
        let (action_name, action_description, generation) = {
            let mut slot = lock(&self.slot);
            let generation = slot.generation;
            match &mut slot.state {
                CoordinatorState::Pending {
                    action_name,
                    action_description,
                    verifying,
                    ..
                } => {
                    if *verifying {
                        return Err(AuthError::StepUpInProgress);
                    }
                    *verifying = true;
                    self.notify.send_replace(StepUpPrompt::Verifying {
                        action_name: action_name.clone(),
                        action_description: action_description.clone(),
                    });
                    (action_name.clone(), action_description.clone(), generation)
                }
                CoordinatorState::Idle => {
                    return Err(AuthError::InvalidTransition {
                        from: "idle",
                        operation: "verify a step-up code",
                    });
                }
                CoordinatorState::Running => {
                    return Err(AuthError::InvalidTransition {
                        from: "running",
                        operation: "verify a step-up code",
                    });
                }
            }
        };

        let Some(bearer) = self.session.bearer_token() else {
            // The session is gone; the parked operation can never run.
            self.abandon_if_current(generation, "session ended before verification");
            return Err(AuthError::SessionExpired);
        };

        match self.verifier.verify_step_up(&bearer, code).await {
            Ok(token) => self.run_pending(generation, token).await,
            Err(VerifierError::CodeRejected(message)) => {
                debug!("Step-up code rejected");
                self.reopen(generation, action_name, action_description, Some(message.clone()));
                Err(AuthError::InvalidMfaCode(message))
            }
            Err(VerifierError::Unauthorized) => {
                warn!("Session rejected during step-up verification");
                self.abandon_if_current(generation, "session expired");
                self.session.handle_session_expired().await;
                Err(AuthError::SessionExpired)
            }
            Err(other) => {
                let error = AuthError::Transport(other.to_string());
                self.reopen(generation, action_name, action_description, Some(error.to_string()));
                Err(error)
            }
        }
    }

    /// Abandons the open challenge. The parked caller resolves with
    /// `StepUpCancelled`; outside a challenge this is a no-op.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        self.abandon(&mut slot, "cancelled by operator");
    }

    async fn run_pending(&self, generation: u64, token: ActionToken) -> Result<(), AuthError> {
        let operation = {
            let mut slot = lock(&self.slot);
            // A verification only runs the challenge it was entered for.
            // Cancelled, or cancelled and reopened for another action while
            // the code was in flight, means the token is dropped unused.
            if slot.generation != generation {
                debug!("Discarding step-up verification: issued for an earlier challenge");
                return Err(AuthError::StepUpCancelled);
            }
            match std::mem::replace(&mut slot.state, CoordinatorState::Running) {
                CoordinatorState::Pending { operation, .. } => operation,
                other => {
                    slot.state = other;
                    debug!("Discarding step-up verification: challenge no longer open");
                    return Err(AuthError::StepUpCancelled);
                }
            }
        };

        let reset = ResetGuard { coordinator: self };
        self.channel.set(token.clone());
        info!("Step-up verified, executing pending action");
        let resolve = operation(Some(token)).await;
        // The caller wakes only after the guard emptied the channel, so it
        // can never observe its own spent token still readable.
        drop(reset);
        resolve();
        Ok(())
    }

    fn reopen(
        &self,
        generation: u64,
        action_name: String,
        action_description: String,
        rejection: Option<String>,
    ) {
        let mut slot = lock(&self.slot);
        if slot.generation != generation {
            return;
        }
        if let CoordinatorState::Pending { verifying, .. } = &mut slot.state {
            *verifying = false;
            self.notify.send_replace(StepUpPrompt::Open {
                action_name,
                action_description,
                rejection,
            });
        }
    }

    fn abandon_if_current(&self, generation: u64, reason: &str) {
        let mut slot = lock(&self.slot);
        if slot.generation == generation {
            self.abandon(&mut slot, reason);
        }
    }

    fn abandon(&self, slot: &mut CoordinatorSlot, reason: &str) {
        if matches!(slot.state, CoordinatorState::Pending { .. }) {
            debug!("Abandoning step-up challenge: {reason}");
            // Dropping the parked operation drops its one-shot sender, which
            // resolves the waiting caller.
            slot.state = CoordinatorState::Idle;
            self.notify.send_replace(StepUpPrompt::Idle);
        }
    }
}

/// Clears the channel and resets the coordinator however the verified
/// operation exits, panics included.
struct ResetGuard<'a> {
    coordinator: &'a StepUpCoordinator,
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.channel.clear();
        lock(&self.coordinator.slot).state = CoordinatorState::Idle;
        self.coordinator.notify.send_replace(StepUpPrompt::Idle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
