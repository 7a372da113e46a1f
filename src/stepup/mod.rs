//! Step-up authorization: the challenge-and-resume wrapper for sensitive
//! operations and the one-slot action-token hand-off.

mod channel;
mod coordinator;


pub use channel::ActionTokenChannel;
pub use coordinator::{StepUpCoordinator, StepUpPrompt};
