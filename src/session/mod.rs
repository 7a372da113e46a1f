//! Session state machine, published snapshots, and MFA enrollment settings.

mod mfa;
mod phase;
mod store;


pub use mfa::MfaSettings;
pub use phase::{Phase, SessionSnapshot};
pub use store::SessionStore;
