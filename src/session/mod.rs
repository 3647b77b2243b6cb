//! Ephemeral registration and password-reset sessions with OTP checks.

pub mod model;
pub mod otp;
pub mod workflow;

pub use model::{RegistrationPayload, Session, SessionKind};
pub use otp::{Clock, SystemClock};
pub use workflow::{SessionDeps, SessionWorkflow};
