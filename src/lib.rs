//! Actor onboarding: profile lifecycle for customers, dealers and experts,
//! plus the OTP-verified registration and password-reset sessions.

pub mod cache;
pub mod clients;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod matching;
pub mod messaging;
pub mod onboarding;
pub mod profile;
pub mod session;
pub mod store;
pub mod telemetry;

pub use error::{Error, ErrorKind, Result};
