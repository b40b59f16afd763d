pub mod identity_matcher;
pub mod quality_gate;
pub mod session_config;
pub mod session_observer;
pub mod session_state;
pub mod verification_error;
pub mod verification_session;

#[cfg(test)]
pub(crate) mod session_fixtures;
