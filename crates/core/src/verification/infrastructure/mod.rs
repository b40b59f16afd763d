pub mod remote_identity_matcher;
pub mod session_runner;
