pub mod http_enrollment_store;
pub mod http_verification_client;
pub mod reqwest_transport;

#[cfg(test)]
pub(crate) mod scripted_transport;
