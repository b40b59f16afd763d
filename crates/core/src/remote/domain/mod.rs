pub mod http_transport;
pub mod network_error;
pub mod remote_config;
pub mod retry;
pub mod wire;
