pub mod constants;
pub mod embedding;
pub mod frame;
