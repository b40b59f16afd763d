pub mod enrollment;
pub mod enrollment_store;
pub mod match_engine;
pub mod match_result;
