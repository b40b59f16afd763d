pub mod in_memory_enrollment_store;
pub mod json_file_enrollment_store;
