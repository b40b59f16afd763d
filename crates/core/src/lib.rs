//! Face-match verification: detect a face in a frame, embed it, and match
//! the embedding against enrolled subjects locally or through a remote
//! service.

pub mod detection;
pub mod extraction;
pub mod matching;
pub mod remote;
pub mod settings;
pub mod shared;
pub mod verification;
