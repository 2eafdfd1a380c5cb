//! Fetch pipeline
//!
//! index lookup → version resolution → cache check → artifact selection →
//! download → digest verification → extract/repack → cache store

pub mod archive;
pub mod fetch;
pub mod inflight;
pub mod modules;

pub use fetch::{verify_digest, FetchOutcome, FetchPipeline};
pub use inflight::InFlight;
pub use modules::{extract_modules, module_name};
