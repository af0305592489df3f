#![forbid(unsafe_code)]

pub mod cancellation;
pub mod orchestrator;
