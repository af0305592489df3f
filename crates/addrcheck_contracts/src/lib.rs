#![forbid(unsafe_code)]

pub mod address;
pub mod batch;
pub mod common;
pub mod request;

pub use common::{ContractViolation, SchemaVersion, Validate};
