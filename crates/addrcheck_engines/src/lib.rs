#![forbid(unsafe_code)]

pub mod batch_builder;
pub mod cache_key;
pub mod client;
pub mod config;
pub mod partition;
pub mod smarty;
pub mod transform;
