//! Experiment-tracking service: domain types and the HTTP client

pub mod client;
pub mod run;
