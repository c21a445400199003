// Public API - only expose the runner module
pub mod runner;

// Internal modules - organized by subsystem
mod config;
mod error;
mod schedule;
mod sheets;
mod sync;
mod telemetry;
mod tracking;

#[cfg(test)]
mod testutil;
