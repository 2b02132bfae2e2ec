//! Domain models

pub mod deployment;
pub mod deployment_error;
pub mod platform;
pub mod setup_phase;
pub mod sync_report;
