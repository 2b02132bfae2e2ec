//! Cross-platform status, drift detection and remediation

pub mod aggregator;
pub mod detector;
pub mod remediation;
