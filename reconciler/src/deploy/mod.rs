//! Deployment tracking and post-deploy validation

pub mod tracker;
pub mod validation;
