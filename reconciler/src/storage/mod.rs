//! Persistent storage

pub mod event_log;
pub mod layout;
pub mod settings;
