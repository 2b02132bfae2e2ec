//! HTTP API models shared by the reconciler server and its clients.

pub mod models;

pub use models::*;
