//! Reconciler Library
//!
//! Setup orchestration and cross-platform reconciliation across source
//! control, hosting, identity and device management platforms.

pub mod adapters;
pub mod app;
pub mod authn;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod ledger;
pub mod logs;
pub mod models;
pub mod server;
pub mod setup;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod workers;
