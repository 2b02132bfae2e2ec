//! Platform credentials

pub mod graph_token;
