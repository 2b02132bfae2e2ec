//! Enterprise setup orchestration

pub mod fsm;
pub mod orchestrator;
pub mod phases;
