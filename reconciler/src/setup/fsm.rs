//! Finite state machine for a setup phase

use chrono::Utc;

use crate::models::setup_phase::{PhaseStatus, SetupPhase};

/// Phase event
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    /// Begin (or re-run) the phase
    Start,

    /// Phase finished with zero residual issues
    Succeed { fixed_issues: Vec<String> },

    /// Phase finished with residual issues
    Fail {
        errors: Vec<String>,
        fixed_issues: Vec<String>,
    },
}

/// Apply an event to a phase record.
///
/// `pending -> running -> completed | failed`; a terminal phase may be
/// started again. Nothing retries automatically.
pub fn process(phase: &mut SetupPhase, event: PhaseEvent) -> Result<(), String> {
    let new_status = match (phase.status, event) {
        // From Pending, Completed or Failed
        (
            PhaseStatus::Pending | PhaseStatus::Completed | PhaseStatus::Failed,
            PhaseEvent::Start,
        ) => {
            phase.errors.clear();
            phase.fixed_issues.clear();
            phase.created.clear();
            phase.existing.clear();
            phase.started_at = Some(Utc::now());
            phase.ended_at = None;
            PhaseStatus::Running
        }

        // From Running
        (PhaseStatus::Running, PhaseEvent::Succeed { fixed_issues }) => {
            phase.fixed_issues = fixed_issues;
            phase.ended_at = Some(Utc::now());
            PhaseStatus::Completed
        }
        (
            PhaseStatus::Running,
            PhaseEvent::Fail {
                errors,
                fixed_issues,
            },
        ) => {
            phase.errors = errors;
            phase.fixed_issues = fixed_issues;
            phase.ended_at = Some(Utc::now());
            PhaseStatus::Failed
        }

        // Invalid transitions
        (status, event) => {
            return Err(format!("Invalid transition: {:?} -> {:?}", status, event));
        }
    };

    phase.status = new_status;
    Ok(())
}
