//! Setup phase models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ReconcilerError;

/// Phase status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Failed)
    }
}

/// Validated phase number in `1..=7`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PhaseId(u8);

impl PhaseId {
    pub const FIRST: u8 = 1;
    pub const LAST: u8 = 7;

    /// Validate a caller-supplied phase number
    pub fn new(n: i64) -> Result<Self, ReconcilerError> {
        if n < Self::FIRST as i64 || n > Self::LAST as i64 {
            return Err(ReconcilerError::ValidationError(format!(
                "Invalid phase number {}. Must be between {} and {}.",
                n,
                Self::FIRST,
                Self::LAST
            )));
        }
        Ok(Self(n as u8))
    }

    /// All phases in execution order
    pub fn all() -> impl Iterator<Item = PhaseId> {
        (Self::FIRST..=Self::LAST).map(PhaseId)
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based position in the phase list
    pub fn index(&self) -> usize {
        (self.0 - Self::FIRST) as usize
    }
}

impl TryFrom<u8> for PhaseId {
    type Error = ReconcilerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PhaseId::new(value as i64)
    }
}

impl From<PhaseId> for u8 {
    fn from(id: PhaseId) -> Self {
        id.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-phase progress record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupPhase {
    pub phase_id: PhaseId,
    pub name: String,
    pub status: PhaseStatus,
    pub errors: Vec<String>,
    pub fixed_issues: Vec<String>,

    /// Resources the phase body created on this run
    #[serde(default)]
    pub created: Vec<String>,

    /// Resources the phase body found already in place
    #[serde(default)]
    pub existing: Vec<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SetupPhase {
    pub fn new(phase_id: PhaseId, name: impl Into<String>) -> Self {
        Self {
            phase_id,
            name: name.into(),
            status: PhaseStatus::Pending,
            errors: Vec::new(),
            fixed_issues: Vec::new(),
            created: Vec::new(),
            existing: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// Completed/failed counts of a setup run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupSummary {
    pub completed_count: usize,
    pub failed_count: usize,
}

/// Result of a complete setup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRunResult {
    pub success: bool,
    pub phases: Vec<SetupPhase>,
    pub summary: SetupSummary,
}

impl SetupRunResult {
    pub fn from_phases(phases: Vec<SetupPhase>) -> Self {
        let summary = SetupSummary {
            completed_count: phases
                .iter()
                .filter(|p| p.status == PhaseStatus::Completed)
                .count(),
            failed_count: phases
                .iter()
                .filter(|p| p.status == PhaseStatus::Failed)
                .count(),
        };

        Self {
            success: summary.completed_count == phases.len(),
            phases,
            summary,
        }
    }
}

/// Read-only validation of the current setup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}
