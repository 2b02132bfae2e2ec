//! The seven enterprise setup phases

use std::time::Duration;

use tracing::{debug, info};

use crate::adapters::{AdapterAction, AdapterSet, PlatformSnapshot};
use crate::errors::ReconcilerError;
use crate::models::platform::Platform;
use crate::models::setup_phase::PhaseId;
use crate::storage::settings::SetupSettings;
use crate::utils::with_timeout;

/// Static description of a phase
#[derive(Debug, Clone, Copy)]
pub struct PhaseDefinition {
    pub name: &'static str,

    /// Platforms the phase touches and re-checks
    pub scope: &'static [Platform],
}

const PHASES: [PhaseDefinition; 7] = [
    PhaseDefinition {
        name: "identity",
        scope: &[Platform::Identity],
    },
    PhaseDefinition {
        name: "device_management",
        scope: &[Platform::DeviceMgmt],
    },
    PhaseDefinition {
        name: "carrier_groups",
        scope: &[Platform::Identity],
    },
    PhaseDefinition {
        name: "compliance_policies",
        scope: &[Platform::DeviceMgmt],
    },
    PhaseDefinition {
        name: "verification",
        scope: &[Platform::Identity, Platform::DeviceMgmt],
    },
    PhaseDefinition {
        name: "company_portal",
        scope: &[Platform::DeviceMgmt],
    },
    PhaseDefinition {
        name: "final_validation",
        scope: &Platform::ALL,
    },
];

pub fn definition(id: PhaseId) -> &'static PhaseDefinition {
    &PHASES[id.index()]
}

/// Inputs shared by phase bodies
pub struct PhaseContext<'a> {
    pub adapters: &'a AdapterSet,
    pub setup: &'a SetupSettings,
    pub adapter_timeout: Duration,
}

/// What a phase body did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyOutcome {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    /// Failures with the platform that reported them
    pub errors: Vec<(Platform, String)>,
}

impl BodyOutcome {
    fn record(
        &mut self,
        platform: Platform,
        resource: String,
        result: Result<bool, ReconcilerError>,
    ) {
        match result {
            Ok(true) => self.created.push(resource),
            Ok(false) => self.existing.push(resource),
            Err(e) => self.errors.push((platform, format!("{}: {}", resource, e))),
        }
    }

    /// Error strings in the order they occurred
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|(_, m)| m.clone()).collect()
    }
}

/// Run the body of a phase. Bodies are idempotent: a second run creates nothing.
pub async fn run_body(id: PhaseId, ctx: &PhaseContext<'_>) -> BodyOutcome {
    let mut outcome = BodyOutcome::default();

    for platform in definition(id).scope {
        if ctx.adapters.get(*platform).is_none() {
            outcome
                .errors
                .push((*platform, format!("{} is not configured", platform)));
        }
    }
    if !outcome.errors.is_empty() {
        return outcome;
    }

    match id.get() {
        3 => ensure_carrier_groups(ctx, &mut outcome).await,
        4 => ensure_compliance_policy(ctx, &mut outcome).await,
        5 => outcome.errors.extend(verify_resources(ctx).await),
        6 => configure_branding(ctx, &mut outcome).await,
        // Phases 1, 2 and 7 are pure checks
        _ => debug!("Phase {} has no body", id),
    }

    outcome
}

async fn apply(
    ctx: &PhaseContext<'_>,
    platform: Platform,
    action: AdapterAction,
) -> Result<bool, ReconcilerError> {
    let adapter = ctx.adapters.require(platform)?;
    let what = format!("{} {}", adapter.name(), action.name());
    let outcome = with_timeout(ctx.adapter_timeout, &what, adapter.trigger_action(action)).await?;
    if !outcome.accepted {
        return Err(ReconcilerError::ConfigError(format!("{} was not accepted", what)));
    }
    Ok(outcome.created)
}

async fn ensure_carrier_groups(ctx: &PhaseContext<'_>, outcome: &mut BodyOutcome) {
    for carrier in &ctx.setup.carriers {
        let name = carrier.group_name();
        let result = apply(
            ctx,
            Platform::Identity,
            AdapterAction::EnsureGroup {
                display_name: name.clone(),
                description: carrier.group_description(),
            },
        )
        .await;
        if let Ok(true) = result {
            info!("Created carrier group {}", name);
        }
        outcome.record(Platform::Identity, format!("Group {}", name), result);
    }
}

async fn ensure_compliance_policy(ctx: &PhaseContext<'_>, outcome: &mut BodyOutcome) {
    let policy = &ctx.setup.compliance_policy;
    let result = apply(
        ctx,
        Platform::DeviceMgmt,
        AdapterAction::EnsureCompliancePolicy(policy.clone()),
    )
    .await;
    outcome.record(
        Platform::DeviceMgmt,
        format!("Compliance policy {}", policy.name),
        result,
    );
}

async fn configure_branding(ctx: &PhaseContext<'_>, outcome: &mut BodyOutcome) {
    let branding = &ctx.setup.branding;
    // Branding is an in-place update and never counts as a creation
    let result = apply(
        ctx,
        Platform::DeviceMgmt,
        AdapterAction::ConfigureBranding(branding.clone()),
    )
    .await
    .map(|_| false);
    outcome.record(
        Platform::DeviceMgmt,
        format!("Company portal branding {}", branding.display_name),
        result,
    );
}

/// Missing carrier groups and compliance policy
pub async fn verify_resources(ctx: &PhaseContext<'_>) -> Vec<(Platform, String)> {
    let mut errors = Vec::new();

    match read_state(ctx, Platform::Identity).await {
        Ok(PlatformSnapshot::Identity { groups, .. }) => {
            for carrier in &ctx.setup.carriers {
                let name = carrier.group_name();
                if !groups.contains(&name) {
                    errors.push((Platform::Identity, format!("Group {} not found", name)));
                }
            }
        }
        Ok(_) => errors.push((
            Platform::Identity,
            "Identity returned an unexpected snapshot".to_string(),
        )),
        Err(e) => errors.push((
            Platform::Identity,
            format!("Could not read identity state: {}", e),
        )),
    }

    match read_state(ctx, Platform::DeviceMgmt).await {
        Ok(PlatformSnapshot::DeviceMgmt { policies, .. }) => {
            let policy = &ctx.setup.compliance_policy.name;
            if !policies.contains(policy) {
                errors.push((
                    Platform::DeviceMgmt,
                    format!("Compliance policy {} not found", policy),
                ));
            }
        }
        Ok(_) => errors.push((
            Platform::DeviceMgmt,
            "Device management returned an unexpected snapshot".to_string(),
        )),
        Err(e) => errors.push((
            Platform::DeviceMgmt,
            format!("Could not read device management state: {}", e),
        )),
    }

    errors
}

async fn read_state(
    ctx: &PhaseContext<'_>,
    platform: Platform,
) -> Result<PlatformSnapshot, ReconcilerError> {
    let adapter = ctx.adapters.require(platform)?;
    let what = format!("{} state read", adapter.name());
    with_timeout(ctx.adapter_timeout, &what, adapter.get_current_state()).await
}
