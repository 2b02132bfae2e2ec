//! Microsoft Graph device-management (Intune) adapter

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::info;

use crate::adapters::{
    auth_outcome, unsupported, ActionOutcome, AdapterAction, PlatformAdapter, PlatformSnapshot,
};
use crate::authn::graph_token::TokenManagerExt;
use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::http::graph::{IntuneBrand, NewCompliancePolicy};
use crate::models::platform::{ConnectionStatus, Platform};
use crate::storage::settings::{BrandingSettings, CompliancePolicySettings};

/// Device-management adapter: MDM authority, compliance policies and portal branding
pub struct GraphDeviceMgmtAdapter {
    http_client: Arc<HttpClient>,
    token_manager: Arc<dyn TokenManagerExt>,
}

impl GraphDeviceMgmtAdapter {
    pub fn new(http_client: Arc<HttpClient>, token_manager: Arc<dyn TokenManagerExt>) -> Self {
        Self {
            http_client,
            token_manager,
        }
    }

    async fn mdm_authority(&self, token: &str) -> Result<String, ReconcilerError> {
        let dm = self.http_client.graph_device_management(token).await?;
        Ok(dm.subscription_state.unwrap_or(dm.id))
    }

    async fn ensure_policy(
        &self,
        policy: &CompliancePolicySettings,
    ) -> Result<ActionOutcome, ReconcilerError> {
        let token = self.token_manager.get_token().await?;
        let token = token.expose_secret();

        let existing = self.http_client.graph_compliance_policies(token).await?;
        if let Some(found) = existing.into_iter().find(|p| p.display_name == policy.name) {
            return Ok(ActionOutcome::existing(found.id));
        }

        info!("Creating compliance policy {}", policy.name);
        let created = self
            .http_client
            .graph_create_compliance_policy(
                &NewCompliancePolicy::windows10(
                    &policy.name,
                    &policy.description,
                    policy.password_minimum_length,
                    &policy.os_minimum_version,
                ),
                token,
            )
            .await?;
        Ok(ActionOutcome::created(created.id))
    }

    async fn configure_branding(
        &self,
        branding: &BrandingSettings,
    ) -> Result<ActionOutcome, ReconcilerError> {
        let token = self.token_manager.get_token().await?;

        info!("Applying company portal branding {}", branding.display_name);
        self.http_client
            .graph_update_branding(
                &IntuneBrand {
                    display_name: &branding.display_name,
                    contact_it_name: &branding.contact_it_name,
                    contact_it_email: &branding.contact_it_email,
                    contact_it_phone: &branding.contact_it_phone,
                },
                token.expose_secret(),
            )
            .await?;
        Ok(ActionOutcome::accepted())
    }
}

#[async_trait]
impl PlatformAdapter for GraphDeviceMgmtAdapter {
    fn platform(&self) -> Platform {
        Platform::DeviceMgmt
    }

    fn name(&self) -> &str {
        "graph-intune"
    }

    async fn check_auth(&self) -> Result<ConnectionStatus, ReconcilerError> {
        let result = match self.token_manager.get_token().await {
            Ok(token) => self.mdm_authority(token.expose_secret()).await,
            Err(e) => Err(e),
        };
        auth_outcome(self.platform(), result)
    }

    async fn get_current_state(&self) -> Result<PlatformSnapshot, ReconcilerError> {
        let token = self.token_manager.get_token().await?;
        let token = token.expose_secret();

        let mdm_authority = self.mdm_authority(token).await?;
        let policies = self
            .http_client
            .graph_compliance_policies(token)
            .await?
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        let managed_device_count = self.http_client.graph_managed_devices(token).await?.len();

        Ok(PlatformSnapshot::DeviceMgmt {
            mdm_authority: Some(mdm_authority),
            policies,
            managed_device_count,
        })
    }

    async fn trigger_action(
        &self,
        action: AdapterAction,
    ) -> Result<ActionOutcome, ReconcilerError> {
        match action {
            AdapterAction::ReAuthenticate => {
                let token = self.token_manager.refresh_token().await?;
                let authority = self.mdm_authority(token.expose_secret()).await?;
                Ok(ActionOutcome::existing(authority))
            }
            AdapterAction::EnsureCompliancePolicy(policy) => self.ensure_policy(&policy).await,
            AdapterAction::ConfigureBranding(branding) => self.configure_branding(&branding).await,
            other => Err(unsupported(self.name(), &other)),
        }
    }
}
