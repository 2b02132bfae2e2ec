//! Microsoft Graph API client

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::ReconcilerError;
use crate::http::client::HttpClient;
use crate::http::encode_query;

/// Graph collection wrapper; `next_link` is set while more pages remain
#[derive(Debug, Clone, Deserialize)]
pub struct GraphList<T> {
    pub value: Vec<T>,
    #[serde(default, rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Security group creation request
#[derive(Debug, Clone, Serialize)]
pub struct NewGroup<'a> {
    #[serde(rename = "displayName")]
    pub display_name: &'a str,
    pub description: &'a str,
    #[serde(rename = "mailEnabled")]
    pub mail_enabled: bool,
    #[serde(rename = "mailNickname")]
    pub mail_nickname: &'a str,
    #[serde(rename = "securityEnabled")]
    pub security_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceManagement {
    pub id: String,
    #[serde(default, rename = "subscriptionState")]
    pub subscription_state: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompliancePolicy {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Windows 10 compliance policy creation request
#[derive(Debug, Clone, Serialize)]
pub struct NewCompliancePolicy<'a> {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'a str,
    #[serde(rename = "displayName")]
    pub display_name: &'a str,
    pub description: &'a str,
    #[serde(rename = "passwordRequired")]
    pub password_required: bool,
    #[serde(rename = "passwordMinimumLength")]
    pub password_minimum_length: u32,
    #[serde(rename = "osMinimumVersion")]
    pub os_minimum_version: &'a str,
    #[serde(rename = "scheduledActionsForRule")]
    pub scheduled_actions: Vec<serde_json::Value>,
}

impl<'a> NewCompliancePolicy<'a> {
    pub fn windows10(
        display_name: &'a str,
        description: &'a str,
        password_minimum_length: u32,
        os_minimum_version: &'a str,
    ) -> Self {
        Self {
            odata_type: "#microsoft.graph.windows10CompliancePolicy",
            display_name,
            description,
            password_required: true,
            password_minimum_length,
            os_minimum_version,
            // Graph rejects policies without a block action
            scheduled_actions: vec![serde_json::json!({
                "ruleName": "PasswordRequired",
                "scheduledActionConfigurations": [{
                    "actionType": "block",
                    "gracePeriodHours": 0
                }]
            })],
        }
    }
}

/// Company portal branding
#[derive(Debug, Clone, Serialize)]
pub struct IntuneBrand<'a> {
    #[serde(rename = "displayName")]
    pub display_name: &'a str,
    #[serde(rename = "contactITName")]
    pub contact_it_name: &'a str,
    #[serde(rename = "contactITEmailAddress")]
    pub contact_it_email: &'a str,
    #[serde(rename = "contactITPhoneNumber")]
    pub contact_it_phone: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedDevice {
    pub id: String,
}

#[derive(Serialize)]
struct IntuneBrandPatch<'a> {
    #[serde(rename = "intuneBrand")]
    intune_brand: &'a IntuneBrand<'a>,
}

/// Mail nickname derived from a group display name
pub fn mail_nickname(display_name: &str) -> String {
    display_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl HttpClient {
    /// Collect every page of a collection by following `@odata.nextLink`
    async fn graph_list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<Vec<T>, ReconcilerError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(path) = next.take() {
            let page: GraphList<T> = self.get(&path, token).await?;
            items.extend(page.value);
            next = page
                .next_link
                .map(|link| self.graph_relative_path(&link))
                .transpose()?;
        }
        Ok(items)
    }

    /// Next links are absolute; only links under the client's base URL are followed
    fn graph_relative_path(&self, link: &str) -> Result<String, ReconcilerError> {
        link.strip_prefix(self.base_url())
            .filter(|path| path.starts_with('/'))
            .map(str::to_string)
            .ok_or_else(|| {
                ReconcilerError::ValidationError(format!(
                    "Next page link {} is outside {}",
                    link,
                    self.base_url()
                ))
            })
    }

    /// List the organizations of the tenant
    pub async fn graph_organizations(
        &self,
        token: &str,
    ) -> Result<Vec<Organization>, ReconcilerError> {
        let list: GraphList<Organization> = self.get("/organization", token).await?;
        Ok(list.value)
    }

    /// Find groups by exact display name
    pub async fn graph_groups_named(
        &self,
        display_name: &str,
        token: &str,
    ) -> Result<Vec<Group>, ReconcilerError> {
        let filter = format!("displayName eq '{}'", display_name.replace('\'', "''"));
        let path = format!("/groups?$filter={}", encode_query(&filter));
        let list: GraphList<Group> = self.get(&path, token).await?;
        Ok(list.value)
    }

    /// List security groups
    pub async fn graph_security_groups(&self, token: &str) -> Result<Vec<Group>, ReconcilerError> {
        let path = format!(
            "/groups?$filter={}&$select=id,displayName&$top=999",
            encode_query("securityEnabled eq true")
        );
        self.graph_list_all(&path, token).await
    }

    /// Create a security group
    pub async fn graph_create_group(
        &self,
        group: &NewGroup<'_>,
        token: &str,
    ) -> Result<Group, ReconcilerError> {
        self.post("/groups", token, group).await
    }

    /// Get the device management (MDM authority) singleton
    pub async fn graph_device_management(
        &self,
        token: &str,
    ) -> Result<DeviceManagement, ReconcilerError> {
        self.get("/deviceManagement", token).await
    }

    /// List compliance policies
    pub async fn graph_compliance_policies(
        &self,
        token: &str,
    ) -> Result<Vec<CompliancePolicy>, ReconcilerError> {
        self.graph_list_all("/deviceManagement/deviceCompliancePolicies", token)
            .await
    }

    /// Create a compliance policy
    pub async fn graph_create_compliance_policy(
        &self,
        policy: &NewCompliancePolicy<'_>,
        token: &str,
    ) -> Result<CompliancePolicy, ReconcilerError> {
        self.post("/deviceManagement/deviceCompliancePolicies", token, policy)
            .await
    }

    /// Apply company portal branding
    pub async fn graph_update_branding(
        &self,
        brand: &IntuneBrand<'_>,
        token: &str,
    ) -> Result<(), ReconcilerError> {
        self.patch(
            "/deviceManagement",
            token,
            &IntuneBrandPatch {
                intune_brand: brand,
            },
        )
        .await
    }

    /// List managed device ids
    pub async fn graph_managed_devices(
        &self,
        token: &str,
    ) -> Result<Vec<ManagedDevice>, ReconcilerError> {
        self.graph_list_all("/deviceManagement/managedDevices?$select=id&$top=999", token)
            .await
    }
}
