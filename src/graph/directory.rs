//! Directory objects used for app role assignment
//!
//! Applications, service principals and app role assignments, plus the
//! `Directory` trait the assignment flow is written against. `GraphClient`
//! implements it over Microsoft Graph; `CachedDirectory` adds a per-session
//! read-through cache in front of any implementation.

use super::{GraphClient, odata_quote};
use crate::error::Result;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

const APPLICATION_SELECT: &str = "id,appId,displayName,appRoles";
const SERVICE_PRINCIPAL_SELECT: &str = "id,appId,displayName,servicePrincipalType,appRoles";
const PAGE_SIZE: &str = "999";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppRole {
    pub id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub allowed_member_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl AppRole {
    /// Roles that can be granted to a service principal (as opposed to users/groups)
    pub fn is_assignable_to_applications(&self) -> bool {
        self.is_enabled
            && self
                .allowed_member_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case("Application"))
    }

    pub fn label(&self) -> String {
        let name = self
            .display_name
            .as_deref()
            .or(self.value.as_deref())
            .unwrap_or("(unnamed role)");
        match &self.value {
            Some(value) if Some(value.as_str()) != self.display_name.as_deref() => {
                format!("{} ({})", name, value)
            }
            _ => name.to_string(),
        }
    }
}

/// App registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub app_id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub app_roles: Vec<AppRole>,
}

impl Application {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("(unnamed application)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub id: Uuid,
    pub app_id: Uuid,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub service_principal_type: Option<String>,
    #[serde(default)]
    pub app_roles: Vec<AppRole>,
}

impl ServicePrincipal {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("(unnamed service principal)")
    }
}

/// Request body for a new assignment
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAppRoleAssignment {
    pub principal_id: Uuid,
    pub resource_id: Uuid,
    pub app_role_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    #[serde(default)]
    pub id: Option<String>,
    pub principal_id: Uuid,
    pub resource_id: Uuid,
    pub app_role_id: Uuid,
    #[serde(default)]
    pub principal_display_name: Option<String>,
    #[serde(default)]
    pub resource_display_name: Option<String>,
}

/// Kind of principal that can receive an app role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    Application,
    ManagedIdentity,
}

impl PrincipalKind {
    pub const ALL: [PrincipalKind; 2] = [PrincipalKind::Application, PrincipalKind::ManagedIdentity];

    /// Value of `servicePrincipalType` in Graph
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Application => "Application",
            PrincipalKind::ManagedIdentity => "ManagedIdentity",
        }
    }

    pub fn filter(&self) -> String {
        format!("servicePrincipalType eq {}", odata_quote(self.as_str()))
    }
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `$filter` selecting the service principal of an app registration
pub fn app_id_filter(app_id: &Uuid) -> String {
    format!("appId eq {}", odata_quote(&app_id.to_string()))
}

/// Read and write operations the assignment flow needs from the directory
#[allow(async_fn_in_trait)]
pub trait Directory {
    async fn list_applications(&self, progress: &ProgressBar) -> Result<Vec<Application>>;

    async fn list_service_principals(
        &self,
        filter: &str,
        progress: &ProgressBar,
    ) -> Result<Vec<ServicePrincipal>>;

    async fn list_role_assignments(
        &self,
        principal_id: &Uuid,
        progress: &ProgressBar,
    ) -> Result<Vec<AppRoleAssignment>>;

    async fn create_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment>;
}

fn report_count(progress: &ProgressBar, what: &str, count: usize) {
    progress.set_message(format!("Fetching {}... {} so far", what, count));
}

impl Directory for GraphClient {
    async fn list_applications(&self, progress: &ProgressBar) -> Result<Vec<Application>> {
        self.get_all_pages(
            "/applications",
            &[("$select", APPLICATION_SELECT), ("$top", PAGE_SIZE)],
            |n| report_count(progress, "applications", n),
        )
        .await
    }

    async fn list_service_principals(
        &self,
        filter: &str,
        progress: &ProgressBar,
    ) -> Result<Vec<ServicePrincipal>> {
        self.get_all_pages(
            "/servicePrincipals",
            &[
                ("$filter", filter),
                ("$select", SERVICE_PRINCIPAL_SELECT),
                ("$top", PAGE_SIZE),
            ],
            |n| report_count(progress, "service principals", n),
        )
        .await
    }

    async fn list_role_assignments(
        &self,
        principal_id: &Uuid,
        progress: &ProgressBar,
    ) -> Result<Vec<AppRoleAssignment>> {
        self.get_all_pages(
            &format!("/servicePrincipals/{}/appRoleAssignments", principal_id),
            &[],
            |n| report_count(progress, "existing assignments", n),
        )
        .await
    }

    async fn create_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment> {
        tracing::info!(
            "Creating app role assignment: principal={} resource={} role={}",
            assignment.principal_id,
            assignment.resource_id,
            assignment.app_role_id
        );
        self.post(
            &format!("/servicePrincipals/{}/appRoleAssignments", assignment.principal_id),
            assignment,
        )
        .await
    }
}

/// Read-through cache over a `Directory`, scoped to one process run
///
/// List results are memoised per collection and filter. Creating an
/// assignment drops the cached assignments of that principal.
///
/// A single `assign()` run reads each key once, so hits only occur when the
/// same `CachedDirectory` backs several runs.
pub struct CachedDirectory<D> {
    inner: D,
    applications: Mutex<Option<Vec<Application>>>,
    service_principals: Mutex<HashMap<String, Vec<ServicePrincipal>>>,
    role_assignments: Mutex<HashMap<Uuid, Vec<AppRoleAssignment>>>,
}

impl<D: Directory> CachedDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            applications: Mutex::new(None),
            service_principals: Mutex::new(HashMap::new()),
            role_assignments: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Directory> Directory for CachedDirectory<D> {
    async fn list_applications(&self, progress: &ProgressBar) -> Result<Vec<Application>> {
        if let Some(cached) = self.applications.lock().await.as_ref() {
            tracing::debug!("applications served from session cache");
            return Ok(cached.clone());
        }
        let fetched = self.inner.list_applications(progress).await?;
        *self.applications.lock().await = Some(fetched.clone());
        Ok(fetched)
    }

    async fn list_service_principals(
        &self,
        filter: &str,
        progress: &ProgressBar,
    ) -> Result<Vec<ServicePrincipal>> {
        if let Some(cached) = self.service_principals.lock().await.get(filter) {
            tracing::debug!("service principals for [{}] served from session cache", filter);
            return Ok(cached.clone());
        }
        let fetched = self.inner.list_service_principals(filter, progress).await?;
        self.service_principals
            .lock()
            .await
            .insert(filter.to_string(), fetched.clone());
        Ok(fetched)
    }

    async fn list_role_assignments(
        &self,
        principal_id: &Uuid,
        progress: &ProgressBar,
    ) -> Result<Vec<AppRoleAssignment>> {
        if let Some(cached) = self.role_assignments.lock().await.get(principal_id) {
            return Ok(cached.clone());
        }
        let fetched = self.inner.list_role_assignments(principal_id, progress).await?;
        self.role_assignments
            .lock()
            .await
            .insert(*principal_id, fetched.clone());
        Ok(fetched)
    }

    async fn create_role_assignment(
        &self,
        assignment: &NewAppRoleAssignment,
    ) -> Result<AppRoleAssignment> {
        let created = self.inner.create_role_assignment(assignment).await?;
        self.role_assignments
            .lock()
            .await
            .remove(&assignment.principal_id);
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(json: serde_json::Value) -> AppRole {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_assignable_requires_enabled_application_member_type() {
        let id = "7b2f5e1c-0c4c-4a9a-9d6a-2f0f2a4e9a01";
        assert!(
            role(serde_json::json!({"id": id, "isEnabled": true, "allowedMemberTypes": ["Application"]}))
                .is_assignable_to_applications()
        );
        assert!(
            !role(serde_json::json!({"id": id, "isEnabled": true, "allowedMemberTypes": ["User"]}))
                .is_assignable_to_applications()
        );
        assert!(
            !role(serde_json::json!({"id": id, "isEnabled": false, "allowedMemberTypes": ["User", "Application"]}))
                .is_assignable_to_applications()
        );
    }

    #[test]
    fn test_role_label_shows_value_when_different() {
        let r = role(serde_json::json!({
            "id": "7b2f5e1c-0c4c-4a9a-9d6a-2f0f2a4e9a01",
            "displayName": "Read all orders",
            "value": "Orders.Read.All"
        }));
        assert_eq!(r.label(), "Read all orders (Orders.Read.All)");
    }

    #[test]
    fn test_principal_kind_filters() {
        assert_eq!(
            PrincipalKind::ManagedIdentity.filter(),
            "servicePrincipalType eq 'ManagedIdentity'"
        );
        let app_id = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
        assert_eq!(
            app_id_filter(&app_id),
            "appId eq '11111111-2222-3333-4444-555555555555'"
        );
    }

    #[test]
    fn test_assignment_body_is_camel_case() {
        let body = NewAppRoleAssignment {
            principal_id: Uuid::nil(),
            resource_id: Uuid::nil(),
            app_role_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("principalId").is_some());
        assert!(json.get("resourceId").is_some());
        assert!(json.get("appRoleId").is_some());
    }
}
