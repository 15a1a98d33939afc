use crate::config::{AuthMethod, Config, DEFAULT_TENANT_ID};
use crate::error::{AssignerError, Result};
use oauth2::{
    AuthUrl, ClientId, DeviceAuthorizationUrl, Scope, StandardDeviceAuthorizationResponse,
    TokenResponse, TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const SIGNAL_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCliToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default)]
    tenant: Option<String>,
}

pub struct GraphAuth {
    tenant_id: String,
    client_id: String,
}

impl GraphAuth {
    pub fn new(config: &Config) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
        }
    }

    /// Acquire a Graph access token with the chosen strategy (kept in memory only)
    ///
    /// Sign-in is abandoned as soon as `cancel` fires. A sign-in failure that
    /// coincides with cancellation is reported as `Cancelled`.
    pub async fn access_token(
        &self,
        method: AuthMethod,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::debug!("Acquiring Graph token via {}", method);
        let login = async {
            match method {
                AuthMethod::AzureCli => self.login_azure_cli().await,
                AuthMethod::DeviceCode => self.login_device_code().await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AssignerError::Cancelled),
            result = login => result,
        };

        settle_login_failure(result, cancel).await
    }

    /// Reuse the Azure CLI session (`az login` must have been run)
    async fn login_azure_cli(&self) -> Result<String> {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        let mut command = Command::new(program);
        command.kill_on_drop(true);
        command.args([
            "account",
            "get-access-token",
            "--resource-type",
            "ms-graph",
            "--output",
            "json",
        ]);
        if self.tenant_id != DEFAULT_TENANT_ID {
            command.args(["--tenant", self.tenant_id.as_str()]);
        }

        let output = command.output().await.map_err(|e| {
            AssignerError::AuthError(format!(
                "Could not run the Azure CLI ({}). Install it or choose device-code.",
                e
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssignerError::AuthError(format!(
                "az account get-access-token failed: {}\nRun 'az login' first.",
                stderr.trim()
            )));
        }

        let token = parse_azure_cli_token(&output.stdout)?;
        tracing::debug!(
            "Azure CLI token for tenant {} expires {}",
            token.tenant.as_deref().unwrap_or("?"),
            token.expires_on.as_deref().unwrap_or("?")
        );
        Ok(token.access_token)
    }

    /// Authenticate using device code flow (interactive)
    async fn login_device_code(&self) -> Result<String> {
        println!(
            "🔐 Starting device code authentication for tenant '{}'...",
            self.tenant_id
        );

        let tenant_id = &self.tenant_id;
        let client_id = ClientId::new(self.client_id.clone());

        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| AssignerError::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| AssignerError::AuthError(format!("Invalid token URL: {}", e)))?;

        let device_auth_url = DeviceAuthorizationUrl::new(format!(
            "{}/{}/oauth2/v2.0/devicecode",
            MICROSOFT_AUTHORITY, tenant_id
        ))
        .map_err(|e| AssignerError::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(client_id, None, auth_url, Some(token_url))
            .set_device_authorization_url(device_auth_url);

        let details: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()
            .map_err(|e| AssignerError::AuthError(format!("Device code exchange failed: {}", e)))?
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                AssignerError::AuthError(format!("Device authorization request failed: {}", e))
            })?;

        println!("\n📱 Please visit: {}", details.verification_uri().as_str());
        println!("🔑 Enter code: {}\n", details.user_code().secret());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| AssignerError::AuthError(format!("Token exchange failed: {}", e)))?;

        println!("✅ Authentication successful!");
        Ok(token.access_token().secret().clone())
    }
}

/// `az` can exit on the same SIGINT before the Ctrl+C listener has fired
async fn settle_login_failure(result: Result<String>, cancel: &CancellationToken) -> Result<String> {
    match result {
        Err(AssignerError::AuthError(message)) => {
            if tokio::time::timeout(SIGNAL_GRACE, cancel.cancelled())
                .await
                .is_ok()
            {
                Err(AssignerError::Cancelled)
            } else {
                Err(AssignerError::AuthError(message))
            }
        }
        other => other,
    }
}

fn parse_azure_cli_token(stdout: &[u8]) -> Result<AzureCliToken> {
    let token: AzureCliToken = serde_json::from_slice(stdout)?;
    if token.access_token.is_empty() {
        return Err(AssignerError::AuthError(
            "Azure CLI returned an empty access token".into(),
        ));
    }
    Ok(token)
}
