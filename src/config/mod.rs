use crate::error::{AssignerError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Multi-tenant authority, so any work or school account can sign in
pub const DEFAULT_TENANT_ID: &str = "organizations";

/// Public client id of the Azure CLI, pre-consented for Microsoft Graph in every tenant
pub const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

pub const DEFAULT_FUZZY_LIMIT: usize = 10;
pub const DEFAULT_LOG_FILTER: &str = "approle_assigner=debug";

/// Credential strategy used to obtain a Graph token
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Reuse the signed-in Azure CLI session
    AzureCli,
    /// OAuth2 device code flow (interactive sign-in in any browser)
    DeviceCode,
}

impl AuthMethod {
    pub const ALL: [AuthMethod; 2] = [AuthMethod::AzureCli, AuthMethod::DeviceCode];
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::AzureCli => write!(f, "azure-cli"),
            AuthMethod::DeviceCode => write!(f, "device-code"),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Skips the credential prompt when set
    pub auth_method: Option<AuthMethod>,

    pub tenant_id: String,

    pub client_id: String,

    pub graph_base_url: String,

    pub fuzzy_limit: usize,

    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_method: None,
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            fuzzy_limit: DEFAULT_FUZZY_LIMIT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.fuzzy_limit == 0 {
            return Err(AssignerError::InvalidConfig(
                "fuzzy_limit must be at least 1".into(),
            ));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(AssignerError::InvalidConfig("tenant_id is empty".into()));
        }
        if self.client_id.trim().is_empty() {
            return Err(AssignerError::InvalidConfig("client_id is empty".into()));
        }
        if !self.graph_base_url.starts_with("http://") && !self.graph_base_url.starts_with("https://")
        {
            return Err(AssignerError::InvalidConfig(format!(
                "graph_base_url '{}' is not an http(s) URL",
                self.graph_base_url
            )));
        }
        Ok(())
    }
}

/// Configuration manager
///
/// Read-only: the tool never writes configuration or any other state to disk.
#[derive(Clone)]
pub struct ConfigManager {
    config_file: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("com", "approle-assigner", "approle-assigner")
            .ok_or_else(|| {
                AssignerError::ConfigError("Failed to determine config directory".into())
            })?;

        Ok(Self {
            config_file: project_dirs.config_dir().join("config.toml"),
        })
    }

    /// Use an explicit config file instead of the platform default
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        Self {
            config_file: path.as_ref().to_path_buf(),
        }
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Load main config, falling back to defaults when the file is absent
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_file.exists() {
            tracing::debug!("No config file at {:?}, using defaults", self.config_file);
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&self.config_file)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", self.config_file);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_file(dir.path().join("absent.toml"));
        let config = manager.load_config().unwrap();
        assert_eq!(config.fuzzy_limit, DEFAULT_FUZZY_LIMIT);
        assert_eq!(config.tenant_id, DEFAULT_TENANT_ID);
        assert!(config.auth_method.is_none());
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auth_method = \"azure-cli\"\nfuzzy_limit = 5").unwrap();

        let config = ConfigManager::with_file(file.path()).load_config().unwrap();
        assert_eq!(config.auth_method, Some(AuthMethod::AzureCli));
        assert_eq!(config.fuzzy_limit, 5);
        assert_eq!(config.graph_base_url, DEFAULT_GRAPH_BASE_URL);
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fuzzy_limit = 0").unwrap();

        let err = ConfigManager::with_file(file.path()).load_config().unwrap_err();
        assert!(matches!(err, AssignerError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fuzzy_limit = [").unwrap();

        let err = ConfigManager::with_file(file.path()).load_config().unwrap_err();
        assert!(matches!(err, AssignerError::TomlError(_)));
    }

    #[test]
    fn test_auth_method_display_matches_serde_names() {
        assert_eq!(AuthMethod::AzureCli.to_string(), "azure-cli");
        assert_eq!(AuthMethod::DeviceCode.to_string(), "device-code");
    }
}
