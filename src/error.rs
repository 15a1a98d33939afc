use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssignerError {
    #[error("Operation was canceled by the user")]
    Cancelled,

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous result: {0}")]
    Ambiguous(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AssignerError {
    /// True for the user-abort path, which exits successfully
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AssignerError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, AssignerError>;

pub use AssignerError as Error;

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: Your access token may have expired. Sign in again (az login, or rerun with --auth device-code)."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: Assigning app roles needs AppRoleAssignment.ReadWrite.All and Application.Read.All, or an admin role such as Cloud Application Administrator."
                }
                "Request_BadRequest" | "BadRequest" => {
                    if message.contains("Permission being assigned already exists") {
                        "\nHint: This app role is already assigned to the principal."
                    } else if message.contains("not valid for this resource") {
                        "\nHint: The app role does not belong to the selected resource application."
                    } else {
                        "\nHint: The request format may be incorrect. Check the principal, resource and role ids."
                    }
                }
                "Request_ResourceNotFound" | "NotFound" => {
                    "\nHint: The requested object doesn't exist. It may have been deleted since it was listed."
                }
                "TooManyRequests" => "\nHint: API rate limit exceeded. Wait a moment and try again.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhances_known_graph_error() {
        let body = r#"{"error":{"code":"Authorization_RequestDenied","message":"Insufficient privileges to complete the operation."}}"#;
        let enhanced = enhance_graph_error(body);
        assert!(enhanced.starts_with("Authorization_RequestDenied: Insufficient privileges"));
        assert!(enhanced.contains("AppRoleAssignment.ReadWrite.All"));
    }

    #[test]
    fn test_recognises_duplicate_assignment() {
        let body = r#"{"error":{"code":"Request_BadRequest","message":"Permission being assigned already exists on the object"}}"#;
        assert!(enhance_graph_error(body).contains("already assigned"));
    }

    #[test]
    fn test_unknown_code_has_no_hint() {
        let body = r#"{"error":{"code":"Weird","message":"odd"}}"#;
        assert_eq!(enhance_graph_error(body), "Weird: odd");
    }

    #[test]
    fn test_non_json_body_is_returned_verbatim() {
        assert_eq!(enhance_graph_error("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_only_cancelled_counts_as_cancelled() {
        assert!(AssignerError::Cancelled.is_cancelled());
        assert!(!AssignerError::NotFound("x".into()).is_cancelled());
    }
}
