//! API key resolution shared by the LLM and embedding gateways.

use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for api_key_command execution.
const API_KEY_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum KeySourceError {
    #[error("Failed to execute api_key_command: {0}")]
    Execution(String),

    #[error("api_key_command timed out")]
    Timeout,

    #[error("api_key_command failed with status {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("api_key_command returned empty key")]
    Empty,
}

/// Source of API key for authentication.
#[derive(Debug, Clone)]
pub enum ApiKeySource {
    /// No authentication.
    None,
    /// Static API key.
    Static(String),
    /// Shell command that outputs the API key (for rotating tokens).
    Command(String),
}

impl ApiKeySource {
    /// Build a key source from optional config values. A static key wins over a command.
    pub fn from_config(api_key: Option<String>, api_key_command: Option<String>) -> Self {
        match (api_key, api_key_command) {
            (Some(key), _) if !key.trim().is_empty() => ApiKeySource::Static(key.trim().to_string()),
            (_, Some(cmd)) if !cmd.trim().is_empty() => ApiKeySource::Command(cmd),
            _ => ApiKeySource::None,
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, ApiKeySource::None)
    }

    /// Get the current API key, executing the command if necessary.
    pub async fn get_key(&self) -> Result<Option<String>, KeySourceError> {
        match self {
            ApiKeySource::None => Ok(None),
            ApiKeySource::Static(key) => Ok(Some(key.clone())),
            ApiKeySource::Command(cmd) => {
                debug!(command = %cmd, "Fetching API key via command");

                let result = tokio::time::timeout(
                    API_KEY_COMMAND_TIMEOUT,
                    Command::new("sh").arg("-c").arg(cmd).output(),
                )
                .await;

                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        warn!(command = %cmd, error = %e, "api_key_command failed to execute");
                        return Err(KeySourceError::Execution(e.to_string()));
                    }
                    Err(_) => {
                        warn!(command = %cmd, "api_key_command timed out");
                        return Err(KeySourceError::Timeout);
                    }
                };

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    warn!(command = %cmd, stderr = %stderr, "api_key_command failed");
                    return Err(KeySourceError::Failed {
                        status: output.status.to_string(),
                        stderr,
                    });
                }

                let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if key.is_empty() {
                    warn!(command = %cmd, "api_key_command returned empty key");
                    return Err(KeySourceError::Empty);
                }

                Ok(Some(key))
            }
        }
    }
}
