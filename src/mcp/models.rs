//! Request and response models for the MCP dispatcher.
//!
//! Every tool takes the source repository path plus an `explanation` that
//! becomes the commit message for whatever mutation the tool performs.
//! Responses that hand back an environment use [`EnvironmentResponse`],
//! which always carries the git commands a human needs to review or adopt
//! the work.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentConfig};
use crate::repository::EnvironmentInfo;

/// Envelope returned by tools that create, open, or reconfigure an
/// environment.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentResponse {
    /// Environment id
    pub id: String,
    /// Environment title
    pub title: String,
    /// Current configuration
    pub config: EnvironmentConfig,
    /// Remote-tracking ref of the environment branch in the source repo
    pub remote_ref: String,
    /// Command a human runs to check the work out
    pub checkout_command_to_share_with_user: String,
    /// Command a human runs to see the run log
    pub log_command_to_share_with_user: String,
    /// Command a human runs to see the diff
    pub diff_command_to_share_with_user: String,
    /// Attached warnings the agent must relay to the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl EnvironmentResponse {
    /// Build the envelope for a loaded environment.
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self::new(&env.id, env.title(), env.config())
    }

    /// Build the envelope from branch metadata.
    #[must_use]
    pub fn from_info(info: &EnvironmentInfo) -> Self {
        Self::new(&info.id, info.state.title.clone(), info.state.config.clone())
    }

    fn new(id: &str, title: String, config: EnvironmentConfig) -> Self {
        Self {
            id: id.to_string(),
            title,
            config,
            remote_ref: format!("container-use/{id}"),
            checkout_command_to_share_with_user: format!("cu checkout {id}"),
            log_command_to_share_with_user: format!("cu log {id}"),
            diff_command_to_share_with_user: format!("cu diff {id}"),
            warning: None,
        }
    }

    /// Attach a warning block.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// One row of the `environment_list` response.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentSummary {
    /// Environment id
    pub id: String,
    /// Environment title
    pub title: String,
    /// Creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Last mutation time
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&EnvironmentInfo> for EnvironmentSummary {
    fn from(info: &EnvironmentInfo) -> Self {
        Self {
            id: info.id.clone(),
            title: info.state.title.clone(),
            created_at: info.state.created_at,
            updated_at: info.state.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentOpenRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to reload
    pub environment_id: String,
    /// One sentence explaining why the environment is being opened
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentCreateRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Short human-readable title describing the work
    pub title: String,
    /// One sentence explaining why the environment is being created
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentUpdateMetadataRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to update
    pub environment_id: String,
    /// New title, when changing it
    #[serde(default)]
    pub title: Option<String>,
    /// One sentence explaining the metadata change
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Partial configuration; provided fields replace the current value
/// wholesale. An `envs` list that omits a previously set variable drops it.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ConfigPatch {
    /// Container image reference
    #[serde(default)]
    pub base_image: Option<String>,
    /// Shell commands run before the source tree is mounted
    #[serde(default)]
    pub setup_commands: Option<Vec<String>>,
    /// Shell commands run after the source tree is mounted
    #[serde(default)]
    pub install_commands: Option<Vec<String>>,
    /// Environment variables as KEY=VALUE strings
    #[serde(default)]
    pub envs: Option<Vec<String>>,
    /// Secrets as KEY=uri strings (file://path, env://NAME,
    /// op://vault/item/field)
    #[serde(default)]
    pub secrets: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentConfigRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to reconfigure
    pub environment_id: String,
    /// Configuration fields to change
    pub config: ConfigPatch,
    /// One sentence explaining the configuration change
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentListRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// One sentence explaining why environments are being listed
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentRunCmdRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to run in
    pub environment_id: String,
    /// Shell command to execute
    pub command: String,
    /// Shell to execute with (default `sh`)
    #[serde(default)]
    pub shell: Option<String>,
    /// Run as a long-lived background service instead of waiting
    #[serde(default)]
    pub background: Option<bool>,
    /// Run through the image's entrypoint
    #[serde(default)]
    pub use_entrypoint: Option<bool>,
    /// TCP ports to expose when running in the background
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
    /// One sentence explaining what the command does; used as the commit
    /// message
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentFileReadRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to read from
    pub environment_id: String,
    /// File path, relative to the workdir unless absolute
    pub target_file: String,
    /// Read the whole file instead of a line range
    #[serde(default)]
    pub should_read_entire_file: Option<bool>,
    /// First line to read, 1-indexed
    #[serde(default)]
    pub start_line_one_indexed: Option<usize>,
    /// Last line to read, 1-indexed inclusive
    #[serde(default)]
    pub end_line_one_indexed_inclusive: Option<usize>,
    /// One sentence explaining why the file is being read
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentFileListRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to list in
    pub environment_id: String,
    /// Directory path, relative to the workdir unless absolute
    pub path: String,
    /// One sentence explaining why the directory is being listed
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentFileWriteRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to write in
    pub environment_id: String,
    /// File path, relative to the workdir unless absolute
    pub target_file: String,
    /// Full contents to write
    pub contents: String,
    /// One sentence explaining the write; used as the commit message
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentFileDeleteRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to delete in
    pub environment_id: String,
    /// File path, relative to the workdir unless absolute
    pub target_file: String,
    /// One sentence explaining the deletion; used as the commit message
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentAddServiceRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to attach the service to
    pub environment_id: String,
    /// Service name; unique per environment; the service's hostname inside
    /// the environment network
    pub name: String,
    /// Container image reference for the service
    pub image: String,
    /// Shell command to run instead of the image default
    #[serde(default)]
    pub command: Option<String>,
    /// TCP ports the service exposes
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
    /// Environment variables as KEY=VALUE strings
    #[serde(default)]
    pub envs: Option<Vec<String>>,
    /// Secrets as KEY=uri strings
    #[serde(default)]
    pub secrets: Option<Vec<String>>,
    /// One sentence explaining the service; used as the commit message
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EnvironmentCheckpointRequest {
    /// Absolute path to the source git repository
    pub environment_source: String,
    /// Id of the environment to checkpoint
    pub environment_id: String,
    /// Registry reference to publish the snapshot to
    pub destination: String,
    /// One sentence explaining the checkpoint
    #[serde(default)]
    pub explanation: Option<String>,
}
