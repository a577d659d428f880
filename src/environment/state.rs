//! Serialized environment state.
//!
//! The state lives in the `refs/notes/container-use-state` note of each
//! environment branch and is overwritten on every commit. Older versions of
//! the tool stored a revision array instead; [`State::decode`] migrates those
//! by keeping only the last revision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ContainerUseError, Result};
use crate::environment::config::EnvironmentConfig;

/// Persisted state of one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// When the environment was created
    pub created_at: DateTime<Utc>,
    /// When the environment was last mutated
    pub updated_at: DateTime<Utc>,
    /// One-line human description, mutable
    pub title: String,
    /// Current container snapshot id (the head of the snapshot chain)
    pub container: String,
    /// The environment's configuration
    pub config: EnvironmentConfig,
}

impl State {
    /// Create fresh state for a new environment.
    #[must_use]
    pub fn new(title: String, config: EnvironmentConfig) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            title,
            container: String::new(),
            config,
        }
    }

    /// Decode a state note.
    ///
    /// Tries the current format first, then the legacy revision array. The
    /// legacy migration keeps only the last revision; intermediate revisions
    /// served no runtime purpose and are dropped.
    pub fn decode(id: &str, raw: &str) -> Result<Self> {
        match serde_json::from_str::<Self>(raw) {
            Ok(state) => Ok(state),
            Err(primary) => {
                if let Ok(mut revisions) = serde_json::from_str::<Vec<LegacyRevision>>(raw)
                    && let Some(last) = revisions.pop()
                {
                    return Ok(Self {
                        created_at: last.created_at,
                        updated_at: last.created_at,
                        title: last.name,
                        container: last.state,
                        config: EnvironmentConfig::default(),
                    });
                }
                Err(ContainerUseError::StateDecodeError {
                    id: id.to_string(),
                    reason: primary.to_string(),
                }
                .into())
            }
        }
    }

    /// Serialize for the state note.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One revision in the legacy state format.
#[derive(Debug, Deserialize)]
pub struct LegacyRevision {
    /// Monotonic revision number
    #[serde(default)]
    pub version: u64,
    /// Environment name at the time of the revision
    pub name: String,
    /// Why the revision was made
    #[serde(default)]
    pub explanation: Option<String>,
    /// Output captured with the revision, when any
    #[serde(default)]
    pub output: Option<String>,
    /// When the revision was recorded
    pub created_at: DateTime<Utc>,
    /// Container snapshot id of the revision
    pub state: String,
}
