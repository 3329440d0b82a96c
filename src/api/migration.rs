use serde::{Deserialize, Serialize};

/// A server-side migration, e.g. the cascade started by a forced blueprint delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    pub status: MigrationStatus,
}

/// Migration status as reported by `/v1/migrations/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    Running,
    Pending,
    Initializing,
    PendingCancellation,
    Failure,
    Cancelled,
    Completed,
    /// A status this client does not know; treated as still in progress.
    #[serde(untagged)]
    Other(String),
}

impl MigrationStatus {
    /// Whether the migration has stopped progressing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failure | Self::Cancelled | Self::Completed)
    }
}
