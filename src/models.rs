// ABOUTME: Shared result models for SQL Server records
// ABOUTME: Describes what happened when a script source was loaded

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    /// Every statement ran
    Completed,
    /// The path did not exist; nothing ran
    Missing,
    /// Loading stopped at an error
    Failed,
}

/// Result of loading one script source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptOutcome {
    pub source: String,
    pub status: ScriptStatus,
    #[serde(rename = "statementsExecuted")]
    pub statements_executed: usize,
    #[serde(rename = "lastStatement", default)]
    pub last_statement: Option<String>,
    #[serde(rename = "errorKind", default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,
}

impl ScriptOutcome {
    pub fn succeeded(&self) -> bool {
        self.status != ScriptStatus::Failed
    }
}
