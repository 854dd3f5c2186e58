use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::{EntryKey, FailureCause};
use crate::services::ai_types::StrategyStats;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    PartialFailure,
    Terminated,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorExplanation {
    pub code: u16,
    pub title: String,
    pub reason: String,
    pub solution: String,
    pub advice: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FailureDetail {
    pub key: EntryKey,
    pub cause: FailureCause,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<ErrorExplanation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub by_cause: BTreeMap<String, usize>,
    pub by_http_status: BTreeMap<String, usize>,
    pub strategy: StrategyStats,
}

/// Written once per run; never touched afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub timestamp: String,
    pub service: String,
    pub model: String,
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub successful_plugins: Vec<String>,
    pub failed_plugins: Vec<String>,
    pub failures: Vec<FailureDetail>,
    pub analysis: Analysis,
    pub recommendations: Vec<String>,
}
