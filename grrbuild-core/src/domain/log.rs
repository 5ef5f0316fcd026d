//! Log domain types

use serde::{Deserialize, Serialize};

use crate::domain::stage::StageKind;

/// A log entry captured during a build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    /// Stage that produced the entry, `None` for pipeline-level messages
    pub stage: Option<StageKind>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, stage: Option<StageKind>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            stage,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
