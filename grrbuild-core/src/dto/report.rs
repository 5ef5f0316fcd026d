//! Build report DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::contract::RuntimeContract;
use crate::domain::log::LogEntry;
use crate::domain::sdist::BuiltSdist;
use crate::domain::stage::{StageKind, StageStatus};

/// Outcome of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Summary of a whole build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub stages: Vec<StageRecord>,
    /// Version read from `version.ini`
    pub version: Option<String>,
    /// Sorted artifact names found in the wheelhouse
    pub wheelhouse: Vec<String>,
    pub sdists: Vec<BuiltSdist>,
    pub contract: Option<RuntimeContract>,
    /// Image reference or contract file written by the backend
    pub image: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl BuildReport {
    /// Creates a report with every stage pending
    pub fn new(build_id: Uuid) -> Self {
        Self {
            build_id,
            started_at: Utc::now(),
            completed_at: None,
            success: false,
            stages: StageKind::ORDER
                .iter()
                .map(|&stage| StageRecord {
                    stage,
                    status: StageStatus::Pending,
                    started_at: None,
                    completed_at: None,
                    error_message: None,
                })
                .collect(),
            version: None,
            wheelhouse: Vec::new(),
            sdists: Vec::new(),
            contract: None,
            image: None,
            error_message: None,
            log: Vec::new(),
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == kind)
    }

    fn stage_mut(&mut self, kind: StageKind) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|r| r.stage == kind)
    }

    pub fn begin(&mut self, kind: StageKind) {
        if let Some(record) = self.stage_mut(kind) {
            record.status = StageStatus::Running;
            record.started_at = Some(Utc::now());
        }
    }

    pub fn succeed(&mut self, kind: StageKind) {
        if let Some(record) = self.stage_mut(kind) {
            record.status = StageStatus::Succeeded;
            record.completed_at = Some(Utc::now());
        }
    }

    /// Marks `kind` failed and every stage still pending as skipped
    pub fn fail(&mut self, kind: StageKind, message: impl Into<String>) {
        let message = message.into();
        if let Some(record) = self.stage_mut(kind) {
            record.status = StageStatus::Failed;
            record.completed_at = Some(Utc::now());
            record.error_message = Some(message.clone());
        }
        for record in self.stages.iter_mut() {
            if record.status == StageStatus::Pending {
                record.status = StageStatus::Skipped;
            }
        }
        self.error_message = Some(message);
    }

    /// Closes the report
    pub fn finish(&mut self) {
        self.completed_at = Some(Utc::now());
        self.success = self.error_message.is_none()
            && self
                .stages
                .iter()
                .all(|r| r.status == StageStatus::Succeeded);
    }

    /// The stage that failed, if any
    pub fn failed_stage(&self) -> Option<StageKind> {
        self.stages
            .iter()
            .find(|r| r.status == StageStatus::Failed)
            .map(|r| r.stage)
    }
}
