use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::CoreError;
use crate::followup::interval::IntervalConfig;
use crate::models::job::JobStage;

/// Conference campaign configuration. Per-stage template sequences and
/// intervals live in JSON columns, validated on read.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conference {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub smtp_account_id: Option<String>,
    pub stage1_template_sequence: Option<String>,
    pub stage1_interval: Option<String>,
    pub stage1_max_attempts: i64,
    pub stage2_template_sequence: Option<String>,
    pub stage2_interval: Option<String>,
    pub stage2_max_attempts: i64,
    pub skip_weekends: bool,
    pub created_at: DateTime<Utc>,
}

impl Conference {
    pub fn stage_template_sequence(&self, stage: JobStage) -> Result<Vec<String>, CoreError> {
        let raw = match stage {
            JobStage::AbstractSubmission => self.stage1_template_sequence.as_deref(),
            JobStage::Registration => self.stage2_template_sequence.as_deref(),
        };
        match raw {
            None | Some("") => Ok(Vec::new()),
            Some(json) => serde_json::from_str(json).map_err(|e| {
                CoreError::DataIntegrity(format!(
                    "conference {} has a malformed {} template sequence: {e}",
                    self.id,
                    stage.as_str()
                ))
            }),
        }
    }

    pub fn stage_interval(&self, stage: JobStage) -> Result<Option<IntervalConfig>, CoreError> {
        let raw = match stage {
            JobStage::AbstractSubmission => self.stage1_interval.as_deref(),
            JobStage::Registration => self.stage2_interval.as_deref(),
        };
        match raw {
            None | Some("") => Ok(None),
            Some(json) => serde_json::from_str(json).map(Some).map_err(|e| {
                CoreError::DataIntegrity(format!(
                    "conference {} has a malformed {} interval: {e}",
                    self.id,
                    stage.as_str()
                ))
            }),
        }
    }

    pub fn stage_max_attempts(&self, stage: JobStage) -> i64 {
        match stage {
            JobStage::AbstractSubmission => self.stage1_max_attempts,
            JobStage::Registration => self.stage2_max_attempts,
        }
    }
}
