use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::CoreError;
use crate::followup::interval::IntervalConfig;

/// A follow-up campaign job. Rows are never deleted; exhausted or
/// superseded jobs transition to `stopped` and remain as audit trail.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FollowUpJob {
    pub id: String,
    pub client_id: String,
    pub conference_id: String,
    pub template_id: String,
    pub stage: String,
    pub status: String,
    pub paused: bool,
    pub scheduled_date: DateTime<Utc>,
    pub current_attempt: i64,
    pub max_attempts: i64,
    pub skip_weekends: bool,
    /// Legacy column: a bare number of days, superseded by
    /// `settings.intervalConfig` when that is present.
    pub custom_interval_days: Option<i64>,
    pub settings: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FollowUpJob {
    pub fn stage(&self) -> Result<JobStage, CoreError> {
        JobStage::from_str(&self.stage).ok_or_else(|| {
            CoreError::DataIntegrity(format!("job {} has unknown stage '{}'", self.id, self.stage))
        })
    }

    /// Parse the JSON settings blob, validating rather than trusting it.
    /// A missing blob yields defaults; a malformed one is an error.
    pub fn parse_settings(&self) -> Result<JobSettings, CoreError> {
        match self.settings.as_deref() {
            None | Some("") => Ok(JobSettings::default()),
            Some(json) => serde_json::from_str(json).map_err(|e| {
                CoreError::DataIntegrity(format!("job {} has malformed settings: {e}", self.id))
            }),
        }
    }

    /// Effective interval: typed settings first, then the legacy
    /// days column, then the default cadence.
    pub fn interval(&self) -> Result<IntervalConfig, CoreError> {
        if let Some(cfg) = self.parse_settings()?.interval_config {
            return Ok(cfg);
        }
        if let Some(days) = self.custom_interval_days {
            return Ok(IntervalConfig::from_days(days.max(1) as u32));
        }
        Ok(IntervalConfig::from_days(3))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    AbstractSubmission,
    Registration,
}

impl JobStage {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "abstract_submission" => Some(Self::AbstractSubmission),
            "registration" => Some(Self::Registration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AbstractSubmission => "abstract_submission",
            Self::Registration => "registration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Active,
    Stopped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stopped => "stopped",
        }
    }
}

/// Typed view of the settings JSON the CRUD collaborators write.
/// Field names stay camelCase on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobSettings {
    pub interval_config: Option<IntervalConfig>,
    /// Message-Id of the first mail in the logical conversation. Used only
    /// to scope the quote chain, never for protocol threading.
    pub thread_root_message_id: Option<String>,
    pub stage_template_sequence: Option<Vec<String>>,
    pub timezone: Option<String>,
    pub working_hours: Option<WorkingHours>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

impl JobSettings {
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::followup::interval::IntervalUnit;

    fn job_with_settings(settings: Option<&str>) -> FollowUpJob {
        FollowUpJob {
            id: "j1".into(),
            client_id: "c1".into(),
            conference_id: "f1".into(),
            template_id: "t1".into(),
            stage: "abstract_submission".into(),
            status: "active".into(),
            paused: false,
            scheduled_date: Utc::now(),
            current_attempt: 0,
            max_attempts: 3,
            skip_weekends: true,
            custom_interval_days: Some(5),
            settings: settings.map(str::to_string),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn settings_parse_camel_case() {
        let job = job_with_settings(Some(
            r#"{"intervalConfig":{"value":4,"unit":"hours"},"threadRootMessageId":"root@x","stageTemplateSequence":["a","b"]}"#,
        ));
        let s = job.parse_settings().unwrap();
        assert_eq!(s.thread_root_message_id.as_deref(), Some("root@x"));
        assert_eq!(s.stage_template_sequence.unwrap(), vec!["a", "b"]);
        let cfg = s.interval_config.unwrap();
        assert_eq!(cfg.value, 4);
        assert_eq!(cfg.unit, IntervalUnit::Hours);
    }

    #[test]
    fn interval_prefers_settings_over_legacy_days() {
        let job = job_with_settings(Some(r#"{"intervalConfig":{"value":2,"unit":"days"}}"#));
        assert_eq!(job.interval().unwrap(), IntervalConfig::from_days(2));
    }

    #[test]
    fn interval_falls_back_to_legacy_days() {
        let job = job_with_settings(None);
        assert_eq!(job.interval().unwrap(), IntervalConfig::from_days(5));
    }

    #[test]
    fn legacy_bare_number_interval_means_days() {
        let job = job_with_settings(Some(r#"{"intervalConfig":7}"#));
        assert_eq!(job.interval().unwrap(), IntervalConfig::from_days(7));
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let job = job_with_settings(Some("{not json"));
        assert!(job.parse_settings().is_err());
    }
}
