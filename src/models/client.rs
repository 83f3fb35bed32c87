use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub conference_id: String,
    pub name: String,
    pub email: String,
    pub status: String,
    pub current_stage: String,
    /// Counts emails sent outside the automation (plus automated sends),
    /// so mailbox sync can skip mail the funnel already accounted for.
    pub manual_email_offset: i64,
    /// Free-form JSON counters maintained read-modify-write.
    pub engagement: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn status(&self) -> ClientStatus {
        ClientStatus::from_str(&self.status)
    }
}

/// Funnel status. The set is open-ended (imports create free-form values),
/// so unknown strings are carried through rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    Lead,
    AbstractSubmitted,
    Registered,
    Unresponsive,
    RegistrationUnresponsive,
    Other(String),
}

impl ClientStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "Lead" => Self::Lead,
            "Abstract Submitted" => Self::AbstractSubmitted,
            "Registered" => Self::Registered,
            "Unresponsive" => Self::Unresponsive,
            "Registration Unresponsive" => Self::RegistrationUnresponsive,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Lead => "Lead",
            Self::AbstractSubmitted => "Abstract Submitted",
            Self::Registered => "Registered",
            Self::Unresponsive => "Unresponsive",
            Self::RegistrationUnresponsive => "Registration Unresponsive",
            Self::Other(s) => s,
        }
    }
}
