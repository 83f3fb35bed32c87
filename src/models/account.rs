use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outbound/inbound transport account. SMTP credentials are mandatory,
/// IMAP credentials optional (accounts without them are skipped by sync).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailAccount {
    pub id: String,
    pub email: String,
    pub smtp_host: String,
    pub smtp_port: i64,
    pub smtp_username: String,
    pub smtp_password: String,
    pub imap_host: Option<String>,
    pub imap_port: i64,
    pub imap_username: Option<String>,
    pub imap_password: Option<String>,
    pub active: bool,
    pub send_priority: i64,
    pub sent_today: i64,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub sync_status: String,
    pub last_sync_ts: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl EmailAccount {
    /// Eligible for mailbox monitoring: active with full IMAP credentials.
    pub fn has_imap(&self) -> bool {
        self.active
            && self.imap_host.as_deref().is_some_and(|h| !h.is_empty())
            && self.imap_password.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn imap_login(&self) -> &str {
        self.imap_username.as_deref().unwrap_or(&self.email)
    }

    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus::from_str(&self.sync_status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Disconnected,
    Active,
    Error,
}

impl SyncStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "error" => Self::Error,
            _ => Self::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}
