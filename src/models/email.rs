use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Append-only record of every message that passed through the system.
/// Automated follow-ups are written with `in_reply_to` and
/// `references_header` NULL: each attempt must land as its own inbox
/// entry, with conversation history carried only inside the body.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub account_id: Option<String>,
    pub client_id: Option<String>,
    pub conference_id: Option<String>,
    pub job_id: Option<String>,
    pub thread_id: Option<i64>,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references_header: Option<String>,
    pub folder: String,
    pub direction: String,
    pub subject: String,
    pub from_addr: String,
    pub to_addr: String,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailDirection {
    Outbound,
    Inbound,
}

impl EmailDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }
}
