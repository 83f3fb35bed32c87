use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// UI-level conversation bucket for inbound mail, keyed by
/// (account, subject). Unrelated to protocol threading headers.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MailThread {
    pub id: i64,
    pub account_id: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}
