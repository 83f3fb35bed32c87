use sqlx::SqlitePool;
use tracing::warn;

use crate::db::queries;
use crate::error::CoreError;
use crate::models::{Conference, EmailAccount};

/// Resolve the outbound account for a conference: the conference's own
/// account when it is still active, otherwise the active account with the
/// lowest send priority (ties by earliest creation). No active account at
/// all means the job stays unprocessed until one appears.
pub async fn select_account(
    pool: &SqlitePool,
    conference: &Conference,
) -> Result<EmailAccount, CoreError> {
    if let Some(account_id) = conference.smtp_account_id.as_deref() {
        match queries::account_by_id(pool, account_id).await? {
            Some(account) if account.active => return Ok(account),
            Some(account) => {
                warn!(
                    conference = %conference.id,
                    account = %account.id,
                    "conference SMTP account is inactive, falling back to priority order"
                );
            }
            None => {
                warn!(
                    conference = %conference.id,
                    account = %account_id,
                    "conference SMTP account not found, falling back to priority order"
                );
            }
        }
    }

    queries::first_active_account(pool)
        .await?
        .ok_or_else(|| CoreError::Configuration("no transport configured".into()))
}
