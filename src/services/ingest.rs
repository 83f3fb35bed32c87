use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::queries;
use crate::error::CoreError;
use crate::followup::strip_reply_prefixes;
use crate::imap::sync::ParsedMessage;
use crate::models::{Email, EmailAccount, EmailDirection};

/// Persist one inbound message: dedupe by Message-Id, attach it to a
/// per-(account, subject) thread, write the Email + log rows. Returns the
/// stored row, or `None` when the message was already known.
pub async fn ingest_inbound(
    pool: &SqlitePool,
    account: &EmailAccount,
    message: &ParsedMessage,
) -> Result<Option<Email>, CoreError> {
    // A missing Message-Id defeats dedup; synthesize one so the row is
    // still addressable.
    let message_id = message
        .message_id
        .clone()
        .unwrap_or_else(|| format!("{}@missing-id.local", Uuid::new_v4()));

    if queries::email_exists(pool, &account.id, &message_id).await? {
        return Ok(None);
    }

    let thread_key = strip_reply_prefixes(&message.subject);
    let thread = queries::find_or_create_thread(pool, &account.id, thread_key).await?;

    let now = Utc::now();
    let email = Email {
        id: Uuid::new_v4().to_string(),
        account_id: Some(account.id.clone()),
        client_id: None,
        conference_id: None,
        job_id: None,
        thread_id: Some(thread.id),
        message_id,
        // Inbound mail keeps whatever the sender's envelope carried; only
        // automated sends null their threading headers.
        in_reply_to: message.in_reply_to.clone(),
        references_header: None,
        folder: "INBOX".into(),
        direction: EmailDirection::Inbound.as_str().into(),
        subject: message.subject.clone(),
        from_addr: message.from_addr.clone(),
        to_addr: message.to_addr.clone(),
        body_html: None,
        body_text: message.body_text.clone(),
        status: "received".into(),
        sent_at: None,
        received_at: Some(message.internal_date.unwrap_or(now)),
        created_at: now,
    };
    queries::insert_email(pool, &email).await?;
    queries::insert_email_log(pool, Some(&email.id), None, "received", None).await?;

    Ok(Some(email))
}
