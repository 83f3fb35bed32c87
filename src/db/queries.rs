use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::CoreError;
use crate::models::{
    Client, Conference, Email, EmailAccount, EmailTemplate, FollowUpJob, MailThread, SyncStatus,
};

// ---- clients ----

pub async fn client_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Client>, CoreError> {
    let row = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn update_client_status(
    pool: &SqlitePool,
    client_id: &str,
    status: &str,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE clients SET status = ? WHERE id = ?")
        .bind(status)
        .bind(client_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read-modify-write on the engagement JSON counters. Last writer wins,
/// matching the rest of the row-update model.
pub async fn record_followup_engagement(
    pool: &SqlitePool,
    client_id: &str,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT engagement FROM clients WHERE id = ?")
        .bind(client_id)
        .fetch_one(pool)
        .await?;

    let mut value: serde_json::Value = match raw.as_deref() {
        None | Some("") => serde_json::json!({}),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|_| serde_json::json!({})),
    };
    let sent = value
        .get("followups_sent")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    value["followups_sent"] = serde_json::json!(sent + 1);
    value["last_followup_at"] = serde_json::json!(now.to_rfc3339());

    sqlx::query(
        "UPDATE clients SET engagement = ?, manual_email_offset = manual_email_offset + 1 WHERE id = ?",
    )
    .bind(value.to_string())
    .bind(client_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---- conferences / templates ----

pub async fn conference_by_id(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Conference>, CoreError> {
    let row = sqlx::query_as::<_, Conference>("SELECT * FROM conferences WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn template_by_id(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<EmailTemplate>, CoreError> {
    let row = sqlx::query_as::<_, EmailTemplate>("SELECT * FROM email_templates WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

// ---- accounts ----

pub async fn account_by_id(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<EmailAccount>, CoreError> {
    let row = sqlx::query_as::<_, EmailAccount>("SELECT * FROM email_accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Active account with the lowest send priority; ties broken by earliest
/// creation.
pub async fn first_active_account(pool: &SqlitePool) -> Result<Option<EmailAccount>, CoreError> {
    let row = sqlx::query_as::<_, EmailAccount>(
        "SELECT * FROM email_accounts WHERE active = 1 \
         ORDER BY send_priority ASC, created_at ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn accounts_for_sync(pool: &SqlitePool) -> Result<Vec<EmailAccount>, CoreError> {
    let rows = sqlx::query_as::<_, EmailAccount>(
        "SELECT * FROM email_accounts WHERE active = 1 ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter(EmailAccount::has_imap).collect())
}

pub async fn set_sync_status(
    pool: &SqlitePool,
    account_id: &str,
    status: SyncStatus,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE email_accounts SET sync_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_last_sync(pool: &SqlitePool, account_id: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE email_accounts SET last_sync_ts = ? WHERE id = ?")
        .bind(Utc::now().timestamp())
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_account_send(
    pool: &SqlitePool,
    account_id: &str,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE email_accounts SET sent_today = sent_today + 1, last_sent_at = ? WHERE id = ?",
    )
    .bind(now)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---- jobs ----

/// Jobs ready to fire this tick, joined to a live client and conference.
/// Template validity is re-checked per job during processing.
pub async fn due_jobs(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<FollowUpJob>, CoreError> {
    let rows = sqlx::query_as::<_, FollowUpJob>(
        "SELECT j.* FROM follow_up_jobs j \
         JOIN clients c ON c.id = j.client_id \
         JOIN conferences f ON f.id = j.conference_id \
         WHERE j.status = 'active' AND j.paused = 0 \
           AND j.scheduled_date <= ? \
           AND j.current_attempt < j.max_attempts \
           AND c.active = 1 AND f.active = 1 \
         ORDER BY j.scheduled_date ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn job_by_id(pool: &SqlitePool, id: &str) -> Result<Option<FollowUpJob>, CoreError> {
    let row = sqlx::query_as::<_, FollowUpJob>("SELECT * FROM follow_up_jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn insert_job(pool: &SqlitePool, job: &FollowUpJob) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO follow_up_jobs (\
            id, client_id, conference_id, template_id, stage, status, paused, \
            scheduled_date, current_attempt, max_attempts, skip_weekends, \
            custom_interval_days, settings, created_at, completed_at \
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&job.id)
    .bind(&job.client_id)
    .bind(&job.conference_id)
    .bind(&job.template_id)
    .bind(&job.stage)
    .bind(&job.status)
    .bind(job.paused)
    .bind(job.scheduled_date)
    .bind(job.current_attempt)
    .bind(job.max_attempts)
    .bind(job.skip_weekends)
    .bind(job.custom_interval_days)
    .bind(&job.settings)
    .bind(job.created_at)
    .bind(job.completed_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reschedule after a successful non-final attempt. The attempt counter
/// only moves up and the date only moves forward.
pub async fn advance_job(
    pool: &SqlitePool,
    job_id: &str,
    next_attempt: i64,
    next_date: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE follow_up_jobs \
         SET current_attempt = MAX(current_attempt, ?), \
             scheduled_date = MAX(scheduled_date, ?) \
         WHERE id = ?",
    )
    .bind(next_attempt)
    .bind(next_date)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn complete_job(
    pool: &SqlitePool,
    job_id: &str,
    final_attempt: i64,
    completed_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE follow_up_jobs \
         SET status = 'stopped', current_attempt = MAX(current_attempt, ?), completed_at = ? \
         WHERE id = ?",
    )
    .bind(final_attempt)
    .bind(completed_at)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn stop_job(pool: &SqlitePool, job_id: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE follow_up_jobs SET status = 'stopped', completed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_job_paused(
    pool: &SqlitePool,
    job_id: &str,
    paused: bool,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE follow_up_jobs SET paused = ? WHERE id = ? AND status = 'active'")
        .bind(paused)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_job_settings(
    pool: &SqlitePool,
    job_id: &str,
    settings_json: &str,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE follow_up_jobs SET settings = ? WHERE id = ?")
        .bind(settings_json)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn active_jobs_for_client(
    pool: &SqlitePool,
    client_id: &str,
    stage: Option<&str>,
) -> Result<Vec<FollowUpJob>, CoreError> {
    let rows = match stage {
        Some(stage) => {
            sqlx::query_as::<_, FollowUpJob>(
                "SELECT * FROM follow_up_jobs \
                 WHERE client_id = ? AND status = 'active' AND stage = ? \
                 ORDER BY created_at ASC",
            )
            .bind(client_id)
            .bind(stage)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, FollowUpJob>(
                "SELECT * FROM follow_up_jobs \
                 WHERE client_id = ? AND status = 'active' \
                 ORDER BY created_at ASC",
            )
            .bind(client_id)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

// ---- emails / threads / logs ----

pub async fn email_exists(
    pool: &SqlitePool,
    account_id: &str,
    message_id: &str,
) -> Result<bool, CoreError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM emails WHERE account_id = ? AND message_id = ?",
    )
    .bind(account_id)
    .bind(message_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn insert_email(pool: &SqlitePool, email: &Email) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO emails (\
            id, account_id, client_id, conference_id, job_id, thread_id, \
            message_id, in_reply_to, references_header, folder, direction, \
            subject, from_addr, to_addr, body_html, body_text, status, \
            sent_at, received_at, created_at \
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&email.id)
    .bind(&email.account_id)
    .bind(&email.client_id)
    .bind(&email.conference_id)
    .bind(&email.job_id)
    .bind(email.thread_id)
    .bind(&email.message_id)
    .bind(&email.in_reply_to)
    .bind(&email.references_header)
    .bind(&email.folder)
    .bind(&email.direction)
    .bind(&email.subject)
    .bind(&email.from_addr)
    .bind(&email.to_addr)
    .bind(&email.body_html)
    .bind(&email.body_text)
    .bind(&email.status)
    .bind(email.sent_at)
    .bind(email.received_at)
    .bind(email.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Outbound history for the quote chain, oldest first. When a thread
/// root is known the slice starts at that message (inclusive); otherwise
/// the full outbound history for the client/conference pair is used.
pub async fn sent_emails_for_thread(
    pool: &SqlitePool,
    client_id: &str,
    conference_id: &str,
    thread_root_message_id: Option<&str>,
) -> Result<Vec<Email>, CoreError> {
    let rows = sqlx::query_as::<_, Email>(
        "SELECT * FROM emails \
         WHERE client_id = ? AND conference_id = ? AND direction = 'outbound' \
         ORDER BY sent_at ASC, created_at ASC",
    )
    .bind(client_id)
    .bind(conference_id)
    .fetch_all(pool)
    .await?;

    match thread_root_message_id {
        None => Ok(rows),
        Some(root) => {
            let start = rows.iter().position(|e| e.message_id == root);
            match start {
                Some(i) => Ok(rows.into_iter().skip(i).collect()),
                // Root not found locally: fall back to full history rather
                // than sending with no context.
                None => Ok(rows),
            }
        }
    }
}

pub async fn find_or_create_thread(
    pool: &SqlitePool,
    account_id: &str,
    subject: &str,
) -> Result<MailThread, CoreError> {
    if let Some(t) = sqlx::query_as::<_, MailThread>(
        "SELECT * FROM mail_threads WHERE account_id = ? AND subject = ?",
    )
    .bind(account_id)
    .bind(subject)
    .fetch_optional(pool)
    .await?
    {
        return Ok(t);
    }

    let now = Utc::now();
    let res = sqlx::query(
        "INSERT OR IGNORE INTO mail_threads (account_id, subject, created_at) VALUES (?, ?, ?)",
    )
    .bind(account_id)
    .bind(subject)
    .bind(now)
    .execute(pool)
    .await?;

    if res.rows_affected() > 0 {
        Ok(MailThread {
            id: res.last_insert_rowid(),
            account_id: account_id.to_string(),
            subject: subject.to_string(),
            created_at: now,
        })
    } else {
        // Lost the insert race; the row exists now.
        let t = sqlx::query_as::<_, MailThread>(
            "SELECT * FROM mail_threads WHERE account_id = ? AND subject = ?",
        )
        .bind(account_id)
        .bind(subject)
        .fetch_one(pool)
        .await?;
        Ok(t)
    }
}

pub async fn insert_email_log(
    pool: &SqlitePool,
    email_id: Option<&str>,
    job_id: Option<&str>,
    event: &str,
    detail: Option<&str>,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO email_logs (email_id, job_id, event, detail, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(email_id)
    .bind(job_id)
    .bind(event)
    .bind(detail)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
