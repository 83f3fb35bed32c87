use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use funnelpost::db;
use funnelpost::error::CoreError;
use funnelpost::models::{Client, Conference, EmailAccount, EmailTemplate, FollowUpJob};
use funnelpost::smtp::{MailTransport, OutgoingMail, SendReceipt};

pub async fn test_pool() -> SqlitePool {
    // One connection: each :memory: connection is its own database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    db::apply_schema(&pool).await.expect("schema");
    pool
}

pub async fn seed_conference(pool: &SqlitePool, smtp_account_id: Option<&str>) -> Conference {
    let conference = Conference {
        id: Uuid::new_v4().to_string(),
        name: "Advances in Materials 2026".into(),
        active: true,
        smtp_account_id: smtp_account_id.map(str::to_string),
        stage1_template_sequence: Some(r#"["tpl-s1-a","tpl-s1-b"]"#.into()),
        stage1_interval: Some(r#"{"value":7,"unit":"days"}"#.into()),
        stage1_max_attempts: 3,
        stage2_template_sequence: Some(r#"["tpl-s2-a"]"#.into()),
        stage2_interval: Some(r#"{"value":3,"unit":"days"}"#.into()),
        stage2_max_attempts: 2,
        skip_weekends: true,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO conferences (id, name, active, smtp_account_id, \
         stage1_template_sequence, stage1_interval, stage1_max_attempts, \
         stage2_template_sequence, stage2_interval, stage2_max_attempts, \
         skip_weekends, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&conference.id)
    .bind(&conference.name)
    .bind(conference.active)
    .bind(&conference.smtp_account_id)
    .bind(&conference.stage1_template_sequence)
    .bind(&conference.stage1_interval)
    .bind(conference.stage1_max_attempts)
    .bind(&conference.stage2_template_sequence)
    .bind(&conference.stage2_interval)
    .bind(conference.stage2_max_attempts)
    .bind(conference.skip_weekends)
    .bind(conference.created_at)
    .execute(pool)
    .await
    .expect("seed conference");
    conference
}

pub async fn seed_client(pool: &SqlitePool, conference_id: &str, status: &str) -> Client {
    let client = Client {
        id: Uuid::new_v4().to_string(),
        conference_id: conference_id.to_string(),
        name: "Ada Lovelace".into(),
        email: "ada@example.org".into(),
        status: status.to_string(),
        current_stage: "stage1".into(),
        manual_email_offset: 0,
        engagement: None,
        active: true,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO clients (id, conference_id, name, email, status, current_stage, \
         manual_email_offset, engagement, active, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&client.id)
    .bind(&client.conference_id)
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.status)
    .bind(&client.current_stage)
    .bind(client.manual_email_offset)
    .bind(&client.engagement)
    .bind(client.active)
    .bind(client.created_at)
    .execute(pool)
    .await
    .expect("seed client");
    client
}

pub async fn seed_template(pool: &SqlitePool, id: &str, conference_id: &str, subject: &str) {
    let template = EmailTemplate {
        id: id.to_string(),
        conference_id: conference_id.to_string(),
        name: format!("template {id}"),
        subject: subject.to_string(),
        body_html: "<p>Dear {{client_name}}, news from {{conference_name}}.</p>".into(),
        body_text: Some("Dear {{client_name}}, news from {{conference_name}}.".into()),
        active: true,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO email_templates (id, conference_id, name, subject, body_html, body_text, \
         active, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&template.id)
    .bind(&template.conference_id)
    .bind(&template.name)
    .bind(&template.subject)
    .bind(&template.body_html)
    .bind(&template.body_text)
    .bind(template.active)
    .bind(template.created_at)
    .execute(pool)
    .await
    .expect("seed template");
}

pub async fn seed_account(
    pool: &SqlitePool,
    email: &str,
    active: bool,
    send_priority: i64,
) -> EmailAccount {
    let account = EmailAccount {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        smtp_host: "smtp.example.org".into(),
        smtp_port: 587,
        smtp_username: email.to_string(),
        smtp_password: "secret".into(),
        imap_host: Some("imap.example.org".into()),
        imap_port: 993,
        imap_username: Some(email.to_string()),
        imap_password: Some("secret".into()),
        active,
        send_priority,
        sent_today: 0,
        last_sent_at: None,
        sync_status: "disconnected".into(),
        last_sync_ts: None,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO email_accounts (id, email, smtp_host, smtp_port, smtp_username, \
         smtp_password, imap_host, imap_port, imap_username, imap_password, active, \
         send_priority, sent_today, last_sent_at, sync_status, last_sync_ts, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&account.id)
    .bind(&account.email)
    .bind(&account.smtp_host)
    .bind(account.smtp_port)
    .bind(&account.smtp_username)
    .bind(&account.smtp_password)
    .bind(&account.imap_host)
    .bind(account.imap_port)
    .bind(&account.imap_username)
    .bind(&account.imap_password)
    .bind(account.active)
    .bind(account.send_priority)
    .bind(account.sent_today)
    .bind(account.last_sent_at)
    .bind(&account.sync_status)
    .bind(account.last_sync_ts)
    .bind(account.created_at)
    .execute(pool)
    .await
    .expect("seed account");
    account
}

pub async fn seed_job(
    pool: &SqlitePool,
    client_id: &str,
    conference_id: &str,
    stage: &str,
    current_attempt: i64,
    max_attempts: i64,
    scheduled_date: DateTime<Utc>,
    settings: Option<&str>,
) -> FollowUpJob {
    let job = FollowUpJob {
        id: Uuid::new_v4().to_string(),
        client_id: client_id.to_string(),
        conference_id: conference_id.to_string(),
        template_id: "tpl-s1-a".into(),
        stage: stage.to_string(),
        status: "active".into(),
        paused: false,
        scheduled_date,
        current_attempt,
        max_attempts,
        skip_weekends: true,
        custom_interval_days: None,
        settings: settings.map(str::to_string),
        created_at: Utc::now() - Duration::days(1),
        completed_at: None,
    };
    sqlx::query(
        "INSERT INTO follow_up_jobs (id, client_id, conference_id, template_id, stage, status, \
         paused, scheduled_date, current_attempt, max_attempts, skip_weekends, \
         custom_interval_days, settings, created_at, completed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
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
    .await
    .expect("seed job");
    job
}

/// Recording transport; optionally fails every send with a transport error.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<(String, OutgoingMail)>>,
    pub fail: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        account: &EmailAccount,
        mail: &OutgoingMail,
    ) -> Result<SendReceipt, CoreError> {
        if *self.fail.lock().unwrap() {
            return Err(CoreError::Transport("connection refused".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((account.email.clone(), mail.clone()));
        Ok(SendReceipt {
            message_id: format!("{}@test.local", Uuid::new_v4()),
            from_addr: account.email.clone(),
        })
    }
}
