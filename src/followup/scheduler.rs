use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::queries;
use crate::error::CoreError;
use crate::followup::interval::next_send_date;
use crate::followup::quote::{self, QuoteSource};
use crate::followup::selector;
use crate::followup::sequence::resolve_template;
use crate::followup::strip_reply_prefixes;
use crate::models::{
    Client, ClientStatus, Conference, Email, EmailDirection, FollowUpJob, JobSettings, JobStage,
    JobStatus,
};
use crate::render::TemplateRenderer;
use crate::smtp::{MailTransport, OutgoingMail};

/// What happened to one job during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Sent and rescheduled for the next attempt.
    Rescheduled { next_attempt: i64 },
    /// Sent the final attempt; job stopped, client possibly auto-marked.
    Exhausted,
    /// A guard fired before sending; job stopped silently (not an error).
    StoppedByGuard { reason: String },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub due: usize,
    pub sent: usize,
    pub stopped: usize,
    pub failed: usize,
}

/// Tick-driven orchestrator for follow-up jobs. Jobs are processed
/// sequentially within a tick so concurrent sends never race one
/// account's rate counters; a failure on one job defers only that job.
pub struct FollowUpScheduler {
    pool: SqlitePool,
    transport: Arc<dyn MailTransport>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl FollowUpScheduler {
    pub fn new(
        pool: SqlitePool,
        transport: Arc<dyn MailTransport>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        FollowUpScheduler {
            pool,
            transport,
            renderer,
        }
    }

    /// Spawn the recurring ticker. Each tick runs to completion; the
    /// sleep absorbs whatever time processing took.
    pub fn start(self: Arc<Self>, tick: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let tick_start = std::time::Instant::now();
                match self.process_scheduled_emails().await {
                    Ok(stats) if stats.due > 0 => info!(
                        due = stats.due,
                        sent = stats.sent,
                        stopped = stats.stopped,
                        failed = stats.failed,
                        "follow-up tick completed"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "follow-up tick failed"),
                }
                let elapsed = tick_start.elapsed();
                let sleep_ms = (tick.as_millis() as u64).saturating_sub(elapsed.as_millis() as u64);
                tokio::time::sleep(Duration::from_millis(sleep_ms.max(1))).await;
            }
        })
    }

    /// One pass over the due jobs. Public so an external periodic driver
    /// can invoke it directly.
    pub async fn process_scheduled_emails(&self) -> Result<TickStats, CoreError> {
        self.process_due_jobs(Utc::now()).await
    }

    /// Injectable-clock variant of `process_scheduled_emails`.
    pub async fn process_due_jobs(&self, now: DateTime<Utc>) -> Result<TickStats, CoreError> {
        let jobs = queries::due_jobs(&self.pool, now).await?;
        let mut stats = TickStats {
            due: jobs.len(),
            ..TickStats::default()
        };

        for job in &jobs {
            match self.process_job(job, now).await {
                Ok(JobOutcome::Rescheduled { next_attempt }) => {
                    stats.sent += 1;
                    debug!(job = %job.id, next_attempt, "follow-up sent and rescheduled");
                }
                Ok(JobOutcome::Exhausted) => {
                    stats.sent += 1;
                    stats.stopped += 1;
                    info!(job = %job.id, "follow-up sequence exhausted");
                }
                Ok(JobOutcome::StoppedByGuard { reason }) => {
                    stats.stopped += 1;
                    info!(job = %job.id, reason = %reason, "follow-up stopped by guard");
                }
                // Per-job isolation: scheduled_date stays put, so the job
                // comes back next tick; the rest of the batch continues.
                Err(e) => {
                    stats.failed += 1;
                    warn!(job = %job.id, error = %e, "follow-up attempt failed, will retry next tick");
                    if let Err(log_err) = queries::insert_email_log(
                        &self.pool,
                        None,
                        Some(&job.id),
                        "failed",
                        Some(&e.to_string()),
                    )
                    .await
                    {
                        warn!(job = %job.id, error = %log_err, "failure audit log write failed");
                    }
                }
            }
        }
        Ok(stats)
    }

    async fn process_job(
        &self,
        job: &FollowUpJob,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, CoreError> {
        let stage = job.stage()?;

        // Re-fetch the freshest client row; the one joined at query time
        // may be stale by the time this job is reached in the batch.
        let client = match queries::client_by_id(&self.pool, &job.client_id).await? {
            Some(c) if c.active => c,
            _ => {
                queries::stop_job(&self.pool, &job.id).await?;
                return Ok(JobOutcome::StoppedByGuard {
                    reason: "client missing or inactive".into(),
                });
            }
        };

        if let Some(reason) = guard_reason(stage, &client.status()) {
            queries::stop_job(&self.pool, &job.id).await?;
            return Ok(JobOutcome::StoppedByGuard { reason });
        }

        let conference = queries::conference_by_id(&self.pool, &job.conference_id)
            .await?
            .filter(|c| c.active)
            .ok_or_else(|| {
                CoreError::Configuration(format!(
                    "conference {} missing or inactive",
                    job.conference_id
                ))
            })?;

        let mut settings = job.parse_settings()?;
        let sequence = match &settings.stage_template_sequence {
            Some(seq) => seq.clone(),
            None => conference.stage_template_sequence(stage)?,
        };
        let template_id =
            resolve_template(&sequence, job.current_attempt as usize, &job.template_id)?
                .to_string();

        let account = selector::select_account(&self.pool, &conference).await?;

        let rendered = self
            .renderer
            .render(&template_id, &client.id, &conference.id)
            .await?;

        let subject = compose_subject(&rendered.subject)?;

        // Everything previously sent in this logical thread, reproduced
        // as a nested quote block inside the new body. The message itself
        // carries no threading headers, so each attempt lands as its own
        // inbox entry.
        let history = queries::sent_emails_for_thread(
            &self.pool,
            &client.id,
            &conference.id,
            settings.thread_root_message_id.as_deref(),
        )
        .await?;
        let sources: Vec<QuoteSource> = history.iter().map(QuoteSource::from_email).collect();
        let chain = quote::compose(&sources);

        let (body_html, body_text) = if chain.html.is_empty() {
            (rendered.body_html.clone(), rendered.body_text.clone())
        } else {
            (
                format!("{}<br><br>{}", rendered.body_html, chain.html),
                format!("{}\n\n{}", rendered.body_text, chain.text),
            )
        };

        let receipt = self
            .transport
            .send(
                &account,
                &OutgoingMail {
                    to: client.email.clone(),
                    subject: subject.clone(),
                    body_html: body_html.clone(),
                    body_text: body_text.clone(),
                },
            )
            .await?;

        let email = Email {
            id: Uuid::new_v4().to_string(),
            account_id: Some(account.id.clone()),
            client_id: Some(client.id.clone()),
            conference_id: Some(conference.id.clone()),
            job_id: Some(job.id.clone()),
            thread_id: None,
            message_id: receipt.message_id.clone(),
            // Deliberately no protocol threading.
            in_reply_to: None,
            references_header: None,
            folder: "Sent".into(),
            direction: EmailDirection::Outbound.as_str().into(),
            subject,
            from_addr: receipt.from_addr.clone(),
            to_addr: client.email.clone(),
            body_html: Some(body_html),
            body_text: Some(body_text),
            status: "sent".into(),
            sent_at: Some(now),
            received_at: None,
            created_at: now,
        };
        queries::insert_email(&self.pool, &email).await?;
        queries::insert_email_log(&self.pool, Some(&email.id), Some(&job.id), "sent", None)
            .await?;
        queries::record_followup_engagement(&self.pool, &client.id, now).await?;
        queries::record_account_send(&self.pool, &account.id, now).await?;

        // First send establishes the thread root for later quote chains.
        if settings.thread_root_message_id.is_none() {
            settings.thread_root_message_id = Some(receipt.message_id.clone());
            queries::update_job_settings(&self.pool, &job.id, &settings.to_json()?).await?;
        }

        self.advance_or_complete(job, stage, &client, now).await
    }

    async fn advance_or_complete(
        &self,
        job: &FollowUpJob,
        stage: JobStage,
        client: &Client,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, CoreError> {
        let next_attempt = job.current_attempt + 1;

        if next_attempt >= job.max_attempts {
            queries::complete_job(&self.pool, &job.id, next_attempt, now).await?;
            // The client never responded through the whole sequence; mark
            // them so the funnel dashboards reflect it, but only when their
            // status still shows the unresolved stage.
            let auto_status = match (stage, client.status()) {
                (JobStage::AbstractSubmission, ClientStatus::Lead) => {
                    Some(ClientStatus::Unresponsive)
                }
                (JobStage::Registration, ClientStatus::AbstractSubmitted) => {
                    Some(ClientStatus::RegistrationUnresponsive)
                }
                _ => None,
            };
            if let Some(status) = auto_status {
                queries::update_client_status(&self.pool, &client.id, status.as_str()).await?;
                info!(client = %client.id, status = status.as_str(), "client auto-marked unresponsive");
            }
            return Ok(JobOutcome::Exhausted);
        }

        let next_date = next_send_date(now, job.interval()?, job.skip_weekends);
        queries::advance_job(&self.pool, &job.id, next_attempt, next_date).await?;
        Ok(JobOutcome::Rescheduled { next_attempt })
    }
}

/// Pre-send guards, evaluated against the freshest client row. A hit
/// means the job's premise no longer holds; it is stopped, not failed.
fn guard_reason(stage: JobStage, status: &ClientStatus) -> Option<String> {
    if *status == ClientStatus::Registered {
        return Some("client already registered".into());
    }
    if stage == JobStage::AbstractSubmission && *status != ClientStatus::Lead {
        return Some(format!(
            "stage-1 job but client status is '{}'",
            status.as_str()
        ));
    }
    None
}

/// Final subject: reply/forward markers stripped, then a short unique
/// token appended so successive attempts never collapse into one thread
/// in the recipient's mailbox.
fn compose_subject(rendered_subject: &str) -> Result<String, CoreError> {
    let base = strip_reply_prefixes(rendered_subject);
    if base.is_empty() {
        return Err(CoreError::DataIntegrity(
            "template rendered an empty subject".into(),
        ));
    }
    let token = Uuid::new_v4().simple().to_string();
    Ok(format!("{} [#{}]", base, &token[..8]))
}

// ---- job lifecycle operations ----

/// Create the follow-up job for a client entering a stage, seeded from
/// the conference's per-stage sequence and interval. `thread_root` links
/// the new job to an existing logical conversation.
pub async fn create_job_for_stage(
    pool: &SqlitePool,
    client: &Client,
    conference: &Conference,
    stage: JobStage,
    thread_root: Option<String>,
) -> Result<FollowUpJob, CoreError> {
    let sequence = conference.stage_template_sequence(stage)?;
    let template_id = sequence.first().cloned().ok_or_else(|| {
        CoreError::Configuration(format!(
            "conference {} has no {} templates",
            conference.id,
            stage.as_str()
        ))
    })?;
    let interval = conference
        .stage_interval(stage)?
        .unwrap_or_else(|| crate::followup::interval::IntervalConfig::from_days(3));

    let now = Utc::now();
    let settings = JobSettings {
        interval_config: Some(interval),
        thread_root_message_id: thread_root,
        stage_template_sequence: Some(sequence),
        timezone: None,
        working_hours: None,
    };

    let job = FollowUpJob {
        id: Uuid::new_v4().to_string(),
        client_id: client.id.clone(),
        conference_id: conference.id.clone(),
        template_id,
        stage: stage.as_str().into(),
        status: JobStatus::Active.as_str().into(),
        paused: false,
        scheduled_date: next_send_date(now, interval, conference.skip_weekends),
        current_attempt: 0,
        max_attempts: conference.stage_max_attempts(stage),
        skip_weekends: conference.skip_weekends,
        custom_interval_days: None,
        settings: Some(settings.to_json()?),
        created_at: now,
        completed_at: None,
    };
    queries::insert_job(pool, &job).await?;
    info!(job = %job.id, client = %client.id, stage = stage.as_str(), "follow-up job created");
    Ok(job)
}

pub async fn pause_job(pool: &SqlitePool, job_id: &str) -> Result<(), CoreError> {
    queries::set_job_paused(pool, job_id, true).await
}

pub async fn resume_job(pool: &SqlitePool, job_id: &str) -> Result<(), CoreError> {
    queries::set_job_paused(pool, job_id, false).await
}

pub async fn stop_job(pool: &SqlitePool, job_id: &str) -> Result<(), CoreError> {
    queries::stop_job(pool, job_id).await
}

/// Side channel invoked by the external client-update endpoint after a
/// status transition.
///
/// `Abstract Submitted`: stage-1 jobs are done; stop them and open a
/// stage-2 job (once), carrying the thread root forward so the quote
/// chain spans both stages. `Registered`: the funnel is complete; stop
/// everything for the client.
pub async fn on_client_status_changed(
    pool: &SqlitePool,
    client_id: &str,
    new_status: &ClientStatus,
) -> Result<(), CoreError> {
    match new_status {
        ClientStatus::AbstractSubmitted => {
            let stage1 = queries::active_jobs_for_client(
                pool,
                client_id,
                Some(JobStage::AbstractSubmission.as_str()),
            )
            .await?;
            let mut thread_root = None;
            for job in &stage1 {
                if thread_root.is_none() {
                    thread_root = job.parse_settings().ok().and_then(|s| s.thread_root_message_id);
                }
                queries::stop_job(pool, &job.id).await?;
                info!(job = %job.id, "stage-1 job stopped on abstract submission");
            }

            let existing = queries::active_jobs_for_client(
                pool,
                client_id,
                Some(JobStage::Registration.as_str()),
            )
            .await?;
            if !existing.is_empty() {
                return Ok(());
            }

            let client = queries::client_by_id(pool, client_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Configuration(format!("client {client_id} not found"))
                })?;
            let conference = queries::conference_by_id(pool, &client.conference_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Configuration(format!(
                        "conference {} not found",
                        client.conference_id
                    ))
                })?;
            create_job_for_stage(pool, &client, &conference, JobStage::Registration, thread_root)
                .await?;
            Ok(())
        }
        ClientStatus::Registered => {
            let jobs = queries::active_jobs_for_client(pool, client_id, None).await?;
            for job in &jobs {
                queries::stop_job(pool, &job.id).await?;
                info!(job = %job.id, "job stopped on registration");
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
