use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, oneshot, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::queries;
use crate::error::CoreError;
use crate::imap::watch::MailboxConnector;
use crate::models::{EmailAccount, SyncStatus};
use crate::services::ingest;

/// Push event emitted towards the external notification sink.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    pub account_id: String,
    pub email: String,
    pub kind: SyncEventKind,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    NewMessages { count: u32 },
    Connected,
    Disconnected,
    Error { message: String },
}

/// Bounded reconnect policy for a monitor: `max_attempts` consecutive
/// failures with a fixed delay between them, then give up.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MonitorParams {
    poll_interval: Duration,
    keepalive: Duration,
    retry: RetryPolicy,
}

struct MonitorHandle {
    cancel_tx: oneshot::Sender<()>,
    /// Distinguishes this monitor from any later one started for the
    /// same account, so a finished task only ever removes its own entry.
    generation: Uuid,
}

/// Owns one long-lived mailbox monitor per eligible account. The registry
/// is keyed on account id so a second start for the same account is a
/// no-op — never two concurrent monitors.
pub struct SyncSupervisor {
    pool: SqlitePool,
    connector: Arc<dyn MailboxConnector>,
    monitors: Arc<RwLock<HashMap<String, MonitorHandle>>>,
    event_tx: broadcast::Sender<SyncEvent>,
    params: MonitorParams,
}

impl SyncSupervisor {
    pub fn new(
        pool: SqlitePool,
        connector: Arc<dyn MailboxConnector>,
        poll_interval: Duration,
        keepalive: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        SyncSupervisor {
            pool,
            connector,
            monitors: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            params: MonitorParams {
                poll_interval,
                keepalive,
                retry,
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Start monitors for every active account with IMAP credentials.
    pub async fn start_all(&self) -> Result<usize, CoreError> {
        let accounts = queries::accounts_for_sync(&self.pool).await?;
        let mut started = 0;
        for account in accounts {
            if self.start_account(account).await? {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Start one monitor. Returns false when one is already running.
    pub async fn start_account(&self, account: EmailAccount) -> Result<bool, CoreError> {
        if !account.has_imap() {
            return Err(CoreError::Configuration(format!(
                "account {} has no usable IMAP credentials",
                account.email
            )));
        }

        let mut monitors = self.monitors.write().await;
        if monitors.contains_key(&account.id) {
            return Ok(false);
        }

        let generation = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        monitors.insert(
            account.id.clone(),
            MonitorHandle {
                cancel_tx,
                generation,
            },
        );
        drop(monitors);

        let pool = self.pool.clone();
        let connector = self.connector.clone();
        let event_tx = self.event_tx.clone();
        let params = self.params;
        let registry = self.monitors.clone();
        let account_id = account.id.clone();

        tokio::spawn(async move {
            run_monitor(pool, account, connector, event_tx, params, cancel_rx).await;
            // A stop/start pair may already have installed a successor
            // under this account id; only this task's own entry may go.
            let mut monitors = registry.write().await;
            if monitors
                .get(&account_id)
                .is_some_and(|h| h.generation == generation)
            {
                monitors.remove(&account_id);
            }
        });

        Ok(true)
    }

    pub async fn stop_account(&self, account_id: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(handle) = monitors.remove(account_id) {
            let _ = handle.cancel_tx.send(());
        }
    }

    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (_, handle) in monitors.drain() {
            let _ = handle.cancel_tx.send(());
        }
    }

    pub async fn active_count(&self) -> usize {
        self.monitors.read().await.len()
    }
}

/// Per-account monitor task: connect, watch, reconnect with bounded
/// retries, then park as disconnected until externally restarted.
async fn run_monitor(
    pool: SqlitePool,
    account: EmailAccount,
    connector: Arc<dyn MailboxConnector>,
    event_tx: broadcast::Sender<SyncEvent>,
    params: MonitorParams,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    info!(email = %account.email, "starting mailbox monitor");
    let mut failures: u32 = 0;

    loop {
        if cancel_rx.try_recv().is_ok() {
            break;
        }

        match monitor_session(
            &pool,
            &account,
            connector.as_ref(),
            &event_tx,
            params,
            &mut cancel_rx,
            &mut failures,
        )
        .await
        {
            // Cancel requested mid-session.
            Ok(()) => break,
            Err(e) => {
                failures += 1;
                warn!(
                    email = %account.email,
                    error = %e,
                    attempt = failures,
                    max = params.retry.max_attempts,
                    "mailbox monitor error"
                );
                if let Err(db_err) =
                    queries::set_sync_status(&pool, &account.id, SyncStatus::Error).await
                {
                    warn!(email = %account.email, error = %db_err, "sync status update failed");
                }
                emit(
                    &event_tx,
                    &account,
                    SyncEventKind::Error {
                        message: e.to_string(),
                    },
                );
                if failures >= params.retry.max_attempts {
                    warn!(email = %account.email, "retries exhausted, monitor stopping");
                    break;
                }
                tokio::time::sleep(params.retry.delay).await;
            }
        }
    }

    if let Err(e) = queries::set_sync_status(&pool, &account.id, SyncStatus::Disconnected).await {
        warn!(email = %account.email, error = %e, "sync status update failed");
    }
    emit(&event_tx, &account, SyncEventKind::Disconnected);
    info!(email = %account.email, "mailbox monitor stopped");
}

/// One connected session. `Ok(())` means cancellation was requested; any
/// server trouble surfaces as `Err` and counts against the retry budget.
/// `failures` is zeroed once the session is up, so the budget bounds
/// consecutive failed attempts rather than lifetime errors.
async fn monitor_session(
    pool: &SqlitePool,
    account: &EmailAccount,
    connector: &dyn MailboxConnector,
    event_tx: &broadcast::Sender<SyncEvent>,
    params: MonitorParams,
    cancel_rx: &mut oneshot::Receiver<()>,
    failures: &mut u32,
) -> Result<(), CoreError> {
    let mut mailbox = connector.open(account).await?;
    let mut last_count = mailbox.message_count().await?;
    let idle_supported = mailbox.supports_idle();

    queries::set_sync_status(pool, &account.id, SyncStatus::Active).await?;
    *failures = 0;
    emit(event_tx, account, SyncEventKind::Connected);
    info!(
        email = %account.email,
        messages = last_count,
        idle = idle_supported,
        "mailbox monitor connected"
    );

    loop {
        if cancel_rx.try_recv().is_ok() {
            return Ok(());
        }

        if idle_supported {
            // Hold the connection in IDLE; wake on server push or on the
            // keepalive period, whichever first.
            tokio::select! {
                _ = &mut *cancel_rx => return Ok(()),
                waited = mailbox.idle_wait(params.keepalive) => waited?,
            }
        } else {
            // 30-second polling fallback with a keepalive NOOP per cycle.
            tokio::select! {
                _ = &mut *cancel_rx => return Ok(()),
                _ = tokio::time::sleep(params.poll_interval) => {}
            }
            mailbox.keepalive().await?;
        }

        let current = mailbox.message_count().await?;
        if current > last_count {
            let new_messages = mailbox.fetch_new(last_count + 1, current).await?;
            let mut stored = 0u32;
            for message in &new_messages {
                match ingest::ingest_inbound(pool, account, message).await {
                    Ok(Some(_)) => stored += 1,
                    Ok(None) => {}
                    Err(e) => warn!(
                        email = %account.email,
                        error = %e,
                        "failed to store inbound message"
                    ),
                }
            }
            if stored > 0 {
                info!(email = %account.email, count = stored, "new mail ingested");
                emit(event_tx, account, SyncEventKind::NewMessages { count: stored });
            }
            queries::touch_last_sync(pool, &account.id).await?;
        }
        last_count = current;
    }
}

fn emit(tx: &broadcast::Sender<SyncEvent>, account: &EmailAccount, kind: SyncEventKind) {
    let _ = tx.send(SyncEvent {
        account_id: account.id.clone(),
        email: account.email.clone(),
        kind,
        timestamp: Utc::now().timestamp(),
    });
}
