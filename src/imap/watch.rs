use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::imap::conn::{self, ImapSession};
use crate::imap::sync::{self, ParsedMessage};
use crate::models::EmailAccount;

/// One watched mailbox. Narrow seam over the handful of IMAP operations
/// the sync supervisor needs, so monitors can run against a scripted
/// mailbox in tests the same way `MailTransport` stands in for SMTP.
#[async_trait]
pub trait MailboxWatch: Send {
    /// Whether the server advertises IDLE.
    fn supports_idle(&self) -> bool;

    /// Hold the connection in IDLE until the server pushes activity or
    /// `keepalive` elapses, whichever first.
    async fn idle_wait(&mut self, keepalive: Duration) -> Result<(), CoreError>;

    /// Keepalive NOOP for the polling path.
    async fn keepalive(&mut self) -> Result<(), CoreError>;

    /// Re-select the mailbox and report its current message count.
    async fn message_count(&mut self) -> Result<u32, CoreError>;

    /// Fetch and parse a contiguous range of newly arrived messages.
    async fn fetch_new(
        &mut self,
        first_seq: u32,
        last_seq: u32,
    ) -> Result<Vec<ParsedMessage>, CoreError>;
}

#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn open(&self, account: &EmailAccount) -> Result<Box<dyn MailboxWatch>, CoreError>;
}

/// The shipped connector: TLS + LOGIN over async-imap.
pub struct ImapConnector;

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn open(&self, account: &EmailAccount) -> Result<Box<dyn MailboxWatch>, CoreError> {
        let host = account
            .imap_host
            .as_deref()
            .ok_or_else(|| CoreError::Configuration("imap host missing".into()))?;
        let pass = account
            .imap_password
            .as_deref()
            .ok_or_else(|| CoreError::Configuration("imap password missing".into()))?;
        let mut session =
            conn::connect(host, account.imap_port as u16, account.imap_login(), pass).await?;
        let idle_supported = conn::supports_idle(&mut session).await?;
        Ok(Box::new(ImapMailbox {
            session: Some(session),
            idle_supported,
        }))
    }
}

/// `MailboxWatch` over a live session. The session is parked in an
/// `Option` because entering IDLE consumes it; a wait future dropped
/// mid-flight (monitor cancelled) leaves it empty, and any later call
/// reports the session as lost.
pub struct ImapMailbox {
    session: Option<ImapSession>,
    idle_supported: bool,
}

impl ImapMailbox {
    fn session_mut(&mut self) -> Result<&mut ImapSession, CoreError> {
        self.session
            .as_mut()
            .ok_or_else(|| CoreError::Transport("imap session lost".into()))
    }
}

#[async_trait]
impl MailboxWatch for ImapMailbox {
    fn supports_idle(&self) -> bool {
        self.idle_supported
    }

    async fn idle_wait(&mut self, keepalive: Duration) -> Result<(), CoreError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| CoreError::Transport("imap session lost".into()))?;
        let mut idle = session.idle();
        idle.init()
            .await
            .map_err(|e| CoreError::Transport(format!("idle init: {e}")))?;
        let (wait_fut, _interrupt) = idle.wait_with_timeout(keepalive);
        wait_fut
            .await
            .map_err(|e| CoreError::Transport(format!("idle wait: {e}")))?;
        let session = idle
            .done()
            .await
            .map_err(|e| CoreError::Transport(format!("idle done: {e}")))?;
        self.session = Some(session);
        Ok(())
    }

    async fn keepalive(&mut self) -> Result<(), CoreError> {
        self.session_mut()?
            .noop()
            .await
            .map_err(|e| CoreError::Transport(format!("noop: {e}")))
    }

    async fn message_count(&mut self) -> Result<u32, CoreError> {
        let mailbox = self
            .session_mut()?
            .select("INBOX")
            .await
            .map_err(|e| CoreError::Transport(format!("select INBOX: {e}")))?;
        Ok(mailbox.exists)
    }

    async fn fetch_new(
        &mut self,
        first_seq: u32,
        last_seq: u32,
    ) -> Result<Vec<ParsedMessage>, CoreError> {
        sync::fetch_range(self.session_mut()?, first_seq, last_seq).await
    }
}
