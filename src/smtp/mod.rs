use async_trait::async_trait;
use lettre::message::header::MessageId;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::EmailAccount;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Message-Id the mail went out with, bare (no angle brackets).
    pub message_id: String,
    pub from_addr: String,
}

/// Outbound transport seam. The shipped implementation speaks SMTP via
/// lettre; tests swap in a recording mock.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        account: &EmailAccount,
        mail: &OutgoingMail,
    ) -> Result<SendReceipt, CoreError>;
}

/// lettre-backed sender. A transport is built per send because the
/// account is chosen per job and sends within a tick are sequential.
pub struct SmtpMailer;

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        account: &EmailAccount,
        mail: &OutgoingMail,
    ) -> Result<SendReceipt, CoreError> {
        let (message, message_id) = build_message(account, mail)?;
        let mailer = build_transport(account)?;
        mailer
            .send(message)
            .await
            .map_err(|e| CoreError::Transport(format!("smtp send via {}: {e}", account.email)))?;
        Ok(SendReceipt {
            message_id,
            from_addr: account.email.clone(),
        })
    }
}

/// Build the outgoing message with an explicit Message-Id and *no*
/// In-Reply-To/References headers: every follow-up must appear as its
/// own inbox entry.
fn build_message(
    account: &EmailAccount,
    mail: &OutgoingMail,
) -> Result<(Message, String), CoreError> {
    let from: Mailbox = account
        .email
        .parse()
        .map_err(|e| CoreError::Configuration(format!("bad from address {}: {e}", account.email)))?;
    let to: Mailbox = mail
        .to
        .parse()
        .map_err(|e| CoreError::DataIntegrity(format!("bad recipient address {}: {e}", mail.to)))?;

    let domain = account.email.split('@').nth(1).unwrap_or("funnelpost.local");
    let message_id = format!("{}@{}", Uuid::new_v4(), domain);

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone())
        .header(MessageId::from(message_id.clone()))
        .multipart(MultiPart::alternative_plain_html(
            mail.body_text.clone(),
            mail.body_html.clone(),
        ))
        .map_err(|e| CoreError::DataIntegrity(format!("message build failed: {e}")))?;

    Ok((message, message_id))
}

fn build_transport(
    account: &EmailAccount,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, CoreError> {
    // App passwords get pasted with stray whitespace often enough that we
    // scrub it before authenticating.
    let clean_password: String = account
        .smtp_password
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let creds = Credentials::new(account.smtp_username.clone(), clean_password);

    let tls = TlsParameters::builder(account.smtp_host.clone())
        .build()
        .map_err(|e| CoreError::Transport(format!("tls setup for {}: {e}", account.smtp_host)))?;

    let mut builder = match AsyncSmtpTransport::<Tokio1Executor>::relay(&account.smtp_host) {
        Ok(b) => b,
        Err(_) => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&account.smtp_host),
    };

    builder = builder
        .port(account.smtp_port as u16)
        .hello_name(ClientId::Domain(account.smtp_host.clone()))
        .authentication(vec![Mechanism::Plain, Mechanism::Login])
        .credentials(creds)
        .timeout(Some(Duration::from_secs(20)));

    // 465 expects an implicit-TLS wrapper; everything else gets STARTTLS.
    let builder = if account.smtp_port == 465 {
        builder.tls(Tls::Wrapper(tls))
    } else {
        builder.tls(Tls::Required(tls))
    };

    Ok(builder.build())
}
