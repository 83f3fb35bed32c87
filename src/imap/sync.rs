use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::error::CoreError;
use crate::imap::conn::ImapSession;

/// Inbound message after envelope/body parsing, ready for ingest.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub uid: Option<u32>,
    /// Bare Message-Id (angle brackets stripped), when the envelope has one.
    pub message_id: Option<String>,
    /// In-Reply-To from the envelope, same bare form.
    pub in_reply_to: Option<String>,
    pub subject: String,
    pub from_addr: String,
    pub to_addr: String,
    pub internal_date: Option<DateTime<Utc>>,
    pub body_text: Option<String>,
}

/// Fetch and parse a contiguous sequence-number range, as produced by a
/// message-count increase (`last_seen+1:current`).
pub async fn fetch_range(
    session: &mut ImapSession,
    first_seq: u32,
    last_seq: u32,
) -> Result<Vec<ParsedMessage>, CoreError> {
    if first_seq > last_seq {
        return Ok(Vec::new());
    }
    let range = format!("{first_seq}:{last_seq}");
    let mut fetches = session
        .fetch(&range, "(UID ENVELOPE INTERNALDATE BODY.PEEK[TEXT])")
        .await
        .map_err(|e| CoreError::Transport(format!("fetch {range}: {e}")))?;

    let mut out = Vec::new();
    while let Some(item) = fetches.next().await {
        match item {
            Ok(fetch) => out.push(parse_fetch(&fetch)),
            Err(e) => tracing::warn!(error = %e, "skipping unfetchable message"),
        }
    }
    Ok(out)
}

fn parse_fetch(fetch: &async_imap::types::Fetch) -> ParsedMessage {
    let envelope = fetch.envelope();

    let subject = envelope
        .and_then(|e| e.subject.as_ref())
        .map(|b| String::from_utf8_lossy(b).to_string())
        .unwrap_or_default();

    let message_id = envelope
        .and_then(|e| e.message_id.as_ref())
        .and_then(|id| std::str::from_utf8(id).ok())
        .map(|s| s.trim_matches(['<', '>']).to_string())
        .filter(|s| !s.is_empty());

    let in_reply_to = envelope
        .and_then(|e| e.in_reply_to.as_ref())
        .and_then(|id| std::str::from_utf8(id).ok())
        .map(|s| s.trim_matches(['<', '>']).to_string())
        .filter(|s| !s.is_empty());

    let from_addr = envelope
        .and_then(|e| e.from.as_ref())
        .and_then(|addrs| addrs.first())
        .map(format_address)
        .unwrap_or_default();

    let to_addr = envelope
        .and_then(|e| e.to.as_ref())
        .and_then(|addrs| addrs.first())
        .map(format_address)
        .unwrap_or_default();

    let body_text = fetch
        .text()
        .map(|b| String::from_utf8_lossy(b).to_string());

    ParsedMessage {
        uid: fetch.uid,
        message_id,
        in_reply_to,
        subject,
        from_addr,
        to_addr,
        internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        body_text,
    }
}

fn format_address(addr: &async_imap::imap_proto::types::Address) -> String {
    let mailbox = addr
        .mailbox
        .as_ref()
        .and_then(|b| std::str::from_utf8(b).ok());
    let host = addr.host.as_ref().and_then(|b| std::str::from_utf8(b).ok());
    match (mailbox, host) {
        (Some(m), Some(h)) => format!("{m}@{h}"),
        _ => String::new(),
    }
}
