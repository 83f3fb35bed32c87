use chrono::{DateTime, Utc};

use crate::models::Email;

/// One prior message feeding the synthesized quote chain.
#[derive(Debug, Clone)]
pub struct QuoteSource {
    pub sent_at: DateTime<Utc>,
    pub from_addr: String,
    pub body_html: String,
    pub body_text: String,
}

impl QuoteSource {
    pub fn from_email(email: &Email) -> Self {
        QuoteSource {
            sent_at: email.sent_at.unwrap_or(email.created_at),
            from_addr: email.from_addr.clone(),
            body_html: email.body_html.clone().unwrap_or_default(),
            body_text: email.body_text.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteChain {
    pub html: String,
    pub text: String,
}

/// Build the nested quote block reproducing the whole prior conversation
/// inside the next message body. Protocol threading headers are never
/// involved; this block is the only conversation context the recipient's
/// client sees.
///
/// Input must be in chronological order (oldest first). Each message's
/// own embedded quotes are stripped before nesting so chains do not
/// double up, which also makes the composition idempotent.
pub fn compose(history: &[QuoteSource]) -> QuoteChain {
    let mut html = String::new();
    let mut text = String::new();

    for source in history.iter().rev() {
        let attribution = format!(
            "On {}, {} wrote:",
            source.sent_at.format("%a, %d %b %Y at %H:%M"),
            source.from_addr
        );

        let own_html = strip_html_quotes(&source.body_html);
        let mut inner_html = own_html.trim().to_string();
        if !html.is_empty() {
            inner_html.push_str(&html);
        }
        html = format!(
            "<div class=\"gmail_quote\">{}<br>\
             <blockquote class=\"gmail_quote\" style=\"margin:0 0 0 .8ex;border-left:1px solid #ccc;padding-left:1ex\">{}</blockquote></div>",
            escape_html(&attribution),
            inner_html
        );

        let own_text = strip_text_quotes(&source.body_text);
        let mut inner_text = own_text.trim_end().to_string();
        if !text.is_empty() {
            inner_text.push('\n');
            inner_text.push_str(&text);
        }
        text = format!("{attribution}\n{}", quote_prefix(&inner_text));
    }

    QuoteChain { html, text }
}

/// Truncate an HTML body at the first embedded quote boundary.
fn strip_html_quotes(body: &str) -> &str {
    let lower = body.to_ascii_lowercase();
    let cut = ["<div class=\"gmail_quote\"", "<blockquote"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min();
    match cut {
        Some(i) => &body[..i],
        None => body,
    }
}

/// Truncate a plain-text body at the first quoted line or attribution.
fn strip_text_quotes(body: &str) -> &str {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.starts_with('>')
            || (trimmed.starts_with("On ") && trimmed.ends_with("wrote:"))
        {
            return &body[..offset];
        }
        offset += line.len();
    }
    body
}

fn quote_prefix(block: &str) -> String {
    block
        .lines()
        .map(|l| {
            if l.is_empty() {
                ">".to_string()
            } else {
                format!("> {l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
