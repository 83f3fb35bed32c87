use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::queries;
use crate::error::CoreError;

/// Output of the template-rendering collaborator.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub subject: String,
    pub body_html: String,
    pub body_text: String,
}

/// External collaborator seam: turn a template plus client/conference
/// context into a ready-to-send subject and body pair.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        client_id: &str,
        conference_id: &str,
    ) -> Result<Rendered, CoreError>;
}

/// Default renderer: substitutes `{{client_name}}`, `{{client_email}}`
/// and `{{conference_name}}` from the stored rows.
pub struct DbTemplateRenderer {
    pool: SqlitePool,
}

impl DbTemplateRenderer {
    pub fn new(pool: SqlitePool) -> Self {
        DbTemplateRenderer { pool }
    }
}

#[async_trait]
impl TemplateRenderer for DbTemplateRenderer {
    async fn render(
        &self,
        template_id: &str,
        client_id: &str,
        conference_id: &str,
    ) -> Result<Rendered, CoreError> {
        let template = queries::template_by_id(&self.pool, template_id)
            .await?
            .filter(|t| t.active)
            .ok_or_else(|| {
                CoreError::Configuration(format!("template {template_id} missing or inactive"))
            })?;
        let client = queries::client_by_id(&self.pool, client_id)
            .await?
            .ok_or_else(|| CoreError::Configuration(format!("client {client_id} not found")))?;
        let conference = queries::conference_by_id(&self.pool, conference_id)
            .await?
            .ok_or_else(|| {
                CoreError::Configuration(format!("conference {conference_id} not found"))
            })?;

        let substitute = |input: &str| {
            input
                .replace("{{client_name}}", &client.name)
                .replace("{{client_email}}", &client.email)
                .replace("{{conference_name}}", &conference.name)
        };

        let body_text = template
            .body_text
            .as_deref()
            .map(substitute)
            .unwrap_or_else(|| html_to_fallback_text(&substitute(&template.body_html)));

        Ok(Rendered {
            subject: substitute(&template.subject),
            body_html: substitute(&template.body_html),
            body_text,
        })
    }
}

/// Crude tag-stripping fallback for templates that only carry HTML.
fn html_to_fallback_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_stripping_keeps_visible_text() {
        assert_eq!(
            html_to_fallback_text("<p>Dear <b>Ada</b>,</p>"),
            "Dear Ada,"
        );
    }
}
