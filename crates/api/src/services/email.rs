//! Email delivery of marketplace notifications.
//!
//! Supports multiple email providers:
//! - `console`: Logs emails to console (development)
//! - `sendgrid`: Uses SendGrid API

use async_trait::async_trait;
use domain::models::Contact;
use domain::services::{NotificationEvent, NotificationResult, Notifier};
use metrics::counter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::EmailConfig;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Email message to be sent.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

impl EmailMessage {
    /// Renders an event for one recipient.
    pub fn render(recipient: &Contact, event: &NotificationEvent, base_url: &str) -> Self {
        let link = event_link(event, base_url);

        let greeting = if recipient.name.is_empty() {
            "Hi,".to_string()
        } else {
            format!("Hi {},", recipient.name)
        };

        let mut body_text = format!("{}\n\n{}", greeting, event.body());
        if let Some(link) = &link {
            body_text.push_str(&format!("\n\nView it here: {}", link));
        }
        body_text.push_str("\n\nThe Donation Marketplace Team");

        let paragraphs: String = event
            .body()
            .split("\n\n")
            .map(|p| format!("<p>{}</p>", html_escape(p).replace('\n', "<br>")))
            .collect();
        let link_html = link
            .map(|l| {
                let l = html_escape(&l);
                format!(r#"<p><a href="{}">{}</a></p>"#, l, l)
            })
            .unwrap_or_default();
        let body_html = format!(
            "<!DOCTYPE html><html><body><p>{}</p>{}{}<p>The Donation Marketplace Team</p></body></html>",
            html_escape(&greeting),
            paragraphs,
            link_html
        );

        Self {
            to: recipient.email.clone(),
            to_name: (!recipient.name.is_empty()).then(|| recipient.name.clone()),
            subject: event.subject(),
            body_text,
            body_html,
        }
    }
}

fn event_link(event: &NotificationEvent, base_url: &str) -> Option<String> {
    if base_url.is_empty() {
        return None;
    }
    let base = base_url.trim_end_matches('/');
    let path = match event {
        NotificationEvent::NewDeviceRequest { device_id, .. }
        | NotificationEvent::HandoffRequired { device_id, .. } => {
            format!("/devices/{}/requests", device_id)
        }
        NotificationEvent::RequestApproved { request_id, .. }
        | NotificationEvent::RequestRejected { request_id, .. } => {
            format!("/device-requests/{}", request_id)
        }
        NotificationEvent::DeviceModerated { device_id, .. } => format!("/devices/{}", device_id),
    };
    Some(format!("{}{}", base, path))
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// [`Notifier`] that sends each event as an email.
#[derive(Clone)]
pub struct EmailNotifier {
    config: Arc<EmailConfig>,
    client: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn deliver(&self, message: EmailMessage) -> Result<(), EmailError> {
        match self.config.provider.as_str() {
            "console" => {
                self.send_console(&message);
                Ok(())
            }
            "sendgrid" => self.send_sendgrid(&message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(EmailError::NotConfigured)
            }
        }
    }

    /// Console provider - logs the email instead of sending it.
    fn send_console(&self, message: &EmailMessage) {
        info!(
            to = %message.to,
            to_name = ?message.to_name,
            subject = %message.subject,
            from = %self.config.sender_email,
            "Email (console provider)"
        );
        debug!(body_text = %message.body_text, "Email body (plain text)");
    }

    async fn send_sendgrid(&self, message: &EmailMessage) -> Result<(), EmailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let mut recipient = serde_json::json!({ "email": message.to });
        if let Some(name) = &message.to_name {
            recipient["name"] = serde_json::json!(name);
        }

        let body = serde_json::json!({
            "personalizations": [{ "to": [recipient] }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.body_text },
                { "type": "text/html", "value": message.body_html }
            ]
        });

        let response = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SendGrid request failed: {}", e)))?;

        if response.status().is_success() {
            info!(to = %message.to, subject = %message.subject, "Email sent via SendGrid");
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            Err(EmailError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &Contact, event: &NotificationEvent) -> NotificationResult {
        if !self.config.enabled {
            debug!(
                recipient = %recipient.user_id,
                event = event.kind(),
                "Email disabled, skipping notification"
            );
            return NotificationResult::Skipped;
        }

        let message = EmailMessage::render(recipient, event, &self.config.base_url);
        match self.deliver(message).await {
            Ok(()) => NotificationResult::Sent,
            Err(e) => {
                counter!("notifications_failed_total", "event" => event.kind()).increment(1);
                NotificationResult::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::ModerationStatus;
    use uuid::Uuid;

    fn test_config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            provider: "console".to_string(),
            sendgrid_api_key: String::new(),
            sender_email: "test@example.com".to_string(),
            sender_name: "Test".to_string(),
            base_url: "https://app.example.com/".to_string(),
        }
    }

    fn contact() -> Contact {
        Contact {
            user_id: Uuid::new_v4(),
            name: "Dana".to_string(),
            email: "dana@example.com".to_string(),
        }
    }

    fn rejected_event() -> NotificationEvent {
        NotificationEvent::RequestRejected {
            request_id: Uuid::nil(),
            device_id: Uuid::new_v4(),
            device_title: "Old <ThinkPad>".to_string(),
            reason: Some("Already promised".to_string()),
        }
    }

    #[test]
    fn test_render_plain_text_and_html() {
        let message = EmailMessage::render(&contact(), &rejected_event(), "https://app.example.com/");

        assert_eq!(message.to, "dana@example.com");
        assert_eq!(message.to_name.as_deref(), Some("Dana"));
        assert!(message.subject.contains("Old <ThinkPad>"));
        assert!(message.body_text.starts_with("Hi Dana,"));
        assert!(message.body_text.contains("Reason: Already promised"));
        assert!(message
            .body_text
            .contains(&format!("https://app.example.com/device-requests/{}", Uuid::nil())));
        assert!(message.body_html.contains("Old &lt;ThinkPad&gt;"));
        assert!(!message.body_html.contains("<ThinkPad>"));
    }

    #[test]
    fn test_render_without_base_url_has_no_link() {
        let event = NotificationEvent::DeviceModerated {
            device_id: Uuid::new_v4(),
            device_title: "iPad".to_string(),
            status: ModerationStatus::Approved,
            reason: None,
        };
        let message = EmailMessage::render(&contact(), &event, "");
        assert!(!message.body_text.contains("View it here"));
        assert!(!message.body_html.contains("<a href"));
    }

    #[tokio::test]
    async fn test_console_provider_sends() {
        let notifier = EmailNotifier::new(test_config());
        assert!(notifier.is_enabled());
        let result = notifier.send(&contact(), &rejected_event()).await;
        assert_eq!(result, NotificationResult::Sent);
    }

    #[tokio::test]
    async fn test_disabled_skips() {
        let mut config = test_config();
        config.enabled = false;
        let notifier = EmailNotifier::new(config);
        let result = notifier.send(&contact(), &rejected_event()).await;
        assert_eq!(result, NotificationResult::Skipped);
    }

    #[tokio::test]
    async fn test_sendgrid_without_key_fails() {
        let mut config = test_config();
        config.provider = "sendgrid".to_string();
        let notifier = EmailNotifier::new(config);
        let result = notifier.send(&contact(), &rejected_event()).await;
        assert!(matches!(result, NotificationResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_unknown_provider_fails() {
        let mut config = test_config();
        config.provider = "carrier-pigeon".to_string();
        let notifier = EmailNotifier::new(config);
        let result = notifier.send(&contact(), &rejected_event()).await;
        assert!(matches!(result, NotificationResult::Failed(_)));
    }
}
