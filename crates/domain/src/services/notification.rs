//! Notifications about marketplace events.
//!
//! Delivery is fire-and-forget: [`NotificationDispatcher::dispatch`] spawns a
//! task and returns immediately, and a failed send is logged and dropped.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::{Contact, ModerationStatus};
use crate::stores::UserDirectory;

/// Something a user should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    #[serde(rename_all = "camelCase")]
    NewDeviceRequest {
        request_id: Uuid,
        device_id: Uuid,
        device_title: String,
        requester_id: Uuid,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestApproved {
        request_id: Uuid,
        device_id: Uuid,
        device_title: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestRejected {
        request_id: Uuid,
        device_id: Uuid,
        device_title: String,
        reason: Option<String>,
    },
    /// Tells the donor to arrange the handoff of an approved request.
    #[serde(rename_all = "camelCase")]
    HandoffRequired {
        request_id: Uuid,
        device_id: Uuid,
        device_title: String,
        requester_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    DeviceModerated {
        device_id: Uuid,
        device_title: String,
        status: ModerationStatus,
        reason: Option<String>,
    },
}

impl NotificationEvent {
    /// Stable name used in logs and templates.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::NewDeviceRequest { .. } => "new_device_request",
            NotificationEvent::RequestApproved { .. } => "request_approved",
            NotificationEvent::RequestRejected { .. } => "request_rejected",
            NotificationEvent::HandoffRequired { .. } => "handoff_required",
            NotificationEvent::DeviceModerated { .. } => "device_moderated",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::NewDeviceRequest { device_title, .. } => {
                format!("New request for \"{}\"", device_title)
            }
            NotificationEvent::RequestApproved { device_title, .. } => {
                format!("Your request for \"{}\" was approved", device_title)
            }
            NotificationEvent::RequestRejected { device_title, .. } => {
                format!("Your request for \"{}\" was not approved", device_title)
            }
            NotificationEvent::HandoffRequired { device_title, .. } => {
                format!("Please arrange the handoff of \"{}\"", device_title)
            }
            NotificationEvent::DeviceModerated {
                device_title,
                status,
                ..
            } => format!("Your device \"{}\" was {}", device_title, status),
        }
    }

    pub fn body(&self) -> String {
        match self {
            NotificationEvent::NewDeviceRequest {
                device_title,
                message,
                ..
            } => format!(
                "Someone has asked for \"{}\".\n\nTheir message:\n{}",
                device_title, message
            ),
            NotificationEvent::RequestApproved { device_title, .. } => format!(
                "Good news! Your request for \"{}\" has been approved. The donor will be in touch to arrange the handoff.",
                device_title
            ),
            NotificationEvent::RequestRejected {
                device_title,
                reason,
                ..
            } => match reason {
                Some(reason) => format!(
                    "Your request for \"{}\" was not approved.\n\nReason: {}",
                    device_title, reason
                ),
                None => format!("Your request for \"{}\" was not approved.", device_title),
            },
            NotificationEvent::HandoffRequired { device_title, .. } => format!(
                "A request for \"{}\" has been approved. Please contact the requester to arrange the handoff, then mark the request completed.",
                device_title
            ),
            NotificationEvent::DeviceModerated {
                device_title,
                status,
                reason,
                ..
            } => match (status, reason) {
                (ModerationStatus::Rejected, Some(reason)) => format!(
                    "Your device \"{}\" was rejected by a moderator.\n\nReason: {}",
                    device_title, reason
                ),
                _ => format!("Your device \"{}\" is now {}.", device_title, status),
            },
        }
    }
}

/// Who should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    User(Uuid),
    Admins,
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Notification was sent successfully.
    Sent,
    /// Nothing was sent, e.g. the provider is disabled.
    Skipped,
    /// Sending failed. Never surfaced to the caller of the triggering operation.
    Failed(String),
}

/// Delivers one event to one recipient.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &Contact, event: &NotificationEvent) -> NotificationResult;
}

/// Mock notifier for development and testing.
///
/// Records every delivery instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<(Contact, NotificationEvent)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock notifier that fails every send.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Deliveries recorded so far.
    pub fn sent(&self) -> Vec<(Contact, NotificationEvent)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, recipient: &Contact, event: &NotificationEvent) -> NotificationResult {
        if self.simulate_failure {
            tracing::warn!(
                recipient = %recipient.user_id,
                event = event.kind(),
                "Mock notifier simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            recipient = %recipient.user_id,
            event = event.kind(),
            "Mock: Would send notification"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.clone(), event.clone()));
        }
        NotificationResult::Sent
    }
}

/// Resolves audiences to contacts and sends in the background.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserDirectory>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, users: Arc<dyn UserDirectory>) -> Self {
        Self { notifier, users }
    }

    /// Sends `event` to every member of `audiences`, each user at most once.
    ///
    /// Returns immediately. Outside a tokio runtime the event is dropped.
    pub fn dispatch(&self, audiences: Vec<Audience>, event: NotificationEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(event = event.kind(), "No runtime, dropping notification");
                return;
            }
        };

        let notifier = Arc::clone(&self.notifier);
        let users = Arc::clone(&self.users);
        handle.spawn(async move {
            let recipients = resolve(users.as_ref(), &audiences).await;
            for recipient in recipients {
                match notifier.send(&recipient, &event).await {
                    NotificationResult::Failed(reason) => tracing::warn!(
                        recipient = %recipient.user_id,
                        event = event.kind(),
                        reason = %reason,
                        "Failed to send notification"
                    ),
                    NotificationResult::Skipped => tracing::debug!(
                        recipient = %recipient.user_id,
                        event = event.kind(),
                        "Notification skipped"
                    ),
                    NotificationResult::Sent => {}
                }
            }
        });
    }
}

async fn resolve(users: &dyn UserDirectory, audiences: &[Audience]) -> Vec<Contact> {
    let mut seen = HashSet::new();
    let mut contacts = Vec::new();

    for audience in audiences {
        let resolved = match audience {
            Audience::User(user_id) => users.find_contact(*user_id).await.map(|c| {
                if c.is_none() {
                    tracing::debug!(user_id = %user_id, "No contact for notification recipient");
                }
                c.into_iter().collect::<Vec<_>>()
            }),
            Audience::Admins => users.list_admin_contacts().await,
        };

        match resolved {
            Ok(found) => {
                for contact in found {
                    if seen.insert(contact.user_id) {
                        contacts.push(contact);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to resolve notification recipients"),
        }
    }

    contacts
}
