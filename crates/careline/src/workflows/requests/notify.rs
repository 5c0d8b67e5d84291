use serde::{Deserialize, Serialize};

use super::domain::{PatientId, RequestId};

/// In-app notification delivered to patient accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipients: Vec<PatientId>,
    pub request_id: RequestId,
    pub title: String,
    pub message: String,
}

/// Status-change e-mail handed to the delivery transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// Trait describing the in-app notification hook.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Trait describing the outbound e-mail hook.
pub trait Mailer: Send + Sync {
    fn send(&self, email: StatusEmail) -> Result<(), NotifyError>;
}

/// Side-effect dispatch error. Never aborts the state change that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("recipient has no deliverable address")]
    NoRecipient,
}
