use careline::workflows::requests::{
    Mailer, Notification, NotificationSink, NotifyError, Patient, PatientId, PatientStatus,
    StatusEmail,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Patient notification feed kept in process memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationInbox {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for InMemoryNotificationInbox {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut guard = self
            .delivered
            .lock()
            .map_err(|_| NotifyError::Transport("inbox mutex poisoned".to_string()))?;
        info!(
            request_id = %notification.request_id,
            recipients = notification.recipients.len(),
            title = %notification.title,
            "notification queued"
        );
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationInbox {
    pub(crate) fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Mailer that records outgoing e-mail in the log instead of contacting a relay.
#[derive(Default, Clone, Copy)]
pub(crate) struct LoggingMailer;

impl Mailer for LoggingMailer {
    fn send(&self, email: StatusEmail) -> Result<(), NotifyError> {
        info!(
            to = %email.to,
            from = %email.from,
            subject = %email.subject,
            "status e-mail dispatched"
        );
        Ok(())
    }
}

pub(crate) fn demo_patients() -> Vec<Patient> {
    vec![
        Patient {
            id: PatientId("pt-0001".to_string()),
            full_name: "Maria Santos".to_string(),
            email: Some("maria.santos@example.org".to_string()),
            status: PatientStatus::Pending,
        },
        Patient {
            id: PatientId("pt-0002".to_string()),
            full_name: "Ana Reyes".to_string(),
            email: None,
            status: PatientStatus::Pending,
        },
    ]
}
