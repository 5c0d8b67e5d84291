use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::attachments::{AttachmentPolicy, AttachmentViolation};
use super::clock::{Clock, SystemClock};
use super::descriptor::DomainDescriptor;
use super::domain::{
    Actor, AdminTransition, Attachment, FileMap, Patient, PatientId, PatientRegistration,
    PatientStatus, RequestDetails, RequestFilter, RequestId, RequestStatus, ServiceDomain,
    ServiceReceived, ServiceRequest,
};
use super::lifecycle::{self, LifecycleViolation};
use super::notify::{Mailer, Notification, NotificationSink, NotifyError, StatusEmail};
use super::store::{StoreError, TransitionCommit, WorkflowStore};
use super::templates;
use crate::config::WorkflowConfig;

/// Patient-facing creation payload.
#[derive(Debug, Clone)]
pub struct RequestSubmission {
    pub patient_id: PatientId,
    pub details: RequestDetails,
    pub files: FileMap,
}

/// Patient-facing update of an existing request.
#[derive(Debug, Clone)]
pub struct Resubmission {
    pub patient_id: PatientId,
    pub files: FileMap,
    pub note: Option<String>,
}

/// Result of an admin status change, including best-effort side effects.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub record: ServiceRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_entry: Option<ServiceReceived>,
    pub notified: bool,
    pub emailed: bool,
}

/// The reviewable-request engine shared by every service domain.
pub struct ReviewableRequestService<S, N, M> {
    store: Arc<S>,
    notifications: Arc<N>,
    mailer: Arc<M>,
    clock: Arc<dyn Clock>,
    intake_policy: AttachmentPolicy,
    resubmission_policy: AttachmentPolicy,
    mail_from: String,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id(domain: ServiceDomain) -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("{}-{id:06}", domain.id_prefix()))
}

const DEFAULT_RESUBMISSION_NOTE: &str = "Patient resubmitted updated documents";
const MAX_WRITE_ATTEMPTS: u32 = 3;

impl<S, N, M> ReviewableRequestService<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifications: Arc<N>,
        mailer: Arc<M>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            mailer,
            clock: Arc::new(SystemClock),
            intake_policy: AttachmentPolicy::with_max_megabytes(config.max_attachment_mb),
            resubmission_policy: AttachmentPolicy::with_max_megabytes(config.max_resubmission_mb),
            mail_from: config.mail_from,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Add or refresh a patient record supplied by the registration module.
    /// New patients start at `Pending`; a refresh never changes the status.
    pub fn register_patient(
        &self,
        patient_id: PatientId,
        registration: PatientRegistration,
    ) -> Result<Patient, WorkflowError> {
        let full_name = registration.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(WorkflowError::Validation("full_name is required".to_string()));
        }
        let email = registration
            .email
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty());

        let stored = self.store.upsert_patient(Patient {
            id: patient_id,
            full_name,
            email,
            status: PatientStatus::Pending,
        })?;
        info!(
            patient_id = %stored.id,
            status = stored.status.label(),
            has_email = stored.email.is_some(),
            "patient registered"
        );
        Ok(stored)
    }

    /// Create a new request at `Pending`.
    pub fn create(
        &self,
        domain: ServiceDomain,
        submission: RequestSubmission,
    ) -> Result<ServiceRequest, WorkflowError> {
        let RequestSubmission {
            patient_id,
            details,
            files,
        } = submission;

        if details.domain() != domain {
            return Err(WorkflowError::Validation(format!(
                "{} details cannot be submitted as a {} request",
                details.domain().label(),
                domain.label()
            )));
        }
        if let Some(field) = details.missing_field() {
            return Err(WorkflowError::Validation(format!("{field} is required")));
        }

        self.store
            .fetch_patient(&patient_id)?
            .ok_or_else(|| WorkflowError::PatientNotFound(patient_id.clone()))?;

        self.intake_policy.validate_all(&files)?;

        if let Some(existing) = self.store.active_request(&patient_id, domain)? {
            return Err(WorkflowError::ActiveRequestExists {
                domain,
                existing: existing.id,
            });
        }

        let now = self.clock.now();
        let attachments = files
            .into_iter()
            .map(|(doc_type, upload)| Attachment::from_upload(doc_type, upload, now))
            .collect();

        let record = ServiceRequest {
            id: next_request_id(domain),
            domain,
            subject_id: patient_id,
            status: RequestStatus::Pending,
            details,
            has_patient_response: false,
            response_description: None,
            remarks: None,
            attachments,
            created_at: now,
            updated_at: now,
            date_approved: None,
            date_completed: None,
            revision: 0,
        };

        let stored = self.store.insert_request(record)?;
        info!(
            request_id = %stored.id,
            patient_id = %stored.subject_id,
            domain = domain.slug(),
            attachments = stored.attachments.len(),
            "service request submitted"
        );
        Ok(stored)
    }

    /// Patient resubmission: replaces attachments by tag and closes the gate
    /// until an admin reviews the request.
    pub fn resubmit(
        &self,
        request_id: &RequestId,
        resubmission: Resubmission,
    ) -> Result<ServiceRequest, WorkflowError> {
        let Resubmission {
            patient_id,
            files,
            note,
        } = resubmission;
        let note = note
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        let record = self.write_current(request_id, |mut record| {
            if record.subject_id != patient_id {
                return Err(WorkflowError::Forbidden(request_id.clone()));
            }

            let descriptor = DomainDescriptor::of(record.domain);
            lifecycle::check_resubmission(descriptor, &record)?;

            if files.is_empty() && note.is_none() {
                return Err(WorkflowError::Validation(
                    "resubmission requires at least one file or a note".to_string(),
                ));
            }
            self.resubmission_policy.validate_all(&files)?;

            let now = self.clock.now();
            record.attachments =
                lifecycle::replace_attachments(record.attachments, files.clone(), now);
            record.has_patient_response = true;
            record.status = RequestStatus::Pending;
            record.response_description = Some(
                note.clone()
                    .unwrap_or_else(|| DEFAULT_RESUBMISSION_NOTE.to_string()),
            );
            record.updated_at = now;

            Ok(self.store.save_request(record)?)
        })?;

        info!(
            request_id = %record.id,
            patient_id = %record.subject_id,
            files = files.len(),
            "patient resubmission recorded"
        );
        Ok(record)
    }

    /// Admin status change with ledger, patient-status and notification side effects.
    pub fn transition(
        &self,
        request_id: &RequestId,
        command: AdminTransition,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let to = command.status;
        let (record, ledger_entry, from) = self.write_current(request_id, |mut record| {
            let descriptor = DomainDescriptor::of(record.domain);
            let from = record.status;

            lifecycle::check_admin_transition(descriptor, from, to, command.force)?;

            let now = self.clock.now();
            let today = now.date_naive();

            record.status = to;
            record.has_patient_response = false;
            record.response_description = None;
            if let Some(remarks) = &command.remarks {
                record.remarks = Some(remarks.clone());
            }
            if to == RequestStatus::Pending {
                record.date_approved = None;
                record.date_completed = None;
            }
            if to == descriptor.approval && from != to {
                record.date_approved = Some(today);
            }
            if to == descriptor.completion && from != to {
                record.date_completed = Some(today);
            }
            record.updated_at = now;

            let reached_success = descriptor.ledger_on == Some(to) && from != to;
            let ledger_entry = reached_success.then(|| ServiceReceived {
                patient_id: record.subject_id.clone(),
                request_id: record.id.clone(),
                service_type: record.domain.label().to_string(),
                date_completed: today,
            });
            let patient_status = (reached_success && descriptor.validates_patient)
                .then(|| (record.subject_id.clone(), PatientStatus::Validated));

            let stored = self.store.commit_transition(TransitionCommit {
                request: record,
                ledger_entry: ledger_entry.clone(),
                patient_status,
            })?;
            Ok((stored, ledger_entry, from))
        })?;

        info!(
            request_id = %record.id,
            domain = record.domain.slug(),
            from = from.key(),
            to = to.key(),
            forced = command.force,
            "request status updated"
        );

        let notified = self.dispatch_notification(&record);
        let emailed = self.dispatch_email(&record);

        Ok(TransitionOutcome {
            record,
            ledger_entry,
            notified,
            emailed,
        })
    }

    /// Delete a request that has not progressed past the cancellable statuses.
    pub fn cancel(
        &self,
        request_id: &RequestId,
        actor: &Actor,
    ) -> Result<ServiceRequest, WorkflowError> {
        let removed = self.write_current(request_id, |record| {
            if let Actor::Patient(patient_id) = actor {
                if &record.subject_id != patient_id {
                    return Err(WorkflowError::Forbidden(request_id.clone()));
                }
            }

            lifecycle::check_cancellation(DomainDescriptor::of(record.domain), &record)?;

            Ok(self.store.delete_request(&record.id, record.revision)?)
        })?;

        info!(
            request_id = %removed.id,
            domain = removed.domain.slug(),
            by_admin = matches!(actor, Actor::Admin(_)),
            attachments = removed.attachments.len(),
            "service request cancelled"
        );
        Ok(removed)
    }

    pub fn get(&self, request_id: &RequestId) -> Result<ServiceRequest, WorkflowError> {
        self.fetch(request_id)
    }

    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, WorkflowError> {
        Ok(self.store.list_requests(filter)?)
    }

    /// Services the patient has completed, oldest first.
    pub fn services_received(
        &self,
        patient_id: &PatientId,
    ) -> Result<Vec<ServiceReceived>, WorkflowError> {
        self.store
            .fetch_patient(patient_id)?
            .ok_or_else(|| WorkflowError::PatientNotFound(patient_id.clone()))?;
        Ok(self.store.ledger_for(patient_id)?)
    }

    fn fetch(&self, request_id: &RequestId) -> Result<ServiceRequest, WorkflowError> {
        self.store
            .fetch_request(request_id)?
            .ok_or_else(|| WorkflowError::RequestNotFound(request_id.clone()))
    }

    /// Run `apply` against the latest stored copy of a request. The store refuses
    /// writes made from an outdated copy; in that case the record is read again and
    /// every check reruns, up to `MAX_WRITE_ATTEMPTS` times.
    fn write_current<T>(
        &self,
        request_id: &RequestId,
        mut apply: impl FnMut(ServiceRequest) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let mut attempt = 1;
        loop {
            let record = self.fetch(request_id)?;
            match apply(record) {
                Err(WorkflowError::Store(StoreError::Stale(_)))
                    if attempt < MAX_WRITE_ATTEMPTS =>
                {
                    debug!(
                        request_id = %request_id,
                        attempt,
                        "request changed while writing; retrying"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    fn dispatch_notification(&self, record: &ServiceRequest) -> bool {
        let (title, message) = templates::status_notification(record);
        let notification = Notification {
            recipients: vec![record.subject_id.clone()],
            request_id: record.id.clone(),
            title,
            message,
        };

        match self.notifications.notify(notification) {
            Ok(()) => true,
            Err(err) => {
                warn!(request_id = %record.id, error = %err, "status notification not delivered");
                false
            }
        }
    }

    fn dispatch_email(&self, record: &ServiceRequest) -> bool {
        match self.send_status_email(record) {
            Ok(()) => true,
            Err(err) => {
                warn!(request_id = %record.id, error = %err, "status e-mail not sent");
                false
            }
        }
    }

    fn send_status_email(&self, record: &ServiceRequest) -> Result<(), NotifyError> {
        let patient = self
            .store
            .fetch_patient(&record.subject_id)
            .map_err(|err| NotifyError::Transport(err.to_string()))?
            .ok_or(NotifyError::NoRecipient)?;
        let to = patient
            .email
            .clone()
            .filter(|address| !address.trim().is_empty())
            .ok_or(NotifyError::NoRecipient)?;

        let (subject, body) = templates::status_email(record, &patient);
        self.mailer.send(StatusEmail {
            to,
            from: self.mail_from.clone(),
            subject,
            body,
        })
    }
}

/// Error raised by the request workflow service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Attachment(#[from] AttachmentViolation),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleViolation),
    #[error("patient already has an active {} request ({existing})", .domain.label())]
    ActiveRequestExists {
        domain: ServiceDomain,
        existing: RequestId,
    },
    #[error("request {0} does not belong to the requesting patient")]
    Forbidden(RequestId),
    #[error("request {0} not found")]
    RequestNotFound(RequestId),
    #[error("patient {0} not found")]
    PatientNotFound(PatientId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::ActiveRequestExists { domain, existing } => {
                Self::ActiveRequestExists { domain, existing }
            }
            other => Self::Store(other),
        }
    }
}
