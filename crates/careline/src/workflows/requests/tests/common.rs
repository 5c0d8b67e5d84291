use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::workflows::requests::clock::FixedClock;
use crate::workflows::requests::domain::{
    AttachmentUpload, DocType, FileMap, HomeVisitDetails, Patient, PatientId, PatientStatus,
    RequestDetails, RequestFilter, RequestId, ScreeningDetails, ServiceDomain, ServiceReceived,
    ServiceRequest, TreatmentDetails,
};
use crate::workflows::requests::notify::{
    Mailer, Notification, NotificationSink, NotifyError, StatusEmail,
};
use crate::workflows::requests::service::{RequestSubmission, ReviewableRequestService};
use crate::workflows::requests::store::{
    InMemoryWorkflowStore, StoreError, TransitionCommit, WorkflowStore,
};

pub(super) const PATIENT: &str = "pt-1001";
pub(super) const OTHER_PATIENT: &str = "pt-2002";

pub(super) type MemoryService =
    ReviewableRequestService<InMemoryWorkflowStore, MemoryInbox, MemoryMailer>;
pub(super) type InterleavedService =
    ReviewableRequestService<InterleavingStore, MemoryInbox, MemoryMailer>;

pub(super) fn patient_id() -> PatientId {
    PatientId(PATIENT.to_string())
}

pub(super) fn patient(id: &str, email: Option<&str>) -> Patient {
    Patient {
        id: PatientId(id.to_string()),
        full_name: format!("Maria {id}"),
        email: email.map(str::to_string),
        status: PatientStatus::Pending,
    }
}

pub(super) fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
            .single()
            .expect("valid timestamp"),
    ))
}

pub(super) fn screening_details() -> RequestDetails {
    RequestDetails::IndividualScreening(ScreeningDetails {
        procedure_name: "Mammogram".to_string(),
        procedure_details: "Bilateral screening mammogram".to_string(),
        cancer_site: "Breast".to_string(),
        preferred_clinic: Some("City Health Office".to_string()),
    })
}

pub(super) fn treatment_details() -> RequestDetails {
    RequestDetails::CancerTreatment(TreatmentDetails {
        service_type: "Chemotherapy".to_string(),
        diagnosis: "Stage II breast carcinoma".to_string(),
        treatment_date: None,
    })
}

pub(super) fn home_visit_details() -> RequestDetails {
    RequestDetails::HomeVisit(HomeVisitDetails {
        purpose: "Wound care check".to_string(),
        address: "12 Mabini St.".to_string(),
        preferred_date: None,
    })
}

pub(super) fn pdf(name: &str, size: usize) -> AttachmentUpload {
    AttachmentUpload::new(name, "application/pdf", vec![b'%'; size])
}

pub(super) fn files(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(doc_type, name)| (DocType::new(*doc_type), pdf(name, 2048)))
        .collect()
}

pub(super) fn submission(details: RequestDetails) -> RequestSubmission {
    RequestSubmission {
        patient_id: patient_id(),
        details,
        files: files(&[("referral", "referral.pdf"), ("valid_id", "id.pdf")]),
    }
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryWorkflowStore>,
    Arc<MemoryInbox>,
    Arc<MemoryMailer>,
) {
    let store = Arc::new(InMemoryWorkflowStore::with_patients([
        patient(PATIENT, Some("maria@example.org")),
        patient(OTHER_PATIENT, None),
    ]));
    let inbox = Arc::new(MemoryInbox::default());
    let mailer = Arc::new(MemoryMailer::default());
    let service = ReviewableRequestService::new(
        store.clone(),
        inbox.clone(),
        mailer.clone(),
        WorkflowConfig::default(),
    )
    .with_clock(fixed_clock());
    (service, store, inbox, mailer)
}

/// A service over an [`InterleavingStore`] plus a second service sharing the same
/// records, used to run a competing operation between a read and its write.
pub(super) fn build_interleaved() -> (
    InterleavedService,
    Arc<InterleavingStore>,
    Arc<MemoryService>,
) {
    let records = InMemoryWorkflowStore::with_patients([
        patient(PATIENT, Some("maria@example.org")),
        patient(OTHER_PATIENT, None),
    ]);
    let store = Arc::new(InterleavingStore::new(records.clone()));
    let service = ReviewableRequestService::new(
        store.clone(),
        Arc::new(MemoryInbox::default()),
        Arc::new(MemoryMailer::default()),
        WorkflowConfig::default(),
    )
    .with_clock(fixed_clock());
    let rival = ReviewableRequestService::new(
        Arc::new(records),
        Arc::new(MemoryInbox::default()),
        Arc::new(MemoryMailer::default()),
        WorkflowConfig::default(),
    )
    .with_clock(fixed_clock());
    (service, store, Arc::new(rival))
}

pub(super) fn create(service: &MemoryService, details: RequestDetails) -> ServiceRequest {
    let domain = details.domain();
    service
        .create(domain, submission(details))
        .expect("creation succeeds")
}

#[derive(Default)]
pub(super) struct MemoryInbox {
    delivered: Mutex<Vec<Notification>>,
}

impl MemoryInbox {
    pub(super) fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().expect("inbox mutex poisoned").clone()
    }
}

impl NotificationSink for MemoryInbox {
    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.delivered
            .lock()
            .expect("inbox mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryMailer {
    sent: Mutex<Vec<StatusEmail>>,
}

impl MemoryMailer {
    pub(super) fn sent(&self) -> Vec<StatusEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, email: StatusEmail) -> Result<(), NotifyError> {
        self.sent.lock().expect("mailer mutex poisoned").push(email);
        Ok(())
    }
}

pub(super) struct OfflineMailer;

impl Mailer for OfflineMailer {
    fn send(&self, _email: StatusEmail) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused connection".to_string()))
    }
}

pub(super) struct OfflineInbox;

impl NotificationSink for OfflineInbox {
    fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("notification queue offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("database offline".to_string()))
}

impl WorkflowStore for UnavailableStore {
    fn insert_request(&self, _record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        offline()
    }

    fn fetch_request(&self, _id: &RequestId) -> Result<Option<ServiceRequest>, StoreError> {
        offline()
    }

    fn save_request(&self, _record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        offline()
    }

    fn commit_transition(&self, _commit: TransitionCommit) -> Result<ServiceRequest, StoreError> {
        offline()
    }

    fn delete_request(
        &self,
        _id: &RequestId,
        _expected_revision: u64,
    ) -> Result<ServiceRequest, StoreError> {
        offline()
    }

    fn active_request(
        &self,
        _patient: &PatientId,
        _domain: ServiceDomain,
    ) -> Result<Option<ServiceRequest>, StoreError> {
        offline()
    }

    fn list_requests(&self, _filter: &RequestFilter) -> Result<Vec<ServiceRequest>, StoreError> {
        offline()
    }

    fn fetch_patient(&self, _id: &PatientId) -> Result<Option<Patient>, StoreError> {
        offline()
    }

    fn upsert_patient(&self, _patient: Patient) -> Result<Patient, StoreError> {
        offline()
    }

    fn ledger_for(&self, _patient: &PatientId) -> Result<Vec<ServiceReceived>, StoreError> {
        offline()
    }

    fn ledger(&self) -> Result<Vec<ServiceReceived>, StoreError> {
        offline()
    }
}

type WriteHook = Box<dyn FnOnce() + Send>;

/// Delegates to an in-memory store but runs a one-shot hook right before the
/// next request write.
pub(super) struct InterleavingStore {
    inner: InMemoryWorkflowStore,
    before_write: Mutex<Option<WriteHook>>,
}

impl InterleavingStore {
    pub(super) fn new(inner: InMemoryWorkflowStore) -> Self {
        Self {
            inner,
            before_write: Mutex::new(None),
        }
    }

    pub(super) fn before_next_write(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_write.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    fn run_hook(&self) {
        let hook = self.before_write.lock().expect("hook mutex poisoned").take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl WorkflowStore for InterleavingStore {
    fn insert_request(&self, record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        self.inner.insert_request(record)
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError> {
        self.inner.fetch_request(id)
    }

    fn save_request(&self, record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        self.run_hook();
        self.inner.save_request(record)
    }

    fn commit_transition(&self, commit: TransitionCommit) -> Result<ServiceRequest, StoreError> {
        self.run_hook();
        self.inner.commit_transition(commit)
    }

    fn delete_request(
        &self,
        id: &RequestId,
        expected_revision: u64,
    ) -> Result<ServiceRequest, StoreError> {
        self.run_hook();
        self.inner.delete_request(id, expected_revision)
    }

    fn active_request(
        &self,
        patient: &PatientId,
        domain: ServiceDomain,
    ) -> Result<Option<ServiceRequest>, StoreError> {
        self.inner.active_request(patient, domain)
    }

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, StoreError> {
        self.inner.list_requests(filter)
    }

    fn fetch_patient(&self, id: &PatientId) -> Result<Option<Patient>, StoreError> {
        self.inner.fetch_patient(id)
    }

    fn upsert_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        self.inner.upsert_patient(patient)
    }

    fn ledger_for(&self, patient: &PatientId) -> Result<Vec<ServiceReceived>, StoreError> {
        self.inner.ledger_for(patient)
    }

    fn ledger(&self) -> Result<Vec<ServiceReceived>, StoreError> {
        self.inner.ledger()
    }
}

pub(super) const BOUNDARY: &str = "careline-test-boundary";

/// A multipart part: `(name, Some((file_name, content_type)), body)`; text fields carry `None`.
pub(super) type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

pub(super) fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((file_name, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub(super) fn multipart_request(
    uri: &str,
    identity: (&str, &str),
    parts: &[Part<'_>],
) -> Request<Body> {
    Request::post(uri)
        .header(identity.0, identity.1)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
