//! End-to-end behavior of the reviewable request engine through its public facade
//! and HTTP router, across every service domain.

mod common {
    use std::sync::{Arc, Mutex};

    use careline::config::WorkflowConfig;
    use careline::workflows::requests::{
        AttachmentUpload, DocType, HomeVisitDetails, HormonalDetails, InMemoryWorkflowStore,
        Mailer, MedicationDetails, Notification, NotificationSink, NotifyError, Patient,
        PatientId, PatientStatus, PostTreatmentDetails, RequestDetails, ReviewableRequestService,
        ScreeningDetails, ServiceDomain, StatusEmail, TreatmentDetails,
    };

    pub(super) const PATIENT: &str = "pt-4401";

    pub(super) type Service =
        ReviewableRequestService<InMemoryWorkflowStore, RecordingInbox, RecordingMailer>;

    #[derive(Default)]
    pub(super) struct RecordingInbox {
        pub(super) delivered: Mutex<Vec<Notification>>,
    }

    impl NotificationSink for RecordingInbox {
        fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
            self.delivered
                .lock()
                .expect("inbox mutex poisoned")
                .push(notification);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(super) struct RecordingMailer {
        pub(super) sent: Mutex<Vec<StatusEmail>>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, email: StatusEmail) -> Result<(), NotifyError> {
            self.sent.lock().expect("mailer mutex poisoned").push(email);
            Ok(())
        }
    }

    pub(super) fn patient_id() -> PatientId {
        PatientId(PATIENT.to_string())
    }

    pub(super) fn build() -> (Arc<Service>, Arc<InMemoryWorkflowStore>, Arc<RecordingMailer>) {
        let store = Arc::new(InMemoryWorkflowStore::with_patients([Patient {
            id: patient_id(),
            full_name: "Lorna Cruz".to_string(),
            email: Some("lorna@example.org".to_string()),
            status: PatientStatus::Pending,
        }]));
        let mailer = Arc::new(RecordingMailer::default());
        let service = Arc::new(ReviewableRequestService::new(
            store.clone(),
            Arc::new(RecordingInbox::default()),
            mailer.clone(),
            WorkflowConfig::default(),
        ));
        (service, store, mailer)
    }

    pub(super) fn details_for(domain: ServiceDomain) -> RequestDetails {
        match domain {
            ServiceDomain::IndividualScreening => {
                RequestDetails::IndividualScreening(ScreeningDetails {
                    procedure_name: "Pap smear".to_string(),
                    procedure_details: "Routine cervical screening".to_string(),
                    cancer_site: "Cervix".to_string(),
                    preferred_clinic: None,
                })
            }
            ServiceDomain::CancerTreatment => RequestDetails::CancerTreatment(TreatmentDetails {
                service_type: "Radiotherapy".to_string(),
                diagnosis: "Cervical carcinoma".to_string(),
                treatment_date: None,
            }),
            ServiceDomain::PreCancerousMeds => {
                RequestDetails::PreCancerousMeds(MedicationDetails {
                    medicine_type: "Thermal ablation".to_string(),
                    dispensing_lgu: "Quezon City".to_string(),
                    date_of_use: None,
                })
            }
            ServiceDomain::PostTreatment => RequestDetails::PostTreatment(PostTreatmentDetails {
                laboratory_test: "CBC".to_string(),
                lab_date: None,
            }),
            ServiceDomain::HormonalReplacement => {
                RequestDetails::HormonalReplacement(HormonalDetails {
                    medicines_requested: vec!["Tamoxifen".to_string()],
                })
            }
            ServiceDomain::HomeVisit => RequestDetails::HomeVisit(HomeVisitDetails {
                purpose: "Palliative check-in".to_string(),
                address: "45 Rizal Ave.".to_string(),
                preferred_date: None,
            }),
        }
    }

    pub(super) fn referral() -> (DocType, AttachmentUpload) {
        (
            DocType::new("Referral"),
            AttachmentUpload::new("referral.pdf", "application/pdf", b"%PDF-1.7".to_vec()),
        )
    }
}

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use careline::workflows::requests::{
    request_router, AdminTransition, DomainDescriptor, PatientStatus, RequestStatus,
    RequestSubmission, ServiceDomain, WorkflowError, WorkflowStore,
};
use common::*;
use tower::ServiceExt;

#[test]
fn every_domain_reaches_its_completion_status() {
    let (service, store, mailer) = build();

    for domain in ServiceDomain::ordered() {
        let descriptor = DomainDescriptor::of(domain);
        let record = service
            .create(
                domain,
                RequestSubmission {
                    patient_id: patient_id(),
                    details: details_for(domain),
                    files: vec![referral()],
                },
            )
            .expect("creation succeeds");
        assert_eq!(record.attachments[0].doc_type.as_str(), "referral");

        service
            .transition(&record.id, AdminTransition::to(descriptor.approval))
            .expect("approval succeeds");
        let outcome = service
            .transition(&record.id, AdminTransition::to(descriptor.completion))
            .expect("completion succeeds");

        assert_eq!(outcome.ledger_entry.is_some(), descriptor.ledger_on.is_some());
        assert!(outcome.record.date_approved.is_some());
        assert!(outcome.record.date_completed.is_some());
    }

    let ledger = store.ledger().expect("ledger");
    assert_eq!(ledger.len(), 5);
    assert!(ledger
        .iter()
        .all(|entry| entry.service_type != ServiceDomain::HomeVisit.label()));

    let patient = store
        .fetch_patient(&patient_id())
        .expect("fetch")
        .expect("patient");
    assert_eq!(patient.status, PatientStatus::Validated);
    assert_eq!(mailer.sent.lock().expect("mailer mutex poisoned").len(), 12);
}

#[test]
fn concurrent_submissions_leave_one_active_request() {
    let (service, store, _) = build();

    let outcomes: Vec<Result<_, WorkflowError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                scope.spawn(move || {
                    service.create(
                        ServiceDomain::PostTreatment,
                        RequestSubmission {
                            patient_id: patient_id(),
                            details: details_for(ServiceDomain::PostTreatment),
                            files: vec![referral()],
                        },
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let created = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let refused = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(WorkflowError::ActiveRequestExists { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(refused, 7);

    let active = store
        .active_request(&patient_id(), ServiceDomain::PostTreatment)
        .expect("lookup");
    assert!(active.is_some());
}

#[tokio::test]
async fn router_walks_pre_cancerous_request_to_done() {
    let (service, store, _) = build();
    let router = request_router(service);

    let boundary = "integration-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"details\"\r\n\r\n{{\"domain\":\"pre_cancerous_meds\",\"medicine_type\":\"Cryotherapy\",\"dispensing_lgu\":\"Pasig\"}}\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"prescription\"; filename=\"rx.jpg\"\r\nContent-Type: image/jpeg\r\n\r\nJFIF\r\n--{boundary}--\r\n"
    );
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/v1/domains/pre-cancerous-meds/requests")
                .header("x-patient-id", PATIENT)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload: serde_json::Value = serde_json::from_slice(
        &axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body"),
    )
    .expect("json");
    let request_id = payload["request_id"]
        .as_str()
        .expect("request id")
        .to_string();

    for status in ["approved", "done"] {
        let response = router
            .clone()
            .oneshot(
                Request::post(format!("/api/v1/admin/requests/{request_id}/status"))
                    .header("x-admin-id", "admin-1")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(format!("{{\"status\":\"{status}\"}}")))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let record = store
        .list_requests(&Default::default())
        .expect("list")
        .into_iter()
        .find(|record| record.id.0 == request_id)
        .expect("request stored");
    assert_eq!(record.status, RequestStatus::Done);
    assert_eq!(store.ledger().expect("ledger").len(), 1);

    let response = router
        .oneshot(
            Request::delete(format!("/api/v1/requests/{request_id}"))
                .header("x-patient-id", PATIENT)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
