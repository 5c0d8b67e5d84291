use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{
    Actor, AdminId, AdminTransition, AttachmentUpload, DocType, FileMap, PatientId,
    PatientRegistration, RequestDetails, RequestFilter, RequestId, RequestStatus, ServiceDomain,
    ServiceRequest,
};
use super::lifecycle::LifecycleViolation;
use super::notify::{Mailer, NotificationSink};
use super::service::{RequestSubmission, Resubmission, ReviewableRequestService, WorkflowError};
use super::store::{StoreError, WorkflowStore};

pub const PATIENT_HEADER: &str = "x-patient-id";
pub const ADMIN_HEADER: &str = "x-admin-id";

/// Upper bound for a multipart body; individual files are capped by the attachment policy.
const MAX_FORM_BYTES: usize = 50 * 1024 * 1024;

type SharedService<S, N, M> = Arc<ReviewableRequestService<S, N, M>>;

/// Router builder exposing intake, resubmission, review and cancellation endpoints.
pub fn request_router<S, N, M>(service: SharedService<S, N, M>) -> Router
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    Router::new()
        .route(
            "/api/v1/domains/:domain/requests",
            post(create_handler::<S, N, M>).get(list_handler::<S, N, M>),
        )
        .route(
            "/api/v1/requests/:request_id",
            get(get_handler::<S, N, M>).delete(cancel_handler::<S, N, M>),
        )
        .route(
            "/api/v1/requests/:request_id/resubmit",
            post(resubmit_handler::<S, N, M>),
        )
        .route(
            "/api/v1/admin/requests/:request_id/status",
            post(transition_handler::<S, N, M>),
        )
        .route(
            "/api/v1/patients/:patient_id",
            put(register_patient_handler::<S, N, M>),
        )
        .route(
            "/api/v1/patients/:patient_id/services",
            get(services_handler::<S, N, M>),
        )
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    awaiting_review: Option<bool>,
}

pub(crate) async fn create_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let Some(domain) = ServiceDomain::from_slug(&domain) else {
        return unknown_domain(&domain);
    };

    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let patient_id = match actor_from_headers(&headers) {
        Some(Actor::Patient(patient_id)) => patient_id,
        Some(Actor::Admin(_)) => match form.take_text("patient_id") {
            Some(raw) => PatientId(raw),
            None => return unprocessable("patient_id is required for admin-assisted intake"),
        },
        None => return unauthenticated(),
    };

    let details = match form.take_text("details") {
        Some(raw) => match serde_json::from_str::<RequestDetails>(&raw) {
            Ok(details) => details,
            Err(err) => return unprocessable(&format!("details payload is malformed: {err}")),
        },
        None => return unprocessable("details payload is required"),
    };

    let submission = RequestSubmission {
        patient_id,
        details,
        files: form.files,
    };

    match service.create(domain, submission) {
        Ok(record) => (StatusCode::CREATED, Json(record.summary_view())).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn list_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let Some(domain) = ServiceDomain::from_slug(&domain) else {
        return unknown_domain(&domain);
    };

    let status = match query.status.as_deref() {
        Some(raw) => match RequestStatus::from_key(raw) {
            Some(status) => Some(status),
            None => return unprocessable(&format!("unknown status '{raw}'")),
        },
        None => None,
    };

    let patient_id = match actor_from_headers(&headers) {
        Some(Actor::Patient(own)) => {
            if query.patient_id.as_deref().is_some_and(|asked| asked != own.0) {
                return forbidden("patients may only list their own requests");
            }
            Some(own)
        }
        Some(Actor::Admin(_)) => query.patient_id.map(PatientId),
        None => return unauthenticated(),
    };

    let filter = RequestFilter {
        domain: Some(domain),
        patient_id,
        status,
        awaiting_review: query.awaiting_review,
    };

    match service.list(&filter) {
        Ok(records) => {
            let views: Vec<_> = records.iter().map(ServiceRequest::summary_view).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn get_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthenticated();
    };

    let id = RequestId(request_id);
    match service.get(&id) {
        Ok(record) => {
            if let Actor::Patient(patient_id) = &actor {
                if &record.subject_id != patient_id {
                    return workflow_error_response(WorkflowError::Forbidden(id));
                }
            }
            (StatusCode::OK, Json(record.summary_view())).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn resubmit_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let patient_id = match actor_from_headers(&headers) {
        Some(Actor::Patient(patient_id)) => patient_id,
        Some(Actor::Admin(_)) => return forbidden("only the owning patient may resubmit"),
        None => return unauthenticated(),
    };

    let mut form = match read_form(multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let resubmission = Resubmission {
        patient_id,
        note: form.take_text("note"),
        files: form.files,
    };

    match service.resubmit(&RequestId(request_id), resubmission) {
        Ok(record) => (StatusCode::OK, Json(record.summary_view())).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn transition_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    Json(command): Json<AdminTransition>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    match actor_from_headers(&headers) {
        Some(Actor::Admin(_)) => {}
        Some(Actor::Patient(_)) => return forbidden("status changes require an administrator"),
        None => return unauthenticated(),
    }

    match service.transition(&RequestId(request_id), command) {
        Ok(outcome) => {
            let payload = json!({
                "request": outcome.record.summary_view(),
                "ledger_entry": outcome.ledger_entry,
                "notified": outcome.notified,
                "emailed": outcome.emailed,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn cancel_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let Some(actor) = actor_from_headers(&headers) else {
        return unauthenticated();
    };

    match service.cancel(&RequestId(request_id), &actor) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn services_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let patient_id = PatientId(patient_id);
    match actor_from_headers(&headers) {
        Some(Actor::Patient(own)) if own != patient_id => {
            return forbidden("patients may only view their own services");
        }
        Some(_) => {}
        None => return unauthenticated(),
    }

    match service.services_received(&patient_id) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

/// Registration collaborator pushes patient records here before intake.
pub(crate) async fn register_patient_handler<S, N, M>(
    State(service): State<SharedService<S, N, M>>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
    Json(registration): Json<PatientRegistration>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    match actor_from_headers(&headers) {
        Some(Actor::Admin(_)) => {}
        Some(Actor::Patient(_)) => {
            return forbidden("patient registration requires an administrator");
        }
        None => return unauthenticated(),
    }

    match service.register_patient(PatientId(patient_id), registration) {
        Ok(patient) => (StatusCode::OK, Json(patient)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

/// Identity supplied by the upstream authentication layer. Admin wins when both are present.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    read(ADMIN_HEADER)
        .map(|id| Actor::Admin(AdminId(id)))
        .or_else(|| read(PATIENT_HEADER).map(|id| Actor::Patient(PatientId(id))))
}

#[derive(Debug, Default)]
pub(crate) struct MultipartForm {
    fields: HashMap<String, String>,
    files: FileMap,
}

impl MultipartForm {
    fn take_text(&mut self, name: &str) -> Option<String> {
        self.fields
            .remove(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Text parts become fields; parts carrying a file name become uploads keyed by
/// the part name, which is the attachment's `doc_type`.
pub(crate) async fn read_form(mut multipart: Multipart) -> Result<MultipartForm, Response> {
    let mut form = MultipartForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read multipart body");
                return Err(bad_request("multipart body could not be read"));
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                if name.trim().is_empty() {
                    return Err(unprocessable("file parts must be named after their doc_type"));
                }
                let declared = field
                    .content_type()
                    .map(str::to_string)
                    .filter(|value| !value.is_empty() && value != "application/octet-stream");
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes.to_vec(),
                    Err(err) => {
                        warn!(error = %err, doc_type = %name, "failed to read upload bytes");
                        return Err(bad_request("file data could not be read"));
                    }
                };
                let upload = match declared {
                    Some(content_type) => AttachmentUpload::new(file_name, content_type, bytes),
                    None => AttachmentUpload::from_named_bytes(file_name, bytes),
                };
                form.files.push((DocType::new(name), upload));
            }
            None => {
                let text = match field.text().await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, field = %name, "failed to read form field");
                        return Err(bad_request("form field could not be read"));
                    }
                };
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

/// Map workflow failures to HTTP responses with a JSON error body.
pub fn workflow_error_response(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::Validation(_) | WorkflowError::Attachment(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::Lifecycle(LifecycleViolation::UnsupportedStatus { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WorkflowError::Lifecycle(_)
        | WorkflowError::ActiveRequestExists { .. }
        | WorkflowError::Store(StoreError::Stale(_)) => StatusCode::CONFLICT,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::RequestNotFound(_) | WorkflowError::PatientNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "request workflow failed");
    }

    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bad_request(message: &str) -> Response {
    error_body(StatusCode::BAD_REQUEST, message)
}

fn unprocessable(message: &str) -> Response {
    error_body(StatusCode::UNPROCESSABLE_ENTITY, message)
}

fn forbidden(message: &str) -> Response {
    error_body(StatusCode::FORBIDDEN, message)
}

fn unauthenticated() -> Response {
    error_body(
        StatusCode::UNAUTHORIZED,
        "missing x-patient-id or x-admin-id identity header",
    )
}

fn unknown_domain(raw: &str) -> Response {
    error_body(StatusCode::NOT_FOUND, &format!("unknown service domain '{raw}'"))
}
