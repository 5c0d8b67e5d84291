//! Reviewable service requests shared by the six assistance programs.
//!
//! Every program runs through the same engine: intake with attachment checks,
//! a single active request per patient and program, one patient resubmission per
//! admin review, admin status changes driven by a per-program descriptor, and a
//! services-received ledger written when a request reaches its success status.

pub mod attachments;
pub mod clock;
pub mod descriptor;
pub mod domain;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod service;
pub mod store;
pub(crate) mod templates;

#[cfg(test)]
mod tests;

pub use attachments::{AttachmentPolicy, AttachmentViolation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use descriptor::DomainDescriptor;
pub use domain::{
    Actor, AdminId, AdminTransition, Attachment, AttachmentUpload, DocType, FileMap,
    HomeVisitDetails, HormonalDetails, MedicationDetails, Patient, PatientId, PatientRegistration,
    PatientStatus, PostTreatmentDetails, RequestDetails, RequestFilter, RequestId, RequestStatus,
    RequestSummaryView, ScreeningDetails, ServiceDomain, ServiceReceived, ServiceRequest,
    TreatmentDetails,
};
pub use ledger::{totals_by_service, write_ledger_csv, LedgerExportError};
pub use lifecycle::LifecycleViolation;
pub use notify::{Mailer, Notification, NotificationSink, NotifyError, StatusEmail};
pub use router::request_router;
pub use service::{
    RequestSubmission, Resubmission, ReviewableRequestService, TransitionOutcome, WorkflowError,
};
pub use store::{InMemoryWorkflowStore, StoreError, TransitionCommit, WorkflowStore};
