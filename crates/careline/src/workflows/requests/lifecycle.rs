//! Pure state-machine checks shared by every service domain.
//!
//! Nothing here touches storage; the service layer calls these before it
//! writes, so a rejected command never leaves a partial update behind.

use chrono::{DateTime, Utc};

use super::descriptor::DomainDescriptor;
use super::domain::{Attachment, FileMap, RequestId, RequestStatus, ServiceDomain, ServiceRequest};

/// Status workflow violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleViolation {
    #[error("status '{status}' is not used by {}", .domain.label())]
    UnsupportedStatus {
        domain: ServiceDomain,
        status: RequestStatus,
    },
    #[error("cannot move {} request from '{from}' to '{to}'", .domain.label())]
    InvalidTransition {
        domain: ServiceDomain,
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("request {request_id} already has a patient response awaiting review")]
    ResubmissionPending { request_id: RequestId },
    #[error("request {request_id} is '{status}' and can no longer be changed by the patient")]
    TerminalStatus {
        request_id: RequestId,
        status: RequestStatus,
    },
    #[error("request {request_id} is '{status}' and can no longer be cancelled")]
    NotCancellable {
        request_id: RequestId,
        status: RequestStatus,
    },
}

/// Validate an admin move from `from` to `to`.
///
/// Same-status moves are accepted for non-terminal statuses so an admin can
/// acknowledge a resubmission without changing the workflow position. `force`
/// skips the graph (admin override) but never the domain's status set.
pub fn check_admin_transition(
    descriptor: &DomainDescriptor,
    from: RequestStatus,
    to: RequestStatus,
    force: bool,
) -> Result<(), LifecycleViolation> {
    if !descriptor.allows(to) {
        return Err(LifecycleViolation::UnsupportedStatus {
            domain: descriptor.domain,
            status: to,
        });
    }

    if force {
        return Ok(());
    }

    let reaffirm = from == to && !descriptor.is_terminal(from);
    if reaffirm || descriptor.can_transition(from, to) {
        Ok(())
    } else {
        Err(LifecycleViolation::InvalidTransition {
            domain: descriptor.domain,
            from,
            to,
        })
    }
}

/// The resubmission gate: one patient response per admin review.
pub fn check_resubmission(
    descriptor: &DomainDescriptor,
    record: &ServiceRequest,
) -> Result<(), LifecycleViolation> {
    if record.has_patient_response {
        return Err(LifecycleViolation::ResubmissionPending {
            request_id: record.id.clone(),
        });
    }

    if descriptor.is_terminal(record.status) {
        return Err(LifecycleViolation::TerminalStatus {
            request_id: record.id.clone(),
            status: record.status,
        });
    }

    Ok(())
}

pub fn check_cancellation(
    descriptor: &DomainDescriptor,
    record: &ServiceRequest,
) -> Result<(), LifecycleViolation> {
    if descriptor.can_cancel(record.status) {
        Ok(())
    } else {
        Err(LifecycleViolation::NotCancellable {
            request_id: record.id.clone(),
            status: record.status,
        })
    }
}

/// Upsert attachments by `doc_type`.
///
/// Every tag present in `uploads` loses all of its previous attachments; the
/// new files are appended in upload order. Tags not mentioned are untouched.
pub fn replace_attachments(
    existing: Vec<Attachment>,
    uploads: FileMap,
    now: DateTime<Utc>,
) -> Vec<Attachment> {
    let mut kept: Vec<Attachment> = existing
        .into_iter()
        .filter(|attachment| {
            !uploads
                .iter()
                .any(|(doc_type, _)| doc_type == &attachment.doc_type)
        })
        .collect();

    kept.extend(
        uploads
            .into_iter()
            .map(|(doc_type, upload)| Attachment::from_upload(doc_type, upload, now)),
    );
    kept
}
