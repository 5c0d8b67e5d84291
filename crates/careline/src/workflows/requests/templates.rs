use std::fmt::Write as _;

use super::domain::{Patient, RequestStatus, ServiceRequest};

/// Title and message shown in the patient's notification feed.
pub fn status_notification(record: &ServiceRequest) -> (String, String) {
    let label = record.domain.label();
    let title = format!("{label} request {}", record.status.label());
    let mut message = match record.status {
        RequestStatus::Pending => format!(
            "Your {label} request has been returned to pending for further review."
        ),
        RequestStatus::Approved => format!("Your {label} request has been approved."),
        RequestStatus::FollowUpRequired => format!(
            "Your {label} request needs a follow-up. Please check the remarks and coordinate with the program staff."
        ),
        RequestStatus::Rejected => format!("Your {label} request has been rejected."),
        RequestStatus::Completed | RequestStatus::Done => {
            format!("Your {label} request has been completed.")
        }
        RequestStatus::Closed => format!("Your {label} request has been closed."),
    };

    if let Some(remarks) = record.remarks.as_deref().filter(|text| !text.trim().is_empty()) {
        let _ = write!(message, " Remarks: {}", remarks.trim());
    }

    (title, message)
}

/// Subject and plain-text body for the status-change e-mail.
pub fn status_email(record: &ServiceRequest, patient: &Patient) -> (String, String) {
    let label = record.domain.label();
    let subject = format!("{label} Request Update: {}", record.status.label());

    let mut body = String::new();
    let _ = writeln!(body, "Dear {},", patient.full_name);
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "The status of your {label} request ({}) is now: {}.",
        record.id,
        record.status.label()
    );

    if let Some(date) = record.date_approved.filter(|_| record.status == RequestStatus::Approved) {
        let _ = writeln!(body, "Date approved: {}", date.format("%B %d, %Y"));
    }
    if let Some(date) = record.date_completed {
        let _ = writeln!(body, "Date completed: {}", date.format("%B %d, %Y"));
    }
    if let Some(remarks) = record.remarks.as_deref().filter(|text| !text.trim().is_empty()) {
        let _ = writeln!(body, "Remarks: {}", remarks.trim());
    }

    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Please log in to your account to view the details of your request."
    );

    (subject, body)
}
