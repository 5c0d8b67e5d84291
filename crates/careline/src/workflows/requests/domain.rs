use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered patients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(pub String);

/// Identifier wrapper for submitted service requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for program administrators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdminId(pub String);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The six program services that share the reviewable request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceDomain {
    IndividualScreening,
    CancerTreatment,
    PreCancerousMeds,
    PostTreatment,
    HormonalReplacement,
    HomeVisit,
}

impl ServiceDomain {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::IndividualScreening,
            Self::CancerTreatment,
            Self::PreCancerousMeds,
            Self::PostTreatment,
            Self::HormonalReplacement,
            Self::HomeVisit,
        ]
    }

    /// Stable path segment used by the HTTP surface.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::IndividualScreening => "individual_screening",
            Self::CancerTreatment => "cancer_treatment",
            Self::PreCancerousMeds => "pre_cancerous_meds",
            Self::PostTreatment => "post_treatment",
            Self::HormonalReplacement => "hormonal_replacement",
            Self::HomeVisit => "home_visit",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::IndividualScreening => "Individual Screening",
            Self::CancerTreatment => "Cancer Treatment",
            Self::PreCancerousMeds => "Pre-Cancerous Medication",
            Self::PostTreatment => "Post Treatment",
            Self::HormonalReplacement => "Hormonal Replacement",
            Self::HomeVisit => "Patient Home Visit",
        }
    }

    pub fn from_slug(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ordered()
            .into_iter()
            .find(|domain| domain.slug() == normalized)
    }

    /// Prefix applied to generated request identifiers.
    pub(crate) const fn id_prefix(self) -> &'static str {
        match self {
            Self::IndividualScreening => "scr",
            Self::CancerTreatment => "trt",
            Self::PreCancerousMeds => "pcm",
            Self::PostTreatment => "pst",
            Self::HormonalReplacement => "hrt",
            Self::HomeVisit => "hvs",
        }
    }
}

/// Every status label used by any domain; the descriptor decides which apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    FollowUpRequired,
    Rejected,
    Completed,
    Closed,
    Done,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::FollowUpRequired => "Follow-up Required",
            Self::Rejected => "Rejected",
            Self::Completed => "Completed",
            Self::Closed => "Closed",
            Self::Done => "Done",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::FollowUpRequired => "follow_up_required",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Closed => "closed",
            Self::Done => "done",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        [
            Self::Pending,
            Self::Approved,
            Self::FollowUpRequired,
            Self::Rejected,
            Self::Completed,
            Self::Closed,
            Self::Done,
        ]
        .into_iter()
        .find(|status| status.key() == normalized)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Logical attachment slot, e.g. `loa` or `quotation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocType(pub String);

impl DocType {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inbound file as received from the caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build an upload whose content type is inferred from the file extension.
    pub fn from_named_bytes(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name.into();
        let content_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self::new(file_name, content_type, bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Files supplied with a submission, keyed by slot. Several files may share a slot.
pub type FileMap = Vec<(DocType, AttachmentUpload)>;

/// Stored file owned by exactly one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub doc_type: DocType,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    #[serde(skip_serializing, default)]
    pub bytes: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    pub fn from_upload(doc_type: DocType, upload: AttachmentUpload, now: DateTime<Utc>) -> Self {
        let size = upload.size();
        Self {
            doc_type,
            file_name: upload.file_name,
            content_type: upload.content_type,
            size,
            bytes: upload.bytes,
            uploaded_at: now,
        }
    }
}

/// Screening procedure the patient is requesting assistance for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningDetails {
    pub procedure_name: String,
    pub procedure_details: String,
    pub cancer_site: String,
    pub preferred_clinic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentDetails {
    pub service_type: String,
    pub diagnosis: String,
    pub treatment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationDetails {
    pub medicine_type: String,
    pub dispensing_lgu: String,
    pub date_of_use: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostTreatmentDetails {
    pub laboratory_test: String,
    pub lab_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HormonalDetails {
    pub medicines_requested: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeVisitDetails {
    pub purpose: String,
    pub address: String,
    pub preferred_date: Option<NaiveDate>,
}

/// Domain-specific payload carried by a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum RequestDetails {
    IndividualScreening(ScreeningDetails),
    CancerTreatment(TreatmentDetails),
    PreCancerousMeds(MedicationDetails),
    PostTreatment(PostTreatmentDetails),
    HormonalReplacement(HormonalDetails),
    HomeVisit(HomeVisitDetails),
}

impl RequestDetails {
    pub const fn domain(&self) -> ServiceDomain {
        match self {
            Self::IndividualScreening(_) => ServiceDomain::IndividualScreening,
            Self::CancerTreatment(_) => ServiceDomain::CancerTreatment,
            Self::PreCancerousMeds(_) => ServiceDomain::PreCancerousMeds,
            Self::PostTreatment(_) => ServiceDomain::PostTreatment,
            Self::HormonalReplacement(_) => ServiceDomain::HormonalReplacement,
            Self::HomeVisit(_) => ServiceDomain::HomeVisit,
        }
    }

    /// Names the first required field left blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        fn blank(value: &str) -> bool {
            value.trim().is_empty()
        }

        match self {
            Self::IndividualScreening(details) => {
                if blank(&details.procedure_name) {
                    Some("procedure_name")
                } else if blank(&details.cancer_site) {
                    Some("cancer_site")
                } else {
                    None
                }
            }
            Self::CancerTreatment(details) => {
                if blank(&details.service_type) {
                    Some("service_type")
                } else if blank(&details.diagnosis) {
                    Some("diagnosis")
                } else {
                    None
                }
            }
            Self::PreCancerousMeds(details) => {
                if blank(&details.medicine_type) {
                    Some("medicine_type")
                } else if blank(&details.dispensing_lgu) {
                    Some("dispensing_lgu")
                } else {
                    None
                }
            }
            Self::PostTreatment(details) => {
                blank(&details.laboratory_test).then_some("laboratory_test")
            }
            Self::HormonalReplacement(details) => {
                if details.medicines_requested.iter().all(|name| blank(name)) {
                    Some("medicines_requested")
                } else {
                    None
                }
            }
            Self::HomeVisit(details) => {
                if blank(&details.purpose) {
                    Some("purpose")
                } else if blank(&details.address) {
                    Some("address")
                } else {
                    None
                }
            }
        }
    }
}

/// A patient-submitted record progressing through an admin-reviewed status sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub domain: ServiceDomain,
    pub subject_id: PatientId,
    pub status: RequestStatus,
    pub details: RequestDetails,
    pub has_patient_response: bool,
    pub response_description: Option<String>,
    pub remarks: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub date_approved: Option<NaiveDate>,
    pub date_completed: Option<NaiveDate>,
    /// Bumped by the store on every write; writes carrying an older value are refused.
    #[serde(default)]
    pub revision: u64,
}

impl ServiceRequest {
    pub fn attachments_of<'a>(
        &'a self,
        doc_type: &'a DocType,
    ) -> impl Iterator<Item = &'a Attachment> + 'a {
        self.attachments
            .iter()
            .filter(move |attachment| &attachment.doc_type == doc_type)
    }

    pub fn summary_view(&self) -> RequestSummaryView {
        RequestSummaryView {
            request_id: self.id.clone(),
            domain: self.domain,
            patient_id: self.subject_id.clone(),
            status: self.status.key(),
            status_label: self.status.label(),
            has_patient_response: self.has_patient_response,
            response_description: self.response_description.clone(),
            remarks: self.remarks.clone(),
            attachments: self
                .attachments
                .iter()
                .map(|attachment| AttachmentView {
                    doc_type: attachment.doc_type.clone(),
                    file_name: attachment.file_name.clone(),
                    content_type: attachment.content_type.clone(),
                    size: attachment.size,
                    uploaded_at: attachment.uploaded_at,
                })
                .collect(),
            created_at: self.created_at,
            date_approved: self.date_approved,
            date_completed: self.date_completed,
        }
    }
}

/// Public representation of a request; omits payload bytes.
#[derive(Debug, Clone, Serialize)]
pub struct RequestSummaryView {
    pub request_id: RequestId,
    pub domain: ServiceDomain,
    pub patient_id: PatientId,
    pub status: &'static str,
    pub status_label: &'static str,
    pub has_patient_response: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub attachments: Vec<AttachmentView>,
    pub created_at: DateTime<Utc>,
    pub date_approved: Option<NaiveDate>,
    pub date_completed: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    pub doc_type: DocType,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Aggregate program status kept on the patient record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Pending,
    Validated,
    Rejected,
}

impl PatientStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }
}

/// Registered beneficiary. Registration itself happens outside the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub full_name: String,
    pub email: Option<String>,
    pub status: PatientStatus,
}

/// Name and contact details pushed by the patient registration module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatientRegistration {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Ledger entry recording that a patient received a program service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReceived {
    pub patient_id: PatientId,
    pub request_id: RequestId,
    pub service_type: String,
    pub date_completed: NaiveDate,
}

/// Who is acting on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Patient(PatientId),
    Admin(AdminId),
}

/// Admin command moving a request to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTransition {
    pub status: RequestStatus,
    #[serde(default)]
    pub remarks: Option<String>,
    /// Reopen terminal requests or skip graph edges.
    #[serde(default)]
    pub force: bool,
}

impl AdminTransition {
    pub fn to(status: RequestStatus) -> Self {
        Self {
            status,
            remarks: None,
            force: false,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Filter applied to request listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub domain: Option<ServiceDomain>,
    pub patient_id: Option<PatientId>,
    pub status: Option<RequestStatus>,
    pub awaiting_review: Option<bool>,
}

impl RequestFilter {
    pub fn matches(&self, record: &ServiceRequest) -> bool {
        self.domain.map_or(true, |domain| record.domain == domain)
            && self
                .patient_id
                .as_ref()
                .map_or(true, |patient| &record.subject_id == patient)
            && self.status.map_or(true, |status| record.status == status)
            && self
                .awaiting_review
                .map_or(true, |flag| record.has_patient_response == flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_slugs_round_trip_and_accept_dashes() {
        for domain in ServiceDomain::ordered() {
            assert_eq!(ServiceDomain::from_slug(domain.slug()), Some(domain));
        }
        assert_eq!(
            ServiceDomain::from_slug("Cancer-Treatment"),
            Some(ServiceDomain::CancerTreatment)
        );
        assert_eq!(ServiceDomain::from_slug("dental"), None);
    }

    #[test]
    fn doc_type_is_normalized() {
        assert_eq!(DocType::new("  LOA "), DocType("loa".to_string()));
    }

    #[test]
    fn upload_infers_content_type_from_extension() {
        let upload = AttachmentUpload::from_named_bytes("quotation.pdf", b"%PDF".to_vec());
        assert_eq!(upload.content_type, "application/pdf");
        assert_eq!(upload.size(), 4);
    }

    #[test]
    fn missing_field_reports_first_blank_value() {
        let details = RequestDetails::HomeVisit(HomeVisitDetails {
            purpose: "Wound care".to_string(),
            address: "   ".to_string(),
            preferred_date: None,
        });
        assert_eq!(details.missing_field(), Some("address"));

        let details = RequestDetails::HormonalReplacement(HormonalDetails {
            medicines_requested: vec!["".to_string()],
        });
        assert_eq!(details.missing_field(), Some("medicines_requested"));
    }

    #[test]
    fn details_deserialize_with_domain_tag() {
        let details: RequestDetails = serde_json::from_str(
            r#"{"domain":"post_treatment","laboratory_test":"CBC","lab_date":null}"#,
        )
        .expect("payload parses");
        assert_eq!(details.domain(), ServiceDomain::PostTreatment);
    }
}
