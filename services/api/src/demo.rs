use crate::infra::{demo_patients, InMemoryNotificationInbox, LoggingMailer};
use careline::config::WorkflowConfig;
use careline::error::AppError;
use careline::workflows::requests::{
    totals_by_service, write_ledger_csv, AdminTransition, AttachmentUpload, DocType,
    InMemoryWorkflowStore, LifecycleViolation, PatientId, RequestDetails, RequestStatus,
    RequestSubmission, Resubmission, ReviewableRequestService, ScreeningDetails, ServiceDomain,
    ServiceRequest, TreatmentDetails, WorkflowError, WorkflowStore,
};
use clap::Args;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService =
    ReviewableRequestService<InMemoryWorkflowStore, InMemoryNotificationInbox, LoggingMailer>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Write the services-received ledger to this CSV file when the demo finishes.
    #[arg(long)]
    pub(crate) ledger_csv: Option<PathBuf>,
    /// Skip the cancer treatment portion of the demo.
    #[arg(long)]
    pub(crate) skip_treatment: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        ledger_csv,
        skip_treatment,
    } = args;

    let store = Arc::new(InMemoryWorkflowStore::with_patients(demo_patients()));
    let inbox = Arc::new(InMemoryNotificationInbox::default());
    let service = ReviewableRequestService::new(
        store.clone(),
        inbox.clone(),
        Arc::new(LoggingMailer),
        WorkflowConfig::default(),
    );
    let patient = demo_patients()
        .into_iter()
        .next()
        .map(|patient| patient.id)
        .ok_or_else(|| WorkflowError::Validation("demo roster is empty".to_string()))?;

    println!("Careline request workflow demo");
    println!("Patient: {patient}");

    println!("\nIndividual screening");
    let screening = service.create(
        ServiceDomain::IndividualScreening,
        RequestSubmission {
            patient_id: patient.clone(),
            details: RequestDetails::IndividualScreening(ScreeningDetails {
                procedure_name: "Mammogram".to_string(),
                procedure_details: "Bilateral screening mammogram".to_string(),
                cancer_site: "Breast".to_string(),
                preferred_clinic: Some("City Health Office".to_string()),
            }),
            files: vec![
                demo_file("referral", "referral.pdf"),
                demo_file("valid_id", "valid-id.png"),
            ],
        },
    )?;
    print_request("submitted", &screening);

    let resubmitted = service.resubmit(
        &screening.id,
        Resubmission {
            patient_id: patient.clone(),
            files: vec![demo_file("loa", "letter-of-authority.pdf")],
            note: Some("Attached the signed letter of authority".to_string()),
        },
    )?;
    print_request("resubmitted", &resubmitted);

    match service.resubmit(
        &screening.id,
        Resubmission {
            patient_id: patient.clone(),
            files: vec![demo_file("loa", "letter-of-authority-v2.pdf")],
            note: None,
        },
    ) {
        Err(WorkflowError::Lifecycle(
            violation @ LifecycleViolation::ResubmissionPending { .. },
        )) => {
            println!("- second resubmission refused: {violation}");
        }
        Err(err) => return Err(err.into()),
        Ok(_) => println!("- second resubmission unexpectedly accepted"),
    }

    let approved = service.transition(
        &screening.id,
        AdminTransition::to(RequestStatus::Approved).with_remarks("Proceed to partner clinic"),
    )?;
    print_request("approved", &approved.record);
    let completed =
        service.transition(&screening.id, AdminTransition::to(RequestStatus::Completed))?;
    print_request("completed", &completed.record);

    if !skip_treatment {
        run_treatment(&service, &patient)?;
    }

    let ledger = store.ledger().map_err(WorkflowError::from)?;
    println!("\nServices received");
    for (service_type, count) in totals_by_service(&ledger) {
        println!("- {service_type}: {count}");
    }
    if let Some(record) = store.fetch_patient(&patient).map_err(WorkflowError::from)? {
        println!("Patient status: {}", record.status.label());
    }
    println!("Notifications queued: {}", inbox.delivered().len());

    if let Some(path) = ledger_csv {
        let writer = BufWriter::new(File::create(&path)?);
        write_ledger_csv(writer, &ledger)?;
        println!("Ledger exported to {}", path.display());
    }

    Ok(())
}

fn run_treatment(service: &DemoService, patient: &PatientId) -> Result<(), AppError> {
    println!("\nCancer treatment");
    let treatment = service.create(
        ServiceDomain::CancerTreatment,
        RequestSubmission {
            patient_id: patient.clone(),
            details: RequestDetails::CancerTreatment(TreatmentDetails {
                service_type: "Chemotherapy".to_string(),
                diagnosis: "Stage II breast carcinoma".to_string(),
                treatment_date: None,
            }),
            files: vec![demo_file("medical_abstract", "abstract.pdf")],
        },
    )?;
    print_request("submitted", &treatment);

    for status in [RequestStatus::Approved, RequestStatus::Completed] {
        let outcome = service.transition(&treatment.id, AdminTransition::to(status))?;
        print_request(status.key(), &outcome.record);
        if let Some(entry) = outcome.ledger_entry {
            println!(
                "  ledger: {} received on {}",
                entry.service_type, entry.date_completed
            );
        }
    }

    Ok(())
}

fn demo_file(doc_type: &str, file_name: &str) -> (DocType, AttachmentUpload) {
    (
        DocType::new(doc_type),
        AttachmentUpload::from_named_bytes(file_name, format!("demo {file_name}").into_bytes()),
    )
}

fn print_request(step: &str, record: &ServiceRequest) {
    println!(
        "- {step}: {} [{}] attachments={} awaiting_review={}",
        record.id,
        record.status.label(),
        record.attachments.len(),
        record.has_patient_response
    );
    if let Some(date) = record.date_approved {
        println!("  approved on {date}");
    }
    if let Some(date) = record.date_completed {
        println!("  completed on {date}");
    }
}
