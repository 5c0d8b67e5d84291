use super::domain::{RequestStatus, ServiceDomain};

use RequestStatus::{Approved, Closed, Completed, Done, FollowUpRequired, Pending, Rejected};

/// Static status graph and side-effect switches for one service domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainDescriptor {
    pub domain: ServiceDomain,
    pub statuses: &'static [RequestStatus],
    pub transitions: &'static [(RequestStatus, RequestStatus)],
    pub terminal: &'static [RequestStatus],
    pub cancellable: &'static [RequestStatus],
    /// Status whose arrival stamps `date_approved`.
    pub approval: RequestStatus,
    /// Status whose arrival stamps `date_completed`.
    pub completion: RequestStatus,
    /// Success status that records a service-received ledger entry.
    pub ledger_on: Option<RequestStatus>,
    /// Whether reaching the success status validates the owning patient.
    pub validates_patient: bool,
}

const CANCELLABLE: &[RequestStatus] = &[Pending];

static SCREENING: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::IndividualScreening,
    statuses: &[Pending, Approved, Rejected, Completed],
    transitions: &[
        (Pending, Approved),
        (Pending, Rejected),
        (Approved, Completed),
        (Approved, Rejected),
    ],
    terminal: &[Rejected, Completed],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Completed,
    ledger_on: Some(Completed),
    validates_patient: false,
};

static TREATMENT: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::CancerTreatment,
    statuses: &[Pending, Approved, FollowUpRequired, Rejected, Completed],
    transitions: &[
        (Pending, Approved),
        (Pending, Rejected),
        (Approved, Completed),
        (Approved, FollowUpRequired),
        (Approved, Rejected),
        (FollowUpRequired, Completed),
    ],
    terminal: &[Rejected, Completed],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Completed,
    ledger_on: Some(Completed),
    validates_patient: true,
};

static PRE_CANCEROUS: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::PreCancerousMeds,
    statuses: &[Pending, Approved, Rejected, Done],
    transitions: &[(Pending, Approved), (Pending, Rejected), (Approved, Done)],
    terminal: &[Rejected, Done],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Done,
    ledger_on: Some(Done),
    validates_patient: false,
};

static POST_TREATMENT: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::PostTreatment,
    statuses: &[Pending, Approved, FollowUpRequired, Rejected, Completed],
    transitions: &[
        (Pending, Approved),
        (Pending, Rejected),
        (Approved, Completed),
        (Approved, FollowUpRequired),
        (FollowUpRequired, Completed),
    ],
    terminal: &[Rejected, Completed],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Completed,
    ledger_on: Some(Completed),
    validates_patient: false,
};

static HORMONAL: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::HormonalReplacement,
    statuses: &[Pending, Approved, Rejected, Done],
    transitions: &[(Pending, Approved), (Pending, Rejected), (Approved, Done)],
    terminal: &[Rejected, Done],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Done,
    ledger_on: Some(Done),
    validates_patient: false,
};

static HOME_VISIT: DomainDescriptor = DomainDescriptor {
    domain: ServiceDomain::HomeVisit,
    statuses: &[Pending, Approved, Rejected, Closed],
    transitions: &[(Pending, Approved), (Pending, Rejected), (Approved, Closed)],
    terminal: &[Rejected, Closed],
    cancellable: CANCELLABLE,
    approval: Approved,
    completion: Closed,
    ledger_on: None,
    validates_patient: false,
};

impl DomainDescriptor {
    pub fn of(domain: ServiceDomain) -> &'static DomainDescriptor {
        match domain {
            ServiceDomain::IndividualScreening => &SCREENING,
            ServiceDomain::CancerTreatment => &TREATMENT,
            ServiceDomain::PreCancerousMeds => &PRE_CANCEROUS,
            ServiceDomain::PostTreatment => &POST_TREATMENT,
            ServiceDomain::HormonalReplacement => &HORMONAL,
            ServiceDomain::HomeVisit => &HOME_VISIT,
        }
    }

    pub fn allows(&self, status: RequestStatus) -> bool {
        self.statuses.contains(&status)
    }

    pub fn is_terminal(&self, status: RequestStatus) -> bool {
        self.terminal.contains(&status)
    }

    pub fn can_transition(&self, from: RequestStatus, to: RequestStatus) -> bool {
        self.transitions.contains(&(from, to))
    }

    pub fn can_cancel(&self, status: RequestStatus) -> bool {
        self.cancellable.contains(&status)
    }

    /// Statuses reachable from `from` along the admin graph.
    pub fn next_statuses(&self, from: RequestStatus) -> Vec<RequestStatus> {
        self.transitions
            .iter()
            .filter(|(source, _)| *source == from)
            .map(|(_, target)| *target)
            .collect()
    }
}
