use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::descriptor::DomainDescriptor;
use super::domain::{
    Patient, PatientId, PatientStatus, RequestFilter, RequestId, ServiceDomain, ServiceReceived,
    ServiceRequest,
};

/// Everything an admin transition writes, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommit {
    pub request: ServiceRequest,
    pub ledger_entry: Option<ServiceReceived>,
    pub patient_status: Option<(PatientId, PatientStatus)>,
}

/// Storage abstraction so the workflow engine can be exercised in isolation.
pub trait WorkflowStore: Send + Sync {
    /// Persist a new request. Must refuse a second non-terminal request for the
    /// same patient and domain, checked in the same critical section as the write.
    fn insert_request(&self, record: ServiceRequest) -> Result<ServiceRequest, StoreError>;
    fn fetch_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError>;
    /// Replace a request only if its stored revision still equals `record.revision`.
    /// Returns the stored copy with the bumped revision.
    fn save_request(&self, record: ServiceRequest) -> Result<ServiceRequest, StoreError>;
    /// Apply a transition under the same revision check as `save_request`.
    fn commit_transition(&self, commit: TransitionCommit) -> Result<ServiceRequest, StoreError>;
    /// Remove a request together with its attachments, provided it is still at
    /// `expected_revision`.
    fn delete_request(
        &self,
        id: &RequestId,
        expected_revision: u64,
    ) -> Result<ServiceRequest, StoreError>;
    fn active_request(
        &self,
        patient: &PatientId,
        domain: ServiceDomain,
    ) -> Result<Option<ServiceRequest>, StoreError>;
    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, StoreError>;
    fn fetch_patient(&self, id: &PatientId) -> Result<Option<Patient>, StoreError>;
    /// Insert a patient, or refresh the name and e-mail of a known one while
    /// keeping its stored status. Returns the stored record.
    fn upsert_patient(&self, patient: Patient) -> Result<Patient, StoreError>;
    fn ledger_for(&self, patient: &PatientId) -> Result<Vec<ServiceReceived>, StoreError>;
    fn ledger(&self) -> Result<Vec<ServiceReceived>, StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("patient already has an active {} request ({existing})", .domain.label())]
    ActiveRequestExists {
        domain: ServiceDomain,
        existing: RequestId,
    },
    #[error("record not found")]
    NotFound,
    #[error("request {0} changed since it was read")]
    Stale(RequestId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
struct StoreState {
    requests: BTreeMap<RequestId, ServiceRequest>,
    patients: HashMap<PatientId, Patient>,
    ledger: Vec<ServiceReceived>,
}

impl StoreState {
    fn current(
        &self,
        id: &RequestId,
        expected_revision: u64,
    ) -> Result<&ServiceRequest, StoreError> {
        let stored = self.requests.get(id).ok_or(StoreError::NotFound)?;
        if stored.revision != expected_revision {
            return Err(StoreError::Stale(id.clone()));
        }
        Ok(stored)
    }

    fn active(&self, patient: &PatientId, domain: ServiceDomain) -> Option<&ServiceRequest> {
        let descriptor = DomainDescriptor::of(domain);
        self.requests.values().find(|record| {
            record.domain == domain
                && &record.subject_id == patient
                && !descriptor.is_terminal(record.status)
        })
    }
}

/// Mutex-backed store; every trait call is one critical section.
#[derive(Debug, Default, Clone)]
pub struct InMemoryWorkflowStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patients(patients: impl IntoIterator<Item = Patient>) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            for patient in patients {
                state.patients.insert(patient.id.clone(), patient);
            }
        }
        store
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn insert_request(&self, record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let mut state = self.state()?;
        if state.requests.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        if let Some(existing) = state.active(&record.subject_id, record.domain) {
            return Err(StoreError::ActiveRequestExists {
                domain: record.domain,
                existing: existing.id.clone(),
            });
        }
        state.requests.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.state()?.requests.get(id).cloned())
    }

    fn save_request(&self, mut record: ServiceRequest) -> Result<ServiceRequest, StoreError> {
        let mut state = self.state()?;
        state.current(&record.id, record.revision)?;
        record.revision += 1;
        state.requests.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn commit_transition(&self, commit: TransitionCommit) -> Result<ServiceRequest, StoreError> {
        let mut state = self.state()?;
        state.current(&commit.request.id, commit.request.revision)?;
        if let Some((patient_id, _)) = &commit.patient_status {
            if !state.patients.contains_key(patient_id) {
                return Err(StoreError::NotFound);
            }
        }

        if let Some((patient_id, status)) = commit.patient_status {
            if let Some(patient) = state.patients.get_mut(&patient_id) {
                patient.status = status;
            }
        }
        if let Some(entry) = commit.ledger_entry {
            state.ledger.push(entry);
        }
        let mut record = commit.request;
        record.revision += 1;
        state.requests.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn delete_request(
        &self,
        id: &RequestId,
        expected_revision: u64,
    ) -> Result<ServiceRequest, StoreError> {
        let mut state = self.state()?;
        state.current(id, expected_revision)?;
        state.requests.remove(id).ok_or(StoreError::NotFound)
    }

    fn active_request(
        &self,
        patient: &PatientId,
        domain: ServiceDomain,
    ) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.state()?.active(patient, domain).cloned())
    }

    fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<ServiceRequest>, StoreError> {
        let state = self.state()?;
        let mut records: Vec<ServiceRequest> = state
            .requests
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    fn fetch_patient(&self, id: &PatientId) -> Result<Option<Patient>, StoreError> {
        Ok(self.state()?.patients.get(id).cloned())
    }

    fn upsert_patient(&self, patient: Patient) -> Result<Patient, StoreError> {
        let mut state = self.state()?;
        let patients = &mut state.patients;
        match patients.get_mut(&patient.id) {
            Some(existing) => {
                existing.full_name = patient.full_name;
                existing.email = patient.email;
                Ok(existing.clone())
            }
            None => {
                patients.insert(patient.id.clone(), patient.clone());
                Ok(patient)
            }
        }
    }

    fn ledger_for(&self, patient: &PatientId) -> Result<Vec<ServiceReceived>, StoreError> {
        Ok(self
            .state()?
            .ledger
            .iter()
            .filter(|entry| &entry.patient_id == patient)
            .cloned()
            .collect())
    }

    fn ledger(&self) -> Result<Vec<ServiceReceived>, StoreError> {
        Ok(self.state()?.ledger.clone())
    }
}
