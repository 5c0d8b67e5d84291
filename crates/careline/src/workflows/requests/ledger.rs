use std::collections::BTreeMap;
use std::io::Write;

use super::domain::ServiceReceived;

const LEDGER_HEADERS: [&str; 4] = ["patient_id", "request_id", "service_type", "date_completed"];

#[derive(Debug)]
pub enum LedgerExportError {
    Csv(csv::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for LedgerExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerExportError::Csv(err) => write!(f, "failed to write ledger csv: {err}"),
            LedgerExportError::Io(err) => write!(f, "failed to flush ledger csv: {err}"),
        }
    }
}

impl std::error::Error for LedgerExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerExportError::Csv(err) => Some(err),
            LedgerExportError::Io(err) => Some(err),
        }
    }
}

impl From<csv::Error> for LedgerExportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<std::io::Error> for LedgerExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Write services-received entries as CSV, one row per entry, dates as `YYYY-MM-DD`.
pub fn write_ledger_csv<W: Write>(
    writer: W,
    entries: &[ServiceReceived],
) -> Result<(), LedgerExportError> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(LEDGER_HEADERS)?;
    for entry in entries {
        let date = entry.date_completed.format("%Y-%m-%d").to_string();
        csv_writer.write_record([
            entry.patient_id.0.as_str(),
            entry.request_id.0.as_str(),
            entry.service_type.as_str(),
            date.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Number of services received per service type.
pub fn totals_by_service(entries: &[ServiceReceived]) -> BTreeMap<String, usize> {
    let mut totals = BTreeMap::new();
    for entry in entries {
        *totals.entry(entry.service_type.clone()).or_insert(0) += 1;
    }
    totals
}
