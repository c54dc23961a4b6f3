use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use stewardship::compliance::{ComplianceStatus, Program, SortKey};
use stewardship::dataset::ImportReport;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) import: Arc<ImportReport>,
}

pub(crate) fn parse_program(raw: &str) -> Result<Program, String> {
    Program::parse(raw).ok_or_else(|| {
        format!("unknown program '{raw}' (expected paint, lighting, solvents, or pesticides)")
    })
}

pub(crate) fn parse_status(raw: &str) -> Result<ComplianceStatus, String> {
    ComplianceStatus::parse(raw)
        .ok_or_else(|| format!("unknown status '{raw}' (expected compliant, shortfall, or excess)"))
}

pub(crate) fn parse_sort(raw: &str) -> Result<SortKey, String> {
    SortKey::parse(raw).ok_or_else(|| format!("unknown sort key '{raw}'"))
}
