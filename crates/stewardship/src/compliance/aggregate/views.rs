use serde::{Deserialize, Serialize};

use super::super::domain::{CommunityId, Program, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    Shortfall,
    Excess,
}

impl ComplianceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compliant => "Compliant",
            Self::Shortfall => "Shortfall",
            Self::Excess => "Excess",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compliant" => Some(Self::Compliant),
            "shortfall" => Some(Self::Shortfall),
            "excess" => Some(Self::Excess),
            _ => None,
        }
    }

    pub fn classify(shortfall: u32, excess: u32) -> Self {
        if shortfall > 0 {
            Self::Shortfall
        } else if excess > 0 {
            Self::Excess
        } else {
            Self::Compliant
        }
    }
}

/// Compliance position of one community for one program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceRow {
    pub community_id: CommunityId,
    pub community_name: String,
    pub population: u64,
    pub tier: Tier,
    pub region: String,
    pub program: Program,
    pub required: u32,
    pub adjusted_required: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_offset_percentage: Option<f64>,
    pub actual: u32,
    pub reallocated_out: u32,
    pub offset_credit: u32,
    pub effective_actual: u32,
    pub shortfall: u32,
    pub excess: u32,
    pub compliance_rate: f64,
    pub status: ComplianceStatus,
    pub status_label: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComplianceSummary {
    pub rows: usize,
    pub compliant: usize,
    pub shortfall: usize,
    pub excess: usize,
    pub total_required: u64,
    pub total_adjusted_required: u64,
    pub total_actual: u64,
    pub total_shortfall: u64,
    pub overall_compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub year: i32,
    pub rows: Page<ComplianceRow>,
    pub summary: ComplianceSummary,
}
