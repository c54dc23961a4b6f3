//! Per-community compliance classification and summary statistics.

mod query;
mod views;

pub use query::{
    ComplianceQuery, OffsetToggles, SortKey, SortOrder, DEFAULT_PER_PAGE, MAX_PER_PAGE,
};
pub use views::{ComplianceReport, ComplianceRow, ComplianceStatus, ComplianceSummary, Page};

use std::collections::BTreeMap;

use super::domain::{Community, Program, Site};
use super::offsets::{apply_offset, DirectOffsetConfig, EventOffsetLedger};
use super::reallocation::Reallocation;
use super::requirements::RequirementCalculator;

/// Offset state in effect for a reporting pass.
#[derive(Debug, Clone, Default)]
pub struct OffsetInputs {
    pub direct: BTreeMap<Program, DirectOffsetConfig>,
    pub events: BTreeMap<Program, EventOffsetLedger>,
    pub reallocations: Vec<Reallocation>,
}

/// Runs the requirement calculator and the active offsets over a community set.
pub struct ComplianceAggregator<'a> {
    communities: &'a [Community],
    sites: &'a [Site],
    calculator: &'a RequirementCalculator,
    offsets: OffsetInputs,
}

impl<'a> ComplianceAggregator<'a> {
    pub fn new(
        communities: &'a [Community],
        sites: &'a [Site],
        calculator: &'a RequirementCalculator,
    ) -> Self {
        Self {
            communities,
            sites,
            calculator,
            offsets: OffsetInputs::default(),
        }
    }

    pub fn with_offsets(mut self, offsets: OffsetInputs) -> Self {
        self.offsets = offsets;
        self
    }

    /// Compliance position of one community, taking only the toggled offsets into account.
    pub fn row(
        &self,
        community: &Community,
        program: Program,
        year: i32,
        toggles: OffsetToggles,
    ) -> ComplianceRow {
        let required = self.calculator.required_for(community, program);

        let direct_offset_percentage = self
            .offsets
            .direct
            .get(&program)
            .filter(|config| toggles.direct_offset && config.year == year)
            .map(|config| config.percentage_for(&community.id));
        let adjusted_required = direct_offset_percentage
            .map(|pct| apply_offset(required, pct))
            .unwrap_or(required);

        let actual = count(
            self.sites
                .iter()
                .filter(|site| site.community_id == community.id)
                .filter(|site| site.counts_toward(program, year))
                .count(),
        );

        let approved: Vec<&Reallocation> = self
            .offsets
            .reallocations
            .iter()
            .filter(|_| toggles.reallocations)
            .filter(|r| r.is_approved() && r.program == program && r.year == year)
            .collect();
        let reallocated_out = count(
            approved
                .iter()
                .filter(|r| r.moves_inventory() && r.from_community == community.id)
                .count(),
        );
        let reallocated_in = count(
            approved
                .iter()
                .filter(|r| r.to_community.as_ref() == Some(&community.id))
                .count(),
        );

        let event_credit = self
            .offsets
            .events
            .get(&program)
            .filter(|ledger| toggles.event_offset && ledger.year() == year)
            .and_then(|ledger| ledger.community(&community.id))
            .map(|state| state.applied_count())
            .unwrap_or(0);

        let retained = actual.saturating_sub(reallocated_out);
        let gap = adjusted_required.saturating_sub(retained);
        let offset_credit = event_credit.saturating_add(reallocated_in).min(gap);
        let effective_actual = retained + offset_credit;

        let shortfall = adjusted_required.saturating_sub(effective_actual);
        let excess = effective_actual.saturating_sub(adjusted_required);
        let compliance_rate = rate(u64::from(effective_actual), u64::from(adjusted_required));
        let status = ComplianceStatus::classify(shortfall, excess);

        ComplianceRow {
            community_id: community.id.clone(),
            community_name: community.name.clone(),
            population: community.population,
            tier: community.tier,
            region: community.region.clone(),
            program,
            required,
            adjusted_required,
            direct_offset_percentage,
            actual,
            reallocated_out,
            offset_credit,
            effective_actual,
            shortfall,
            excess,
            compliance_rate,
            status,
            status_label: status.label(),
        }
    }

    pub fn rows(
        &self,
        programs: &[Program],
        year: i32,
        toggles: OffsetToggles,
    ) -> Vec<ComplianceRow> {
        self.communities
            .iter()
            .flat_map(|community| {
                programs
                    .iter()
                    .map(move |program| self.row(community, *program, year, toggles))
            })
            .collect()
    }

    /// Filtered, sorted, paginated rows with a summary over the whole filtered set.
    pub fn report(&self, query: &ComplianceQuery) -> ComplianceReport {
        let mut rows: Vec<ComplianceRow> = self
            .rows(&query.programs(), query.year, query.offsets)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();

        let summary = summarize(&rows);
        query.sort(&mut rows);

        ComplianceReport {
            year: query.year,
            rows: query.paginate(rows),
            summary,
        }
    }
}

pub fn summarize(rows: &[ComplianceRow]) -> ComplianceSummary {
    let mut summary = ComplianceSummary {
        rows: rows.len(),
        ..ComplianceSummary::default()
    };

    for row in rows {
        match row.status {
            ComplianceStatus::Compliant => summary.compliant += 1,
            ComplianceStatus::Shortfall => summary.shortfall += 1,
            ComplianceStatus::Excess => summary.excess += 1,
        }
        summary.total_required += u64::from(row.required);
        summary.total_adjusted_required += u64::from(row.adjusted_required);
        summary.total_actual += u64::from(row.effective_actual);
        summary.total_shortfall += u64::from(row.shortfall);
    }

    summary.overall_compliance_rate = rate(summary.total_actual, summary.total_adjusted_required);
    summary
}

fn rate(actual: u64, required: u64) -> f64 {
    if required == 0 {
        100.0
    } else {
        actual as f64 / required as f64 * 100.0
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
