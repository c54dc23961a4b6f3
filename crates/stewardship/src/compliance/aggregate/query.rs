use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::super::domain::{Program, Tier};
use super::views::{ComplianceRow, ComplianceStatus, Page};

pub const DEFAULT_PER_PAGE: usize = 25;
pub const MAX_PER_PAGE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Population,
    Program,
    Required,
    Actual,
    Shortfall,
    Excess,
    ComplianceRate,
}

impl SortKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" | "community" => Some(Self::Name),
            "population" => Some(Self::Population),
            "program" => Some(Self::Program),
            "required" => Some(Self::Required),
            "actual" => Some(Self::Actual),
            "shortfall" => Some(Self::Shortfall),
            "excess" => Some(Self::Excess),
            "compliance_rate" | "rate" => Some(Self::ComplianceRate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Which offset mechanisms the aggregator should take into account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetToggles {
    pub direct_offset: bool,
    pub event_offset: bool,
    pub reallocations: bool,
}

impl OffsetToggles {
    pub fn all() -> Self {
        Self {
            direct_offset: true,
            event_offset: true,
            reallocations: true,
        }
    }
}

/// Filter, sort, and paging parameters for a compliance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceQuery {
    pub year: i32,
    pub program: Option<Program>,
    pub status: Option<ComplianceStatus>,
    pub search: Option<String>,
    pub tier: Option<Tier>,
    pub region: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub page: usize,
    pub per_page: usize,
    pub offsets: OffsetToggles,
}

impl ComplianceQuery {
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            program: None,
            status: None,
            search: None,
            tier: None,
            region: None,
            sort: SortKey::default(),
            order: SortOrder::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            offsets: OffsetToggles::default(),
        }
    }

    pub fn programs(&self) -> Vec<Program> {
        match self.program {
            Some(program) => vec![program],
            None => Program::ordered().to_vec(),
        }
    }

    pub fn matches(&self, row: &ComplianceRow) -> bool {
        if self.status.is_some_and(|status| status != row.status) {
            return false;
        }
        if self.tier.is_some_and(|tier| tier != row.tier) {
            return false;
        }
        if let Some(region) = self.region.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            if !row.region.trim().eq_ignore_ascii_case(region) {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            if !row.community_name.to_lowercase().contains(&needle)
                && !row.community_id.0.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    pub fn sort(&self, rows: &mut [ComplianceRow]) {
        rows.sort_by(|a, b| {
            let primary = match self.sort {
                SortKey::Name => a
                    .community_name
                    .to_lowercase()
                    .cmp(&b.community_name.to_lowercase()),
                SortKey::Population => a.population.cmp(&b.population),
                SortKey::Program => a.program.cmp(&b.program),
                SortKey::Required => a.adjusted_required.cmp(&b.adjusted_required),
                SortKey::Actual => a.effective_actual.cmp(&b.effective_actual),
                SortKey::Shortfall => a.shortfall.cmp(&b.shortfall),
                SortKey::Excess => a.excess.cmp(&b.excess),
                SortKey::ComplianceRate => a.compliance_rate.total_cmp(&b.compliance_rate),
            };
            let primary = match self.order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then_with(|| tie_break(a, b))
        });
    }

    pub fn paginate(&self, rows: Vec<ComplianceRow>) -> Page<ComplianceRow> {
        let per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        let page = self.page.max(1);
        let total_items = rows.len();
        let total_pages = total_items.div_ceil(per_page);

        let items = rows
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Page {
            items,
            page,
            per_page,
            total_items,
            total_pages,
        }
    }
}

fn tie_break(a: &ComplianceRow, b: &ComplianceRow) -> Ordering {
    a.community_name
        .to_lowercase()
        .cmp(&b.community_name.to_lowercase())
        .then_with(|| a.community_id.cmp(&b.community_id))
        .then_with(|| a.program.cmp(&b.program))
}
