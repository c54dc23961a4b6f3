use serde::Serialize;

use super::super::domain::{Community, CommunityId, Program, Site, SiteId, SiteType, SiteStatus};
use super::super::requirements::{OffsetLimits, RequirementCalculator};
use super::adjacency::AdjacencyGraph;
use super::validation::{ReallocationCandidate, ReallocationKind};

/// Whether a site may be moved to an adjacent community for the program.
pub fn is_reallocatable(site: &Site, program: Program, year: i32, limits: &OffsetLimits) -> bool {
    site.site_type == SiteType::CollectionSite
        && site.status == SiteStatus::Active
        && site.offers(program)
        && site.active_window().overlaps_year(year)
        && !limits.excluded_operator_types.contains(&site.operator_type)
}

/// Eligible sites beyond the requirement, or zero when there are none to spare.
pub fn eligible_excess(eligible_sites: u32, required: u32) -> u32 {
    eligible_sites.saturating_sub(required)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationCandidate {
    pub community_id: CommunityId,
    pub community_name: String,
    pub required: u32,
    pub actual: u32,
    pub shortfall: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReallocationOpportunity {
    pub source_id: CommunityId,
    pub source_name: String,
    pub required: u32,
    pub eligible_excess: u32,
    pub eligible_sites: Vec<SiteId>,
    pub destinations: Vec<DestinationCandidate>,
}

struct Balance<'a> {
    community: &'a Community,
    required: u32,
    actual: u32,
    eligible_sites: Vec<SiteId>,
}

impl Balance<'_> {
    fn shortfall(&self) -> u32 {
        self.required.saturating_sub(self.actual)
    }
}

/// Communities with eligible excess paired with their adjacent communities that
/// are short of sites for the same program.
pub fn reallocation_opportunities(
    program: Program,
    year: i32,
    communities: &[Community],
    sites: &[Site],
    adjacency: &AdjacencyGraph,
    calculator: &RequirementCalculator,
) -> Vec<ReallocationOpportunity> {
    let limits = calculator.limits(program);
    let balances: Vec<Balance<'_>> = communities
        .iter()
        .map(|community| balance(community, program, year, sites, calculator, &limits))
        .collect();

    let mut opportunities = Vec::new();
    for source in &balances {
        let excess = eligible_excess(count(source.eligible_sites.len()), source.required);
        if excess == 0 {
            continue;
        }

        let mut destinations: Vec<DestinationCandidate> = balances
            .iter()
            .filter(|candidate| {
                candidate.shortfall() > 0
                    && adjacency.are_adjacent(&source.community.id, &candidate.community.id)
            })
            .map(|candidate| DestinationCandidate {
                community_id: candidate.community.id.clone(),
                community_name: candidate.community.name.clone(),
                required: candidate.required,
                actual: candidate.actual,
                shortfall: candidate.shortfall(),
            })
            .collect();

        if destinations.is_empty() {
            continue;
        }
        destinations.sort_by(|a, b| {
            b.shortfall
                .cmp(&a.shortfall)
                .then_with(|| a.community_name.cmp(&b.community_name))
        });

        opportunities.push(ReallocationOpportunity {
            source_id: source.community.id.clone(),
            source_name: source.community.name.clone(),
            required: source.required,
            eligible_excess: excess,
            eligible_sites: source.eligible_sites.clone(),
            destinations,
        });
    }

    opportunities
}

fn balance<'a>(
    community: &'a Community,
    program: Program,
    year: i32,
    sites: &[Site],
    calculator: &RequirementCalculator,
    limits: &OffsetLimits,
) -> Balance<'a> {
    let mut actual = 0;
    let mut eligible_sites = Vec::new();
    for site in sites.iter().filter(|site| site.community_id == community.id) {
        if site.counts_toward(program, year) {
            actual += 1;
        }
        if is_reallocatable(site, program, year, limits) {
            eligible_sites.push(site.id.clone());
        }
    }
    eligible_sites.sort();

    Balance {
        community,
        required: calculator.required_for(community, program),
        actual,
        eligible_sites,
    }
}

/// Inventory checks for a candidate: the site must be in service for the year, the
/// source must hold eligible excess for a site move, and the destination must be short.
pub fn inventory_errors(
    candidate: &ReallocationCandidate,
    site: &Site,
    communities: &[Community],
    sites: &[Site],
    calculator: &RequirementCalculator,
) -> Vec<String> {
    let mut errors = Vec::new();
    let program = candidate.program;
    let year = candidate.year;
    let limits = calculator.limits(program);

    if candidate.kind == ReallocationKind::Event {
        if site.is_event() && site.offers(program) && !site.is_eligible_event(program, year) {
            errors.push(format!(
                "Event {} is not active or scheduled in {}",
                site.id, year
            ));
        }
    } else {
        let screened = site.is_event()
            || !site.offers(program)
            || limits.excluded_operator_types.contains(&site.operator_type);
        if !screened && !is_reallocatable(site, program, year, &limits) {
            errors.push(format!("Site {} is not an active site in {}", site.id, year));
        }

        if let Some(source) = find(communities, &candidate.from_community) {
            let source = balance(source, program, year, sites, calculator, &limits);
            if eligible_excess(count(source.eligible_sites.len()), source.required) == 0 {
                errors.push(format!(
                    "{} has no eligible excess {} sites to reallocate",
                    source.community.name,
                    program.label()
                ));
            }
        }
    }

    let destination = candidate
        .to_community
        .as_ref()
        .filter(|id| **id != candidate.from_community)
        .and_then(|id| find(communities, id));
    if let Some(destination) = destination {
        let destination = balance(destination, program, year, sites, calculator, &limits);
        if destination.shortfall() == 0 {
            errors.push(format!(
                "{} has no {} shortfall to offset",
                destination.community.name,
                program.label()
            ));
        }
    }

    errors
}

fn find<'a>(communities: &'a [Community], id: &CommunityId) -> Option<&'a Community> {
    communities.iter().find(|community| &community.id == id)
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
