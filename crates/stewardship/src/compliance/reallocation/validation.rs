use serde::{Deserialize, Serialize};

use super::super::domain::{Community, CommunityId, Program, Site, SiteId};
use super::super::requirements::OffsetLimits;
use super::adjacency::AdjacencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReallocationKind {
    Site,
    Event,
    DirectReturn,
}

impl ReallocationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Event => "event",
            Self::DirectReturn => "direct_return",
        }
    }

    /// Highest percentage a single reallocation of this kind may claim.
    pub fn cap_percentage(self, limits: &OffsetLimits) -> u32 {
        match self {
            Self::Site => limits.adjacent_cap_percentage,
            Self::Event => limits.event_cap_percentage,
            Self::DirectReturn => 100,
        }
    }
}

/// Proposed movement of one site's credit from a source to a destination community.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReallocationCandidate {
    pub site_id: SiteId,
    pub from_community: CommunityId,
    #[serde(default)]
    pub to_community: Option<CommunityId>,
    pub program: Program,
    pub year: i32,
    pub kind: ReallocationKind,
    pub percentage: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Check a candidate against the reallocation rules, returning one message per
/// violated rule. An empty list means the candidate may proceed to review.
pub fn validate_reallocation(
    candidate: &ReallocationCandidate,
    site: &Site,
    communities: &[Community],
    adjacency: &AdjacencyGraph,
    limits: &OffsetLimits,
) -> Vec<String> {
    let mut errors = Vec::new();

    if site.community_id != candidate.from_community {
        errors.push(format!(
            "Site {} does not belong to community {}",
            site.id, candidate.from_community
        ));
    }

    if !site.offers(candidate.program) {
        errors.push(format!(
            "Site {} does not collect {}",
            site.id,
            candidate.program.label()
        ));
    }

    if limits.excluded_operator_types.contains(&site.operator_type) {
        errors.push(format!(
            "{} sites are municipal or seasonal depots and cannot be reallocated",
            site.operator_type.label()
        ));
    }

    match candidate.kind {
        ReallocationKind::Event if !site.is_event() => {
            errors.push("Only event sites can be reallocated as events".to_string());
        }
        ReallocationKind::Site | ReallocationKind::DirectReturn if site.is_event() => {
            errors.push(
                "Event sites cannot be reallocated to adjacent communities; apply them as event offsets instead"
                    .to_string(),
            );
        }
        _ => {}
    }

    let destination = match candidate
        .to_community
        .as_ref()
        .filter(|id| !id.0.trim().is_empty())
    {
        None => {
            errors.push("A destination community is required".to_string());
            None
        }
        Some(id) if *id == candidate.from_community => {
            errors.push("Destination must differ from the source community".to_string());
            None
        }
        Some(id) => match find_community(communities, id) {
            Some(community) => Some(community),
            None => {
                errors.push(format!("Destination community {id} was not found"));
                None
            }
        },
    };

    if let Some(destination) = destination {
        let adjacent = adjacency.are_adjacent(&candidate.from_community, &destination.id);

        if site.operator_type.is_return_to_retail() && !adjacent {
            errors.push(format!(
                "Return-to-retail sites can only be reallocated to adjacent communities; {} is not adjacent",
                destination.name
            ));
        }

        if limits.requires_adjacency && !adjacent {
            match candidate.program {
                Program::Lighting => errors.push(format!(
                    "Lighting reallocations require a directly adjacent community; {} is not adjacent",
                    destination.name
                )),
                program => {
                    let same_region = find_community(communities, &candidate.from_community)
                        .map(|source| source.shares_region_with(destination))
                        .unwrap_or(false);
                    if !same_region {
                        errors.push(format!(
                            "{} reallocations require an adjacent community or one in the same upper-tier region; {} is neither",
                            program.label(),
                            destination.name
                        ));
                    }
                }
            }
        }
    }

    let cap = candidate.kind.cap_percentage(limits);
    if !candidate.percentage.is_finite() || candidate.percentage < 0.0 {
        errors.push(format!("Percentage must be between 0 and {cap}"));
    } else if candidate.percentage > f64::from(cap) {
        errors.push(format!(
            "{} reallocations are limited to {}% of required sites (requested {}%)",
            candidate.kind.label(),
            cap,
            candidate.percentage
        ));
    }

    errors
}

fn find_community<'a>(communities: &'a [Community], id: &CommunityId) -> Option<&'a Community> {
    communities.iter().find(|community| &community.id == id)
}
