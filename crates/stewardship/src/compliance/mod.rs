//! Compliance and offset engine for stewardship collection programs.
//!
//! Required sites are derived from population and program, reduced by
//! direct-service offsets, and credited by applied events and approved
//! reallocations before each community is classified.

pub mod aggregate;
pub mod batch;
pub mod domain;
pub mod memory;
pub mod offsets;
pub mod reallocation;
pub mod repository;
pub mod requirements;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use aggregate::{
    summarize, ComplianceAggregator, ComplianceQuery, ComplianceReport, ComplianceRow,
    ComplianceStatus, ComplianceSummary, OffsetInputs, OffsetToggles, Page, SortKey, SortOrder,
};
pub use batch::{BatchFailure, BatchResult};
pub use domain::{
    ActiveDates, Community, CommunityId, OperatorType, Program, Site, SiteId, SiteStatus,
    SiteType, Tier,
};
pub use memory::InMemoryOffsetRepository;
pub use offsets::{
    apply_offset, clamp_percentage, direct_offset_adjustments, DirectOffsetAdjustment,
    DirectOffsetConfig, EventApplicationOutcome, EventBulkOutcome, EventCommunityState,
    EventOffsetError, EventOffsetLedger, EventOffsetOverview,
};
pub use reallocation::{
    eligible_excess, inventory_errors, is_reallocatable, reallocation_opportunities,
    validate_reallocation, AdjacencyGraph, DestinationCandidate, Reallocation, ReallocationCandidate,
    ReallocationDecision, ReallocationError, ReallocationId, ReallocationKind,
    ReallocationOpportunity, ReallocationStatus,
};
pub use repository::{
    CommunityOffset, DirectServiceOffset, EventApplication, OffsetRepository, ReallocationFilter,
    RepositoryError,
};
pub use requirements::{
    required_sites, required_sites_for_tag, OffsetLimits, RegulatoryRule, RequirementCalculator,
    RuleBook, RuleCategory, RuleParameters, RuleStatus, RuleType,
};
pub use router::compliance_router;
pub use service::{ComplianceService, EventBulkReport, ServiceError};
