use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::compliance::domain::{
    Community, CommunityId, OperatorType, Program, Site, SiteId, SiteStatus, SiteType, Tier,
};
use crate::compliance::memory::InMemoryOffsetRepository;
use crate::compliance::reallocation::{
    AdjacencyGraph, Reallocation, ReallocationCandidate, ReallocationId, ReallocationKind,
};
use crate::compliance::repository::{
    CommunityOffset, DirectServiceOffset, EventApplication, OffsetRepository, ReallocationFilter,
    RepositoryError,
};
use crate::compliance::requirements::{
    RegulatoryRule, RequirementCalculator, RuleBook, RuleCategory, RuleParameters, RuleStatus,
    RuleType,
};
use crate::compliance::service::ComplianceService;
use crate::dataset::Dataset;

pub(super) const YEAR: i32 = 2025;

pub(super) fn cid(value: &str) -> CommunityId {
    CommunityId(value.to_string())
}

pub(super) fn sid(value: &str) -> SiteId {
    SiteId(value.to_string())
}

pub(super) fn community(id: &str, name: &str, population: u64, tier: Tier, region: &str) -> Community {
    Community {
        id: cid(id),
        name: name.to_string(),
        population,
        tier,
        region: region.to_string(),
        province: "ON".to_string(),
        census_year: Some(2021),
    }
}

pub(super) fn site(
    id: &str,
    community_id: &str,
    site_type: SiteType,
    operator_type: OperatorType,
    status: SiteStatus,
    programs: &[Program],
) -> Site {
    Site {
        id: sid(id),
        name: format!("Site {id}"),
        address: format!("{id} Main St"),
        community_id: cid(community_id),
        site_type,
        operator_type,
        status,
        programs: programs.iter().copied().collect(),
        active_dates: None,
    }
}

/// Active paint collection site.
pub(super) fn depot(id: &str, community_id: &str, operator_type: OperatorType) -> Site {
    site(
        id,
        community_id,
        SiteType::CollectionSite,
        operator_type,
        SiteStatus::Active,
        &[Program::Paint],
    )
}

/// Paint collection event run by the municipality.
pub(super) fn event(id: &str, community_id: &str, status: SiteStatus) -> Site {
    site(
        id,
        community_id,
        SiteType::Event,
        OperatorType::Municipal,
        status,
        &[Program::Paint],
    )
}

/// Four communities with Paint requirements of 10, 5, 3, and 1 (19 in total).
///
/// * alpha: 6 sites, 3 active events (shortfall 4)
/// * bravo: 8 sites including one municipal and one lighting retailer (excess 3)
/// * charlie: 1 site, 1 scheduled event (shortfall 2)
/// * delta: 1 site (compliant)
///
/// alpha borders bravo and charlie. alpha, bravo, and delta share the Halton region.
pub(super) fn communities() -> Vec<Community> {
    vec![
        community("alpha", "Alpha", 400_000, Tier::Lower, "Halton"),
        community("bravo", "Bravo", 200_000, Tier::Lower, "Halton"),
        community("charlie", "Charlie", 120_000, Tier::Single, "Peel"),
        community("delta", "Delta", 40_000, Tier::Lower, "Halton"),
    ]
}

pub(super) fn sites() -> Vec<Site> {
    let mut sites = Vec::new();
    for n in 1..=6 {
        sites.push(depot(&format!("a-{n}"), "alpha", OperatorType::Retailer));
    }
    for n in 1..=3 {
        sites.push(event(&format!("a-e{n}"), "alpha", SiteStatus::Active));
    }

    for n in 1..=4 {
        sites.push(depot(&format!("b-{n}"), "bravo", OperatorType::Retailer));
    }
    sites.push(depot("b-p1", "bravo", OperatorType::PrivateDepot));
    sites.push(depot("b-p2", "bravo", OperatorType::PrivateDepot));
    sites.push(depot("b-m1", "bravo", OperatorType::Municipal));
    sites.push(site(
        "b-l1",
        "bravo",
        SiteType::CollectionSite,
        OperatorType::Retailer,
        SiteStatus::Active,
        &[Program::Paint, Program::Lighting],
    ));

    sites.push(depot("c-1", "charlie", OperatorType::Retailer));
    sites.push(event("c-e1", "charlie", SiteStatus::Scheduled));
    sites.push(site(
        "c-x1",
        "charlie",
        SiteType::CollectionSite,
        OperatorType::Retailer,
        SiteStatus::Inactive,
        &[Program::Paint],
    ));

    sites.push(depot("d-1", "delta", OperatorType::ProductCare));
    sites
}

pub(super) fn adjacency() -> AdjacencyGraph {
    [(cid("alpha"), cid("bravo")), (cid("alpha"), cid("charlie"))]
        .into_iter()
        .collect()
}

pub(super) fn dataset() -> Dataset {
    dataset_with_rules(RuleBook::default())
}

pub(super) fn dataset_with_rules(rules: RuleBook) -> Dataset {
    let (dataset, report) = Dataset::from_parts(
        communities(),
        sites(),
        adjacency().pairs().cloned().collect::<Vec<_>>(),
        rules,
    );
    assert!(report.is_clean(), "fixture imports cleanly: {:?}", report.issues);
    dataset
}

pub(super) fn calculator() -> RequirementCalculator {
    RequirementCalculator::standard()
}

/// Rule book that only lowers the Paint event cap; requirements fall back to the bands.
pub(super) fn event_cap_rules(percentage: u32) -> RuleBook {
    RuleBook::new(vec![RegulatoryRule {
        id: "paint-event-cap".to_string(),
        program: Program::Paint,
        category: RuleCategory::Offset,
        rule_type: RuleType::OffsetEvent,
        parameters: RuleParameters {
            max_offset_percentage: Some(percentage),
            ..RuleParameters::default()
        },
        status: RuleStatus::Active,
        description: String::new(),
    }])
}

pub(super) fn candidate(
    site_id: &str,
    from: &str,
    to: Option<&str>,
    program: Program,
    kind: ReallocationKind,
    percentage: f64,
) -> ReallocationCandidate {
    ReallocationCandidate {
        site_id: sid(site_id),
        from_community: cid(from),
        to_community: to.map(cid),
        program,
        year: YEAR,
        kind,
        percentage,
        rationale: "surplus depot".to_string(),
    }
}

pub(super) fn build_service() -> (
    ComplianceService<InMemoryOffsetRepository>,
    Arc<InMemoryOffsetRepository>,
) {
    let repository = Arc::new(InMemoryOffsetRepository::default());
    let service = ComplianceService::new(Arc::new(dataset()), repository.clone())
        .with_default_year(YEAR);
    (service, repository)
}

pub(super) struct ConflictRepository;

impl OffsetRepository for ConflictRepository {
    fn direct_offset(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Option<DirectServiceOffset>, RepositoryError> {
        Ok(None)
    }

    fn upsert_direct_offset(&self, _offset: DirectServiceOffset) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn delete_direct_offset(&self, _program: Program, _year: i32) -> Result<(), RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    fn community_offsets(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Vec<CommunityOffset>, RepositoryError> {
        Ok(Vec::new())
    }

    fn replace_community_offsets(
        &self,
        _program: Program,
        _year: i32,
        _offsets: Vec<CommunityOffset>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn event_applications(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Vec<EventApplication>, RepositoryError> {
        Ok(Vec::new())
    }

    fn upsert_event_application(
        &self,
        _application: EventApplication,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn delete_event_application(
        &self,
        _community_id: &CommunityId,
        _program: Program,
        _year: i32,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    fn insert_reallocation(
        &self,
        _reallocation: Reallocation,
    ) -> Result<Reallocation, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn update_reallocation(&self, _reallocation: Reallocation) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("read only".to_string()))
    }

    fn fetch_reallocation(
        &self,
        _id: &ReallocationId,
    ) -> Result<Option<Reallocation>, RepositoryError> {
        Ok(None)
    }

    fn reallocations(
        &self,
        _filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, RepositoryError> {
        Ok(Vec::new())
    }

    fn delete_reallocation(&self, _id: &ReallocationId) -> Result<(), RepositoryError> {
        Err(RepositoryError::NotFound)
    }
}

pub(super) struct UnavailableRepository;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl OffsetRepository for UnavailableRepository {
    fn direct_offset(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Option<DirectServiceOffset>, RepositoryError> {
        offline()
    }

    fn upsert_direct_offset(&self, _offset: DirectServiceOffset) -> Result<(), RepositoryError> {
        offline()
    }

    fn delete_direct_offset(&self, _program: Program, _year: i32) -> Result<(), RepositoryError> {
        offline()
    }

    fn community_offsets(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Vec<CommunityOffset>, RepositoryError> {
        offline()
    }

    fn replace_community_offsets(
        &self,
        _program: Program,
        _year: i32,
        _offsets: Vec<CommunityOffset>,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn event_applications(
        &self,
        _program: Program,
        _year: i32,
    ) -> Result<Vec<EventApplication>, RepositoryError> {
        offline()
    }

    fn upsert_event_application(
        &self,
        _application: EventApplication,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn delete_event_application(
        &self,
        _community_id: &CommunityId,
        _program: Program,
        _year: i32,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn insert_reallocation(
        &self,
        _reallocation: Reallocation,
    ) -> Result<Reallocation, RepositoryError> {
        offline()
    }

    fn update_reallocation(&self, _reallocation: Reallocation) -> Result<(), RepositoryError> {
        offline()
    }

    fn fetch_reallocation(
        &self,
        _id: &ReallocationId,
    ) -> Result<Option<Reallocation>, RepositoryError> {
        offline()
    }

    fn reallocations(
        &self,
        _filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, RepositoryError> {
        offline()
    }

    fn delete_reallocation(&self, _id: &ReallocationId) -> Result<(), RepositoryError> {
        offline()
    }
}

/// In-memory storage whose override writes fail, leaving every other call intact.
#[derive(Default)]
pub(super) struct FailingOverridesRepository {
    pub(super) inner: InMemoryOffsetRepository,
}

impl OffsetRepository for FailingOverridesRepository {
    fn direct_offset(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Option<DirectServiceOffset>, RepositoryError> {
        self.inner.direct_offset(program, year)
    }

    fn upsert_direct_offset(&self, offset: DirectServiceOffset) -> Result<(), RepositoryError> {
        self.inner.upsert_direct_offset(offset)
    }

    fn delete_direct_offset(&self, program: Program, year: i32) -> Result<(), RepositoryError> {
        self.inner.delete_direct_offset(program, year)
    }

    fn community_offsets(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<CommunityOffset>, RepositoryError> {
        self.inner.community_offsets(program, year)
    }

    fn replace_community_offsets(
        &self,
        _program: Program,
        _year: i32,
        _offsets: Vec<CommunityOffset>,
    ) -> Result<(), RepositoryError> {
        offline()
    }

    fn event_applications(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<EventApplication>, RepositoryError> {
        self.inner.event_applications(program, year)
    }

    fn upsert_event_application(
        &self,
        application: EventApplication,
    ) -> Result<(), RepositoryError> {
        self.inner.upsert_event_application(application)
    }

    fn delete_event_application(
        &self,
        community_id: &CommunityId,
        program: Program,
        year: i32,
    ) -> Result<(), RepositoryError> {
        self.inner.delete_event_application(community_id, program, year)
    }

    fn insert_reallocation(
        &self,
        reallocation: Reallocation,
    ) -> Result<Reallocation, RepositoryError> {
        self.inner.insert_reallocation(reallocation)
    }

    fn update_reallocation(&self, reallocation: Reallocation) -> Result<(), RepositoryError> {
        self.inner.update_reallocation(reallocation)
    }

    fn fetch_reallocation(
        &self,
        id: &ReallocationId,
    ) -> Result<Option<Reallocation>, RepositoryError> {
        self.inner.fetch_reallocation(id)
    }

    fn reallocations(
        &self,
        filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, RepositoryError> {
        self.inner.reallocations(filter)
    }

    fn delete_reallocation(&self, id: &ReallocationId) -> Result<(), RepositoryError> {
        self.inner.delete_reallocation(id)
    }
}

pub(super) fn service_with<R: OffsetRepository + 'static>(repository: R) -> Arc<ComplianceService<R>> {
    Arc::new(ComplianceService::new(Arc::new(dataset()), Arc::new(repository)).with_default_year(YEAR))
}

pub(super) fn assert_status(response: &Response, status: StatusCode) {
    assert_eq!(response.status(), status);
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
