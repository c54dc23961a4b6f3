use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::aggregate::{ComplianceQuery, ComplianceStatus, OffsetToggles, SortKey, SortOrder};
use super::domain::{CommunityId, Program, SiteId, Tier};
use super::offsets::{DirectOffsetConfig, EventOffsetError};
use super::reallocation::{
    ReallocationCandidate, ReallocationDecision, ReallocationError, ReallocationId,
    ReallocationStatus,
};
use super::repository::{OffsetRepository, ReallocationFilter, RepositoryError};
use super::service::{ComplianceService, ServiceError};

/// Router builder exposing the compliance, offset, and reallocation endpoints.
pub fn compliance_router<R>(service: Arc<ComplianceService<R>>) -> Router
where
    R: OffsetRepository + 'static,
{
    Router::new()
        .route("/api/v1/compliance", get(compliance_handler::<R>))
        .route(
            "/api/v1/requirements/:program",
            get(requirement_handler::<R>),
        )
        .route(
            "/api/v1/offsets/direct/:program/:year",
            get(direct_offset_handler::<R>)
                .put(save_direct_offset_handler::<R>)
                .delete(clear_direct_offset_handler::<R>),
        )
        .route(
            "/api/v1/offsets/events/:program/:year",
            get(event_overview_handler::<R>),
        )
        .route(
            "/api/v1/offsets/events/:program/:year/apply-all",
            post(apply_all_events_handler::<R>),
        )
        .route(
            "/api/v1/offsets/events/:program/:year/:community_id",
            put(apply_events_handler::<R>).delete(clear_events_handler::<R>),
        )
        .route(
            "/api/v1/reallocations",
            get(list_reallocations_handler::<R>).post(propose_reallocation_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/validate",
            post(validate_reallocation_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/bulk/decision",
            post(bulk_decision_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/bulk/delete",
            post(bulk_delete_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/opportunities/:program/:year",
            get(opportunities_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/:reallocation_id",
            get(reallocation_handler::<R>).delete(delete_reallocation_handler::<R>),
        )
        .route(
            "/api/v1/reallocations/:reallocation_id/decision",
            post(decision_handler::<R>),
        )
        .with_state(service)
}

/// Raw compliance listing parameters; parsed into a [`ComplianceQuery`].
#[derive(Debug, Default, Deserialize)]
pub struct ComplianceParams {
    pub program: Option<String>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub tier: Option<String>,
    pub region: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub direct_offset: Option<String>,
    pub event_offset: Option<String>,
    pub reallocations: Option<String>,
}

impl ComplianceParams {
    pub fn into_query(self, default_year: i32) -> Result<ComplianceQuery, String> {
        let mut query = ComplianceQuery::for_year(self.year.unwrap_or(default_year));

        query.program = optional(self.program, "program", Program::parse)?;
        query.status = optional(self.status, "status", ComplianceStatus::parse)?;
        query.tier = optional(self.tier, "tier", Tier::parse)?;
        query.sort = optional(self.sort, "sort", SortKey::parse)?.unwrap_or_default();
        query.order = optional(self.order, "order", SortOrder::parse)?.unwrap_or_default();
        query.search = self.search.filter(|value| !value.trim().is_empty());
        query.region = self.region.filter(|value| !value.trim().is_empty());
        if let Some(page) = self.page {
            query.page = page;
        }
        if let Some(per_page) = self.per_page {
            query.per_page = per_page;
        }
        query.offsets = OffsetToggles {
            direct_offset: flag(self.direct_offset, "direct_offset")?,
            event_offset: flag(self.event_offset, "event_offset")?,
            reallocations: flag(self.reallocations, "reallocations")?,
        };

        Ok(query)
    }
}

fn optional<T>(
    value: Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, String> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| format!("invalid {name} '{raw}'")),
    }
}

fn flag(value: Option<String>, name: &str) -> Result<bool, String> {
    let parsed = optional(value, name, |raw| match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    })?;
    Ok(parsed.unwrap_or(false))
}

fn program_from_path(raw: &str) -> Result<Program, Response> {
    Program::parse(raw).ok_or_else(|| bad_request(format!("unknown program '{raw}'")))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, Json(payload)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

fn service_error_response(error: ServiceError) -> Response {
    let status = match &error {
        ServiceError::UnknownCommunity(_)
        | ServiceError::UnknownSite(_)
        | ServiceError::ReallocationNotFound(_)
        | ServiceError::Event(EventOffsetError::UnknownCommunity(_))
        | ServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ServiceError::Event(EventOffsetError::IneligibleEvent { .. })
        | ServiceError::Event(EventOffsetError::CapExceeded { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Reallocation(ReallocationError::AlreadyDecided { .. })
        | ServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        ServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, error.to_string())
}

pub(crate) async fn compliance_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Query(params): Query<ComplianceParams>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let query = match params.into_query(service.default_year()) {
        Ok(query) => query,
        Err(message) => return bad_request(message),
    };

    match service.compliance_report(&query) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct RequirementParams {
    pub population: Option<u64>,
}

pub(crate) async fn requirement_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path(program): Path<String>,
    Query(params): Query<RequirementParams>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let Some(population) = params.population else {
        return bad_request("population is required");
    };

    let required = service.required_sites(&program, population);
    let payload = json!({
        "program": program,
        "population": population,
        "required": required,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn direct_offset_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    let result = service.direct_offset(program, year).and_then(|config| {
        let preview = service.direct_offset_preview(program, year, config.clone())?;
        Ok((config, preview))
    });

    match result {
        Ok((config, preview)) => {
            let payload = json!({
                "config": config,
                "preview": preview,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct DirectOffsetPayload {
    pub global_percentage: f64,
    #[serde(default)]
    pub community_overrides: BTreeMap<CommunityId, f64>,
}

pub(crate) async fn save_direct_offset_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
    Json(payload): Json<DirectOffsetPayload>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    let mut config = DirectOffsetConfig::new(program, year, payload.global_percentage);
    for (community_id, percentage) in payload.community_overrides {
        config = config.with_override(community_id, percentage);
    }

    match service.save_direct_offset(config) {
        Ok(saved) => (StatusCode::OK, Json(saved)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn clear_direct_offset_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    match service.clear_direct_offset(program, year) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn event_overview_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    match service.event_ledger(program, year) {
        Ok(ledger) => (StatusCode::OK, Json(ledger.overview())).into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplyEventsPayload {
    #[serde(default)]
    pub event_site_ids: Vec<SiteId>,
}

pub(crate) async fn apply_events_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year, community_id)): Path<(String, i32, String)>,
    Json(payload): Json<ApplyEventsPayload>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    let community_id = CommunityId(community_id);
    match service.apply_events(program, year, &community_id, payload.event_site_ids) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn clear_events_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year, community_id)): Path<(String, i32, String)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    match service.clear_events(program, year, &CommunityId(community_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn apply_all_events_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    match service.apply_all_events(program, year) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReallocationListParams {
    pub program: Option<String>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub community_id: Option<String>,
}

impl ReallocationListParams {
    fn into_filter(self) -> Result<ReallocationFilter, String> {
        Ok(ReallocationFilter {
            program: optional(self.program, "program", Program::parse)?,
            year: self.year,
            status: optional(self.status, "status", ReallocationStatus::parse)?,
            community_id: self
                .community_id
                .filter(|value| !value.trim().is_empty())
                .map(CommunityId),
        })
    }
}

pub(crate) async fn list_reallocations_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Query(params): Query<ReallocationListParams>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let filter = match params.into_filter() {
        Ok(filter) => filter,
        Err(message) => return bad_request(message),
    };

    match service.reallocations(&filter) {
        Ok(reallocations) => (StatusCode::OK, Json(reallocations)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn propose_reallocation_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Json(candidate): Json<ReallocationCandidate>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    match service.propose_reallocation(candidate) {
        Ok(reallocation) => (StatusCode::CREATED, Json(reallocation)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn validate_reallocation_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Json(candidate): Json<ReallocationCandidate>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    match service.validate_reallocation(&candidate) {
        Ok(errors) => {
            let payload = json!({
                "valid": errors.is_empty(),
                "errors": errors,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn reallocation_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path(reallocation_id): Path<String>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    match service.reallocation(&ReallocationId(reallocation_id)) {
        Ok(reallocation) => (StatusCode::OK, Json(reallocation)).into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct DecisionPayload {
    pub decision: ReallocationDecision,
}

pub(crate) async fn decision_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path(reallocation_id): Path<String>,
    Json(payload): Json<DecisionPayload>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let id = ReallocationId(reallocation_id);
    match service.decide_reallocation(&id, payload.decision) {
        Ok(reallocation) => (StatusCode::OK, Json(reallocation)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn delete_reallocation_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path(reallocation_id): Path<String>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    match service.delete_reallocation(&ReallocationId(reallocation_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => service_error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkDecisionPayload {
    pub ids: Vec<ReallocationId>,
    pub decision: ReallocationDecision,
}

pub(crate) async fn bulk_decision_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Json(payload): Json<BulkDecisionPayload>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let result = service.bulk_decide(&payload.ids, payload.decision);
    (StatusCode::OK, Json(result)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BulkDeletePayload {
    pub ids: Vec<ReallocationId>,
}

pub(crate) async fn bulk_delete_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Json(payload): Json<BulkDeletePayload>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let result = service.bulk_delete(&payload.ids);
    (StatusCode::OK, Json(result)).into_response()
}

pub(crate) async fn opportunities_handler<R>(
    State(service): State<Arc<ComplianceService<R>>>,
    Path((program, year)): Path<(String, i32)>,
) -> Response
where
    R: OffsetRepository + 'static,
{
    let program = match program_from_path(&program) {
        Ok(program) => program,
        Err(response) => return response,
    };

    let opportunities = service.reallocation_opportunities(program, year);
    (StatusCode::OK, Json(opportunities)).into_response()
}
