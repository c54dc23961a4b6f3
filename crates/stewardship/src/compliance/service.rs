use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::aggregate::{ComplianceAggregator, ComplianceQuery, ComplianceReport, OffsetInputs};
use super::batch::BatchResult;
use super::domain::{CommunityId, Program, SiteId};
use super::offsets::{
    direct_offset_adjustments, DirectOffsetAdjustment, DirectOffsetConfig,
    EventApplicationOutcome, EventOffsetError, EventOffsetLedger,
};
use super::reallocation::{
    inventory_errors, reallocation_opportunities, validate_reallocation, Reallocation,
    ReallocationCandidate, ReallocationDecision, ReallocationError, ReallocationId,
    ReallocationKind, ReallocationOpportunity, ReallocationStatus,
};
use super::repository::{
    CommunityOffset, DirectServiceOffset, EventApplication, OffsetRepository, ReallocationFilter,
    RepositoryError,
};
use super::requirements::RequirementCalculator;
use crate::dataset::Dataset;

/// Service composing the loaded dataset, the requirement calculator, and offset storage.
pub struct ComplianceService<R> {
    dataset: Arc<Dataset>,
    calculator: Arc<RequirementCalculator>,
    repository: Arc<R>,
    locks: WriteLocks,
    default_year: i32,
}

/// One lock per (program, year) so ledger and version checks are not interleaved
/// with another write for the same program year.
#[derive(Default)]
struct WriteLocks {
    locks: Mutex<HashMap<(Program, i32), Arc<Mutex<()>>>>,
}

impl WriteLocks {
    fn for_program_year(&self, program: Program, year: i32) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry((program, year)).or_default().clone()
    }
}

static REALLOCATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_reallocation_id() -> ReallocationId {
    let id = REALLOCATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ReallocationId(format!("realloc-{id:06}"))
}

/// Outcome of applying events to every community in shortfall.
#[derive(Debug, Clone, Serialize)]
pub struct EventBulkReport {
    pub program: Program,
    pub year: i32,
    pub cap: u32,
    pub total_applied: u32,
    pub cap_reached: bool,
    pub skipped: Vec<CommunityId>,
    pub results: BatchResult<EventApplicationOutcome, CommunityId>,
}

impl<R> ComplianceService<R>
where
    R: OffsetRepository + 'static,
{
    pub fn new(dataset: Arc<Dataset>, repository: Arc<R>) -> Self {
        let calculator = Arc::new(dataset.calculator());
        Self {
            dataset,
            calculator,
            repository,
            locks: WriteLocks::default(),
            default_year: Utc::now().year(),
        }
    }

    /// Reporting year used when a request does not name one.
    pub fn with_default_year(mut self, year: i32) -> Self {
        self.default_year = year;
        self
    }

    pub fn default_year(&self) -> i32 {
        self.default_year
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn calculator(&self) -> &RequirementCalculator {
        &self.calculator
    }

    /// Required sites for a raw program tag; unknown programs need none.
    pub fn required_sites(&self, program: &str, population: u64) -> u32 {
        Program::parse(program)
            .map(|program| self.calculator.required(population, program))
            .unwrap_or(0)
    }

    /// Compliance rows and summary with the offsets selected by the query applied.
    pub fn compliance_report(
        &self,
        query: &ComplianceQuery,
    ) -> Result<ComplianceReport, ServiceError> {
        let mut offsets = OffsetInputs::default();

        for program in query.programs() {
            if query.offsets.direct_offset {
                if let Some(config) = self.direct_offset(program, query.year)? {
                    offsets.direct.insert(program, config);
                }
            }
            if query.offsets.event_offset {
                offsets
                    .events
                    .insert(program, self.event_ledger(program, query.year)?);
            }
        }

        if query.offsets.reallocations {
            offsets.reallocations = self
                .repository
                .reallocations(&ReallocationFilter::for_year(query.year))?;
        }

        let report = ComplianceAggregator::new(
            &self.dataset.communities,
            &self.dataset.sites,
            &self.calculator,
        )
        .with_offsets(offsets)
        .report(query);

        debug!(
            year = query.year,
            rows = report.summary.rows,
            shortfall = report.summary.shortfall,
            "compliance report computed"
        );
        Ok(report)
    }

    /// Stored direct-service offset configuration, if one was saved.
    pub fn direct_offset(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Option<DirectOffsetConfig>, ServiceError> {
        let Some(global) = self.repository.direct_offset(program, year)? else {
            return Ok(None);
        };

        let mut config = DirectOffsetConfig::new(program, year, global.percentage);
        config.version = global.version;
        for record in self.repository.community_offsets(program, year)? {
            config = config.with_override(record.community_id, record.percentage);
        }
        Ok(Some(config))
    }

    /// Per-community requirement under `config`, or under the stored configuration
    /// when none is given. Nothing is persisted.
    pub fn direct_offset_preview(
        &self,
        program: Program,
        year: i32,
        config: Option<DirectOffsetConfig>,
    ) -> Result<Vec<DirectOffsetAdjustment>, ServiceError> {
        let config = match config {
            Some(config) => config.clamped(),
            None => self
                .direct_offset(program, year)?
                .unwrap_or_else(|| DirectOffsetConfig::new(program, year, 0.0)),
        };

        Ok(direct_offset_adjustments(
            &self.dataset.communities,
            &self.calculator,
            &config,
        ))
    }

    /// Persist a configuration as the next version for its program year.
    pub fn save_direct_offset(
        &self,
        config: DirectOffsetConfig,
    ) -> Result<DirectOffsetConfig, ServiceError> {
        let mut config = config.clamped();

        if let Some(unknown) = config
            .community_overrides
            .keys()
            .find(|id| self.dataset.community(id).is_none())
        {
            return Err(ServiceError::UnknownCommunity(unknown.clone()));
        }

        let lock = self.locks.for_program_year(config.program, config.year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let previous = self.repository.direct_offset(config.program, config.year)?;
        config.version = previous.as_ref().map_or(0, |record| record.version) + 1;

        let now = Utc::now();
        self.repository.upsert_direct_offset(DirectServiceOffset {
            program: config.program,
            year: config.year,
            percentage: config.global_percentage,
            version: config.version,
            updated_at: now,
        })?;

        let overrides = config
            .community_overrides
            .iter()
            .map(|(community_id, percentage)| CommunityOffset {
                community_id: community_id.clone(),
                program: config.program,
                year: config.year,
                percentage: *percentage,
                updated_at: now,
            })
            .collect();
        if let Err(err) =
            self.repository
                .replace_community_offsets(config.program, config.year, overrides)
        {
            self.restore_direct_offset(config.program, config.year, previous);
            return Err(err.into());
        }

        info!(
            program = config.program.label(),
            year = config.year,
            version = config.version,
            percentage = config.global_percentage,
            overrides = config.community_overrides.len(),
            "direct-service offset saved"
        );
        Ok(config)
    }

    /// Put back the global record a failed save replaced.
    fn restore_direct_offset(
        &self,
        program: Program,
        year: i32,
        previous: Option<DirectServiceOffset>,
    ) {
        let restored = match previous {
            Some(record) => self.repository.upsert_direct_offset(record),
            None => match self.repository.delete_direct_offset(program, year) {
                Err(RepositoryError::NotFound) => Ok(()),
                other => other,
            },
        };
        if let Err(err) = restored {
            warn!(
                program = program.label(),
                year,
                error = %err,
                "failed to restore direct-service offset after a partial save"
            );
        }
    }

    pub fn clear_direct_offset(&self, program: Program, year: i32) -> Result<(), ServiceError> {
        let lock = self.locks.for_program_year(program, year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.repository.delete_direct_offset(program, year)?;
        info!(program = program.label(), year, "direct-service offset cleared");
        Ok(())
    }

    /// Event ledger for a program year with the stored applications restored.
    pub fn event_ledger(&self, program: Program, year: i32) -> Result<EventOffsetLedger, ServiceError> {
        let mut ledger = EventOffsetLedger::build(
            program,
            year,
            &self.dataset.communities,
            &self.dataset.sites,
            &self.calculator,
        );

        for application in self.repository.event_applications(program, year)? {
            if let Err(err) = ledger.apply(&application.community_id, application.event_site_ids)
            {
                warn!(
                    program = program.label(),
                    year,
                    community = %application.community_id,
                    error = %err,
                    "stored event application no longer fits the ledger; skipped"
                );
            }
        }

        Ok(ledger)
    }

    /// Replace the events applied to a community's shortfall.
    pub fn apply_events(
        &self,
        program: Program,
        year: i32,
        community_id: &CommunityId,
        events: Vec<SiteId>,
    ) -> Result<EventApplicationOutcome, ServiceError> {
        let lock = self.locks.for_program_year(program, year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ledger = self.event_ledger(program, year)?;
        let outcome = ledger.apply(community_id, events)?;
        self.persist_events(program, year, &outcome)?;

        info!(
            program = program.label(),
            year,
            community = %community_id,
            applied = outcome.applied.len(),
            remaining_capacity = ledger.remaining_capacity(),
            "event offsets applied"
        );
        Ok(outcome)
    }

    pub fn clear_events(
        &self,
        program: Program,
        year: i32,
        community_id: &CommunityId,
    ) -> Result<(), ServiceError> {
        if self.dataset.community(community_id).is_none() {
            return Err(ServiceError::UnknownCommunity(community_id.clone()));
        }

        let lock = self.locks.for_program_year(program, year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match self
            .repository
            .delete_event_application(community_id, program, year)
        {
            Ok(()) | Err(RepositoryError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        info!(program = program.label(), year, community = %community_id, "event offsets cleared");
        Ok(())
    }

    /// Apply eligible events to every community in shortfall until the aggregate
    /// cap is reached. Each community is persisted separately.
    pub fn apply_all_events(
        &self,
        program: Program,
        year: i32,
    ) -> Result<EventBulkReport, ServiceError> {
        let lock = self.locks.for_program_year(program, year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ledger = self.event_ledger(program, year)?;
        let bulk = ledger.apply_all();

        let mut results = BatchResult::new();
        for outcome in bulk.applied {
            let community_id = outcome.community_id.clone();
            let persisted = self
                .persist_events(program, year, &outcome)
                .map(|()| outcome);
            results.record(community_id, persisted);
        }

        if bulk.cap_reached {
            warn!(
                program = program.label(),
                year,
                cap = ledger.cap(),
                skipped = bulk.skipped.len(),
                "event offset cap reached during bulk application"
            );
        }

        Ok(EventBulkReport {
            program,
            year,
            cap: ledger.cap(),
            total_applied: ledger.total_applied(),
            cap_reached: bulk.cap_reached,
            skipped: bulk.skipped,
            results,
        })
    }

    fn persist_events(
        &self,
        program: Program,
        year: i32,
        outcome: &EventApplicationOutcome,
    ) -> Result<(), ServiceError> {
        if outcome.applied.is_empty() {
            match self
                .repository
                .delete_event_application(&outcome.community_id, program, year)
            {
                Ok(()) | Err(RepositoryError::NotFound) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }

        self.repository.upsert_event_application(EventApplication {
            community_id: outcome.community_id.clone(),
            program,
            year,
            event_site_ids: outcome.applied.clone(),
            applied_at: Utc::now(),
        })?;
        Ok(())
    }

    /// Validation messages for a candidate; empty means it may be proposed.
    pub fn validate_reallocation(
        &self,
        candidate: &ReallocationCandidate,
    ) -> Result<Vec<String>, ServiceError> {
        let site = self
            .dataset
            .site(&candidate.site_id)
            .ok_or_else(|| ServiceError::UnknownSite(candidate.site_id.clone()))?;

        let mut errors = validate_reallocation(
            candidate,
            site,
            &self.dataset.communities,
            &self.dataset.adjacency,
            &self.calculator.limits(candidate.program),
        );
        errors.extend(inventory_errors(
            candidate,
            site,
            &self.dataset.communities,
            &self.dataset.sites,
            &self.calculator,
        ));

        let filter = ReallocationFilter {
            program: Some(candidate.program),
            year: Some(candidate.year),
            ..ReallocationFilter::default()
        };
        if let Some(existing) = self
            .repository
            .reallocations(&filter)?
            .into_iter()
            .find(|existing| {
                existing.site_id == candidate.site_id
                    && existing.status != ReallocationStatus::Rejected
            })
        {
            errors.push(format!(
                "Site {} is already in {} reallocation {}",
                site.id,
                existing.status.label(),
                existing.id
            ));
        }

        if candidate.kind == ReallocationKind::Event {
            let ledger = self.event_ledger(candidate.program, candidate.year)?;
            let applied_at_source = ledger
                .community(&candidate.from_community)
                .is_some_and(|state| state.applied.contains(&candidate.site_id));
            if applied_at_source {
                errors.push(format!(
                    "Event {} is already applied as an event offset for {}",
                    site.id, candidate.from_community
                ));
            }
        }

        Ok(errors)
    }

    /// Store a reallocation, rejected outright when validation fails and pending
    /// review otherwise.
    pub fn propose_reallocation(
        &self,
        candidate: ReallocationCandidate,
    ) -> Result<Reallocation, ServiceError> {
        let lock = self.locks.for_program_year(candidate.program, candidate.year);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let errors = self.validate_reallocation(&candidate)?;
        let reallocation = Reallocation::propose(next_reallocation_id(), candidate, errors, Utc::now());
        let stored = self.repository.insert_reallocation(reallocation)?;

        if stored.validation_errors.is_empty() {
            info!(id = %stored.id, site = %stored.site_id, "reallocation proposed");
        } else {
            warn!(
                id = %stored.id,
                site = %stored.site_id,
                errors = stored.validation_errors.len(),
                "reallocation rejected by validation"
            );
        }
        Ok(stored)
    }

    pub fn decide_reallocation(
        &self,
        id: &ReallocationId,
        decision: ReallocationDecision,
    ) -> Result<Reallocation, ServiceError> {
        let mut reallocation = self.reallocation(id)?;
        reallocation.decide(decision, Utc::now())?;
        self.repository.update_reallocation(reallocation.clone())?;

        info!(id = %id, status = reallocation.status.label(), "reallocation decided");
        Ok(reallocation)
    }

    /// Remove a reallocation regardless of status, undoing its effect.
    pub fn delete_reallocation(&self, id: &ReallocationId) -> Result<(), ServiceError> {
        match self.repository.delete_reallocation(id) {
            Ok(()) => {
                info!(id = %id, "reallocation deleted");
                Ok(())
            }
            Err(RepositoryError::NotFound) => Err(ServiceError::ReallocationNotFound(id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    pub fn bulk_decide(
        &self,
        ids: &[ReallocationId],
        decision: ReallocationDecision,
    ) -> BatchResult<Reallocation, ReallocationId> {
        let mut result = BatchResult::new();
        for id in ids {
            result.record(id.clone(), self.decide_reallocation(id, decision));
        }
        result
    }

    pub fn bulk_delete(&self, ids: &[ReallocationId]) -> BatchResult<ReallocationId, ReallocationId> {
        let mut result = BatchResult::new();
        for id in ids {
            result.record(id.clone(), self.delete_reallocation(id).map(|()| id.clone()));
        }
        result
    }

    pub fn reallocation(&self, id: &ReallocationId) -> Result<Reallocation, ServiceError> {
        self.repository
            .fetch_reallocation(id)?
            .ok_or_else(|| ServiceError::ReallocationNotFound(id.clone()))
    }

    pub fn reallocations(
        &self,
        filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, ServiceError> {
        let mut reallocations = self.repository.reallocations(filter)?;
        reallocations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reallocations)
    }

    pub fn reallocation_opportunities(
        &self,
        program: Program,
        year: i32,
    ) -> Vec<ReallocationOpportunity> {
        reallocation_opportunities(
            program,
            year,
            &self.dataset.communities,
            &self.dataset.sites,
            &self.dataset.adjacency,
            &self.calculator,
        )
    }
}

/// Error raised by the compliance service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Event(#[from] EventOffsetError),
    #[error(transparent)]
    Reallocation(#[from] ReallocationError),
    #[error("community {0} was not found")]
    UnknownCommunity(CommunityId),
    #[error("site {0} was not found")]
    UnknownSite(SiteId),
    #[error("reallocation {0} was not found")]
    ReallocationNotFound(ReallocationId),
}
