use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;

use super::common::*;
use crate::compliance::aggregate::{ComplianceQuery, ComplianceRow, OffsetToggles};
use crate::compliance::domain::Program;
use crate::compliance::memory::InMemoryOffsetRepository;
use crate::compliance::offsets::{DirectOffsetConfig, EventOffsetError};
use crate::compliance::reallocation::{
    ReallocationCandidate, ReallocationDecision, ReallocationError, ReallocationId, ReallocationKind,
    ReallocationStatus,
};
use crate::compliance::repository::{
    DirectServiceOffset, EventApplication, OffsetRepository, ReallocationFilter, RepositoryError,
};
use crate::compliance::service::{ComplianceService, ServiceError};

fn paint_move(site: &str, from: &str, to: &str) -> ReallocationCandidate {
    candidate(site, from, Some(to), Program::Paint, ReallocationKind::Site, 5.0)
}

fn alpha_row(
    service: &ComplianceService<InMemoryOffsetRepository>,
    offsets: OffsetToggles,
) -> ComplianceRow {
    let mut query = ComplianceQuery::for_year(YEAR);
    query.program = Some(Program::Paint);
    query.search = Some("alpha".to_string());
    query.offsets = offsets;

    let report = service.compliance_report(&query).expect("report builds");
    report.rows.items.into_iter().next().expect("alpha row")
}

#[test]
fn required_sites_accepts_raw_program_tags() {
    let (service, _) = build_service();
    assert_eq!(service.required_sites("paint", 400_000), 10);
    assert_eq!(service.required_sites("Lighting", 30_000), 2);
    assert_eq!(service.required_sites("batteries", 400_000), 0);
    assert_eq!(service.default_year(), YEAR);
}

#[test]
fn saving_direct_offsets_bumps_the_version() {
    let (service, repository) = build_service();

    let first = service
        .save_direct_offset(
            DirectOffsetConfig::new(Program::Paint, YEAR, 40.0).with_override(cid("delta"), 0.0),
        )
        .expect("first save");
    assert_eq!(first.version, 1);

    let second = service
        .save_direct_offset(DirectOffsetConfig::new(Program::Paint, YEAR, 120.0))
        .expect("second save");
    assert_eq!(second.version, 2);
    assert_eq!(second.global_percentage, 100.0);

    let stored = service
        .direct_offset(Program::Paint, YEAR)
        .expect("lookup succeeds")
        .expect("config stored");
    assert_eq!(stored.version, 2);
    assert!(stored.community_overrides.is_empty());
    assert!(repository
        .community_offsets(Program::Paint, YEAR)
        .expect("overrides readable")
        .is_empty());
}

#[test]
fn saving_rejects_overrides_for_unknown_communities() {
    let (service, repository) = build_service();
    let result = service.save_direct_offset(
        DirectOffsetConfig::new(Program::Paint, YEAR, 10.0).with_override(cid("atlantis"), 5.0),
    );

    match result {
        Err(ServiceError::UnknownCommunity(id)) => assert_eq!(id, cid("atlantis")),
        other => panic!("expected unknown community, got {other:?}"),
    }
    assert!(repository
        .direct_offset(Program::Paint, YEAR)
        .expect("lookup succeeds")
        .is_none());
}

#[test]
fn preview_uses_the_stored_configuration_by_default() {
    let (service, _) = build_service();
    let untouched = service
        .direct_offset_preview(Program::Paint, YEAR, None)
        .expect("preview builds");
    assert!(untouched
        .iter()
        .all(|row| row.adjusted_required == row.original_required));

    service
        .save_direct_offset(DirectOffsetConfig::new(Program::Paint, YEAR, 50.0))
        .expect("save");
    let stored = service
        .direct_offset_preview(Program::Paint, YEAR, None)
        .expect("preview builds");
    assert_eq!(stored[0].adjusted_required, 5);

    let candidate = service
        .direct_offset_preview(
            Program::Paint,
            YEAR,
            Some(DirectOffsetConfig::new(Program::Paint, YEAR, 90.0)),
        )
        .expect("preview builds");
    assert_eq!(candidate[0].adjusted_required, 1);
    assert_eq!(
        service
            .direct_offset(Program::Paint, YEAR)
            .expect("lookup")
            .expect("stored")
            .global_percentage,
        50.0
    );
}

#[test]
fn clearing_direct_offsets_removes_the_configuration() {
    let (service, _) = build_service();
    service
        .save_direct_offset(DirectOffsetConfig::new(Program::Paint, YEAR, 25.0))
        .expect("save");

    service
        .clear_direct_offset(Program::Paint, YEAR)
        .expect("clear");
    assert!(service
        .direct_offset(Program::Paint, YEAR)
        .expect("lookup")
        .is_none());

    assert!(matches!(
        service.clear_direct_offset(Program::Paint, YEAR),
        Err(ServiceError::Repository(RepositoryError::NotFound))
    ));
}

#[test]
fn direct_offset_flows_into_the_report() {
    let (service, _) = build_service();
    service
        .save_direct_offset(DirectOffsetConfig::new(Program::Paint, YEAR, 50.0))
        .expect("save");

    let with = alpha_row(
        &service,
        OffsetToggles {
            direct_offset: true,
            ..OffsetToggles::default()
        },
    );
    assert_eq!(with.adjusted_required, 5);
    assert_eq!(with.excess, 1);

    let without = alpha_row(&service, OffsetToggles::default());
    assert_eq!(without.adjusted_required, 10);
}

#[test]
fn event_applications_are_persisted_and_restored() {
    let (service, repository) = build_service();
    let outcome = service
        .apply_events(
            Program::Paint,
            YEAR,
            &cid("alpha"),
            vec![sid("a-e1"), sid("a-e2")],
        )
        .expect("events apply");
    assert_eq!(outcome.remaining_shortfall, 2);

    let stored = repository
        .event_applications(Program::Paint, YEAR)
        .expect("applications readable");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].event_site_ids, vec![sid("a-e1"), sid("a-e2")]);

    let ledger = service.event_ledger(Program::Paint, YEAR).expect("ledger");
    assert_eq!(ledger.total_applied(), 2);

    let row = alpha_row(&service, OffsetToggles::all());
    assert_eq!(row.offset_credit, 2);
    assert_eq!(row.shortfall, 2);

    service
        .apply_events(Program::Paint, YEAR, &cid("alpha"), Vec::new())
        .expect("empty selection clears");
    assert!(repository
        .event_applications(Program::Paint, YEAR)
        .expect("applications readable")
        .is_empty());
}

#[test]
fn stale_event_applications_are_skipped() {
    let (service, repository) = build_service();
    repository
        .upsert_event_application(EventApplication {
            community_id: cid("alpha"),
            program: Program::Paint,
            year: YEAR,
            event_site_ids: vec![sid("a-1")],
            applied_at: Utc::now(),
        })
        .expect("seed stored application");

    let ledger = service.event_ledger(Program::Paint, YEAR).expect("ledger");
    assert_eq!(ledger.total_applied(), 0);
}

#[test]
fn event_errors_surface_from_the_ledger() {
    let (service, repository) = build_service();

    match service.apply_events(Program::Paint, YEAR, &cid("alpha"), vec![sid("b-1")]) {
        Err(ServiceError::Event(EventOffsetError::IneligibleEvent { site, .. })) => {
            assert_eq!(site, sid("b-1"))
        }
        other => panic!("expected ineligible event, got {other:?}"),
    }
    assert!(repository
        .event_applications(Program::Paint, YEAR)
        .expect("applications readable")
        .is_empty());

    assert!(matches!(
        service.clear_events(Program::Paint, YEAR, &cid("atlantis")),
        Err(ServiceError::UnknownCommunity(_))
    ));
    service
        .clear_events(Program::Paint, YEAR, &cid("charlie"))
        .expect("clearing nothing succeeds");
}

#[test]
fn apply_all_persists_each_community() {
    let (service, repository) = build_service();
    let report = service
        .apply_all_events(Program::Paint, YEAR)
        .expect("bulk apply");

    assert_eq!(report.cap, 6);
    assert_eq!(report.total_applied, 4);
    assert!(!report.cap_reached);
    assert_eq!(report.results.succeeded.len(), 2);
    assert!(report.results.is_complete_success());
    assert_eq!(
        repository
            .event_applications(Program::Paint, YEAR)
            .expect("applications readable")
            .len(),
        2
    );
}

#[test]
fn apply_all_reports_the_cap() {
    let repository = Arc::new(InMemoryOffsetRepository::new());
    let service = ComplianceService::new(
        Arc::new(dataset_with_rules(event_cap_rules(20))),
        repository.clone(),
    )
    .with_default_year(YEAR);

    let report = service
        .apply_all_events(Program::Paint, YEAR)
        .expect("bulk apply");
    assert_eq!(report.cap, 3);
    assert!(report.cap_reached);
    assert_eq!(report.skipped, vec![cid("charlie")]);
    assert_eq!(report.total_applied, 3);
}

#[test]
fn proposals_are_pending_or_rejected_by_validation() {
    let (service, _) = build_service();

    let pending = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(pending.status, ReallocationStatus::Pending);
    assert!(pending.id.0.starts_with("realloc-"));

    let rejected = service
        .propose_reallocation(paint_move("b-m1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(rejected.status, ReallocationStatus::Rejected);
    assert!(!rejected.validation_errors.is_empty());
    assert_ne!(pending.id, rejected.id);

    assert!(matches!(
        service.propose_reallocation(paint_move("zz-9", "bravo", "alpha")),
        Err(ServiceError::UnknownSite(_))
    ));
}

#[test]
fn approved_reallocations_change_compliance() {
    let (service, _) = build_service();
    let proposal = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");

    let before = alpha_row(&service, OffsetToggles::all());
    assert_eq!(before.offset_credit, 0);

    service
        .decide_reallocation(&proposal.id, ReallocationDecision::Approve)
        .expect("approve");
    let after = alpha_row(&service, OffsetToggles::all());
    assert_eq!(after.offset_credit, 1);
    assert_eq!(after.shortfall, 3);

    match service.decide_reallocation(&proposal.id, ReallocationDecision::Reject) {
        Err(ServiceError::Reallocation(ReallocationError::AlreadyDecided { .. })) => {}
        other => panic!("expected already decided, got {other:?}"),
    }

    service
        .delete_reallocation(&proposal.id)
        .expect("delete approved reallocation");
    let reverted = alpha_row(&service, OffsetToggles::all());
    assert_eq!(reverted.offset_credit, 0);
}

#[test]
fn bulk_operations_report_each_item() {
    let (service, _) = build_service();
    let first = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    let second = service
        .propose_reallocation(paint_move("b-p2", "bravo", "alpha"))
        .expect("proposal stored");
    let missing = ReallocationId("realloc-missing".to_string());

    let decided = service.bulk_decide(
        &[first.id.clone(), missing.clone(), second.id.clone()],
        ReallocationDecision::Approve,
    );
    assert_eq!(decided.succeeded.len(), 2);
    assert_eq!(decided.failure_count(), 1);
    assert_eq!(decided.failed[0].item, missing);
    assert!(decided.failed[0].error.contains("not found"));

    let approved = service
        .reallocations(&ReallocationFilter {
            status: Some(ReallocationStatus::Approved),
            ..ReallocationFilter::default()
        })
        .expect("listing");
    assert_eq!(approved.len(), 2);

    let deleted = service.bulk_delete(&[first.id.clone(), first.id.clone()]);
    assert_eq!(deleted.succeeded, vec![first.id.clone()]);
    assert_eq!(deleted.failure_count(), 1);

    assert!(matches!(
        service.reallocation(&first.id),
        Err(ServiceError::ReallocationNotFound(_))
    ));
    assert_eq!(
        service
            .reallocations(&ReallocationFilter::for_year(YEAR))
            .expect("listing")
            .len(),
        1
    );
}

#[test]
fn reallocation_listing_filters_by_community() {
    let (service, _) = build_service();
    service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    service
        .propose_reallocation(paint_move("b-p2", "bravo", "delta"))
        .expect("proposal stored");

    let filter = ReallocationFilter {
        community_id: Some(cid("alpha")),
        ..ReallocationFilter::default()
    };
    let listed = service.reallocations(&filter).expect("listing");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].site_id, sid("b-p1"));

    let filter = ReallocationFilter {
        community_id: Some(cid("bravo")),
        ..ReallocationFilter::default()
    };
    assert_eq!(service.reallocations(&filter).expect("listing").len(), 2);
}

#[test]
fn repository_failures_are_propagated() {
    let service = service_with(ConflictRepository);
    assert!(matches!(
        service.save_direct_offset(DirectOffsetConfig::new(Program::Paint, YEAR, 10.0)),
        Err(ServiceError::Repository(RepositoryError::Conflict))
    ));

    let service = service_with(UnavailableRepository);
    assert!(service
        .compliance_report(&ComplianceQuery::for_year(YEAR))
        .is_ok());
    let mut query = ComplianceQuery::for_year(YEAR);
    query.offsets = OffsetToggles::all();
    assert!(matches!(
        service.compliance_report(&query),
        Err(ServiceError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[test]
fn inactive_sites_cannot_be_proposed() {
    let (service, _) = build_service();
    let proposal = service
        .propose_reallocation(paint_move("c-x1", "charlie", "alpha"))
        .expect("proposal stored");

    assert_eq!(proposal.status, ReallocationStatus::Rejected);
    assert!(proposal
        .validation_errors
        .contains(&"Site c-x1 is not an active site in 2025".to_string()));
}

#[test]
fn compliant_destinations_cannot_receive_sites() {
    let (service, _) = build_service();
    let proposal = service
        .propose_reallocation(paint_move("b-p1", "bravo", "delta"))
        .expect("proposal stored");

    assert_eq!(proposal.status, ReallocationStatus::Rejected);
    assert_eq!(
        proposal.validation_errors,
        vec!["Delta has no Paint shortfall to offset".to_string()]
    );
}

#[test]
fn a_site_sits_in_one_open_reallocation_at_a_time() {
    let (service, _) = build_service();
    let first = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(first.status, ReallocationStatus::Pending);

    let duplicate = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(duplicate.status, ReallocationStatus::Rejected);
    assert!(duplicate
        .validation_errors
        .iter()
        .any(|error| error.contains("already in pending reallocation")));

    service
        .decide_reallocation(&first.id, ReallocationDecision::Approve)
        .expect("approval");
    let errors = service
        .validate_reallocation(&paint_move("b-p1", "bravo", "alpha"))
        .expect("validation runs");
    assert!(errors
        .iter()
        .any(|error| error.contains("already in approved reallocation")));

    service.delete_reallocation(&first.id).expect("deleted");
    service.delete_reallocation(&duplicate.id).expect("deleted");
    let again = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(again.status, ReallocationStatus::Pending);
}

#[test]
fn rejected_reallocations_do_not_block_the_site() {
    let (service, _) = build_service();
    let first = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    service
        .decide_reallocation(&first.id, ReallocationDecision::Reject)
        .expect("rejection");

    let again = service
        .propose_reallocation(paint_move("b-p1", "bravo", "alpha"))
        .expect("proposal stored");
    assert_eq!(again.status, ReallocationStatus::Pending);
}

#[test]
fn applied_events_cannot_also_be_reallocated() {
    let (service, _) = build_service();
    service
        .apply_events(Program::Paint, YEAR, &cid("alpha"), vec![sid("a-e1")])
        .expect("event applied");

    let event_move = |site: &str| {
        candidate(
            site,
            "alpha",
            Some("charlie"),
            Program::Paint,
            ReallocationKind::Event,
            20.0,
        )
    };

    let applied = service
        .propose_reallocation(event_move("a-e1"))
        .expect("proposal stored");
    assert_eq!(applied.status, ReallocationStatus::Rejected);
    assert!(applied
        .validation_errors
        .iter()
        .any(|error| error.contains("already applied as an event offset")));

    let free = service
        .propose_reallocation(event_move("a-e2"))
        .expect("proposal stored");
    assert_eq!(free.status, ReallocationStatus::Pending, "{:?}", free.validation_errors);
}

#[test]
fn concurrent_event_applications_respect_the_cap() {
    for _ in 0..20 {
        let service = ComplianceService::new(
            Arc::new(dataset_with_rules(event_cap_rules(20))),
            Arc::new(InMemoryOffsetRepository::new()),
        )
        .with_default_year(YEAR);
        let barrier = Barrier::new(2);

        let (alpha, charlie) = thread::scope(|scope| {
            let alpha = scope.spawn(|| {
                barrier.wait();
                service.apply_events(
                    Program::Paint,
                    YEAR,
                    &cid("alpha"),
                    vec![sid("a-e1"), sid("a-e2"), sid("a-e3")],
                )
            });
            let charlie = scope.spawn(|| {
                barrier.wait();
                service.apply_events(Program::Paint, YEAR, &cid("charlie"), vec![sid("c-e1")])
            });
            (
                alpha.join().expect("alpha thread"),
                charlie.join().expect("charlie thread"),
            )
        });

        let outcomes = [alpha, charlie];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|outcome| matches!(
            outcome,
            Err(ServiceError::Event(EventOffsetError::CapExceeded { cap: 3, .. }))
        )));

        let ledger = service.event_ledger(Program::Paint, YEAR).expect("ledger");
        assert_eq!(ledger.cap(), 3);
        assert!(ledger.total_applied() <= ledger.cap());
    }
}

#[test]
fn failed_override_writes_restore_the_previous_offset() {
    let repository = FailingOverridesRepository::default();
    repository
        .inner
        .upsert_direct_offset(DirectServiceOffset {
            program: Program::Paint,
            year: YEAR,
            percentage: 10.0,
            version: 1,
            updated_at: Utc::now(),
        })
        .expect("seeded");
    let service = service_with(repository);

    let result = service.save_direct_offset(
        DirectOffsetConfig::new(Program::Paint, YEAR, 40.0).with_override(cid("alpha"), 0.0),
    );
    assert!(matches!(
        result,
        Err(ServiceError::Repository(RepositoryError::Unavailable(_)))
    ));

    let stored = service
        .direct_offset(Program::Paint, YEAR)
        .expect("read")
        .expect("previous offset kept");
    assert_eq!(stored.version, 1);
    assert_eq!(stored.global_percentage, 10.0);
}

#[test]
fn failed_first_save_leaves_no_offset_behind() {
    let service = service_with(FailingOverridesRepository::default());

    let result = service.save_direct_offset(
        DirectOffsetConfig::new(Program::Paint, YEAR, 40.0).with_override(cid("alpha"), 0.0),
    );
    assert!(result.is_err());
    assert!(service
        .direct_offset(Program::Paint, YEAR)
        .expect("read")
        .is_none());
}
