use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::super::domain::{Community, CommunityId, Program, Site, SiteId};
use super::super::requirements::RequirementCalculator;

/// Errors raised while applying events against a community's shortfall.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventOffsetError {
    #[error("community {0} is not part of this program year")]
    UnknownCommunity(CommunityId),
    #[error("site {site} is not an eligible event for community {community}")]
    IneligibleEvent {
        community: CommunityId,
        site: SiteId,
    },
    #[error("applying events would raise the total to {requested}, above the event offset cap of {cap}")]
    CapExceeded { cap: u32, requested: u32 },
}

/// Event-offset position of a single community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCommunityState {
    pub community_id: CommunityId,
    pub community_name: String,
    pub required: u32,
    pub actual: u32,
    pub shortfall: u32,
    pub eligible_events: Vec<SiteId>,
    pub applied: BTreeSet<SiteId>,
}

impl EventCommunityState {
    pub fn applied_count(&self) -> u32 {
        count(self.applied.len())
    }

    /// Events beyond the shortfall are allowed but do not offset anything.
    pub fn is_over_selected(&self) -> bool {
        self.applied_count() > self.shortfall
    }

    pub fn credited(&self) -> u32 {
        self.applied_count().min(self.shortfall)
    }

    pub fn remaining_shortfall(&self) -> u32 {
        self.shortfall.saturating_sub(self.applied_count())
    }

    fn unapplied_events(&self) -> impl Iterator<Item = &SiteId> {
        self.eligible_events
            .iter()
            .filter(|site| !self.applied.contains(*site))
    }
}

/// Result of replacing a community's applied event set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventApplicationOutcome {
    pub community_id: CommunityId,
    pub applied: Vec<SiteId>,
    pub shortfall: u32,
    pub credited: u32,
    pub remaining_shortfall: u32,
    pub over_selected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventBulkOutcome {
    pub applied: Vec<EventApplicationOutcome>,
    pub skipped: Vec<CommunityId>,
    pub cap_reached: bool,
}

/// Serializable snapshot of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOffsetOverview {
    pub program: Program,
    pub year: i32,
    pub cap_percentage: u32,
    pub aggregate_required: u32,
    pub cap: u32,
    pub total_applied: u32,
    pub remaining_capacity: u32,
    pub communities: Vec<EventCommunityState>,
    pub warnings: Vec<String>,
}

/// Tracks applied events for one program year and enforces the aggregate cap.
#[derive(Debug, Clone)]
pub struct EventOffsetLedger {
    program: Program,
    year: i32,
    cap_percentage: u32,
    aggregate_required: u32,
    cap: u32,
    communities: BTreeMap<CommunityId, EventCommunityState>,
}

impl EventOffsetLedger {
    pub fn build(
        program: Program,
        year: i32,
        communities: &[Community],
        sites: &[Site],
        calculator: &RequirementCalculator,
    ) -> Self {
        let cap_percentage = calculator.limits(program).event_cap_percentage;
        let mut states = BTreeMap::new();
        let mut aggregate_required: u64 = 0;

        for community in communities {
            let required = calculator.required_for(community, program);
            aggregate_required += u64::from(required);

            let in_community = sites
                .iter()
                .filter(|site| site.community_id == community.id);
            let mut actual = 0;
            let mut eligible_events = Vec::new();
            for site in in_community {
                if site.counts_toward(program, year) {
                    actual += 1;
                } else if site.is_eligible_event(program, year) {
                    eligible_events.push(site.id.clone());
                }
            }
            eligible_events.sort();

            states.insert(
                community.id.clone(),
                EventCommunityState {
                    community_id: community.id.clone(),
                    community_name: community.name.clone(),
                    required,
                    actual,
                    shortfall: required.saturating_sub(actual),
                    eligible_events,
                    applied: BTreeSet::new(),
                },
            );
        }

        let cap = aggregate_required * u64::from(cap_percentage) / 100;

        Self {
            program,
            year,
            cap_percentage,
            aggregate_required: u32::try_from(aggregate_required).unwrap_or(u32::MAX),
            cap: u32::try_from(cap).unwrap_or(u32::MAX),
            communities: states,
        }
    }

    pub fn program(&self) -> Program {
        self.program
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn cap_percentage(&self) -> u32 {
        self.cap_percentage
    }

    pub fn aggregate_required(&self) -> u32 {
        self.aggregate_required
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn total_applied(&self) -> u32 {
        self.communities
            .values()
            .map(EventCommunityState::applied_count)
            .sum()
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.cap.saturating_sub(self.total_applied())
    }

    pub fn community(&self, community_id: &CommunityId) -> Option<&EventCommunityState> {
        self.communities.get(community_id)
    }

    pub fn communities(&self) -> impl Iterator<Item = &EventCommunityState> {
        self.communities.values()
    }

    /// Replace the community's applied events with `events`.
    ///
    /// The previous selection is discarded, so applying the same set twice leaves
    /// the ledger unchanged. Selecting more events than the shortfall is accepted
    /// with a warning; exceeding the aggregate cap is not.
    pub fn apply(
        &mut self,
        community_id: &CommunityId,
        events: impl IntoIterator<Item = SiteId>,
    ) -> Result<EventApplicationOutcome, EventOffsetError> {
        let selection: BTreeSet<SiteId> = events.into_iter().collect();
        let total_applied = self.total_applied();
        let cap = self.cap;

        let state = self
            .communities
            .get_mut(community_id)
            .ok_or_else(|| EventOffsetError::UnknownCommunity(community_id.clone()))?;

        if let Some(site) = selection
            .iter()
            .find(|site| !state.eligible_events.contains(site))
        {
            return Err(EventOffsetError::IneligibleEvent {
                community: community_id.clone(),
                site: site.clone(),
            });
        }

        let requested = total_applied - state.applied_count() + count(selection.len());
        if requested > cap {
            return Err(EventOffsetError::CapExceeded { cap, requested });
        }

        state.applied = selection;
        Ok(outcome_for(state))
    }

    pub fn overview(&self) -> EventOffsetOverview {
        let warnings = self
            .communities
            .values()
            .filter_map(over_selection_warning)
            .collect();

        EventOffsetOverview {
            program: self.program,
            year: self.year,
            cap_percentage: self.cap_percentage,
            aggregate_required: self.aggregate_required,
            cap: self.cap,
            total_applied: self.total_applied(),
            remaining_capacity: self.remaining_capacity(),
            communities: self.communities.values().cloned().collect(),
            warnings,
        }
    }

    pub fn clear(&mut self, community_id: &CommunityId) -> Result<(), EventOffsetError> {
        let state = self
            .communities
            .get_mut(community_id)
            .ok_or_else(|| EventOffsetError::UnknownCommunity(community_id.clone()))?;
        state.applied.clear();
        Ok(())
    }

    /// Top up every community in shortfall with its unapplied eligible events,
    /// largest remaining shortfall first, stopping at the aggregate cap.
    pub fn apply_all(&mut self) -> EventBulkOutcome {
        let mut order: Vec<(u32, String, CommunityId)> = self
            .communities
            .values()
            .filter(|state| state.remaining_shortfall() > 0)
            .map(|state| {
                (
                    state.remaining_shortfall(),
                    state.community_name.to_lowercase(),
                    state.community_id.clone(),
                )
            })
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut outcome = EventBulkOutcome::default();

        for (remaining, _, community_id) in order {
            let capacity = self.remaining_capacity();
            let Some(state) = self.communities.get(&community_id) else {
                continue;
            };

            let available = count(state.unapplied_events().count());
            if available == 0 {
                continue;
            }

            if capacity == 0 {
                outcome.cap_reached = true;
                outcome.skipped.push(community_id);
                continue;
            }

            let additional = remaining.min(available).min(capacity);
            let selection: Vec<SiteId> = state
                .applied
                .iter()
                .cloned()
                .chain(state.unapplied_events().take(additional as usize).cloned())
                .collect();

            match self.apply(&community_id, selection) {
                Ok(applied) => outcome.applied.push(applied),
                Err(_) => outcome.skipped.push(community_id),
            }
        }

        if self.remaining_capacity() == 0 && self.cap > 0 {
            outcome.cap_reached = true;
        }

        outcome
    }
}

fn over_selection_warning(state: &EventCommunityState) -> Option<String> {
    state.is_over_selected().then(|| {
        format!(
            "{} events selected for {} but the shortfall is {}; the extra events offset nothing",
            state.applied_count(),
            state.community_name,
            state.shortfall
        )
    })
}

fn outcome_for(state: &EventCommunityState) -> EventApplicationOutcome {
    let warnings = over_selection_warning(state).into_iter().collect();

    EventApplicationOutcome {
        community_id: state.community_id.clone(),
        applied: state.applied.iter().cloned().collect(),
        shortfall: state.shortfall,
        credited: state.credited(),
        remaining_shortfall: state.remaining_shortfall(),
        over_selected: state.is_over_selected(),
        warnings,
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
