use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CommunityId, Program, SiteId};
use super::reallocation::{Reallocation, ReallocationId, ReallocationStatus};

/// Global direct-service offset for a program year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectServiceOffset {
    pub program: Program,
    pub year: i32,
    pub percentage: f64,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

/// Per-community override of the global direct-service offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityOffset {
    pub community_id: CommunityId,
    pub program: Program,
    pub year: i32,
    pub percentage: f64,
    pub updated_at: DateTime<Utc>,
}

/// Events applied to one community's shortfall for a program year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventApplication {
    pub community_id: CommunityId,
    pub program: Program,
    pub year: i32,
    pub event_site_ids: Vec<SiteId>,
    pub applied_at: DateTime<Utc>,
}

/// Listing filter for stored reallocations. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReallocationFilter {
    #[serde(default)]
    pub program: Option<Program>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub status: Option<ReallocationStatus>,
    #[serde(default)]
    pub community_id: Option<CommunityId>,
}

impl ReallocationFilter {
    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn matches(&self, reallocation: &Reallocation) -> bool {
        self.program.map_or(true, |p| p == reallocation.program)
            && self.year.map_or(true, |y| y == reallocation.year)
            && self.status.map_or(true, |s| s == reallocation.status)
            && self.community_id.as_ref().map_or(true, |id| {
                *id == reallocation.from_community
                    || reallocation.to_community.as_ref() == Some(id)
            })
    }
}

/// Storage abstraction for offset configuration, event applications, and
/// reallocations.
pub trait OffsetRepository: Send + Sync {
    fn direct_offset(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Option<DirectServiceOffset>, RepositoryError>;
    fn upsert_direct_offset(&self, offset: DirectServiceOffset) -> Result<(), RepositoryError>;
    fn delete_direct_offset(&self, program: Program, year: i32) -> Result<(), RepositoryError>;

    fn community_offsets(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<CommunityOffset>, RepositoryError>;
    /// Swap the full override set for a program year.
    fn replace_community_offsets(
        &self,
        program: Program,
        year: i32,
        offsets: Vec<CommunityOffset>,
    ) -> Result<(), RepositoryError>;

    fn event_applications(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<EventApplication>, RepositoryError>;
    fn upsert_event_application(&self, application: EventApplication)
        -> Result<(), RepositoryError>;
    fn delete_event_application(
        &self,
        community_id: &CommunityId,
        program: Program,
        year: i32,
    ) -> Result<(), RepositoryError>;

    fn insert_reallocation(&self, reallocation: Reallocation)
        -> Result<Reallocation, RepositoryError>;
    fn update_reallocation(&self, reallocation: Reallocation) -> Result<(), RepositoryError>;
    fn fetch_reallocation(
        &self,
        id: &ReallocationId,
    ) -> Result<Option<Reallocation>, RepositoryError>;
    fn reallocations(
        &self,
        filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, RepositoryError>;
    fn delete_reallocation(&self, id: &ReallocationId) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
