use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{CommunityId, Program};
use super::reallocation::{Reallocation, ReallocationId};
use super::repository::{
    CommunityOffset, DirectServiceOffset, EventApplication, OffsetRepository, ReallocationFilter,
    RepositoryError,
};

type ProgramYear = (Program, i32);

#[derive(Debug, Default)]
struct Tables {
    direct: BTreeMap<ProgramYear, DirectServiceOffset>,
    overrides: BTreeMap<ProgramYear, Vec<CommunityOffset>>,
    events: BTreeMap<(ProgramYear, CommunityId), EventApplication>,
    reallocations: BTreeMap<ReallocationId, Reallocation>,
}

/// Process-local repository used by the API binary and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOffsetRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryOffsetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl OffsetRepository for InMemoryOffsetRepository {
    fn direct_offset(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Option<DirectServiceOffset>, RepositoryError> {
        Ok(self.tables()?.direct.get(&(program, year)).cloned())
    }

    fn upsert_direct_offset(&self, offset: DirectServiceOffset) -> Result<(), RepositoryError> {
        self.tables()?
            .direct
            .insert((offset.program, offset.year), offset);
        Ok(())
    }

    fn delete_direct_offset(&self, program: Program, year: i32) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        let removed = tables.direct.remove(&(program, year));
        tables.overrides.remove(&(program, year));
        removed.map(|_| ()).ok_or(RepositoryError::NotFound)
    }

    fn community_offsets(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<CommunityOffset>, RepositoryError> {
        Ok(self
            .tables()?
            .overrides
            .get(&(program, year))
            .cloned()
            .unwrap_or_default())
    }

    fn replace_community_offsets(
        &self,
        program: Program,
        year: i32,
        offsets: Vec<CommunityOffset>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if offsets.is_empty() {
            tables.overrides.remove(&(program, year));
        } else {
            tables.overrides.insert((program, year), offsets);
        }
        Ok(())
    }

    fn event_applications(
        &self,
        program: Program,
        year: i32,
    ) -> Result<Vec<EventApplication>, RepositoryError> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|(((p, y), _), _)| *p == program && *y == year)
            .map(|(_, application)| application.clone())
            .collect())
    }

    fn upsert_event_application(
        &self,
        application: EventApplication,
    ) -> Result<(), RepositoryError> {
        let key = (
            (application.program, application.year),
            application.community_id.clone(),
        );
        self.tables()?.events.insert(key, application);
        Ok(())
    }

    fn delete_event_application(
        &self,
        community_id: &CommunityId,
        program: Program,
        year: i32,
    ) -> Result<(), RepositoryError> {
        self.tables()?
            .events
            .remove(&((program, year), community_id.clone()))
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn insert_reallocation(
        &self,
        reallocation: Reallocation,
    ) -> Result<Reallocation, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.reallocations.contains_key(&reallocation.id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .reallocations
            .insert(reallocation.id.clone(), reallocation.clone());
        Ok(reallocation)
    }

    fn update_reallocation(&self, reallocation: Reallocation) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        match tables.reallocations.get_mut(&reallocation.id) {
            Some(existing) => {
                *existing = reallocation;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_reallocation(
        &self,
        id: &ReallocationId,
    ) -> Result<Option<Reallocation>, RepositoryError> {
        Ok(self.tables()?.reallocations.get(id).cloned())
    }

    fn reallocations(
        &self,
        filter: &ReallocationFilter,
    ) -> Result<Vec<Reallocation>, RepositoryError> {
        Ok(self
            .tables()?
            .reallocations
            .values()
            .filter(|reallocation| filter.matches(reallocation))
            .cloned()
            .collect())
    }

    fn delete_reallocation(&self, id: &ReallocationId) -> Result<(), RepositoryError> {
        self.tables()?
            .reallocations
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}
