//! Adjacent-community reallocation: eligibility, validation, and the reviewable
//! reallocation record.

mod adjacency;
mod eligibility;
mod validation;

pub use adjacency::AdjacencyGraph;
pub use eligibility::{
    eligible_excess, inventory_errors, is_reallocatable, reallocation_opportunities,
    DestinationCandidate, ReallocationOpportunity,
};
pub use validation::{validate_reallocation, ReallocationCandidate, ReallocationKind};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CommunityId, Program, SiteId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReallocationId(pub String);

impl fmt::Display for ReallocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReallocationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReallocationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReallocationDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReallocationError {
    #[error("reallocation {id} is already {status} and cannot be changed")]
    AlreadyDecided {
        id: ReallocationId,
        status: &'static str,
    },
}

/// Reviewable reallocation of a site between communities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reallocation {
    pub id: ReallocationId,
    pub site_id: SiteId,
    pub from_community: CommunityId,
    pub to_community: Option<CommunityId>,
    pub program: Program,
    pub year: i32,
    pub kind: ReallocationKind,
    pub percentage: f64,
    pub rationale: String,
    pub status: ReallocationStatus,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Reallocation {
    /// Record a candidate with its validation outcome. Any validation error rejects
    /// the reallocation immediately; otherwise it waits for review.
    pub fn propose(
        id: ReallocationId,
        candidate: ReallocationCandidate,
        validation_errors: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if validation_errors.is_empty() {
            ReallocationStatus::Pending
        } else {
            ReallocationStatus::Rejected
        };

        Self {
            id,
            site_id: candidate.site_id,
            from_community: candidate.from_community,
            to_community: candidate.to_community,
            program: candidate.program,
            year: candidate.year,
            kind: candidate.kind,
            percentage: candidate.percentage,
            rationale: candidate.rationale,
            status,
            validation_errors,
            created_at: now,
            decided_at: if status == ReallocationStatus::Rejected {
                Some(now)
            } else {
                None
            },
        }
    }

    pub fn decide(
        &mut self,
        decision: ReallocationDecision,
        now: DateTime<Utc>,
    ) -> Result<(), ReallocationError> {
        if self.status != ReallocationStatus::Pending {
            return Err(ReallocationError::AlreadyDecided {
                id: self.id.clone(),
                status: self.status.label(),
            });
        }

        self.status = match decision {
            ReallocationDecision::Approve => ReallocationStatus::Approved,
            ReallocationDecision::Reject => ReallocationStatus::Rejected,
        };
        self.decided_at = Some(now);
        Ok(())
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReallocationStatus::Approved
    }

    /// Whether the source community gives up a base-inventory site.
    pub fn moves_inventory(&self) -> bool {
        matches!(
            self.kind,
            ReallocationKind::Site | ReallocationKind::DirectReturn
        )
    }
}
