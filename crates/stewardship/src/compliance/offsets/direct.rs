use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::super::domain::{Community, CommunityId, Program};
use super::super::requirements::RequirementCalculator;
use super::{apply_offset, clamp_percentage};

/// Direct-service offset settings for one program year.
///
/// `version` is bumped every time the configuration is saved so callers can tell
/// which revision a preview was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectOffsetConfig {
    pub program: Program,
    pub year: i32,
    pub global_percentage: f64,
    #[serde(default)]
    pub community_overrides: BTreeMap<CommunityId, f64>,
    #[serde(default)]
    pub version: u32,
}

impl DirectOffsetConfig {
    pub fn new(program: Program, year: i32, global_percentage: f64) -> Self {
        Self {
            program,
            year,
            global_percentage: clamp_percentage(global_percentage),
            community_overrides: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn with_override(mut self, community_id: CommunityId, percentage: f64) -> Self {
        self.community_overrides
            .insert(community_id, clamp_percentage(percentage));
        self
    }

    /// Copy of the configuration with every percentage clamped into range.
    pub fn clamped(mut self) -> Self {
        self.global_percentage = clamp_percentage(self.global_percentage);
        for value in self.community_overrides.values_mut() {
            *value = clamp_percentage(*value);
        }
        self
    }

    pub fn percentage_for(&self, community_id: &CommunityId) -> f64 {
        clamp_percentage(
            self.community_overrides
                .get(community_id)
                .copied()
                .unwrap_or(self.global_percentage),
        )
    }

    pub fn is_overridden(&self, community_id: &CommunityId) -> bool {
        self.community_overrides.contains_key(community_id)
    }

    pub fn adjusted_required(&self, community_id: &CommunityId, required: u32) -> u32 {
        apply_offset(required, self.percentage_for(community_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectOffsetAdjustment {
    pub community_id: CommunityId,
    pub community_name: String,
    pub population: u64,
    pub original_required: u32,
    pub percentage: f64,
    pub overridden: bool,
    pub adjusted_required: u32,
    pub reduction: u32,
}

/// Recompute every community's requirement under the direct-service offset. Site
/// inventory plays no part: the requirement shrinks unconditionally.
pub fn direct_offset_adjustments(
    communities: &[Community],
    calculator: &RequirementCalculator,
    config: &DirectOffsetConfig,
) -> Vec<DirectOffsetAdjustment> {
    communities
        .iter()
        .map(|community| {
            let original_required = calculator.required_for(community, config.program);
            let percentage = config.percentage_for(&community.id);
            let adjusted_required = apply_offset(original_required, percentage);

            DirectOffsetAdjustment {
                community_id: community.id.clone(),
                community_name: community.name.clone(),
                population: community.population,
                original_required,
                percentage,
                overridden: config.is_overridden(&community.id),
                adjusted_required,
                reduction: original_required.saturating_sub(adjusted_required),
            }
        })
        .collect()
}
