//! Required-site calculation.
//!
//! The calculator is driven by active regulatory rules and falls back to the
//! built-in population bands when no rule covers a population.

mod bands;
mod rules;

pub use bands::{required_sites, required_sites_for_tag, METRO_THRESHOLD, MINIMUM_SERVED_POPULATION};
pub use rules::{
    OffsetLimits, RegulatoryRule, RuleBook, RuleCategory, RuleParameters, RuleStatus, RuleType,
    DEFAULT_ADJACENT_CAP_PERCENTAGE, DEFAULT_EVENT_CAP_PERCENTAGE,
};

use super::domain::{Community, Program};

#[derive(Debug, Clone, Default)]
pub struct RequirementCalculator {
    rules: RuleBook,
}

impl RequirementCalculator {
    pub fn new(rules: RuleBook) -> Self {
        Self { rules }
    }

    /// Calculator seeded with the standard program rules.
    pub fn standard() -> Self {
        Self::new(RuleBook::standard())
    }

    pub fn rules(&self) -> &RuleBook {
        &self.rules
    }

    pub fn required(&self, population: u64, program: Program) -> u32 {
        self.rules
            .requirement_for(population, program)
            .unwrap_or_else(|| required_sites(population, program))
    }

    pub fn required_for(&self, community: &Community, program: Program) -> u32 {
        self.required(community.population, program)
    }

    pub fn limits(&self, program: Program) -> OffsetLimits {
        self.rules.offset_limits(program)
    }
}
