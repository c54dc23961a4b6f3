use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::super::domain::{OperatorType, Program};
use super::bands::{ceil_div, METRO_THRESHOLD, MINIMUM_SERVED_POPULATION};

pub const DEFAULT_EVENT_CAP_PERCENTAGE: u32 = 35;
pub const DEFAULT_ADJACENT_CAP_PERCENTAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCategory {
    #[serde(rename = "HSP")]
    Hsp,
    #[serde(rename = "EEE")]
    Eee,
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    SiteCalculation,
    MinimumRequirement,
    OffsetEvent,
    OffsetAdjacent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleStatus {
    Active,
    Inactive,
}

/// Free-form parameter bag carried by a regulatory rule. Only the fields relevant to
/// the rule type are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleParameters {
    pub min_population: Option<u64>,
    pub max_population: Option<u64>,
    pub sites_per_population: Option<u64>,
    pub population_offset: Option<u64>,
    pub base_requirement: Option<u32>,
    pub max_offset_percentage: Option<u32>,
    pub applicable_programs: Vec<Program>,
    pub excluded_operator_types: Vec<OperatorType>,
    pub requires_adjacency: Option<bool>,
}

/// Administrative rule record parameterizing the calculator and offset caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatoryRule {
    pub id: String,
    pub program: Program,
    pub category: RuleCategory,
    pub rule_type: RuleType,
    #[serde(default)]
    pub parameters: RuleParameters,
    pub status: RuleStatus,
    #[serde(default)]
    pub description: String,
}

impl RegulatoryRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    pub fn applies_to(&self, program: Program) -> bool {
        self.program == program || self.parameters.applicable_programs.contains(&program)
    }

    pub fn covers_population(&self, population: u64) -> bool {
        let above_min = self
            .parameters
            .min_population
            .map(|min| population >= min)
            .unwrap_or(true);
        let below_max = self
            .parameters
            .max_population
            .map(|max| population <= max)
            .unwrap_or(true);
        above_min && below_max
    }

    /// Site count this rule yields for the population, if it is a requirement rule
    /// whose band covers the population and whose parameters are usable.
    pub fn requirement_for(&self, population: u64) -> Option<u32> {
        if !self.covers_population(population) {
            return None;
        }

        let params = &self.parameters;
        let required = match self.rule_type {
            RuleType::SiteCalculation => {
                let divisor = params.sites_per_population.filter(|divisor| *divisor > 0)?;
                let counted = population.saturating_sub(params.population_offset.unwrap_or(0));
                u64::from(params.base_requirement.unwrap_or(0)) + ceil_div(counted, divisor)
            }
            RuleType::MinimumRequirement => u64::from(params.base_requirement?),
            RuleType::OffsetEvent | RuleType::OffsetAdjacent => return None,
        };

        Some(u32::try_from(required).unwrap_or(u32::MAX))
    }
}

/// Caps and exclusions governing offsets for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetLimits {
    pub event_cap_percentage: u32,
    pub adjacent_cap_percentage: u32,
    pub excluded_operator_types: BTreeSet<OperatorType>,
    pub requires_adjacency: bool,
}

impl Default for OffsetLimits {
    fn default() -> Self {
        Self {
            event_cap_percentage: DEFAULT_EVENT_CAP_PERCENTAGE,
            adjacent_cap_percentage: DEFAULT_ADJACENT_CAP_PERCENTAGE,
            excluded_operator_types: OperatorType::default_reallocation_exclusions(),
            requires_adjacency: true,
        }
    }
}

/// Ordered collection of regulatory rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleBook {
    rules: Vec<RegulatoryRule>,
}

impl RuleBook {
    pub fn new(rules: Vec<RegulatoryRule>) -> Self {
        Self { rules }
    }

    /// The default program rules, equivalent to the built-in population bands.
    pub fn standard() -> Self {
        Self::new(standard_rules())
    }

    pub fn rules(&self) -> &[RegulatoryRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn active_for(
        &self,
        program: Program,
        rule_type: RuleType,
    ) -> impl Iterator<Item = &RegulatoryRule> {
        self.rules.iter().filter(move |rule| {
            rule.is_active() && rule.rule_type == rule_type && rule.applies_to(program)
        })
    }

    /// Site requirement from the first matching active calculation rule, then the
    /// first matching minimum-requirement rule.
    pub fn requirement_for(&self, population: u64, program: Program) -> Option<u32> {
        self.active_for(program, RuleType::SiteCalculation)
            .find_map(|rule| rule.requirement_for(population))
            .or_else(|| {
                self.active_for(program, RuleType::MinimumRequirement)
                    .find_map(|rule| rule.requirement_for(population))
            })
    }

    pub fn offset_limits(&self, program: Program) -> OffsetLimits {
        let mut limits = OffsetLimits::default();

        if let Some(pct) = self
            .active_for(program, RuleType::OffsetEvent)
            .find_map(|rule| rule.parameters.max_offset_percentage)
        {
            limits.event_cap_percentage = pct.min(100);
        }

        if let Some(rule) = self.active_for(program, RuleType::OffsetAdjacent).next() {
            if let Some(pct) = rule.parameters.max_offset_percentage {
                limits.adjacent_cap_percentage = pct.min(100);
            }
            if !rule.parameters.excluded_operator_types.is_empty() {
                limits.excluded_operator_types = rule
                    .parameters
                    .excluded_operator_types
                    .iter()
                    .copied()
                    .collect();
            }
            if let Some(requires) = rule.parameters.requires_adjacency {
                limits.requires_adjacency = requires;
            }
        }

        limits
    }
}

struct BandSpec {
    program: Program,
    lower_bound: u64,
    divisor: u64,
    metro_base: u32,
    metro_divisor: u64,
    small_community_floor: bool,
}

fn standard_rules() -> Vec<RegulatoryRule> {
    let bands = [
        BandSpec {
            program: Program::Paint,
            lower_bound: 5_000,
            divisor: 40_000,
            metro_base: 13,
            metro_divisor: 150_000,
            small_community_floor: true,
        },
        BandSpec {
            program: Program::Solvents,
            lower_bound: 10_000,
            divisor: 250_000,
            metro_base: 2,
            metro_divisor: 300_000,
            small_community_floor: true,
        },
        BandSpec {
            program: Program::Pesticides,
            lower_bound: 10_000,
            divisor: 250_000,
            metro_base: 2,
            metro_divisor: 300_000,
            small_community_floor: true,
        },
        BandSpec {
            program: Program::Lighting,
            lower_bound: 1_000,
            divisor: 15_000,
            metro_base: 34,
            metro_divisor: 50_000,
            small_community_floor: false,
        },
    ];

    let mut rules = Vec::new();
    for band in bands {
        let key = band.program.label().to_ascii_lowercase();
        let category = match band.program {
            Program::Lighting => RuleCategory::Eee,
            _ => RuleCategory::Hsp,
        };

        rules.push(RegulatoryRule {
            id: format!("{key}-proportional"),
            program: band.program,
            category,
            rule_type: RuleType::SiteCalculation,
            parameters: RuleParameters {
                min_population: Some(band.lower_bound),
                max_population: Some(METRO_THRESHOLD),
                sites_per_population: Some(band.divisor),
                ..RuleParameters::default()
            },
            status: RuleStatus::Active,
            description: format!(
                "One site per {} residents between {} and {}",
                band.divisor, band.lower_bound, METRO_THRESHOLD
            ),
        });
        rules.push(RegulatoryRule {
            id: format!("{key}-metro"),
            program: band.program,
            category,
            rule_type: RuleType::SiteCalculation,
            parameters: RuleParameters {
                min_population: Some(METRO_THRESHOLD + 1),
                sites_per_population: Some(band.metro_divisor),
                population_offset: Some(METRO_THRESHOLD),
                base_requirement: Some(band.metro_base),
                ..RuleParameters::default()
            },
            status: RuleStatus::Active,
            description: format!(
                "{} sites plus one per {} residents above {}",
                band.metro_base, band.metro_divisor, METRO_THRESHOLD
            ),
        });
        if band.small_community_floor {
            rules.push(RegulatoryRule {
                id: format!("{key}-minimum"),
                program: band.program,
                category,
                rule_type: RuleType::MinimumRequirement,
                parameters: RuleParameters {
                    min_population: Some(MINIMUM_SERVED_POPULATION),
                    max_population: Some(band.lower_bound - 1),
                    base_requirement: Some(1),
                    ..RuleParameters::default()
                },
                status: RuleStatus::Active,
                description: format!(
                    "At least one site for communities of {} or more",
                    MINIMUM_SERVED_POPULATION
                ),
            });
        }
        rules.push(RegulatoryRule {
            id: format!("{key}-event-offset"),
            program: band.program,
            category: RuleCategory::Offset,
            rule_type: RuleType::OffsetEvent,
            parameters: RuleParameters {
                max_offset_percentage: Some(DEFAULT_EVENT_CAP_PERCENTAGE),
                ..RuleParameters::default()
            },
            status: RuleStatus::Active,
            description: "Events may offset up to 35% of required sites".to_string(),
        });
        rules.push(RegulatoryRule {
            id: format!("{key}-adjacent-offset"),
            program: band.program,
            category: RuleCategory::Offset,
            rule_type: RuleType::OffsetAdjacent,
            parameters: RuleParameters {
                max_offset_percentage: Some(DEFAULT_ADJACENT_CAP_PERCENTAGE),
                excluded_operator_types: OperatorType::default_reallocation_exclusions()
                    .into_iter()
                    .collect(),
                requires_adjacency: Some(true),
                ..RuleParameters::default()
            },
            status: RuleStatus::Active,
            description: "Adjacent communities may share up to 10% of required sites"
                .to_string(),
        });
    }

    rules
}
