use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for municipalities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(pub String);

/// Identifier wrapper for collection sites and events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub String);

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stewardship programs a site can collect for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Program {
    Paint,
    Lighting,
    Solvents,
    Pesticides,
}

impl Program {
    pub const fn ordered() -> [Self; 4] {
        [Self::Paint, Self::Lighting, Self::Solvents, Self::Pesticides]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Paint => "Paint",
            Self::Lighting => "Lighting",
            Self::Solvents => "Solvents",
            Self::Pesticides => "Pesticides",
        }
    }

    /// Case-insensitive lookup of a program tag; unknown tags yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paint" => Some(Self::Paint),
            "lighting" | "lights" | "lamps" => Some(Self::Lighting),
            "solvents" | "solvent" => Some(Self::Solvents),
            "pesticides" | "pesticide" => Some(Self::Pesticides),
            _ => None,
        }
    }
}

/// Municipal tier used for the upper-tier adjacency fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Single,
    Lower,
    Upper,
}

impl Tier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::Lower => "Lower",
            Self::Upper => "Upper",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" | "single-tier" | "single tier" => Some(Self::Single),
            "lower" | "lower-tier" | "lower tier" => Some(Self::Lower),
            "upper" | "upper-tier" | "upper tier" => Some(Self::Upper),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteType {
    #[serde(rename = "Collection site")]
    CollectionSite,
    Event,
}

impl SiteType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CollectionSite => "Collection site",
            Self::Event => "Event",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "collection site" | "collection" | "site" | "depot" => Some(Self::CollectionSite),
            "event" | "collection event" => Some(Self::Event),
            _ => None,
        }
    }
}

/// Organisation operating a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperatorType {
    Retailer,
    Distributor,
    Municipal,
    #[serde(rename = "First Nation/Indigenous")]
    FirstNationIndigenous,
    #[serde(rename = "Private Depot")]
    PrivateDepot,
    #[serde(rename = "Product Care")]
    ProductCare,
    #[serde(rename = "Regional District")]
    RegionalDistrict,
    #[serde(rename = "Regional Service Commission")]
    RegionalServiceCommission,
    Other,
}

impl OperatorType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Retailer => "Retailer",
            Self::Distributor => "Distributor",
            Self::Municipal => "Municipal",
            Self::FirstNationIndigenous => "First Nation/Indigenous",
            Self::PrivateDepot => "Private Depot",
            Self::ProductCare => "Product Care",
            Self::RegionalDistrict => "Regional District",
            Self::RegionalServiceCommission => "Regional Service Commission",
            Self::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "retailer" | "retail" => Some(Self::Retailer),
            "distributor" => Some(Self::Distributor),
            "municipal" | "municipality" => Some(Self::Municipal),
            "first nation/indigenous" | "first nation" | "indigenous" | "first nations" => {
                Some(Self::FirstNationIndigenous)
            }
            "private depot" => Some(Self::PrivateDepot),
            "product care" => Some(Self::ProductCare),
            "regional district" => Some(Self::RegionalDistrict),
            "regional service commission" => Some(Self::RegionalServiceCommission),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Operators whose sites are held back from adjacent reallocation unless a
    /// rule says otherwise.
    pub fn default_reallocation_exclusions() -> BTreeSet<Self> {
        [
            Self::Municipal,
            Self::FirstNationIndigenous,
            Self::RegionalDistrict,
            Self::RegionalServiceCommission,
        ]
        .into_iter()
        .collect()
    }

    /// Return-to-retail operators may only move sites to directly adjacent communities.
    pub const fn is_return_to_retail(self) -> bool {
        matches!(self, Self::Retailer | Self::Distributor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteStatus {
    Active,
    Scheduled,
    Inactive,
    Pending,
    Deactivated,
}

impl SiteStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Scheduled => "Scheduled",
            Self::Inactive => "Inactive",
            Self::Pending => "Pending",
            Self::Deactivated => "Deactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "scheduled" => Some(Self::Scheduled),
            "inactive" => Some(Self::Inactive),
            "pending" => Some(Self::Pending),
            "deactivated" | "closed" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

/// Municipality participating in the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub population: u64,
    pub tier: Tier,
    pub region: String,
    pub province: String,
    #[serde(default)]
    pub census_year: Option<i32>,
}

impl Community {
    /// Whether the two communities belong to the same upper-tier grouping.
    pub fn shares_region_with(&self, other: &Community) -> bool {
        !self.region.trim().is_empty()
            && self.region.trim().eq_ignore_ascii_case(other.region.trim())
    }
}

/// Physical collection site or one-off collection event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub community_id: CommunityId,
    pub site_type: SiteType,
    pub operator_type: OperatorType,
    pub status: SiteStatus,
    pub programs: BTreeSet<Program>,
    #[serde(default)]
    pub active_dates: Option<String>,
}

impl Site {
    pub fn offers(&self, program: Program) -> bool {
        self.programs.contains(&program)
    }

    pub fn is_event(&self) -> bool {
        self.site_type == SiteType::Event
    }

    pub fn active_window(&self) -> ActiveDates {
        self.active_dates
            .as_deref()
            .map(ActiveDates::parse)
            .unwrap_or(ActiveDates::Unbounded)
    }

    /// Whether the site contributes to the community's base inventory for the
    /// program in the given reporting year.
    pub fn counts_toward(&self, program: Program, year: i32) -> bool {
        self.status == SiteStatus::Active
            && !self.is_event()
            && self.offers(program)
            && self.active_window().overlaps_year(year)
    }

    /// Whether the site is an event that may be applied as offset material.
    pub fn is_eligible_event(&self, program: Program, year: i32) -> bool {
        self.is_event()
            && self.offers(program)
            && matches!(self.status, SiteStatus::Active | SiteStatus::Scheduled)
            && self.active_window().overlaps_year(year)
    }
}

/// Window in which a site counts toward compliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveDates {
    Unbounded,
    On(NaiveDate),
    Between {
        start: NaiveDate,
        end: Option<NaiveDate>,
    },
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl ActiveDates {
    /// Parses `YYYY-MM-DD`, `YYYY-MM-DD to YYYY-MM-DD` (also `/` or ` - `), or an
    /// open range ending in `present`/`ongoing`. Unreadable values leave the site
    /// unbounded.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Unbounded;
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            return Self::On(date);
        }

        let parts = [" to ", "/", " - "]
            .iter()
            .find_map(|separator| trimmed.split_once(separator));

        let Some((start, end)) = parts else {
            return Self::Unbounded;
        };

        let Ok(start) = NaiveDate::parse_from_str(start.trim(), DATE_FORMAT) else {
            return Self::Unbounded;
        };

        let end = end.trim();
        if end.is_empty()
            || end.eq_ignore_ascii_case("present")
            || end.eq_ignore_ascii_case("ongoing")
        {
            return Self::Between { start, end: None };
        }

        match NaiveDate::parse_from_str(end, DATE_FORMAT) {
            Ok(end) if end >= start => Self::Between {
                start,
                end: Some(end),
            },
            Ok(end) => Self::Between {
                start: end,
                end: Some(start),
            },
            Err(_) => Self::Unbounded,
        }
    }

    pub fn overlaps_year(&self, year: i32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::On(date) => date.year() == year,
            Self::Between { start, end } => {
                start.year() <= year && end.map(|end| end.year() >= year).unwrap_or(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_dates_and_ranges() {
        let single = ActiveDates::parse("2025-06-14");
        assert!(single.overlaps_year(2025));
        assert!(!single.overlaps_year(2024));

        let range = ActiveDates::parse("2023-01-01 to 2024-12-31");
        assert!(range.overlaps_year(2023));
        assert!(range.overlaps_year(2024));
        assert!(!range.overlaps_year(2025));

        let open = ActiveDates::parse("2022-03-01 - present");
        assert!(open.overlaps_year(2030));
        assert!(!open.overlaps_year(2021));
    }

    #[test]
    fn unreadable_dates_leave_site_unbounded() {
        assert_eq!(ActiveDates::parse("spring"), ActiveDates::Unbounded);
        assert_eq!(ActiveDates::parse(""), ActiveDates::Unbounded);
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(Program::parse(" PAINT "), Some(Program::Paint));
        assert_eq!(Program::parse("batteries"), None);
        assert_eq!(
            OperatorType::parse("first nation/indigenous"),
            Some(OperatorType::FirstNationIndigenous)
        );
        assert_eq!(SiteType::parse("Collection Site"), Some(SiteType::CollectionSite));
    }
}
