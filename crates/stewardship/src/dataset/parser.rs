use std::collections::BTreeSet;
use std::io::Read;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::normalizer::normalize_label;
use crate::compliance::domain::{
    Community, CommunityId, OperatorType, Program, Site, SiteId, SiteStatus, SiteType, Tier,
};

/// One data row with its source line and either the parsed value or the reason it
/// was rejected. Warnings do not reject the row.
#[derive(Debug)]
pub(crate) struct ParsedRow<T> {
    pub(crate) line: u64,
    pub(crate) value: Result<T, String>,
    pub(crate) warnings: Vec<String>,
}

pub(crate) fn parse_communities<R: Read>(
    reader: R,
) -> Result<Vec<ParsedRow<Community>>, csv::Error> {
    parse_rows(reader, |row: CommunityRow| (row.into_community(), Vec::new()))
}

pub(crate) fn parse_sites<R: Read>(reader: R) -> Result<Vec<ParsedRow<Site>>, csv::Error> {
    parse_rows(reader, SiteRow::into_site)
}

pub(crate) fn parse_adjacency<R: Read>(
    reader: R,
) -> Result<Vec<ParsedRow<(CommunityId, CommunityId)>>, csv::Error> {
    parse_rows(reader, |row: AdjacencyRow| (row.into_pair(), Vec::new()))
}

fn parse_rows<R, Row, T, F>(reader: R, convert: F) -> Result<Vec<ParsedRow<T>>, csv::Error>
where
    R: Read,
    Row: DeserializeOwned,
    F: Fn(Row) -> (Result<T, String>, Vec<String>),
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |position| position.line());

        let (value, warnings) = match record.deserialize::<Row>(Some(&headers)) {
            Ok(row) => convert(row),
            Err(err) => (Err(format!("unreadable row: {err}")), Vec::new()),
        };

        rows.push(ParsedRow {
            line,
            value,
            warnings,
        });
    }

    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct CommunityRow {
    #[serde(alias = "ID", alias = "municipality_id")]
    id: String,
    #[serde(alias = "Name", alias = "municipality")]
    name: String,
    #[serde(alias = "Population")]
    population: String,
    #[serde(alias = "Tier", default)]
    tier: String,
    #[serde(alias = "Region", default)]
    region: String,
    #[serde(alias = "Province", default)]
    province: String,
    #[serde(
        alias = "Census Year",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    census_year: Option<String>,
}

impl CommunityRow {
    fn into_community(self) -> Result<Community, String> {
        let id = required_field("id", &self.id)?;
        let name = required_field("name", &self.name)?;

        let population = parse_population(&self.population)?;
        let tier = Tier::parse(&normalize_label(&self.tier))
            .ok_or_else(|| format!("unknown tier '{}'", self.tier))?;
        let census_year = match self.census_year.as_deref() {
            Some(raw) => Some(
                raw.trim()
                    .parse::<i32>()
                    .map_err(|_| format!("census year '{raw}' is not a year"))?,
            ),
            None => None,
        };

        Ok(Community {
            id: CommunityId(id),
            name,
            population,
            tier,
            region: normalize_label(&self.region),
            province: normalize_label(&self.province),
            census_year,
        })
    }
}

fn parse_population(raw: &str) -> Result<u64, String> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != '_').collect();
    let value = cleaned
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("population '{raw}' is not a whole number"))?;
    u64::try_from(value).map_err(|_| format!("population {value} is negative"))
}

#[derive(Debug, Deserialize)]
struct SiteRow {
    #[serde(alias = "ID", alias = "site_id")]
    id: String,
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Address", default)]
    address: String,
    #[serde(alias = "municipality_id", alias = "Community")]
    community_id: String,
    #[serde(alias = "Site Type", alias = "type")]
    site_type: String,
    #[serde(alias = "Operator Type", alias = "operator")]
    operator_type: String,
    #[serde(alias = "Status")]
    status: String,
    #[serde(alias = "Programs", default)]
    programs: String,
    #[serde(
        alias = "Active Dates",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    active_dates: Option<String>,
}

impl SiteRow {
    fn into_site(self) -> (Result<Site, String>, Vec<String>) {
        let (programs, unknown) = parse_programs(&self.programs);
        let warnings = unknown
            .into_iter()
            .map(|tag| format!("ignored unknown program '{tag}'"))
            .collect();

        (self.into_site_with(programs), warnings)
    }

    fn into_site_with(self, programs: BTreeSet<Program>) -> Result<Site, String> {
        let id = required_field("id", &self.id)?;
        let name = required_field("name", &self.name)?;
        let community_id = required_field("community_id", &self.community_id)?;

        let site_type = SiteType::parse(&normalize_label(&self.site_type))
            .ok_or_else(|| format!("unknown site type '{}'", self.site_type))?;
        let operator_type = OperatorType::parse(&normalize_label(&self.operator_type))
            .ok_or_else(|| format!("unknown operator type '{}'", self.operator_type))?;
        let status = SiteStatus::parse(&normalize_label(&self.status))
            .ok_or_else(|| format!("unknown status '{}'", self.status))?;

        Ok(Site {
            id: SiteId(id),
            name,
            address: self.address,
            community_id: CommunityId(community_id),
            site_type,
            operator_type,
            status,
            programs,
            active_dates: self.active_dates,
        })
    }
}

/// Split a program list on `;`, `,` or `|`, returning known programs and the
/// unrecognised tags.
pub(crate) fn parse_programs(raw: &str) -> (BTreeSet<Program>, Vec<String>) {
    let mut programs = BTreeSet::new();
    let mut unknown = Vec::new();

    for tag in raw
        .split([';', ',', '|'])
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
    {
        match Program::parse(tag) {
            Some(program) => {
                programs.insert(program);
            }
            None => unknown.push(tag.to_string()),
        }
    }

    (programs, unknown)
}

#[derive(Debug, Deserialize)]
struct AdjacencyRow {
    #[serde(alias = "community_id", alias = "from")]
    community_a: String,
    #[serde(alias = "adjacent_community_id", alias = "to")]
    community_b: String,
}

impl AdjacencyRow {
    fn into_pair(self) -> Result<(CommunityId, CommunityId), String> {
        let a = required_field("community_a", &self.community_a)?;
        let b = required_field("community_b", &self.community_b)?;
        if a == b {
            return Err(format!("community {a} cannot be adjacent to itself"));
        }
        Ok((CommunityId(a), CommunityId(b)))
    }
}

fn required_field(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("missing {field}"))
    } else {
        Ok(trimmed.to_string())
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
