//! Loading communities, sites, adjacency pairs, and regulatory rules from disk.

mod normalizer;
mod parser;

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::compliance::domain::{Community, CommunityId, Site, SiteId};
use crate::compliance::reallocation::AdjacencyGraph;
use crate::compliance::requirements::{RequirementCalculator, RuleBook};

pub const COMMUNITIES_FILE: &str = "communities.csv";
pub const SITES_FILE: &str = "sites.csv";
pub const ADJACENCY_FILE: &str = "adjacency.csv";
pub const RULES_FILE: &str = "rules.json";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid rules document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Row-level problem found during import. The row is skipped unless the issue is
/// only a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportIssue {
    pub file: &'static str,
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub communities: usize,
    pub sites: usize,
    pub adjacency_pairs: usize,
    pub rules: usize,
    pub issues: Vec<ImportIssue>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn issue(&mut self, file: &'static str, line: u64, message: impl Into<String>) {
        self.issues.push(ImportIssue {
            file,
            line,
            message: message.into(),
        });
    }
}

/// Immutable inputs for a calculation pass.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub communities: Vec<Community>,
    pub sites: Vec<Site>,
    pub adjacency: AdjacencyGraph,
    pub rules: RuleBook,
}

impl Dataset {
    /// Load `communities.csv` and `sites.csv` from `dir`, plus `adjacency.csv` and
    /// `rules.json` when present.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<(Self, ImportReport), DatasetError> {
        let dir = dir.as_ref();
        let communities = open(&dir.join(COMMUNITIES_FILE))?;
        let sites = open(&dir.join(SITES_FILE))?;
        let adjacency = open_optional(&dir.join(ADJACENCY_FILE))?;
        let rules = open_optional(&dir.join(RULES_FILE))?;

        let loaded = Self::from_readers(communities, sites, adjacency, rules)?;
        debug!(dir = %dir.display(), "dataset loaded");
        Ok(loaded)
    }

    pub fn from_readers<C, S, A, J>(
        communities: C,
        sites: S,
        adjacency: Option<A>,
        rules: Option<J>,
    ) -> Result<(Self, ImportReport), DatasetError>
    where
        C: Read,
        S: Read,
        A: Read,
        J: Read,
    {
        let mut builder = DatasetBuilder::default();

        for row in parser::parse_communities(communities)? {
            match row.value {
                Ok(community) => builder.push_community(community, row.line),
                Err(message) => builder.report.issue(COMMUNITIES_FILE, row.line, message),
            }
        }

        for row in parser::parse_sites(sites)? {
            for warning in row.warnings {
                builder.report.issue(SITES_FILE, row.line, warning);
            }
            match row.value {
                Ok(site) => builder.push_site(site, row.line),
                Err(message) => builder.report.issue(SITES_FILE, row.line, message),
            }
        }

        if let Some(adjacency) = adjacency {
            for row in parser::parse_adjacency(adjacency)? {
                match row.value {
                    Ok((a, b)) => builder.push_adjacency(a, b, row.line),
                    Err(message) => builder.report.issue(ADJACENCY_FILE, row.line, message),
                }
            }
        }

        if let Some(rules) = rules {
            builder.rules = serde_json::from_reader(rules)?;
        }

        Ok(builder.finish())
    }

    /// Assemble a dataset from already-typed records, applying the same
    /// deduplication and reference checks as the file importer.
    pub fn from_parts(
        communities: Vec<Community>,
        sites: Vec<Site>,
        adjacency: impl IntoIterator<Item = (CommunityId, CommunityId)>,
        rules: RuleBook,
    ) -> (Self, ImportReport) {
        let mut builder = DatasetBuilder::default();
        for (index, community) in communities.into_iter().enumerate() {
            builder.push_community(community, line_for(index));
        }
        for (index, site) in sites.into_iter().enumerate() {
            builder.push_site(site, line_for(index));
        }
        for (index, (a, b)) in adjacency.into_iter().enumerate() {
            builder.push_adjacency(a, b, line_for(index));
        }
        builder.rules = rules;
        builder.finish()
    }

    /// Calculator for the `rules.json` in `dir` alone, without importing the
    /// inventory. A missing file yields the standard rules.
    pub fn load_calculator<P: AsRef<Path>>(dir: P) -> Result<RequirementCalculator, DatasetError> {
        let rules: RuleBook = match open_optional(&dir.as_ref().join(RULES_FILE))? {
            Some(file) => serde_json::from_reader(file)?,
            None => RuleBook::default(),
        };
        Ok(if rules.is_empty() {
            RequirementCalculator::standard()
        } else {
            RequirementCalculator::new(rules)
        })
    }

    pub fn community(&self, id: &CommunityId) -> Option<&Community> {
        self.communities.iter().find(|community| &community.id == id)
    }

    pub fn site(&self, id: &SiteId) -> Option<&Site> {
        self.sites.iter().find(|site| &site.id == id)
    }

    /// Calculator driven by the loaded rules, or the standard rules when none were
    /// supplied.
    pub fn calculator(&self) -> RequirementCalculator {
        if self.rules.is_empty() {
            RequirementCalculator::standard()
        } else {
            RequirementCalculator::new(self.rules.clone())
        }
    }
}

#[derive(Default)]
struct DatasetBuilder {
    dataset: Dataset,
    names: HashSet<String>,
    community_ids: HashSet<CommunityId>,
    site_ids: HashSet<SiteId>,
    rules: RuleBook,
    report: ImportReport,
}

impl DatasetBuilder {
    fn push_community(&mut self, community: Community, line: u64) {
        let key = normalizer::normalize_name(&community.name);
        if self.names.contains(&key) {
            self.report.issue(
                COMMUNITIES_FILE,
                line,
                format!("duplicate community name '{}' skipped", community.name),
            );
            return;
        }
        if self.community_ids.contains(&community.id) {
            self.report.issue(
                COMMUNITIES_FILE,
                line,
                format!("duplicate community id {} skipped", community.id),
            );
            return;
        }

        self.names.insert(key);
        self.community_ids.insert(community.id.clone());
        self.dataset.communities.push(community);
    }

    fn push_site(&mut self, site: Site, line: u64) {
        if !self.community_ids.contains(&site.community_id) {
            self.report.issue(
                SITES_FILE,
                line,
                format!(
                    "site {} references unknown community {}",
                    site.id, site.community_id
                ),
            );
            return;
        }
        if !self.site_ids.insert(site.id.clone()) {
            self.report.issue(
                SITES_FILE,
                line,
                format!("duplicate site id {} skipped", site.id),
            );
            return;
        }

        self.dataset.sites.push(site);
    }

    fn push_adjacency(&mut self, a: CommunityId, b: CommunityId, line: u64) {
        for id in [&a, &b] {
            if !self.community_ids.contains(id) {
                self.report.issue(
                    ADJACENCY_FILE,
                    line,
                    format!("adjacency references unknown community {id}"),
                );
                return;
            }
        }
        self.dataset.adjacency.insert(a, b);
    }

    fn finish(mut self) -> (Dataset, ImportReport) {
        self.dataset.rules = self.rules;
        self.report.communities = self.dataset.communities.len();
        self.report.sites = self.dataset.sites.len();
        self.report.adjacency_pairs = self.dataset.adjacency.len();
        self.report.rules = self.dataset.rules.rules().len();

        if !self.report.is_clean() {
            warn!(
                issues = self.report.issues.len(),
                "dataset import skipped or adjusted rows"
            );
        }

        (self.dataset, self.report)
    }
}

fn open(path: &Path) -> Result<File, DatasetError> {
    File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn open_optional(path: &Path) -> Result<Option<File>, DatasetError> {
    if path.exists() {
        open(path).map(Some)
    } else {
        Ok(None)
    }
}

fn line_for(index: usize) -> u64 {
    u64::try_from(index + 1).unwrap_or(u64::MAX)
}
