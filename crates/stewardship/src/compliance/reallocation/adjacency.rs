use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::super::domain::CommunityId;

/// Symmetric adjacency relation between communities, stored as unordered pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(CommunityId, CommunityId)>", into = "Vec<(CommunityId, CommunityId)>")]
pub struct AdjacencyGraph {
    pairs: BTreeSet<(CommunityId, CommunityId)>,
}

impl AdjacencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `a` and `b` border each other. Self-pairs are ignored.
    pub fn insert(&mut self, a: CommunityId, b: CommunityId) -> bool {
        if a == b {
            return false;
        }
        self.pairs.insert(ordered(a, b))
    }

    pub fn are_adjacent(&self, a: &CommunityId, b: &CommunityId) -> bool {
        if a == b {
            return false;
        }
        let key = ordered(a.clone(), b.clone());
        self.pairs.contains(&key)
    }

    pub fn neighbors<'a>(&'a self, community: &'a CommunityId) -> impl Iterator<Item = &'a CommunityId> {
        self.pairs.iter().filter_map(move |(a, b)| {
            if a == community {
                Some(b)
            } else if b == community {
                Some(a)
            } else {
                None
            }
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = &(CommunityId, CommunityId)> {
        self.pairs.iter()
    }
}

impl FromIterator<(CommunityId, CommunityId)> for AdjacencyGraph {
    fn from_iter<T: IntoIterator<Item = (CommunityId, CommunityId)>>(iter: T) -> Self {
        let mut graph = Self::new();
        for (a, b) in iter {
            graph.insert(a, b);
        }
        graph
    }
}

impl From<Vec<(CommunityId, CommunityId)>> for AdjacencyGraph {
    fn from(pairs: Vec<(CommunityId, CommunityId)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<AdjacencyGraph> for Vec<(CommunityId, CommunityId)> {
    fn from(graph: AdjacencyGraph) -> Self {
        graph.pairs.into_iter().collect()
    }
}

fn ordered(a: CommunityId, b: CommunityId) -> (CommunityId, CommunityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
