//! Ranks and kinds: the type system for artifacts.
//!
//! A `Rank` is a level in the granularity hierarchy (root, function, ...);
//! its depth fixes how many path components a target at that rank carries.
//! A `Kind` tags an artifact with a type, is bound to exactly one rank, and
//! may declare a parent kind; contracts match kinds reflexively through the
//! parent chain.
//!
//! Both registries are append-only and keyed by unique string names. Parents
//! must already be registered when a child is added, so the parent links
//! always form a tree.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{PipelineError, Result};

#[derive(Debug)]
struct RankData {
    name: String,
    parent: Option<Rank>,
}

/// A level in the granularity hierarchy.
///
/// Cheap to clone; equality is by name, which the registry keeps unique.
#[derive(Debug, Clone)]
pub struct Rank(Arc<RankData>);

impl Rank {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Rank> {
        self.0.parent.as_ref()
    }

    /// Number of path components a target at this rank carries.
    ///
    /// The root rank has depth 1: root-rank targets are addressed by a single
    /// component (e.g. `root` or a string's own name).
    pub fn depth(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.depth() + 1,
            None => 1,
        }
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Rank {}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
struct KindData {
    name: String,
    rank: Rank,
    parent: Option<Kind>,
}

/// The type tag of an artifact, bound to a rank.
///
/// Kinds form a subtype tree through their parent links; see
/// [`Kind::matches`] for the matching relation contracts use.
#[derive(Debug, Clone)]
pub struct Kind(Arc<KindData>);

impl Kind {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn rank(&self) -> &Rank {
        &self.0.rank
    }

    pub fn parent(&self) -> Option<&Kind> {
        self.0.parent.as_ref()
    }

    /// Whether this kind matches `pattern`: true iff the two are the same
    /// kind or `pattern` is an ancestor of this kind.
    pub fn matches(&self, pattern: &Kind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == pattern {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Kind {}

impl PartialOrd for Kind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Kind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Append-only registry of ranks and kinds, keyed by unique names.
#[derive(Debug, Default)]
pub struct KindRegistry {
    ranks: BTreeMap<String, Rank>,
    kinds: BTreeMap<String, Kind>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rank. The parent, if any, must already be registered.
    pub fn register_rank(&mut self, name: &str, parent: Option<&str>) -> Result<Rank> {
        if self.ranks.contains_key(name) {
            return Err(PipelineError::InvalidContract(format!(
                "rank '{name}' is already registered"
            )));
        }
        let parent = match parent {
            Some(p) => Some(self.rank(p)?),
            None => None,
        };
        let rank = Rank(Arc::new(RankData { name: name.to_string(), parent }));
        self.ranks.insert(name.to_string(), rank.clone());
        Ok(rank)
    }

    /// Register a kind at an existing rank, optionally under a parent kind.
    pub fn register_kind(&mut self, name: &str, rank: &str, parent: Option<&str>) -> Result<Kind> {
        if self.kinds.contains_key(name) {
            return Err(PipelineError::InvalidContract(format!(
                "kind '{name}' is already registered"
            )));
        }
        let rank = self.rank(rank)?;
        let parent = match parent {
            Some(p) => Some(self.kind(p)?),
            None => None,
        };
        let kind = Kind(Arc::new(KindData { name: name.to_string(), rank, parent }));
        self.kinds.insert(name.to_string(), kind.clone());
        Ok(kind)
    }

    /// Look up a rank by name.
    pub fn rank(&self, name: &str) -> Result<Rank> {
        self.ranks.get(name).cloned().ok_or_else(|| PipelineError::UnknownRank(name.to_string()))
    }

    /// Look up a kind by name.
    pub fn kind(&self, name: &str) -> Result<Kind> {
        self.kinds.get(name).cloned().ok_or_else(|| PipelineError::UnknownKind(name.to_string()))
    }

    /// Iterate registered kinds in name order.
    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.kinds.values()
    }

    /// Iterate registered ranks in name order.
    pub fn ranks(&self) -> impl Iterator<Item = &Rank> {
        self.ranks.values()
    }
}
