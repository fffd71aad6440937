//! Targets and target sets: fine-grained artifact identity.
//!
//! A target is `(path, kind)` where the path arity equals the kind's rank
//! depth. Paths may contain the `*` wildcard in requests and contract
//! patterns; containers only ever hold concrete targets.

use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::kinds::Kind;

/// One component of a target path: an exact name or the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathComponent {
    Exact(String),
    Any,
}

impl PathComponent {
    pub fn exact(name: impl Into<String>) -> Self {
        PathComponent::Exact(name.into())
    }

    pub fn is_any(&self) -> bool {
        matches!(self, PathComponent::Any)
    }

    /// Parse a component; `*` denotes the wildcard.
    pub fn parse(text: &str) -> Self {
        if text == "*" {
            PathComponent::Any
        } else {
            PathComponent::Exact(text.to_string())
        }
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathComponent::Exact(name) => f.write_str(name),
            PathComponent::Any => f.write_str("*"),
        }
    }
}

/// Identity of a single artifact: a path of named components plus a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    kind: Kind,
    path: Vec<PathComponent>,
}

impl Target {
    /// Build a target, checking that the path arity matches the kind's rank.
    pub fn new(kind: Kind, path: Vec<PathComponent>) -> Result<Self> {
        let expected = kind.rank().depth();
        if path.len() != expected {
            return Err(PipelineError::InvalidTarget {
                spec: format!(
                    "{}:{}",
                    path.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("/"),
                    kind.name()
                ),
                reason: format!(
                    "path has {} component(s) but kind '{}' at rank '{}' requires {}",
                    path.len(),
                    kind.name(),
                    kind.rank().name(),
                    expected
                ),
            });
        }
        Ok(Self { kind, path })
    }

    /// Parse a `/`-separated path (components may be `*`) against a kind.
    pub fn parse(path: &str, kind: Kind) -> Result<Self> {
        let components = path.split('/').map(PathComponent::parse).collect();
        Self::new(kind, components)
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn path(&self) -> &[PathComponent] {
        &self.path
    }

    /// True iff no component is the wildcard.
    pub fn is_concrete(&self) -> bool {
        self.path.iter().all(|c| !c.is_any())
    }

    /// Whether this target satisfies `pattern`: the kind must match the
    /// pattern's kind and every exact pattern component must agree.
    pub fn matches(&self, pattern: &Target) -> bool {
        if !self.kind.matches(pattern.kind()) {
            return false;
        }
        if self.path.len() != pattern.path.len() {
            return false;
        }
        self.path.iter().zip(pattern.path.iter()).all(|(mine, pat)| match (mine, pat) {
            (_, PathComponent::Any) => true,
            (PathComponent::Any, _) => true,
            (PathComponent::Exact(a), PathComponent::Exact(b)) => a == b,
        })
    }

    /// Render the path portion (components joined with `/`).
    pub fn path_string(&self) -> String {
        self.path.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("/")
    }
}

impl PartialOrd for Target {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Target {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .name()
            .cmp(other.kind.name())
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path_string(), self.kind.name())
    }
}

/// An ordered set of targets.
///
/// Containers enumerate into concrete-only sets; request and planning sets
/// may also hold wildcarded targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    targets: BTreeSet<Target>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn insert(&mut self, target: Target) {
        self.targets.insert(target);
    }

    pub fn remove(&mut self, target: &Target) -> bool {
        self.targets.remove(target)
    }

    /// Exact membership (structural equality).
    pub fn contains(&self, target: &Target) -> bool {
        self.targets.contains(target)
    }

    /// Whether any member satisfies `pattern`.
    pub fn contains_matching(&self, pattern: &Target) -> bool {
        self.targets.iter().any(|t| t.matches(pattern))
    }

    /// The members satisfying `pattern`.
    pub fn matching(&self, pattern: &Target) -> TargetSet {
        self.targets.iter().filter(|t| t.matches(pattern)).cloned().collect()
    }

    pub fn union(&mut self, other: &TargetSet) {
        for target in &other.targets {
            self.targets.insert(target.clone());
        }
    }

    pub fn difference(&self, other: &TargetSet) -> TargetSet {
        self.targets.difference(&other.targets).cloned().collect()
    }

    pub fn intersection(&self, other: &TargetSet) -> TargetSet {
        self.targets.intersection(&other.targets).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn first(&self) -> Option<&Target> {
        self.targets.iter().next()
    }
}

impl FromIterator<Target> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        Self { targets: iter.into_iter().collect() }
    }
}

impl IntoIterator for TargetSet {
    type Item = Target;
    type IntoIter = std::collections::btree_set::IntoIter<Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a Target;
    type IntoIter = std::collections::btree_set::Iter<'a, Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

/// Target sets grouped by container name.
///
/// This is the currency of planning and invalidation: contract deduction,
/// per-step requirements, and stale closures are all maps from container
/// name to targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetsByContainer {
    entries: BTreeMap<String, TargetSet>,
}

impl TargetsByContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|set| set.is_empty())
    }

    pub fn insert(&mut self, container: &str, target: Target) {
        self.entries.entry(container.to_string()).or_default().insert(target);
    }

    pub fn union_set(&mut self, container: &str, targets: &TargetSet) {
        if targets.is_empty() {
            return;
        }
        self.entries.entry(container.to_string()).or_default().union(targets);
    }

    pub fn union(&mut self, other: &TargetsByContainer) {
        for (container, targets) in &other.entries {
            self.union_set(container, targets);
        }
    }

    /// Remove the exact targets of `other` from this map.
    pub fn subtract(&mut self, other: &TargetsByContainer) {
        for (container, targets) in &other.entries {
            if let Some(mine) = self.entries.get_mut(container) {
                for target in targets {
                    mine.remove(target);
                }
            }
        }
        self.entries.retain(|_, set| !set.is_empty());
    }

    pub fn get(&self, container: &str) -> Option<&TargetSet> {
        self.entries.get(container)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, TargetSet> {
        self.entries.iter()
    }

    /// The first (container, target) pair in name order, if any.
    pub fn first(&self) -> Option<(&str, &Target)> {
        self.entries
            .iter()
            .find_map(|(container, set)| set.first().map(|t| (container.as_str(), t)))
    }

    /// Total number of targets across all containers.
    pub fn total(&self) -> usize {
        self.entries.values().map(|set| set.len()).sum()
    }
}
