//! Contracts: declarative input-to-output rewrite rules at target
//! granularity.
//!
//! Every pipe carries a contract. The planner applies it backward
//! ([`Contract::deduce_precondition`]) to learn which inputs a requested
//! output needs, and the runtime applies it forward
//! ([`Contract::deduce_postcondition`]) to predict what a pipe will produce.
//! Wildcards propagate through both directions.

use crate::error::{PipelineError, Result};
use crate::kinds::Kind;
use crate::target::{PathComponent, Target, TargetsByContainer};

/// How a rule maps an input path to an output path.
#[derive(Debug, Clone)]
pub enum PathTransform {
    /// Output path equals input path (same rank).
    Identity,
    /// Output component `i` is input component `indices[i]`
    /// (drops or reorders components; a shift in rank).
    Project(Vec<usize>),
    /// Fixed output path, independent of the input.
    Constant(Vec<String>),
}

/// Input side of a rule: a container plus a kind/path pattern.
#[derive(Debug, Clone)]
pub struct RuleSource {
    pub container: String,
    pub kind: Kind,
    pub path: Vec<PathComponent>,
}

/// A single rewrite rule.
///
/// Rules without a source are *generators*: they produce a fixed target and
/// require nothing (first-step pipes that synthesize artifacts from globals
/// or thin air).
#[derive(Debug, Clone)]
pub struct ContractRule {
    source: Option<RuleSource>,
    output_container: String,
    output_kind: Kind,
    transform: PathTransform,
    preserved: bool,
}

impl ContractRule {
    /// Build a rule with full validation of path arities.
    pub fn new(
        source: RuleSource,
        output_container: impl Into<String>,
        output_kind: Kind,
        transform: PathTransform,
        preserved: bool,
    ) -> Result<Self> {
        let output_container = output_container.into();
        let in_arity = source.kind.rank().depth();
        let out_arity = output_kind.rank().depth();
        if source.path.len() != in_arity {
            return Err(PipelineError::InvalidContract(format!(
                "input pattern arity {} does not match kind '{}' (rank depth {})",
                source.path.len(),
                source.kind.name(),
                in_arity
            )));
        }
        match &transform {
            PathTransform::Identity => {
                if in_arity != out_arity {
                    return Err(PipelineError::InvalidContract(format!(
                        "identity transform between kinds '{}' and '{}' of different rank depths",
                        source.kind.name(),
                        output_kind.name()
                    )));
                }
            }
            PathTransform::Project(indices) => {
                if indices.len() != out_arity {
                    return Err(PipelineError::InvalidContract(format!(
                        "projection arity {} does not match output kind '{}' (rank depth {})",
                        indices.len(),
                        output_kind.name(),
                        out_arity
                    )));
                }
                if let Some(bad) = indices.iter().find(|&&i| i >= in_arity) {
                    return Err(PipelineError::InvalidContract(format!(
                        "projection index {bad} out of range for input arity {in_arity}"
                    )));
                }
            }
            PathTransform::Constant(components) => {
                if components.len() != out_arity {
                    return Err(PipelineError::InvalidContract(format!(
                        "constant path arity {} does not match output kind '{}' (rank depth {})",
                        components.len(),
                        output_kind.name(),
                        out_arity
                    )));
                }
            }
        }
        Ok(Self { source: Some(source), output_container, output_kind, transform, preserved })
    }

    /// Identity rule over an all-wildcard pattern: every input of `kind` in
    /// `source_container` maps to the same path in `output_container`.
    pub fn identity(
        source_container: impl Into<String>,
        source_kind: Kind,
        output_container: impl Into<String>,
        output_kind: Kind,
        preserved: bool,
    ) -> Result<Self> {
        let arity = source_kind.rank().depth();
        let source = RuleSource {
            container: source_container.into(),
            kind: source_kind,
            path: vec![PathComponent::Any; arity],
        };
        Self::new(source, output_container, output_kind, PathTransform::Identity, preserved)
    }

    /// Generator rule: unconditionally produces one fixed target.
    pub fn generator(
        output_container: impl Into<String>,
        output_kind: Kind,
        path: Vec<String>,
    ) -> Result<Self> {
        let out_arity = output_kind.rank().depth();
        if path.len() != out_arity {
            return Err(PipelineError::InvalidContract(format!(
                "generator path arity {} does not match output kind '{}' (rank depth {})",
                path.len(),
                output_kind.name(),
                out_arity
            )));
        }
        Ok(Self {
            source: None,
            output_container: output_container.into(),
            output_kind,
            transform: PathTransform::Constant(path),
            preserved: true,
        })
    }

    pub fn source(&self) -> Option<&RuleSource> {
        self.source.as_ref()
    }

    pub fn output_container(&self) -> &str {
        &self.output_container
    }

    pub fn output_kind(&self) -> &Kind {
        &self.output_kind
    }

    pub fn preserved(&self) -> bool {
        self.preserved
    }

    /// Kind compatibility used when relating requests to rule outputs: a
    /// requested kind may be the rule's output kind, an ancestor of it, or a
    /// descendant of it.
    fn kinds_compatible(a: &Kind, b: &Kind) -> bool {
        a.matches(b) || b.matches(a)
    }

    /// Whether `requested` (possibly wildcarded) in `container` could be
    /// produced by this rule.
    fn covers(&self, container: &str, requested: &Target) -> bool {
        if container != self.output_container {
            return false;
        }
        if !Self::kinds_compatible(requested.kind(), &self.output_kind) {
            return false;
        }
        match &self.transform {
            PathTransform::Identity | PathTransform::Project(_) => {
                // The inverse image may conflict with the source pattern;
                // delegate the final word to `invert`.
                self.invert(requested).is_some() || self.source.is_none()
            }
            PathTransform::Constant(components) => {
                components.len() == requested.path().len()
                    && components.iter().zip(requested.path()).all(|(c, r)| match r {
                        PathComponent::Any => true,
                        PathComponent::Exact(name) => name == c,
                    })
            }
        }
    }

    /// Inverse image of a requested output: the input target this rule needs
    /// in order to produce it. `None` when the request conflicts with the
    /// rule's source pattern, or for generator rules.
    fn invert(&self, requested: &Target) -> Option<Target> {
        let source = self.source.as_ref()?;
        if requested.path().len() != self.output_kind.rank().depth() {
            return None;
        }
        let in_arity = source.path.len();
        let mut candidate: Vec<PathComponent> = vec![PathComponent::Any; in_arity];
        match &self.transform {
            PathTransform::Identity => {
                candidate = requested.path().to_vec();
            }
            PathTransform::Project(indices) => {
                for (out_pos, &in_pos) in indices.iter().enumerate() {
                    candidate[in_pos] = requested.path()[out_pos].clone();
                }
            }
            PathTransform::Constant(components) => {
                // Request must agree with the constant; inputs are the whole
                // source pattern.
                let agrees =
                    components.iter().zip(requested.path()).all(|(c, r)| match r {
                        PathComponent::Any => true,
                        PathComponent::Exact(name) => name == c,
                    });
                if !agrees {
                    return None;
                }
            }
        }
        // Fold the source pattern's exact components in; conflicts mean the
        // rule cannot produce this request.
        let mut merged = Vec::with_capacity(in_arity);
        for (pattern, derived) in source.path.iter().zip(candidate) {
            match (pattern, derived) {
                (PathComponent::Exact(p), PathComponent::Exact(d)) => {
                    if *p != d {
                        return None;
                    }
                    merged.push(PathComponent::Exact(d));
                }
                (PathComponent::Exact(p), PathComponent::Any) => {
                    merged.push(PathComponent::Exact(p.clone()));
                }
                (PathComponent::Any, derived) => merged.push(derived),
            }
        }
        Target::new(source.kind.clone(), merged).ok()
    }

    /// Forward image of one input target, if it matches the source pattern.
    fn apply(&self, input: &Target) -> Option<Target> {
        let source = self.source.as_ref()?;
        let pattern = Target::new(source.kind.clone(), source.path.clone()).ok()?;
        if !input.matches(&pattern) {
            return None;
        }
        let out_path: Vec<PathComponent> = match &self.transform {
            PathTransform::Identity => input.path().to_vec(),
            PathTransform::Project(indices) => {
                indices.iter().map(|&i| input.path()[i].clone()).collect()
            }
            PathTransform::Constant(components) => {
                components.iter().map(PathComponent::exact).collect()
            }
        };
        Target::new(self.output_kind.clone(), out_path).ok()
    }

    /// The constant target a generator rule produces, if this is one.
    fn generated(&self) -> Option<Target> {
        if self.source.is_some() {
            return None;
        }
        match &self.transform {
            PathTransform::Constant(components) => Target::new(
                self.output_kind.clone(),
                components.iter().map(PathComponent::exact).collect(),
            )
            .ok(),
            _ => None,
        }
    }
}

/// Result of applying a contract backward to a requested output set.
#[derive(Debug, Clone, Default)]
pub struct BackwardDeduction {
    /// Requested targets some rule can produce.
    pub covered: TargetsByContainer,
    /// Inputs required so the covered targets get produced.
    pub required: TargetsByContainer,
}

/// A pipe's declarative contract: a set of rewrite rules.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    rules: Vec<ContractRule>,
}

impl Contract {
    pub fn new(rules: Vec<ContractRule>) -> Self {
        Self { rules }
    }

    /// Contract with no rules: produces nothing, needs nothing. This is how
    /// the planner sees a flag-gated pipe that is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[ContractRule] {
        &self.rules
    }

    /// Container names this contract reads from.
    pub fn read_containers(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.rules.iter().filter_map(|r| r.source().map(|s| s.container.as_str())).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Container names this contract writes to.
    pub fn written_containers(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.rules.iter().map(|r| r.output_container()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Backward application: split a requested output set into the part this
    /// contract can produce and the inputs that part requires.
    pub fn deduce_backward(&self, requested: &TargetsByContainer) -> BackwardDeduction {
        let mut out = BackwardDeduction::default();
        for (container, targets) in requested.iter() {
            for target in targets {
                let mut covered = false;
                for rule in &self.rules {
                    if !rule.covers(container, target) {
                        continue;
                    }
                    covered = true;
                    if let Some(source) = rule.source() {
                        if let Some(input) = rule.invert(target) {
                            out.required.insert(&source.container, input);
                        }
                    }
                }
                if covered {
                    out.covered.insert(container, target.clone());
                }
            }
        }
        out
    }

    /// The input target set needed so that running the pipe produces (a
    /// superset of) `requested`.
    pub fn deduce_precondition(&self, requested: &TargetsByContainer) -> TargetsByContainer {
        self.deduce_backward(requested).required
    }

    /// Forward application: the output target set the pipe will produce when
    /// run against `inputs`. Generator rules always fire.
    pub fn deduce_postcondition(&self, inputs: &TargetsByContainer) -> TargetsByContainer {
        let mut out = TargetsByContainer::new();
        for rule in &self.rules {
            if let Some(target) = rule.generated() {
                out.insert(rule.output_container(), target);
                continue;
            }
            let source = match rule.source() {
                Some(source) => source,
                None => continue,
            };
            let Some(targets) = inputs.get(&source.container) else {
                continue;
            };
            for input in targets {
                if let Some(produced) = rule.apply(input) {
                    out.insert(rule.output_container(), produced);
                }
            }
        }
        out
    }

    /// Forward application restricted to rules with a source: outputs
    /// actually derived from `inputs`. Generator rules do not fire, so an
    /// invalidation closure does not blame constants on stale inputs.
    pub fn deduce_derived(&self, inputs: &TargetsByContainer) -> TargetsByContainer {
        let mut out = TargetsByContainer::new();
        for rule in &self.rules {
            let source = match rule.source() {
                Some(source) => source,
                None => continue,
            };
            let Some(targets) = inputs.get(&source.container) else {
                continue;
            };
            for input in targets {
                if let Some(produced) = rule.apply(input) {
                    out.insert(rule.output_container(), produced);
                }
            }
        }
        out
    }

    /// Inputs that stop existing after the pipe runs (rules with move
    /// semantics).
    pub fn deduce_consumed(&self, inputs: &TargetsByContainer) -> TargetsByContainer {
        let mut out = TargetsByContainer::new();
        for rule in &self.rules {
            if rule.preserved() {
                continue;
            }
            let source = match rule.source() {
                Some(source) => source,
                None => continue,
            };
            let Some(targets) = inputs.get(&source.container) else {
                continue;
            };
            for input in targets {
                if rule.apply(input).is_some() {
                    out.insert(&source.container, input.clone());
                }
            }
        }
        out
    }
}
