//! Typed artifact containers and per-step container sets.
//!
//! A container is a named, typed store of concrete targets. The data layer
//! is a tagged enum over three storage families:
//!
//! - `Strings`: a table of small text artifacts (one entry per target);
//! - `Bytes`: opaque blobs (binaries, object files, translated output);
//! - `Module`: a compound translation unit holding many function-grained
//!   entries that serialize into a single file, the way an LLVM module
//!   carries many functions.
//!
//! Registered container *types* (`StringContainer`, `Binary`, `LLVMContainer`,
//! ...) parameterize a family with the set of kinds it accepts. Each family
//! owns its serializer; the runtime only requires that deserialize inverts
//! serialize up to target equivalence.

use std::collections::{btree_map, BTreeMap};

use crate::error::{PipelineError, Result};
use crate::kinds::Kind;
use crate::target::{PathComponent, Target, TargetSet, TargetsByContainer};

/// Canonical single-component path for a blob loaded from a raw file.
pub const ROOT_COMPONENT: &str = "root";

const BYTES_MAGIC: &str = "#pipeline-bytes-v1";

/// Storage family of a container type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFamily {
    Strings,
    Bytes,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ContainerData {
    Strings(BTreeMap<Target, String>),
    Bytes(BTreeMap<Target, Vec<u8>>),
    Module(BTreeMap<Target, String>),
}

impl ContainerData {
    fn empty(family: ContainerFamily) -> Self {
        match family {
            ContainerFamily::Strings => ContainerData::Strings(BTreeMap::new()),
            ContainerFamily::Bytes => ContainerData::Bytes(BTreeMap::new()),
            ContainerFamily::Module => ContainerData::Module(BTreeMap::new()),
        }
    }
}

/// Serialized shape of one module unit; see the `Module` family docs.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ModuleUnitRepr {
    kind: String,
    path: String,
    body: String,
}

/// A named, typed store owning concrete targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    name: String,
    type_name: String,
    accepted: Vec<Kind>,
    data: ContainerData,
}

impl Container {
    /// Build an empty container. `accepted` must be non-empty; its first
    /// entry is the primary kind used when deserializing bare input files.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        family: ContainerFamily,
        accepted: Vec<Kind>,
    ) -> Result<Self> {
        let name = name.into();
        let type_name = type_name.into();
        if accepted.is_empty() {
            return Err(PipelineError::InvalidContract(format!(
                "container type '{type_name}' must accept at least one kind"
            )));
        }
        Ok(Self { name, type_name, accepted, data: ContainerData::empty(family) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn family(&self) -> ContainerFamily {
        match &self.data {
            ContainerData::Strings(_) => ContainerFamily::Strings,
            ContainerData::Bytes(_) => ContainerFamily::Bytes,
            ContainerData::Module(_) => ContainerFamily::Module,
        }
    }

    /// Kinds this container accepts (a kind is accepted if it matches any
    /// declared kind through the subtype tree).
    pub fn accepted_kinds(&self) -> &[Kind] {
        &self.accepted
    }

    /// Primary kind: the one bare input files deserialize under.
    pub fn primary_kind(&self) -> &Kind {
        &self.accepted[0]
    }

    pub fn accepts(&self, kind: &Kind) -> bool {
        self.accepted.iter().any(|accepted| kind.matches(accepted))
    }

    /// Enumerate currently-present targets.
    pub fn enumerate(&self) -> TargetSet {
        match &self.data {
            ContainerData::Strings(map) => map.keys().cloned().collect(),
            ContainerData::Bytes(map) => map.keys().cloned().collect(),
            ContainerData::Module(map) => map.keys().cloned().collect(),
        }
    }

    /// Exact presence test for a concrete target.
    pub fn contains(&self, target: &Target) -> bool {
        match &self.data {
            ContainerData::Strings(map) => map.contains_key(target),
            ContainerData::Bytes(map) => map.contains_key(target),
            ContainerData::Module(map) => map.contains_key(target),
        }
    }

    /// Concrete targets present that satisfy `pattern`.
    pub fn expand(&self, pattern: &Target) -> TargetSet {
        self.enumerate().matching(pattern)
    }

    /// Remove all present targets matching any entry of `set`
    /// (wildcards expand against current contents).
    pub fn remove(&mut self, set: &TargetSet) -> usize {
        let doomed: Vec<Target> =
            set.iter().flat_map(|pattern| self.expand(pattern)).collect();
        let mut removed = 0;
        for target in &doomed {
            let gone = match &mut self.data {
                ContainerData::Strings(map) => map.remove(target).is_some(),
                ContainerData::Bytes(map) => map.remove(target).is_some(),
                ContainerData::Module(map) => map.remove(target).is_some(),
            };
            if gone {
                removed += 1;
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.data = ContainerData::empty(self.family());
    }

    /// Merge another instance of the same container type into this one.
    /// Entries from `other` win on conflicts.
    pub fn merge(&mut self, other: Container) -> Result<()> {
        if self.type_name != other.type_name {
            return Err(PipelineError::ContainerTypeMismatch {
                container: self.name.clone(),
                container_type: self.type_name.clone(),
                kind: format!("contents of container type '{}'", other.type_name),
            });
        }
        match (&mut self.data, other.data) {
            (ContainerData::Strings(mine), ContainerData::Strings(theirs)) => mine.extend(theirs),
            (ContainerData::Bytes(mine), ContainerData::Bytes(theirs)) => mine.extend(theirs),
            (ContainerData::Module(mine), ContainerData::Module(theirs)) => mine.extend(theirs),
            _ => {
                return Err(PipelineError::ContainerTypeMismatch {
                    container: self.name.clone(),
                    container_type: self.type_name.clone(),
                    kind: "mismatched storage family".to_string(),
                })
            }
        }
        Ok(())
    }

    /// Clone of this container restricted to targets matching `set`.
    pub fn extract(&self, set: &TargetSet) -> Container {
        let mut out = self.clone();
        let keep: TargetSet =
            set.iter().flat_map(|pattern| self.expand(pattern)).collect();
        let present = out.enumerate();
        let excess = present.difference(&keep);
        out.remove(&excess);
        out
    }

    fn check_insert(&self, target: &Target) -> Result<()> {
        if !target.is_concrete() {
            return Err(PipelineError::InvalidTarget {
                spec: target.to_string(),
                reason: "wildcard targets cannot be stored in a container".to_string(),
            });
        }
        if !self.accepts(target.kind()) {
            return Err(PipelineError::ContainerTypeMismatch {
                container: self.name.clone(),
                container_type: self.type_name.clone(),
                kind: target.kind().name().to_string(),
            });
        }
        Ok(())
    }

    /// Insert a text artifact (Strings family only).
    pub fn insert_string(&mut self, target: Target, content: String) -> Result<()> {
        self.check_insert(&target)?;
        match &mut self.data {
            ContainerData::Strings(map) => {
                map.insert(target, content);
                Ok(())
            }
            _ => Err(self.family_mismatch("string artifact")),
        }
    }

    /// Insert a blob (Bytes family only).
    pub fn insert_bytes(&mut self, target: Target, content: Vec<u8>) -> Result<()> {
        self.check_insert(&target)?;
        match &mut self.data {
            ContainerData::Bytes(map) => {
                map.insert(target, content);
                Ok(())
            }
            _ => Err(self.family_mismatch("byte artifact")),
        }
    }

    /// Insert a module unit (Module family only).
    pub fn insert_unit(&mut self, target: Target, body: String) -> Result<()> {
        self.check_insert(&target)?;
        match &mut self.data {
            ContainerData::Module(map) => {
                map.insert(target, body);
                Ok(())
            }
            _ => Err(self.family_mismatch("module unit")),
        }
    }

    pub fn string_entries(&self) -> Result<&BTreeMap<Target, String>> {
        match &self.data {
            ContainerData::Strings(map) => Ok(map),
            _ => Err(self.family_mismatch("string artifact")),
        }
    }

    pub fn byte_entries(&self) -> Result<&BTreeMap<Target, Vec<u8>>> {
        match &self.data {
            ContainerData::Bytes(map) => Ok(map),
            _ => Err(self.family_mismatch("byte artifact")),
        }
    }

    pub fn module_units(&self) -> Result<&BTreeMap<Target, String>> {
        match &self.data {
            ContainerData::Module(map) => Ok(map),
            _ => Err(self.family_mismatch("module unit")),
        }
    }

    pub fn module_units_mut(&mut self) -> Result<&mut BTreeMap<Target, String>> {
        match &mut self.data {
            ContainerData::Module(map) => Ok(map),
            _ => Err(PipelineError::ContainerTypeMismatch {
                container: self.name.clone(),
                container_type: self.type_name.clone(),
                kind: "module unit".to_string(),
            }),
        }
    }

    fn family_mismatch(&self, wanted: &str) -> PipelineError {
        PipelineError::ContainerTypeMismatch {
            container: self.name.clone(),
            container_type: self.type_name.clone(),
            kind: wanted.to_string(),
        }
    }

    /// Serialize current contents using the family's format.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match &self.data {
            ContainerData::Strings(map) => {
                let mut out = String::new();
                for (target, content) in map {
                    let bare = target.kind() == self.primary_kind()
                        && target.path_string() == *content;
                    if bare {
                        out.push_str(content);
                    } else {
                        let quoted = serde_json::to_string(content).map_err(|e| {
                            PipelineError::SerializationFailed {
                                subject: self.name.clone(),
                                reason: e.to_string(),
                            }
                        })?;
                        out.push_str(&format!(
                            "{}\t{}\t{}",
                            target.kind().name(),
                            target.path_string(),
                            quoted
                        ));
                    }
                    out.push('\n');
                }
                Ok(out.into_bytes())
            }
            ContainerData::Bytes(map) => {
                let single_root = map.len() == 1
                    && map.keys().all(|t| {
                        t.kind() == self.primary_kind()
                            && t.path() == [PathComponent::exact(ROOT_COMPONENT)].as_slice()
                    });
                if single_root {
                    let blob = map.values().next().map(|v| v.clone()).unwrap_or_default();
                    return Ok(blob);
                }
                let mut out = String::from(BYTES_MAGIC);
                out.push('\n');
                for (target, content) in map {
                    out.push_str(&format!(
                        "{}\t{}\t{}\n",
                        target.kind().name(),
                        target.path_string(),
                        hex_encode(content)
                    ));
                }
                Ok(out.into_bytes())
            }
            ContainerData::Module(map) => {
                let units: Vec<ModuleUnitRepr> = map
                    .iter()
                    .map(|(target, body)| ModuleUnitRepr {
                        kind: target.kind().name().to_string(),
                        path: target.path_string(),
                        body: body.clone(),
                    })
                    .collect();
                serde_json::to_vec_pretty(&units).map_err(|e| PipelineError::SerializationFailed {
                    subject: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Replace current contents with the deserialization of `bytes`.
    ///
    /// Kind names inside the payload resolve against this container's
    /// accepted kinds; bare payloads deserialize under the primary kind.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        self.clear();
        match self.family() {
            ContainerFamily::Strings => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    PipelineError::DeserializationFailed {
                        subject: self.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let primary = self.primary_kind().clone();
                for line in text.lines() {
                    if line.is_empty() {
                        continue;
                    }
                    if let Some((kind_name, rest)) = line.split_once('\t') {
                        let (path, quoted) = rest.split_once('\t').ok_or_else(|| {
                            PipelineError::DeserializationFailed {
                                subject: self.name.clone(),
                                reason: format!("malformed entry line '{line}'"),
                            }
                        })?;
                        let kind = self.resolve_kind(kind_name)?;
                        let target = Target::parse(path, kind)?;
                        let content: String = serde_json::from_str(quoted).map_err(|e| {
                            PipelineError::DeserializationFailed {
                                subject: self.name.clone(),
                                reason: e.to_string(),
                            }
                        })?;
                        self.insert_string(target, content)?;
                    } else {
                        let target = Target::parse(line, primary.clone())?;
                        self.insert_string(target, line.to_string())?;
                    }
                }
                Ok(())
            }
            ContainerFamily::Bytes => {
                let is_archive = bytes.starts_with(BYTES_MAGIC.as_bytes())
                    && bytes.get(BYTES_MAGIC.len()) == Some(&b'\n');
                if !is_archive {
                    let primary = self.primary_kind().clone();
                    let target =
                        Target::new(primary, vec![PathComponent::exact(ROOT_COMPONENT)])?;
                    return self.insert_bytes(target, bytes.to_vec());
                }
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    PipelineError::DeserializationFailed {
                        subject: self.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                for line in text.lines().skip(1) {
                    if line.is_empty() {
                        continue;
                    }
                    let mut fields = line.splitn(3, '\t');
                    let (kind_name, path, hex) =
                        match (fields.next(), fields.next(), fields.next()) {
                            (Some(k), Some(p), Some(h)) => (k, p, h),
                            _ => {
                                return Err(PipelineError::DeserializationFailed {
                                    subject: self.name.clone(),
                                    reason: format!("malformed archive line '{line}'"),
                                })
                            }
                        };
                    let kind = self.resolve_kind(kind_name)?;
                    let target = Target::parse(path, kind)?;
                    let content = hex_decode(hex).ok_or_else(|| {
                        PipelineError::DeserializationFailed {
                            subject: self.name.clone(),
                            reason: format!("invalid hex payload in line '{line}'"),
                        }
                    })?;
                    self.insert_bytes(target, content)?;
                }
                Ok(())
            }
            ContainerFamily::Module => {
                let units: Vec<ModuleUnitRepr> =
                    serde_json::from_slice(bytes).map_err(|e| {
                        PipelineError::DeserializationFailed {
                            subject: self.name.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                for unit in units {
                    let kind = self.resolve_kind(&unit.kind)?;
                    let target = Target::parse(&unit.path, kind)?;
                    self.insert_unit(target, unit.body)?;
                }
                Ok(())
            }
        }
    }

    fn resolve_kind(&self, name: &str) -> Result<Kind> {
        self.accepted
            .iter()
            .find(|kind| kind.name() == name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownKind(name.to_string()))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    let digits = text.as_bytes();
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Some(out)
}

/// A step's view of its containers: name to container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSet {
    containers: BTreeMap<String, Container>,
}

impl ContainerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, container: Container) {
        self.containers.insert(container.name().to_string(), container);
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&Container> {
        self.containers
            .get(name)
            .ok_or_else(|| PipelineError::UnknownContainer(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Container> {
        self.containers
            .get_mut(name)
            .ok_or_else(|| PipelineError::UnknownContainer(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Container> {
        self.containers.iter()
    }

    /// Merge another set into this one; entries from `other` win.
    pub fn merge_set(&mut self, other: ContainerSet) -> Result<()> {
        for (name, container) in other.containers {
            match self.containers.get_mut(&name) {
                Some(mine) => mine.merge(container)?,
                None => {
                    self.containers.insert(name, container);
                }
            }
        }
        Ok(())
    }

    /// Enumerate every container's current targets.
    pub fn enumerate_all(&self) -> TargetsByContainer {
        let mut out = TargetsByContainer::new();
        for (name, container) in &self.containers {
            out.union_set(name, &container.enumerate());
        }
        out
    }

    /// New set holding only the targets of `wanted`, container by container.
    pub fn extract(&self, wanted: &TargetsByContainer) -> ContainerSet {
        let mut out = ContainerSet::new();
        for (name, targets) in wanted.iter() {
            if let Some(container) = self.containers.get(name) {
                out.insert(container.extract(targets));
            }
        }
        out
    }
}
