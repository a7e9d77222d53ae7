//! In-memory symbol database: arena, interner, and lookup indices

use crate::model::{
    EdgeKind, ObjectType, PackageDependency, Property, ReferenceEdge, Symbol, SymbolObject,
    SymbolRecord, Version, EXTENDS_PROPERTY,
};
use log::{debug, info};
use regex::RegexBuilder;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::SystemTime;
use string_interner::backend::StringBackend;
use string_interner::StringInterner;

/// Index into the object arena
/// Using u32 saves memory vs usize on 64-bit systems
pub type ObjIdx = u32;

/// Default soft ceiling for the in-memory working set (bytes).
pub const DEFAULT_MEMORY_CEILING: usize = 500 * 1024 * 1024;

/// Metadata for one loaded package
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub publisher: String,
    pub version: Version,
    pub dependencies: Vec<PackageDependency>,
    pub source_path: PathBuf,
    pub loaded_at: SystemTime,
    pub object_count: usize,
    pub counts_by_kind: BTreeMap<ObjectType, usize>,
    pub unknown_keys: usize,
    pub skipped_objects: usize,
    pub load_millis: u64,
}

impl PackageInfo {
    pub fn new(name: &str, publisher: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            publisher: publisher.to_string(),
            version: Version::parse(version),
            dependencies: Vec::new(),
            source_path: PathBuf::new(),
            loaded_at: SystemTime::now(),
            object_count: 0,
            counts_by_kind: BTreeMap::new(),
            unknown_keys: 0,
            skipped_objects: 0,
            load_millis: 0,
        }
    }
}

/// Aggregate counters for diagnostics and the empty-database guard
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub total_objects: usize,
    pub objects_by_type: BTreeMap<ObjectType, usize>,
    pub package_count: usize,
    pub last_insert: Option<SystemTime>,
    pub approx_bytes: usize,
}

// Match tiers; lower sorts first
const TIER_EXACT: u8 = 0;
const TIER_PREFIX: u8 = 1;
const TIER_CONTAINS: u8 = 2;
const TIER_WILDCARD: u8 = 3;

/// Compiled search pattern.
///
/// Names match as case-insensitive substrings; `*` placement shapes the
/// ranking (exact before prefix before contains), and interior `*` turns
/// the whole pattern into an unanchored wildcard expression.
pub enum PatternMatcher {
    /// Literal, `stem*`, or `*stem*` pattern
    Stem(String),
    /// Any other `*` placement, translated with `*` -> `.*`
    Wildcard(regex::Regex),
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Self {
        let lowered = pattern.to_lowercase();
        if !lowered.contains('*') {
            return Self::Stem(lowered);
        }
        let stars = lowered.matches('*').count();
        if stars == 1 && lowered.ends_with('*') {
            return Self::Stem(lowered[..lowered.len() - 1].to_string());
        }
        if stars == 2 && lowered.starts_with('*') && lowered.ends_with('*') {
            return Self::Stem(lowered[1..lowered.len() - 1].to_string());
        }
        let mut expr = String::from("^");
        for (i, part) in lowered.split('*').enumerate() {
            if i > 0 {
                expr.push_str(".*");
            }
            expr.push_str(&regex::escape(part));
        }
        expr.push('$');
        let regex = RegexBuilder::new(&expr)
            .case_insensitive(true)
            .build()
            .expect("escaped wildcard pattern is always a valid regex");
        Self::Wildcard(regex)
    }

    /// Match tier for a lowercased name, or None when it does not match.
    pub fn tier(&self, name_lc: &str) -> Option<u8> {
        match self {
            Self::Stem(stem) => {
                if name_lc == stem {
                    Some(TIER_EXACT)
                } else if name_lc.starts_with(stem.as_str()) {
                    Some(TIER_PREFIX)
                } else if name_lc.contains(stem.as_str()) {
                    Some(TIER_CONTAINS)
                } else {
                    None
                }
            }
            Self::Wildcard(regex) => regex.is_match(name_lc).then_some(TIER_WILDCARD),
        }
    }
}

/// The symbol database
///
/// Owns every loaded object. Queries hand out borrowed views that stay
/// valid until the next load or eviction.
pub struct SymbolDatabase {
    /// String interner for names, packages, namespaces, and property keys
    interner: StringInterner<StringBackend>,

    /// All objects stored once; Option allows tombstoning evicted entries
    /// without shifting indices
    objects: Vec<Option<SymbolObject>>,

    /// (type, id) -> object indices; more than one entry only when two
    /// packages declare the same identity (extensions routinely do)
    by_id: HashMap<(ObjectType, u32), SmallVec<[ObjIdx; 1]>>,

    /// Lowercased name -> object indices
    by_name: HashMap<String, Vec<ObjIdx>>,

    /// Object kind -> object indices
    by_type: HashMap<ObjectType, Vec<ObjIdx>>,

    /// Package symbol -> object indices, for scoped queries and eviction
    by_package: HashMap<Symbol, Vec<ObjIdx>>,

    /// Lowercased base-object name -> extension object indices
    extensions_by_base: HashMap<String, Vec<ObjIdx>>,

    /// Child-collection owners, keyed by lowercased owner name
    fields_by_table: HashMap<String, Vec<ObjIdx>>,
    procedures_by_object: HashMap<String, Vec<ObjIdx>>,
    controls_by_page: HashMap<String, Vec<ObjIdx>>,
    data_items_by_object: HashMap<String, Vec<ObjIdx>>,

    /// Sorted (lowercased name, idx) table. Optional accelerator: search
    /// scans it instead of re-lowercasing every name per query. Dropped
    /// when the memory ceiling is crossed, rebuilt by the next load that
    /// fits under it.
    name_index: Option<Vec<(String, ObjIdx)>>,

    /// Loaded package metadata by exact package name
    packages: HashMap<String, PackageInfo>,

    last_insert: Option<SystemTime>,
    approx_bytes: usize,
    memory_ceiling: usize,
}

impl SymbolDatabase {
    pub fn new() -> Self {
        Self::with_memory_ceiling(DEFAULT_MEMORY_CEILING)
    }

    pub fn with_memory_ceiling(memory_ceiling: usize) -> Self {
        Self {
            interner: StringInterner::default(),
            objects: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            by_package: HashMap::new(),
            extensions_by_base: HashMap::new(),
            fields_by_table: HashMap::new(),
            procedures_by_object: HashMap::new(),
            controls_by_page: HashMap::new(),
            data_items_by_object: HashMap::new(),
            name_index: Some(Vec::new()),
            packages: HashMap::new(),
            last_insert: None,
            approx_bytes: 0,
            memory_ceiling,
        }
    }

    /// Resolve a symbol to its string
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Atomically replace a package's contents: prior objects (if any) are
    /// evicted and the staged records inserted in one step, so readers on
    /// the same snapshot never observe a partial package.
    pub fn replace_package(&mut self, mut info: PackageInfo, records: Vec<SymbolRecord>) {
        if self.packages.contains_key(&info.name) {
            debug!("evicting previous contents of {}", info.name);
            self.evict_package(&info.name);
        }

        let package_sym = self.interner.get_or_intern(&info.name);
        info.object_count = records.len();
        info.counts_by_kind.clear();
        for record in records {
            *info.counts_by_kind.entry(record.object_type).or_default() += 1;
            self.insert(package_sym, record);
        }
        self.packages.insert(info.name.clone(), info);
        self.last_insert = Some(SystemTime::now());
        self.refresh_name_index();
    }

    /// Insert one record. Idempotent by (type, id, package): a repeated
    /// identity within the same package replaces the earlier object.
    fn insert(&mut self, package_sym: Symbol, record: SymbolRecord) {
        let identity = (record.object_type, record.id);
        if let Some(existing) = self.by_id.get(&identity) {
            let duplicate = existing.iter().copied().find(|&idx| {
                self.objects[idx as usize]
                    .as_ref()
                    .is_some_and(|o| o.package == package_sym)
            });
            if let Some(idx) = duplicate {
                self.remove_object(idx);
            }
        }

        self.approx_bytes += record.approx_bytes();

        let name_lc = record.name.to_lowercase();
        let extends_lc = record.extends().map(str::to_lowercase);
        let properties: Vec<Property> = record
            .properties
            .iter()
            .map(|(k, v)| Property {
                key: self.interner.get_or_intern(k),
                value: v.clone(),
            })
            .collect();
        let object = SymbolObject {
            object_type: record.object_type,
            id: record.id,
            name: self.interner.get_or_intern(&record.name),
            package: package_sym,
            namespace: record
                .namespace
                .as_deref()
                .map(|ns| self.interner.get_or_intern(ns)),
            properties,
            payload: record.payload,
        };

        let idx = self.objects.len() as ObjIdx;
        let object_type = object.object_type;
        self.by_id.entry(identity).or_default().push(idx);
        self.by_name.entry(name_lc.clone()).or_default().push(idx);
        self.by_type.entry(object_type).or_default().push(idx);
        self.by_package.entry(package_sym).or_default().push(idx);
        if let Some(base) = extends_lc {
            self.extensions_by_base.entry(base).or_default().push(idx);
        }
        match object_type {
            ObjectType::Table | ObjectType::TableExtension => {
                self.fields_by_table.entry(name_lc).or_default().push(idx);
            }
            ObjectType::Page | ObjectType::PageExtension => {
                self.controls_by_page.entry(name_lc).or_default().push(idx);
            }
            ObjectType::Codeunit | ObjectType::Interface => {
                self.procedures_by_object
                    .entry(name_lc)
                    .or_default()
                    .push(idx);
            }
            ObjectType::Report
            | ObjectType::Query
            | ObjectType::XmlPort
            | ObjectType::ReportExtension => {
                self.data_items_by_object
                    .entry(name_lc)
                    .or_default()
                    .push(idx);
            }
            _ => {}
        }
        self.objects.push(Some(object));
    }

    /// Remove every object contributed by a package, keeping all indices
    /// consistent for the remaining packages.
    pub fn evict_package(&mut self, name: &str) {
        let package_sym = self.interner.get(name);
        if let Some(package_sym) = package_sym {
            let indices = self.by_package.remove(&package_sym).unwrap_or_default();
            for idx in indices {
                self.remove_object(idx);
            }
        }
        self.packages.remove(name);
        self.name_index = None;
    }

    fn remove_object(&mut self, idx: ObjIdx) {
        let Some(object) = self
            .objects
            .get_mut(idx as usize)
            .and_then(|slot| slot.take())
        else {
            return;
        };
        let name_lc = self.resolve(object.name).to_lowercase();

        if let Some(indices) = self.by_id.get_mut(&(object.object_type, object.id)) {
            indices.retain(|i| *i != idx);
            if indices.is_empty() {
                self.by_id.remove(&(object.object_type, object.id));
            }
        }
        prune(&mut self.by_name, &name_lc, idx);
        if let Some(indices) = self.by_type.get_mut(&object.object_type) {
            indices.retain(|&i| i != idx);
        }
        if let Some(indices) = self.by_package.get_mut(&object.package) {
            indices.retain(|&i| i != idx);
        }
        if let Some(extends_key) = self.interner.get(EXTENDS_PROPERTY) {
            if let Some(base) = object
                .properties
                .iter()
                .find(|p| p.key == extends_key)
                .map(|p| p.value.to_lowercase())
            {
                prune(&mut self.extensions_by_base, &base, idx);
            }
        }
        prune(&mut self.fields_by_table, &name_lc, idx);
        prune(&mut self.procedures_by_object, &name_lc, idx);
        prune(&mut self.controls_by_page, &name_lc, idx);
        prune(&mut self.data_items_by_object, &name_lc, idx);

        self.approx_bytes = self
            .approx_bytes
            .saturating_sub(object_bytes(&name_lc, &object));
    }

    /// Rebuild or drop the name table depending on the memory ceiling.
    fn refresh_name_index(&mut self) {
        if self.approx_bytes > self.memory_ceiling {
            if self.name_index.take().is_some() {
                info!(
                    "memory ceiling crossed ({} MB in use); dropping name index",
                    self.approx_bytes / (1024 * 1024)
                );
            }
            return;
        }
        let mut table: Vec<(String, ObjIdx)> = self
            .iter_objects()
            .map(|(idx, obj)| (self.resolve(obj.name).to_lowercase(), idx))
            .collect();
        table.sort();
        self.name_index = Some(table);
    }

    fn iter_objects(&self) -> impl Iterator<Item = (ObjIdx, &SymbolObject)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|obj| (i as ObjIdx, obj)))
    }

    pub fn object(&self, idx: ObjIdx) -> Option<&SymbolObject> {
        self.objects.get(idx as usize).and_then(Option::as_ref)
    }

    /// Exact lookup by identity. When two packages declare the same
    /// identity, the most recently loaded wins.
    pub fn get_by_id(&self, object_type: ObjectType, id: u32) -> Option<&SymbolObject> {
        self.by_id
            .get(&(object_type, id))
            .and_then(|indices| indices.last())
            .and_then(|&idx| self.object(idx))
    }

    /// Case-insensitive lookup by name; collisions across packages and
    /// types are all returned.
    pub fn get_by_name(&self, name: &str) -> Vec<&SymbolObject> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|indices| indices.iter().filter_map(|&i| self.object(i)).collect())
            .unwrap_or_default()
    }

    pub fn get_by_type(&self, object_type: ObjectType) -> Vec<&SymbolObject> {
        self.by_type
            .get(&object_type)
            .map(|indices| indices.iter().filter_map(|&i| self.object(i)).collect())
            .unwrap_or_default()
    }

    /// Extension objects whose `Extends` names `base` (case-insensitive).
    pub fn get_extensions(&self, base: &str) -> Vec<&SymbolObject> {
        self.extensions_by_base
            .get(&base.to_lowercase())
            .map(|indices| indices.iter().filter_map(|&i| self.object(i)).collect())
            .unwrap_or_default()
    }

    /// Objects owning field collections under this name (tables and table
    /// extensions).
    pub fn field_owners(&self, name: &str) -> Vec<&SymbolObject> {
        self.owners(&self.fields_by_table, name)
    }

    /// Objects owning procedure collections under this name (codeunits and
    /// interfaces).
    pub fn procedure_owners(&self, name: &str) -> Vec<&SymbolObject> {
        self.owners(&self.procedures_by_object, name)
    }

    /// Objects owning control trees under this name (pages and page
    /// extensions).
    pub fn control_owners(&self, name: &str) -> Vec<&SymbolObject> {
        self.owners(&self.controls_by_page, name)
    }

    /// Objects owning dataset items under this name (reports, queries,
    /// xmlports).
    pub fn data_item_owners(&self, name: &str) -> Vec<&SymbolObject> {
        self.owners(&self.data_items_by_object, name)
    }

    fn owners(&self, map: &HashMap<String, Vec<ObjIdx>>, name: &str) -> Vec<&SymbolObject> {
        map.get(&name.to_lowercase())
            .map(|indices| indices.iter().filter_map(|&i| self.object(i)).collect())
            .unwrap_or_default()
    }

    /// Pattern search with tiered ranking.
    ///
    /// Exact matches sort before prefix before contains before wildcard;
    /// ties break by package, then name, then type, then id, so results are
    /// stable for a given snapshot.
    pub fn search(
        &self,
        pattern: &str,
        type_filter: Option<ObjectType>,
        package_filter: Option<&str>,
    ) -> Vec<&SymbolObject> {
        let matcher = PatternMatcher::new(pattern);
        let mut hits: Vec<(u8, &str, String, ObjectType, u32, ObjIdx)> = Vec::new();

        let consider = |name_lc: String, idx: ObjIdx, hits: &mut Vec<_>| {
            let Some(tier) = matcher.tier(&name_lc) else {
                return;
            };
            let Some(obj) = self.object(idx) else { return };
            if let Some(ty) = type_filter {
                if obj.object_type != ty {
                    return;
                }
            }
            let package = self.resolve(obj.package);
            if let Some(pkg) = package_filter {
                if package != pkg {
                    return;
                }
            }
            hits.push((tier, package, name_lc, obj.object_type, obj.id, idx));
        };

        if let Some(table) = &self.name_index {
            for (name_lc, idx) in table {
                consider(name_lc.clone(), *idx, &mut hits);
            }
        } else {
            for (idx, obj) in self.iter_objects() {
                consider(self.resolve(obj.name).to_lowercase(), idx, &mut hits);
            }
        }

        hits.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.cmp(b.1))
                .then_with(|| a.2.cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
                .then_with(|| a.4.cmp(&b.4))
        });

        hits.iter().filter_map(|h| self.object(h.5)).collect()
    }

    /// Derive reference edges pointing at `target`.
    ///
    /// `extends` edges come from the extension index; the other kinds are
    /// linear property scans over the relevant type buckets, cheap enough
    /// because the buckets bound the scope.
    pub fn find_references(
        &self,
        target: &str,
        kind_filter: Option<EdgeKind>,
        source_type_filter: Option<ObjectType>,
    ) -> Vec<ReferenceEdge> {
        let target_lc = target.to_lowercase();
        let wants = |kind: EdgeKind| kind_filter.is_none() || kind_filter == Some(kind);
        let mut edges = Vec::new();

        let push = |edges: &mut Vec<ReferenceEdge>,
                    obj: &SymbolObject,
                    kind: EdgeKind,
                    detail: Option<String>| {
            if let Some(ty) = source_type_filter {
                if obj.object_type != ty {
                    return;
                }
            }
            edges.push(ReferenceEdge {
                kind,
                source_type: obj.object_type,
                source_id: obj.id,
                source_name: self.resolve(obj.name).to_string(),
                source_package: self.resolve(obj.package).to_string(),
                target: target.to_string(),
                detail,
            });
        };

        if wants(EdgeKind::Extends) {
            for obj in self.get_extensions(target) {
                push(&mut edges, obj, EdgeKind::Extends, None);
            }
        }

        if wants(EdgeKind::SourceTable) {
            for obj in self.get_by_type(ObjectType::Page) {
                if let Some(value) = self.property_value(obj, "SourceTable") {
                    if value.to_lowercase() == target_lc {
                        push(&mut edges, obj, EdgeKind::SourceTable, None);
                    }
                }
            }
        }

        if wants(EdgeKind::TableRelation) {
            for ty in [ObjectType::Table, ObjectType::TableExtension] {
                for obj in self.get_by_type(ty) {
                    let Some(fields) = obj.payload.fields() else { continue };
                    for field in fields {
                        let related = field
                            .properties
                            .iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case("TableRelation"))
                            .map(|(_, v)| relation_target(v));
                        if related.is_some_and(|r| r.to_lowercase() == target_lc) {
                            push(
                                &mut edges,
                                obj,
                                EdgeKind::TableRelation,
                                Some(field.name.clone()),
                            );
                        }
                    }
                }
            }
        }

        if wants(EdgeKind::Uses) {
            for obj in self.get_by_type(ObjectType::Codeunit) {
                let mut hit: Option<String> = None;
                if let Some(procedures) = obj.payload.procedures() {
                    'procs: for proc in procedures {
                        for param in &proc.parameters {
                            if param
                                .type_definition
                                .subtype
                                .as_deref()
                                .is_some_and(|s| s.to_lowercase() == target_lc)
                            {
                                hit = Some(proc.name.clone());
                                break 'procs;
                            }
                        }
                        if proc
                            .return_type
                            .as_ref()
                            .and_then(|t| t.subtype.as_deref())
                            .is_some_and(|s| s.to_lowercase() == target_lc)
                        {
                            hit = Some(proc.name.clone());
                            break 'procs;
                        }
                    }
                }
                if hit.is_none() {
                    if let Some(variables) = obj.payload.variables() {
                        hit = variables
                            .iter()
                            .find(|v| {
                                v.type_definition
                                    .subtype
                                    .as_deref()
                                    .is_some_and(|s| s.to_lowercase() == target_lc)
                            })
                            .map(|v| v.name.clone());
                    }
                }
                if let Some(detail) = hit {
                    push(&mut edges, obj, EdgeKind::Uses, Some(detail));
                }
            }
        }

        if wants(EdgeKind::Implements) {
            for obj in self.get_by_type(ObjectType::Codeunit) {
                if let Some(value) = self.property_value(obj, "ImplementedInterfaces") {
                    if value
                        .split(',')
                        .any(|part| part.trim().to_lowercase() == target_lc)
                    {
                        push(&mut edges, obj, EdgeKind::Implements, None);
                    }
                }
            }
        }

        edges
    }

    /// Look up a property on a stored object by key name.
    pub fn property_value<'a>(&self, obj: &'a SymbolObject, key: &str) -> Option<&'a str> {
        let key_sym = self.interner.get(key)?;
        obj.properties
            .iter()
            .find(|p| p.key == key_sym)
            .map(|p| p.value.as_str())
    }

    pub fn stats(&self) -> DatabaseStats {
        let mut objects_by_type = BTreeMap::new();
        let mut total = 0;
        for (ty, indices) in &self.by_type {
            let count = indices.len();
            if count > 0 {
                objects_by_type.insert(*ty, count);
            }
            total += count;
        }
        DatabaseStats {
            total_objects: total,
            objects_by_type,
            package_count: self.packages.len(),
            last_insert: self.last_insert,
            approx_bytes: self.approx_bytes,
        }
    }

    pub fn packages(&self) -> Vec<&PackageInfo> {
        let mut all: Vec<&PackageInfo> = self.packages.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn package(&self, name: &str) -> Option<&PackageInfo> {
        self.packages.get(name)
    }

    pub fn approximate_memory_bytes(&self) -> usize {
        self.approx_bytes
    }

    pub fn has_name_index(&self) -> bool {
        self.name_index.is_some()
    }
}

impl Default for SymbolDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn prune(map: &mut HashMap<String, Vec<ObjIdx>>, key: &str, idx: ObjIdx) {
    if let Some(indices) = map.get_mut(key) {
        indices.retain(|&i| i != idx);
        if indices.is_empty() {
            map.remove(key);
        }
    }
}

/// Approximate heap bytes for a stored object (name keys live in the
/// interner, so only payload and property values count here).
fn object_bytes(name_lc: &str, object: &SymbolObject) -> usize {
    use crate::model::ObjectPayload;

    let mut bytes = std::mem::size_of::<SymbolObject>() + name_lc.len();
    for p in &object.properties {
        bytes += p.value.len() + 16;
    }
    bytes += match &object.payload {
        ObjectPayload::Table { fields, keys } => fields.len() * 96 + keys.len() * 48,
        ObjectPayload::Page { controls } => controls.len() * 64,
        ObjectPayload::Codeunit {
            procedures,
            variables,
            triggers,
        } => (procedures.len() + triggers.len()) * 96 + variables.len() * 48,
        ObjectPayload::Interface { procedures } => procedures.len() * 96,
        ObjectPayload::Dataset { data_items } => data_items.len() * 96,
        ObjectPayload::Enum { values } => values.len() * 32,
        ObjectPayload::None => 0,
    };
    bytes
}

/// First table name out of a TableRelation property value, which may carry
/// quoting, field paths, and WHERE filters.
fn relation_target(value: &str) -> &str {
    let v = value.trim();
    if let Some(rest) = v.strip_prefix('"') {
        if let Some(end) = rest.find('"') {
            return &rest[..end];
        }
    }
    let mut end = v.len();
    if let Some(dot) = v.find('.') {
        end = end.min(dot);
    }
    if let Some(pos) = v.to_lowercase().find(" where") {
        end = end.min(pos);
    }
    v[..end].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, ObjectPayload, Procedure, TypeDefinition, Variable};

    fn record(ty: ObjectType, id: u32, name: &str) -> SymbolRecord {
        SymbolRecord {
            object_type: ty,
            id,
            name: name.to_string(),
            namespace: None,
            properties: Vec::new(),
            payload: match ty {
                ObjectType::Table | ObjectType::TableExtension => ObjectPayload::Table {
                    fields: Vec::new(),
                    keys: Vec::new(),
                },
                ObjectType::Page | ObjectType::PageExtension => ObjectPayload::Page {
                    controls: Vec::new(),
                },
                ObjectType::Codeunit => ObjectPayload::Codeunit {
                    procedures: Vec::new(),
                    variables: Vec::new(),
                    triggers: Vec::new(),
                },
                _ => ObjectPayload::None,
            },
        }
    }

    fn with_property(mut rec: SymbolRecord, key: &str, value: &str) -> SymbolRecord {
        rec.properties.push((key.to_string(), value.to_string()));
        rec
    }

    fn load(db: &mut SymbolDatabase, package: &str, records: Vec<SymbolRecord>) {
        db.replace_package(PackageInfo::new(package, "Test", "1.0.0.0"), records);
    }

    #[test]
    fn test_get_by_id_matches_inserted_name() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![record(ObjectType::Table, 18, "Customer")],
        );
        let obj = db.get_by_id(ObjectType::Table, 18).unwrap();
        assert_eq!(db.resolve(obj.name), "Customer");
    }

    #[test]
    fn test_get_by_name_is_case_insensitive() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![record(ObjectType::Table, 18, "Customer")],
        );
        assert_eq!(db.get_by_name("CUSTOMER").len(), 1);
        assert_eq!(db.get_by_name("customer").len(), 1);
        assert!(db.get_by_name("vendor").is_empty());
    }

    #[test]
    fn test_same_identity_in_same_package_last_write_wins() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 18, "Customer"),
                record(ObjectType::Table, 18, "Customer Renamed"),
            ],
        );
        let obj = db.get_by_id(ObjectType::Table, 18).unwrap();
        assert_eq!(db.resolve(obj.name), "Customer Renamed");
        assert_eq!(db.stats().total_objects, 1);
        assert!(db.get_by_name("Customer").is_empty());
    }

    #[test]
    fn test_extension_id_may_collide_with_base() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 50100, "Test Item"),
                record(ObjectType::TableExtension, 50100, "Test Item Ext"),
            ],
        );
        assert_eq!(db.stats().total_objects, 2);
        assert_eq!(
            db.resolve(db.get_by_id(ObjectType::Table, 50100).unwrap().name),
            "Test Item"
        );
        assert_eq!(
            db.resolve(
                db.get_by_id(ObjectType::TableExtension, 50100)
                    .unwrap()
                    .name
            ),
            "Test Item Ext"
        );
    }

    #[test]
    fn test_get_extensions_by_base_name() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![record(ObjectType::Table, 70000, "Test Item")],
        );
        load(
            &mut db,
            "Ext",
            vec![with_property(
                record(ObjectType::TableExtension, 70000, "Test Item Ext"),
                "Extends",
                "Test Item",
            )],
        );
        let extensions = db.get_extensions("test item");
        assert_eq!(extensions.len(), 1);
        assert_eq!(db.resolve(extensions[0].name), "Test Item Ext");
        assert_eq!(extensions[0].object_type, ObjectType::TableExtension);
    }

    #[test]
    fn test_search_ranks_exact_then_prefix_then_contains() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 21, "Cust. Ledger Entry"),
                record(ObjectType::Page, 22, "Customer Card"),
                record(ObjectType::Table, 18, "Customer"),
                record(ObjectType::TableExtension, 23, "My Customer Extension"),
            ],
        );

        let results = db.search("Customer", None, None);
        assert_eq!(results.len(), 3);
        assert_eq!(db.resolve(results[0].name), "Customer");

        let results = db.search("Cust", None, None);
        assert_eq!(results.len(), 4);

        let results = db.search("Customer*", None, None);
        let names: Vec<_> = results.iter().map(|o| db.resolve(o.name)).collect();
        assert_eq!(names, ["Customer", "Customer Card", "My Customer Extension"]);

        let results = db.search("*Customer*", None, None);
        assert_eq!(results.len(), 3);
        assert_eq!(db.resolve(results[0].name), "Customer");
    }

    #[test]
    fn test_search_type_filter_excludes_other_kinds() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 18, "Customer"),
                record(ObjectType::Page, 22, "Customer Card"),
            ],
        );
        let results = db.search("customer", Some(ObjectType::Table), None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].object_type, ObjectType::Table);
    }

    #[test]
    fn test_search_package_filter() {
        let mut db = SymbolDatabase::new();
        load(&mut db, "A", vec![record(ObjectType::Table, 1, "Customer")]);
        load(
            &mut db,
            "B",
            vec![record(ObjectType::Table, 2, "Customer List Helper")],
        );
        let results = db.search("customer", None, Some("B"));
        assert_eq!(results.len(), 1);
        assert_eq!(db.resolve(results[0].package), "B");
    }

    #[test]
    fn test_search_is_stable_for_fixed_snapshot() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 3, "Alpha"),
                record(ObjectType::Table, 1, "Alpine"),
                record(ObjectType::Page, 2, "Alpha"),
            ],
        );
        let first: Vec<_> = db
            .search("Alp", None, None)
            .iter()
            .map(|o| (o.object_type, o.id))
            .collect();
        let second: Vec<_> = db
            .search("Alp", None, None)
            .iter()
            .map(|o| (o.object_type, o.id))
            .collect();
        assert_eq!(first, second);
        // Table sorts before Page for the tied name "Alpha"
        assert_eq!(first[0], (ObjectType::Table, 3));
    }

    #[test]
    fn test_prefix_pattern_ranks_prefix_matches_first() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 3, "My Item"),
                record(ObjectType::Table, 2, "Item Ledger Entry"),
                record(ObjectType::Table, 1, "Item"),
            ],
        );
        let starred: Vec<_> = db.search("Item*", None, None).iter().map(|o| o.id).collect();
        let literal: Vec<_> = db.search("Item", None, None).iter().map(|o| o.id).collect();
        // starred results contain every literal match, in tier order
        assert_eq!(starred, vec![1, 2, 3]);
        assert_eq!(starred, literal);
    }

    #[test]
    fn test_wildcard_pattern_with_interior_star() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 1, "Sales Invoice Header"),
                record(ObjectType::Table, 2, "Sales Header"),
                record(ObjectType::Table, 3, "Sales Line"),
            ],
        );
        let results = db.search("Sales*Header", None, None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_search_without_name_index_matches_indexed_results() {
        let mut populate = |db: &mut SymbolDatabase| {
            load(
                db,
                "Base",
                vec![
                    record(ObjectType::Table, 1, "Customer"),
                    record(ObjectType::Page, 2, "Customer Card"),
                ],
            );
        };
        let mut indexed = SymbolDatabase::new();
        populate(&mut indexed);
        let mut degraded = SymbolDatabase::with_memory_ceiling(1);
        populate(&mut degraded);
        assert!(indexed.has_name_index());
        assert!(!degraded.has_name_index());

        let a: Vec<_> = indexed
            .search("Cust*", None, None)
            .iter()
            .map(|o| (o.object_type, o.id))
            .collect();
        let b: Vec<_> = degraded
            .search("Cust*", None, None)
            .iter()
            .map(|o| (o.object_type, o.id))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_evict_package_clears_all_indices() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Gone",
            vec![
                with_property(
                    record(ObjectType::TableExtension, 1, "Item Ext"),
                    "Extends",
                    "Item",
                ),
                record(ObjectType::Table, 2, "Scratch"),
            ],
        );
        load(
            &mut db,
            "Kept",
            vec![record(ObjectType::Table, 3, "Survivor")],
        );

        db.evict_package("Gone");

        assert!(db.get_by_id(ObjectType::Table, 2).is_none());
        assert!(db.get_by_name("Item Ext").is_empty());
        assert!(db.get_extensions("Item").is_empty());
        assert!(db.field_owners("Item Ext").is_empty());
        assert!(db.search("*", None, Some("Gone")).is_empty());
        assert_eq!(db.stats().package_count, 1);
        assert_eq!(db.get_by_name("Survivor").len(), 1);
    }

    #[test]
    fn test_replace_package_is_atomic_swap() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "App",
            vec![record(ObjectType::Table, 1, "Old Table")],
        );
        load(
            &mut db,
            "App",
            vec![record(ObjectType::Table, 2, "New Table")],
        );
        assert!(db.get_by_name("Old Table").is_empty());
        assert_eq!(db.get_by_name("New Table").len(), 1);
        assert_eq!(db.stats().total_objects, 1);
    }

    #[test]
    fn test_find_references_extends() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 70000, "Test Item"),
                with_property(
                    record(ObjectType::TableExtension, 70000, "Test Item Ext"),
                    "Extends",
                    "Test Item",
                ),
            ],
        );
        let edges = db.find_references("Test Item", Some(EdgeKind::Extends), None);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_name, "Test Item Ext");
        assert_eq!(edges[0].kind, EdgeKind::Extends);
    }

    #[test]
    fn test_find_references_source_table_and_table_relation() {
        let mut db = SymbolDatabase::new();
        let mut table = record(ObjectType::Table, 36, "Sales Header");
        table.payload = ObjectPayload::Table {
            fields: vec![Field {
                id: 2,
                name: "Sell-to Customer No.".into(),
                type_definition: TypeDefinition::default(),
                properties: vec![(
                    "TableRelation".into(),
                    "Customer.\"No.\" WHERE(Blocked=CONST(false))".into(),
                )],
            }],
            keys: Vec::new(),
        };
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 18, "Customer"),
                with_property(
                    record(ObjectType::Page, 21, "Customer Card"),
                    "SourceTable",
                    "Customer",
                ),
                table,
            ],
        );

        let edges = db.find_references("Customer", None, None);
        let kinds: Vec<_> = edges.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EdgeKind::SourceTable));
        assert!(kinds.contains(&EdgeKind::TableRelation));
        let relation = edges
            .iter()
            .find(|e| e.kind == EdgeKind::TableRelation)
            .unwrap();
        assert_eq!(relation.detail.as_deref(), Some("Sell-to Customer No."));
    }

    #[test]
    fn test_find_references_uses_and_implements() {
        let mut db = SymbolDatabase::new();
        let mut codeunit = record(ObjectType::Codeunit, 80, "Sales-Post");
        codeunit.payload = ObjectPayload::Codeunit {
            procedures: vec![Procedure {
                name: "Run".into(),
                parameters: smallvec::smallvec![crate::model::Parameter {
                    name: "SalesHeader".into(),
                    type_definition: TypeDefinition {
                        kind: "Record".into(),
                        length: None,
                        subtype: Some("Sales Header".into()),
                    },
                }],
                return_type: None,
                visibility: None,
            }],
            variables: vec![Variable {
                name: "Cust".into(),
                type_definition: TypeDefinition {
                    kind: "Record".into(),
                    length: None,
                    subtype: Some("Customer".into()),
                },
            }],
            triggers: Vec::new(),
        };
        let implementer = with_property(
            record(ObjectType::Codeunit, 81, "Price Calc V2"),
            "ImplementedInterfaces",
            "Price Calculation, Line Discount",
        );
        load(&mut db, "Base", vec![codeunit, implementer]);

        let uses = db.find_references("Sales Header", Some(EdgeKind::Uses), None);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].detail.as_deref(), Some("Run"));

        let uses_var = db.find_references("Customer", Some(EdgeKind::Uses), None);
        assert_eq!(uses_var.len(), 1);
        assert_eq!(uses_var[0].detail.as_deref(), Some("Cust"));

        let implements = db.find_references("Price Calculation", Some(EdgeKind::Implements), None);
        assert_eq!(implements.len(), 1);
        assert_eq!(implements[0].source_name, "Price Calc V2");
    }

    #[test]
    fn test_stats_counts_by_type() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 1, "A"),
                record(ObjectType::Table, 2, "B"),
                record(ObjectType::Page, 3, "C"),
            ],
        );
        let stats = db.stats();
        assert_eq!(stats.total_objects, 3);
        assert_eq!(stats.objects_by_type[&ObjectType::Table], 2);
        assert_eq!(stats.objects_by_type[&ObjectType::Page], 1);
        assert_eq!(stats.package_count, 1);
        assert!(stats.last_insert.is_some());
    }

    #[test]
    fn test_relation_target_parsing() {
        assert_eq!(relation_target("Customer"), "Customer");
        assert_eq!(relation_target("Customer.\"No.\""), "Customer");
        assert_eq!(
            relation_target("\"Cust. Ledger Entry\""),
            "Cust. Ledger Entry"
        );
        assert_eq!(
            relation_target("Customer WHERE(Blocked=CONST(false))"),
            "Customer"
        );
    }

    #[test]
    fn test_empty_database_flag() {
        let mut db = SymbolDatabase::new();
        assert!(db.is_empty());
        load(&mut db, "Base", vec![record(ObjectType::Table, 1, "T")]);
        assert!(!db.is_empty());
        db.evict_package("Base");
        assert!(db.is_empty());
    }
}
