//! Streaming decoder for SymbolReference.json manifests
//!
//! Drives serde_json through a seeded visitor so each array element is
//! decoded into one typed record and handed to the sink immediately; no
//! collection is ever held in memory whole. Handles both the legacy
//! root-level layout and the modern namespace-qualified layout, with or
//! without a single outer wrapper object.

use crate::error::{EngineError, EngineResult};
use crate::model::{
    Control, DataColumn, DataItem, EnumValue, Field, ObjectPayload, ObjectType, Parameter,
    Procedure, SymbolRecord, TableKey, TypeDefinition, Variable, EXTENDS_PROPERTY,
};
use log::warn;
use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Recognized collection keys and the object kind their arrays carry.
///
/// This set is maintained explicitly; bump it deliberately when the vendor
/// schema grows. Keys not listed here (and not in [`KNOWN_SCALARS`]) are
/// counted into the parse report instead of being silently dropped.
const KNOWN_COLLECTIONS: &[(&str, ObjectType)] = &[
    ("Table", ObjectType::Table),
    ("Tables", ObjectType::Table),
    ("Page", ObjectType::Page),
    ("Pages", ObjectType::Page),
    ("Codeunit", ObjectType::Codeunit),
    ("Codeunits", ObjectType::Codeunit),
    ("Report", ObjectType::Report),
    ("Reports", ObjectType::Report),
    ("Enum", ObjectType::Enum),
    ("Enums", ObjectType::Enum),
    ("EnumType", ObjectType::Enum),
    ("EnumTypes", ObjectType::Enum),
    ("Interface", ObjectType::Interface),
    ("Interfaces", ObjectType::Interface),
    ("PermissionSet", ObjectType::PermissionSet),
    ("PermissionSets", ObjectType::PermissionSet),
    ("XmlPort", ObjectType::XmlPort),
    ("XmlPorts", ObjectType::XmlPort),
    ("Query", ObjectType::Query),
    ("Queries", ObjectType::Query),
    ("TableExtension", ObjectType::TableExtension),
    ("TableExtensions", ObjectType::TableExtension),
    ("PageExtension", ObjectType::PageExtension),
    ("PageExtensions", ObjectType::PageExtension),
    ("EnumExtensionType", ObjectType::EnumExtensionType),
    ("EnumExtensionTypes", ObjectType::EnumExtensionType),
    ("ReportExtension", ObjectType::ReportExtension),
    ("ReportExtensions", ObjectType::ReportExtension),
    ("PermissionSetExtension", ObjectType::PermissionSetExtension),
    ("PermissionSetExtensions", ObjectType::PermissionSetExtension),
];

/// Scalar metadata keys expected at manifest or namespace level.
const KNOWN_SCALARS: &[&str] = &["AppId", "Id", "Name", "Publisher", "Version", "Runtime"];

fn collection_kind(key: &str) -> Option<ObjectType> {
    KNOWN_COLLECTIONS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, ty)| *ty)
}

fn is_known_scalar(key: &str) -> bool {
    KNOWN_SCALARS.contains(&key)
}

/// Diagnostics gathered while decoding one manifest
#[derive(Debug, Default, Clone)]
pub struct ParseReport {
    pub objects: usize,
    pub objects_by_kind: BTreeMap<ObjectType, usize>,
    /// Unrecognized keys seen at manifest or object level, by name
    pub unknown_keys: BTreeMap<String, usize>,
    /// Elements that could not be decoded and were skipped
    pub skipped_objects: usize,
}

/// Decode a manifest stream, handing each symbol to `sink` as soon as it is
/// complete. `path` is used for error reporting only.
pub fn decode_manifest<R: Read, F: FnMut(SymbolRecord)>(
    reader: R,
    path: &Path,
    sink: F,
) -> EngineResult<ParseReport> {
    let mut counting = CountingReader {
        inner: reader,
        consumed: 0,
    };
    let mut ctx = DecodeCtx {
        sink,
        report: ParseReport::default(),
    };

    let result = {
        let mut de = serde_json::Deserializer::from_reader(&mut counting);
        ManifestSeed {
            ctx: &mut ctx,
            namespace: None,
            wrapper_allowed: true,
        }
        .deserialize(&mut de)
    };
    // Deliberately no trailing-content check: real packages pad the entry
    // with NUL bytes after the document.

    match result {
        Ok(()) => Ok(ctx.report),
        Err(e) => Err(EngineError::Decode {
            path: path.to_path_buf(),
            offset: counting.consumed,
            reason: e.to_string(),
        }),
    }
}

/// Read wrapper tracking how many bytes the decoder has consumed, so a
/// malformed document can be reported with a byte offset.
struct CountingReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

struct DecodeCtx<F> {
    sink: F,
    report: ParseReport,
}

impl<F: FnMut(SymbolRecord)> DecodeCtx<F> {
    fn emit(&mut self, record: SymbolRecord) {
        self.report.objects += 1;
        *self
            .report
            .objects_by_kind
            .entry(record.object_type)
            .or_default() += 1;
        (self.sink)(record);
    }

    fn count_unknown(&mut self, key: &str) {
        *self.report.unknown_keys.entry(key.to_string()).or_default() += 1;
    }
}

/// Visitor over a manifest (or namespace-nested) object
struct ManifestSeed<'a, F> {
    ctx: &'a mut DecodeCtx<F>,
    namespace: Option<String>,
    wrapper_allowed: bool,
}

impl<'de, F: FnMut(SymbolRecord)> DeserializeSeed<'de> for ManifestSeed<'_, F> {
    type Value = ();

    fn deserialize<D: serde::Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, F: FnMut(SymbolRecord)> Visitor<'de> for ManifestSeed<'_, F> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a symbol manifest object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut first = true;
        while let Some(key) = map.next_key::<String>()? {
            if let Some(kind) = collection_kind(&key) {
                map.next_value_seed(CollectionSeed {
                    ctx: &mut *self.ctx,
                    kind,
                    namespace: self.namespace.clone(),
                })?;
            } else if key == "Namespaces" {
                map.next_value_seed(NamespaceListSeed {
                    ctx: &mut *self.ctx,
                    parent: self.namespace.clone(),
                })?;
            } else if is_known_scalar(&key) {
                map.next_value::<IgnoredAny>()?;
            } else if first && self.wrapper_allowed {
                // The whole manifest may sit inside one outer wrapper
                // object; an unknown first key with an object value is
                // treated as that wrapper.
                map.next_value_seed(WrapperSeed {
                    ctx: &mut *self.ctx,
                    key,
                })?;
            } else {
                self.ctx.count_unknown(&key);
                map.next_value::<IgnoredAny>()?;
            }
            first = false;
        }
        Ok(())
    }
}

/// First unknown key at the top level: recurse if it holds an object,
/// otherwise count it as unknown and discard the value.
struct WrapperSeed<'a, F> {
    ctx: &'a mut DecodeCtx<F>,
    key: String,
}

impl<'de, F: FnMut(SymbolRecord)> DeserializeSeed<'de> for WrapperSeed<'_, F> {
    type Value = ();

    fn deserialize<D: serde::Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_any(self)
    }
}

impl<'de, F: FnMut(SymbolRecord)> Visitor<'de> for WrapperSeed<'_, F> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a wrapper object or ignorable value")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<(), A::Error> {
        ManifestSeed {
            ctx: self.ctx,
            namespace: None,
            wrapper_allowed: false,
        }
        .visit_map(map)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        self.ctx.count_unknown(&self.key);
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(())
    }

    fn visit_str<E: serde::de::Error>(self, _: &str) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }

    fn visit_u64<E: serde::de::Error>(self, _: u64) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }

    fn visit_i64<E: serde::de::Error>(self, _: i64) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }

    fn visit_f64<E: serde::de::Error>(self, _: f64) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }

    fn visit_bool<E: serde::de::Error>(self, _: bool) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<(), E> {
        self.ctx.count_unknown(&self.key);
        Ok(())
    }
}

/// Visitor over the `Namespaces` array
struct NamespaceListSeed<'a, F> {
    ctx: &'a mut DecodeCtx<F>,
    parent: Option<String>,
}

impl<'de, F: FnMut(SymbolRecord)> DeserializeSeed<'de> for NamespaceListSeed<'_, F> {
    type Value = ();

    fn deserialize<D: serde::Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_seq(self)
    }
}

impl<'de, F: FnMut(SymbolRecord)> Visitor<'de> for NamespaceListSeed<'_, F> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of namespace objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while seq
            .next_element_seed(NamespaceSeed {
                ctx: &mut *self.ctx,
                parent: self.parent.clone(),
            })?
            .is_some()
        {}
        Ok(())
    }
}

/// Visitor over one namespace object: reads `Name`, then streams nested
/// collections with the dot-joined namespace attached.
struct NamespaceSeed<'a, F> {
    ctx: &'a mut DecodeCtx<F>,
    parent: Option<String>,
}

impl<'de, F: FnMut(SymbolRecord)> DeserializeSeed<'de> for NamespaceSeed<'_, F> {
    type Value = ();

    fn deserialize<D: serde::Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_map(self)
    }
}

impl<'de, F: FnMut(SymbolRecord)> Visitor<'de> for NamespaceSeed<'_, F> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a namespace object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut name: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "Name" {
                name = Some(map.next_value::<String>()?);
            } else if let Some(kind) = collection_kind(&key) {
                map.next_value_seed(CollectionSeed {
                    ctx: &mut *self.ctx,
                    kind,
                    namespace: join_namespace(&self.parent, name.as_deref()),
                })?;
            } else if key == "Namespaces" {
                map.next_value_seed(NamespaceListSeed {
                    ctx: &mut *self.ctx,
                    parent: join_namespace(&self.parent, name.as_deref()),
                })?;
            } else if is_known_scalar(&key) {
                map.next_value::<IgnoredAny>()?;
            } else {
                self.ctx.count_unknown(&key);
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

fn join_namespace(parent: &Option<String>, name: Option<&str>) -> Option<String> {
    match (parent.as_deref(), name) {
        (Some(p), Some(n)) if !n.is_empty() => Some(format!("{p}.{n}")),
        (Some(p), _) => Some(p.to_string()),
        (None, Some(n)) if !n.is_empty() => Some(n.to_string()),
        _ => None,
    }
}

/// Visitor over one object array: decodes element by element
struct CollectionSeed<'a, F> {
    ctx: &'a mut DecodeCtx<F>,
    kind: ObjectType,
    namespace: Option<String>,
}

impl<'de, F: FnMut(SymbolRecord)> DeserializeSeed<'de> for CollectionSeed<'_, F> {
    type Value = ();

    fn deserialize<D: serde::Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_any(self)
    }
}

impl<'de, F: FnMut(SymbolRecord)> Visitor<'de> for CollectionSeed<'_, F> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of symbol objects")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(value) = seq.next_element::<Value>()? {
            match serde_json::from_value::<RawSymbol>(value) {
                Ok(raw) => {
                    match raw_to_record(self.kind, raw, self.namespace.clone(), &mut self.ctx.report)
                    {
                        Some(record) => self.ctx.emit(record),
                        None => self.ctx.report.skipped_objects += 1,
                    }
                }
                Err(e) => {
                    warn!("skipping unreadable {} element: {e}", self.kind);
                    self.ctx.report.skipped_objects += 1;
                }
            }
        }
        Ok(())
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<(), E> {
        // Collections are occasionally emitted as null
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Raw wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSymbol {
    #[serde(default)]
    id: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    properties: Vec<RawProperty>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    keys: Vec<RawKey>,
    #[serde(default)]
    controls: Vec<RawControl>,
    #[serde(default)]
    methods: Vec<RawMethod>,
    #[serde(default)]
    triggers: Vec<RawMethod>,
    #[serde(default)]
    variables: Vec<RawVariable>,
    #[serde(default)]
    data_items: Vec<RawDataItem>,
    #[serde(default)]
    values: Vec<RawEnumValue>,
    #[serde(default)]
    target_object: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    implemented_interfaces: Vec<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawProperty {
    name: String,
    value: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawField {
    id: u32,
    name: String,
    type_definition: Option<RawTypeDef>,
    properties: Vec<RawProperty>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawKey {
    name: String,
    field_names: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawControl {
    name: String,
    kind: Value,
    source_expression: Option<String>,
    properties: Vec<RawProperty>,
    controls: Vec<RawControl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawMethod {
    name: String,
    parameters: Vec<RawParameter>,
    return_type_definition: Option<RawTypeDef>,
    visibility: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawParameter {
    name: String,
    type_definition: Option<RawTypeDef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawVariable {
    name: String,
    type_definition: Option<RawTypeDef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawDataItem {
    name: String,
    #[serde(alias = "DataItemTable", alias = "RelatedTable")]
    source_table: Option<String>,
    columns: Vec<RawDataColumn>,
    data_items: Vec<RawDataItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawDataColumn {
    name: String,
    #[serde(alias = "SourceExpression")]
    source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawEnumValue {
    #[serde(alias = "Id")]
    ordinal: i64,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawTypeDef {
    name: String,
    length: Option<Value>,
    subtype: Option<RawSubtype>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawSubtype {
    name: String,
}

// ---------------------------------------------------------------------------
// Conversion to the typed model
// ---------------------------------------------------------------------------

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn convert_properties(raw: Vec<RawProperty>) -> Vec<(String, String)> {
    raw.into_iter()
        .filter(|p| !p.name.is_empty())
        .map(|p| (p.name, value_to_string(&p.value)))
        .collect()
}

fn convert_type(raw: Option<RawTypeDef>) -> TypeDefinition {
    let Some(raw) = raw else {
        return TypeDefinition::default();
    };
    let length = raw.length.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });
    TypeDefinition {
        kind: raw.name,
        length,
        subtype: raw.subtype.map(|s| s.name).filter(|n| !n.is_empty()),
    }
}

fn convert_field(raw: RawField) -> Field {
    Field {
        id: raw.id,
        name: raw.name,
        type_definition: convert_type(raw.type_definition),
        properties: convert_properties(raw.properties),
    }
}

fn convert_control(raw: RawControl) -> Control {
    let source = raw.source_expression.filter(|s| !s.is_empty()).or_else(|| {
        raw.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case("SourceExpression"))
            .map(|p| value_to_string(&p.value))
    });
    Control {
        name: raw.name,
        kind: value_to_string(&raw.kind),
        source,
        children: raw.controls.into_iter().map(convert_control).collect(),
    }
}

fn convert_method(raw: RawMethod) -> Procedure {
    Procedure {
        name: raw.name,
        parameters: raw
            .parameters
            .into_iter()
            .map(|p| Parameter {
                name: p.name,
                type_definition: convert_type(p.type_definition),
            })
            .collect::<SmallVec<_>>(),
        return_type: raw.return_type_definition.map(|t| convert_type(Some(t))),
        visibility: raw
            .visibility
            .map(|v| value_to_string(&v))
            .filter(|v| !v.is_empty()),
    }
}

fn convert_data_item(raw: RawDataItem) -> DataItem {
    DataItem {
        name: raw.name,
        source_table: raw.source_table.filter(|s| !s.is_empty()),
        columns: raw
            .columns
            .into_iter()
            .map(|c| DataColumn {
                name: c.name,
                source: c.source.filter(|s| !s.is_empty()),
            })
            .collect(),
        data_items: raw.data_items.into_iter().map(convert_data_item).collect(),
    }
}

fn raw_to_record(
    kind: ObjectType,
    raw: RawSymbol,
    namespace: Option<String>,
    report: &mut ParseReport,
) -> Option<SymbolRecord> {
    if raw.name.is_empty() {
        return None;
    }

    for key in raw.extra.keys() {
        *report.unknown_keys.entry(key.clone()).or_default() += 1;
    }

    let mut properties = convert_properties(raw.properties);

    // The base-object link lives in a vendor-specific property; normalize
    // it to a single synthetic `Extends` entry.
    if kind.is_extension() {
        let base = raw
            .target_object
            .filter(|t| !t.is_empty())
            .or(raw.target.filter(|t| !t.is_empty()))
            .or_else(|| {
                properties
                    .iter()
                    .find(|(k, _)| {
                        k.eq_ignore_ascii_case("TargetObject") || k.eq_ignore_ascii_case("Target")
                    })
                    .map(|(_, v)| v.clone())
            });
        if let Some(base) = base {
            if !properties
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case(EXTENDS_PROPERTY))
            {
                properties.push((EXTENDS_PROPERTY.to_string(), base));
            }
        }
    }

    if !raw.implemented_interfaces.is_empty() {
        properties.push((
            "ImplementedInterfaces".to_string(),
            raw.implemented_interfaces.join(", "),
        ));
    }

    let payload = match kind {
        ObjectType::Table | ObjectType::TableExtension => ObjectPayload::Table {
            fields: raw.fields.into_iter().map(convert_field).collect(),
            keys: raw
                .keys
                .into_iter()
                .map(|k| TableKey {
                    name: k.name,
                    field_names: k.field_names.into_iter().collect(),
                })
                .collect(),
        },
        ObjectType::Page | ObjectType::PageExtension => ObjectPayload::Page {
            controls: raw.controls.into_iter().map(convert_control).collect(),
        },
        ObjectType::Codeunit => ObjectPayload::Codeunit {
            procedures: raw.methods.into_iter().map(convert_method).collect(),
            variables: raw
                .variables
                .into_iter()
                .map(|v| Variable {
                    name: v.name,
                    type_definition: convert_type(v.type_definition),
                })
                .collect(),
            triggers: raw.triggers.into_iter().map(convert_method).collect(),
        },
        ObjectType::Interface => ObjectPayload::Interface {
            procedures: raw.methods.into_iter().map(convert_method).collect(),
        },
        ObjectType::Report
        | ObjectType::Query
        | ObjectType::XmlPort
        | ObjectType::ReportExtension => ObjectPayload::Dataset {
            data_items: raw.data_items.into_iter().map(convert_data_item).collect(),
        },
        ObjectType::Enum | ObjectType::EnumExtensionType => ObjectPayload::Enum {
            values: raw
                .values
                .into_iter()
                .map(|v| EnumValue {
                    ordinal: v.ordinal,
                    name: v.name,
                })
                .collect(),
        },
        ObjectType::PermissionSet | ObjectType::PermissionSetExtension => ObjectPayload::None,
    };

    Some(SymbolRecord {
        object_type: kind,
        id: raw.id,
        name: raw.name,
        namespace,
        properties,
        payload,
    })
}
