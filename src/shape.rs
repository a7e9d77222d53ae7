//! Response shaping: pagination, summary mode, and size budgets

use crate::database::{DatabaseStats, PackageInfo, SymbolDatabase};
use crate::model::{
    Control, DataItem, Field, Procedure, ReferenceEdge, SymbolObject, TypeDefinition,
};
use crate::packages::{LoadReport, LoadStatus};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Absolute caps that apply when no explicit larger limit is passed.
pub const HARD_MAX_FIELDS: usize = 50;
pub const HARD_MAX_PROCEDURES: usize = 20;
pub const HARD_MAX_DEPENDENCIES: usize = 20;

/// Summary-mode caps for the definition endpoint.
const SUMMARY_FIELDS: usize = 20;
const SUMMARY_PROCEDURES: usize = 10;

/// Collection slice attached to search results when asked for.
const ATTACH_CAP: usize = 10;

/// Preview length for summary-mode collection teasers.
const PREVIEW: usize = 3;

/// Estimated-token threshold above which a size warning is attached.
pub const TOKEN_WARN_THRESHOLD: usize = 20_000;

/// No explicit caller limit may exceed this; a response that large cannot
/// be shaped into any sane budget even in summary mode.
pub const ABSOLUTE_LIMIT_CEILING: usize = 10_000;

/// Properties kept in summary mode; everything else is pruned. Identity
/// fields are never pruned, regardless of mode.
const ESSENTIAL_PROPERTIES: &[&str] = &[
    "Caption",
    "DataClassification",
    "TableType",
    "LookupPageId",
    "SourceTable",
    "PageType",
    "Extends",
    "Subtype",
    "Access",
];

/// Validated pagination window
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Apply a window and wrap the shaped items in the standard list envelope.
pub fn page_envelope<T>(
    key: &str,
    items: Vec<T>,
    page: Page,
    shape: impl Fn(&T) -> Value,
) -> Value {
    let total = items.len();
    let window: Vec<Value> = items
        .iter()
        .skip(page.offset)
        .take(page.limit)
        .map(shape)
        .collect();
    let returned = window.len();
    json!({
        key: window,
        "totalFound": total,
        "returned": returned,
        "offset": page.offset,
        "limit": page.limit,
        "hasMore": page.offset + returned < total,
    })
}

/// Options for shaping one object in a search result list
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectShape {
    pub include_fields: bool,
    pub include_procedures: bool,
}

/// Shape a search hit: identity, essential properties, collection counts,
/// short previews, and optionally a capped slice of fields/procedures.
pub fn shape_object(db: &SymbolDatabase, obj: &SymbolObject, opts: ObjectShape) -> Value {
    let mut value = identity(db, obj);
    value["properties"] = properties_json(db, obj, true);
    attach_counts_and_previews(&mut value, obj);

    if opts.include_fields {
        if let Some(fields) = obj.payload.fields() {
            value["fields"] = fields.iter().take(ATTACH_CAP).map(shape_field).collect();
            value["fieldsShown"] = json!(fields.len().min(ATTACH_CAP));
        }
    }
    if opts.include_procedures {
        if let Some(procedures) = obj.payload.procedures() {
            value["procedures"] = procedures
                .iter()
                .take(ATTACH_CAP)
                .map(shape_procedure)
                .collect();
            value["proceduresShown"] = json!(procedures.len().min(ATTACH_CAP));
        }
    }
    value
}

/// Options for the definition endpoint
#[derive(Debug, Clone, Copy)]
pub struct DefinitionOptions {
    pub summary: bool,
    pub include_fields: bool,
    pub include_procedures: bool,
    pub include_keys: bool,
    pub include_dependencies: bool,
    pub max_fields: Option<usize>,
    pub max_procedures: Option<usize>,
    pub max_dependencies: Option<usize>,
}

impl Default for DefinitionOptions {
    fn default() -> Self {
        Self {
            summary: true,
            include_fields: true,
            include_procedures: true,
            include_keys: false,
            include_dependencies: false,
            max_fields: None,
            max_procedures: None,
            max_dependencies: None,
        }
    }
}

/// Shape a full object definition under the caps in `opts`. The token
/// estimate and any size warning are attached here as well.
pub fn shape_definition(db: &SymbolDatabase, obj: &SymbolObject, opts: DefinitionOptions) -> Value {
    let mut value = identity(db, obj);
    value["properties"] = properties_json(db, obj, opts.summary);
    let mut truncated = false;

    let field_cap = opts.max_fields.unwrap_or(if opts.summary {
        SUMMARY_FIELDS
    } else {
        HARD_MAX_FIELDS
    });
    let procedure_cap = opts.max_procedures.unwrap_or(if opts.summary {
        SUMMARY_PROCEDURES
    } else {
        HARD_MAX_PROCEDURES
    });

    match &obj.payload {
        crate::model::ObjectPayload::Table { fields, keys } => {
            value["totalFieldCount"] = json!(fields.len());
            if opts.include_fields {
                let shown: Vec<Value> = fields.iter().take(field_cap).map(shape_field).collect();
                truncated |= shown.len() < fields.len();
                value["fieldsShown"] = json!(shown.len());
                value["fields"] = Value::Array(shown);
            }
            if opts.include_keys {
                value["keys"] = keys
                    .iter()
                    .map(|k| json!({ "name": k.name, "fields": k.field_names.to_vec() }))
                    .collect();
            }
        }
        crate::model::ObjectPayload::Codeunit {
            procedures,
            variables,
            triggers,
        } => {
            value["totalProcedureCount"] = json!(procedures.len());
            if opts.include_procedures {
                let shown: Vec<Value> = procedures
                    .iter()
                    .take(procedure_cap)
                    .map(shape_procedure)
                    .collect();
                truncated |= shown.len() < procedures.len();
                value["proceduresShown"] = json!(shown.len());
                value["procedures"] = Value::Array(shown);
            }
            if !triggers.is_empty() {
                value["triggerCount"] = json!(triggers.len());
            }
            if !variables.is_empty() {
                value["variableCount"] = json!(variables.len());
            }
        }
        crate::model::ObjectPayload::Interface { procedures } => {
            value["totalProcedureCount"] = json!(procedures.len());
            if opts.include_procedures {
                let shown: Vec<Value> = procedures
                    .iter()
                    .take(procedure_cap)
                    .map(shape_procedure)
                    .collect();
                truncated |= shown.len() < procedures.len();
                value["proceduresShown"] = json!(shown.len());
                value["procedures"] = Value::Array(shown);
            }
        }
        crate::model::ObjectPayload::Page { controls } => {
            let total = count_controls(controls);
            value["totalControlCount"] = json!(total);
            let mut flat = Vec::new();
            flatten_controls_json(controls, "", &mut flat);
            truncated |= flat.len() > field_cap;
            flat.truncate(field_cap);
            value["controlsShown"] = json!(flat.len());
            value["controls"] = Value::Array(flat);
        }
        crate::model::ObjectPayload::Dataset { data_items } => {
            value["dataItems"] = data_items.iter().map(shape_data_item).collect();
            value["dataItemCount"] = json!(count_data_items(data_items));
        }
        crate::model::ObjectPayload::Enum { values } => {
            value["totalValueCount"] = json!(values.len());
            let shown: Vec<Value> = values
                .iter()
                .take(field_cap)
                .map(|v| json!({ "ordinal": v.ordinal, "name": v.name }))
                .collect();
            truncated |= shown.len() < values.len();
            value["values"] = Value::Array(shown);
        }
        crate::model::ObjectPayload::None => {}
    }

    if opts.include_dependencies {
        if let Some(info) = db.package(db.resolve(obj.package)) {
            let cap = opts.max_dependencies.unwrap_or(HARD_MAX_DEPENDENCIES);
            let deps: Vec<Value> = info
                .dependencies
                .iter()
                .take(cap)
                .map(|d| {
                    json!({
                        "name": d.name,
                        "publisher": d.publisher,
                        "minVersion": d.min_version.to_string(),
                    })
                })
                .collect();
            truncated |= deps.len() < info.dependencies.len();
            value["dependencies"] = Value::Array(deps);
        }
    }

    finalize(value, truncated)
}

/// Attach the token estimate; when the response is large or a collection
/// was cut at a cap, add a warning naming the flags that shrink it. Nothing
/// is ever truncated further automatically.
pub fn finalize(mut value: Value, truncated: bool) -> Value {
    let estimate = estimate_tokens(&value);
    value["tokenEstimate"] = json!(estimate);
    if estimate > TOKEN_WARN_THRESHOLD || truncated {
        value["sizeWarning"] = json!({
            "message": if truncated {
                "collections were capped; totals reflect the full object"
            } else {
                "response is large; consider narrowing it"
            },
            "shrinkFlags": [
                "summary=true",
                "includeFields=false",
                "includeProcedures=false",
                "maxFields=<n>",
                "maxProcedures=<n>",
                "limit/offset on list endpoints",
            ],
        });
    }
    value
}

/// Rough token count of the serialized payload (~4 bytes per token).
pub fn estimate_tokens(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len() / 4).unwrap_or(0)
}

/// Identity block; present on every shaped object in every mode.
fn identity(db: &SymbolDatabase, obj: &SymbolObject) -> Value {
    let mut value = json!({
        "type": obj.object_type.to_string(),
        "id": obj.id,
        "name": db.resolve(obj.name),
        "packageName": db.resolve(obj.package),
    });
    if let Some(ns) = obj.namespace {
        value["namespace"] = json!(db.resolve(ns));
    }
    value
}

fn properties_json(db: &SymbolDatabase, obj: &SymbolObject, summary: bool) -> Value {
    obj.properties
        .iter()
        .filter(|p| {
            !summary
                || ESSENTIAL_PROPERTIES
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(db.resolve(p.key)))
        })
        .map(|p| json!({ "name": db.resolve(p.key), "value": p.value }))
        .collect()
}

fn attach_counts_and_previews(value: &mut Value, obj: &SymbolObject) {
    match &obj.payload {
        crate::model::ObjectPayload::Table { fields, keys } => {
            value["fieldCount"] = json!(fields.len());
            if !keys.is_empty() {
                value["keyCount"] = json!(keys.len());
            }
            value["fieldPreview"] = fields
                .iter()
                .take(PREVIEW)
                .map(|f| json!(f.name))
                .collect();
        }
        crate::model::ObjectPayload::Codeunit { procedures, .. }
        | crate::model::ObjectPayload::Interface { procedures } => {
            value["procedureCount"] = json!(procedures.len());
            value["procedurePreview"] = procedures
                .iter()
                .take(PREVIEW)
                .map(|p| json!(p.name))
                .collect();
        }
        crate::model::ObjectPayload::Page { controls } => {
            value["controlCount"] = json!(count_controls(controls));
        }
        crate::model::ObjectPayload::Dataset { data_items } => {
            value["dataItemCount"] = json!(count_data_items(data_items));
        }
        crate::model::ObjectPayload::Enum { values } => {
            value["valueCount"] = json!(values.len());
            value["valuePreview"] = values
                .iter()
                .take(PREVIEW)
                .map(|v| json!(v.name))
                .collect();
        }
        crate::model::ObjectPayload::None => {}
    }
}

pub fn shape_field(field: &Field) -> Value {
    let mut value = json!({
        "id": field.id,
        "name": field.name,
        "type": type_string(&field.type_definition),
    });
    for key in ["Caption", "TableRelation"] {
        if let Some((_, v)) = field
            .properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            value[lower_first(key)] = json!(v);
        }
    }
    value
}

pub fn shape_procedure(procedure: &Procedure) -> Value {
    let mut value = json!({
        "name": procedure.name,
        "parameters": procedure
            .parameters
            .iter()
            .map(|p| json!({ "name": p.name, "type": type_string(&p.type_definition) }))
            .collect::<Vec<_>>(),
    });
    if let Some(ret) = &procedure.return_type {
        value["returnType"] = json!(type_string(ret));
    }
    if let Some(vis) = &procedure.visibility {
        value["visibility"] = json!(vis);
    }
    value
}

pub fn shape_control(control: &Control, path: &str) -> Value {
    let mut value = json!({
        "name": control.name,
        "kind": control.kind,
        "path": path,
    });
    if let Some(source) = &control.source {
        value["source"] = json!(source);
    }
    value
}

pub fn shape_data_item(item: &DataItem) -> Value {
    let mut value = json!({ "name": item.name });
    if let Some(table) = &item.source_table {
        value["sourceTable"] = json!(table);
    }
    if !item.columns.is_empty() {
        value["columns"] = item
            .columns
            .iter()
            .map(|c| {
                let mut col = json!({ "name": c.name });
                if let Some(source) = &c.source {
                    col["source"] = json!(source);
                }
                col
            })
            .collect();
    }
    if !item.data_items.is_empty() {
        value["dataItems"] = item.data_items.iter().map(shape_data_item).collect();
    }
    value
}

pub fn shape_edge(edge: &ReferenceEdge) -> Value {
    let mut value = json!({
        "kind": edge.kind.to_string(),
        "sourceType": edge.source_type.to_string(),
        "sourceId": edge.source_id,
        "sourceName": edge.source_name,
        "sourcePackage": edge.source_package,
        "target": edge.target,
    });
    if let Some(detail) = &edge.detail {
        value["detail"] = json!(detail);
    }
    value
}

pub fn shape_stats(stats: &DatabaseStats) -> Value {
    let by_type: serde_json::Map<String, Value> = stats
        .objects_by_type
        .iter()
        .map(|(ty, count)| (ty.to_string(), json!(count)))
        .collect();
    json!({
        "totalObjects": stats.total_objects,
        "objectsByType": by_type,
        "packageCount": stats.package_count,
        "lastIndexTime": stats.last_insert.map(epoch_millis),
        "approxMemoryBytes": stats.approx_bytes,
    })
}

pub fn shape_package(info: &PackageInfo) -> Value {
    let counts: serde_json::Map<String, Value> = info
        .counts_by_kind
        .iter()
        .map(|(ty, count)| (ty.to_string(), json!(count)))
        .collect();
    json!({
        "name": info.name,
        "publisher": info.publisher,
        "version": info.version.to_string(),
        "path": info.source_path.display().to_string(),
        "loadedAt": epoch_millis(info.loaded_at),
        "objectCount": info.object_count,
        "countsByType": counts,
        "unknownKeys": info.unknown_keys,
        "skippedObjects": info.skipped_objects,
        "loadMillis": info.load_millis,
        "dependencies": info
            .dependencies
            .iter()
            .map(|d| json!({
                "name": d.name,
                "publisher": d.publisher,
                "minVersion": d.min_version.to_string(),
            }))
            .collect::<Vec<_>>(),
    })
}

pub fn shape_load_report(report: &LoadReport) -> Value {
    json!({
        "loaded": report.loaded,
        "skipped": report.skipped,
        "errors": report.errors,
        "durationMs": report.duration_ms,
        "packages": report
            .outcomes
            .iter()
            .map(|o| {
                let mut value = json!({
                    "path": o.path.display().to_string(),
                    "package": o.package,
                    "objects": o.objects,
                    "durationMs": o.duration_ms,
                });
                match &o.status {
                    LoadStatus::Loaded => value["status"] = json!("loaded"),
                    LoadStatus::Skipped(reason) => {
                        value["status"] = json!("skipped");
                        value["reason"] = json!(reason);
                    }
                    LoadStatus::Failed(e) => {
                        value["status"] = json!("failed");
                        value["error"] = e.to_response()["error"].clone();
                    }
                }
                value
            })
            .collect::<Vec<_>>(),
    })
}

fn flatten_controls_json(controls: &[Control], prefix: &str, out: &mut Vec<Value>) {
    for control in controls {
        let path = if prefix.is_empty() {
            control.name.clone()
        } else {
            format!("{prefix}/{}", control.name)
        };
        out.push(shape_control(control, &path));
        flatten_controls_json(&control.children, &path, out);
    }
}

fn count_controls(controls: &[Control]) -> usize {
    controls
        .iter()
        .map(|c| 1 + count_controls(&c.children))
        .sum()
}

fn count_data_items(items: &[DataItem]) -> usize {
    items
        .iter()
        .map(|i| 1 + count_data_items(&i.data_items))
        .sum()
}

pub fn type_string(td: &TypeDefinition) -> String {
    if td.kind.is_empty() {
        return "Unknown".to_string();
    }
    let mut out = td.kind.clone();
    if let Some(len) = td.length {
        out.push_str(&format!("[{len}]"));
    }
    if let Some(subtype) = &td.subtype {
        out.push(' ');
        out.push_str(subtype);
    }
    out
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::PackageInfo;
    use crate::model::{ObjectPayload, ObjectType, Parameter, SymbolRecord};
    use smallvec::smallvec;

    fn build_db(records: Vec<SymbolRecord>) -> SymbolDatabase {
        let mut db = SymbolDatabase::new();
        db.replace_package(PackageInfo::new("Base", "Test", "1.0.0.0"), records);
        db
    }

    fn record(ty: ObjectType, id: u32, name: &str) -> SymbolRecord {
        SymbolRecord {
            object_type: ty,
            id,
            name: name.to_string(),
            namespace: None,
            properties: Vec::new(),
            payload: ObjectPayload::default(),
        }
    }

    fn big_codeunit(procedures: usize) -> SymbolRecord {
        let mut rec = record(ObjectType::Codeunit, 50000, "Mega Codeunit");
        rec.payload = ObjectPayload::Codeunit {
            procedures: (0..procedures)
                .map(|i| Procedure {
                    name: format!("Procedure{i}"),
                    parameters: smallvec![Parameter {
                        name: "Value".to_string(),
                        type_definition: TypeDefinition {
                            kind: "Integer".to_string(),
                            length: None,
                            subtype: None,
                        },
                    }],
                    return_type: None,
                    visibility: None,
                })
                .collect(),
            variables: Vec::new(),
            triggers: Vec::new(),
        };
        rec
    }

    #[test]
    fn test_page_defaults_and_clamp() {
        let page = Page::new(None, None);
        assert_eq!(page.limit, 20);
        assert_eq!(page.offset, 0);
        let page = Page::new(Some(500), Some(10));
        assert_eq!(page.limit, 100);
        assert_eq!(page.offset, 10);
    }

    #[test]
    fn test_pagination_window() {
        // 150 items, limit 20 offset 40 -> items 41..60
        let items: Vec<usize> = (1..=150).collect();
        let value = page_envelope("items", items, Page::new(Some(20), Some(40)), |i| json!(i));
        assert_eq!(value["totalFound"], 150);
        assert_eq!(value["returned"], 20);
        assert_eq!(value["offset"], 40);
        assert_eq!(value["limit"], 20);
        assert_eq!(value["hasMore"], true);
        assert_eq!(value["items"][0], 41);
        assert_eq!(value["items"][19], 60);
    }

    #[test]
    fn test_pagination_last_page_has_no_more() {
        let items: Vec<usize> = (1..=25).collect();
        let value = page_envelope("items", items, Page::new(Some(20), Some(20)), |i| json!(i));
        assert_eq!(value["returned"], 5);
        assert_eq!(value["hasMore"], false);
    }

    #[test]
    fn test_identity_survives_summary_mode() {
        let mut rec = record(ObjectType::Table, 18, "Customer");
        rec.properties = vec![
            ("Caption".to_string(), "Customer".to_string()),
            ("ObsoleteState".to_string(), "No".to_string()),
        ];
        let db = build_db(vec![rec]);
        let obj = db.get_by_id(ObjectType::Table, 18).unwrap();
        let value = shape_object(&db, obj, ObjectShape::default());

        assert_eq!(value["type"], "Table");
        assert_eq!(value["id"], 18);
        assert_eq!(value["name"], "Customer");
        assert_eq!(value["packageName"], "Base");
        // summary keeps Caption, prunes ObsoleteState
        let props = value["properties"].as_array().unwrap();
        assert!(props.iter().any(|p| p["name"] == "Caption"));
        assert!(!props.iter().any(|p| p["name"] == "ObsoleteState"));
    }

    #[test]
    fn test_definition_default_mode_caps_procedures_at_ten() {
        let db = build_db(vec![big_codeunit(500)]);
        let obj = db.get_by_id(ObjectType::Codeunit, 50000).unwrap();
        let value = shape_definition(&db, obj, DefinitionOptions::default());

        assert_eq!(value["proceduresShown"], 10);
        assert_eq!(value["totalProcedureCount"], 500);
        assert!(value.get("sizeWarning").is_some());
        let flags = value["sizeWarning"]["shrinkFlags"].as_array().unwrap();
        assert!(!flags.is_empty());
        // identity intact
        assert_eq!(value["name"], "Mega Codeunit");
    }

    #[test]
    fn test_definition_full_mode_hard_cap() {
        let db = build_db(vec![big_codeunit(500)]);
        let obj = db.get_by_id(ObjectType::Codeunit, 50000).unwrap();
        let opts = DefinitionOptions {
            summary: false,
            ..Default::default()
        };
        let value = shape_definition(&db, obj, opts);
        assert_eq!(value["proceduresShown"], 20);
    }

    #[test]
    fn test_definition_explicit_limit_overrides_hard_cap() {
        let db = build_db(vec![big_codeunit(60)]);
        let obj = db.get_by_id(ObjectType::Codeunit, 50000).unwrap();
        let opts = DefinitionOptions {
            summary: false,
            max_procedures: Some(40),
            ..Default::default()
        };
        let value = shape_definition(&db, obj, opts);
        assert_eq!(value["proceduresShown"], 40);
    }

    #[test]
    fn test_definition_without_truncation_has_no_warning() {
        let db = build_db(vec![big_codeunit(5)]);
        let obj = db.get_by_id(ObjectType::Codeunit, 50000).unwrap();
        let value = shape_definition(&db, obj, DefinitionOptions::default());
        assert_eq!(value["proceduresShown"], 5);
        assert!(value.get("sizeWarning").is_none());
        assert!(value["tokenEstimate"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_search_attachment_caps() {
        let db = build_db(vec![big_codeunit(50)]);
        let obj = db.get_by_id(ObjectType::Codeunit, 50000).unwrap();
        let value = shape_object(
            &db,
            obj,
            ObjectShape {
                include_fields: false,
                include_procedures: true,
            },
        );
        assert_eq!(value["procedures"].as_array().unwrap().len(), ATTACH_CAP);
        assert_eq!(value["procedureCount"], 50);
    }

    #[test]
    fn test_type_string_rendering() {
        assert_eq!(
            type_string(&TypeDefinition {
                kind: "Code".into(),
                length: Some(20),
                subtype: None
            }),
            "Code[20]"
        );
        assert_eq!(
            type_string(&TypeDefinition {
                kind: "Record".into(),
                length: None,
                subtype: Some("Customer".into())
            }),
            "Record Customer"
        );
        assert_eq!(type_string(&TypeDefinition::default()), "Unknown");
    }

    #[test]
    fn test_estimate_tokens_tracks_size() {
        let small = json!({ "a": 1 });
        let large = json!({ "a": "x".repeat(40_000) });
        assert!(estimate_tokens(&small) < 10);
        assert!(estimate_tokens(&large) > 9_000);
    }
}
