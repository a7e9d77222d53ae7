//! Tool-level queries composed from database primitives

use crate::database::{PatternMatcher, SymbolDatabase};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Control, DataItem, EdgeKind, Field, ObjectType, Procedure, ReferenceEdge, SymbolObject,
};

/// Fixed domain dictionary. Preserved as-is from the shipped behavior; new
/// domains are added here deliberately, not inferred.
pub const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("Sales", &["sales", "customer", "receivable", "shipment"]),
    ("Purchasing", &["purchase", "purch.", "vendor", "payable", "receipt"]),
    ("Finance", &["g/l", "gen. journal", "ledger", "vat", "bank", "finance"]),
    ("Inventory", &["item", "inventory", "warehouse", "stock", "bin"]),
    (
        "Manufacturing",
        &["production", "assembly", "bom", "routing", "capacity", "work center"],
    ),
    ("Service", &["service", "contract", "resource"]),
];

/// Ordered procedure-name classification rules; the first matching prefix
/// wins, unmatched names land in "Other".
const PROCEDURE_CATEGORIES: &[(&str, &[&str])] = &[
    ("Entry Points", &["run", "execute", "start", "init"]),
    ("Validation", &["validate", "check", "verify", "test"]),
    (
        "Posting & Mutation",
        &["post", "insert", "modify", "delete", "update", "create", "finalize", "apply"],
    ),
    (
        "Data Processing",
        &["process", "calc", "generate", "build", "transfer", "copy"],
    ),
    ("Event Handlers", &["on"]),
    (
        "Getters & Utilities",
        &["get", "set", "find", "lookup", "has", "is"],
    ),
    ("Error Handling", &["error", "throw", "show"]),
];

const SUMMARY_EXAMPLES: usize = 5;

/// Parse a user-supplied object type filter.
pub fn parse_type_filter(value: Option<&str>) -> EngineResult<Option<ObjectType>> {
    match value {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => ObjectType::try_from(s).map(Some).map_err(|_| {
            EngineError::InvalidArgument(format!(
                "unknown object type '{s}'; expected one of Table, Page, Codeunit, Report, Enum, Interface, PermissionSet, XmlPort, Query, or an extension kind"
            ))
        }),
    }
}

/// Parse a user-supplied reference kind filter.
pub fn parse_kind_filter(value: Option<&str>) -> EngineResult<Option<EdgeKind>> {
    match value {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => EdgeKind::try_from(s).map(Some).map_err(|_| {
            EngineError::InvalidArgument(format!(
                "unknown reference kind '{s}'; expected extends, source_table, table_relation, uses, or implements"
            ))
        }),
    }
}

/// Pattern search over the whole database.
pub fn search_objects<'a>(
    db: &'a SymbolDatabase,
    pattern: &str,
    type_filter: Option<ObjectType>,
    package_filter: Option<&str>,
) -> EngineResult<Vec<&'a SymbolObject>> {
    if pattern.is_empty() {
        return Err(EngineError::InvalidArgument(
            "pattern must not be empty; use '*' to match everything".to_string(),
        ));
    }
    Ok(db.search(pattern, type_filter, package_filter))
}

/// Resolve one object by (type, id) or by name, with the ambiguity rules of
/// the definition endpoint.
pub fn resolve_object<'a>(
    db: &'a SymbolDatabase,
    name: Option<&str>,
    id: Option<u32>,
    type_filter: Option<ObjectType>,
    package_filter: Option<&str>,
) -> EngineResult<&'a SymbolObject> {
    if let Some(id) = id {
        let Some(ty) = type_filter else {
            return Err(EngineError::InvalidArgument(
                "objectType is required when looking up by objectId".to_string(),
            ));
        };
        let obj = db
            .get_by_id(ty, id)
            .filter(|o| package_filter.is_none_or(|p| db.resolve(o.package) == p));
        return obj.ok_or_else(|| EngineError::NotFound(format!("{ty} {id} is not loaded")));
    }

    let Some(name) = name else {
        return Err(EngineError::InvalidArgument(
            "pass objectName, or objectId together with objectType".to_string(),
        ));
    };

    let mut matches: Vec<&SymbolObject> = db
        .get_by_name(name)
        .into_iter()
        .filter(|o| type_filter.is_none_or(|ty| o.object_type == ty))
        .filter(|o| package_filter.is_none_or(|p| db.resolve(o.package) == p))
        .collect();

    match matches.len() {
        0 => Err(EngineError::NotFound(format!(
            "no loaded object named '{name}'"
        ))),
        1 => Ok(matches.remove(0)),
        _ => Err(EngineError::Ambiguous {
            name: name.to_string(),
            candidates: matches
                .iter()
                .map(|o| {
                    format!(
                        "{} {} (package {})",
                        o.object_type,
                        db.resolve(o.name),
                        db.resolve(o.package)
                    )
                })
                .collect(),
        }),
    }
}

/// Reference edges pointing at a target object name.
pub fn find_references(
    db: &SymbolDatabase,
    target: &str,
    kind_filter: Option<EdgeKind>,
    source_type_filter: Option<ObjectType>,
) -> Vec<ReferenceEdge> {
    db.find_references(target, kind_filter, source_type_filter)
}

/// Extension objects registered against a base object name.
pub fn get_extensions<'a>(db: &'a SymbolDatabase, base: &str) -> Vec<&'a SymbolObject> {
    db.get_extensions(base)
}

/// Objects whose names contain any keyword of the given domain.
pub fn search_by_domain<'a>(
    db: &'a SymbolDatabase,
    domain: &str,
    type_filter: Option<ObjectType>,
) -> EngineResult<Vec<&'a SymbolObject>> {
    let keywords = DOMAIN_KEYWORDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(domain))
        .map(|(_, keywords)| *keywords)
        .ok_or_else(|| {
            let known: Vec<&str> = DOMAIN_KEYWORDS.iter().map(|(name, _)| *name).collect();
            EngineError::InvalidArgument(format!(
                "unknown domain '{domain}'; expected one of {}",
                known.join(", ")
            ))
        })?;

    let all = db.search("*", type_filter, None);
    Ok(all
        .into_iter()
        .filter(|o| {
            let name_lc = db.resolve(o.name).to_lowercase();
            keywords.iter().any(|kw| name_lc.contains(kw))
        })
        .collect())
}

/// Fields of a table (or table extension), filtered by sub-pattern.
/// Returns the owning object so callers can identify it even on zero hits.
pub fn search_fields<'a>(
    db: &'a SymbolDatabase,
    object_name: &str,
    pattern: Option<&str>,
) -> EngineResult<(&'a SymbolObject, Vec<&'a Field>)> {
    let owner = resolve_child_owner(db, db.field_owners(object_name), object_name, "table")?;
    let fields = owner.payload.fields().unwrap_or(&[]);
    let matcher = pattern.map(PatternMatcher::new);
    let hits = fields
        .iter()
        .filter(|f| matches(&matcher, &f.name))
        .collect();
    Ok((owner, hits))
}

/// Procedures of a codeunit or interface, filtered by sub-pattern.
pub fn search_procedures<'a>(
    db: &'a SymbolDatabase,
    object_name: &str,
    pattern: Option<&str>,
) -> EngineResult<(&'a SymbolObject, Vec<&'a Procedure>)> {
    let owner = resolve_child_owner(
        db,
        db.procedure_owners(object_name),
        object_name,
        "codeunit or interface",
    )?;
    let procedures = owner.payload.procedures().unwrap_or(&[]);
    let matcher = pattern.map(PatternMatcher::new);
    let hits = procedures
        .iter()
        .filter(|p| matches(&matcher, &p.name))
        .collect();
    Ok((owner, hits))
}

/// A matched control with its slash-joined position in the tree.
pub struct ControlHit<'a> {
    pub control: &'a Control,
    pub path: String,
}

/// Controls of a page (or page extension), filtered by sub-pattern over the
/// flattened control tree.
pub fn search_controls<'a>(
    db: &'a SymbolDatabase,
    object_name: &str,
    pattern: Option<&str>,
) -> EngineResult<(&'a SymbolObject, Vec<ControlHit<'a>>)> {
    let owner = resolve_child_owner(db, db.control_owners(object_name), object_name, "page")?;
    let matcher = pattern.map(PatternMatcher::new);
    let mut hits = Vec::new();
    if let Some(controls) = owner.payload.controls() {
        flatten_controls(controls, "", &matcher, &mut hits);
    }
    Ok((owner, hits))
}

fn flatten_controls<'a>(
    controls: &'a [Control],
    prefix: &str,
    matcher: &Option<PatternMatcher>,
    hits: &mut Vec<ControlHit<'a>>,
) {
    for control in controls {
        let path = if prefix.is_empty() {
            control.name.clone()
        } else {
            format!("{prefix}/{}", control.name)
        };
        if matches(matcher, &control.name) {
            hits.push(ControlHit {
                control,
                path: path.clone(),
            });
        }
        flatten_controls(&control.children, &path, matcher, hits);
    }
}

/// A matched dataset item with its slash-joined position.
pub struct DataItemHit<'a> {
    pub item: &'a DataItem,
    pub path: String,
}

/// Dataset items of a report, query, or xmlport, filtered by sub-pattern.
pub fn search_data_items<'a>(
    db: &'a SymbolDatabase,
    object_name: &str,
    pattern: Option<&str>,
) -> EngineResult<(&'a SymbolObject, Vec<DataItemHit<'a>>)> {
    let owner = resolve_child_owner(
        db,
        db.data_item_owners(object_name),
        object_name,
        "report, query, or xmlport",
    )?;
    let matcher = pattern.map(PatternMatcher::new);
    let mut hits = Vec::new();
    if let Some(items) = owner.payload.data_items() {
        flatten_data_items(items, "", &matcher, &mut hits);
    }
    Ok((owner, hits))
}

fn flatten_data_items<'a>(
    items: &'a [DataItem],
    prefix: &str,
    matcher: &Option<PatternMatcher>,
    hits: &mut Vec<DataItemHit<'a>>,
) {
    for item in items {
        let path = if prefix.is_empty() {
            item.name.clone()
        } else {
            format!("{prefix}/{}", item.name)
        };
        if matches(matcher, &item.name) {
            hits.push(DataItemHit {
                item,
                path: path.clone(),
            });
        }
        flatten_data_items(&item.data_items, &path, matcher, hits);
    }
}

fn matches(matcher: &Option<PatternMatcher>, name: &str) -> bool {
    match matcher {
        None => true,
        Some(m) => m.tier(&name.to_lowercase()).is_some(),
    }
}

fn resolve_child_owner<'a>(
    db: &'a SymbolDatabase,
    owners: Vec<&'a SymbolObject>,
    object_name: &str,
    expected: &str,
) -> EngineResult<&'a SymbolObject> {
    let mut owners = owners;
    match owners.len() {
        0 => {
            if db.get_by_name(object_name).is_empty() {
                Err(EngineError::NotFound(format!(
                    "no loaded object named '{object_name}'"
                )))
            } else {
                Err(EngineError::NotFound(format!(
                    "'{object_name}' is loaded but is not a {expected}"
                )))
            }
        }
        1 => Ok(owners.remove(0)),
        _ => Err(EngineError::Ambiguous {
            name: object_name.to_string(),
            candidates: owners
                .iter()
                .map(|o| {
                    format!(
                        "{} {} (package {})",
                        o.object_type,
                        db.resolve(o.name),
                        db.resolve(o.package)
                    )
                })
                .collect(),
        }),
    }
}

/// One category bucket in an object summary
pub struct CategorySummary {
    pub name: &'static str,
    pub count: usize,
    pub examples: Vec<String>,
}

/// Procedure-shape summary of one object
pub struct ObjectSummary<'a> {
    pub object: &'a SymbolObject,
    pub total_procedures: usize,
    pub categories: Vec<CategorySummary>,
    pub description: String,
}

/// Categorize an object's procedures by name-prefix rules and produce a
/// short description.
pub fn get_object_summary<'a>(
    db: &'a SymbolDatabase,
    name: &str,
    type_filter: Option<ObjectType>,
) -> EngineResult<ObjectSummary<'a>> {
    let object = resolve_object(db, Some(name), None, type_filter, None)?;

    let procedures = object.payload.procedures().unwrap_or(&[]);
    let mut categories: Vec<CategorySummary> = PROCEDURE_CATEGORIES
        .iter()
        .map(|(name, _)| CategorySummary {
            name,
            count: 0,
            examples: Vec::new(),
        })
        .chain(std::iter::once(CategorySummary {
            name: "Other",
            count: 0,
            examples: Vec::new(),
        }))
        .collect();

    for procedure in procedures {
        let slot = categorize(&procedure.name);
        let bucket = &mut categories[slot];
        bucket.count += 1;
        if bucket.examples.len() < SUMMARY_EXAMPLES {
            bucket.examples.push(procedure.name.clone());
        }
    }
    categories.retain(|c| c.count > 0);

    let description = describe(db, object, procedures.len());

    Ok(ObjectSummary {
        object,
        total_procedures: procedures.len(),
        categories,
        description,
    })
}

/// Index of the first matching category rule, or the trailing "Other".
fn categorize(procedure_name: &str) -> usize {
    let name_lc = procedure_name.to_lowercase();
    for (i, (_, prefixes)) in PROCEDURE_CATEGORIES.iter().enumerate() {
        if prefixes.iter().any(|p| name_lc.starts_with(p)) {
            return i;
        }
    }
    PROCEDURE_CATEGORIES.len()
}

fn describe(db: &SymbolDatabase, object: &SymbolObject, procedure_count: usize) -> String {
    let name = db.resolve(object.name);
    let package = db.resolve(object.package);
    let caption = db
        .property_value(object, "Caption")
        .map(|c| format!(" (\"{c}\")"))
        .unwrap_or_default();
    let shape = match &object.payload {
        crate::model::ObjectPayload::Table { fields, keys } => {
            format!("{} fields and {} keys", fields.len(), keys.len())
        }
        crate::model::ObjectPayload::Page { controls } => {
            format!("{} top-level controls", controls.len())
        }
        crate::model::ObjectPayload::Codeunit { variables, .. } => format!(
            "{} procedures and {} variables",
            procedure_count,
            variables.len()
        ),
        crate::model::ObjectPayload::Interface { .. } => {
            format!("{procedure_count} procedures")
        }
        crate::model::ObjectPayload::Dataset { data_items } => {
            format!("{} dataset items", data_items.len())
        }
        crate::model::ObjectPayload::Enum { values } => format!("{} values", values.len()),
        crate::model::ObjectPayload::None => "permission entries only".to_string(),
    };
    format!(
        "{} {} {}{} from package {} with {}",
        object.object_type, object.id, name, caption, package, shape
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::PackageInfo;
    use crate::model::{ObjectPayload, Parameter, SymbolRecord, TypeDefinition};
    use smallvec::smallvec;

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

    fn table(id: u32, name: &str, field_names: &[&str]) -> SymbolRecord {
        let mut rec = record(ObjectType::Table, id, name);
        rec.payload = ObjectPayload::Table {
            fields: field_names
                .iter()
                .enumerate()
                .map(|(i, n)| Field {
                    id: (i + 1) as u32,
                    name: n.to_string(),
                    type_definition: TypeDefinition::default(),
                    properties: Vec::new(),
                })
                .collect(),
            keys: Vec::new(),
        };
        rec
    }

    fn codeunit(id: u32, name: &str, procedure_names: &[&str]) -> SymbolRecord {
        let mut rec = record(ObjectType::Codeunit, id, name);
        rec.payload = ObjectPayload::Codeunit {
            procedures: procedure_names
                .iter()
                .map(|n| Procedure {
                    name: n.to_string(),
                    parameters: smallvec![Parameter {
                        name: "Rec".to_string(),
                        type_definition: TypeDefinition::default(),
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

    fn load(db: &mut SymbolDatabase, package: &str, records: Vec<SymbolRecord>) {
        db.replace_package(PackageInfo::new(package, "Test", "1.0.0.0"), records);
    }

    #[test]
    fn test_resolve_object_by_id_requires_type() {
        let mut db = SymbolDatabase::new();
        load(&mut db, "Base", vec![record(ObjectType::Table, 18, "Customer")]);
        let err = resolve_object(&db, None, Some(18), None, None).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        let obj = resolve_object(&db, None, Some(18), Some(ObjectType::Table), None).unwrap();
        assert_eq!(db.resolve(obj.name), "Customer");
    }

    #[test]
    fn test_resolve_object_not_found_and_ambiguous() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 18, "Customer"),
                record(ObjectType::Page, 21, "Customer"),
            ],
        );
        assert_eq!(
            resolve_object(&db, Some("Vendor"), None, None, None)
                .unwrap_err()
                .code(),
            "NotFound"
        );
        let err = resolve_object(&db, Some("Customer"), None, None, None).unwrap_err();
        assert_eq!(err.code(), "Ambiguous");
        // a type filter disambiguates
        let obj =
            resolve_object(&db, Some("Customer"), None, Some(ObjectType::Page), None).unwrap();
        assert_eq!(obj.object_type, ObjectType::Page);
    }

    #[test]
    fn test_search_objects_rejects_empty_pattern() {
        let db = SymbolDatabase::new();
        assert_eq!(
            search_objects(&db, "", None, None).unwrap_err().code(),
            "InvalidArgument"
        );
    }

    #[test]
    fn test_parse_type_filter() {
        assert_eq!(parse_type_filter(None).unwrap(), None);
        assert_eq!(
            parse_type_filter(Some("table")).unwrap(),
            Some(ObjectType::Table)
        );
        assert_eq!(
            parse_type_filter(Some("gizmo")).unwrap_err().code(),
            "InvalidArgument"
        );
    }

    #[test]
    fn test_search_by_domain_sales() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![
                record(ObjectType::Table, 18, "Customer"),
                record(ObjectType::Table, 36, "Sales Header"),
                record(ObjectType::Table, 14, "Location"),
                record(ObjectType::Page, 42, "Sales Order"),
            ],
        );
        let hits = search_by_domain(&db, "sales", None).unwrap();
        let names: Vec<_> = hits.iter().map(|o| db.resolve(o.name)).collect();
        assert!(names.contains(&"Customer"));
        assert!(names.contains(&"Sales Header"));
        assert!(names.contains(&"Sales Order"));
        assert!(!names.contains(&"Location"));

        let tables_only = search_by_domain(&db, "Sales", Some(ObjectType::Table)).unwrap();
        assert!(tables_only.iter().all(|o| o.object_type == ObjectType::Table));
    }

    #[test]
    fn test_search_by_domain_unknown() {
        let db = SymbolDatabase::new();
        let err = search_by_domain(&db, "astrology", None).unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");
        assert!(err.to_string().contains("Sales"));
    }

    #[test]
    fn test_search_fields_with_pattern() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![table(
                18,
                "Customer",
                &["No.", "Name", "Name 2", "Credit Limit (LCY)"],
            )],
        );
        let (owner, all) = search_fields(&db, "Customer", None).unwrap();
        assert_eq!(db.resolve(owner.name), "Customer");
        assert_eq!(all.len(), 4);
        let (_, named) = search_fields(&db, "Customer", Some("Name")).unwrap();
        assert_eq!(named.len(), 2);
        let err = search_fields(&db, "Nope", None).unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }

    #[test]
    fn test_search_fields_on_non_table() {
        let mut db = SymbolDatabase::new();
        load(&mut db, "Base", vec![record(ObjectType::Page, 21, "Customer Card")]);
        let err = search_fields(&db, "Customer Card", None).unwrap_err();
        assert_eq!(err.code(), "NotFound");
        assert!(err.to_string().contains("not a table"));
    }

    #[test]
    fn test_search_procedures_with_pattern() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![codeunit(80, "Sales-Post", &["Run", "CheckLines", "PostLines"])],
        );
        let (_, all) = search_procedures(&db, "Sales-Post", None).unwrap();
        assert_eq!(all.len(), 3);
        let (_, posts) = search_procedures(&db, "Sales-Post", Some("post*")).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].name, "PostLines");
    }

    #[test]
    fn test_search_controls_flattens_tree() {
        let mut db = SymbolDatabase::new();
        let mut page = record(ObjectType::Page, 21, "Customer Card");
        page.payload = ObjectPayload::Page {
            controls: vec![Control {
                name: "General".to_string(),
                kind: "Group".to_string(),
                source: None,
                children: vec![Control {
                    name: "Name".to_string(),
                    kind: "Field".to_string(),
                    source: Some("Name".to_string()),
                    children: Vec::new(),
                }],
            }],
        };
        load(&mut db, "Base", vec![page]);

        let (_, all) = search_controls(&db, "Customer Card", None).unwrap();
        assert_eq!(all.len(), 2);
        let (_, named) = search_controls(&db, "Customer Card", Some("name")).unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].path, "General/Name");
    }

    #[test]
    fn test_search_data_items_nested() {
        let mut db = SymbolDatabase::new();
        let mut report = record(ObjectType::Report, 206, "Sales - Invoice");
        report.payload = ObjectPayload::Dataset {
            data_items: vec![DataItem {
                name: "Header".to_string(),
                source_table: Some("Sales Invoice Header".to_string()),
                columns: Vec::new(),
                data_items: vec![DataItem {
                    name: "Line".to_string(),
                    source_table: Some("Sales Invoice Line".to_string()),
                    columns: Vec::new(),
                    data_items: Vec::new(),
                }],
            }],
        };
        load(&mut db, "Base", vec![report]);

        let (_, all) = search_data_items(&db, "Sales - Invoice", None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].path, "Header/Line");
    }

    #[test]
    fn test_object_summary_categorizes_procedures() {
        let mut db = SymbolDatabase::new();
        load(
            &mut db,
            "Base",
            vec![codeunit(
                80,
                "Sales-Post",
                &[
                    "Run",
                    "CheckAndUpdate",
                    "PostInvoice",
                    "InsertLine",
                    "OnAfterPost",
                    "GetNextNo",
                    "CalcTotals",
                    "SomethingUnusual",
                ],
            )],
        );
        let summary = get_object_summary(&db, "Sales-Post", None).unwrap();
        assert_eq!(summary.total_procedures, 8);

        let by_name: std::collections::HashMap<&str, &CategorySummary> = summary
            .categories
            .iter()
            .map(|c| (c.name, c))
            .collect();
        assert_eq!(by_name["Entry Points"].count, 1);
        assert_eq!(by_name["Validation"].count, 1);
        assert_eq!(by_name["Posting & Mutation"].count, 2);
        assert_eq!(by_name["Event Handlers"].count, 1);
        assert_eq!(by_name["Getters & Utilities"].count, 1);
        assert_eq!(by_name["Data Processing"].count, 1);
        assert_eq!(by_name["Other"].count, 1);
        assert!(by_name["Posting & Mutation"]
            .examples
            .contains(&"PostInvoice".to_string()));
        assert!(summary.description.contains("Sales-Post"));
    }

    #[test]
    fn test_object_summary_examples_capped_at_five() {
        let mut db = SymbolDatabase::new();
        let names: Vec<String> = (0..8).map(|i| format!("GetValue{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        load(&mut db, "Base", vec![codeunit(80, "Utility", &name_refs)]);
        let summary = get_object_summary(&db, "Utility", None).unwrap();
        let getters = summary
            .categories
            .iter()
            .find(|c| c.name == "Getters & Utilities")
            .unwrap();
        assert_eq!(getters.count, 8);
        assert_eq!(getters.examples.len(), 5);
    }
}
