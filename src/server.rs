//! MCP tool dispatcher
//!
//! Thin adapter between the tool protocol and the query/shaping layers.
//! Parameters are validated by typed deserialization against the schemas
//! generated from the structs below; engine errors become structured
//! `{code, message, details?}` payloads; the dispatcher itself holds no
//! state beyond handles to the database and package manager.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::ServerInfo;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::config::Config;
use crate::database::SymbolDatabase;
use crate::error::{EngineError, EngineResult};
use crate::packages::PackageManager;
use crate::query;
use crate::shape;

// ============================================================================
// Tool parameter types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchObjectsParams {
    /// Name pattern: substring, `prefix*`, `*contains*`, or wildcard with `*`
    pub pattern: String,
    /// Restrict to one object type (Table, Page, Codeunit, ...)
    #[serde(default)]
    pub object_type: Option<String>,
    /// Restrict to one package by exact name
    #[serde(default)]
    pub package: Option<String>,
    /// Attach a capped slice of fields to each table hit
    #[serde(default)]
    pub include_fields: bool,
    /// Attach a capped slice of procedures to each codeunit hit
    #[serde(default)]
    pub include_procedures: bool,
    /// Page size (default 20, max 100)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Items to skip (default 0)
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectDefinitionParams {
    /// Object name; alternative to objectId + objectType
    #[serde(default)]
    pub object_name: Option<String>,
    /// Object id; requires objectType
    #[serde(default)]
    pub object_id: Option<u32>,
    /// Object type, required with objectId, optional disambiguator with name
    #[serde(default)]
    pub object_type: Option<String>,
    /// Restrict resolution to one package
    #[serde(default)]
    pub package: Option<String>,
    /// Summary mode (default true): pruned properties, tighter caps
    #[serde(default)]
    pub summary: Option<bool>,
    #[serde(default)]
    pub include_fields: Option<bool>,
    #[serde(default)]
    pub include_procedures: Option<bool>,
    #[serde(default)]
    pub include_keys: Option<bool>,
    #[serde(default)]
    pub include_dependencies: Option<bool>,
    /// Explicit field cap; overrides the hard cap when larger
    #[serde(default)]
    pub max_fields: Option<usize>,
    /// Explicit procedure cap; overrides the hard cap when larger
    #[serde(default)]
    pub max_procedures: Option<usize>,
    #[serde(default)]
    pub max_dependencies: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindReferencesParams {
    /// Object name to find references to
    pub target_name: String,
    /// Edge kind filter: extends, source_table, table_relation, uses, implements
    #[serde(default)]
    pub reference_kind: Option<String>,
    /// Restrict edge sources to one object type
    #[serde(default)]
    pub source_type: Option<String>,
    /// Edge cap (default 100)
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadPackagesParams {
    /// Absolute directory containing .app package files
    pub packages_path: String,
    /// Reload packages even when their fingerprints are unchanged
    #[serde(default)]
    pub force_reload: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoDiscoverParams {
    /// Absolute project root to search for package caches
    pub root_path: String,
    /// Discovery depth below the root (default 2)
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Reload packages even when their fingerprints are unchanged
    #[serde(default)]
    pub force_reload: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchByDomainParams {
    /// Business domain: Sales, Purchasing, Finance, Inventory, Manufacturing, Service
    pub domain: String,
    /// Restrict to one object type
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetExtensionsParams {
    /// Base object name whose extensions to list
    pub base_object_name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChildSearchParams {
    /// Owning object name (table, codeunit, page, report, ...)
    pub object_name: String,
    /// Sub-pattern over child names, same wildcard semantics as search
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetObjectSummaryParams {
    /// Object name to summarize
    pub object_name: String,
    /// Optional type disambiguator
    #[serde(default)]
    pub object_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}

// ============================================================================
// Server
// ============================================================================

/// MCP server over one symbol database and its package manager
#[derive(Clone)]
pub struct SymbolServer {
    db: Arc<RwLock<SymbolDatabase>>,
    manager: Arc<PackageManager>,
    config: Arc<Config>,
    tool_router: rmcp::handler::server::router::tool::ToolRouter<Self>,
}

impl SymbolServer {
    pub fn new(config: Config) -> Self {
        let db = Arc::new(RwLock::new(SymbolDatabase::new()));
        let manager = Arc::new(PackageManager::new(Arc::clone(&db)));
        Self {
            db,
            manager,
            config: Arc::new(config),
            tool_router: Self::tool_router(),
        }
    }

    pub fn manager(&self) -> &PackageManager {
        &self.manager
    }

    fn read_db(&self) -> RwLockReadGuard<'_, SymbolDatabase> {
        self.db.read().expect("database lock poisoned")
    }

    /// Queries against an empty database get guidance, not empty results.
    fn guarded(&self) -> EngineResult<RwLockReadGuard<'_, SymbolDatabase>> {
        let db = self.read_db();
        if db.is_empty() {
            return Err(EngineError::EmptyDatabase);
        }
        Ok(db)
    }
}

/// Serialize a tool result, converting engine errors into the wire envelope.
fn respond(result: EngineResult<Value>) -> String {
    let value = match result {
        Ok(value) => value,
        Err(e) => e.to_response(),
    };
    match serde_json::to_string_pretty(&value) {
        Ok(s) => s,
        Err(e) => {
            EngineError::internal("respond-serialize", e.to_string())
                .to_response()
                .to_string()
        }
    }
}

/// Explicit caller limits may exceed the hard caps, but not the absolute
/// ceiling a response can be shaped into.
fn check_explicit_limits(limits: &[Option<usize>]) -> EngineResult<()> {
    for limit in limits.iter().flatten() {
        if *limit > shape::ABSOLUTE_LIMIT_CEILING {
            return Err(EngineError::ResourceLimit(format!(
                "explicit limit {limit} exceeds the absolute maximum of {}",
                shape::ABSOLUTE_LIMIT_CEILING
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl SymbolServer {
    #[tool(
        name = "search_objects",
        description = "Search loaded AL objects by name pattern (substring, prefix*, *contains*, or wildcard). Returns a paginated list; exact matches rank first. Optionally attaches field/procedure slices."
    )]
    async fn search_objects(&self, Parameters(p): Parameters<SearchObjectsParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let type_filter = query::parse_type_filter(p.object_type.as_deref())?;
            let hits = query::search_objects(&db, &p.pattern, type_filter, p.package.as_deref())?;
            let shape_opts = shape::ObjectShape {
                include_fields: p.include_fields,
                include_procedures: p.include_procedures,
            };
            let value = shape::page_envelope(
                "objects",
                hits,
                shape::Page::new(p.limit, p.offset),
                |obj| shape::shape_object(&db, obj, shape_opts),
            );
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "get_object_definition",
        description = "Fetch one object by name or (objectId, objectType): properties plus capped fields/procedures/keys/dependencies. Summary mode is on by default; pass summary=false or explicit max* limits for more."
    )]
    async fn get_object_definition(
        &self,
        Parameters(p): Parameters<GetObjectDefinitionParams>,
    ) -> String {
        respond((|| {
            check_explicit_limits(&[p.max_fields, p.max_procedures, p.max_dependencies])?;
            let db = self.guarded()?;
            let type_filter = query::parse_type_filter(p.object_type.as_deref())?;
            let obj = query::resolve_object(
                &db,
                p.object_name.as_deref(),
                p.object_id,
                type_filter,
                p.package.as_deref(),
            )?;
            let defaults = shape::DefinitionOptions::default();
            let opts = shape::DefinitionOptions {
                summary: p.summary.unwrap_or(defaults.summary),
                include_fields: p.include_fields.unwrap_or(defaults.include_fields),
                include_procedures: p.include_procedures.unwrap_or(defaults.include_procedures),
                include_keys: p.include_keys.unwrap_or(defaults.include_keys),
                include_dependencies: p
                    .include_dependencies
                    .unwrap_or(defaults.include_dependencies),
                max_fields: p.max_fields,
                max_procedures: p.max_procedures,
                max_dependencies: p.max_dependencies,
            };
            Ok(shape::shape_definition(&db, obj, opts))
        })())
    }

    #[tool(
        name = "find_references",
        description = "Find objects referencing a target: extension relationships, page source tables, field table relations, codeunit record usage, and interface implementations."
    )]
    async fn find_references(&self, Parameters(p): Parameters<FindReferencesParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let kind_filter = query::parse_kind_filter(p.reference_kind.as_deref())?;
            let source_filter = query::parse_type_filter(p.source_type.as_deref())?;
            let edges = query::find_references(&db, &p.target_name, kind_filter, source_filter);
            let value = shape::page_envelope(
                "references",
                edges,
                shape::Page::new(Some(p.limit.unwrap_or(shape::MAX_LIMIT)), None),
                shape::shape_edge,
            );
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "load_packages",
        description = "Load every .app package in an absolute directory. Unchanged packages are skipped unless forceReload is set. Returns a per-package load report."
    )]
    async fn load_packages(&self, Parameters(p): Parameters<LoadPackagesParams>) -> String {
        respond((|| {
            let report = self
                .manager
                .load_packages(Path::new(&p.packages_path), p.force_reload)?;
            Ok(shape::shape_load_report(&report))
        })())
    }

    #[tool(
        name = "auto_discover",
        description = "Discover .alpackages caches (and editor-configured cache paths) under an absolute project root, then load everything found. Rejects relative roots."
    )]
    async fn auto_discover(&self, Parameters(p): Parameters<AutoDiscoverParams>) -> String {
        respond((|| {
            let root = PathBuf::from(&p.root_path);
            let report = self.manager.auto_discover(
                &root,
                p.max_depth.unwrap_or(self.config.max_depth),
                self.config.cache_dir.as_deref(),
                p.force_reload,
            )?;
            Ok(shape::shape_load_report(&report))
        })())
    }

    #[tool(
        name = "list_packages",
        description = "List loaded packages with publisher, version, object counts, and load diagnostics."
    )]
    async fn list_packages(&self, Parameters(_): Parameters<NoParams>) -> String {
        respond((|| {
            let db = self.read_db();
            let packages: Vec<Value> = db
                .packages()
                .iter()
                .map(|info| shape::shape_package(info))
                .collect();
            Ok(json!({ "packages": packages, "count": packages.len() }))
        })())
    }

    #[tool(
        name = "get_stats",
        description = "Database statistics: object counts by type, package count, last index time, approximate memory use."
    )]
    async fn get_stats(&self, Parameters(_): Parameters<NoParams>) -> String {
        respond((|| {
            let db = self.read_db();
            Ok(shape::shape_stats(&db.stats()))
        })())
    }

    #[tool(
        name = "search_by_domain",
        description = "List objects belonging to a business domain (Sales, Purchasing, Finance, Inventory, Manufacturing, Service) by keyword classification over object names."
    )]
    async fn search_by_domain(&self, Parameters(p): Parameters<SearchByDomainParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let type_filter = query::parse_type_filter(p.object_type.as_deref())?;
            let hits = query::search_by_domain(&db, &p.domain, type_filter)?;
            let value = shape::page_envelope(
                "objects",
                hits,
                shape::Page::new(p.limit, p.offset),
                |obj| shape::shape_object(&db, obj, shape::ObjectShape::default()),
            );
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "get_extensions",
        description = "List extension objects (table/page/enum/report/permission set extensions) that extend the given base object."
    )]
    async fn get_extensions(&self, Parameters(p): Parameters<GetExtensionsParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let extensions = query::get_extensions(&db, &p.base_object_name);
            let shaped: Vec<Value> = extensions
                .iter()
                .map(|obj| shape::shape_object(&db, obj, shape::ObjectShape::default()))
                .collect();
            Ok(json!({
                "baseObject": p.base_object_name,
                "count": shaped.len(),
                "extensions": shaped,
            }))
        })())
    }

    #[tool(
        name = "search_procedures",
        description = "List procedures of a codeunit or interface, optionally filtered by a name sub-pattern. Paginated."
    )]
    async fn search_procedures(&self, Parameters(p): Parameters<ChildSearchParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let (owner, hits) =
                query::search_procedures(&db, &p.object_name, p.pattern.as_deref())?;
            let mut value = shape::page_envelope(
                "procedures",
                hits,
                shape::Page::new(p.limit, p.offset),
                |procedure| shape::shape_procedure(procedure),
            );
            value["object"] = owner_identity(&db, owner);
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "search_fields",
        description = "List fields of a table or table extension, optionally filtered by a name sub-pattern. Paginated."
    )]
    async fn search_fields(&self, Parameters(p): Parameters<ChildSearchParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let (owner, hits) = query::search_fields(&db, &p.object_name, p.pattern.as_deref())?;
            let mut value = shape::page_envelope(
                "fields",
                hits,
                shape::Page::new(p.limit, p.offset),
                |field| shape::shape_field(field),
            );
            value["object"] = owner_identity(&db, owner);
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "search_controls",
        description = "List controls of a page or page extension (flattened with tree paths), optionally filtered by a name sub-pattern. Paginated."
    )]
    async fn search_controls(&self, Parameters(p): Parameters<ChildSearchParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let (owner, hits) = query::search_controls(&db, &p.object_name, p.pattern.as_deref())?;
            let mut value = shape::page_envelope(
                "controls",
                hits,
                shape::Page::new(p.limit, p.offset),
                |hit| shape::shape_control(hit.control, &hit.path),
            );
            value["object"] = owner_identity(&db, owner);
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "search_data_items",
        description = "List dataset items of a report, query, or xmlport (flattened with tree paths), optionally filtered by a name sub-pattern. Paginated."
    )]
    async fn search_data_items(&self, Parameters(p): Parameters<ChildSearchParams>) -> String {
        respond((|| {
            let db = self.guarded()?;
            let (owner, hits) =
                query::search_data_items(&db, &p.object_name, p.pattern.as_deref())?;
            let mut value = shape::page_envelope(
                "dataItems",
                hits,
                shape::Page::new(p.limit, p.offset),
                |hit| {
                    let mut item = shape::shape_data_item(hit.item);
                    item["path"] = json!(hit.path);
                    item
                },
            );
            value["object"] = owner_identity(&db, owner);
            Ok(shape::finalize(value, false))
        })())
    }

    #[tool(
        name = "get_object_summary",
        description = "Summarize an object: procedures grouped into behavioral categories (entry points, validation, posting, ...) with exemplars, plus a one-line description."
    )]
    async fn get_object_summary(
        &self,
        Parameters(p): Parameters<GetObjectSummaryParams>,
    ) -> String {
        respond((|| {
            let db = self.guarded()?;
            let type_filter = query::parse_type_filter(p.object_type.as_deref())?;
            let summary = query::get_object_summary(&db, &p.object_name, type_filter)?;
            let categories: Vec<Value> = summary
                .categories
                .iter()
                .map(|c| {
                    json!({
                        "category": c.name,
                        "count": c.count,
                        "examples": c.examples,
                    })
                })
                .collect();
            let mut value = owner_identity(&db, summary.object);
            value["description"] = json!(summary.description);
            value["totalProcedureCount"] = json!(summary.total_procedures);
            value["categories"] = Value::Array(categories);
            Ok(value)
        })())
    }
}

fn owner_identity(db: &SymbolDatabase, obj: &crate::model::SymbolObject) -> Value {
    json!({
        "type": obj.object_type.to_string(),
        "id": obj.id,
        "name": db.resolve(obj.name),
        "packageName": db.resolve(obj.package),
    })
}

// ============================================================================
// Server handler
// ============================================================================

#[tool_handler(router = self.tool_router)]
impl ServerHandler for SymbolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: rmcp::model::ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                ..Default::default()
            },
            server_info: rmcp::model::Implementation {
                name: "al-symbols-mcp".to_string(),
                title: Some("AL Symbol Package Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Query compiled AL (Business Central) symbol packages.\n\n\
                 LOADING (run one of these first):\n\
                 - auto_discover(rootPath) - find and load .alpackages caches under an ABSOLUTE project root.\n\
                 - load_packages(packagesPath) - load every .app file in an ABSOLUTE directory.\n\n\
                 SEARCH:\n\
                 - search_objects(pattern) - name search; exact matches first, then prefix, then contains.\n\
                 - search_by_domain(domain) - Sales, Purchasing, Finance, Inventory, Manufacturing, Service.\n\n\
                 INSPECTION:\n\
                 - get_object_definition(objectName | objectId+objectType) - one object with capped collections.\n\
                 - get_object_summary(objectName) - procedures grouped by behavioral category.\n\
                 - search_fields / search_procedures / search_controls / search_data_items(objectName, pattern?).\n\n\
                 CROSS-REFERENCE:\n\
                 - find_references(targetName) - who points at this object and how.\n\
                 - get_extensions(baseObjectName) - extensions registered against a base object.\n\n\
                 DIAGNOSTICS:\n\
                 - list_packages() / get_stats().\n\n\
                 Responses are summary-shaped by default; pass summary=false or max* limits to expand."
                    .into(),
            ),
        }
    }
}
