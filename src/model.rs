//! Typed symbol model: object kinds, payloads, and properties

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use string_interner::DefaultSymbol;

/// Interned symbol type
pub type Symbol = DefaultSymbol;

/// Name of the synthetic property linking an extension to its base object.
pub const EXTENDS_PROPERTY: &str = "Extends";

/// Kind of AL object a symbol describes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ObjectType {
    Table,
    Page,
    Codeunit,
    Report,
    Enum,
    Interface,
    PermissionSet,
    XmlPort,
    Query,
    TableExtension,
    PageExtension,
    EnumExtensionType,
    ReportExtension,
    PermissionSetExtension,
}

impl ObjectType {
    pub const ALL: [ObjectType; 14] = [
        Self::Table,
        Self::Page,
        Self::Codeunit,
        Self::Report,
        Self::Enum,
        Self::Interface,
        Self::PermissionSet,
        Self::XmlPort,
        Self::Query,
        Self::TableExtension,
        Self::PageExtension,
        Self::EnumExtensionType,
        Self::ReportExtension,
        Self::PermissionSetExtension,
    ];

    /// True for kinds that modify a base object in another package.
    pub fn is_extension(self) -> bool {
        matches!(
            self,
            Self::TableExtension
                | Self::PageExtension
                | Self::EnumExtensionType
                | Self::ReportExtension
                | Self::PermissionSetExtension
        )
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = ();

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "page" => Ok(Self::Page),
            "codeunit" => Ok(Self::Codeunit),
            "report" => Ok(Self::Report),
            "enum" | "enumtype" => Ok(Self::Enum),
            "interface" => Ok(Self::Interface),
            "permissionset" => Ok(Self::PermissionSet),
            "xmlport" => Ok(Self::XmlPort),
            "query" => Ok(Self::Query),
            "tableextension" => Ok(Self::TableExtension),
            "pageextension" => Ok(Self::PageExtension),
            "enumextension" | "enumextensiontype" => Ok(Self::EnumExtensionType),
            "reportextension" => Ok(Self::ReportExtension),
            "permissionsetextension" => Ok(Self::PermissionSetExtension),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "Table"),
            Self::Page => write!(f, "Page"),
            Self::Codeunit => write!(f, "Codeunit"),
            Self::Report => write!(f, "Report"),
            Self::Enum => write!(f, "Enum"),
            Self::Interface => write!(f, "Interface"),
            Self::PermissionSet => write!(f, "PermissionSet"),
            Self::XmlPort => write!(f, "XmlPort"),
            Self::Query => write!(f, "Query"),
            Self::TableExtension => write!(f, "TableExtension"),
            Self::PageExtension => write!(f, "PageExtension"),
            Self::EnumExtensionType => write!(f, "EnumExtensionType"),
            Self::ReportExtension => write!(f, "ReportExtension"),
            Self::PermissionSetExtension => write!(f, "PermissionSetExtension"),
        }
    }
}

/// A name/value property as authored in the manifest, key interned.
/// Order within an object is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: Symbol,
    pub value: String,
}

/// Resolved data type of a field, variable, or parameter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDefinition {
    /// Type name, e.g. "Code", "Record", "Enum"
    pub kind: String,
    /// Declared length for text-like types
    pub length: Option<u32>,
    /// Referenced object for Record/Codeunit/Enum/Interface types
    pub subtype: Option<String>,
}

/// A table or table-extension field
#[derive(Debug, Clone)]
pub struct Field {
    pub id: u32,
    pub name: String,
    pub type_definition: TypeDefinition,
    /// Key/value properties in authoring order (not interned; field
    /// property sets are small and package-local)
    pub properties: Vec<(String, String)>,
}

/// A table key: named, ordered list of field names
#[derive(Debug, Clone)]
pub struct TableKey {
    pub name: String,
    pub field_names: SmallVec<[String; 4]>,
}

/// A page control; controls nest arbitrarily deep
#[derive(Debug, Clone)]
pub struct Control {
    pub name: String,
    /// Control kind, e.g. "Field", "Group", "Part"
    pub kind: String,
    /// Bound source field or expression, when present
    pub source: Option<String>,
    pub children: Vec<Control>,
}

/// A procedure parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub type_definition: TypeDefinition,
}

/// A procedure on a codeunit, interface, or other object
#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub parameters: SmallVec<[Parameter; 4]>,
    pub return_type: Option<TypeDefinition>,
    /// Declared visibility; empty means default (public)
    pub visibility: Option<String>,
}

/// A declared variable
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub type_definition: TypeDefinition,
}

/// A report/query/xmlport dataset column
#[derive(Debug, Clone)]
pub struct DataColumn {
    pub name: String,
    pub source: Option<String>,
}

/// A dataset item; items nest
#[derive(Debug, Clone)]
pub struct DataItem {
    pub name: String,
    pub source_table: Option<String>,
    pub columns: Vec<DataColumn>,
    pub data_items: Vec<DataItem>,
}

/// An enum value
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub ordinal: i64,
    pub name: String,
}

/// Type-specific payload, one closed variant per family of object kinds
#[derive(Debug, Clone, Default)]
pub enum ObjectPayload {
    /// Table, TableExtension
    Table {
        fields: Vec<Field>,
        keys: Vec<TableKey>,
    },
    /// Page, PageExtension
    Page { controls: Vec<Control> },
    /// Codeunit
    Codeunit {
        procedures: Vec<Procedure>,
        variables: Vec<Variable>,
        triggers: Vec<Procedure>,
    },
    /// Interface
    Interface { procedures: Vec<Procedure> },
    /// Report, Query, XmlPort, ReportExtension
    Dataset { data_items: Vec<DataItem> },
    /// Enum, EnumExtensionType
    Enum { values: Vec<EnumValue> },
    /// PermissionSet, PermissionSetExtension
    #[default]
    None,
}

impl ObjectPayload {
    pub fn fields(&self) -> Option<&[Field]> {
        match self {
            Self::Table { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn keys(&self) -> Option<&[TableKey]> {
        match self {
            Self::Table { keys, .. } => Some(keys),
            _ => None,
        }
    }

    pub fn controls(&self) -> Option<&[Control]> {
        match self {
            Self::Page { controls } => Some(controls),
            _ => None,
        }
    }

    pub fn procedures(&self) -> Option<&[Procedure]> {
        match self {
            Self::Codeunit { procedures, .. } | Self::Interface { procedures } => {
                Some(procedures)
            }
            _ => None,
        }
    }

    pub fn variables(&self) -> Option<&[Variable]> {
        match self {
            Self::Codeunit { variables, .. } => Some(variables),
            _ => None,
        }
    }

    pub fn data_items(&self) -> Option<&[DataItem]> {
        match self {
            Self::Dataset { data_items } => Some(data_items),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> Option<&[EnumValue]> {
        match self {
            Self::Enum { values } => Some(values),
            _ => None,
        }
    }
}

/// One decoded symbol, as emitted by the manifest decoder.
///
/// Strings are not yet interned; the database interns the header when the
/// record is inserted.
#[derive(Debug, Clone)]
pub struct SymbolRecord {
    pub object_type: ObjectType,
    pub id: u32,
    pub name: String,
    pub namespace: Option<String>,
    /// Key/value properties in authoring order. Extension records carry a
    /// synthetic `Extends` entry naming the base object.
    pub properties: Vec<(String, String)>,
    pub payload: ObjectPayload,
}

impl SymbolRecord {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Base object name for extension records.
    pub fn extends(&self) -> Option<&str> {
        self.property(EXTENDS_PROPERTY)
    }

    /// Rough heap footprint, used for the database's soft memory ceiling.
    pub fn approx_bytes(&self) -> usize {
        let mut bytes = std::mem::size_of::<Self>() + self.name.len();
        bytes += self.namespace.as_deref().map_or(0, str::len);
        for (k, v) in &self.properties {
            bytes += k.len() + v.len() + 16;
        }
        bytes += match &self.payload {
            ObjectPayload::Table { fields, keys } => {
                fields
                    .iter()
                    .map(|f| {
                        64 + f.name.len()
                            + f.properties
                                .iter()
                                .map(|(k, v)| k.len() + v.len() + 16)
                                .sum::<usize>()
                    })
                    .sum::<usize>()
                    + keys.len() * 48
            }
            ObjectPayload::Page { controls } => count_controls(controls) * 64,
            ObjectPayload::Codeunit {
                procedures,
                variables,
                triggers,
            } => (procedures.len() + triggers.len()) * 96 + variables.len() * 48,
            ObjectPayload::Interface { procedures } => procedures.len() * 96,
            ObjectPayload::Dataset { data_items } => count_data_items(data_items) * 96,
            ObjectPayload::Enum { values } => values.len() * 32,
            ObjectPayload::None => 0,
        };
        bytes
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
        .map(|i| 1 + i.columns.len() + count_data_items(&i.data_items))
        .sum()
}

/// A stored symbol: header interned, payload shared with the record form.
#[derive(Debug, Clone)]
pub struct SymbolObject {
    pub object_type: ObjectType,
    pub id: u32,
    pub name: Symbol,
    pub package: Symbol,
    pub namespace: Option<Symbol>,
    pub properties: Vec<Property>,
    pub payload: ObjectPayload,
}

/// Four-component package version, compared numerically component-wise.
///
/// Lenient parse: missing or non-numeric components count as zero, matching
/// how the toolchain treats versions like "26.0.30643.32100" or "1.2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(pub [u64; 4]);

impl Version {
    pub fn parse(s: &str) -> Self {
        let mut parts = [0u64; 4];
        for (i, part) in s.split('.').take(4).enumerate() {
            parts[i] = part.trim().parse().unwrap_or(0);
        }
        Self(parts)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A dependency declared by a package
#[derive(Debug, Clone)]
pub struct PackageDependency {
    pub name: String,
    pub publisher: String,
    pub min_version: Version,
}

/// Directed reference relationship between symbol objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Extends,
    SourceTable,
    TableRelation,
    Uses,
    Implements,
}

impl TryFrom<&str> for EdgeKind {
    type Error = ();

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "extends" => Ok(Self::Extends),
            "source_table" | "sourcetable" => Ok(Self::SourceTable),
            "table_relation" | "tablerelation" => Ok(Self::TableRelation),
            "uses" => Ok(Self::Uses),
            "implements" => Ok(Self::Implements),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extends => write!(f, "extends"),
            Self::SourceTable => write!(f, "source_table"),
            Self::TableRelation => write!(f, "table_relation"),
            Self::Uses => write!(f, "uses"),
            Self::Implements => write!(f, "implements"),
        }
    }
}

/// A derived reference edge with resolved names, ready for shaping
#[derive(Debug, Clone)]
pub struct ReferenceEdge {
    pub kind: EdgeKind,
    pub source_type: ObjectType,
    pub source_id: u32,
    pub source_name: String,
    pub source_package: String,
    pub target: String,
    /// Referencing member (field or procedure name), when the edge
    /// originates below object level
    pub detail: Option<String>,
}
