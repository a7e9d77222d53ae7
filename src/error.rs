//! Engine error taxonomy with stable wire codes

use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Name of the manifest entry inside a package archive.
///
/// Shared with the archive reader; kept here so error messages and the
/// reader never drift apart.
pub const MANIFEST_ENTRY: &str = "SymbolReference.json";

/// Errors produced by the symbol engine.
///
/// Every variant carries a stable `code` that tool callers can branch on.
/// The dispatcher serializes failures as `{code, message, details?}`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("'{name}' matches {} objects; pass objectType or package to disambiguate", candidates.len())]
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },

    #[error("{}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("{}: no {MANIFEST_ENTRY} entry in package archive", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("{}: malformed manifest at byte {offset}: {reason}", path.display())]
    Decode {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    #[error("no packages loaded; call load_packages with a package directory, or auto_discover with an absolute project root")]
    EmptyDatabase,

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    ResourceLimit(String),

    #[error("internal invariant violated [{ident}]: {message}")]
    Internal {
        ident: &'static str,
        message: String,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn internal(ident: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            ident,
            message: message.into(),
        }
    }

    /// Stable identifier for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NotFound(_) => "NotFound",
            Self::Ambiguous { .. } => "Ambiguous",
            Self::InvalidArchive { .. } => "InvalidArchive",
            Self::ManifestMissing { .. } => "ManifestMissing",
            Self::Decode { .. } => "DecodeError",
            Self::EmptyDatabase => "EmptyDatabase",
            Self::Io { .. } => "IoError",
            Self::ResourceLimit(_) => "ResourceLimit",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Structured payload for variants that carry more than a message.
    fn details(&self) -> Option<Value> {
        match self {
            Self::Ambiguous { candidates, .. } => Some(json!({ "candidates": candidates })),
            Self::Decode { offset, .. } => Some(json!({ "byteOffset": offset })),
            Self::EmptyDatabase => Some(json!({
                "loadTools": ["load_packages", "auto_discover"],
            })),
            _ => None,
        }
    }

    /// Serialize as the wire error envelope.
    pub fn to_response(&self) -> Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(details) = self.details() {
            error["details"] = details;
        }
        json!({ "error": error })
    }
}
