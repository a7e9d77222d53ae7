//! Reader for compiled AL .app package files
//!
//! .app files carry a vendor NAVX header followed by a ZIP container with:
//! - NavxManifest.xml: package metadata (ID, name, publisher, version, deps)
//! - SymbolReference.json: all symbol definitions (tables, codeunits, etc.)

use crate::error::{EngineError, EngineResult, MANIFEST_ENTRY};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// ZIP local-file-header signature; everything before its first occurrence
/// is the vendor header.
const ZIP_ENTRY_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// How far into the file the archive signature may legally appear.
const MAX_HEADER_SCAN: usize = 4096;

/// Package metadata entry name.
const NAVX_MANIFEST_ENTRY: &str = "NavxManifest.xml";

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// A dependency declared in NavxManifest.xml
#[derive(Debug, Clone)]
pub struct DependencyDecl {
    pub name: String,
    pub publisher: String,
    pub min_version: String,
}

/// Package metadata from NavxManifest.xml
#[derive(Debug, Clone)]
pub struct AppMetadata {
    pub id: String,
    pub name: String,
    pub publisher: String,
    pub version: String,
    pub dependencies: Vec<DependencyDecl>,
}

/// An opened .app package, positioned to serve the symbol manifest
#[derive(Debug)]
pub struct SymbolArchive {
    path: PathBuf,
    header_len: u64,
    metadata: AppMetadata,
    archive: ZipArchive<BufReader<File>>,
}

impl SymbolArchive {
    /// Open a package file: locate the archive behind the vendor header and
    /// read the package metadata.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let mut file = File::open(path).map_err(|e| EngineError::io(path, e))?;
        let header_len = find_archive_start(&mut file, path)?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| EngineError::io(path, e))?;

        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| EngineError::InvalidArchive {
                path: path.to_path_buf(),
                reason: format!("not a readable package archive: {e}"),
            })?;

        let metadata = match read_navx_manifest(&mut archive) {
            Some(meta) => meta,
            // Older packages can lack the metadata entry; the file naming
            // convention (Publisher_Name_Version.app) still identifies them.
            None => metadata_from_filename(path),
        };

        Ok(Self {
            path: path.to_path_buf(),
            header_len,
            metadata,
            archive,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of vendor header preceding the archive.
    pub fn header_len(&self) -> u64 {
        self.header_len
    }

    pub fn metadata(&self) -> &AppMetadata {
        &self.metadata
    }

    /// Decompressed byte stream over the symbol manifest entry.
    ///
    /// Single-pass and non-seekable; a UTF-8 BOM is consumed here so the
    /// decoder always sees the JSON document from its first byte.
    pub fn manifest_stream(&mut self) -> EngineResult<impl Read + '_> {
        let path = self.path.clone();
        let entry = match self.archive.by_name(MANIFEST_ENTRY) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(EngineError::ManifestMissing { path });
            }
            Err(e) => {
                return Err(EngineError::InvalidArchive {
                    path,
                    reason: e.to_string(),
                });
            }
        };
        skip_bom(entry).map_err(|e| EngineError::io(&self.path, e))
    }
}

/// Scan the file prefix for the archive signature; the offset of the first
/// match is the vendor header length.
fn find_archive_start(file: &mut File, path: &Path) -> EngineResult<u64> {
    let mut prefix = vec![0u8; MAX_HEADER_SCAN];
    let mut read = 0;
    while read < prefix.len() {
        match file.read(&mut prefix[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::io(path, e)),
        }
    }
    prefix.truncate(read);

    prefix
        .windows(ZIP_ENTRY_SIGNATURE.len())
        .position(|w| w == ZIP_ENTRY_SIGNATURE)
        .map(|pos| pos as u64)
        .ok_or_else(|| EngineError::InvalidArchive {
            path: path.to_path_buf(),
            reason: format!(
                "no archive signature within the first {} bytes",
                MAX_HEADER_SCAN
            ),
        })
}

/// Consume a UTF-8 BOM if present, handing back any non-BOM bytes read.
fn skip_bom<R: Read>(mut reader: R) -> io::Result<io::Chain<Cursor<Vec<u8>>, R>> {
    let mut start = [0u8; 3];
    let mut read = 0;
    while read < start.len() {
        match reader.read(&mut start[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    let replay = if start[..read] == UTF8_BOM {
        Vec::new()
    } else {
        start[..read].to_vec()
    };
    Ok(Cursor::new(replay).chain(reader))
}

/// Parse NavxManifest.xml for package identity and declared dependencies.
fn read_navx_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Option<AppMetadata> {
    let mut entry = archive.by_name(NAVX_MANIFEST_ENTRY).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;

    let doc = roxmltree::Document::parse(&content).ok()?;
    let app_node = doc.descendants().find(|n| n.has_tag_name("App"))?;

    let dependencies = doc
        .descendants()
        .filter(|n| n.has_tag_name("Dependency"))
        .map(|n| DependencyDecl {
            name: n.attribute("Name").unwrap_or_default().to_string(),
            publisher: n.attribute("Publisher").unwrap_or_default().to_string(),
            min_version: n.attribute("MinVersion").unwrap_or_default().to_string(),
        })
        .collect();

    Some(AppMetadata {
        id: app_node.attribute("Id").unwrap_or_default().to_string(),
        name: app_node.attribute("Name").unwrap_or_default().to_string(),
        publisher: app_node
            .attribute("Publisher")
            .unwrap_or_default()
            .to_string(),
        version: app_node.attribute("Version").unwrap_or_default().to_string(),
        dependencies,
    })
}

/// Best-effort metadata from the Publisher_Name_Version.app convention.
fn metadata_from_filename(path: &Path) -> AppMetadata {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut parts = stem.splitn(3, '_');
    let publisher = parts.next().unwrap_or_default().to_string();
    let name = parts.next().unwrap_or(stem).to_string();
    let version = parts.next().unwrap_or_default().to_string();
    AppMetadata {
        id: String::new(),
        name,
        publisher,
        version,
        dependencies: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{write_app_file, AppFixture};
    use tempfile::TempDir;

    #[test]
    fn test_open_reads_metadata_and_header() {
        let dir = TempDir::new().unwrap();
        let fixture = AppFixture::new("Base App", "Contoso", "1.0.0.0")
            .manifest_json(r#"{"Tables":[]}"#);
        let path = write_app_file(dir.path(), "Contoso_Base App_1.0.0.0.app", &fixture);

        let archive = SymbolArchive::open(&path).unwrap();
        assert_eq!(archive.metadata().name, "Base App");
        assert_eq!(archive.metadata().publisher, "Contoso");
        assert_eq!(archive.metadata().version, "1.0.0.0");
        assert_eq!(archive.header_len(), 40);
    }

    #[test]
    fn test_manifest_stream_skips_bom() {
        let dir = TempDir::new().unwrap();
        let mut json = Vec::new();
        json.extend_from_slice(&UTF8_BOM);
        json.extend_from_slice(br#"{"Tables":[]}"#);
        let fixture = AppFixture::new("A", "P", "1.0.0.0").manifest_bytes(json);
        let path = write_app_file(dir.path(), "P_A_1.0.0.0.app", &fixture);

        let mut archive = SymbolArchive::open(&path).unwrap();
        let mut content = String::new();
        archive
            .manifest_stream()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert!(content.starts_with('{'));
    }

    #[test]
    fn test_open_rejects_non_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.app");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let err = SymbolArchive::open(&path).unwrap_err();
        assert_eq!(err.code(), "InvalidArchive");
    }

    #[test]
    fn test_missing_manifest_entry() {
        let dir = TempDir::new().unwrap();
        let fixture = AppFixture::new("A", "P", "1.0.0.0").without_symbols();
        let path = write_app_file(dir.path(), "P_A_1.0.0.0.app", &fixture);

        let mut archive = SymbolArchive::open(&path).unwrap();
        let err = match archive.manifest_stream() {
            Ok(_) => panic!("expected manifest_stream to fail"),
            Err(e) => e,
        };
        assert_eq!(err.code(), "ManifestMissing");
    }

    #[test]
    fn test_metadata_falls_back_to_filename() {
        let dir = TempDir::new().unwrap();
        let fixture = AppFixture::new("X", "Y", "2.0.0.0")
            .without_navx_manifest()
            .manifest_json(r#"{"Tables":[]}"#);
        let path = write_app_file(dir.path(), "Fabrikam_Sales Tools_2.1.0.0.app", &fixture);

        let archive = SymbolArchive::open(&path).unwrap();
        assert_eq!(archive.metadata().publisher, "Fabrikam");
        assert_eq!(archive.metadata().name, "Sales Tools");
        assert_eq!(archive.metadata().version, "2.1.0.0");
    }

    #[test]
    fn test_dependencies_parsed_from_navx_manifest() {
        let dir = TempDir::new().unwrap();
        let fixture = AppFixture::new("Ext", "Contoso", "1.0.0.0")
            .dependency("Base App", "Contoso", "1.0.0.0")
            .manifest_json(r#"{"Tables":[]}"#);
        let path = write_app_file(dir.path(), "Contoso_Ext_1.0.0.0.app", &fixture);

        let archive = SymbolArchive::open(&path).unwrap();
        let deps = &archive.metadata().dependencies;
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "Base App");
        assert_eq!(deps[0].min_version, "1.0.0.0");
    }
}
