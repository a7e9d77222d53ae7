//! Shared test fixtures: synthetic .app packages and manifest JSON

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builder for a synthetic .app file: vendor header + ZIP with
/// NavxManifest.xml and SymbolReference.json entries.
pub struct AppFixture {
    pub name: String,
    pub publisher: String,
    pub version: String,
    pub dependencies: Vec<(String, String, String)>,
    pub manifest: Option<Vec<u8>>,
    pub include_navx: bool,
    pub header: Vec<u8>,
}

impl AppFixture {
    pub fn new(name: &str, publisher: &str, version: &str) -> Self {
        // 40 opaque bytes, the size the real toolchain emits
        let mut header = b"NAVX".to_vec();
        header.resize(40, 0);
        Self {
            name: name.to_string(),
            publisher: publisher.to_string(),
            version: version.to_string(),
            dependencies: Vec::new(),
            manifest: Some(b"{}".to_vec()),
            include_navx: true,
            header,
        }
    }

    pub fn manifest_json(mut self, json: &str) -> Self {
        self.manifest = Some(json.as_bytes().to_vec());
        self
    }

    pub fn manifest_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.manifest = Some(bytes);
        self
    }

    pub fn without_symbols(mut self) -> Self {
        self.manifest = None;
        self
    }

    pub fn without_navx_manifest(mut self) -> Self {
        self.include_navx = false;
        self
    }

    pub fn dependency(mut self, name: &str, publisher: &str, min_version: &str) -> Self {
        self.dependencies
            .push((name.to_string(), publisher.to_string(), min_version.to_string()));
        self
    }

    fn navx_xml(&self) -> String {
        let deps: String = self
            .dependencies
            .iter()
            .map(|(name, publisher, min)| {
                format!(
                    r#"<Dependency Name="{name}" Publisher="{publisher}" MinVersion="{min}" />"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="http://schemas.microsoft.com/navx/2015/manifest">
  <App Id="00000000-0000-0000-0000-000000000001" Name="{}" Publisher="{}" Version="{}" />
  <Dependencies>{}</Dependencies>
</Package>"#,
            self.name, self.publisher, self.version, deps
        )
    }
}

/// Write the fixture to `dir/file_name` and return the path.
pub fn write_app_file(dir: &Path, file_name: &str, fixture: &AppFixture) -> PathBuf {
    let path = dir.join(file_name);

    let mut zip_bytes = Vec::new();
    {
        let mut writer = ZipWriter::new(Cursor::new(&mut zip_bytes));
        let options = SimpleFileOptions::default();
        if fixture.include_navx {
            writer.start_file("NavxManifest.xml", options).unwrap();
            writer.write_all(fixture.navx_xml().as_bytes()).unwrap();
        }
        if let Some(manifest) = &fixture.manifest {
            writer.start_file("SymbolReference.json", options).unwrap();
            writer.write_all(manifest).unwrap();
        }
        writer.finish().unwrap();
    }

    let mut file = File::create(&path).unwrap();
    file.write_all(&fixture.header).unwrap();
    file.write_all(&zip_bytes).unwrap();
    path
}

/// Manifest JSON holding the given (id, name) tables, each with one code
/// field and a primary key.
pub fn tables_manifest(tables: &[(u32, &str)]) -> String {
    let tables_json: Vec<serde_json::Value> = tables
        .iter()
        .map(|(id, name)| {
            serde_json::json!({
                "Id": id,
                "Name": name,
                "Fields": [{
                    "Id": 1,
                    "Name": "No.",
                    "TypeDefinition": { "Name": "Code", "Length": 20 },
                }],
                "Keys": [{ "Name": "PK", "FieldNames": ["No."] }],
            })
        })
        .collect();
    serde_json::json!({ "Tables": tables_json }).to_string()
}
