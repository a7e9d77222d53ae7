//! Package discovery, version resolution, and loading
//!
//! Walks project roots for .alpackages caches, keeps only the highest
//! version per (publisher, name), orders loads by declared dependencies,
//! and streams each package into the database with per-package atomicity.

use crate::database::{PackageInfo, SymbolDatabase};
use crate::error::{EngineError, EngineResult};
use crate::manifest::decode_manifest;
use crate::model::{PackageDependency, SymbolRecord, Version};
use crate::package::{AppMetadata, SymbolArchive};
use log::{debug, info, warn};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Instant, SystemTime};
use walkdir::WalkDir;

/// Conventional package cache directory name.
pub const PACKAGE_CACHE_DIR: &str = ".alpackages";

/// Editor setting that overrides the package cache location.
const PACKAGE_CACHE_SETTING: &str = "al.packageCachePath";

/// Default discovery depth below the project root.
pub const DEFAULT_MAX_DEPTH: usize = 2;

/// Directories never descended into during discovery.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".svn", ".hg", "target"];

/// Result of one package file within a batch load
#[derive(Debug)]
pub struct LoadOutcome {
    pub path: PathBuf,
    pub package: Option<String>,
    pub status: LoadStatus,
    pub objects: usize,
    pub duration_ms: u64,
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded,
    Skipped(String),
    Failed(EngineError),
}

/// Summary of a batch load; individual failures never abort the batch
#[derive(Debug)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<LoadOutcome>,
}

#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    metadata: AppMetadata,
    version: Version,
}

#[derive(Debug, Clone)]
struct Fingerprint {
    modified: SystemTime,
    size: u64,
    package: String,
}

/// Orchestrates discovery and loading against the shared database
pub struct PackageManager {
    db: Arc<RwLock<SymbolDatabase>>,
    fingerprints: Mutex<HashMap<PathBuf, Fingerprint>>,
    pool: rayon::ThreadPool,
}

impl PackageManager {
    pub fn new(db: Arc<RwLock<SymbolDatabase>>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pkg-load-{i}"))
            .build()
            .expect("package loader pool");
        Self {
            db,
            fingerprints: Mutex::new(HashMap::new()),
            pool,
        }
    }

    pub fn database(&self) -> &Arc<RwLock<SymbolDatabase>> {
        &self.db
    }

    /// Discover package caches under an absolute project root and load
    /// everything found.
    pub fn auto_discover(
        &self,
        root: &Path,
        max_depth: usize,
        extra_cache_dir: Option<&Path>,
        force_reload: bool,
    ) -> EngineResult<LoadReport> {
        require_absolute(root)?;
        let mut files = discover_package_files(root, max_depth)?;
        if let Some(dir) = extra_cache_dir {
            let resolved = resolve_against_root(root, dir);
            files.extend(collect_app_files(&resolved));
        }
        files.sort();
        files.dedup();
        info!(
            "discovered {} package file(s) under {}",
            files.len(),
            root.display()
        );
        self.load_files(files, force_reload)
    }

    /// Load every package file directly inside `dir`.
    pub fn load_packages(&self, dir: &Path, force_reload: bool) -> EngineResult<LoadReport> {
        require_absolute(dir)?;
        if !dir.is_dir() {
            return Err(EngineError::NotFound(format!(
                "package directory not found: {}",
                dir.display()
            )));
        }
        self.load_files(collect_app_files(dir), force_reload)
    }

    fn load_files(&self, files: Vec<PathBuf>, force_reload: bool) -> EngineResult<LoadReport> {
        let start = Instant::now();
        let mut outcomes: Vec<LoadOutcome> = Vec::new();

        // Metadata pass: identity and version for every file.
        let mut candidates = Vec::new();
        for path in files {
            match SymbolArchive::open(&path) {
                Ok(archive) => {
                    let metadata = archive.metadata().clone();
                    candidates.push(Candidate {
                        version: Version::parse(&metadata.version),
                        metadata,
                        path,
                    });
                }
                Err(e) => {
                    warn!("cannot read {}: {e}", path.display());
                    outcomes.push(LoadOutcome {
                        path,
                        package: None,
                        status: LoadStatus::Failed(e),
                        objects: 0,
                        duration_ms: 0,
                    });
                }
            }
        }

        // Keep only the highest version per (publisher, name).
        let (latest, superseded) = filter_latest_versions(candidates);
        for candidate in superseded {
            debug!(
                "superseded: {} v{}",
                candidate.metadata.name, candidate.version
            );
            outcomes.push(LoadOutcome {
                path: candidate.path,
                package: Some(candidate.metadata.name),
                status: LoadStatus::Skipped(
                    "superseded by a newer version of the same package".to_string(),
                ),
                objects: 0,
                duration_ms: 0,
            });
        }

        // Dependency order is informational; cycles fall back to discovery
        // order.
        let order = load_order(&latest);
        let mut to_load: Vec<&Candidate> = Vec::new();
        for i in order {
            let candidate = &latest[i];
            if !force_reload {
                if let Some(reason) = self.unchanged(candidate) {
                    outcomes.push(LoadOutcome {
                        path: candidate.path.clone(),
                        package: Some(candidate.metadata.name.clone()),
                        status: LoadStatus::Skipped(reason),
                        objects: 0,
                        duration_ms: 0,
                    });
                    continue;
                }
            }
            to_load.push(candidate);
        }

        let loaded: Vec<LoadOutcome> = self.pool.install(|| {
            to_load
                .par_iter()
                .map(|candidate| self.load_one(candidate))
                .collect()
        });
        outcomes.extend(loaded);

        let mut report = LoadReport {
            loaded: 0,
            skipped: 0,
            errors: 0,
            duration_ms: start.elapsed().as_millis() as u64,
            outcomes,
        };
        for outcome in &report.outcomes {
            match outcome.status {
                LoadStatus::Loaded => report.loaded += 1,
                LoadStatus::Skipped(_) => report.skipped += 1,
                LoadStatus::Failed(_) => report.errors += 1,
            }
        }
        info!(
            "load batch: {} loaded, {} skipped, {} failed in {}ms",
            report.loaded, report.skipped, report.errors, report.duration_ms
        );
        Ok(report)
    }

    /// Reason to skip this file, when its fingerprint matches the one from
    /// the load that produced the currently resident package.
    fn unchanged(&self, candidate: &Candidate) -> Option<String> {
        let meta = std::fs::metadata(&candidate.path).ok()?;
        let modified = meta.modified().ok()?;
        let fingerprints = self.fingerprints.lock().expect("fingerprint lock poisoned");
        let known = fingerprints.get(&candidate.path)?;
        if known.modified != modified || known.size != meta.len() {
            return None;
        }
        let db = self.db.read().expect("database lock poisoned");
        db.package(&known.package)?;
        Some("unchanged since last load".to_string())
    }

    fn load_one(&self, candidate: &Candidate) -> LoadOutcome {
        let start = Instant::now();
        match self.load_one_inner(candidate, start) {
            Ok(objects) => {
                info!(
                    "loaded {} v{} ({} objects) in {:.1}ms",
                    candidate.metadata.name,
                    candidate.version,
                    objects,
                    start.elapsed().as_secs_f64() * 1000.0
                );
                LoadOutcome {
                    path: candidate.path.clone(),
                    package: Some(candidate.metadata.name.clone()),
                    status: LoadStatus::Loaded,
                    objects,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                warn!("failed to load {}: {e}", candidate.path.display());
                LoadOutcome {
                    path: candidate.path.clone(),
                    package: Some(candidate.metadata.name.clone()),
                    status: LoadStatus::Failed(e),
                    objects: 0,
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// Stream one package into the database. Records are staged outside the
    /// write guard, so a decode failure leaves the database untouched and
    /// readers only ever see the package appear whole.
    fn load_one_inner(&self, candidate: &Candidate, start: Instant) -> EngineResult<usize> {
        let mut archive = SymbolArchive::open(&candidate.path)?;

        let mut staged: Vec<SymbolRecord> = Vec::new();
        let report = {
            let stream = archive.manifest_stream()?;
            decode_manifest(stream, &candidate.path, |record| staged.push(record))?
        };
        let objects = staged.len();

        let info = PackageInfo {
            name: candidate.metadata.name.clone(),
            publisher: candidate.metadata.publisher.clone(),
            version: candidate.version,
            dependencies: candidate
                .metadata
                .dependencies
                .iter()
                .map(|d| PackageDependency {
                    name: d.name.clone(),
                    publisher: d.publisher.clone(),
                    min_version: Version::parse(&d.min_version),
                })
                .collect(),
            source_path: candidate.path.clone(),
            loaded_at: SystemTime::now(),
            object_count: objects,
            counts_by_kind: report.objects_by_kind.iter().map(|(k, v)| (*k, *v)).collect(),
            unknown_keys: report.unknown_keys.values().sum(),
            skipped_objects: report.skipped_objects,
            load_millis: start.elapsed().as_millis() as u64,
        };

        {
            let mut db = self.db.write().expect("database lock poisoned");
            db.replace_package(info, staged);
        }

        if let Ok(meta) = std::fs::metadata(&candidate.path) {
            if let Ok(modified) = meta.modified() {
                self.fingerprints
                    .lock()
                    .expect("fingerprint lock poisoned")
                    .insert(
                        candidate.path.clone(),
                        Fingerprint {
                            modified,
                            size: meta.len(),
                            package: candidate.metadata.name.clone(),
                        },
                    );
            }
        }

        Ok(objects)
    }
}

/// Reject relative roots at the API boundary. Every later relative subpath
/// is resolved against this root, never against the process cwd.
pub fn require_absolute(path: &Path) -> EngineResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument(format!(
            "path must be absolute; got '{}'. Examples: /home/user/projects/my-app or C:\\projects\\my-app",
            path.display()
        )))
    }
}

/// Resolve a possibly-relative path against the supplied absolute root.
pub fn resolve_against_root(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        let trimmed = path.strip_prefix(".").unwrap_or(path);
        root.join(trimmed)
    }
}

/// Find package files under `.alpackages` directories below `root`, plus
/// any caches named by the project's editor configuration.
pub fn discover_package_files(root: &Path, max_depth: usize) -> EngineResult<Vec<PathBuf>> {
    require_absolute(root)?;

    let home = dirs::home_dir();
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if SKIP_DIRS.iter().any(|skip| name.eq_ignore_ascii_case(skip)) {
                return false;
            }
            // Never wander into the user profile when the root sits above it
            if home.as_deref() == Some(entry.path()) {
                return false;
            }
            true
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("discovery: {e}");
                continue;
            }
        };
        if entry.file_type().is_dir()
            && entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(PACKAGE_CACHE_DIR)
        {
            files.extend(collect_app_files(entry.path()));
        }
    }

    for dir in editor_cache_dirs(root) {
        files.extend(collect_app_files(&dir));
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Cache directories named by `.vscode/settings.json`, resolved against the
/// supplied root (explicitly not against the process cwd).
fn editor_cache_dirs(root: &Path) -> Vec<PathBuf> {
    let settings_path = root.join(".vscode").join("settings.json");
    let Ok(content) = std::fs::read_to_string(&settings_path) else {
        return Vec::new();
    };
    let Ok(settings) = serde_json::from_str::<serde_json::Value>(&content) else {
        debug!("unparseable editor settings at {}", settings_path.display());
        return Vec::new();
    };
    let mut dirs = Vec::new();
    match settings.get(PACKAGE_CACHE_SETTING) {
        Some(serde_json::Value::String(entry)) => {
            dirs.push(resolve_against_root(root, Path::new(entry)));
        }
        Some(serde_json::Value::Array(entries)) => {
            for entry in entries {
                if let Some(entry) = entry.as_str() {
                    dirs.push(resolve_against_root(root, Path::new(entry)));
                }
            }
        }
        _ => {}
    }
    dirs
}

/// Package files directly inside a directory.
fn collect_app_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("app"))
                .unwrap_or(false)
        })
        .collect()
}

/// Split candidates into (retained, superseded): within each logical
/// (publisher, name) group only the highest version survives.
fn filter_latest_versions(candidates: Vec<Candidate>) -> (Vec<Candidate>, Vec<Candidate>) {
    let mut best: HashMap<(String, String), usize> = HashMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let key = (
            candidate.metadata.publisher.to_lowercase(),
            candidate.metadata.name.to_lowercase(),
        );
        match best.get(&key) {
            Some(&current) if candidates[current].version >= candidate.version => {}
            _ => {
                best.insert(key, i);
            }
        }
    }
    let keep: Vec<usize> = best.into_values().collect();
    let mut retained = Vec::new();
    let mut superseded = Vec::new();
    for (i, candidate) in candidates.into_iter().enumerate() {
        if keep.contains(&i) {
            retained.push(candidate);
        } else {
            superseded.push(candidate);
        }
    }
    (retained, superseded)
}

/// Topological order over declared dependencies. Dependencies are
/// informational only: unresolved ones are fine, and a cycle falls back to
/// discovery order.
fn load_order(candidates: &[Candidate]) -> Vec<usize> {
    let mut graph = DiGraph::<usize, ()>::new();
    let mut by_key: HashMap<(String, String), NodeIndex> = HashMap::new();
    let nodes: Vec<NodeIndex> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let node = graph.add_node(i);
            by_key.insert(
                (
                    candidate.metadata.publisher.to_lowercase(),
                    candidate.metadata.name.to_lowercase(),
                ),
                node,
            );
            node
        })
        .collect();

    for (i, candidate) in candidates.iter().enumerate() {
        for dep in &candidate.metadata.dependencies {
            let key = (dep.publisher.to_lowercase(), dep.name.to_lowercase());
            if let Some(&dep_node) = by_key.get(&key) {
                if dep_node != nodes[i] {
                    graph.add_edge(dep_node, nodes[i], ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|node| graph[node]).collect(),
        Err(cycle) => {
            let name = &candidates[graph[cycle.node_id()]].metadata.name;
            warn!("dependency cycle involving {name}; loading in discovery order");
            (0..candidates.len()).collect()
        }
    }
}
