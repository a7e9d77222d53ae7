use anyhow::Result;
use clap::Parser;
use log::info;
use rmcp::ServiceExt;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, RwLock};

mod config;
mod database;
mod error;
mod manifest;
mod model;
mod package;
mod packages;
mod query;
mod server;
mod shape;
#[cfg(test)]
mod testutil;

use config::Config;
use database::SymbolDatabase;
use packages::PackageManager;
use server::SymbolServer;

#[derive(Parser, Debug)]
#[command(name = "al-symbols-mcp")]
#[command(about = "MCP server exposing compiled AL symbol packages to AI assistants")]
#[command(version)]
struct Args {
    /// Load packages from this absolute directory, print stats, and exit
    /// (CLI mode). Without it the MCP server runs on stdio.
    #[arg(short, long)]
    packages: Option<PathBuf>,

    /// Absolute project root for auto-discovery
    #[arg(long)]
    root: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Additional package cache directory, resolved against the root
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

/// Log panics to stderr and exit cleanly; rmcp panics with a broken pipe
/// when the client disconnects mid-write.
fn install_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };

        if msg.contains("Broken pipe") || msg.contains("os error 32") {
            eprintln!("[al-symbols-mcp] client disconnected (broken pipe), shutting down");
        } else {
            let location = panic_info
                .location()
                .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
                .unwrap_or_default();
            eprintln!("[al-symbols-mcp] panic{location}: {msg}");
        }
        std::process::exit(1);
    }));
}

/// Ignore SIGPIPE so writes to a closed pipe fail with EPIPE instead of
/// killing the process.
#[cfg(unix)]
fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigpipe() {}

async fn run() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env().merge_cli(args.root.clone(), args.log_level, args.cache_dir);

    // stdout carries the MCP channel; logs go to stderr
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .target(env_logger::Target::Stderr)
        .init();

    if let Some(packages_dir) = args.packages {
        // CLI mode for testing/indexing
        info!("Loading packages from {}", packages_dir.display());
        let db = Arc::new(RwLock::new(SymbolDatabase::new()));
        let manager = PackageManager::new(Arc::clone(&db));
        let report = manager.load_packages(&packages_dir, true)?;
        info!(
            "{} loaded, {} skipped, {} failed in {}ms",
            report.loaded, report.skipped, report.errors, report.duration_ms
        );

        let db = db.read().expect("database lock poisoned");
        let stats = db.stats();
        info!(
            "Indexed {} objects across {} packages",
            stats.total_objects, stats.package_count
        );
        for (ty, count) in &stats.objects_by_type {
            info!("  {ty}: {count}");
        }
        return Ok(());
    }

    info!(
        "Starting al-symbols-mcp v{} on stdio",
        env!("CARGO_PKG_VERSION")
    );
    let server = SymbolServer::new(config);
    server
        .serve(rmcp::transport::stdio())
        .await?
        .waiting()
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    ignore_sigpipe();
    install_panic_hook();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:?}");
            if message.contains("Broken pipe") || message.contains("os error 32") {
                eprintln!("[al-symbols-mcp] client disconnected, shutting down");
                ExitCode::SUCCESS
            } else {
                eprintln!("[al-symbols-mcp] error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
