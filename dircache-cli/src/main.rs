//! dircache CLI
//!
//! Offline tools for directory lookup cache snapshots.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dircache_cache::ResultCache;
use dircache_core::config::CacheConfig;
use dircache_core::constants::{DEFAULT_IDENTIFIER_KEY, DEFAULT_LDAP_PORT, SNAPSHOT_VERSION};
use dircache_core::types::{ResultRecord, Snapshot};
use dircache_crypto::fingerprint;
use dircache_persist::{codec, FileStore, LoadOutcome};

/// dircache - directory lookup cache tools
#[derive(Parser)]
#[command(name = "dircache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the entries of a snapshot file
    Inspect {
        /// Snapshot file
        path: PathBuf,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check that a snapshot file decodes cleanly
    Verify {
        /// Snapshot file
        path: PathBuf,
    },

    /// Drop expired entries and trim a snapshot to size, in place
    Purge {
        /// Snapshot file
        path: PathBuf,
        /// Entry time-to-live in seconds
        #[arg(long, env = "DIRCACHE_TTL_SECONDS")]
        ttl: Option<u64>,
        /// Maximum number of entries to keep
        #[arg(long, env = "DIRCACHE_MAX_ENTRIES")]
        max_entries: Option<usize>,
    },

    /// Print the cache key for a lookup
    Fingerprint {
        /// Identifier value (e.g. the user id from the event)
        value: String,
        /// Directory server host
        #[arg(long)]
        host: String,
        /// Directory server port
        #[arg(long, default_value_t = DEFAULT_LDAP_PORT)]
        port: u16,
        /// Identifier attribute
        #[arg(long, default_value = DEFAULT_IDENTIFIER_KEY)]
        key: String,
    },

    /// Measure cache and codec throughput
    Bench {
        /// Number of entries
        #[arg(short, long, default_value = "20000")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dircache=debug,info"
    } else {
        "dircache=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Inspect { path, json, limit } => cmd_inspect(&path, json, limit).await,
        Commands::Verify { path } => cmd_verify(&path).await,
        Commands::Purge {
            path,
            ttl,
            max_entries,
        } => cmd_purge(&path, ttl, max_entries).await,
        Commands::Fingerprint {
            value,
            host,
            port,
            key,
        } => cmd_fingerprint(&host, port, &key, &value),
        Commands::Bench { count } => cmd_bench(count),
    }
}

async fn load_snapshot(path: &Path) -> Result<Snapshot> {
    match FileStore::new(path)
        .load()
        .await
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?
    {
        LoadOutcome::Loaded(snapshot) => Ok(snapshot),
        LoadOutcome::NotFound => bail!("No snapshot at {}", path.display()),
    }
}

/// Show snapshot contents
async fn cmd_inspect(path: &Path, json: bool, limit: Option<usize>) -> Result<()> {
    let snapshot = load_snapshot(path).await?;
    let shown = limit.unwrap_or(snapshot.len()).min(snapshot.len());

    if json {
        let entries = &snapshot.entries()[..shown];
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({
            "total": snapshot.len(),
            "entries": entries,
        }))?);
        return Ok(());
    }

    println!("{} {}", "📦 Snapshot:".cyan().bold(), path.display());
    println!("   {} {}", "Entries:".dimmed(), snapshot.len());
    if let (Some(oldest), Some(newest)) = (snapshot.entries().first(), snapshot.entries().last()) {
        println!("   {} {}", "Oldest:".dimmed(), oldest.created_at);
        println!("   {} {}", "Newest:".dimmed(), newest.created_at);
    }

    for entry in &snapshot.entries()[..shown] {
        println!("\n   {} {}", "Key:".yellow(), entry.key);
        println!("   {} {}", "Created:".dimmed(), entry.created_at);
        for (name, value) in entry.value.iter() {
            println!("      {} = {}", name.green(), value);
        }
    }

    if shown < snapshot.len() {
        println!("\n   ... {} more (use --limit)", snapshot.len() - shown);
    }

    Ok(())
}

/// Decode a snapshot and report problems
async fn cmd_verify(path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match codec::decode(&bytes) {
        Ok(snapshot) => {
            println!("{} {}", "✅ Valid snapshot:".green().bold(), path.display());
            println!("   {} {}", "Format version:".dimmed(), SNAPSHOT_VERSION);
            println!("   {} {}", "Entries:".dimmed(), snapshot.len());
            println!("   {} {}", "Size:".dimmed(), bytes.len());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "❌ Invalid snapshot:".red().bold(), path.display());
            bail!("{}", e)
        }
    }
}

/// Rewrite a snapshot without expired or excess entries
async fn cmd_purge(path: &Path, ttl: Option<u64>, max_entries: Option<usize>) -> Result<()> {
    let defaults = CacheConfig::default();
    let config = CacheConfig::new(
        max_entries.unwrap_or(defaults.max_entries),
        ttl.unwrap_or(defaults.ttl_seconds),
    );
    config.validate()?;

    let snapshot = load_snapshot(path).await?;
    let before = snapshot.len();

    let cache = ResultCache::from_config(&config)?;
    let report = cache.restore(snapshot);
    debug!(?report, "Restored snapshot into scratch cache");

    let store = FileStore::new(path);
    let saved = store
        .save(&cache.snapshot())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} {}", "🧹 Purged:".cyan().bold(), path.display());
    println!("   {} {}", "Before:".dimmed(), before);
    println!("   {} {}", "Expired:".dimmed(), report.expired);
    println!("   {} {}", "Over capacity:".dimmed(), report.evicted);
    println!("   {} {}", "Duplicates:".dimmed(), report.duplicates);
    println!("   {} {} ({} bytes)", "Kept:".green(), saved.entries, saved.bytes);

    Ok(())
}

/// Print a cache key
fn cmd_fingerprint(host: &str, port: u16, key: &str, value: &str) -> Result<()> {
    println!("{}", fingerprint(host, port, key, value).to_hex());
    Ok(())
}

/// Run throughput checks
fn cmd_bench(count: usize) -> Result<()> {
    if count == 0 {
        bail!("count must be positive");
    }
    println!("{} {} entries", "📊 Benchmarking with".cyan().bold(), count);

    let cache = ResultCache::new(count, Duration::from_secs(300))?;
    let keys: Vec<_> = (0..count)
        .map(|i| fingerprint("ldap.example.org", DEFAULT_LDAP_PORT, DEFAULT_IDENTIFIER_KEY, &i.to_string()))
        .collect();

    println!("\n{}", "1. Inserting...".dimmed());
    let start = Instant::now();
    for (i, key) in keys.iter().enumerate() {
        cache.put(*key, ResultRecord::new().with("uid", i.to_string()).with("sn", "Bench"));
    }
    let put_time = start.elapsed();
    println!("   ✓ {} puts: {:?}", count, put_time);

    println!("\n{}", "2. Reading...".dimmed());
    let start = Instant::now();
    let hits = keys.iter().filter(|k| cache.get(k).is_some()).count();
    let get_time = start.elapsed();
    println!("   ✓ {} gets ({} hits): {:?}", count, hits, get_time);

    println!("\n{}", "3. Snapshot and encode...".dimmed());
    let start = Instant::now();
    let snapshot = cache.snapshot();
    let bytes = codec::encode(&snapshot)?;
    let encode_time = start.elapsed();
    println!("   ✓ {} entries, {} bytes: {:?}", snapshot.len(), bytes.len(), encode_time);

    let start = Instant::now();
    let decoded = codec::decode(&bytes)?;
    println!("   ✓ Decoded {} entries: {:?}", decoded.len(), start.elapsed());

    println!("\n{}", "📈 Results:".green().bold());
    println!("   Put: {:.2}µs/op", put_time.as_micros() as f64 / count as f64);
    println!("   Get: {:.2}µs/op", get_time.as_micros() as f64 / count as f64);

    Ok(())
}
