//! Cache command - inspect and maintain the artifact store

use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{KilnError, KilnResult};
use crate::graph::key::{DepInputs, DerivationKey};
use crate::graph::store::platform_store_root;
use crate::graph::{target_platforms, CacheEntry, CacheStore, EntryStatus};
use crate::snapshot::{ExcludeRules, SourceSnapshot};
use crate::toolchain::ToolchainDescriptor;
use crate::ui::Console;
use chrono::Utc;
use console::style;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let store_root = ConfigManager::store_root(config);

    match args.action {
        CacheAction::List { format } => list_entries(&store_root, format),
        CacheAction::Info => show_project_info(&store_root, config),
        CacheAction::Gc { days, dry_run } => gc_entries(&store_root, config, days, dry_run),
        CacheAction::Clear { yes } => clear_store(&store_root, yes).await,
    }
}

/// Platform namespaces present in the store
fn platform_dirs(store_root: &Path) -> KilnResult<Vec<(String, PathBuf)>> {
    if !store_root.is_dir() {
        return Ok(vec![]);
    }

    let mut dirs = vec![];
    let entries = std::fs::read_dir(store_root)
        .map_err(|e| KilnError::io(format!("reading store {}", store_root.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| KilnError::io("reading store".to_string(), e))?;
        if entry.path().is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }

    dirs.sort();
    Ok(dirs)
}

fn list_entries(store_root: &Path, format: OutputFormat) -> KilnResult<()> {
    let mut all: Vec<(String, CacheEntry)> = vec![];
    for (platform, dir) in platform_dirs(store_root)? {
        let store = CacheStore::open(dir);
        for entry in store.list_entries()? {
            all.push((platform.clone(), entry));
        }
    }

    if all.is_empty() {
        println!("No cache entries found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&all),
        OutputFormat::Json => print_entry_json(&all)?,
        OutputFormat::Plain => {
            for (platform, entry) in &all {
                println!("{}/{}", platform, entry.key);
            }
        }
    }

    Ok(())
}

fn print_entry_table(entries: &[(String, CacheEntry)]) {
    println!(
        "{:<30} {:<14} {:<10} {:<20}",
        "PLATFORM", "KEY", "STATUS", "CREATED"
    );
    println!("{}", "-".repeat(76));

    for (platform, entry) in entries {
        let status_display = match entry.status {
            EntryStatus::Ready => style("ready").green().to_string(),
            EntryStatus::Failed => style("failed").red().to_string(),
            EntryStatus::Building => style("building").yellow().to_string(),
            EntryStatus::Pending => style("pending").dim().to_string(),
        };

        let created = entry.created_at.format("%Y-%m-%d %H:%M").to_string();

        println!(
            "{:<30} {:<14} {:<10} {:<20}",
            platform,
            &entry.key[..12],
            status_display,
            created
        );
    }

    println!();
    println!("Total: {} entr(ies)", entries.len());
}

fn print_entry_json(entries: &[(String, CacheEntry)]) -> KilnResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        platform: &'a str,
        key: &'a str,
        status: String,
        created_at: String,
        artifacts: &'a [String],
        error: Option<&'a str>,
    }

    let json_entries: Vec<EntryJson> = entries
        .iter()
        .map(|(platform, e)| EntryJson {
            platform,
            key: &e.key,
            status: e.status.to_string(),
            created_at: e.created_at.to_rfc3339(),
            artifacts: &e.artifacts,
            error: e.error.as_deref(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

/// Show the derivation keys this project resolves to right now, and
/// whether the store already holds them. Uses only the pinned descriptor —
/// no toolchain needs to be installed.
fn show_project_info(store_root: &Path, config: &Config) -> KilnResult<()> {
    let console = Console::detect();
    let source_root = &config.source.root;

    let descriptor = ToolchainDescriptor::load(&source_root.join(&config.toolchain.descriptor))?;
    let rules = ExcludeRules::new(&config.source.exclude);
    let snapshot = SourceSnapshot::capture(source_root, &rules)?;
    let inputs = DepInputs::read(source_root, &config.build.lockfile, config.build.auto_fetch)?;

    console.field("source root", &source_root.display().to_string());
    console.field("snapshot", snapshot.short_hash());
    console.field("files", &snapshot.files.len().to_string());
    println!();

    for platform in target_platforms(config) {
        let identifier = format!("kiln-tc-{}", descriptor.version);
        let key = DerivationKey::compute(&platform, &identifier, &snapshot.hash, &inputs);

        let store = CacheStore::open(platform_store_root(store_root, &platform));
        let status = store
            .list_entries()?
            .into_iter()
            .find(|e| e.key == key.as_str())
            .map(|e| e.status.to_string())
            .unwrap_or_else(|| "absent".to_string());

        console.field_status(
            &format!("{} [{}]", platform, key.short()),
            &status,
            status == "ready",
        );
    }

    Ok(())
}

/// Garbage collect entries older than the configured age
fn gc_entries(
    store_root: &Path,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> KilnResult<()> {
    let gc_days = days_override.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let mut to_remove: Vec<(String, PathBuf, CacheEntry)> = vec![];
    for (platform, dir) in platform_dirs(store_root)? {
        let store = CacheStore::open(dir.clone());
        for entry in store.list_entries()? {
            if entry.is_older_than_days(gc_days) {
                to_remove.push((platform.clone(), dir.clone(), entry));
            }
        }
    }

    if to_remove.is_empty() {
        println!("No cache entries older than {} days.", gc_days);
        return Ok(());
    }

    println!(
        "Found {} entr(ies) older than {} days:",
        to_remove.len(),
        gc_days
    );

    for (platform, _, entry) in &to_remove {
        let age_days = (Utc::now() - entry.created_at).num_days();
        println!(
            "  {} {}/{} ({} days old)",
            style("•").red(),
            platform,
            &entry.key[..12],
            age_days
        );
    }

    if dry_run {
        println!();
        println!("Dry run - no entries removed.");
        return Ok(());
    }

    let mut removed = 0;
    for (_, dir, entry) in to_remove {
        debug!("Removing entry {}", entry.key);
        let store = CacheStore::open(dir);
        if store.remove_entry(&entry.key)? {
            removed += 1;
        }
    }

    println!();
    println!("{} removed {} entr(ies)", style("✓").green(), removed);

    Ok(())
}

/// Remove the entire store: dependency entries and variant outputs
async fn clear_store(store_root: &Path, skip_confirm: bool) -> KilnResult<()> {
    let platforms = platform_dirs(store_root)?;

    if platforms.is_empty() {
        println!("Store is already empty.");
        return Ok(());
    }

    println!("This will remove {} platform namespace(s):", platforms.len());
    for (platform, _) in &platforms {
        println!("  {} {}", style("•").red(), platform);
    }
    println!();

    let console = Console::detect().with_auto_yes(skip_confirm);
    if !console.confirm("Remove all cached artifacts?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut removed = 0;
    for (_, dir) in platforms {
        std::fs::remove_dir_all(&dir)
            .map_err(|e| KilnError::io(format!("removing {}", dir.display()), e))?;
        removed += 1;
    }

    println!("{} cleared {} platform namespace(s)", style("✓").green(), removed);

    Ok(())
}
