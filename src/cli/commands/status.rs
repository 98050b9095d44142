//! Status command - check toolchains, source tree, and store health

use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::graph::store::platform_store_root;
use crate::graph::{target_platforms, CacheStore, EntryStatus};
use crate::snapshot::{ExcludeRules, SourceSnapshot};
use crate::toolchain::{ToolchainDescriptor, ToolchainResolver};
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[FAIL] ");
static WARN: Emoji<'_, '_> = Emoji("⚠ ", "[WARN] ");

/// Execute the status command
pub async fn execute(config: &Config) -> KilnResult<()> {
    println!("{}", style("Kiln Status").bold().cyan());
    println!();

    let mut all_ok = true;

    println!("{}", style("Configuration:").bold());
    println!(
        "  {} Store root: {}",
        CHECK,
        ConfigManager::store_root(config).display()
    );
    println!(
        "  {} Offline policy: auto_fetch {}",
        if config.build.auto_fetch { CROSS } else { CHECK },
        if config.build.auto_fetch {
            style("enabled (builds will be rejected)").red().to_string()
        } else {
            style("disabled").green().to_string()
        }
    );
    all_ok &= !config.build.auto_fetch;

    all_ok &= check_toolchains(config);
    all_ok &= check_source(config);
    check_store(config);

    println!();
    if all_ok {
        println!("{}", style("All critical checks passed").green().bold());
    } else {
        println!(
            "{}",
            style("Some checks failed - see above for details")
                .yellow()
                .bold()
        );
    }

    Ok(())
}

/// Check the pinned toolchain on every configured platform. Read-only: a
/// missing installation is reported, never fetched here.
fn check_toolchains(config: &Config) -> bool {
    println!();
    println!("{}", style("Toolchain:").bold());

    let descriptor_path = config.source.root.join(&config.toolchain.descriptor);
    let descriptor = match ToolchainDescriptor::load(&descriptor_path) {
        Ok(d) => {
            println!("  {} Descriptor: {} (version {})", CHECK, descriptor_path.display(), d.version);
            d
        }
        Err(e) => {
            println!("  {} Descriptor: {}", CROSS, style(e).red());
            return false;
        }
    };

    let resolver = ToolchainResolver::new(
        ConfigManager::toolchain_root(config),
        None, // never fetch from a status check
        config.toolchain.driver.clone(),
        config.toolchain.support_lib_env.clone(),
    );

    let mut ok = true;
    for platform in target_platforms(config) {
        match resolver.resolve(&descriptor, &platform) {
            Ok(spec) => {
                println!("  {} {} installed at {}", CHECK, platform, spec.root.display());
            }
            Err(e) => {
                let hint = if config.toolchain.mirror.is_some() {
                    "will be fetched from the mirror on next build"
                } else {
                    "no mirror configured"
                };
                println!(
                    "  {} {} - {} ({})",
                    WARN,
                    platform,
                    style(e).yellow(),
                    hint
                );
                if config.toolchain.mirror.is_none() {
                    ok = false;
                }
            }
        }
    }

    ok
}

fn check_source(config: &Config) -> bool {
    println!();
    println!("{}", style("Source:").bold());

    let rules = ExcludeRules::new(&config.source.exclude);
    match SourceSnapshot::capture(&config.source.root, &rules) {
        Ok(snapshot) => {
            println!(
                "  {} Snapshot {} ({} files)",
                CHECK,
                snapshot.short_hash(),
                snapshot.files.len()
            );
            let lockfile = config.source.root.join(&config.build.lockfile);
            if lockfile.is_file() {
                println!("  {} Lockfile: {}", CHECK, lockfile.display());
                true
            } else {
                println!(
                    "  {} Lockfile missing: {} - dependency graph is not pinned",
                    CROSS,
                    lockfile.display()
                );
                false
            }
        }
        Err(e) => {
            println!("  {} {}", CROSS, style(e).red());
            false
        }
    }
}

fn check_store(config: &Config) {
    println!();
    println!("{}", style("Store:").bold());

    let store_root = ConfigManager::store_root(config);
    let mut total = 0usize;
    let mut ready = 0usize;

    for platform in target_platforms(config) {
        let store = CacheStore::open(platform_store_root(&store_root, &platform));
        if let Ok(entries) = store.list_entries() {
            total += entries.len();
            ready += entries
                .iter()
                .filter(|e| e.status == EntryStatus::Ready)
                .count();
        }
    }

    println!("  {} {} entr(ies), {} ready", CHECK, total, ready);
}
