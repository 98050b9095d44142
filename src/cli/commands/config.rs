//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_NAME};
use crate::error::{KilnError, KilnResult};
use crate::ui::Console;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config) -> KilnResult<()> {
    let manager = ConfigManager::new();

    match args.action {
        None | Some(ConfigAction::Show) => show_config(config),
        Some(ConfigAction::Path) => show_path(&manager),
        Some(ConfigAction::Init { force }) => init_config(&manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            if local {
                set_local_value(&key, &value).await?
            } else {
                set_value(&manager, config, &key, &value).await?
            }
        }
    }

    Ok(())
}

fn show_config(config: &Config) {
    let toml =
        toml::to_string_pretty(config).unwrap_or_else(|_| "Error serializing config".to_string());
    println!("{}", toml);
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}

async fn init_config(manager: &ConfigManager, force: bool) -> KilnResult<()> {
    let console = Console::detect();
    let path = manager.path();

    if path.exists() && !force {
        console.warn_hint(
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    let config = Config::default();
    manager.save(&config).await?;

    console.ok_detail("Configuration initialized", &path.display().to_string());

    Ok(())
}

async fn set_value(
    manager: &ConfigManager,
    config: &Config,
    key: &str,
    value: &str,
) -> KilnResult<()> {
    let console = Console::detect();
    let mut config = config.clone();

    apply_setting(&mut config, key, value)?;
    manager.save(&config).await?;

    console.ok_detail("Configuration updated", &format!("{} = {}", key, value));
    Ok(())
}

async fn set_local_value(key: &str, value: &str) -> KilnResult<()> {
    let console = Console::detect();
    let cwd = std::env::current_dir()
        .map_err(|e| KilnError::io("getting current directory", e))?;
    let path = cwd.join(LOCAL_CONFIG_NAME);

    let manager = ConfigManager::with_path(path.clone());
    let mut config = manager.load().await?;

    apply_setting(&mut config, key, value)?;
    manager.save(&config).await?;

    console.ok_detail(
        "Local configuration updated",
        &format!("{} = {} ({})", key, value, path.display()),
    );
    Ok(())
}

/// Apply a dot-separated key to the config
fn apply_setting(config: &mut Config, key: &str, value: &str) -> KilnResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "verbose"] => config.general.verbose = parse_bool(value)?,
        ["general", "log_format"] => config.general.log_format = value.to_string(),
        ["general", "audit_log"] => config.general.audit_log = parse_bool(value)?,

        ["toolchain", "descriptor"] => config.toolchain.descriptor = value.into(),
        ["toolchain", "root"] => config.toolchain.root = Some(value.into()),
        ["toolchain", "mirror"] => config.toolchain.mirror = Some(value.to_string()),
        ["toolchain", "support_lib_env"] => config.toolchain.support_lib_env = value.to_string(),
        ["toolchain", "driver"] => config.toolchain.driver = value.to_string(),

        ["source", "root"] => config.source.root = value.into(),

        ["build", "lockfile"] => config.build.lockfile = value.to_string(),
        ["build", "auto_fetch"] => config.build.auto_fetch = parse_bool(value)?,
        ["build", "artifact"] => config.build.artifact = value.to_string(),
        ["build", "platforms"] => {
            config.build.platforms = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        ["cache", "root"] => config.cache.root = Some(value.into()),
        ["cache", "gc_days"] => config.cache.gc_days = parse_u32(value)?,

        _ => {
            return Err(KilnError::User(format!(
                "unknown or unsupported configuration key: {}",
                key
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> KilnResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(KilnError::User(format!("invalid boolean value: {}", value))),
    }
}

fn parse_u32(value: &str) -> KilnResult<u32> {
    value
        .parse()
        .map_err(|_| KilnError::User(format!("invalid numeric value: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_known_settings() {
        let mut config = Config::default();

        apply_setting(&mut config, "build.artifact", "indexer").unwrap();
        assert_eq!(config.build.artifact, "indexer");

        apply_setting(&mut config, "cache.gc_days", "14").unwrap();
        assert_eq!(config.cache.gc_days, 14);

        apply_setting(&mut config, "build.platforms", "a-b-c, d-e-f").unwrap();
        assert_eq!(config.build.platforms, vec!["a-b-c", "d-e-f"]);

        apply_setting(&mut config, "general.audit_log", "false").unwrap();
        assert!(!config.general.audit_log);
    }

    #[test]
    fn apply_unknown_setting_fails() {
        let mut config = Config::default();
        let err = apply_setting(&mut config, "nope.nope", "x").unwrap_err();
        assert!(matches!(err, KilnError::User(_)));
    }

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
