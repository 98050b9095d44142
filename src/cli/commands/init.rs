//! Init command - create a project-local kiln.toml and toolchain pin

use crate::cli::args::InitArgs;
use crate::error::{KilnError, KilnResult};
use crate::ui::Console;
use std::path::Path;
use tokio::fs;

/// Template for project-local config
const INIT_TEMPLATE: &str = r#"# Kiln project configuration
# Settings here override your global config (~/.config/kiln/config.toml)

[toolchain]
# descriptor = "toolchain.toml"
# mirror = "https://mirror.example.org/toolchains"
# support_lib_env = "KILN_SUPPORT_LIB_DIR"

[source]
# root = "."
# exclude = [".git", "target", ".kiln"]

[build]
# lockfile = "deps.lock"
# artifact = "server"
# platforms = ["x86_64-unknown-linux-gnu"]

[[variant]]
name = "base"
features = []

[[variant]]
name = "full"
features = ["full"]

[[package]]
name = "base"
variant = "base"

[[package]]
name = "full"
variant = "full"

[[app]]
name = "base"
package = "base"

[[app]]
name = "full"
package = "full"
"#;

/// Template for the pinned toolchain descriptor
const TOOLCHAIN_TEMPLATE: &str = r#"# Pinned toolchain. Builds resolve exactly this version.
[toolchain]
version = "1.82.0"
targets = ["x86_64-unknown-linux-gnu"]
components = ["compiler", "stdlib"]
"#;

/// Execute the init command
pub async fn execute(args: InitArgs) -> KilnResult<()> {
    let console = Console::detect();

    let target_dir = match args.path {
        Some(ref p) => p.clone(),
        None => {
            std::env::current_dir().map_err(|e| KilnError::io("getting current directory", e))?
        }
    };

    let config_path = target_dir.join("kiln.toml");

    if config_path.exists() && !args.force {
        return Err(KilnError::User(format!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        )));
    }

    ensure_dir(&target_dir).await?;

    fs::write(&config_path, INIT_TEMPLATE)
        .await
        .map_err(|e| KilnError::io(format!("writing {}", config_path.display()), e))?;

    console.ok_detail("Created project config", &config_path.display().to_string());

    // The toolchain pin is only scaffolded when absent; an existing pin is
    // the project's source of truth
    let descriptor_path = target_dir.join("toolchain.toml");
    if !descriptor_path.exists() {
        fs::write(&descriptor_path, TOOLCHAIN_TEMPLATE)
            .await
            .map_err(|e| KilnError::io(format!("writing {}", descriptor_path.display()), e))?;
        console.ok_detail("Created toolchain pin", &descriptor_path.display().to_string());
    }

    Ok(())
}

async fn ensure_dir(dir: &Path) -> KilnResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| KilnError::io(format!("creating directory {}", dir.display()), e))?;
    }
    Ok(())
}
