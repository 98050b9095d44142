//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const TARGET: &str = "x86_64-unknown-linux-gnu";

    fn kiln() -> Command {
        Command::cargo_bin("kiln").unwrap()
    }

    /// A hermetic project: source tree with lockfile and toolchain pin,
    /// plus a config file pointing store and toolchain roots into the
    /// tempdir. Returns the config file path.
    fn project(temp: &TempDir) -> std::path::PathBuf {
        let source = temp.path().join("src-tree");
        std::fs::create_dir_all(source.join("src")).unwrap();
        std::fs::write(source.join("src/main.c"), "int main() { return 0; }").unwrap();
        std::fs::write(source.join("deps.lock"), "pinned dependency graph v1").unwrap();
        std::fs::write(
            source.join("toolchain.toml"),
            format!("[toolchain]\nversion = \"1.82.0\"\ntargets = [\"{TARGET}\"]\n"),
        )
        .unwrap();

        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[toolchain]
root = "{toolchains}"

[source]
root = "{source}"

[build]
platforms = ["{TARGET}"]

[cache]
root = "{store}"

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
"#,
                toolchains = temp.path().join("toolchains").display(),
                source = source.display(),
                store = temp.path().join("store").display(),
            ),
        )
        .unwrap();

        config_path
    }

    /// Install a stub toolchain whose driver is a shell script that writes
    /// the artifacts the real driver would
    #[cfg(unix)]
    fn install_stub_toolchain(temp: &TempDir) {
        use std::os::unix::fs::PermissionsExt;

        let bin = temp
            .path()
            .join("toolchains")
            .join("1.82.0")
            .join(TARGET)
            .join("bin");
        std::fs::create_dir_all(&bin).unwrap();

        let driver = bin.join("kilnc");
        std::fs::write(
            &driver,
            r#"#!/bin/sh
mode="$1"; shift
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --out) out="$2"; shift 2 ;;
    --source|--lockfile|--target|--deps|--features) shift 2 ;;
    *) shift ;;
  esac
done
if [ "$mode" = "dep-build" ]; then
  echo "dependency bundle" > "$out/deps.bundle"
else
  echo "binary" > "$out"
fi
"#,
        )
        .unwrap();
        std::fs::set_permissions(&driver, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn kiln_with(config: &Path) -> Command {
        let mut cmd = kiln();
        cmd.arg("--config").arg(config).arg("--no-local");
        cmd
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build-graph orchestrator"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path_displays() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_displays_sections() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[[variant]]"));
    }

    #[test]
    fn build_unknown_package_fails() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["build", "nonexistent"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown output"));
    }

    #[test]
    fn run_unknown_app_fails() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["run", "nonexistent"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown output"));
    }

    #[test]
    fn build_without_toolchain_reports_kind() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        // No toolchain installed, no mirror: fatal for this platform
        kiln_with(&config)
            .args(["build", "base"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("toolchain-unavailable"));
    }

    #[test]
    fn build_rejects_mismatched_features() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["build", "base", "--features", "full"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("bound to variant"));
    }

    #[test]
    fn cache_list_empty() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn cache_info_reports_keys() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("snapshot"))
            .stdout(predicate::str::contains(TARGET))
            .stdout(predicate::str::contains("absent"));
    }

    #[test]
    fn status_runs() {
        let temp = TempDir::new().unwrap();
        let config = project(&temp);
        kiln_with(&config)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Kiln Status"));
    }

    #[test]
    fn init_creates_project_files() {
        let temp = TempDir::new().unwrap();
        kiln()
            .args(["init", "--path"])
            .arg(temp.path())
            .assert()
            .success();

        assert!(temp.path().join("kiln.toml").is_file());
        assert!(temp.path().join("toolchain.toml").is_file());
    }

    #[test]
    fn init_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("kiln.toml"), "existing").unwrap();

        kiln()
            .args(["init", "--path"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn completions_generate() {
        kiln()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;

        #[test]
        fn build_both_variants_shares_dependency_entry() {
            let temp = TempDir::new().unwrap();
            let config = project(&temp);
            install_stub_toolchain(&temp);

            kiln_with(&config)
                .args(["build", "base"])
                .assert()
                .success()
                .stdout(predicate::str::contains("derivation key"))
                .stdout(predicate::str::contains("Dependency bundle compiled"));

            kiln_with(&config)
                .args(["build", "full"])
                .assert()
                .success()
                .stdout(predicate::str::contains("Dependency bundle reused from cache"));

            // Distinct artifacts per variant
            let outputs = temp.path().join("store").join(TARGET).join("outputs");
            assert!(outputs.join("base").join("server").is_file());
            assert!(outputs.join("full").join("server").is_file());

            // One shared dependency entry for both variants
            let entries = temp.path().join("store").join(TARGET).join("entries");
            assert_eq!(std::fs::read_dir(&entries).unwrap().count(), 1);
        }

        #[test]
        fn rebuild_reuses_ready_entry() {
            let temp = TempDir::new().unwrap();
            let config = project(&temp);
            install_stub_toolchain(&temp);

            kiln_with(&config).args(["build", "base"]).assert().success();
            kiln_with(&config)
                .args(["build", "base"])
                .assert()
                .success()
                .stdout(predicate::str::contains("reused from cache"));
        }

        #[test]
        fn run_builds_then_forwards_exit_code() {
            let temp = TempDir::new().unwrap();
            let config = project(&temp);
            install_stub_toolchain(&temp);

            // The stub "binary" is a text file, not executable: run must
            // fail to spawn it and report a process error, after building
            kiln_with(&config)
                .args(["run", "base"])
                .assert()
                .failure();

            // The build side effect happened regardless
            let artifact = temp
                .path()
                .join("store")
                .join(TARGET)
                .join("outputs")
                .join("base")
                .join("server");
            assert!(artifact.is_file());
        }

        #[test]
        fn cache_list_shows_ready_entry() {
            let temp = TempDir::new().unwrap();
            let config = project(&temp);
            install_stub_toolchain(&temp);

            kiln_with(&config).args(["build", "base"]).assert().success();

            kiln_with(&config)
                .args(["cache", "list"])
                .assert()
                .success()
                .stdout(predicate::str::contains(TARGET))
                .stdout(predicate::str::contains("ready"));
        }

        #[test]
        fn cache_clear_removes_store() {
            let temp = TempDir::new().unwrap();
            let config = project(&temp);
            install_stub_toolchain(&temp);

            kiln_with(&config).args(["build", "base"]).assert().success();
            kiln_with(&config)
                .args(["cache", "clear", "--yes"])
                .assert()
                .success();

            kiln_with(&config)
                .args(["cache", "list"])
                .assert()
                .success()
                .stdout(predicate::str::contains("No cache entries"));
        }
    }
}
