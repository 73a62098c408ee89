//! Integration tests for Skiff

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn skiff(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("skiff");
        cmd.current_dir(dir).env_remove("SKIFF_CONFIG").env("CI", "1");
        cmd
    }

    /// Temp project whose index lives inside the temp dir
    fn project(extra: &str) -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("skiff.toml");
        let index = temp.path().join("state").join("cache.json");
        std::fs::write(
            &config,
            format!("[cache]\nindex_path = {:?}\n{}", index, extra),
        )
        .unwrap();
        (temp, config, index)
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("content-addressed image cache"))
            .stdout(predicate::str::contains("build"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("skiff"));
    }

    #[test]
    fn config_path_defaults_to_cwd() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("skiff.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("podman"));
    }

    #[test]
    fn config_show_invalid_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("skiff.toml"), "[cache\n").unwrap();
        skiff(temp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn config_init_writes_template() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .args(["config", "init"])
            .assert()
            .success();
        let written = std::fs::read_to_string(temp.path().join("skiff.toml")).unwrap();
        assert!(written.contains("[cache]"));
    }

    #[test]
    fn cache_path_honors_config() {
        let (temp, config, index) = project("");
        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(index.to_string_lossy().to_string()));
    }

    #[test]
    fn cache_list_empty() {
        let (temp, config, _) = project("");
        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn cache_list_corrupt_index_is_empty() {
        let (temp, config, index) = project("");
        std::fs::create_dir_all(index.parent().unwrap()).unwrap();
        std::fs::write(&index, "not json").unwrap();

        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries"));
    }

    #[test]
    fn cache_list_json() {
        let (temp, config, index) = project("");
        std::fs::create_dir_all(index.parent().unwrap()).unwrap();
        std::fs::write(
            &index,
            r#"{"abc123": {"digest": "sha256:feedface", "id": "0123"}}"#,
        )
        .unwrap();

        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("abc123"))
            .stdout(predicate::str::contains("sha256:feedface"));
    }

    #[test]
    fn cache_clear_removes_index() {
        let (temp, config, index) = project("");
        std::fs::create_dir_all(index.parent().unwrap()).unwrap();
        std::fs::write(&index, r#"{"abc123": {"digest": "sha256:feedface"}}"#).unwrap();

        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success();
        assert!(!index.exists());
    }

    #[test]
    fn build_without_artifacts_fails() {
        let (temp, config, _) = project("");
        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No artifacts configured"));
    }

    #[test]
    fn build_unknown_artifact_fails() {
        let (temp, config, _) = project("\n[[artifacts]]\nimage = \"web\"\n");
        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .args(["build", "-a", "db"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown artifact: db"));
    }

    #[test]
    fn build_duplicate_artifact_fails() {
        let (temp, config, _) = project(
            "\n[[artifacts]]\nimage = \"web\"\n\n[[artifacts]]\nimage = \"web\"\n",
        );
        skiff(temp.path())
            .arg("-c")
            .arg(&config)
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("configured more than once"));
    }

    #[test]
    fn build_help() {
        let temp = TempDir::new().unwrap();
        skiff(temp.path())
            .args(["build", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--no-cache"));
    }
}
