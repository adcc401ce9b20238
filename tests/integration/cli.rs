//! Tests of the `kubelens-updater` binary.

use assert_cmd::Command;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kubelens_updater::config::UpdaterConfig;
use kubelens_updater::test_utils::ReleaseFixture;
use kubelens_updater::utils::PlatformTarget;

/// Scratch project with its own `updater.toml` and temp directory.
struct CliProject {
    temp: TempDir,
}

impl CliProject {
    async fn new(releases_url: &str) -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("tmp")).unwrap();
        let config = UpdaterConfig {
            releases_url: releases_url.to_string(),
            updates_dir: temp.path().join("updates"),
            install_path: Some(temp.path().join("kubelens")),
            ..UpdaterConfig::default()
        };
        config.save_to(&temp.path().join("updater.toml")).await.unwrap();
        Self {
            temp,
        }
    }

    fn path(&self) -> &Path {
        self.temp.path()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::cargo_bin("kubelens-updater").unwrap();
        let tmp = self.path().join("tmp");
        cmd.arg("--config")
            .arg(self.path().join("updater.toml"))
            .args(args)
            .env("NO_COLOR", "1")
            .env("KUBELENS_NO_PROGRESS", "1")
            .env_remove("RUST_LOG")
            .env("TMPDIR", &tmp)
            .env("TMP", &tmp)
            .env("TEMP", &tmp);
        cmd
    }

    /// Runs the binary off the async runtime so the stub server keeps serving.
    async fn run(&self, args: &[&str]) -> Output {
        let mut cmd = self.command(args);
        tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap()
    }
}

fn host_asset_name(version: &str) -> String {
    let target = PlatformTarget::current();
    format!(
        "kubelens-desktop_{version}_{}_{}.{}",
        target.os,
        target.arch,
        target.archive_format().extension()
    )
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("kubelens-updater")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("cleanup"));
}

#[tokio::test]
async fn test_cleanup_removes_leftovers() {
    let project = CliProject::new("http://127.0.0.1:9/releases/latest").await;
    fs::write(project.path().join("kubelens"), "live").unwrap();
    fs::write(project.path().join("kubelens.old"), "old").unwrap();
    fs::create_dir_all(project.path().join("updates")).unwrap();
    fs::write(project.path().join("updates/build.tar.gz.tmp"), "partial").unwrap();
    fs::create_dir_all(project.path().join("tmp/kubelens-update-4194305")).unwrap();

    project
        .run(&["cleanup"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    assert!(project.path().join("kubelens").exists());
    assert!(!project.path().join("kubelens.old").exists());
    assert!(!project.path().join("updates/build.tar.gz.tmp").exists());
    assert!(!project.path().join("tmp/kubelens-update-4194305").exists());

    project
        .run(&["cleanup"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to clean up"));
}

#[tokio::test]
async fn test_check_reports_newer_release() {
    let server = MockServer::start().await;
    ReleaseFixture::new("1.2.3")
        .asset("kubelens-desktop_1.2.3_linux_amd64.tar.gz", b"build".to_vec())
        .mount(&server)
        .await;
    let project = CliProject::new(&ReleaseFixture::releases_url(&server)).await;

    project
        .run(&["check", "--platform", "linux/amd64", "--current", "v1.0.0"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Latest release: 1.2.3"))
        .stdout(predicate::str::contains("kubelens-desktop_1.2.3_linux_amd64.tar.gz"))
        .stdout(predicate::str::contains("Update available: v1.0.0 -> 1.2.3"));

    project
        .run(&["check", "--platform", "linux/amd64", "--current", "1.2.3"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("You are on the latest version"));
}

#[tokio::test]
async fn test_check_json_output() {
    let server = MockServer::start().await;
    ReleaseFixture::new("2.0.0")
        .asset("kubelens-desktop_2.0.0_darwin_universal.zip", b"build".to_vec())
        .mount(&server)
        .await;
    let project = CliProject::new(&ReleaseFixture::releases_url(&server)).await;

    let output = project.run(&["check", "--platform", "darwin/arm64", "--json"]).await;
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["latest"], "2.0.0");
    assert_eq!(report["platform"], "darwin/universal");
    assert_eq!(report["asset"], "kubelens-desktop_2.0.0_darwin_universal.zip");
    assert_eq!(report["update_available"], true);

    let output = project.run(&["check", "--platform", "linux/amd64", "--json"]).await;
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report.get("asset").is_none());
    assert_eq!(report["update_available"], false);
}

#[tokio::test]
async fn test_check_server_error_shows_suggestion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/releases/latest"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let project = CliProject::new(&ReleaseFixture::releases_url(&server)).await;

    project
        .run(&["check"])
        .await
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unexpected HTTP status 502"))
        .stderr(predicate::str::contains("Check your internet connection"));
}

#[tokio::test]
async fn test_update_download_only() {
    let server = MockServer::start().await;
    let asset = host_asset_name("1.2.3");
    ReleaseFixture::new("1.2.3").asset(&asset, b"host build".to_vec()).mount(&server).await;
    let project = CliProject::new(&ReleaseFixture::releases_url(&server)).await;

    project
        .run(&["update", "--download-only", "--no-progress"])
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Downloaded"));

    let downloaded: PathBuf = project.path().join("updates").join(&asset);
    assert_eq!(fs::read(downloaded).unwrap(), b"host build");
}

#[tokio::test]
async fn test_update_checksum_failure_exits_nonzero() {
    let server = MockServer::start().await;
    let asset = host_asset_name("1.2.3");
    ReleaseFixture::new("1.2.3")
        .asset(&asset, b"host build".to_vec())
        .with_manifest(format!("{}  {asset}\n", "f".repeat(64)))
        .mount(&server)
        .await;
    let project = CliProject::new(&ReleaseFixture::releases_url(&server)).await;

    project
        .run(&["update", "--no-progress"])
        .await
        .assert()
        .failure()
        .stderr(predicate::str::contains("Checksum mismatch"))
        .stderr(predicate::str::contains("Retry the download"));

    assert!(!project.path().join("updates").join(&asset).exists());
}

#[test]
fn test_invalid_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("updater.toml");
    fs::write(&config, "releases_url = [not toml").unwrap();

    Command::cargo_bin("kubelens-updater")
        .unwrap()
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(&config)
        .arg("cleanup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
