//! Full update runs through `Updater` against a stub release server.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;

use kubelens_updater::config::UpdaterConfig;
use kubelens_updater::core::{RollbackOutcome, UpdateError};
use kubelens_updater::test_utils::{ReleaseFixture, TestEntry, build_tar_gz, init_test_logging};
use kubelens_updater::update::backup::BackupManager;
use kubelens_updater::update::{PlatformApplier, ReplaceApplier, UpdateState, UpdateStatus, Updater};
use kubelens_updater::utils::PlatformTarget;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

const LINUX_ASSET: &str = "kubelens-desktop_1.2.3_linux_amd64.tar.gz";

/// Install layout: `<root>/opt/kubelens/kubelens` plus a stale backup from an older update.
struct Installation {
    _temp: TempDir,
    root: PathBuf,
    exe: PathBuf,
}

impl Installation {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let exe = root.join("opt/kubelens/kubelens");
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, "#!/bin/sh\nexit 1\n").unwrap();
        fs::write(root.join("opt/kubelens/kubelens.old"), "stale").unwrap();
        Self {
            _temp: temp,
            root,
            exe,
        }
    }

    fn backup(&self) -> PathBuf {
        self.root.join("opt/kubelens/kubelens.old")
    }

    fn updates_dir(&self) -> PathBuf {
        self.root.join("updates")
    }

    fn config(&self, server: &MockServer) -> UpdaterConfig {
        UpdaterConfig {
            releases_url: ReleaseFixture::releases_url(server),
            updates_dir: self.updates_dir(),
            install_path: Some(self.exe.clone()),
            ..UpdaterConfig::default()
        }
    }
}

/// A tar.gz whose `kubelens` binary records its first argument in `marker`.
fn release_archive(dir: &Path, marker: &Path) -> Vec<u8> {
    let script = format!("#!/bin/sh\necho \"$1\" > '{}'\n", marker.display());
    let archive = dir.join("release.tar.gz");
    build_tar_gz(
        &archive,
        &[
            TestEntry::dir("kubelens-desktop_1.2.3_linux_amd64/", 0o755),
            TestEntry::file("kubelens-desktop_1.2.3_linux_amd64/kubelens", script.as_bytes(), 0o755),
            TestEntry::file("kubelens-desktop_1.2.3_linux_amd64/README.md", b"# Kubelens", 0o644),
        ],
    )
    .unwrap();
    fs::read(&archive).unwrap()
}

async fn download(updater: &Updater) -> UpdateStatus {
    updater.start_download(&CancellationToken::new()).unwrap();
    updater.wait().await;
    updater.status()
}

#[tokio::test]
async fn test_update_end_to_end() {
    init_test_logging(None);
    let install = Installation::new();
    let scratch = TempDir::new().unwrap();
    let marker = install.root.join("relaunched");

    let server = MockServer::start().await;
    ReleaseFixture::new("1.2.3")
        .asset("kubelens-desktop_1.2.3_darwin_universal.zip", b"mac build".to_vec())
        .asset(LINUX_ASSET, release_archive(scratch.path(), &marker))
        .asset("kubelens-desktop_1.2.3_windows_amd64.zip", b"windows build".to_vec())
        .mount(&server)
        .await;

    let applier = Arc::new(ReplaceApplier::new(install.exe.clone()).with_args([OsString::from("after-update")]));
    let updater = Updater::with_applier(
        &install.config(&server),
        PlatformTarget::new("linux", "amd64"),
        applier.clone(),
    )
    .unwrap();

    let status = download(&updater).await;
    assert_eq!(
        status,
        UpdateStatus {
            state: UpdateState::Ready,
            progress: 1.0,
            version: "1.2.3".to_string(),
            error: None,
        }
    );

    updater.apply().await.unwrap();
    assert_eq!(updater.status().state, UpdateState::Idle);

    let installed = fs::read_to_string(&install.exe).unwrap();
    assert!(installed.contains(&marker.display().to_string()), "new binary should be installed");
    assert!(!install.backup().exists(), "stale backup should be gone");
    assert!(!install.updates_dir().join(LINUX_ASSET).exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&install.exe).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0, "installed binary must be executable");

        let mut child = spawn_with_retry(applier.as_ref());
        assert!(child.wait().unwrap().success());
        assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "after-update");
    }
}

/// Freshly written executables can briefly fail with "text file busy" while other tests fork.
#[cfg(unix)]
fn spawn_with_retry(applier: &dyn PlatformApplier) -> Child {
    let mut last = None;
    for _ in 0..10 {
        match applier.spawn_relaunch() {
            Ok(child) => return child,
            Err(e) => {
                last = Some(e);
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
        }
    }
    panic!("relaunch failed: {last:?}");
}

#[tokio::test]
async fn test_checksum_mismatch_leaves_installation_untouched() {
    let install = Installation::new();
    let scratch = TempDir::new().unwrap();
    let original = fs::read(&install.exe).unwrap();

    let server = MockServer::start().await;
    let archive = release_archive(scratch.path(), &install.root.join("marker"));
    let mut tampered = archive.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    ReleaseFixture::new("1.2.3")
        .asset(LINUX_ASSET, tampered)
        .with_manifest(format!("{}  {LINUX_ASSET}\n", kubelens_updater::test_utils::sha256_hex(&archive)))
        .mount(&server)
        .await;

    let updater = Updater::with_applier(
        &install.config(&server),
        PlatformTarget::new("linux", "amd64"),
        Arc::new(ReplaceApplier::new(install.exe.clone())),
    )
    .unwrap();

    let status = download(&updater).await;
    assert_eq!(status.state, UpdateState::Error);
    assert!(status.error.unwrap().to_lowercase().contains("checksum"));

    assert_eq!(fs::read(&install.exe).unwrap(), original);
    assert_eq!(fs::read_to_string(install.backup()).unwrap(), "stale");
    assert!(!install.updates_dir().join(LINUX_ASSET).exists());

    let err = updater.apply().await.unwrap_err();
    assert!(matches!(err, UpdateError::InvalidState { .. }));
    assert_eq!(fs::read(&install.exe).unwrap(), original);
}

#[tokio::test]
async fn test_no_build_for_platform() {
    let install = Installation::new();
    let server = MockServer::start().await;
    ReleaseFixture::new("1.2.3")
        .asset("kubelens-desktop_1.2.3_darwin_universal.zip", b"mac build".to_vec())
        .mount(&server)
        .await;

    let updater = Updater::with_applier(
        &install.config(&server),
        PlatformTarget::new("linux", "arm64"),
        Arc::new(ReplaceApplier::new(install.exe.clone())),
    )
    .unwrap();

    let status = download(&updater).await;
    assert_eq!(status.state, UpdateState::Error);
    assert!(status.error.unwrap().contains("linux/arm64"));
    assert!(matches!(updater.last_error(), Some(UpdateError::AssetNotFound { .. })));
}

/// Applier whose install step always fails after the live binary was moved aside.
struct FailingSwap {
    live: PathBuf,
    block_restore: bool,
}

impl PlatformApplier for FailingSwap {
    fn name(&self) -> &'static str {
        "failing-swap"
    }

    fn apply_update(&self, _asset_path: &Path) -> Result<(), UpdateError> {
        BackupManager::new(self.live.clone()).swap(|live| {
            if self.block_restore {
                fs::create_dir_all(live.join("partial")).unwrap();
            }
            Err(UpdateError::fs(
                "copy new binary to",
                live,
                &std::io::Error::other("No space left on device"),
            ))
        })
    }

    fn spawn_relaunch(&self) -> Result<Child, UpdateError> {
        unreachable!("relaunch is never reached after a failed apply")
    }
}

async fn failed_apply_message(block_restore: bool) -> (Installation, String) {
    let install = Installation::new();
    fs::remove_file(install.backup()).unwrap();
    let server = MockServer::start().await;
    ReleaseFixture::new("1.2.3").asset(LINUX_ASSET, b"build".to_vec()).mount(&server).await;

    let updater = Updater::with_applier(
        &install.config(&server),
        PlatformTarget::new("linux", "amd64"),
        Arc::new(FailingSwap {
            live: install.exe.clone(),
            block_restore,
        }),
    )
    .unwrap();
    assert_eq!(download(&updater).await.state, UpdateState::Ready);

    let err = updater.apply().await.unwrap_err();
    assert!(matches!(err, UpdateError::ApplyFailed { .. }));
    let status = updater.status();
    assert_eq!(status.state, UpdateState::Error);
    (install, status.error.unwrap())
}

#[tokio::test]
async fn test_rollback_outcomes_are_distinguishable() {
    let (restored, restored_msg) = failed_apply_message(false).await;
    assert!(restored_msg.contains("No space left on device"));
    assert!(restored_msg.contains(&RollbackOutcome::Restored.to_string()));
    assert!(restored.exe.is_file());
    assert!(!restored.backup().exists());

    let (broken, broken_msg) = failed_apply_message(true).await;
    assert!(broken_msg.contains("restoration also failed"));
    assert!(broken_msg.contains(&broken.backup().display().to_string()));
    assert!(broken.backup().is_file(), "backup must be retained");

    assert_ne!(restored_msg, broken_msg);
}
