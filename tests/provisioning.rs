//! Integration tests for toolchain provisioning
//!
//! A fake download server serves an in-memory zip bundle and counts every
//! request, so the tests can assert exactly how much network work each
//! `ensure` call does.

use relay::BuildError;
use relay::error::EXIT_CONFIGURATION;
use relay::toolchain::{
    ArtifactCache, ArtifactId, Extractor, LocalArtifactCache, Marker, Platform, Provision,
    ProvisionError, ProvisionSettings, RemoteEndpoint, ToolchainProvisioner, VersionInfo,
    VersionRequest, ZipExtractor,
};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::FileOptions;

fn bundle_bytes(with_compiler: bool) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let exe = FileOptions::<()>::default().unix_permissions(0o755);
        let plain = FileOptions::<()>::default().unix_permissions(0o644);
        if with_compiler {
            zip.start_file("sdk/bin/compile", exe).unwrap();
            zip.write_all(b"#!/bin/sh\necho compiled\n").unwrap();
        }
        zip.start_file("sdk/VERSION", plain).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.finish().unwrap();
    }
    buf.into_inner()
}

struct FakeServer {
    info: Mutex<VersionInfo>,
    bundle: Vec<u8>,
    /// Returned, in order, by the next download attempts.
    failures: Mutex<Vec<ProvisionError>>,
    version_calls: AtomicUsize,
    download_calls: AtomicUsize,
    downloaded: Mutex<Vec<u64>>,
}

impl FakeServer {
    fn new(revision: u64, date: &str) -> Self {
        Self {
            info: Mutex::new(VersionInfo::new(revision, date)),
            bundle: bundle_bytes(true),
            failures: Mutex::new(Vec::new()),
            version_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            downloaded: Mutex::new(Vec::new()),
        }
    }

    fn publish(&self, revision: u64, date: &str) {
        *self.info.lock().unwrap() = VersionInfo::new(revision, date);
    }

    fn fail_next(&self, errors: Vec<ProvisionError>) {
        *self.failures.lock().unwrap() = errors;
    }

    fn versions(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }
}

impl RemoteEndpoint for FakeServer {
    fn latest_version(&self) -> Result<VersionInfo, ProvisionError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.lock().unwrap().clone())
    }

    fn download_bundle(
        &self,
        revision: u64,
        bundle_name: &str,
        dest: &Path,
    ) -> Result<PathBuf, ProvisionError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        self.downloaded.lock().unwrap().push(revision);
        fs::create_dir_all(dest).unwrap();
        let path = dest.join(bundle_name);
        File::create(&path).unwrap().write_all(&self.bundle).unwrap();
        Ok(path)
    }
}

#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

impl Extractor for CountingExtractor {
    fn extract(&self, archive: &Path, target_dir: &Path) -> Result<(), ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ZipExtractor.extract(archive, target_dir)
    }
}

struct Fixture {
    dir: TempDir,
    server: Arc<FakeServer>,
    cache: Arc<LocalArtifactCache>,
    extractor: Arc<CountingExtractor>,
    platform: Platform,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(LocalArtifactCache::new(dir.path().join("cache")));
        Self {
            dir,
            server: Arc::new(FakeServer::new(7, "201401010000")),
            cache,
            extractor: Arc::new(CountingExtractor::default()),
            platform: Platform::classify("linux", "x86_64"),
        }
    }

    fn settings(&self) -> ProvisionSettings {
        ProvisionSettings::new(
            self.dir.path().join("toolchain"),
            self.dir.path().join("markers"),
        )
    }

    fn provisioner(&self, settings: ProvisionSettings) -> ToolchainProvisioner {
        ToolchainProvisioner::new(
            settings,
            self.server.clone(),
            self.cache.clone(),
            self.extractor.clone(),
        )
    }

    fn extracts(&self) -> usize {
        self.extractor.calls.load(Ordering::SeqCst)
    }

    fn markers(&self) -> PathBuf {
        self.dir.path().join("markers")
    }
}

#[test]
fn test_latest_without_marker_installs_once() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());

    let handle = provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(fx.server.versions(), 1);
    assert_eq!(fx.server.downloads(), 1);
    assert_eq!(fx.extracts(), 1);
    assert_eq!(handle.revision, Some(7));
    assert!(handle.executable.is_file());
    assert!(handle.executable.ends_with("linux-64/sdk/bin/compile"));

    let marker = Marker::read(&fx.markers(), &fx.platform).unwrap();
    assert_eq!(marker.revision, 7);
    assert_eq!(marker.date, "201401010000");
    assert_eq!(marker.classifier, "linux-64");
}

#[test]
fn test_second_latest_call_costs_one_version_check() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();
    let again = provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(again.revision, Some(7));
    assert_eq!(fx.server.versions(), 2);
    assert_eq!(fx.server.downloads(), 1);
    assert_eq!(fx.extracts(), 1);
}

#[test]
fn test_unchanged_concrete_revision_makes_zero_network_calls() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    let before = (fx.server.versions(), fx.server.downloads());

    let handle = provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();

    assert_eq!(handle.revision, Some(7));
    assert_eq!(before, (0, 1));
    assert_eq!((fx.server.versions(), fx.server.downloads()), (0, 1));
    assert_eq!(fx.extracts(), 1);
}

#[test]
fn test_skip_update_check_reuses_latest_install_offline() {
    let fx = Fixture::new();
    fx.provisioner(fx.settings())
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    let mut settings = fx.settings();
    settings.skip_update_check = true;
    fx.provisioner(settings)
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(fx.server.versions(), 1);
}

#[test]
fn test_newer_publication_replaces_install() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    let first = provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();
    let leftover = first.executable.parent().unwrap().join("stale-file");
    fs::write(&leftover, "old").unwrap();

    fx.server.publish(8, "201402010000");
    let second = provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(second.revision, Some(8));
    // One check found the update; it was not repeated to resolve the revision.
    assert_eq!(fx.server.versions(), 2);
    assert_eq!(*fx.server.downloaded.lock().unwrap(), vec![7, 8]);
    assert!(!leftover.exists());
    assert_eq!(Marker::read(&fx.markers(), &fx.platform).unwrap().revision, 8);
}

#[test]
fn test_revision_mismatch_reinstalls_requested_revision() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    let handle = provisioner
        .ensure(&VersionRequest::Revision(9), &fx.platform)
        .unwrap();

    assert_eq!(handle.revision, Some(9));
    assert_eq!(*fx.server.downloaded.lock().unwrap(), vec![7, 9]);
    assert_eq!(fx.extracts(), 2);
}

#[test]
fn test_latest_matching_pinned_install_is_kept() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    let handle = provisioner
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(handle.revision, Some(7));
    assert_eq!(fx.server.versions(), 1);
    assert_eq!(fx.server.downloads(), 1);
    assert_eq!(fx.extracts(), 1);
}

#[test]
fn test_cache_hit_skips_download() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let id = ArtifactId::new(fx.platform, 7, settings.bundle_name(&fx.platform));
    let staged = fx.dir.path().join("staged.zip");
    fs::write(&staged, bundle_bytes(true)).unwrap();
    fx.cache.register(&id, &staged).unwrap();

    let handle = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();

    assert!(handle.executable.is_file());
    assert_eq!(fx.server.downloads(), 0);
    assert_eq!(fx.extracts(), 1);
}

#[test]
fn test_download_is_registered_in_cache() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let id = ArtifactId::new(fx.platform, 7, settings.bundle_name(&fx.platform));
    fx.provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();

    let cached = fx.cache.resolve(&id).unwrap();
    assert!(cached.is_file());
    assert!(cached.ends_with("toolchain/linux-64/7/sdk-linux-64.zip"));
}

#[test]
fn test_override_wins_without_network() {
    let fx = Fixture::new();
    let exe = fx.dir.path().join("my-compiler");
    fs::write(&exe, "#!/bin/sh\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
    }

    let mut settings = fx.settings();
    settings.executable = Some(exe.clone());
    let handle = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap();

    assert_eq!(handle.executable, exe);
    assert_eq!(handle.revision, None);
    assert_eq!((fx.server.versions(), fx.server.downloads()), (0, 0));
}

#[test]
fn test_missing_override_is_configuration_error() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.executable = Some(fx.dir.path().join("nope"));
    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Latest, &fx.platform)
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fx.server.downloads(), 0);
}

#[test]
fn test_directory_bundle_is_packaging_not_ready() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let id = ArtifactId::new(fx.platform, 7, settings.bundle_name(&fx.platform));
    fs::create_dir_all(fx.cache.path_of(&id)).unwrap();

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Configuration(ref m) if m.contains("directory")));
    assert_eq!(BuildError::from(err).exit_code(), EXIT_CONFIGURATION);
    assert_eq!(fx.extracts(), 0);
}

#[test]
fn test_bundle_without_compiler_fails_validation() {
    let fx = Fixture::new();
    let settings = fx.settings();
    let id = ArtifactId::new(fx.platform, 7, settings.bundle_name(&fx.platform));
    let staged = fx.dir.path().join("staged.zip");
    fs::write(&staged, bundle_bytes(false)).unwrap();
    fx.cache.register(&id, &staged).unwrap();

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Configuration(ref m) if m.contains("sdk")));
    assert!(Marker::read(&fx.markers(), &fx.platform).is_none());
}

#[test]
fn test_transfer_failures_are_retried() {
    let fx = Fixture::new();
    fx.server.fail_next(vec![
        ProvisionError::Transfer {
            url: "u".into(),
            message: "connection reset".into(),
        },
        ProvisionError::Status {
            url: "u".into(),
            status: 503,
        },
    ]);
    let mut settings = fx.settings();
    settings.download_retries = 3;

    fx.provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    assert_eq!(fx.server.downloads(), 3);
}

#[test]
fn test_retries_are_bounded() {
    let fx = Fixture::new();
    fx.server.fail_next(
        (0..5)
            .map(|_| ProvisionError::Transfer {
                url: "u".into(),
                message: "timeout".into(),
            })
            .collect(),
    );
    let mut settings = fx.settings();
    settings.download_retries = 2;

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Transfer { .. }));
    assert_eq!(fx.server.downloads(), 2);
}

#[test]
fn test_client_errors_are_not_retried() {
    let fx = Fixture::new();
    fx.server.fail_next(vec![ProvisionError::Status {
        url: "u".into(),
        status: 404,
    }]);
    let mut settings = fx.settings();
    settings.download_retries = 5;

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Status { status: 404, .. }));
    assert_eq!(fx.server.downloads(), 1);
}

#[test]
fn test_checksum_mismatch_discards_download() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.sha256 = Some("00".repeat(32));
    let id = ArtifactId::new(fx.platform, 7, settings.bundle_name(&fx.platform));

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();

    match err {
        ProvisionError::Checksum { path, .. } => assert!(!path.exists()),
        other => panic!("expected checksum error, got {other}"),
    }
    assert!(matches!(
        fx.cache.resolve(&id),
        Err(ProvisionError::CacheMiss(_))
    ));
    assert_eq!(fx.extracts(), 0);
}

#[test]
fn test_offline_without_install_fails() {
    let fx = Fixture::new();
    let mut settings = fx.settings();
    settings.offline = true;

    let err = fx
        .provisioner(settings)
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Offline(_)));
    assert_eq!(fx.server.downloads(), 0);
}

#[test]
fn test_clear_forgets_install() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    assert!(provisioner.installed(&fx.platform).is_some());

    assert!(provisioner.clear(&fx.platform).unwrap());
    assert!(provisioner.installed(&fx.platform).is_none());
    assert!(Marker::read(&fx.markers(), &fx.platform).is_none());
    assert!(!provisioner.clear(&fx.platform).unwrap());
}

#[test]
fn test_deleted_executable_triggers_reinstall() {
    let fx = Fixture::new();
    let provisioner = fx.provisioner(fx.settings());
    let handle = provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    fs::remove_file(&handle.executable).unwrap();

    provisioner
        .ensure(&VersionRequest::Revision(7), &fx.platform)
        .unwrap();
    // Second install comes from the cache.
    assert_eq!(fx.server.downloads(), 1);
    assert_eq!(fx.extracts(), 2);
}
