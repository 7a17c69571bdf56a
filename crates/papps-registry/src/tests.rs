use super::*;

use anyhow::{anyhow, Result};
use papps_core::{
    release_date, Application, DisplayStep, DownloadStep, ErrorStep, InstallStep, ManifestLoader,
    PappsError, RegistryConfig, SevenZipStep, Shortcut, ShortcutStep, StepList,
    DEFAULT_UPDATE_CHECK_INTERVAL, SIDECAR_FILE_NAME,
};
use papps_installer::{
    ArchiveExtractor, Downloader, InstallServices, ProcessSpawner, ShortcutService, ToolPaths,
    UnattendedPrompt,
};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const TOOL_URL: &str = "http://example.test/tool.json";
const RUNTIME_URL: &str = "http://example.test/runtime.json";

type DownloadLog = Arc<Mutex<Vec<String>>>;

/// Serves `payload:<text>` URLs by writing `<text>` to the destination.
struct PayloadDownloader {
    requested: DownloadLog,
}

impl Downloader for PayloadDownloader {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        _progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<()> {
        self.requested
            .lock()
            .expect("download log lock")
            .push(url.to_string());
        let payload = url
            .strip_prefix("payload:")
            .ok_or_else(|| anyhow!("unreachable: {url}"))?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, payload)?;
        Ok(())
    }
}

struct NoopSpawner;

impl ProcessSpawner for NoopSpawner {
    fn run(&self, _program: &Path, _arguments: &[String], _cwd: &Path) -> Result<i32> {
        Ok(0)
    }
}

#[derive(Default)]
struct MemoryShortcuts {
    items: Arc<Mutex<Vec<Shortcut>>>,
}

impl ShortcutService for MemoryShortcuts {
    fn add(&self, shortcut: &Shortcut) -> Result<()> {
        let mut items = self.items.lock().expect("shortcut lock");
        items.retain(|item| item.file_name != shortcut.file_name);
        items.push(shortcut.clone());
        Ok(())
    }

    fn remove(&self, shortcut: &Shortcut) -> Result<bool> {
        let mut items = self.items.lock().expect("shortcut lock");
        let before = items.len();
        items.retain(|item| item.file_name != shortcut.file_name);
        Ok(items.len() != before)
    }

    fn list(&self) -> Result<Vec<Shortcut>> {
        Ok(self.items.lock().expect("shortcut lock").clone())
    }

    fn clear(&self) -> Result<()> {
        self.items.lock().expect("shortcut lock").clear();
        Ok(())
    }
}

struct TestBed {
    root: TempDir,
    downloads: DownloadLog,
    shortcuts: Arc<Mutex<Vec<Shortcut>>>,
}

impl TestBed {
    fn new() -> Self {
        Self {
            root: TempDir::new().expect("must create temp dir"),
            downloads: DownloadLog::default(),
            shortcuts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn base(&self) -> PathBuf {
        self.root.path().join("apps")
    }

    fn config(&self) -> RegistryConfig {
        RegistryConfig {
            base_directory: self.base(),
            start_menu_directory: self.root.path().join("menu").join("PApps"),
            update_check_interval: DEFAULT_UPDATE_CHECK_INTERVAL,
        }
    }

    fn services(&self) -> InstallServices {
        InstallServices {
            extractor: Box::new(ArchiveExtractor),
            spawner: Box::new(NoopSpawner),
            downloader: Box::new(PayloadDownloader {
                requested: Arc::clone(&self.downloads),
            }),
            prompt: Box::new(UnattendedPrompt { accept_eulas: true }),
            shortcuts: Box::new(MemoryShortcuts {
                items: Arc::clone(&self.shortcuts),
            }),
            tools: ToolPaths::fixed(None, None),
        }
    }

    fn open(&self) -> ApplicationRegistry {
        ApplicationRegistry::open(self.config(), self.services()).expect("must open registry")
    }

    fn base_entries(&self) -> Vec<String> {
        let mut names = match fs::read_dir(self.base()) {
            Ok(entries) => entries
                .map(|entry| {
                    entry
                        .expect("must read entry")
                        .file_name()
                        .to_string_lossy()
                        .into_owned()
                })
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn downloads_of(&self, url: &str) -> usize {
        self.downloads
            .lock()
            .expect("download log lock")
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

fn write_file(destination: &str, contents: &str) -> InstallStep {
    InstallStep::Download(DownloadStep {
        url: Some(format!("payload:{contents}")),
        destination_file: Some(destination.to_string()),
        hash: None,
        permanent: true,
    })
}

fn fail(message: &str) -> InstallStep {
    InstallStep::Error(ErrorStep {
        message: Some(message.to_string()),
    })
}

fn application(url: &str, name: &str, version: &str, date: &str, steps: Vec<InstallStep>) -> Application {
    Application {
        name: Some(name.to_string()),
        version: Some(version.to_string()),
        release_date: release_date::parse(date),
        dependencies: Some(Vec::new()),
        install_commands: Some(StepList::new(steps)),
        ..Application::new(url)
    }
}

fn tool(version: &str, date: &str, steps: Vec<InstallStep>) -> Application {
    application(TOOL_URL, "Tool", version, date, steps)
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("must read file")
}

#[test]
fn first_install_creates_one_directory_with_sidecar() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    assert!(registry.is_empty());

    let installed = registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");

    let directory = bed.base().join("Tool");
    assert_eq!(installed.install_directory.as_deref(), Some(directory.as_path()));
    assert_eq!(installed.previous_version_install_directory, None);
    assert_eq!(bed.base_entries(), vec!["Tool".to_string()]);
    assert_eq!(read(&directory.join("tool.exe")), "v1");
    assert!(directory.join(SIDECAR_FILE_NAME).is_file());
    assert!(registry.contains(TOOL_URL));

    let reopened = bed.open();
    let restored = reopened.get(TOOL_URL).expect("must find sidecar");
    assert_eq!(restored.version.as_deref(), Some("1.0"));
    assert_eq!(restored.install_directory.as_deref(), Some(directory.as_path()));
    assert!(restored.install_commands.is_none());
}

#[test]
fn upgrade_without_data_directory_carries_every_file_over() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    registry
        .add(&tool(
            "1.0",
            "2024-01-01",
            vec![
                write_file("tool.exe", "v1"),
                write_file("settings.ini", "user"),
            ],
        ))
        .expect("install must succeed");

    let upgraded = registry
        .add(&tool("2.0", "2024-06-01", vec![write_file("tool.exe", "v2")]))
        .expect("upgrade must succeed");

    let directory = bed.base().join("Tool");
    let backup = bed.base().join("Tool.bak");
    assert_eq!(read(&directory.join("tool.exe")), "v2");
    assert_eq!(read(&directory.join("settings.ini")), "user");
    assert_eq!(read(&backup.join("tool.exe")), "v1");
    assert_eq!(
        upgraded.previous_version_install_directory.as_deref(),
        Some(backup.as_path())
    );
    assert_eq!(
        registry.get(TOOL_URL).and_then(|app| app.version.as_deref()),
        Some("2.0")
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(bed.base_entries(), vec!["Tool".to_string(), "Tool.bak".to_string()]);

    let reopened = bed.open();
    assert_eq!(reopened.len(), 1, "backup directory is not an installation");
}

#[test]
fn upgrade_with_data_directory_migrates_only_user_data() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let mut v1 = tool(
        "1.0",
        "2024-01-01",
        vec![
            write_file("tool.exe", "v1"),
            write_file("obsolete.dll", "old"),
            write_file("Data/user.cfg", "mine"),
        ],
    );
    v1.data_directory = Some("Data".to_string());
    registry.add(&v1).expect("install must succeed");

    let mut v2 = tool("2.0", "2024-06-01", vec![write_file("tool.exe", "v2")]);
    v2.data_directory = Some("Data".to_string());
    registry.add(&v2).expect("upgrade must succeed");

    let directory = bed.base().join("Tool");
    assert_eq!(read(&directory.join("tool.exe")), "v2");
    assert_eq!(read(&directory.join("Data/user.cfg")), "mine");
    assert!(!directory.join("obsolete.dll").exists());
}

#[test]
fn second_upgrade_discards_the_older_backup() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    for (version, date) in [("1.0", "2024-01-01"), ("2.0", "2024-02-01"), ("3.0", "2024-03-01")] {
        registry
            .add(&tool(version, date, vec![write_file("tool.exe", version)]))
            .expect("install must succeed");
    }

    assert_eq!(read(&bed.base().join("Tool.bak/tool.exe")), "2.0");
    assert_eq!(read(&bed.base().join("Tool/tool.exe")), "3.0");
    assert_eq!(bed.base_entries(), vec!["Tool".to_string(), "Tool.bak".to_string()]);
}

#[test]
fn name_collision_picks_a_numbered_directory() {
    let bed = TestBed::new();
    let foreign = bed.base().join("Tool");
    fs::create_dir_all(&foreign).expect("must create foreign dir");
    fs::write(foreign.join("readme.txt"), "not ours").expect("must write foreign file");

    let mut registry = bed.open();
    let installed = registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");

    assert_eq!(
        installed.install_directory,
        Some(bed.base().join("Tool (2)"))
    );
    assert_eq!(read(&foreign.join("readme.txt")), "not ours");
}

#[test]
fn failed_upgrade_restores_previous_version() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");

    let err = registry
        .add(&tool(
            "2.0",
            "2024-06-01",
            vec![write_file("tool.exe", "v2"), fail("boom")],
        ))
        .expect_err("upgrade must fail");

    assert_eq!(
        format!("{err:#}"),
        "Installation of Tool failed: error command failed: boom"
    );
    assert_eq!(
        PappsError::kind(&err),
        Some(&PappsError::StepExecution { step: "error" })
    );
    let directory = bed.base().join("Tool");
    assert_eq!(read(&directory.join("tool.exe")), "v1");
    assert_eq!(bed.base_entries(), vec!["Tool".to_string()]);
    assert_eq!(
        registry.get(TOOL_URL).and_then(|app| app.version.as_deref()),
        Some("1.0")
    );
    assert_eq!(
        bed.open().get(TOOL_URL).and_then(|app| app.version.clone()),
        Some("1.0".to_string())
    );
}

#[test]
fn failed_upgrade_puts_back_replaced_shortcut() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let shortcut = |target: &str| {
        InstallStep::Shortcut(ShortcutStep {
            file: Some("Tool.lnk".to_string()),
            target: Some(target.to_string()),
            ..ShortcutStep::default()
        })
    };
    registry
        .add(&tool(
            "1.0",
            "2024-01-01",
            vec![write_file("tool.exe", "v1"), shortcut("tool.exe")],
        ))
        .expect("install must succeed");
    let before = bed.shortcuts.lock().expect("shortcut lock").clone();
    assert_eq!(before.len(), 1);

    registry
        .add(&tool(
            "2.0",
            "2024-06-01",
            vec![
                write_file("tool2.exe", "v2"),
                shortcut("tool2.exe"),
                InstallStep::Shortcut(ShortcutStep {
                    file: Some("Extra.lnk".to_string()),
                    target: Some("tool2.exe".to_string()),
                    ..ShortcutStep::default()
                }),
                fail("boom"),
            ],
        ))
        .expect_err("upgrade must fail");

    let after = bed.shortcuts.lock().expect("shortcut lock").clone();
    assert_eq!(after, before);
    assert!(after[0].target.ends_with("tool.exe"));
}

#[test]
fn application_named_like_a_backup_stays_registered() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let old_url = "http://example.test/old-bak.json";
    registry
        .add(&application(
            old_url,
            "Old.bak",
            "1.0",
            "2024-01-01",
            vec![write_file("old.exe", "old")],
        ))
        .expect("install must succeed");

    assert_eq!(bed.base_entries(), vec!["Old.bak (2)".to_string()]);
    let reopened = bed.open();
    assert!(reopened.contains(old_url));
    assert!(reopened.interrupted().expect("must scan").is_empty());
}

#[test]
fn directory_recorded_by_its_own_sidecar_is_not_a_backup() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let legacy = application(
        "http://example.test/legacy.json",
        "Legacy",
        "1.0",
        "2024-01-01",
        vec![write_file("legacy.exe", "legacy")],
    );
    let installed = registry.add(&legacy).expect("install must succeed");
    let legacy_directory = bed.base().join("Old.bak");
    fs::rename(
        installed.install_directory.as_ref().expect("must have directory"),
        &legacy_directory,
    )
    .expect("must move installation");
    let mut record = installed.clone();
    record.install_directory = Some(legacy_directory.clone());
    write_sidecar(&legacy_directory, &record).expect("must rewrite sidecar");

    let mut registry = bed.open();
    assert!(registry.contains("http://example.test/legacy.json"));
    assert!(registry.interrupted().expect("must scan").is_empty());

    let directory = registry
        .add(&application(
            "http://example.test/old.json",
            "Old",
            "1.0",
            "2024-01-01",
            vec![write_file("old.exe", "old")],
        ))
        .map(|installed| installed.install_directory)
        .expect("fresh install must pick a free directory");
    assert_eq!(directory, Some(bed.base().join("Old (2)")));
    assert_eq!(read(&legacy_directory.join("legacy.exe")), "legacy");
}

#[test]
fn remove_ignores_recorded_backup_outside_base_directory() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let installed = registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");
    let elsewhere = bed.root.path().join("other-drive").join("Tool.bak");
    fs::create_dir_all(&elsewhere).expect("must create foreign directory");
    let directory = installed.install_directory.clone().expect("must have directory");
    let mut record = installed;
    record.previous_version_install_directory = Some(elsewhere.clone());
    write_sidecar(&directory, &record).expect("must rewrite sidecar");

    let mut registry = bed.open();
    assert!(registry.remove(TOOL_URL).expect("remove must succeed"));
    assert!(!directory.exists());
    assert!(elsewhere.is_dir());
}

#[test]
fn failed_first_install_leaves_no_directory() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    registry
        .add(&tool(
            "1.0",
            "2024-01-01",
            vec![write_file("tool.exe", "v1"), fail("no")],
        ))
        .expect_err("install must fail");

    assert!(bed.base_entries().is_empty());
    assert!(!registry.contains(TOOL_URL));
}

#[test]
fn invalid_manifest_fails_before_touching_disk() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let mut app = tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]);
    app.version = None;

    let err = registry.add(&app).expect_err("must reject");
    assert_eq!(
        format!("{err:#}"),
        "Installation of Tool failed: Portable application version is not defined."
    );
    assert!(matches!(PappsError::kind(&err), Some(PappsError::Validation(_))));
    assert!(!bed.base().exists());
}

#[test]
fn missing_tool_fails_preflight_before_touching_disk() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let err = registry
        .add(&tool(
            "1.0",
            "2024-01-01",
            vec![InstallStep::SevenZipArchive(SevenZipStep {
                arguments: Some("x tool.7z".to_string()),
            })],
        ))
        .expect_err("must fail preflight");

    assert_eq!(
        format!("{err:#}"),
        "Installation of Tool failed: 7-Zip could not be found in: PATH (7z, 7za)"
    );
    assert!(!bed.base().exists());
}

#[test]
fn dependencies_install_first_and_only_once() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let runtime = application(
        RUNTIME_URL,
        "Runtime",
        "8",
        "2023-01-01",
        vec![write_file("runtime.dll", "rt")],
    );
    let mut app = tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]);
    app.dependencies = Some(vec![runtime]);

    registry.add(&app).expect("install must succeed");
    assert!(registry.contains(RUNTIME_URL));
    assert_eq!(read(&bed.base().join("Runtime/runtime.dll")), "rt");
    assert_eq!(registry.applications()[0].url, RUNTIME_URL);

    registry.add(&app).expect("reinstall must succeed");
    assert_eq!(bed.downloads_of("payload:rt"), 1);
    assert_eq!(bed.downloads_of("payload:v1"), 2);
}

#[test]
fn failed_dependency_aborts_the_dependent_install() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let runtime = application(RUNTIME_URL, "Runtime", "8", "2023-01-01", vec![fail("broken")]);
    let mut app = tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]);
    app.dependencies = Some(vec![runtime]);

    let err = registry.add(&app).expect_err("must fail");
    assert_eq!(
        format!("{err:#}"),
        "Installation of Tool failed: Installation of Runtime failed: error command failed: broken"
    );
    assert!(registry.is_empty());
    assert!(bed.base_entries().is_empty());
}

#[test]
fn remove_deletes_directories_and_shortcuts() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    let shortcut = InstallStep::Shortcut(ShortcutStep {
        file: Some("Tool.lnk".to_string()),
        target: Some("tool.exe".to_string()),
        ..ShortcutStep::default()
    });
    registry
        .add(&tool(
            "1.0",
            "2024-01-01",
            vec![write_file("tool.exe", "v1"), shortcut.clone()],
        ))
        .expect("install must succeed");
    registry
        .add(&tool(
            "2.0",
            "2024-06-01",
            vec![write_file("tool.exe", "v2"), shortcut],
        ))
        .expect("upgrade must succeed");
    bed.shortcuts
        .lock()
        .expect("shortcut lock")
        .push(Shortcut {
            file_name: "%PAppsStartMenuDir%/Other.lnk".to_string(),
            target: "/elsewhere/other.exe".to_string(),
            ..Shortcut::default()
        });

    assert!(registry.remove(TOOL_URL).expect("remove must succeed"));
    assert!(bed.base_entries().is_empty());
    assert!(!registry.contains(TOOL_URL));
    let remaining = bed.shortcuts.lock().expect("shortcut lock").clone();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].file_name, "%PAppsStartMenuDir%/Other.lnk");

    assert!(!registry.remove(TOOL_URL).expect("second remove must succeed"));
}

struct RecordingChecker {
    requests: RefCell<Vec<BTreeMap<String, String>>>,
    response: BTreeMap<String, String>,
}

impl UpdateChecker for RecordingChecker {
    fn check(&self, installed: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        self.requests.borrow_mut().push(installed.clone());
        Ok(self.response.clone())
    }
}

fn offline_loader() -> ManifestLoader<impl Fn(&str) -> Result<String>> {
    ManifestLoader::new(|url: &str| Err(anyhow!("offline: {url}")))
}

#[test]
fn updates_skip_the_request_when_nothing_is_installed() {
    let bed = TestBed::new();
    let registry = bed.open();
    let checker = RecordingChecker {
        requests: RefCell::new(Vec::new()),
        response: BTreeMap::new(),
    };

    let updates = registry
        .updates(&checker, &offline_loader())
        .expect("must check");
    assert!(updates.is_empty());
    assert!(checker.requests.borrow().is_empty());
}

#[test]
fn updates_send_release_dates_and_resolve_returned_manifests() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");

    let checker = RecordingChecker {
        requests: RefCell::new(Vec::new()),
        response: BTreeMap::from([(
            TOOL_URL.to_string(),
            r#"{"name":"Tool","version":"2.0","release_date":"2024-06-01","dependencies":[],"install_commands":[{"display":{"message":"new"}}]}"#.to_string(),
        )]),
    };

    let updates = registry
        .updates(&checker, &offline_loader())
        .expect("must check");
    assert_eq!(
        checker.requests.borrow().as_slice(),
        &[BTreeMap::from([(
            TOOL_URL.to_string(),
            "2024-01-01T00:00:00".to_string()
        )])]
    );
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].url, TOOL_URL);
    assert_eq!(updates[0].version.as_deref(), Some("2.0"));
    assert_eq!(
        updates[0].install_commands,
        Some(StepList::new(vec![InstallStep::Display(DisplayStep {
            message: Some("new".to_string()),
        })]))
    );

    registry.add(&updates[0]).expect("upgrade must succeed");
    assert_eq!(
        registry.get(TOOL_URL).and_then(|app| app.version.as_deref()),
        Some("2.0")
    );
}

#[test]
fn interrupted_upgrade_backup_can_be_restored() {
    let bed = TestBed::new();
    let mut registry = bed.open();
    registry
        .add(&tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]))
        .expect("install must succeed");
    fs::rename(bed.base().join("Tool"), bed.base().join("Tool.bak"))
        .expect("must simulate interrupted upgrade");

    let mut registry = bed.open();
    assert!(registry.is_empty());
    assert_eq!(
        registry.interrupted().expect("must scan"),
        vec![bed.base().join("Tool.bak")]
    );

    let restored = registry.restore_interrupted().expect("must restore");
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].url, TOOL_URL);
    assert!(registry.contains(TOOL_URL));
    assert_eq!(read(&bed.base().join("Tool/tool.exe")), "v1");
    assert!(registry.interrupted().expect("must scan").is_empty());
}

#[test]
fn unreadable_sidecar_is_skipped() {
    let bed = TestBed::new();
    let broken = bed.base().join("Broken");
    fs::create_dir_all(&broken).expect("must create dir");
    fs::write(broken.join(SIDECAR_FILE_NAME), "{not json").expect("must write sidecar");
    fs::create_dir_all(bed.base().join("NoSidecar")).expect("must create dir");

    assert!(bed.open().is_empty());
}

#[test]
fn shared_registry_serializes_access_across_threads() {
    let bed = TestBed::new();
    let shared = SharedRegistry::new(bed.open());
    let app = tool("1.0", "2024-01-01", vec![write_file("tool.exe", "v1")]);

    let worker = {
        let shared = shared.clone();
        std::thread::spawn(move || shared.with(|registry| registry.add(&app).map(|_| ())))
    };
    worker
        .join()
        .expect("worker must not panic")
        .expect("install must succeed");

    assert_eq!(
        shared
            .with(|registry| Ok(registry.len()))
            .expect("must read registry"),
        1
    );
}

#[test]
fn require_registered_reports_unknown_url() {
    let bed = TestBed::new();
    let registry = bed.open();
    assert_eq!(
        require_registered(&registry, TOOL_URL).expect_err("must be missing"),
        PappsError::NotRegistered {
            url: TOOL_URL.to_string()
        }
    );
}

#[test]
fn parse_update_response_keeps_manifest_bodies_per_url() {
    let updates = parse_update_response(r#"{"http://a/x.json": {"name": "X"}}"#)
        .expect("must parse");
    let body = updates.get("http://a/x.json").expect("must keep url");
    let value: serde_json::Value = serde_json::from_str(body).expect("body must be json");
    assert_eq!(value["name"], "X");

    assert!(parse_update_response("[]").is_err());
    assert!(parse_update_response(r#"{"http://a/x.json": 3}"#).is_err());
}

#[test]
fn http_update_checker_posts_installed_versions() {
    let (url, server) = start_one_shot_http_server(
        br#"{"http://example.test/tool.json": {"name": "Tool", "version": "2.0"}}"#.to_vec(),
    );
    let checker = HttpUpdateChecker::new(url).expect("must build checker");

    let updates = checker
        .check(&BTreeMap::from([(
            TOOL_URL.to_string(),
            "2024-01-01T00:00:00".to_string(),
        )]))
        .expect("must check");
    let request = server.join().expect("server thread must join");

    assert!(request.starts_with("POST /updates "));
    assert!(request.contains(r#"{"http://example.test/tool.json":"2024-01-01T00:00:00"}"#));
    assert!(updates.contains_key(TOOL_URL));
}

/// Answers a single request with `payload` and hands back the raw request.
fn start_one_shot_http_server(payload: Vec<u8>) -> (String, std::thread::JoinHandle<String>) {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("must bind one-shot test server");
    let address = listener
        .local_addr()
        .expect("must read one-shot test server address");
    let url = format!("http://{address}/updates");
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept test client");
        let mut request = Vec::new();
        let mut buffer = [0_u8; 1024];
        while !request_complete(&request) {
            let read = stream.read(&mut buffer).expect("must read test request");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);
        }

        let headers = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        );
        stream
            .write_all(headers.as_bytes())
            .expect("must write test response headers");
        stream
            .write_all(&payload)
            .expect("must write test response payload");
        stream.flush().expect("must flush test response payload");
        String::from_utf8_lossy(&request).into_owned()
    });

    (url, handle)
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    body.len() >= length
}
