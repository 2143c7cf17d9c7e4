#![cfg(unix)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pak_core::fetch::{FetchError, RemoteFetcher, Transport};
use pak_core::installer::{InstallError, InstallOptions, InstallRun, PackageManager};
use pak_core::runner::SystemRunners;
use pak_core::{Config, FixedScope, Layout, Reporter, Scope};
use pak_schema::{
    Assembly, Component, ComponentDataType, DefinedRemoteSource, Dependency, DependencySourceType,
    ExecutionPolicy, ExecutionUnit, ExitHandle, ExitHandlers, Header, InstallerHooks, Package,
    Credential, PackageError, PackageName, PackageOptions, RemoteSourceKind, Version,
};
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    progress: Mutex<Vec<(String, u64, u64)>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn progress_of(&self, name: &str) -> Vec<(u64, u64)> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, c, t)| (*c, *t))
            .collect()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl Reporter for Recorder {
    fn section(&self, title: &str) {
        self.events.lock().unwrap().push(format!("section {title}"));
    }
    fn installing(&self, name: &PackageName, _: &Version, current: u64, total: u64) {
        self.progress
            .lock()
            .unwrap()
            .push((name.to_string(), current, total));
    }
    fn removing(&self, name: &PackageName, version: &Version) {
        self.events
            .lock()
            .unwrap()
            .push(format!("removing {name}={version}"));
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {name}={version} {detail}"));
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        self.events
            .lock()
            .unwrap()
            .push(format!("failed {name}={version} {reason}"));
    }
    fn info(&self, msg: &str) {
        self.events.lock().unwrap().push(format!("info {msg}"));
    }
    fn warning(&self, msg: &str) {
        self.events.lock().unwrap().push(format!("warning {msg}"));
    }
    fn error(&self, msg: &str) {
        self.events.lock().unwrap().push(format!("error {msg}"));
    }
}

/// Serves one GitHub release of `acme/tool` whose only asset is a package.
struct ReleaseTransport {
    package: Vec<u8>,
}

const RELEASES_URL: &str = "https://api.github.com/repos/acme/tool/releases";
const ASSET_URL: &str = "https://dl.example/tool.pak";

#[async_trait]
impl Transport for ReleaseTransport {
    async fn get_json(
        &self,
        url: &str,
        _: Option<&Credential>,
    ) -> Result<serde_json::Value, FetchError> {
        if url != RELEASES_URL {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(serde_json::json!([{
            "tag_name": "v1.0.0",
            "name": "Tool",
            "body": "",
            "zipball_url": null,
            "tarball_url": null,
            "assets": [{ "name": "tool.pak", "browser_download_url": ASSET_URL }]
        }]))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        _: Option<&Credential>,
    ) -> Result<(), FetchError> {
        if url != ASSET_URL {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        fs::write(dest, &self.package)?;
        Ok(())
    }
}

struct TestContext {
    temp_dir: TempDir,
    reporter: Arc<Recorder>,
    manager: PackageManager,
    _runtime: Option<tokio::runtime::Runtime>,
}

impl TestContext {
    fn new() -> Self {
        Self::build(Scope::System, None)
    }

    fn with_scope(scope: Scope) -> Self {
        Self::build(scope, None)
    }

    /// A system-scope context whose remote installs go through `transport`.
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::build(Scope::System, Some(transport))
    }

    fn build(scope: Scope, transport: Option<Arc<dyn Transport>>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let layout = Layout::new(temp_dir.path().join("root"));
        let config = Config {
            bin_dir: temp_dir.path().join("bin"),
            ..Config::default()
        };
        let mut runners = BTreeMap::new();
        runners.insert("bash".to_string(), PathBuf::from("/bin/sh"));
        let reporter = Arc::new(Recorder::default());
        let mut manager = PackageManager::new(
            layout.clone(),
            &config,
            Arc::new(FixedScope(scope)),
            Arc::new(SystemRunners::with_overrides(runners)),
            reporter.clone(),
        );

        let runtime = match transport {
            Some(transport) => {
                let runtime = tokio::runtime::Runtime::new().expect("failed to start runtime");
                let fetcher = RemoteFetcher::new(
                    Arc::clone(manager.sources()),
                    transport,
                    runtime.handle().clone(),
                    layout.tmp_dir(),
                );
                manager = manager.with_fetcher(fetcher);
                Some(runtime)
            }
            None => None,
        };

        Self {
            temp_dir,
            reporter,
            manager,
            _runtime: runtime,
        }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `package` as `<name>.pak` next to the other fixtures.
    fn write(&self, file: &str, package: &Package) -> PathBuf {
        let dir = self.path().join("packages");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        package.write_file(&path).unwrap();
        path
    }
}

fn package(name: &str, version: &str) -> Package {
    Package {
        assembly: Assembly {
            name: name.to_string(),
            package: name.to_string(),
            version: version.to_string(),
            ..Assembly::default()
        },
        header: Header {
            compiler_extension: "generic".to_string(),
            ..Header::default()
        },
        ..Package::default()
    }
}

fn shell_unit(name: &str, script: &str) -> ExecutionUnit {
    ExecutionUnit {
        policy: ExecutionPolicy {
            name: name.to_string(),
            runner: "bash".to_string(),
            ..ExecutionPolicy::default()
        },
        data: script.as_bytes().to_vec(),
    }
}

fn local_dep(name: &str, file: &str) -> Dependency {
    Dependency::new(name, None).with_source(DependencySourceType::Local, file)
}

#[test]
fn test_install_registers_everything() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.components.push(Component {
        name: "lib/main.txt".to_string(),
        data_type: ComponentDataType::Plain,
        data: b"hello".to_vec(),
    });
    foo.execution_units
        .push(shell_unit("main", "printf ran > \"$1\"\n"));
    foo.main_execution_policy = Some("main".to_string());
    foo.header.options = PackageOptions {
        create_symlink: true,
    };
    let path = ctx.write("foo.pak", &foo);

    let outcome = ctx.manager.install(&path, &InstallOptions::default()).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.version, "1.0.0");

    let entry = ctx.manager.package_version("com.example.foo", "1.0.0").unwrap();
    assert_eq!(entry.execution_units, vec!["main".to_string()]);
    assert_eq!(fs::read(entry.location.join("source/lib/main.txt")).unwrap(), b"hello");
    for file in ["assembly.json", "extension.json", "constants.json", "dependencies.json", "package.pak"] {
        assert!(entry.location.join("data").join(file).exists(), "{file} missing");
    }

    let units = ctx.manager.units().units("com.example.foo", "1.0.0").unwrap();
    assert_eq!(units, vec!["main".to_string()]);

    let link = ctx.path().join("bin/foo");
    assert_eq!(
        fs::read_link(&link).unwrap(),
        ctx.manager.units().launcher_path("com.example.foo", "1.0.0", "main")
    );

    let marker = ctx.path().join("marker");
    let exit = ctx
        .manager
        .units()
        .execute_unit(
            "com.example.foo",
            "1.0.0",
            "main",
            &[marker.display().to_string()],
        )
        .unwrap();
    assert!(exit.success());
    assert_eq!(fs::read_to_string(&marker).unwrap(), "ran");
}

#[test]
fn test_already_installed_and_reinstall() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.execution_units.push(shell_unit("old", "exit 0"));
    let path = ctx.write("foo.pak", &foo);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::AlreadyInstalled { .. }));

    let mut foo2 = package("com.example.foo", "1.0.0");
    foo2.execution_units.push(shell_unit("new", "exit 0"));
    let path2 = ctx.write("foo2.pak", &foo2);
    let options = InstallOptions {
        reinstall: true,
        ..InstallOptions::default()
    };
    ctx.manager.install(&path2, &options).unwrap();

    assert_eq!(
        ctx.manager.units().units("com.example.foo", "1.0.0").unwrap(),
        vec!["new".to_string()]
    );
    assert_eq!(ctx.manager.package("com.example.foo").unwrap().versions.len(), 1);
}

#[test]
fn test_missing_file_is_not_found() {
    let ctx = TestContext::new();
    let err = ctx
        .manager
        .install(&ctx.path().join("nope.pak"), &InstallOptions::default())
        .unwrap_err();
    assert!(matches!(err, InstallError::NotFound(_)));
}

#[test]
fn test_user_scope_is_denied() {
    let ctx = TestContext::with_scope(Scope::User);
    let path = ctx.write("foo.pak", &package("com.example.foo", "1.0.0"));
    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::AccessDenied(_)));
    assert!(ctx.manager.installed_packages().unwrap().is_empty());
}

#[test]
fn test_unknown_extension() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.compiler_extension = "cobol".to_string();
    let path = ctx.write("foo.pak", &foo);
    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::UnsupportedExtension(ref t) if t == "cobol"));
}

#[test]
fn test_diamond_dependencies_install_once() {
    let ctx = TestContext::new();
    ctx.write("d.pak", &package("com.example.delta", "1.0.0"));
    let mut b = package("com.example.beta", "1.0.0");
    b.header.dependencies.push(local_dep("com.example.delta", "d.pak"));
    ctx.write("b.pak", &b);
    let mut c = package("com.example.gamma", "1.0.0");
    c.header.dependencies.push(local_dep("com.example.delta", "d.pak"));
    ctx.write("c.pak", &c);
    let mut a = package("com.example.alpha", "1.0.0");
    a.header.dependencies.push(local_dep("com.example.beta", "b.pak"));
    a.header.dependencies.push(local_dep("com.example.gamma", "c.pak"));
    let path = ctx.write("a.pak", &a);

    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    assert_eq!(ctx.reporter.count("done com.example.delta=1.0.0"), 1);
    let installed: Vec<String> = ctx
        .manager
        .installed_packages()
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(
        installed,
        vec![
            "com.example.alpha",
            "com.example.beta",
            "com.example.delta",
            "com.example.gamma"
        ]
    );

    let entry = ctx.manager.package_version("com.example.alpha", "1.0.0").unwrap();
    let deps: Vec<(&str, &str)> = entry
        .dependencies
        .iter()
        .map(|d| (d.name.as_str(), d.version.as_str()))
        .collect();
    assert_eq!(deps, vec![("com.example.beta", "1.0.0"), ("com.example.gamma", "1.0.0")]);

    let tree = ctx.manager.package_tree(Some("com.example.alpha")).unwrap();
    let a_node = tree.get("com.example.alpha=1.0.0").unwrap();
    assert!(a_node.get("com.example.beta=1.0.0").unwrap().get("com.example.delta=1.0.0").is_some());
}

#[test]
fn test_unpinned_dependency_records_locked_version() {
    let ctx = TestContext::new();
    let foo = ctx.write("foo.pak", &package("org.example.foo", "1.3.0"));
    ctx.manager.install(&foo, &InstallOptions::default()).unwrap();

    let mut bar = package("org.example.bar", "1.0.0");
    bar.header
        .dependencies
        .push(Dependency::new("org.example.foo", None));
    let path = ctx.write("bar.pak", &bar);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let entry = ctx.manager.package_version("org.example.bar", "1.0.0").unwrap();
    assert_eq!(entry.dependencies.len(), 1);
    assert_eq!(entry.dependencies[0].name, "org.example.foo");
    assert_eq!(entry.dependencies[0].version, "1.3.0");
    assert_eq!(ctx.reporter.count("done org.example.foo"), 1);
}

#[test]
fn test_dependency_cycle_completes() {
    let ctx = TestContext::new();
    let mut a = package("com.example.alpha", "1.0.0");
    a.header.dependencies.push(local_dep("com.example.beta", "b.pak"));
    let mut b = package("com.example.beta", "1.0.0");
    b.header.dependencies.push(local_dep("com.example.alpha", "a.pak"));
    ctx.write("b.pak", &b);
    let path = ctx.write("a.pak", &a);

    ctx.manager.install(&path, &InstallOptions::default()).unwrap();
    assert!(ctx.manager.package_version("com.example.alpha", "1.0.0").is_ok());
    assert!(ctx.manager.package_version("com.example.beta", "1.0.0").is_ok());
}

#[test]
fn test_memo_short_circuits_within_a_run() {
    let ctx = TestContext::new();
    let path = ctx.write("foo.pak", &package("com.example.foo", "1.0.0"));
    let mut run = InstallRun::new();
    let _guard = ctx.manager.lock_store().acquire().unwrap();
    let first = ctx
        .manager
        .install_with(&path, &InstallOptions::default(), &mut run)
        .unwrap();
    let second = ctx
        .manager
        .install_with(&path, &InstallOptions::default(), &mut run)
        .unwrap();
    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(run.installed_count(), 1);
}

#[test]
fn test_static_dependency_fails_even_when_skipping() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.dependencies.push(Dependency {
        name: "libz".to_string(),
        version: Some("2.0".to_string()),
        source_type: DependencySourceType::Static,
        source: None,
    });
    let path = ctx.write("foo.pak", &foo);

    let options = InstallOptions {
        skip_dependencies: true,
        ..InstallOptions::default()
    };
    let err = ctx.manager.install(&path, &options).unwrap_err();
    assert!(matches!(err, InstallError::StaticDependency(ref k) if k == "libz=2.0"));
    assert!(ctx.manager.package("com.example.foo").is_err());
}

#[test]
fn test_skip_dependencies_ignores_missing_dynamic() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.dependencies.push(Dependency::new("com.example.bar", None));
    let path = ctx.write("foo.pak", &foo);

    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::MissingDependency { .. }));

    let options = InstallOptions {
        skip_dependencies: true,
        ..InstallOptions::default()
    };
    ctx.manager.install(&path, &options).unwrap();
    assert!(ctx.manager.package("com.example.bar").is_err());
}

#[test]
fn test_remote_dependency_requires_fetcher() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.dependencies.push(
        Dependency::new("com.example.bar", None).with_source(DependencySourceType::Remote, "acme/bar@github"),
    );
    let path = ctx.write("foo.pak", &foo);
    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::Context { .. }));
}

#[test]
fn test_progress_reaches_total() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.components.push(Component {
        name: "a.txt".to_string(),
        data_type: ComponentDataType::Plain,
        data: b"com.example.alpha".to_vec(),
    });
    foo.execution_units.push(shell_unit("setup", "exit 0"));
    foo.installer = Some(InstallerHooks {
        pre_install: vec!["setup".to_string()],
        post_install: vec!["setup".to_string()],
    });
    let path = ctx.write("foo.pak", &foo);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let steps = ctx.reporter.progress_of("com.example.foo");
    let total = 4 + 1 + 1 + 1 + 1;
    assert_eq!(steps.len(), total as usize);
    assert!(steps.iter().all(|(_, t)| *t == total));
    assert!(steps.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(steps[0].0, 1);
    assert_eq!(steps.last().unwrap().0, total);

    // Hook units are temporary.
    assert_eq!(
        ctx.manager.units().units("com.example.foo", "1.0.0").unwrap(),
        vec!["setup".to_string()]
    );
}

#[test]
fn test_failing_hook_is_a_warning() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.installer = Some(InstallerHooks {
        pre_install: vec!["missing".to_string()],
        post_install: vec![],
    });
    let path = ctx.write("foo.pak", &foo);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();
    assert_eq!(ctx.reporter.count("warning Hook unit 'missing'"), 1);
}

#[test]
fn test_end_process_hook_aborts_install() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    let mut check = shell_unit("check", "exit 0");
    check.policy.exit_handlers = Some(ExitHandlers {
        success: Some(ExitHandle {
            message: Some("unsupported host".to_string()),
            end_process: true,
            exit_code: 3,
            run: None,
        }),
        ..ExitHandlers::default()
    });
    foo.execution_units.push(check);
    foo.installer = Some(InstallerHooks {
        pre_install: vec!["check".to_string()],
        post_install: vec![],
    });
    let path = ctx.write("foo.pak", &foo);

    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::Terminated(3)));
    assert!(ctx.manager.package("com.example.foo").is_err());
}

#[test]
fn test_symlink_requires_main_policy() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.options.create_symlink = true;
    let path = ctx.write("foo.pak", &foo);
    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(err, InstallError::Context { .. }));
}

#[test]
fn test_declared_repositories_are_registered() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.repositories.push(DefinedRemoteSource {
        name: "corp".to_string(),
        kind: RemoteSourceKind::Gitlab,
        host: "git.corp.example".to_string(),
        ssl: true,
    });
    let path = ctx.write("foo.pak", &foo);

    let options = InstallOptions {
        skip_repositories: true,
        ..InstallOptions::default()
    };
    ctx.manager.install(&path, &options).unwrap();
    assert!(ctx.manager.sources().get("corp").unwrap().is_none());

    let reinstall = InstallOptions {
        reinstall: true,
        ..InstallOptions::default()
    };
    ctx.manager.install(&path, &reinstall).unwrap();
    let source = ctx.manager.sources().get("corp").unwrap().unwrap();
    assert_eq!(source.host, "git.corp.example");
}

#[test]
fn test_uninstall_removes_files_units_and_links() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.execution_units.push(shell_unit("main", "exit 0"));
    foo.main_execution_policy = Some("main".to_string());
    foo.header.options.create_symlink = true;
    let path = ctx.write("foo.pak", &foo);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let location = ctx
        .manager
        .package_version("com.example.foo", "1.0.0")
        .unwrap()
        .location;
    assert!(location.exists());

    ctx.manager
        .uninstall_package_version("com.example.foo", "1.0.0")
        .unwrap();

    assert!(!location.exists());
    assert!(ctx.manager.package("com.example.foo").is_err());
    assert!(
        ctx.manager
            .units()
            .units("com.example.foo", "1.0.0")
            .unwrap()
            .is_empty()
    );
    assert!(fs::symlink_metadata(ctx.path().join("bin/foo")).is_err());
    assert_eq!(ctx.reporter.count("removing com.example.foo=1.0.0"), 1);
}

#[test]
fn test_uninstall_all_versions() {
    let ctx = TestContext::new();
    for v in ["1.0.0", "2.0.0"] {
        let path = ctx.write(&format!("foo-{v}.pak"), &package("com.example.foo", v));
        ctx.manager.install(&path, &InstallOptions::default()).unwrap();
    }
    assert_eq!(
        ctx.manager.package("com.example.foo").unwrap().latest_version.as_deref(),
        Some("2.0.0")
    );
    assert_eq!(
        ctx.manager.package_version("com.example.foo", "latest").unwrap().version,
        "2.0.0"
    );

    assert_eq!(ctx.manager.uninstall_package("com.example.foo").unwrap(), 2);
    assert!(ctx.manager.installed_packages().unwrap().is_empty());
    assert!(matches!(
        ctx.manager.uninstall_package("com.example.foo"),
        Err(InstallError::NotFound(_))
    ));
}

#[test]
fn test_empty_tree() {
    let ctx = TestContext::new();
    assert!(ctx.manager.package_tree(None).unwrap().is_empty());
    assert!(matches!(
        ctx.manager.package_tree(Some("ghost")),
        Err(InstallError::NotFound(_))
    ));
}

#[test]
fn test_base64_component_is_decoded() {
    let ctx = TestContext::new();
    let mut foo = package("com.example.foo", "1.0.0");
    foo.components.push(Component {
        name: "bin/tool.sh".to_string(),
        data_type: ComponentDataType::Base64Encoded,
        data: b"ZWNobyBoaQ==\n".to_vec(),
    });
    let path = ctx.write("foo.pak", &foo);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();
    let location = ctx.manager.package_version("com.example.foo", "1.0.0").unwrap().location;
    assert_eq!(
        fs::read_to_string(location.join("source/bin/tool.sh")).unwrap(),
        "echo hi"
    );
}

#[test]
fn test_reinstall_replaces_locked_dependencies() {
    let ctx = TestContext::new();
    ctx.write("b.pak", &package("com.example.beta", "1.0.0"));
    ctx.write("d.pak", &package("com.example.delta", "1.0.0"));
    let mut alpha = package("com.example.alpha", "1.0.0");
    alpha
        .header
        .dependencies
        .push(local_dep("com.example.beta", "b.pak"));
    alpha.header.dependencies.push(
        Dependency::new("com.example.delta", Some("1.0.0"))
            .with_source(DependencySourceType::Local, "d.pak"),
    );
    let path = ctx.write("a.pak", &alpha);
    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let stale: Vec<PathBuf> = ["com.example.beta", "com.example.delta"]
        .iter()
        .map(|name| {
            let location = ctx.manager.package_version(name, "1.0.0").unwrap().location;
            let file = location.join("stale");
            fs::write(&file, b"old").unwrap();
            file
        })
        .collect();

    let options = InstallOptions {
        reinstall: true,
        ..InstallOptions::default()
    };
    ctx.manager.install(&path, &options).unwrap();

    assert_eq!(ctx.reporter.count("removing com.example.beta=1.0.0"), 1);
    assert_eq!(ctx.reporter.count("removing com.example.delta=1.0.0"), 1);
    for file in &stale {
        assert!(!file.exists(), "{} survived the reinstall", file.display());
    }
    let entry = ctx.manager.package_version("com.example.alpha", "1.0.0").unwrap();
    let deps: Vec<(&str, &str)> = entry
        .dependencies
        .iter()
        .map(|d| (d.name.as_str(), d.version.as_str()))
        .collect();
    assert_eq!(
        deps,
        vec![("com.example.beta", "1.0.0"), ("com.example.delta", "1.0.0")]
    );
    assert_eq!(ctx.manager.installed_packages().unwrap().len(), 3);
}

#[test]
fn test_cycle_to_another_version_installs_it() {
    let ctx = TestContext::new();
    ctx.write("a2.pak", &package("com.example.alpha", "2.0.0"));
    let mut beta = package("com.example.beta", "1.0.0");
    beta.header.dependencies.push(
        Dependency::new("com.example.alpha", Some("2.0.0"))
            .with_source(DependencySourceType::Local, "a2.pak"),
    );
    ctx.write("b.pak", &beta);
    let mut alpha = package("com.example.alpha", "1.0.0");
    alpha
        .header
        .dependencies
        .push(local_dep("com.example.beta", "b.pak"));
    let path = ctx.write("a.pak", &alpha);

    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    let entry = ctx.manager.package("com.example.alpha").unwrap();
    assert_eq!(entry.versions(), vec!["1.0.0", "2.0.0"]);
    let beta = ctx.manager.package_version("com.example.beta", "1.0.0").unwrap();
    assert_eq!(beta.dependencies[0].version, "2.0.0");
}

#[test]
fn test_install_remote_fetches_release_package() {
    let mut tool = package("com.example.tool", "1.0.0");
    tool.execution_units.push(shell_unit("main", "exit 0"));
    let transport = Arc::new(ReleaseTransport {
        package: tool.to_bytes().unwrap(),
    });
    let ctx = TestContext::with_transport(transport);

    let outcome = ctx
        .manager
        .install_remote("acme/tool@github", &InstallOptions::default())
        .unwrap();
    assert_eq!(outcome.package, "com.example.tool");
    assert_eq!(outcome.version, "1.0.0");
    assert_eq!(
        ctx.manager.units().units("com.example.tool", "1.0.0").unwrap(),
        vec!["main".to_string()]
    );
    assert!(matches!(
        ctx.manager
            .install_remote("acme/tool@nowhere", &InstallOptions::default()),
        Err(InstallError::Fetch(_))
    ));
}

#[test]
fn test_remote_dependency_is_fetched_and_locked() {
    let transport = Arc::new(ReleaseTransport {
        package: package("com.example.tool", "1.0.0").to_bytes().unwrap(),
    });
    let ctx = TestContext::with_transport(transport);
    let mut foo = package("com.example.foo", "1.0.0");
    foo.header.dependencies.push(
        Dependency::new("com.example.tool", None)
            .with_source(DependencySourceType::Remote, "acme/tool@github"),
    );
    let path = ctx.write("foo.pak", &foo);

    ctx.manager.install(&path, &InstallOptions::default()).unwrap();

    assert!(ctx.manager.package_version("com.example.tool", "1.0.0").is_ok());
    let entry = ctx.manager.package_version("com.example.foo", "1.0.0").unwrap();
    assert_eq!(entry.dependencies[0].name, "com.example.tool");
    assert_eq!(entry.dependencies[0].version, "1.0.0");
    assert_eq!(ctx.reporter.count("info Fetching com.example.tool"), 1);
}

#[test]
fn test_version_cannot_escape_install_root() {
    let ctx = TestContext::new();
    let path = ctx.write(
        "evil.pak",
        &package("com.example.foo", "1/../../../escaped"),
    );
    let err = ctx.manager.install(&path, &InstallOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        InstallError::Package(PackageError::Validation(_))
    ));
    assert!(!ctx.path().join("escaped").exists());
    assert!(ctx.manager.installed_packages().unwrap().is_empty());
}
