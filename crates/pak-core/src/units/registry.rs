use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pak_schema::{ExecutionUnit, ExitHandle, ExitHandlers, Package, package_id, unit_id};
use tracing::{debug, info, warn};

use super::index::{IndexedUnit, UnitIndex};
use super::launcher::write_launcher;
use super::process::{ProcessOutcome, ProcessSpec};
use super::{UnitError, UnitExit, parse_runner};
use crate::codec;
use crate::constants::{runtime_constants, substitute};
use crate::paths::Layout;
use crate::reporter::Reporter;
use crate::runner::RunnerResolver;
use crate::scope::{ScopeResolver, require_system};

/// Deepest follow-up chain a single `execute_unit` call may start.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// What an exit handle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// The handle's exit code did not match the process.
    Skipped,
    /// The handle fired (and ran its follow-up, if any).
    Handled,
    /// The handle asked the whole program to exit with this code.
    Terminate(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TemporaryUnit {
    package: String,
    version: String,
    unit: String,
}

/// Persists, dispatches and supervises execution units.
pub struct UnitRegistry {
    layout: Layout,
    scope: Arc<dyn ScopeResolver>,
    runners: Arc<dyn RunnerResolver>,
    reporter: Arc<dyn Reporter>,
    program: PathBuf,
    temporary: Mutex<Vec<TemporaryUnit>>,
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("layout", &self.layout)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

/// Pick the handles to run after a unit's process terminated.
///
/// The boolean says whether the process is attached, i.e. whether the handle
/// must match the exit code before firing. A successful run with an error
/// handle but no success handle fires the error handle unconditionally; this
/// mirrors the established dispatch rule and is kept deliberately.
pub fn select_exit_handlers(handlers: &ExitHandlers, succeeded: bool) -> Vec<(&ExitHandle, bool)> {
    if succeeded {
        if let Some(success) = &handlers.success {
            return vec![(success, false)];
        }
        if let Some(error) = &handlers.error {
            return vec![(error, false)];
        }
    }
    handlers.iter().map(|h| (h, true)).collect()
}

impl UnitRegistry {
    pub fn new(
        layout: Layout,
        scope: Arc<dyn ScopeResolver>,
        runners: Arc<dyn RunnerResolver>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            layout,
            scope,
            runners,
            reporter,
            program: PathBuf::from("pak"),
            temporary: Mutex::new(Vec::new()),
        }
    }

    /// Program the launchers re-enter (normally the running `pak` binary).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn index_path(&self, package: &str, version: &str) -> PathBuf {
        self.layout.unit_index(&package_id(package, version))
    }

    fn load_index(&self, package: &str, version: &str) -> Result<Option<UnitIndex>, UnitError> {
        let path = self.index_path(package, version);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(codec::read(&path)?))
    }

    /// Path of the launcher for a unit, whether or not it is registered.
    pub fn launcher_path(&self, package: &str, version: &str, unit: &str) -> PathBuf {
        self.layout
            .unit_dir(&package_id(package, version))
            .join(unit_id(unit))
    }

    /// Register `unit` for a package version.
    ///
    /// With `temporary`, an already present script short-circuits and the
    /// unit is remembered for [`Self::clean_temporary_units`].
    pub fn add_unit(
        &self,
        package: &str,
        version: &str,
        unit: &ExecutionUnit,
        temporary: bool,
    ) -> Result<(), UnitError> {
        require_system(self.scope.as_ref(), &format!("add execution unit '{}'", unit.name()))?;

        let runner = parse_runner(&unit.policy.runner)?;
        let dir = self.layout.unit_dir(&package_id(package, version));
        let launcher = dir.join(unit_id(unit.name()));
        let script = PathBuf::from(format!("{}{}", launcher.display(), runner.extension()));

        if temporary && script.exists() {
            debug!("Temporary unit '{}' already present, skipping", unit.name());
            return Ok(());
        }

        fs::create_dir_all(&dir).map_err(|source| UnitError::Write {
            path: dir.clone(),
            source,
        })?;
        fs::write(&script, &unit.data).map_err(|source| UnitError::Write {
            path: script.clone(),
            source,
        })?;
        write_launcher(&launcher, &self.program, package, version, unit.name()).map_err(
            |source| UnitError::Write {
                path: launcher.clone(),
                source,
            },
        )?;

        let mut index = self
            .load_index(package, version)?
            .unwrap_or_else(|| UnitIndex::new(package, version));
        index.upsert(IndexedUnit {
            policy: unit.policy.clone(),
            script,
            launcher,
        });
        codec::write_atomic(&self.index_path(package, version), &index)?;

        if temporary {
            self.temporary_units().push(TemporaryUnit {
                package: package.to_string(),
                version: version.to_string(),
                unit: unit.name().to_string(),
            });
        }
        info!("Registered unit '{}' for {package}={version}", unit.name());
        Ok(())
    }

    /// Deregister a unit. Returns whether it was registered.
    pub fn remove_unit(&self, package: &str, version: &str, name: &str) -> Result<bool, UnitError> {
        require_system(self.scope.as_ref(), &format!("remove execution unit '{name}'"))?;

        let Some(mut index) = self.load_index(package, version)? else {
            return Ok(false);
        };
        let Some(removed) = index.remove(name) else {
            return Ok(false);
        };

        if index.is_empty() {
            let id = package_id(package, version);
            remove_path(&self.layout.unit_index(&id))?;
            remove_path(&self.layout.unit_dir(&id))?;
        } else {
            remove_path(&removed.script)?;
            remove_path(&removed.launcher)?;
            codec::write_atomic(&self.index_path(package, version), &index)?;
        }
        info!("Removed unit '{name}' from {package}={version}");
        Ok(true)
    }

    /// Names of the units registered for a package version; empty if none.
    pub fn units(&self, package: &str, version: &str) -> Result<Vec<String>, UnitError> {
        Ok(self
            .load_index(package, version)?
            .map(|i| i.names())
            .unwrap_or_default())
    }

    /// Run a registered unit with `args` appended to its declared options.
    pub fn execute_unit(
        &self,
        package: &str,
        version: &str,
        name: &str,
        args: &[String],
    ) -> Result<UnitExit, UnitError> {
        self.execute_at_depth(package, version, name, args, 0)
    }

    fn execute_at_depth(
        &self,
        package: &str,
        version: &str,
        name: &str,
        args: &[String],
        depth: usize,
    ) -> Result<UnitExit, UnitError> {
        if depth >= MAX_CHAIN_DEPTH {
            return Err(UnitError::ChainTooDeep {
                name: name.to_string(),
                depth: MAX_CHAIN_DEPTH,
            });
        }
        let index = self
            .load_index(package, version)?
            .ok_or_else(|| UnitError::NoUnits {
                package: package.to_string(),
                version: version.to_string(),
            })?;
        let unit = index.get(name).ok_or_else(|| UnitError::UnitNotFound {
            name: name.to_string(),
            package: package.to_string(),
            version: version.to_string(),
        })?;
        let policy = &unit.policy;
        let runner = parse_runner(&policy.runner)?;
        let interpreter = self
            .runners
            .resolve(runner)
            .ok_or(UnitError::RunnerUnavailable(runner))?;

        let constants = runtime_constants();
        let merged_args: Vec<String> = policy
            .execute
            .options
            .iter()
            .map(|o| substitute(o, &constants))
            .chain(args.iter().cloned())
            .collect();
        let working_directory = Some(substitute(&policy.execute.working_directory, &constants))
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        if let Some(message) = &policy.message {
            self.reporter.info(message);
        }

        let spec = ProcessSpec {
            interpreter: &interpreter,
            script: &unit.script,
            args: merged_args,
            working_directory,
            env: &policy.execute.env,
            silent: policy.execute.silent,
            tty: policy.execute.tty,
            timeout: policy.execute.timeout.map(Duration::from_secs),
        };
        info!("Executing unit '{name}' of {package}={version}");

        let (outcome, failed_to_finish) = match spec.run() {
            Ok(outcome) if outcome.timed_out => {
                warn!("Unit '{name}' timed out");
                (outcome, true)
            }
            Ok(outcome) => (outcome, false),
            Err(e) => {
                warn!("Unit '{name}' failed to run: {e}");
                let outcome = ProcessOutcome {
                    code: None,
                    timed_out: false,
                };
                (outcome, true)
            }
        };

        let mut exit = UnitExit {
            code: outcome.code,
            terminate: None,
        };
        let Some(handlers) = &policy.exit_handlers else {
            debug!("Unit '{name}' exited with {:?}", exit.code);
            return Ok(exit);
        };

        // A run that never produced an exit status fires the error handle
        // without a process before the regular pass.
        if failed_to_finish {
            if let Some(error) = &handlers.error {
                if let ExitAction::Terminate(code) =
                    self.handle_exit_at_depth(package, version, error, None, depth)?
                {
                    exit.terminate = Some(code);
                    return Ok(exit);
                }
            }
        }

        for (handle, attached) in select_exit_handlers(handlers, outcome.success()) {
            let process = attached.then_some(&outcome);
            if let ExitAction::Terminate(code) =
                self.handle_exit_at_depth(package, version, handle, process, depth)?
            {
                exit.terminate = Some(code);
                break;
            }
        }
        debug!("Unit '{name}' exited with {:?}", exit.code);
        Ok(exit)
    }

    /// Apply one exit handle.
    ///
    /// With a process attached and no end-process flag, the handle only fires
    /// when its exit code matches the process's.
    pub fn handle_exit(
        &self,
        package: &str,
        version: &str,
        handle: &ExitHandle,
        process: Option<&ProcessOutcome>,
    ) -> Result<ExitAction, UnitError> {
        self.handle_exit_at_depth(package, version, handle, process, 0)
    }

    fn handle_exit_at_depth(
        &self,
        package: &str,
        version: &str,
        handle: &ExitHandle,
        process: Option<&ProcessOutcome>,
        depth: usize,
    ) -> Result<ExitAction, UnitError> {
        if let Some(message) = &handle.message {
            self.reporter.info(message);
        }
        if handle.end_process {
            return Ok(ExitAction::Terminate(handle.exit_code));
        }
        if let Some(p) = process {
            if p.code != Some(handle.exit_code) {
                return Ok(ExitAction::Skipped);
            }
        }
        if let Some(next) = &handle.run {
            let exit = self.execute_at_depth(package, version, next, &[], depth + 1)?;
            if let Some(code) = exit.terminate {
                return Ok(ExitAction::Terminate(code));
            }
        }
        Ok(ExitAction::Handled)
    }

    /// Register `name` and every unit its exit handlers reach as temporary
    /// units, run it, then release them on every exit path.
    pub fn temporary_execute(&self, package: &Package, name: &str) -> Result<UnitExit, UnitError> {
        let pkg = package.assembly.package.as_str();
        let version = package.assembly.version.as_str();
        let guard = TemporaryScope { registry: self };

        let mut pending = vec![name.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let unit = package
                .execution_unit(&current)
                .ok_or_else(|| UnitError::UnitNotFound {
                    name: current.clone(),
                    package: pkg.to_string(),
                    version: version.to_string(),
                })?;
            self.add_unit(pkg, version, unit, true)?;
            pending.extend(unit.policy.follow_up_units().into_iter().map(str::to_string));
        }

        let result = self.execute_unit(pkg, version, name, &[]);
        drop(guard);
        result
    }

    /// Deregister every temporary unit added through this registry.
    pub fn clean_temporary_units(&self) {
        let units = std::mem::take(&mut *self.temporary_units());
        for t in units {
            if let Err(e) = self.remove_unit(&t.package, &t.version, &t.unit) {
                warn!("Failed to remove temporary unit '{}': {e}", t.unit);
            }
        }
    }

    fn temporary_units(&self) -> std::sync::MutexGuard<'_, Vec<TemporaryUnit>> {
        self.temporary.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UnitRegistry {
    fn drop(&mut self) {
        self.clean_temporary_units();
    }
}

/// Releases temporary units when the owning scope ends.
struct TemporaryScope<'a> {
    registry: &'a UnitRegistry,
}

impl Drop for TemporaryScope<'_> {
    fn drop(&mut self) {
        self.registry.clean_temporary_units();
    }
}

fn remove_path(path: &Path) -> Result<(), UnitError> {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
