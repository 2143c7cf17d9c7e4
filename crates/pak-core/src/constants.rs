//! `%NAME%` placeholder substitution.
//!
//! Install, assembly and date-time constants are compiled into a package's
//! declarations at install time. Runtime constants (`%CWD%`, `%PID%`) are left
//! in place and substituted each time a unit executes.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Local, TimeZone};
use pak_schema::{Assembly, ExecutionPolicy, Package};

use crate::paths::InstallationPaths;

pub type ConstantMap = BTreeMap<String, String>;

pub const INSTALL_PATH: &str = "%INSTALL_PATH%";
pub const INSTALL_PATH_BIN: &str = "%INSTALL_PATH.BIN%";
pub const INSTALL_PATH_SRC: &str = "%INSTALL_PATH.SRC%";
pub const INSTALL_PATH_DATA: &str = "%INSTALL_PATH.DATA%";

pub const CWD: &str = "%CWD%";
pub const PID: &str = "%PID%";

/// Replace every known placeholder in `input`.
pub fn substitute(input: &str, constants: &ConstantMap) -> String {
    if !input.contains('%') {
        return input.to_string();
    }
    constants
        .iter()
        .fold(input.to_string(), |acc, (key, value)| acc.replace(key, value))
}

pub fn install_constants(paths: &InstallationPaths) -> ConstantMap {
    let mut map = ConstantMap::new();
    map.insert(INSTALL_PATH.into(), paths.root.display().to_string());
    map.insert(INSTALL_PATH_BIN.into(), paths.bin.display().to_string());
    map.insert(INSTALL_PATH_SRC.into(), paths.source.display().to_string());
    map.insert(INSTALL_PATH_DATA.into(), paths.data.display().to_string());
    map
}

pub fn assembly_constants(assembly: &Assembly) -> ConstantMap {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    let mut map = ConstantMap::new();
    map.insert("%ASSEMBLY.NAME%".into(), assembly.name.clone());
    map.insert("%ASSEMBLY.PACKAGE%".into(), assembly.package.clone());
    map.insert("%ASSEMBLY.VERSION%".into(), assembly.version.clone());
    map.insert("%ASSEMBLY.DESCRIPTION%".into(), opt(&assembly.description));
    map.insert("%ASSEMBLY.COMPANY%".into(), opt(&assembly.company));
    map.insert("%ASSEMBLY.PRODUCT%".into(), opt(&assembly.product));
    map.insert("%ASSEMBLY.COPYRIGHT%".into(), opt(&assembly.copyright));
    map.insert("%ASSEMBLY.TRADEMARK%".into(), opt(&assembly.trademark));
    map.insert("%ASSEMBLY.UID%".into(), opt(&assembly.uuid));
    map
}

/// Date-time constants named after the classic `date()` format characters.
pub fn datetime_constants<Tz: TimeZone>(now: &DateTime<Tz>) -> ConstantMap
where
    Tz::Offset: std::fmt::Display,
{
    const FORMATS: &[(&str, &str)] = &[
        ("%d%", "%d"),
        ("%D%", "%a"),
        ("%j%", "%-d"),
        ("%l%", "%A"),
        ("%N%", "%u"),
        ("%w%", "%w"),
        ("%W%", "%V"),
        ("%F%", "%B"),
        ("%m%", "%m"),
        ("%M%", "%b"),
        ("%n%", "%-m"),
        ("%Y%", "%Y"),
        ("%y%", "%y"),
        ("%o%", "%G"),
        ("%a%", "%P"),
        ("%A%", "%p"),
        ("%g%", "%-I"),
        ("%G%", "%-H"),
        ("%h%", "%I"),
        ("%H%", "%H"),
        ("%i%", "%M"),
        ("%s%", "%S"),
        ("%c%", "%Y-%m-%dT%H:%M:%S"),
        ("%r%", "%a, %d %b %Y %H:%M:%S"),
    ];
    let mut map: ConstantMap = FORMATS
        .iter()
        .map(|(key, fmt)| ((*key).to_string(), now.format(fmt).to_string()))
        .collect();
    map.insert("%z%".into(), now.ordinal0().to_string());
    map.insert(
        "%L%".into(),
        u8::from(now.date_naive().leap_year()).to_string(),
    );
    map.insert("%u%".into(), now.timestamp().to_string());
    map
}

/// `%CWD%` and `%PID%` for the current process.
pub fn runtime_constants() -> ConstantMap {
    let mut map = ConstantMap::new();
    if let Ok(cwd) = std::env::current_dir() {
        map.insert(CWD.into(), cwd.display().to_string());
    }
    map.insert(PID.into(), std::process::id().to_string());
    map
}

/// Compile install, assembly, date-time and declared constants into `package`.
///
/// Returns the resolved declared constants (written to `constants.json`).
pub fn compile_package_constants(package: &mut Package, paths: &InstallationPaths) -> ConstantMap {
    let mut base = install_constants(paths);
    base.extend(datetime_constants(&Local::now()));

    let assembly = &mut package.assembly;
    for field in [
        &mut assembly.description,
        &mut assembly.company,
        &mut assembly.product,
        &mut assembly.copyright,
        &mut assembly.trademark,
    ]
    .into_iter()
    .flatten()
    {
        *field = substitute(field, &base);
    }
    base.extend(assembly_constants(&package.assembly));

    let declared: ConstantMap = package
        .header
        .runtime_constants
        .iter()
        .map(|(k, v)| (placeholder(k), substitute(v, &base)))
        .collect();
    base.extend(declared.clone());

    for unit in &mut package.execution_units {
        compile_policy(&mut unit.policy, &base);
    }
    declared
}

fn compile_policy(policy: &mut ExecutionPolicy, constants: &ConstantMap) {
    if let Some(message) = &mut policy.message {
        *message = substitute(message, constants);
    }
    let execute = &mut policy.execute;
    execute.working_directory = substitute(&execute.working_directory, constants);
    for option in &mut execute.options {
        *option = substitute(option, constants);
    }
    for value in execute.env.values_mut() {
        *value = substitute(value, constants);
    }
    if let Some(handlers) = &mut policy.exit_handlers {
        for handle in [&mut handlers.success, &mut handlers.warning, &mut handlers.error]
            .into_iter()
            .flatten()
        {
            if let Some(message) = &mut handle.message {
                *message = substitute(message, constants);
            }
        }
    }
}

fn placeholder(key: &str) -> String {
    if key.starts_with('%') && key.ends_with('%') && key.len() > 1 {
        key.to_string()
    } else {
        format!("%{key}%")
    }
}
