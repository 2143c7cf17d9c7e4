use std::fs;
use std::path::Path;

/// Shell launcher that re-enters `pak exec` with the unit bound.
pub fn launcher_script(program: &Path, package: &str, version: &str, unit: &str) -> String {
    format!(
        "#!/bin/sh\nexec {} exec --package {} --version {} --unit {} -- \"$@\"\n",
        sh_quote(&program.to_string_lossy()),
        sh_quote(package),
        sh_quote(version),
        sh_quote(unit),
    )
}

pub(crate) fn write_launcher(
    path: &Path,
    program: &Path,
    package: &str,
    version: &str,
    unit: &str,
) -> std::io::Result<()> {
    fs::write(path, launcher_script(program, package, version, unit))?;
    make_executable(path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_: &Path) -> std::io::Result<()> {
    Ok(())
}

fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
