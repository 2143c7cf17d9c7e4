//! Tables for `pak list` and `pak source list`.

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use pak_core::sources::is_builtin;
use pak_schema::{DefinedRemoteSource, PackageEntry};

fn base_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h)));
    table
}

pub fn packages_table(packages: &[PackageEntry]) -> Table {
    let mut table = base_table(&["name", "latest", "versions", "units"]);
    for package in packages {
        let units = package
            .latest_version
            .as_deref()
            .and_then(|v| package.versions.get(v))
            .map_or(0, |v| v.execution_units.len());
        table.add_row(vec![
            Cell::new(&package.name),
            Cell::new(package.latest_version.as_deref().unwrap_or("-")),
            Cell::new(package.versions().join(", ")),
            Cell::new(units).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn sources_table(sources: &[DefinedRemoteSource]) -> Table {
    let mut table = base_table(&["name", "kind", "url", ""]);
    for source in sources {
        let origin = if is_builtin(&source.name) { "built-in" } else { "" };
        table.add_row(vec![
            Cell::new(&source.name),
            Cell::new(source.kind),
            Cell::new(source.base_url()),
            Cell::new(origin),
        ]);
    }
    table
}
