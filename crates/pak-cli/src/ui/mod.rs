//! Terminal output
//!
//! [`TermReporter`] renders core progress events; [`table`] and [`tree`]
//! format query results.

pub mod table;
pub mod tree;

use std::io::Write;

use crossterm::style::Stylize;
use pak_core::Reporter;
use pak_schema::{PackageName, Version};

/// Writes core events to the terminal. Status lines go to stdout, warnings
/// and errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermReporter {
    quiet: bool,
}

impl TermReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

/// `name version  [###---]  3/6`
pub fn progress_line(name: &str, version: &str, current: u64, total: u64) -> String {
    const WIDTH: u64 = 20;
    let filled = if total == 0 {
        WIDTH
    } else {
        (current.min(total) * WIDTH) / total
    };
    let bar: String = (0..WIDTH)
        .map(|i| if i < filled { '#' } else { '-' })
        .collect();
    format!("  {name} {version}  [{bar}] {current:>3}/{total}")
}

impl Reporter for TermReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            println!();
            println!("  {}", title.bold());
        }
    }

    fn installing(&self, name: &PackageName, version: &Version, current: u64, total: u64) {
        if self.quiet {
            return;
        }
        let line = progress_line(name.as_str(), version.as_str(), current, total);
        let mut out = std::io::stdout();
        let _ = write!(out, "\r{}", line.dark_grey());
        if current >= total {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    fn removing(&self, name: &PackageName, version: &Version) {
        if !self.quiet {
            println!("  {} {} {}", "removing".yellow(), name, version.as_str().dark_grey());
        }
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        if !self.quiet {
            println!("  {} {} {}", detail.green(), name, version.as_str().dark_grey());
        }
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        eprintln!("  {} {}={} {}", "failed".red().bold(), name, version, reason);
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning".yellow());
    }

    fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "error".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        let line = progress_line("foo", "1.0", 3, 6);
        assert!(line.contains("[##########----------]"));
        assert!(line.ends_with("  3/6"));
        assert!(progress_line("foo", "1.0", 0, 0).contains("[####################]"));
    }
}
