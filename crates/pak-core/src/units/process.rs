use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// How to spawn one interpreter process.
#[derive(Debug, Clone)]
pub struct ProcessSpec<'a> {
    pub interpreter: &'a Path,
    pub script: &'a Path,
    pub args: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub env: &'a BTreeMap<String, String>,
    pub silent: bool,
    pub tty: bool,
    pub timeout: Option<Duration>,
}

/// How a spawned interpreter terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was killed by a signal or the timeout.
    pub code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl ProcessSpec<'_> {
    /// Spawn and wait, killing the child if the timeout elapses.
    pub fn run(&self) -> std::io::Result<ProcessOutcome> {
        let mut cmd = Command::new(self.interpreter);
        cmd.arg(self.script).args(&self.args).envs(self.env);
        if let Some(dir) = &self.working_directory {
            cmd.current_dir(dir);
        }

        let tty = self.tty && !self.silent && std::io::stdin().is_terminal();
        if self.tty && !self.silent && !tty {
            warn!("TTY requested but stdin is not a terminal, disabling TTY");
        }
        if self.silent {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        } else if tty {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }

        debug!(
            "Spawning {} {} ({} args)",
            self.interpreter.display(),
            self.script.display(),
            self.args.len()
        );
        let mut child = cmd.spawn()?;

        let Some(timeout) = self.timeout else {
            let status = child.wait()?;
            return Ok(ProcessOutcome {
                code: status.code(),
                timed_out: false,
            });
        };

        if let Some(status) = child.wait_timeout(timeout)? {
            return Ok(ProcessOutcome {
                code: status.code(),
                timed_out: false,
            });
        }
        warn!(
            "{} exceeded its timeout of {}s, killing",
            self.script.display(),
            timeout.as_secs()
        );
        child.kill()?;
        child.wait()?;
        Ok(ProcessOutcome {
            code: None,
            timed_out: true,
        })
    }
}
