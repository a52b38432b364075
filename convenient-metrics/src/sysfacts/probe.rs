//! Host queries backing the system fact provider

use crate::error::{MetricsError, Result};
use std::io::{ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use sysinfo::System;
use wait_timeout::ChildExt;

/// Default budget for a single external query.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Operating system family, used to pick query strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    /// Microsoft Windows
    Windows,
    /// macOS / Darwin
    MacOs,
    /// Linux
    Linux,
    /// Anything else; processor name is reported as unsupported
    Other,
}

impl OsFamily {
    /// Family of the running process
    pub fn current() -> Self {
        Self::from_os_name(std::env::consts::OS)
    }

    /// Map an OS name (`std::env::consts::OS` style or a marketing name) to its family
    pub fn from_os_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("windows") {
            OsFamily::Windows
        } else if name.starts_with("mac") || name.starts_with("darwin") {
            OsFamily::MacOs
        } else if name.starts_with("linux") {
            OsFamily::Linux
        } else {
            OsFamily::Other
        }
    }
}

/// Captured result of an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exited with status 0
    pub success: bool,
    /// Standard output, lossily decoded
    pub stdout: String,
}

/// Source of raw host information.
///
/// Every method may fail or return nothing; the provider turns that into
/// sentinels. Tests substitute fakes to simulate failing hosts.
pub trait HostProbe: Send + Sync {
    /// Family of the host OS
    fn os_family(&self) -> OsFamily;

    /// OS name (e.g. "Linux", "Windows", "Darwin")
    fn os_name(&self) -> Option<String>;

    /// OS version string
    fn os_version(&self) -> Option<String>;

    /// Environment variable lookup
    fn env_var(&self, key: &str) -> Option<String>;

    /// Physical memory as reported by direct OS introspection
    fn total_memory_bytes(&self) -> Option<u64>;

    /// Largest heap the current process may allocate
    fn max_heap_bytes(&self) -> Option<u64>;

    /// Run an external command to completion and capture its stdout
    fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Probe querying the machine this process runs on
#[derive(Debug, Clone)]
pub struct LocalHost {
    command_timeout: Duration,
}

impl LocalHost {
    /// Local probe with a per-command time budget
    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    fn physical_memory_bytes() -> Option<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        Some(sys.total_memory()).filter(|bytes| *bytes > 0)
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl HostProbe for LocalHost {
    fn os_family(&self) -> OsFamily {
        OsFamily::current()
    }

    fn os_name(&self) -> Option<String> {
        System::name()
    }

    fn os_version(&self) -> Option<String> {
        System::os_version().or_else(System::kernel_version)
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn total_memory_bytes(&self) -> Option<u64> {
        Self::physical_memory_bytes()
    }

    fn max_heap_bytes(&self) -> Option<u64> {
        // Without a resource limit the heap can grow into all physical memory
        resource_limit_bytes().or_else(Self::physical_memory_bytes)
    }

    fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let command = command_line(program, args);
        let started = Instant::now();

        let mut cmd = Command::new(program);
        let _ = cmd
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout also takes down grandchildren
            let _ = cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| io_failure(&command, e))?;

        // Drain stdout on its own thread so a chatty child cannot block on a
        // full pipe. The handle is never joined: a grandchild holding the pipe
        // open must not outlive the budget.
        let stdout = child.stdout.take();
        let (tx, rx) = mpsc::channel();
        let _reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let result = match stdout {
                Some(mut stdout) => stdout.read_to_end(&mut buf).map(|_| buf),
                None => Ok(buf),
            };
            let _ = tx.send(result);
        });

        let timed_out = || MetricsError::CommandTimeout {
            command: command.clone(),
            timeout: self.command_timeout,
        };

        let status = match child.wait_timeout(self.command_timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                terminate(&mut child);
                return Err(timed_out());
            }
            Err(e) => {
                terminate(&mut child);
                return Err(io_failure(&command, e));
            }
        };

        let remaining = self.command_timeout.saturating_sub(started.elapsed());
        let stdout = match rx.recv_timeout(remaining) {
            Ok(read) => read.map_err(|e| io_failure(&command, e))?,
            Err(RecvTimeoutError::Timeout) => {
                // Child exited but something it started still holds stdout
                kill_process_group(&child);
                return Err(timed_out());
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(io_failure(
                    &command,
                    std::io::Error::other("stdout reader panicked"),
                ));
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
        })
    }
}

/// Map an I/O failure while running `command` to its error
fn io_failure(command: &str, source: std::io::Error) -> MetricsError {
    if source.kind() == ErrorKind::Interrupted {
        MetricsError::CommandInterrupted {
            command: command.to_string(),
        }
    } else {
        MetricsError::CommandSpawn {
            command: command.to_string(),
            source,
        }
    }
}

/// Kill a child that overran its budget, with its process group, and reap it
fn terminate(child: &mut Child) {
    kill_process_group(child);
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Ok(pgid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Render a command for log messages
pub(crate) fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Smallest finite address-space or data-segment soft limit
#[cfg(unix)]
fn resource_limit_bytes() -> Option<u64> {
    use nix::sys::resource::{RLIM_INFINITY, Resource, getrlimit};

    #[cfg(any(target_os = "linux", target_os = "android"))]
    let resources = [Resource::RLIMIT_AS, Resource::RLIMIT_DATA];
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let resources = [Resource::RLIMIT_DATA];

    resources
        .into_iter()
        .filter_map(|resource| getrlimit(resource).ok())
        .map(|(soft, _hard)| soft)
        .filter(|soft| *soft != RLIM_INFINITY && *soft > 0)
        .filter_map(|soft| u64::try_from(soft).ok())
        .min()
}

#[cfg(not(unix))]
fn resource_limit_bytes() -> Option<u64> {
    None
}
