//! Lazily resolved host system facts
//!
//! Each fact is computed on first access, cached for the lifetime of the
//! provider and resolved independently of the others. Nothing here returns an
//! error or lets a panic escape: failed queries degrade to sentinel strings or
//! zero and are logged.

mod probe;

pub use probe::{CommandOutput, DEFAULT_COMMAND_TIMEOUT, HostProbe, LocalHost, OsFamily};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

/// OS name could not be determined
pub const UNKNOWN_OS: &str = "Unknown OS";
/// OS version could not be determined
pub const UNKNOWN_OS_VERSION: &str = "Unknown Version";
/// Windows processor queries returned nothing usable
pub const UNKNOWN_WINDOWS_CPU: &str = "Unknown Windows CPU";
/// macOS processor query returned nothing usable
pub const UNKNOWN_MAC_CPU: &str = "Unknown Mac CPU";
/// Linux processor query returned nothing usable
pub const UNKNOWN_LINUX_CPU: &str = "Unknown Linux CPU";
/// No processor query exists for this OS family
pub const UNSUPPORTED_OS_CPU: &str = "Unsupported OS for CPU Info";
/// Processor query panicked
pub const ERROR_FETCHING_CPU: &str = "Error Fetching CPU";

const BYTES_PER_MB: u64 = 1024 * 1024;
const KB_PER_MB: u64 = 1024;

/// Resolved values of all system facts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFacts {
    /// "<os name> <os version>"
    pub os_name_and_version: String,
    /// CPU model name or a sentinel
    pub processor_name: String,
    /// Physical memory in MB, 0 when unknown
    pub total_physical_ram_mb: u64,
    /// Process heap ceiling in MB, 0 when unknown
    pub max_heap_mb: u64,
}

/// Memoizing provider of host facts
pub struct SystemFactProvider {
    probe: Box<dyn HostProbe>,
    os_name_and_version: OnceLock<String>,
    processor_name: OnceLock<String>,
    total_physical_ram_mb: OnceLock<u64>,
    max_heap_mb: OnceLock<u64>,
}

impl std::fmt::Debug for SystemFactProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemFactProvider")
            .field("os_name_and_version", &self.os_name_and_version.get())
            .field("processor_name", &self.processor_name.get())
            .field("total_physical_ram_mb", &self.total_physical_ram_mb.get())
            .field("max_heap_mb", &self.max_heap_mb.get())
            .finish_non_exhaustive()
    }
}

impl SystemFactProvider {
    /// Provider backed by a custom probe
    pub fn new(probe: impl HostProbe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            os_name_and_version: OnceLock::new(),
            processor_name: OnceLock::new(),
            total_physical_ram_mb: OnceLock::new(),
            max_heap_mb: OnceLock::new(),
        }
    }

    /// Provider querying the local machine
    pub fn local() -> Self {
        Self::new(LocalHost::default())
    }

    /// "<os name> <os version>"
    pub fn os_name_and_version(&self) -> &str {
        self.os_name_and_version.get_or_init(|| {
            guarded("os_name_and_version", || {
                format!(
                    "{} {}",
                    non_blank(self.probe.os_name()).unwrap_or_else(|| UNKNOWN_OS.to_string()),
                    non_blank(self.probe.os_version())
                        .unwrap_or_else(|| UNKNOWN_OS_VERSION.to_string()),
                )
            })
            .unwrap_or_else(|| format!("{UNKNOWN_OS} {UNKNOWN_OS_VERSION}"))
        })
    }

    /// CPU model name
    pub fn processor_name(&self) -> &str {
        self.processor_name.get_or_init(|| {
            guarded("processor_name", || self.resolve_processor_name())
                .unwrap_or_else(|| ERROR_FETCHING_CPU.to_string())
        })
    }

    /// Physical memory in MB, 0 when unknown
    pub fn total_physical_ram_mb(&self) -> u64 {
        *self.total_physical_ram_mb.get_or_init(|| {
            guarded("total_physical_ram_mb", || self.resolve_total_ram_mb()).unwrap_or(0)
        })
    }

    /// Process heap ceiling in MB, 0 when unknown
    pub fn max_heap_mb(&self) -> u64 {
        *self.max_heap_mb.get_or_init(|| {
            guarded("max_heap_mb", || {
                self.probe.max_heap_bytes().map_or(0, |bytes| bytes / BYTES_PER_MB)
            })
            .unwrap_or(0)
        })
    }

    /// Resolve (or reuse) every fact
    pub fn snapshot(&self) -> SystemFacts {
        SystemFacts {
            os_name_and_version: self.os_name_and_version().to_string(),
            processor_name: self.processor_name().to_string(),
            total_physical_ram_mb: self.total_physical_ram_mb(),
            max_heap_mb: self.max_heap_mb(),
        }
    }

    fn resolve_processor_name(&self) -> String {
        let family = self.probe.os_family();
        tracing::debug!(?family, "Fetching processor name");

        let name = match family {
            OsFamily::Windows => non_blank(self.probe.env_var("PROCESSOR_IDENTIFIER"))
                .or_else(|| {
                    self.query("wmic", &["cpu", "get", "name"])
                        .and_then(|out| first_value_line(&out))
                }),
            OsFamily::MacOs => self.query("sysctl", &["-n", "machdep.cpu.brand_string"]),
            OsFamily::Linux => self
                .query("cat", &["/proc/cpuinfo"])
                .and_then(|out| parse_cpuinfo_model(&out)),
            OsFamily::Other => return UNSUPPORTED_OS_CPU.to_string(),
        };

        name.unwrap_or_else(|| {
            let sentinel = match family {
                OsFamily::Windows => UNKNOWN_WINDOWS_CPU,
                OsFamily::MacOs => UNKNOWN_MAC_CPU,
                OsFamily::Linux => UNKNOWN_LINUX_CPU,
                OsFamily::Other => UNSUPPORTED_OS_CPU,
            };
            tracing::warn!(?family, sentinel, "Processor name unavailable");
            sentinel.to_string()
        })
    }

    fn resolve_total_ram_mb(&self) -> u64 {
        if let Some(bytes) = self.probe.total_memory_bytes().filter(|b| *b > 0) {
            return bytes / BYTES_PER_MB;
        }

        let family = self.probe.os_family();
        tracing::debug!(?family, "Direct memory query failed, trying OS command");

        let mb = match family {
            OsFamily::Windows => self
                .query("wmic", &["ComputerSystem", "get", "TotalPhysicalMemory"])
                .and_then(|out| first_value_line(&out))
                .and_then(|line| line.parse::<u64>().ok())
                .map(|bytes| bytes / BYTES_PER_MB),
            OsFamily::MacOs => self
                .query("sysctl", &["hw.memsize"])
                .and_then(|out| parse_sysctl_value(&out))
                .map(|bytes| bytes / BYTES_PER_MB),
            OsFamily::Linux => self
                .query("cat", &["/proc/meminfo"])
                .and_then(|out| parse_meminfo_total_kb(&out))
                .map(|kb| kb / KB_PER_MB),
            OsFamily::Other => None,
        };

        mb.unwrap_or_else(|| {
            tracing::warn!(?family, "Total physical RAM unavailable");
            0
        })
    }

    /// Trimmed stdout of a successful, non-empty command run
    fn query(&self, program: &str, args: &[&str]) -> Option<String> {
        match self.probe.run_command(program, args) {
            Ok(output) if output.success => {
                let stdout = output.stdout.trim();
                if stdout.is_empty() {
                    tracing::warn!(command = %probe::command_line(program, args), "Command produced no output");
                    None
                } else {
                    Some(stdout.to_string())
                }
            }
            Ok(_) => {
                tracing::warn!(command = %probe::command_line(program, args), "Command exited with failure");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "System query failed");
                None
            }
        }
    }
}

/// Run a fact resolver, turning a panic into `None`
fn guarded<T>(fact: &'static str, resolve: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(resolve)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(fact, panic = panic_message(payload.as_ref()), "Error fetching system fact");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First non-empty line after a column header (wmic table output)
fn first_value_line(output: &str) -> Option<String> {
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// `model name : <cpu>` from /proc/cpuinfo
fn parse_cpuinfo_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|line| line.trim_start().starts_with("model name"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, model)| model.trim().to_string())
        .filter(|model| !model.is_empty())
}

/// `MemTotal: <n> kB` from /proc/meminfo
fn parse_meminfo_total_kb(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

/// `<key>: <number>` sysctl output
fn parse_sysctl_value(output: &str) -> Option<u64> {
    let value = output.split_once(':').map_or(output, |(_, v)| v);
    value.trim().parse().ok()
}
