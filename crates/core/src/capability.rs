use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const MODULE_REGISTRY: &str = "/proc/modules";
const SYSFS_MODULE_DIR: &str = "/sys/module";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    CommandOnPath,
    ReadableFile,
    LoadedModule,
}

/// A binary presence fact about the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Capability {
    pub name: String,
    pub kind: CapabilityKind,
    pub locator: String,
}

impl Capability {
    pub fn command(program: &str) -> Self {
        Self {
            name: program.to_string(),
            kind: CapabilityKind::CommandOnPath,
            locator: program.to_string(),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        let locator = path.as_ref().to_string_lossy().to_string();
        Self {
            name: locator.clone(),
            kind: CapabilityKind::ReadableFile,
            locator,
        }
    }

    pub fn module(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CapabilityKind::LoadedModule,
            locator: name.to_string(),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            CapabilityKind::CommandOnPath => "command",
            CapabilityKind::ReadableFile => "file",
            CapabilityKind::LoadedModule => "module",
        }
    }
}

/// Answers whether a capability is present right now.
///
/// Implementations must never fail: absence is a `false` answer, not an
/// error. Answers are not cached because probes earlier in a run may change
/// the environment.
pub trait AvailabilityChecker {
    fn is_available(&self, capability: &Capability) -> bool;
}

/// Checks capabilities against the live system.
#[derive(Debug, Clone)]
pub struct SystemChecker {
    search_path: Option<OsString>,
    module_registry: PathBuf,
    sysfs_module_dir: PathBuf,
}

impl Default for SystemChecker {
    fn default() -> Self {
        Self {
            search_path: None,
            module_registry: PathBuf::from(MODULE_REGISTRY),
            sysfs_module_dir: PathBuf::from(SYSFS_MODULE_DIR),
        }
    }
}

impl SystemChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve commands against `paths` instead of the process `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn with_module_roots(
        mut self,
        registry: impl Into<PathBuf>,
        sysfs_module_dir: impl Into<PathBuf>,
    ) -> Self {
        self.module_registry = registry.into();
        self.sysfs_module_dir = sysfs_module_dir.into();
        self
    }

    fn command_on_path(&self, program: &str) -> bool {
        if program.is_empty() {
            return false;
        }
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
                which::which_in(program, Some(paths), cwd).is_ok()
            }
            None => which::which(program).is_ok(),
        }
    }

    fn module_loaded(&self, name: &str) -> bool {
        let wanted = normalize_module_name(name);
        if wanted.is_empty() {
            return false;
        }
        match fs::read_to_string(&self.module_registry) {
            Ok(registry) => registry
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .any(|loaded| normalize_module_name(loaded) == wanted),
            // No registry file (containers, non-Linux): fall back to sysfs.
            Err(_) => self.sysfs_module_dir.join(&wanted).is_dir(),
        }
    }
}

impl AvailabilityChecker for SystemChecker {
    fn is_available(&self, capability: &Capability) -> bool {
        match capability.kind {
            CapabilityKind::CommandOnPath => self.command_on_path(&capability.locator),
            CapabilityKind::ReadableFile => is_readable_file(Path::new(&capability.locator)),
            CapabilityKind::LoadedModule => self.module_loaded(&capability.locator),
        }
    }
}

// Device nodes count as files here; directories do not. The path is never
// opened: a FIFO would block and a V4L2 node would power up its sensor.
fn is_readable_file(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) if !metadata.is_dir() => read_permitted(path),
        _ => false,
    }
}

#[cfg(unix)]
fn read_permitted(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    access(path, AccessFlags::R_OK).is_ok()
}

#[cfg(not(unix))]
fn read_permitted(_path: &Path) -> bool {
    true
}

fn normalize_module_name(name: &str) -> String {
    name.trim().replace('-', "_")
}
