//! App slots.
//!
//! An app is a folder (`main.wasm` plus data files) or a packaged archive
//! extracted on first use. The slot tracks which runtime currently drives
//! the app: its WebAssembly module, a connected debugger standing in for
//! it, or nothing when the module is missing or faulted.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::package::MAIN_MODULE;
use crate::runtime::GuestRuntime;
use crate::storage::AppStorage;

/// Lines kept in an app's log ring.
pub const LOG_LINES: usize = 200;

/// Text drawn in the region of an app that cannot run.
pub const MISSING_MODULE_TEXT: &str = "Error: 'Main.wasm' is missing or corrupted";

/// Last lines an app logged, mirrored to `tracing`.
#[derive(Debug, Default)]
pub struct LogRing {
    lines: VecDeque<String>,
}

impl LogRing {
    pub fn push(&mut self, app: &str, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(app, "{line}");
        if self.lines.len() == LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Everything the dispatcher touches on behalf of one app.
pub struct AppState {
    pub name: String,
    pub dir: PathBuf,
    /// `None` when the database could not be opened; storage opcodes fail.
    pub storage: Option<AppStorage>,
    pub log: LogRing,
    /// The app asked the host to end the session.
    pub session_end: bool,
}

impl AppState {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, storage: Option<AppStorage>) -> Self {
        Self { name: name.into(), dir: dir.into(), storage, log: LogRing::default(), session_end: false }
    }

    /// Open the app's database at `db`, logging a failure.
    pub fn open(name: &str, dir: &Path, db: &Path) -> Self {
        let storage = match AppStorage::open(db) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(app = name, "storage unavailable: {e:#}");
                None
            }
        };
        Self::new(name, dir, storage)
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.log.push(&self.name, line);
    }

    pub fn begin_frame(&mut self) {
        if let Some(s) = &mut self.storage {
            s.begin_frame();
        }
    }

    /// A file of the app folder. `None` for paths leaving the folder.
    pub fn resolve(&self, rel: &str) -> Option<PathBuf> {
        let p = Path::new(rel);
        if p.components().any(|c| !matches!(c, std::path::Component::Normal(_) | std::path::Component::CurDir)) {
            return None;
        }
        Some(self.dir.join(p))
    }
}

/// Why an app is not running.
#[derive(Debug, Clone, PartialEq)]
pub enum AppStatus {
    Running,
    /// The guest trapped; reload once the module changes.
    Faulted { mtime: Option<SystemTime>, error: String },
    /// The transport broke or the module could not be loaded.
    Dead(String),
}

/// One hosted app.
pub struct AppSlot {
    pub name: String,
    pub dir: PathBuf,
    pub status: AppStatus,
    runtime: Option<Box<dyn GuestRuntime>>,
    /// WebAssembly runtime parked while a debugger drives the app.
    parked: Option<Box<dyn GuestRuntime>>,
}

impl AppSlot {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), dir: dir.into(), status: AppStatus::Dead("not loaded".into()), runtime: None, parked: None }
    }

    pub fn module_path(&self) -> PathBuf {
        self.dir.join(MAIN_MODULE)
    }

    pub fn module_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(self.module_path()).and_then(|m| m.modified()).ok()
    }

    pub fn runtime_mut(&mut self) -> Option<&mut (dyn GuestRuntime + 'static)> {
        self.runtime.as_deref_mut()
    }

    pub fn is_debugged(&self) -> bool {
        self.runtime.as_deref().is_some_and(|rt| rt.kind() == "debug")
    }

    pub fn set_runtime(&mut self, runtime: Box<dyn GuestRuntime>) {
        self.runtime = Some(runtime);
        self.status = AppStatus::Running;
    }

    /// Let a debugger drive the app, parking the current runtime.
    pub fn attach_debugger(&mut self, debugger: Box<dyn GuestRuntime>) {
        if let Some(mut old) = self.runtime.take() {
            if self.parked.is_none() && old.kind() != "debug" {
                self.parked = Some(old);
            } else {
                old.shutdown();
            }
        }
        tracing::info!(app = %self.name, "debugger attached");
        self.set_runtime(debugger);
    }

    /// Debugger gone: restore the parked runtime if any.
    pub fn detach_debugger(&mut self) {
        if let Some(mut rt) = self.runtime.take() {
            rt.shutdown();
        }
        match self.parked.take() {
            Some(rt) => self.set_runtime(rt),
            None => self.status = AppStatus::Dead("debugger disconnected".into()),
        }
        tracing::info!(app = %self.name, "debugger detached");
    }

    /// Mark the guest faulted after a trap.
    pub fn fault(&mut self, error: String) {
        tracing::warn!(app = %self.name, "guest fault: {error}");
        if let Some(rt) = self.runtime.as_deref_mut() {
            rt.state().log(format!("fault: {error}"));
        }
        self.runtime = None;
        self.status = AppStatus::Faulted { mtime: self.module_mtime(), error };
    }

    /// Mark the app dead after a transport error.
    pub fn kill(&mut self, error: String) {
        tracing::error!(app = %self.name, "app dead: {error}");
        if let Some(mut rt) = self.runtime.take() {
            rt.shutdown();
        }
        self.status = AppStatus::Dead(error);
    }

    /// A faulted app whose module changed since the fault.
    pub fn wants_reload(&self) -> bool {
        match &self.status {
            AppStatus::Faulted { mtime, .. } => self.module_mtime().is_some_and(|now| Some(now) > *mtime),
            _ => false,
        }
    }

    pub fn shutdown(&mut self) {
        for rt in [self.runtime.as_deref_mut(), self.parked.as_deref_mut()].into_iter().flatten() {
            rt.shutdown();
        }
        self.runtime = None;
        self.parked = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_ring_keeps_last_lines() {
        let mut log = LogRing::default();
        for i in 0..LOG_LINES + 5 {
            log.push("t", format!("line {i}"));
        }
        assert_eq!(log.len(), LOG_LINES);
        assert_eq!(log.lines().next(), Some("line 5"));
    }

    #[test]
    fn app_paths_stay_inside_the_folder() {
        let app = AppState::new("a", "/apps/a", None);
        assert_eq!(app.resolve("img/x.png"), Some(PathBuf::from("/apps/a/img/x.png")));
        assert_eq!(app.resolve("../b/main.wasm"), None);
        assert_eq!(app.resolve("/etc/passwd"), None);
    }

    #[test]
    fn fault_waits_for_a_newer_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MAIN_MODULE), b"v1").unwrap();
        let mut slot = AppSlot::new("a", dir.path());
        slot.fault("trap".into());
        assert!(!slot.wants_reload());
        let later = SystemTime::now() + std::time::Duration::from_secs(10);
        let file = std::fs::File::options().write(true).open(slot.module_path()).unwrap();
        file.set_modified(later).unwrap();
        assert!(slot.wants_reload());
    }
}
