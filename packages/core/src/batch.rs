//! Sequential batch mount/unmount with per-entry outcomes.
//!
//! Entries are processed strictly in input order, one at a time. Elevation
//! prompts read from the terminal, so running entries concurrently would
//! interleave them; any parallel version must serialize that channel.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::entry::{MountDeclaration, ResolvedMount, normalize_path};
use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::mount::{Mounter, UnmountMode, ensure_base_dir};
use crate::status::{self, MountTable};

/// What the orchestrator needs from the executor.
pub trait MountBackend {
    fn is_mounted(&self, path: &Path) -> Result<bool>;
    fn needs_privilege(&self) -> bool;
    fn mount(&self, entry: &ResolvedMount, password: &str) -> Result<()>;
    fn mount_elevated(&self, entry: &ResolvedMount, password: &str) -> Result<()>;
    fn unmount(&self, path: &Path, mode: UnmountMode) -> Result<()>;
    fn unmount_elevated(&self, path: &Path, mode: UnmountMode) -> Result<()>;
}

impl<T: MountTable, R: CommandRunner> MountBackend for Mounter<T, R> {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        Mounter::is_mounted(self, path)
    }

    fn needs_privilege(&self) -> bool {
        self.context().needs_privilege()
    }

    fn mount(&self, entry: &ResolvedMount, password: &str) -> Result<()> {
        Mounter::mount(self, entry, password)
    }

    fn mount_elevated(&self, entry: &ResolvedMount, password: &str) -> Result<()> {
        Mounter::mount_elevated(self, entry, password)
    }

    fn unmount(&self, path: &Path, mode: UnmountMode) -> Result<()> {
        Mounter::unmount(self, path, mode)
    }

    fn unmount_elevated(&self, path: &Path, mode: UnmountMode) -> Result<()> {
        Mounter::unmount_elevated(self, path, mode)
    }
}

/// Result of processing one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Mounted { elevated: bool },
    Unmounted { elevated: bool },
    AlreadyMounted,
    AlreadyUnmounted,
    Failed { reason: String },
}

impl Outcome {
    /// True for everything but `Failed`.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed { .. })
    }

    fn failed(error: &Error) -> Self {
        Outcome::Failed {
            reason: error.to_string(),
        }
    }
}

/// One entry's outcome, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub name: String,
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Ordered outcomes of a batch plus aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub outcomes: Vec<EntryOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    fn push(&mut self, outcome: EntryOutcome) {
        if outcome.outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// A batch fails only when nothing succeeded and something failed.
    /// An empty batch is a success.
    pub fn is_success(&self) -> bool {
        self.succeeded > 0 || self.failed == 0
    }
}

/// Progress hooks for a UI. All methods default to no-ops.
pub trait Progress {
    fn started(&mut self, _index: usize, _total: usize, _entry: &ResolvedMount) {}
    fn escalating(&mut self, _entry: &ResolvedMount, _error: &Error) {}
    fn finished(&mut self, _index: usize, _total: usize, _outcome: &EntryOutcome) {}
}

impl Progress for () {}

/// Runs mount/unmount over a list of entries.
pub struct BatchOrchestrator<'a, B: MountBackend + ?Sized> {
    backend: &'a B,
    base_dir: String,
}

impl<'a, B: MountBackend + ?Sized> BatchOrchestrator<'a, B> {
    /// Orchestrator over `backend`, resolving paths against `base_dir`.
    pub fn new(backend: &'a B, base_dir: impl Into<String>) -> Self {
        Self {
            backend,
            base_dir: base_dir.into(),
        }
    }

    /// Mounts every entry in order.
    ///
    /// `credentials` is asked for a password only for entries that need
    /// mounting and have none configured. The only error returned is an
    /// unusable base directory, checked before any entry is touched; every
    /// other failure is recorded in the result.
    pub fn mount_many<F, P>(
        &self,
        entries: &mut [ResolvedMount],
        mut credentials: F,
        progress: &mut P,
    ) -> Result<BatchResult>
    where
        F: FnMut(&MountDeclaration) -> Result<String>,
        P: Progress + ?Sized,
    {
        let mut result = BatchResult::default();
        if entries.is_empty() {
            return Ok(result);
        }

        let base_dir = normalize_path(&self.base_dir).map_err(|e| Error::BaseDir {
            path: PathBuf::from(&self.base_dir),
            message: e.to_string(),
        })?;
        ensure_base_dir(&base_dir)?;

        self.refresh(entries);

        let total = entries.len();
        for (index, entry) in entries.iter_mut().enumerate() {
            progress.started(index, total, entry);
            let outcome = self.mount_one(entry, &mut credentials, progress);
            if matches!(outcome, Outcome::Mounted { .. } | Outcome::AlreadyMounted) {
                entry.is_mounted = true;
            }
            let outcome = self.record(entry, outcome);
            progress.finished(index, total, &outcome);
            result.push(outcome);
        }

        info!(succeeded = result.succeeded, failed = result.failed, "mount batch complete");
        Ok(result)
    }

    /// Unmounts every entry in order.
    pub fn unmount_many<P>(
        &self,
        entries: &mut [ResolvedMount],
        mode: UnmountMode,
        progress: &mut P,
    ) -> BatchResult
    where
        P: Progress + ?Sized,
    {
        let mut result = BatchResult::default();
        if entries.is_empty() {
            return result;
        }

        self.refresh(entries);

        let total = entries.len();
        for (index, entry) in entries.iter_mut().enumerate() {
            progress.started(index, total, entry);
            let outcome = self.unmount_one(entry, mode, progress);
            if matches!(outcome, Outcome::Unmounted { .. } | Outcome::AlreadyUnmounted) {
                entry.is_mounted = false;
            }
            let outcome = self.record(entry, outcome);
            progress.finished(index, total, &outcome);
            result.push(outcome);
        }

        info!(succeeded = result.succeeded, failed = result.failed, "unmount batch complete");
        result
    }

    /// Resolves paths and reads live status before any entry is acted on.
    fn refresh(&self, entries: &mut [ResolvedMount]) {
        for entry in entries.iter_mut() {
            if let Err(e) = entry.resolve(&self.base_dir).map(|_| ()) {
                warn!(entry = %entry.name(), error = %e, "failed to resolve mount path");
            }
        }
        status::refresh_all(entries, |path| self.backend.is_mounted(path));
    }

    fn mount_one<F, P>(
        &self,
        entry: &ResolvedMount,
        credentials: &mut F,
        progress: &mut P,
    ) -> Outcome
    where
        F: FnMut(&MountDeclaration) -> Result<String>,
        P: Progress + ?Sized,
    {
        if let Err(e) = entry.mount_path() {
            return Outcome::failed(&e);
        }
        if entry.is_mounted {
            return Outcome::AlreadyMounted;
        }

        let password = match entry.declaration.password() {
            Some(password) => password.to_string(),
            None => match credentials(&entry.declaration) {
                Ok(password) => password,
                Err(e) => return Outcome::failed(&e),
            },
        };

        match self.backend.mount(entry, &password) {
            Ok(()) => Outcome::Mounted { elevated: false },
            Err(e) if e.is_state_noop() => Outcome::AlreadyMounted,
            Err(e) if self.backend.needs_privilege() => {
                warn!(entry = %entry.name(), error = %e, "mount failed, retrying with elevated privileges");
                progress.escalating(entry, &e);
                match self.backend.mount_elevated(entry, &password) {
                    Ok(()) => Outcome::Mounted { elevated: true },
                    Err(e) => Outcome::failed(&e),
                }
            }
            Err(e) => Outcome::failed(&e),
        }
    }

    fn unmount_one<P>(&self, entry: &ResolvedMount, mode: UnmountMode, progress: &mut P) -> Outcome
    where
        P: Progress + ?Sized,
    {
        let path = match entry.mount_path() {
            Ok(path) => path,
            Err(e) => return Outcome::failed(&e),
        };
        if !entry.is_mounted {
            return Outcome::AlreadyUnmounted;
        }

        match self.backend.unmount(path, mode) {
            Ok(()) => Outcome::Unmounted { elevated: false },
            Err(e) if e.is_state_noop() => Outcome::AlreadyUnmounted,
            Err(e) if self.backend.needs_privilege() => {
                warn!(entry = %entry.name(), error = %e, "unmount failed, retrying with elevated privileges");
                progress.escalating(entry, &e);
                match self.backend.unmount_elevated(path, mode) {
                    Ok(()) => Outcome::Unmounted { elevated: true },
                    Err(e) => Outcome::failed(&e),
                }
            }
            Err(e) => Outcome::failed(&e),
        }
    }

    fn record(&self, entry: &ResolvedMount, outcome: Outcome) -> EntryOutcome {
        if let Outcome::Failed { reason } = &outcome {
            warn!(entry = %entry.name(), reason = %reason, "entry failed");
        }
        EntryOutcome {
            name: entry.name().to_string(),
            path: entry.actual_path().map(Path::to_path_buf),
            outcome,
        }
    }
}
