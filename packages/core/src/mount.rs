//! Mount operations module.
//!
//! This module mounts SMB/CIFS shares with `mount.cifs` and unmounts them with
//! `umount`, staging a credentials file for each mount attempt.

use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::credentials::CredentialFile;
use crate::entry::{MountDeclaration, ResolvedMount};
use crate::error::{Error, IoResultExt, Result};
use crate::executor::{CommandRunner, ExecutionContext, Invocation, SystemRunner};
use crate::status::{self, MountTable, ProcMountTable};

/// CIFS mount helper.
pub const MOUNT_HELPER: &str = "mount.cifs";

/// Unmount helper.
pub const UNMOUNT_HELPER: &str = "umount";

/// Mode for created mount and base directories.
pub const MOUNT_DIR_MODE: u32 = 0o755;

/// Numeric identity that owns files on the mounted share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    /// The invoking user's real uid/gid.
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

/// How an unmount detaches the filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmountMode {
    /// Plain `umount`.
    #[default]
    Normal,
    /// Lazy detach (`-l`), falling back to forced detach (`-f`) only if the
    /// lazy one fails.
    Force,
}

/// Builds the `-o` option string for `mount.cifs`.
pub fn mount_options(credentials: &Path, identity: Identity) -> String {
    format!(
        "credentials={},file_mode=0755,dir_mode=0755,uid={},gid={}",
        credentials.display(),
        identity.uid,
        identity.gid
    )
}

/// Builds `mount.cifs //host:port/share <path> -o <options>`.
pub fn mount_invocation(
    declaration: &MountDeclaration,
    path: &Path,
    credentials: &Path,
    identity: Identity,
) -> Invocation {
    Invocation::new(
        MOUNT_HELPER,
        [
            declaration.share_address(),
            path.display().to_string(),
            "-o".to_string(),
            mount_options(credentials, identity),
        ],
    )
}

/// Builds `umount [flag] <path>`.
pub fn unmount_invocation(path: &Path, flag: Option<&str>) -> Invocation {
    let mut args: Vec<String> = flag.into_iter().map(str::to_string).collect();
    args.push(path.display().to_string());
    Invocation::new(UNMOUNT_HELPER, args)
}

/// Creates a mount point directory if it doesn't exist.
pub fn create_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        DirBuilder::new()
            .recursive(true)
            .mode(MOUNT_DIR_MODE)
            .create(path)
            .mount_point_context(path)?;
        debug!(path = %path.display(), "created mount point");
    }
    Ok(())
}

/// Makes sure the base directory exists and is a directory.
pub fn ensure_base_dir(base_dir: &Path) -> Result<()> {
    match fs::metadata(base_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::BaseDir {
            path: base_dir.to_path_buf(),
            message: "exists but is not a directory".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            DirBuilder::new()
                .recursive(true)
                .mode(MOUNT_DIR_MODE)
                .create(base_dir)
                .map_err(|e| Error::BaseDir {
                    path: base_dir.to_path_buf(),
                    message: format!("failed to create: {}", e),
                })?;
            info!(path = %base_dir.display(), "created base directory");
            Ok(())
        }
        Err(e) => Err(Error::BaseDir {
            path: base_dir.to_path_buf(),
            message: format!("failed to access: {}", e),
        }),
    }
}

/// Removes an unmounted, empty mount point directory.
///
/// A directory that is already gone counts as cleaned up.
pub fn cleanup_mount_point<T: MountTable + ?Sized>(table: &T, path: &Path) -> Result<()> {
    if status::is_mounted(table, path)? {
        return Err(Error::AlreadyMounted {
            path: path.to_path_buf(),
        });
    }

    match fs::remove_dir(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed mount point");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::MountPointRemoval {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Mounts and unmounts shares.
///
/// Generic over the mount table and process runner so it can be driven
/// without root in tests.
#[derive(Debug)]
pub struct Mounter<T = ProcMountTable, R = SystemRunner> {
    table: T,
    runner: R,
    ctx: ExecutionContext,
    identity: Identity,
    credentials_dir: PathBuf,
}

impl Mounter {
    /// Mounter for the live system: `/proc/self/mountinfo`, real processes,
    /// detected escalation and the invoking user's identity.
    pub fn new() -> Self {
        Self::with_parts(ProcMountTable::new(), SystemRunner, ExecutionContext::detect())
    }
}

impl Default for Mounter {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MountTable, R: CommandRunner> Mounter<T, R> {
    /// Builds a mounter from explicit parts, using the invoking user's
    /// identity and the system temp dir for credentials.
    pub fn with_parts(table: T, runner: R, ctx: ExecutionContext) -> Self {
        Self {
            table,
            runner,
            ctx,
            identity: Identity::current(),
            credentials_dir: std::env::temp_dir(),
        }
    }

    /// Overrides the uid/gid passed to the mount helper.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Overrides where credentials files are staged.
    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    /// Escalation strategy chosen for this mounter.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Mount table used for status checks.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// Live mount status of `path`.
    pub fn is_mounted(&self, path: &Path) -> Result<bool> {
        status::is_mounted(&self.table, path)
    }

    /// Mounts `entry` without elevation.
    ///
    /// Fails with [`Error::AlreadyMounted`] before touching the filesystem if
    /// the path is already a mount point.
    pub fn mount(&self, entry: &ResolvedMount, password: &str) -> Result<()> {
        let path = entry.mount_path()?;
        if self.is_mounted(path)? {
            return Err(Error::AlreadyMounted {
                path: path.to_path_buf(),
            });
        }

        create_mount_point(path)?;

        let declaration = &entry.declaration;
        let credentials =
            CredentialFile::stage_in(&self.credentials_dir, &declaration.username, password)?;
        let invocation = mount_invocation(declaration, path, credentials.path(), self.identity);
        let result = self.runner.output(&invocation);
        release(credentials);

        let output = result?;
        if !output.success() {
            return Err(Error::MountExec {
                path: path.to_path_buf(),
                code: output.code,
                output: output.output.trim_end().to_string(),
            });
        }

        info!(entry = %declaration.name, path = %path.display(), "mounted");
        Ok(())
    }

    /// Mounts `entry` through the elevation helper.
    ///
    /// A missing mount directory is created with elevation too.
    pub fn mount_elevated(&self, entry: &ResolvedMount, password: &str) -> Result<()> {
        let path = entry.mount_path()?;
        if !path.exists() {
            self.ctx.mkdir_privileged(&self.runner, path)?;
        }

        let declaration = &entry.declaration;
        let credentials =
            CredentialFile::stage_in(&self.credentials_dir, &declaration.username, password)?;
        let invocation = mount_invocation(declaration, path, credentials.path(), self.identity);
        let result = self.ctx.run_elevated(&self.runner, &invocation);
        release(credentials);
        result?;

        info!(entry = %declaration.name, path = %path.display(), "mounted with elevated privileges");
        Ok(())
    }

    /// Unmounts `path` without elevation.
    ///
    /// Fails with [`Error::NotMounted`] without running any helper if `path`
    /// is not a mount point.
    pub fn unmount(&self, path: &Path, mode: UnmountMode) -> Result<()> {
        if !self.is_mounted(path)? {
            return Err(Error::NotMounted {
                path: path.to_path_buf(),
            });
        }

        let output = match mode {
            UnmountMode::Normal => self.runner.output(&unmount_invocation(path, None))?,
            UnmountMode::Force => {
                let lazy = self.runner.output(&unmount_invocation(path, Some("-l")))?;
                if lazy.success() {
                    lazy
                } else {
                    debug!(path = %path.display(), output = %lazy.output.trim_end(), "lazy unmount failed, forcing");
                    self.runner.output(&unmount_invocation(path, Some("-f")))?
                }
            }
        };

        if !output.success() {
            return Err(Error::UnmountExec {
                path: path.to_path_buf(),
                code: output.code,
                output: output.output.trim_end().to_string(),
            });
        }

        info!(path = %path.display(), "unmounted");
        Ok(())
    }

    /// Unmounts `path` through the elevation helper.
    pub fn unmount_elevated(&self, path: &Path, mode: UnmountMode) -> Result<()> {
        match mode {
            UnmountMode::Normal => self
                .ctx
                .run_elevated(&self.runner, &unmount_invocation(path, None))?,
            UnmountMode::Force => {
                match self
                    .ctx
                    .run_elevated(&self.runner, &unmount_invocation(path, Some("-l")))
                {
                    Err(Error::ElevationFailed { .. }) => self
                        .ctx
                        .run_elevated(&self.runner, &unmount_invocation(path, Some("-f")))?,
                    other => other?,
                }
            }
        }

        info!(path = %path.display(), "unmounted with elevated privileges");
        Ok(())
    }
}

fn release(credentials: CredentialFile) {
    let path = credentials.path().to_path_buf();
    if let Err(e) = credentials.release() {
        warn!(path = %path.display(), error = %e, "failed to remove credentials file");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// In-memory mount table.
    #[derive(Debug, Default)]
    pub struct FakeTable {
        pub mounted: RefCell<HashSet<PathBuf>>,
    }

    impl FakeTable {
        pub fn with_mounted(paths: &[&Path]) -> Self {
            Self {
                mounted: RefCell::new(paths.iter().map(|p| p.to_path_buf()).collect()),
            }
        }
    }

    impl MountTable for FakeTable {
        fn contains(&self, mount_point: &Path) -> Result<bool> {
            Ok(self.mounted.borrow().contains(mount_point))
        }
    }
}
