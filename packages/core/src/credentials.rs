//! Transient credential files for `mount.cifs`.
//!
//! A [`CredentialFile`] is created with mode `0600` in a single open call,
//! so the secret is never readable by group or others, and removed when it is
//! released or dropped. Dropping covers early returns and unwinding.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CredentialReleaseSnafu, CredentialStagingSnafu, Result};

/// File name prefix of staged credential files.
pub const CREDENTIALS_PREFIX: &str = "smb_mount_creds_";

/// Owner read/write only.
pub const CREDENTIALS_MODE: u32 = 0o600;

/// A staged credentials file, removed on release or drop.
#[derive(Debug)]
pub struct CredentialFile {
    file: NamedTempFile,
}

impl CredentialFile {
    /// Stages credentials in the system temp directory.
    pub fn stage(username: &str, password: &str) -> Result<Self> {
        Self::stage_in(&std::env::temp_dir(), username, password)
    }

    /// Stages credentials in `dir`.
    ///
    /// On any failure the partially created file is removed before the error
    /// is returned.
    pub fn stage_in(dir: &Path, username: &str, password: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix(CREDENTIALS_PREFIX)
            .suffix(".txt")
            .permissions(Permissions::from_mode(CREDENTIALS_MODE))
            .tempfile_in(dir)
            .context(CredentialStagingSnafu { dir })?;

        // The process umask can only clear bits, but make the mode exact anyway
        // before any secret is written.
        file.as_file()
            .set_permissions(Permissions::from_mode(CREDENTIALS_MODE))
            .context(CredentialStagingSnafu { dir })?;

        file.write_all(render(username, password).as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .context(CredentialStagingSnafu { dir })?;

        debug!(path = %file.path().display(), "staged credentials file");
        Ok(Self { file })
    }

    /// Path handed to the mount helper.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Removes the file.
    pub fn release(self) -> Result<()> {
        let path: PathBuf = self.file.path().to_path_buf();
        self.file
            .close()
            .context(CredentialReleaseSnafu { path: &path })?;
        debug!(path = %path.display(), "removed credentials file");
        Ok(())
    }
}

/// Renders the `mount.cifs` credentials file body.
fn render(username: &str, password: &str) -> String {
    format!("username={}\npassword={}\ndomain={}\n", username, password, "")
}
