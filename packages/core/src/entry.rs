//! Mount declarations and mount path resolution.
//!
//! A [`MountDeclaration`] is one share as written in the configuration file.
//! A [`ResolvedMount`] wraps it with the runtime state the rest of the crate
//! needs: the authoritative on-disk mount path and the last observed mount
//! status.
//!
//! # Resolve-once
//!
//! [`ResolvedMount::resolve`] computes the mount path the first time it is
//! called and returns the stored value on every later call, even if a
//! different base directory is passed. Use [`ResolvedMount::force_resolve`]
//! to recompute.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default SMB port used when a declaration does not set one.
pub const DEFAULT_SMB_PORT: u16 = 445;

/// One SMB/CIFS share to be mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountDeclaration {
    /// Unique entry name.
    pub name: String,
    /// Server host name or address.
    pub smb_addr: String,
    /// Server port; [`DEFAULT_SMB_PORT`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smb_port: Option<u16>,
    /// Share name on the server.
    pub share_name: String,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Directory name under the base directory, instead of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_dir_name: Option<String>,
    /// Explicit mount path. Overrides both `mount_dir_name` and `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_dir_path: Option<String>,
}

impl MountDeclaration {
    /// Returns the SMB port, defaulting to 445.
    pub fn port(&self) -> u16 {
        self.smb_port.unwrap_or(DEFAULT_SMB_PORT)
    }

    /// Returns the network share address in `//host:port/share` form.
    pub fn share_address(&self) -> String {
        format!("//{}:{}/{}", self.smb_addr, self.port(), self.share_name)
    }

    /// Returns the configured password, treating an empty string as absent.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// A declaration plus its resolved mount path and live status flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMount {
    pub declaration: MountDeclaration,
    actual_path: Option<PathBuf>,
    /// Last observed mount status. Refreshed by
    /// [`crate::status::refresh_all`] and updated by the batch orchestrator.
    pub is_mounted: bool,
}

impl ResolvedMount {
    /// Wraps a declaration. The mount path is not resolved yet.
    pub fn new(declaration: MountDeclaration) -> Self {
        Self {
            declaration,
            actual_path: None,
            is_mounted: false,
        }
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    /// Returns true once a mount path has been stored.
    pub fn is_resolved(&self) -> bool {
        self.actual_path.is_some()
    }

    /// Returns the resolved mount path, if any.
    pub fn actual_path(&self) -> Option<&Path> {
        self.actual_path.as_deref()
    }

    /// Returns the resolved mount path or an error if the entry was never resolved.
    pub fn mount_path(&self) -> Result<&Path> {
        self.actual_path().ok_or_else(|| Error::PathResolution {
            path: self.declaration.name.clone(),
            message: "mount path has not been resolved".to_string(),
        })
    }

    /// Resolves the mount path against `base_dir`, at most once.
    ///
    /// Once resolved, later calls return the stored path unchanged and ignore
    /// `base_dir`.
    pub fn resolve(&mut self, base_dir: &str) -> Result<&Path> {
        if self.actual_path.is_none() {
            let path = resolve_mount_path(&self.declaration, base_dir)?;
            tracing::debug!(entry = %self.declaration.name, path = %path.display(), "resolved mount path");
            self.actual_path = Some(path);
        }
        self.mount_path()
    }

    /// Discards any stored path and resolves again against `base_dir`.
    pub fn force_resolve(&mut self, base_dir: &str) -> Result<&Path> {
        self.actual_path = None;
        self.resolve(base_dir)
    }
}

/// Computes the mount path for a declaration.
///
/// Precedence:
/// 1. `mount_dir_path`, `~`-expanded and absolutized
/// 2. `base_dir` joined with `mount_dir_name`
/// 3. `base_dir` joined with `name`
///
/// Pure path computation; the filesystem is not touched.
pub fn resolve_mount_path(declaration: &MountDeclaration, base_dir: &str) -> Result<PathBuf> {
    if let Some(explicit) = non_empty(declaration.mount_dir_path.as_deref()) {
        return normalize_path(explicit);
    }

    if base_dir.trim().is_empty() {
        return Err(Error::PathResolution {
            path: declaration.name.clone(),
            message: "base directory is empty".to_string(),
        });
    }

    let dir_name = non_empty(declaration.mount_dir_name.as_deref()).unwrap_or(&declaration.name);
    Ok(clean_path(&normalize_path(base_dir)?.join(dir_name)))
}

/// Expands a leading `~` to the user's home directory, makes the path
/// absolute and lexically removes `.`, `..` and trailing separators.
///
/// Only `~` and `~/...` are expanded. `~user/...` is kept literally rather
/// than being rewritten to the invoking user's home.
pub fn normalize_path(raw: &str) -> Result<PathBuf> {
    let expanded = expand_home(raw)?;
    let absolute = std::path::absolute(&expanded).map_err(|e| Error::PathResolution {
        path: raw.to_string(),
        message: format!("failed to make path absolute: {}", e),
    })?;
    Ok(clean_path(&absolute))
}

/// Folds `.` and `..` components without touching the filesystem.
/// `..` at the root stays at the root.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::RootDir) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return Ok(PathBuf::from(raw)),
    };

    let home = dirs::home_dir().ok_or_else(|| Error::PathResolution {
        path: raw.to_string(),
        message: "could not determine home directory".to_string(),
    })?;

    match rest.trim_start_matches('/') {
        "" => Ok(home),
        rest => Ok(home.join(rest)),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
