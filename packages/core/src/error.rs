//! Unified error types for the smb-mount-core library.
//!
//! Uses SNAFU for context-rich error handling, especially useful when the same
//! underlying error type (like `std::io::Error`) appears in different contexts.
//!
//! Every variant except the configuration ones describes a failure local to a
//! single mount entry. The batch orchestrator records those per entry and moves
//! on; only [`Error::BaseDir`] stops a batch before it starts.

use snafu::{ResultExt, Snafu};
use std::path::PathBuf;

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all core library operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A mount path could not be computed.
    #[snafu(display("failed to resolve mount path '{path}': {message}"))]
    PathResolution { path: String, message: String },

    /// Reading the OS mount table (or probing the path) failed.
    #[snafu(display("failed to check mount status of {}", path.display()))]
    Probe {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The credential file could not be created, restricted or written.
    #[snafu(display("failed to stage credentials file in {}", dir.display()))]
    CredentialStaging {
        dir: PathBuf,
        source: std::io::Error,
    },

    /// The credential file could not be removed after use.
    #[snafu(display("failed to remove credentials file {}", path.display()))]
    CredentialRelease {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount requested for a path that is already an active mount point.
    #[snafu(display("already mounted at {}", path.display()))]
    AlreadyMounted { path: PathBuf },

    /// Unmount requested for a path that is not an active mount point.
    #[snafu(display("not mounted: {}", path.display()))]
    NotMounted { path: PathBuf },

    /// Failed to spawn a system command.
    #[snafu(display("failed to execute command '{command}'"))]
    CommandExecution {
        command: String,
        source: std::io::Error,
    },

    /// The mount helper exited with a non-zero status.
    #[snafu(display("mount {} failed (exit code {}): {output}", path.display(), fmt_code(*code)))]
    MountExec {
        path: PathBuf,
        code: Option<i32>,
        output: String,
    },

    /// The unmount helper exited with a non-zero status.
    #[snafu(display("umount {} failed (exit code {}): {output}", path.display(), fmt_code(*code)))]
    UnmountExec {
        path: PathBuf,
        code: Option<i32>,
        output: String,
    },

    /// Mount point creation failed.
    #[snafu(display("failed to create mount point at {}", path.display()))]
    MountPointCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Mount point removal failed.
    #[snafu(display("failed to remove mount point at {}", path.display()))]
    MountPointRemoval {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The base directory cannot be used.
    #[snafu(display("base directory {} is unusable: {message}", path.display()))]
    BaseDir { path: PathBuf, message: String },

    /// Privilege escalation is required but the helper is not installed.
    #[snafu(display(
        "privilege escalation required but '{tool}' is not available. Please install it or run as root."
    ))]
    ElevationUnavailable { tool: String },

    /// The elevated command ran and failed.
    #[snafu(display("elevated command '{command}' failed (exit code {})", fmt_code(*code)))]
    ElevationFailed { command: String, code: Option<i32> },

    /// Configuration file cannot be read.
    #[snafu(display("failed to read config at {}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration file is not valid YAML for the expected schema.
    #[snafu(display("failed to parse config at {}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Configuration parsed but failed validation.
    #[snafu(display("invalid config: {message}"))]
    ConfigInvalid { message: String },

    /// No mount entry with the requested name.
    #[snafu(display("mount entry '{name}' not found"))]
    EntryNotFound { name: String },

    #[snafu(whatever, display("{message}"))]
    Generic {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

fn fmt_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl Error {
    /// Returns true for the idempotent no-op conditions the batch layer
    /// treats as success rather than failure.
    pub fn is_state_noop(&self) -> bool {
        matches!(self, Error::AlreadyMounted { .. } | Error::NotMounted { .. })
    }
}

/// Extension trait for adding context to io::Error results.
pub trait IoResultExt<T> {
    /// Add context for command execution errors.
    fn command_context(self, command: impl Into<String>) -> Result<T>;

    /// Add context for mount point creation errors.
    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for mount status probe errors.
    fn probe_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add context for config read errors.
    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn command_context(self, command: impl Into<String>) -> Result<T> {
        self.context(CommandExecutionSnafu {
            command: command.into(),
        })
    }

    fn mount_point_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(MountPointCreationSnafu { path: path.into() })
    }

    fn probe_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ProbeSnafu { path: path.into() })
    }

    fn config_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.context(ConfigReadSnafu { path: path.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_carries_output_verbatim() {
        let err = Error::MountExec {
            path: PathBuf::from("/mnt/nas"),
            code: Some(32),
            output: "mount error(13): Permission denied".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/mnt/nas"));
        assert!(msg.contains("32"));
        assert!(msg.contains("mount error(13): Permission denied"));
    }

    #[test]
    fn test_state_noop_classification() {
        assert!(
            Error::AlreadyMounted {
                path: PathBuf::from("/a")
            }
            .is_state_noop()
        );
        assert!(
            Error::NotMounted {
                path: PathBuf::from("/a")
            }
            .is_state_noop()
        );
        assert!(
            !Error::ElevationUnavailable {
                tool: "sudo".to_string()
            }
            .is_state_noop()
        );
    }

    #[test]
    fn test_missing_exit_code_display() {
        let err = Error::ElevationFailed {
            command: "sudo umount /mnt/x".to_string(),
            code: None,
        };
        assert!(err.to_string().contains("exit code none"));
    }
}
