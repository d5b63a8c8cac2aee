//! smb-mount-core: Core library for mounting SMB/CIFS shares.
//!
//! Given a list of configured shares, this library decides where each one is
//! mounted, checks whether it is already mounted, and mounts or unmounts it
//! through the system helpers, retrying once with `sudo` when the direct
//! attempt fails for an unprivileged user.
//!
//! # Modules
//!
//! - [`config`]: YAML configuration file
//! - [`entry`]: Mount declarations and mount path resolution
//! - [`status`]: Mount status from `/proc/self/mountinfo`
//! - [`credentials`]: Transient `mount.cifs` credential files
//! - [`executor`]: Helper process execution and privilege escalation
//! - [`mount`]: Single-entry mount/unmount
//! - [`batch`]: Sequential multi-entry mount/unmount
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use smb_mount_core::{BatchOrchestrator, Config, Mounter, UnmountMode};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("/home/alice/.config/smb_mount_config.yaml")).unwrap();
//! let mut entries = config.entries();
//!
//! let mounter = Mounter::new();
//! let batch = BatchOrchestrator::new(&mounter, config.base_dir.clone());
//! let result = batch
//!     .mount_many(&mut entries, |_| Ok("password".to_string()), &mut ())
//!     .unwrap();
//! println!("{} succeeded, {} failed", result.succeeded, result.failed);
//!
//! batch.unmount_many(&mut entries, UnmountMode::Normal, &mut ());
//! ```

pub mod batch;
pub mod config;
pub mod credentials;
pub mod entry;
pub mod error;
pub mod executor;
pub mod mount;
pub mod status;

// Re-export commonly used types
pub use batch::{BatchOrchestrator, BatchResult, EntryOutcome, MountBackend, Outcome, Progress};
pub use config::Config;
pub use entry::{MountDeclaration, ResolvedMount};
pub use error::{Error, Result};
pub use executor::{ExecutionContext, PrivilegeEscalation};
pub use mount::{Mounter, UnmountMode};
