//! YAML configuration file.
//!
//! ```yaml
//! base_dir: ~/smb
//! mounts:
//!   - name: nas
//!     smb_addr: 192.168.1.10
//!     share_name: media
//!     username: alice
//! ```

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::debug;

use crate::entry::{MountDeclaration, ResolvedMount};
use crate::error::{ConfigParseSnafu, Error, IoResultExt, Result};

/// Config file name under the user's config directory.
pub const CONFIG_FILE_NAME: &str = "smb_mount_config.yaml";

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory under which entries without `mount_dir_path` are mounted.
    pub base_dir: String,
    #[serde(default)]
    pub mounts: Vec<MountDeclaration>,
}

/// Returns `~/.config/smb_mount_config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join(CONFIG_FILE_NAME))
}

impl Config {
    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).config_read_context(path)?;
        let config: Config = serde_yaml::from_str(&content).context(ConfigParseSnafu { path })?;
        config.validate()?;
        debug!(path = %path.display(), mounts = config.mounts.len(), "loaded config");
        Ok(config)
    }

    /// Parses and validates YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context(ConfigParseSnafu { path: "<inline>" })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required fields, port range and name uniqueness.
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.trim().is_empty() {
            return invalid("base_dir must not be empty");
        }
        if self.mounts.is_empty() {
            return invalid("at least one mount entry is required");
        }

        let mut seen = HashSet::new();
        for (i, m) in self.mounts.iter().enumerate() {
            let label = if m.name.is_empty() {
                format!("mounts[{}]", i)
            } else {
                format!("mount '{}'", m.name)
            };
            for (field, value) in [
                ("name", &m.name),
                ("smb_addr", &m.smb_addr),
                ("share_name", &m.share_name),
                ("username", &m.username),
            ] {
                if value.trim().is_empty() {
                    return invalid(format!("{}: {} must not be empty", label, field));
                }
            }
            if m.smb_port == Some(0) {
                return invalid(format!("{}: smb_port must be between 1 and 65535", label));
            }
            if !seen.insert(m.name.as_str()) {
                return invalid(format!("duplicate mount name '{}'", m.name));
            }
        }
        Ok(())
    }

    /// Looks up a declaration by its unique name.
    pub fn find_by_name(&self, name: &str) -> Result<&MountDeclaration> {
        self.mounts
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| Error::EntryNotFound {
                name: name.to_string(),
            })
    }

    /// Entry names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.mounts.iter().map(|m| m.name.as_str()).collect()
    }

    /// Fresh runtime entries for every declaration, in file order.
    pub fn entries(&self) -> Vec<ResolvedMount> {
        self.mounts.iter().cloned().map(ResolvedMount::new).collect()
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(Error::ConfigInvalid {
        message: message.into(),
    })
}

/// Warns when the config file (which may hold passwords) is readable by
/// anyone but its owner. Never fails: an unreadable mode yields no warnings.
pub fn check_permissions(path: &Path) -> Vec<String> {
    let mode = match fs::metadata(path) {
        Ok(meta) => meta.permissions().mode(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cannot stat config for permission check");
            return Vec::new();
        }
    };

    let mut warnings = Vec::new();
    if mode & 0o004 != 0 {
        warnings.push(format!(
            "{} is world-readable. Consider chmod 600.",
            path.display()
        ));
    }
    if mode & 0o040 != 0 {
        warnings.push(format!(
            "{} is group-readable. Only the owner should be able to read it.",
            path.display()
        ));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
base_dir: ~/smb
mounts:
  - name: nas
    smb_addr: 192.168.1.10
    share_name: media
    username: alice
    password: secret
  - name: backup
    smb_addr: backup.lan
    smb_port: 1445
    share_name: vault
    username: bob
    mount_dir_name: vault
  - name: scratch
    smb_addr: nas.lan
    share_name: tmp
    username: alice
    mount_dir_path: /mnt/scratch
"#;

    fn write_config(content: &str, mode: u32) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(mode)).unwrap();
        file
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.base_dir, "~/smb");
        assert_eq!(config.names(), vec!["nas", "backup", "scratch"]);

        let nas = config.find_by_name("nas").unwrap();
        assert_eq!(nas.port(), 445);
        assert_eq!(nas.password(), Some("secret"));
        assert_eq!(nas.share_address(), "//192.168.1.10:445/media");

        let backup = config.find_by_name("backup").unwrap();
        assert_eq!(backup.share_address(), "//backup.lan:1445/vault");
        assert_eq!(backup.password(), None);

        let scratch = config.find_by_name("scratch").unwrap();
        assert_eq!(scratch.mount_dir_path.as_deref(), Some("/mnt/scratch"));
    }

    #[test]
    fn test_find_by_name_unknown() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        let err = config.find_by_name("missing").unwrap_err();
        assert!(matches!(err, Error::EntryNotFound { ref name } if name == "missing"));
    }

    #[test]
    fn test_entries_start_unresolved() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        let entries = config.entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| !e.is_resolved() && !e.is_mounted));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            ("base_dir: ''\nmounts: [{name: a, smb_addr: h, share_name: s, username: u}]", "base_dir"),
            ("base_dir: /srv\nmounts: []", "at least one"),
            ("base_dir: /srv\n", "at least one"),
            ("base_dir: /srv\nmounts: [{name: a, smb_addr: '', share_name: s, username: u}]", "smb_addr"),
            ("base_dir: /srv\nmounts: [{name: '', smb_addr: h, share_name: s, username: u}]", "mounts[0]"),
            ("base_dir: /srv\nmounts: [{name: a, smb_addr: h, smb_port: 0, share_name: s, username: u}]", "smb_port"),
            (
                "base_dir: /srv\nmounts:\n  - {name: a, smb_addr: h, share_name: s, username: u}\n  - {name: a, smb_addr: h, share_name: t, username: u}",
                "duplicate",
            ),
        ];

        for (yaml, needle) in cases {
            let err = Config::from_yaml_str(yaml).unwrap_err();
            match err {
                Error::ConfigInvalid { message } => {
                    assert!(message.contains(needle), "{:?} should mention {}", message, needle)
                }
                other => panic!("unexpected error for {:?}: {}", yaml, other),
            }
        }
    }

    #[test]
    fn test_port_out_of_range_is_parse_error() {
        let yaml = "base_dir: /srv\nmounts: [{name: a, smb_addr: h, smb_port: 70000, share_name: s, username: u}]";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(SAMPLE, 0o600);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mounts.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, Error::ConfigRead { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let file = write_config("base_dir: [unterminated", 0o600);
        assert!(matches!(
            Config::load(file.path()),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_permission_warnings() {
        let private = write_config(SAMPLE, 0o600);
        assert!(check_permissions(private.path()).is_empty());

        let group = write_config(SAMPLE, 0o640);
        let warnings = check_permissions(group.path());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("group-readable"));

        let world = write_config(SAMPLE, 0o644);
        assert_eq!(check_permissions(world.path()).len(), 2);
    }

    #[test]
    fn test_password_not_serialized() {
        let config = Config::from_yaml_str(SAMPLE).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret"));
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(".config/smb_mount_config.yaml"));
        }
    }
}
