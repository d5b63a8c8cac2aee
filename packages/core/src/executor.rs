//! Command execution abstraction with privilege escalation support.
//!
//! Helper programs (`mount.cifs`, `umount`, `mkdir`) are described as an
//! [`Invocation`] and run through a [`CommandRunner`]. The [`ExecutionContext`]
//! decides once, from the process identity and the installed tools, how an
//! invocation that needs root is run: directly, wrapped by `sudo`, or not at
//! all.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, IoResultExt, Result};

/// Elevation helper looked up on `PATH`.
pub const ELEVATION_TOOL: &str = "sudo";

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Creates an invocation of `program` with `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Wraps this invocation with an elevation helper.
    ///
    /// `-S` lets sudo read a password from stdin when it needs one, and `--`
    /// stops it from parsing the wrapped command's arguments as its own options.
    pub fn elevated(&self, helper: &Path) -> Self {
        let mut args = vec!["-S".to_string(), "--".to_string(), self.program.clone()];
        args.extend(self.args.iter().cloned());
        Self {
            program: helper.display().to_string(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit code and captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Combined stdout followed by stderr. Empty for interactive runs.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs helper processes.
///
/// Both methods block until the child exits. No timeout is applied: a helper
/// that hangs (for example on an unreachable server) blocks the caller
/// indefinitely.
pub trait CommandRunner {
    /// Runs with stdin closed and captures combined output.
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Runs attached to the caller's stdin/stdout/stderr, so an elevation
    /// helper can prompt on the terminal.
    fn interactive(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "running helper");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .command_context(invocation.to_string())?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            code: output.status.code(),
            output: combined,
        })
    }

    fn interactive(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(command = %invocation, "running helper interactively");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .command_context(invocation.to_string())?;

        Ok(CommandOutput {
            code: status.code(),
            output: String::new(),
        })
    }
}

/// How privileged invocations are run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Already root: run as is.
    Direct,
    /// Wrap with the elevation helper at this path.
    Sudo { helper: PathBuf },
    /// Not root and no helper installed.
    Unavailable,
}

/// Returns true when the process is not running as root.
pub fn needs_privilege() -> bool {
    !nix::unistd::geteuid().is_root()
}

/// Execution context for running helpers that need root.
///
/// # Example
///
/// ```
/// use smb_mount_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// let ctx = ExecutionContext::select(true, None);
/// assert_eq!(ctx.escalation(), &PrivilegeEscalation::Direct);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
}

impl ExecutionContext {
    /// Probes the process identity and `PATH` once.
    pub fn detect() -> Self {
        let is_root = !needs_privilege();
        let helper = if is_root {
            None
        } else {
            which::which(ELEVATION_TOOL).ok()
        };
        Self::select(is_root, helper)
    }

    /// Chooses the escalation strategy from already probed facts.
    pub fn select(is_root: bool, helper: Option<PathBuf>) -> Self {
        let escalation = match (is_root, helper) {
            (true, _) => PrivilegeEscalation::Direct,
            (false, Some(helper)) => PrivilegeEscalation::Sudo { helper },
            (false, None) => PrivilegeEscalation::Unavailable,
        };
        Self { escalation }
    }

    pub fn with_escalation(escalation: PrivilegeEscalation) -> Self {
        Self { escalation }
    }

    pub fn escalation(&self) -> &PrivilegeEscalation {
        &self.escalation
    }

    /// True unless the process already runs as root.
    pub fn needs_privilege(&self) -> bool {
        self.escalation != PrivilegeEscalation::Direct
    }

    /// Runs `invocation` with root privileges, once.
    ///
    /// Input and output are passed through to the terminal untouched.
    pub fn run_elevated<R: CommandRunner + ?Sized>(
        &self,
        runner: &R,
        invocation: &Invocation,
    ) -> Result<()> {
        let wrapped = match &self.escalation {
            PrivilegeEscalation::Direct => invocation.clone(),
            PrivilegeEscalation::Sudo { helper } => invocation.elevated(helper),
            PrivilegeEscalation::Unavailable => {
                return Err(Error::ElevationUnavailable {
                    tool: ELEVATION_TOOL.to_string(),
                });
            }
        };

        info!(command = %invocation, "running with elevated privileges");
        let output = runner.interactive(&wrapped)?;
        if !output.success() {
            return Err(Error::ElevationFailed {
                command: wrapped.to_string(),
                code: output.code,
            });
        }
        Ok(())
    }

    /// Creates a directory (with parents) with root privileges.
    pub fn mkdir_privileged<R: CommandRunner + ?Sized>(&self, runner: &R, path: &Path) -> Result<()> {
        let invocation = Invocation::new("mkdir", ["-p".to_string(), path.display().to_string()]);
        self.run_elevated(runner, &invocation)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording runner shared by executor, mount and batch tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Records every invocation and replays scripted exit codes (0 when the
    /// script runs out).
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<(Invocation, bool)>>,
        pub codes: RefCell<VecDeque<i32>>,
        pub output: String,
    }

    impl RecordingRunner {
        pub fn with_codes(codes: &[i32]) -> Self {
            Self {
                codes: RefCell::new(codes.iter().copied().collect()),
                ..Self::default()
            }
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.calls.borrow().iter().map(|(i, _)| i.clone()).collect()
        }

        fn next(&self, invocation: &Invocation, interactive: bool) -> CommandOutput {
            self.calls
                .borrow_mut()
                .push((invocation.clone(), interactive));
            let code = self.codes.borrow_mut().pop_front().unwrap_or(0);
            CommandOutput {
                code: Some(code),
                output: if code == 0 {
                    String::new()
                } else {
                    self.output.clone()
                },
            }
        }
    }

    impl CommandRunner for RecordingRunner {
        fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
            Ok(self.next(invocation, false))
        }

        fn interactive(&self, invocation: &Invocation) -> Result<CommandOutput> {
            Ok(self.next(invocation, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;

    fn umount() -> Invocation {
        Invocation::new("umount", ["/mnt/nas"])
    }

    #[test]
    fn test_select_strategy() {
        assert_eq!(
            ExecutionContext::select(true, Some(PathBuf::from("/usr/bin/sudo"))).escalation(),
            &PrivilegeEscalation::Direct
        );
        assert_eq!(
            ExecutionContext::select(false, Some(PathBuf::from("/usr/bin/sudo"))).escalation(),
            &PrivilegeEscalation::Sudo {
                helper: PathBuf::from("/usr/bin/sudo")
            }
        );
        assert_eq!(
            ExecutionContext::select(false, None).escalation(),
            &PrivilegeEscalation::Unavailable
        );
    }

    #[test]
    fn test_needs_privilege() {
        assert!(!ExecutionContext::select(true, None).needs_privilege());
        assert!(ExecutionContext::select(false, None).needs_privilege());
    }

    #[test]
    fn test_elevated_wrapping_uses_separator() {
        let wrapped = umount().elevated(Path::new("/usr/bin/sudo"));
        assert_eq!(wrapped.program, "/usr/bin/sudo");
        assert_eq!(wrapped.args, vec!["-S", "--", "umount", "/mnt/nas"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(umount().to_string(), "umount /mnt/nas");
    }

    #[test]
    fn test_run_elevated_direct_runs_unwrapped() {
        let runner = RecordingRunner::default();
        let ctx = ExecutionContext::select(true, None);

        ctx.run_elevated(&runner, &umount()).unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, umount());
        assert!(calls[0].1, "elevated runs are interactive");
    }

    #[test]
    fn test_run_elevated_wraps_with_sudo() {
        let runner = RecordingRunner::default();
        let ctx = ExecutionContext::select(false, Some(PathBuf::from("/usr/bin/sudo")));

        ctx.run_elevated(&runner, &umount()).unwrap();

        assert_eq!(
            runner.invocations(),
            vec![umount().elevated(Path::new("/usr/bin/sudo"))]
        );
    }

    #[test]
    fn test_run_elevated_unavailable_runs_nothing() {
        let runner = RecordingRunner::default();
        let ctx = ExecutionContext::select(false, None);

        let err = ctx.run_elevated(&runner, &umount()).unwrap_err();
        assert!(matches!(err, Error::ElevationUnavailable { .. }));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_run_elevated_failure_is_not_retried() {
        let runner = RecordingRunner::with_codes(&[1]);
        let ctx = ExecutionContext::select(false, Some(PathBuf::from("/usr/bin/sudo")));

        let err = ctx.run_elevated(&runner, &umount()).unwrap_err();
        assert!(matches!(err, Error::ElevationFailed { code: Some(1), .. }));
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn test_system_runner_captures_combined_output() {
        let out = SystemRunner
            .output(&Invocation::new("sh", ["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(out.output, "out\nerr\n");
    }

    #[test]
    fn test_system_runner_spawn_failure() {
        let err = SystemRunner
            .output(&Invocation::new("/nonexistent/helper-binary", Vec::<String>::new()))
            .unwrap_err();
        assert!(matches!(err, Error::CommandExecution { .. }));
    }
}
