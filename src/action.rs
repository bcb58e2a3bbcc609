//! The closed action vocabulary.
//!
//! Each variant carries exactly the payload its path through the lifecycle
//! orchestrator needs, so arity checks happen once at parse time.

use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};

use crate::invocation::ArgumentError;
use crate::local_file::{read_to_string, resolve};

/// Action names without payloads, as typed on the command line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ActionKind {
    /// Create one node in the group and install the bootstrap artifact.
    Add,
    /// Run a local script file on every node in the group.
    Run,
    /// Run an inline command on every node in the group.
    Exec,
    /// Resume suspended nodes, then run a script.
    PowerOn,
    /// Run a script, then suspend running nodes.
    PowerOff,
    /// Destroy every node in the group that is not yet terminated.
    Destroy,
    /// List the image catalogue.
    ListImages,
    /// List every node visible to the account.
    ListNodes,
}

impl ActionKind {
    /// Every action, in the order shown in usage text.
    pub const ALL: [Self; 8] = [
        Self::Add,
        Self::Run,
        Self::Exec,
        Self::PowerOn,
        Self::PowerOff,
        Self::Destroy,
        Self::ListImages,
        Self::ListNodes,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Run => "run",
            Self::Exec => "exec",
            Self::PowerOn => "poweron",
            Self::PowerOff => "poweroff",
            Self::Destroy => "destroy",
            Self::ListImages => "listimages",
            Self::ListNodes => "listnodes",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ArgumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "add" => Ok(Self::Add),
            "run" => Ok(Self::Run),
            "exec" => Ok(Self::Exec),
            "poweron" | "turnon" => Ok(Self::PowerOn),
            "poweroff" | "turnoff" => Ok(Self::PowerOff),
            "destroy" => Ok(Self::Destroy),
            "listimages" => Ok(Self::ListImages),
            "listnodes" => Ok(Self::ListNodes),
            _ => Err(ArgumentError::UnknownAction(value.to_owned())),
        }
    }
}

/// A local script file whose existence was checked before any remote call.
///
/// The path is kept as typed for display, alongside the resolved location
/// the check succeeded against, so the later read opens the same file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptFile {
    path: Utf8PathBuf,
    resolved: Utf8PathBuf,
}

impl ScriptFile {
    /// Checks that `path` resolves to an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError::ScriptNotFound`] when it does not.
    pub fn open(path: &Utf8Path) -> Result<Self, ArgumentError> {
        let not_found = || ArgumentError::ScriptNotFound {
            path: path.to_path_buf(),
        };
        let resolved = resolve(path).map_err(|_| not_found())?;
        if !resolved.is_file() {
            return Err(not_found());
        }
        Ok(Self {
            path: path.to_path_buf(),
            resolved,
        })
    }

    /// Location of the script as given.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// File name component, falling back to the full path.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    /// Reads the script body.
    ///
    /// # Errors
    ///
    /// Returns a human readable message when the file can no longer be read.
    pub fn read(&self) -> Result<String, String> {
        read_to_string(&self.resolved)
            .map_err(|message| format!("failed to read {}: {message}", self.path))
    }
}

impl fmt::Display for ScriptFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

/// One parsed action with its payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Create one node, then run the post-boot install script on the group.
    Add,
    /// Run a script file on the group as a named background task.
    Run {
        /// Script to run.
        script: ScriptFile,
    },
    /// Run a literal command inline on the group.
    Exec {
        /// Command text.
        command: String,
    },
    /// Resume suspended group nodes, then run a post-resume script.
    PowerOn {
        /// Post-resume script.
        script: ScriptFile,
    },
    /// Run a pre-suspend script, then suspend running group nodes.
    PowerOff {
        /// Pre-suspend script.
        script: ScriptFile,
    },
    /// Destroy every group node that is not terminated.
    Destroy,
    /// List the image catalogue.
    ListImages,
    /// List all nodes visible to the account.
    ListNodes,
}

impl Action {
    /// Parses an action name and its optional argument.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError`] for unknown names, a missing command or
    /// script argument, or a script path that does not exist.
    pub fn parse(name: &str, argument: Option<&str>) -> Result<Self, ArgumentError> {
        let kind = ActionKind::from_str(name)?;
        Self::from_kind(kind, argument)
    }

    /// Builds an action from a kind and its optional argument.
    ///
    /// # Errors
    ///
    /// See [`Action::parse`].
    pub fn from_kind(kind: ActionKind, argument: Option<&str>) -> Result<Self, ArgumentError> {
        let script = |raw: Option<&str>| {
            let path = raw
                .filter(|value| !value.trim().is_empty())
                .ok_or(ArgumentError::MissingScript { action: kind })?;
            ScriptFile::open(Utf8Path::new(path))
        };

        match kind {
            ActionKind::Add => Ok(Self::Add),
            ActionKind::Run => Ok(Self::Run {
                script: script(argument)?,
            }),
            ActionKind::Exec => {
                let command = argument
                    .filter(|value| !value.trim().is_empty())
                    .ok_or(ArgumentError::MissingCommand)?;
                Ok(Self::Exec {
                    command: command.to_owned(),
                })
            }
            ActionKind::PowerOn => Ok(Self::PowerOn {
                script: script(argument)?,
            }),
            ActionKind::PowerOff => Ok(Self::PowerOff {
                script: script(argument)?,
            }),
            ActionKind::Destroy => Ok(Self::Destroy),
            ActionKind::ListImages => Ok(Self::ListImages),
            ActionKind::ListNodes => Ok(Self::ListNodes),
        }
    }

    /// Payload-free kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Add => ActionKind::Add,
            Self::Run { .. } => ActionKind::Run,
            Self::Exec { .. } => ActionKind::Exec,
            Self::PowerOn { .. } => ActionKind::PowerOn,
            Self::PowerOff { .. } => ActionKind::PowerOff,
            Self::Destroy => ActionKind::Destroy,
            Self::ListImages => ActionKind::ListImages,
            Self::ListNodes => ActionKind::ListNodes,
        }
    }

    /// Whether login credentials must be resolved before dispatch.
    #[must_use]
    pub const fn requires_credentials(&self) -> bool {
        !matches!(self, Self::Destroy | Self::ListImages | Self::ListNodes)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case("add", ActionKind::Add)]
    #[case("RUN", ActionKind::Run)]
    #[case("Exec", ActionKind::Exec)]
    #[case("poweron", ActionKind::PowerOn)]
    #[case("TurnOn", ActionKind::PowerOn)]
    #[case("poweroff", ActionKind::PowerOff)]
    #[case("turnoff", ActionKind::PowerOff)]
    #[case("destroy", ActionKind::Destroy)]
    #[case("ListImages", ActionKind::ListImages)]
    #[case("LISTNODES", ActionKind::ListNodes)]
    fn action_names_are_case_insensitive(#[case] name: &str, #[case] expected: ActionKind) {
        assert_eq!(ActionKind::from_str(name), Ok(expected));
    }

    #[rstest]
    fn unknown_action_is_an_argument_error() {
        assert_eq!(
            Action::parse("reboot", None),
            Err(ArgumentError::UnknownAction(String::from("reboot")))
        );
    }

    #[rstest]
    fn exec_requires_command_text() {
        assert_eq!(Action::parse("exec", None), Err(ArgumentError::MissingCommand));
        assert_eq!(
            Action::parse("exec", Some("  ")),
            Err(ArgumentError::MissingCommand)
        );
        assert_eq!(
            Action::parse("exec", Some("uptime")),
            Ok(Action::Exec {
                command: String::from("uptime")
            })
        );
    }

    #[rstest]
    #[case("run")]
    #[case("poweron")]
    #[case("poweroff")]
    fn script_actions_require_an_existing_file(#[case] name: &str) {
        let kind = ActionKind::from_str(name).expect("kind");
        assert_eq!(
            Action::parse(name, None),
            Err(ArgumentError::MissingScript { action: kind })
        );
        assert_eq!(
            Action::parse(name, Some("/no/such/script.sh")),
            Err(ArgumentError::ScriptNotFound {
                path: Utf8PathBuf::from("/no/such/script.sh")
            })
        );
    }

    #[rstest]
    fn script_file_reads_its_body() {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("deploy.sh")).expect("utf8");
        fs::write(&path, "echo deploy\n").expect("write");

        let action = Action::parse("run", Some(path.as_str())).expect("run action");
        let Action::Run { script } = action else {
            panic!("expected run action");
        };
        assert_eq!(script.file_name(), "deploy.sh");
        assert_eq!(script.read().as_deref(), Ok("echo deploy\n"));
    }

    #[rstest]
    fn script_paths_through_parent_directories_are_read() {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        fs::create_dir(root.join("jobs")).expect("mkdir");
        fs::write(root.join("deploy.sh"), "echo deploy\n").expect("write");
        let typed = root.join("jobs").join("..").join("deploy.sh");

        let script = ScriptFile::open(&typed).expect("script file");
        assert_eq!(script.path(), typed.as_path());
        assert_eq!(script.file_name(), "deploy.sh");
        assert_eq!(script.read().as_deref(), Ok("echo deploy\n"));
    }

    #[rstest]
    fn directories_are_not_scripts() {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        assert_eq!(
            ScriptFile::open(&root),
            Err(ArgumentError::ScriptNotFound { path: root.clone() })
        );
    }

    #[rstest]
    fn only_scripting_actions_need_credentials() {
        assert!(Action::Add.requires_credentials());
        assert!(
            Action::Exec {
                command: String::from("ls")
            }
            .requires_credentials()
        );
        assert!(!Action::Destroy.requires_credentials());
        assert!(!Action::ListImages.requires_credentials());
        assert!(!Action::ListNodes.requires_credentials());
    }
}
