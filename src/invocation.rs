//! Validation of the positional command line into one [`Invocation`].
//!
//! Everything here runs before any credential read or gateway connection,
//! so argument errors never have remote side effects.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::action::{Action, ActionKind};
use crate::provider::ProviderId;

/// Malformed or insufficient command line input.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ArgumentError {
    /// Raised for a provider outside the known set.
    #[error("provider {provider} not in supported list: {known}")]
    UnknownProvider {
        /// Provider as typed.
        provider: String,
        /// Known identifiers.
        known: String,
    },
    /// Raised for an action outside the closed vocabulary.
    #[error(
        "unknown action {0}: expected one of add, run, exec, poweron, poweroff, destroy, listimages, listnodes"
    )]
    UnknownAction(String),
    /// Raised when `exec` has no command.
    #[error("please quote the command to exec as the last parameter")]
    MissingCommand,
    /// Raised when a script action has no file argument.
    #[error("please pass the local file to {action} as the last parameter")]
    MissingScript {
        /// Action that needed the file.
        action: ActionKind,
    },
    /// Raised when the script file does not exist.
    #[error("file must exist! {path}")]
    ScriptNotFound {
        /// Path as typed.
        path: Utf8PathBuf,
    },
    /// Raised when the group name cannot be used as a tag.
    #[error("invalid group name {group:?}: {reason}")]
    InvalidGroup {
        /// Group as typed.
        group: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Raised when the command line itself is malformed.
    #[error("{0}")]
    Usage(String),
}

/// Raw positional arguments, as captured by the CLI parser.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawArguments {
    /// Provider identifier.
    pub provider: String,
    /// Provider identity (account or project).
    pub identity: String,
    /// Provider credential, literal or key-file path.
    pub credential: String,
    /// Group name.
    pub group: String,
    /// Action name.
    pub action: String,
    /// Action-specific argument.
    pub argument: Option<String>,
}

/// A validated invocation. Exactly one action governs it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// Provider to connect to.
    pub provider: ProviderId,
    /// Provider identity.
    pub identity: String,
    /// Raw credential argument; key-file providers resolve it later.
    pub credential: String,
    /// Group every selection is scoped to.
    pub group: String,
    /// Action to run.
    pub action: Action,
}

impl Invocation {
    /// Validates raw arguments. The provider is checked first so an unknown
    /// provider fails before anything else is inspected.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentError`] describing the first problem found.
    pub fn parse(raw: RawArguments) -> Result<Self, ArgumentError> {
        let provider = raw.provider.parse::<ProviderId>()?;
        let group = validate_group(&raw.group)?;
        let action = Action::parse(&raw.action, raw.argument.as_deref())?;
        Ok(Self {
            provider,
            identity: raw.identity,
            credential: raw.credential,
            group,
            action,
        })
    }
}

fn validate_group(raw: &str) -> Result<String, ArgumentError> {
    let group = raw.trim();
    if group.is_empty() {
        return Err(ArgumentError::InvalidGroup {
            group: raw.to_owned(),
            reason: "group name must not be empty",
        });
    }
    if group
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control() || ch == '=')
    {
        return Err(ArgumentError::InvalidGroup {
            group: raw.to_owned(),
            reason: "group name must not contain whitespace, control characters, or '='",
        });
    }
    Ok(group.to_owned())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn raw(provider: &str, action: &str, argument: Option<&str>) -> RawArguments {
        RawArguments {
            provider: provider.to_owned(),
            identity: String::from("identity"),
            credential: String::from("credential"),
            group: String::from("web"),
            action: action.to_owned(),
            argument: argument.map(str::to_owned),
        }
    }

    #[rstest]
    fn unknown_provider_wins_over_other_errors() {
        let err = Invocation::parse(raw("aws-ec2", "bogus", None)).expect_err("should fail");
        assert!(matches!(err, ArgumentError::UnknownProvider { .. }), "{err}");
    }

    #[rstest]
    fn listnodes_needs_no_argument() {
        let invocation = Invocation::parse(raw("stub", "listnodes", None)).expect("valid");
        assert_eq!(invocation.action, Action::ListNodes);
        assert_eq!(invocation.group, "web");
    }

    #[rstest]
    fn exec_one_argument_short_cites_the_command() {
        let err = Invocation::parse(raw("stub", "exec", None)).expect_err("should fail");
        assert_eq!(err, ArgumentError::MissingCommand);
        assert!(err.to_string().contains("command to exec"));
    }

    #[rstest]
    fn run_with_missing_file_fails_preflight() {
        let err = Invocation::parse(raw("scaleway", "run", Some("/missing/deploy.sh")))
            .expect_err("should fail");
        assert!(err.to_string().contains("file must exist"), "{err}");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("web tier")]
    #[case("a=b")]
    fn rejects_unusable_group_names(#[case] group: &str) {
        let mut args = raw("stub", "listnodes", None);
        args.group = group.to_owned();
        assert!(matches!(
            Invocation::parse(args),
            Err(ArgumentError::InvalidGroup { .. })
        ));
    }
}
