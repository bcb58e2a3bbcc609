//! Script execution across the nodes of a group.
//!
//! The engine pairs a node predicate with a [`RemoteScript`] and asks the
//! gateway to run it on every node matched at call time. Per-node failures
//! come back as data inside [`NodeResults`]; only a failure of the dispatch
//! as a whole is raised as [`ScriptExecutionError`].

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::action::ScriptFile;
use crate::credentials::Credentials;
use crate::gateway::{ExecutionMode, Gateway, NodeOutcome, NodeResults, RemoteScript};
use crate::selector::NodePredicate;

/// Name under which a wrapped script runs as a background task.
///
/// Derived from the script file name: everything from the first `.` is
/// dropped, characters outside `[A-Za-z0-9_-]` become `_`, and the result is
/// prefixed with `_`, so `deploy.sh` runs as `_deploy`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TaskName(String);

impl TaskName {
    /// Derives the task name for a script file name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flotilla::exec::TaskName;
    /// assert_eq!(TaskName::for_file_name("deploy.sh").as_str(), "_deploy");
    /// assert_eq!(TaskName::for_file_name("warm up.tar.gz").as_str(), "_warm_up");
    /// ```
    #[must_use]
    pub fn for_file_name(file_name: &str) -> Self {
        let stem = file_name.split('.').next().unwrap_or_default();
        if stem.is_empty() {
            return Self(String::from("_task"));
        }
        let sanitised: String = stem
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        Self(format!("_{sanitised}"))
    }

    /// Task name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A script and the predicate selecting the nodes it runs on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionSpec {
    target: NodePredicate,
    script: RemoteScript,
    label: String,
}

impl ExecutionSpec {
    /// Runs `body` synchronously on each node. The body is echoed in
    /// progress output and diagnostics.
    #[must_use]
    pub fn inline(target: NodePredicate, body: impl Into<String>, credentials: Credentials) -> Self {
        let body = body.into();
        Self {
            target,
            label: body.clone(),
            script: RemoteScript::new(body, ExecutionMode::Inline, credentials),
        }
    }

    /// Wraps the contents of `file` in a background task named after it.
    /// Only the file name ever appears in output.
    #[must_use]
    pub fn background_task(
        target: NodePredicate,
        file: &ScriptFile,
        body: String,
        credentials: Credentials,
    ) -> Self {
        let task = TaskName::for_file_name(file.file_name());
        Self {
            target,
            label: file.file_name().to_owned(),
            script: RemoteScript::new(body, ExecutionMode::BackgroundTask(task), credentials),
        }
    }

    /// Node predicate.
    #[must_use]
    pub const fn target(&self) -> &NodePredicate {
        &self.target
    }

    /// Script handed to the gateway.
    #[must_use]
    pub const fn script(&self) -> &RemoteScript {
        &self.script
    }

    /// Text identifying the command in output: the literal body for inline
    /// scripts, the file name for wrapped ones.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Raised when a script could not be dispatched to the group at all.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("error executing {command} on group {group}: {message}")]
pub struct ScriptExecutionError {
    /// Command label.
    pub command: String,
    /// Target group, or `*` when unscoped.
    pub group: String,
    /// Underlying failure.
    pub message: String,
}

/// Dispatches [`ExecutionSpec`]s through a gateway.
#[derive(Debug)]
pub struct ScriptEngine<'g, G> {
    gateway: &'g G,
}

impl<'g, G: Gateway> ScriptEngine<'g, G> {
    /// Creates an engine over a borrowed gateway.
    #[must_use]
    pub const fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    /// Runs the script on every node the spec's predicate matches now.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptExecutionError`] when the gateway fails the dispatch
    /// as a whole. Failures on individual nodes are recorded in the result.
    pub async fn execute(&self, spec: &ExecutionSpec) -> Result<NodeResults, ScriptExecutionError> {
        let group = spec.target().group().unwrap_or("*");
        let task = spec.script().task_name().map(ToString::to_string);
        let results = self
            .gateway
            .run_script(spec.target(), spec.script())
            .await
            .map_err(|err| ScriptExecutionError {
                command: spec.label().to_owned(),
                group: group.to_owned(),
                message: err.to_string(),
            })?;

        info!(
            group,
            task = task.as_deref().unwrap_or("inline"),
            nodes = results.len(),
            failed = results.failed(),
            "script dispatched"
        );
        for result in results.iter() {
            match &result.outcome {
                NodeOutcome::Completed(response) if !response.is_success() => {
                    warn!(node = %result.node.id, %response, "script exited unsuccessfully");
                }
                NodeOutcome::Failed { message } => {
                    warn!(node = %result.node.id, message, "script could not run");
                }
                NodeOutcome::Completed(_) => {}
            }
        }
        Ok(results)
    }
}
