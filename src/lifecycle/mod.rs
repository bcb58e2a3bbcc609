//! Drives one action against a group of nodes.
//!
//! The orchestrator maps each [`Action`] onto gateway calls, re-resolving
//! nodes from live provider state for every phase. It never talks to a
//! provider directly and converts every gateway failure into a
//! [`LifecycleError`] at this boundary.

mod bootstrap;

use thiserror::Error;
use tracing::{debug, info};

use crate::action::{Action, ActionKind, ScriptFile};
use crate::credentials::Credentials;
use crate::exec::{ExecutionSpec, ScriptEngine, ScriptExecutionError};
use crate::gateway::{Gateway, Image, Node, NodeResults, NodeTemplate, TemplateError};
use crate::report::Progress;
use crate::selector::NodePredicate;

pub use bootstrap::admin_access_script;

/// Post-boot install script run after `add` when none is configured.
pub const DEFAULT_INSTALL_SCRIPT: &str = "sudo wget -qO- https://get.docker.com/ | sh";

/// Errors caught while running an action.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised when `add` fails to provision its node.
    #[error("error adding node to group {group}: {message}")]
    NodeCreation {
        /// Target group.
        group: String,
        /// Underlying failure.
        message: String,
    },
    /// Raised when a script could not be dispatched to the group.
    #[error(transparent)]
    ScriptExecution(#[from] ScriptExecutionError),
    /// Raised for any other gateway failure.
    #[error("error: {message}")]
    Unclassified {
        /// Underlying failure.
        message: String,
    },
    /// Raised when a scripting action arrives without login credentials.
    #[error("error: {action} requires login credentials")]
    MissingCredentials {
        /// Action that needed them.
        action: ActionKind,
    },
}

impl LifecycleError {
    fn unclassified(err: &impl std::error::Error) -> Self {
        Self::Unclassified {
            message: err.to_string(),
        }
    }
}

/// What an action did, for callers that inspect rather than print.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ActionOutcome {
    /// `add` created one node and ran the install script on the group.
    Created {
        /// The new node.
        node: Node,
        /// Results of the post-boot install script.
        install: NodeResults,
    },
    /// `run` or `exec` finished.
    Scripted(NodeResults),
    /// `poweroff` ran its script, then suspended running nodes.
    PoweredOff {
        /// Results of the pre-suspend script.
        script: NodeResults,
        /// Nodes suspended.
        suspended: Vec<Node>,
    },
    /// `poweron` resumed suspended nodes, then ran its script.
    PoweredOn {
        /// Nodes resumed.
        resumed: Vec<Node>,
        /// Results of the post-resume script.
        script: NodeResults,
    },
    /// `destroy` finished.
    Destroyed(Vec<Node>),
    /// `listimages` finished.
    Images(Vec<Image>),
    /// `listnodes` finished.
    Nodes(Vec<Node>),
}

/// Configured defaults for node templates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateDefaults {
    /// Image label.
    pub image_label: String,
    /// Operating system family override.
    pub os_family: Option<String>,
    /// Hardware size.
    pub hardware: String,
    /// Location or zone.
    pub location: String,
    /// RAM floor in MiB.
    pub min_ram_mib: Option<u32>,
}

/// Settings the orchestrator applies to every action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorSettings {
    /// Template defaults for `add`.
    pub template: TemplateDefaults,
    /// Script run inline on the group after `add`.
    pub install_script: String,
    /// Login user applied to templates of providers with a fixed account.
    pub fixed_login_user: Option<String>,
}

impl OrchestratorSettings {
    /// Settings with the default install script and no fixed login user.
    #[must_use]
    pub fn new(template: TemplateDefaults) -> Self {
        Self {
            template,
            install_script: DEFAULT_INSTALL_SCRIPT.to_owned(),
            fixed_login_user: None,
        }
    }
}

/// Runs actions through a borrowed gateway.
#[derive(Debug)]
pub struct LifecycleOrchestrator<'g, G> {
    gateway: &'g G,
    settings: OrchestratorSettings,
}

impl<'g, G: Gateway> LifecycleOrchestrator<'g, G> {
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(gateway: &'g G, settings: OrchestratorSettings) -> Self {
        Self { gateway, settings }
    }

    /// Executes `action` against `group`, reporting progress as it goes.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] for node creation failures, whole-dispatch
    /// script failures, and any other gateway failure. Per-node script
    /// failures are returned inside the outcome.
    pub async fn execute<P: Progress>(
        &self,
        group: &str,
        action: &Action,
        login: Option<&Credentials>,
        progress: &mut P,
    ) -> Result<ActionOutcome, LifecycleError> {
        debug!(group, %action, "executing action");
        match action {
            Action::Add => {
                let credentials = require(action, login)?;
                self.add(group, credentials, progress).await
            }
            Action::Run { script } => {
                let credentials = require(action, login)?;
                progress.announce(&format!(
                    "running [{script}] on group {group} as {}",
                    credentials.username()
                ));
                let spec = wrapped(group, script, credentials)?;
                let results = self.dispatch(&spec, progress).await?;
                Ok(ActionOutcome::Scripted(results))
            }
            Action::Exec { command } => {
                let credentials = require(action, login)?;
                progress.announce(&format!(
                    "running [{command}] on group {group} as {}",
                    credentials.username()
                ));
                let spec = ExecutionSpec::inline(
                    NodePredicate::in_group(group),
                    command.clone(),
                    credentials.clone(),
                );
                let results = self.dispatch(&spec, progress).await?;
                Ok(ActionOutcome::Scripted(results))
            }
            Action::PowerOff { script } => {
                let credentials = require(action, login)?;
                self.power_off(group, script, credentials, progress).await
            }
            Action::PowerOn { script } => {
                let credentials = require(action, login)?;
                self.power_on(group, script, credentials, progress).await
            }
            Action::Destroy => {
                progress.announce(&format!("destroying nodes in group {group}"));
                let destroyed = self
                    .gateway
                    .destroy_matching(&NodePredicate::not_terminated_in(group))
                    .await
                    .map_err(|err| LifecycleError::unclassified(&err))?;
                info!(group, count = destroyed.len(), "nodes destroyed");
                progress.transitioned("destroyed", &destroyed);
                Ok(ActionOutcome::Destroyed(destroyed))
            }
            Action::ListImages => {
                let images = self
                    .gateway
                    .list_images()
                    .await
                    .map_err(|err| LifecycleError::unclassified(&err))?;
                progress.images(&images);
                Ok(ActionOutcome::Images(images))
            }
            Action::ListNodes => {
                let listed = self
                    .gateway
                    .list_nodes()
                    .await
                    .map_err(|err| LifecycleError::unclassified(&err))?;
                let nodes = NodePredicate::all().select(listed);
                progress.nodes(&nodes);
                Ok(ActionOutcome::Nodes(nodes))
            }
        }
    }

    async fn add<P: Progress>(
        &self,
        group: &str,
        credentials: &Credentials,
        progress: &mut P,
    ) -> Result<ActionOutcome, LifecycleError> {
        progress.announce(&format!("adding node to group {group}"));
        let creation_error = |message: String| LifecycleError::NodeCreation {
            group: group.to_owned(),
            message,
        };

        let template = self
            .template(credentials)
            .map_err(|err| creation_error(err.to_string()))?;
        let created = self
            .gateway
            .create_nodes(group, 1, &template)
            .await
            .map_err(|err| creation_error(err.to_string()))?;
        let node = created
            .into_iter()
            .next()
            .ok_or_else(|| creation_error(String::from("provider returned no node")))?;
        info!(group, node = %node.id, "node created");
        progress.node_created(&node);

        let install_spec = ExecutionSpec::inline(
            NodePredicate::in_group(group),
            self.settings.install_script.clone(),
            credentials.clone(),
        );
        let install = self.dispatch(&install_spec, progress).await?;
        Ok(ActionOutcome::Created { node, install })
    }

    async fn power_off<P: Progress>(
        &self,
        group: &str,
        script: &ScriptFile,
        credentials: &Credentials,
        progress: &mut P,
    ) -> Result<ActionOutcome, LifecycleError> {
        progress.announce(&format!(
            "turnoff [{script}] on group {group} as {}",
            credentials.username()
        ));
        let spec = wrapped(group, script, credentials)?;
        let results = self.dispatch(&spec, progress).await?;

        progress.announce(&format!("turn off nodes in group {group}"));
        let suspended = self
            .gateway
            .suspend_matching(&NodePredicate::running_in(group))
            .await
            .map_err(|err| LifecycleError::unclassified(&err))?;
        info!(group, count = suspended.len(), "nodes suspended");
        progress.transitioned("turnoff", &suspended);
        Ok(ActionOutcome::PoweredOff {
            script: results,
            suspended,
        })
    }

    async fn power_on<P: Progress>(
        &self,
        group: &str,
        script: &ScriptFile,
        credentials: &Credentials,
        progress: &mut P,
    ) -> Result<ActionOutcome, LifecycleError> {
        progress.announce(&format!(
            "turnon [{script}] on group {group} as {}",
            credentials.username()
        ));
        let resumed = self
            .gateway
            .resume_matching(&NodePredicate::suspended_in(group))
            .await
            .map_err(|err| LifecycleError::unclassified(&err))?;
        info!(group, count = resumed.len(), "nodes resumed");
        progress.transitioned("turnon", &resumed);

        let spec = wrapped(group, script, credentials)?;
        let results = self.dispatch(&spec, progress).await?;
        Ok(ActionOutcome::PoweredOn {
            resumed,
            script: results,
        })
    }

    async fn dispatch<P: Progress>(
        &self,
        spec: &ExecutionSpec,
        progress: &mut P,
    ) -> Result<NodeResults, LifecycleError> {
        let results = ScriptEngine::new(self.gateway).execute(spec).await?;
        progress.script_results(&results);
        Ok(results)
    }

    fn template(&self, credentials: &Credentials) -> Result<NodeTemplate, TemplateError> {
        let defaults = &self.settings.template;
        NodeTemplate::builder()
            .image_label(defaults.image_label.clone())
            .os_family(defaults.os_family.clone())
            .min_ram_mib(defaults.min_ram_mib)
            .hardware(defaults.hardware.clone())
            .location(defaults.location.clone())
            .bootstrap_script(Some(admin_access_script(credentials)))
            .login_user(self.settings.fixed_login_user.clone())
            .build()
    }
}

fn require<'c>(
    action: &Action,
    credentials: Option<&'c Credentials>,
) -> Result<&'c Credentials, LifecycleError> {
    credentials.ok_or(LifecycleError::MissingCredentials {
        action: action.kind(),
    })
}

fn wrapped(
    group: &str,
    script: &ScriptFile,
    credentials: &Credentials,
) -> Result<ExecutionSpec, LifecycleError> {
    let body = script.read().map_err(|message| ScriptExecutionError {
        command: script.file_name().to_owned(),
        group: group.to_owned(),
        message,
    })?;
    Ok(ExecutionSpec::background_task(
        NodePredicate::in_group(group),
        script,
        body,
        credentials.clone(),
    ))
}
