//! Gateway abstraction over cloud and local compute providers.
//!
//! The lifecycle orchestrator never talks to a provider API directly. Each
//! provider implements [`Gateway`], which exposes node creation, enumeration,
//! lifecycle transitions, and remote script dispatch over a set of nodes
//! selected by a [`NodePredicate`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::credentials::Credentials;
use crate::exec::TaskName;
use crate::selector::NodePredicate;

/// Lifecycle state reported for a node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeState {
    /// The node is being provisioned or is booting.
    Pending,
    /// The node is up.
    Running,
    /// The node is powered off but can be resumed.
    Suspended,
    /// The node has been destroyed. Terminal.
    Terminated,
    /// The provider reported a state outside the known set.
    Unrecognized,
}

impl NodeState {
    /// Returns the lowercase label used in progress output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute node as last reported by a gateway.
///
/// Nodes are transient values: the orchestrator re-resolves them from the
/// gateway for every operation and never caches them between phases.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// Provider specific identifier.
    pub id: String,
    /// Optional human readable name.
    pub name: Option<String>,
    /// Group tag the node belongs to. Empty when the node carries no group.
    pub group: String,
    /// Lifecycle state.
    pub state: NodeState,
    /// Private addresses in provider order.
    pub private_addresses: Vec<IpAddr>,
    /// Public addresses in provider order.
    pub public_addresses: Vec<IpAddr>,
}

impl Node {
    /// Returns all addresses, private first, then public.
    pub fn addresses(&self) -> impl Iterator<Item = &IpAddr> {
        self.private_addresses
            .iter()
            .chain(self.public_addresses.iter())
    }

    /// Address used to reach the node over SSH: the first public address,
    /// falling back to the first private one.
    #[must_use]
    pub fn ssh_address(&self) -> Option<IpAddr> {
        self.public_addresses
            .first()
            .or_else(|| self.private_addresses.first())
            .copied()
    }

    /// Renders the address list as `[10.0.0.1, 203.0.113.1]`.
    #[must_use]
    pub fn address_list(&self) -> String {
        let joined = self
            .addresses()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{joined}]")
    }

    /// Returns a copy of the node in a different state.
    #[must_use]
    pub fn with_state(&self, state: NodeState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.id, self.state)?;
        if !self.group.is_empty() {
            write!(f, ", group {}", self.group)?;
        }
        write!(f, ") {}", self.address_list())
    }
}

/// Parameters used to create a node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeTemplate {
    /// Human readable image label; the gateway resolves it to an image id.
    pub image_label: String,
    /// Optional operating system family that overrides the image label
    /// during image lookup.
    pub os_family: Option<String>,
    /// Optional minimum RAM in MiB. Gateways pick a size that satisfies it.
    pub min_ram_mib: Option<u32>,
    /// Hardware size or commercial type (for example `DEV1-S`).
    pub hardware: String,
    /// Zone or location identifier.
    pub location: String,
    /// Script applied on first boot, typically creating the admin account.
    pub bootstrap_script: Option<String>,
    /// Fixed login user for back-ends that cannot honour a dynamically
    /// created admin account.
    pub login_user: Option<String>,
}

impl NodeTemplate {
    /// Starts a builder for a [`NodeTemplate`].
    #[must_use]
    pub fn builder() -> NodeTemplateBuilder {
        NodeTemplateBuilder::new()
    }

    /// Validates the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.image_label.is_empty() {
            return Err(TemplateError::Validation("image_label".to_owned()));
        }
        if self.hardware.is_empty() {
            return Err(TemplateError::Validation("hardware".to_owned()));
        }
        if self.location.is_empty() {
            return Err(TemplateError::Validation("location".to_owned()));
        }
        if self.min_ram_mib == Some(0) {
            return Err(TemplateError::Validation("min_ram".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`NodeTemplate`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeTemplateBuilder {
    image_label: String,
    os_family: Option<String>,
    min_ram_mib: Option<u32>,
    hardware: String,
    location: String,
    bootstrap_script: Option<String>,
    login_user: Option<String>,
}

impl NodeTemplateBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image label.
    #[must_use]
    pub fn image_label(mut self, value: impl Into<String>) -> Self {
        self.image_label = value.into();
        self
    }

    /// Sets the operating system family.
    #[must_use]
    pub fn os_family(mut self, value: Option<String>) -> Self {
        self.os_family = value;
        self
    }

    /// Sets the RAM floor in MiB.
    #[must_use]
    pub const fn min_ram_mib(mut self, value: Option<u32>) -> Self {
        self.min_ram_mib = value;
        self
    }

    /// Sets the hardware size.
    #[must_use]
    pub fn hardware(mut self, value: impl Into<String>) -> Self {
        self.hardware = value.into();
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = value.into();
        self
    }

    /// Sets the first-boot script.
    #[must_use]
    pub fn bootstrap_script(mut self, value: Option<String>) -> Self {
        self.bootstrap_script = value;
        self
    }

    /// Sets the fixed login user.
    #[must_use]
    pub fn login_user(mut self, value: Option<String>) -> Self {
        self.login_user = value;
        self
    }

    /// Builds and validates the [`NodeTemplate`].
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<NodeTemplate, TemplateError> {
        let template = NodeTemplate {
            image_label: self.image_label.trim().to_owned(),
            os_family: trimmed_option(self.os_family),
            min_ram_mib: self.min_ram_mib,
            hardware: self.hardware.trim().to_owned(),
            location: self.location.trim().to_owned(),
            bootstrap_script: self.bootstrap_script,
            login_user: trimmed_option(self.login_user),
        };
        template.validate()?;
        Ok(template)
    }
}

fn trimmed_option(value: Option<String>) -> Option<String> {
    value
        .map(|inner| inner.trim().to_owned())
        .filter(|inner| !inner.is_empty())
}

/// Errors raised while assembling a node template.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum TemplateError {
    /// Raised when a required field is missing.
    #[error("missing or empty template field: {0}")]
    Validation(String),
}

/// An entry of a provider's image catalogue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider specific identifier.
    pub id: String,
    /// Image name.
    pub name: String,
    /// CPU architecture.
    pub architecture: String,
    /// Provider reported availability state.
    pub state: String,
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, {})",
            self.id, self.name, self.architecture, self.state
        )
    }
}

/// How a script is executed on each node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Run synchronously over the login session. The script text may be
    /// echoed in progress output.
    Inline,
    /// Launch as a detached task whose status is polled by name. The script
    /// text is never echoed.
    BackgroundTask(TaskName),
}

/// The script half of an execution request, as seen by a gateway.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteScript {
    body: String,
    mode: ExecutionMode,
    credentials: Credentials,
}

impl RemoteScript {
    /// Creates a script executed with the given login credentials.
    ///
    /// Scripts never run through the gateway's own privilege elevation; a
    /// script that needs root carries `sudo` in its body.
    #[must_use]
    pub const fn new(body: String, mode: ExecutionMode, credentials: Credentials) -> Self {
        Self {
            body,
            mode,
            credentials,
        }
    }

    /// Script source.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Execution mode.
    #[must_use]
    pub const fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Login credentials used to reach each node.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Always `false`: elevation belongs in the script body.
    #[must_use]
    pub const fn runs_as_root(&self) -> bool {
        false
    }

    /// Task name when the script is wrapped in a background task.
    #[must_use]
    pub const fn task_name(&self) -> Option<&TaskName> {
        match &self.mode {
            ExecutionMode::Inline => None,
            ExecutionMode::BackgroundTask(name) => Some(name),
        }
    }
}

/// Output captured from one node's script run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecResponse {
    /// Exit status; `None` when the node never reported one.
    pub exit_status: Option<i32>,
    /// Captured standard output.
    pub output: String,
    /// Captured standard error.
    pub error: String,
}

impl ExecResponse {
    /// Returns `true` when the script exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_status, Some(0))
    }
}

impl fmt::Display for ExecResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .exit_status
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        write!(
            f,
            "exit status {status}, output: {:?}, error: {:?}",
            self.output.trim_end(),
            self.error.trim_end()
        )
    }
}

/// Outcome of dispatching a script to one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeOutcome {
    /// The script ran and reported a response, whatever its exit status.
    Completed(ExecResponse),
    /// The node could not run the script (transport failure, timeout).
    Failed {
        /// Human readable reason.
        message: String,
    },
}

impl NodeOutcome {
    /// Returns `true` for a completed run with exit status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Completed(response) => response.is_success(),
            Self::Failed { .. } => false,
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(response) => response.fmt(f),
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// One node and what happened when the script was dispatched to it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeResult {
    /// Node as resolved at dispatch time.
    pub node: Node,
    /// Script outcome.
    pub outcome: NodeOutcome,
}

/// Per-node results of a single script dispatch, keyed by node id.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeResults {
    entries: BTreeMap<String, NodeResult>,
}

impl NodeResults {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for `node`, replacing any earlier entry.
    pub fn insert(&mut self, node: Node, outcome: NodeOutcome) {
        self.entries
            .insert(node.id.clone(), NodeResult { node, outcome });
    }

    /// Looks up the result for a node id.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&NodeResult> {
        self.entries.get(node_id)
    }

    /// Number of nodes the script was dispatched to.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no node was targeted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the results.
    pub fn iter(&self) -> impl Iterator<Item = &NodeResult> {
        self.entries.values()
    }

    /// Number of nodes whose script exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.iter()
            .filter(|result| result.outcome.is_success())
            .count()
    }

    /// Number of nodes whose script failed or could not run.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

impl FromIterator<(Node, NodeOutcome)> for NodeResults {
    fn from_iter<I: IntoIterator<Item = (Node, NodeOutcome)>>(iter: I) -> Self {
        let mut results = Self::new();
        for (node, outcome) in iter {
            results.insert(node, outcome);
        }
        results
    }
}

/// Names one [`Gateway`] operation, for back-ends that lack some of them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GatewayOperation {
    /// [`Gateway::create_nodes`].
    CreateNodes,
    /// [`Gateway::list_nodes`].
    ListNodes,
    /// [`Gateway::list_images`].
    ListImages,
    /// [`Gateway::run_script`].
    RunScript,
    /// [`Gateway::suspend_matching`].
    Suspend,
    /// [`Gateway::resume_matching`].
    Resume,
    /// [`Gateway::destroy_matching`].
    Destroy,
}

impl fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateNodes => "node creation",
            Self::ListNodes => "node listing",
            Self::ListImages => "image listing",
            Self::RunScript => "script execution",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Capability set every provider back-end implements.
///
/// Selection always happens against the provider's live state at call time;
/// implementations must not answer from a cached snapshot.
pub trait Gateway {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates `count` nodes in `group` from `template`.
    fn create_nodes<'a>(
        &'a self,
        group: &'a str,
        count: usize,
        template: &'a NodeTemplate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error>;

    /// Lists every node visible to the account.
    fn list_nodes(&self) -> GatewayFuture<'_, Vec<Node>, Self::Error>;

    /// Lists the image catalogue.
    fn list_images(&self) -> GatewayFuture<'_, Vec<Image>, Self::Error>;

    /// Runs `script` on every node matching `predicate` and waits for all of
    /// them. Per-node failures are recorded in the result, not raised.
    fn run_script<'a>(
        &'a self,
        predicate: &'a NodePredicate,
        script: &'a RemoteScript,
    ) -> GatewayFuture<'a, NodeResults, Self::Error>;

    /// Suspends matching nodes and returns them in their new state.
    fn suspend_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error>;

    /// Resumes matching nodes and returns them in their new state.
    fn resume_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error>;

    /// Destroys matching nodes and returns them in their new state.
    fn destroy_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error>;

    /// Releases the provider connection. Must be idempotent.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use rstest::rstest;

    use super::*;

    fn node(id: &str, private: &[Ipv4Addr], public: &[Ipv4Addr]) -> Node {
        Node {
            id: id.to_owned(),
            name: None,
            group: String::from("web"),
            state: NodeState::Running,
            private_addresses: private.iter().copied().map(IpAddr::V4).collect(),
            public_addresses: public.iter().copied().map(IpAddr::V4).collect(),
        }
    }

    #[rstest]
    fn addresses_list_private_before_public() {
        let n = node(
            "n-1",
            &[Ipv4Addr::new(10, 0, 0, 1)],
            &[Ipv4Addr::new(203, 0, 113, 1)],
        );
        assert_eq!(n.address_list(), "[10.0.0.1, 203.0.113.1]");
        assert_eq!(
            n.ssh_address(),
            Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)))
        );
    }

    #[rstest]
    fn ssh_address_falls_back_to_private() {
        let n = node("n-1", &[Ipv4Addr::new(10, 0, 0, 9)], &[]);
        assert_eq!(n.ssh_address(), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))));
        assert_eq!(node("n-2", &[], &[]).ssh_address(), None);
    }

    #[rstest]
    fn template_builder_trims_and_validates() {
        let template = NodeTemplate::builder()
            .image_label("  Ubuntu 24.04 ")
            .hardware("DEV1-S")
            .location("fr-par-1")
            .os_family(Some(String::from("  ")))
            .login_user(Some(String::from(" toor ")))
            .build()
            .expect("template should build");
        assert_eq!(template.image_label, "Ubuntu 24.04");
        assert_eq!(template.os_family, None);
        assert_eq!(template.login_user.as_deref(), Some("toor"));
    }

    #[rstest]
    #[case(NodeTemplate::builder().hardware("h").location("l"), "image_label")]
    #[case(NodeTemplate::builder().image_label("i").location("l"), "hardware")]
    #[case(NodeTemplate::builder().image_label("i").hardware("h"), "location")]
    #[case(
        NodeTemplate::builder().image_label("i").hardware("h").location("l").min_ram_mib(Some(0)),
        "min_ram"
    )]
    fn template_builder_rejects_missing_fields(
        #[case] builder: NodeTemplateBuilder,
        #[case] field: &str,
    ) {
        let err = builder.build().expect_err("template should be rejected");
        assert_eq!(err, TemplateError::Validation(field.to_owned()));
    }

    #[rstest]
    fn node_results_count_successes_and_failures() {
        let results: NodeResults = [
            (
                node("a", &[], &[]),
                NodeOutcome::Completed(ExecResponse {
                    exit_status: Some(0),
                    ..ExecResponse::default()
                }),
            ),
            (
                node("b", &[], &[]),
                NodeOutcome::Completed(ExecResponse {
                    exit_status: Some(3),
                    ..ExecResponse::default()
                }),
            ),
            (
                node("c", &[], &[]),
                NodeOutcome::Failed {
                    message: String::from("unreachable"),
                },
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results.succeeded(), 1);
        assert_eq!(results.failed(), 2);
        assert!(results.get("c").is_some_and(|r| !r.outcome.is_success()));
    }
}
