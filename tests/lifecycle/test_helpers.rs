//! Shared fixtures for lifecycle BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use flotilla::config::stub_template_defaults;
use flotilla::{ActionOutcome, Credentials, NodeState, OrchestratorSettings, StubGateway};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

/// Group every scenario acts on.
pub const GROUP: &str = "web";

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub gateway: StubGateway,
    pub scripts: Arc<TempDir>,
    pub credentials: Credentials,
    pub outcome: Option<LifecycleResult>,
    pub stdout: String,
    pub exit_code: i32,
}

#[derive(Clone, Debug)]
pub enum LifecycleResult {
    Success(ActionOutcome),
    Failure(String),
}

#[derive(Debug, Error)]
pub enum LifecycleTestError {
    #[error("invalid lifecycle fixture: {0}")]
    Fixture(String),
}

pub type LifecycleContextResult = Result<LifecycleContext, LifecycleTestError>;

impl LifecycleContext {
    /// Absolute path of a file in the scenario's script directory.
    pub fn script_path(&self, name: &str) -> Result<Utf8PathBuf, LifecycleTestError> {
        Utf8PathBuf::from_path_buf(self.scripts.path().join(name))
            .map_err(|path| LifecycleTestError::Fixture(format!("non-utf8 path {}", path.display())))
    }

    pub fn settings() -> OrchestratorSettings {
        OrchestratorSettings::new(stub_template_defaults())
    }
}

pub fn parse_state(label: &str) -> Option<NodeState> {
    [
        NodeState::Pending,
        NodeState::Running,
        NodeState::Suspended,
        NodeState::Terminated,
        NodeState::Unrecognized,
    ]
    .into_iter()
    .find(|state| state.as_str() == label)
}

#[fixture]
pub fn lifecycle_context_result() -> LifecycleContextResult {
    let scripts = TempDir::new()
        .map_err(|err| LifecycleTestError::Fixture(format!("script dir: {err}")))?;
    Ok(LifecycleContext {
        gateway: StubGateway::connect("tester", String::from("provider-secret")),
        scripts: Arc::new(scripts),
        credentials: Credentials::with_private_key("tester", "KEY")
            .and_public_key(Some(String::from("ssh-ed25519 AAAA tester"))),
        outcome: None,
        stdout: String::new(),
        exit_code: 0,
    })
}

#[fixture]
pub fn lifecycle_context(lifecycle_context_result: LifecycleContextResult) -> LifecycleContext {
    lifecycle_context_result
        .unwrap_or_else(|err| panic!("lifecycle context fixture should initialise: {err}"))
}
