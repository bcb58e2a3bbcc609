//! Core library for the `flotilla` group lifecycle tool.
//!
//! A group is a tag shared by cloud nodes. The crate creates nodes in a
//! group, runs scripts across it over SSH, powers it off and on, destroys
//! it, and lists nodes and images, all through a provider-neutral
//! [`Gateway`] with a Scaleway implementation and an in-memory stub.

pub mod action;
pub mod app;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod exec;
pub mod gateway;
pub mod invocation;
pub mod lifecycle;
pub mod local_file;
pub mod logging;
pub mod provider;
pub mod report;
pub mod scaleway;
pub mod selector;
pub mod ssh;
pub mod stub;
pub mod test_support;

pub use action::{Action, ActionKind, ScriptFile};
pub use app::AppError;
pub use config::{ConfigError, FlotillaConfig, ScalewayConfig};
pub use connection::Connection;
pub use credentials::{CredentialError, CredentialResolver, Credentials};
pub use exec::{ExecutionSpec, ScriptEngine, ScriptExecutionError, TaskName};
pub use gateway::{
    ExecResponse, ExecutionMode, Gateway, GatewayFuture, GatewayOperation, Image, Node,
    NodeOutcome, NodeResults, NodeState, NodeTemplate, RemoteScript,
};
pub use invocation::{ArgumentError, Invocation, RawArguments};
pub use lifecycle::{ActionOutcome, LifecycleError, LifecycleOrchestrator, OrchestratorSettings};
pub use provider::ProviderId;
pub use report::{Progress, Reporter};
pub use scaleway::{ScalewayGateway, ScalewayGatewayError};
pub use selector::{NodePredicate, StateFilter};
pub use ssh::{CommandOutput, CommandRunner, ProcessCommandRunner, SshConfig, SshTransport};
pub use stub::{StubError, StubGateway};
