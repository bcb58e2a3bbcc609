//! In-memory gateway.
//!
//! The stub keeps its nodes in process memory, so every lifecycle action
//! can be exercised offline. Clones share state, which lets tests keep a
//! handle after handing the gateway to a [`crate::connection::Connection`].

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::exec::TaskName;
use crate::gateway::{
    ExecResponse, ExecutionMode, Gateway, GatewayFuture, GatewayOperation, Image, Node,
    NodeOutcome, NodeResults, NodeState, NodeTemplate, RemoteScript,
};
use crate::selector::NodePredicate;

/// Errors injected into the stub by tests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StubError {
    /// Node creation was told to fail.
    #[error("stub node creation failed: {0}")]
    Create(String),
    /// Script dispatch was told to fail.
    #[error("stub dispatch failed: {0}")]
    Dispatch(String),
    /// Node or image listing was told to fail.
    #[error("stub listing failed: {0}")]
    List(String),
    /// The operation was withdrawn from this stub.
    #[error("stub gateway does not support {0}")]
    Unsupported(GatewayOperation),
    /// Every synthetic address has been handed out.
    #[error("stub address space exhausted after {0} nodes")]
    Exhausted(u32),
}

/// One script delivery to one node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dispatch {
    /// Node the script reached.
    pub node_id: String,
    /// Group of that node.
    pub group: String,
    /// Script body.
    pub body: String,
    /// Task name for wrapped scripts.
    pub task: Option<TaskName>,
    /// Login user.
    pub username: String,
}

#[derive(Debug, Default)]
struct StubState {
    identity: String,
    credential: Option<String>,
    nodes: Vec<Node>,
    next_index: u32,
    templates: Vec<NodeTemplate>,
    dispatches: Vec<Dispatch>,
    close_calls: usize,
    create_failure: Option<String>,
    run_failure: Option<String>,
    list_failure: Option<String>,
    withdrawn: HashSet<GatewayOperation>,
}

/// Gateway backed by process memory.
#[derive(Clone, Debug, Default)]
pub struct StubGateway {
    state: Arc<Mutex<StubState>>,
}

impl StubGateway {
    /// Creates an empty, anonymous stub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a stub for `identity`, authenticated by the contents of a key
    /// file.
    #[must_use]
    pub fn connect(identity: &str, credential: String) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.lock();
            state.identity = identity.to_owned();
            state.credential = Some(credential);
        }
        debug!(identity, "stub gateway opened");
        gateway
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a node in `group` with the given state and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StubError::Exhausted`] once the synthetic address space is
    /// used up.
    pub fn seed(&self, group: &str, state: NodeState) -> Result<Node, StubError> {
        let mut guard = self.lock();
        let node = guard.allocate(group, state)?;
        guard.nodes.push(node.clone());
        Ok(node)
    }

    /// Current nodes, terminated ones included.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.lock().nodes.clone()
    }

    /// Every script delivery so far.
    #[must_use]
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.lock().dispatches.clone()
    }

    /// Templates passed to node creation.
    #[must_use]
    pub fn templates(&self) -> Vec<NodeTemplate> {
        self.lock().templates.clone()
    }

    /// Identity the stub was opened with.
    #[must_use]
    pub fn identity(&self) -> String {
        self.lock().identity.clone()
    }

    /// Credential the stub was opened with.
    #[must_use]
    pub fn credential(&self) -> Option<String> {
        self.lock().credential.clone()
    }

    /// How many times `close` was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Makes node creation fail with `message`.
    pub fn fail_create(&self, message: &str) {
        self.lock().create_failure = Some(message.to_owned());
    }

    /// Makes script dispatch fail as a whole with `message`.
    pub fn fail_run_script(&self, message: &str) {
        self.lock().run_failure = Some(message.to_owned());
    }

    /// Makes node and image listing fail with `message`.
    pub fn fail_list(&self, message: &str) {
        self.lock().list_failure = Some(message.to_owned());
    }

    /// Removes `operation`, so calls to it return
    /// [`StubError::Unsupported`].
    pub fn withdraw(&self, operation: GatewayOperation) {
        self.lock().withdrawn.insert(operation);
    }

    fn transition(
        &self,
        operation: GatewayOperation,
        predicate: &NodePredicate,
        target: NodeState,
    ) -> Result<Vec<Node>, StubError> {
        let mut guard = self.lock();
        guard.supports(operation)?;
        if let Some(message) = &guard.list_failure {
            return Err(StubError::List(message.clone()));
        }
        let mut affected = Vec::new();
        for node in guard.nodes.iter_mut().filter(|node| predicate.matches(node)) {
            node.state = target;
            affected.push(node.clone());
        }
        debug!(%predicate, state = %target, count = affected.len(), "stub transition");
        Ok(affected)
    }
}

impl StubState {
    fn supports(&self, operation: GatewayOperation) -> Result<(), StubError> {
        if self.withdrawn.contains(&operation) {
            return Err(StubError::Unsupported(operation));
        }
        Ok(())
    }

    fn allocate(&mut self, group: &str, state: NodeState) -> Result<Node, StubError> {
        let index = self
            .next_index
            .checked_add(1)
            .ok_or(StubError::Exhausted(self.next_index))?;
        let private = synthetic_address(PRIVATE_BASE, PRIVATE_BITS, index)
            .ok_or(StubError::Exhausted(self.next_index))?;
        let public = synthetic_address(PUBLIC_BASE, PUBLIC_BITS, index)
            .ok_or(StubError::Exhausted(self.next_index))?;
        self.next_index = index;
        Ok(Node {
            id: format!("stub-{index}"),
            name: Some(format!("{group}-{index}")),
            group: group.to_owned(),
            state,
            private_addresses: vec![IpAddr::V4(private)],
            public_addresses: vec![IpAddr::V4(public)],
        })
    }
}

const PRIVATE_BASE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);
const PRIVATE_BITS: u32 = 24;
const PUBLIC_BASE: Ipv4Addr = Ipv4Addr::new(198, 18, 0, 0);
const PUBLIC_BITS: u32 = 17;

/// Offsets `base` by `index`, staying inside its `bits`-wide block.
fn synthetic_address(base: Ipv4Addr, bits: u32, index: u32) -> Option<Ipv4Addr> {
    let capacity = 1_u32.checked_shl(bits)?;
    if index >= capacity {
        return None;
    }
    u32::from(base).checked_add(index).map(Ipv4Addr::from)
}

impl Gateway for StubGateway {
    type Error = StubError;

    fn create_nodes<'a>(
        &'a self,
        group: &'a str,
        count: usize,
        template: &'a NodeTemplate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let mut guard = self.lock();
            guard.supports(GatewayOperation::CreateNodes)?;
            if let Some(message) = &guard.create_failure {
                return Err(StubError::Create(message.clone()));
            }
            guard.templates.push(template.clone());
            let created = (0..count)
                .map(|_| guard.allocate(group, NodeState::Running))
                .collect::<Result<Vec<_>, _>>()?;
            guard.nodes.extend(created.iter().cloned());
            Ok(created)
        })
    }

    fn list_nodes(&self) -> GatewayFuture<'_, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let guard = self.lock();
            guard.supports(GatewayOperation::ListNodes)?;
            if let Some(message) = &guard.list_failure {
                return Err(StubError::List(message.clone()));
            }
            Ok(guard.nodes.clone())
        })
    }

    fn list_images(&self) -> GatewayFuture<'_, Vec<Image>, Self::Error> {
        Box::pin(async move {
            let guard = self.lock();
            guard.supports(GatewayOperation::ListImages)?;
            if let Some(message) = &guard.list_failure {
                return Err(StubError::List(message.clone()));
            }
            Ok(vec![Image {
                id: String::from("stub-image-1"),
                name: String::from("Stub Linux"),
                architecture: String::from("x86_64"),
                state: String::from("available"),
            }])
        })
    }

    fn run_script<'a>(
        &'a self,
        predicate: &'a NodePredicate,
        script: &'a RemoteScript,
    ) -> GatewayFuture<'a, NodeResults, Self::Error> {
        Box::pin(async move {
            let mut guard = self.lock();
            guard.supports(GatewayOperation::RunScript)?;
            if let Some(message) = &guard.run_failure {
                return Err(StubError::Dispatch(message.clone()));
            }
            let targets = predicate.select(guard.nodes.clone());
            let mut results = NodeResults::new();
            for node in targets {
                let outcome = respond(&node, script);
                if outcome.is_success() {
                    guard.dispatches.push(Dispatch {
                        node_id: node.id.clone(),
                        group: node.group.clone(),
                        body: script.body().to_owned(),
                        task: script.task_name().cloned(),
                        username: script.credentials().username().to_owned(),
                    });
                }
                results.insert(node, outcome);
            }
            Ok(results)
        })
    }

    fn suspend_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move { self.transition(GatewayOperation::Suspend, predicate, NodeState::Suspended) })
    }

    fn resume_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move { self.transition(GatewayOperation::Resume, predicate, NodeState::Running) })
    }

    fn destroy_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move { self.transition(GatewayOperation::Destroy, predicate, NodeState::Terminated) })
    }

    fn close(&mut self) {
        self.lock().close_calls += 1;
    }
}
