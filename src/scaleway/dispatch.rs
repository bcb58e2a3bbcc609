//! Concurrent script dispatch over SSH.
//!
//! Each node is reached from tokio's blocking pool, since the `ssh` client
//! is driven through blocking process calls. At most
//! [`MAX_PARALLEL_DISPATCHES`] nodes are in flight at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::gateway::{Node, NodeOutcome, NodeResults, RemoteScript};
use crate::ssh::{CommandRunner, SshError, SshSession, SshTransport};

/// Upper bound on nodes being dispatched to at the same time.
pub(crate) const MAX_PARALLEL_DISPATCHES: usize = 32;

type Dispatched = (Node, NodeOutcome);

/// Runs `script` on every node and waits for all of them.
///
/// # Errors
///
/// Returns [`SshError`] when the login secret cannot be staged. Failures on
/// individual nodes land in the results.
pub(crate) async fn fan_out<R: CommandRunner>(
    transport: &SshTransport<R>,
    nodes: &[Node],
    script: &RemoteScript,
    timeout: Duration,
) -> Result<NodeResults, SshError> {
    let session = Arc::new(transport.session(script.credentials(), timeout)?);
    let shared_script = Arc::new(script.clone());
    let mut running: JoinSet<Dispatched> = JoinSet::new();
    let mut results = NodeResults::new();

    for node in nodes.iter().cloned() {
        if running.len() >= MAX_PARALLEL_DISPATCHES {
            collect_one(&mut running, &mut results).await;
        }
        let task_session = Arc::clone(&session);
        let task_script = Arc::clone(&shared_script);
        running.spawn_blocking(move || {
            let outcome = run_on(&task_session, &node, &task_script);
            (node, outcome)
        });
    }
    while collect_one(&mut running, &mut results).await {}

    for node in nodes {
        if results.get(&node.id).is_none() {
            results.insert(
                node.clone(),
                NodeOutcome::Failed {
                    message: format!("dispatch to node {} panicked", node.id),
                },
            );
        }
    }
    Ok(results)
}

/// Waits for one dispatch to finish. Returns `false` once none are left.
async fn collect_one(running: &mut JoinSet<Dispatched>, results: &mut NodeResults) -> bool {
    match running.join_next().await {
        Some(Ok((node, outcome))) => {
            results.insert(node, outcome);
            true
        }
        Some(Err(err)) => {
            warn!(error = %err, "dispatch task did not finish");
            true
        }
        None => false,
    }
}

fn run_on<R: CommandRunner>(
    session: &SshSession<R>,
    node: &Node,
    script: &RemoteScript,
) -> NodeOutcome {
    let Some(host) = node.ssh_address() else {
        return NodeOutcome::Failed {
            message: format!("node {} has no reachable address", node.id),
        };
    };
    debug!(node = %node.id, %host, "dispatching script");
    session.run(host, script)
}
