//! BDD step definitions for group lifecycle actions.

use flotilla::{
    Action, ActionOutcome, GatewayOperation, LifecycleOrchestrator, NodeState, Reporter,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{
    GROUP, LifecycleContext, LifecycleResult, LifecycleTestError, parse_state,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Setup(#[from] LifecycleTestError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("an empty stub provider")]
fn empty_provider(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
}

#[given("a \"{state}\" node in group \"{group}\"")]
fn seeded_node(
    lifecycle_context: LifecycleContext,
    state: String,
    group: String,
) -> Result<LifecycleContext, StepError> {
    let node_state = parse_state(&state)
        .ok_or_else(|| StepError::Assertion(format!("unknown node state {state}")))?;
    lifecycle_context
        .gateway
        .seed(&group, node_state)
        .map_err(|err| StepError::Assertion(format!("seed {group}: {err}")))?;
    Ok(lifecycle_context)
}

#[given("a script \"{name}\" exists")]
fn script_exists(lifecycle_context: LifecycleContext, name: String) -> Result<LifecycleContext, StepError> {
    let path = lifecycle_context.script_path(&name)?;
    std::fs::write(&path, format!("echo {name}\n"))
        .map_err(|err| StepError::Assertion(format!("write {path}: {err}")))?;
    Ok(lifecycle_context)
}

#[given("node creation fails with \"{message}\"")]
fn creation_fails(lifecycle_context: LifecycleContext, message: String) -> LifecycleContext {
    lifecycle_context.gateway.fail_create(&message);
    lifecycle_context
}

#[given("the provider cannot \"{operation}\"")]
fn withdrawn_operation(
    lifecycle_context: LifecycleContext,
    operation: String,
) -> Result<LifecycleContext, StepError> {
    let withdrawn = match operation.as_str() {
        "suspend" => GatewayOperation::Suspend,
        "resume" => GatewayOperation::Resume,
        "destroy" => GatewayOperation::Destroy,
        "list images" => GatewayOperation::ListImages,
        other => return Err(StepError::Assertion(format!("unknown operation {other}"))),
    };
    lifecycle_context.gateway.withdraw(withdrawn);
    Ok(lifecycle_context)
}

#[when("action \"{action}\" is performed")]
fn perform(lifecycle_context: LifecycleContext, action: String) -> Result<LifecycleContext, StepError> {
    perform_action(lifecycle_context, &action, None)
}

#[when("action \"{action}\" is performed with \"{argument}\"")]
fn perform_with(
    lifecycle_context: LifecycleContext,
    action: String,
    argument: String,
) -> Result<LifecycleContext, StepError> {
    perform_action(lifecycle_context, &action, Some(&argument))
}

fn perform_action(
    lifecycle_context: LifecycleContext,
    name: &str,
    argument: Option<&str>,
) -> Result<LifecycleContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let resolved = match argument {
        Some(value) => {
            let candidate = lifecycle_context.script_path(value)?;
            if candidate.exists() {
                Some(candidate.into_string())
            } else {
                Some(value.to_owned())
            }
        }
        None => None,
    };
    let action = Action::parse(name, resolved.as_deref())
        .map_err(|err| StepError::Assertion(format!("action {name}: {err}")))?;

    let mut reporter = Reporter::new(Vec::new(), Vec::new());
    let orchestrator =
        LifecycleOrchestrator::new(&lifecycle_context.gateway, LifecycleContext::settings());
    let login = lifecycle_context.credentials.clone();
    let result = runtime.block_on(async {
        orchestrator
            .execute(GROUP, &action, Some(&login), &mut reporter)
            .await
    });
    let outcome = match result {
        Ok(done) => LifecycleResult::Success(done),
        Err(err) => {
            reporter.record_failure(&err);
            LifecycleResult::Failure(err.to_string())
        }
    };
    let exit_code = reporter.exit_code();
    let (out, _) = reporter.into_parts();
    let stdout = String::from_utf8(out).map_err(|err| StepError::Assertion(err.to_string()))?;

    Ok(LifecycleContext {
        outcome: Some(outcome),
        stdout,
        exit_code,
        ..lifecycle_context
    })
}

fn success(lifecycle_context: &LifecycleContext) -> Result<&ActionOutcome, StepError> {
    match lifecycle_context.outcome {
        Some(LifecycleResult::Success(ref outcome)) => Ok(outcome),
        Some(LifecycleResult::Failure(ref message)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("no action was performed"))),
    }
}

#[then("the action succeeds")]
fn action_succeeds(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    success(lifecycle_context).map(|_| ())
}

#[then("the action fails mentioning \"{text}\"")]
fn action_fails(lifecycle_context: &LifecycleContext, text: String) -> Result<(), StepError> {
    match lifecycle_context.outcome {
        Some(LifecycleResult::Failure(ref message)) if message.contains(&text) => Ok(()),
        Some(LifecycleResult::Failure(ref message)) => Err(StepError::Assertion(format!(
            "failure {message:?} does not mention {text:?}"
        ))),
        ref other => Err(StepError::Assertion(format!("expected failure, got {other:?}"))),
    }
}

#[then("the exit code is {code}")]
fn exit_code_is(lifecycle_context: &LifecycleContext, code: i32) -> Result<(), StepError> {
    if lifecycle_context.exit_code == code {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected exit code {code}, got {}",
            lifecycle_context.exit_code
        )))
    }
}

#[then("group \"{group}\" has {count} \"{state}\" node")]
fn group_has_nodes(
    lifecycle_context: &LifecycleContext,
    group: String,
    count: usize,
    state: String,
) -> Result<(), StepError> {
    let expected = parse_state(&state)
        .ok_or_else(|| StepError::Assertion(format!("unknown node state {state}")))?;
    let matching = lifecycle_context
        .gateway
        .nodes()
        .into_iter()
        .filter(|node| node.group == group && node.state == expected)
        .count();
    if matching == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} {state} nodes in {group}, found {matching}"
        )))
    }
}

#[then("the install script reached {count} node")]
fn install_reached(lifecycle_context: &LifecycleContext, count: usize) -> Result<(), StepError> {
    match success(lifecycle_context)? {
        ActionOutcome::Created { install, .. } if install.succeeded() == count => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected install on {count} node, got {other:?}"
        ))),
    }
}

#[then("no nodes were destroyed")]
fn nothing_destroyed(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match success(lifecycle_context)? {
        ActionOutcome::Destroyed(nodes) if nodes.is_empty() => {
            let terminated = lifecycle_context
                .gateway
                .nodes()
                .iter()
                .all(|node| node.state == NodeState::Terminated);
            if terminated {
                Ok(())
            } else {
                Err(StepError::Assertion(String::from(
                    "seeded nodes changed state",
                )))
            }
        }
        other => Err(StepError::Assertion(format!(
            "expected an empty destroy, got {other:?}"
        ))),
    }
}

#[then("the last dispatch ran as task \"{task}\"")]
fn last_dispatch_task(lifecycle_context: &LifecycleContext, task: String) -> Result<(), StepError> {
    let dispatches = lifecycle_context.gateway.dispatches();
    let last = dispatches
        .last()
        .ok_or_else(|| StepError::Assertion(String::from("no script was dispatched")))?;
    match last.task {
        Some(ref name) if name.as_str() == task => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected task {task}, got {other:?}"
        ))),
    }
}

#[then("no script results were reported")]
fn no_results(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match success(lifecycle_context)? {
        ActionOutcome::Scripted(results) if results.is_empty() => {
            if lifecycle_context.stdout.contains("<< node") {
                Err(StepError::Assertion(format!(
                    "unexpected node output: {}",
                    lifecycle_context.stdout
                )))
            } else {
                Ok(())
            }
        }
        other => Err(StepError::Assertion(format!(
            "expected no results, got {other:?}"
        ))),
    }
}
