//! BDD scenarios for group lifecycle actions.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContextResult, lifecycle_context_result};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Adding a node creates exactly one running node"
)]
fn scenario_add_node(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Destroying a group of terminated nodes touches nothing"
)]
fn scenario_destroy_terminated(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Powering a group off and on restores it"
)]
fn scenario_power_cycle(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Running a script wraps it as a named background task"
)]
fn scenario_run_wraps_script(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Executing on an empty group reports no results"
)]
fn scenario_exec_empty_group(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A node creation failure sets the exit code"
)]
fn scenario_creation_failure(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "A provider without suspend support reports the gap"
)]
fn scenario_unsupported_suspend(lifecycle_context_result: LifecycleContextResult) {
    drop(lifecycle_context_result);
}
