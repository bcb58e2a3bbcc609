//! Node selection predicates.
//!
//! A [`NodePredicate`] is a plain value: a state filter conjoined with an
//! optional group tag. Gateways evaluate it however suits the provider, for
//! example by translating the group into a tag query and filtering states
//! client-side.

use std::fmt;

use crate::gateway::{Node, NodeState};

/// State half of a node predicate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StateFilter {
    /// Matches only running nodes.
    Running,
    /// Matches only suspended nodes.
    Suspended,
    /// Matches every state except `Terminated`, including transitional and
    /// unrecognised states.
    NotTerminated,
    /// Matches every state.
    Any,
}

impl StateFilter {
    /// Returns `true` when `state` passes the filter.
    #[must_use]
    pub const fn matches(self, state: NodeState) -> bool {
        match self {
            Self::Running => matches!(state, NodeState::Running),
            Self::Suspended => matches!(state, NodeState::Suspended),
            Self::NotTerminated => !matches!(state, NodeState::Terminated),
            Self::Any => true,
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::NotTerminated => "not terminated",
            Self::Any => "any state",
        })
    }
}

/// Conjunction of a state filter and an optional group membership test.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct NodePredicate {
    state: StateFilter,
    group: Option<String>,
}

impl NodePredicate {
    /// Builds a predicate from its two conjuncts.
    #[must_use]
    pub const fn new(state: StateFilter, group: Option<String>) -> Self {
        Self { state, group }
    }

    /// Every node visible to the account. Used by listing actions.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(StateFilter::Any, None)
    }

    /// Every node in `group`, whatever its state.
    #[must_use]
    pub fn in_group(group: impl Into<String>) -> Self {
        Self::new(StateFilter::Any, Some(group.into()))
    }

    /// Running nodes in `group`.
    #[must_use]
    pub fn running_in(group: impl Into<String>) -> Self {
        Self::new(StateFilter::Running, Some(group.into()))
    }

    /// Suspended nodes in `group`.
    #[must_use]
    pub fn suspended_in(group: impl Into<String>) -> Self {
        Self::new(StateFilter::Suspended, Some(group.into()))
    }

    /// Nodes in `group` that have not been destroyed yet.
    #[must_use]
    pub fn not_terminated_in(group: impl Into<String>) -> Self {
        Self::new(StateFilter::NotTerminated, Some(group.into()))
    }

    /// State conjunct.
    #[must_use]
    pub const fn state(&self) -> StateFilter {
        self.state
    }

    /// Group conjunct, if any.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Evaluates the predicate against a node.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        self.state.matches(node.state)
            && self
                .group
                .as_deref()
                .is_none_or(|group| node.group == group)
    }

    /// Keeps the nodes that match, preserving their order.
    #[must_use]
    pub fn select(&self, nodes: Vec<Node>) -> Vec<Node> {
        nodes.into_iter().filter(|node| self.matches(node)).collect()
    }
}

impl fmt::Display for NodePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{} AND group {group}", self.state),
            None => self.state.fmt(f),
        }
    }
}
