//! Server lifecycle helpers for the Scaleway gateway.
//!
//! Servers created by the gateway carry a `flotilla` tag plus a
//! `flotilla-group=<group>` tag. Group selection filters on the former and
//! maps the latter back onto [`Node::group`]; the plain node listing shows
//! every server in the project.

use std::net::IpAddr;

use serde::Deserialize;

use crate::gateway::{Node, NodeState};

mod create;
mod image;
mod list;
mod power;
mod wait;

pub(crate) use create::{CreateServerRequest, ServerProduct};

use super::types::{Action, InstanceId};

/// Tag carried by every server this tool manages.
pub(crate) const MANAGED_TAG: &str = "flotilla";
/// Prefix of the tag naming a server's group.
pub(crate) const GROUP_TAG_PREFIX: &str = "flotilla-group=";

/// Tags applied to a server created for `group`.
pub(crate) fn group_tags(group: &str) -> Vec<String> {
    vec![MANAGED_TAG.to_owned(), format!("{GROUP_TAG_PREFIX}{group}")]
}

/// Maps a Scaleway server state onto the node lifecycle.
pub(crate) fn node_state(raw: &str) -> NodeState {
    match raw {
        "running" => NodeState::Running,
        "starting" | "stopping" => NodeState::Pending,
        "stopped" | "stopped in place" => NodeState::Suspended,
        _ => NodeState::Unrecognized,
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct AddressRecord {
    pub(crate) address: String,
}

/// Server fields the gateway reads from the Instances API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct ServerRecord {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) state: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) allowed_actions: Vec<String>,
    #[serde(default)]
    pub(crate) private_ip: Option<String>,
    #[serde(default)]
    pub(crate) public_ip: Option<AddressRecord>,
    #[serde(default)]
    pub(crate) public_ips: Option<Vec<AddressRecord>>,
}

impl ServerRecord {
    pub(crate) fn instance_id(&self) -> InstanceId {
        InstanceId::from(self.id.as_str())
    }

    pub(crate) fn is_managed(&self) -> bool {
        self.tags.iter().any(|tag| tag == MANAGED_TAG)
    }

    pub(crate) fn group(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix(GROUP_TAG_PREFIX))
    }

    pub(crate) fn allows(&self, action: &Action) -> bool {
        self.allowed_actions
            .iter()
            .any(|allowed| allowed == action.as_str())
    }

    pub(crate) fn public_addresses(&self) -> Vec<IpAddr> {
        let mut addresses: Vec<IpAddr> = Vec::new();
        let listed = self.public_ips.iter().flatten();
        for record in self.public_ip.iter().chain(listed) {
            if let Ok(address) = record.address.parse::<IpAddr>()
                && !addresses.contains(&address)
            {
                addresses.push(address);
            }
        }
        addresses
    }

    pub(crate) fn to_node(&self) -> Node {
        Node {
            id: self.id.clone(),
            name: Some(self.name.clone()).filter(|name| !name.is_empty()),
            group: self.group().unwrap_or_default().to_owned(),
            state: node_state(&self.state),
            private_addresses: self
                .private_ip
                .as_deref()
                .and_then(|ip| ip.parse().ok())
                .into_iter()
                .collect(),
            public_addresses: self.public_addresses(),
        }
    }
}
