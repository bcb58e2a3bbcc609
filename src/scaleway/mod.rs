//! Scaleway gateway.
//!
//! Nodes are Scaleway Instances servers tagged with their group. Lifecycle
//! transitions go through the Instances API; scripts reach the nodes over the
//! system `ssh` client.

mod api;
mod dispatch;
mod error;
mod lifecycle;
#[cfg(test)]
mod test_doubles;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{DEFAULT_SCRIPT_TIMEOUT_SECS, ScalewayConfig};
use crate::gateway::{
    Gateway, GatewayFuture, Image, Node, NodeResults, NodeState, NodeTemplate, RemoteScript,
};
use crate::selector::NodePredicate;
use crate::ssh::{CommandRunner, ProcessCommandRunner, SshTransport};
use api::{HttpInstancesApi, InstancesApi};
use types::{Action, Zone};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);

pub use error::ScalewayGatewayError;

/// Gateway that manages nodes through the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayGateway<R: CommandRunner = ProcessCommandRunner> {
    api: Arc<dyn InstancesApi>,
    project_id: String,
    config: ScalewayConfig,
    transport: SshTransport<R>,
    script_timeout: Duration,
    poll_interval: Duration,
    wait_timeout: Duration,
    closed: bool,
}

impl<R: CommandRunner> ScalewayGateway<R> {
    /// Opens a gateway for `project_id`, authenticated by `secret_key`.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayGatewayError::Validation`] for a blank project id or
    /// secret key and [`ScalewayGatewayError::Config`] when the configuration
    /// fails validation.
    pub fn connect(
        project_id: &str,
        secret_key: &str,
        config: ScalewayConfig,
        transport: SshTransport<R>,
    ) -> Result<Self, ScalewayGatewayError> {
        config.validate()?;
        if project_id.trim().is_empty() {
            return Err(ScalewayGatewayError::Validation(String::from("project_id")));
        }
        if secret_key.trim().is_empty() {
            return Err(ScalewayGatewayError::Validation(String::from("secret_key")));
        }
        debug!(project_id, zone = %config.default_zone, "scaleway gateway opened");
        Ok(Self {
            api: Arc::new(HttpInstancesApi::new(secret_key.trim(), project_id.trim())),
            project_id: project_id.trim().to_owned(),
            config,
            transport,
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
            closed: false,
        })
    }

    /// Sets how long a script may run on each node.
    #[must_use]
    pub const fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    #[cfg(test)]
    fn with_api(mut self, api: impl InstancesApi + 'static) -> Self {
        self.api = Arc::new(api);
        self
    }

    #[cfg(test)]
    const fn with_waits(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    /// Returns `true` once [`Gateway::close`] has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn zone(&self) -> Zone {
        Zone::from(self.config.default_zone.as_str())
    }

    async fn managed_nodes(&self) -> Result<Vec<Node>, ScalewayGatewayError> {
        Ok(self
            .managed_servers(&self.zone())
            .await?
            .iter()
            .map(lifecycle::ServerRecord::to_node)
            .collect())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>, ScalewayGatewayError> {
        Ok(self
            .all_servers(&self.zone())
            .await?
            .iter()
            .map(lifecycle::ServerRecord::to_node)
            .collect())
    }
}

impl<R: CommandRunner> Gateway for ScalewayGateway<R> {
    type Error = ScalewayGatewayError;

    fn create_nodes<'a>(
        &'a self,
        group: &'a str,
        count: usize,
        template: &'a NodeTemplate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            template.validate()?;
            let zone = Zone::from(template.location.as_str());
            let image_id = self.resolve_image_id(&zone, template).await?;
            let commercial_type = self.commercial_type(&zone, template).await?;

            let mut created = Vec::with_capacity(count);
            for _ in 0..count {
                let server = self
                    .create_server(&zone, group, template, &image_id, &commercial_type)
                    .await?;
                self.power_on_if_needed(&zone, &server).await?;
                let id = server.instance_id();
                let ready = self.wait_for_public_ip(&zone, &id).await?;
                let node = ready.to_node();
                let host = node
                    .ssh_address()
                    .ok_or_else(|| ScalewayGatewayError::MissingPublicIp {
                        instance_id: id.to_string(),
                    })?;
                self.wait_for_ssh_ready(&id, host).await?;
                debug!(group, server = %node.id, %host, "server ready");
                created.push(node);
            }
            Ok(created)
        })
    }

    fn list_nodes(&self) -> GatewayFuture<'_, Vec<Node>, Self::Error> {
        Box::pin(self.all_nodes())
    }

    fn list_images(&self) -> GatewayFuture<'_, Vec<Image>, Self::Error> {
        Box::pin(async move { self.image_catalogue(&self.zone()).await })
    }

    fn run_script<'a>(
        &'a self,
        predicate: &'a NodePredicate,
        script: &'a RemoteScript,
    ) -> GatewayFuture<'a, NodeResults, Self::Error> {
        Box::pin(async move {
            let nodes = predicate.select(self.managed_nodes().await?);
            if nodes.is_empty() {
                return Ok(NodeResults::new());
            }
            let results =
                dispatch::fan_out(&self.transport, &nodes, script, self.script_timeout).await?;
            Ok(results)
        })
    }

    fn suspend_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            let action = Action::from("stop_in_place");
            self.transition_matching(predicate, &action, NodeState::Suspended)
                .await
        })
    }

    fn resume_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move {
            self.transition_matching(predicate, &Action::from("poweron"), NodeState::Running)
                .await
        })
    }

    fn destroy_matching<'a>(
        &'a self,
        predicate: &'a NodePredicate,
    ) -> GatewayFuture<'a, Vec<Node>, Self::Error> {
        Box::pin(async move { self.destroy_selected(predicate).await })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(project_id = %self.project_id, "scaleway gateway closed");
        }
    }
}
