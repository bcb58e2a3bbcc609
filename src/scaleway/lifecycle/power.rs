//! Power and teardown transitions over selected servers.

use tracing::{debug, info};

use crate::gateway::{Node, NodeState};
use crate::scaleway::types::{Action, Zone};
use crate::scaleway::{ScalewayGateway, ScalewayGatewayError};
use crate::selector::NodePredicate;
use crate::ssh::CommandRunner;

use super::ServerRecord;

impl<R: CommandRunner> ScalewayGateway<R> {
    async fn select_servers(
        &self,
        zone: &Zone,
        predicate: &NodePredicate,
    ) -> Result<Vec<ServerRecord>, ScalewayGatewayError> {
        Ok(self
            .managed_servers(zone)
            .await?
            .into_iter()
            .filter(|server| predicate.matches(&server.to_node()))
            .collect())
    }

    async fn perform(
        &self,
        zone: &Zone,
        server: &ServerRecord,
        action: &Action,
    ) -> Result<(), ScalewayGatewayError> {
        if !server.allows(action) {
            return Err(ScalewayGatewayError::ActionNotAllowed {
                instance_id: server.id.clone(),
                state: server.state.clone(),
                action: action.to_string(),
            });
        }
        debug!(server = %server.id, %action, "performing server action");
        self.api
            .server_action(zone, &server.instance_id(), action)
            .await
    }

    /// Applies `action` to every matching server, then waits for each to
    /// reach `settled`.
    pub(in crate::scaleway) async fn transition_matching(
        &self,
        predicate: &NodePredicate,
        action: &Action,
        settled: NodeState,
    ) -> Result<Vec<Node>, ScalewayGatewayError> {
        let zone = self.zone();
        let selected = self.select_servers(&zone, predicate).await?;
        for server in &selected {
            self.perform(&zone, server, action).await?;
        }

        let mut transitioned = Vec::with_capacity(selected.len());
        for server in &selected {
            let current = self
                .wait_for_state(&zone, &server.instance_id(), settled)
                .await?;
            transitioned.push(current.to_node());
        }
        info!(%predicate, %action, count = transitioned.len(), "servers transitioned");
        Ok(transitioned)
    }

    /// Terminates running servers and deletes stopped ones, then waits until
    /// none of them is listed any more.
    pub(in crate::scaleway) async fn destroy_selected(
        &self,
        predicate: &NodePredicate,
    ) -> Result<Vec<Node>, ScalewayGatewayError> {
        let zone = self.zone();
        let selected = self.select_servers(&zone, predicate).await?;
        let terminate = Action::from("terminate");
        for server in &selected {
            if server.allows(&terminate) {
                self.perform(&zone, server, &terminate).await?;
            } else {
                debug!(server = %server.id, "deleting server");
                self.api
                    .delete_server(&zone, &server.instance_id())
                    .await?;
            }
        }

        let mut destroyed = Vec::with_capacity(selected.len());
        for server in &selected {
            self.wait_until_gone(&zone, &server.instance_id()).await?;
            destroyed.push(server.to_node().with_state(NodeState::Terminated));
        }
        info!(%predicate, count = destroyed.len(), "servers destroyed");
        Ok(destroyed)
    }
}
