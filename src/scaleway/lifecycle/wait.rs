//! Polling helpers that wait for servers to settle.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::gateway::NodeState;
use crate::scaleway::types::{InstanceId, Zone};
use crate::scaleway::{ScalewayGateway, ScalewayGatewayError};
use crate::ssh::CommandRunner;

use super::{ServerRecord, node_state};

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl<R: CommandRunner> ScalewayGateway<R> {
    pub(in crate::scaleway) async fn wait_for_state(
        &self,
        zone: &Zone,
        id: &InstanceId,
        expected: NodeState,
    ) -> Result<ServerRecord, ScalewayGatewayError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if let Some(server) = self.fetch_server(zone, id).await?
                && node_state(&server.state) == expected
            {
                return Ok(server);
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayGatewayError::Timeout {
            action: format!("state {expected}"),
            instance_id: id.to_string(),
        })
    }

    pub(in crate::scaleway) async fn wait_for_public_ip(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<ServerRecord, ScalewayGatewayError> {
        let deadline = Instant::now() + self.wait_timeout;
        let mut saw_running = false;

        while Instant::now() <= deadline {
            let Some(server) = self.fetch_server(zone, id).await? else {
                sleep(self.poll_interval).await;
                continue;
            };

            if node_state(&server.state) != NodeState::Running {
                sleep(self.poll_interval).await;
                continue;
            }

            saw_running = true;
            if !server.public_addresses().is_empty() {
                return Ok(server);
            }
            sleep(self.poll_interval).await;
        }

        if saw_running {
            return Err(ScalewayGatewayError::MissingPublicIp {
                instance_id: id.to_string(),
            });
        }

        Err(ScalewayGatewayError::Timeout {
            action: String::from("wait_for_ready"),
            instance_id: id.to_string(),
        })
    }

    /// Waits until the node accepts TCP connections on the SSH port.
    pub(in crate::scaleway) async fn wait_for_ssh_ready(
        &self,
        id: &InstanceId,
        host: IpAddr,
    ) -> Result<(), ScalewayGatewayError> {
        let port = self.transport.config().port;
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            let connect = timeout(SSH_CONNECT_TIMEOUT, TcpStream::connect((host, port))).await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayGatewayError::Timeout {
            action: String::from("wait_for_ssh_ready"),
            instance_id: id.to_string(),
        })
    }

    pub(in crate::scaleway) async fn wait_until_gone(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<(), ScalewayGatewayError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            if self.fetch_server(zone, id).await?.is_none() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayGatewayError::ResidualResource {
            instance_id: id.to_string(),
        })
    }
}
