//! Paginated server listing.

use crate::scaleway::api::ServerQuery;
use crate::scaleway::types::{InstanceId, Zone};
use crate::scaleway::{ScalewayGateway, ScalewayGatewayError};
use crate::ssh::CommandRunner;

use super::{MANAGED_TAG, ServerRecord};

const PAGE_SIZE: usize = 50;

impl<R: CommandRunner> ScalewayGateway<R> {
    async fn list_servers(
        &self,
        zone: &Zone,
        tag: Option<&str>,
        id: Option<&InstanceId>,
    ) -> Result<Vec<ServerRecord>, ScalewayGatewayError> {
        let mut servers = Vec::new();
        let mut query = ServerQuery {
            tag: tag.map(str::to_owned),
            id: id.cloned(),
            page: 1,
            per_page: PAGE_SIZE,
        };
        loop {
            let batch = self.api.list_servers(zone, &query).await?;
            let fetched = batch.len();
            servers.extend(batch);
            if fetched < PAGE_SIZE {
                return Ok(servers);
            }
            query.page += 1;
        }
    }

    /// Every server in the project, managed or not, across all pages.
    pub(in crate::scaleway) async fn all_servers(
        &self,
        zone: &Zone,
    ) -> Result<Vec<ServerRecord>, ScalewayGatewayError> {
        self.list_servers(zone, None, None).await
    }

    /// Every server carrying the managed tag, across all pages.
    pub(in crate::scaleway) async fn managed_servers(
        &self,
        zone: &Zone,
    ) -> Result<Vec<ServerRecord>, ScalewayGatewayError> {
        let servers = self.list_servers(zone, Some(MANAGED_TAG), None).await?;
        Ok(servers
            .into_iter()
            .filter(ServerRecord::is_managed)
            .collect())
    }

    /// Current record for one server, or `None` once it is gone.
    pub(in crate::scaleway) async fn fetch_server(
        &self,
        zone: &Zone,
        id: &InstanceId,
    ) -> Result<Option<ServerRecord>, ScalewayGatewayError> {
        let servers = self.list_servers(zone, None, Some(id)).await?;
        Ok(servers.into_iter().find(|server| server.id == id.as_str()))
    }
}
