//! Seam between the gateway and the Scaleway Instances API.
//!
//! The gateway only ever talks to [`InstancesApi`]. [`HttpInstancesApi`]
//! serves it from the live API, partly through `scaleway-rs` and partly
//! through direct REST calls for endpoints the SDK does not cover.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;
use std::time::Duration;

use scaleway_rs::{ScalewayApi, ScalewayImage, ScalewayListInstanceImagesBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::ScalewayGatewayError;
use super::lifecycle::{CreateServerRequest, ServerProduct, ServerRecord};
use super::types::{Action, InstanceId, Zone};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SCALEWAY_INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Future returned by [`InstancesApi`] calls.
pub(crate) type ApiFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, ScalewayGatewayError>> + Send + 'a>>;

/// Filters for one page of the project's server listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ServerQuery {
    /// Only servers carrying this tag.
    pub(crate) tag: Option<String>,
    /// Only the server with this id.
    pub(crate) id: Option<InstanceId>,
    /// One-based page number.
    pub(crate) page: usize,
    /// Servers per page.
    pub(crate) per_page: usize,
}

/// Filters for an image listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ImageQuery {
    pub(crate) public: bool,
    pub(crate) project: Option<String>,
    pub(crate) organization: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) arch: String,
}

/// Instances API operations the gateway relies on.
pub(crate) trait InstancesApi: Send + Sync {
    /// One page of servers in the project.
    fn list_servers<'a>(
        &'a self,
        zone: &'a Zone,
        query: &'a ServerQuery,
    ) -> ApiFuture<'a, Vec<ServerRecord>>;

    /// Creates a server and returns its first record.
    fn create_server<'a>(
        &'a self,
        zone: &'a Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, ServerRecord>;

    /// Starts `action` on a server.
    fn server_action<'a>(
        &'a self,
        zone: &'a Zone,
        id: &'a InstanceId,
        action: &'a Action,
    ) -> ApiFuture<'a, ()>;

    /// Deletes a stopped server.
    fn delete_server<'a>(&'a self, zone: &'a Zone, id: &'a InstanceId) -> ApiFuture<'a, ()>;

    /// Commercial types offered in `zone`.
    fn server_products<'a>(
        &'a self,
        zone: &'a Zone,
    ) -> ApiFuture<'a, BTreeMap<String, ServerProduct>>;

    /// Images matching `query`.
    fn list_images<'a>(
        &'a self,
        zone: &'a Zone,
        query: &'a ImageQuery,
    ) -> ApiFuture<'a, Vec<ScalewayImage>>;
}

#[derive(Deserialize)]
struct ServerPage {
    #[serde(default)]
    servers: Vec<ServerRecord>,
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: ServerRecord,
}

#[derive(Deserialize)]
struct ProductCatalogue {
    #[serde(default)]
    servers: BTreeMap<String, ServerProduct>,
}

/// [`InstancesApi`] backed by the live Scaleway API.
#[derive(Clone)]
pub(crate) struct HttpInstancesApi {
    sdk: ScalewayApi,
    secret_key: String,
    project_id: String,
}

impl HttpInstancesApi {
    pub(crate) fn new(secret_key: &str, project_id: &str) -> Self {
        Self {
            sdk: ScalewayApi::new(secret_key),
            secret_key: secret_key.to_owned(),
            project_id: project_id.to_owned(),
        }
    }

    fn servers_url(zone: &Zone) -> String {
        format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/servers")
    }
}

impl InstancesApi for HttpInstancesApi {
    fn list_servers<'a>(
        &'a self,
        zone: &'a Zone,
        query: &'a ServerQuery,
    ) -> ApiFuture<'a, Vec<ServerRecord>> {
        Box::pin(async move {
            let mut request = HTTP_CLIENT
                .get(Self::servers_url(zone))
                .query(&[("project", self.project_id.as_str())])
                .query(&[("page", query.page), ("per_page", query.per_page)]);
            if let Some(tag) = &query.tag {
                request = request.query(&[("tags", tag.as_str())]);
            }
            if let Some(id) = &query.id {
                request = request.query(&[("servers", id.as_str())]);
            }
            let page: ServerPage = send_json(request, &self.secret_key).await?;
            Ok(page.servers)
        })
    }

    fn create_server<'a>(
        &'a self,
        zone: &'a Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, ServerRecord> {
        Box::pin(async move {
            let post = HTTP_CLIENT.post(Self::servers_url(zone)).json(request);
            let envelope: ServerEnvelope = send_json(post, &self.secret_key).await?;
            Ok(envelope.server)
        })
    }

    fn server_action<'a>(
        &'a self,
        zone: &'a Zone,
        id: &'a InstanceId,
        action: &'a Action,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.sdk
                .perform_instance_action_async(zone.as_str(), id.as_str(), action.as_str())
                .await?;
            Ok(())
        })
    }

    fn delete_server<'a>(&'a self, zone: &'a Zone, id: &'a InstanceId) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.sdk
                .delete_instance_async(zone.as_str(), id.as_str())
                .await?;
            Ok(())
        })
    }

    fn server_products<'a>(
        &'a self,
        zone: &'a Zone,
    ) -> ApiFuture<'a, BTreeMap<String, ServerProduct>> {
        Box::pin(async move {
            let url = format!("{SCALEWAY_INSTANCE_API_BASE}/zones/{zone}/products/servers");
            let catalogue: ProductCatalogue =
                send_json(HTTP_CLIENT.get(&url), &self.secret_key).await?;
            Ok(catalogue.servers)
        })
    }

    fn list_images<'a>(
        &'a self,
        zone: &'a Zone,
        query: &'a ImageQuery,
    ) -> ApiFuture<'a, Vec<ScalewayImage>> {
        Box::pin(async move {
            let mut builder = ScalewayListInstanceImagesBuilder::new(self.sdk.clone(), zone.as_str())
                .public(query.public)
                .arch(&query.arch);
            if let Some(project) = &query.project {
                builder = builder.project(project);
            }
            if let Some(org) = &query.organization {
                builder = builder.organization(org);
            }
            if let Some(name) = &query.name {
                builder = builder.name(name);
            }
            Ok(builder.run_async().await?)
        })
    }
}

/// Sends `request` with the account token and decodes a JSON body.
async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    secret_key: &str,
) -> Result<T, ScalewayGatewayError> {
    let response = request
        .header("X-Auth-Token", secret_key)
        .send()
        .await
        .map_err(|err| ScalewayGatewayError::provider(&err))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| ScalewayGatewayError::provider(&err))?;
    if !status.is_success() {
        return Err(ScalewayGatewayError::Provider {
            message: format!("{status}: {}", String::from_utf8_lossy(&body)),
        });
    }
    serde_json::from_slice(&body).map_err(|err| ScalewayGatewayError::provider(&err))
}
