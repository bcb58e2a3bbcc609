//! Server creation helpers for the Scaleway gateway.
//!
//! Servers must receive their cloud-init payload before first boot, so the
//! creation request sets `stopped: true` and the server is powered on
//! afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::NodeTemplate;
use crate::scaleway::types::{Action, Zone};
use crate::scaleway::{ScalewayGateway, ScalewayGatewayError};
use crate::ssh::CommandRunner;

use super::{ServerRecord, group_tags};

const MIB: u64 = 1024 * 1024;

/// Body of a server creation request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct CreateServerRequest {
    pub(crate) name: String,
    pub(crate) commercial_type: String,
    pub(crate) image: String,
    pub(crate) project: String,
    pub(crate) routed_ip_enabled: bool,
    pub(crate) dynamic_ip_required: bool,
    pub(crate) tags: Vec<String>,
    pub(crate) stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cloud_init: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) organization: Option<String>,
}

/// One entry of the server product catalogue.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct ServerProduct {
    #[serde(default)]
    pub(crate) hourly_price: f64,
    #[serde(default)]
    pub(crate) ram: u64,
    #[serde(default)]
    pub(crate) arch: String,
}

/// Picks the cheapest commercial type for `arch` with at least
/// `min_ram_mib` of memory. Ties go to the smaller machine.
pub(crate) fn select_commercial_type(
    catalogue: &BTreeMap<String, ServerProduct>,
    min_ram_mib: u32,
    arch: &str,
) -> Option<String> {
    let floor = u64::from(min_ram_mib) * MIB;
    catalogue
        .iter()
        .filter(|(_, product)| product.arch == arch && product.ram >= floor)
        .min_by(|(lhs_name, lhs), (rhs_name, rhs)| {
            lhs.hourly_price
                .total_cmp(&rhs.hourly_price)
                .then(lhs.ram.cmp(&rhs.ram))
                .then(lhs_name.cmp(rhs_name))
        })
        .map(|(name, _)| name.clone())
}

fn is_instance_type_error(api_err: &scaleway_rs::ScalewayApiError, instance_type: &str) -> bool {
    matches!(api_err.resource.as_deref(), Some("commercial_type"))
        || api_err
            .resource_id
            .as_deref()
            .is_some_and(|id| id == instance_type)
        || (api_err.etype == "invalid_arguments"
            && api_err
                .message
                .to_ascii_lowercase()
                .contains("commercial_type"))
}

impl<R: CommandRunner> ScalewayGateway<R> {
    /// Commercial type for a template: the configured hardware unless a RAM
    /// floor asks for a catalogue lookup.
    pub(in crate::scaleway) async fn commercial_type(
        &self,
        zone: &Zone,
        template: &NodeTemplate,
    ) -> Result<String, ScalewayGatewayError> {
        let Some(min_ram_mib) = template.min_ram_mib else {
            return Ok(template.hardware.clone());
        };
        let catalogue = self.api.server_products(zone).await?;
        let arch = &self.config.default_architecture;
        select_commercial_type(&catalogue, min_ram_mib, arch).ok_or_else(|| {
            ScalewayGatewayError::NoInstanceTypeForRam {
                min_ram_mib,
                arch: arch.clone(),
                zone: zone.to_string(),
            }
        })
    }

    /// Creates a stopped server in `group` carrying the template's bootstrap
    /// script as cloud-init user data.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayGatewayError`] when the API request fails or the
    /// provider rejects the commercial type.
    pub(in crate::scaleway) async fn create_server(
        &self,
        zone: &Zone,
        group: &str,
        template: &NodeTemplate,
        image_id: &str,
        commercial_type: &str,
    ) -> Result<ServerRecord, ScalewayGatewayError> {
        let payload = CreateServerRequest {
            name: format!("{group}-{}", Uuid::new_v4().simple()),
            commercial_type: commercial_type.to_owned(),
            image: image_id.to_owned(),
            project: self.project_id.clone(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: group_tags(group),
            stopped: true,
            cloud_init: template.bootstrap_script.clone(),
            organization: self.config.default_organization_id.clone(),
        };

        match self.api.create_server(zone, &payload).await {
            Ok(server) => Ok(server),
            Err(ScalewayGatewayError::Provider { message }) => {
                let body = message.split_once(": ").map_or("", |(_, rest)| rest);
                if let Ok(api_err) = serde_json::from_str::<scaleway_rs::ScalewayApiError>(body)
                    && is_instance_type_error(&api_err, commercial_type)
                {
                    return Err(ScalewayGatewayError::InstanceTypeUnavailable {
                        instance_type: commercial_type.to_owned(),
                        zone: zone.to_string(),
                    });
                }
                Err(ScalewayGatewayError::Provider { message })
            }
            Err(other) => Err(other),
        }
    }

    pub(in crate::scaleway) async fn power_on_if_needed(
        &self,
        zone: &Zone,
        server: &ServerRecord,
    ) -> Result<(), ScalewayGatewayError> {
        if server.state == "running" {
            return Ok(());
        }

        let poweron = Action::from("poweron");
        if server.allows(&poweron) {
            self.api
                .server_action(zone, &server.instance_id(), &poweron)
                .await?;
            return Ok(());
        }

        Err(ScalewayGatewayError::ActionNotAllowed {
            instance_id: server.id.clone(),
            state: server.state.clone(),
            action: poweron.to_string(),
        })
    }
}
