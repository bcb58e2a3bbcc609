//! In-memory Instances API for gateway tests.
//!
//! Server actions settle immediately, so the gateway's waits succeed on
//! their first poll. Every request is logged as a short line such as
//! `GET servers tag=flotilla page=1` for assertions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use scaleway_rs::{ScalewayImage, ScalewayImageExtraVolumes, ScalewayImageRootVolume};

use super::ScalewayGatewayError;
use super::api::{ApiFuture, ImageQuery, InstancesApi, ServerQuery};
use super::lifecycle::{AddressRecord, CreateServerRequest, ServerProduct, ServerRecord};
use super::types::{Action, InstanceId, Zone};

const RUNNING_ACTIONS: &[&str] = &["poweroff", "stop_in_place", "reboot", "terminate"];
const STOPPED_ACTIONS: &[&str] = &["poweron", "terminate"];

/// Catalogue entry, rendered as a [`ScalewayImage`] on every listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FakeImage {
    pub(crate) id: &'static str,
    pub(crate) name: &'static str,
    pub(crate) arch: &'static str,
    pub(crate) state: &'static str,
    pub(crate) creation_date: &'static str,
    pub(crate) public: bool,
}

/// Builds an SDK image record with only the fields the gateway reads.
pub(crate) fn scaleway_image(spec: &FakeImage) -> ScalewayImage {
    ScalewayImage {
        id: spec.id.to_owned(),
        name: spec.name.to_owned(),
        arch: spec.arch.to_owned(),
        creation_date: spec.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: spec.public,
        state: spec.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

#[derive(Debug, Default)]
struct FakeState {
    servers: Vec<ServerRecord>,
    images: Vec<FakeImage>,
    products: BTreeMap<String, ServerProduct>,
    requests: Vec<String>,
    next_id: u32,
    boot_address: Option<String>,
    create_rejection: Option<String>,
}

/// Scripted stand-in for the Instances API. Clones share state.
#[derive(Clone, Debug, Default)]
pub(crate) struct FakeInstances {
    state: Arc<Mutex<FakeState>>,
}

fn actions(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn not_found(id: &InstanceId) -> ScalewayGatewayError {
    ScalewayGatewayError::Provider {
        message: format!("404 Not Found: server {id} does not exist"),
    }
}

impl FakeInstances {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a server in `state` with `tags` and an optional public address.
    pub(crate) fn seed(&self, id: &str, state: &str, tags: &[&str], public_ip: Option<&str>) {
        let allowed = if state == "running" {
            RUNNING_ACTIONS
        } else {
            STOPPED_ACTIONS
        };
        self.seed_record(ServerRecord {
            id: id.to_owned(),
            name: id.to_owned(),
            state: state.to_owned(),
            tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
            allowed_actions: actions(allowed),
            private_ip: None,
            public_ip: public_ip.map(|address| AddressRecord {
                address: address.to_owned(),
            }),
            public_ips: None,
        });
    }

    /// Adds a fully specified server record.
    pub(crate) fn seed_record(&self, record: ServerRecord) {
        self.lock().servers.push(record);
    }

    /// Adds an image to the catalogue.
    pub(crate) fn add_image(&self, image: FakeImage) {
        self.lock().images.push(image);
    }

    /// Makes server creation fail with a provider error carrying `body`.
    pub(crate) fn reject_create(&self, body: &str) {
        self.lock().create_rejection = Some(format!("400 Bad Request: {body}"));
    }

    /// Public address handed to servers when they are first powered on.
    pub(crate) fn assign_on_boot(&self, address: &str) {
        self.lock().boot_address = Some(address.to_owned());
    }

    /// Current servers.
    pub(crate) fn servers(&self) -> Vec<ServerRecord> {
        self.lock().servers.clone()
    }

    /// Every request received so far.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }
}

impl FakeState {
    fn server_mut(&mut self, id: &InstanceId) -> Option<&mut ServerRecord> {
        self.servers.iter_mut().find(|server| server.id == id.as_str())
    }

    fn remove(&mut self, id: &InstanceId) -> Result<(), ScalewayGatewayError> {
        let before = self.servers.len();
        self.servers.retain(|server| server.id != id.as_str());
        if self.servers.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    fn apply(&mut self, id: &InstanceId, action: &Action) -> Result<(), ScalewayGatewayError> {
        if action.as_str() == "terminate" {
            return self.remove(id);
        }
        let boot_address = self.boot_address.clone();
        let server = self.server_mut(id).ok_or_else(|| not_found(id))?;
        let (state, allowed) = match action.as_str() {
            "poweron" => ("running", RUNNING_ACTIONS),
            "poweroff" => ("stopped", STOPPED_ACTIONS),
            "stop_in_place" => ("stopped in place", STOPPED_ACTIONS),
            other => {
                return Err(ScalewayGatewayError::Provider {
                    message: format!("400 Bad Request: unknown action {other}"),
                });
            }
        };
        server.state = state.to_owned();
        server.allowed_actions = actions(allowed);
        if state == "running" && server.public_ip.is_none() {
            server.public_ip = boot_address.map(|address| AddressRecord { address });
        }
        Ok(())
    }
}

impl InstancesApi for FakeInstances {
    fn list_servers<'a>(
        &'a self,
        _zone: &'a Zone,
        query: &'a ServerQuery,
    ) -> ApiFuture<'a, Vec<ServerRecord>> {
        Box::pin(async move {
            let mut state = self.lock();
            let tag = query
                .tag
                .as_ref()
                .map(|tag| format!(" tag={tag}"))
                .unwrap_or_default();
            let id = query
                .id
                .as_ref()
                .map(|id| format!(" id={id}"))
                .unwrap_or_default();
            state
                .requests
                .push(format!("GET servers{tag}{id} page={}", query.page));

            let skip = query.page.saturating_sub(1) * query.per_page;
            Ok(state
                .servers
                .iter()
                .filter(|server| query.tag.as_ref().is_none_or(|tag| server.tags.contains(tag)))
                .filter(|server| query.id.as_ref().is_none_or(|id| server.id == id.as_str()))
                .skip(skip)
                .take(query.per_page)
                .cloned()
                .collect())
        })
    }

    fn create_server<'a>(
        &'a self,
        _zone: &'a Zone,
        request: &'a CreateServerRequest,
    ) -> ApiFuture<'a, ServerRecord> {
        Box::pin(async move {
            let mut state = self.lock();
            state.requests.push(format!("POST servers {}", request.commercial_type));
            if let Some(message) = state.create_rejection.clone() {
                return Err(ScalewayGatewayError::Provider { message });
            }
            state.next_id += 1;
            let record = ServerRecord {
                id: format!("srv-new-{}", state.next_id),
                name: request.name.clone(),
                state: if request.stopped { "stopped" } else { "running" }.to_owned(),
                tags: request.tags.clone(),
                allowed_actions: actions(STOPPED_ACTIONS),
                private_ip: None,
                public_ip: None,
                public_ips: None,
            };
            state.servers.push(record.clone());
            Ok(record)
        })
    }

    fn server_action<'a>(
        &'a self,
        _zone: &'a Zone,
        id: &'a InstanceId,
        action: &'a Action,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.requests.push(format!("POST action {id} {action}"));
            state.apply(id, action)
        })
    }

    fn delete_server<'a>(&'a self, _zone: &'a Zone, id: &'a InstanceId) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.requests.push(format!("DELETE servers {id}"));
            state.remove(id)
        })
    }

    fn server_products<'a>(
        &'a self,
        _zone: &'a Zone,
    ) -> ApiFuture<'a, BTreeMap<String, ServerProduct>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.requests.push(String::from("GET products"));
            Ok(state.products.clone())
        })
    }

    fn list_images<'a>(
        &'a self,
        _zone: &'a Zone,
        query: &'a ImageQuery,
    ) -> ApiFuture<'a, Vec<ScalewayImage>> {
        Box::pin(async move {
            let mut state = self.lock();
            state
                .requests
                .push(format!("GET images public={}", query.public));
            Ok(state
                .images
                .iter()
                .filter(|image| image.public == query.public && image.arch == query.arch)
                .filter(|image| {
                    query
                        .name
                        .as_ref()
                        .is_none_or(|name| image.name.contains(name.as_str()))
                })
                .map(scaleway_image)
                .collect())
        })
    }
}
