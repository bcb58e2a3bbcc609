//! Error types for the Scaleway gateway.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::gateway::TemplateError;
use crate::ssh::SshError;

/// Errors raised by the Scaleway gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayGatewayError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a template or identity is missing a required field.
    #[error("invalid node template: {0}")]
    Validation(String),
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label or operating system family passed by the caller.
        label: String,
        /// Architecture requested by the caller.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when no commercial type offers the requested memory.
    #[error("no {arch} instance type with at least {min_ram_mib} MiB of RAM in zone {zone}")]
    NoInstanceTypeForRam {
        /// Requested RAM floor.
        min_ram_mib: u32,
        /// Architecture requested by the caller.
        arch: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when an asynchronous operation exceeds the timeout.
    #[error("timeout waiting for {action} on instance {instance_id}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the instance never exposes a public IP.
    #[error("instance {instance_id} missing public IPv4 address")]
    MissingPublicIp {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when teardown leaves a server visible in the API.
    #[error("instance {instance_id} still present after teardown")]
    ResidualResource {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the provider refuses a state transition.
    #[error("instance {instance_id} in state {state} does not allow {action}")]
    ActionNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
        /// Refused action.
        action: String,
    },
    /// Wrapper for provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or API.
        message: String,
    },
    /// Raised when a dispatch cannot be prepared.
    #[error(transparent)]
    Ssh(#[from] SshError),
}

impl ScalewayGatewayError {
    pub(crate) fn provider(err: &impl std::fmt::Display) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}

impl From<ScalewayError> for ScalewayGatewayError {
    fn from(value: ScalewayError) -> Self {
        Self::provider(&value)
    }
}

impl From<TemplateError> for ScalewayGatewayError {
    fn from(value: TemplateError) -> Self {
        match value {
            TemplateError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for ScalewayGatewayError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
