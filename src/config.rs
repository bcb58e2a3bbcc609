//! Configuration loading via `ortho-config`.
//!
//! Positional arguments carry everything that identifies one invocation;
//! the settings here tune how actions behave and are layered from defaults,
//! `flotilla.toml`, and environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::CredentialOverrides;
use crate::lifecycle::{DEFAULT_INSTALL_SCRIPT, OrchestratorSettings, TemplateDefaults};
use crate::logging::LogFormat;

/// Default script completion timeout: twenty minutes.
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 20 * 60;

/// Login user baked into templates for providers with a fixed account.
pub const DEFAULT_FIXED_LOGIN_USER: &str = "toor";

/// General settings for `flotilla`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLOTILLA",
    discovery(
        app_name = "flotilla",
        env_var = "FLOTILLA_CONFIG_PATH",
        config_file_name = "flotilla.toml",
        dotfile_name = ".flotilla.toml",
        project_file_name = "flotilla.toml"
    )
)]
pub struct FlotillaConfig {
    /// Minimum RAM in MiB for nodes created by `add`.
    pub min_ram: Option<u32>,
    /// Operating system family used for image lookup instead of the image
    /// label.
    pub os_family: Option<String>,
    /// Login username; defaults to the local user.
    pub login_user: Option<String>,
    /// Login password; switches remote execution to password authentication.
    pub login_password: Option<String>,
    /// Private key location; defaults to `~/.ssh/id_rsa`.
    pub private_key_path: Option<String>,
    /// Seconds a script may run on a node before it counts as failed.
    #[ortho_config(default = DEFAULT_SCRIPT_TIMEOUT_SECS)]
    pub script_timeout_secs: u64,
    /// Command run inline on the group after `add`.
    #[ortho_config(default = DEFAULT_INSTALL_SCRIPT.to_owned())]
    pub install_script: String,
    /// Log output format: `human` or `json`.
    #[ortho_config(default = "human".to_owned())]
    pub log_format: String,
}

/// Scaleway template defaults. The project id and secret key come from the
/// command line.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Preferred availability zone. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Commercial type for new nodes when no RAM floor is configured.
    #[ortho_config(default = "DEV1-S".to_owned())]
    pub default_instance_type: String,
    /// Human-friendly image label (for example `Ubuntu 24.04 Noble Numbat`).
    #[ortho_config(default = "Ubuntu 24.04 Noble Numbat".to_owned())]
    pub default_image: String,
    /// CPU architecture used to select the correct image variant.
    #[ortho_config(default = "x86_64".to_owned())]
    pub default_architecture: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to flotilla.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl FlotillaConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("flotilla")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for an empty install script and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.install_script,
            &FieldMetadata::new(
                "post-boot install script",
                "FLOTILLA_INSTALL_SCRIPT",
                "install_script",
            ),
        )?;
        if self.min_ram == Some(0) {
            return Err(ConfigError::Invalid(String::from(
                "min_ram must be greater than zero (FLOTILLA_MIN_RAM)",
            )));
        }
        if self.script_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "script_timeout_secs must be greater than zero (FLOTILLA_SCRIPT_TIMEOUT_SECS)",
            )));
        }
        self.log_format()?;
        Ok(())
    }

    /// Parsed log format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown format name.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "unknown log_format '{}': expected human or json (FLOTILLA_LOG_FORMAT)",
                self.log_format
            ))
        })
    }

    /// Overrides for the login credential resolver.
    #[must_use]
    pub fn credential_overrides(&self) -> CredentialOverrides {
        CredentialOverrides {
            login_user: self.login_user.clone(),
            login_password: self.login_password.clone(),
            private_key_path: self.private_key_path.clone(),
        }
    }

    /// Orchestrator settings built on provider template defaults.
    ///
    /// `fixed_login` selects whether templates carry the login user for
    /// providers whose nodes use a fixed account.
    #[must_use]
    pub fn orchestrator_settings(
        &self,
        mut template: TemplateDefaults,
        fixed_login: bool,
    ) -> OrchestratorSettings {
        template.min_ram_mib = self.min_ram;
        if self.os_family.is_some() {
            template.os_family.clone_from(&self.os_family);
        }
        OrchestratorSettings {
            template,
            install_script: self.install_script.clone(),
            fixed_login_user: fixed_login.then(|| {
                self.login_user
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FIXED_LOGIN_USER.to_owned())
            }),
        }
    }
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("flotilla")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.default_image,
            &FieldMetadata::new("VM image", "SCW_DEFAULT_IMAGE", "default_image"),
        )?;
        require_field(
            &self.default_instance_type,
            &FieldMetadata::new(
                "instance type",
                "SCW_DEFAULT_INSTANCE_TYPE",
                "default_instance_type",
            ),
        )?;
        require_field(
            &self.default_zone,
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )?;
        require_field(
            &self.default_architecture,
            &FieldMetadata::new(
                "CPU architecture",
                "SCW_DEFAULT_ARCHITECTURE",
                "default_architecture",
            ),
        )?;
        Ok(())
    }

    /// Template defaults for Scaleway nodes.
    #[must_use]
    pub fn template_defaults(&self) -> TemplateDefaults {
        TemplateDefaults {
            image_label: self.default_image.clone(),
            os_family: None,
            hardware: self.default_instance_type.clone(),
            location: self.default_zone.clone(),
            min_ram_mib: None,
        }
    }
}

/// Template defaults for the in-memory stub.
#[must_use]
pub fn stub_template_defaults() -> TemplateDefaults {
    TemplateDefaults {
        image_label: String::from("Stub Linux"),
        os_family: None,
        hardware: String::from("small"),
        location: String::from("local"),
        min_ram_mib: None,
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
