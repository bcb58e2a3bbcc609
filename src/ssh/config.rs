//! SSH client settings.
//!
//! Loaded via `ortho-config` from defaults, `flotilla.toml`, and
//! `FLOTILLA_SSH_*` environment variables.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use super::SshError;

/// Settings for the system `ssh` client.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FLOTILLA_SSH",
    discovery(
        app_name = "flotilla",
        env_var = "FLOTILLA_CONFIG_PATH",
        config_file_name = "flotilla.toml",
        dotfile_name = ".flotilla.toml",
        project_file_name = "flotilla.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `sshpass` executable, used for password credentials.
    #[ortho_config(default = "sshpass".to_owned())]
    pub sshpass_bin: String,
    /// Port the nodes accept SSH on.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Whether to enforce host key checking; off by default because nodes
    /// are created and destroyed freely.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Seconds to wait for the TCP connection.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Seconds between status polls of a background task.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
}

impl SshConfig {
    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::InvalidConfig`] naming the first empty field.
    pub fn validate(&self) -> Result<(), SshError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.sshpass_bin, "sshpass_bin")?;
        if self.port == 0 {
            return Err(SshError::InvalidConfig {
                field: String::from("port"),
            });
        }
        Ok(())
    }

    /// Delay between background task status polls, never below one second.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        let secs = if self.poll_interval_secs == 0 {
            1
        } else {
            self.poll_interval_secs
        };
        Duration::from_secs(secs)
    }

    /// Loads configuration from files and environment variables only.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Load`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshError> {
        Self::load_from_iter([std::ffi::OsString::from("flotilla")])
            .map_err(|err| SshError::Load(err.to_string()))
    }

    fn require_value(value: &str, field: &str) -> Result<(), SshError> {
        if value.trim().is_empty() {
            return Err(SshError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}
