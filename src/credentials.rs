//! Login credentials for remote script execution.
//!
//! Credentials describe who logs in to a node, not how the provider API is
//! authenticated. By default they are the local caller's username and SSH
//! private key; configuration can override the username, the key location,
//! or switch to password authentication.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::action::Action;
use crate::local_file::{expand_tilde, read_to_string};

/// Conventional private key location, relative to the home directory.
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "~/.ssh/id_rsa";

/// Secret half of a credential pair.
#[derive(Clone, Eq, PartialEq)]
pub enum Secret {
    /// PEM/OpenSSH private key material.
    PrivateKey(String),
    /// Login password.
    Password(String),
}

/// Immutable login identity. `Debug` output never contains the secret.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    username: String,
    secret: Secret,
    public_key: Option<String>,
}

impl Credentials {
    /// Key-based credentials.
    #[must_use]
    pub fn with_private_key(username: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::PrivateKey(private_key.into()),
            public_key: None,
        }
    }

    /// Password-based credentials.
    #[must_use]
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::Password(password.into()),
            public_key: None,
        }
    }

    /// Attaches the public half of the key, used when bootstrapping accounts.
    #[must_use]
    pub fn and_public_key(mut self, public_key: Option<String>) -> Self {
        self.public_key = public_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());
        self
    }

    /// Login username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Secret material.
    #[must_use]
    pub const fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Private key material, when key-based.
    #[must_use]
    pub fn private_key(&self) -> Option<&str> {
        match &self.secret {
            Secret::PrivateKey(key) => Some(key),
            Secret::Password(_) => None,
        }
    }

    /// Password, when password-based.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        match &self.secret {
            Secret::Password(password) => Some(password),
            Secret::PrivateKey(_) => None,
        }
    }

    /// Public key line, when known.
    #[must_use]
    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.secret {
            Secret::PrivateKey(_) => "private key",
            Secret::Password(_) => "password",
        };
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &format_args!("<redacted {kind}>"))
            .field("has_public_key", &self.public_key.is_some())
            .finish()
    }
}

/// Errors raised while constructing credentials.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// Raised when the local username cannot be determined.
    #[error("cannot determine the local username: set USER or configure login_user")]
    UnknownUser,
    /// Raised when the home directory is needed but unknown.
    #[error("cannot locate {path}: HOME is not set")]
    UnknownHome {
        /// Path that required home expansion.
        path: String,
    },
    /// Raised when key material cannot be read.
    #[error("error reading ssh key {path}: {message}")]
    KeyUnreadable {
        /// Key location.
        path: Utf8PathBuf,
        /// Underlying I/O message.
        message: String,
    },
    /// Raised when the key file is empty.
    #[error("ssh key {path} is empty")]
    EmptyKey {
        /// Key location.
        path: Utf8PathBuf,
    },
    /// Raised when a provider credential file cannot be read.
    #[error("error reading private key from '{path}': {message}")]
    CredentialFile {
        /// Credential file location.
        path: Utf8PathBuf,
        /// Underlying I/O message.
        message: String,
    },
}

/// Configuration-supplied overrides for the default login identity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CredentialOverrides {
    /// Replaces the local username.
    pub login_user: Option<String>,
    /// Switches to password authentication.
    pub login_password: Option<String>,
    /// Replaces the default private key location.
    pub private_key_path: Option<String>,
}

/// Facts about the local caller the resolver falls back on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocalIdentity {
    /// Local username.
    pub user: Option<String>,
    /// Home directory.
    pub home: Option<String>,
}

impl LocalIdentity {
    /// Reads `USER` (falling back to `LOGNAME`) and `HOME`.
    #[must_use]
    pub fn from_env() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .ok()
            .filter(|value| !value.trim().is_empty());
        let home = std::env::var("HOME")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Self { user, home }
    }
}

/// Determines the login identity used for remote execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialResolver {
    overrides: CredentialOverrides,
    local: LocalIdentity,
}

impl CredentialResolver {
    /// Creates a resolver over explicit local facts.
    #[must_use]
    pub const fn new(overrides: CredentialOverrides, local: LocalIdentity) -> Self {
        Self { overrides, local }
    }

    /// Creates a resolver that reads local facts from the environment.
    #[must_use]
    pub fn from_env(overrides: CredentialOverrides) -> Self {
        Self::new(overrides, LocalIdentity::from_env())
    }

    /// Resolves credentials for `action`.
    ///
    /// Actions that never execute remote scripts (destroy and the listing
    /// actions) resolve to `None` without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when the username is unknown or the key
    /// material cannot be read.
    pub fn resolve(&self, action: &Action) -> Result<Option<Credentials>, CredentialError> {
        if !action.requires_credentials() {
            return Ok(None);
        }
        self.resolve_login().map(Some)
    }

    fn resolve_login(&self) -> Result<Credentials, CredentialError> {
        let username = self
            .overrides
            .login_user
            .as_deref()
            .or(self.local.user.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(CredentialError::UnknownUser)?
            .to_owned();

        if let Some(password) = &self.overrides.login_password {
            debug!(user = %username, "using password credentials");
            return Ok(Credentials::with_password(username, password.clone()));
        }

        let key_path = self.key_path()?;
        let private_key = read_to_string(&key_path).map_err(|message| {
            CredentialError::KeyUnreadable {
                path: key_path.clone(),
                message,
            }
        })?;
        if private_key.trim().is_empty() {
            return Err(CredentialError::EmptyKey { path: key_path });
        }

        let public_path = Utf8PathBuf::from(format!("{key_path}.pub"));
        let public_key = read_to_string(&public_path).ok();
        debug!(user = %username, key = %key_path, "using key credentials");
        Ok(Credentials::with_private_key(username, private_key).and_public_key(public_key))
    }

    fn key_path(&self) -> Result<Utf8PathBuf, CredentialError> {
        let raw = self
            .overrides
            .private_key_path
            .as_deref()
            .unwrap_or(DEFAULT_PRIVATE_KEY_PATH);
        let Some(rest) = raw.strip_prefix("~/") else {
            return Ok(Utf8PathBuf::from(expand_tilde(raw)));
        };
        let home = self
            .local
            .home
            .as_deref()
            .ok_or_else(|| CredentialError::UnknownHome {
                path: raw.to_owned(),
            })?;
        Ok(Utf8Path::new(home).join(rest))
    }
}

/// Reads a provider credential that is supplied as a path to a key file.
///
/// # Errors
///
/// Returns [`CredentialError::CredentialFile`] when the file cannot be read
/// or is empty.
pub fn read_credential_file(path: &str) -> Result<String, CredentialError> {
    let expanded = Utf8PathBuf::from(expand_tilde(path));
    let contents =
        read_to_string(&expanded).map_err(|message| CredentialError::CredentialFile {
            path: expanded.clone(),
            message,
        })?;
    if contents.trim().is_empty() {
        return Err(CredentialError::CredentialFile {
            path: expanded,
            message: String::from("file is empty"),
        });
    }
    Ok(contents)
}
