//! Known provider identifiers.

use std::fmt;
use std::str::FromStr;

use crate::credentials::{CredentialError, read_credential_file};
use crate::invocation::ArgumentError;

/// How a provider interprets the credential argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialSource {
    /// The argument is the credential.
    Literal,
    /// The argument is a path to a private-key file whose contents are the
    /// credential.
    KeyFile,
}

/// Providers this build can connect to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProviderId {
    /// Scaleway Instances. Identity is the project id, credential the secret
    /// key.
    Scaleway,
    /// In-memory back-end. Authenticates with a key file and has a fixed
    /// login user.
    Stub,
}

impl ProviderId {
    /// Every known provider.
    pub const ALL: [Self; 2] = [Self::Scaleway, Self::Stub];

    /// Provider identifier as typed on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scaleway => "scaleway",
            Self::Stub => "stub",
        }
    }

    /// How the credential argument is interpreted.
    #[must_use]
    pub const fn credential_source(self) -> CredentialSource {
        match self {
            Self::Scaleway => CredentialSource::Literal,
            Self::Stub => CredentialSource::KeyFile,
        }
    }

    /// Whether nodes use a fixed login account rather than one created at
    /// boot, so templates carry the configured login user.
    #[must_use]
    pub const fn has_fixed_login_user(self) -> bool {
        matches!(self, Self::Stub)
    }

    /// Turns the raw credential argument into the provider credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::CredentialFile`] when a key-file credential
    /// cannot be read.
    pub fn resolve_credential(self, raw: &str) -> Result<String, CredentialError> {
        match self.credential_source() {
            CredentialSource::Literal => Ok(raw.to_owned()),
            CredentialSource::KeyFile => read_credential_file(raw),
        }
    }

    /// Comma separated list of known identifiers, for diagnostics.
    #[must_use]
    pub fn known_list() -> String {
        Self::ALL
            .iter()
            .map(|provider| provider.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ArgumentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == value.trim())
            .ok_or_else(|| ArgumentError::UnknownProvider {
                provider: value.to_owned(),
                known: Self::known_list(),
            })
    }
}
