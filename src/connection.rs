//! Scoped ownership of a gateway.
//!
//! A [`Connection`] owns the gateway for one invocation and releases it
//! exactly once: either explicitly through [`Connection::release`] or, on
//! any other exit path including unwinding, when the guard is dropped.

use std::ops::Deref;

use tracing::debug;

use crate::gateway::Gateway;

/// Guard that closes its gateway on release or drop.
#[derive(Debug)]
pub struct Connection<G: Gateway> {
    gateway: G,
    released: bool,
}

impl<G: Gateway> Connection<G> {
    /// Takes ownership of an open gateway.
    #[must_use]
    pub const fn open(gateway: G) -> Self {
        Self {
            gateway,
            released: false,
        }
    }

    /// Borrowed gateway.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Whether the gateway has been closed.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Closes the gateway now. Later calls and the eventual drop do nothing.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.gateway.close();
        debug!("gateway released");
    }
}

impl<G: Gateway> Deref for Connection<G> {
    type Target = G;

    fn deref(&self) -> &Self::Target {
        &self.gateway
    }
}

impl<G: Gateway> Drop for Connection<G> {
    fn drop(&mut self) {
        self.release();
    }
}
