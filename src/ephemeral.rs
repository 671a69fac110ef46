//! An in-memory U2F configuration provider. It holds nothing but the site
//! identity, so it is only really useful for demo-sites, testing and as an
//! example/reference implementation of the U2fConfig trait. Production
//! deployments should implement U2fConfig on their own configuration type.

use crate::U2fConfig;

/// An in-memory U2F configuration provider. See the module documentation -
/// implement [`U2fConfig`](crate::U2fConfig) on your own type for
/// production use.
pub struct U2fEphemeralConfig {
    app_id: String,
    origin: Option<String>,
}

impl std::fmt::Debug for U2fEphemeralConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "U2fEphemeralConfig{{ app_id: {:?}, origin: {:?} }}",
            self.app_id, self.origin
        )
    }
}

impl U2fConfig for U2fEphemeralConfig {
    /// Returns the application id. See the trait documentation for more.
    fn get_app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns the expected client origin, if origin checking was requested.
    fn get_origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

impl U2fEphemeralConfig {
    /// Create a new ephemeral config for the given application id, with no
    /// origin checking.
    pub fn new(app_id: &str) -> Self {
        U2fEphemeralConfig {
            app_id: app_id.to_string(),
            origin: None,
        }
    }

    /// Create a new ephemeral config that additionally requires client data
    /// to carry the given origin.
    pub fn new_with_origin(app_id: &str, origin: &str) -> Self {
        U2fEphemeralConfig {
            app_id: app_id.to_string(),
            origin: Some(origin.to_string()),
        }
    }
}
