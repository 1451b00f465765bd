//! Basic-auth credentials for the gateway

use std::path::Path;
use tracing::warn;

pub const USERNAME_FILE: &str = "basic-auth-user";
pub const PASSWORD_FILE: &str = "basic-auth-password";

/// Username/password pair, read once at startup
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read both secrets from `dir`. A missing or unreadable file is logged and
    /// leaves that half empty.
    pub fn load(dir: &Path) -> Self {
        Self {
            username: read_secret(dir, USERNAME_FILE).unwrap_or_default(),
            password: read_secret(dir, PASSWORD_FILE).unwrap_or_default(),
        }
    }
}

fn read_secret(dir: &Path, name: &str) -> Option<String> {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents.trim().to_string()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unable to read gateway secret");
            None
        }
    }
}
