//! Authentication method selection
//!
//! Exactly one method is attempted per connect: an explicit key, else the
//! agent, else the password. A key that fails to load or authenticate is a
//! hard failure; there is no fallback to the password.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh_keys::key::KeyPair;
use tracing::debug;

use super::error::TransportError;
use super::ConnectRequest;

/// The single method chosen for a connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlan {
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
    Agent,
    Password(String),
}

impl AuthPlan {
    pub fn for_request(request: &ConnectRequest) -> Self {
        if let Some(path) = request.key_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            return AuthPlan::Key {
                path: path.clone(),
                passphrase: non_empty(request.key_passphrase.as_deref()),
            };
        }
        match non_empty(request.password.as_deref()) {
            Some(password) => AuthPlan::Password(password),
            None => AuthPlan::Agent,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            AuthPlan::Key { .. } => "publickey",
            AuthPlan::Agent => "agent",
            AuthPlan::Password(_) => "password",
        }
    }

    /// Resolve into something a link can authenticate with; loads the key file
    pub fn into_credential(self) -> Result<Credential, TransportError> {
        match self {
            AuthPlan::Key { path, passphrase } => {
                load_key(&path, passphrase.as_deref()).map(Credential::Key)
            }
            AuthPlan::Agent => Ok(Credential::Agent),
            AuthPlan::Password(password) => Ok(Credential::Password(password)),
        }
    }
}

/// Material handed to [`ShellLink::authenticate`](super::ShellLink::authenticate)
pub enum Credential {
    Key(Arc<KeyPair>),
    Agent,
    Password(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Key(_) => f.write_str("Key(..)"),
            Credential::Agent => f.write_str("Agent"),
            Credential::Password(_) => f.write_str("Password(..)"),
        }
    }
}

/// Load a private key, decrypting it with `passphrase` if given
pub fn load_key(path: &Path, passphrase: Option<&str>) -> Result<Arc<KeyPair>, TransportError> {
    debug!(path = %path.display(), "Loading identity file");
    if !path.is_file() {
        return Err(TransportError::KeyLoad {
            path: path.to_path_buf(),
            message: "no such file".to_string(),
        });
    }
    russh_keys::load_secret_key(path, passphrase)
        .map(Arc::new)
        .map_err(|e| TransportError::KeyLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// True if the key file exists but cannot be read without a passphrase
pub fn key_needs_passphrase(path: &Path) -> bool {
    path.is_file()
        && matches!(
            russh_keys::load_secret_key(path, None),
            Err(russh_keys::Error::KeyIsEncrypted)
        )
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(str::to_string)
}
