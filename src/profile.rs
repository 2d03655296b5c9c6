//! Connection profiles

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    22
}

/// A saved connection target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub open_in_new_tab: bool,
}

impl Profile {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            name: host.clone(),
            host,
            user: user.into(),
            port: default_port(),
            key_path: None,
            open_in_new_tab: false,
        }
    }

    /// Parse `[user@]host[:port]`; a missing user is left empty
    pub fn from_target(target: &str) -> Option<Self> {
        let (user, rest) = match target.rsplit_once('@') {
            Some((user, rest)) => (user, rest),
            None => ("", target),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (rest, default_port()),
        };
        if host.is_empty() {
            return None;
        }
        let mut profile = Self::new(host, user);
        profile.port = port;
        Some(profile)
    }

    /// Label shown in the window title
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }
}
