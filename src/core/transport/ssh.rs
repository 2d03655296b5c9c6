//! SSH backend
//!
//! russh client driven from a current-thread tokio runtime. Every call blocks
//! on the runtime only for as long as the operation takes; reads are bounded
//! by a small time budget so a poll tick always returns promptly.

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::runtime::Runtime;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::auth::Credential;
use super::error::TransportError;
use super::{ChannelStatus, Connector, ShellLink};
use crate::core::term::GridSize;

/// Terminal type announced in the PTY request
const TERM_TYPE: &str = "xterm-256color";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Time one poll may spend draining channel messages
const READ_BUDGET: Duration = Duration::from_millis(2);
/// Bytes one poll may return
const MAX_READ_PER_POLL: usize = 64 * 1024;

/// SSH client handler.
struct ClientHandler {
    host: String,
}

#[async_trait::async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // No known_hosts store; accept with a warning
        warn!(host = %self.host, "Host key not verified, accepting key");
        Ok(true)
    }
}

/// Opens SSH connections
pub struct SshConnector {
    runtime: Arc<Runtime>,
    config: Arc<client::Config>,
}

impl SshConnector {
    pub fn new() -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Io {
                message: format!("failed to start runtime: {}", e),
            })?;

        let config = client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: 3,
            ..Default::default()
        };

        Ok(Self {
            runtime: Arc::new(runtime),
            config: Arc::new(config),
        })
    }
}

impl Connector for SshConnector {
    type Link = SshLink;

    fn connect(&mut self, host: &str, port: u16) -> Result<SshLink, TransportError> {
        let addr = format!("{}:{}", host, port);
        let handler = ClientHandler {
            host: host.to_string(),
        };
        let config = self.config.clone();

        let handle = self.runtime.block_on(async {
            timeout(CONNECT_TIMEOUT, client::connect(config, (host, port), handler))
                .await
                .map_err(|_| TransportError::Timeout { addr: addr.clone() })?
                .map_err(|e| TransportError::Connect {
                    addr: addr.clone(),
                    message: e.to_string(),
                })
        })?;
        debug!(addr = %addr, "SSH connection established");

        Ok(SshLink {
            runtime: self.runtime.clone(),
            handle: Some(handle),
            channel: None,
        })
    }
}

/// An SSH connection and its shell channel
pub struct SshLink {
    runtime: Arc<Runtime>,
    handle: Option<client::Handle<ClientHandler>>,
    channel: Option<Channel<Msg>>,
}

impl SshLink {
    fn channel_mut(&mut self) -> Result<&mut Channel<Msg>, TransportError> {
        self.channel.as_mut().ok_or(TransportError::NoChannel)
    }
}

impl ShellLink for SshLink {
    fn authenticate(&mut self, user: &str, credential: Credential) -> Result<bool, TransportError> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| TransportError::auth("connection closed"))?;

        self.runtime.block_on(async {
            match credential {
                Credential::Key(key) => handle
                    .authenticate_publickey(user, key)
                    .await
                    .map_err(|e| TransportError::auth(format!("public key auth failed: {}", e))),
                Credential::Password(password) => handle
                    .authenticate_password(user, password)
                    .await
                    .map_err(|e| TransportError::auth(format!("password auth failed: {}", e))),
                Credential::Agent => agent_auth(handle, user).await,
            }
        })
    }

    fn open_channel(&mut self) -> Result<(), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NoChannel)?;
        let channel = self
            .runtime
            .block_on(handle.channel_open_session())
            .map_err(|e| TransportError::channel(format!("failed to open session channel: {}", e)))?;
        self.channel = Some(channel);
        Ok(())
    }

    fn request_pty(&mut self, size: GridSize) -> Result<(), TransportError> {
        let runtime = self.runtime.clone();
        let channel = self.channel_mut()?;
        runtime.block_on(async {
            channel
                .request_pty(true, TERM_TYPE, size.cols as u32, size.rows as u32, 0, 0, &[])
                .await?;
            wait_reply(channel, "pty").await
        })
    }

    fn request_shell(&mut self) -> Result<(), TransportError> {
        let runtime = self.runtime.clone();
        let channel = self.channel_mut()?;
        runtime.block_on(async {
            channel.request_shell(true).await?;
            wait_reply(channel, "shell").await
        })
    }

    fn poll_read(&mut self, out: &mut Vec<u8>) -> Result<ChannelStatus, TransportError> {
        let runtime = self.runtime.clone();
        let channel = self.channel_mut()?;

        runtime.block_on(async {
            let deadline = Instant::now() + READ_BUDGET;
            while out.len() < MAX_READ_PER_POLL {
                let msg = match timeout(deadline.saturating_duration_since(Instant::now()), channel.wait()).await {
                    Ok(msg) => msg,
                    // Nothing more within the budget
                    Err(_) => break,
                };
                match msg {
                    Some(ChannelMsg::Data { data }) => out.extend_from_slice(&data),
                    // stderr is shown like stdout
                    Some(ChannelMsg::ExtendedData { data, .. }) => out.extend_from_slice(&data),
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        info!(exit_status, "Remote shell exited");
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                        return Ok(ChannelStatus::Closed);
                    }
                    Some(_) => {}
                }
            }
            Ok(ChannelStatus::Open)
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let runtime = self.runtime.clone();
        let channel = self.channel_mut()?;
        runtime
            .block_on(channel.data(bytes))
            .map_err(|e| TransportError::Io {
                message: format!("write failed: {}", e),
            })
    }

    fn resize(&mut self, size: GridSize) -> Result<(), TransportError> {
        let runtime = self.runtime.clone();
        let channel = self.channel_mut()?;
        runtime.block_on(channel.window_change(size.cols as u32, size.rows as u32, 0, 0))?;
        Ok(())
    }

    fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    fn close(&mut self) {
        let channel = self.channel.take();
        let handle = self.handle.take();
        if channel.is_none() && handle.is_none() {
            return;
        }

        self.runtime.block_on(async {
            if let Some(channel) = channel {
                let _ = channel.eof().await;
                let _ = channel.close().await;
            }
            if let Some(handle) = handle {
                let _ = handle
                    .disconnect(Disconnect::ByApplication, "", "English")
                    .await;
            }
        });
        debug!("SSH connection closed");
    }
}

impl Drop for SshLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wait for the Success/Failure answering a request sent with `want_reply`
async fn wait_reply(channel: &mut Channel<Msg>, what: &str) -> Result<(), TransportError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(TransportError::channel(format!("{} request refused", what)));
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                return Err(TransportError::channel(format!(
                    "channel closed during {} request",
                    what
                )));
            }
            Some(other) => debug!(?other, "Ignoring message while waiting for {}", what),
        }
    }
}

/// Try each identity offered by the agent at `SSH_AUTH_SOCK`
#[cfg(unix)]
async fn agent_auth(handle: &mut client::Handle<ClientHandler>, user: &str) -> Result<bool, TransportError> {
    use russh_keys::agent::client::AgentClient;

    let mut agent = AgentClient::connect_env()
        .await
        .map_err(|e| TransportError::auth(format!("ssh agent unavailable: {}", e)))?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|e| TransportError::auth(format!("ssh agent error: {}", e)))?;
    if identities.is_empty() {
        return Err(TransportError::auth("ssh agent has no identities"));
    }

    for key in identities {
        let (returned, result) = handle.authenticate_future(user, key, agent).await;
        agent = returned;
        match result {
            Ok(true) => return Ok(true),
            Ok(false) => debug!("Agent identity rejected"),
            Err(e) => warn!(error = ?e, "Agent signing failed"),
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn agent_auth(_handle: &mut client::Handle<ClientHandler>, _user: &str) -> Result<bool, TransportError> {
    Err(TransportError::auth("ssh agent is not supported on this platform"))
}
