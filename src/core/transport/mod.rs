//! Session transport
//!
//! Owns the connection lifecycle of one remote shell:
//!
//! ```text
//! Idle -> Connecting -> Authenticating -> ChannelOpening -> Connected -> Disconnected
//! ```
//!
//! The network side sits behind [`Connector`]/[`ShellLink`] so the state
//! machine can be driven by the SSH backend or by a scripted link in tests.
//! Nothing here spawns threads; [`SessionTransport::poll`] is one bounded,
//! non-blocking read per call and is meant to be driven from a timer tick.

pub mod auth;
pub mod error;
pub mod ssh;

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use super::term::GridSize;
use crate::profile::Profile;

pub use auth::{AuthPlan, Credential};
pub use error::TransportError;
pub use ssh::SshConnector;

/// Everything needed for one connect attempt. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    pub key_passphrase: Option<String>,
}

impl ConnectRequest {
    pub fn from_profile(profile: &Profile, password: Option<String>, key_passphrase: Option<String>) -> Self {
        Self {
            host: profile.host.clone(),
            user: profile.user.clone(),
            port: profile.port,
            password,
            key_path: profile.key_path.clone(),
            key_passphrase,
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Authenticating,
    ChannelOpening,
    Connected,
    Disconnected,
}

impl SessionState {
    /// A connection attempt is underway or established
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Connecting
                | SessionState::Authenticating
                | SessionState::ChannelOpening
                | SessionState::Connected
        )
    }
}

/// Events surfaced to the owner, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Output(Vec<u8>),
    Error(String),
    Disconnected,
}

/// Result of one non-blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Open,
    /// Remote sent EOF or closed the channel
    Closed,
}

/// Opens transport connections
pub trait Connector {
    type Link: ShellLink;

    /// Connect and complete the key exchange
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Link, TransportError>;
}

/// One connection carrying at most one shell channel.
///
/// Implementations release everything they hold in `close`, which must be
/// idempotent, and from `Drop`.
pub trait ShellLink {
    /// `Ok(false)` means the server rejected the credential
    fn authenticate(&mut self, user: &str, credential: Credential) -> Result<bool, TransportError>;

    fn open_channel(&mut self) -> Result<(), TransportError>;

    fn request_pty(&mut self, size: GridSize) -> Result<(), TransportError>;

    fn request_shell(&mut self) -> Result<(), TransportError>;

    /// Append whatever is readable right now to `out` without blocking
    fn poll_read(&mut self, out: &mut Vec<u8>) -> Result<ChannelStatus, TransportError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    fn resize(&mut self, size: GridSize) -> Result<(), TransportError>;

    fn has_channel(&self) -> bool;

    fn close(&mut self);
}

/// Session transport state machine
pub struct SessionTransport<C: Connector = SshConnector> {
    connector: C,
    link: Option<C::Link>,
    state: SessionState,
    events: VecDeque<TransportEvent>,
    /// Last size requested for the remote PTY
    pty_size: GridSize,
}

impl<C: Connector> SessionTransport<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: None,
            state: SessionState::Idle,
            events: VecDeque::new(),
            pty_size: GridSize::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn pty_size(&self) -> GridSize {
        self.pty_size
    }

    /// Take all pending events in order
    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        self.events.drain(..).collect()
    }

    /// Connect, authenticate and start a shell. Blocks until the attempt
    /// either reaches `Connected` or fails.
    ///
    /// Any live session is torn down first.
    pub fn connect(&mut self, request: &ConnectRequest) {
        self.disconnect_from_host();

        let addr = format!("{}:{}", request.host, request.port);
        info!(addr = %addr, user = %request.user, "Connecting");
        self.state = SessionState::Connecting;

        match self.establish(request) {
            Ok(link) => {
                self.link = Some(link);
                self.state = SessionState::Connected;
                self.events.push_back(TransportEvent::Connected);
                info!(addr = %addr, "Session established");
            }
            Err(e) => {
                error!(addr = %addr, state = ?self.state, error = %e, "Connect failed");
                self.events.push_back(TransportEvent::Error(e.to_string()));
                self.disconnect_from_host();
            }
        }
    }

    /// Drive the attempt through authentication and channel setup. A link
    /// dropped on an error path closes itself.
    fn establish(&mut self, request: &ConnectRequest) -> Result<C::Link, TransportError> {
        let mut link = self.connector.connect(&request.host, request.port)?;
        debug!("Handshake complete");

        self.state = SessionState::Authenticating;
        let plan = AuthPlan::for_request(request);
        let method = plan.method_name();
        debug!(method, "Authenticating");
        let credential = plan.into_credential()?;
        if !link.authenticate(&request.user, credential)? {
            return Err(TransportError::auth(format!("{} authentication rejected", method)));
        }
        info!(method, "Authenticated");

        self.state = SessionState::ChannelOpening;
        link.open_channel()?;
        link.request_pty(self.pty_size)?;
        link.request_shell()?;
        Ok(link)
    }

    /// One bounded, non-blocking read. EOF or channel closure disconnects.
    pub fn poll(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let mut buf = Vec::new();
        let status = link.poll_read(&mut buf);
        if !buf.is_empty() {
            self.events.push_back(TransportEvent::Output(buf));
        }

        match status {
            Ok(ChannelStatus::Open) => {}
            Ok(ChannelStatus::Closed) => {
                info!("Remote closed the channel");
                self.disconnect_from_host();
            }
            Err(e) => {
                warn!(error = %e, "Read failed");
                self.events.push_back(TransportEvent::Error(e.to_string()));
                self.disconnect_from_host();
            }
        }
    }

    /// Write to the shell. Outside `Connected` this reports an error and does no I/O.
    pub fn send(&mut self, bytes: &[u8]) {
        let link = match self.link.as_mut() {
            Some(link) if self.state == SessionState::Connected => link,
            _ => {
                self.events
                    .push_back(TransportEvent::Error(TransportError::NoChannel.to_string()));
                return;
            }
        };

        if let Err(e) = link.write(bytes) {
            warn!(error = %e, "Write failed");
            self.events.push_back(TransportEvent::Error(e.to_string()));
            self.disconnect_from_host();
        }
    }

    /// Release the link and leave the live state. Safe to call repeatedly;
    /// only the first call after a live state reports `Disconnected`.
    pub fn disconnect_from_host(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if self.state.is_live() {
            self.state = SessionState::Disconnected;
            self.events.push_back(TransportEvent::Disconnected);
            info!("Disconnected");
        }
    }

    /// Remember the size for the next PTY request and forward it if a channel
    /// is open. Failures are not reported.
    pub fn set_pty_size(&mut self, rows: u16, cols: u16) {
        self.pty_size = GridSize { rows, cols };
        if let Some(link) = self.link.as_mut().filter(|l| l.has_channel()) {
            if let Err(e) = link.resize(self.pty_size) {
                debug!(error = %e, "PTY resize ignored");
            }
        }
    }
}

/// Scripted in-memory connector for state machine tests
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Shared call log, so tests can inspect what a link was asked to do
    pub type CallLog = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Default)]
    pub struct Script {
        pub refuse_connect: bool,
        pub reject_auth: bool,
        pub fail_pty: bool,
        pub fail_write: bool,
        /// Reads handed out by successive polls
        pub reads: VecDeque<(Vec<u8>, ChannelStatus)>,
    }

    pub struct MockConnector {
        pub script: Script,
        pub log: CallLog,
    }

    impl MockConnector {
        pub fn new(script: Script) -> (Self, CallLog) {
            let log = CallLog::default();
            (
                Self {
                    script,
                    log: log.clone(),
                },
                log,
            )
        }
    }

    impl Connector for MockConnector {
        type Link = MockLink;

        fn connect(&mut self, host: &str, port: u16) -> Result<MockLink, TransportError> {
            self.log.lock().unwrap().push(format!("connect {}:{}", host, port));
            if self.script.refuse_connect {
                return Err(TransportError::Connect {
                    addr: format!("{}:{}", host, port),
                    message: "connection refused".to_string(),
                });
            }
            Ok(MockLink {
                script: self.script.clone(),
                log: self.log.clone(),
                channel: false,
                closed: false,
            })
        }
    }

    pub struct MockLink {
        script: Script,
        log: CallLog,
        channel: bool,
        closed: bool,
    }

    impl MockLink {
        fn record(&self, call: String) {
            self.log.lock().unwrap().push(call);
        }
    }

    impl ShellLink for MockLink {
        fn authenticate(&mut self, user: &str, credential: Credential) -> Result<bool, TransportError> {
            let method = match credential {
                Credential::Key(_) => "key",
                Credential::Agent => "agent",
                Credential::Password(_) => "password",
            };
            self.record(format!("auth {} {}", method, user));
            Ok(!self.script.reject_auth)
        }

        fn open_channel(&mut self) -> Result<(), TransportError> {
            self.record("open_channel".to_string());
            self.channel = true;
            Ok(())
        }

        fn request_pty(&mut self, size: GridSize) -> Result<(), TransportError> {
            self.record(format!("pty {}x{}", size.rows, size.cols));
            if self.script.fail_pty {
                return Err(TransportError::channel("pty request refused"));
            }
            Ok(())
        }

        fn request_shell(&mut self) -> Result<(), TransportError> {
            self.record("shell".to_string());
            Ok(())
        }

        fn poll_read(&mut self, out: &mut Vec<u8>) -> Result<ChannelStatus, TransportError> {
            match self.script.reads.pop_front() {
                Some((bytes, status)) => {
                    out.extend_from_slice(&bytes);
                    Ok(status)
                }
                None => Ok(ChannelStatus::Open),
            }
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.script.fail_write {
                return Err(TransportError::Io {
                    message: "broken pipe".to_string(),
                });
            }
            self.record(format!("write {}", String::from_utf8_lossy(bytes)));
            Ok(())
        }

        fn resize(&mut self, size: GridSize) -> Result<(), TransportError> {
            self.record(format!("resize {}x{}", size.rows, size.cols));
            Ok(())
        }

        fn has_channel(&self) -> bool {
            self.channel
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.channel = false;
                self.record("close".to_string());
            }
        }
    }

    impl Drop for MockLink {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{CallLog, MockConnector, Script};
    use super::*;

    fn request() -> ConnectRequest {
        ConnectRequest {
            host: "example.com".to_string(),
            user: "alice".to_string(),
            port: 22,
            ..Default::default()
        }
    }

    fn transport(script: Script) -> (SessionTransport<MockConnector>, CallLog) {
        let (connector, log) = MockConnector::new(script);
        (SessionTransport::new(connector), log)
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_connect_success_sequence() {
        let (mut t, log) = transport(Script::default());
        t.connect(&request());

        assert_eq!(t.state(), SessionState::Connected);
        assert_eq!(t.drain_events(), vec![TransportEvent::Connected]);
        assert_eq!(
            calls(&log),
            vec!["connect example.com:22", "auth agent alice", "open_channel", "pty 24x100", "shell"]
        );
    }

    #[test]
    fn test_missing_key_never_falls_back_to_password() {
        let (mut t, log) = transport(Script::default());
        let mut req = request();
        req.key_path = Some(PathBuf::from("/nonexistent/id_ed25519"));
        req.password = Some("hunter2".to_string());
        t.connect(&req);

        let events = t.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], TransportEvent::Error(msg) if msg.contains("key")));
        assert_eq!(events[1], TransportEvent::Disconnected);
        assert_eq!(t.state(), SessionState::Disconnected);
        assert!(!calls(&log).iter().any(|c| c.starts_with("auth")));
    }

    #[test]
    fn test_rejected_auth_tears_down() {
        let (mut t, log) = transport(Script {
            reject_auth: true,
            ..Default::default()
        });
        let mut req = request();
        req.password = Some("wrong".to_string());
        t.connect(&req);

        let events = t.drain_events();
        assert!(!events.contains(&TransportEvent::Connected));
        assert!(matches!(&events[0], TransportEvent::Error(msg) if msg.contains("password")));
        assert_eq!(events.last(), Some(&TransportEvent::Disconnected));
        assert_eq!(calls(&log).last().map(String::as_str), Some("close"));
    }

    #[test]
    fn test_pty_failure_closes_link() {
        let (mut t, log) = transport(Script {
            fail_pty: true,
            ..Default::default()
        });
        t.connect(&request());

        assert_eq!(t.state(), SessionState::Disconnected);
        assert!(!t.drain_events().contains(&TransportEvent::Connected));
        let calls = calls(&log);
        assert!(!calls.contains(&"shell".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }

    #[test]
    fn test_refused_connect() {
        let (mut t, _log) = transport(Script {
            refuse_connect: true,
            ..Default::default()
        });
        t.connect(&request());
        let events = t.drain_events();
        assert!(matches!(&events[0], TransportEvent::Error(msg) if msg.contains("refused")));
        assert_eq!(events[1], TransportEvent::Disconnected);
    }

    #[test]
    fn test_disconnect_twice_emits_once() {
        let (mut t, log) = transport(Script::default());
        t.connect(&request());
        t.drain_events();

        t.disconnect_from_host();
        t.disconnect_from_host();
        assert_eq!(t.drain_events(), vec![TransportEvent::Disconnected]);
        assert_eq!(calls(&log).iter().filter(|c| *c == "close").count(), 1);
    }

    #[test]
    fn test_disconnect_when_idle_is_silent() {
        let (mut t, _log) = transport(Script::default());
        t.disconnect_from_host();
        assert!(t.drain_events().is_empty());
        assert_eq!(t.state(), SessionState::Idle);
    }

    #[test]
    fn test_poll_output_then_eof() {
        let mut reads = VecDeque::new();
        reads.push_back((b"hello".to_vec(), ChannelStatus::Open));
        reads.push_back((b"bye".to_vec(), ChannelStatus::Closed));
        let (mut t, _log) = transport(Script {
            reads,
            ..Default::default()
        });
        t.connect(&request());
        t.poll();
        t.poll();
        t.poll();

        assert_eq!(
            t.drain_events(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Output(b"hello".to_vec()),
                TransportEvent::Output(b"bye".to_vec()),
                TransportEvent::Disconnected,
            ]
        );
    }

    #[test]
    fn test_send_without_channel_reports_error() {
        let (mut t, log) = transport(Script::default());
        t.send(b"ls\r");
        assert_eq!(
            t.drain_events(),
            vec![TransportEvent::Error("no active channel".to_string())]
        );
        assert_eq!(t.state(), SessionState::Idle);
        assert!(calls(&log).is_empty());
    }

    #[test]
    fn test_write_failure_disconnects() {
        let (mut t, _log) = transport(Script {
            fail_write: true,
            ..Default::default()
        });
        t.connect(&request());
        t.drain_events();
        t.send(b"x");
        let events = t.drain_events();
        assert!(matches!(&events[0], TransportEvent::Error(_)));
        assert_eq!(events[1], TransportEvent::Disconnected);
    }

    #[test]
    fn test_pty_size_forwarded_only_with_channel() {
        let (mut t, log) = transport(Script::default());
        t.set_pty_size(40, 120);
        assert!(calls(&log).is_empty());
        assert!(t.drain_events().is_empty());

        t.connect(&request());
        assert!(calls(&log).contains(&"pty 40x120".to_string()));
        t.set_pty_size(50, 160);
        assert_eq!(calls(&log).last().map(String::as_str), Some("resize 50x160"));
    }

    #[test]
    fn test_reconnect_tears_down_previous_session() {
        let (mut t, log) = transport(Script::default());
        t.connect(&request());
        t.connect(&request());

        assert_eq!(
            t.drain_events(),
            vec![
                TransportEvent::Connected,
                TransportEvent::Disconnected,
                TransportEvent::Connected,
            ]
        );
        let calls = calls(&log);
        let close = calls.iter().position(|c| c == "close");
        let second_connect = calls.iter().rposition(|c| c.starts_with("connect"));
        assert!(close < second_connect);
    }
}
