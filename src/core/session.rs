//! Session management
//!
//! Wires the transport to the emulator: remote output is fed into the
//! emulator, key input and emulator replies go back out, and resizes keep
//! the remote PTY in step with the local grid. The owner drives [`tick`]
//! from its timer; nothing here blocks except `connect`.
//!
//! [`tick`]: SessionBridge::tick

use tracing::{debug, info};

use super::emulator::{Emulator, GridView, Theme};
use super::term::{DamageSet, GridSize};
use super::transport::{
    ConnectRequest, Connector, SessionState, SessionTransport, SshConnector, TransportEvent,
};
use crate::profile::Profile;
use crate::selection::{self, SelectionRange};
use crate::ui::keymapper::{self, Encoded, Key, Modifiers};

/// Things the owner of a session needs to react to
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Redraw the damaged region
    Redraw(DamageSet),
    /// The effective grid size changed
    Resized { rows: u16, cols: u16 },
    /// The shell is up; profile bookkeeping may record it
    SessionEstablished(Profile),
    /// The connection is gone
    SessionClosed,
    Error(String),
}

/// One remote shell session
pub struct SessionBridge<C: Connector = SshConnector> {
    transport: SessionTransport<C>,
    emulator: Box<dyn Emulator>,
    profile: Option<Profile>,
}

impl<C: Connector> SessionBridge<C> {
    pub fn new(mut transport: SessionTransport<C>, mut emulator: Box<dyn Emulator>) -> Self {
        let size = emulator.size();
        transport.set_pty_size(size.rows, size.cols);
        // Initial full paint is the owner's job
        emulator.take_damage();
        Self {
            transport,
            emulator,
            profile: None,
        }
    }

    pub fn emulator(&self) -> &dyn Emulator {
        self.emulator.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.transport.state()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Connect to `profile`. Blocks until the shell is up or the attempt failed.
    pub fn connect(
        &mut self,
        profile: Profile,
        password: Option<String>,
        key_passphrase: Option<String>,
    ) -> Vec<BridgeEvent> {
        info!(profile = %profile.display_name(), "Opening session");
        let request = ConnectRequest::from_profile(&profile, password, key_passphrase);
        self.profile = Some(profile);
        self.transport.connect(&request);
        self.process_events()
    }

    /// Poll the channel once and apply whatever arrived
    pub fn tick(&mut self) -> Vec<BridgeEvent> {
        self.transport.poll();
        self.process_events()
    }

    /// Encode and send a key press. `Encoded::Paste` is handed back so the
    /// caller can read the clipboard and call [`paste`](Self::paste).
    pub fn key_input(&mut self, key: Key, mods: Modifiers) -> Encoded {
        let encoded = keymapper::encode(key, mods);
        if let Encoded::Bytes(bytes) = &encoded {
            self.transport.send(bytes);
        }
        encoded
    }

    /// Send clipboard text unmodified
    pub fn paste(&mut self, text: &str) {
        if !text.is_empty() {
            self.transport.send(text.as_bytes());
        }
    }

    /// Resize the grid and, if its effective size changed, the remote PTY
    pub fn resize(&mut self, rows: u16, cols: u16) -> Vec<BridgeEvent> {
        let Some(GridSize { rows, cols }) = self.emulator.resize(rows, cols) else {
            return Vec::new();
        };
        debug!(rows, cols, "Grid resized");
        self.transport.set_pty_size(rows, cols);
        vec![
            BridgeEvent::Resized { rows, cols },
            BridgeEvent::Redraw(self.emulator.take_damage()),
        ]
    }

    pub fn set_theme(&mut self, theme: Theme) -> BridgeEvent {
        BridgeEvent::Redraw(self.emulator.set_theme(theme))
    }

    pub fn disconnect(&mut self) -> Vec<BridgeEvent> {
        self.transport.disconnect_from_host();
        self.process_events()
    }

    /// Text under `range`, or `None` if nothing worth copying
    pub fn copy_selection(&self, range: &SelectionRange) -> Option<String> {
        let text = selection::extract(self.emulator.as_ref(), range);
        (!text.is_empty()).then_some(text)
    }

    fn process_events(&mut self) -> Vec<BridgeEvent> {
        let mut out = Vec::new();
        let mut damage = DamageSet::new();

        for event in self.transport.drain_events() {
            match event {
                TransportEvent::Connected => {
                    damage.merge(self.emulator.clear_screen());
                    if let Some(profile) = self.profile.clone() {
                        out.push(BridgeEvent::SessionEstablished(profile));
                    }
                }
                TransportEvent::Output(bytes) => {
                    damage.merge(self.emulator.feed(&bytes));
                    let replies = self.emulator.take_replies();
                    if !replies.is_empty() {
                        self.transport.send(&replies);
                    }
                }
                TransportEvent::Error(message) => {
                    let line = format!("[Error] {}\r\n", message);
                    damage.merge(self.emulator.feed(line.as_bytes()));
                    out.push(BridgeEvent::Error(message));
                }
                TransportEvent::Disconnected => out.push(BridgeEvent::SessionClosed),
            }
        }

        if !damage.is_empty() {
            out.push(BridgeEvent::Redraw(damage));
        }
        out
    }
}
