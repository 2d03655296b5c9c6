//! sshterm - an interactive SSH terminal client
//!
//! Connects to a remote shell over SSH and renders it in the current console.
//!
//! # Features
//!
//! - **VT emulation**: colors, cursor addressing, scroll regions, alternate screen
//! - **Authentication**: identity file, SSH agent, or password
//! - **Mouse selection**: drag to copy, middle-click to paste
//! - **Profiles**: saved targets in `~/.sshterm/config.toml`
//!
//! # Quick Start
//!
//! ```text
//! sshterm alice@example.com          # agent authentication
//! sshterm -i ~/.ssh/id_ed25519 box   # identity file
//! sshterm --password -p 2222 host    # prompt for a password
//! sshterm -P "build box"             # saved profile
//! ```

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEvent, MouseEventKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sshterm::config::Config;
use sshterm::core::emulator::{new_emulator, EmulationMode};
use sshterm::core::session::{BridgeEvent, SessionBridge};
use sshterm::core::term::{DamageSet, GridSize};
use sshterm::core::transport::auth::key_needs_passphrase;
use sshterm::core::transport::{SessionTransport, SshConnector};
use sshterm::profile::Profile;
use sshterm::selection::{GridPos, SelectionTracker};
use sshterm::ui::{clipboard, prompt, Encoded, Key, Renderer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const CURSOR_BLINK: Duration = Duration::from_millis(530);

/// Command line options
#[derive(Debug, Default)]
struct CliArgs {
    target: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity: Option<PathBuf>,
    profile: Option<String>,
    ask_password: bool,
    plain: bool,
}

fn print_version() {
    eprintln!("sshterm {}", VERSION);
}

fn print_help() {
    eprintln!("sshterm {} - interactive SSH terminal", VERSION);
    eprintln!();
    eprintln!("Usage: sshterm [OPTIONS] [user@]host[:port]");
    eprintln!();
    eprintln!("Connection options:");
    eprintln!("  -p, --port <PORT>        Remote port (default: 22)");
    eprintln!("  -l, --user <USER>        Remote user (default: $USER)");
    eprintln!("  -i, --identity <FILE>    Authenticate with a private key");
    eprintln!("  -P, --profile <NAME>     Use a saved profile from config.toml");
    eprintln!("      --password           Prompt for a password instead of using the agent");
    eprintln!();
    eprintln!("Display options:");
    eprintln!("      --plain              Strip escape sequences instead of emulating them");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -v, --version            Show version");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("Mouse:");
    eprintln!("  Left drag                Select and copy text");
    eprintln!("  Middle click             Paste");
    eprintln!("  Shift+Ctrl+V, Shift+Ins  Paste");
    eprintln!();
    eprintln!("Configuration: ~/.sshterm/config.toml");
    eprintln!("Log file:      ~/.sshterm/sshterm.log");
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let args: Vec<String> = args.into_iter().collect();
    let mut cli = CliArgs::default();
    let mut i = 0;

    // Value for an option taking an argument
    fn value<'a>(args: &'a [String], i: &mut usize, name: &str) -> Result<&'a str, String> {
        *i += 1;
        args.get(*i)
            .map(String::as_str)
            .ok_or_else(|| format!("Missing argument for {}", name))
    }

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-p" | "--port" => {
                let port = value(&args, &mut i, "--port")?;
                cli.port = Some(port.parse().map_err(|_| format!("Invalid port: {}", port))?);
            }
            "-l" | "--user" => {
                cli.user = Some(value(&args, &mut i, "--user")?.to_string());
            }
            "-i" | "--identity" => {
                cli.identity = Some(PathBuf::from(value(&args, &mut i, "--identity")?));
            }
            "-P" | "--profile" => {
                cli.profile = Some(value(&args, &mut i, "--profile")?.to_string());
            }
            "--password" => cli.ask_password = true,
            "--plain" => cli.plain = true,
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            arg => {
                if cli.target.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                cli.target = Some(arg.to_string());
            }
        }
        i += 1;
    }

    if cli.target.is_none() && cli.profile.is_none() {
        return Err("No host given".to_string());
    }
    Ok(cli)
}

/// Work out the profile to connect to. Command line options override the saved profile.
fn resolve_profile(cli: &CliArgs, config: &Config) -> anyhow::Result<Profile> {
    let mut profile = match (&cli.profile, &cli.target) {
        (Some(name), _) => config
            .profile(name)
            .cloned()
            .ok_or_else(|| anyhow!("No profile named '{}' in config", name))?,
        (None, Some(target)) => {
            Profile::from_target(target).ok_or_else(|| anyhow!("Invalid target: {}", target))?
        }
        (None, None) => bail!("No host given"),
    };

    if let Some(port) = cli.port {
        profile.port = port;
    }
    if let Some(user) = &cli.user {
        profile.user = user.clone();
    }
    if let Some(identity) = &cli.identity {
        profile.key_path = Some(identity.clone());
    }
    if profile.user.is_empty() {
        profile.user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .map_err(|_| anyhow!("No user given and $USER is not set"))?;
    }
    Ok(profile)
}

/// Log to `~/.sshterm/sshterm.log`. RUST_LOG wins over the config's level.
fn init_logging(config: &Config) {
    let log_path = Config::log_path().unwrap_or_else(|| PathBuf::from("sshterm.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let (config, config_err) = Config::load();
    init_logging(&config);
    info!("sshterm {} starting...", VERSION);
    if let Some(e) = config_err {
        warn!(error = %e, "Ignoring config file");
    }

    let profile = resolve_profile(&cli, &config)?;

    let password = if cli.ask_password {
        let label = format!("{}@{}'s password: ", profile.user, profile.host);
        match prompt::read_secret(&label)? {
            Some(p) => Some(p),
            None => return Ok(()),
        }
    } else {
        None
    };

    let passphrase = match &profile.key_path {
        Some(path) if key_needs_passphrase(path) => {
            let label = format!("Passphrase for {}: ", path.display());
            match prompt::read_secret(&label)? {
                Some(p) => Some(p),
                None => return Ok(()),
            }
        }
        _ => None,
    };

    let mode = if cli.plain {
        EmulationMode::Plain
    } else {
        config.emulation
    };
    let (cols, rows) = Renderer::size()?;
    info!(cols, rows, ?mode, "Host terminal size");

    let emulator = new_emulator(mode, GridSize::clamped(rows, cols), config.theme.to_theme());
    let transport = SessionTransport::new(SshConnector::new()?);
    let mut bridge = SessionBridge::new(transport, emulator);

    eprintln!("Connecting to {}:{}...", profile.host, profile.port);
    let events = bridge.connect(profile, password, passphrase);
    if let Some(message) = connect_failure(&events) {
        error!("Connect failed: {}", message);
        bail!(message);
    }

    let mut renderer = Renderer::new();
    renderer.init()?;

    let result = run_main_loop(&mut bridge, &mut renderer, config.poll_interval());

    let _ = renderer.cleanup();

    match result? {
        Some(message) => {
            eprintln!("Connection closed: {}", message);
            std::process::exit(1);
        }
        None => {
            info!("Session ended");
            Ok(())
        }
    }
}

/// The error message if a connect attempt did not produce a session
fn connect_failure(events: &[BridgeEvent]) -> Option<String> {
    if events.iter().any(|e| matches!(e, BridgeEvent::SessionEstablished(_))) {
        return None;
    }
    let message = events
        .iter()
        .find_map(|e| match e {
            BridgeEvent::Error(msg) => Some(msg.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "connection closed".to_string());
    Some(message)
}

/// Main event loop. Returns the last error if the session ended on one.
fn run_main_loop(
    bridge: &mut SessionBridge,
    renderer: &mut Renderer,
    poll_interval: Duration,
) -> anyhow::Result<Option<String>> {
    let mut selection = SelectionTracker::new();
    let mut last_error = None;
    let mut blink_at = Instant::now();

    sync_title(bridge, renderer)?;
    renderer.render_full(bridge.emulator(), None)?;

    loop {
        let events = bridge.tick();
        if apply_events(events, bridge, renderer, &selection, &mut last_error)? {
            break;
        }

        if blink_at.elapsed() >= CURSOR_BLINK {
            blink_at = Instant::now();
            renderer.toggle_cursor_blink();
            let mut damage = DamageSet::new();
            damage.mark_cursor();
            renderer.render(bridge.emulator(), &damage, selection.range())?;
        }

        if !event::poll(poll_interval)? {
            continue;
        }

        match event::read()? {
            Event::Key(key_event) => {
                if key_event.kind == KeyEventKind::Release {
                    continue;
                }
                let Some(key) = Key::from_crossterm(key_event.code) else {
                    continue;
                };

                // Typing drops the selection highlight
                if selection.range().is_some() {
                    selection.clear();
                    renderer.render_full(bridge.emulator(), None)?;
                }
                renderer.reset_cursor_blink();
                blink_at = Instant::now();

                if bridge.key_input(key, key_event.modifiers.into()) == Encoded::Paste {
                    paste_clipboard(bridge);
                }
            }

            Event::Mouse(mouse) => handle_mouse(mouse, bridge, renderer, &mut selection)?,

            Event::Resize(cols, rows) => {
                info!("Resize: {}x{}", cols, rows);
                let events = bridge.resize(rows, cols);
                selection.clear();
                if apply_events(events, bridge, renderer, &selection, &mut last_error)? {
                    break;
                }
                // The host may have shrunk below the grid; repaint what is visible
                renderer.render_full(bridge.emulator(), None)?;
            }

            Event::Paste(text) => bridge.paste(&text),

            _ => {}
        }
    }

    Ok(last_error)
}

/// Act on bridge events. Returns true once the session is closed.
fn apply_events(
    events: Vec<BridgeEvent>,
    bridge: &SessionBridge,
    renderer: &mut Renderer,
    selection: &SelectionTracker,
    last_error: &mut Option<String>,
) -> anyhow::Result<bool> {
    let mut closed = false;
    for event in events {
        match event {
            BridgeEvent::Redraw(damage) => {
                renderer.render(bridge.emulator(), &damage, selection.range())?;
            }
            BridgeEvent::Resized { rows, cols } => debug!(rows, cols, "Grid resized"),
            BridgeEvent::SessionEstablished(profile) => {
                info!(profile = %profile.display_name(), "Session established");
            }
            BridgeEvent::Error(message) => {
                error!("Session error: {}", message);
                *last_error = Some(message);
            }
            BridgeEvent::SessionClosed => closed = true,
        }
    }
    sync_title(bridge, renderer)?;
    Ok(closed)
}

fn sync_title(bridge: &SessionBridge, renderer: &mut Renderer) -> anyhow::Result<()> {
    let remote = bridge.emulator().title();
    let title = match bridge.profile() {
        Some(profile) if remote.is_empty() => format!("sshterm - {}", profile.display_name()),
        Some(profile) => format!("{} - {}", remote, profile.display_name()),
        None => "sshterm".to_string(),
    };
    renderer.sync_title(&title)?;
    Ok(())
}

fn handle_mouse(
    mouse: MouseEvent,
    bridge: &mut SessionBridge,
    renderer: &mut Renderer,
    selection: &mut SelectionTracker,
) -> anyhow::Result<()> {
    let pos = GridPos::new(mouse.row, mouse.column);
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let had_selection = selection.range().is_some();
            selection.press(pos);
            if had_selection {
                renderer.render_full(bridge.emulator(), None)?;
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            selection.drag(pos);
            renderer.render_full(bridge.emulator(), selection.range())?;
        }
        MouseEventKind::Up(MouseButton::Left) => {
            if let Some(range) = selection.release(pos) {
                if let Some(text) = bridge.copy_selection(&range) {
                    debug!(chars = text.chars().count(), "Copied selection");
                    clipboard::copy(&text);
                }
            }
            renderer.render_full(bridge.emulator(), selection.range())?;
        }
        MouseEventKind::Down(MouseButton::Middle) => paste_clipboard(bridge),
        _ => {}
    }
    Ok(())
}

fn paste_clipboard(bridge: &mut SessionBridge) {
    if let Some(text) = clipboard::paste() {
        bridge.paste(&text);
    }
}
