//! Key mapping for terminal input
//!
//! Converts key presses to the bytes a remote shell expects. [`encode`] is a
//! pure function; first match wins:
//!
//! 1. Shift+Ctrl+V or Shift+Insert asks the caller to paste
//! 2. Ctrl+letter becomes the control byte (`Ctrl+A` = 0x01); other Ctrl
//!    combinations produce nothing
//! 3. Named keys map to fixed sequences
//! 4. Printable characters are sent as UTF-8
//! 5. Everything else produces nothing

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Key identifier, independent of the input backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// A key with a text payload
    Char(char),
    Backspace,
    Enter,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Delete,
    Insert,
    PageUp,
    PageDown,
    F(u8),
}

impl Key {
    pub fn from_crossterm(code: KeyCode) -> Option<Self> {
        let key = match code {
            KeyCode::Char(ch) => Key::Char(ch),
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Enter => Key::Enter,
            KeyCode::Tab | KeyCode::BackTab => Key::Tab,
            KeyCode::Esc => Key::Escape,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::Delete => Key::Delete,
            KeyCode::Insert => Key::Insert,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::F(n) => Key::F(n),
            _ => return None,
        };
        Some(key)
    }
}

/// What a key press turns into
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
    /// Send these bytes to the remote shell
    Bytes(Vec<u8>),
    /// Read the clipboard and send its text as-is
    Paste,
    /// Nothing to send
    Nothing,
}

impl Encoded {
    fn bytes(b: &[u8]) -> Self {
        Encoded::Bytes(b.to_vec())
    }
}

/// Encode a key press
pub fn encode(key: Key, mods: Modifiers) -> Encoded {
    let shift = mods.contains(Modifiers::SHIFT);
    let ctrl = mods.contains(Modifiers::CTRL);

    // Paste shortcuts
    match key {
        Key::Char('v' | 'V') if shift && ctrl => return Encoded::Paste,
        Key::Insert if shift => return Encoded::Paste,
        _ => {}
    }

    if ctrl {
        return match key {
            Key::Char(ch) if ch.is_ascii_alphabetic() => {
                Encoded::Bytes(vec![ch.to_ascii_uppercase() as u8 - b'A' + 1])
            }
            _ => Encoded::Nothing,
        };
    }

    match key {
        Key::Backspace => Encoded::bytes(&[0x7F]),
        Key::Enter => Encoded::bytes(b"\r"),
        Key::Tab => Encoded::bytes(b"\t"),
        Key::Escape => Encoded::bytes(&[0x1B]),
        Key::Char(' ') => Encoded::bytes(b" "),
        Key::Up => Encoded::bytes(b"\x1b[A"),
        Key::Down => Encoded::bytes(b"\x1b[B"),
        Key::Right => Encoded::bytes(b"\x1b[C"),
        Key::Left => Encoded::bytes(b"\x1b[D"),
        Key::Home => Encoded::bytes(b"\x1b[H"),
        Key::End => Encoded::bytes(b"\x1b[F"),
        Key::Delete => Encoded::bytes(b"\x1b[3~"),
        Key::Char(ch) if !ch.is_control() => {
            let mut buf = [0u8; 4];
            Encoded::bytes(ch.encode_utf8(&mut buf).as_bytes())
        }
        _ => Encoded::Nothing,
    }
}

/// Key mapper for crossterm events
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent
    pub fn map(event: &KeyEvent) -> Encoded {
        match Key::from_crossterm(event.code) {
            Some(key) => encode(key, Modifiers::from(event.modifiers)),
            None => Encoded::Nothing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_ctrl_letters() {
        assert_eq!(encode(Key::Char('a'), Modifiers::CTRL), Encoded::Bytes(vec![0x01]));
        assert_eq!(encode(Key::Char('C'), Modifiers::CTRL), Encoded::Bytes(vec![0x03]));
        assert_eq!(encode(Key::Char('z'), Modifiers::CTRL), Encoded::Bytes(vec![0x1A]));
        assert_eq!(
            encode(Key::Char('d'), Modifiers::CTRL | Modifiers::ALT),
            Encoded::Bytes(vec![0x04])
        );
    }

    #[test]
    fn test_ctrl_non_letters_send_nothing() {
        assert_eq!(encode(Key::Char('1'), Modifiers::CTRL), Encoded::Nothing);
        assert_eq!(encode(Key::Char(' '), Modifiers::CTRL), Encoded::Nothing);
        assert_eq!(encode(Key::Up, Modifiers::CTRL), Encoded::Nothing);
        assert_eq!(encode(Key::Enter, Modifiers::CTRL), Encoded::Nothing);
    }

    #[test]
    fn test_paste_shortcuts() {
        assert_eq!(
            encode(Key::Char('V'), Modifiers::CTRL | Modifiers::SHIFT),
            Encoded::Paste
        );
        assert_eq!(encode(Key::Insert, Modifiers::SHIFT), Encoded::Paste);
        // Ctrl+V alone is a control byte, not a paste
        assert_eq!(encode(Key::Char('v'), Modifiers::CTRL), Encoded::Bytes(vec![0x16]));
        assert_eq!(encode(Key::Insert, Modifiers::empty()), Encoded::Nothing);
    }

    #[test]
    fn test_named_keys() {
        let none = Modifiers::empty();
        assert_eq!(encode(Key::Enter, none), Encoded::bytes(b"\r"));
        assert_eq!(encode(Key::Backspace, none), Encoded::bytes(&[0x7F]));
        assert_eq!(encode(Key::Tab, none), Encoded::bytes(b"\t"));
        assert_eq!(encode(Key::Escape, none), Encoded::bytes(&[0x1B]));
        assert_eq!(encode(Key::Char(' '), none), Encoded::bytes(b" "));
        assert_eq!(encode(Key::Left, none), Encoded::bytes(b"\x1b[D"));
        assert_eq!(encode(Key::Up, none), Encoded::bytes(b"\x1b[A"));
        assert_eq!(encode(Key::Home, none), Encoded::bytes(b"\x1b[H"));
        assert_eq!(encode(Key::End, none), Encoded::bytes(b"\x1b[F"));
        assert_eq!(encode(Key::Delete, none), Encoded::bytes(b"\x1b[3~"));
    }

    #[test]
    fn test_shift_and_alt_fall_through() {
        assert_eq!(encode(Key::Left, Modifiers::SHIFT), Encoded::bytes(b"\x1b[D"));
        assert_eq!(encode(Key::Char('A'), Modifiers::SHIFT), Encoded::bytes(b"A"));
        assert_eq!(encode(Key::Char('x'), Modifiers::ALT), Encoded::bytes(b"x"));
    }

    #[test]
    fn test_text_is_utf8() {
        assert_eq!(encode(Key::Char('é'), Modifiers::empty()), Encoded::bytes("é".as_bytes()));
        assert_eq!(encode(Key::Char('日'), Modifiers::empty()), Encoded::bytes("日".as_bytes()));
    }

    #[test]
    fn test_unmapped_keys_send_nothing() {
        assert_eq!(encode(Key::F(5), Modifiers::empty()), Encoded::Nothing);
        assert_eq!(encode(Key::PageUp, Modifiers::empty()), Encoded::Nothing);
    }

    #[test]
    fn test_crossterm_events() {
        let ev = key_event(KeyCode::Char('a'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&ev), Encoded::Bytes(vec![0x01]));

        let ev = key_event(KeyCode::Char('V'), KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&ev), Encoded::Paste);

        let ev = key_event(KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&ev), Encoded::bytes(b"\t"));

        let ev = key_event(KeyCode::CapsLock, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&ev), Encoded::Nothing);
    }
}
