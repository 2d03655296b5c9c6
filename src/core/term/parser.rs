//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences and UTF-8 text and updates terminal state.
//! Partial sequences (escape or multi-byte UTF-8) are carried across calls.

use super::state::{AttrFlags, Color, TerminalState};

/// At most this many CSI parameters are kept; extras are dropped
const MAX_PARAMS: usize = 32;
/// OSC payloads are truncated past this many bytes
const MAX_OSC_LEN: usize = 4096;
const MAX_INTERMEDIATES: usize = 4;

/// Response that needs to be sent back to the remote host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Operating status report: ESC [ 0 n
    StatusOk,
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::StatusOk => b"\x1b[0n".to_vec(),
            // VT220
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    osc_data: Vec<u8>,
    utf8: Utf8Decoder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    OscString,
    EscapeInOsc, // ESC received within OSC, waiting for backslash
    /// DCS, SOS, PM and APC payloads: swallowed up to the terminator
    StringIgnore,
    EscapeInString,
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_data: Vec::new(),
            utf8: Utf8Decoder::default(),
        }
    }

    /// Feed a chunk of bytes, collecting any replies
    pub fn advance(&mut self, bytes: &[u8], state: &mut TerminalState, replies: &mut Vec<Response>) {
        for &byte in bytes {
            if let Some(response) = self.feed(byte, state) {
                replies.push(response);
            }
        }
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        // A pending multi-byte char is cut short by anything but a continuation byte
        if self.utf8.is_pending() && !(0x80..=0xBF).contains(&byte) {
            self.utf8.reset();
            state.put_char(char::REPLACEMENT_CHARACTER);
        }

        // Handle C0 controls anywhere (except in string states)
        if byte < 0x20 && !self.in_string() {
            self.execute_c0(byte, state);
            return None;
        }

        match self.state {
            ParserState::Ground => {
                self.ground(byte, state);
                None
            }
            ParserState::Escape => self.escape(byte, state),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::CsiIgnore => {
                if (0x40..=0x7E).contains(&byte) {
                    self.state = ParserState::Ground;
                }
                None
            }
            ParserState::OscString => {
                self.osc_string_state(byte, state);
                None
            }
            ParserState::EscapeInOsc => self.escape_in_osc(byte, state),
            ParserState::StringIgnore => {
                match byte {
                    0x07 | 0x18 | 0x1A => self.state = ParserState::Ground,
                    0x1B => self.state = ParserState::EscapeInString,
                    _ => {}
                }
                None
            }
            ParserState::EscapeInString => {
                if byte == b'\\' {
                    self.state = ParserState::Ground;
                    None
                } else {
                    self.enter_escape();
                    self.feed(byte, state)
                }
            }
        }
    }

    fn in_string(&self) -> bool {
        matches!(
            self.state,
            ParserState::OscString
                | ParserState::EscapeInOsc
                | ParserState::StringIgnore
                | ParserState::EscapeInString
        )
    }

    fn execute_c0(&mut self, byte: u8, state: &mut TerminalState) {
        match byte {
            0x1B => self.enter_escape(),
            0x07 => {} // BEL
            0x08 => state.backspace(),
            0x09 => state.horizontal_tab(),
            0x0A..=0x0C => state.linefeed(),
            0x0D => state.carriage_return(),
            // CAN / SUB abort a sequence in progress
            0x18 | 0x1A => self.state = ParserState::Ground,
            _ => {}
        }
    }

    /// Handle ESC received within OSC sequence
    fn escape_in_osc(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.execute_osc(state);
        if byte == b'\\' {
            // ST (ESC \)
            self.state = ParserState::Ground;
            None
        } else {
            // Not ST: the ESC starts a new sequence
            self.enter_escape();
            self.feed(byte, state)
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) {
        match byte {
            0x20..=0x7E => state.put_char(byte as char),
            0x7F => {} // DEL
            _ => {
                if let Some(ch) = self.utf8.push(byte) {
                    state.put_char(ch);
                }
            }
        }
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => {
                self.state = ParserState::OscString;
                self.osc_data.clear();
            }
            // DCS, SOS, PM, APC
            b'P' | b'X' | b'^' | b'_' => self.state = ParserState::StringIgnore,
            b'7' => state.save_cursor(),    // DECSC
            b'8' => state.restore_cursor(), // DECRC
            b'D' => state.index(),          // IND
            b'E' => {
                // NEL - Next line
                state.carriage_return();
                state.linefeed();
            }
            b'M' => state.reverse_index(), // RI
            b'c' => state.reset(),         // RIS
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {
                tracing::trace!(byte, "ignoring escape");
            }
        }
        None
    }

    fn escape_intermediate(&mut self, byte: u8) -> Option<Response> {
        match byte {
            0x20..=0x2F => self.push_intermediate(byte),
            // Charset designations and the like; not supported
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn push_intermediate(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        }
    }

    fn push_param(&mut self, value: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
        }
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' => {
                self.push_intermediate(byte);
            }
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameters are flattened into the parameter list
            b';' | b':' => {
                let value = self.current_param.take().unwrap_or(0);
                self.push_param(value);
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                return self.execute_csi(byte, state);
            }
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            0x20..=0x2F => self.push_intermediate(byte),
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn osc_string_state(&mut self, byte: u8, state: &mut TerminalState) {
        match byte {
            0x07 => {
                // BEL terminates OSC
                self.execute_osc(state);
                self.state = ParserState::Ground;
            }
            0x1B => self.state = ParserState::EscapeInOsc,
            _ => {
                if self.osc_data.len() < MAX_OSC_LEN {
                    self.osc_data.push(byte);
                }
            }
        }
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;

        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');
        let has_other = self
            .intermediates
            .iter()
            .any(|&b| b != b'?' && b != b'>');
        let params = &self.params;
        let first = |default: u16| params.first().copied().filter(|&p| p != 0).unwrap_or(default);

        if has_other {
            // DECSCUSR and friends
            tracing::trace!(final_byte, "ignoring CSI with intermediates");
            return None;
        }

        match (is_private, is_gt, final_byte) {
            // Cursor movement
            (false, false, b'A') => state.cursor_up(first(1)),
            (false, false, b'B') | (false, false, b'e') => state.cursor_down(first(1)),
            (false, false, b'C') | (false, false, b'a') => state.cursor_forward(first(1)),
            (false, false, b'D') => state.cursor_backward(first(1)),
            (false, false, b'E') => {
                // CNL - Cursor Next Line
                state.cursor_down(first(1));
                state.carriage_return();
            }
            (false, false, b'F') => {
                // CPL - Cursor Previous Line
                state.cursor_up(first(1));
                state.carriage_return();
            }
            (false, false, b'G') | (false, false, b'`') => state.cursor_column(first(1)),
            (false, false, b'H') | (false, false, b'f') => {
                // CUP - Cursor Position
                let row = first(1);
                let col = params.get(1).copied().filter(|&p| p != 0).unwrap_or(1);
                state.cursor_position(row, col);
            }
            (false, false, b'd') => state.cursor_row(first(1)),

            // Erase
            (false, false, b'J') => state.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, false, b'K') => state.erase_in_line(params.first().copied().unwrap_or(0)),

            // Line operations
            (false, false, b'L') => state.insert_lines(first(1)),
            (false, false, b'M') => state.delete_lines(first(1)),

            // Character operations
            (false, false, b'@') => state.insert_chars(first(1)),
            (false, false, b'P') => state.delete_chars(first(1)),
            (false, false, b'X') => state.erase_chars(first(1)),

            // Scroll
            (false, false, b'S') => state.scroll_up(first(1)),
            (false, false, b'T') => state.scroll_down(first(1)),

            // Scroll region
            (false, false, b'r') => {
                let top = first(1);
                let bottom = params.get(1).copied().unwrap_or(0);
                state.set_scroll_region(top, bottom);
            }

            (false, false, b'm') => execute_sgr(params, state),

            // Save/restore cursor
            (false, false, b's') => state.save_cursor(),
            (false, false, b'u') => state.restore_cursor(),

            // Device Status Report
            (false, false, b'n') => match params.first() {
                Some(5) => return Some(Response::StatusOk),
                Some(6) => {
                    let cursor = state.cursor();
                    return Some(Response::CursorPosition(cursor.row + 1, cursor.col + 1));
                }
                _ => {}
            },

            // Device Attributes
            (false, false, b'c') => return Some(Response::DeviceAttributes),
            (false, true, b'c') => return Some(Response::SecondaryDeviceAttributes),

            // Private modes (DEC)
            (true, false, b'h') => {
                for &p in params {
                    state.set_private_mode(p, true);
                }
            }
            (true, false, b'l') => {
                for &p in params {
                    state.set_private_mode(p, false);
                }
            }

            _ => {
                tracing::debug!(
                    "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    params,
                    final_byte as char
                );
            }
        }
        None
    }

    fn execute_osc(&mut self, state: &mut TerminalState) {
        // Parse OSC: "code;text"
        let data = String::from_utf8_lossy(&self.osc_data);
        if let Some((code, text)) = data.split_once(';') {
            match code {
                "0" | "1" | "2" => state.set_title(text.to_string()),
                _ => tracing::trace!(code, "ignoring OSC"),
            }
        }
        self.osc_data.clear();
    }
}

fn execute_sgr(params: &[u16], state: &mut TerminalState) {
    if params.is_empty() {
        state.current_attrs.reset();
        return;
    }

    let attrs = &mut state.current_attrs;
    let mut iter = params.iter().copied();

    while let Some(param) = iter.next() {
        match param {
            0 => attrs.reset(),
            1 => attrs.flags |= AttrFlags::BOLD,
            2 => attrs.flags |= AttrFlags::DIM,
            3 => attrs.flags |= AttrFlags::ITALIC,
            4 => attrs.flags |= AttrFlags::UNDERLINE,
            5 => attrs.flags |= AttrFlags::BLINK,
            7 => attrs.flags |= AttrFlags::INVERSE,
            8 => attrs.flags |= AttrFlags::HIDDEN,
            9 => attrs.flags |= AttrFlags::STRIKETHROUGH,

            22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
            23 => attrs.flags &= !AttrFlags::ITALIC,
            24 => attrs.flags &= !AttrFlags::UNDERLINE,
            25 => attrs.flags &= !AttrFlags::BLINK,
            27 => attrs.flags &= !AttrFlags::INVERSE,
            28 => attrs.flags &= !AttrFlags::HIDDEN,
            29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,

            30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
            38 => {
                if let Some(color) = extended_color(&mut iter) {
                    attrs.fg = color;
                }
            }
            39 => attrs.fg = Color::Default,

            40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
            48 => {
                if let Some(color) = extended_color(&mut iter) {
                    attrs.bg = color;
                }
            }
            49 => attrs.bg = Color::Default,

            // Bright
            90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
            100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),

            _ => {}
        }
    }
}

/// `5;n` (256-color) or `2;r;g;b` (truecolor) following a 38/48
fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
    match iter.next()? {
        5 => iter.next().map(|n| Color::Indexed(n.min(255) as u8)),
        2 => {
            let r = iter.next().unwrap_or(0).min(255) as u8;
            let g = iter.next().unwrap_or(0).min(255) as u8;
            let b = iter.next().unwrap_or(0).min(255) as u8;
            Some(Color::Rgb(r, g, b))
        }
        _ => None,
    }
}

/// Incremental UTF-8 decoder; malformed input yields U+FFFD
#[derive(Default)]
pub(crate) struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    needed: usize,
}

impl Utf8Decoder {
    pub(crate) fn is_pending(&self) -> bool {
        self.needed > 0
    }

    pub(crate) fn reset(&mut self) {
        self.len = 0;
        self.needed = 0;
    }

    pub(crate) fn push(&mut self, byte: u8) -> Option<char> {
        if self.needed == 0 {
            let needed = match byte {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                // Stray continuation or invalid lead byte
                _ => return Some(char::REPLACEMENT_CHARACTER),
            };
            self.buf[0] = byte;
            self.len = 1;
            self.needed = needed;
            return None;
        }

        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < self.needed {
            return None;
        }

        let decoded = std::str::from_utf8(&self.buf[..self.len])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.reset();
        Some(decoded)
    }
}
