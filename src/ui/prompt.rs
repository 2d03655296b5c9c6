//! Secret prompts (password, key passphrase)
//!
//! Reads a line from the console in raw mode without echoing it. Runs before
//! the renderer takes over the screen.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// What a single key does to the line being typed
#[derive(Debug, PartialEq, Eq)]
enum Edit {
    Push(char),
    Pop,
    Submit,
    Cancel,
    Ignore,
}

fn edit_for(key: &KeyEvent) -> Edit {
    if key.kind == KeyEventKind::Release {
        return Edit::Ignore;
    }
    match key.code {
        KeyCode::Enter => Edit::Submit,
        KeyCode::Esc => Edit::Cancel,
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => Edit::Cancel,
        KeyCode::Backspace => Edit::Pop,
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => Edit::Push(ch),
        _ => Edit::Ignore,
    }
}

/// Prompt for a secret. `Ok(None)` means the user cancelled.
pub fn read_secret(label: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", label)?;
    stderr.flush()?;

    terminal::enable_raw_mode()?;
    let result = read_hidden_line();
    // Restore the console even if reading failed
    let restored = terminal::disable_raw_mode();
    writeln!(stderr)?;

    let line = result?;
    restored?;
    Ok(line)
}

fn read_hidden_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match edit_for(&key) {
            Edit::Push(ch) => line.push(ch),
            Edit::Pop => {
                line.pop();
            }
            Edit::Submit => return Ok(Some(line)),
            Edit::Cancel => return Ok(None),
            Edit::Ignore => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_line_editing_keys() {
        assert_eq!(edit_for(&press(KeyCode::Char('x'), KeyModifiers::NONE)), Edit::Push('x'));
        assert_eq!(edit_for(&press(KeyCode::Char('X'), KeyModifiers::SHIFT)), Edit::Push('X'));
        assert_eq!(edit_for(&press(KeyCode::Backspace, KeyModifiers::NONE)), Edit::Pop);
        assert_eq!(edit_for(&press(KeyCode::Enter, KeyModifiers::NONE)), Edit::Submit);
    }

    #[test]
    fn test_cancel_keys() {
        assert_eq!(edit_for(&press(KeyCode::Esc, KeyModifiers::NONE)), Edit::Cancel);
        assert_eq!(edit_for(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)), Edit::Cancel);
        assert_eq!(edit_for(&press(KeyCode::Char('u'), KeyModifiers::CONTROL)), Edit::Ignore);
    }

    #[test]
    fn test_release_events_ignored() {
        let mut key = press(KeyCode::Char('a'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert_eq!(edit_for(&key), Edit::Ignore);
    }
}
